use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use std::path::{Path, PathBuf};
use wbpull::api::DEFAULT_PER_PAGE;
use wbpull::models::{CountrySelector, DateSpec};
use wbpull::{Client, Error, ResponseEncoding, metadata, storage};

#[derive(Parser, Debug)]
#[command(
    name = "wbpull",
    version,
    about = "Fetch World Bank countries, indicators & time series; export CSV/Parquet/YAML"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch country metadata.
    Countries(CountriesArgs),
    /// Fetch indicator metadata.
    Indicators(IndicatorsArgs),
    /// Fetch indicator observations.
    Data(DataArgs),
    /// Run batch jobs from a YAML config.
    #[cfg(feature = "yaml")]
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct CountriesArgs {
    /// Rows per page requested from the API.
    #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
    per_page: u32,
    /// Write a YAML mapping keyed by country code instead of a table.
    #[arg(long, default_value_t = false)]
    keyed: bool,
    /// Output file (.csv, .parquet, .yaml/.yml). Prints a preview if omitted.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct IndicatorsArgs {
    /// Indicator codes separated by comma or semicolon (e.g., SP.POP.TOTL)
    #[arg(long)]
    codes: Option<String>,
    /// Keep only indicators whose code or name contains this term
    /// (client-side, case-insensitive). Ignored with --codes.
    #[arg(long)]
    search: Option<String>,
    /// Rows per page requested from the API.
    #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
    per_page: u32,
    /// Write a YAML mapping keyed by indicator code instead of a table.
    #[arg(long, default_value_t = false)]
    keyed: bool,
    /// Output file (.csv, .parquet, .yaml/.yml). Prints a preview if omitted.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EncodingArg {
    /// Paginated JSON envelope.
    Json,
    /// Single-shot CSV download.
    Table,
}

impl From<EncodingArg> for ResponseEncoding {
    fn from(arg: EncodingArg) -> Self {
        match arg {
            EncodingArg::Json => ResponseEncoding::Json,
            EncodingArg::Table => ResponseEncoding::Table,
        }
    }
}

#[derive(Args, Debug)]
struct DataArgs {
    /// Indicator codes separated by comma or semicolon (e.g., SP.POP.TOTL)
    #[arg(short, long)]
    indicators: String,
    /// "all" or country codes separated by comma or semicolon (e.g., BRA,IND)
    #[arg(short, long, default_value = "all")]
    countries: String,
    /// Year (YYYY), range (YYYY:YYYY), or open range (YYYY:)
    #[arg(short = 'd', long)]
    date: Option<String>,
    /// Rows per page requested from the API.
    #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
    per_page: u32,
    /// Response encoding to request.
    #[arg(long, value_enum, default_value = "json")]
    encoding: EncodingArg,
    /// Keep the long (tidy) format instead of pivoting wide.
    #[arg(long, default_value_t = false)]
    long: bool,
    /// Output file (.csv, .parquet, .yaml/.yml). Prints a preview if omitted.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[cfg(feature = "yaml")]
#[derive(Args, Debug)]
struct RunArgs {
    /// Jobs config file (YAML with a `jobs:` list).
    #[arg(long)]
    config: PathBuf,
    /// Drop indicator codes that don't resolve to metadata before fetching.
    #[arg(long, default_value_t = false)]
    validate: bool,
    /// Rows per page requested from the API.
    #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
    per_page: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Countries(args) => cmd_countries(args),
        Command::Indicators(args) => cmd_indicators(args),
        Command::Data(args) => cmd_data(args),
        #[cfg(feature = "yaml")]
        Command::Run(args) => cmd_run(args),
    }
}

fn parse_list(s: &str) -> Vec<String> {
    s.split([',', ';'])
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

/// Keyed exports only make sense as YAML mappings, so `--keyed` requires a
/// `.yaml`/`.yml` destination. Checked before any fetching.
fn keyed_out(out: Option<&Path>) -> Result<&Path> {
    let Some(path) = out else {
        return Err(Error::Config("--keyed requires --out with a .yaml/.yml destination".into()).into());
    };
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
    if !is_yaml {
        return Err(Error::Config(format!(
            "--keyed requires a .yaml/.yml destination, got {}",
            path.display()
        ))
        .into());
    }
    Ok(path)
}

fn cmd_countries(args: CountriesArgs) -> Result<()> {
    let keyed_path = args.keyed.then(|| keyed_out(args.out.as_deref())).transpose()?;
    let client = Client::default();
    let records = client.get_country_metadata(args.per_page)?;
    if let Some(path) = keyed_path {
        storage::save_keyed_yaml(&metadata::keyed_countries(&records), path)?;
    } else {
        storage::save(&metadata::countries_frame(&records), args.out.as_deref())?;
    }
    Ok(())
}

fn cmd_indicators(args: IndicatorsArgs) -> Result<()> {
    let keyed_path = args.keyed.then(|| keyed_out(args.out.as_deref())).transpose()?;
    let codes = args.codes.as_deref().map(parse_list).unwrap_or_default();
    let client = Client::default();
    let records = client.get_indicator_metadata(&codes, args.search.as_deref(), args.per_page)?;
    if let Some(path) = keyed_path {
        storage::save_keyed_yaml(&metadata::keyed_indicators(&records), path)?;
    } else {
        storage::save(&metadata::indicators_frame(&records), args.out.as_deref())?;
    }
    Ok(())
}

fn cmd_data(args: DataArgs) -> Result<()> {
    let indicators = parse_list(&args.indicators);
    let countries = CountrySelector::parse(&args.countries);
    let date = match args.date.as_deref() {
        Some(s) => Some(DateSpec::parse(s).ok_or_else(|| {
            anyhow::anyhow!("invalid --date, expected YYYY, YYYY:YYYY, or YYYY:")
        })?),
        None => None,
    };

    let client = Client::default();
    let frame = client.get_data(
        &indicators,
        &countries,
        date,
        args.per_page,
        args.encoding.into(),
        args.long,
    )?;
    storage::save(&frame, args.out.as_deref())?;
    Ok(())
}

#[cfg(feature = "yaml")]
fn cmd_run(args: RunArgs) -> Result<()> {
    use wbpull::jobs;

    let config = jobs::load_jobs(&args.config)?;
    let config_dir = args
        .config
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let client = Client::default();
    let completed = jobs::run_jobs(&client, &config, &config_dir, args.validate, args.per_page)?;
    info!("completed {completed} of {} job(s)", config.jobs.len());
    Ok(())
}
