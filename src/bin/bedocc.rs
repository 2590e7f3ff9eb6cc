use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use bed_occupancy_etl::app::{App, IngestOptions};
use bed_occupancy_etl::config::{ConfigLoader, ResolvedConfig};
use bed_occupancy_etl::domain::Quarter;
use bed_occupancy_etl::error::IngestError;
use bed_occupancy_etl::fetch::HttpSourceFetcher;
use bed_occupancy_etl::output::JsonOutput;
use bed_occupancy_etl::store::{OrganisationMatch, PeriodFilter, SqliteStore};

const SAMPLE_SIZE: usize = 10;

#[derive(Parser)]
#[command(name = "bedocc")]
#[command(about = "Load NHS bed-occupancy workbooks into period-scoped tables and query them")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true, help = "Config file (default: ./bedocc.json when present)")]
    config: Option<String>,

    #[arg(long, global = true, help = "SQLite database, overriding the config file")]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch a workbook and replace its period in both tables")]
    Ingest(IngestArgs),
    #[command(about = "Aggregate occupancy rows")]
    Occupancy(PeriodArgs),
    #[command(about = "Per-speciality occupied-bed rows")]
    Speciality(PeriodArgs),
    #[command(about = "Periods present in either table")]
    Periods,
    #[command(about = "Look up an organisation by code or by name")]
    Org(OrgArgs),
    #[command(about = "First aggregate rows")]
    Sample,
}

#[derive(Args)]
struct IngestArgs {
    #[arg(help = "Source URL or path; its file name sets the reporting period")]
    source: String,

    #[arg(long, help = "Read this local copy instead of fetching SOURCE")]
    file: Option<String>,

    #[arg(long, help = "Record the source as an upload")]
    upload: bool,

    #[arg(long, help = "Fail when the quarter or year cannot be read from SOURCE")]
    strict_period: bool,
}

#[derive(Args)]
struct PeriodArgs {
    #[arg(long)]
    year: Option<i32>,

    #[arg(long)]
    quarter: Option<Quarter>,
}

#[derive(Args)]
struct OrgArgs {
    #[arg(
        required_unless_present = "name",
        conflicts_with = "name",
        help = "Exact organisation code"
    )]
    code: Option<String>,

    #[arg(long, help = "Case-insensitive part of the organisation name")]
    name: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<IngestError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &IngestError) -> u8 {
    if error.is_input_error() {
        return 2;
    }
    match error {
        IngestError::Fetch(_)
        | IngestError::FetchStatus { .. }
        | IngestError::Database(_)
        | IngestError::MixedPeriods { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?.with_database(cli.database.as_deref());

    match cli.command {
        Commands::Ingest(args) => run_ingest(args, config),
        Commands::Occupancy(args) => {
            let store = SqliteStore::open(&config.database)?;
            let records = store.aggregate(filter(&args))?;
            JsonOutput::print_aggregate(&records).into_diagnostic()
        }
        Commands::Speciality(args) => {
            let store = SqliteStore::open(&config.database)?;
            let records = store.speciality(filter(&args))?;
            JsonOutput::print_speciality(&records).into_diagnostic()
        }
        Commands::Periods => {
            let store = SqliteStore::open(&config.database)?;
            JsonOutput::print_periods(&store.available_periods()?).into_diagnostic()
        }
        Commands::Org(args) => run_org(args, &config),
        Commands::Sample => {
            let store = SqliteStore::open(&config.database)?;
            JsonOutput::print_aggregate(&store.sample(SAMPLE_SIZE)?).into_diagnostic()
        }
    }
}

fn run_ingest(args: IngestArgs, config: ResolvedConfig) -> miette::Result<()> {
    let store = SqliteStore::open(&config.database)?;
    let fetcher = HttpSourceFetcher::new()?;
    let mut app = App::new(store, fetcher, config.mapping).with_summary_dir(config.summary_dir);

    let options = IngestOptions {
        upload: args.upload,
        strict_period: args.strict_period,
    };
    let summary = app.ingest(&args.source, args.file.as_deref(), &options, &JsonOutput)?;
    JsonOutput::print_summary(&summary).into_diagnostic()
}

fn run_org(args: OrgArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let store = SqliteStore::open(&config.database)?;
    let result = match (args.code, args.name) {
        (Some(code), _) => {
            let data = store.organisation_by_code(&code)?;
            OrganisationMatch {
                organisations_found: usize::from(!data.is_empty()),
                total_records: data.len(),
                data,
            }
        }
        (None, Some(name)) => store.organisations_by_name(&name)?,
        (None, None) => return Err(miette::miette!("either CODE or --name is required")),
    };
    JsonOutput::print_organisations(&result).into_diagnostic()
}

fn filter(args: &PeriodArgs) -> PeriodFilter {
    PeriodFilter {
        year: args.year,
        quarter: args.quarter,
    }
}
