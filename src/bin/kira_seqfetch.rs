use std::io::IsTerminal;
use std::process::ExitCode;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_seqfetch::app::App;
use kira_seqfetch::config::{ConfigLoader, FetchConfig, Pacing, RawConfig};
use kira_seqfetch::domain::ResumeChoice;
use kira_seqfetch::error::{ErrorKind, FetchError};
use kira_seqfetch::eutils::EutilsHttpClient;
use kira_seqfetch::output::{JsonOutput, OutputMode, TextOutput};
use kira_seqfetch::prompt::ask_resume_choice;
use kira_seqfetch::store::OutputStore;

#[derive(Parser)]
#[command(name = "kira-seqfetch")]
#[command(about = "Download NCBI sequences for a list of ids, resuming where the last run stopped")]
#[command(version, author)]
struct Cli {
    /// File with one sequence id per line.
    input: Option<String>,

    /// Output file; records are appended.
    output: Option<String>,

    /// Ids per epost/efetch batch.
    #[arg(allow_negative_numbers = true)]
    batch_size: Option<i64>,

    /// Entrez database, e.g. protein or nuccore.
    db: Option<String>,

    /// efetch rettype, e.g. fasta or gb.
    rettype: Option<String>,

    /// NCBI API key (falls back to NCBI_API_KEY).
    api_key: Option<String>,

    /// Contact email sent with every request (falls back to NCBI_EMAIL).
    email: Option<String>,

    #[arg(long)]
    config: Option<String>,

    /// What to do when the output file already has records.
    #[arg(long, value_enum)]
    on_existing: Option<ResumeChoice>,

    /// Attempts per batch on network errors; 0 retries forever.
    #[arg(long)]
    max_retries: Option<u32>,

    /// Ids per batch in the direct efetch fallback.
    #[arg(long, allow_negative_numbers = true)]
    fallback_batch_size: Option<i64>,

    /// Disable the delays between requests.
    #[arg(long)]
    no_pacing: bool,

    #[arg(long)]
    non_interactive: bool,

    /// Print the run report as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(err) = report.downcast_ref::<FetchError>() {
                return ExitCode::from(map_exit_code(err));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &FetchError) -> u8 {
    match error.kind() {
        ErrorKind::Configuration => 2,
        ErrorKind::Io => 1,
        ErrorKind::ProtocolParse
        | ErrorKind::TransientNetwork
        | ErrorKind::BadRequest
        | ErrorKind::RetryExhausted
        | ErrorKind::Remote => 3,
    }
}

fn run() -> miette::Result<u8> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive || !std::io::stdin().is_terminal() {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = resolve_config(&cli)?;
    let resume = resolve_resume_choice(&cli, &config, output_mode)?;

    let client = EutilsHttpClient::new(&config.base_url)?;
    let app = App::new(client);

    let report = if cli.json {
        let report = app.run(&config, resume, &JsonOutput)?;
        JsonOutput::print_report(&report).into_diagnostic()?;
        report
    } else {
        let report = app.run(&config, resume, &TextOutput)?;
        TextOutput::print_report(&report).into_diagnostic()?;
        report
    };

    Ok(report.outcome.exit_code())
}

fn resolve_config(cli: &Cli) -> Result<FetchConfig, FetchError> {
    let from_cli = RawConfig {
        input: cli.input.clone(),
        output: cli.output.clone(),
        batch_size: cli.batch_size,
        database: cli.db.clone(),
        rettype: cli.rettype.clone(),
        api_key: cli.api_key.clone(),
        email: cli.email.clone(),
        fallback_batch_size: cli.fallback_batch_size,
        max_attempts: cli.max_retries,
        ..RawConfig::default()
    };
    let from_file = ConfigLoader::load(cli.config.as_deref())?;

    let mut config = from_cli
        .or(from_file)
        .or(ConfigLoader::from_env())
        .resolve()?;
    if cli.no_pacing {
        config.pacing = Pacing::none();
    }
    Ok(config)
}

fn resolve_resume_choice(
    cli: &Cli,
    config: &FetchConfig,
    output_mode: OutputMode,
) -> miette::Result<Option<ResumeChoice>> {
    if cli.on_existing.is_some() {
        return Ok(cli.on_existing);
    }
    let store = OutputStore::new(config.output.clone());
    if !store.has_content()? {
        return Ok(None);
    }
    match output_mode {
        OutputMode::Interactive => ask_resume_choice(store.path()).map(Some),
        OutputMode::NonInteractive => Ok(Some(ResumeChoice::Resume)),
    }
}
