use std::process::ExitCode;

use camino::Utf8PathBuf;
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use typing_refs::app::{self, App, Outcome, Selection, UpdateReport, UpdateSelection};
use typing_refs::config::SettingsLoader;
use typing_refs::domain::DatasetName;
use typing_refs::error::RefsError;
use typing_refs::fasta::{self, RMLST_COMBINED};
use typing_refs::output::{JsonOutput, LogProgress, OutputMode};
use typing_refs::pubmlst::PubmlstHttpClient;
use typing_refs::registry::UpdateSetRegistry;
use typing_refs::rmlst::PerlAuthClient;
use typing_refs::store::Store;

#[derive(Parser)]
#[command(name = "typing-refs")]
#[command(about = "Keep rMLST and MLST reference databases fresh, falling back to the last good copy")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Resolve the reference folder of every dataset, fetching when asked")]
    Update(UpdateArgs),
    #[command(about = "Show the cached versions of every dataset")]
    Status(StatusArgs),
    #[command(about = "Merge the allele files of a folder into rMLST_combined.fasta")]
    Merge(MergeArgs),
    #[command(about = "Edit the set of tracked datasets")]
    Registry(RegistryArgs),
}

#[derive(Args)]
struct UpdateArgs {
    reference_dir: String,

    /// Fetch stale datasets. With a comma-separated list, only those.
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    update: Option<Vec<String>>,

    /// Extra organisms to resolve in this run.
    #[arg(long, value_delimiter = ',')]
    organisms: Vec<String>,
}

#[derive(Args)]
struct StatusArgs {
    reference_dir: String,

    #[arg(long, value_delimiter = ',')]
    organisms: Vec<String>,
}

#[derive(Args)]
struct MergeArgs {
    dir: String,
}

#[derive(Args)]
struct RegistryArgs {
    #[command(subcommand)]
    command: RegistryCommand,
}

#[derive(Subcommand)]
enum RegistryCommand {
    #[command(about = "Track a dataset")]
    Add {
        reference_dir: String,
        name: String,
        #[arg(long)]
        alias: Option<String>,
    },
    #[command(about = "Print the registry")]
    Show { reference_dir: String },
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<RefsError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &RefsError) -> u8 {
    match error {
        RefsError::ConfigRead(_)
        | RefsError::ConfigParse(_)
        | RefsError::InvalidDatasetName(_)
        | RefsError::InvalidSchemeRequest(_) => 2,
        RefsError::CatalogHttp(_)
        | RefsError::CatalogStatus { .. }
        | RefsError::CatalogParse(_)
        | RefsError::UnknownScheme(_)
        | RefsError::AmbiguousScheme { .. }
        | RefsError::MissingTool(_)
        | RefsError::AuthScript(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Update(args) => run_update(args, config, output_mode),
        Commands::Status(args) => run_status(args, config, output_mode),
        Commands::Merge(args) => run_merge(args, output_mode),
        Commands::Registry(args) => run_registry(args, config),
    }
}

fn parse_names(values: &[String]) -> Result<Vec<DatasetName>, RefsError> {
    values
        .iter()
        .filter(|value| !value.trim().is_empty())
        .map(|value| value.parse())
        .collect()
}

fn run_update(args: UpdateArgs, config: Option<&str>, output_mode: OutputMode) -> miette::Result<()> {
    let reference_root = Utf8PathBuf::from(args.reference_dir);
    let settings = SettingsLoader::resolve(config, &reference_root)?;
    let registry = UpdateSetRegistry::load(&settings.registry_path)?;

    let updates = match args.update {
        None => UpdateSelection::None,
        Some(values) => {
            let names = parse_names(&values)?;
            if names.is_empty() {
                UpdateSelection::All
            } else {
                UpdateSelection::Only(names)
            }
        }
    };
    let extra = parse_names(&args.organisms)?;

    let store = Store::new(reference_root);
    let datasets = app::plan_datasets(&store, &registry, &extra, &updates)?;
    let today = Local::now().date_naive();

    let rmlst = PerlAuthClient::new(settings.credentials.clone());
    let schemes = PubmlstHttpClient::new()?;
    let app = App::new(settings, rmlst, schemes);

    match output_mode {
        OutputMode::Json => {
            let report = app.update_all(&datasets, today, &JsonOutput);
            JsonOutput::print_update(&report).into_diagnostic()?;
        }
        OutputMode::Human => {
            let report = app.update_all(&datasets, today, &LogProgress);
            print_update_summary(&report);
        }
    }
    Ok(())
}

fn run_status(args: StatusArgs, config: Option<&str>, output_mode: OutputMode) -> miette::Result<()> {
    let reference_root = Utf8PathBuf::from(args.reference_dir);
    let settings = SettingsLoader::resolve(config, &reference_root)?;
    let registry = UpdateSetRegistry::load(&settings.registry_path)?;
    let extra = parse_names(&args.organisms)?;
    let store = Store::new(reference_root);
    let datasets = app::plan_datasets(&store, &registry, &extra, &UpdateSelection::None)?;
    let statuses = app::inspect(&datasets, &settings, Local::now().date_naive())?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_status(&statuses).into_diagnostic()?,
        OutputMode::Human => {
            for status in &statuses {
                match &status.latest {
                    Some(folder) => println!(
                        "{} {} ({} bytes, {} days old{}{})",
                        status.dataset,
                        folder.name,
                        folder.total_bytes,
                        status.freshness.age_days,
                        if status.freshness.stale { ", stale" } else { "" },
                        if status.latest_valid { "" } else { ", invalid" },
                    ),
                    None => println!("{} no cached version", status.dataset),
                }
            }
        }
    }
    Ok(())
}

fn run_merge(args: MergeArgs, output_mode: OutputMode) -> miette::Result<()> {
    let dir = Utf8PathBuf::from(args.dir);
    let summary = fasta::merge_allele_files(&dir, RMLST_COMBINED)?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_merge(&summary).into_diagnostic()?,
        OutputMode::Human => match &summary.output {
            Some(path) => println!(
                "merged {} records from {} files into {path}",
                summary.records,
                summary.inputs.len()
            ),
            None => println!("no allele files in {dir}"),
        },
    }
    Ok(())
}

fn run_registry(args: RegistryArgs, config: Option<&str>) -> miette::Result<()> {
    match args.command {
        RegistryCommand::Add {
            reference_dir,
            name,
            alias,
        } => {
            let reference_root = Utf8PathBuf::from(reference_dir);
            let settings = SettingsLoader::resolve(config, &reference_root)?;
            let mut registry = UpdateSetRegistry::load(&settings.registry_path)?;
            let name: DatasetName = name.parse()?;
            registry.track(&name, alias);
            registry.save(&settings.registry_path)?;
            tracing::info!(dataset = %name, path = %settings.registry_path, "registry updated");
            Ok(())
        }
        RegistryCommand::Show { reference_dir } => {
            let reference_root = Utf8PathBuf::from(reference_dir);
            let settings = SettingsLoader::resolve(config, &reference_root)?;
            let registry = UpdateSetRegistry::load(&settings.registry_path)?;
            let json = serde_json::to_string_pretty(&registry).into_diagnostic()?;
            println!("{json}");
            Ok(())
        }
    }
}

fn print_update_summary(report: &UpdateReport) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}typing-refs summary ({}){reset}", report.today);
    println!("{yellow}Errors: {}{reset}", report.failures());

    for item in &report.items {
        let color = match item.outcome {
            Outcome::Cached | Outcome::UpToDate => green,
            Outcome::Committed => cyan,
            Outcome::RolledBack => yellow,
            Outcome::Failed => red,
        };
        let outcome = serde_json::to_value(item.outcome)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default();
        println!("{color}* {} {} ({outcome}){reset}", item.kind, item.dataset);
        match &item.selection {
            Selection::Folder(path) => println!("{color}    folder: {path}{reset}"),
            Selection::NoDataAvailable => println!("{red}    no data available{reset}"),
        }
        if let Some(command) = &item.command {
            println!("{color}    command: {command}{reset}");
        }
        if let Some(message) = &item.message {
            println!("{color}    {message}{reset}");
        }
    }
}
