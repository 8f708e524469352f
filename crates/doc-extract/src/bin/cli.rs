//! doc-extract command line
//!
//! Run with: cargo run -p doc-extract -- run --file-list files.txt --schema schema.json

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use doc_extract::config::{ExtractionBackend, SourceKind};
use doc_extract::providers::{DirectorySource, SourceLister};
use doc_extract::sink::{collect_csv_files, merge_results};
use doc_extract::{
    build_pipeline, Credentials, DocumentReference, ItemReport, ItemState, PipelineConfig,
    RunObserver, RunSummary,
};

/// Rows shown in the final summary
const PREVIEW_ROWS: usize = 5;

#[derive(Parser)]
#[command(
    name = "doc-extract",
    version,
    about = "Extract schema-shaped records from batches of documents into CSV"
)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "DOC_EXTRACT_CONFIG")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process every listed document
    Run(RunArgs),
    /// Write a file list of documents found under a directory
    List(ListArgs),
    /// Combine result files into one, dropping duplicate rows
    Merge(MergeArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Landing,
    Openai,
}

#[derive(Args)]
struct RunArgs {
    /// JSON schema of the extracted records
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Output CSV file (appended to if it exists)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Newline-delimited list of files to process
    #[arg(long, conflicts_with_all = ["dir", "drive_folder"])]
    file_list: Option<PathBuf>,

    /// Directory to scan for documents
    #[arg(long, conflicts_with = "drive_folder")]
    dir: Option<PathBuf>,

    /// Google Drive folder to process
    #[arg(long)]
    drive_folder: Option<String>,

    /// Google Drive folder receiving processed files
    #[arg(long)]
    done_folder: Option<String>,

    /// Documents prepared concurrently
    #[arg(long)]
    parallel: Option<usize>,

    /// Extraction backend
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,

    /// Disable the progress bar
    #[arg(long)]
    no_progress: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(schema) = &self.schema {
            config.extraction.schema_path = schema.clone();
        }
        if let Some(output) = &self.output {
            config.output.path = Some(output.clone());
        }
        if let Some(list) = &self.file_list {
            config.source.kind = SourceKind::FileList;
            config.source.file_list = Some(list.clone());
        }
        if let Some(dir) = &self.dir {
            config.source.kind = SourceKind::Directory;
            config.source.directory = Some(dir.clone());
        }
        if let Some(folder) = &self.drive_folder {
            config.source.kind = SourceKind::Drive;
            config.source.drive.folder_id = Some(folder.clone());
        }
        if let Some(folder) = &self.done_folder {
            config.source.drive.done_folder_id = Some(folder.clone());
        }
        if let Some(parallel) = self.parallel {
            config.processing.parallel_items = parallel;
        }
        if let Some(backend) = self.backend {
            config.extraction.backend = match backend {
                BackendArg::Landing => ExtractionBackend::Landing,
                BackendArg::Openai => ExtractionBackend::OpenAi,
            };
        }
    }
}

#[derive(Args)]
struct ListArgs {
    /// Directory to scan recursively
    dir: PathBuf,

    /// Extension to include, repeatable (default: the configured extensions)
    #[arg(short, long = "ext")]
    extensions: Vec<String>,

    /// Directory for the generated file list
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

#[derive(Args)]
struct MergeArgs {
    /// Directory holding result CSV files
    dir: PathBuf,

    /// Combined output file
    #[arg(short, long)]
    output: PathBuf,
}

/// Progress bar fed by the driver
struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    fn new(enabled: bool) -> Self {
        let bar = if enabled {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        let template = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";
        if let Ok(progress_style) = ProgressStyle::default_bar().template(template) {
            bar.set_style(progress_style.progress_chars("#>-"));
        }
        Self { bar }
    }
}

impl RunObserver for ProgressObserver {
    fn on_listed(&self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn on_state(&self, _position: usize, _total: usize, reference: &DocumentReference, state: ItemState) {
        self.bar.set_message(format!("{} ({})", reference.name, state));
    }

    fn on_item(&self, _position: usize, _total: usize, report: &ItemReport) {
        let mark = if report.succeeded() { "ok" } else { "skipped" };
        self.bar.set_message(format!("{} ({})", report.name, mark));
        self.bar.inc(1);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "doc_extract=info",
        1 => "doc_extract=debug",
        _ => "doc_extract=trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Command::Run(args) => run(config, args).await,
        Command::List(args) => list(config, args).await,
        Command::Merge(args) => merge(args),
    }
}

async fn run(mut config: PipelineConfig, args: RunArgs) -> anyhow::Result<()> {
    args.apply(&mut config);
    let credentials = Credentials::from_env();
    tracing::debug!("Credentials: {:?}", credentials);

    let (driver, mut sink) = build_pipeline(&config, &credentials)?;
    let observer = ProgressObserver::new(!args.no_progress);

    let shutdown = interrupted_by(tokio::signal::ctrl_c());
    let result = driver.run_until(&mut sink, &observer, shutdown).await;
    observer.bar.finish_and_clear();
    let summary = result?;

    print_summary(&summary);
    Ok(())
}

/// Resolves when `signal` fires; never resolves if the handler cannot be installed
async fn interrupted_by<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => tracing::warn!("Interrupt received, stopping after the current document"),
        Err(e) => {
            tracing::warn!("Cannot listen for Ctrl-C ({}); the run cannot be interrupted", e);
            std::future::pending::<()>().await;
        }
    }
}

fn print_summary(summary: &RunSummary) {
    if summary.listed() == 0 {
        println!("{}", style("Nothing to do: no documents listed").yellow());
        return;
    }

    println!();
    println!("{}", style("Run summary").bold().underlined());
    println!("  Listed:     {}", summary.listed());
    println!("  Attempted:  {}", summary.attempted());
    println!("  Succeeded:  {}", style(summary.succeeded()).green());
    println!("  Failed:     {}", style(summary.failed()).red());
    if summary.completion_failures() > 0 {
        println!(
            "  Not marked done: {}",
            style(summary.completion_failures()).yellow()
        );
    }
    if let Some(destination) = summary.destination() {
        println!("  Output:     {}", style(destination).cyan());
    }
    if summary.interrupted() {
        println!("  {}", style("Interrupted before all documents were attempted").yellow());
    }

    let preview: Vec<&ItemReport> = summary.successes().take(PREVIEW_ROWS).collect();
    if !preview.is_empty() {
        println!();
        println!("{}", style("First rows").bold());
        for report in preview {
            println!(
                "  {}  {}",
                style(&report.id).dim(),
                report.record_json.as_deref().unwrap_or_default()
            );
        }
    }

    let failures: Vec<&ItemReport> = summary.failures().collect();
    if !failures.is_empty() {
        println!();
        println!("{}", style("Failures").bold().red());
        for report in failures {
            if let Some(failure) = &report.failure {
                println!("  {}  {}", style(&report.id).dim(), failure);
            }
        }
    }

    for report in summary.items() {
        if let Some(warning) = &report.completion_warning {
            println!("  {} {}  {}", style("warning:").yellow(), report.id, warning);
        }
    }
}

async fn list(config: PipelineConfig, args: ListArgs) -> anyhow::Result<()> {
    let root = args
        .dir
        .canonicalize()
        .with_context(|| format!("Cannot open {}", args.dir.display()))?;
    let extensions = if args.extensions.is_empty() {
        config.source.extensions.clone()
    } else {
        args.extensions.clone()
    };

    let references = DirectorySource::new(root, &extensions).list().await?;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = args.output_dir.join(format!("file_list_{}.txt", timestamp));
    let mut body = String::new();
    for reference in &references {
        body.push_str(&reference.id);
        body.push('\n');
    }
    std::fs::write(&path, body).with_context(|| format!("Cannot write {}", path.display()))?;

    println!(
        "Listed {} file(s) into {}",
        style(references.len()).green(),
        style(path.display()).cyan()
    );
    Ok(())
}

fn merge(args: MergeArgs) -> anyhow::Result<()> {
    let inputs = collect_csv_files(&args.dir)?;
    let report = merge_results(&inputs, &args.output)?;

    println!(
        "Merged {} file(s) into {}: {} rows, {} duplicates dropped",
        report.files_merged,
        style(args.output.display()).cyan(),
        style(report.rows_written).green(),
        report.duplicates_dropped()
    );
    for skipped in &report.files_skipped {
        println!("  {} {}", style("skipped:").yellow(), skipped.display());
    }
    Ok(())
}
