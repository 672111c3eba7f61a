use anyhow::{bail, Context, Result};
use clap::Parser;
use ilias_inventory::analyzer::git_remotes::{GitRemoteInspector, DEFAULT_GIT_TIMEOUT};
use ilias_inventory::analyzer::InstallationFinder;
use ilias_inventory::config::{IniSelections, DEFAULT_EXCLUDED_FOLDERS};
use ilias_inventory::inventory::aggregator::InstallationAggregator;
use ilias_inventory::inventory::json_writer::JsonWriter;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_OUTPUT_FILE: &str = "ilinfo.json";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "ilinfo")]
#[command(about = "Inventory ILIAS installations, their clients, plugins and git remotes")]
struct Cli {
    /// Directory to search for installations
    #[arg(default_value = "/")]
    start_path: PathBuf,

    /// Output file for the JSON report; a directory gets ilinfo.json inside it
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip every directory whose path contains this text (repeatable)
    #[arg(short, long = "exclude", value_name = "SUBSTR")]
    excludes: Vec<String>,

    /// Do not apply the built-in list of backup, dump and system folders
    #[arg(long)]
    no_default_excludes: bool,

    /// JSON file overriding which INI sections and options are read
    #[arg(short, long, value_name = "FILE")]
    mapping: Option<PathBuf>,

    /// Seconds to wait for each `git remote -v`
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_GIT_TIMEOUT.as_secs())]
    git_timeout: u64,

    /// Write the report on a single line
    #[arg(long)]
    compact: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if !cli.start_path.is_dir() {
        bail!("Start path is not a directory: {}", cli.start_path.display());
    }

    let selections = match &cli.mapping {
        Some(path) => load_selections(path)?,
        None => IniSelections::default(),
    };

    let mut excludes: Vec<String> = Vec::new();
    if !cli.no_default_excludes {
        excludes.extend(DEFAULT_EXCLUDED_FOLDERS.iter().map(|s| s.to_string()));
    }
    excludes.extend(cli.excludes.iter().cloned());

    // Discover installations and plugins
    let mut finder = InstallationFinder::new();
    let found = finder.scan(&cli.start_path, &excludes);
    info!("Found {} installations below {}", found, cli.start_path.display());

    let inspector = GitRemoteInspector::new().with_timeout(Duration::from_secs(cli.git_timeout));
    let mut aggregator = InstallationAggregator::with_remote_source(inspector).with_selections(selections);
    let inventory = aggregator.process_discovered(finder);

    let output_path = resolve_output_path(cli.output.as_deref());
    let file = File::create(&output_path)
        .with_context(|| format!("Failed to create output file: {}", output_path.display()))?;
    let mut buf_writer = BufWriter::new(file);
    let writer = if cli.compact {
        JsonWriter::new().compact()
    } else {
        JsonWriter::new()
    };
    writer
        .write(&inventory, &mut buf_writer)
        .with_context(|| format!("Failed to write report: {}", output_path.display()))?;

    println!("JSON result file was created at: {}", output_path.display());
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_selections(path: &Path) -> Result<IniSelections> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read mapping file: {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Mapping file is not valid JSON: {}", path.display()))?;
    Ok(IniSelections::from_json(&value)?)
}

fn resolve_output_path(output: Option<&Path>) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path.join(DEFAULT_OUTPUT_FILE),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(DEFAULT_OUTPUT_FILE),
    }
}
