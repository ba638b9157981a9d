use anyhow::{anyhow, bail, Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use trialmap_anchors::AnchorExtractor;
use trialmap_ingest::{
    ArtifactStore, Campaign, DocumentArtifacts, IngestConfig, IngestRequest, Ingestor,
    MemoryStore,
};
use trialmap_protocol::{
    serialize_json_pretty, IngestionRun, ParsedDocument, ARTIFACT_SCHEMA_VERSION,
};
use trialmap_zones::ZoneClassifier;

mod input;
mod report;

use input::{artifact_path, load_config, read_document};

#[derive(Parser)]
#[command(name = "trialmap")]
#[command(about = "Map clinical trial documents onto their target section outline", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Rules directory laid out like the bundled `rules/` tree
    #[arg(long, global = true)]
    rules_dir: Option<PathBuf>,

    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest parsed documents and report one run per document
    Ingest(IngestArgs),

    /// Align two versions of a document and print the anchor diff
    Diff(DiffArgs),

    /// Show the zone assigned to every anchor of a document
    Classify(ClassifyArgs),

    /// Print the configuration hash and the digest of every rule source
    #[command(name = "config-hash")]
    ConfigHash,

    /// Print the JSON schema of the parsed document input
    Schema,
}

#[derive(Args)]
struct IngestArgs {
    /// Parsed document files (JSON)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Previous version to ingest first and align every document against
    #[arg(long)]
    prior: Option<PathBuf>,

    /// Documents ingested in parallel (defaults to TRIALMAP_CAMPAIGN_CONCURRENCY)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Write the artifacts of every completed run here
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Args)]
struct DiffArgs {
    /// Previous version (JSON)
    prev: PathBuf,

    /// Current version (JSON)
    curr: PathBuf,
}

#[derive(Args)]
struct ClassifyArgs {
    /// Parsed document file (JSON)
    file: PathBuf,
}

/// On-disk layout of `--output-dir` files.
#[derive(Serialize)]
struct ArtifactFile<'a> {
    schema_version: u32,
    #[serde(flatten)]
    artifacts: &'a DocumentArtifacts,
}

#[derive(Serialize)]
struct SourceOutput<'a> {
    name: &'a str,
    digest: &'a str,
}

#[derive(Serialize)]
struct ConfigHashOutput<'a> {
    config_hash: String,
    sources: Vec<SourceOutput<'a>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet || cli.json {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let rules_dir = cli.rules_dir.as_deref();
    match cli.command {
        Commands::Ingest(args) => run_ingest(args, rules_dir, cli.json).await?,
        Commands::Diff(args) => run_diff(args, rules_dir, cli.json).await?,
        Commands::Classify(args) => run_classify(args, rules_dir, cli.json)?,
        Commands::ConfigHash => run_config_hash(rules_dir, cli.json)?,
        Commands::Schema => print_json(&schemars::schema_for!(ParsedDocument))?,
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serialize_json_pretty(value)?);
    Ok(())
}

fn build_ingestor(rules_dir: Option<&Path>) -> Result<Arc<Ingestor>> {
    let config = load_config(rules_dir)?;
    let ingestor = Ingestor::new(config, Arc::new(MemoryStore::new()))?;
    log::debug!("config hash {}", ingestor.config_hash());
    Ok(Arc::new(ingestor))
}

async fn run_ingest(args: IngestArgs, rules_dir: Option<&Path>, json: bool) -> Result<()> {
    let ingestor = build_ingestor(rules_dir)?;

    let mut runs: Vec<IngestionRun> = Vec::new();
    let prior_id = match &args.prior {
        Some(path) => {
            let doc = read_document(path)?;
            let id = doc.doc_version_id.clone();
            let run = ingestor.ingest(IngestRequest::new(doc)).await;
            if !run.is_completed() {
                bail!("Prior version {} failed: {}", id, run.errors.join("; "));
            }
            runs.push(run);
            Some(id)
        }
        None => None,
    };

    let mut requests = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let mut request = IngestRequest::new(read_document(path)?);
        if let Some(prior) = &prior_id {
            request = request.with_prior_version(prior.clone());
        }
        requests.push(request);
    }

    let mut campaign = Campaign::new(Arc::clone(&ingestor));
    if let Some(concurrency) = args.concurrency {
        campaign = campaign.with_concurrency(concurrency);
    }
    let report = campaign.run(requests).await;
    let failed = report.failed();
    runs.extend(report.runs);

    if let Some(dir) = &args.output_dir {
        write_artifacts(ingestor.store().as_ref(), dir, &runs).await?;
    }

    if json {
        print_json(&runs)?;
    } else {
        for run in &runs {
            println!("{}", report::run_summary(run));
            for warning in &run.warnings {
                eprintln!("  warning: {warning}");
            }
        }
    }

    if failed > 0 {
        return Err(anyhow!("{failed} of {} documents failed", args.files.len()));
    }
    Ok(())
}

async fn write_artifacts(store: &dyn ArtifactStore, dir: &Path, runs: &[IngestionRun]) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    for run in runs.iter().filter(|r| r.is_completed()) {
        let Some(artifacts) = store.load_version(&run.doc_version_id).await? else {
            continue;
        };
        let path = artifact_path(dir, &run.doc_version_id);
        let body = serialize_json_pretty(&ArtifactFile {
            schema_version: ARTIFACT_SCHEMA_VERSION,
            artifacts: &artifacts,
        })?;
        fs::write(&path, body).with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("wrote {}", path.display());
    }
    Ok(())
}

async fn run_diff(args: DiffArgs, rules_dir: Option<&Path>, json: bool) -> Result<()> {
    let prev = read_document(&args.prev)?;
    let curr = read_document(&args.curr)?;
    let prev_id = prev.doc_version_id.clone();
    let curr_id = curr.doc_version_id.clone();
    if prev_id == curr_id {
        bail!("Both files carry doc_version_id {prev_id}");
    }

    let ingestor = build_ingestor(rules_dir)?;
    for run in [
        ingestor.ingest(IngestRequest::new(prev)).await,
        ingestor
            .ingest(IngestRequest::new(curr).with_prior_version(prev_id))
            .await,
    ] {
        if !run.is_completed() {
            bail!("{} failed: {}", run.doc_version_id, run.errors.join("; "));
        }
    }

    let alignment = ingestor
        .store()
        .load_version(&curr_id)
        .await?
        .and_then(|artifacts| artifacts.alignment)
        .ok_or_else(|| anyhow!("No alignment recorded for {curr_id}"))?;

    if json {
        print_json(&alignment)?;
    } else {
        for line in report::alignment_lines(&alignment) {
            println!("{line}");
        }
    }
    Ok(())
}

fn run_classify(args: ClassifyArgs, rules_dir: Option<&Path>, json: bool) -> Result<()> {
    let config: IngestConfig = load_config(rules_dir)?;
    let doc = read_document(&args.file)?;
    let mut anchors = AnchorExtractor::new()
        .extract(&doc)
        .with_context(|| format!("Failed to extract anchors from {}", args.file.display()))?;
    let classifier = ZoneClassifier::for_document(&config.zones, doc.document_type);
    let classified = classifier.classify_all(&mut anchors);
    log::info!("{classified} of {} anchors classified", anchors.len());

    if json {
        print_json(&anchors)?;
    } else {
        for line in report::classification_lines(&anchors) {
            println!("{line}");
        }
    }
    Ok(())
}

fn run_config_hash(rules_dir: Option<&Path>, json: bool) -> Result<()> {
    let config = load_config(rules_dir)?;
    let sources = config.sources();
    let output = ConfigHashOutput {
        config_hash: config.config_hash(),
        sources: sources
            .iter()
            .map(|s| SourceOutput {
                name: &s.name,
                digest: &s.digest,
            })
            .collect(),
    };

    if json {
        print_json(&output)?;
    } else {
        println!("{}", output.config_hash);
        for source in &output.sources {
            println!("  {:<10} {}", source.name, source.digest);
        }
    }
    Ok(())
}
