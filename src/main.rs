use anyhow::Context;
use clap::Parser;
use parking_lot::Mutex;
use relink::{
    load_settings, load_training, save_settings, save_training, training_pairs_from_identifier,
    ConsoleLabeler, Dataset, LabelQuery, LabelResponse, Labeler, Linker, LinkerConfig,
    SimilaritySchema, StaticLinker, Trainer, TrainingPool,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Link or deduplicate collections of records
#[derive(Parser, Debug)]
#[command(name = "relink")]
#[command(about = "Record linkage and deduplication with active learning", long_about = None)]
struct Args {
    /// JSON object of record key to record (the only collection when deduplicating)
    #[arg(long)]
    left: PathBuf,

    /// Second collection; switches from deduplication to linkage
    #[arg(long)]
    right: Option<PathBuf>,

    /// JSON list of field definitions
    #[arg(long)]
    fields: PathBuf,

    /// JSON linker configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Trained settings; training is skipped when this file exists
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Labeled pairs, read before training and written after it
    #[arg(long)]
    training: Option<PathBuf>,

    /// Field holding a shared identifier to derive training pairs from
    #[arg(long)]
    identifier: Option<String>,

    /// Distinct pairs to sample when deriving pairs from an identifier
    #[arg(long, default_value_t = 1000)]
    identifier_distinct: usize,

    /// How much more recall counts than precision
    #[arg(long)]
    recall_weight: Option<f64>,

    /// Where to write clusters as JSON (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Ask for labels on the console
    #[arg(short, long)]
    interactive: bool,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Adds every label given through the inner labeler to a shared pool.
struct RecordingLabeler<L> {
    inner: L,
    pool: Arc<Mutex<TrainingPool>>,
}

impl<L: Labeler> Labeler for RecordingLabeler<L> {
    fn label(&mut self, query: &LabelQuery<'_>) -> LabelResponse {
        let response = self.inner.label(query);
        if let Some(label) = response.label() {
            self.pool.lock().insert(query.pair.clone(), label);
        }
        response
    }
}

#[derive(Serialize)]
struct ClusterOutput<'a> {
    cluster_id: usize,
    records: Vec<&'a relink::RecordId>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting relink v{}", env!("CARGO_PKG_VERSION"));

    let schema = SimilaritySchema::from_json(&read(&args.fields)?)?;
    let mut config = match &args.config {
        Some(path) => LinkerConfig::from_json(&read(path)?)?,
        None => LinkerConfig::default(),
    };
    if let Some(weight) = args.recall_weight {
        config.recall_weight = weight;
    }
    config.validate()?;

    let left = json(&args.left)?;
    let right = args.right.as_deref().map(json).transpose()?;
    let data = Arc::new(Dataset::from_json(&left, right.as_ref())?);
    info!(
        records = data.len(),
        linkage = data.is_linkage(),
        "data loaded"
    );

    let saved = match &args.settings {
        Some(path) => load_settings(path)?,
        None => None,
    };
    let linker = match saved {
        Some(settings) => {
            info!("settings found, skipping training");
            let linker = StaticLinker::from_settings(schema, settings, &config)?;
            if args.recall_weight.is_some() && linker.threshold().is_some() {
                info!(
                    recall_weight = config.recall_weight,
                    "recall weight given, re-estimating the saved threshold"
                );
                linker.estimating()
            } else {
                linker
            }
        }
        None => train(&args, schema, config, data.clone()).await?,
    };

    let run = linker.run(&data)?;
    info!(
        threshold = run.selection.threshold,
        source = %run.selection.source,
        "clustering at threshold"
    );
    if tracing::enabled!(Level::DEBUG) {
        for sp in run.scored.iter().filter(|sp| sp.score >= run.selection.threshold) {
            let explained = linker.explain(&data, &sp.pair)?;
            debug!(
                pair = %sp.pair,
                score = sp.score,
                top_field = explained.top_contributing_field().unwrap_or("-"),
                "pair above threshold"
            );
        }
    }
    let clusters: Vec<ClusterOutput<'_>> = run
        .partition
        .iter()
        .enumerate()
        .map(|(cluster_id, cluster)| ClusterOutput {
            cluster_id,
            records: cluster.iter().collect(),
        })
        .collect();
    let rendered = serde_json::to_string_pretty(&clusters)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, rendered).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), clusters = clusters.len(), "clusters written");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

async fn train(
    args: &Args,
    schema: SimilaritySchema,
    config: LinkerConfig,
    data: Arc<Dataset>,
) -> anyhow::Result<StaticLinker> {
    let linker = Linker::new(schema, config)?;

    let mut seeds = TrainingPool::new();
    if let Some(path) = &args.training {
        if let Some(pool) = load_training(path, &data)? {
            seeds.extend(&pool);
        }
    }
    if let Some(field) = &args.identifier {
        let derived =
            training_pairs_from_identifier(&data, field, args.identifier_distinct, linker.config().seed)?;
        seeds.extend(&derived);
    }

    let pool = if args.interactive {
        label_interactively(&linker, data.clone(), seeds).await?
    } else {
        seeds
    };

    if let Some(path) = &args.training {
        save_training(path, &pool, &data)?;
    }
    let model = linker.fit(&data, &pool)?;
    if let Some(path) = &args.settings {
        save_settings(path, &model.settings()?)?;
    }
    Ok(model.into_static()?)
}

/// Run the console labeling loop until it finishes or Ctrl-C arrives.
///
/// Either way the labels given so far are returned.
async fn label_interactively(
    linker: &Linker,
    data: Arc<Dataset>,
    seeds: TrainingPool,
) -> anyhow::Result<TrainingPool> {
    let pool = Arc::new(Mutex::new(seeds.clone()));
    let (tx, rx) = tokio::sync::oneshot::channel();

    // Detached so a prompt blocked on stdin cannot hold up shutdown.
    let worker_linker = linker.clone();
    let worker_pool = pool.clone();
    std::thread::spawn(move || {
        let result = worker_linker
            .prepare(&data)
            .and_then(|session| session.seed(&seeds))
            .and_then(|session| {
                let mut labeler = RecordingLabeler {
                    inner: ConsoleLabeler::stdio(),
                    pool: worker_pool,
                };
                Trainer::train(session, &mut labeler).map(|_| ())
            });
        let _ = tx.send(result);
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, keeping the labels given so far");
        }
        result = rx => {
            result.context("labeling thread stopped unexpectedly")??;
        }
    }

    let labeled = pool.lock().clone();
    Ok(labeled)
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn json(path: &Path) -> anyhow::Result<serde_json::Value> {
    serde_json::from_str(&read(path)?).with_context(|| format!("parsing {}", path.display()))
}
