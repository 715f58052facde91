//! period-corpus CLI
//!
//! Loads volume files, buckets them into periods and prints or writes the
//! per-period results as JSON, CSV and text reports.

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use period_corpus::{
    cluster::results::write_groups,
    persist::write_snapshot,
    source::{load_dir, load_json_lines, FieldSelector},
    vectorizer::score::write_similarity_csv,
    ActiveMatrix, AnalysisConfig, AnalysisError, AnalysisSession, AuthorCluster, ClusterCount,
    ClusterResult, FrequencyRecord, HierarchicalOutcome, KeyStats, LinkageMethod, NGram, PeriodIndex,
    PeriodMap, Result, ScoreSource, StopWords,
};

#[derive(Parser)]
#[command(name = "period-corpus")]
#[command(version)]
#[command(about = "Period-partitioned corpus statistics, TF-IDF and author clustering")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Input {
    /// Directory of JSON volume files
    #[arg(long, conflicts_with = "jsonl")]
    docs: Option<PathBuf>,
    /// JSON lines file, one record per line
    #[arg(long)]
    jsonl: Option<PathBuf>,
    /// Period boundaries, e.g. 1800,1850,1900
    #[arg(long, value_delimiter = ',', required = true)]
    periods: Vec<i32>,
    /// Analysis config (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Stop-word file in the {"Words": [...]} layout
    #[arg(long)]
    stop_words: Option<PathBuf>,
    /// Record field holding the tokens
    #[arg(long, default_value = "Text")]
    text_field: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum Statistic {
    Global,
    Average,
    Variance,
}

#[derive(Subcommand)]
enum Commands {
    /// Keyword frequency per period
    Frequency {
        #[command(flatten)]
        input: Input,
        /// Keywords; all must have the same number of tokens
        #[arg(long, num_args = 1.., required = true)]
        keys: Vec<NGram>,
        #[arg(long, value_enum, default_value = "global")]
        stat: Statistic,
        /// Also save the frequency record
        #[arg(long)]
        save_record: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Keyword frequency from a saved frequency record
    Record {
        #[arg(long)]
        record: PathBuf,
        #[arg(long, num_args = 1.., required = true)]
        keys: Vec<NGram>,
        #[arg(long, value_enum, default_value = "global")]
        stat: Statistic,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Keyword counts of every document, or 0/1 presence with --binary
    Raw {
        #[command(flatten)]
        input: Input,
        #[arg(long, num_args = 1.., required = true)]
        keys: Vec<NGram>,
        #[arg(long)]
        binary: bool,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Most frequent n-grams per period
    TopWords {
        #[command(flatten)]
        input: Input,
        #[arg(short, long, default_value_t = 10)]
        n: usize,
        #[arg(long, default_value_t = 1)]
        arity: usize,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Documents ranked by the TF-IDF weight of a keyword, per period
    TopDocs {
        #[command(flatten)]
        input: Input,
        #[arg(long)]
        keyword: NGram,
        #[arg(short, long, default_value_t = 10)]
        n: usize,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Author score matrices and clustering for every period
    Authors {
        #[command(flatten)]
        input: Input,
        #[arg(long, num_args = 1.., required = true)]
        keys: Vec<NGram>,
        #[command(flatten)]
        clustering: Clustering,
        /// Directory receiving matrices, similarities and cluster reports
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Re-cluster a saved score matrix
    Cluster {
        #[arg(long)]
        matrix: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[command(flatten)]
        clustering: Clustering,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Args)]
struct Clustering {
    /// k-means cluster count: `auto` or a positive integer
    #[arg(long, default_value = "auto")]
    clusters: ClusterCount,
    /// Use agglomerative clustering with this linkage instead of k-means
    #[arg(long)]
    linkage: Option<LinkageMethod>,
    /// Distance cut for agglomerative clustering; without it the linkage matrix is written
    #[arg(long, requires = "linkage")]
    cutoff: Option<f64>,
}

impl Input {
    fn open(&self) -> Result<AnalysisSession> {
        let mut config = load_config(self.config.as_deref())?;
        if let Some(path) = &self.stop_words {
            config = config.with_stop_words(StopWords::from_json_file(path)?);
        }
        let selector = FieldSelector::default().with_text_field(&self.text_field);
        let docs = match (&self.docs, &self.jsonl) {
            (Some(dir), _) => load_dir(dir, &selector)?,
            (None, Some(file)) => load_json_lines(file, &selector)?,
            (None, None) => {
                warn!("no --docs or --jsonl given, the corpus is empty");
                Vec::new()
            }
        };
        let mut session = AnalysisSession::new(PeriodIndex::new(self.periods.clone())?, config);
        session.ingest(docs);
        Ok(session)
    }
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(path) => AnalysisConfig::from_json_file(path),
        None => Ok(AnalysisConfig::default()),
    }
}

fn emit<T: Serialize>(value: &T, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => write_snapshot(value, path),
        None => {
            println!("{}", serde_json::to_string_pretty(value)?);
            Ok(())
        }
    }
}

fn statistic(
    stat: Statistic,
    keys: &[NGram],
    session: &mut AnalysisSession,
) -> Result<PeriodMap<KeyStats>> {
    match stat {
        Statistic::Global => session.global_frequency(keys),
        Statistic::Average => session.average_frequency(keys),
        Statistic::Variance => session.variance(keys),
    }
}

/// Clusters one period. Degenerate periods are reported and skipped.
fn cluster_period(
    active: &ActiveMatrix,
    clustering: &Clustering,
    config: &AnalysisConfig,
    out_dir: &Path,
) -> Result<Option<ClusterResult>> {
    let mut engine = AuthorCluster::new(active);
    let outcome = match clustering.linkage {
        Some(method) => match engine.hierarchical(method, clustering.cutoff)? {
            HierarchicalOutcome::Labeled(result) => Ok(result),
            HierarchicalOutcome::Uncut(linkage) => {
                let path = out_dir.join(format!("{}_linkage_{}.json", active.period, method));
                write_snapshot(&linkage, &path)?;
                info!(period = active.period, path = %path.display(), "linkage matrix written");
                return Ok(None);
            }
        },
        None => engine.kmeans(clustering.clusters, &config.kmeans),
    };
    match outcome {
        Ok(result) => Ok(Some(result)),
        Err(e @ AnalysisError::ClusteringUnavailable { .. }) => {
            warn!(period = active.period, error = %e, "period not clustered");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn run_authors(
    mut session: AnalysisSession,
    keys: &[NGram],
    clustering: &Clustering,
    out_dir: &Path,
) -> Result<()> {
    let config = session.config().clone();
    let matrices = session.score_matrices(keys)?;
    let mut results = PeriodMap::new();
    for (period, matrix) in &matrices {
        matrix.write_csv(out_dir.join(format!("{period}_scores.csv")))?;
        matrix.save(out_dir.join(format!("{period}_scores.json")))?;
        let active = matrix.partition().with_projection(config.tsne.clone());
        if active.is_empty() {
            warn!(period, "no author uses any keyword, skipping");
            continue;
        }
        write_similarity_csv(
            &active.authors,
            &active.similarity_matrix(),
            out_dir.join(format!("{period}_similarity.csv")),
        )?;
        if let Some(result) = cluster_period(&active, clustering, &config, out_dir)? {
            result.save(out_dir.join(format!("{period}_clusters.json")))?;
            results.insert(*period, result);
        }
    }
    if !results.is_empty() {
        write_groups(&results, out_dir.join("cluster_groups.txt"))?;
    }
    info!(periods = results.len(), out_dir = %out_dir.display(), "author results written");
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Frequency {
            input,
            keys,
            stat,
            save_record,
            out,
        } => {
            let mut session = input.open()?;
            let stats = statistic(stat, &keys, &mut session)?;
            if let Some(path) = save_record {
                let arity = keys.first().map_or(1, NGram::arity);
                session.frequency(arity)?.save(path)?;
            }
            emit(&stats, out.as_deref())
        }
        Commands::Record {
            record,
            keys,
            stat,
            out,
        } => {
            let mut session =
                AnalysisSession::resume(FrequencyRecord::load(record)?, AnalysisConfig::default());
            let stats = statistic(stat, &keys, &mut session)?;
            emit(&stats, out.as_deref())
        }
        Commands::Raw {
            input,
            keys,
            binary,
            out,
        } => {
            let session = input.open()?;
            emit(&session.raw_frequency(&keys, binary)?, out.as_deref())
        }
        Commands::TopWords { input, n, arity, out } => {
            let mut session = input.open()?;
            emit(&session.top_n(n, arity)?, out.as_deref())
        }
        Commands::TopDocs {
            input,
            keyword,
            n,
            out,
        } => {
            let mut session = input.open()?;
            let hits = session.top_n_for_keyword(&keyword, n)?;
            for (period, h) in &hits {
                eprintln!("{period}: {} documents contain `{keyword}`, {} ranked", h.num_docs, h.len());
            }
            emit(&hits, out.as_deref())
        }
        Commands::Authors {
            input,
            keys,
            clustering,
            out_dir,
        } => run_authors(input.open()?, &keys, &clustering, &out_dir),
        Commands::Cluster {
            matrix,
            config,
            clustering,
            out,
        } => {
            let config = load_config(config.as_deref())?;
            let matrix = ScoreSource::FromPersistedSnapshot(matrix).resolve()?;
            let active = matrix.partition().with_projection(config.tsne.clone());
            let out_dir = out.parent().unwrap_or_else(|| Path::new("."));
            match cluster_period(&active, &clustering, &config, out_dir)? {
                Some(result) => {
                    result.save(&out)?;
                    println!("{}", result.report());
                }
                None => warn!(period = active.period, "no cluster labels produced"),
            }
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "aborted");
            ExitCode::FAILURE
        }
    }
}
