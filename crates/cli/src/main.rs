use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use knowledge_corpus::{EntityKind, MemoryRepository, Repository};
use knowledge_query::{QueryUnderstandingEngine, UnderstandingConfig};
use knowledge_search::{
    FusionMethod, HybridConfig, HybridSearch, Predicate, SearchRequest, SearchResults, DEFAULT_K,
};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod provider;

#[derive(Parser)]
#[command(name = "knowledge")]
#[command(about = "Hybrid vector, lexical and metadata search over a knowledge corpus", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// Hybrid search configuration (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Query understanding tables (TOML)
    #[arg(long, global = true)]
    query_config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed every record and persist the vectors into the corpus file
    Index(IndexArgs),
    /// Run a hybrid search
    Search(SearchArgs),
    /// Understand a natural-language query, then search with its strategy
    Ask(AskArgs),
    /// Show intent, entities, expansions and strategy for a query
    Understand(UnderstandArgs),
    /// Find records similar to an existing one
    Similar(SimilarArgs),
    /// Print index and corpus statistics
    Stats(StatsArgs),
}

#[derive(Args)]
struct IndexArgs {
    /// Corpus file (JSON)
    #[arg(long)]
    corpus: PathBuf,
}

#[derive(Args)]
struct SearchArgs {
    /// Search query
    query: String,

    /// Corpus file (JSON)
    #[arg(long)]
    corpus: PathBuf,

    /// Maximum number of results
    #[arg(short, long, default_value_t = DEFAULT_K)]
    k: usize,

    /// Restrict to entity kinds: profile, snippet, document
    #[arg(long = "kind")]
    kinds: Vec<EntityKind>,

    /// Attribute predicate, e.g. `is_verified=true` or `confidence>=0.8`
    #[arg(long = "filter")]
    filters: Vec<Predicate>,

    /// Include facet counts
    #[arg(long)]
    facets: bool,

    /// Facet fields (defaults per entity kind)
    #[arg(long = "facet-field")]
    facet_fields: Vec<String>,

    /// Fusion method: weighted_sum, rrf, max_score
    #[arg(long)]
    fusion: Option<FusionMethod>,

    /// Include per-method score breakdown
    #[arg(long)]
    scores: bool,
}

#[derive(Args)]
struct AskArgs {
    /// Natural-language query
    query: String,

    /// Corpus file (JSON)
    #[arg(long)]
    corpus: PathBuf,

    /// Session id; the turn is recorded in its history
    #[arg(long)]
    session: Option<String>,

    /// Override the strategy's result count
    #[arg(short, long)]
    k: Option<usize>,

    /// Append expansion terms to the search text
    #[arg(long)]
    expand: bool,
}

#[derive(Args)]
struct UnderstandArgs {
    /// Natural-language query
    query: String,

    /// Session id; the turn is recorded in its history
    #[arg(long)]
    session: Option<String>,
}

#[derive(Args)]
struct SimilarArgs {
    /// Entity kind of the target record
    kind: EntityKind,

    /// Id of the target record
    id: i64,

    /// Corpus file (JSON)
    #[arg(long)]
    corpus: PathBuf,

    /// Maximum number of results
    #[arg(short, long, default_value_t = DEFAULT_K)]
    k: usize,
}

#[derive(Args)]
struct StatsArgs {
    /// Corpus file (JSON)
    #[arg(long)]
    corpus: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = cli.config.as_deref();
    let query_config = cli.query_config.as_deref();
    match cli.command {
        Commands::Index(args) => run_index(args, config).await?,
        Commands::Search(args) => run_search(args, config).await?,
        Commands::Ask(args) => run_ask(args, config, query_config).await?,
        Commands::Understand(args) => run_understand(args, query_config).await?,
        Commands::Similar(args) => run_similar(args, config).await?,
        Commands::Stats(args) => run_stats(args, config).await?,
    }

    Ok(())
}

async fn run_index(args: IndexArgs, config: Option<&Path>) -> Result<()> {
    let (repository, search) = open_search(config, &args.corpus).await?;
    let report = search
        .rebuild_index()
        .await
        .context("Failed to rebuild the vector index")?;
    repository
        .save(&args.corpus)
        .await
        .with_context(|| format!("Failed to save corpus {}", args.corpus.display()))?;
    log::info!(
        "Indexed {} records ({} failed) into {}",
        report.loaded,
        report.kinds.values().map(|kind| kind.failed).sum::<usize>(),
        args.corpus.display()
    );
    print_json(&report)
}

async fn run_search(args: SearchArgs, config: Option<&Path>) -> Result<()> {
    let (_, search) = open_search(config, &args.corpus).await?;
    load_index(&search).await?;

    let mut request = SearchRequest::new(args.query)
        .with_k(args.k)
        .with_kinds(args.kinds)
        .with_filters(args.filters)
        .include_scores(args.scores);
    if args.facets || !args.facet_fields.is_empty() {
        request = request.with_facets(args.facet_fields);
    }
    if let Some(fusion) = args.fusion {
        request = request.with_fusion(fusion);
    }

    let results = search.hybrid_search(&request).await.context("Search failed")?;
    warn_degraded(&results);
    print_json(&results)
}

async fn run_ask(args: AskArgs, config: Option<&Path>, query_config: Option<&Path>) -> Result<()> {
    let engine = open_understanding(query_config).await?;
    let understanding = engine
        .understand(&args.query, args.session.as_deref(), args.session.is_some())
        .context("Failed to understand query")?;

    let (_, search) = open_search(config, &args.corpus).await?;
    load_index(&search).await?;

    let mut request = understanding
        .strategy
        .to_request(&understanding.normalized_query, args.expand);
    if let Some(k) = args.k {
        request = request.with_k(k);
    }
    let results = search.hybrid_search(&request).await.context("Search failed")?;
    warn_degraded(&results);
    print_json(&json!({
        "understanding": understanding,
        "results": results,
    }))
}

async fn run_understand(args: UnderstandArgs, query_config: Option<&Path>) -> Result<()> {
    let engine = open_understanding(query_config).await?;
    let understanding = engine
        .understand(&args.query, args.session.as_deref(), args.session.is_some())
        .context("Failed to understand query")?;
    print_json(&understanding)
}

async fn run_similar(args: SimilarArgs, config: Option<&Path>) -> Result<()> {
    let (_, search) = open_search(config, &args.corpus).await?;
    load_index(&search).await?;
    let results = search
        .find_similar(args.kind, args.id, args.k)
        .await
        .with_context(|| format!("Similarity search for {}:{} failed", args.kind, args.id))?;
    warn_degraded(&results);
    print_json(&results)
}

async fn run_stats(args: StatsArgs, config: Option<&Path>) -> Result<()> {
    let (_, search) = open_search(config, &args.corpus).await?;
    load_index(&search).await?;
    let stats = search
        .get_statistics()
        .await
        .context("Failed to collect statistics")?;
    print_json(&stats)
}

async fn open_search(
    config: Option<&Path>,
    corpus: &Path,
) -> Result<(Arc<MemoryRepository>, HybridSearch)> {
    let config = match config {
        Some(path) => HybridConfig::load(path)
            .await
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => HybridConfig::default(),
    };
    let repository = Arc::new(
        MemoryRepository::load(corpus)
            .await
            .with_context(|| format!("Failed to load corpus {}", corpus.display()))?,
    );
    let provider = provider::from_env(&config.embedding)?;
    let shared: Arc<dyn Repository> = repository.clone();
    let search =
        HybridSearch::new(config, shared, provider).context("Failed to initialize hybrid search")?;
    Ok((repository, search))
}

async fn open_understanding(path: Option<&Path>) -> Result<QueryUnderstandingEngine> {
    let config = match path {
        Some(path) => UnderstandingConfig::load(path)
            .await
            .with_context(|| format!("Failed to load query config {}", path.display()))?,
        None => UnderstandingConfig::default(),
    };
    QueryUnderstandingEngine::new(config).context("Failed to initialize query understanding")
}

async fn load_index(search: &HybridSearch) -> Result<()> {
    let summary = search
        .load_index()
        .await
        .context("Failed to load persisted embeddings")?;
    if summary.loaded == 0 {
        log::warn!("No embeddings for this model; run `knowledge index` first for vector search");
    } else {
        log::debug!(
            "Loaded {} embeddings ({} skipped)",
            summary.loaded,
            summary.skipped
        );
    }
    Ok(())
}

fn warn_degraded(results: &SearchResults) {
    for method in &results.degraded_methods {
        log::warn!("{method} search degraded; results may be incomplete");
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
