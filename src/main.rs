//! reviewrag - Main CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use reviewrag::{
    cli::{Args, Commands, DisplayManager, FilterArgs, InputHandler, InputLine},
    config::Config,
    embedding::{build_embedder, EmbedderClient},
    errors::Dependency,
    ingestion::{Chunker, IndexWriter, IngestionPipeline},
    llm::build_generator,
    logging,
    rag::{AnswerOrchestrator, ContextAssembler, QueryPipeline, QueryRequest, Retriever},
    retry::RetryManager,
    store::{MetadataFilter, QdrantStore, VectorStore},
    telemetry::TelemetryCollector,
    types::PassageId,
    RagError,
};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logging::init(args.verbosity());
    let display = DisplayManager::new(args.verbosity());

    let code = match run(&args, &display).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(err) => {
            display.show_error(&format!("{:#}", err));
            2
        }
    };
    std::process::exit(code);
}

/// Ok(false) when the command ran but did not fully succeed
async fn run(args: &Args, display: &DisplayManager) -> Result<bool> {
    let config = Config::load(args.config.clone()).context("failed to load configuration")?;

    match &args.command {
        Commands::Ingest { file, limit, workers } => {
            run_ingest(&config, display, file, *limit, *workers).await
        }
        Commands::Ask {
            query,
            top_k,
            filter,
            show_sources,
        } => run_ask(&config, display, query.as_deref(), *top_k, filter, *show_sources).await,
        Commands::Delete { ids } => run_delete(&config, display, ids).await,
        Commands::Clear { yes } => run_clear(&config, display, *yes).await,
        Commands::Stats => run_stats(&config, display).await,
        Commands::Config => show_config(&config, args.config.as_deref()),
    }
}

async fn connect_store(config: &Config, retry: &RetryManager) -> Result<Arc<QdrantStore>> {
    let store = QdrantStore::connect(&config.store, config.embedding.dimension, retry)
        .await
        .with_context(|| format!("failed to open collection '{}' at {}", config.store.collection, config.store.url))?;
    Ok(Arc::new(store))
}

/// Embedder client expecting the configured dimension, or the one of the
/// existing collection
async fn embedder_client(
    config: &Config,
    retry: &RetryManager,
    store: &dyn VectorStore,
) -> Result<EmbedderClient> {
    let dimension = match config.embedding.dimension {
        Some(dimension) => Some(dimension),
        None => store.dimension().await,
    };
    let embedder = build_embedder(&config.embedding, retry)?;
    Ok(EmbedderClient::new(
        embedder,
        config.embedding.batch_size,
        dimension,
        retry.clone(),
    ))
}

async fn run_ingest(
    config: &Config,
    display: &DisplayManager,
    file: &Path,
    limit: Option<usize>,
    workers: Option<usize>,
) -> Result<bool> {
    let telemetry = TelemetryCollector::new();
    let retry = RetryManager::from_config(&config.retry).with_telemetry(telemetry.clone());

    let chunker = Chunker::new(config.chunking.max_chunk_length, config.chunking.overlap)?;
    let reader = BufReader::new(
        File::open(file).with_context(|| format!("cannot open {}", file.display()))?,
    );

    let store = connect_store(config, &retry).await?;
    let embedder = Arc::new(
        embedder_client(config, &retry, &*store)
            .await?
            .with_telemetry(telemetry.clone()),
    );
    let writer = Arc::new(
        IndexWriter::new(store.clone(), config.ingest.write_batch_size, retry.clone())
            .with_telemetry(telemetry.clone()),
    );
    let workers = workers.unwrap_or_else(|| config.ingest.effective_workers());

    let spinner = display.ingest_spinner(&file.display().to_string());
    let progress_bar = spinner.clone();
    let pipeline = IngestionPipeline::new(chunker, embedder, writer, workers)
        .with_telemetry(telemetry.clone())
        .with_progress(move |progress| DisplayManager::update_spinner(&progress_bar, progress));

    let started = Instant::now();
    let report = pipeline.ingest(reader, limit).await;
    spinner.finish_and_clear();
    let report = report.context("ingestion aborted")?;

    display.show_ingest_report(
        &report,
        &telemetry.get_stats(),
        started.elapsed().as_millis() as u64,
    );
    Ok(report.is_complete())
}

async fn run_ask(
    config: &Config,
    display: &DisplayManager,
    query: Option<&str>,
    top_k: Option<usize>,
    filter: &FilterArgs,
    show_sources: bool,
) -> Result<bool> {
    let telemetry = TelemetryCollector::new();
    let retry = RetryManager::from_config(&config.retry).with_telemetry(telemetry.clone());

    let store = connect_store(config, &retry).await?;
    let embedder = Arc::new(embedder_client(config, &retry, &*store).await?);
    let retriever = Retriever::new(store.clone(), retry.clone())
        .with_candidate_multiplier(config.retrieval.candidate_multiplier)
        .with_min_score(config.retrieval.min_score);
    let orchestrator = AnswerOrchestrator::new(
        build_generator(&config.generation, &retry)?,
        &config.generation,
        retry.clone(),
    );
    let pipeline = QueryPipeline::new(
        embedder,
        retriever,
        ContextAssembler::new(&config.context),
        orchestrator,
    )
    .with_telemetry(telemetry);

    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let filter = filter.to_filter();

    match query {
        Some(query) => {
            let request = QueryRequest::new(query, top_k).with_filter(filter);
            ask_once(&pipeline, &request, display, show_sources).await
        }
        None => {
            run_interactive(&pipeline, store.collection(), top_k, &filter, display, show_sources)
                .await
        }
    }
}

/// Completes on Ctrl-C; never completes if the handler cannot be installed
async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn ask_once(
    pipeline: &QueryPipeline,
    request: &QueryRequest,
    display: &DisplayManager,
    show_sources: bool,
) -> Result<bool> {
    let spinner = display.query_spinner();
    let outcome = pipeline.answer_until(request, ctrl_c()).await;
    spinner.finish_and_clear();

    match outcome {
        Ok(outcome) => {
            display.show_answer(&outcome, show_sources);
            Ok(true)
        }
        Err(RagError::Cancelled) => {
            display.show_warning("query cancelled");
            Ok(false)
        }
        Err(err) => Err(err).context("query failed"),
    }
}

async fn run_interactive(
    pipeline: &QueryPipeline,
    collection: &str,
    top_k: usize,
    filter: &MetadataFilter,
    display: &DisplayManager,
    show_sources: bool,
) -> Result<bool> {
    let mut input = match InputHandler::default_history_path() {
        Some(path) => InputHandler::with_history(path)?,
        None => InputHandler::new()?,
    };
    display.show_banner(collection);

    loop {
        match input.read_line()? {
            InputLine::Exit => break,
            InputLine::Skip => continue,
            InputLine::Help => display.show_help(),
            InputLine::Query(query) => {
                let request = QueryRequest::new(query, top_k).with_filter(filter.clone());
                // A failed question does not end the session
                if let Err(err) = ask_once(pipeline, &request, display, show_sources).await {
                    display.show_error(&format!("{:#}", err));
                }
            }
        }
    }

    if let Err(err) = input.save_history() {
        tracing::warn!(error = %err, "could not save history");
    }
    Ok(true)
}

async fn run_delete(config: &Config, display: &DisplayManager, ids: &[PassageId]) -> Result<bool> {
    let retry = RetryManager::from_config(&config.retry);
    let store = connect_store(config, &retry).await?;

    retry
        .execute_with_retry(Dependency::Index, || store.delete(ids))
        .await
        .context("delete failed")?;

    display.show_success(&format!(
        "Deleted {} passage(s) from '{}'",
        ids.len(),
        store.collection()
    ));
    Ok(true)
}

async fn run_clear(config: &Config, display: &DisplayManager, yes: bool) -> Result<bool> {
    if !yes {
        let question = format!("Drop collection '{}' and every indexed review?", config.store.collection);
        if !InputHandler::new()?.confirm(&question)? {
            display.show_warning("clear aborted");
            return Ok(true);
        }
    }

    let retry = RetryManager::from_config(&config.retry);
    let store = QdrantStore::open(&config.store, &retry)?;
    let existed = retry
        .execute_with_retry(Dependency::Index, || store.drop_collection())
        .await
        .context("clear failed")?;

    if existed {
        display.show_success(&format!("Dropped collection '{}'", store.collection()));
    } else {
        display.show_warning(&format!("collection '{}' does not exist", store.collection()));
    }
    Ok(true)
}

async fn run_stats(config: &Config, display: &DisplayManager) -> Result<bool> {
    let retry = RetryManager::from_config(&config.retry);
    let store = connect_store(config, &retry).await?;
    let count = retry
        .execute_with_retry(Dependency::Index, || store.count())
        .await
        .context("count failed")?;
    let dimension = store
        .dimension()
        .await
        .map_or_else(|| "unknown".to_string(), |d| d.to_string());

    display.show_section("Index");
    display.show_field("Store", &config.store.url);
    display.show_field("Collection", store.collection());
    display.show_field("Metric", store.metric().as_str());
    display.show_field("Dimension", &dimension);
    display.show_field("Passages", &count.to_string());
    Ok(true)
}

fn show_config(config: &Config, path: Option<&Path>) -> Result<bool> {
    let source = path
        .map(Path::to_path_buf)
        .or_else(Config::default_path)
        .filter(|path| path.exists())
        .map_or_else(|| "defaults".to_string(), |path| path.display().to_string());
    println!("# base: {} (environment overrides applied)\n", source);
    println!("{}", config.to_display_toml()?);
    Ok(true)
}
