//! Command-line companion to the docqa server.
//!
//! Batch-index a directory of markdown files, ask questions against the persisted index, compare
//! two strings in embedding space, and estimate provider costs before spending money.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use docqa::{
    config::{self, get_config},
    cost::{self, CostTier},
    embedding::{build_embedding_client, embed_one},
    generation::build_completion_client,
    logging,
    processing::{PipelineSettings, RagService, SourceDocument},
    qdrant::QdrantService,
    similarity::{cosine_similarity, euclidean_distance},
};

const PREVIEW_CHARS: usize = 200;

#[derive(Parser)]
#[command(name = "docqa-cli", about = "Index markdown, ask questions, and estimate costs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index every markdown file below a directory, replacing the collection.
    Ingest {
        #[arg(long, default_value = "data/books")]
        data_path: PathBuf,
        /// Collection to (re)create; defaults to QDRANT_COLLECTION_NAME.
        #[arg(long)]
        collection: Option<String>,
    },
    /// Answer a question from the persisted collection.
    Query {
        text: String,
        #[arg(long)]
        collection: Option<String>,
    },
    /// Embed two strings and report how close they are.
    Compare {
        #[arg(default_value = "apple")]
        first: String,
        #[arg(default_value = "iphone")]
        second: String,
    },
    /// Estimate the embedding cost of indexing a directory.
    EstimateIngest {
        #[arg(long, default_value = "data/books")]
        data_path: PathBuf,
        #[arg(long, default_value = "text-embedding-3-small")]
        model: String,
        #[arg(long, default_value_t = 1000)]
        chunk_size: usize,
        #[arg(long, default_value_t = 200)]
        chunk_overlap: usize,
    },
    /// Estimate the cost of answering one question.
    EstimateQuery {
        text: String,
        #[arg(long, default_value = "gpt-3.5-turbo")]
        model: String,
        #[arg(long, default_value_t = 3)]
        k: usize,
        #[arg(long, default_value_t = 1000)]
        chunk_size: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Ingest {
            data_path,
            collection,
        } => {
            init_runtime();
            ingest(&data_path, collection).await
        }
        Command::Query { text, collection } => {
            init_runtime();
            query(&text, collection).await
        }
        Command::Compare { first, second } => {
            init_runtime();
            compare(&first, &second).await
        }
        Command::EstimateIngest {
            data_path,
            model,
            chunk_size,
            chunk_overlap,
        } => {
            dotenvy::dotenv().ok();
            logging::init_tracing();
            estimate_ingest(&data_path, &model, chunk_size, chunk_overlap)
        }
        Command::EstimateQuery {
            text,
            model,
            k,
            chunk_size,
        } => {
            dotenvy::dotenv().ok();
            logging::init_tracing();
            estimate_query(&text, &model, k, chunk_size)
        }
    }
}

fn init_runtime() {
    config::init_config();
    logging::init_tracing();
}

fn build_service(collection: Option<String>) -> Result<RagService> {
    let config = get_config();
    let mut settings = PipelineSettings::from_config(config);
    if let Some(collection) = collection {
        settings.collection = collection;
    }
    let embedding_client =
        build_embedding_client(config).context("failed to initialize embedding client")?;
    let completion_client =
        build_completion_client(config).context("failed to initialize completion client")?;
    let qdrant = QdrantService::from_config().context("failed to initialize Qdrant client")?;
    Ok(RagService::with_components(
        settings,
        embedding_client,
        completion_client,
        qdrant,
    ))
}

async fn ingest(data_path: &Path, collection: Option<String>) -> Result<()> {
    let files = cost::markdown_files(data_path)
        .with_context(|| format!("cannot list markdown files in {}", data_path.display()))?;
    if files.is_empty() {
        bail!("no .md files found in {}", data_path.display());
    }

    let mut documents = Vec::with_capacity(files.len());
    for path in &files {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        documents.push(SourceDocument {
            source: path.display().to_string(),
            text,
        });
    }
    println!(
        "Loaded {} documents from {}",
        documents.len(),
        data_path.display()
    );

    let service = build_service(collection)?;
    let label = data_path.display().to_string();
    let outcome = service
        .ingest_sources(&label, documents)
        .await
        .context("ingestion failed")?;

    println!(
        "Split {} documents into {} chunks ({} duplicates skipped).",
        outcome.document_count, outcome.chunk_count, outcome.skipped_duplicates
    );
    if let Some(sample) = &outcome.sample_chunk {
        println!("\nSample chunk (11th):");
        println!("Content preview: {}...", preview(sample, PREVIEW_CHARS));
    }
    println!(
        "Saved {} chunks to collection '{}'.",
        outcome.chunk_count,
        service.settings().collection
    );
    Ok(())
}

async fn query(text: &str, collection: Option<String>) -> Result<()> {
    let service = build_service(collection)?;
    service
        .restore_loaded_document()
        .await
        .context("failed to inspect collection")?;
    let answer = service.answer_query(text).await?;

    println!("Response: {}", answer.answer);
    if !answer.sources.is_empty() {
        println!("\nSources:");
        for (rank, source) in answer.sources.iter().enumerate() {
            let name = source
                .metadata
                .get("source")
                .and_then(|value| value.as_str())
                .unwrap_or("unknown");
            let start = source
                .metadata
                .get("start_index")
                .map(ToString::to_string)
                .unwrap_or_else(|| "?".into());
            println!(
                "{} - {name} @ {start} (score {:.3})",
                rank + 1,
                source.score
            );
        }
    }
    Ok(())
}

async fn compare(first: &str, second: &str) -> Result<()> {
    let client = build_embedding_client(get_config())
        .context("failed to initialize embedding client")?;
    let a = embed_one(client.as_ref(), first).await?;
    let b = embed_one(client.as_ref(), second).await?;

    println!("Vector for '{first}': {:?}... (length: {})", head(&a), a.len());
    println!("Vector for '{second}': {:?}... (length: {})", head(&b), b.len());
    println!(
        "Cosine similarity between '{first}' and '{second}': {:.4}",
        cosine_similarity(&a, &b)
    );
    println!(
        "Euclidean distance between '{first}' and '{second}': {:.4}",
        euclidean_distance(&a, &b)
    );
    Ok(())
}

fn estimate_ingest(
    data_path: &Path,
    model: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<()> {
    let estimate = cost::estimate_ingest(data_path, model, chunk_size, chunk_overlap)?;
    if estimate.files.is_empty() {
        bail!("no .md files found in {}", data_path.display());
    }

    println!("=== Index Creation Cost Estimation ===\n");
    for file in &estimate.files {
        println!(" {}: {} tokens", file.path.display(), file.tokens);
    }
    println!("\n=== Processing Summary ===");
    println!(" Total files: {}", estimate.files.len());
    println!(" Total tokens: {}", estimate.total_tokens);
    println!(" Estimated chunks: {}", estimate.estimated_chunks);
    println!(" Embedding cost ({}): ${:.6}", estimate.model, estimate.embedding_cost);
    print_tier(estimate.tier);
    Ok(())
}

fn estimate_query(text: &str, model: &str, k: usize, chunk_size: usize) -> Result<()> {
    let estimate = cost::estimate_query(text, model, k, chunk_size)?;
    let tokens = estimate.tokens;

    println!("=== Query Cost Estimation ===\n");
    println!("Query: '{text}'");
    println!("Model: {}", estimate.model);
    println!("{}", "-".repeat(40));
    println!("Token Breakdown:");
    println!("  Query tokens: {}", tokens.query);
    println!("  Context tokens: {}", tokens.context);
    println!("  Template tokens: {}", tokens.template);
    println!("  Input tokens: {}", tokens.input);
    println!("  Output tokens: {}", tokens.output);
    println!("  Total tokens: {}", tokens.total);
    println!("\nLLM Costs:");
    println!("  Input cost: ${:.6}", estimate.input_cost);
    println!("  Output cost: ${:.6}", estimate.output_cost);
    println!("\nEmbedding Costs:");
    println!("  Query embedding: ${:.6}", estimate.embedding_cost);
    println!("\nTotal Query Cost: ${:.6}", estimate.total_cost);
    print_tier(estimate.tier);

    println!("\n=== Usage Projections ===");
    match estimate.queries_per_dollar() {
        Some(count) => println!("Queries per $1: {count:.0}"),
        None => println!("Queries per $1: unlimited"),
    }
    println!("Cost per 100 queries: ${:.4}", estimate.cost_for(100));
    println!("Cost per 1000 queries: ${:.2}", estimate.cost_for(1000));
    Ok(())
}

fn print_tier(tier: CostTier) {
    println!("\n=== Cost Context ===");
    println!("{}", tier.advice());
}

fn head(vector: &[f32]) -> &[f32] {
    &vector[..vector.len().min(5)]
}

fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}
