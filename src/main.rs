//! # recall CLI
//!
//! Thin command-line surface over the indexing and retrieval pipeline,
//! mainly for operating and inspecting a recall database.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `recall init` | Create the SQLite database and run schema migrations |
//! | `recall index` | Feed a note-changed event through the indexing pipeline |
//! | `recall search "<query>"` | Query indexed chunks (vector, lexical, or hybrid) |
//! | `recall ask "<question>"` | Retrieve, then generate a grounded answer |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use recall::dispatch::Dispatcher;
use recall::indexer::Indexer;
use recall::models::{NoteChange, RetrievedChunk, SearchFilters};
use recall::store::sqlite::SqliteStore;
use recall::store::ChunkStore;
use recall::{answer, config, db, embedding, migrate, retrieval};

/// recall, the retrieval-augmented search backend for personal study notes.
#[derive(Parser)]
#[command(name = "recall", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/recall.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Index a note's content, replacing any previous generation.
    ///
    /// Dispatches a note-changed event exactly the way the owning
    /// application would, then waits for the worker to drain.
    Index {
        /// Note identifier; reuse it to simulate an update.
        #[arg(long)]
        note_id: String,

        /// Owning user identifier.
        #[arg(long)]
        owner: String,

        /// Note title.
        #[arg(long)]
        title: String,

        /// Path to a markdown file with the note content.
        #[arg(long)]
        file: PathBuf,

        /// Optional course tag.
        #[arg(long)]
        course: Option<String>,
    },

    /// Search indexed chunks.
    Search {
        /// The search query string.
        query: String,

        /// Owning user identifier; results never cross owners.
        #[arg(long)]
        owner: String,

        /// Search mode: `vector`, `lexical`, or `hybrid`.
        #[arg(long, default_value = "hybrid")]
        mode: String,

        /// Filter to a course tag.
        #[arg(long)]
        course: Option<String>,

        /// Only chunks indexed on or after this date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Ask a question and get an answer grounded in your notes.
    Ask {
        /// The question.
        query: String,

        /// Owning user identifier.
        #[arg(long)]
        owner: String,

        /// Filter to a course tag.
        #[arg(long)]
        course: Option<String>,

        /// Maximum number of chunks to ground on.
        #[arg(long)]
        limit: Option<i64>,
    },
}

fn build_filters(course: Option<String>, since: Option<String>) -> Result<SearchFilters> {
    let date_range = match since {
        Some(s) => {
            let date = chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d")?;
            let from = date
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc().timestamp())
                .unwrap_or(0);
            Some((from, chrono::Utc::now().timestamp()))
        }
        None => None,
    };
    Ok(SearchFilters {
        course_tag: course,
        date_range,
    })
}

fn print_results(results: &[RetrievedChunk]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, r) in results.iter().enumerate() {
        let section = if r.chunk.section_path.is_empty() {
            "Main".to_string()
        } else {
            r.chunk.section_path.join(" > ")
        };
        let excerpt: String = r.chunk.content_raw.chars().take(160).collect();
        println!(
            "{}. [{:.4}] {} / {}",
            i + 1,
            r.similarity,
            r.chunk.note_title,
            section
        );
        if let Some(ref tag) = r.chunk.course_tag {
            println!("    course: {}", tag);
        }
        println!("    excerpt: \"{}\"", excerpt.replace('\n', " "));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("recall=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let pool = db::connect(&cfg.db.path).await?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }

        Commands::Index {
            note_id,
            owner,
            title,
            file,
            course,
        } => {
            let content = std::fs::read_to_string(&file)?;
            let store = Arc::new(SqliteStore::new(pool.clone()));
            let embedder = embedding::create_client(&cfg.embedding)?;
            let indexer = Arc::new(Indexer::new(
                store.clone(),
                embedder,
                cfg.chunking.options(),
                cfg.embedding.batch_size,
            ));

            let dispatcher = Dispatcher::spawn(indexer);
            dispatcher.notify(NoteChange {
                note_id: note_id.clone(),
                owner_user_id: owner,
                title,
                content,
                course_tag: course,
            });
            dispatcher.shutdown().await;

            let chunks = store.note_chunks(&note_id).await?;
            println!("indexed {} chunks for note {}", chunks.len(), note_id);
        }

        Commands::Search {
            query,
            owner,
            mode,
            course,
            since,
            limit,
        } => {
            let store = SqliteStore::new(pool.clone());
            let limit = limit.unwrap_or(cfg.retrieval.limit);
            let filters = build_filters(course, since)?;

            match mode.as_str() {
                "vector" => {
                    let embedder = embedding::create_client(&cfg.embedding)?;
                    let outcome = retrieval::retrieve(
                        &store,
                        embedder.as_ref(),
                        &owner,
                        &query,
                        &filters,
                        limit,
                    )
                    .await?;
                    print_results(&outcome.results);
                    println!("({} ms)", outcome.latency.as_millis());
                }
                "lexical" => {
                    let results = retrieval::lexical_search(
                        &store,
                        &owner,
                        &query,
                        limit,
                        filters.course_tag.as_deref(),
                    )
                    .await?;
                    print_results(&results);
                }
                "hybrid" => {
                    let embedder = embedding::create_client(&cfg.embedding)?;
                    let results = retrieval::hybrid_search(
                        &store,
                        embedder.as_ref(),
                        &owner,
                        &query,
                        limit,
                        &filters,
                    )
                    .await?;
                    print_results(&results);
                }
                other => bail!("Unknown search mode: {}. Use vector, lexical, or hybrid.", other),
            }
        }

        Commands::Ask {
            query,
            owner,
            course,
            limit,
        } => {
            let store = SqliteStore::new(pool.clone());
            let limit = limit.unwrap_or(cfg.retrieval.limit);
            let filters = build_filters(course, None)?;

            let embedder = embedding::create_client(&cfg.embedding)?;
            let chunks = retrieval::hybrid_search(
                &store,
                embedder.as_ref(),
                &owner,
                &query,
                limit,
                &filters,
            )
            .await?;

            let generator = answer::create_client(&cfg.generation)?;
            let answer = answer::answer_query(generator.as_ref(), &query, &chunks).await?;

            println!("{}", answer.text);
            if answer.insufficient_context {
                println!("(no sufficient grounding found in your notes)");
            }
        }
    }

    pool.close().await;
    Ok(())
}
