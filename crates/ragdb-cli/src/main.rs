//! ragdb CLI - Command-line interface
//!
//! Usage:
//!   ragdb info
//!   ragdb stats
//!   ragdb list --limit 20 --offset 0
//!   ragdb get <id>
//!   ragdb delete <id>...
//!   ragdb import <file>
//!   ragdb search --vector 0.1,0.2,0.3 -k 5
//!
//! Author: hephaex@gmail.com

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use ragdb_core::{
    metadata_keys, AppConfig, DeleteMissing, Filter, ListOptions, LoggingConfig, RagDbError,
    Result, SearchOptions, VectorDocument,
};
use ragdb_vector::DatabaseService;
use serde::Serialize;
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ragdb")]
#[command(about = "Vector database adapter CLI")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the active provider and its capabilities
    Info,
    /// Show item counts grouped by source type
    Stats {
        /// Print the plain-text summary instead of JSON
        #[arg(long)]
        text: bool,
    },
    /// List stored documents
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Only documents with this source type
        #[arg(long)]
        source_type: Option<String>,
    },
    /// Fetch a document by id
    Get { id: String },
    /// Delete documents by id
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Import documents from a JSON array or JSON-lines file
    Import { path: PathBuf },
    /// Nearest-neighbour search
    Search {
        /// Comma-separated query embedding
        #[arg(long, allow_hyphen_values = true)]
        vector: String,
        #[arg(short, long, default_value_t = ragdb_core::DEFAULT_SEARCH_K)]
        k: usize,
        /// Only documents with this source type
        #[arg(long)]
        source_type: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    init_tracing(&config.logging);
    debug!(provider = %config.database.provider, "Opening database session");

    let command = cli.command;
    let output = DatabaseService::with_session(&config.database, move |db| {
        Box::pin(execute(db, command))
    })
    .await?;

    println!("{output}");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn execute(db: &DatabaseService, command: Commands) -> Result<String> {
    match command {
        Commands::Info => to_json(&db.info()?),
        Commands::Stats { text } => {
            let stats = db.get_stats().await?;
            if text {
                Ok(stats.to_string())
            } else {
                to_json(&stats)
            }
        }
        Commands::List {
            limit,
            offset,
            source_type,
        } => {
            let mut options = ListOptions::new().with_limit(limit).with_offset(offset);
            if let Some(source_type) = source_type {
                options = options.with_filter(source_filter(source_type));
            }
            to_json(&db.list_items(options).await?)
        }
        Commands::Get { id } => match db.get(&id).await? {
            Some(document) => to_json(&document),
            None => Err(RagDbError::NotFound(id)),
        },
        Commands::Delete { ids } => {
            let report_missing = db.info()?.capabilities.delete_missing == DeleteMissing::NoOp;

            let mut results = Vec::with_capacity(ids.len());
            for id in ids {
                if report_missing && db.get(&id).await?.is_none() {
                    results.push(json!({ "id": id, "deleted": false }));
                    continue;
                }
                match db.delete(&id).await {
                    Ok(()) => results.push(json!({ "id": id, "deleted": true })),
                    Err(RagDbError::NotFound(_)) => {
                        results.push(json!({ "id": id, "deleted": false }))
                    }
                    Err(err) => return Err(err),
                }
            }
            to_json(&results)
        }
        Commands::Import { path } => {
            let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
                RagDbError::StorageError(format!("failed to read {}: {e}", path.display()))
            })?;
            let documents = stamp_created_at(parse_documents(&raw)?, Utc::now());
            let ids = db.insert_batch(documents).await?;
            to_json(&json!({ "imported": ids.len(), "ids": ids }))
        }
        Commands::Search {
            vector,
            k,
            source_type,
        } => {
            let embedding = parse_vector(&vector)?;
            let mut options = SearchOptions::new().with_k(k);
            if let Some(source_type) = source_type {
                options = options.with_filter(source_filter(source_type));
            }
            to_json(&db.search(&embedding, options).await?)
        }
    }
}

fn source_filter(source_type: String) -> Filter {
    Filter::eq(metadata_keys::SOURCE_TYPE, source_type)
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value).map_err(anyhow::Error::from)?)
}

/// Parse `0.1, 0.2,0.3` into an embedding
fn parse_vector(raw: &str) -> Result<Vec<f32>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<f32>().map_err(|_| {
                RagDbError::ValidationError(format!("invalid vector component: {part:?}"))
            })
        })
        .collect::<Result<Vec<_>>>()
        .and_then(|values| {
            if values.is_empty() {
                Err(RagDbError::ValidationError("query vector is empty".to_string()))
            } else {
                Ok(values)
            }
        })
}

/// Accept either a JSON array of documents or one document per line
fn parse_documents(raw: &str) -> Result<Vec<VectorDocument>> {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|e| RagDbError::ValidationError(format!("invalid document array: {e}")));
    }

    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str(line).map_err(|e| {
                RagDbError::ValidationError(format!("invalid document on line {}: {e}", number + 1))
            })
        })
        .collect()
}

/// Set `metadata.createdAt` on documents that do not carry one
fn stamp_created_at(documents: Vec<VectorDocument>, now: DateTime<Utc>) -> Vec<VectorDocument> {
    documents
        .into_iter()
        .map(|document| {
            if document.metadata.contains_key(metadata_keys::CREATED_AT) {
                document
            } else {
                document.with_created_at(now)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vector() {
        assert_eq!(parse_vector("0.5, -1,2.25").unwrap(), vec![0.5, -1.0, 2.25]);
        assert_eq!(parse_vector("1,").unwrap(), vec![1.0]);
    }

    #[test]
    fn test_parse_vector_rejects_garbage() {
        let err = parse_vector("0.1,abc").unwrap_err();
        assert!(matches!(err, RagDbError::ValidationError(_)));
        assert!(parse_vector(" , ").is_err());
    }

    #[test]
    fn test_parse_documents_array() {
        let docs = parse_documents(
            r#"[{"id": "a", "embedding": [1.0, 0.0]}, {"embedding": [0.0, 1.0], "content": "b"}]"#,
        )
        .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id.as_deref(), Some("a"));
        assert_eq!(docs[1].content.as_deref(), Some("b"));
    }

    #[test]
    fn test_parse_documents_json_lines() {
        let raw = concat!(
            "{\"embedding\": [1.0]}\n",
            "\n",
            "{\"embedding\": [2.0], \"metadata\": {\"sourceType\": \"web\"}}\n",
        );
        let docs = parse_documents(raw).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].source_type(), Some("web"));

        let err = parse_documents("{\"embedding\": [1.0]}\nnot json").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_import_stamps_missing_created_at() {
        let now = Utc::now();
        let docs = stamp_created_at(
            vec![
                VectorDocument::new(vec![1.0]),
                VectorDocument::new(vec![2.0])
                    .with_metadata(metadata_keys::CREATED_AT, "2024-01-01T00:00:00+00:00"),
            ],
            now,
        );

        assert_eq!(
            docs[0].metadata[metadata_keys::CREATED_AT],
            serde_json::json!(now.to_rfc3339())
        );
        assert_eq!(
            docs[1].metadata[metadata_keys::CREATED_AT],
            serde_json::json!("2024-01-01T00:00:00+00:00")
        );
    }

    #[test]
    fn test_cli_parses_search() {
        let cli = Cli::try_parse_from([
            "ragdb", "search", "--vector", "-0.1,0.2", "-k", "3", "--source-type", "pdf",
        ])
        .unwrap();
        match cli.command {
            Commands::Search {
                vector,
                k,
                source_type,
            } => {
                assert_eq!(vector, "-0.1,0.2");
                assert_eq!(k, 3);
                assert_eq!(source_type.as_deref(), Some("pdf"));
            }
            _ => panic!("expected search"),
        }
    }

    #[tokio::test]
    async fn test_execute_against_memory_backend() {
        let config = ragdb_core::VectorDbConfig::new("memory").with_dimension(2);
        let output = DatabaseService::with_session(&config, |db| {
            Box::pin(async move {
                db.insert(VectorDocument::new(vec![1.0, 0.0]).with_id("a").with_source_type("web"))
                    .await?;
                let stats = execute(db, Commands::Stats { text: false }).await?;
                let deleted = execute(
                    db,
                    Commands::Delete {
                        ids: vec!["a".to_string(), "missing".to_string()],
                    },
                )
                .await?;
                Ok((stats, deleted))
            })
        })
        .await
        .unwrap();

        let stats: serde_json::Value = serde_json::from_str(&output.0).unwrap();
        assert_eq!(stats["totalItems"], 1);
        assert_eq!(stats["bySourceType"]["web"], 1);

        let deleted: serde_json::Value = serde_json::from_str(&output.1).unwrap();
        assert_eq!(deleted[0]["deleted"], true);
        assert_eq!(deleted[1]["deleted"], false);
    }
}
