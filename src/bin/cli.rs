//! Recall CLI
//!
//! Command-line interface for memory management.

use clap::{Parser, Subcommand};

use recall::error::Result;
use recall::service::MemoryService;
use recall::types::*;

#[derive(Parser)]
#[command(name = "recall")]
#[command(about = "Persistent memory store CLI")]
#[command(version)]
struct Cli {
    /// Memory store directory
    #[arg(long, env = "MEMORY_DIR", default_value = "~/.mcp-memory")]
    memory_dir: String,

    /// Index journal entries kept before writing a fresh snapshot
    #[arg(long, env = "RECALL_COMPACT_AFTER", default_value_t = DEFAULT_JOURNAL_COMPACT_THRESHOLD)]
    compact_after: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a new memory store
    Init {
        /// Directory for the store (defaults to --memory-dir)
        directory: Option<String>,
        /// Replace an existing store
        #[arg(long)]
        overwrite: bool,
    },
    /// Create a new memory
    Create {
        /// Title
        title: String,
        /// Content
        content: String,
        /// Memory type (entity, concept, session)
        #[arg(short, long, default_value = "concept")]
        r#type: MemoryType,
        /// Tags (comma-separated)
        #[arg(short = 'T', long)]
        tags: Option<String>,
        /// Related memory IDs (comma-separated)
        #[arg(short, long)]
        related: Option<String>,
        /// Importance (0-1)
        #[arg(short, long)]
        importance: Option<f32>,
    },
    /// Get a memory by ID
    Get {
        /// Memory ID
        id: String,
        /// Memory type; searched across all types when omitted
        #[arg(short, long)]
        r#type: Option<MemoryType>,
    },
    /// Update fields of a memory
    Update {
        /// Memory ID
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        /// Replacement tags (comma-separated)
        #[arg(short = 'T', long)]
        tags: Option<String>,
        #[arg(short, long)]
        importance: Option<f32>,
    },
    /// Delete a memory
    Delete {
        /// Memory ID
        id: String,
    },
    /// Search memories
    Search {
        /// Search query
        query: String,
        /// Restrict to types (comma-separated)
        #[arg(short, long)]
        types: Option<String>,
        /// Require tags (comma-separated)
        #[arg(short = 'T', long)]
        tags: Option<String>,
        /// Maximum results
        #[arg(short, long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    /// List memories
    List {
        /// Filter by types (comma-separated)
        #[arg(short, long)]
        types: Option<String>,
        /// Filter by tags (comma-separated)
        #[arg(short = 'T', long)]
        tags: Option<String>,
        /// Maximum number to return
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Add tags to a memory
    Tag {
        id: String,
        /// Tags to add
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Remove tags from a memory
    Untag {
        id: String,
        /// Tags to remove
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Relate a memory to others
    Relate {
        source: String,
        #[arg(required = true)]
        targets: Vec<String>,
    },
    /// Remove relations from a memory
    Unrelate {
        source: String,
        #[arg(required = true)]
        targets: Vec<String>,
    },
    /// Rebuild the search index from the record files
    Rebuild,
    /// Show statistics
    Stats,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Expand ~ in path
    let memory_dir = shellexpand::tilde(&cli.memory_dir).to_string();

    if let Commands::Init {
        directory,
        overwrite,
    } = &cli.command
    {
        let directory = directory.clone().unwrap_or_else(|| memory_dir.clone());
        let store = recall::RecordStore::build(
            shellexpand::tilde(&directory).to_string(),
            *overwrite,
        )?;
        let service = MemoryService::open(StoreConfig {
            root: store.root().to_path_buf(),
            journal_compact_threshold: cli.compact_after,
        })?;
        println!(
            "Memory store built in {} ({} memories)",
            store.root().display(),
            service.stats()?.indexed
        );
        return Ok(());
    }

    let service = MemoryService::open(StoreConfig {
        root: memory_dir.into(),
        journal_compact_threshold: cli.compact_after,
    })?;

    match cli.command {
        Commands::Init { .. } => {}

        Commands::Create {
            title,
            content,
            r#type,
            tags,
            related,
            importance,
        } => {
            let input = CreateMemoryInput {
                title,
                memory_type: r#type,
                tags: tags.as_deref().map(split_list),
                related: related.as_deref().map(split_list),
                importance,
                content,
            };
            let memory = service.create(input)?;
            println!("Created memory {}", memory.id);
            println!("{}", serde_json::to_string_pretty(&memory)?);
        }

        Commands::Get { id, r#type } => {
            let memory = match r#type {
                Some(memory_type) => service.get(&id, memory_type)?,
                None => service.find(&id)?,
            };
            println!("{}", serde_json::to_string_pretty(&memory)?);
        }

        Commands::Update {
            id,
            title,
            content,
            tags,
            importance,
        } => {
            let memory = service.update(UpdateMemoryInput {
                title,
                content,
                tags: tags.as_deref().map(split_list),
                importance,
                ..UpdateMemoryInput::new(id)
            })?;
            println!("{}", serde_json::to_string_pretty(&memory)?);
        }

        Commands::Delete { id } => {
            if service.delete(&id)? {
                println!("Deleted memory {}", id);
            } else {
                println!("No memory {}", id);
            }
        }

        Commands::Search {
            query,
            types,
            tags,
            limit,
        } => {
            let options = SearchOptions {
                types: types.as_deref().map(parse_types).transpose()?,
                tags: tags.as_deref().map(split_list),
                limit: Some(limit),
            };
            for result in service.search(&query, &options) {
                println!(
                    "{} [{}] (score: {:.3}) {}",
                    result.id, result.memory_type, result.score, result.title
                );
                println!("    {}", first_line(&result.preview, 100));
            }
        }

        Commands::List { types, tags, limit } => {
            let options = ListOptions {
                types: types.as_deref().map(parse_types).transpose()?,
                tags: tags.as_deref().map(split_list),
                limit,
            };
            for result in service.list(&options) {
                println!(
                    "{} [{}] {} - {}",
                    result.id,
                    result.memory_type,
                    result.title,
                    result.tags.join(", ")
                );
            }
        }

        Commands::Tag { id, tags } => {
            let memory = service.add_tags(TagMemoryInput { id, tags })?;
            println!("Tags: {}", memory.tags.join(", "));
        }

        Commands::Untag { id, tags } => {
            let memory = service.remove_tags(TagMemoryInput { id, tags })?;
            println!("Tags: {}", memory.tags.join(", "));
        }

        Commands::Relate { source, targets } => {
            let memory = service.relate(RelateMemoriesInput {
                source_id: source,
                target_ids: targets,
            })?;
            println!("Related: {}", memory.related.join(", "));
        }

        Commands::Unrelate { source, targets } => {
            let memory = service.unrelate(RelateMemoriesInput {
                source_id: source,
                target_ids: targets,
            })?;
            println!("Related: {}", memory.related.join(", "));
        }

        Commands::Rebuild => {
            let report = service.rebuild_index()?;
            println!("Indexed {} memories", report.indexed);
            for warning in &report.warnings {
                eprintln!("warning: {}", serde_json::to_string(warning)?);
            }
        }

        Commands::Stats => {
            let stats = service.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',').map(|s| s.trim().to_string()).collect()
}

fn parse_types(s: &str) -> Result<Vec<MemoryType>> {
    s.split(',')
        .map(|t| t.parse().map_err(recall::RecallError::InvalidInput))
        .collect()
}

fn first_line(s: &str, max: usize) -> String {
    let line = s.lines().next().unwrap_or(s);
    if line.chars().count() <= max {
        line.to_string()
    } else {
        format!("{}...", line.chars().take(max - 3).collect::<String>())
    }
}
