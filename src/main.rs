//! # Family Tree CLI (`famtree`)
//!
//! ## Usage
//!
//! ```bash
//! famtree --config ./config/famtree.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `famtree init` | Create the SQLite database and run schema migrations |
//! | `famtree serve http` | Start the HTTP server |
//! | `famtree serve rpc` | Answer line-delimited JSON-RPC on stdio (the side channel) |
//! | `famtree serve mcp` | Start an MCP server on stdio |
//! | `famtree tree` | Print the normalized tree as JSON |
//! | `famtree check` | Report parent fields and edges that disagree |
//! | `famtree seed <file>` | Load a JSON array of people with embedded relations |
//! | `famtree import <file>` | Extract people from profile text |
//!
//! ## Examples
//!
//! ```bash
//! famtree init
//! famtree seed ./data/family.json
//! famtree tree --layout
//! famtree import ./profile.txt --insert
//! famtree serve http
//! ```
//!
//! Logs go to stderr (`RUST_LOG` overrides the default filter) so the
//! stdio servers keep stdout for the protocol.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use family_tree::config::{self, Config};
use family_tree::extract::{self, ExtractRequest, ExtractResponse};
use family_tree::llm::create_provider;
use family_tree::tools::{ToolContext, ToolRegistry};
use family_tree::{db, mcp, migrate, rpc, server};
use family_tree_core::adapter::RawPerson;
use family_tree_core::error::FamilyError;
use family_tree_core::tree::layout;

const DEFAULT_LOG_FILTER: &str = "family_tree=info,famtree=info,tower_http=info";

/// Family Tree CLI: genealogy records with relationship normalization and
/// assistant-driven import.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/famtree.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "famtree",
    about = "Family Tree: genealogy records, relationship normalization and profile import",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/famtree.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Start a server.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },

    /// Print the normalized family tree as JSON.
    Tree {
        /// Print the layout contract (`{rootId, nodes}`) instead.
        #[arg(long)]
        layout: bool,
    },

    /// Report disagreements between parent fields and child edges.
    ///
    /// Exits non-zero when any are found.
    Check,

    /// Load people from a JSON array with embedded `spouses` / `children`.
    ///
    /// People whose id already exists are skipped; edges are idempotent.
    Seed {
        /// Path to the JSON file.
        file: PathBuf,
    },

    /// Extract people and relations from a profile text file.
    Import {
        /// Path to the text file.
        file: PathBuf,

        /// Write the extracted people and relations to the database.
        #[arg(long)]
        insert: bool,
    },
}

/// Server subcommands.
#[derive(Subcommand)]
enum ServeService {
    /// HTTP server on `[server].bind`.
    Http,
    /// Line-delimited JSON-RPC on stdin/stdout.
    Rpc,
    /// MCP server on stdin/stdout.
    Mcp,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve { service } => match service {
            ServeService::Http => server::run_server(&cfg).await?,
            ServeService::Rpc => {
                let ctx = tool_context(&cfg).await?;
                rpc::serve_stdio(ToolRegistry::with_builtins(), ctx).await?;
            }
            ServeService::Mcp => {
                let ctx = tool_context(&cfg).await?;
                mcp::serve_stdio(ToolRegistry::with_builtins(), ctx).await?;
            }
        },
        Commands::Tree { layout: as_layout } => {
            let service = db::open_service(&cfg).await?;
            let nodes = service.tree().await?;
            let json = if as_layout {
                serde_json::to_string_pretty(&layout(&nodes, cfg.tree.root_id.as_deref()))?
            } else {
                serde_json::to_string_pretty(nodes.as_slice())?
            };
            println!("{}", json);
        }
        Commands::Check => {
            let service = db::open_service(&cfg).await?;
            let issues = service.integrity().await?;
            if issues.is_empty() {
                println!("No integrity issues found.");
            } else {
                for issue in &issues {
                    println!("{}", issue);
                }
                return Err(
                    FamilyError::Integrity(format!("{} issue(s) found", issues.len())).into(),
                );
            }
        }
        Commands::Seed { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let people: Vec<RawPerson> = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", file.display()))?;
            let service = db::open_service(&cfg).await?;
            let summary = service.seed(people).await?;
            println!(
                "Seeded {} people ({} already present), {} spouse edges, {} child edges.",
                summary.persons, summary.skipped, summary.spouse_edges, summary.child_edges
            );
        }
        Commands::Import { file, insert } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            import(&cfg, text, insert).await?;
        }
    }

    Ok(())
}

async fn tool_context(cfg: &Config) -> Result<ToolContext> {
    let service = db::open_service(cfg).await?;
    let provider = create_provider(&cfg.llm)?;
    Ok(ToolContext::new(service, provider))
}

async fn import(cfg: &Config, text: String, insert: bool) -> Result<()> {
    let service = db::open_service(cfg).await?;
    let provider = create_provider(&cfg.llm)?;
    let request = ExtractRequest {
        text: Some(text),
        insert_to_database: insert,
    };

    match extract::run(&service, provider.as_ref(), cfg.llm.max_tokens, request).await? {
        ExtractResponse::Extracted(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        ExtractResponse::Imported(outcome) => {
            for node in &outcome.nodes {
                println!("  + {} ({})", node.name, node.id);
            }
            println!(
                "Imported {} people and {} relations.",
                outcome.nodes.len(),
                outcome.relations.len()
            );
            if let Some(e) = outcome.error {
                return Err(e.context("import stopped early"));
            }
        }
    }
    Ok(())
}
