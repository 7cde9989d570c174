//! # Family Tree
//!
//! Native application around [`family_tree_core`]: SQLite persistence, the
//! hosted completion client, profile-text extraction, the assistant side
//! channel, and the HTTP, RPC and MCP servers behind the `famtree` CLI.
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────┐
//!   HTTP ───────▶│  server      │──┐
//!                └──────┬───────┘  │         ┌───────────────┐   ┌──────────┐
//!                       │ /chat    ├────────▶│ FamilyService │──▶│  SQLite  │
//!                ┌──────▼───────┐  │         │ (core)        │   └──────────┘
//!                │  chat        │──┘         └───────▲───────┘
//!                └──────┬───────┘                    │
//!          side channel │ (famtree serve rpc)  ┌─────┴──────┐
//!                       └─────────────────────▶│  rpc/tools │
//!                                              └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! famtree init                        # create database
//! famtree seed ./family.json          # load people with spouses/children
//! famtree tree --layout               # print the tree layout
//! famtree serve http                  # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite `FamilyStore` |
//! | [`llm`] | Completion provider abstraction |
//! | [`prompts`] | Prompt templates and sampling settings |
//! | [`extract`] | Profile text extraction and write-through |
//! | [`tools`] | Assistant tool registry |
//! | [`side_channel`] | Side-channel RPC client |
//! | [`rpc`] | Line-delimited JSON-RPC server |
//! | [`mcp`] | MCP stdio server |
//! | [`chat`] | Chat action dispatcher |
//! | [`signature`] | Upload signatures |
//! | [`server`] | HTTP server |

pub mod chat;
pub mod config;
pub mod db;
pub mod extract;
pub mod llm;
pub mod mcp;
pub mod migrate;
pub mod prompts;
pub mod rpc;
pub mod server;
pub mod side_channel;
pub mod signature;
pub mod sqlite_store;
pub mod tools;
