//! embedctl
//!
//! Local text embeddings backed by a persistent, content-addressed cache.
//!
//! # Usage
//!
//! ```bash
//! embedctl embed "first text" "second text" [--no-cache] [--batch-size N] [--raw]
//! embedctl stats
//! embedctl clear | clear-stale
//! embedctl invalidate "some text"
//! embedctl similarity "a cat" "a kitten"
//! embedctl model-info
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/local-embeddings/config.toml)
//! 3. Environment variables (EMBED_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use embedding_cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    run(Cli::parse()).await
}
