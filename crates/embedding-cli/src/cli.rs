//! CLI argument parsing for embedctl.
//!
//! CLI flags override every other configuration source.

use clap::{Parser, Subcommand};

/// Local cached text embeddings
#[derive(Parser, Debug)]
#[command(name = "embedctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/local-embeddings/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override database path
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Embed texts and print the vectors as JSON
    Embed {
        /// Texts to embed
        #[arg(required = true)]
        texts: Vec<String>,

        /// Neither read nor write the cache
        #[arg(long)]
        no_cache: bool,

        /// Texts per model invocation
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Skip normalization (implies no cache)
        #[arg(long)]
        raw: bool,
    },

    /// Show cache statistics for the configured model version
    Stats,

    /// Delete cached vectors for the configured model version
    Clear,

    /// Delete cached vectors from other model versions
    ClearStale,

    /// Remove the cached vectors for one text
    Invalidate {
        /// Text whose vectors should be dropped
        text: String,
    },

    /// Print the content hash used as cache key
    Hash {
        /// Text to hash
        text: String,
    },

    /// Cosine similarity of two texts
    Similarity {
        a: String,
        b: String,
    },

    /// Load the model and print its metadata
    ModelInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_embed() {
        let cli = Cli::parse_from(["embedctl", "embed", "hello", "world", "--no-cache"]);
        match cli.command {
            Commands::Embed {
                texts,
                no_cache,
                batch_size,
                raw,
            } => {
                assert_eq!(texts, vec!["hello".to_string(), "world".to_string()]);
                assert!(no_cache);
                assert!(batch_size.is_none());
                assert!(!raw);
            }
            _ => panic!("Expected Embed command"),
        }
    }

    #[test]
    fn test_cli_embed_requires_text() {
        assert!(Cli::try_parse_from(["embedctl", "embed"]).is_err());
    }

    #[test]
    fn test_cli_embed_batch_size() {
        let cli = Cli::parse_from(["embedctl", "embed", "-b", "8", "--raw", "x"]);
        match cli.command {
            Commands::Embed {
                batch_size, raw, ..
            } => {
                assert_eq!(batch_size, Some(8));
                assert!(raw);
            }
            _ => panic!("Expected Embed command"),
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from([
            "embedctl",
            "stats",
            "--db-path",
            "/tmp/cache",
            "--log-level",
            "debug",
            "-c",
            "/tmp/embed.toml",
        ]);
        assert!(matches!(cli.command, Commands::Stats));
        assert_eq!(cli.db_path, Some("/tmp/cache".to_string()));
        assert_eq!(cli.log_level, Some("debug".to_string()));
        assert_eq!(cli.config, Some("/tmp/embed.toml".to_string()));
    }

    #[test]
    fn test_cli_clear_stale() {
        let cli = Cli::parse_from(["embedctl", "clear-stale"]);
        assert!(matches!(cli.command, Commands::ClearStale));
    }

    #[test]
    fn test_cli_similarity() {
        let cli = Cli::parse_from(["embedctl", "similarity", "cat", "dog"]);
        match cli.command {
            Commands::Similarity { a, b } => {
                assert_eq!(a, "cat");
                assert_eq!(b, "dog");
            }
            _ => panic!("Expected Similarity command"),
        }
    }

    #[test]
    fn test_cli_model_info() {
        let cli = Cli::parse_from(["embedctl", "model-info"]);
        assert!(matches!(cli.command, Commands::ModelInfo));
    }
}
