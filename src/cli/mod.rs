use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "comicrag")]
#[command(author, version, about = "Comic archive ingestion with AI page analysis and semantic search")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default .comicrag/config.toml in the current directory
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Start the HTTP server and the processing workers
    Serve {
        /// Port to listen on (defaults to server.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Delete divergent library/index entries instead of refusing to start
        #[arg(long)]
        reconcile: bool,
    },

    /// Process zip archives locally and wait for them to finish
    Submit {
        /// Archives to process
        #[arg(required = true)]
        archives: Vec<PathBuf>,

        /// Display name for the comic (single archive only)
        #[arg(short, long)]
        name: Option<String>,

        /// Delete divergent library/index entries before processing
        #[arg(long)]
        reconcile: bool,
    },

    /// Search comics by content
    Search {
        /// Search query
        query: String,

        /// Number of nearest chapters to consider
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Compare the comic library with the vector index
    Check {
        /// Delete whichever side each divergent chapter exists on
        #[arg(long)]
        reconcile: bool,
    },
}
