use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "shelf")]
#[command(author, version, about = "Bitstream storage and content-delivery server")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the content-delivery server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Ingest a file into the asset store and register its metadata
    Ingest {
        /// File to ingest
        #[arg(required = true)]
        file: PathBuf,

        /// Display name to store (defaults to the file name)
        #[arg(long)]
        name: Option<String>,

        /// MIME type (derived from the file extension if omitted)
        #[arg(long)]
        mime: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
