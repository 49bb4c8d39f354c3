use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "packd", version, about = "Track package builds and answer staleness queries")]
pub struct Cli {
    /// Configuration file to use instead of the platform default
    #[arg(long, global = true, env = "PACKD_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Print the recorded build metadata for a manifest as JSON
    Show {
        manifest_url: String,
    },
    /// Load a manifest, decide whether it needs a rebuild and record the result
    Record {
        manifest_url: String,
        /// Packaging toolchain version the build was made with
        #[arg(long)]
        library_version: String,
        /// Directory or URL prefix to load the manifest from
        #[arg(long)]
        source: Option<String>,
        /// Manifest location relative to the source
        #[arg(long)]
        manifest: Option<String>,
    },
    /// Read `{"installed": {...}}` and print the manifests with newer builds
    Outdated {
        /// Request body file; `-` or nothing reads standard input
        input: Option<PathBuf>,
    },
}
