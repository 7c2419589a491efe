use std::path::PathBuf;

use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};

/// Top-level CLI entry point.
#[derive(Debug, Parser)]
#[command(
    name = "vigil",
    version,
    author,
    about = "Vigil content moderation pipeline"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(global = true, short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            command: None,
            verbose: 0,
        }
    }
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn print_help() {
        let mut cmd = Cli::command();
        let _ = cmd.print_help();
        println!();
    }
}

/// Supported subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the full pipeline for an uploaded object in the library bucket.
    Process(ProcessArgs),
    /// Split a local document into its artifacts without moderating them.
    Extract(ExtractArgs),
    /// Deliver a video moderation job completion callback.
    VideoCallback(VideoCallbackArgs),
    /// Show where a source document currently sits.
    Status(StatusArgs),
}

/// Moderate one uploaded object end to end.
#[derive(Debug, Args)]
pub struct ProcessArgs {
    /// Object key as delivered by the store trigger (may be transport-encoded).
    #[arg(value_name = "KEY")]
    pub key: String,
    /// Treat the key as an object already in the processing bucket instead of
    /// a fresh library upload.
    #[arg(long)]
    pub processing: bool,
}

/// Extract artifacts from a local file and write them to a directory.
#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Document to split (pdf, docx, or pptx).
    #[arg(value_name = "FILE")]
    pub input: PathBuf,
    /// Directory the artifacts are written into.
    #[arg(long, value_name = "DIR", default_value = "artifacts")]
    pub output: PathBuf,
}

/// Deliver a callback payload, either inline or from a file.
#[derive(Debug, Args)]
pub struct VideoCallbackArgs {
    /// JSON payload `{"job_id", "bucket", "key"}`; `@path` reads it from a file.
    #[arg(value_name = "PAYLOAD")]
    pub payload: String,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Source document key.
    #[arg(value_name = "KEY")]
    pub key: String,
}
