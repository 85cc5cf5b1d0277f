use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hlscast")]
#[command(author, version, about = "Cast a local media file as a live HLS stream")]
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
    /// Start casting a file and serve it until interrupted
    Cast {
        /// Media file to cast
        #[arg(required = true)]
        input: PathBuf,

        /// Subtitle file to burn into the video
        #[arg(short, long)]
        subtitles: Option<PathBuf>,

        /// Encoder backends in order of preference (e.g. "nvenc,software")
        #[arg(long)]
        hw: Option<String>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (0 picks a free port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Maximum output height
        #[arg(long)]
        max_height: Option<u32>,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
