use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueHint};

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    help_template = "{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}",
    arg_required_else_help = true
)]
pub struct Args {
    /// Set output verbosity
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress outputs
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output as json
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Disable colors in output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Disable progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Provide custom config file
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<String>,

    /// Set proxy
    #[arg(required = false, long, short = 'P', global = true)]
    pub proxy: Option<String>,

    /// Set request headers
    #[arg(required = false, long, short = 'H', global = true)]
    pub header: Option<Vec<String>>,

    /// Set user agent
    #[arg(required = false, long, short = 'A', global = true)]
    pub user_agent: Option<String>,

    /// Request timeout in seconds
    #[arg(required = false, long, global = true)]
    pub timeout: Option<u64>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sync repositories into the local store
    #[clap(name = "sync", visible_alias = "S")]
    Sync {
        /// Repositories to sync (default: every enabled repository)
        #[arg(required = false)]
        repos: Vec<String>,

        /// Keep the latest progress snapshot of each repository in this file
        #[arg(required = false, long, value_hint = ValueHint::FilePath)]
        snapshot: Option<PathBuf>,
    },

    /// Show the progress report stored in a snapshot file
    #[command(arg_required_else_help = true)]
    Status {
        /// Snapshot file written by `sync --snapshot`
        #[arg(value_hint = ValueHint::FilePath)]
        snapshot: PathBuf,
    },

    /// List configured repositories and the index files they publish
    #[clap(name = "repos", visible_alias = "repositories")]
    Repos,

    /// Print the configuration file to stdout
    Config,
}
