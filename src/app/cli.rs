use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Serve static files with ${VAR} placeholders filled from the environment"
)]
pub struct Cli {
    /// The path for the static files
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// The listening port
    #[arg(long)]
    pub port: Option<u16>,

    /// Comma-separated directories and files to include when scanning for environment variables (relative to path)
    #[arg(long)]
    pub env_include: Option<String>,

    /// Comma-separated directories and files to exclude when scanning for environment variables (relative to path)
    #[arg(long)]
    pub env_exclude: Option<String>,

    /// Start with warnings instead of exiting when environment variables are missing
    /// (`--allow-missing-env=false` overrides a config file that enables it)
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_name = "BOOL"
    )]
    pub allow_missing_env: Option<bool>,

    /// The 'context' path on which files are served, e.g. 'doc' will serve the files at 'http://localhost:<port>/doc/'
    #[arg(long)]
    pub context: Option<String>,

    /// Default fallback file. Either absolute for a specific asset (/index.html), or relative to recursively resolve (index.html)
    #[arg(long)]
    pub fallback: Option<String>,

    /// Enable health check endpoint. You can call /health to get a 200 response
    #[arg(long)]
    pub enable_health: bool,

    /// All HTTP requests should be redirected to HTTPS
    #[arg(long)]
    pub https_promote: bool,

    /// Logging level: error, warn, info or debug (debug logs all requests)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Config file (defaults to ~/.config/envfs/config.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Run the environment variable check and exit
    #[arg(long)]
    pub check_only: bool,

    /// Print a file as it would be served (or list a directory) and exit
    #[arg(long, value_name = "NAME")]
    pub render: Option<String>,
}
