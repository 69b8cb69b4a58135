use clap::Parser;
use std::path::PathBuf;

/// duckpond - a serverless SQL table engine over a log-backed object store.
#[derive(Parser, Debug, Clone)]
#[command(name = "duckpond", version, about, long_about = None)]
pub struct Cli {
    /// Path to an optional TOML configuration file.
    #[arg(short, long, env = "DUCKPOND_CONFIG", default_value = "duckpond.toml")]
    pub config: PathBuf,

    /// Listen port.
    #[arg(long = "port", env = "DUCKPOND_PORT")]
    pub port: Option<u16>,

    /// Listen host.
    #[arg(long = "host", env = "DUCKPOND_HOST")]
    pub host: Option<String>,

    /// Act as a one-shot client instead of serving: read one SQL statement
    /// from stdin, POST it to the given endpoint, print the JSON response,
    /// exit non-zero on error.
    #[arg(long = "post", value_name = "/query|/parse")]
    pub post: Option<String>,

    /// Enable `;`-splitting of multi-statement request bodies.
    #[arg(long = "query-splitting", env = "DUCKPOND_QUERY_SPLITTING", num_args = 0..=1, default_missing_value = "true")]
    pub query_splitting: Option<bool>,

    /// `debug|info|warn|error`.
    #[arg(long = "log-level", env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Local filesystem root, used when no S3 bucket is configured.
    #[arg(long = "storage-root", env = "DUCKPOND_STORAGE_ROOT")]
    pub storage_root: Option<PathBuf>,
}

impl Cli {
    pub fn wants_post_mode(&self) -> bool {
        self.post.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["duckpond"]);
        assert_eq!(cli.config, PathBuf::from("duckpond.toml"));
        assert!(cli.port.is_none());
        assert!(cli.post.is_none());
        assert!(!cli.wants_post_mode());
    }

    #[test]
    fn parses_flags() {
        let cli = Cli::parse_from([
            "duckpond",
            "--port",
            "9090",
            "--query-splitting",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.port, Some(9090));
        assert_eq!(cli.query_splitting, Some(true));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn post_mode_flag() {
        let cli = Cli::parse_from(["duckpond", "--post", "/query"]);
        assert!(cli.wants_post_mode());
        assert_eq!(cli.post.as_deref(), Some("/query"));
    }
}
