//! Command Line Interface
//!
//! Flags for the config file location and log verbosity.

use std::path::PathBuf;

use clap::Parser;

/// Static asset server for single page applications
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// JSON config file, missing files fall back to defaults
    #[arg(
        short,
        long,
        env = "SPA_CONFIG_FILE",
        default_value = "config.json",
        value_hint = clap::ValueHint::FilePath
    )]
    pub config: PathBuf,

    /// Log at info level
    #[arg(short, long)]
    pub verbose: bool,

    /// Log errors only
    #[arg(short, long)]
    pub quiet: bool,

    /// Log at debug level
    #[arg(short, long)]
    pub debug: bool,

    /// Log at trace level
    #[arg(short, long)]
    pub trace: bool,
}

impl Cli {
    /// Effective log level. The most verbose flag wins over `configured`.
    pub fn log_level<'a>(&self, configured: &'a str) -> &'a str {
        if self.trace {
            "trace"
        } else if self.debug {
            "debug"
        } else if self.verbose {
            "info"
        } else if self.quiet {
            "error"
        } else {
            configured
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_parse() {
        let cli = Cli::try_parse_from(["spa_server", "-c", "site.json", "-d"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("site.json"));
        assert!(cli.debug);
        assert!(!cli.trace);
    }

    #[test]
    fn test_log_level_precedence() {
        let cli = Cli::try_parse_from(["spa_server", "-c", "x.json", "-q", "-v"]).unwrap();
        assert_eq!(cli.log_level("warn"), "info");

        let cli = Cli::try_parse_from(["spa_server", "-c", "x.json", "-q"]).unwrap();
        assert_eq!(cli.log_level("warn"), "error");

        let cli = Cli::try_parse_from(["spa_server", "-c", "x.json", "-t", "-d"]).unwrap();
        assert_eq!(cli.log_level("warn"), "trace");
    }

    #[test]
    fn test_log_level_from_config() {
        let cli = Cli::try_parse_from(["spa_server", "-c", "x.json"]).unwrap();
        assert_eq!(cli.log_level("debug"), "debug");
    }
}
