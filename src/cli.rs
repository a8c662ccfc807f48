//! Command-line interface definitions.
//!
//! All options can be provided via command-line flags; the webhook URL can
//! also come from the environment so the secret stays out of shell history
//! and scheduler definitions.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Which task(s) a single invocation runs. Scheduling is external: a cron
/// entry (or equivalent) invokes the binary with the wanted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Task {
    /// Crawl, filter, persist, and deliver news.
    News,
    /// Crawl, filter, persist, and deliver papers and patents.
    PapersPatents,
    /// Regenerate the static site from the store.
    Site,
    /// All of the above, in order.
    All,
}

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Weekly news run
/// mfg_radar --task news
///
/// # Crawl without persisting or delivering
/// mfg_radar --task papers-patents --dry-run
///
/// # Regenerate the site into a custom directory
/// mfg_radar --task site -o ./public
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Task to run
    #[arg(short, long, value_enum)]
    pub task: Task,

    /// Directory containing keywords.yaml and sources.yaml
    #[arg(short, long, default_value = "config")]
    pub config_dir: PathBuf,

    /// SQLite database file
    #[arg(short, long, default_value = "data/radar.db")]
    pub db_path: PathBuf,

    /// Output directory for the static site
    #[arg(short = 'o', long, default_value = "output/site")]
    pub site_output_dir: PathBuf,

    /// Chat webhook URL for digest delivery
    #[arg(long, env = "DIGEST_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Crawl and process without persisting or delivering
    #[arg(long)]
    pub dry_run: bool,

    /// Persist records but skip webhook delivery
    #[arg(long)]
    pub test: bool,

    /// Send a webhook test message and exit
    #[arg(long)]
    pub test_webhook: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing_defaults() {
        let cli = Cli::parse_from(["mfg_radar", "--task", "news"]);
        assert_eq!(cli.task, Task::News);
        assert_eq!(cli.config_dir, PathBuf::from("config"));
        assert_eq!(cli.db_path, PathBuf::from("data/radar.db"));
        assert!(!cli.dry_run);
        assert!(!cli.test_webhook);
    }

    #[test]
    fn test_cli_task_values() {
        let cli = Cli::parse_from(["mfg_radar", "--task", "papers-patents", "--dry-run"]);
        assert_eq!(cli.task, Task::PapersPatents);
        assert!(cli.dry_run);

        let cli = Cli::parse_from(["mfg_radar", "-t", "all", "--test"]);
        assert_eq!(cli.task, Task::All);
        assert!(cli.test);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "mfg_radar", "-t", "site", "-c", "/etc/radar", "-d", "/tmp/r.db", "-o", "/tmp/site",
        ]);
        assert_eq!(cli.task, Task::Site);
        assert_eq!(cli.config_dir, PathBuf::from("/etc/radar"));
        assert_eq!(cli.site_output_dir, PathBuf::from("/tmp/site"));
    }
}
