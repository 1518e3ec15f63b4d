use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::extraction::generator::DEFAULT_MAX_ATTEMPTS;
use crate::pipeline::IngestSettings;

#[derive(Parser, Debug, Clone)]
#[command(name = "jobextract", about = "Config-driven job posting extraction service")]
pub struct Config {
    /// Database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Run database migrations on startup
    #[arg(long, env = "RUN_MIGRATIONS", default_value = "true")]
    pub run_migrations: bool,

    /// Bearer token required by /api/v1. Unset means the API is closed.
    #[arg(long, env = "API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Key for the OpenAI-compatible endpoint. Without it no rulesets are generated.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub openai_model: String,

    /// Per-request timeout for model calls
    #[arg(long, env = "OPENAI_TIMEOUT_SECS", default_value = "60")]
    pub openai_timeout_secs: u64,

    #[arg(long, env = "GENERATION_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub generation_max_attempts: u32,

    /// Overall budget for one generation run; 0 disables it
    #[arg(long, env = "GENERATION_DEADLINE_SECS", default_value = "180")]
    pub generation_deadline_secs: u64,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the web server (default when no subcommand given)
    Serve {
        /// Listen address
        #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
        listen_addr: String,
    },
    /// Ingest one saved page and print the result as JSON
    Extract {
        /// URL the page was fetched from
        #[arg(long)]
        url: String,

        /// File holding the page HTML
        #[arg(long)]
        file: PathBuf,

        /// Only use stored rulesets
        #[arg(long)]
        no_generate: bool,

        /// Do not store the extracted job
        #[arg(long)]
        no_persist: bool,
    },
    /// Load hand-written rulesets from a JSON array
    Seed {
        #[arg(long)]
        file: PathBuf,
    },
}

impl Config {
    /// Resolve the command, defaulting to Serve if none specified.
    pub fn resolved_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve {
            listen_addr: std::env::var("LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        })
    }

    pub fn ingest_settings(&self) -> IngestSettings {
        IngestSettings {
            generate: true,
            max_attempts: self.generation_max_attempts,
            deadline: (self.generation_deadline_secs > 0)
                .then(|| Duration::from_secs(self.generation_deadline_secs)),
        }
    }

    pub fn openai_timeout(&self) -> Duration {
        Duration::from_secs(self.openai_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(
            ["jobextract", "--database-url", "postgres://localhost/jobs"]
                .iter()
                .chain(args),
        )
        .unwrap()
    }

    #[test]
    fn extract_subcommand() {
        let config = parse(&["extract", "--url", "https://a.example/j/1", "--file", "page.html", "--no-persist"]);
        match config.resolved_command() {
            Command::Extract {
                url,
                file,
                no_generate,
                no_persist,
            } => {
                assert_eq!(url, "https://a.example/j/1");
                assert_eq!(file, PathBuf::from("page.html"));
                assert!(!no_generate);
                assert!(no_persist);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn zero_deadline_disables_it() {
        let config = parse(&["--generation-deadline-secs", "0", "--generation-max-attempts", "5"]);
        let settings = config.ingest_settings();
        assert_eq!(settings.deadline, None);
        assert_eq!(settings.max_attempts, 5);
    }
}
