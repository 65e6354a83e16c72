use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "posture")]
#[command(author, version, about = "Cloud security posture scanner")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate rule sets and report findings
    Scan {
        /// Directory containing rule set YAML files
        #[arg(long, default_value = "./rules", env = "POSTURE_RULES_DIR")]
        rules: String,

        /// Directory of JSON fixtures to serve as provider responses
        #[arg(long, env = "POSTURE_FIXTURES_DIR")]
        fixtures: String,

        /// Only scan these services (comma-separated, e.g. s3,iam)
        #[arg(short, long)]
        services: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "console")]
        output: OutputFormat,

        /// Write the report to a file instead of stdout
        #[arg(long)]
        output_file: Option<String>,

        /// Provider-call worker pool width
        #[arg(long, default_value = "8")]
        workers: usize,

        /// Per-call timeout in seconds
        #[arg(long, default_value = "30")]
        call_timeout: u64,

        /// Wall-clock budget for the whole run, in seconds
        #[arg(long)]
        deadline: Option<u64>,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate rule sets without executing anything
    Validate {
        /// Directory containing rule set YAML files
        #[arg(long, default_value = "./rules", env = "POSTURE_RULES_DIR")]
        rules: String,

        /// Only validate these services (comma-separated)
        #[arg(short, long)]
        services: Option<String>,

        /// Also check that every action has a fixture in this directory
        #[arg(long)]
        fixtures: Option<String>,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table on stdout
    Console,
    /// The full run report as pretty-printed JSON
    Json,
}

/// Split a `--services` value into trimmed, non-empty names
pub fn parse_services(raw: Option<&str>) -> Option<Vec<String>> {
    let raw = raw?;
    let services: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    (!services.is_empty()).then_some(services)
}
