use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "aidflow", about = "Bulk operations and workflow runs for the aid dashboard")]
pub struct Cli {
    /// TOML or JSON config file; defaults apply when omitted.
    #[arg(long, env = "AIDFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Args)]
pub struct BulkRequestArgs {
    #[arg(long)]
    pub entity_type: String,

    #[arg(long)]
    pub action: String,

    /// Comma separated entity ids.
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub ids: Vec<String>,

    /// JSON payload, e.g. '{"tags":["winter-aid"]}'.
    #[arg(long)]
    pub payload: Option<String>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Check a bulk request without running it.
    Validate {
        #[command(flatten)]
        request: BulkRequestArgs,
    },
    /// Run a bulk operation against the dry-run executor and follow its progress.
    Bulk {
        #[command(flatten)]
        request: BulkRequestArgs,

        /// Ids the dry-run executor reports as failed.
        #[arg(long, value_delimiter = ',')]
        fail_ids: Vec<String>,

        /// Simulated latency per entity.
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,

        /// Directory for the CSV produced by `export`; printed when omitted.
        #[arg(long)]
        export_dir: Option<PathBuf>,
    },
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommand,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum WorkflowCommand {
    /// Execute a definition file or a built-in template with dry-run step handlers.
    Run {
        #[arg(long, conflicts_with = "template", required_unless_present = "template")]
        file: Option<PathBuf>,

        #[arg(long)]
        template: Option<String>,

        /// JSON input seeding the run context.
        #[arg(long, default_value = "{}")]
        input: String,
    },
    /// List the built-in workflow templates.
    Templates,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
