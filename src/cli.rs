use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Auto,
    Openai,
    Perplexity,
    Ollama,
}

#[derive(Debug, Subcommand)]
pub enum CompanyCommands {
    #[command(about = "List company source files available in the sources directory")]
    List,
}

#[derive(Debug, Subcommand)]
pub enum CacheCommands {
    #[command(about = "Remove all cached fetch results from disk")]
    Clear,
}

#[derive(Debug, Subcommand)]
pub enum ProfileCommands {
    #[command(about = "List configured profiles and highlight the active profile")]
    List,
    #[command(about = "Show the active profile's resolved runtime settings")]
    Show,
}

#[derive(Debug, Subcommand)]
pub enum TelemetryCommands {
    #[command(about = "Summarize telemetry events from a JSONL stream")]
    Report {
        #[arg(long)]
        path: Option<String>,
        #[arg(long, default_value_t = 5000)]
        limit: usize,
    },
}

const CLI_EXAMPLES: &str = "Examples:\n\
  diligence-cli report tensorstax\n\
  diligence-cli report tensorstax --section Market --section Founders\n\
  diligence-cli --provider openai --model gpt-4.1-mini report baseten\n\
  diligence-cli --batch-size 1 --batch-delay-secs 10 report tensorstax\n\
  diligence-cli organize tensorstax\n\
  diligence-cli section tensorstax \"Competitive Landscape\"\n\
  diligence-cli companies list\n\
  diligence-cli cache clear\n\
  diligence-cli telemetry report --limit 2000\n\
\n\
Switching behavior:\n\
  - Use --provider/--model to switch the generation backend per invocation.\n\
  - Use --profile <name> to load a named profile from the config file.\n\
  - Use --section repeatedly to run a subset of report sections.";

#[derive(Debug, Parser)]
#[command(name = "diligence-cli")]
#[command(about = "Investment due-diligence report generator driven by staged research flows")]
#[command(after_long_help = CLI_EXAMPLES)]
pub struct Cli {
    #[arg(long, env = "DILIGENCE_PROVIDER", value_enum, default_value_t = Provider::Auto)]
    pub provider: Provider,

    #[arg(long, env = "DILIGENCE_MODEL")]
    pub model: Option<String>,

    #[arg(long, env = "DILIGENCE_PROFILE", default_value = "default")]
    pub profile: String,

    #[arg(long, env = "DILIGENCE_CONFIG", default_value = ".diligence/config.toml")]
    pub config_path: String,

    #[arg(long, env = "DILIGENCE_SOURCES_DIR")]
    pub sources_dir: Option<String>,

    #[arg(long, env = "DILIGENCE_OUTPUT_DIR")]
    pub output_dir: Option<String>,

    #[arg(long, env = "DILIGENCE_CACHE_DIR")]
    pub cache_dir: Option<String>,

    #[arg(long, env = "DILIGENCE_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    #[arg(long, env = "DILIGENCE_BATCH_DELAY_SECS")]
    pub batch_delay_secs: Option<u64>,

    #[arg(long, env = "DILIGENCE_MAX_ORGANIZER_ITERATIONS")]
    pub max_organizer_iterations: Option<u32>,

    #[arg(long, env = "DILIGENCE_SEARCH_TERMS")]
    pub search_terms: Option<usize>,

    #[arg(long, env = "DILIGENCE_CANDIDATE_SOURCES")]
    pub candidate_sources: Option<usize>,

    #[arg(long, env = "DILIGENCE_SLACK_MESSAGE_LIMIT")]
    pub slack_message_limit: Option<usize>,

    #[arg(long, env = "DILIGENCE_TELEMETRY_ENABLED", action = clap::ArgAction::Set)]
    pub telemetry_enabled: Option<bool>,

    #[arg(long, env = "DILIGENCE_TELEMETRY_PATH")]
    pub telemetry_path: Option<String>,

    #[arg(long, env = "RUST_LOG", default_value = "warn")]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Run the full diligence pipeline for a company and write the report")]
    Report {
        company: String,
        #[arg(long = "section")]
        section: Vec<String>,
    },
    #[command(about = "Run only the organize-and-validate loop and print the organized data")]
    Organize { company: String },
    #[command(about = "Run a single report section flow and print its output")]
    Section { company: String, name: String },
    #[command(about = "Inspect company source files")]
    Companies {
        #[command(subcommand)]
        command: CompanyCommands,
    },
    #[command(about = "Manage the on-disk fetch cache")]
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    #[command(about = "Validate provider environment and directory configuration")]
    Doctor,
    #[command(about = "Inspect profile configuration and active resolved profile state")]
    Profiles {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    #[command(about = "Telemetry utilities and reporting")]
    Telemetry {
        #[command(subcommand)]
        command: TelemetryCommands,
    },
}

pub fn command_label(command: &Commands) -> String {
    match command {
        Commands::Report { .. } => "report".to_string(),
        Commands::Organize { .. } => "organize".to_string(),
        Commands::Section { .. } => "section".to_string(),
        Commands::Companies { command } => match command {
            CompanyCommands::List => "companies.list".to_string(),
        },
        Commands::Cache { command } => match command {
            CacheCommands::Clear => "cache.clear".to_string(),
        },
        Commands::Doctor => "doctor".to_string(),
        Commands::Profiles { command } => match command {
            ProfileCommands::List => "profiles.list".to_string(),
            ProfileCommands::Show => "profiles.show".to_string(),
        },
        Commands::Telemetry { command } => match command {
            TelemetryCommands::Report { .. } => "telemetry.report".to_string(),
        },
    }
}
