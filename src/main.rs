use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use diligence_cli::cache::FetchCache;
use diligence_cli::cli::{
    CacheCommands, Cli, Commands, CompanyCommands, ProfileCommands, TelemetryCommands,
    command_label,
};
use diligence_cli::config::{RuntimeConfig, load_profiles, resolve_runtime_config};
use diligence_cli::doctor::run_doctor;
use diligence_cli::error::{categorize_error, format_cli_error, redact_api_keys};
use diligence_cli::inputs::InputReader;
use diligence_cli::pipeline::{Pipeline, ReportOutcome};
use diligence_cli::profiles::{run_profiles_list, run_profiles_show};
use diligence_cli::sections::SectionId;
use diligence_cli::telemetry::{TelemetrySink, run_telemetry_report};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Err(err) = run_cli(cli).await {
        eprintln!("{}", format_cli_error(&err));
        tracing::error!(category = %categorize_error(&err).code(), error = %err, "command failed");
        std::process::exit(1);
    }

    Ok(())
}

async fn run_cli(cli: Cli) -> Result<()> {
    init_tracing(&cli.log_filter)?;
    let profiles = load_profiles(&cli.config_path)?;
    let cfg = resolve_runtime_config(&cli, &profiles)?;
    let telemetry = TelemetrySink::new(&cfg, command_label(&cli.command));

    let result = dispatch(cli, &cfg, &profiles, &telemetry).await;
    match &result {
        Ok(()) => telemetry.emit("command.completed", json!({})),
        Err(err) => telemetry.emit(
            "command.failed",
            json!({"error": redact_api_keys(&format!("{err:#}"))}),
        ),
    }
    result
}

async fn dispatch(
    cli: Cli,
    cfg: &RuntimeConfig,
    profiles: &diligence_cli::config::ProfilesFile,
    telemetry: &TelemetrySink,
) -> Result<()> {
    match cli.command {
        Commands::Report { company, section } => {
            let sections = resolve_sections(&section)?;
            let pipeline = Pipeline::new(cfg.clone(), telemetry.clone())?;
            let outcome = pipeline.run_report(&company, &sections).await?;
            print_report_outcome(&outcome);
        }
        Commands::Organize { company } => {
            let pipeline = Pipeline::new(cfg.clone(), telemetry.clone())?;
            let outcome = pipeline.run_organizer_only(&company).await?;
            println!(
                "Organize loop finished after {} pass(es); acceptable={}",
                outcome.iterations, outcome.feedback.is_acceptable
            );
            if !outcome.feedback.feedback.trim().is_empty() {
                println!("Reviewer feedback: {}", outcome.feedback.feedback.trim());
            }
            println!();
            println!("{}", outcome.organized_text);
        }
        Commands::Section { company, name } => {
            let section = SectionId::parse(&name)?;
            let pipeline = Pipeline::new(cfg.clone(), telemetry.clone())?;
            let draft = pipeline.run_single_section(&company, section).await?;
            println!("{}", draft.text);
        }
        Commands::Companies { command } => match command {
            CompanyCommands::List => {
                let reader = InputReader::new(&cfg.sources_dir)?;
                let companies = reader.list_available_companies()?;
                if companies.is_empty() {
                    println!(
                        "No company files found in '{}'. Add '<company>.json' to get started.",
                        cfg.sources_dir
                    );
                } else {
                    println!("Available companies ({}):", companies.len());
                    for company in companies {
                        println!("- {company}");
                    }
                }
            }
        },
        Commands::Cache { command } => match command {
            CacheCommands::Clear => {
                let cache = FetchCache::new(&cfg.cache_dir);
                cache.clear()?;
                println!("Cleared fetch cache at '{}'.", cfg.cache_dir);
            }
        },
        Commands::Doctor => run_doctor(cfg)?,
        Commands::Profiles { command } => match command {
            ProfileCommands::List => run_profiles_list(profiles, cfg)?,
            ProfileCommands::Show => run_profiles_show(cfg)?,
        },
        Commands::Telemetry { command } => match command {
            TelemetryCommands::Report { path, limit } => {
                run_telemetry_report(cfg, path, limit)?
            }
        },
    }

    Ok(())
}

fn resolve_sections(requested: &[String]) -> Result<Vec<SectionId>> {
    if requested.is_empty() {
        return Ok(SectionId::ALL.to_vec());
    }

    let mut sections = Vec::with_capacity(requested.len());
    for name in requested {
        let section = SectionId::parse(name)?;
        if !sections.contains(&section) {
            sections.push(section);
        }
    }
    Ok(sections)
}

fn print_report_outcome(outcome: &ReportOutcome) {
    let failed = outcome
        .section_runs
        .iter()
        .filter(|run| !run.succeeded())
        .collect::<Vec<_>>();

    println!();
    println!(
        "Report for {} completed in {} ({} organizer pass(es))",
        outcome.company,
        format_elapsed(outcome.elapsed),
        outcome.organizer_iterations
    );
    println!(
        "Sections: {} completed, {} failed",
        outcome.section_runs.len() - failed.len(),
        failed.len()
    );
    for run in failed {
        println!(
            "- {} failed: {}",
            run.section.name(),
            run.error.as_deref().unwrap_or("unknown error")
        );
    }
    if let Some(path) = &outcome.report_path {
        println!("Report: {}", path.display());
    }
    if let Some(path) = &outcome.summary_path {
        println!("Executive summary: {}", path.display());
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

fn init_tracing(filter: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter)
        .with_context(|| format!("invalid log filter '{filter}'"))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialize tracing: {err}"))
}
