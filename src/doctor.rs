use std::path::Path;

use anyhow::Result;

use crate::config::RuntimeConfig;
use crate::inputs::InputReader;
use crate::provider::{detect_provider, env_present};

pub fn run_doctor(cfg: &RuntimeConfig) -> Result<()> {
    println!(
        "Active profile: '{}' (config: {})",
        cfg.profile, cfg.config_path
    );

    let checks = [
        ("OPENAI_API_KEY", env_present("OPENAI_API_KEY")),
        ("PERPLEXITY_API_KEY", env_present("PERPLEXITY_API_KEY")),
        ("OLLAMA_HOST", env_present("OLLAMA_HOST")),
        ("SLACK_BOT_TOKEN", env_present("SLACK_BOT_TOKEN")),
    ];

    println!("Provider environment check:");
    for (key, ok) in checks {
        let status = if ok { "set" } else { "missing" };
        println!("- {key}: {status}");
    }

    match detect_provider() {
        Some(provider) => println!("Auto provider resolution: {provider:?}"),
        None => {
            println!("Auto provider resolution: none");
            println!("Tip: export one provider key or run with --provider ollama");
        }
    }

    match InputReader::new(&cfg.sources_dir) {
        Ok(reader) => {
            let companies = reader.list_available_companies().unwrap_or_default();
            println!(
                "Sources directory: '{}' ({} company file(s))",
                cfg.sources_dir,
                companies.len()
            );
            if companies.is_empty() {
                println!("Tip: add '<company>.json' files describing input sources.");
            }
        }
        Err(err) => println!("Sources directory: {err}"),
    }

    println!(
        "Output directory: '{}' ({})",
        cfg.output_dir,
        dir_status(&cfg.output_dir)
    );
    println!(
        "Cache directory: '{}' ({})",
        cfg.cache_dir,
        dir_status(&cfg.cache_dir)
    );

    println!(
        "Model: {} (provider {:?})",
        cfg.model.as_deref().unwrap_or("<provider-default>"),
        cfg.provider
    );
    println!(
        "Batching: batch_size={} batch_delay_secs={}",
        cfg.batch_size, cfg.batch_delay_secs
    );
    println!(
        "Organizer: max_iterations={} search_terms={} candidate_sources={}",
        cfg.max_organizer_iterations, cfg.search_terms, cfg.candidate_sources
    );
    println!(
        "Telemetry: enabled={} path={}",
        cfg.telemetry_enabled, cfg.telemetry_path
    );

    Ok(())
}

fn dir_status(path: &str) -> &'static str {
    let path = Path::new(path);
    if path.is_dir() {
        "exists"
    } else {
        "will be created on first run"
    }
}
