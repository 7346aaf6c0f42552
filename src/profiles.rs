use anyhow::Result;

use crate::config::{ProfilesFile, RuntimeConfig};

pub fn run_profiles_list(profiles: &ProfilesFile, cfg: &RuntimeConfig) -> Result<()> {
    let mut names = profiles.profiles.keys().cloned().collect::<Vec<String>>();
    if !names.iter().any(|name| name == "default") {
        names.push("default".to_string());
    }
    names.sort();

    println!("Configured profiles (active='{}'):", cfg.profile);
    for name in names {
        let marker = if name == cfg.profile { "*" } else { " " };
        let source = if profiles.profiles.contains_key(&name) {
            "configured"
        } else {
            "implicit"
        };
        println!("{marker} {name} ({source})");
    }

    Ok(())
}

pub fn run_profiles_show(cfg: &RuntimeConfig) -> Result<()> {
    println!("Active profile: {}", cfg.profile);
    println!("Config path: {}", cfg.config_path);
    println!("Provider: {:?}", cfg.provider);
    println!(
        "Model: {}",
        cfg.model.as_deref().unwrap_or("<provider-default>")
    );
    println!("Sources dir: {}", cfg.sources_dir);
    println!("Output dir: {}", cfg.output_dir);
    println!("Cache dir: {}", cfg.cache_dir);
    println!("Batch size: {}", cfg.batch_size);
    println!("Batch delay (secs): {}", cfg.batch_delay_secs);
    println!("Organizer max iterations: {}", cfg.max_organizer_iterations);
    println!("Search terms per section: {}", cfg.search_terms);
    println!("Candidate sources per section: {}", cfg.candidate_sources);
    println!("Slack message limit: {}", cfg.slack_message_limit);
    println!("Telemetry enabled: {}", cfg.telemetry_enabled);
    println!("Telemetry path: {}", cfg.telemetry_path);
    Ok(())
}
