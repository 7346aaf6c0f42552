use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::{Cli, Provider};

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub profile: String,
    pub config_path: String,
    pub provider: Provider,
    pub model: Option<String>,
    pub sources_dir: String,
    pub output_dir: String,
    pub cache_dir: String,
    pub batch_size: usize,
    pub batch_delay_secs: u64,
    pub max_organizer_iterations: u32,
    pub search_terms: usize,
    pub candidate_sources: usize,
    pub slack_message_limit: usize,
    pub telemetry_enabled: bool,
    pub telemetry_path: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfilesFile {
    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub sources_dir: Option<String>,
    pub output_dir: Option<String>,
    pub cache_dir: Option<String>,
    pub batch_size: Option<usize>,
    pub batch_delay_secs: Option<u64>,
    pub max_organizer_iterations: Option<u32>,
    pub search_terms: Option<usize>,
    pub candidate_sources: Option<usize>,
    pub slack_message_limit: Option<usize>,
    pub telemetry_enabled: Option<bool>,
    pub telemetry_path: Option<String>,
}

pub fn load_profiles(config_path: &str) -> Result<ProfilesFile> {
    let path = Path::new(config_path);
    if !path.exists() {
        return Ok(ProfilesFile::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read profile config file at '{}'", path.display()))?;
    toml::from_str::<ProfilesFile>(&content).with_context(|| {
        format!(
            "invalid profile configuration in '{}'. Check provider values and field names.",
            path.display()
        )
    })
}

pub fn resolve_runtime_config(cli: &Cli, profiles: &ProfilesFile) -> Result<RuntimeConfig> {
    let selected = cli.profile.trim();
    if selected.is_empty() {
        return Err(anyhow::anyhow!(
            "profile name cannot be empty. Set --profile <name>."
        ));
    }

    let profile = if selected == "default" && !profiles.profiles.contains_key("default") {
        ProfileConfig::default()
    } else {
        profiles.profiles.get(selected).cloned().ok_or_else(|| {
            let mut names = profiles.profiles.keys().cloned().collect::<Vec<String>>();
            names.sort();
            if names.is_empty() {
                anyhow::anyhow!(
                    "profile '{}' not found in '{}'. No profiles are defined yet.",
                    selected,
                    cli.config_path
                )
            } else {
                anyhow::anyhow!(
                    "profile '{}' not found in '{}'. Available profiles: {}",
                    selected,
                    cli.config_path,
                    names.join(", ")
                )
            }
        })?
    };

    let provider = if cli.provider != Provider::Auto {
        cli.provider
    } else {
        profile.provider.unwrap_or(Provider::Auto)
    };

    Ok(RuntimeConfig {
        profile: selected.to_string(),
        config_path: cli.config_path.clone(),
        provider,
        model: cli.model.clone().or(profile.model),
        sources_dir: cli
            .sources_dir
            .clone()
            .or(profile.sources_dir)
            .unwrap_or_else(|| "input_sources".to_string()),
        output_dir: cli
            .output_dir
            .clone()
            .or(profile.output_dir)
            .unwrap_or_else(|| "reports".to_string()),
        cache_dir: cli
            .cache_dir
            .clone()
            .or(profile.cache_dir)
            .unwrap_or_else(|| ".diligence/cache".to_string()),
        batch_size: cli
            .batch_size
            .or(profile.batch_size)
            .unwrap_or(2)
            .max(1),
        batch_delay_secs: cli.batch_delay_secs.or(profile.batch_delay_secs).unwrap_or(0),
        max_organizer_iterations: cli
            .max_organizer_iterations
            .or(profile.max_organizer_iterations)
            .unwrap_or(3)
            .max(1),
        search_terms: cli
            .search_terms
            .or(profile.search_terms)
            .unwrap_or(5)
            .max(1),
        candidate_sources: cli
            .candidate_sources
            .or(profile.candidate_sources)
            .unwrap_or(10)
            .max(1),
        slack_message_limit: cli
            .slack_message_limit
            .or(profile.slack_message_limit)
            .unwrap_or(500)
            .max(1),
        telemetry_enabled: cli
            .telemetry_enabled
            .or(profile.telemetry_enabled)
            .unwrap_or(true),
        telemetry_path: cli
            .telemetry_path
            .clone()
            .or(profile.telemetry_path)
            .unwrap_or_else(|| ".diligence/telemetry/events.jsonl".to_string()),
    })
}
