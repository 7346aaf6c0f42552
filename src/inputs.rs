//! Per-company input source files.
//!
//! Each company has a JSON file in the sources directory naming the Google
//! Docs, Slack channels, and other material that feed the report.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    #[serde(rename = "Google Docs")]
    GoogleDocs,
    Slack,
    Webpage,
    #[serde(rename = "PDF")]
    Pdf,
    Email,
    Database,
    #[serde(rename = "API")]
    Api,
}

impl SourceKind {
    pub fn label(self) -> &'static str {
        match self {
            SourceKind::GoogleDocs => "Google Docs",
            SourceKind::Slack => "Slack",
            SourceKind::Webpage => "Webpage",
            SourceKind::Pdf => "PDF",
            SourceKind::Email => "Email",
            SourceKind::Database => "Database",
            SourceKind::Api => "API",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSource {
    pub source: SourceKind,
    pub identifier: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSourcesData {
    pub company_name: String,
    pub company_sources: Vec<InputSource>,
    #[serde(default)]
    pub reference_sources: Vec<InputSource>,
}

impl InputSourcesData {
    fn validate(&self, file_label: &str) -> Result<()> {
        if self.company_name.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "company file '{}' has an empty company_name",
                file_label
            ));
        }
        if self.company_sources.is_empty() {
            return Err(anyhow::anyhow!(
                "company file '{}' must list at least one company source",
                file_label
            ));
        }
        for source in self.company_sources.iter().chain(&self.reference_sources) {
            if source.identifier.trim().is_empty() {
                return Err(anyhow::anyhow!(
                    "company file '{}' has a {} source with an empty identifier",
                    file_label,
                    source.source.label()
                ));
            }
        }
        Ok(())
    }

    pub fn sources_of_kind(&self, kind: SourceKind) -> Vec<&InputSource> {
        self.company_sources
            .iter()
            .filter(|source| source.source == kind)
            .collect()
    }
}

/// Format company sources as a prompt-ready digest, optionally filtered by
/// kind.
pub fn format_sources_by_kind(data: &InputSourcesData, kind: Option<SourceKind>) -> String {
    let sources = data
        .company_sources
        .iter()
        .filter(|source| kind.is_none_or(|k| source.source == k))
        .collect::<Vec<_>>();

    if sources.is_empty() {
        return match kind {
            Some(kind) => format!("No {} sources found.", kind.label()),
            None => "No sources found.".to_string(),
        };
    }

    sources
        .iter()
        .map(|source| {
            format!(
                "- {}: {} ({})",
                source.source.label(),
                source.identifier,
                source.description
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct InputReader {
    sources_dir: PathBuf,
}

impl InputReader {
    pub fn new(sources_dir: impl Into<PathBuf>) -> Result<Self> {
        let sources_dir = sources_dir.into();
        if !sources_dir.is_dir() {
            return Err(anyhow::anyhow!(
                "sources directory not found: '{}'",
                sources_dir.display()
            ));
        }
        Ok(Self { sources_dir })
    }

    /// Accepts either a bare company name (`acme`) or a file name
    /// (`acme.json`).
    pub fn read_company_sources(&self, company: &str) -> Result<InputSourcesData> {
        let file_name = if company.ends_with(".json") {
            company.to_string()
        } else {
            format!("{company}.json")
        };
        let path = self.sources_dir.join(&file_name);

        if !path.exists() {
            let available = self.list_available_companies().unwrap_or_default();
            return Err(if available.is_empty() {
                anyhow::anyhow!(
                    "company file '{}' not found in '{}'",
                    file_name,
                    self.sources_dir.display()
                )
            } else {
                anyhow::anyhow!(
                    "company file '{}' not found in '{}'. Available companies: {}",
                    file_name,
                    self.sources_dir.display(),
                    available.join(", ")
                )
            });
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read company file '{}'", path.display()))?;
        let data: InputSourcesData = serde_json::from_str(&content)
            .with_context(|| format!("invalid JSON in company file '{}'", path.display()))?;
        data.validate(&file_name)?;
        Ok(data)
    }

    /// Company names (file stems) available in the sources directory, sorted.
    pub fn list_available_companies(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.sources_dir).with_context(|| {
            format!(
                "failed to read sources directory '{}'",
                self.sources_dir.display()
            )
        })?;

        let mut companies = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| {
                    format!(
                        "failed to read entry in sources directory '{}'",
                        self.sources_dir.display()
                    )
                })?
                .path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(stem) = path.file_stem().and_then(|stem| stem.to_str())
            {
                companies.push(stem.to_string());
            }
        }
        companies.sort();
        Ok(companies)
    }

    pub fn sources_dir(&self) -> &Path {
        &self.sources_dir
    }
}
