//! Top-level diligence pipeline.
//!
//! Stages: load company sources, fetch documents and channel digests through
//! the memo cache, run the organize-and-validate loop, fan the report
//! sections out in batches, then assemble the final report and executive
//! summary. Missing or unreachable sources degrade to placeholder content
//! rather than blocking the run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::json;

use crate::assembler;
use crate::cache::{CachedChannelFetcher, CachedDocumentFetcher, FetchCache};
use crate::config::RuntimeConfig;
use crate::executor::{BatchOptions, SectionRun, run_batches};
use crate::fetch::{ChannelFetcher, DocumentFetcher, GoogleDocFetcher, SlackChannelFetcher};
use crate::inputs::{InputReader, InputSourcesData, SourceKind};
use crate::organizer::{OrganizerOutcome, run_organizer};
use crate::outputs::SectionWriter;
use crate::provider::{GenerationService, resolve_generation};
use crate::research::{SectionContext, SectionDraft, run_section_flow};
use crate::schemas::ReportStructure;
use crate::sections::{SectionId, SectionKind};
use crate::telemetry::TelemetrySink;

pub struct Pipeline {
    cfg: RuntimeConfig,
    generation: Arc<dyn GenerationService>,
    documents: Arc<dyn DocumentFetcher>,
    channels: Arc<dyn ChannelFetcher>,
    telemetry: TelemetrySink,
}

#[derive(Debug)]
pub struct ReportOutcome {
    pub company: String,
    pub report: ReportStructure,
    pub final_report: String,
    pub executive_summary: String,
    pub section_runs: Vec<SectionRun>,
    pub organizer_iterations: u32,
    pub report_path: Option<PathBuf>,
    pub summary_path: Option<PathBuf>,
    pub elapsed: Duration,
}

impl Pipeline {
    pub fn new(cfg: RuntimeConfig, telemetry: TelemetrySink) -> Result<Self> {
        let (generation, provider, model) = resolve_generation(&cfg)?;
        tracing::info!(provider = ?provider, model = %model, "using generation backend");
        telemetry.emit(
            "model.resolved",
            json!({
                "provider": format!("{provider:?}").to_ascii_lowercase(),
                "model": model,
            }),
        );

        let cache = Arc::new(FetchCache::new(&cfg.cache_dir));
        let documents: Arc<dyn DocumentFetcher> = Arc::new(CachedDocumentFetcher::new(
            Arc::new(GoogleDocFetcher::new().context("failed to build document fetcher")?),
            cache.clone(),
        ));
        let channels: Arc<dyn ChannelFetcher> = Arc::new(CachedChannelFetcher::new(
            Arc::new(SlackChannelFetcher::from_env().context("failed to build channel fetcher")?),
            cache,
        ));

        Ok(Self {
            cfg,
            generation,
            documents,
            channels,
            telemetry,
        })
    }

    /// Construction with explicit collaborators; the only path tests use.
    pub fn with_services(
        cfg: RuntimeConfig,
        telemetry: TelemetrySink,
        generation: Arc<dyn GenerationService>,
        documents: Arc<dyn DocumentFetcher>,
        channels: Arc<dyn ChannelFetcher>,
    ) -> Self {
        Self {
            cfg,
            generation,
            documents,
            channels,
            telemetry,
        }
    }

    pub async fn run_report(
        &self,
        company: &str,
        requested: &[SectionId],
    ) -> Result<ReportOutcome> {
        let started = Instant::now();
        let current_date = today();

        let (data, raw_source) = self.load_sources(company).await?;
        let organizer = self.organize(&data, &raw_source, &current_date).await?;

        let ctx = SectionContext {
            company: data.company_name.clone(),
            current_date: current_date.clone(),
            organized_context: organizer.organized_text.clone(),
            search_terms: self.cfg.search_terms,
            candidate_sources: self.cfg.candidate_sources,
        };

        let writer = SectionWriter::new(
            &self.cfg.output_dir,
            data.company_name.clone(),
            current_date.clone(),
        );
        let options = BatchOptions {
            batch_size: self.cfg.batch_size,
            batch_delay: Duration::from_secs(self.cfg.batch_delay_secs),
        };

        // Composed sections read the populated structure, so the research
        // group runs first. Order within each group follows the request.
        let research: Vec<SectionId> = requested
            .iter()
            .copied()
            .filter(|section| section.kind() == SectionKind::Research)
            .collect();
        let composed: Vec<SectionId> = requested
            .iter()
            .copied()
            .filter(|section| section.kind() == SectionKind::Composed)
            .collect();

        let mut report = ReportStructure::default();
        let mut section_runs = Vec::with_capacity(requested.len());

        println!(
            "Researching {} section(s) in batches of {}...",
            research.len(),
            options.batch_size
        );
        section_runs.extend(
            run_batches(
                self.generation.as_ref(),
                &research,
                &ctx,
                &mut report,
                &options,
                Some(&writer),
            )
            .await,
        );

        if !composed.is_empty() {
            println!("Composing {} derived section(s)...", composed.len());
            section_runs.extend(
                run_batches(
                    self.generation.as_ref(),
                    &composed,
                    &ctx,
                    &mut report,
                    &options,
                    Some(&writer),
                )
                .await,
            );
        }

        for run in &section_runs {
            match &run.error {
                None => self.telemetry.emit(
                    "section.completed",
                    json!({"section": run.section.name()}),
                ),
                Some(error) => self.telemetry.emit(
                    "section.failed",
                    json!({"section": run.section.name(), "error": error}),
                ),
            }
        }

        println!("Compiling final report...");
        let final_report = assembler::compile_report(
            self.generation.as_ref(),
            &data.company_name,
            &current_date,
            &report,
        )
        .await
        .context("failed to compile the final report")?;

        let executive_summary = assembler::executive_summary(
            self.generation.as_ref(),
            &data.company_name,
            &final_report,
        )
        .await
        .context("failed to write the executive summary")?;

        let report_path = writer.write_final_report(&final_report);
        let summary_path = writer.write_executive_summary(&executive_summary);

        let elapsed = started.elapsed();
        self.telemetry.emit(
            "report.completed",
            json!({
                "company": data.company_name,
                "sections": section_runs.len(),
                "failed_sections": section_runs.iter().filter(|run| !run.succeeded()).count(),
                "elapsed_ms": elapsed.as_millis() as u64,
            }),
        );

        Ok(ReportOutcome {
            company: data.company_name,
            report,
            final_report,
            executive_summary,
            section_runs,
            organizer_iterations: organizer.iterations,
            report_path,
            summary_path,
            elapsed,
        })
    }

    pub async fn run_organizer_only(&self, company: &str) -> Result<OrganizerOutcome> {
        let current_date = today();
        let (data, raw_source) = self.load_sources(company).await?;
        self.organize(&data, &raw_source, &current_date).await
    }

    pub async fn run_single_section(
        &self,
        company: &str,
        section: SectionId,
    ) -> Result<SectionDraft> {
        let current_date = today();
        let (data, raw_source) = self.load_sources(company).await?;
        let organizer = self.organize(&data, &raw_source, &current_date).await?;

        let ctx = SectionContext {
            company: data.company_name.clone(),
            current_date,
            organized_context: organizer.organized_text,
            search_terms: self.cfg.search_terms,
            candidate_sources: self.cfg.candidate_sources,
        };

        let report = ReportStructure::default();
        let draft = run_section_flow(self.generation.as_ref(), section, &ctx, &report)
            .await
            .with_context(|| format!("section flow for '{}' failed", section.name()))?;
        Ok(draft)
    }

    async fn organize(
        &self,
        data: &InputSourcesData,
        raw_source: &str,
        current_date: &str,
    ) -> Result<OrganizerOutcome> {
        println!(
            "Organizing source data for {} (up to {} passes)...",
            data.company_name, self.cfg.max_organizer_iterations
        );
        let outcome = run_organizer(
            self.generation.as_ref(),
            &data.company_name,
            raw_source,
            current_date,
            self.cfg.max_organizer_iterations,
        )
        .await
        .context("organize loop failed")?;

        self.telemetry.emit(
            "organize.completed",
            json!({
                "company": data.company_name,
                "iterations": outcome.iterations,
                "acceptable": outcome.feedback.is_acceptable,
            }),
        );
        Ok(outcome)
    }

    /// Fetch every company source, degrading failures to placeholders so a
    /// single unreachable document or channel never blocks the pipeline.
    async fn load_sources(&self, company: &str) -> Result<(InputSourcesData, String)> {
        let reader = InputReader::new(&self.cfg.sources_dir)?;
        let data = reader.read_company_sources(company)?;

        println!(
            "Fetching {} source(s) for {}...",
            data.company_sources.len(),
            data.company_name
        );

        let mut combined = String::new();
        for source in &data.company_sources {
            match source.source {
                SourceKind::GoogleDocs => {
                    combined.push_str(&format!("\n\n=== {} ===\n", source.description));
                    match self.documents.fetch_document(&source.identifier).await {
                        Ok(content) => combined.push_str(&content),
                        Err(err) => {
                            tracing::warn!(
                                identifier = %source.identifier,
                                error = %err,
                                "document fetch failed"
                            );
                            self.telemetry.emit(
                                "source.fetch_failed",
                                json!({"identifier": source.identifier, "error": err.to_string()}),
                            );
                            combined
                                .push_str(&format!("Error: could not fetch document: {err}"));
                        }
                    }
                }
                SourceKind::Slack => {
                    combined.push_str(&format!(
                        "\n\n# Channel: {}\nDescription: {}\n",
                        source.identifier, source.description
                    ));
                    match self
                        .channels
                        .fetch_channel_messages(&source.identifier, self.cfg.slack_message_limit)
                        .await
                    {
                        Ok(content) if !content.trim().is_empty() => combined.push_str(&content),
                        Ok(_) => combined.push_str("No messages available."),
                        Err(err) => {
                            tracing::warn!(
                                channel = %source.identifier,
                                error = %err,
                                "channel fetch failed"
                            );
                            self.telemetry.emit(
                                "source.fetch_failed",
                                json!({"identifier": source.identifier, "error": err.to_string()}),
                            );
                            combined.push_str(&format!(
                                "Channel history unavailable: {err}"
                            ));
                        }
                    }
                }
                other => {
                    // Listed for the organizer's awareness; no fetcher exists
                    // for these kinds.
                    combined.push_str(&format!(
                        "\n\n=== {} ({}) ===\nIdentifier: {}\n",
                        source.description,
                        other.label(),
                        source.identifier
                    ));
                }
            }
        }

        Ok((data, combined.trim().to_string()))
    }
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}
