//! Batched fan-out/fan-in over section flows.
//!
//! Sections are processed in contiguous chunks of `batch_size`, preserving
//! input order. Flows within a chunk run concurrently; the next chunk never
//! starts before the current one has fully settled. `batch_size` is the
//! admission-control knob and `batch_delay` the pacing knob for rate-limited
//! generation and search backends.
//!
//! A failed flow is isolated to its own section: the corresponding report
//! field gets a marked placeholder and the chunk's other members complete
//! normally. Every section in the input list ends up written exactly once.

use std::time::Duration;

use crate::outputs::SectionWriter;
use crate::provider::GenerationService;
use crate::research::{SectionContext, run_section_flow};
use crate::schemas::ReportStructure;
use crate::sections::SectionId;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 2,
            batch_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SectionRun {
    pub section: SectionId,
    pub error: Option<String>,
}

impl SectionRun {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

pub async fn run_batches(
    generation: &dyn GenerationService,
    sections: &[SectionId],
    ctx: &SectionContext,
    report: &mut ReportStructure,
    options: &BatchOptions,
    writer: Option<&SectionWriter>,
) -> Vec<SectionRun> {
    let batch_size = options.batch_size.max(1);
    let chunk_count = sections.len().div_ceil(batch_size);
    let mut runs = Vec::with_capacity(sections.len());

    for (index, chunk) in sections.chunks(batch_size).enumerate() {
        tracing::info!(
            batch = index + 1,
            batches = chunk_count,
            sections = ?chunk.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "starting batch"
        );

        // Flows read a snapshot; the live structure is only written after the
        // whole chunk has settled, so fields stay disjoint per section.
        let snapshot = report.clone();
        let results = futures::future::join_all(chunk.iter().map(|&section| {
            let snapshot = &snapshot;
            async move {
                (
                    section,
                    run_section_flow(generation, section, ctx, snapshot).await,
                )
            }
        }))
        .await;

        for (section, result) in results {
            match result {
                Ok(draft) => {
                    report.set_section_text(section, draft.text.clone());
                    if let Some(writer) = writer {
                        writer.write_section(section, &draft.text);
                    }
                    tracing::info!(section = section.name(), "section completed");
                    runs.push(SectionRun {
                        section,
                        error: None,
                    });
                }
                Err(err) => {
                    report.set_section_text(
                        section,
                        format!("_Section could not be generated: {err}_"),
                    );
                    tracing::warn!(section = section.name(), error = %err, "section flow failed");
                    runs.push(SectionRun {
                        section,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        if options.batch_delay > Duration::ZERO && index + 1 < chunk_count {
            tracing::debug!(delay_secs = options.batch_delay.as_secs(), "pausing between batches");
            tokio::time::sleep(options.batch_delay).await;
        }
    }

    runs
}
