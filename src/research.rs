//! Per-section flows.
//!
//! Research sections run two generation steps: a free-text discovery pass
//! that proposes search terms and ranks candidate sources, then a synthesis
//! pass that fills the section's result shape from those candidates plus the
//! organized context. Keeping discovery unstructured lets the model reason
//! about source selection cheaply before it commits to strict structured
//! output, which measurably lowers the malformed-output rate.
//!
//! Composed sections (Why Interesting, Report Conclusion) skip the web and
//! are derived from the already-populated report structure: one structured
//! compose pass, then a markdown writing pass.

use crate::extract::clean_markdown;
use crate::provider::{GenerationError, GenerationRequest, GenerationService};
use crate::schemas::ReportStructure;
use crate::sections::{SectionId, SectionKind};

/// Shared inputs handed to every section flow in a run.
#[derive(Debug, Clone)]
pub struct SectionContext {
    pub company: String,
    pub current_date: String,
    /// Accepted output of the organize-and-validate loop.
    pub organized_context: String,
    pub search_terms: usize,
    pub candidate_sources: usize,
}

#[derive(Debug, Clone)]
pub struct SectionDraft {
    pub section: SectionId,
    /// Payload validated against the section's result shape.
    pub payload: serde_json::Value,
    /// Text written into the report structure field.
    pub text: String,
}

const RESEARCHER_SYSTEM: &str =
    "You are an excellent researcher compiling sections of an investment due-diligence \
     report. You ground every claim in the provided sources and say so when data is missing.";

const WRITER_SYSTEM: &str =
    "You are an expert writer who creates clear, concise, and well-structured \
     sections for investment reports.";

pub async fn run_section_flow(
    generation: &dyn GenerationService,
    section: SectionId,
    ctx: &SectionContext,
    report: &ReportStructure,
) -> Result<SectionDraft, GenerationError> {
    match section.kind() {
        SectionKind::Research => run_research_flow(generation, section, ctx).await,
        SectionKind::Composed => run_composed_flow(generation, section, ctx, report).await,
    }
}

async fn run_research_flow(
    generation: &dyn GenerationService,
    section: SectionId,
    ctx: &SectionContext,
) -> Result<SectionDraft, GenerationError> {
    tracing::info!(section = section.name(), "discovering candidate sources");
    let discovery = generation.generate(discover_request(section, ctx)).await?;

    tracing::info!(section = section.name(), "synthesizing section payload");
    // The candidate list passes through verbatim; only synthesis output goes
    // through the extractor.
    let synthesis = generation
        .generate(synthesize_request(section, ctx, &discovery.text))
        .await?;

    Ok(draft_from_structured(section, &synthesis))
}

async fn run_composed_flow(
    generation: &dyn GenerationService,
    section: SectionId,
    ctx: &SectionContext,
    report: &ReportStructure,
) -> Result<SectionDraft, GenerationError> {
    tracing::info!(section = section.name(), "composing section from report");
    let composed = generation
        .generate(compose_request(section, ctx, report))
        .await?;
    let payload = section.extract_payload(&composed);

    tracing::info!(section = section.name(), "writing section markdown");
    let written = generation
        .generate(write_request(section, ctx, &payload))
        .await?;

    let mut text = clean_markdown(&written.text);
    if text.is_empty() {
        text = serde_json::to_string_pretty(&payload).unwrap_or_default();
    }

    Ok(SectionDraft {
        section,
        payload,
        text,
    })
}

fn draft_from_structured(
    section: SectionId,
    output: &crate::provider::GenerationOutput,
) -> SectionDraft {
    let payload = section.extract_payload(output);
    let mut text = clean_markdown(&output.text);
    if text.is_empty() {
        text = serde_json::to_string_pretty(&payload).unwrap_or_default();
    }
    SectionDraft {
        section,
        payload,
        text,
    }
}

fn discover_request(section: SectionId, ctx: &SectionContext) -> GenerationRequest {
    let prompt = format!(
        "Perform thorough web research on the company {company} for the {section} section \
         of an investment report.\n\n\
         Your goal is to list {candidates} websites that provide comprehensive information \
         on the following topics:\n\n{topics}\n\n\
         To do so, follow these steps:\n\n\
         1. Come up with a list of {terms} relevant search terms.\n\n\
         2. Perform a search for each term.\n\n\
         3. Compile a ranked list of the top {candidates} websites that will help gather \
         information for all these data points.\n\n\
         Today's date: {date}\n",
        company = ctx.company,
        section = section.name(),
        candidates = ctx.candidate_sources,
        terms = ctx.search_terms,
        topics = section.schema_description(),
        date = ctx.current_date,
    );

    GenerationRequest::new(prompt).with_system(RESEARCHER_SYSTEM)
}

fn synthesize_request(
    section: SectionId,
    ctx: &SectionContext,
    candidates: &str,
) -> GenerationRequest {
    let prompt = format!(
        "You are researching the {section} section of an investment report on the company \
         {company}.\n\n\
         You are given a list of relevant websites below:\n\n{candidates}\n\n\
         You also have curated internal notes about the company:\n\n{context}\n\n\
         Use the websites and the notes to produce a JSON object covering:\n\n{topics}\n\n\
         Leave out fields you cannot substantiate rather than guessing.",
        section = section.name(),
        company = ctx.company,
        candidates = candidates,
        context = ctx.organized_context,
        topics = section.schema_description(),
    );

    GenerationRequest::new(prompt)
        .with_system(RESEARCHER_SYSTEM)
        .with_schema(section.response_schema())
}

fn compose_request(
    section: SectionId,
    ctx: &SectionContext,
    report: &ReportStructure,
) -> GenerationRequest {
    let prompt = format!(
        "You are given the following curated information about the company {company}:\n\n\
         {digest}\n\
         Internal notes:\n\n{context}\n\n\
         Using this data, populate a JSON object for the {section} section of the \
         investment report, covering:\n\n{topics}",
        company = ctx.company,
        digest = report.digest(),
        context = ctx.organized_context,
        section = section.name(),
        topics = section.schema_description(),
    );

    GenerationRequest::new(prompt)
        .with_system(WRITER_SYSTEM)
        .with_schema(section.response_schema())
}

fn write_request(
    section: SectionId,
    ctx: &SectionContext,
    payload: &serde_json::Value,
) -> GenerationRequest {
    let prompt = format!(
        "You are given the following curated information for the {section} section of an \
         investment report on company {company}:\n\n{payload}\n\n\
         Using this data, write a comprehensive and well-structured section for the \
         investment report. Ensure clarity, conciseness, and coherence. \
         Return the output in Markdown format.",
        section = section.name(),
        company = ctx.company,
        payload = serde_json::to_string_pretty(payload).unwrap_or_default(),
    );

    GenerationRequest::new(prompt).with_system(WRITER_SYSTEM)
}
