//! Final report assembly.
//!
//! One compile pass turns the populated section fields into a cohesive
//! narrative, and one summary pass distills it for the partner meeting.
//! Neither pass retries; a generation failure here propagates to the caller.

use crate::extract::clean_markdown;
use crate::provider::{GenerationError, GenerationRequest, GenerationService};
use crate::schemas::ReportStructure;
use crate::sections::SectionId;

const EDITOR_SYSTEM: &str =
    "You are the lead editor of an investment firm. You compile section drafts into \
     polished, well-organized due-diligence reports in Markdown.";

pub async fn compile_report(
    generation: &dyn GenerationService,
    company: &str,
    current_date: &str,
    report: &ReportStructure,
) -> Result<String, GenerationError> {
    // Every field is embedded, populated or not; the model is trusted to
    // omit empty sections gracefully.
    let mut sections = String::new();
    for section in SectionId::ALL {
        sections.push_str(&format!(
            "## {}\n\n{}\n\n",
            section.name(),
            report.section_text(section)
        ));
    }

    let prompt = format!(
        "Compile the following section drafts into one cohesive investment \
         due-diligence report on {company}, dated {current_date}.\n\n\
         {sections}\
         Keep every substantiated fact, deduplicate overlapping material, keep the \
         section structure, and return clean Markdown without code fences."
    );

    let output = generation
        .generate(GenerationRequest::new(prompt).with_system(EDITOR_SYSTEM))
        .await?;
    Ok(clean_markdown(&output.text))
}

pub async fn executive_summary(
    generation: &dyn GenerationService,
    company: &str,
    final_report: &str,
) -> Result<String, GenerationError> {
    let prompt = format!(
        "Below is a completed investment due-diligence report on {company}:\n\n\
         {final_report}\n\n\
         Write an executive summary in Markdown: one paragraph of context, the key \
         strengths, the key risks, and a closing recommendation."
    );

    let output = generation
        .generate(GenerationRequest::new(prompt).with_system(EDITOR_SYSTEM))
        .await?;
    Ok(clean_markdown(&output.text))
}
