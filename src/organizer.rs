//! Organize-and-validate loop.
//!
//! Raw source material is organized into structured JSON, then the result is
//! graded by a quality-check pass. Rejections loop back into the next
//! organize pass together with the reviewer's feedback, up to a bounded
//! number of iterations. Running out of budget is not an error; the last
//! organized output is returned as best effort.

use crate::extract::extract_structured;
use crate::provider::{GenerationError, GenerationRequest, GenerationService, ResponseSchema};
use crate::schemas::{self, OrganizedData, OrganizerFeedback};

#[derive(Debug, Clone)]
pub struct OrganizerOutcome {
    pub organized: OrganizedData,
    /// Raw text of the accepted organize pass, used as prompt context by the
    /// section flows.
    pub organized_text: String,
    pub feedback: OrganizerFeedback,
    pub iterations: u32,
}

const ORGANIZER_SYSTEM: &str =
    "You are an excellent data organizer with strong attention to detail. \
     You organize unstructured company data into clean, structured JSON.";

pub async fn run_organizer(
    generation: &dyn GenerationService,
    company: &str,
    raw_source: &str,
    current_date: &str,
    max_iterations: u32,
) -> Result<OrganizerOutcome, GenerationError> {
    let max_iterations = max_iterations.max(1);

    let mut organized = OrganizedData::default();
    let mut organized_text = String::new();
    let mut feedback = OrganizerFeedback::default();
    let mut iterations = 0;

    while iterations < max_iterations {
        iterations += 1;

        // A failed organize call is not recoverable inside the loop; the
        // caller sees it.
        let output = generation
            .generate(organize_request(
                company,
                raw_source,
                current_date,
                &organized_text,
                &feedback.feedback,
            ))
            .await?;
        organized = extract_structured(&output);
        organized_text = output.text.trim().to_string();

        // A failed quality-check call degrades into a rejection carrying the
        // error, so the loop continues instead of aborting.
        feedback = match generation
            .generate(quality_check_request(company, raw_source, &organized_text))
            .await
        {
            Ok(check) => extract_structured::<OrganizerFeedback>(&check),
            Err(err) => {
                tracing::warn!(iteration = iterations, error = %err, "quality check call failed");
                OrganizerFeedback {
                    feedback: format!("Quality check could not run: {err}"),
                    is_acceptable: false,
                }
            }
        };

        if feedback.is_acceptable {
            tracing::info!(iteration = iterations, "organized data accepted");
            break;
        }
        tracing::info!(
            iteration = iterations,
            max_iterations,
            feedback = %preview(&feedback.feedback),
            "organized data rejected"
        );
    }

    Ok(OrganizerOutcome {
        organized,
        organized_text,
        feedback,
        iterations,
    })
}

fn organize_request(
    company: &str,
    raw_source: &str,
    current_date: &str,
    prev_output: &str,
    feedback: &str,
) -> GenerationRequest {
    let mut prompt = format!(
        "Process and extract data from the raw source material about company {company}.\n\
         Below is the raw content gathered from the company's documents and channels:\n\n\
         {raw_source}\n\n\
         Current date: {current_date}\n\
         Organize this data into a structured JSON object keyed by category. \
         Do not omit or over-summarize details that an investor would care about."
    );
    if !feedback.trim().is_empty() {
        prompt.push_str(&format!(
            "\n\nBelow is your previous output and the feedback it received. \
             Use both to improve your response.\n\
             Previous output:\n{prev_output}\n\n\
             Feedback:\n{feedback}\n"
        ));
    }

    GenerationRequest::new(prompt)
        .with_system(ORGANIZER_SYSTEM)
        .with_schema(ResponseSchema {
            name: "organized_data".to_string(),
            schema: schemas::schema_value::<OrganizedData>(),
        })
}

fn quality_check_request(company: &str, raw_source: &str, organized: &str) -> GenerationRequest {
    let prompt = format!(
        "Check the output quality of the data organizer against the raw source data for \
         company {company}. If the output is too summarized and is missing valuable \
         information, it must be returned for re-processing.\n\n\
         Raw source data:\n\n{raw_source}\n\n\
         Organizer output:\n\n{organized}\n\n\
         Be extremely thorough and call out any details that exist in the raw data but \
         are missing from the organizer's output. Respond with a JSON object containing \
         'feedback' and 'is_acceptable'."
    );

    GenerationRequest::new(prompt)
        .with_system(ORGANIZER_SYSTEM)
        .with_schema(ResponseSchema {
            name: "organizer_feedback".to_string(),
            schema: schemas::schema_value::<OrganizerFeedback>(),
        })
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 120;
    if text.len() <= LIMIT {
        return text.to_string();
    }
    let cut = text
        .char_indices()
        .take_while(|(at, _)| *at < LIMIT)
        .last()
        .map(|(at, ch)| at + ch.len_utf8())
        .unwrap_or(0);
    format!("{}...", &text[..cut])
}
