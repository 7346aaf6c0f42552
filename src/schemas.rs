//! Result shapes produced by the generation service.
//!
//! Every field is optional (or defaults to empty) so that a partially
//! extracted payload never fails hard. Doc comments double as the schema
//! field descriptions that the research prompts enumerate.

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct OrganizerFeedback {
    /// Feedback on the data quality and completeness
    #[serde(default)]
    pub feedback: String,
    /// Whether the organized data is acceptable or needs re-processing
    #[serde(default, deserialize_with = "bool_or_string")]
    pub is_acceptable: bool,
}

/// Generation backends sometimes return `"true"`/`"false"` literals where a
/// boolean was requested. The organizer router branches on this field, so the
/// string forms are accepted here instead of being treated as malformed.
fn bool_or_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    struct TruthyVisitor;

    impl serde::de::Visitor<'_> for TruthyVisitor {
        type Value = bool;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("a boolean or the strings \"true\"/\"false\"")
        }

        fn visit_bool<E>(self, value: bool) -> Result<bool, E> {
            Ok(value)
        }

        fn visit_str<E>(self, value: &str) -> Result<bool, E>
        where
            E: serde::de::Error,
        {
            match value.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Ok(true),
                "false" | "no" => Ok(false),
                other => Err(E::custom(format!("not a truthy string: '{other}'"))),
            }
        }
    }

    deserializer.deserialize_any(TruthyVisitor)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct OrganizedData {
    /// Organized company data in structured JSON format, keyed by category
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CompanyOverview {
    /// Legal or common name of the company
    pub company_name: Option<String>,
    /// Founding year and circumstances
    pub founded: Option<String>,
    /// Headquarters location
    pub headquarters: Option<String>,
    /// One-sentence mission statement
    pub mission: Option<String>,
    /// Funding rounds raised to date
    pub funding_history: Option<Vec<String>>,
    /// Key milestones since founding
    pub key_milestones: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Product {
    /// Product name
    pub name: Option<String>,
    /// What the product does and for whom
    pub description: Option<String>,
    /// Key features or capabilities
    pub key_features: Option<Vec<String>>,
    /// Underlying technology or technical approach
    pub technology: Option<String>,
    /// Pricing or business model
    pub pricing_model: Option<String>,
    /// Notable customers or deployments
    pub notable_customers: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Market {
    /// Total addressable market estimate
    pub total_addressable_market: Option<String>,
    /// Market growth rate
    pub growth_rate: Option<String>,
    /// Relevant market trends
    pub market_trends: Option<Vec<String>>,
    /// Target customer segments
    pub target_segments: Option<Vec<String>>,
    /// Tailwinds supporting the company
    pub tailwinds: Option<Vec<String>>,
    /// Headwinds working against the company
    pub headwinds: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Competitor {
    /// Competitor name
    pub name: Option<String>,
    /// What the competitor offers
    pub description: Option<String>,
    /// How the company differentiates against this competitor
    pub differentiation: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CompetitiveLandscape {
    /// Direct and adjacent competitors
    #[serde(default)]
    pub competitors: Vec<Competitor>,
    /// Durable moat, if any
    pub moat: Option<String>,
    /// Positioning of the company within the landscape
    pub positioning: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Founder {
    /// Full name of the founder
    pub name: Option<String>,
    /// Current role/title in the startup
    pub role: Option<String>,
    /// Narrative background summary
    pub background: Option<String>,
    /// Education history
    pub education: Option<Vec<String>>,
    /// Notable work experience
    pub work_experience: Option<Vec<String>>,
    /// Key achievements, awards, or exits
    pub notable_achievements: Option<Vec<String>>,
    /// Track record in prior ventures or roles
    pub track_record: Option<String>,
    /// Potential concerns or risks related to this founder
    pub red_flags: Option<Vec<String>>,
    /// Link to LinkedIn profile
    pub linkedin_url: Option<String>,
    /// Other relevant online profiles (GitHub, AngelList, etc.)
    pub other_profiles: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FoundersSection {
    /// List of all founders
    #[serde(default)]
    pub founders: Vec<Founder>,
    /// Synthesis of the founding team as a whole
    pub overall_assessment: Option<String>,
    /// Key strengths across the founding team
    pub strengths: Option<Vec<String>>,
    /// Key risks across the founding team
    pub risks: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct WhyInteresting {
    /// Reasons this company is a compelling investment
    pub investment_highlights: Option<Vec<String>>,
    /// What sets the company apart
    pub differentiators: Option<Vec<String>>,
    /// Open questions an investor should resolve
    pub open_questions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ReportConclusion {
    /// Narrative summary of the overall assessment
    pub summary: Option<String>,
    /// Strongest points in favor of investing
    pub key_strengths: Option<Vec<String>>,
    /// Most significant risks identified
    pub key_risks: Option<Vec<String>>,
    /// Overall recommendation
    pub recommendation: Option<String>,
}

/// One text field per report section, all initialized empty. The executor
/// writes each field exactly once when that section's flow settles; the
/// assembler only reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportStructure {
    #[serde(default)]
    pub company_overview_section: String,
    #[serde(default)]
    pub why_interesting_section: String,
    #[serde(default)]
    pub product_section: String,
    #[serde(default)]
    pub competitive_landscape_section: String,
    #[serde(default)]
    pub market_section: String,
    #[serde(default)]
    pub founders_section: String,
    #[serde(default)]
    pub report_conclusion_section: String,
}

/// Render a shape's fields as `- name: description` lines for prompts,
/// mirroring how the shape is described to the generation service.
pub fn schema_description<T: JsonSchema>() -> String {
    let root = schemars::schema_for!(T);
    let mut lines = Vec::new();
    if let Some(object) = root.schema.object {
        for (name, schema) in object.properties {
            let description = match schema {
                schemars::schema::Schema::Object(inner) => {
                    inner.metadata.and_then(|meta| meta.description)
                }
                _ => None,
            };
            lines.push(format!(
                "- {}: {}",
                name,
                description.unwrap_or_else(|| "No description available".to_string())
            ));
        }
    }
    lines.join("\n")
}

/// Full JSON Schema for a shape, attached to generation requests that ask
/// for structured output.
pub fn schema_value<T: JsonSchema>() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default()
}
