//! Closed catalog of report sections.
//!
//! Each section name maps statically to its result shape, its report-structure
//! field, and its numbered output file. Unknown section names are rejected when
//! arguments are parsed, never at write time.

use anyhow::Result;

use crate::extract::extract_structured;
use crate::provider::{GenerationOutput, ResponseSchema};
use crate::schemas::{
    self, CompanyOverview, CompetitiveLandscape, FoundersSection, Market, Product,
    ReportConclusion, ReportStructure, WhyInteresting,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionId {
    CompanyOverview,
    WhyInteresting,
    Product,
    CompetitiveLandscape,
    Market,
    Founders,
    ReportConclusion,
}

/// Research sections gather fresh web candidates before synthesizing; composed
/// sections are derived from the already-populated report structure and run
/// after the research group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Research,
    Composed,
}

impl SectionId {
    pub const ALL: [SectionId; 7] = [
        SectionId::CompanyOverview,
        SectionId::WhyInteresting,
        SectionId::Product,
        SectionId::CompetitiveLandscape,
        SectionId::Market,
        SectionId::Founders,
        SectionId::ReportConclusion,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SectionId::CompanyOverview => "Company Overview",
            SectionId::WhyInteresting => "Why Interesting",
            SectionId::Product => "Product",
            SectionId::CompetitiveLandscape => "Competitive Landscape",
            SectionId::Market => "Market",
            SectionId::Founders => "Founders",
            SectionId::ReportConclusion => "Report Conclusion",
        }
    }

    pub fn parse(value: &str) -> Result<SectionId> {
        let normalized = value
            .trim()
            .to_ascii_lowercase()
            .replace(['-', '_'], " ");
        let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

        SectionId::ALL
            .into_iter()
            .find(|section| section.name().to_ascii_lowercase() == normalized)
            .ok_or_else(|| {
                let known = SectionId::ALL
                    .into_iter()
                    .map(SectionId::name)
                    .collect::<Vec<_>>()
                    .join(", ");
                anyhow::anyhow!("unknown section '{}'. Known sections: {}", value.trim(), known)
            })
    }

    pub fn kind(self) -> SectionKind {
        match self {
            SectionId::WhyInteresting | SectionId::ReportConclusion => SectionKind::Composed,
            _ => SectionKind::Research,
        }
    }

    /// Position used for numbered section output files.
    pub fn ordinal(self) -> usize {
        match self {
            SectionId::CompanyOverview => 1,
            SectionId::WhyInteresting => 2,
            SectionId::Product => 3,
            SectionId::CompetitiveLandscape => 4,
            SectionId::Market => 5,
            SectionId::Founders => 6,
            SectionId::ReportConclusion => 7,
        }
    }

    pub fn file_stem(self) -> String {
        self.name().to_ascii_lowercase().replace(' ', "_")
    }

    /// `- field: description` lines for this section's result shape.
    pub fn schema_description(self) -> String {
        match self {
            SectionId::CompanyOverview => schemas::schema_description::<CompanyOverview>(),
            SectionId::WhyInteresting => schemas::schema_description::<WhyInteresting>(),
            SectionId::Product => schemas::schema_description::<Product>(),
            SectionId::CompetitiveLandscape => {
                schemas::schema_description::<CompetitiveLandscape>()
            }
            SectionId::Market => schemas::schema_description::<Market>(),
            SectionId::Founders => schemas::schema_description::<FoundersSection>(),
            SectionId::ReportConclusion => schemas::schema_description::<ReportConclusion>(),
        }
    }

    pub fn response_schema(self) -> ResponseSchema {
        let schema = match self {
            SectionId::CompanyOverview => schemas::schema_value::<CompanyOverview>(),
            SectionId::WhyInteresting => schemas::schema_value::<WhyInteresting>(),
            SectionId::Product => schemas::schema_value::<Product>(),
            SectionId::CompetitiveLandscape => schemas::schema_value::<CompetitiveLandscape>(),
            SectionId::Market => schemas::schema_value::<Market>(),
            SectionId::Founders => schemas::schema_value::<FoundersSection>(),
            SectionId::ReportConclusion => schemas::schema_value::<ReportConclusion>(),
        };
        ResponseSchema {
            name: self.file_stem(),
            schema,
        }
    }

    /// Run generation output through the extractor against this section's
    /// shape, returning the validated payload as a JSON value.
    pub fn extract_payload(self, output: &GenerationOutput) -> serde_json::Value {
        fn to_value<T: serde::Serialize>(payload: T) -> serde_json::Value {
            serde_json::to_value(payload).unwrap_or_default()
        }

        match self {
            SectionId::CompanyOverview => to_value(extract_structured::<CompanyOverview>(output)),
            SectionId::WhyInteresting => to_value(extract_structured::<WhyInteresting>(output)),
            SectionId::Product => to_value(extract_structured::<Product>(output)),
            SectionId::CompetitiveLandscape => {
                to_value(extract_structured::<CompetitiveLandscape>(output))
            }
            SectionId::Market => to_value(extract_structured::<Market>(output)),
            SectionId::Founders => to_value(extract_structured::<FoundersSection>(output)),
            SectionId::ReportConclusion => {
                to_value(extract_structured::<ReportConclusion>(output))
            }
        }
    }
}

impl std::fmt::Display for SectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl ReportStructure {
    pub fn field_name(section: SectionId) -> &'static str {
        match section {
            SectionId::CompanyOverview => "company_overview_section",
            SectionId::WhyInteresting => "why_interesting_section",
            SectionId::Product => "product_section",
            SectionId::CompetitiveLandscape => "competitive_landscape_section",
            SectionId::Market => "market_section",
            SectionId::Founders => "founders_section",
            SectionId::ReportConclusion => "report_conclusion_section",
        }
    }

    pub fn section_text(&self, section: SectionId) -> &str {
        match section {
            SectionId::CompanyOverview => &self.company_overview_section,
            SectionId::WhyInteresting => &self.why_interesting_section,
            SectionId::Product => &self.product_section,
            SectionId::CompetitiveLandscape => &self.competitive_landscape_section,
            SectionId::Market => &self.market_section,
            SectionId::Founders => &self.founders_section,
            SectionId::ReportConclusion => &self.report_conclusion_section,
        }
    }

    pub fn set_section_text(&mut self, section: SectionId, text: String) {
        match section {
            SectionId::CompanyOverview => self.company_overview_section = text,
            SectionId::WhyInteresting => self.why_interesting_section = text,
            SectionId::Product => self.product_section = text,
            SectionId::CompetitiveLandscape => self.competitive_landscape_section = text,
            SectionId::Market => self.market_section = text,
            SectionId::Founders => self.founders_section = text,
            SectionId::ReportConclusion => self.report_conclusion_section = text,
        }
    }

    /// Markdown digest of the populated sections, used as context for
    /// composed sections. Empty sections are skipped.
    pub fn digest(&self) -> String {
        let mut out = String::new();
        for section in SectionId::ALL {
            let text = self.section_text(section);
            if text.trim().is_empty() {
                continue;
            }
            out.push_str(&format!("## {}\n\n{}\n\n", section.name(), text.trim()));
        }
        out
    }
}
