//! Numbered markdown output files under `<output_dir>/<company>/`.
//!
//! These files exist for audit and debugging; a write failure is logged and
//! swallowed so it can never sink a report run.

use std::path::{Path, PathBuf};

use crate::sections::SectionId;

pub const FINAL_REPORT_ORDINAL: usize = 8;
pub const EXECUTIVE_SUMMARY_ORDINAL: usize = 9;

/// Writer configured once per run and handed to the executor as its
/// per-chunk persistence hook.
#[derive(Debug, Clone)]
pub struct SectionWriter {
    pub output_dir: PathBuf,
    pub company: String,
    pub generated: String,
}

impl SectionWriter {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        company: impl Into<String>,
        generated: impl Into<String>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            company: company.into(),
            generated: generated.into(),
        }
    }

    pub fn write_section(&self, section: SectionId, content: &str) -> Option<PathBuf> {
        self.write_numbered(
            section.ordinal(),
            &section.file_stem(),
            section.name(),
            content,
        )
    }

    pub fn write_final_report(&self, content: &str) -> Option<PathBuf> {
        self.write_numbered(FINAL_REPORT_ORDINAL, "final_report", "Final Report", content)
    }

    pub fn write_executive_summary(&self, content: &str) -> Option<PathBuf> {
        self.write_numbered(
            EXECUTIVE_SUMMARY_ORDINAL,
            "executive_summary",
            "Executive Summary",
            content,
        )
    }

    fn write_numbered(
        &self,
        ordinal: usize,
        stem: &str,
        title: &str,
        content: &str,
    ) -> Option<PathBuf> {
        if content.trim().is_empty() {
            return None;
        }

        let company_dir = self.output_dir.join(&self.company);
        if let Err(err) = std::fs::create_dir_all(&company_dir) {
            tracing::warn!(
                dir = %company_dir.display(),
                error = %err,
                "failed to create output directory"
            );
            return None;
        }

        let path = company_dir.join(format!("{ordinal}.{stem}.md"));
        let body = format!(
            "**Company:** {}  \n**Section:** {}  \n**Generated:** {}  \n\n{}",
            self.company, title, self.generated, content
        );

        match std::fs::write(&path, body) {
            Ok(()) => Some(path),
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to write output file"
                );
                None
            }
        }
    }

    pub fn company_dir(&self) -> PathBuf {
        self.output_dir.join(&self.company)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer(dir: &Path) -> SectionWriter {
        SectionWriter::new(dir, "acme", "2026-08-07")
    }

    #[test]
    fn writes_numbered_section_file_with_header() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = writer(dir.path())
            .write_section(SectionId::Market, "TAM is $1B")
            .expect("file should be written");

        assert!(path.ends_with("acme/5.market.md"));
        let body = std::fs::read_to_string(path).unwrap();
        assert!(body.starts_with("**Company:** acme"));
        assert!(body.contains("**Section:** Market"));
        assert!(body.ends_with("TAM is $1B"));
    }

    #[test]
    fn skips_empty_content() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(writer(dir.path()).write_section(SectionId::Market, "   ").is_none());
    }

    #[test]
    fn final_report_and_summary_use_reserved_ordinals() {
        let dir = tempfile::tempdir().expect("temp dir");
        let writer = writer(dir.path());
        let report = writer.write_final_report("full report").unwrap();
        let summary = writer.write_executive_summary("summary").unwrap();
        assert!(report.ends_with("acme/8.final_report.md"));
        assert!(summary.ends_with("acme/9.executive_summary.md"));
    }
}
