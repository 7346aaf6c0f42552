use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_openai::error::OpenAIError;
use async_trait::async_trait;
use serde_json::json;

use crate::cache::{CachedDocumentFetcher, FetchCache};
use crate::cli::{Cli, Commands, Provider};
use crate::config::{ProfilesFile, RuntimeConfig, resolve_runtime_config};
use crate::executor::{BatchOptions, run_batches};
use crate::fetch::{ChannelFetcher, DocumentFetcher, FetchError};
use crate::organizer::run_organizer;
use crate::pipeline::Pipeline;
use crate::provider::{GenerationError, GenerationOutput, GenerationRequest, GenerationService};
use crate::research::SectionContext;
use crate::schemas::ReportStructure;
use crate::sections::SectionId;
use crate::telemetry::{TelemetrySink, summarize_telemetry_lines};

type Responder =
    Box<dyn Fn(usize, &GenerationRequest) -> Result<GenerationOutput, GenerationError> + Send + Sync>;

/// Scripted stand-in for the generation backend. Tests decide responses from
/// the call index and the request itself and can inspect recorded requests.
struct MockGeneration {
    responder: Responder,
    requests: StdMutex<Vec<GenerationRequest>>,
}

impl MockGeneration {
    fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(usize, &GenerationRequest) -> Result<GenerationOutput, GenerationError>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            requests: StdMutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn call_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[async_trait]
impl GenerationService for MockGeneration {
    fn model(&self) -> &str {
        "mock"
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        let index = {
            let mut guard = self.requests.lock().unwrap_or_else(|e| e.into_inner());
            guard.push(request.clone());
            guard.len() - 1
        };
        (self.responder)(index, &request)
    }
}

fn text(content: &str) -> GenerationOutput {
    GenerationOutput {
        text: content.to_string(),
        structured: None,
    }
}

fn generation_error() -> GenerationError {
    GenerationError::Request(OpenAIError::InvalidArgument(
        "generation backend offline".to_string(),
    ))
}

fn schema_name(request: &GenerationRequest) -> &str {
    request
        .response_schema
        .as_ref()
        .map(|schema| schema.name.as_str())
        .unwrap_or("")
}

fn section_ctx() -> SectionContext {
    SectionContext {
        company: "Acme".to_string(),
        current_date: "2026-08-07".to_string(),
        organized_context: "{\"category\": \"notes\"}".to_string(),
        search_terms: 3,
        candidate_sources: 5,
    }
}

fn base_cfg(root: &Path) -> RuntimeConfig {
    RuntimeConfig {
        profile: "default".to_string(),
        config_path: ".diligence/config.toml".to_string(),
        provider: Provider::Auto,
        model: None,
        sources_dir: root.join("input_sources").to_string_lossy().into_owned(),
        output_dir: root.join("reports").to_string_lossy().into_owned(),
        cache_dir: root.join("cache").to_string_lossy().into_owned(),
        batch_size: 2,
        batch_delay_secs: 0,
        max_organizer_iterations: 3,
        search_terms: 3,
        candidate_sources: 5,
        slack_message_limit: 50,
        telemetry_enabled: false,
        telemetry_path: root
            .join("telemetry/events.jsonl")
            .to_string_lossy()
            .into_owned(),
    }
}

fn test_cli(config_path: &str, profile: &str) -> Cli {
    Cli {
        provider: Provider::Auto,
        model: None,
        profile: profile.to_string(),
        config_path: config_path.to_string(),
        sources_dir: None,
        output_dir: None,
        cache_dir: None,
        batch_size: None,
        batch_delay_secs: None,
        max_organizer_iterations: None,
        search_terms: None,
        candidate_sources: None,
        slack_message_limit: None,
        telemetry_enabled: None,
        telemetry_path: None,
        log_filter: "warn".to_string(),
        command: Commands::Doctor,
    }
}

// ---------------------------------------------------------------------------
// Organize-and-validate loop
// ---------------------------------------------------------------------------

const ORGANIZED_JSON: &str = r#"{"data": {"category": "value"}}"#;

#[tokio::test]
async fn organizer_exhausts_iteration_budget_gracefully() {
    let mock = MockGeneration::new(|_, request| {
        if schema_name(request) == "organizer_feedback" {
            Ok(text(r#"{"feedback": "missing details", "is_acceptable": false}"#))
        } else {
            Ok(text(ORGANIZED_JSON))
        }
    });

    let outcome = run_organizer(mock.as_ref(), "Acme", "raw content", "2026-08-07", 3)
        .await
        .expect("loop should finish");

    assert_eq!(outcome.iterations, 3);
    assert!(!outcome.feedback.is_acceptable);
    // One organize pass and one quality check per iteration.
    assert_eq!(mock.call_count(), 6);
    assert_eq!(outcome.organized.data, json!({"category": "value"}));
}

#[tokio::test]
async fn organizer_stops_on_first_acceptance() {
    let mock = MockGeneration::new(|_, request| {
        if schema_name(request) == "organizer_feedback" {
            Ok(text(r#"{"feedback": "complete", "is_acceptable": true}"#))
        } else {
            Ok(text(ORGANIZED_JSON))
        }
    });

    let outcome = run_organizer(mock.as_ref(), "Acme", "raw content", "2026-08-07", 4)
        .await
        .expect("loop should finish");

    assert_eq!(outcome.iterations, 1);
    assert!(outcome.feedback.is_acceptable);
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn organizer_coerces_string_verdicts_and_feeds_back_rejections() {
    let quality_calls = Arc::new(AtomicUsize::new(0));
    let mock = MockGeneration::new({
        let quality_calls = quality_calls.clone();
        move |_, request| {
            if schema_name(request) == "organizer_feedback" {
                if quality_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    // String literal instead of a boolean on the first pass.
                    Ok(text(r#"{"feedback": "too thin", "is_acceptable": "false"}"#))
                } else {
                    Ok(text(r#"{"feedback": "", "is_acceptable": true}"#))
                }
            } else {
                Ok(text(ORGANIZED_JSON))
            }
        }
    });

    let outcome = run_organizer(mock.as_ref(), "Acme", "raw content", "2026-08-07", 2)
        .await
        .expect("loop should finish");

    // Terminated via acceptance on pass 2, not budget exhaustion.
    assert_eq!(outcome.iterations, 2);
    assert!(outcome.feedback.is_acceptable);

    // The second organize pass must carry the rejection context.
    let requests = mock.requests();
    assert_eq!(requests.len(), 4);
    let retry_prompt = &requests[2].prompt;
    assert!(retry_prompt.contains("too thin"));
    assert!(retry_prompt.contains("Previous output"));
}

#[tokio::test]
async fn organizer_treats_quality_check_failure_as_rejection() {
    let quality_calls = Arc::new(AtomicUsize::new(0));
    let mock = MockGeneration::new({
        let quality_calls = quality_calls.clone();
        move |_, request| {
            if schema_name(request) == "organizer_feedback" {
                if quality_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(generation_error())
                } else {
                    Ok(text(r#"{"feedback": "fine", "is_acceptable": true}"#))
                }
            } else {
                Ok(text(ORGANIZED_JSON))
            }
        }
    });

    let outcome = run_organizer(mock.as_ref(), "Acme", "raw content", "2026-08-07", 3)
        .await
        .expect("quality failure must not abort the loop");

    assert_eq!(outcome.iterations, 2);
    assert!(outcome.feedback.is_acceptable);
}

#[tokio::test]
async fn organizer_propagates_organize_call_failure() {
    let mock = MockGeneration::new(|_, request| {
        if schema_name(request) == "organized_data" {
            Err(generation_error())
        } else {
            Ok(text(r#"{"feedback": "", "is_acceptable": true}"#))
        }
    });

    let result = run_organizer(mock.as_ref(), "Acme", "raw content", "2026-08-07", 3).await;
    assert!(result.is_err());
}

// ---------------------------------------------------------------------------
// Batched executor
// ---------------------------------------------------------------------------

const RESEARCH_SECTIONS: [SectionId; 5] = [
    SectionId::CompanyOverview,
    SectionId::Product,
    SectionId::CompetitiveLandscape,
    SectionId::Market,
    SectionId::Founders,
];

fn research_mock() -> Arc<MockGeneration> {
    MockGeneration::new(|_, request| {
        if request.response_schema.is_some() {
            Ok(text(r#"{"name": "payload"}"#))
        } else {
            Ok(text("ranked candidate websites"))
        }
    })
}

#[tokio::test]
async fn executor_populates_every_listed_section_exactly_once() {
    let mock = research_mock();
    let ctx = section_ctx();
    let mut report = ReportStructure::default();
    let options = BatchOptions {
        batch_size: 2,
        batch_delay: Duration::ZERO,
    };

    let runs = run_batches(
        mock.as_ref(),
        &RESEARCH_SECTIONS,
        &ctx,
        &mut report,
        &options,
        None,
    )
    .await;

    assert_eq!(runs.len(), RESEARCH_SECTIONS.len());
    assert!(runs.iter().all(|run| run.succeeded()));
    for section in RESEARCH_SECTIONS {
        assert!(
            !report.section_text(section).is_empty(),
            "section '{}' was not populated",
            section.name()
        );
    }
    // Fields outside the requested list stay untouched.
    assert_eq!(report.section_text(SectionId::WhyInteresting), "");
    assert_eq!(report.section_text(SectionId::ReportConclusion), "");
}

#[tokio::test]
async fn executor_isolates_a_failed_batch_member() {
    let mock = MockGeneration::new(|_, request| match schema_name(request) {
        "product" => Err(generation_error()),
        "" => Ok(text("ranked candidate websites")),
        _ => Ok(text(r#"{"name": "payload"}"#)),
    });
    let ctx = section_ctx();
    let mut report = ReportStructure::default();
    let options = BatchOptions {
        batch_size: 2,
        batch_delay: Duration::ZERO,
    };

    let sections = [SectionId::Market, SectionId::Product];
    let runs = run_batches(mock.as_ref(), &sections, &ctx, &mut report, &options, None).await;

    assert!(runs.iter().any(|run| run.section == SectionId::Product && !run.succeeded()));
    assert!(runs.iter().any(|run| run.section == SectionId::Market && run.succeeded()));
    assert!(!report.section_text(SectionId::Market).is_empty());
    assert!(
        report
            .section_text(SectionId::Product)
            .contains("Section could not be generated")
    );
}

#[tokio::test(start_paused = true)]
async fn executor_pauses_between_batches() {
    let mock = research_mock();
    let ctx = section_ctx();
    let mut report = ReportStructure::default();
    let options = BatchOptions {
        batch_size: 2,
        batch_delay: Duration::from_secs(5),
    };

    let sections = [
        SectionId::CompanyOverview,
        SectionId::Product,
        SectionId::Market,
        SectionId::Founders,
    ];

    let started = tokio::time::Instant::now();
    run_batches(mock.as_ref(), &sections, &ctx, &mut report, &options, None).await;
    let elapsed = started.elapsed();

    // Two chunks: exactly one inter-batch pause, none after the last chunk.
    assert!(elapsed >= Duration::from_secs(5), "no pause observed");
    assert!(elapsed < Duration::from_secs(10), "paused after final chunk");
}

#[tokio::test]
async fn executor_routes_stubbed_payloads_to_matching_fields() {
    let mock = MockGeneration::new(|_, request| match schema_name(request) {
        "market" => Ok(text(r#"{"total_addressable_market": "$1B"}"#)),
        "product" => Ok(text(r#"{"name": "Widget"}"#)),
        "" => Ok(text("ranked candidate websites")),
        other => panic!("unexpected schema '{other}'"),
    });
    let ctx = section_ctx();
    let mut report = ReportStructure::default();
    let options = BatchOptions {
        batch_size: 1,
        batch_delay: Duration::ZERO,
    };

    let sections = [SectionId::Market, SectionId::Product];
    let runs = run_batches(mock.as_ref(), &sections, &ctx, &mut report, &options, None).await;

    assert!(runs.iter().all(|run| run.succeeded()));
    assert!(report.section_text(SectionId::Market).contains("$1B"));
    assert!(report.section_text(SectionId::Product).contains("Widget"));

    // With batch_size 1 the two flows run as sequential chunks: both Market
    // calls settle before the first Product call starts.
    let requests = mock.requests();
    assert_eq!(requests.len(), 4);
    assert!(requests[0].prompt.contains("Market"));
    assert_eq!(schema_name(&requests[1]), "market");
    assert!(requests[2].prompt.contains("Product"));
    assert_eq!(schema_name(&requests[3]), "product");
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

struct StaticDocuments(&'static str);

#[async_trait]
impl DocumentFetcher for StaticDocuments {
    async fn fetch_document(&self, _url: &str) -> Result<String, FetchError> {
        Ok(self.0.to_string())
    }
}

struct CountingDocuments {
    calls: AtomicUsize,
}

#[async_trait]
impl DocumentFetcher for CountingDocuments {
    async fn fetch_document(&self, _url: &str) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("questionnaire body".to_string())
    }
}

struct NoChannels;

#[async_trait]
impl ChannelFetcher for NoChannels {
    async fn fetch_channel_messages(
        &self,
        _channel_id: &str,
        _limit: usize,
    ) -> Result<String, FetchError> {
        Err(FetchError::MissingCredentials(
            "SLACK_BOT_TOKEN is not set".to_string(),
        ))
    }
}

const COMPANY_FILE: &str = r#"{
    "company_name": "Acme",
    "company_sources": [
        {"source": "Google Docs", "identifier": "https://docs.google.com/document/d/abc123/edit", "description": "Questionnaire"},
        {"source": "Slack", "identifier": "C0123456", "description": "Deal channel"}
    ]
}"#;

fn pipeline_mock() -> Arc<MockGeneration> {
    MockGeneration::new(|_, request| {
        match schema_name(request) {
            "organized_data" => return Ok(text(ORGANIZED_JSON)),
            "organizer_feedback" => {
                return Ok(text(r#"{"feedback": "complete", "is_acceptable": true}"#));
            }
            "market" => return Ok(text(r#"{"total_addressable_market": "$1B"}"#)),
            "report_conclusion" => return Ok(text(r#"{"summary": "Invest", "recommendation": "Proceed"}"#)),
            _ => {}
        }

        let prompt = request.prompt.as_str();
        if prompt.contains("Compile the following section drafts") {
            Ok(text("```markdown\n# Acme Diligence Report\n\n---\n\nFull narrative.\n```"))
        } else if prompt.contains("Write an executive summary") {
            Ok(text("# Executive Summary\n\nProceed."))
        } else if prompt.contains("Return the output in Markdown format") {
            Ok(text("Conclusion narrative."))
        } else {
            Ok(text("ranked candidate websites"))
        }
    })
}

#[tokio::test]
async fn pipeline_produces_report_and_writes_output_files() {
    let root = tempfile::tempdir().expect("temp dir");
    let cfg = base_cfg(root.path());

    std::fs::create_dir_all(&cfg.sources_dir).unwrap();
    std::fs::write(Path::new(&cfg.sources_dir).join("acme.json"), COMPANY_FILE).unwrap();

    let mock = pipeline_mock();
    let telemetry = TelemetrySink::new(&cfg, "report".to_string());
    let pipeline = Pipeline::with_services(
        cfg.clone(),
        telemetry,
        mock.clone(),
        Arc::new(StaticDocuments("questionnaire body")),
        Arc::new(NoChannels),
    );

    let outcome = pipeline
        .run_report("acme", &[SectionId::Market, SectionId::ReportConclusion])
        .await
        .expect("pipeline should complete");

    assert_eq!(outcome.company, "Acme");
    assert_eq!(outcome.organizer_iterations, 1);
    assert!(outcome.report.market_section.contains("$1B"));
    assert_eq!(outcome.report.report_conclusion_section, "Conclusion narrative.");
    // Fence and horizontal rule are cleaned out of the compiled report.
    assert_eq!(
        outcome.final_report,
        "# Acme Diligence Report\n\nFull narrative."
    );
    assert!(outcome.executive_summary.contains("Proceed"));

    // The organizer saw the fetched document and the degraded channel note.
    let organize_prompt = &mock.requests()[0].prompt;
    assert!(organize_prompt.contains("questionnaire body"));
    assert!(organize_prompt.contains("Channel history unavailable"));

    let company_dir = Path::new(&cfg.output_dir).join("Acme");
    assert!(company_dir.join("5.market.md").is_file());
    assert!(company_dir.join("7.report_conclusion.md").is_file());
    assert!(company_dir.join("8.final_report.md").is_file());
    assert!(company_dir.join("9.executive_summary.md").is_file());
}

#[tokio::test]
async fn pipeline_fails_when_report_compilation_fails() {
    let root = tempfile::tempdir().expect("temp dir");
    let cfg = base_cfg(root.path());

    std::fs::create_dir_all(&cfg.sources_dir).unwrap();
    std::fs::write(Path::new(&cfg.sources_dir).join("acme.json"), COMPANY_FILE).unwrap();

    let mock = MockGeneration::new(|_, request| {
        if request.prompt.contains("Compile the following section drafts") {
            return Err(generation_error());
        }
        match schema_name(request) {
            "organized_data" => Ok(text(ORGANIZED_JSON)),
            "organizer_feedback" => Ok(text(r#"{"feedback": "", "is_acceptable": true}"#)),
            _ => Ok(text(r#"{"name": "payload"}"#)),
        }
    });
    let telemetry = TelemetrySink::new(&cfg, "report".to_string());
    let pipeline = Pipeline::with_services(
        cfg,
        telemetry,
        mock,
        Arc::new(StaticDocuments("questionnaire body")),
        Arc::new(NoChannels),
    );

    let result = pipeline.run_report("acme", &[SectionId::Market]).await;
    let err = result.expect_err("assembler failure must propagate");
    assert!(format!("{err:#}").contains("failed to compile the final report"));
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cached_fetcher_memoizes_document_fetches() {
    let root = tempfile::tempdir().expect("temp dir");
    let counting = Arc::new(CountingDocuments {
        calls: AtomicUsize::new(0),
    });
    let cache = Arc::new(FetchCache::new(root.path().join("cache")));
    let fetcher = CachedDocumentFetcher::new(counting.clone(), cache);

    let url = "https://docs.google.com/document/d/abc123/edit";
    let first = fetcher.fetch_document(url).await.unwrap();
    let second = fetcher.fetch_document(url).await.unwrap();

    assert_eq!(first, "questionnaire body");
    assert_eq!(first, second);
    assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn profile_values_fill_in_when_cli_flags_are_absent() {
    let profiles: ProfilesFile = toml::from_str(
        r#"
        [profiles.paced]
        batch_size = 1
        batch_delay_secs = 30
        max_organizer_iterations = 4
        model = "gpt-4.1-mini"
        "#,
    )
    .expect("profile toml should parse");

    let cli = test_cli(".diligence/config.toml", "paced");
    let cfg = resolve_runtime_config(&cli, &profiles).expect("config should resolve");

    assert_eq!(cfg.batch_size, 1);
    assert_eq!(cfg.batch_delay_secs, 30);
    assert_eq!(cfg.max_organizer_iterations, 4);
    assert_eq!(cfg.model.as_deref(), Some("gpt-4.1-mini"));
    // Untouched knobs keep their defaults.
    assert_eq!(cfg.search_terms, 5);
    assert_eq!(cfg.candidate_sources, 10);
}

#[test]
fn cli_flags_override_profile_values() {
    let profiles: ProfilesFile = toml::from_str(
        r#"
        [profiles.default]
        batch_size = 4
        "#,
    )
    .unwrap();

    let mut cli = test_cli(".diligence/config.toml", "default");
    cli.batch_size = Some(1);
    let cfg = resolve_runtime_config(&cli, &profiles).unwrap();
    assert_eq!(cfg.batch_size, 1);
}

#[test]
fn batch_size_zero_is_clamped_to_one() {
    let mut cli = test_cli(".diligence/config.toml", "default");
    cli.batch_size = Some(0);
    cli.max_organizer_iterations = Some(0);
    let cfg = resolve_runtime_config(&cli, &ProfilesFile::default()).unwrap();
    assert_eq!(cfg.batch_size, 1);
    assert_eq!(cfg.max_organizer_iterations, 1);
}

#[test]
fn unknown_profile_fields_are_rejected() {
    let parsed = toml::from_str::<ProfilesFile>(
        r#"
        [profiles.default]
        batch_sized = 3
        "#,
    );
    assert!(parsed.is_err());
}

#[test]
fn unknown_profile_name_lists_alternatives() {
    let profiles: ProfilesFile = toml::from_str(
        r#"
        [profiles.paced]
        batch_size = 1
        "#,
    )
    .unwrap();

    let cli = test_cli(".diligence/config.toml", "missing");
    let err = resolve_runtime_config(&cli, &profiles).unwrap_err();
    assert!(err.to_string().contains("paced"));
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

#[test]
fn telemetry_summary_counts_pipeline_events() {
    let lines = vec![
        json!({"event": "command.completed", "run_id": "run-1", "command": "report", "ts_unix_ms": 10}).to_string(),
        json!({"event": "organize.completed", "run_id": "run-1", "command": "report", "iterations": 2}).to_string(),
        json!({"event": "section.completed", "run_id": "run-1", "command": "report"}).to_string(),
        json!({"event": "section.failed", "run_id": "run-1", "command": "report"}).to_string(),
        json!({"event": "source.fetch_failed", "run_id": "run-2", "command": "report"}).to_string(),
        "not json".to_string(),
    ];

    let summary = summarize_telemetry_lines(lines, 100);
    assert_eq!(summary.parsed_events, 5);
    assert_eq!(summary.parse_errors, 1);
    assert_eq!(summary.command_completed, 1);
    assert_eq!(summary.organize_iterations, 2);
    assert_eq!(summary.sections_completed, 1);
    assert_eq!(summary.sections_failed, 1);
    assert_eq!(summary.fetch_failures, 1);
    assert_eq!(summary.unique_runs.len(), 2);
    assert_eq!(summary.last_event_ts_unix_ms, Some(10));
}

#[test]
fn telemetry_sink_is_silent_when_disabled() {
    let root = tempfile::tempdir().expect("temp dir");
    let cfg = base_cfg(root.path());
    let sink = TelemetrySink::new(&cfg, "report".to_string());

    sink.emit("command.completed", json!({}));
    assert!(!Path::new(&cfg.telemetry_path).exists());
}

#[test]
fn telemetry_sink_appends_jsonl_when_enabled() {
    let root = tempfile::tempdir().expect("temp dir");
    let mut cfg = base_cfg(root.path());
    cfg.telemetry_enabled = true;
    let sink = TelemetrySink::new(&cfg, "report".to_string());

    sink.emit("section.completed", json!({"section": "Market"}));
    sink.emit("section.completed", json!({"section": "Product"}));

    let content = std::fs::read_to_string(&cfg.telemetry_path).expect("telemetry file");
    let lines = content.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 2);
    let event: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(event["event"], "section.completed");
    assert_eq!(event["command"], "report");
    assert_eq!(event["section"], "Market");
}
