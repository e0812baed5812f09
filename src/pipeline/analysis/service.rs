use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinError;
use uuid::Uuid;

use super::compliance::{
    audit_attribution, enforce, narrative_text, AttributionAudit, ComplianceOutcome,
};
use super::engine::AnalysisEngine;
use super::notify::{NotificationDispatcher, Notifier};
use super::orchestrator::run;
use super::types::{AnalysisResult, ReportMode};
use crate::config::AnalysisConfig;
use crate::pipeline::attribution::build;
use crate::pipeline::extraction::{degraded_document, normalize_document, NormalizedText};
use crate::pipeline::import::UploadedDocument;

/// Final attributed report handed back to the HTTP layer.
#[derive(Debug, Clone, Serialize)]
pub struct AttributedReport {
    pub request_id: Uuid,
    pub stock_code: String,
    pub report_mode: ReportMode,
    /// Label of the trusted document, `None` when none was uploaded.
    pub source_label: Option<String>,
    /// `None` when the engine produced no report.
    pub result: Option<AnalysisResult>,
    pub compliance: Option<ComplianceOutcome>,
    /// Tagging statistics of the engine's narrative, before enforcement.
    pub audit: Option<AttributionAudit>,
    /// Reportable conditions: degraded ingestion, missing result,
    /// enforcement misses.
    pub diagnostics: Vec<String>,
}

/// End-to-end entry point: normalize → build contract → run → enforce.
///
/// Holds no per-request state; concurrent `analyze` calls share nothing but
/// the engine and notifier handles.
#[derive(Clone)]
pub struct AnalysisService {
    config: Arc<AnalysisConfig>,
    engine: Arc<dyn AnalysisEngine>,
    notifier: Option<NotificationDispatcher>,
}

impl AnalysisService {
    pub fn new(config: AnalysisConfig, engine: Arc<dyn AnalysisEngine>) -> Self {
        Self {
            config: Arc::new(config),
            engine,
            notifier: None,
        }
    }

    /// Announce results through an existing dispatcher.
    pub fn with_dispatcher(mut self, dispatcher: NotificationDispatcher) -> Self {
        self.notifier = Some(dispatcher);
        self
    }

    /// Start a notification worker sized by `notification_queue_capacity`.
    /// Must be called inside a tokio runtime. The worker stops once the last
    /// clone of this service is dropped.
    pub fn with_notifier(self, notifier: Arc<dyn Notifier>) -> Self {
        let capacity = self.config.notification_queue_capacity;
        let (dispatcher, _worker) = NotificationDispatcher::spawn(notifier, capacity);
        tracing::debug!(capacity, "Notification worker started");
        self.with_dispatcher(dispatcher)
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub async fn analyze(
        &self,
        stock_code: &str,
        report_mode: ReportMode,
        document: Option<&UploadedDocument>,
    ) -> AttributedReport {
        let mut diagnostics = Vec::new();

        // Step 1: Normalize the trusted document, if any
        let (trusted_body, trusted_label) = match document {
            Some(document) => {
                tracing::info!(
                    filename = %document.declared_filename(),
                    format = document.detected_format().as_str(),
                    size_bytes = document.size_bytes(),
                    "Trusted document attached"
                );
                let normalized = self.normalize_off_runtime(document).await;
                if let Some(diagnostic) = normalized.outcome.diagnostic() {
                    diagnostics.push(diagnostic.to_string());
                }
                (normalized.body, normalized.source_label)
            }
            None => (String::new(), self.config.default_document_label.clone()),
        };

        // Step 2: Attribution contract
        let instruction = build(&trusted_body, &trusted_label);

        // Step 3: Engine call
        let analysis = run(
            self.engine.as_ref(),
            stock_code,
            report_mode,
            instruction.clone(),
            self.notifier.as_ref(),
        )
        .await;

        if analysis.result.is_none() {
            diagnostics.push(format!(
                "analysis engine produced no result for {}",
                analysis.request.stock_code()
            ));
        }

        // Step 4: Audit the raw narrative, then enforce
        let audit = analysis
            .result
            .as_ref()
            .and_then(|result| narrative_text(result, &self.config.narrative_fields))
            .map(|narrative| audit_attribution(&narrative));

        let enforced = enforce(analysis.result, &instruction, &self.config.narrative_fields);
        let (result, compliance) = match enforced {
            Some(enforced) => {
                if let Some(diagnostic) = enforced.outcome.diagnostic() {
                    diagnostics.push(diagnostic.to_string());
                }
                (Some(enforced.result), Some(enforced.outcome))
            }
            None => (None, None),
        };

        tracing::info!(
            request_id = %analysis.request.request_id(),
            stock_code = %analysis.request.stock_code(),
            has_result = result.is_some(),
            diagnostics = diagnostics.len(),
            "Analysis finished"
        );

        AttributedReport {
            request_id: analysis.request.request_id(),
            stock_code: analysis.request.stock_code().to_string(),
            report_mode,
            source_label: instruction.trusted_label().map(str::to_string),
            result,
            compliance,
            audit,
            diagnostics,
        }
    }

    /// Parsing PDFs and workbooks is CPU-bound; keep it off the async workers.
    async fn normalize_off_runtime(&self, document: &UploadedDocument) -> NormalizedText {
        let owned = document.clone();
        let config = Arc::clone(&self.config);
        let joined =
            tokio::task::spawn_blocking(move || normalize_document(&owned, &config)).await;
        normalized_or_degraded(joined, document, &self.config)
    }
}

fn normalized_or_degraded(
    joined: Result<NormalizedText, JoinError>,
    document: &UploadedDocument,
    config: &AnalysisConfig,
) -> NormalizedText {
    joined.unwrap_or_else(|e| {
        tracing::warn!(
            filename = %document.declared_filename(),
            error = %e,
            "Document normalization task failed"
        );
        degraded_document(document, config, &e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analysis::orchestrator::tests::StubEngine;
    use crate::pipeline::analysis::notify::Notification;
    use crate::pipeline::analysis::types::AnalysisRequest;
    use crate::pipeline::analysis::AnalysisError;
    use crate::pipeline::attribution::CONFLICT_HEADING;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Echoes the context it was given back as the narrative.
    struct EchoEngine;

    #[async_trait]
    impl AnalysisEngine for EchoEngine {
        async fn invoke(
            &self,
            request: &AnalysisRequest,
        ) -> Result<Option<AnalysisResult>, AnalysisError> {
            tokio::task::yield_now().await;
            Ok(Some(
                AnalysisResult::new().with_field("analysis", request.context_text()),
            ))
        }
    }

    fn service(engine: Arc<dyn AnalysisEngine>) -> AnalysisService {
        AnalysisService::new(AnalysisConfig::default(), engine)
    }

    #[tokio::test]
    async fn full_flow_prefixes_instruction_once() {
        let engine = Arc::new(StubEngine::returning(Some(
            AnalysisResult::new().with_field("analysis", "原文..."),
        )));
        let doc = UploadedDocument::new("营业收入 1741 亿元".as_bytes().to_vec(), "年报.txt");

        let report = service(engine.clone())
            .analyze("600519", ReportMode::Full, Some(&doc))
            .await;

        let narrative = report.result.as_ref().unwrap().get_str("analysis").unwrap();
        let sent_context = engine.seen.lock().unwrap()[0].2.clone();
        assert_eq!(narrative, format!("{sent_context}\n\n原文..."));
        assert!(narrative.contains("《年报.txt》"));
        assert_eq!(report.source_label.as_deref(), Some("年报.txt"));
        assert_eq!(
            report.compliance,
            Some(ComplianceOutcome::Applied { field: "analysis".into() })
        );
        assert_eq!(report.audit.unwrap().untagged, 1);
        assert!(report.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn without_document_declares_database_only() {
        let engine = Arc::new(StubEngine::returning(Some(
            AnalysisResult::new().with_field("report", "x"),
        )));
        let report = service(engine.clone())
            .analyze("600519", ReportMode::Simple, None)
            .await;

        assert!(report.source_label.is_none());
        let context = engine.seen.lock().unwrap()[0].2.clone();
        assert!(context.contains(CONFLICT_HEADING));
        assert!(!context.contains("【文件开始】"));
    }

    #[tokio::test]
    async fn corrupt_upload_still_runs_with_diagnostic() {
        let engine = Arc::new(StubEngine::returning(Some(
            AnalysisResult::new().with_field("analysis", "x"),
        )));
        let doc = UploadedDocument::new(b"\x00not a pdf".to_vec(), "bad.pdf");

        let report = service(engine.clone())
            .analyze("600519", ReportMode::Full, Some(&doc))
            .await;

        assert!(report.result.is_some());
        assert_eq!(report.diagnostics.len(), 1);
        assert!(report.diagnostics[0].starts_with("format parse failed for bad.pdf"));
        let context = engine.seen.lock().unwrap()[0].2.clone();
        assert!(context.contains("format parse failed for bad.pdf"));
    }

    #[tokio::test]
    async fn no_result_is_reported() {
        let engine = Arc::new(StubEngine::returning(None));
        let report = service(engine).analyze("000000", ReportMode::Simple, None).await;
        assert!(report.result.is_none());
        assert!(report.compliance.is_none());
        assert!(report.audit.is_none());
        assert_eq!(
            report.diagnostics,
            vec!["analysis engine produced no result for 000000".to_string()]
        );
    }

    #[tokio::test]
    async fn enforcement_miss_is_a_diagnostic() {
        let engine = Arc::new(StubEngine::returning(Some(
            AnalysisResult::new().with_field("summary", "x"),
        )));
        let report = service(engine).analyze("600519", ReportMode::Full, None).await;
        assert_eq!(report.result.unwrap().get_str("summary"), Some("x"));
        assert_eq!(report.diagnostics.len(), 1);
        assert!(report.diagnostics[0].starts_with("attribution not enforced"));
    }

    #[tokio::test]
    async fn concurrent_analyses_do_not_mix_documents() {
        let service = service(Arc::new(EchoEngine));
        let doc_a = UploadedDocument::new(b"alpha figures".to_vec(), "a.txt");
        let doc_b = UploadedDocument::new(b"beta figures".to_vec(), "b.txt");

        let (a, b) = tokio::join!(
            service.analyze("600519", ReportMode::Full, Some(&doc_a)),
            service.analyze("600519", ReportMode::Full, Some(&doc_b)),
        );

        let text_a = a.result.unwrap().get_str("analysis").unwrap().to_string();
        let text_b = b.result.unwrap().get_str("analysis").unwrap().to_string();
        assert!(text_a.contains("alpha figures") && !text_a.contains("beta figures"));
        assert!(text_b.contains("beta figures") && !text_b.contains("alpha figures"));
        assert_ne!(a.request_id, b.request_id);
    }

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, notification: &Notification) -> Result<(), AnalysisError> {
            self.seen.lock().unwrap().push(notification.stock_code.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn with_notifier_delivers_results() {
        let notifier = Arc::new(RecordingNotifier::default());
        let config = AnalysisConfig {
            notification_queue_capacity: 2,
            ..AnalysisConfig::default()
        };
        let engine = Arc::new(StubEngine::returning(Some(
            AnalysisResult::new().with_field("analysis", "x"),
        )));
        let service = AnalysisService::new(config, engine).with_notifier(notifier.clone());

        service.analyze("600519", ReportMode::Full, None).await;

        for _ in 0..200 {
            if !notifier.seen.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(*notifier.seen.lock().unwrap(), vec!["600519"]);
        assert_eq!(service.config().notification_queue_capacity, 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn normalization_runs_off_the_async_worker() {
        let service = service(Arc::new(EchoEngine));
        let doc = UploadedDocument::new(b"code,close\n600519,1469.00\n".to_vec(), "px.csv");
        let runtime_thread = std::thread::current().id();

        let normalized = service.normalize_off_runtime(&doc).await;
        assert_eq!(normalized, normalize_document(&doc, service.config()));

        let worker_thread = tokio::task::spawn_blocking(|| std::thread::current().id())
            .await
            .unwrap();
        assert_ne!(worker_thread, runtime_thread);
    }

    #[tokio::test]
    async fn lost_normalization_task_becomes_diagnostic() {
        let doc = UploadedDocument::new(b"%PDF".to_vec(), "annual.pdf");
        let joined =
            tokio::task::spawn_blocking(|| -> NormalizedText { panic!("parser thread died") })
                .await;
        assert!(joined.is_err());

        let normalized = normalized_or_degraded(joined, &doc, &AnalysisConfig::default());
        assert!(normalized.is_degraded());
        assert!(normalized.body.contains("format parse failed for annual.pdf: "));
    }
}
