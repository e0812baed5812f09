use super::engine::AnalysisEngine;
use super::notify::{Notification, NotificationDispatcher};
use super::types::{AnalysisRequest, AnalysisResult, ReportMode};
use crate::pipeline::attribution::AttributionInstruction;

/// Outcome of one orchestrated engine call.
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    pub request: AnalysisRequest,
    /// `None` when the engine produced no report or failed.
    pub result: Option<AnalysisResult>,
}

/// Run one analysis: fresh request id, exactly one engine call, optional
/// fire-and-forget notification.
///
/// Engine failures are logged and surface as `result: None`; no report is
/// ever synthesized. Notification is only queued for a real result and never
/// awaited.
pub async fn run(
    engine: &dyn AnalysisEngine,
    stock_code: &str,
    report_mode: ReportMode,
    instruction: AttributionInstruction,
    notifier: Option<&NotificationDispatcher>,
) -> AnalysisRun {
    let request = AnalysisRequest::new(stock_code, report_mode, instruction);

    tracing::info!(
        request_id = %request.request_id(),
        stock_code = %request.stock_code(),
        report_mode = %request.report_mode(),
        requested_at = %request.requested_at().to_rfc3339(),
        context_length = request.context_text().len(),
        "Invoking analysis engine"
    );

    let result = match engine.invoke(&request).await {
        Ok(Some(result)) => {
            tracing::info!(
                request_id = %request.request_id(),
                fields = result.field_names().count(),
                "Analysis engine returned a result"
            );
            Some(result)
        }
        Ok(None) => {
            tracing::info!(
                request_id = %request.request_id(),
                stock_code = %request.stock_code(),
                "Analysis engine returned no result"
            );
            None
        }
        Err(e) => {
            tracing::warn!(
                request_id = %request.request_id(),
                stock_code = %request.stock_code(),
                error = %e,
                "Analysis engine call failed"
            );
            None
        }
    };

    if let (Some(dispatcher), Some(result)) = (notifier, result.as_ref()) {
        let queued = dispatcher.dispatch(Notification {
            request_id: request.request_id(),
            stock_code: request.stock_code().to_string(),
            report_mode: request.report_mode(),
            result: result.clone(),
        });
        tracing::debug!(request_id = %request.request_id(), queued, "Notification dispatched");
    }

    AnalysisRun { request, result }
}
