use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::AnalysisError;
use crate::pipeline::attribution::AttributionInstruction;

/// Analysis depth selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportMode {
    /// Brief report.
    Simple,
    /// Detailed report.
    Full,
}

impl ReportMode {
    /// Map the upload form's `full_report` flag.
    pub fn from_full_flag(full_report: bool) -> Self {
        if full_report {
            Self::Full
        } else {
            Self::Simple
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for ReportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One analysis invocation. The `request_id` is random per request and only
/// correlates logs; it is never derived from the stock code or the clock.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    request_id: Uuid,
    stock_code: String,
    report_mode: ReportMode,
    instruction: AttributionInstruction,
    requested_at: DateTime<Utc>,
}

impl AnalysisRequest {
    pub fn new(
        stock_code: &str,
        report_mode: ReportMode,
        instruction: AttributionInstruction,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            stock_code: stock_code.trim().to_string(),
            report_mode,
            instruction,
            requested_at: Utc::now(),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn stock_code(&self) -> &str {
        &self.stock_code
    }

    pub fn report_mode(&self) -> ReportMode {
        self.report_mode
    }

    pub fn instruction(&self) -> &AttributionInstruction {
        &self.instruction
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    /// Mandatory context the engine must place ahead of its own context.
    pub fn context_text(&self) -> &str {
        self.instruction.as_str()
    }
}

/// Result record produced by the external engine.
///
/// The engine's schema is not under our control, so the record is kept as an
/// open field map; narrative lookup goes through the compliance enforcer's
/// ordered alias list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisResult {
    fields: Map<String, Value>,
}

impl AnalysisResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Interpret an engine response body: `null` means no result, an object
    /// is a result, anything else is a malformed response.
    pub fn from_value(value: Value) -> Result<Option<Self>, AnalysisError> {
        match value {
            Value::Null => Ok(None),
            Value::Object(fields) => Ok(Some(Self { fields })),
            other => Err(AnalysisError::ResponseParsing(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    pub(crate) fn set(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_string(), value);
    }
}

impl From<Map<String, Value>> for AnalysisResult {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
