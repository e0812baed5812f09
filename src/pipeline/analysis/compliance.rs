//! Result Compliance Enforcer.
//!
//! The engine may ignore its instructions, so the attribution contract is
//! prepended to the final narrative once more, where the reader sees it. The
//! result schema is not ours: the narrative is located by probing an ordered
//! alias list, and a miss is reported, never dropped silently.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::types::AnalysisResult;
use crate::pipeline::attribution::{
    AttributionInstruction, CONFLICT_HEADING, RELIABLE_MARKER, WEB_MARKER,
};

/// Reserved result key recording which field was rewritten.
pub const ENFORCEMENT_MARKER_KEY: &str = "attribution_enforced";

/// What the enforcer did to a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComplianceOutcome {
    /// Instruction prepended to `field`.
    Applied { field: String },
    /// The result carried the marker already; nothing changed.
    AlreadyApplied { field: String },
    /// None of the narrative aliases were present; result unchanged.
    NoNarrativeField { diagnostic: String },
}

impl ComplianceOutcome {
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::NoNarrativeField { diagnostic } => Some(diagnostic),
            _ => None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. } | Self::AlreadyApplied { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnforcedResult {
    pub result: AnalysisResult,
    pub outcome: ComplianceOutcome,
}

/// First alias present on the result, in alias order.
pub fn find_narrative_field<'a>(
    result: &AnalysisResult,
    aliases: &'a [String],
) -> Option<&'a str> {
    aliases
        .iter()
        .map(String::as_str)
        .filter(|alias| *alias != ENFORCEMENT_MARKER_KEY)
        .find(|alias| result.contains(alias))
}

/// Narrative text of the result, if any alias is present.
///
/// Strings are used as-is, `null` reads as empty, any other JSON value is
/// rendered compactly.
pub fn narrative_text(result: &AnalysisResult, aliases: &[String]) -> Option<String> {
    let field = find_narrative_field(result, aliases)?;
    result.get(field).map(value_as_text)
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Prepend the attribution instruction to the result's narrative field.
///
/// `None` in, `None` out. The rewritten value is
/// `instruction + "\n\n" + original`. A result is only treated as already
/// enforced when the marker names one of `aliases` and that field already
/// starts with this instruction; any other marker value is overwritten.
pub fn enforce(
    result: Option<AnalysisResult>,
    instruction: &AttributionInstruction,
    aliases: &[String],
) -> Option<EnforcedResult> {
    let mut result = result?;

    if let Some(field) = enforced_field(&result, instruction, aliases) {
        tracing::debug!(field = %field, "Attribution already enforced, skipping");
        return Some(EnforcedResult {
            result,
            outcome: ComplianceOutcome::AlreadyApplied { field },
        });
    }
    if result.contains(ENFORCEMENT_MARKER_KEY) {
        tracing::warn!(
            marker = ?result.get(ENFORCEMENT_MARKER_KEY),
            "Ignoring enforcement marker not backed by the narrative"
        );
    }

    let Some(field) = find_narrative_field(&result, aliases) else {
        let present: Vec<&str> = result.field_names().collect();
        let diagnostic = format!(
            "attribution not enforced: result has none of the narrative fields [{}] \
             (fields present: [{}])",
            aliases.join(", "),
            present.join(", ")
        );
        tracing::warn!(
            aliases = ?aliases,
            fields = ?present,
            "Compliance enforcement missed: no narrative field"
        );
        return Some(EnforcedResult {
            result,
            outcome: ComplianceOutcome::NoNarrativeField { diagnostic },
        });
    };

    let original = result.get(field).map(value_as_text).unwrap_or_default();
    let enforced = format!("{instruction}\n\n{original}");
    result.set(field, Value::String(enforced));
    result.set(ENFORCEMENT_MARKER_KEY, Value::String(field.to_string()));

    tracing::info!(field, original_length = original.len(), "Attribution enforced");

    Some(EnforcedResult {
        result,
        outcome: ComplianceOutcome::Applied {
            field: field.to_string(),
        },
    })
}

/// Field named by a marker this enforcer could have written for `instruction`.
fn enforced_field(
    result: &AnalysisResult,
    instruction: &AttributionInstruction,
    aliases: &[String],
) -> Option<String> {
    let field = result.get_str(ENFORCEMENT_MARKER_KEY)?;
    if field == ENFORCEMENT_MARKER_KEY || !aliases.iter().any(|alias| alias == field) {
        return None;
    }
    result
        .get_str(field)
        .filter(|narrative| narrative.starts_with(instruction.as_str()))
        .map(|_| field.to_string())
}

// ═══════════════════════════════════════════
// Attribution audit
// ═══════════════════════════════════════════

/// Per-sentence tagging statistics of a narrative.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttributionAudit {
    pub sentences: usize,
    pub reliable_tagged: usize,
    pub web_tagged: usize,
    pub untagged: usize,
    pub has_conflict_section: bool,
}

impl AttributionAudit {
    /// Every counted sentence carries at least one marker.
    pub fn fully_tagged(&self) -> bool {
        self.untagged == 0
    }
}

/// A sentence: text up to a terminator, plus any markers written right after it.
static SENTENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^。！？!?]+(?:[。！？!?]+)?(?:\s*\[(?:可靠源|网络源)\])*").unwrap()
});

const TERMINATORS: &[char] = &['。', '！', '？', '!', '?'];

/// Count how the narrative's sentences are tagged. Headings (`#` lines) and
/// blank lines are not sentences. A sentence ending with both markers counts
/// toward both categories.
pub fn audit_attribution(narrative: &str) -> AttributionAudit {
    let mut audit = AttributionAudit {
        has_conflict_section: narrative.contains(CONFLICT_HEADING),
        ..AttributionAudit::default()
    };

    for line in narrative.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        for sentence in SENTENCE.find_iter(line).map(|m| m.as_str().trim()) {
            if sentence.is_empty() {
                continue;
            }
            let (reliable, web) = trailing_markers(sentence);
            audit.sentences += 1;
            if reliable {
                audit.reliable_tagged += 1;
            }
            if web {
                audit.web_tagged += 1;
            }
            if !reliable && !web {
                audit.untagged += 1;
            }
        }
    }

    audit
}

fn trailing_markers(sentence: &str) -> (bool, bool) {
    let mut rest = sentence;
    let (mut reliable, mut web) = (false, false);
    loop {
        rest = rest.trim_end_matches(|c: char| TERMINATORS.contains(&c) || c.is_whitespace());
        if let Some(stripped) = rest.strip_suffix(RELIABLE_MARKER) {
            reliable = true;
            rest = stripped;
        } else if let Some(stripped) = rest.strip_suffix(WEB_MARKER) {
            web = true;
            rest = stripped;
        } else {
            return (reliable, web);
        }
    }
}
