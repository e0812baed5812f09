//! Attribution Contract Builder.
//!
//! Builds the instruction block that obliges the analysis engine to tag every
//! sentence with its source category and to disclose conflicts between them.
//! The block is rebuilt per request and never mutated afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-sentence marker for claims drawn from the reliable category.
pub const RELIABLE_MARKER: &str = "[可靠源]";
/// Per-sentence marker for claims drawn from live web search.
pub const WEB_MARKER: &str = "[网络源]";
/// Heading the engine must use when the two categories disagree.
pub const CONFLICT_HEADING: &str = "数据冲突";

/// Name of the structured financial database in the reliable category.
pub const DATABASE_NAME: &str = "Tushare 数据库";

const INSTRUCTION_TITLE: &str = "【重要指令：严格双源溯源】";
const DOCUMENT_BEGIN: &str = "【文件开始】";
const DOCUMENT_END: &str = "【文件结束】";

/// The two source categories every claim must be attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    /// Structured database plus the uploaded document.
    Reliable,
    /// Live search results gathered by the engine.
    Web,
}

impl SourceCategory {
    pub fn marker(&self) -> &'static str {
        match self {
            Self::Reliable => RELIABLE_MARKER,
            Self::Web => WEB_MARKER,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reliable => "reliable",
            Self::Web => "web",
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A composed attribution instruction. Immutable after `build`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributionInstruction {
    text: String,
    trusted_label: Option<String>,
}

impl AttributionInstruction {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Label of the trusted document, `None` when only the database backs
    /// the reliable category.
    pub fn trusted_label(&self) -> Option<&str> {
        self.trusted_label.as_deref()
    }
}

impl fmt::Display for AttributionInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Build the attribution instruction for one request.
///
/// Deterministic: the same inputs always produce byte-identical text. A blank
/// `trusted_body` means no document was supplied; the reliable category is then
/// declared as database-only and every rule is still emitted.
pub fn build(trusted_body: &str, trusted_label: &str) -> AttributionInstruction {
    let has_document = !trusted_body.trim().is_empty();

    let mut text = String::new();
    text.push_str(INSTRUCTION_TITLE);
    text.push('\n');
    text.push_str("你现在手里有两类信息：\n");

    // Source categories
    if has_document {
        text.push_str(&format!(
            "1. 【可靠源】：包含 {DATABASE_NAME}数据以及我上传的文件《{trusted_label}》。\n"
        ));
        text.push_str("   文件内容如下：\n");
        text.push_str(DOCUMENT_BEGIN);
        text.push('\n');
        text.push_str(trusted_body.trim_end());
        text.push('\n');
        text.push_str(DOCUMENT_END);
        text.push('\n');
    } else {
        text.push_str(&format!(
            "1. 【可靠源】：{DATABASE_NAME}数据（本次未上传文件）。\n"
        ));
    }
    text.push_str("2. 【网络源】：你通过搜索工具获取的实时信息。\n");

    // Citation rules
    text.push('\n');
    text.push_str("请你在分析时遵守：\n");
    text.push_str(&format!(
        "- 只要引用了可靠源的信息，必须在句末标注 {RELIABLE_MARKER}。\n"
    ));
    text.push_str(&format!(
        "- 只要引用了网络搜索的信息，必须在句末标注 {WEB_MARKER}。\n"
    ));

    // Conflict disclosure
    text.push_str(&format!(
        "- 如果两者数据不一致，请专门列出“{CONFLICT_HEADING}”说明，逐条写明两类来源各自的数值。"
    ));

    AttributionInstruction {
        text,
        trusted_label: has_document.then(|| trusted_label.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "--- source: 年报.pdf ---\n营业收入 1741 亿元";

    #[test]
    fn build_is_deterministic() {
        let a = build(BODY, "年报.pdf");
        let b = build(BODY, "年报.pdf");
        assert_eq!(a.as_str().as_bytes(), b.as_str().as_bytes());
    }

    #[test]
    fn document_is_named_and_embedded() {
        let instruction = build(BODY, "年报.pdf");
        let text = instruction.as_str();
        assert!(text.contains("《年报.pdf》"));
        assert!(text.contains("营业收入 1741 亿元"));
        assert!(text.contains(DOCUMENT_BEGIN));
        assert!(text.contains(DOCUMENT_END));
        assert_eq!(instruction.trusted_label(), Some("年报.pdf"));
    }

    #[test]
    fn sections_appear_in_contract_order() {
        let text = build(BODY, "年报.pdf").to_string();
        let reliable = text.find("【可靠源】").unwrap();
        let web = text.find("【网络源】").unwrap();
        let reliable_rule = text.find(&format!("标注 {RELIABLE_MARKER}")).unwrap();
        let web_rule = text.find(&format!("标注 {WEB_MARKER}")).unwrap();
        let conflict = text.find(CONFLICT_HEADING).unwrap();
        assert!(reliable < web);
        assert!(web < reliable_rule);
        assert!(reliable_rule < web_rule);
        assert!(web_rule < conflict);
    }

    #[test]
    fn empty_body_keeps_every_rule() {
        let instruction = build("", "ignored.txt");
        let text = instruction.as_str();
        assert!(text.contains("【可靠源】"));
        assert!(text.contains(DATABASE_NAME));
        assert!(text.contains("【网络源】"));
        assert!(text.contains(RELIABLE_MARKER));
        assert!(text.contains(WEB_MARKER));
        assert!(text.contains(CONFLICT_HEADING));
        assert!(!text.contains("ignored.txt"));
        assert!(!text.contains(DOCUMENT_BEGIN));
        assert_eq!(instruction.trusted_label(), None);
    }

    #[test]
    fn whitespace_body_counts_as_empty() {
        assert_eq!(build("  \n\t", "x.txt"), build("", "x.txt"));
    }

    #[test]
    fn different_documents_produce_different_instructions() {
        assert_ne!(build(BODY, "a.pdf"), build(BODY, "b.pdf"));
    }

    #[test]
    fn category_markers() {
        assert_eq!(SourceCategory::Reliable.marker(), "[可靠源]");
        assert_eq!(SourceCategory::Web.marker(), "[网络源]");
        assert_eq!(SourceCategory::Web.to_string(), "web");
    }
}
