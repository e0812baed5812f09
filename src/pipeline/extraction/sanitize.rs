/// Sanitize extracted text before it is spliced into a prompt.
///
/// Strips a leading BOM and control characters (newline and tab survive),
/// normalizes line endings, and trims trailing whitespace per line. Blank lines
/// are kept: an empty PDF page must stay visible as an empty line.
pub fn sanitize_extracted_text(raw: &str) -> String {
    let raw = raw.strip_prefix('\u{FEFF}').unwrap_or(raw);

    raw.replace("\r\n", "\n")
        .replace('\r', "\n")
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect::<String>()
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}
