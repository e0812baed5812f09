//! DOCX and PPTX text extraction.
//!
//! Both formats are ZIP containers of WordprocessingML / PresentationML parts.
//! Only the text runs are read; styling, images and relationships are ignored.

use std::io::{Cursor, Read, Seek};

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::result::ZipError;
use zip::ZipArchive;

use super::types::TextExtractor;
use super::ExtractionError;

const DOCX_BODY_PART: &str = "word/document.xml";
const PPTX_SLIDE_PREFIX: &str = "ppt/slides/slide";
const PPTX_PRESENTATION_PART: &str = "ppt/presentation.xml";
const PPTX_PRESENTATION_RELS: &str = "ppt/_rels/presentation.xml.rels";

/// Word-processor documents: one line per paragraph, in document order.
pub struct DocxExtractor;

impl TextExtractor for DocxExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let mut archive = open_container(bytes)?;
        let xml = read_part(&mut archive, DOCX_BODY_PART)?;
        Ok(docx_paragraphs(&xml)?.join("\n"))
    }
}

/// Slide decks: for each slide in deck order, the text of every shape that
/// has a text body, each followed by a line break.
///
/// Deck order is the presentation's slide list, which survives reordering in
/// the editor; part-name numbering is only used when that list is absent.
pub struct PptxExtractor;

impl TextExtractor for PptxExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let mut archive = open_container(bytes)?;

        let slides = match deck_slide_order(&mut archive)? {
            Some(slides) => slides,
            None => numbered_slide_order(&archive),
        };

        if slides.is_empty() {
            tracing::debug!("PPTX container has no slide parts");
        }

        let mut out = String::new();
        for part in &slides {
            let xml = read_part(&mut archive, part)?;
            for shape_text in slide_shape_texts(&xml)? {
                out.push_str(&shape_text);
                out.push('\n');
            }
        }
        Ok(out)
    }
}

/// Slide parts listed in `p:sldIdLst`, resolved through the presentation
/// relationships. `None` when the deck has no presentation part.
fn deck_slide_order<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<Option<Vec<String>>, ExtractionError> {
    let presentation = match read_part(archive, PPTX_PRESENTATION_PART) {
        Ok(xml) => xml,
        Err(ExtractionError::MissingPart(_)) => return Ok(None),
        Err(e) => return Err(e),
    };
    let rels = read_part(archive, PPTX_PRESENTATION_RELS)?;

    let targets = relationship_targets(&rels)?;
    let slides = slide_rel_ids(&presentation)?
        .into_iter()
        .map(|id| {
            targets
                .iter()
                .find(|(rel_id, _)| *rel_id == id)
                .map(|(_, target)| resolve_ppt_target(target))
                .ok_or_else(|| ExtractionError::MissingPart(format!("slide relationship {id}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(slides))
}

/// `ppt/slides/slideN.xml` parts sorted by N.
fn numbered_slide_order<R: Read + Seek>(archive: &ZipArchive<R>) -> Vec<String> {
    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| slide_number(name).map(|n| (n, name.to_string())))
        .collect();
    slides.sort_by_key(|(n, _)| *n);
    slides.into_iter().map(|(_, part)| part).collect()
}

/// Relationship ids of `p:sldId` entries, in list order.
fn slide_rel_ids(xml: &str) -> Result<Vec<String>, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut ids = Vec::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sldId" => {
                // `r:id` carries the relationship; the unprefixed `id` is the slide id.
                for attr in e.attributes() {
                    let attr = attr.map_err(xml_error)?;
                    if attr.key.prefix().is_some() && attr.key.local_name().as_ref() == b"id" {
                        ids.push(attr.unescape_value().map_err(xml_error)?.into_owned());
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(ids)
}

/// `(Id, Target)` pairs of a relationships part.
fn relationship_targets(xml: &str) -> Result<Vec<(String, String)>, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut targets = Vec::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let (mut id, mut target) = (None, None);
                for attr in e.attributes() {
                    let attr = attr.map_err(xml_error)?;
                    match attr.key.as_ref() {
                        b"Id" => id = Some(attr.unescape_value().map_err(xml_error)?.into_owned()),
                        b"Target" => {
                            target = Some(attr.unescape_value().map_err(xml_error)?.into_owned())
                        }
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    targets.push((id, target));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(targets)
}

/// Relationship targets are relative to `ppt/` unless absolute.
fn resolve_ppt_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("ppt/{}", target.trim_start_matches("./")),
    }
}

fn open_container(bytes: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>, ExtractionError> {
    ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractionError::Container(e.to_string()))
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<String, ExtractionError> {
    let mut file = archive.by_name(name).map_err(|e| match e {
        ZipError::FileNotFound => ExtractionError::MissingPart(name.to_string()),
        other => ExtractionError::Container(other.to_string()),
    })?;
    let mut xml = String::new();
    file.read_to_string(&mut xml)?;
    Ok(xml)
}

/// `ppt/slides/slide12.xml` -> 12. Layouts, masters and rels are skipped.
fn slide_number(part: &str) -> Option<u32> {
    part.strip_prefix(PPTX_SLIDE_PREFIX)?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

fn xml_error(e: impl std::fmt::Display) -> ExtractionError {
    ExtractionError::Xml(e.to_string())
}

/// Paragraph texts of a WordprocessingML body.
///
/// Paragraphs nested in text boxes are emitted before the paragraph that
/// anchors them. Only `w:t` runs count; deleted text and field codes are skipped.
fn docx_paragraphs(xml: &str) -> Result<Vec<String>, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut open: Vec<String> = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => open.push(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"p" => paragraphs.push(String::new()),
                b"tab" => {
                    if let Some(p) = open.last_mut() {
                        p.push('\t');
                    }
                }
                b"br" | b"cr" => {
                    if let Some(p) = open.last_mut() {
                        p.push(' ');
                    }
                }
                _ => {}
            },
            Event::Text(t) if in_text => {
                if let Some(p) = open.last_mut() {
                    p.push_str(&t.unescape().map_err(xml_error)?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if let Some(p) = open.pop() {
                        paragraphs.push(p);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs)
}

#[derive(Default)]
struct ShapeText {
    has_text_body: bool,
    paragraphs: Vec<String>,
}

/// Text of each `p:sp` shape on a slide that exposes a text body.
/// Paragraphs inside a shape are joined with line breaks.
fn slide_shape_texts(xml: &str) -> Result<Vec<String>, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut shapes = Vec::new();
    let mut shape: Option<ShapeText> = None;
    let mut paragraph: Option<String> = None;
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"sp" => shape = Some(ShapeText::default()),
                b"txBody" => {
                    if let Some(s) = shape.as_mut() {
                        s.has_text_body = true;
                    }
                }
                b"p" if shape.is_some() => paragraph = Some(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"p" => {
                    if let Some(s) = shape.as_mut() {
                        s.paragraphs.push(String::new());
                    }
                }
                b"br" => {
                    if let Some(p) = paragraph.as_mut() {
                        p.push('\n');
                    }
                }
                _ => {}
            },
            Event::Text(t) if in_text => {
                if let Some(p) = paragraph.as_mut() {
                    p.push_str(&t.unescape().map_err(xml_error)?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if let (Some(s), Some(p)) = (shape.as_mut(), paragraph.take()) {
                        s.paragraphs.push(p);
                    }
                }
                b"sp" => {
                    if let Some(s) = shape.take() {
                        if s.has_text_body {
                            shapes.push(s.paragraphs.join("\n"));
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(shapes)
}
