//! Extraction for OOXML containers (docx, pptx).
//!
//! Both formats are zip archives. Media artifacts are every entry under the
//! format's media prefix; text is pulled out of the slide/document XML parts
//! with run-level regexes.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::OnceLock;

use bytes::Bytes;
use regex::Regex;
use zip::ZipArchive;

use super::{DocumentExtractor, ExtractError, Extraction, MediaArtifact, TextArtifact};
use crate::keys::{self, Subtype};

/// Which OOXML flavor is being split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfficeKind {
    Docx,
    Pptx,
}

impl OfficeKind {
    fn media_prefix(self) -> &'static str {
        match self {
            OfficeKind::Docx => "word/media/",
            OfficeKind::Pptx => "ppt/media/",
        }
    }

    fn subtype(self) -> Subtype {
        match self {
            OfficeKind::Docx => Subtype::Docx,
            OfficeKind::Pptx => Subtype::Pptx,
        }
    }
}

/// Splitter for docx/pptx sources.
#[derive(Debug, Clone)]
pub struct OfficeExtractor {
    kind: OfficeKind,
}

impl OfficeExtractor {
    pub fn new(kind: OfficeKind) -> Self {
        Self { kind }
    }
}

impl DocumentExtractor for OfficeExtractor {
    fn extract(&self, source_key: &str, bytes: &[u8]) -> Result<Extraction, ExtractError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;

        let mut media = Vec::new();
        let mut slide_parts: BTreeMap<u32, String> = BTreeMap::new();
        let mut document_part: Option<String> = None;

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            let name = entry.name().to_owned();

            if name.starts_with(self.kind.media_prefix()) {
                let mut body = Vec::with_capacity(entry.size() as usize);
                entry
                    .read_to_end(&mut body)
                    .map_err(|e| ExtractError::Archive(e.to_string()))?;
                // The full archive path becomes the segment label so the
                // media key stays unique within the source.
                let key = keys::encode_artifact(source_key, self.kind.subtype(), Some(&name));
                media.push(MediaArtifact {
                    key,
                    body: Bytes::from(body),
                });
                continue;
            }

            match self.kind {
                OfficeKind::Pptx => {
                    if let Some(number) = slide_number(&name) {
                        slide_parts.insert(number, read_entry_string(&mut entry)?);
                    }
                }
                OfficeKind::Docx => {
                    if name == "word/document.xml" {
                        document_part = Some(read_entry_string(&mut entry)?);
                    }
                }
            }
        }

        let text = match self.kind {
            OfficeKind::Pptx => pptx_text_artifacts(source_key, &slide_parts)?,
            OfficeKind::Docx => docx_text_artifacts(source_key, document_part)?,
        };

        Ok(Extraction { text, media })
    }
}

fn read_entry_string(entry: &mut zip::read::ZipFile<'_>) -> Result<String, ExtractError> {
    let mut raw = String::new();
    entry
        .read_to_string(&mut raw)
        .map_err(|e| ExtractError::Archive(e.to_string()))?;
    Ok(raw)
}

/// Slide part number for `ppt/slides/slideN.xml`, `None` for everything else.
fn slide_number(entry_name: &str) -> Option<u32> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^ppt/slides/slide(\d+)\.xml$").expect("valid slide regex")
    });
    re.captures(entry_name)?.get(1)?.as_str().parse().ok()
}

/// One JSON text artifact mapping 1-indexed slide number to the slide's
/// readable text, shape runs joined by newlines.
fn pptx_text_artifacts(
    source_key: &str,
    slide_parts: &BTreeMap<u32, String>,
) -> Result<Vec<TextArtifact>, ExtractError> {
    let mut segments: BTreeMap<String, String> = BTreeMap::new();
    // Archive entry order is arbitrary; renumber by ascending slide part
    // number so segment "1" is always the first slide.
    for (ordinal, xml) in slide_parts.values().enumerate() {
        let runs = text_runs(xml, drawing_run_regex());
        segments.insert((ordinal as u32 + 1).to_string(), runs.join("\n"));
    }

    let body = serde_json::to_vec(&segments)
        .map_err(|e| ExtractError::Malformed(e.to_string()))?;
    let key = keys::encode_artifact(source_key, Subtype::Pptx, Some("slides.json"));
    Ok(vec![TextArtifact {
        key,
        body: Bytes::from(body),
    }])
}

/// One plain-text artifact: paragraphs of `word/document.xml`, runs joined
/// inside a paragraph, paragraphs separated by newlines.
fn docx_text_artifacts(
    source_key: &str,
    document_part: Option<String>,
) -> Result<Vec<TextArtifact>, ExtractError> {
    let xml = document_part
        .ok_or_else(|| ExtractError::Malformed("archive has no word/document.xml".to_owned()))?;

    let mut paragraphs = Vec::new();
    for paragraph in xml.split("</w:p>") {
        let runs = text_runs(paragraph, word_run_regex());
        if !runs.is_empty() {
            paragraphs.push(runs.concat());
        }
    }

    let key = keys::encode_artifact(source_key, Subtype::Docx, Some("document.txt"));
    Ok(vec![TextArtifact {
        key,
        body: Bytes::from(paragraphs.join("\n").into_bytes()),
    }])
}

fn drawing_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<a:t[^>]*>(.*?)</a:t>").expect("valid run regex"))
}

fn word_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<w:t[^>]*>(.*?)</w:t>").expect("valid run regex"))
}

fn text_runs(xml: &str, re: &Regex) -> Vec<String> {
    re.captures_iter(xml)
        .map(|cap| unescape_xml(&cap[1]))
        .collect()
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
