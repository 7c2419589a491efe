//! Composite key grammar for source documents and derived artifacts.
//!
//! A single bucket key carries the identity of the original upload, the
//! extraction subtype, and an optional segment label. The grammar is
//! `<stem>/<marker>/<remainder>` where `<marker>` is one of `pdf`, `docx`,
//! `pptx`, or the generic `subType`. Characters that downstream identifiers
//! cannot carry (`@`, space) are replaced with fixed sentinel substrings and
//! restored at the boundary where the real value is needed.

use percent_encoding::percent_decode_str;

/// Sentinel standing in for a literal `@`.
pub const AT_SENTINEL: &str = "(_!AT!_)";
/// Sentinel standing in for a literal space.
pub const SPACE_SENTINEL: &str = "(_!SPACE!_)";

/// Extraction subtype carried inside an artifact key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subtype {
    Pdf,
    Docx,
    Pptx,
    /// Generic marker used for images, video, and plain text, where no
    /// dedicated sub-path convention exists.
    Generic,
}

impl Subtype {
    /// Wire marker appearing between slashes in an artifact key.
    pub fn marker(self) -> &'static str {
        match self {
            Subtype::Pdf => "pdf",
            Subtype::Docx => "docx",
            Subtype::Pptx => "pptx",
            Subtype::Generic => "subType",
        }
    }

    /// Source file extension re-appended when decoding, if the subtype has one.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            Subtype::Pdf => Some("pdf"),
            Subtype::Docx => Some("docx"),
            Subtype::Pptx => Some("pptx"),
            Subtype::Generic => None,
        }
    }

    /// Decode priority: an artifact key contains at most one marker, and the
    /// first match in this order wins.
    pub const DECODE_ORDER: [Subtype; 4] =
        [Subtype::Pdf, Subtype::Docx, Subtype::Pptx, Subtype::Generic];
}

/// Result of splitting an artifact key back into its source and remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedKey {
    /// Key of the original uploaded document.
    pub source_key: String,
    /// The part after the marker (segment label, media path, or the whole
    /// key when no marker was found).
    pub remainder: String,
    /// Subtype the marker named, `None` for the fallback case.
    pub subtype: Option<Subtype>,
}

/// Replace `@` and space with their sentinels, `@` first.
pub fn escape(raw: &str) -> String {
    raw.replace('@', AT_SENTINEL).replace(' ', SPACE_SENTINEL)
}

/// Inverse of [`escape`]; restores `@` before space, matching escape order.
pub fn unescape(s: &str) -> String {
    s.replace(AT_SENTINEL, "@").replace(SPACE_SENTINEL, " ")
}

/// Decode an object key as delivered by a store trigger: `+` means space and
/// percent sequences are expanded, in that order.
pub fn decode_event_key(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8_lossy()
        .into_owned()
}

/// Build the artifact key for a piece derived from `source_key`.
///
/// For the three document subtypes the source extension is dropped and the
/// marker inserted; the generic subtype keeps the full source key as prefix.
/// `segment` names the slice (slide label, media path); when absent the
/// source basename stands in.
pub fn encode_artifact(source_key: &str, subtype: Subtype, segment: Option<&str>) -> String {
    let stem = strip_extension(source_key);
    let label = segment
        .map(str::to_owned)
        .unwrap_or_else(|| basename(stem).to_owned());
    match subtype {
        Subtype::Pdf | Subtype::Docx | Subtype::Pptx => {
            format!("{stem}/{}/{label}", subtype.marker())
        }
        Subtype::Generic => format!("{source_key}/{}/{label}", subtype.marker()),
    }
}

/// Split an artifact key at its marker and reconstruct the source key.
///
/// The key is unescaped before splitting. When no marker is present the whole
/// key is returned as both source and remainder; callers must tolerate this
/// fallback, it is not an error.
pub fn decode_artifact(artifact_key: &str) -> DecodedKey {
    let safe = unescape(artifact_key);
    for subtype in Subtype::DECODE_ORDER {
        let needle = format!("/{}/", subtype.marker());
        if let Some(pos) = safe.find(&needle) {
            let prefix = &safe[..pos];
            let remainder = &safe[pos + needle.len()..];
            let source_key = match subtype.extension() {
                Some(ext) => format!("{prefix}.{ext}"),
                None => prefix.to_owned(),
            };
            return DecodedKey {
                source_key,
                remainder: remainder.to_owned(),
                subtype: Some(subtype),
            };
        }
    }
    DecodedKey {
        source_key: safe.clone(),
        remainder: safe,
        subtype: None,
    }
}

/// Output key for a derived artifact of extension `out_ext`, given a key that
/// may or may not already sit under a marker.
///
/// A key whose stem already carries a document marker gets its extension
/// swapped in place; anything else grows a fresh `/subType/` sub-path. This
/// lets callers name a future artifact (a transcript, an OCR sidecar) before
/// it exists, symmetrically with [`decode_artifact`] after the fact.
pub fn moderated_content_key(key: &str, out_ext: &str) -> String {
    let stem = strip_extension(key);
    if has_document_marker(stem) {
        format!("{stem}.{out_ext}")
    } else {
        format!("{key}/subType/{stem}.{out_ext}")
    }
}

/// Like [`moderated_content_key`] but without an extension, used when the
/// converter appends its own.
pub fn convert_output_key(key: &str) -> String {
    let stem = strip_extension(key);
    if has_document_marker(stem) {
        stem.to_owned()
    } else {
        format!("{key}/subType/{stem}")
    }
}

fn has_document_marker(stem: &str) -> bool {
    stem.contains("/pptx/") || stem.contains("/docx/") || stem.contains("/pdf/")
}

/// Key with the extension of its final segment removed. Dots in directory
/// segments are left alone.
pub fn strip_extension(key: &str) -> &str {
    let base_start = key.rfind('/').map_or(0, |i| i + 1);
    match key[base_start..].rfind('.') {
        Some(dot) => &key[..base_start + dot],
        None => key,
    }
}

/// Extension of the final segment, without the dot.
pub fn extension(key: &str) -> Option<&str> {
    let base_start = key.rfind('/').map_or(0, |i| i + 1);
    key[base_start..].rfind('.').map(|dot| &key[base_start + dot + 1..])
}

/// Final path segment of a key.
pub fn basename(key: &str) -> &str {
    key.rfind('/').map_or(key, |i| &key[i + 1..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn escape_replaces_both_sentinelled_characters() {
        assert_eq!(escape("a b@c"), "a(_!SPACE!_)b(_!AT!_)c");
        assert_eq!(unescape("a(_!SPACE!_)b(_!AT!_)c"), "a b@c");
    }

    #[test]
    fn encode_document_subtype_drops_extension() {
        assert_eq!(
            encode_artifact("reports/q1.pptx", Subtype::Pptx, Some("slides.json")),
            "reports/q1/pptx/slides.json"
        );
        assert_eq!(
            encode_artifact("reports/q1.pdf", Subtype::Pdf, None),
            "reports/q1/pdf/q1"
        );
    }

    #[test]
    fn encode_generic_keeps_full_source_key() {
        assert_eq!(
            encode_artifact("media/clip.mp4", Subtype::Generic, None),
            "media/clip.mp4/subType/clip"
        );
    }

    #[test]
    fn decode_reconstructs_document_source() {
        let decoded = decode_artifact("reports/q1/pptx/slides.json");
        assert_eq!(decoded.source_key, "reports/q1.pptx");
        assert_eq!(decoded.remainder, "slides.json");
        assert_eq!(decoded.subtype, Some(Subtype::Pptx));
    }

    #[test]
    fn decode_generic_returns_prefix_verbatim() {
        let decoded = decode_artifact("media/clip.mp4/subType/clip.json");
        assert_eq!(decoded.source_key, "media/clip.mp4");
        assert_eq!(decoded.remainder, "clip.json");
        assert_eq!(decoded.subtype, Some(Subtype::Generic));
    }

    #[test]
    fn decode_unescapes_before_splitting() {
        let decoded = decode_artifact("inbox/a(_!SPACE!_)deck/pptx/slides.json");
        assert_eq!(decoded.source_key, "inbox/a deck.pptx");
    }

    #[test]
    fn decode_without_marker_falls_back_to_whole_key() {
        let decoded = decode_artifact("reports/q1.xlsx");
        assert_eq!(decoded.source_key, "reports/q1.xlsx");
        assert_eq!(decoded.remainder, "reports/q1.xlsx");
        assert_eq!(decoded.subtype, None);
    }

    #[test]
    fn marker_priority_is_fixed() {
        // Pathological key carrying two markers: the pdf marker wins because
        // it is scanned first, regardless of position.
        let decoded = decode_artifact("a/docx/b/pdf/c");
        assert_eq!(decoded.subtype, Some(Subtype::Pdf));
        assert_eq!(decoded.source_key, "a/docx/b.pdf");
        assert_eq!(decoded.remainder, "c");
    }

    #[test]
    fn moderated_content_key_swaps_extension_under_marker() {
        assert_eq!(
            moderated_content_key("reports/q1/pdf/img00007.png", "txt"),
            "reports/q1/pdf/img00007.txt"
        );
    }

    #[test]
    fn moderated_content_key_synthesizes_generic_sub_path() {
        assert_eq!(
            moderated_content_key("media/clip.mp4", "json"),
            "media/clip.mp4/subType/media/clip.json"
        );
    }

    #[test]
    fn convert_output_key_has_no_extension() {
        assert_eq!(convert_output_key("reports/q1/pptx/deck.wmv"), "reports/q1/pptx/deck");
        assert_eq!(convert_output_key("clip.avi"), "clip.avi/subType/clip");
    }

    #[test]
    fn event_key_decoding_expands_plus_and_percent() {
        assert_eq!(decode_event_key("inbox/a+deck%40v2.pptx"), "inbox/a deck@v2.pptx");
    }

    #[test]
    fn extension_helpers_only_touch_the_final_segment() {
        assert_eq!(strip_extension("a.b/c"), "a.b/c");
        assert_eq!(extension("a.b/c.txt"), Some("txt"));
        assert_eq!(extension("a.b/c"), None);
        assert_eq!(basename("a/b/c.txt"), "c.txt");
    }

    proptest! {
        #[test]
        fn escape_round_trips(raw in "[a-zA-Z0-9 @./_-]{0,64}") {
            prop_assert_eq!(unescape(&escape(&raw)), raw);
        }

        #[test]
        fn encode_decode_round_trips(
            dir in "[a-z]{1,8}",
            name in "[a-zA-Z0-9 @_-]{1,16}",
            seg in "[a-zA-Z0-9._-]{1,16}",
            subtype in prop_oneof![
                Just(Subtype::Pdf),
                Just(Subtype::Docx),
                Just(Subtype::Pptx),
            ],
        ) {
            let ext = subtype.extension().unwrap();
            let source = format!("{dir}/{name}.{ext}");
            let artifact = encode_artifact(&source, subtype, Some(&seg));
            let decoded = decode_artifact(&artifact);
            prop_assert_eq!(decoded.source_key, source);
            prop_assert_eq!(decoded.remainder, seg);
            prop_assert_eq!(decoded.subtype, Some(subtype));
        }

        #[test]
        fn escaped_artifact_keys_still_decode(
            name in "[a-z @]{1,12}",
        ) {
            let source = format!("inbox/{name}.docx");
            let artifact = escape(&encode_artifact(&source, Subtype::Docx, Some("document.txt")));
            let decoded = decode_artifact(&artifact);
            prop_assert_eq!(decoded.source_key, source);
        }
    }
}
