//! PDF extraction: one concatenated text artifact in approximate reading
//! order, plus embedded images recovered from page XObject resources.

use std::collections::BTreeSet;
use std::io::Cursor;

use bytes::Bytes;
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use super::{DocumentExtractor, ExtractError, Extraction, MediaArtifact, TextArtifact};
use crate::keys::{self, Subtype};

/// Thresholds gating which embedded images are worth extracting. All-zero
/// means no filtering; an image failing any single check is excluded.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfImageFilters {
    /// Smallest allowed image side, in pixels.
    pub min_side: u32,
    /// Smallest allowed bytes-per-pixel-component ratio.
    pub min_rel_size: f64,
    /// Smallest allowed payload size, in bytes.
    pub min_abs_size: usize,
}

/// Splitter for PDF sources.
#[derive(Debug, Clone)]
pub struct PdfExtractor {
    filters: PdfImageFilters,
}

impl PdfExtractor {
    pub fn new(filters: PdfImageFilters) -> Self {
        Self { filters }
    }
}

impl DocumentExtractor for PdfExtractor {
    fn extract(&self, source_key: &str, bytes: &[u8]) -> Result<Extraction, ExtractError> {
        let doc = Document::load_mem(bytes)?;

        let text_body = extract_text(&doc)?;
        let text = vec![TextArtifact {
            key: keys::encode_artifact(source_key, Subtype::Pdf, Some("extract_text.txt")),
            body: Bytes::from(text_body.into_bytes()),
        }];

        let media = extract_images(&doc, source_key, self.filters)?;
        Ok(Extraction { text, media })
    }
}

/// Concatenated page text. Each text-showing operation becomes a block
/// positioned by the current text matrix; blocks are ordered by (vertical
/// position top-down, then horizontal) to approximate natural reading order.
fn extract_text(doc: &Document) -> Result<String, ExtractError> {
    let mut out = String::new();
    for (_, page_id) in doc.get_pages() {
        let content_bytes = doc.get_page_content(page_id)?;
        let content = Content::decode(&content_bytes)?;

        let mut blocks: Vec<(f64, f64, String)> = Vec::new();
        let mut x = 0.0_f64;
        let mut y = 0.0_f64;

        for op in &content.operations {
            match op.operator.as_str() {
                "Tm" => {
                    if op.operands.len() == 6 {
                        x = number(&op.operands[4]).unwrap_or(x);
                        y = number(&op.operands[5]).unwrap_or(y);
                    }
                }
                "Td" | "TD" => {
                    if op.operands.len() == 2 {
                        x += number(&op.operands[0]).unwrap_or(0.0);
                        y += number(&op.operands[1]).unwrap_or(0.0);
                    }
                }
                "Tj" | "'" | "\"" => {
                    let text = op
                        .operands
                        .iter()
                        .filter_map(pdf_string)
                        .collect::<String>();
                    if !text.is_empty() {
                        blocks.push((y, x, text));
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(parts)) = op.operands.first() {
                        let text = parts.iter().filter_map(pdf_string).collect::<String>();
                        if !text.is_empty() {
                            blocks.push((y, x, text));
                        }
                    }
                }
                _ => {}
            }
        }

        // Page origin is bottom-left, so reading order is descending y.
        blocks.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        });

        for (_, _, text) in blocks {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&text);
        }
    }
    Ok(out)
}

/// Recovered pixel payload for one embedded image.
struct RecoveredImage {
    ext: &'static str,
    components: u32,
    data: Vec<u8>,
}

fn extract_images(
    doc: &Document,
    source_key: &str,
    filters: PdfImageFilters,
) -> Result<Vec<MediaArtifact>, ExtractError> {
    let mut extracted: BTreeSet<ObjectId> = BTreeSet::new();
    let mut media = Vec::new();

    for (_, page_id) in doc.get_pages() {
        for image_id in page_image_ids(doc, page_id) {
            // A reference shared across pages is extracted at most once.
            if extracted.contains(&image_id) {
                continue;
            }
            let Ok(Object::Stream(stream)) = doc.get_object(image_id) else {
                continue;
            };
            let Some((width, height)) = image_dimensions(stream) else {
                continue;
            };
            if width.min(height) <= filters.min_side {
                continue;
            }

            let recovered = recover_image(doc, stream)?;
            if recovered.data.len() <= filters.min_abs_size {
                continue;
            }
            let area = (width as f64) * (height as f64) * (recovered.components as f64);
            if area > 0.0 && (recovered.data.len() as f64) / area <= filters.min_rel_size {
                continue;
            }

            let segment = format!("img{:05}.{}", image_id.0, recovered.ext);
            media.push(MediaArtifact {
                key: keys::encode_artifact(source_key, Subtype::Pdf, Some(&segment)),
                body: Bytes::from(recovered.data),
            });
            extracted.insert(image_id);
        }
    }

    debug!(count = media.len(), "extracted embedded pdf images");
    Ok(media)
}

/// Image XObject references of one page, in resource-dictionary order.
fn page_image_ids(doc: &Document, page_id: ObjectId) -> Vec<ObjectId> {
    let Ok(page) = doc.get_object(page_id) else {
        return Vec::new();
    };
    let Object::Dictionary(page_dict) = page else {
        return Vec::new();
    };
    let Some(resources) = resolve_dict(doc, page_dict.get(b"Resources").ok()) else {
        return Vec::new();
    };
    let Some(xobjects) = resolve_dict(doc, resources.get(b"XObject").ok()) else {
        return Vec::new();
    };

    let mut ids = Vec::new();
    for (_, entry) in xobjects.iter() {
        let Object::Reference(id) = entry else {
            continue;
        };
        if let Ok(Object::Stream(stream)) = doc.get_object(*id) {
            if matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image") {
                ids.push(*id);
            }
        }
    }
    ids
}

fn resolve_dict<'a>(doc: &'a Document, obj: Option<&'a Object>) -> Option<&'a Dictionary> {
    match obj? {
        Object::Dictionary(dict) => Some(dict),
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        },
        _ => None,
    }
}

fn image_dimensions(stream: &Stream) -> Option<(u32, u32)> {
    let width = dict_u32(&stream.dict, b"Width")?;
    let height = dict_u32(&stream.dict, b"Height")?;
    Some((width, height))
}

fn dict_u32(dict: &Dictionary, key: &[u8]) -> Option<u32> {
    match dict.get(key).ok()? {
        Object::Integer(v) if *v >= 0 => Some(*v as u32),
        _ => None,
    }
}

/// Recover pixel data for an image stream.
///
/// Images carrying a soft mask are recombined with it and re-encoded as
/// RGBA PNG; images with an explicit color space are normalized to RGB PNG;
/// everything else passes through in its native encoding.
fn recover_image(doc: &Document, stream: &Stream) -> Result<RecoveredImage, ExtractError> {
    let (width, height) = image_dimensions(stream)
        .ok_or_else(|| ExtractError::Malformed("image stream without dimensions".to_owned()))?;
    let data = stream_payload(stream);

    if let Ok(Object::Reference(mask_id)) = stream.dict.get(b"SMask") {
        if let Ok(Object::Stream(mask_stream)) = doc.get_object(*mask_id) {
            let base = decode_pixels(stream, &data, width, height)?.into_rgb8();
            let mask = decode_pixels(mask_stream, &stream_payload(mask_stream), width, height)?
                .into_luma8();
            let combined = apply_soft_mask(&base, &mask);
            let png = encode_png(DynamicImage::ImageRgba8(combined))?;
            return Ok(RecoveredImage {
                ext: "png",
                components: 4,
                data: png,
            });
        }
    }

    if stream.dict.get(b"ColorSpace").is_ok() {
        let rgb = decode_pixels(stream, &data, width, height)?.into_rgb8();
        let png = encode_png(DynamicImage::ImageRgb8(rgb))?;
        return Ok(RecoveredImage {
            ext: "png",
            components: 3,
            data: png,
        });
    }

    // No color space declared: keep the native payload untouched.
    let ext = match first_filter(stream) {
        Some(b"DCTDecode") => "jpg",
        Some(b"JPXDecode") => "jp2",
        _ => "bin",
    };
    Ok(RecoveredImage {
        ext,
        components: 1,
        data,
    })
}

/// Decoded stream content where a zlib filter applies, raw content otherwise.
fn stream_payload(stream: &Stream) -> Vec<u8> {
    stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone())
}

/// Interpret an image payload as pixels: JPEG payloads go through the image
/// decoder, raw payloads are mapped by component count.
fn decode_pixels(
    stream: &Stream,
    data: &[u8],
    width: u32,
    height: u32,
) -> Result<DynamicImage, ExtractError> {
    if matches!(first_filter(stream), Some(b"DCTDecode") | Some(b"JPXDecode")) {
        return Ok(image::load_from_memory(data)?);
    }

    let pixel_count = (width as usize) * (height as usize);
    if pixel_count == 0 {
        return Err(ExtractError::Malformed("zero-sized embedded image".to_owned()));
    }
    match data.len() / pixel_count {
        1 => GrayImage::from_raw(width, height, data[..pixel_count].to_vec())
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(|| ExtractError::Malformed("truncated gray image".to_owned())),
        3 => RgbImage::from_raw(width, height, data[..pixel_count * 3].to_vec())
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| ExtractError::Malformed("truncated rgb image".to_owned())),
        4 => RgbaImage::from_raw(width, height, data[..pixel_count * 4].to_vec())
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| ExtractError::Malformed("truncated rgba image".to_owned())),
        _ => Err(ExtractError::Malformed(format!(
            "unsupported raw image layout ({} bytes for {pixel_count} pixels)",
            data.len()
        ))),
    }
}

fn first_filter(stream: &Stream) -> Option<&[u8]> {
    match stream.dict.get(b"Filter").ok()? {
        Object::Name(name) => Some(name.as_slice()),
        Object::Array(filters) => filters.first().and_then(|f| match f {
            Object::Name(name) => Some(name.as_slice()),
            _ => None,
        }),
        _ => None,
    }
}

fn apply_soft_mask(base: &RgbImage, mask: &GrayImage) -> RgbaImage {
    let (width, height) = base.dimensions();
    let mut out = RgbaImage::new(width, height);
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let rgb = base.get_pixel(x, y);
        let alpha = if mask.dimensions() == (width, height) {
            mask.get_pixel(x, y)[0]
        } else {
            u8::MAX
        };
        *pixel = image::Rgba([rgb[0], rgb[1], rgb[2], alpha]);
    }
    out
}

fn encode_png(img: DynamicImage) -> Result<Vec<u8>, ExtractError> {
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)?;
    Ok(out)
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(v) => Some(*v as f64),
        Object::Real(v) => Some(f64::from(*v)),
        _ => None,
    }
}

/// Text payload of a string operand: UTF-16BE when the BOM says so,
/// byte-per-char otherwise.
fn pdf_string(obj: &Object) -> Option<String> {
    let Object::String(bytes, _) = obj else {
        return None;
    };
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        Some(String::from_utf16_lossy(&units))
    } else {
        Some(bytes.iter().map(|&b| b as char).collect())
    }
}
