//! Metadata-invariant content hashing.
//!
//! The digest covers only the bytes that define the picture, so it stays the
//! same when a card is embedded, replaced or removed, or when XMP and comments
//! are added. It is the identity key for annotations kept outside the file.

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::jpeg::{self, SOI};
use crate::png::{self, SIGNATURE};

/// Critical PNG chunks plus the colour/transparency chunks that change rendering.
const RETAINED_PNG_CHUNKS: [&[u8; 4]; 9] = [
    b"IHDR", b"PLTE", b"IDAT", b"IEND", b"tRNS", b"gAMA", b"cHRM", b"sRGB", b"iCCP",
];

/// Container formats recognized by magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

/// Identify a container from its leading bytes.
pub fn detect(bytes: &[u8]) -> Option<ImageFormat> {
    if bytes.starts_with(&SIGNATURE) {
        Some(ImageFormat::Png)
    } else if bytes.starts_with(&SOI) {
        Some(ImageFormat::Jpeg)
    } else {
        None
    }
}

/// SHA-256 (lowercase hex) of the image's canonical bytes.
///
/// Never fails: unrecognized or structurally broken input is hashed as-is.
pub fn digest(bytes: &[u8]) -> String {
    let canonical = match detect(bytes) {
        Some(ImageFormat::Png) => canonical_png(bytes),
        Some(ImageFormat::Jpeg) => canonical_jpeg(bytes),
        None => {
            log::debug!("Unrecognized container; hashing raw bytes");
            return hex::encode(Sha256::digest(bytes));
        }
    };

    match canonical {
        Ok(buf) => hex::encode(Sha256::digest(&buf)),
        Err(e) => {
            log::debug!("Cannot canonicalize image ({e}); hashing raw bytes");
            hex::encode(Sha256::digest(bytes))
        }
    }
}

fn canonical_png(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(bytes.len());
    out.extend_from_slice(&SIGNATURE);
    for chunk in png::chunk::walk(bytes)? {
        let chunk = chunk?;
        if RETAINED_PNG_CHUNKS.contains(&&chunk.kind) {
            out.extend_from_slice(chunk.raw);
        }
        if chunk.is(&png::chunk::IEND) {
            break;
        }
    }
    Ok(out)
}

fn canonical_jpeg(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(bytes.len());
    out.extend_from_slice(&SOI);
    for segment in jpeg::segments(bytes)? {
        if !segment.is_metadata() {
            out.extend_from_slice(segment.raw);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg::segment::tests::{sample_jpeg, segment};
    use crate::jpeg::segment::{APP1, COM};
    use crate::png::chunk::{IDAT, IEND, IHDR, TEXT, write_chunk};

    fn png(extra: &[(&[u8; 4], &[u8])]) -> Vec<u8> {
        let mut out = SIGNATURE.to_vec();
        write_chunk(&mut out, &IHDR, &[0u8; 13]).unwrap();
        write_chunk(&mut out, &IDAT, b"pixels").unwrap();
        for (kind, payload) in extra {
            write_chunk(&mut out, kind, payload).unwrap();
        }
        write_chunk(&mut out, &IEND, &[]).unwrap();
        out
    }

    // ── detect ───────────────────────────────────────────────────────

    #[test]
    fn detects_by_magic() {
        assert_eq!(detect(&png(&[])), Some(ImageFormat::Png));
        assert_eq!(detect(&sample_jpeg()), Some(ImageFormat::Jpeg));
        assert_eq!(detect(b"GIF89a"), None);
        assert_eq!(detect(&[]), None);
    }

    // ── png ──────────────────────────────────────────────────────────

    #[test]
    fn digest_is_hex_sha256() {
        let d = digest(&png(&[]));
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn png_text_chunks_do_not_matter() {
        let plain = png(&[]);
        let with_text = png(&[(&TEXT, b"chara\0abc"), (b"tIME", &[0u8; 7])]);
        assert_eq!(digest(&plain), digest(&with_text));
    }

    #[test]
    fn png_pixels_matter() {
        let mut other = SIGNATURE.to_vec();
        write_chunk(&mut other, &IHDR, &[0u8; 13]).unwrap();
        write_chunk(&mut other, &IDAT, b"different").unwrap();
        write_chunk(&mut other, &IEND, &[]).unwrap();
        assert_ne!(digest(&png(&[])), digest(&other));
    }

    #[test]
    fn png_colour_chunks_matter() {
        assert_ne!(digest(&png(&[])), digest(&png(&[(b"gAMA", &[0, 0, 0xB1, 0x8F])])));
    }

    #[test]
    fn png_bytes_after_iend_are_ignored() {
        let mut trailing = png(&[]);
        trailing.extend_from_slice(b"appended junk");
        assert_eq!(digest(&png(&[])), digest(&trailing));
    }

    #[test]
    fn truncated_png_falls_back_to_raw() {
        let full = png(&[]);
        let cut = &full[..full.len() - 3];
        assert_eq!(digest(cut), hex::encode(Sha256::digest(cut)));
    }

    // ── jpeg ─────────────────────────────────────────────────────────

    #[test]
    fn jpeg_metadata_segments_do_not_matter() {
        let plain = sample_jpeg();
        let mut tagged = plain[..2].to_vec();
        tagged.extend(segment(APP1, b"Exif\0\0II*\0"));
        tagged.extend(segment(COM, b"made with love"));
        tagged.extend_from_slice(&plain[2..]);
        assert_eq!(digest(&plain), digest(&tagged));
    }

    #[test]
    fn jpeg_scan_matters() {
        let plain = sample_jpeg();
        let mut changed = plain.clone();
        let n = changed.len();
        changed[n - 3] ^= 0x01;
        assert_ne!(digest(&plain), digest(&changed));
    }

    // ── fallback ─────────────────────────────────────────────────────

    #[test]
    fn unknown_format_hashes_raw_bytes() {
        let data = b"just some bytes";
        assert_eq!(digest(data), hex::encode(Sha256::digest(data)));
        assert_eq!(
            digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
