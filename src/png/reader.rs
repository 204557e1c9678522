use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use super::chunk::{self, TEXT, latin1_to_string, split_text};
use crate::card::{AssetMap, CardVersion, CharacterPayload};
use crate::error::Result;

pub const KEYWORD_V2: &str = "chara";
pub const KEYWORD_V3: &str = "ccv3";
pub const ASSET_PREFIX: &str = "chara-ext-asset_:";

/// A `tEXt` entry: Latin-1 keyword and raw text bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEntry {
    pub keyword: String,
    pub text: Vec<u8>,
}

/// The keyword families that carry character data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CardKeyword {
    V2,
    V3,
    Asset(String),
}

impl CardKeyword {
    pub(crate) fn classify(keyword: &[u8]) -> Option<Self> {
        if keyword == KEYWORD_V2.as_bytes() {
            Some(Self::V2)
        } else if keyword == KEYWORD_V3.as_bytes() {
            Some(Self::V3)
        } else {
            keyword
                .strip_prefix(ASSET_PREFIX.as_bytes())
                .map(|path| Self::Asset(latin1_to_string(path)))
        }
    }
}

/// List every `tEXt` entry in the container, in file order.
///
/// Chunks without a keyword terminator are skipped.
pub fn text_entries(bytes: &[u8]) -> Result<Vec<TextEntry>> {
    let mut entries = Vec::new();
    for chunk in chunk::walk(bytes)? {
        let chunk = chunk?;
        if !chunk.is(&TEXT) {
            continue;
        }
        if let Some((keyword, text)) = split_text(chunk.payload) {
            entries.push(TextEntry {
                keyword: latin1_to_string(keyword),
                text: text.to_vec(),
            });
        }
    }
    Ok(entries)
}

/// Locate character data in a PNG.
///
/// Returns `Ok(None)` when no `chara` or `ccv3` entry exists. When both exist
/// the `ccv3` entry wins; among duplicates of one keyword the first wins.
/// Asset entries are collected whichever version is returned.
///
/// A bad signature or a chunk length running past the end of the buffer is a
/// structural error. A `ccv3` entry that is not valid Base64 of UTF-8 is a
/// format error.
pub fn parse(bytes: &[u8]) -> Result<Option<CharacterPayload>> {
    let mut v2: Option<&[u8]> = None;
    let mut v3: Option<&[u8]> = None;
    let mut assets = AssetMap::new();

    for chunk in chunk::walk(bytes)? {
        let chunk = chunk?;
        if !chunk.is(&TEXT) {
            continue;
        }

        if !chunk.crc_matches() {
            log::warn!("tEXt chunk at offset {} has a bad CRC", chunk.offset);
        }

        let Some((keyword, text)) = split_text(chunk.payload) else {
            log::warn!(
                "Skipping tEXt chunk at offset {}: no keyword terminator",
                chunk.offset
            );
            continue;
        };

        match CardKeyword::classify(keyword) {
            Some(CardKeyword::V3) if v3.is_none() => v3 = Some(text),
            Some(CardKeyword::V2) if v2.is_none() => v2 = Some(text),
            Some(CardKeyword::Asset(path)) => {
                assets.entry(path).or_insert_with(|| latin1_to_string(text));
            }
            Some(_) => log::debug!(
                "Ignoring duplicate {} chunk at offset {}",
                latin1_to_string(keyword),
                chunk.offset
            ),
            None => {}
        }
    }

    if let Some(encoded) = v3 {
        if v2.is_some() {
            log::debug!("Both ccv3 and chara present; using ccv3");
        }
        let decoded = STANDARD.decode(encoded.trim_ascii())?;
        return Ok(Some(CharacterPayload {
            version: CardVersion::V3,
            payload: String::from_utf8(decoded)?,
            assets,
        }));
    }

    if let Some(text) = v2 {
        return Ok(Some(CharacterPayload {
            version: CardVersion::V2,
            payload: latin1_to_string(text),
            assets,
        }));
    }

    if !assets.is_empty() {
        log::debug!("{} asset chunk(s) found without card data", assets.len());
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::png::chunk::{IDAT, IEND, IHDR, SIGNATURE, write_chunk};

    fn text_payload(keyword: &str, text: &[u8]) -> Vec<u8> {
        let mut payload = keyword.as_bytes().to_vec();
        payload.push(0);
        payload.extend_from_slice(text);
        payload
    }

    fn png_with_texts(texts: &[(&str, &[u8])]) -> Vec<u8> {
        let mut out = SIGNATURE.to_vec();
        write_chunk(&mut out, &IHDR, &[0u8; 13]).unwrap();
        write_chunk(&mut out, &IDAT, b"idat").unwrap();
        for (keyword, text) in texts {
            write_chunk(&mut out, &TEXT, &text_payload(keyword, text)).unwrap();
        }
        write_chunk(&mut out, &IEND, &[]).unwrap();
        out
    }

    // ── parse ────────────────────────────────────────────────────────

    #[test]
    fn no_text_chunks_is_none() {
        assert_eq!(parse(&png_with_texts(&[])).unwrap(), None);
    }

    #[test]
    fn unrelated_text_is_none() {
        let png = png_with_texts(&[("Software", b"paint.net")]);
        assert_eq!(parse(&png).unwrap(), None);
    }

    #[test]
    fn chara_is_returned_raw() {
        let png = png_with_texts(&[("chara", b"eyJuYW1lIjoiRXZlIn0=")]);
        let payload = parse(&png).unwrap().unwrap();
        assert_eq!(payload.version, CardVersion::V2);
        assert_eq!(payload.payload, "eyJuYW1lIjoiRXZlIn0=");
        assert!(payload.assets.is_empty());
    }

    #[test]
    fn ccv3_is_decoded_and_wins() {
        let encoded = STANDARD.encode(r#"{"data":{"name":"Y"}}"#);
        let png = png_with_texts(&[("chara", b"X"), ("ccv3", encoded.as_bytes())]);
        let payload = parse(&png).unwrap().unwrap();
        assert_eq!(payload.version, CardVersion::V3);
        assert_eq!(payload.payload, r#"{"data":{"name":"Y"}}"#);
    }

    #[test]
    fn first_duplicate_wins() {
        let png = png_with_texts(&[("chara", b"first"), ("chara", b"second")]);
        assert_eq!(parse(&png).unwrap().unwrap().payload, "first");
    }

    #[test]
    fn assets_are_collected() {
        let encoded = STANDARD.encode("{}");
        let png = png_with_texts(&[
            ("ccv3", encoded.as_bytes()),
            ("chara-ext-asset_:icons/main.png", b"aWNvbg=="),
            ("chara-ext-asset_:bg.webp", b"Ymc="),
        ]);
        let payload = parse(&png).unwrap().unwrap();
        assert_eq!(payload.assets.len(), 2);
        assert_eq!(payload.assets["icons/main.png"], "aWNvbg==");
        assert_eq!(payload.assets["bg.webp"], "Ymc=");
    }

    #[test]
    fn assets_alone_are_none() {
        let png = png_with_texts(&[("chara-ext-asset_:a", b"x")]);
        assert_eq!(parse(&png).unwrap(), None);
    }

    #[test]
    fn bad_ccv3_base64_is_reported() {
        let png = png_with_texts(&[("ccv3", b"***not base64***")]);
        assert!(matches!(parse(&png), Err(Error::Base64(_))));
    }

    #[test]
    fn ccv3_must_be_utf8() {
        let encoded = STANDARD.encode([0xFF, 0xFE, 0x00]);
        let png = png_with_texts(&[("ccv3", encoded.as_bytes())]);
        assert!(matches!(parse(&png), Err(Error::Utf8(_))));
    }

    #[test]
    fn chunk_without_terminator_is_skipped() {
        let mut png = SIGNATURE.to_vec();
        write_chunk(&mut png, &IHDR, &[0u8; 13]).unwrap();
        write_chunk(&mut png, &TEXT, b"chara-without-nul").unwrap();
        write_chunk(&mut png, &TEXT, &text_payload("chara", b"abc")).unwrap();
        write_chunk(&mut png, &IEND, &[]).unwrap();

        let payload = parse(&png).unwrap().unwrap();
        assert_eq!(payload.payload, "abc");
    }

    #[test]
    fn latin1_text_is_preserved() {
        let png = png_with_texts(&[("chara", &[b'c', 0xE9])]);
        assert_eq!(parse(&png).unwrap().unwrap().payload, "c\u{e9}");
    }

    #[test]
    fn corrupt_length_aborts_parse() {
        // A damaged length in front of the card chunk: nothing after it is trusted,
        // even though a valid-looking chara chunk follows.
        let mut png = png_with_texts(&[("Comment", b"hello"), ("chara", b"abc")]);
        let comment_offset = 8 + (12 + 13) + (12 + 4);
        png[comment_offset..comment_offset + 4].copy_from_slice(&0x00FF_FFFFu32.to_be_bytes());

        let err = parse(&png).unwrap_err();
        assert!(matches!(err, Error::Truncated { offset, .. } if offset == comment_offset));
    }

    #[test]
    fn not_a_png() {
        assert!(matches!(parse(b"\xFF\xD8\xFF\xE0"), Err(Error::InvalidSignature)));
    }

    #[test]
    fn bad_crc_is_tolerated() {
        let mut png = png_with_texts(&[("chara", b"abc")]);
        // Last byte of the tEXt CRC sits just before IEND.
        let crc_end = png.len() - 12 - 1;
        png[crc_end] ^= 0x55;
        assert_eq!(parse(&png).unwrap().unwrap().payload, "abc");
    }

    // ── text_entries ─────────────────────────────────────────────────

    #[test]
    fn lists_all_text_entries() {
        let png = png_with_texts(&[("Title", b"Eve"), ("chara", b"abc")]);
        let entries = text_entries(&png).unwrap();
        assert_eq!(
            entries,
            vec![
                TextEntry {
                    keyword: "Title".into(),
                    text: b"Eve".to_vec()
                },
                TextEntry {
                    keyword: "chara".into(),
                    text: b"abc".to_vec()
                },
            ]
        );
    }

    #[test]
    fn classify_keywords() {
        assert_eq!(CardKeyword::classify(b"chara"), Some(CardKeyword::V2));
        assert_eq!(CardKeyword::classify(b"ccv3"), Some(CardKeyword::V3));
        assert_eq!(
            CardKeyword::classify(b"chara-ext-asset_:x/y.png"),
            Some(CardKeyword::Asset("x/y.png".into()))
        );
        assert_eq!(CardKeyword::classify(b"Chara"), None);
        assert_eq!(CardKeyword::classify(b"charac"), None);
    }
}
