use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use super::chunk::{
    self, Chunk, IEND, SIGNATURE, TEXT, keyword_to_latin1, split_text, write_chunk,
};
use super::reader::{self, ASSET_PREFIX, CardKeyword, KEYWORD_V2, KEYWORD_V3};
use crate::card::{AssetMap, CardVersion};
use crate::error::{Error, Result};

/// How [`generate`] should embed the card.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateOptions {
    pub version: CardVersion,
    /// Written as `chara-ext-asset_:<path>` chunks; only used for v3.
    pub assets: AssetMap,
}

impl GenerateOptions {
    pub fn v2() -> Self {
        Self::default()
    }

    pub fn v3(assets: AssetMap) -> Self {
        Self {
            version: CardVersion::V3,
            assets,
        }
    }
}

fn is_card_chunk(chunk: &Chunk<'_>) -> bool {
    chunk.is(&TEXT)
        && split_text(chunk.payload)
            .and_then(|(keyword, _)| CardKeyword::classify(keyword))
            .is_some()
}

fn write_text_chunk(out: &mut Vec<u8>, keyword: &str, text: &[u8]) -> Result<()> {
    let mut payload = keyword_to_latin1(keyword)?;
    payload.push(0);
    payload.extend_from_slice(text);
    write_chunk(out, &TEXT, &payload)
}

fn write_card_chunks(out: &mut Vec<u8>, card_json: &str, options: &GenerateOptions) -> Result<()> {
    match options.version {
        CardVersion::V3 => {
            let encoded = STANDARD.encode(card_json.as_bytes());
            write_text_chunk(out, KEYWORD_V3, encoded.as_bytes())?;
            for (path, value) in &options.assets {
                write_text_chunk(out, &format!("{ASSET_PREFIX}{path}"), value.as_bytes())?;
            }
        }
        CardVersion::V2 => {
            if !options.assets.is_empty() {
                log::debug!("Ignoring {} asset(s) for a v2 card", options.assets.len());
            }
            write_text_chunk(out, KEYWORD_V2, card_json.as_bytes())?;
        }
    }
    Ok(())
}

/// Re-read freshly generated bytes; a mismatch is logged, never returned.
fn verify_recoverable(bytes: &[u8], card_json: &str, options: &GenerateOptions) {
    match reader::parse(bytes) {
        Ok(Some(found)) => {
            let assets_ok = options.version == CardVersion::V2 || found.assets == options.assets;
            if found.version != options.version || found.payload != card_json || !assets_ok {
                log::warn!(
                    "Generated PNG does not read back the {} card that was written",
                    options.version
                );
            }
        }
        Ok(None) => log::warn!("Generated PNG carries no readable card data"),
        Err(e) => log::warn!("Generated PNG could not be re-read: {e}"),
    }
}

/// Rebuild a PNG with `card_json` embedded.
///
/// Every existing `chara`, `ccv3` and `chara-ext-asset_:` text chunk is dropped,
/// all other chunks are copied byte for byte, and the new card chunks are
/// inserted directly before `IEND`:
///
/// - v3: one `ccv3` chunk holding Base64 of the JSON, then one chunk per asset
///   with the value as given.
/// - v2: one `chara` chunk holding `card_json` as given (callers Base64-encode
///   beforehand when following the usual convention).
///
/// Fails with [`Error::MissingIend`] when the result would not end in `IEND`,
/// and with [`Error::InvalidKeyword`] when an asset path cannot be written as
/// a Latin-1 keyword.
pub fn generate(bytes: &[u8], card_json: &str, options: &GenerateOptions) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(bytes.len() + card_json.len() * 2 + 64);
    out.extend_from_slice(&SIGNATURE);

    let mut last_kind = None;
    let mut inserted = false;
    let mut dropped = 0usize;

    for chunk in chunk::walk(bytes)? {
        let chunk = chunk?;

        if is_card_chunk(&chunk) {
            dropped += 1;
            continue;
        }

        if chunk.is(&IEND) && !inserted {
            write_card_chunks(&mut out, card_json, options)?;
            inserted = true;
        }

        out.extend_from_slice(chunk.raw);
        last_kind = Some(chunk.kind);
    }

    if last_kind != Some(IEND) {
        return Err(Error::MissingIend);
    }

    log::debug!(
        "Replaced {dropped} card chunk(s) with a {} card ({} bytes)",
        options.version,
        card_json.len()
    );

    verify_recoverable(&out, card_json, options);
    Ok(out)
}
