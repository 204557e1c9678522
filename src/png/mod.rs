//! PNG chunk walking and character-card embedding.
//!
//! A PNG is an 8-byte signature followed by chunks laid out as
//! `u32 length (BE) | 4-byte type | payload | u32 CRC-32 (BE, over type + payload)`.
//! Character data lives in `tEXt` chunks keyed `chara` (v2), `ccv3` (v3) and
//! `chara-ext-asset_:<path>` (v3 assets).
//!
//! - [`parse`]: locate card data (`Ok(None)` when there is none)
//! - [`generate`]: replace card data, leaving every other chunk untouched

pub mod chunk;
mod reader;
mod writer;

pub use chunk::{Chunk, SIGNATURE, chunks};
pub use reader::{ASSET_PREFIX, KEYWORD_V2, KEYWORD_V3, TextEntry, parse, text_entries};
pub use writer::{GenerateOptions, generate};
