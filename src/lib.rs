//! # chara-card
//!
//! Read, write and hash character-card metadata stored inside PNG and JPEG
//! images. Cards live in PNG `tEXt` chunks (`chara` for v2, `ccv3` for v3,
//! `chara-ext-asset_:<path>` for v3 assets); JPEGs only get an XMP record of
//! where they came from. A content hash that ignores all of this metadata gives
//! each image a stable identity for annotations kept outside the file.
//!
//! ## Quick Start
//!
//! The pipeline module handles file I/O around the codec:
//!
//! ```rust,no_run
//! use chara_card::pipeline::{collect_images, read_card};
//! use std::path::PathBuf;
//!
//! fn main() -> anyhow::Result<()> {
//!     for path in collect_images(&[PathBuf::from("./cards")]) {
//!         match read_card(&path)? {
//!             Some(read) => println!("{}: {}", path.display(), read.card.name),
//!             None => println!("{}: no card", path.display()),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Lower-Level Usage
//!
//! The codec works on in-memory buffers and never touches the filesystem:
//!
//! ```rust,no_run
//! use chara_card::{card, hash, png};
//!
//! fn main() -> anyhow::Result<()> {
//!     let bytes = std::fs::read("card.png")?;
//!
//!     // 1. Locate the card payload
//!     if let Some(payload) = png::parse(&bytes)? {
//!         // 2. Decode and normalize whichever schema it uses
//!         let json = card::decode_payload(&payload)?;
//!         let card = card::normalize(&json)?;
//!         println!("{} by {}", card.name, card.creator);
//!
//!         // 3. Re-embed as v3
//!         let v3 = card::to_schema_json(&card, card::CardVersion::V3)?;
//!         let out = png::generate(&bytes, &v3, &png::GenerateOptions::v3(payload.assets))?;
//!
//!         // The picture itself did not change
//!         assert_eq!(hash::digest(&bytes), hash::digest(&out));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Formats
//!
//! | Format | Card | Source URL | Content hash covers |
//! |--------|------|------------|---------------------|
//! | PNG (`.png`) | `tEXt` chunks, read + write | - | critical and colour chunks |
//! | JPEG (`.jpg`, `.jpeg`) | - | XMP in APP1 | every segment except `APPn`/`COM` |
//!
//! ## Modules
//!
//! - [`png`]: chunk walking, card extraction and card embedding
//! - [`jpeg`]: marker-segment walking and XMP injection
//! - [`card`]: card schemas (v2/v3) and normalization
//! - [`hash`]: metadata-invariant content hashing
//! - [`config`]: configuration types and loading/saving
//! - [`pipeline`]: file-level operations and image collection
//! - [`scan`]: directory trees and the annotation index

pub mod card;
pub mod config;
pub mod error;
pub mod hash;
pub mod jpeg;
pub mod pipeline;
pub mod png;
pub mod scan;

pub use error::{Error, Result};
