//! JPEG marker-segment walking and XMP injection.
//!
//! JPEG files never carry character cards here; the only write is an APP1
//! XMP segment recording an image's source URL. The walker is shared with
//! the content hasher, which drops `APPn`/`COM` segments.

pub mod segment;
mod xmp;

pub use segment::{SOI, Segment, segments};
pub use xmp::{XMP_HEADER, build_source_xmp, inject_xmp, read_xmp, source_url};
