use crate::error::{Error, Result};

pub const SOI: [u8; 2] = [0xFF, 0xD8];

pub const TEM: u8 = 0x01;
pub const RST0: u8 = 0xD0;
pub const RST7: u8 = 0xD7;
pub const EOI: u8 = 0xD9;
pub const SOS: u8 = 0xDA;
pub const APP0: u8 = 0xE0;
pub const APP1: u8 = 0xE1;
pub const APP15: u8 = 0xEF;
pub const COM: u8 = 0xFE;

/// One marker segment borrowed from a JPEG buffer.
///
/// For `SOS` the segment runs to the end of the buffer: the scan header,
/// the entropy-coded data and the trailing `EOI` are kept as one opaque block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub marker: u8,
    /// Offset of the `0xFF` that starts the marker.
    pub offset: usize,
    /// Marker bytes through the end of the segment.
    pub raw: &'a [u8],
    /// Bytes after the length field; empty for standalone markers.
    pub payload: &'a [u8],
}

impl Segment<'_> {
    pub fn is_app(&self) -> bool {
        (APP0..=APP15).contains(&self.marker)
    }

    /// `APPn` and `COM` segments: metadata that does not affect decoding.
    pub fn is_metadata(&self) -> bool {
        self.is_app() || self.marker == COM
    }

    pub fn is_scan(&self) -> bool {
        self.marker == SOS
    }
}

fn standalone(marker: u8) -> bool {
    marker == TEM || (RST0..=RST7).contains(&marker)
}

/// Walk the marker segments that follow SOI.
///
/// Walking ends at `SOS` (which swallows the rest of the buffer), at `EOI`, or
/// when the buffer runs out on a segment boundary.
pub fn segments(bytes: &[u8]) -> Result<Vec<Segment<'_>>> {
    if !bytes.starts_with(&SOI) {
        return Err(Error::InvalidSignature);
    }

    let mut found = Vec::new();
    let mut pos = SOI.len();

    while pos < bytes.len() {
        if bytes[pos] != 0xFF {
            return Err(Error::Jpeg(format!(
                "expected marker at offset {pos}, found 0x{:02X}",
                bytes[pos]
            )));
        }

        // Fill bytes: any number of 0xFF may precede a marker.
        let mut start = pos;
        while start + 1 < bytes.len() && bytes[start + 1] == 0xFF {
            start += 1;
        }
        if start + 1 >= bytes.len() {
            return Err(Error::Truncated {
                offset: start,
                needed: 2,
                available: bytes.len() - start,
            });
        }

        let marker = bytes[start + 1];
        if marker == EOI || standalone(marker) {
            found.push(Segment {
                marker,
                offset: start,
                raw: &bytes[start..start + 2],
                payload: &[],
            });
            pos = start + 2;
            if marker == EOI {
                break;
            }
            continue;
        }

        if start + 4 > bytes.len() {
            return Err(Error::Truncated {
                offset: start,
                needed: 4,
                available: bytes.len() - start,
            });
        }
        let length = u16::from_be_bytes([bytes[start + 2], bytes[start + 3]]) as usize;
        if length < 2 {
            return Err(Error::Jpeg(format!(
                "segment 0x{marker:02X} at offset {start} has length {length}"
            )));
        }
        let end = start + 2 + length;
        if end > bytes.len() {
            return Err(Error::Truncated {
                offset: start,
                needed: 2 + length,
                available: bytes.len() - start,
            });
        }

        if marker == SOS {
            found.push(Segment {
                marker,
                offset: start,
                raw: &bytes[start..],
                payload: &bytes[start + 4..],
            });
            break;
        }

        found.push(Segment {
            marker,
            offset: start,
            raw: &bytes[start..end],
            payload: &bytes[start + 4..end],
        });
        pos = end;
    }

    Ok(found)
}
