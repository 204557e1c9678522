use crc::{CRC_32_ISO_HDLC, Crc};

use crate::error::{Error, Result};

pub const SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

pub const IHDR: [u8; 4] = *b"IHDR";
pub const IDAT: [u8; 4] = *b"IDAT";
pub const IEND: [u8; 4] = *b"IEND";
pub const TEXT: [u8; 4] = *b"tEXt";

// length (4) + type (4) + CRC (4)
const CHUNK_OVERHEAD: usize = 12;

// Reflected 0xEDB88320, init and xorout 0xFFFFFFFF.
const PNG_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// CRC-32 of a chunk type followed by its payload, as stored after every chunk.
pub fn crc32(kind: &[u8; 4], payload: &[u8]) -> u32 {
    let mut digest = PNG_CRC.digest();
    digest.update(kind);
    digest.update(payload);
    digest.finalize()
}

/// One chunk borrowed from a PNG buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Byte offset of the length field within the buffer.
    pub offset: usize,
    pub kind: [u8; 4],
    pub payload: &'a [u8],
    /// CRC as stored in the file, not recomputed.
    pub crc: u32,
    /// The complete on-disk chunk: length, type, payload and CRC.
    pub raw: &'a [u8],
}

impl Chunk<'_> {
    pub fn is(&self, kind: &[u8; 4]) -> bool {
        &self.kind == kind
    }

    pub fn kind_str(&self) -> &str {
        std::str::from_utf8(&self.kind).unwrap_or("????")
    }

    pub fn crc_matches(&self) -> bool {
        crc32(&self.kind, self.payload) == self.crc
    }
}

/// Iterator over the chunks that follow the PNG signature.
///
/// A chunk whose declared length runs past the end of the buffer yields
/// [`Error::Truncated`] and ends the iteration; nothing after a corrupt length
/// is interpreted.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Result<Chunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.bytes.len() - self.pos;
        if remaining == 0 {
            return None;
        }

        let offset = self.pos;
        if remaining < CHUNK_OVERHEAD {
            self.pos = self.bytes.len();
            return Some(Err(Error::Truncated {
                offset,
                needed: CHUNK_OVERHEAD,
                available: remaining,
            }));
        }

        let b = &self.bytes[offset..];
        let length = u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize;
        let total = CHUNK_OVERHEAD.saturating_add(length);
        if total > remaining {
            self.pos = self.bytes.len();
            return Some(Err(Error::Truncated {
                offset,
                needed: total,
                available: remaining,
            }));
        }

        let kind = [b[4], b[5], b[6], b[7]];
        let payload = &b[8..8 + length];
        let crc_at = 8 + length;
        let crc = u32::from_be_bytes([b[crc_at], b[crc_at + 1], b[crc_at + 2], b[crc_at + 3]]);

        self.pos += total;
        Some(Ok(Chunk {
            offset,
            kind,
            payload,
            crc,
            raw: &b[..total],
        }))
    }
}

/// Check the signature and return an iterator over the chunks after it.
pub fn walk(bytes: &[u8]) -> Result<Chunks<'_>> {
    if !bytes.starts_with(&SIGNATURE) {
        return Err(Error::InvalidSignature);
    }
    Ok(Chunks {
        bytes,
        pos: SIGNATURE.len(),
    })
}

/// Parse the whole container into its ordered chunk list.
pub fn chunks(bytes: &[u8]) -> Result<Vec<Chunk<'_>>> {
    walk(bytes)?.collect()
}

/// Largest payload a chunk length field may declare (2^31 - 1).
pub const MAX_CHUNK_LEN: usize = i32::MAX as usize;

fn chunk_length(len: usize) -> Result<u32> {
    if len > MAX_CHUNK_LEN {
        return Err(Error::SegmentTooLarge { len });
    }
    Ok(len as u32)
}

/// Append one complete chunk (length, type, payload, fresh CRC) to `out`.
pub fn write_chunk(out: &mut Vec<u8>, kind: &[u8; 4], payload: &[u8]) -> Result<()> {
    let length = chunk_length(payload.len())?;
    out.reserve(CHUNK_OVERHEAD + payload.len());
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
    out.extend_from_slice(&crc32(kind, payload).to_be_bytes());
    Ok(())
}

/// Split a `tEXt` payload into keyword and text at the first NUL.
pub fn split_text(payload: &[u8]) -> Option<(&[u8], &[u8])> {
    let nul = payload.iter().position(|&b| b == 0)?;
    Some((&payload[..nul], &payload[nul + 1..]))
}

/// Decode ISO-8859-1 bytes. Every byte maps to the code point of the same value.
pub fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Encode a `tEXt` keyword as ISO-8859-1.
///
/// Fails on characters above U+00FF and on NUL, which would end the keyword
/// early. Distinct keywords therefore never collide once encoded.
pub fn keyword_to_latin1(keyword: &str) -> Result<Vec<u8>> {
    keyword
        .chars()
        .map(|c| match u8::try_from(u32::from(c)) {
            Ok(b) if b != 0 => Ok(b),
            _ => Err(Error::InvalidKeyword(keyword.to_string())),
        })
        .collect()
}
