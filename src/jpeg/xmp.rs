use img_parts::Bytes;
use img_parts::jpeg::{Jpeg, JpegSegment};

use super::segment::{self, APP0, APP1};
use crate::error::{Error, Result};

pub const XMP_HEADER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";

const CHARA_NS: &str = "https://chara-card.dev/ns/1.0/";

// The length field counts itself.
const MAX_SEGMENT_CONTENTS: usize = u16::MAX as usize - 2;

/// Build an XMP packet recording where an image was downloaded from.
///
/// The URL is written twice: as `dc:source` for general tools and as
/// `chara:sourceUrl` for this crate.
pub fn build_source_xmp(url: &str) -> String {
    let url_esc = xml_escape(url);

    let mut xmp = String::new();
    xmp.push_str("<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n");
    xmp.push_str("<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n");
    xmp.push_str("<rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n");
    xmp.push_str("<rdf:Description rdf:about=\"\"\n");
    xmp.push_str("  xmlns:dc=\"http://purl.org/dc/elements/1.1/\"\n");
    xmp.push_str(&format!("  xmlns:chara=\"{CHARA_NS}\">\n"));
    xmp.push_str(&format!("  <dc:source>{url_esc}</dc:source>\n"));
    xmp.push_str(&format!("  <chara:sourceUrl>{url_esc}</chara:sourceUrl>\n"));
    xmp.push_str("</rdf:Description>\n");
    xmp.push_str("</rdf:RDF>\n");
    xmp.push_str("</x:xmpmeta>\n");
    xmp.push_str("<?xpacket end=\"w\"?>");
    xmp
}

/// Escape special XML characters.
fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Insert an XMP APP1 segment carrying `packet`.
///
/// The segment goes right after the first APP0 segment when there is one,
/// otherwise right after SOI. Existing segments, including older XMP, stay
/// where they are.
pub fn inject_xmp(bytes: &[u8], packet: &str) -> Result<Vec<u8>> {
    // Validates SOI and the marker stream before handing off to img-parts.
    segment::segments(bytes)?;

    let mut contents = Vec::with_capacity(XMP_HEADER.len() + packet.len());
    contents.extend_from_slice(XMP_HEADER);
    contents.extend_from_slice(packet.as_bytes());
    if contents.len() > MAX_SEGMENT_CONTENTS {
        return Err(Error::SegmentTooLarge {
            len: contents.len(),
        });
    }

    let mut jpeg =
        Jpeg::from_bytes(Bytes::copy_from_slice(bytes)).map_err(|e| Error::Jpeg(e.to_string()))?;

    let insert_pos = jpeg
        .segments()
        .iter()
        .position(|s| s.marker() == APP0)
        .map_or(0, |p| p + 1);
    jpeg.segments_mut()
        .insert(insert_pos, JpegSegment::new_with_contents(APP1, Bytes::from(contents)));

    log::debug!("Inserted XMP segment at position {insert_pos}");
    Ok(jpeg.encoder().bytes().to_vec())
}

/// Return the first XMP packet found in the JPEG, if any.
pub fn read_xmp(bytes: &[u8]) -> Result<Option<String>> {
    let packet = segment::segments(bytes)?
        .into_iter()
        .find(|s| s.marker == APP1 && s.payload.starts_with(XMP_HEADER))
        .map(|s| String::from_utf8_lossy(&s.payload[XMP_HEADER.len()..]).into_owned());
    Ok(packet)
}

/// Pull the `chara:sourceUrl` value back out of a packet built by [`build_source_xmp`].
pub fn source_url(packet: &str) -> Option<String> {
    const OPEN: &str = "<chara:sourceUrl>";
    const CLOSE: &str = "</chara:sourceUrl>";
    let start = packet.find(OPEN)? + OPEN.len();
    let end = start + packet[start..].find(CLOSE)?;
    Some(xml_unescape(&packet[start..end]))
}

fn xml_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
