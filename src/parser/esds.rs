//! MPEG-4 elementary stream descriptors (ISO 14496-1 §7.2), as carried in an `esds` box.
//!
//! Descriptor hierarchy we care about:
//! ES_Descriptor (tag 0x03) → DecoderConfigDescriptor (tag 0x04) → DecoderSpecificInfo (0x05)

use byteorder::{BigEndian, ByteOrder};

use super::ParseError;

const ES_DESCRIPTOR: u8 = 0x03;
const DECODER_CONFIG_DESCRIPTOR: u8 = 0x04;
const DECODER_SPECIFIC_INFO: u8 = 0x05;

/// The fields of a DecoderConfigDescriptor the demuxer uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    /// objectTypeIndication, e.g. 0x40 for MPEG-4 audio.
    pub object_type: u8,
    pub stream_type: u8,
    pub max_bitrate: u32,
    pub avg_bitrate: u32,
    /// DecoderSpecificInfo payload (the AudioSpecificConfig for AAC). May be empty.
    pub specific_info: Vec<u8>,
}

/// Parse the body of an `esds` box, *after* its version/flags word.
pub fn parse(payload: &[u8]) -> Result<DecoderConfig, ParseError> {
    let mut pos = 0;
    let (tag, es) = read_descriptor(payload, &mut pos)?;
    if tag != ES_DESCRIPTOR {
        return Err(ParseError::malformed(0, format!("esds: expected ES_Descriptor, got tag {tag:#04x}")));
    }

    // ES_ID (2) + flags (1), then optional fields announced by the flags.
    if es.len() < 3 {
        return Err(ParseError::malformed(0, "esds: truncated ES_Descriptor"));
    }
    let flags = es[2];
    let mut at = 3;
    if flags & 0x80 != 0 {
        at += 2; // dependsOn_ES_ID
    }
    if flags & 0x40 != 0 {
        let url_len = *es
            .get(at)
            .ok_or_else(|| ParseError::malformed(0, "esds: truncated URL field"))?;
        at += 1 + url_len as usize;
    }
    if flags & 0x20 != 0 {
        at += 2; // OCR_ES_ID
    }
    let nested = es
        .get(at..)
        .ok_or_else(|| ParseError::malformed(0, "esds: ES_Descriptor flags overrun"))?;

    let dcd = find_descriptor(nested, DECODER_CONFIG_DESCRIPTOR)?
        .ok_or_else(|| ParseError::malformed(0, "esds: no DecoderConfigDescriptor"))?;

    // objectTypeIndication (1) + streamType (1) + bufferSizeDB (3) + maxBitrate (4) +
    // avgBitrate (4) = 13 bytes
    if dcd.len() < 13 {
        return Err(ParseError::malformed(0, "esds: truncated DecoderConfigDescriptor"));
    }

    let specific_info = find_descriptor(&dcd[13..], DECODER_SPECIFIC_INFO)?
        .map(<[u8]>::to_vec)
        .unwrap_or_default();

    Ok(DecoderConfig {
        object_type: dcd[0],
        stream_type: dcd[1] >> 2,
        max_bitrate: BigEndian::read_u32(&dcd[5..9]),
        avg_bitrate: BigEndian::read_u32(&dcd[9..13]),
        specific_info,
    })
}

/// Scan sibling descriptors for the first one tagged `wanted`.
fn find_descriptor(data: &[u8], wanted: u8) -> Result<Option<&[u8]>, ParseError> {
    let mut pos = 0;
    while pos < data.len() {
        let (tag, body) = read_descriptor(data, &mut pos)?;
        if tag == wanted {
            return Ok(Some(body));
        }
    }
    Ok(None)
}

/// Read one tag + expandable length + body, advancing `pos` past it.
fn read_descriptor<'a>(data: &'a [u8], pos: &mut usize) -> Result<(u8, &'a [u8]), ParseError> {
    let tag = *data
        .get(*pos)
        .ok_or_else(|| ParseError::malformed(*pos as u64, "esds: missing descriptor tag"))?;
    *pos += 1;

    // Up to four 7-bit groups, high bit set on all but the last.
    let mut len = 0usize;
    for _ in 0..4 {
        let b = *data
            .get(*pos)
            .ok_or_else(|| ParseError::malformed(*pos as u64, "esds: truncated descriptor length"))?;
        *pos += 1;
        len = (len << 7) | usize::from(b & 0x7F);
        if b & 0x80 == 0 {
            break;
        }
    }

    let end = *pos + len;
    let body = data.get(*pos..end).ok_or_else(|| {
        ParseError::malformed(*pos as u64, format!("esds: descriptor {tag:#04x} overruns its parent"))
    })?;
    *pos = end;
    Ok((tag, body))
}
