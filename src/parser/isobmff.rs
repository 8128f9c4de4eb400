//! Built-in ISO base media file parser (MP4, M4A, and QuickTime-flavoured MOV).
//!
//! Only the movie metadata is read. The parser walks top-level boxes through the
//! [`FileProvider`], seeking over anything that is not `moov`, then buffers the movie box
//! whole and parses its track tree in memory:
//!
//! moov → trak → { tkhd, mdia → { mdhd, hdlr, minf → stbl → stsd } }
//!
//! Reference: ISO 14496-12 (ISO Base Media File Format), ISO 14496-14 (MP4 file format).

use std::io::{self, Cursor};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use tracing::{debug, trace};

use super::{AudioCodec, AudioTrackInfo, ContainerParser, ParseError, TrackId, esds, tags};
use crate::provider::{FileHandle, FileProvider, ReadStatus};

const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*code)
}

const MOOV: u32 = fourcc(b"moov");
const TRAK: u32 = fourcc(b"trak");
const TKHD: u32 = fourcc(b"tkhd");
const MDIA: u32 = fourcc(b"mdia");
const MDHD: u32 = fourcc(b"mdhd");
const HDLR: u32 = fourcc(b"hdlr");
const MINF: u32 = fourcc(b"minf");
const STBL: u32 = fourcc(b"stbl");
const STSD: u32 = fourcc(b"stsd");
const ESDS: u32 = fourcc(b"esds");
const WAVE: u32 = fourcc(b"wave");
const DAMR: u32 = fourcc(b"damr");

// Audio sample entries.
const MP4A: u32 = fourcc(b"mp4a");
const DOT_MP3: u32 = fourcc(b".mp3");
const MS_MP3: u32 = fourcc(b"ms\0U");
const SAMR: u32 = fourcc(b"samr");
const SAWB: u32 = fourcc(b"sawb");

/// Largest movie box we buffer in one piece.
const MAX_MOVIE_BOX: u64 = 64 * 1024 * 1024;

/// The movie box body is buffered in pieces of this size, so memory grows only with bytes
/// that have actually arrived.
const MOVIE_READ_CHUNK: usize = 16 * 1024;

/// Fixed part of an audio sample entry body (ISO 14496-12 §12.2.3), before child boxes.
const SOUND_ENTRY_LEN: usize = 28;

fn fourcc_to_string(code: u32) -> String {
    code.to_be_bytes()
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
        .collect()
}

fn is_printable(code: u32) -> bool {
    code.to_be_bytes()
        .iter()
        .all(|&b| b.is_ascii_graphic() || b == b' ')
}

#[derive(Debug, Clone)]
struct Track {
    id: TrackId,
    handler: String,
    audio: Option<AudioTrackInfo>,
}

/// [`ContainerParser`] for ISO base media files.
#[derive(Debug)]
pub struct IsoBmffParser {
    tracks: Vec<Track>,
}

impl IsoBmffParser {
    fn scan(provider: &mut dyn FileProvider, handle: FileHandle) -> Result<Self, ParseError> {
        let mut pos = 0u64;
        provider.seek(handle, pos)?;

        loop {
            let mut header = [0u8; 8];
            match read_exact(provider, handle, &mut header) {
                Err(ParseError::EndOfStream) => return Err(ParseError::MissingMovie),
                other => other?,
            }

            let mut size = u64::from(BigEndian::read_u32(&header[..4]));
            let kind = BigEndian::read_u32(&header[4..]);
            if !is_printable(kind) {
                return Err(ParseError::malformed(
                    pos,
                    format!("invalid box type '{}'", fourcc_to_string(kind)),
                ));
            }

            let mut header_len = 8u64;
            if size == 1 {
                let mut large = [0u8; 8];
                read_exact(provider, handle, &mut large)?;
                size = BigEndian::read_u64(&large);
                header_len = 16;
            }
            trace!(kind = %fourcc_to_string(kind), offset = pos, size, "top-level box");

            if size == 0 {
                // Box runs to end of file; nothing can follow it.
                if kind == MOOV {
                    return Err(ParseError::malformed(pos, "movie box without an explicit size"));
                }
                return Err(ParseError::MissingMovie);
            }
            if size < header_len {
                return Err(ParseError::malformed(
                    pos,
                    format!("box size {size} smaller than its header"),
                ));
            }

            if kind == MOOV {
                let body_len = size - header_len;
                if body_len > MAX_MOVIE_BOX {
                    return Err(ParseError::malformed(
                        pos,
                        format!("movie box of {body_len} bytes exceeds {MAX_MOVIE_BOX}"),
                    ));
                }
                let body = read_body(provider, handle, body_len as usize)?;
                return Self::from_movie(&body, pos + header_len);
            }

            pos = pos
                .checked_add(size)
                .ok_or_else(|| ParseError::malformed(pos, "box size overflows"))?;
            provider.seek(handle, pos)?;
        }
    }

    fn from_movie(body: &[u8], offset: u64) -> Result<Self, ParseError> {
        let mut tracks = Vec::new();
        for atom in BoxIter::new(body, offset) {
            let atom = atom?;
            if atom.kind == TRAK {
                tracks.push(parse_trak(&atom)?);
            }
        }
        Ok(Self { tracks })
    }

    fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    fn log_tracks(&self) {
        for track in &self.tracks {
            match &track.audio {
                Some(audio) => debug!(
                    track = track.id,
                    kind = %track.handler,
                    codec = ?audio.codec,
                    time_scale = audio.time_scale,
                    duration_ms = audio.duration_ms(),
                    avg_bitrate = audio.avg_bitrate,
                    decoder_config_len = audio.decoder_config.len(),
                    "audio track"
                ),
                None => debug!(track = track.id, kind = %track.handler, "track"),
            }
        }
    }
}

impl ContainerParser for IsoBmffParser {
    fn open(provider: &mut dyn FileProvider, name: &str) -> Result<Self, ParseError> {
        let handle = provider.open(name);
        let scanned = Self::scan(provider, handle);
        if let Err(err) = provider.close(handle) {
            trace!(error = %err, "closing virtual file");
        }

        let parser = scanned?;
        debug!(name, tracks = parser.tracks.len(), "parsed movie box");
        parser.log_tracks();
        Ok(parser)
    }

    fn track_ids(&self) -> Vec<TrackId> {
        self.tracks.iter().map(|t| t.id).collect()
    }

    fn track_type_tag(&self, track: TrackId) -> Option<&str> {
        self.track(track).map(|t| t.handler.as_str())
    }

    fn audio_track_info(&self, track: TrackId) -> Result<AudioTrackInfo, ParseError> {
        let found = self.track(track).ok_or(ParseError::UnknownTrack(track))?;
        found.audio.clone().ok_or(ParseError::NotAudio(track))
    }
}

fn read_exact(
    provider: &mut dyn FileProvider,
    handle: FileHandle,
    buf: &mut [u8],
) -> Result<(), ParseError> {
    match provider.read(handle, buf) {
        ReadStatus::Ok => Ok(()),
        ReadStatus::RetryLater => Err(ParseError::Incomplete),
        ReadStatus::End => Err(ParseError::EndOfStream),
    }
}

fn read_body(
    provider: &mut dyn FileProvider,
    handle: FileHandle,
    len: usize,
) -> Result<Vec<u8>, ParseError> {
    let mut body = Vec::with_capacity(len.min(MOVIE_READ_CHUNK));
    while body.len() < len {
        let start = body.len();
        let piece = (len - start).min(MOVIE_READ_CHUNK);
        body.resize(start + piece, 0);
        read_exact(provider, handle, &mut body[start..])?;
    }
    Ok(body)
}

// In-memory box walking.

/// One box inside a buffered parent.
struct Atom<'a> {
    kind: u32,
    body: &'a [u8],
    /// File offset of `body`.
    offset: u64,
}

impl<'a> Atom<'a> {
    fn children(&self) -> BoxIter<'a> {
        BoxIter::new(self.body, self.offset)
    }

    /// Children that start `skip` bytes into the body.
    fn children_after(&self, skip: usize) -> Result<BoxIter<'a>, ParseError> {
        let rest = self.body.get(skip..).ok_or_else(|| self.too_short())?;
        Ok(BoxIter::new(rest, self.offset + skip as u64))
    }

    fn too_short(&self) -> ParseError {
        ParseError::malformed(
            self.offset,
            format!("truncated '{}' box", fourcc_to_string(self.kind)),
        )
    }

    fn truncated(&self) -> impl Fn(io::Error) -> ParseError {
        let (offset, kind) = (self.offset, self.kind);
        move |_| ParseError::malformed(offset, format!("truncated '{}' box", fourcc_to_string(kind)))
    }
}

struct BoxIter<'a> {
    data: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> BoxIter<'a> {
    fn new(data: &'a [u8], base: u64) -> Self {
        Self { data, pos: 0, base }
    }
}

impl<'a> Iterator for BoxIter<'a> {
    type Item = Result<Atom<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.data[self.pos..];
        if rest.is_empty() {
            return None;
        }

        match split_atom(rest, self.base + self.pos as u64) {
            Ok((atom, len)) => {
                self.pos += len;
                Some(Ok(atom))
            }
            Err(err) => {
                self.pos = self.data.len();
                Some(Err(err))
            }
        }
    }
}

fn split_atom(rest: &[u8], offset: u64) -> Result<(Atom<'_>, usize), ParseError> {
    if rest.len() < 8 {
        return Err(ParseError::malformed(offset, "truncated box header"));
    }
    let kind = BigEndian::read_u32(&rest[4..8]);
    let (size, header) = match BigEndian::read_u32(&rest[..4]) {
        0 => (rest.len(), 8),
        1 => {
            if rest.len() < 16 {
                return Err(ParseError::malformed(offset, "truncated large box header"));
            }
            let large = usize::try_from(BigEndian::read_u64(&rest[8..16]))
                .map_err(|_| ParseError::malformed(offset, "box size overflows"))?;
            (large, 16)
        }
        n => (n as usize, 8),
    };

    if size < header || size > rest.len() {
        return Err(ParseError::malformed(
            offset,
            format!(
                "box '{}' of {size} bytes does not fit its parent ({} left)",
                fourcc_to_string(kind),
                rest.len()
            ),
        ));
    }

    let atom = Atom {
        kind,
        body: &rest[header..size],
        offset: offset + header as u64,
    };
    Ok((atom, size))
}

// Track tree.

#[derive(Default)]
struct Media {
    handler: Option<String>,
    time_scale: u32,
    duration: u64,
    sample: Option<SoundEntry>,
}

struct SoundEntry {
    codec: AudioCodec,
    avg_bitrate: u32,
    decoder_config: Vec<u8>,
}

fn parse_trak(trak: &Atom<'_>) -> Result<Track, ParseError> {
    let mut id = None;
    let mut media = Media::default();

    for child in trak.children() {
        let child = child?;
        match child.kind {
            TKHD => id = Some(parse_tkhd(&child)?),
            MDIA => media = parse_mdia(&child)?,
            _ => {}
        }
    }

    let id = id.ok_or_else(|| ParseError::malformed(trak.offset, "track without a track header"))?;
    let handler = media.handler.unwrap_or_default();
    let audio = (handler == tags::AUDIO).then(|| {
        let sample = media.sample.unwrap_or(SoundEntry {
            codec: AudioCodec::Unknown,
            avg_bitrate: 0,
            decoder_config: Vec::new(),
        });
        AudioTrackInfo {
            codec: sample.codec,
            time_scale: media.time_scale,
            duration: media.duration,
            avg_bitrate: sample.avg_bitrate,
            decoder_config: sample.decoder_config,
        }
    });

    Ok(Track { id, handler, audio })
}

fn parse_tkhd(tkhd: &Atom<'_>) -> Result<TrackId, ParseError> {
    let mut r = Cursor::new(tkhd.body);
    let version = r.read_u8().map_err(tkhd.truncated())?;
    // version/flags, then creation + modification times (32 or 64 bit each).
    r.set_position(if version == 1 { 20 } else { 12 });
    r.read_u32::<BigEndian>().map_err(tkhd.truncated())
}

fn parse_mdia(mdia: &Atom<'_>) -> Result<Media, ParseError> {
    let mut media = Media::default();
    let mut minf = None;

    for child in mdia.children() {
        let child = child?;
        match child.kind {
            MDHD => {
                let mut r = Cursor::new(child.body);
                let version = r.read_u8().map_err(child.truncated())?;
                if version == 1 {
                    r.set_position(20);
                    media.time_scale = r.read_u32::<BigEndian>().map_err(child.truncated())?;
                    media.duration = r.read_u64::<BigEndian>().map_err(child.truncated())?;
                } else {
                    r.set_position(12);
                    media.time_scale = r.read_u32::<BigEndian>().map_err(child.truncated())?;
                    media.duration = u64::from(r.read_u32::<BigEndian>().map_err(child.truncated())?);
                }
            }
            HDLR => {
                // version/flags + pre_defined, then handler_type.
                let handler = child.body.get(8..12).ok_or_else(|| child.too_short())?;
                media.handler = Some(String::from_utf8_lossy(handler).into_owned());
            }
            MINF => minf = Some(child),
            _ => {}
        }
    }

    // Sample descriptions are only interpreted for sound tracks.
    if media.handler.as_deref() == Some(tags::AUDIO) {
        if let Some(minf) = minf {
            media.sample = find_sound_entry(&minf)?;
        }
    }
    Ok(media)
}

fn find_sound_entry(minf: &Atom<'_>) -> Result<Option<SoundEntry>, ParseError> {
    for stbl in minf.children() {
        let stbl = stbl?;
        if stbl.kind != STBL {
            continue;
        }
        for stsd in stbl.children() {
            let stsd = stsd?;
            if stsd.kind != STSD {
                continue;
            }
            // version/flags + entry_count; only the first entry is used.
            if let Some(entry) = stsd.children_after(8)?.next() {
                return parse_sound_entry(&entry?).map(Some);
            }
        }
    }
    Ok(None)
}

fn parse_sound_entry(entry: &Atom<'_>) -> Result<SoundEntry, ParseError> {
    if entry.body.len() < SOUND_ENTRY_LEN {
        return Err(entry.too_short());
    }

    // QuickTime sound descriptions v1/v2 append extra fields before the children.
    let sound_version = BigEndian::read_u16(&entry.body[8..10]);
    let skip = SOUND_ENTRY_LEN
        + match sound_version {
            1 => 16,
            2 => 36,
            _ => 0,
        };

    let mut sound = SoundEntry {
        codec: AudioCodec::Unknown,
        avg_bitrate: 0,
        decoder_config: Vec::new(),
    };

    match entry.kind {
        MP4A => {
            let children = entry.children_after(skip)?;
            if let Some(cfg) = find_esds(children)? {
                sound.codec = codec_for_object_type(cfg.object_type, sound_version);
                sound.avg_bitrate = cfg.avg_bitrate;
                sound.decoder_config = cfg.specific_info;
            }
        }
        DOT_MP3 | MS_MP3 => sound.codec = AudioCodec::Mp3,
        SAMR | SAWB => {
            sound.codec = if entry.kind == SAMR {
                AudioCodec::AmrNb
            } else {
                AudioCodec::AmrWb
            };
            // AMRSpecificBox: vendor, decoder version, mode set, ...
            for child in entry.children_after(skip)? {
                let child = child?;
                if child.kind == DAMR {
                    sound.decoder_config = child.body.to_vec();
                    break;
                }
            }
        }
        other => trace!(entry = %fourcc_to_string(other), "unrecognised audio sample entry"),
    }
    Ok(sound)
}

/// `esds` sits directly under the sample entry, or inside a QuickTime `wave` box.
fn find_esds(children: BoxIter<'_>) -> Result<Option<esds::DecoderConfig>, ParseError> {
    for child in children {
        let child = child?;
        match child.kind {
            ESDS => {
                let payload = child.body.get(4..).ok_or_else(|| child.too_short())?;
                return esds::parse(payload).map(Some);
            }
            WAVE => {
                if let Some(cfg) = find_esds(child.children())? {
                    return Ok(Some(cfg));
                }
            }
            _ => {}
        }
    }
    Ok(None)
}

fn codec_for_object_type(object_type: u8, sound_version: u16) -> AudioCodec {
    match object_type {
        // MPEG-4 audio, MPEG-2 AAC Main/LC/SSR.
        0x40 | 0x66 | 0x67 | 0x68 if sound_version > 0 => AudioCodec::AacFromMov,
        0x40 | 0x66 | 0x67 | 0x68 => AudioCodec::Aac,
        // MPEG-2 BC audio, MPEG-1 audio.
        0x69 | 0x6B => AudioCodec::Mp3,
        _ => AudioCodec::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serves a byte slice, pretending only the first `received` bytes have arrived.
    struct SliceProvider {
        data: Vec<u8>,
        received: usize,
        pos: usize,
        largest_read: usize,
    }

    impl SliceProvider {
        fn partial(data: Vec<u8>, received: usize) -> Self {
            Self {
                data,
                received,
                pos: 0,
                largest_read: 0,
            }
        }

        fn complete(data: Vec<u8>) -> Self {
            let received = data.len();
            Self::partial(data, received)
        }
    }

    impl FileProvider for SliceProvider {
        fn open(&mut self, _name: &str) -> FileHandle {
            FileHandle::new(uuid::Uuid::nil())
        }

        fn seek(&mut self, _handle: FileHandle, pos: u64) -> io::Result<()> {
            self.pos = pos as usize;
            Ok(())
        }

        fn read(&mut self, _handle: FileHandle, buf: &mut [u8]) -> ReadStatus {
            self.largest_read = self.largest_read.max(buf.len());
            let end = self.pos + buf.len();
            if end <= self.received {
                buf.copy_from_slice(&self.data[self.pos..end]);
                self.pos = end;
                ReadStatus::Ok
            } else if self.received == self.data.len() {
                ReadStatus::End
            } else {
                ReadStatus::RetryLater
            }
        }

        fn write(&mut self, _handle: FileHandle, _buf: &[u8]) -> io::Result<usize> {
            Ok(0)
        }

        fn close(&mut self, _handle: FileHandle) -> io::Result<()> {
            Ok(())
        }
    }

    fn bx(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = ((body.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(body);
        out
    }

    fn full(kind: &[u8; 4], version: u8, body: &[u8]) -> Vec<u8> {
        let mut payload = vec![version, 0, 0, 0];
        payload.extend_from_slice(body);
        bx(kind, &payload)
    }

    fn tkhd(id: u32) -> Vec<u8> {
        let mut body = vec![0u8; 8];
        body.extend_from_slice(&id.to_be_bytes());
        body.extend_from_slice(&[0u8; 68]);
        full(b"tkhd", 0, &body)
    }

    fn mdhd(time_scale: u32, duration: u32) -> Vec<u8> {
        let mut body = vec![0u8; 8];
        body.extend_from_slice(&time_scale.to_be_bytes());
        body.extend_from_slice(&duration.to_be_bytes());
        body.extend_from_slice(&[0u8; 4]);
        full(b"mdhd", 0, &body)
    }

    fn hdlr(handler: &[u8; 4]) -> Vec<u8> {
        let mut body = vec![0u8; 4];
        body.extend_from_slice(handler);
        body.extend_from_slice(&[0u8; 13]);
        full(b"hdlr", 0, &body)
    }

    fn esds(object_type: u8) -> Vec<u8> {
        let dsi = [0x12, 0x10];
        let mut dcd = vec![object_type, 0x15, 0, 0, 0];
        dcd.extend_from_slice(&128_000u32.to_be_bytes());
        dcd.extend_from_slice(&96_000u32.to_be_bytes());
        dcd.extend_from_slice(&[0x05, dsi.len() as u8]);
        dcd.extend_from_slice(&dsi);
        let mut es = vec![0, 1, 0, 0x04, dcd.len() as u8];
        es.extend(dcd);
        let mut payload = vec![0x03, es.len() as u8];
        payload.extend(es);
        full(b"esds", 0, &payload)
    }

    fn sound_entry(kind: &[u8; 4], version: u16, children: &[u8]) -> Vec<u8> {
        let mut body = vec![0u8; 6];
        body.extend_from_slice(&1u16.to_be_bytes());
        body.extend_from_slice(&version.to_be_bytes());
        body.extend_from_slice(&[0u8; 6]);
        body.extend_from_slice(&2u16.to_be_bytes());
        body.extend_from_slice(&16u16.to_be_bytes());
        body.extend_from_slice(&[0u8; 4]);
        body.extend_from_slice(&(44_100u32 << 16).to_be_bytes());
        body.extend(match version {
            1 => vec![0u8; 16],
            2 => vec![0u8; 36],
            _ => Vec::new(),
        });
        body.extend_from_slice(children);
        bx(kind, &body)
    }

    fn trak(id: u32, handler: &[u8; 4], entry: &[u8]) -> Vec<u8> {
        let mut stsd_body = 1u32.to_be_bytes().to_vec();
        stsd_body.extend_from_slice(entry);
        let stbl = bx(b"stbl", &full(b"stsd", 0, &stsd_body));
        let minf = bx(b"minf", &stbl);
        let mut mdia = mdhd(44_100, 441_000);
        mdia.extend(hdlr(handler));
        mdia.extend(minf);
        let mut body = tkhd(id);
        body.extend(bx(b"mdia", &mdia));
        bx(b"trak", &body)
    }

    fn file(traks: &[Vec<u8>]) -> Vec<u8> {
        let mut out = bx(b"ftyp", b"M4A \0\0\0\0isom");
        out.extend(bx(b"free", &[0u8; 32]));
        out.extend(bx(b"moov", &traks.concat()));
        out.extend(bx(b"mdat", &[0xFF; 64]));
        out
    }

    fn open(data: Vec<u8>) -> Result<IsoBmffParser, ParseError> {
        IsoBmffParser::open(&mut SliceProvider::complete(data), "test")
    }

    #[test]
    fn finds_aac_audio_track_behind_skipped_boxes() {
        let parser = open(file(&[trak(1, b"soun", &sound_entry(b"mp4a", 0, &esds(0x40)))])).unwrap();
        assert_eq!(parser.track_ids(), vec![1]);
        assert_eq!(parser.track_type_tag(1), Some(tags::AUDIO));

        let info = parser.audio_track_info(1).unwrap();
        assert_eq!(info.codec, AudioCodec::Aac);
        assert_eq!(info.time_scale, 44_100);
        assert_eq!(info.duration_ms(), 10_000);
        assert_eq!(info.avg_bitrate, 96_000);
        assert_eq!(info.decoder_config, vec![0x12, 0x10]);
    }

    #[test]
    fn maps_sample_entries_onto_codecs() {
        let cases: [(Vec<u8>, AudioCodec); 6] = [
            (sound_entry(b"mp4a", 1, &esds(0x40)), AudioCodec::AacFromMov),
            (sound_entry(b"mp4a", 2, &bx(b"wave", &esds(0x67))), AudioCodec::AacFromMov),
            (sound_entry(b"mp4a", 0, &esds(0x6B)), AudioCodec::Mp3),
            (sound_entry(b".mp3", 0, &[]), AudioCodec::Mp3),
            (sound_entry(b"samr", 0, &[]), AudioCodec::AmrNb),
            (sound_entry(b"mp4a", 0, &esds(0xA5)), AudioCodec::Unknown),
        ];
        for (entry, expected) in cases {
            let parser = open(file(&[trak(3, b"soun", &entry)])).unwrap();
            assert_eq!(parser.audio_track_info(3).unwrap().codec, expected);
        }
    }

    #[test]
    fn non_audio_tracks_report_their_tag_only() {
        let parser = open(file(&[
            trak(1, b"vide", &bx(b"avc1", &[0u8; 78])),
            trak(2, b"hint", &[]),
        ]))
        .unwrap();
        assert_eq!(parser.track_ids(), vec![1, 2]);
        assert_eq!(parser.track_type_tag(1), Some(tags::VIDEO));
        assert!(matches!(parser.audio_track_info(1), Err(ParseError::NotAudio(1))));
        assert!(matches!(parser.audio_track_info(9), Err(ParseError::UnknownTrack(9))));
    }

    #[test]
    fn partial_movie_box_is_incomplete() {
        let data = file(&[trak(1, b"soun", &sound_entry(b"mp4a", 0, &esds(0x40)))]);
        for received in [0, 4, 20, 60, data.len() - 80] {
            let mut provider = SliceProvider::partial(data.clone(), received);
            let err = IsoBmffParser::open(&mut provider, "test").unwrap_err();
            assert!(matches!(err, ParseError::Incomplete), "received {received}: {err}");
        }
    }

    #[test]
    fn movie_box_is_buffered_in_bounded_reads() {
        let mut moov_body = bx(b"free", &vec![0u8; 40 * 1024]);
        moov_body.extend(trak(4, b"soun", &sound_entry(b"mp4a", 0, &esds(0x40))));
        let mut provider = SliceProvider::complete(bx(b"moov", &moov_body));

        let parser = IsoBmffParser::open(&mut provider, "test").unwrap();
        assert_eq!(parser.track_ids(), vec![4]);
        assert_eq!(provider.largest_read, MOVIE_READ_CHUNK);
    }

    #[test]
    fn oversized_movie_header_only_reads_what_arrived() {
        // Declares a 60 MiB movie box; only its first bytes are here.
        let mut data = (60u32 * 1024 * 1024).to_be_bytes().to_vec();
        data.extend_from_slice(b"moov");
        data.extend_from_slice(&[0u8; 64]);
        data.resize(64 * 1024, 0);
        let mut provider = SliceProvider::partial(data, 72);

        let err = IsoBmffParser::open(&mut provider, "test").unwrap_err();
        assert!(matches!(err, ParseError::Incomplete));
        assert!(provider.largest_read <= MOVIE_READ_CHUNK);
    }

    #[test]
    fn file_without_movie_box_is_reported_missing() {
        let mut data = bx(b"ftyp", b"isom");
        data.extend(bx(b"mdat", &[0u8; 16]));
        assert!(matches!(open(data), Err(ParseError::MissingMovie)));

        // mdat running to end of file before any moov.
        let mut to_eof = bx(b"ftyp", b"isom");
        to_eof.extend_from_slice(&[0, 0, 0, 0]);
        to_eof.extend_from_slice(b"mdat");
        assert!(matches!(open(to_eof), Err(ParseError::MissingMovie)));
    }

    #[test]
    fn garbage_is_malformed() {
        let err = open(vec![0x00, 0x00, 0x00, 0x10, 0x01, 0x02, 0x03, 0x04]).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { offset: 0, .. }));

        let err = open(vec![0x00, 0x00, 0x00, 0x04, b'f', b'r', b'e', b'e']).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));

        // Child box overrunning its parent.
        let mut moov_body = 0x100u32.to_be_bytes().to_vec();
        moov_body.extend_from_slice(b"trak");
        let err = open(bx(b"moov", &moov_body)).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { offset: 8, .. }));
    }

    #[test]
    fn large_size_headers_are_followed() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(b"free");
        data.extend_from_slice(&24u64.to_be_bytes());
        data.extend_from_slice(&[0u8; 8]);
        let damr = bx(b"damr", b"FFMP\0\x81\xFF\0\x01");
        data.extend(bx(b"moov", &trak(5, b"soun", &sound_entry(b"sawb", 0, &damr))));
        let parser = open(data).unwrap();
        let info = parser.audio_track_info(5).unwrap();
        assert_eq!(info.codec, AudioCodec::AmrWb);
        assert_eq!(info.decoder_config, b"FFMP\0\x81\xFF\0\x01".to_vec());
    }
}
