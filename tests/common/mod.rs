//! Shared fixtures: a tiny MP4 box builder and a ready-to-drive demuxer.

#![allow(dead_code)]

use mp4demux::ports::{AudioCoding, PortDefinition, VideoCoding};
use mp4demux::{DemuxerOpts, MemoryPorts, Mp4Demuxer, Processor, StagingOpts};

pub const INPUT_BUFFER_SIZE: usize = 1024;
pub const OUTPUT_BUFFER_SIZE: usize = 64;

pub fn bx(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = ((body.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(body);
    out
}

pub fn full_box(kind: &[u8; 4], version: u8, body: &[u8]) -> Vec<u8> {
    let mut payload = vec![version, 0, 0, 0];
    payload.extend_from_slice(body);
    bx(kind, &payload)
}

pub fn ftyp() -> Vec<u8> {
    bx(b"ftyp", b"M4A \0\0\0\0isomM4A ")
}

pub fn tkhd(id: u32) -> Vec<u8> {
    let mut body = vec![0u8; 8];
    body.extend_from_slice(&id.to_be_bytes());
    body.extend_from_slice(&[0u8; 68]);
    full_box(b"tkhd", 0, &body)
}

pub fn mdhd(time_scale: u32, duration: u32) -> Vec<u8> {
    let mut body = vec![0u8; 8];
    body.extend_from_slice(&time_scale.to_be_bytes());
    body.extend_from_slice(&duration.to_be_bytes());
    body.extend_from_slice(&[0x55, 0xC4, 0, 0]);
    full_box(b"mdhd", 0, &body)
}

pub fn hdlr(handler: &[u8; 4]) -> Vec<u8> {
    let mut body = vec![0u8; 4];
    body.extend_from_slice(handler);
    body.extend_from_slice(&[0u8; 12]);
    body.extend_from_slice(b"SoundHandler\0");
    full_box(b"hdlr", 0, &body)
}

/// An `esds` box whose DecoderConfigDescriptor carries `object_type` and `specific_info`.
pub fn esds(object_type: u8, specific_info: &[u8]) -> Vec<u8> {
    let mut dcd = vec![object_type, 0x15, 0, 0x18, 0];
    dcd.extend_from_slice(&192_000u32.to_be_bytes());
    dcd.extend_from_slice(&128_000u32.to_be_bytes());
    dcd.extend_from_slice(&[0x05, specific_info.len() as u8]);
    dcd.extend_from_slice(specific_info);

    let mut es = vec![0, 1, 0, 0x04, dcd.len() as u8];
    es.extend(dcd);
    es.extend_from_slice(&[0x06, 0x01, 0x02]);

    let mut payload = vec![0x03, es.len() as u8];
    payload.extend(es);
    full_box(b"esds", 0, &payload)
}

/// An ISO audio sample entry (sound description version 0).
pub fn sound_entry(kind: &[u8; 4], children: &[u8]) -> Vec<u8> {
    let mut body = vec![0u8; 6];
    body.extend_from_slice(&1u16.to_be_bytes());
    body.extend_from_slice(&[0u8; 8]);
    body.extend_from_slice(&2u16.to_be_bytes());
    body.extend_from_slice(&16u16.to_be_bytes());
    body.extend_from_slice(&[0u8; 4]);
    body.extend_from_slice(&(44_100u32 << 16).to_be_bytes());
    body.extend_from_slice(children);
    bx(kind, &body)
}

pub fn mp4a(specific_info: &[u8]) -> Vec<u8> {
    sound_entry(b"mp4a", &esds(0x40, specific_info))
}

pub fn trak(id: u32, handler: &[u8; 4], entry: &[u8]) -> Vec<u8> {
    let mut stsd = 1u32.to_be_bytes().to_vec();
    stsd.extend_from_slice(entry);
    let stbl = bx(b"stbl", &full_box(b"stsd", 0, &stsd));
    let minf = bx(b"minf", &stbl);

    let mut mdia = mdhd(44_100, 441_000);
    mdia.extend(hdlr(handler));
    mdia.extend(minf);

    let mut body = tkhd(id);
    body.extend(bx(b"mdia", &mdia));
    bx(b"trak", &body)
}

pub fn moov(traks: &[Vec<u8>]) -> Vec<u8> {
    bx(b"moov", &traks.concat())
}

pub fn mdat(len: usize) -> Vec<u8> {
    bx(b"mdat", &vec![0xA5; len])
}

/// ftyp + moov(traks) + mdat.
pub fn file(traks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = ftyp();
    out.extend(moov(traks));
    out.extend(mdat(256));
    out
}

/// A file with one AAC track whose AudioSpecificConfig is `config`.
pub fn aac_file(config: &[u8]) -> Vec<u8> {
    file(&[trak(1, b"soun", &mp4a(config))])
}

pub fn no_staging() -> DemuxerOpts {
    DemuxerOpts {
        staging: StagingOpts {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn memory_ports(audio: AudioCoding, video: VideoCoding) -> MemoryPorts {
    MemoryPorts::new(
        PortDefinition::container(INPUT_BUFFER_SIZE),
        PortDefinition::audio(OUTPUT_BUFFER_SIZE, audio),
        PortDefinition::video(OUTPUT_BUFFER_SIZE, video),
    )
}

/// A demuxer with resources allocated and ports prepared.
pub fn demuxer(
    audio: AudioCoding,
    video: VideoCoding,
    opts: DemuxerOpts,
) -> anyhow::Result<Mp4Demuxer<MemoryPorts>> {
    let mut demuxer = Mp4Demuxer::new(memory_ports(audio, video), opts);
    demuxer.allocate_resources()?;
    demuxer.prepare_to_transfer()?;
    Ok(demuxer)
}
