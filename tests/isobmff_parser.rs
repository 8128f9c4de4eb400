mod common;

use std::collections::VecDeque;

use anyhow::Result;
use uuid::Uuid;

use common::*;
use mp4demux::ingest::IngestWindow;
use mp4demux::parser::{AudioCodec, ContainerParser, IsoBmffParser, ParseError};
use mp4demux::provider::{InputSource, StreamProvider};

/// Hands over one queued piece of the file per absorb.
#[derive(Default)]
struct Trickle {
    pieces: VecDeque<Vec<u8>>,
    eos: bool,
}

impl Trickle {
    fn new(data: &[u8], piece: usize) -> Self {
        Self {
            pieces: data.chunks(piece).map(<[u8]>::to_vec).collect(),
            eos: false,
        }
    }
}

impl InputSource for Trickle {
    fn absorb(&mut self, window: &mut IngestWindow) -> mp4demux::Result<()> {
        if let Some(piece) = self.pieces.front() {
            if window.push(piece).is_ok() {
                self.pieces.pop_front();
            }
        }
        if self.pieces.is_empty() {
            self.eos = true;
        }
        Ok(())
    }

    fn is_eos(&self) -> bool {
        self.eos
    }
}

/// Retry `open` the way the demuxer does: rewind after every failure.
fn open_eventually(window: &mut IngestWindow, input: &mut Trickle) -> (IsoBmffParser, u32) {
    let mut failures = 0;
    loop {
        let mut provider = StreamProvider::new(Uuid::new_v4(), window, input);
        match IsoBmffParser::open(&mut provider, "trickle.mp4") {
            Ok(parser) => return (parser, failures),
            Err(ParseError::Incomplete) => {
                provider.rewind();
                failures += 1;
                assert!(failures < 1000, "parser never completed");
            }
            Err(other) => panic!("unexpected parse failure: {other}"),
        }
    }
}

#[test]
fn movie_box_after_media_data_is_found_once_it_arrives() -> Result<()> {
    let mut data = ftyp();
    data.extend(mdat(2048));
    data.extend(moov(&[trak(7, b"soun", &mp4a(&[0x11, 0x90]))]));

    let mut window = IngestWindow::new(data.len());
    let mut input = Trickle::new(&data, 100);
    let (parser, failures) = open_eventually(&mut window, &mut input);

    assert!(failures > 0);
    assert_eq!(parser.track_ids(), vec![7]);
    assert_eq!(parser.track_type_tag(7), Some("soun"));

    let info = parser.audio_track_info(7)?;
    assert_eq!(info.codec, AudioCodec::Aac);
    assert_eq!(info.time_scale, 44_100);
    assert_eq!(info.duration_ms(), 10_000);
    assert_eq!(info.avg_bitrate, 128_000);
    assert_eq!(info.decoder_config, vec![0x11, 0x90]);
    Ok(())
}

#[test]
fn mixed_tracks_keep_container_order() -> Result<()> {
    let data = file(&[
        trak(2, b"vide", &[]),
        trak(1, b"soun", &sound_entry(b".mp3", &[])),
        trak(3, b"hint", &[]),
    ]);

    let mut window = IngestWindow::new(data.len());
    let mut input = Trickle::new(&data, data.len());
    let (parser, _) = open_eventually(&mut window, &mut input);

    assert_eq!(parser.track_ids(), vec![2, 1, 3]);
    assert_eq!(parser.track_type_tag(3), Some("hint"));
    assert_eq!(parser.audio_track_info(1)?.codec, AudioCodec::Mp3);
    assert!(parser.audio_track_info(1)?.decoder_config.is_empty());
    assert!(matches!(
        parser.audio_track_info(2),
        Err(ParseError::NotAudio(2))
    ));
    assert!(matches!(
        parser.audio_track_info(9),
        Err(ParseError::UnknownTrack(9))
    ));
    Ok(())
}

#[test]
fn stream_ending_before_the_movie_box_is_reported() {
    let mut data = ftyp();
    data.extend(mdat(64));

    let mut window = IngestWindow::new(data.len());
    let mut input = Trickle::new(&data, data.len());
    input.absorb(&mut window).ok();

    let mut provider = StreamProvider::new(Uuid::new_v4(), &mut window, &mut input);
    let err = IsoBmffParser::open(&mut provider, "no-moov.mp4").unwrap_err();
    assert!(matches!(err, ParseError::MissingMovie));
}
