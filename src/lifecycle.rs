//! When to (re)try building the container parser, and when to give up.

use serde::Serialize;
use tracing::{debug, warn};

use crate::parser::ContainerParser;
use crate::provider::StreamProvider;

/// Consecutive failed parse attempts tolerated before the stream is declared corrupt.
pub const MAX_FAILED_ATTEMPTS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserState {
    Uninitialized,
    Initialized,
    FailedFatal,
}

/// Outcome of one [`ParserLifecycle::attempt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// The parser was built on this call.
    Initialized,
    /// The parser already existed; nothing was attempted.
    AlreadyInitialized,
    /// Construction failed; another attempt is allowed once more input has arrived.
    RetryLater { attempts: u32 },
    /// The attempt budget is spent.
    GaveUp { attempts: u32 },
}

/// Owns the parser handle and its attempt counter.
///
/// A failed attempt leaves the state at `Uninitialized`; only the budget running out moves
/// it to `FailedFatal`, where it stays until [`reset`](Self::reset).
pub struct ParserLifecycle<P> {
    handle: Option<P>,
    state: ParserState,
    failed_attempts: u32,
}

impl<P> Default for ParserLifecycle<P> {
    fn default() -> Self {
        Self {
            handle: None,
            state: ParserState::Uninitialized,
            failed_attempts: 0,
        }
    }
}

impl<P: ContainerParser> ParserLifecycle<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn is_initialized(&self) -> bool {
        self.state == ParserState::Initialized
    }

    pub fn parser(&self) -> Option<&P> {
        self.handle.as_ref()
    }

    /// Try to build the parser against `provider`, unless it already exists or the budget is
    /// spent. A failed attempt rewinds the provider to offset 0.
    pub fn attempt(&mut self, provider: &mut StreamProvider<'_>, name: &str) -> Attempt {
        match self.state {
            ParserState::Initialized => return Attempt::AlreadyInitialized,
            ParserState::FailedFatal => {
                return Attempt::GaveUp {
                    attempts: self.failed_attempts,
                };
            }
            ParserState::Uninitialized => {}
        }

        match P::open(&mut *provider, name) {
            Ok(parser) => {
                debug!(
                    attempts = self.failed_attempts,
                    received = provider.window().written(),
                    "container parser initialized"
                );
                self.handle = Some(parser);
                self.state = ParserState::Initialized;
                Attempt::Initialized
            }
            Err(err) => {
                provider.rewind();
                self.failed_attempts += 1;
                if self.failed_attempts >= MAX_FAILED_ATTEMPTS {
                    warn!(
                        error = %err,
                        attempts = self.failed_attempts,
                        "giving up on container parser"
                    );
                    self.state = ParserState::FailedFatal;
                    Attempt::GaveUp {
                        attempts: self.failed_attempts,
                    }
                } else {
                    debug!(
                        error = %err,
                        attempts = self.failed_attempts,
                        received = provider.window().written(),
                        "container parser not ready"
                    );
                    Attempt::RetryLater {
                        attempts: self.failed_attempts,
                    }
                }
            }
        }
    }

    /// Give up on a parser that opened but could not be used. Stays failed until
    /// [`reset`](Self::reset).
    pub fn abandon(&mut self) {
        if let Some(parser) = self.handle.take() {
            parser.close();
        }
        self.state = ParserState::FailedFatal;
    }

    /// Drop the parser and the attempt history.
    pub fn reset(&mut self) {
        if let Some(parser) = self.handle.take() {
            parser.close();
        }
        self.state = ParserState::Uninitialized;
        self.failed_attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::ingest::IngestWindow;
    use crate::parser::{AudioTrackInfo, ParseError, TrackId};
    use crate::provider::{FileProvider, InputSource, ReadStatus};

    /// Needs eight bytes, read as two halves.
    struct TwoReads;

    impl ContainerParser for TwoReads {
        fn open(provider: &mut dyn FileProvider, name: &str) -> Result<Self, ParseError> {
            let handle = provider.open(name);
            let mut half = [0u8; 4];
            for _ in 0..2 {
                match provider.read(handle, &mut half) {
                    ReadStatus::Ok => {}
                    ReadStatus::RetryLater => return Err(ParseError::Incomplete),
                    ReadStatus::End => return Err(ParseError::EndOfStream),
                }
            }
            Ok(Self)
        }

        fn track_ids(&self) -> Vec<TrackId> {
            Vec::new()
        }

        fn track_type_tag(&self, _track: TrackId) -> Option<&str> {
            None
        }

        fn audio_track_info(&self, track: TrackId) -> Result<AudioTrackInfo, ParseError> {
            Err(ParseError::UnknownTrack(track))
        }
    }

    struct Idle;

    impl InputSource for Idle {
        fn absorb(&mut self, _window: &mut IngestWindow) -> crate::Result<()> {
            Ok(())
        }

        fn is_eos(&self) -> bool {
            false
        }
    }

    #[test]
    fn failed_attempt_rewinds_and_counts() {
        let mut window = IngestWindow::new(64);
        window.push(&[0; 6]).unwrap();
        let mut lifecycle = ParserLifecycle::<TwoReads>::new();

        let mut input = Idle;
        let mut provider = StreamProvider::new(Uuid::new_v4(), &mut window, &mut input);
        assert_eq!(
            lifecycle.attempt(&mut provider, "s"),
            Attempt::RetryLater { attempts: 1 }
        );
        assert_eq!(provider.window().position(), 0);
        assert_eq!(lifecycle.state(), ParserState::Uninitialized);
        assert!(lifecycle.parser().is_none());
        drop(provider);

        window.push(&[0; 2]).unwrap();
        let mut provider = StreamProvider::new(Uuid::new_v4(), &mut window, &mut input);
        assert_eq!(lifecycle.attempt(&mut provider, "s"), Attempt::Initialized);
        assert_eq!(
            lifecycle.attempt(&mut provider, "s"),
            Attempt::AlreadyInitialized
        );
        assert!(lifecycle.is_initialized());
        assert_eq!(lifecycle.failed_attempts(), 1);
    }

    #[test]
    fn budget_runs_out_on_the_twentieth_failure() {
        let mut window = IngestWindow::new(64);
        let mut input = Idle;
        let mut provider = StreamProvider::new(Uuid::new_v4(), &mut window, &mut input);
        let mut lifecycle = ParserLifecycle::<TwoReads>::new();

        for n in 1..MAX_FAILED_ATTEMPTS {
            assert_eq!(
                lifecycle.attempt(&mut provider, "s"),
                Attempt::RetryLater { attempts: n }
            );
        }
        assert_eq!(
            lifecycle.attempt(&mut provider, "s"),
            Attempt::GaveUp { attempts: 20 }
        );
        assert_eq!(lifecycle.state(), ParserState::FailedFatal);

        // No further attempts are made once fatal.
        assert_eq!(
            lifecycle.attempt(&mut provider, "s"),
            Attempt::GaveUp { attempts: 20 }
        );
        assert_eq!(lifecycle.failed_attempts(), 20);

        lifecycle.reset();
        assert_eq!(lifecycle.state(), ParserState::Uninitialized);
        assert_eq!(lifecycle.failed_attempts(), 0);
    }

    #[test]
    fn abandoned_parser_stays_failed_until_reset() {
        let mut window = IngestWindow::new(64);
        window.push(&[0; 8]).unwrap();
        let mut input = Idle;
        let mut provider = StreamProvider::new(Uuid::new_v4(), &mut window, &mut input);
        let mut lifecycle = ParserLifecycle::<TwoReads>::new();
        assert_eq!(lifecycle.attempt(&mut provider, "s"), Attempt::Initialized);

        lifecycle.abandon();
        assert!(lifecycle.parser().is_none());
        assert_eq!(lifecycle.state(), ParserState::FailedFatal);
        assert_eq!(
            lifecycle.attempt(&mut provider, "s"),
            Attempt::GaveUp { attempts: 0 }
        );

        lifecycle.reset();
        provider.rewind();
        assert_eq!(lifecycle.attempt(&mut provider, "s"), Attempt::Initialized);
    }
}
