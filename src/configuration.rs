//! Per-call extraction options.
//!
//! [`ExtractOptions`] carries the timeout, output size, seek strategy, RNG
//! seed and cancellation token through every entry point without widening
//! their signatures.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use gopseek::{CancellationToken, ExtractOptions, OutputSize, SeekMode};
//!
//! let token = CancellationToken::new();
//! let options = ExtractOptions::new()
//!     .with_timeout(Duration::from_secs(10))
//!     .with_output_size(OutputSize::ShorterSide(256))
//!     .with_seek_mode(SeekMode::Keyframe)
//!     .with_seed(7)
//!     .with_cancellation(token.clone());
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;

use rand::{SeedableRng, rngs::StdRng};

use crate::conversion::OutputSize;
use crate::deadline::{CancellationToken, Deadline};
use crate::locate::SeekMode;

/// Wall-clock budget applied when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Settings for one extraction call.
#[derive(Clone)]
pub struct ExtractOptions {
    pub(crate) timeout: Option<Duration>,
    pub(crate) output_size: OutputSize,
    pub(crate) seek_mode: SeekMode,
    pub(crate) seed: Option<u64>,
    pub(crate) decoder_threads: Option<usize>,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl Debug for ExtractOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ExtractOptions")
            .field("timeout", &self.timeout)
            .field("output_size", &self.output_size)
            .field("seek_mode", &self.seek_mode)
            .field("seed", &self.seed)
            .field("decoder_threads", &self.decoder_threads)
            .field("has_cancellation", &self.cancellation.is_some())
            .finish()
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractOptions {
    /// Defaults: [`DEFAULT_TIMEOUT`], native size, [`SeekMode::Nearest`],
    /// entropy-seeded sampling, FFmpeg-chosen decoder threads.
    pub fn new() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            output_size: OutputSize::Native,
            seek_mode: SeekMode::Nearest,
            seed: None,
            decoder_threads: None,
            cancellation: None,
        }
    }

    /// Wall-clock budget for each call, covering open, index and decode.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Remove the time limit.
    #[must_use]
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    #[must_use]
    pub fn with_output_size(mut self, size: OutputSize) -> Self {
        self.output_size = size;
        self
    }

    /// Shorthand for [`OutputSize::Exact`].
    #[must_use]
    pub fn with_resolution(self, width: u32, height: u32) -> Self {
        self.with_output_size(OutputSize::Exact { width, height })
    }

    #[must_use]
    pub fn with_seek_mode(mut self, mode: SeekMode) -> Self {
        self.seek_mode = mode;
        self
    }

    /// Fix the RNG seed used by random sampling, making it reproducible.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Number of decoder threads. `0` lets FFmpeg decide.
    #[must_use]
    pub fn with_decoder_threads(mut self, threads: usize) -> Self {
        self.decoder_threads = Some(threads);
        self
    }

    /// Attach a cancellation token checked alongside the timeout.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn output_size(&self) -> OutputSize {
        self.output_size
    }

    pub fn seek_mode(&self) -> SeekMode {
        self.seek_mode
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// A deadline starting now, linked to the cancellation token if any.
    pub(crate) fn deadline(&self) -> Deadline {
        let deadline = Deadline::from_timeout(self.timeout);
        match &self.cancellation {
            Some(token) => deadline.with_cancellation(token.clone()),
            None => deadline,
        }
    }

    /// A fresh RNG for one sampling call.
    pub(crate) fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[test]
    fn defaults() {
        let options = ExtractOptions::default();
        assert_eq!(options.timeout(), Some(Duration::from_secs(3)));
        assert_eq!(options.output_size(), OutputSize::Native);
        assert_eq!(options.seek_mode(), SeekMode::Nearest);
        assert_eq!(options.seed(), None);
    }

    #[test]
    fn seeded_rngs_repeat() {
        let options = ExtractOptions::new().with_seed(42);
        let mut first_rng = options.rng();
        let mut second_rng = options.rng();
        let first: Vec<u32> = (0..16).map(|_| first_rng.gen_range(0..1000)).collect();
        let second: Vec<u32> = (0..16).map(|_| second_rng.gen_range(0..1000)).collect();
        assert_eq!(first, second);

        let mut other_rng = ExtractOptions::new().with_seed(43).rng();
        let other: Vec<u32> = (0..16).map(|_| other_rng.gen_range(0..1000)).collect();
        assert_ne!(first, other);
    }

    #[test]
    fn cancellation_reaches_deadline() {
        let token = CancellationToken::new();
        let options = ExtractOptions::new().without_timeout().with_cancellation(token.clone());
        let deadline = options.deadline();
        assert!(!deadline.is_expired());
        token.cancel();
        assert!(deadline.is_expired());
    }

    #[test]
    fn debug_hides_token() {
        let options = ExtractOptions::new().with_cancellation(CancellationToken::new());
        let rendered = format!("{options:?}");
        assert!(rendered.contains("has_cancellation: true"));
    }
}
