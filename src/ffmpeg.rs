//! FFmpeg initialisation and log level.
//!
//! FFmpeg logs to stderr through its own logger, independent of the Rust
//! [`log`](https://crates.io/crates/log) facade used by this crate. The first
//! handle opened in a process initialises FFmpeg (including networking, so
//! URL locators work) and lowers its console output to
//! [`FfmpegLogLevel::Error`]. Use [`set_ffmpeg_log_level`] afterwards to
//! change it.
//!
//! ```no_run
//! use gopseek::FfmpegLogLevel;
//!
//! gopseek::set_ffmpeg_log_level(FfmpegLogLevel::Quiet);
//! ```

use std::sync::OnceLock;

use ffmpeg_next::util::log::Level;

use crate::error::GopseekError;

/// FFmpeg internal log verbosity, most quiet first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print nothing.
    Quiet,
    /// Unrecoverable errors that abort the process.
    Panic,
    /// Unrecoverable errors.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's own default).
    Warning,
    /// Informational messages.
    Info,
    /// Verbose informational messages.
    Verbose,
    /// Debugging output.
    Debug,
    /// Extremely verbose tracing.
    Trace,
}

impl FfmpegLogLevel {
    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }
}

/// Set FFmpeg's own console verbosity.
///
/// This does not affect messages emitted through the `log` crate.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

static INITIALIZED: OnceLock<Result<(), String>> = OnceLock::new();

/// Initialise FFmpeg once per process.
///
/// Safe to call from any thread and any number of times; only the first
/// call does work.
pub(crate) fn initialize() -> Result<(), GopseekError> {
    INITIALIZED
        .get_or_init(|| {
            ffmpeg_next::init().map_err(|error| error.to_string())?;
            ffmpeg_next::format::network::init();
            set_ffmpeg_log_level(FfmpegLogLevel::Error);
            log::debug!("FFmpeg initialised");
            Ok(())
        })
        .clone()
        .map_err(|reason| {
            GopseekError::UnsupportedFormat(format!("FFmpeg initialisation failed: {reason}"))
        })
}
