//! Byte-level access to local files and remote URLs.
//!
//! [`Locator`] tells a filesystem path from a URL. [`open`] turns it into a
//! [`ByteSource`] with a bounded-time [`read_range`](ByteSource::read_range):
//! local reads go through `std::fs`, remote reads through FFmpeg's AVIO
//! layer with an interrupt callback bound to the caller's [`Deadline`], so a
//! stalled server surfaces as [`GopseekError::Timeout`] instead of blocking.
//! The demuxer parses containers exclusively through these reads.
//!
//! Nothing here retries. A failed read is reported once and the retry
//! policy is left to the caller.

use std::ffi::{CString, c_int};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::fs::File;
use std::io::{Error as IoError, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::ptr;

use ffmpeg_next::Error as FfmpegError;
use ffmpeg_sys_next::{AVIO_FLAG_READ, AVIOContext, avio_closep, avio_open2, avio_read, avio_seek, avio_size};

use crate::deadline::{Deadline, InterruptFlag};
use crate::error::{GopseekError, Stage};

const SEEK_SET: c_int = 0;

/// Where a video lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// A local filesystem path.
    Path(PathBuf),
    /// A URL handed to FFmpeg's protocol layer (`http://`, `rtmp://`, ...).
    Url(String),
}

impl Locator {
    /// Classify a locator string.
    ///
    /// Anything of the form `scheme://rest` is a URL, except `file://`,
    /// which is unwrapped to a path.
    ///
    /// ```
    /// use gopseek::Locator;
    ///
    /// assert!(Locator::parse("https://example.com/clip.mp4").is_remote());
    /// assert!(!Locator::parse("videos/clip.mp4").is_remote());
    /// assert!(!Locator::parse("file:///tmp/clip.mp4").is_remote());
    /// ```
    pub fn parse(raw: &str) -> Self {
        if let Some((scheme, rest)) = raw.split_once("://") {
            let is_scheme = scheme
                .chars()
                .next()
                .is_some_and(|first| first.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
            if is_scheme {
                if scheme.eq_ignore_ascii_case("file") {
                    return Locator::Path(PathBuf::from(rest));
                }
                return Locator::Url(raw.to_string());
            }
        }
        Locator::Path(PathBuf::from(raw))
    }

    /// Returns `true` for URL locators.
    pub fn is_remote(&self) -> bool {
        matches!(self, Locator::Url(_))
    }

    /// The string FFmpeg opens.
    pub(crate) fn to_ffmpeg_url(&self) -> String {
        match self {
            Locator::Path(path) => path.to_string_lossy().into_owned(),
            Locator::Url(url) => url.clone(),
        }
    }
}

impl Display for Locator {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Locator::Path(path) => write!(f, "{}", path.display()),
            Locator::Url(url) => f.write_str(url),
        }
    }
}

impl From<&str> for Locator {
    fn from(raw: &str) -> Self {
        Locator::parse(raw)
    }
}

impl From<String> for Locator {
    fn from(raw: String) -> Self {
        Locator::parse(&raw)
    }
}

impl From<&String> for Locator {
    fn from(raw: &String) -> Self {
        Locator::parse(raw)
    }
}

impl From<&Path> for Locator {
    fn from(path: &Path) -> Self {
        Locator::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for Locator {
    fn from(path: PathBuf) -> Self {
        Locator::Path(path)
    }
}

impl From<&PathBuf> for Locator {
    fn from(path: &PathBuf) -> Self {
        Locator::Path(path.clone())
    }
}

impl From<&Locator> for Locator {
    fn from(locator: &Locator) -> Self {
        locator.clone()
    }
}

/// Random-access byte reads with a deadline.
pub trait ByteSource {
    /// Total size in bytes, when the source knows it.
    fn size(&self) -> Option<u64>;

    /// Read up to `length` bytes starting at `offset`.
    ///
    /// A result shorter than `length` means the end of the source was
    /// reached. Fails with [`GopseekError::Timeout`] when `deadline` expires
    /// before or during the read.
    fn read_range(
        &mut self,
        offset: u64,
        length: usize,
        deadline: &Deadline,
    ) -> Result<Vec<u8>, GopseekError>;
}

/// Open `locator` for byte reads.
///
/// # Errors
///
/// [`GopseekError::SourceUnavailable`] if the file or URL cannot be opened,
/// [`GopseekError::Timeout`] if `deadline` expires first.
pub fn open(locator: &Locator, deadline: &Deadline) -> Result<Box<dyn ByteSource>, GopseekError> {
    deadline.check(Stage::Open)?;
    match locator {
        Locator::Path(path) => Ok(Box::new(FileSource::open(path)?)),
        Locator::Url(url) => Ok(Box::new(RemoteSource::open(url, deadline)?)),
    }
}

/// A local file.
#[derive(Debug)]
pub struct FileSource {
    file: File,
    path: PathBuf,
    size: u64,
}

impl FileSource {
    /// Open a file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GopseekError> {
        let path = path.as_ref().to_path_buf();
        let unavailable = |error: IoError| GopseekError::SourceUnavailable {
            locator: path.display().to_string(),
            reason: error.to_string(),
        };
        let file = File::open(&path).map_err(unavailable)?;
        let metadata = file.metadata().map_err(unavailable)?;
        if metadata.is_dir() {
            return Err(GopseekError::SourceUnavailable {
                locator: path.display().to_string(),
                reason: "path is a directory".to_string(),
            });
        }
        Ok(Self {
            file,
            path,
            size: metadata.len(),
        })
    }
}

impl ByteSource for FileSource {
    fn size(&self) -> Option<u64> {
        Some(self.size)
    }

    fn read_range(
        &mut self,
        offset: u64,
        length: usize,
        deadline: &Deadline,
    ) -> Result<Vec<u8>, GopseekError> {
        deadline.check(Stage::Read)?;
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buffer = Vec::with_capacity(clamp_to_size(Some(self.size), offset, length));
        (&mut self.file).take(length as u64).read_to_end(&mut buffer)?;
        log::trace!(
            "Read {} bytes at offset {offset} from {}",
            buffer.len(),
            self.path.display()
        );
        deadline.check(Stage::Read)?;
        Ok(buffer)
    }
}

/// A URL read through FFmpeg's AVIO protocol layer.
pub struct RemoteSource {
    context: *mut AVIOContext,
    url: String,
    size: Option<u64>,
    // Referenced by `context`; dropped after it is closed.
    interrupt: Box<InterruptFlag>,
}

impl RemoteSource {
    /// Connect to `url`, giving up when `deadline` expires.
    pub fn open(url: &str, deadline: &Deadline) -> Result<Self, GopseekError> {
        crate::ffmpeg::initialize()?;
        deadline.check(Stage::Open)?;

        let c_url = CString::new(url).map_err(|_| GopseekError::SourceUnavailable {
            locator: url.to_string(),
            reason: "URL contains a NUL byte".to_string(),
        })?;
        let interrupt = InterruptFlag::new(deadline);
        let callback = interrupt.as_callback();
        let mut context: *mut AVIOContext = ptr::null_mut();

        // SAFETY: `context` is an out-pointer; `callback` is copied by FFmpeg
        // and its opaque pointer targets the boxed flag kept in `Self`.
        let status = unsafe {
            avio_open2(
                &mut context,
                c_url.as_ptr(),
                AVIO_FLAG_READ as c_int,
                &callback,
                ptr::null_mut(),
            )
        };
        if status < 0 || context.is_null() {
            if deadline.is_expired() {
                return Err(deadline.timeout_error(Stage::Open));
            }
            return Err(GopseekError::SourceUnavailable {
                locator: url.to_string(),
                reason: FfmpegError::from(status).to_string(),
            });
        }

        // SAFETY: `context` was just opened successfully.
        let size = unsafe { avio_size(context) };
        log::debug!("Opened remote source {url} (size={size})");

        Ok(Self {
            context,
            url: url.to_string(),
            size: u64::try_from(size).ok(),
            interrupt,
        })
    }

    fn read_error(&self, status: c_int, deadline: &Deadline) -> GopseekError {
        if deadline.is_expired() || FfmpegError::from(status) == FfmpegError::Exit {
            return deadline.timeout_error(Stage::Read);
        }
        GopseekError::Io(IoError::other(format!(
            "{}: {}",
            self.url,
            FfmpegError::from(status)
        )))
    }
}

impl ByteSource for RemoteSource {
    fn size(&self) -> Option<u64> {
        self.size
    }

    fn read_range(
        &mut self,
        offset: u64,
        length: usize,
        deadline: &Deadline,
    ) -> Result<Vec<u8>, GopseekError> {
        deadline.check(Stage::Read)?;
        self.interrupt.arm(deadline);

        let length = clamp_to_size(self.size, offset, length);
        let offset = i64::try_from(offset).map_err(|_| {
            GopseekError::Io(IoError::other(format!("offset {offset} exceeds i64")))
        })?;
        // SAFETY: `self.context` stays open for the lifetime of `self`.
        let position = unsafe { avio_seek(self.context, offset, SEEK_SET) };
        if position < 0 {
            return Err(self.read_error(position as c_int, deadline));
        }

        let mut buffer = vec![0u8; length];
        let mut filled = 0;
        while filled < length {
            deadline.check(Stage::Read)?;
            let chunk = (length - filled).min(c_int::MAX as usize) as c_int;
            // SAFETY: the destination slice has at least `chunk` bytes left.
            let read = unsafe { avio_read(self.context, buffer[filled..].as_mut_ptr(), chunk) };
            if read == 0 {
                break;
            }
            if read < 0 {
                if FfmpegError::from(read) == FfmpegError::Eof {
                    break;
                }
                return Err(self.read_error(read, deadline));
            }
            filled += read as usize;
        }
        buffer.truncate(filled);
        Ok(buffer)
    }
}

/// `length` cut down to the bytes left after `offset`, when the size is known.
fn clamp_to_size(size: Option<u64>, offset: u64, length: usize) -> usize {
    match size {
        Some(size) => {
            let left = size.saturating_sub(offset);
            length.min(usize::try_from(left).unwrap_or(usize::MAX))
        }
        None => length,
    }
}

impl Drop for RemoteSource {
    fn drop(&mut self) {
        // SAFETY: `avio_closep` accepts the pointer we own and nulls it.
        unsafe {
            avio_closep(&mut self.context);
        }
    }
}
