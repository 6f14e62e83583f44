//! FFmpeg custom I/O backed by a [`ByteSource`].
//!
//! The demuxer never opens the locator itself: every byte it parses comes
//! through [`ByteSource::read_range`] under the deadline armed on the
//! context, so a slow or stalled source unwinds the open, the index scan
//! and the decode loop alike.

use std::ffi::{c_int, c_void};
use std::ptr;

use ffmpeg_next::{Error as FfmpegError, util::error::EIO};
use ffmpeg_sys_next::{
    AVIOContext, AVIOInterruptCB, AVSEEK_FORCE, AVSEEK_SIZE, av_free, av_freep, av_malloc,
    avio_alloc_context, avio_context_free,
};

use crate::deadline::{Deadline, InterruptFlag};
use crate::error::GopseekError;
use crate::source::ByteSource;

/// Size of the buffer FFmpeg fills through the read callback.
const IO_BUFFER_SIZE: usize = 32 * 1024;

const SEEK_SET: c_int = 0;
const SEEK_CUR: c_int = 1;
const SEEK_END: c_int = 2;

/// State reached by the read and seek callbacks through the opaque pointer.
struct IoState {
    source: Box<dyn ByteSource>,
    position: u64,
    interrupt: Box<InterruptFlag>,
    /// The first error a callback hid behind an FFmpeg status code.
    failure: Option<GopseekError>,
}

/// An `AVIOContext` reading from a [`ByteSource`].
///
/// Must outlive the format context it is installed on.
pub(crate) struct SourceIo {
    context: *mut AVIOContext,
    state: *mut IoState,
}

impl SourceIo {
    pub(crate) fn new(
        source: Box<dyn ByteSource>,
        deadline: &Deadline,
    ) -> Result<Self, GopseekError> {
        let state = Box::into_raw(Box::new(IoState {
            source,
            position: 0,
            interrupt: InterruptFlag::new(deadline),
            failure: None,
        }));

        // SAFETY: the buffer and the state are handed to the AVIO context,
        // which is freed together with them in `Drop`. On failure both are
        // released here.
        unsafe {
            let buffer = av_malloc(IO_BUFFER_SIZE) as *mut u8;
            if buffer.is_null() {
                drop(Box::from_raw(state));
                return Err(allocation_failure());
            }
            let context = avio_alloc_context(
                buffer,
                IO_BUFFER_SIZE as c_int,
                0,
                state as *mut c_void,
                Some(read_callback),
                None,
                Some(seek_callback),
            );
            if context.is_null() {
                av_free(buffer as *mut c_void);
                drop(Box::from_raw(state));
                return Err(allocation_failure());
            }
            Ok(Self { context, state })
        }
    }

    pub(crate) fn as_mut_ptr(&self) -> *mut AVIOContext {
        self.context
    }

    /// Interrupt callback for the format context reading from this source.
    pub(crate) fn interrupt_callback(&self) -> AVIOInterruptCB {
        // SAFETY: `state` is valid until `Drop`.
        unsafe { (*self.state).interrupt.as_callback() }
    }

    /// Bind the callbacks and FFmpeg's interrupt checks to `deadline`.
    pub(crate) fn arm(&self, deadline: &Deadline) {
        // SAFETY: as in `interrupt_callback`; the flag is internally locked.
        unsafe { (*self.state).interrupt.arm(deadline) }
    }

    /// The error that made a callback fail, if one did since the last call.
    pub(crate) fn take_failure(&mut self) -> Option<GopseekError> {
        // SAFETY: no callback runs while `self` is borrowed mutably.
        unsafe { (*self.state).failure.take() }
    }

    pub(crate) fn source_size(&self) -> Option<u64> {
        // SAFETY: as in `interrupt_callback`.
        unsafe { (*self.state).source.size() }
    }
}

impl Drop for SourceIo {
    fn drop(&mut self) {
        // SAFETY: the context and state were allocated in `new` and are not
        // referenced by any format context any more. FFmpeg may have
        // replaced the buffer, so it is freed through the context.
        unsafe {
            if !self.context.is_null() {
                av_freep(ptr::addr_of_mut!((*self.context).buffer) as *mut c_void);
                avio_context_free(&mut self.context);
            }
            drop(Box::from_raw(self.state));
        }
    }
}

fn allocation_failure() -> GopseekError {
    GopseekError::Io(std::io::Error::other("cannot allocate AVIO context"))
}

unsafe extern "C" fn read_callback(opaque: *mut c_void, buffer: *mut u8, size: c_int) -> c_int {
    // SAFETY: `opaque` is the `IoState` installed in `SourceIo::new`.
    let state = unsafe { &mut *(opaque as *mut IoState) };
    let length = usize::try_from(size).unwrap_or(0);
    let deadline = state.interrupt.deadline();

    match state.source.read_range(state.position, length, &deadline) {
        Ok(bytes) if bytes.is_empty() => c_int::from(FfmpegError::Eof),
        Ok(bytes) => {
            let count = bytes.len().min(length);
            // SAFETY: FFmpeg provides at least `size` writable bytes.
            unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), buffer, count) };
            state.position += count as u64;
            count as c_int
        }
        Err(error) => {
            let status = if error.is_timeout() || matches!(error, GopseekError::Cancelled) {
                c_int::from(FfmpegError::Exit)
            } else {
                c_int::from(FfmpegError::Other { errno: EIO })
            };
            log::debug!("Source read at offset {} failed: {error}", state.position);
            state.failure.get_or_insert(error);
            status
        }
    }
}

unsafe extern "C" fn seek_callback(opaque: *mut c_void, offset: i64, whence: c_int) -> i64 {
    // SAFETY: as in `read_callback`.
    let state = unsafe { &mut *(opaque as *mut IoState) };
    let size = state.source.size().and_then(|size| i64::try_from(size).ok());

    if whence & AVSEEK_SIZE as c_int != 0 {
        return size.unwrap_or(-1);
    }
    let base = match whence & !(AVSEEK_FORCE as c_int) {
        SEEK_SET => Some(0),
        SEEK_CUR => i64::try_from(state.position).ok(),
        SEEK_END => size,
        _ => None,
    };
    match base
        .and_then(|base| base.checked_add(offset))
        .and_then(|target| u64::try_from(target).ok())
    {
        Some(target) => {
            state.position = target;
            target as i64
        }
        None => i64::from(c_int::from(FfmpegError::Other { errno: EIO })),
    }
}
