//! Async wrappers for use inside a Tokio runtime.
//!
//! Decoding is blocking FFmpeg work, so every call here runs on
//! `tokio::task::spawn_blocking` and resolves through an
//! [`ExtractionFuture`]. The deadline starts when the blocking task starts.
//!
//! # Example
//!
//! ```no_run
//! use gopseek::{ExtractOptions, GopseekError};
//!
//! # async fn example() -> Result<(), GopseekError> {
//! let batch = gopseek::asynchronous::decode_by_frame_numbers(
//!     "input.mp4",
//!     vec![0, 15, 30],
//!     ExtractOptions::default(),
//! )
//! .await?;
//! println!("{:?}", batch.shape());
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;

use crate::batch::FrameBatch;
use crate::configuration::ExtractOptions;
use crate::error::GopseekError;
use crate::extract;
use crate::locate::GopFrameIndex;
use crate::source::Locator;

/// A blocking extraction running on Tokio's blocking pool.
///
/// Dropping the future does not stop the work; attach a
/// [`CancellationToken`](crate::CancellationToken) to the options for that.
pub struct ExtractionFuture<T> {
    handle: JoinHandle<Result<T, GopseekError>>,
}

impl<T> Future for ExtractionFuture<T> {
    type Output = Result<T, GopseekError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|result| {
            result.unwrap_or_else(|error| {
                Err(GopseekError::DecodeError(format!("extraction task failed: {error}")))
            })
        })
    }
}

fn spawn<T, F>(work: F) -> ExtractionFuture<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, GopseekError> + Send + 'static,
{
    ExtractionFuture {
        handle: tokio::task::spawn_blocking(work),
    }
}

/// Async [`frame_count`](crate::frame_count).
pub fn frame_count(locator: impl Into<Locator>, options: ExtractOptions) -> ExtractionFuture<u64> {
    let locator = locator.into();
    spawn(move || extract::frame_count(locator, &options))
}

/// Async [`gop_count`](crate::gop_count).
pub fn gop_count(locator: impl Into<Locator>, options: ExtractOptions) -> ExtractionFuture<u64> {
    let locator = locator.into();
    spawn(move || extract::gop_count(locator, &options))
}

/// Async [`decode_by_frame_numbers`](crate::decode_by_frame_numbers).
pub fn decode_by_frame_numbers(
    locator: impl Into<Locator>,
    frame_numbers: Vec<i64>,
    options: ExtractOptions,
) -> ExtractionFuture<FrameBatch> {
    let locator = locator.into();
    spawn(move || extract::decode_by_frame_numbers(locator, &frame_numbers, &options))
}

/// Async [`decode_by_frame_index`](crate::decode_by_frame_index).
pub fn decode_by_frame_index(
    locator: impl Into<Locator>,
    addresses: Vec<GopFrameIndex>,
    options: ExtractOptions,
) -> ExtractionFuture<FrameBatch> {
    let locator = locator.into();
    spawn(move || extract::decode_by_frame_index(locator, &addresses, &options))
}

/// Async [`sample_frames`](crate::sample_frames).
pub fn sample_frames(
    locator: impl Into<Locator>,
    count: usize,
    random_seek: bool,
    options: ExtractOptions,
) -> ExtractionFuture<FrameBatch> {
    let locator = locator.into();
    spawn(move || extract::sample_frames(locator, count, random_seek, &options))
}
