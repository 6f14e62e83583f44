//! Parallel decoding of independent requests.
//!
//! [`decode_many`] runs each request on a rayon worker with its own
//! [`VideoHandle`](crate::VideoHandle), so no FFmpeg state is shared between
//! threads. Requests fail independently: one timed-out source does not
//! affect the others.

use ::rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::batch::FrameBatch;
use crate::configuration::ExtractOptions;
use crate::error::GopseekError;
use crate::extract::decode_by_frame_numbers;
use crate::source::Locator;

/// One source and the frames wanted from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeRequest {
    pub locator: Locator,
    pub frame_numbers: Vec<i64>,
}

impl DecodeRequest {
    pub fn new(locator: impl Into<Locator>, frame_numbers: Vec<i64>) -> Self {
        Self {
            locator: locator.into(),
            frame_numbers,
        }
    }
}

/// Decode every request in parallel, returning results in request order.
///
/// Each request gets the full timeout of `options`; a shared cancellation
/// token stops all of them.
///
/// ```no_run
/// use gopseek::{DecodeRequest, ExtractOptions, decode_many};
///
/// let requests = vec![
///     DecodeRequest::new("a.mp4", vec![0, 10]),
///     DecodeRequest::new("b.mp4", vec![5]),
/// ];
/// for result in decode_many(&requests, &ExtractOptions::default()) {
///     println!("{:?}", result.map(|batch| batch.shape()));
/// }
/// ```
pub fn decode_many(
    requests: &[DecodeRequest],
    options: &ExtractOptions,
) -> Vec<Result<FrameBatch, GopseekError>> {
    log::debug!("Decoding {} requests on the rayon pool", requests.len());
    requests
        .par_iter()
        .map(|request| {
            decode_by_frame_numbers(&request.locator, &request.frame_numbers, options)
        })
        .collect()
}
