//! Reusable extraction sessions.
//!
//! A [`VideoHandle`] keeps the container open and the frame index cached
//! between calls, so several requests against the same video pay for the
//! open and the packet scan only once. Every method still runs under its
//! own deadline built from the handle's [`ExtractOptions`].

use crate::batch::FrameBatch;
use crate::configuration::ExtractOptions;
use crate::conversion::FrameConverter;
use crate::deadline::{Deadline, supervise};
use crate::decode::{DecodeStats, decode_frames};
use crate::demux::Demuxer;
use crate::error::GopseekError;
use crate::index::{self, ContainerIndex};
use crate::locate::GopFrameIndex;
use crate::metadata::VideoMetadata;
use crate::sampler::{SamplingPolicy, sample};
use crate::source::{ByteSource, Locator};

/// An open video with a lazily built frame index.
///
/// A handle is single-threaded; concurrent requests each open their own.
///
/// # Example
///
/// ```no_run
/// use gopseek::{ExtractOptions, GopFrameIndex, OutputSize, SamplingPolicy, VideoHandle};
///
/// let options = ExtractOptions::new().with_output_size(OutputSize::ShorterSide(128));
/// let mut handle = VideoHandle::open("input.mp4", options)?;
///
/// println!("{} frames, {} GOPs", handle.frame_count()?, handle.gop_count()?);
/// let clip = handle.sample(&SamplingPolicy::Uniform(8))?;
/// let heads = handle.decode_gop_frames(&[GopFrameIndex::new(0, 0), GopFrameIndex::new(1, 0)])?;
/// println!("{:?} / {:?}", clip.shape(), heads.shape());
/// # Ok::<(), gopseek::GopseekError>(())
/// ```
pub struct VideoHandle {
    demuxer: Demuxer,
    locator: Locator,
    index: Option<ContainerIndex>,
    options: ExtractOptions,
    last_stats: Option<DecodeStats>,
}

impl VideoHandle {
    /// Open `locator` within the options' timeout.
    ///
    /// # Errors
    ///
    /// [`GopseekError::SourceUnavailable`] if the locator cannot be opened,
    /// [`GopseekError::CorruptStream`] for an empty source,
    /// [`GopseekError::UnsupportedFormat`] when no video stream can be
    /// decoded, [`GopseekError::Timeout`] when the budget runs out.
    pub fn open(
        locator: impl Into<Locator>,
        options: ExtractOptions,
    ) -> Result<Self, GopseekError> {
        let locator = locator.into();
        supervise(options.deadline(), |deadline| {
            Self::open_within(locator, options.clone(), deadline)
        })
    }

    pub(crate) fn open_within(
        locator: Locator,
        options: ExtractOptions,
        deadline: &Deadline,
    ) -> Result<Self, GopseekError> {
        let demuxer = Demuxer::open(&locator, options.decoder_threads, deadline)?;
        Ok(Self::with_demuxer(demuxer, locator, options))
    }

    /// Open a video read from a caller-provided [`ByteSource`].
    ///
    /// Every byte FFmpeg parses, during this call and later ones, is read
    /// through `source` under the deadline of the call in progress.
    /// `locator` names the video in errors and logs.
    ///
    /// # Errors
    ///
    /// As for [`open`](Self::open).
    pub fn from_source(
        source: impl ByteSource + 'static,
        locator: impl Into<Locator>,
        options: ExtractOptions,
    ) -> Result<Self, GopseekError> {
        let locator = locator.into();
        supervise(options.deadline(), |deadline| {
            let demuxer =
                Demuxer::from_source(Box::new(source), &locator, options.decoder_threads, deadline)?;
            Ok(Self::with_demuxer(demuxer, locator.clone(), options.clone()))
        })
    }

    fn with_demuxer(demuxer: Demuxer, locator: Locator, options: ExtractOptions) -> Self {
        log::info!(
            "Opened {locator}: {}x{} {} at {:.3} fps",
            demuxer.metadata().width,
            demuxer.metadata().height,
            demuxer.metadata().codec,
            demuxer.metadata().frames_per_second,
        );
        Self {
            demuxer,
            locator,
            index: None,
            options,
            last_stats: None,
        }
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Header metadata of the selected video stream.
    pub fn metadata(&self) -> &VideoMetadata {
        self.demuxer.metadata()
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Replace the options used by subsequent calls.
    pub fn set_options(&mut self, options: ExtractOptions) {
        self.options = options;
    }

    /// Work counters of the most recent successful decode.
    pub fn last_stats(&self) -> Option<DecodeStats> {
        self.last_stats
    }

    /// The frame index, scanning the container on first use.
    pub fn index(&mut self) -> Result<&ContainerIndex, GopseekError> {
        let deadline = self.options.deadline();
        supervise(deadline.clone(), |deadline| {
            cached_index(&mut self.index, &mut self.demuxer, deadline).map(|_| ())
        })?;
        // Already cached, so this cannot scan again.
        cached_index(&mut self.index, &mut self.demuxer, &deadline)
    }

    /// Exact number of frames (video packets) in the stream.
    pub fn frame_count(&mut self) -> Result<u64, GopseekError> {
        Ok(self.index()?.total_frame_count())
    }

    /// Number of GOPs, i.e. keyframes, in the stream.
    pub fn gop_count(&mut self) -> Result<u64, GopseekError> {
        Ok(self.index()?.gop_count())
    }

    /// Decode the given frame numbers, returned in the same order.
    ///
    /// # Errors
    ///
    /// [`GopseekError::FrameIndexOutOfRange`] if any number is negative or
    /// not below [`frame_count`](Self::frame_count); nothing is decoded in
    /// that case.
    pub fn decode_frame_numbers(&mut self, frame_numbers: &[i64]) -> Result<FrameBatch, GopseekError> {
        supervise(self.options.deadline(), |deadline| {
            self.decode_within(frame_numbers, deadline)
        })
    }

    /// Decode frames addressed by GOP and offset.
    pub fn decode_gop_frames(
        &mut self,
        addresses: &[GopFrameIndex],
    ) -> Result<FrameBatch, GopseekError> {
        supervise(self.options.deadline(), |deadline| {
            self.decode_gop_frames_within(addresses, deadline)
        })
    }

    /// Pick frames with `policy` and decode them.
    pub fn sample(&mut self, policy: &SamplingPolicy) -> Result<FrameBatch, GopseekError> {
        supervise(self.options.deadline(), |deadline| {
            self.sample_within(policy, deadline)
        })
    }

    pub(crate) fn frame_count_within(&mut self, deadline: &Deadline) -> Result<u64, GopseekError> {
        Ok(cached_index(&mut self.index, &mut self.demuxer, deadline)?.total_frame_count())
    }

    pub(crate) fn gop_count_within(&mut self, deadline: &Deadline) -> Result<u64, GopseekError> {
        Ok(cached_index(&mut self.index, &mut self.demuxer, deadline)?.gop_count())
    }

    pub(crate) fn decode_within(
        &mut self,
        frame_numbers: &[i64],
        deadline: &Deadline,
    ) -> Result<FrameBatch, GopseekError> {
        let index = cached_index(&mut self.index, &mut self.demuxer, deadline)?;
        let metadata = self.demuxer.metadata();
        let mut converter =
            FrameConverter::for_source(self.options.output_size, metadata.width, metadata.height)?;

        let (batch, stats) = decode_frames(
            &mut self.demuxer,
            index,
            frame_numbers,
            self.options.seek_mode,
            &mut converter,
            deadline,
        )?;
        self.last_stats = Some(stats);
        Ok(batch)
    }

    pub(crate) fn decode_gop_frames_within(
        &mut self,
        addresses: &[GopFrameIndex],
        deadline: &Deadline,
    ) -> Result<FrameBatch, GopseekError> {
        let index = cached_index(&mut self.index, &mut self.demuxer, deadline)?;
        let frame_numbers = addresses
            .iter()
            .map(|address| address.resolve(index).map(|frame| frame as i64))
            .collect::<Result<Vec<_>, _>>()?;
        self.decode_within(&frame_numbers, deadline)
    }

    pub(crate) fn sample_within(
        &mut self,
        policy: &SamplingPolicy,
        deadline: &Deadline,
    ) -> Result<FrameBatch, GopseekError> {
        let index = cached_index(&mut self.index, &mut self.demuxer, deadline)?;
        let mut rng = self.options.rng();
        let frame_numbers: Vec<i64> = sample(index, policy, &mut rng)?
            .into_iter()
            .map(|frame| frame as i64)
            .collect();
        log::debug!("Sampled {} frames with {policy:?}", frame_numbers.len());
        self.decode_within(&frame_numbers, deadline)
    }
}

/// The cached index in `slot`, scanning `demuxer` if there is none yet.
fn cached_index<'a>(
    slot: &'a mut Option<ContainerIndex>,
    demuxer: &mut Demuxer,
    deadline: &Deadline,
) -> Result<&'a ContainerIndex, GopseekError> {
    let index = match slot.take() {
        Some(index) => index,
        None => index::scan(demuxer, deadline)?,
    };
    Ok(slot.insert(index))
}
