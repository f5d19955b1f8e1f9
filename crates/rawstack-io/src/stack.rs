//! Stack assembler: repeated frame decoding over one stream.
//!
//! Frame 1 is preceded by the header offset, every later frame by the
//! inter-frame gap. Cancellation is polled before each frame; progress is
//! reported after each one. Running out of stream or memory mid-stack
//! keeps the frames already decoded and marks the result partial.

use std::io::Read;

use tracing::{debug, warn};

use rawstack_core::{Completeness, FrameGap, PartialReason, PixelFrame};

use crate::decode::PixelDecoder;
use crate::error::{IoError, IoResult};
use crate::observer::{DecodeObserver, DecodeOptions};

/// Frames produced by a stack decode.
#[derive(Debug, Clone, PartialEq)]
pub enum StackOutcome {
    /// Every requested frame was decoded.
    Complete(Vec<PixelFrame>),
    /// Decoding stopped early; at least one frame is present.
    Partial {
        /// Frames decoded before stopping.
        frames: Vec<PixelFrame>,
        /// Frames requested by the descriptor.
        requested: u32,
        /// Why decoding stopped.
        reason: PartialReason,
    },
}

impl StackOutcome {
    /// Decoded frames.
    pub fn frames(&self) -> &[PixelFrame] {
        match self {
            Self::Complete(frames) | Self::Partial { frames, .. } => frames,
        }
    }

    /// Completeness marker for the decoded image.
    pub fn completeness(&self) -> Completeness {
        match self {
            Self::Complete(_) => Completeness::Complete,
            Self::Partial {
                requested, reason, ..
            } => Completeness::Partial {
                requested: *requested,
                reason: *reason,
            },
        }
    }

    /// Splits into frames and completeness.
    pub fn into_parts(self) -> (Vec<PixelFrame>, Completeness) {
        let completeness = self.completeness();
        match self {
            Self::Complete(frames) | Self::Partial { frames, .. } => (frames, completeness),
        }
    }
}

/// Decodes `number_of_images` frames from one stream.
pub struct StackAssembler<'a> {
    decoder: PixelDecoder<'a>,
    options: &'a DecodeOptions,
    observer: &'a dyn DecodeObserver,
    probed_length: Option<u64>,
}

impl<'a> StackAssembler<'a> {
    /// Creates an assembler around a configured decoder.
    pub fn new(
        decoder: PixelDecoder<'a>,
        options: &'a DecodeOptions,
        observer: &'a dyn DecodeObserver,
    ) -> Self {
        Self {
            decoder,
            options,
            observer,
            probed_length: None,
        }
    }

    /// Sets the stream length used by [`FrameGap::FromDimensions`].
    pub fn with_probed_length(mut self, length: Option<u64>) -> Self {
        self.probed_length = length;
        self
    }

    /// Bytes skipped between frames.
    ///
    /// `FromDimensions` spreads whatever the header and frames leave over
    /// evenly between frames; it is zero when the length is unknown, the
    /// frame size is not fixed, or the frames already overrun the stream.
    pub fn frame_gap(&self) -> u64 {
        let desc = self.decoder.descriptor();
        match desc.gap {
            FrameGap::Bytes(n) => n,
            FrameGap::FromDimensions => {
                let n = desc.number_of_images as u64;
                match (self.probed_length, self.decoder.stored_frame_bytes()) {
                    (Some(len), Some(frame)) if n > 1 => {
                        let used = (desc.header_offset.max(0) as u64).saturating_add(frame.saturating_mul(n));
                        len.checked_sub(used).map_or(0, |spare| spare / (n - 1))
                    }
                    _ => 0,
                }
            }
        }
    }

    /// Decodes the stack.
    ///
    /// Errors with [`IoError::Cancelled`] if cancelled before the first
    /// frame, [`IoError::NoFrames`] if the stream holds none, and passes
    /// through configuration, decode and I/O errors. Compressed frames of
    /// a multi-frame stack need strip byte counts to find their ends.
    pub fn decode_stack<R: Read + ?Sized>(&self, reader: &mut R) -> IoResult<StackOutcome> {
        let desc = self.decoder.descriptor();
        let requested = desc.number_of_images.max(1);
        if requested > 1 && self.decoder.stored_frame_bytes().is_none() {
            return Err(IoError::configuration(format!(
                "{} compressed frames need strip byte counts",
                requested
            )));
        }
        let gap = self.frame_gap();
        let frame_cost = desc.frame_bytes();
        debug!(requested, gap, offset = desc.header_offset, "decoding stack");

        let mut frames = Vec::with_capacity(requested.min(4096) as usize);
        let mut stop: Option<(PartialReason, Option<IoError>)> = None;
        let mut held = 0u64;
        for index in 0..requested {
            if self.observer.cancel_requested() {
                stop = Some((PartialReason::Cancelled, None));
                break;
            }
            held = held.saturating_add(frame_cost);
            if self.options.memory_limit.is_some_and(|limit| held > limit) {
                stop = Some((
                    PartialReason::OutOfMemory,
                    Some(IoError::Allocation {
                        requested: usize::try_from(frame_cost).unwrap_or(usize::MAX),
                    }),
                ));
                break;
            }
            let skip = if index == 0 {
                desc.header_offset.max(0) as u64
            } else {
                gap
            };
            match self.decoder.decode_one(reader, skip) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => {
                    stop = Some((PartialReason::EndOfStream, None));
                    break;
                }
                Err(err) if err.is_end_of_stream() => {
                    stop = Some((PartialReason::EndOfStream, Some(err)));
                    break;
                }
                Err(err) if err.is_allocation_error() => {
                    stop = Some((PartialReason::OutOfMemory, Some(err)));
                    break;
                }
                Err(err) => return Err(err),
            }
            self.report(index + 1, requested);
        }
        if !self.options.silent {
            self.observer.show_status("");
        }

        let Some((reason, cause)) = stop else {
            return Ok(StackOutcome::Complete(frames));
        };
        if frames.is_empty() {
            return Err(match (reason, cause) {
                (PartialReason::Cancelled, _) => IoError::Cancelled,
                (PartialReason::OutOfMemory, Some(err)) => err,
                _ => IoError::NoFrames { requested },
            });
        }
        warn!(
            decoded = frames.len(),
            requested,
            ?reason,
            "stack decode stopped early"
        );
        Ok(StackOutcome::Partial {
            frames,
            requested,
            reason,
        })
    }

    fn report(&self, done: u32, total: u32) {
        if self.options.silent {
            debug!(done, total, "frame decoded");
            return;
        }
        self.observer.show_status(&format!("Reading: {done}/{total}"));
        self.observer.show_progress(done, total);
    }
}
