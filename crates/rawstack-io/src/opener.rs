//! File opener: descriptor in, decoded image out.
//!
//! Runs the whole decode for one descriptor:
//!
//! 1. open and validate the source ([`StreamProvider`])
//! 2. decode one frame or a stack ([`PixelDecoder`], [`StackAssembler`])
//! 3. build the color model, channel and slice labels
//! 4. resolve calibration ([`CalibrationResolver`])
//!
//! # Example
//!
//! ```rust,no_run
//! use rawstack_core::{FileDescriptor, FrameGap, PixelEncoding};
//! use rawstack_io::{DecodeOptions, FileOpener};
//!
//! let desc = FileDescriptor::new(256, 256, PixelEncoding::Gray16Unsigned)
//!     .with_path("/data/run1/stack.raw")
//!     .with_images(10, FrameGap::Bytes(0));
//!
//! let options = DecodeOptions::default();
//! if let Some(image) = FileOpener::new(&options).open(&desc)? {
//!     println!("{} frames, {:?}", image.frame_count(), image.completeness);
//! }
//! # Ok::<(), rawstack_io::IoError>(())
//! ```

use tracing::debug;

use rawstack_core::{
    Calibration, ColorModelSpec, Completeness, CompositeMode, DecodedImage, FileDescriptor,
    FrameData, PixelBuffer, PixelEncoding,
};

use crate::calibration::CalibrationResolver;
use crate::decode::PixelDecoder;
use crate::error::{IoError, IoResult};
use crate::observer::{DecodeObserver, DecodeOptions, NullObserver};
use crate::stack::StackAssembler;
use crate::stream::{StreamProvider, UrlOpener};

static NULL_OBSERVER: NullObserver = NullObserver;

const RGB48_CHANNEL_NAMES: [&str; 4] = ["Red", "Green", "Blue", "Gray"];

/// Decodes images described by [`FileDescriptor`]s.
pub struct FileOpener<'a> {
    options: &'a DecodeOptions,
    observer: &'a dyn DecodeObserver,
    url_opener: Option<&'a dyn UrlOpener>,
    global: Option<&'a Calibration>,
}

impl<'a> FileOpener<'a> {
    /// Opener with no observer and no global calibration.
    pub fn new(options: &'a DecodeOptions) -> Self {
        Self {
            options,
            observer: &NULL_OBSERVER,
            url_opener: None,
            global: None,
        }
    }

    /// Sets the observer for status, progress, cancellation and diagnostics.
    pub fn with_observer(mut self, observer: &'a dyn DecodeObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Replaces the built-in URL opener.
    pub fn with_url_opener(mut self, opener: &'a dyn UrlOpener) -> Self {
        self.url_opener = Some(opener);
        self
    }

    /// Sets the session-wide calibration used for conflict checks.
    pub fn with_global_calibration(mut self, global: Option<&'a Calibration>) -> Self {
        self.global = global;
        self
    }

    /// Decodes the image or stack described by `descriptor`.
    ///
    /// Returns `Ok(None)` when the source is missing, is a directory, or
    /// fails validation. A single image whose stream is empty is an
    /// [`IoError::Truncated`] error; stacks follow [`StackAssembler`].
    pub fn open(&self, descriptor: &FileDescriptor) -> IoResult<Option<DecodedImage>> {
        let mut provider = StreamProvider::new(self.options, self.observer);
        if let Some(opener) = self.url_opener {
            provider = provider.with_url_opener(opener);
        }
        let Some(mut opened) = provider.open(descriptor)? else {
            return Ok(None);
        };
        debug!(
            source = %opened.source_name,
            encoding = %descriptor.encoding,
            compression = %opened.compression,
            images = descriptor.number_of_images,
            "decoding"
        );

        let decoder = PixelDecoder::new(descriptor)
            .with_compression(opened.compression)
            .with_source_name(opened.source_name.clone());
        let (frames, completeness) = if descriptor.number_of_images > 1 {
            StackAssembler::new(decoder, self.options, self.observer)
                .with_probed_length(opened.probed_length)
                .decode_stack(&mut opened.reader)?
                .into_parts()
        } else {
            let skip = descriptor.header_offset.max(0) as u64;
            match decoder.decode_one(&mut opened.reader, skip)? {
                Some(frame) => (vec![frame], Completeness::Complete),
                None => {
                    return Err(IoError::Truncated {
                        expected: decoder.stored_frame_bytes().unwrap_or(0),
                        got: 0,
                    });
                }
            }
        };

        let mut image = DecodedImage {
            name: descriptor.file_name.clone(),
            width: descriptor.width,
            height: descriptor.height,
            encoding: descriptor.encoding,
            frames,
            color_model: color_model(descriptor),
            calibration: Calibration::default(),
            completeness,
            label: None,
            info: descriptor.info.clone(),
            channel_labels: Vec::new(),
        };
        finish_multichannel(&mut image, descriptor);
        apply_slice_labels(&mut image, descriptor);

        let resolution = CalibrationResolver::new()
            .with_global(self.global)
            .with_conflict_reporting(self.options.report_conflicts)
            .resolve(descriptor, &image);
        if let Some(conflict) = &resolution.conflict {
            self.observer.calibration_conflict(conflict);
        }
        if let Some(count) = resolution.image_count.filter(|&n| n != descriptor.number_of_images) {
            debug!(count, declared = descriptor.number_of_images, "description declares a different image count");
        }
        image.calibration = resolution.calibration;
        if let Some(name) = resolution.name {
            image.name = name;
        }
        apply_stack_display_range(&mut image);

        Ok(Some(image))
    }
}

/// Decodes with default options and no observer.
pub fn open(descriptor: &FileDescriptor) -> IoResult<Option<DecodedImage>> {
    FileOpener::new(&DecodeOptions::default()).open(descriptor)
}

/// Color model of a descriptor: its lookup table, or a gray ramp.
pub fn color_model(descriptor: &FileDescriptor) -> ColorModelSpec {
    match &descriptor.lookup_table {
        Some(lut) if !lut.is_empty() => ColorModelSpec::Indexed(lut.clone()),
        _ => ColorModelSpec::Grayscale {
            inverted: descriptor.white_is_zero,
        },
    }
}

/// Channel names, composite mode and per-channel ranges of 48-bit RGB.
///
/// White-is-zero samples are inverted in place, so the channels keep a
/// plain gray ramp.
fn finish_multichannel(image: &mut DecodedImage, descriptor: &FileDescriptor) {
    let planar = match descriptor.encoding {
        PixelEncoding::Rgb48 => false,
        PixelEncoding::Rgb48Planar => true,
        _ => return,
    };
    if descriptor.white_is_zero {
        for frame in &mut image.frames {
            invert_shorts(&mut frame.data);
            frame.range = frame.data.sample_range();
        }
        image.color_model = ColorModelSpec::Grayscale { inverted: false };
    }
    let Some(frame) = image.frames.first() else {
        return;
    };
    let channels = frame.data.channel_count();
    image.channel_labels = RGB48_CHANNEL_NAMES
        .iter()
        .take(channels)
        .map(|s| s.to_string())
        .collect();

    let description = descriptor.description.as_deref().unwrap_or("");
    image.calibration.composite_mode = Some(if description.contains("mode=color") {
        CompositeMode::Color
    } else if description.contains("mode=gray") {
        CompositeMode::Grayscale
    } else {
        CompositeMode::Composite
    });

    image.calibration.channel_display_ranges = match frame.range {
        Some(range) if !planar && channels == 3 => vec![range; 3],
        _ => frame
            .data
            .planes()
            .map(|p| p.sample_range().unwrap_or((0.0, 0.0)))
            .collect(),
    };
}

fn invert_shorts(data: &mut FrameData) {
    let planes = match data {
        FrameData::Single(b) => std::slice::from_mut(b),
        FrameData::Channels(planes) => planes.as_mut_slice(),
    };
    for plane in planes {
        if let PixelBuffer::Short(samples) = plane {
            samples.iter_mut().for_each(|s| *s = u16::MAX - *s);
        }
    }
}

fn apply_slice_labels(image: &mut DecodedImage, descriptor: &FileDescriptor) {
    let Some(labels) = &descriptor.slice_labels else {
        return;
    };
    if descriptor.number_of_images > 1 {
        if labels.len() <= image.frames.len() {
            for (frame, label) in image.frames.iter_mut().zip(labels) {
                frame.label = Some(label.clone());
            }
        }
    } else if let [label] = labels.as_slice() {
        image.label = Some(label.clone());
    }
}

/// A blank first frame gets the display range of the whole stack.
fn apply_stack_display_range(image: &mut DecodedImage) {
    if image.frames.len() < 2 || image.calibration.display_range.is_some() {
        return;
    }
    let blank_first = image.frames[0]
        .data
        .single()
        .filter(|b| matches!(b, PixelBuffer::Short(_) | PixelBuffer::Float(_)))
        .and_then(PixelBuffer::sample_range)
        .is_some_and(|(lo, hi)| lo == hi);
    if blank_first {
        image.calibration.display_range = image.stack_range();
    }
}
