//! Calibration resolver.
//!
//! Derives the calibration of a decoded image from the descriptor and an
//! optional `ImageJ` description block. The block is a `key=value`
//! property list whose first line starts with `ImageJ`:
//!
//! ```text
//! ImageJ=1.54f
//! images=40
//! slices=40
//! unit=um
//! spacing=2.5
//! cf=0
//! c0=-10.0
//! c1=0.5
//! vunit=OD
//! ```
//!
//! Everything the block changes (unit, pixel size, function, image count,
//! name) is applied to resolver-local copies; the descriptor itself is
//! never modified.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use rawstack_core::{
    Calibration, CalibrationFunction, DecodedImage, FileDescriptor, HyperstackDims,
    IntensityCalibration, PixelEncoding,
};

// === Description properties ===

/// Parsed `key=value` description block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescriptionProperties {
    entries: HashMap<String, String>,
}

impl DescriptionProperties {
    /// Parses a property list.
    ///
    /// One entry per line; the key ends at the first `=`, `:` or blank,
    /// lines starting with `#` or `!` are comments, later keys win.
    /// Values are trimmed.
    pub fn parse(text: &str) -> Self {
        let mut entries = HashMap::new();
        for line in text.lines() {
            let line = line.trim_start();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let key_end = line
                .find(|c: char| c == '=' || c == ':' || c.is_whitespace())
                .unwrap_or(line.len());
            let (key, rest) = line.split_at(key_end);
            let rest = rest.trim_start();
            let value = rest
                .strip_prefix('=')
                .or_else(|| rest.strip_prefix(':'))
                .unwrap_or(rest)
                .trim();
            entries.insert(key.to_string(), value.to_string());
        }
        Self { entries }
    }

    /// Raw value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Numeric value of `key`; `None` if absent or not a number.
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key)?.parse().ok()
    }

    /// Numeric value of `key`, zero if absent or not a number.
    pub fn get_double(&self, key: &str) -> f64 {
        self.get_number(key).unwrap_or(0.0)
    }

    /// Integral value of `key` as a count, zero if absent.
    ///
    /// `None` when negative or beyond `u32`.
    pub fn get_count(&self, key: &str) -> Option<u32> {
        u32::try_from(self.get_double(key) as i64).ok()
    }

    /// `true` only if the value is exactly `true`.
    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key) == Some("true")
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by key.
    pub fn sorted(&self) -> Vec<(&str, &str)> {
        let mut all: Vec<_> = self
            .entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        all.sort_unstable();
        all
    }
}

/// Parses a description block if it is an `ImageJ` block.
///
/// Returns `None` for text shorter than 7 characters or not starting
/// with `ImageJ`.
pub fn parse_description(text: &str) -> Option<DescriptionProperties> {
    if text.len() < 7 || !text.starts_with("ImageJ") {
        return None;
    }
    Some(DescriptionProperties::parse(text))
}

// === Conflict ===

/// The image calibration disagrees with the session-wide calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationConflict {
    /// Pixel width of the image.
    pub image_pixel_width: f64,
    /// Unit of the image.
    pub image_unit: String,
    /// Pixel width of the global calibration.
    pub global_pixel_width: f64,
    /// Unit of the global calibration.
    pub global_unit: String,
}

impl CalibrationConflict {
    fn new(image: &Calibration, global: &Calibration) -> Self {
        Self {
            image_pixel_width: image.pixel_width,
            image_unit: image.unit.clone(),
            global_pixel_width: global.pixel_width,
            global_unit: global.unit.clone(),
        }
    }
}

impl fmt::Display for CalibrationConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "image calibration ({} {}) conflicts with global calibration ({} {})",
            self.image_pixel_width, self.image_unit, self.global_pixel_width, self.global_unit
        )
    }
}

// === Resolver ===

/// Outcome of calibration resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Calibration for the image.
    pub calibration: Calibration,
    /// Set when the image calibration disagrees with the global one; the
    /// global calibration is left as is.
    pub conflict: Option<CalibrationConflict>,
    /// Image name from the description (`name=`).
    pub name: Option<String>,
    /// Image count from the description (`images=`, only when > 1).
    pub image_count: Option<u32>,
    /// Parsed description block, if there was one.
    pub properties: Option<DescriptionProperties>,
}

/// Resolves image calibration.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationResolver<'a> {
    global: Option<&'a Calibration>,
    report_conflicts: bool,
}

impl Default for CalibrationResolver<'_> {
    fn default() -> Self {
        Self {
            global: None,
            report_conflicts: true,
        }
    }
}

impl<'a> CalibrationResolver<'a> {
    /// Resolver without a global calibration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the session-wide calibration to check against.
    pub fn with_global(mut self, global: Option<&'a Calibration>) -> Self {
        self.global = global;
        self
    }

    /// Enables or disables conflict reporting.
    pub fn with_conflict_reporting(mut self, report: bool) -> Self {
        self.report_conflicts = report;
        self
    }

    /// Resolves the calibration of `image` decoded from `descriptor`.
    pub fn resolve(&self, descriptor: &FileDescriptor, image: &DecodedImage) -> Resolution {
        let mut cal = image.calibration.clone();
        if descriptor.encoding == PixelEncoding::Gray16Signed {
            cal.intensity = Some(IntensityCalibration::signed16());
        }

        let mut local = LocalFields::from(descriptor);
        let props = descriptor.description.as_deref().and_then(parse_description);
        if let Some(p) = &props {
            local.apply_description(p);
        }

        let mut calibrated = false;
        if local.pixel_width > 0.0 && local.unit.is_some() {
            cal.pixel_width = local.pixel_width;
            cal.pixel_height = local.pixel_height;
            cal.pixel_depth = local.pixel_depth;
            cal.set_unit(local.unit.as_deref());
            calibrated = true;
        }

        if let Some(value_unit) = local.value_unit.clone() {
            if image.bit_depth() == 32 {
                cal.value_unit = Some(value_unit);
            } else if let Some(function) = local.function {
                let fitted = function.is_fitted() && local.coefficients.is_some();
                if fitted || function == CalibrationFunction::UncalibratedOd {
                    cal.intensity = Some(IntensityCalibration {
                        function,
                        coefficients: local.coefficients.clone().unwrap_or_default(),
                        value_unit,
                        zero_clip: props.as_ref().is_some_and(|p| p.get_bool("zeroclip")),
                    });
                    calibrated = true;
                }
            }
        }

        let conflict = if calibrated && self.report_conflicts {
            self.global
                .filter(|global| cal.conflicts_with(global))
                .map(|global| CalibrationConflict::new(&cal, global))
        } else {
            None
        };
        if let Some(c) = &conflict {
            warn!("{c}");
        }

        if descriptor.frame_interval != 0.0 {
            cal.frame_interval = descriptor.frame_interval;
        }

        if let Some(p) = &props {
            apply_display_properties(&mut cal, p, image);
        }

        Resolution {
            calibration: cal,
            conflict,
            name: local.name,
            image_count: local.image_count,
            properties: props,
        }
    }
}

/// Descriptor fields a description block may override.
struct LocalFields {
    pixel_width: f64,
    pixel_height: f64,
    pixel_depth: f64,
    unit: Option<String>,
    value_unit: Option<String>,
    function: Option<CalibrationFunction>,
    coefficients: Option<Vec<f64>>,
    name: Option<String>,
    image_count: Option<u32>,
}

impl From<&FileDescriptor> for LocalFields {
    fn from(d: &FileDescriptor) -> Self {
        Self {
            pixel_width: d.pixel_width,
            pixel_height: d.pixel_height,
            pixel_depth: d.pixel_depth,
            unit: d.unit.clone(),
            value_unit: d.value_unit.clone(),
            function: d.calibration_function,
            coefficients: d.coefficients.clone(),
            name: None,
            image_count: None,
        }
    }
}

impl LocalFields {
    fn apply_description(&mut self, p: &DescriptionProperties) {
        let ds_unit = p.get("unit").unwrap_or("");
        if self.unit.as_deref() == Some("cm") && ds_unit == "um" {
            self.pixel_width *= 10_000.0;
            self.pixel_height *= 10_000.0;
        }
        self.unit = Some(ds_unit.to_string());

        if let Some(code) = p.get_number("cf") {
            self.function = CalibrationFunction::from_code(code as i32);
            if self.function.is_none() {
                debug!(code, "unknown calibration function");
            }
        }
        let coefficients: Vec<f64> = (0..5)
            .map_while(|i| p.get_number(&format!("c{i}")))
            .collect();
        if coefficients.len() >= 2 {
            self.coefficients = Some(coefficients);
        }
        self.value_unit = p.get("vunit").map(str::to_string);

        if let Some(n) = p.get_count("images").filter(|&n| n > 1) {
            self.image_count = Some(n);
        }
        if let Some(spacing) = p.get_number("spacing") {
            self.pixel_depth = spacing.abs();
        }
        if let Some(name) = p.get("name") {
            self.name = Some(name.to_string());
        }
    }
}

fn apply_display_properties(cal: &mut Calibration, p: &DescriptionProperties, image: &DecodedImage) {
    cal.x_origin = p.get_double("xorigin");
    cal.y_origin = p.get_double("yorigin");
    cal.z_origin = p.get_double("zorigin");
    cal.info = p.get("info").map(str::to_string);
    cal.fps = p.get_double("fps");
    cal.loop_playback = p.get_bool("loop");
    cal.frame_interval = p.get_double("finterval");
    cal.time_unit = p.get("tunit").unwrap_or("sec").to_string();
    cal.y_unit = p.get("yunit").map(str::to_string);
    cal.z_unit = p.get("zunit").map(str::to_string);

    let (min, max) = (p.get_double("min"), p.get_double("max"));
    if !(min == 0.0 && max == 0.0) && !image.encoding.is_rgb() {
        cal.display_range = Some((min, max));
    }

    let stack_size = image.stack_size() as u64;
    if stack_size > 1 {
        match ["channels", "slices", "frames"].map(|k| p.get_count(k)) {
            [Some(c), Some(z), Some(t)] => {
                let dims = HyperstackDims::new(c, z, t);
                if dims.product() == stack_size {
                    cal.dimensions = dims;
                    cal.hyperstack = p.get_bool("hyperstack");
                } else {
                    debug!(?dims, stack_size, "hyperstack dimensions do not match stack size");
                }
            }
            _ => debug!("hyperstack dimension out of range"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rawstack_core::{
        ColorModelSpec, Completeness, FrameData, PixelBuffer, PixelFrame, PIXEL_UNIT,
    };

    fn image_of(encoding: PixelEncoding, frames: Vec<PixelFrame>) -> DecodedImage {
        DecodedImage {
            name: "test".into(),
            width: 1,
            height: 1,
            encoding,
            frames,
            color_model: ColorModelSpec::Grayscale { inverted: false },
            calibration: Calibration::default(),
            completeness: Completeness::Complete,
            label: None,
            info: None,
            channel_labels: Vec::new(),
        }
    }

    fn gray8_image(n: usize) -> DecodedImage {
        let frames = (0..n)
            .map(|_| PixelFrame::new(1, 1, FrameData::Single(PixelBuffer::Byte(vec![0]))))
            .collect();
        image_of(PixelEncoding::Gray8, frames)
    }

    fn float_image() -> DecodedImage {
        let frame = PixelFrame::new(1, 1, FrameData::Single(PixelBuffer::Float(vec![0.0])));
        image_of(PixelEncoding::Gray32Float, vec![frame])
    }

    #[test]
    fn test_parse_properties() {
        let p = DescriptionProperties::parse("ImageJ=1.54f\n# comment\n unit = um \nspacing:2.5\nloop true\n!x=1\n");
        assert_eq!(p.get("ImageJ"), Some("1.54f"));
        assert_eq!(p.get("unit"), Some("um"));
        assert_eq!(p.get_number("spacing"), Some(2.5));
        assert!(p.get_bool("loop"));
        assert_eq!(p.get("!x"), None);
        assert_eq!(p.len(), 4);
    }

    #[test]
    fn test_description_gate() {
        assert!(parse_description("ImageJ").is_none());
        assert!(parse_description("Created by scanner\nunit=um").is_none());
        assert!(parse_description("ImageJ=\n").is_some());
    }

    #[test]
    fn test_unit_and_spacing() {
        let desc = FileDescriptor::new(1, 1, PixelEncoding::Gray8).with_description("ImageJ\nunit=um\nspacing=2.5\n");
        let res = CalibrationResolver::new().resolve(&desc, &gray8_image(1));
        assert_eq!(res.calibration.unit, "um");
        assert_relative_eq!(res.calibration.pixel_depth, 2.5);

        let desc = FileDescriptor::new(1, 1, PixelEncoding::Gray8).with_description("ImageJ\nunit=um\nspacing=-2.5\n");
        let res = CalibrationResolver::new().resolve(&desc, &gray8_image(1));
        assert_relative_eq!(res.calibration.pixel_depth, 2.5);
        assert_eq!(desc.pixel_depth, 1.0);
    }

    #[test]
    fn test_cm_to_um_rescale() {
        let desc = FileDescriptor::new(1, 1, PixelEncoding::Gray8)
            .with_pixel_size(0.5, 0.25, 1.0, "cm")
            .with_description("ImageJ=1.54\nunit=um\n");
        let res = CalibrationResolver::new().resolve(&desc, &gray8_image(1));
        assert_relative_eq!(res.calibration.pixel_width, 5000.0);
        assert_relative_eq!(res.calibration.pixel_height, 2500.0);
        assert_eq!(desc.unit.as_deref(), Some("cm"));
    }

    #[test]
    fn test_empty_unit_is_pixel() {
        let desc = FileDescriptor::new(1, 1, PixelEncoding::Gray8).with_description("ImageJ=1.54\nimages=1\n");
        let res = CalibrationResolver::new().resolve(&desc, &gray8_image(1));
        assert_eq!(res.calibration.unit, PIXEL_UNIT);
        assert_eq!(res.image_count, None);
    }

    #[test]
    fn test_function_from_description() {
        let desc = FileDescriptor::new(1, 1, PixelEncoding::Gray8)
            .with_description("ImageJ=1.54\ncf=0\nc0=-10\nc1=0.5\nvunit=OD\nzeroclip=true\n");
        let res = CalibrationResolver::new().resolve(&desc, &gray8_image(1));
        let intensity = res.calibration.intensity.as_ref().expect("function");
        assert_eq!(intensity.function, CalibrationFunction::StraightLine);
        assert_eq!(intensity.coefficients, vec![-10.0, 0.5]);
        assert_eq!(intensity.value_unit, "OD");
        assert!(intensity.zero_clip);
        assert_relative_eq!(res.calibration.value(4.0), 0.0);
    }

    #[test]
    fn test_single_coefficient_ignored() {
        let desc = FileDescriptor::new(1, 1, PixelEncoding::Gray8)
            .with_description("ImageJ=1.54\ncf=0\nc0=3\nvunit=OD\n");
        let res = CalibrationResolver::new().resolve(&desc, &gray8_image(1));
        assert!(res.calibration.intensity.is_none());
    }

    #[test]
    fn test_value_unit_on_float_image() {
        let mut desc = FileDescriptor::new(1, 1, PixelEncoding::Gray32Float);
        desc.value_unit = Some("K".into());
        desc.calibration_function = Some(CalibrationFunction::StraightLine);
        desc.coefficients = Some(vec![0.0, 2.0]);
        let res = CalibrationResolver::new().resolve(&desc, &float_image());
        assert_eq!(res.calibration.value_unit.as_deref(), Some("K"));
        assert!(res.calibration.intensity.is_none());
    }

    #[test]
    fn test_signed16_calibration() {
        let desc = FileDescriptor::new(1, 1, PixelEncoding::Gray16Signed);
        let frame = PixelFrame::new(1, 1, FrameData::Single(PixelBuffer::Short(vec![0])));
        let res = CalibrationResolver::new().resolve(&desc, &image_of(PixelEncoding::Gray16Signed, vec![frame]));
        assert_relative_eq!(res.calibration.value(0.0), -32768.0);
    }

    #[test]
    fn test_conflict_reported_not_applied() {
        let desc = FileDescriptor::new(1, 1, PixelEncoding::Gray8).with_pixel_size(0.5, 0.5, 1.0, "um");
        let global = Calibration::default();
        let resolver = CalibrationResolver::new().with_global(Some(&global));
        let res = resolver.resolve(&desc, &gray8_image(1));
        let conflict = res.conflict.expect("conflict");
        assert_eq!(conflict.image_unit, "um");
        assert_eq!(conflict.global_unit, PIXEL_UNIT);
        assert_eq!(res.calibration.unit, "um");

        let quiet = resolver.with_conflict_reporting(false).resolve(&desc, &gray8_image(1));
        assert!(quiet.conflict.is_none());

        let uncalibrated = FileDescriptor::new(1, 1, PixelEncoding::Gray8);
        assert!(resolver.resolve(&uncalibrated, &gray8_image(1)).conflict.is_none());
    }

    #[test]
    fn test_frame_interval_precedence() {
        let mut desc = FileDescriptor::new(1, 1, PixelEncoding::Gray8);
        desc.frame_interval = 0.25;
        let res = CalibrationResolver::new().resolve(&desc, &gray8_image(1));
        assert_relative_eq!(res.calibration.frame_interval, 0.25);

        // a parsed description always sets the interval, zero when absent
        let cleared = desc.clone().with_description("ImageJ=1.54\nfps=7\n");
        let res = CalibrationResolver::new().resolve(&cleared, &gray8_image(1));
        assert_relative_eq!(res.calibration.frame_interval, 0.0);
        assert_relative_eq!(res.calibration.fps, 7.0);

        let overridden = desc.with_description("ImageJ=1.54\nfinterval=2\ntunit=ms\n");
        let res = CalibrationResolver::new().resolve(&overridden, &gray8_image(1));
        assert_relative_eq!(res.calibration.frame_interval, 2.0);
        assert_eq!(res.calibration.time_unit, "ms");
    }

    #[test]
    fn test_hyperstack_dimensions() {
        let desc = FileDescriptor::new(1, 1, PixelEncoding::Gray8)
            .with_description("ImageJ=1.54\nimages=6\nchannels=2\nslices=3\nhyperstack=true\nname=cells\n");
        let res = CalibrationResolver::new().resolve(&desc, &gray8_image(6));
        assert_eq!(res.calibration.dimensions, HyperstackDims::new(2, 3, 1));
        assert!(res.calibration.hyperstack);
        assert_eq!(res.image_count, Some(6));
        assert_eq!(res.name.as_deref(), Some("cells"));

        let mismatch = CalibrationResolver::new().resolve(&desc, &gray8_image(5));
        assert_eq!(mismatch.calibration.dimensions, HyperstackDims::default());
        assert!(!mismatch.calibration.hyperstack);
    }

    #[test]
    fn test_oversized_hyperstack_counts_are_skipped() {
        // 4294967298 wraps to 2 as a u32 and would match a 2-frame stack
        let desc = FileDescriptor::new(1, 1, PixelEncoding::Gray8)
            .with_description("ImageJ=1.54\nimages=4294967298\nchannels=4294967298\nslices=1\nhyperstack=true\n");
        let res = CalibrationResolver::new().resolve(&desc, &gray8_image(2));
        assert_eq!(res.calibration.dimensions, HyperstackDims::default());
        assert!(!res.calibration.hyperstack);
        assert_eq!(res.image_count, None);

        let negative = FileDescriptor::new(1, 1, PixelEncoding::Gray8)
            .with_description("ImageJ=1.54\nchannels=-2\nslices=1\n");
        let res = CalibrationResolver::new().resolve(&negative, &gray8_image(2));
        assert_eq!(res.calibration.dimensions, HyperstackDims::default());
    }

    #[test]
    fn test_display_range() {
        let desc = FileDescriptor::new(1, 1, PixelEncoding::Gray8).with_description("ImageJ=1.54\nmin=10\nmax=200\n");
        let res = CalibrationResolver::new().resolve(&desc, &gray8_image(1));
        assert_eq!(res.calibration.display_range, Some((10.0, 200.0)));

        let zero = FileDescriptor::new(1, 1, PixelEncoding::Gray8).with_description("ImageJ=1.54\nmin=0\nmax=0\n");
        let res = CalibrationResolver::new().resolve(&zero, &gray8_image(1));
        assert_eq!(res.calibration.display_range, None);
    }
}
