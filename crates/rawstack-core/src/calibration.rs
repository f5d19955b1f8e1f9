//! Spatial, temporal and intensity calibration.
//!
//! [`Calibration`] maps pixel coordinates to physical units and raw sample
//! values to calibrated values. It also carries the display hints and the
//! hyperstack decomposition recovered from a description block.
//!
//! # Intensity functions
//!
//! | Function | Formula |
//! |----------|---------|
//! | `StraightLine` | `a + b*x` |
//! | `Poly2` .. `Poly4` | `a + b*x + c*x^2 ...` |
//! | `Exponential` | `a * exp(b*x)` |
//! | `Power` | `a * x^b` |
//! | `Log` | `a * ln(b*x)` |
//! | `Rodbard` | `d + (a - d) / (1 + (x/c)^b)` |
//! | `GammaVariate` | `a * (x-b)^c * exp(-(x-b)/d)` for `x > b` |
//! | `Log2` | `a + b * ln(x - c)` |
//! | `Rodbard2` | `c * ((x - a) / (d - x))^(1/b)` |
//! | `ExpWithOffset` | `a * exp(-b*x) + c` |
//! | `Gaussian` | `a + (b - a) * exp(-(x-c)^2 / (2 d^2))` |
//! | `ExpRecovery` | `a * (1 - exp(-b*x)) + c` |
//! | `UncalibratedOd` | `log10(255 / (255 - x))` |

/// Unit name used when no physical unit is known.
pub const PIXEL_UNIT: &str = "pixel";

/// Intensity calibration function selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum CalibrationFunction {
    /// `a + b*x`
    StraightLine,
    /// Second order polynomial.
    Poly2,
    /// Third order polynomial.
    Poly3,
    /// Fourth order polynomial.
    Poly4,
    /// `a * exp(b*x)`
    Exponential,
    /// `a * x^b`
    Power,
    /// `a * ln(b*x)`
    Log,
    /// Four-parameter logistic.
    Rodbard,
    /// Gamma variate.
    GammaVariate,
    /// `a + b * ln(x - c)`
    Log2,
    /// Inverse Rodbard.
    Rodbard2,
    /// `a * exp(-b*x) + c`
    ExpWithOffset,
    /// Gaussian with offset.
    Gaussian,
    /// `a * (1 - exp(-b*x)) + c`
    ExpRecovery,
    /// Explicitly uncalibrated.
    None,
    /// Optical density of 8-bit data.
    UncalibratedOd,
    /// Caller-defined function; evaluates as identity here.
    Custom,
}

impl CalibrationFunction {
    /// Maps the numeric selector found in description blocks (`cf=`).
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::StraightLine,
            1 => Self::Poly2,
            2 => Self::Poly3,
            3 => Self::Poly4,
            4 => Self::Exponential,
            5 => Self::Power,
            6 => Self::Log,
            7 => Self::Rodbard,
            8 => Self::GammaVariate,
            9 => Self::Log2,
            10 => Self::Rodbard2,
            11 => Self::ExpWithOffset,
            12 => Self::Gaussian,
            13 => Self::ExpRecovery,
            20 => Self::None,
            21 => Self::UncalibratedOd,
            22 => Self::Custom,
            _ => return None,
        })
    }

    /// Numeric selector.
    pub fn code(self) -> i32 {
        match self {
            Self::StraightLine => 0,
            Self::Poly2 => 1,
            Self::Poly3 => 2,
            Self::Poly4 => 3,
            Self::Exponential => 4,
            Self::Power => 5,
            Self::Log => 6,
            Self::Rodbard => 7,
            Self::GammaVariate => 8,
            Self::Log2 => 9,
            Self::Rodbard2 => 10,
            Self::ExpWithOffset => 11,
            Self::Gaussian => 12,
            Self::ExpRecovery => 13,
            Self::None => 20,
            Self::UncalibratedOd => 21,
            Self::Custom => 22,
        }
    }

    /// Returns `true` for the fitted family (straight line .. exponential
    /// recovery), which needs coefficients.
    pub fn is_fitted(self) -> bool {
        (0..=13).contains(&self.code())
    }
}

/// Raw-to-calibrated value mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityCalibration {
    /// Function selector.
    pub function: CalibrationFunction,
    /// Coefficients `a, b, c, d, e`; missing ones read as zero.
    pub coefficients: Vec<f64>,
    /// Unit of calibrated values.
    pub value_unit: String,
    /// Clamp negative results to zero.
    pub zero_clip: bool,
}

impl IntensityCalibration {
    /// Straight line used for signed 16-bit data stored with a +32768 offset.
    pub fn signed16() -> Self {
        Self {
            function: CalibrationFunction::StraightLine,
            coefficients: vec![-32768.0, 1.0],
            value_unit: "Gray Value".to_string(),
            zero_clip: false,
        }
    }

    /// Evaluates the function at `x`.
    pub fn apply(&self, x: f64) -> f64 {
        let c = |i: usize| self.coefficients.get(i).copied().unwrap_or(0.0);
        let (a, b, cc, d) = (c(0), c(1), c(2), c(3));
        let y = match self.function {
            CalibrationFunction::StraightLine => a + b * x,
            CalibrationFunction::Poly2 => a + x * (b + x * cc),
            CalibrationFunction::Poly3 => a + x * (b + x * (cc + x * d)),
            CalibrationFunction::Poly4 => a + x * (b + x * (cc + x * (d + x * c(4)))),
            CalibrationFunction::Exponential => a * (b * x).exp(),
            CalibrationFunction::Power => {
                if x == 0.0 {
                    0.0
                } else {
                    a * x.powf(b)
                }
            }
            CalibrationFunction::Log => {
                if x == 0.0 {
                    0.0
                } else {
                    a * (b * x).ln()
                }
            }
            CalibrationFunction::Rodbard => d + (a - d) / (1.0 + (x / cc).powf(b)),
            CalibrationFunction::GammaVariate => {
                if b >= x || d == 0.0 {
                    0.0
                } else {
                    a * (x - b).powf(cc) * (-(x - b) / d).exp()
                }
            }
            CalibrationFunction::Log2 => {
                let t = x - cc;
                if t <= 0.0 { f64::NAN } else { a + b * t.ln() }
            }
            CalibrationFunction::Rodbard2 => {
                let ratio = (x - a) / (d - x);
                cc * ratio.powf(1.0 / b)
            }
            CalibrationFunction::ExpWithOffset => a * (-b * x).exp() + cc,
            CalibrationFunction::Gaussian => {
                a + (b - a) * (-(x - cc) * (x - cc) / (2.0 * d * d)).exp()
            }
            CalibrationFunction::ExpRecovery => a * (1.0 - (-b * x).exp()) + cc,
            CalibrationFunction::UncalibratedOd => (255.0 / (255.0 - x.min(254.5))).log10(),
            CalibrationFunction::None | CalibrationFunction::Custom => x,
        };
        if self.zero_clip && y < 0.0 { 0.0 } else { y }
    }
}

/// Channel x slice x frame decomposition of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HyperstackDims {
    /// Channels.
    pub channels: u32,
    /// Z slices.
    pub slices: u32,
    /// Time points.
    pub frames: u32,
}

impl HyperstackDims {
    /// Builds a decomposition; zero counts read as 1.
    pub fn new(channels: u32, slices: u32, frames: u32) -> Self {
        Self {
            channels: channels.max(1),
            slices: slices.max(1),
            frames: frames.max(1),
        }
    }

    /// Product of the three counts.
    pub fn product(&self) -> u64 {
        self.channels as u64 * self.slices as u64 * self.frames as u64
    }
}

impl Default for HyperstackDims {
    fn default() -> Self {
        Self::new(1, 1, 1)
    }
}

/// Display mode of a multi-channel (48-bit RGB) image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositeMode {
    /// Channels blended together.
    #[default]
    Composite,
    /// One channel at a time, in its own color.
    Color,
    /// One channel at a time, in gray.
    Grayscale,
}

/// Physical and intensity calibration of a decoded image.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    /// Physical pixel width.
    pub pixel_width: f64,
    /// Physical pixel height.
    pub pixel_height: f64,
    /// Physical slice spacing, non-negative.
    pub pixel_depth: f64,
    /// Length unit (x axis, and y/z unless overridden).
    pub unit: String,
    /// Y unit override.
    pub y_unit: Option<String>,
    /// Z unit override.
    pub z_unit: Option<String>,
    /// Time unit.
    pub time_unit: String,
    /// Origin in pixels along x.
    pub x_origin: f64,
    /// Origin in pixels along y.
    pub y_origin: f64,
    /// Origin in pixels along z.
    pub z_origin: f64,
    /// Time between frames.
    pub frame_interval: f64,
    /// Playback rate.
    pub fps: f64,
    /// Loop playback.
    pub loop_playback: bool,
    /// Intensity mapping.
    pub intensity: Option<IntensityCalibration>,
    /// Value unit without a mapping function (32-bit data).
    pub value_unit: Option<String>,
    /// Display range hint.
    pub display_range: Option<(f64, f64)>,
    /// Per-channel display ranges (48-bit RGB).
    pub channel_display_ranges: Vec<(f64, f64)>,
    /// Stack decomposition.
    pub dimensions: HyperstackDims,
    /// Open as hyperstack.
    pub hyperstack: bool,
    /// Multi-channel display mode.
    pub composite_mode: Option<CompositeMode>,
    /// Free-form info from the description block.
    pub info: Option<String>,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            pixel_width: 1.0,
            pixel_height: 1.0,
            pixel_depth: 1.0,
            unit: PIXEL_UNIT.to_string(),
            y_unit: None,
            z_unit: None,
            time_unit: "sec".to_string(),
            x_origin: 0.0,
            y_origin: 0.0,
            z_origin: 0.0,
            frame_interval: 0.0,
            fps: 0.0,
            loop_playback: false,
            intensity: None,
            value_unit: None,
            display_range: None,
            channel_display_ranges: Vec::new(),
            dimensions: HyperstackDims::default(),
            hyperstack: false,
            composite_mode: None,
            info: None,
        }
    }
}

impl Calibration {
    /// Sets the length unit; empty or missing names fall back to `pixel`.
    pub fn set_unit(&mut self, unit: Option<&str>) {
        self.unit = match unit {
            Some(u) if !u.trim().is_empty() => u.to_string(),
            _ => PIXEL_UNIT.to_string(),
        };
    }

    /// Returns `true` if pixels have a physical size.
    pub fn is_scaled(&self) -> bool {
        self.unit != PIXEL_UNIT
    }

    /// Returns `true` if `other` disagrees on pixel width or unit.
    pub fn conflicts_with(&self, other: &Calibration) -> bool {
        self.pixel_width != other.pixel_width || self.unit != other.unit
    }

    /// Calibrated value of a raw sample.
    pub fn value(&self, raw: f64) -> f64 {
        self.intensity.as_ref().map_or(raw, |c| c.apply(raw))
    }

    /// Y unit, falling back to the x unit.
    pub fn y_unit(&self) -> &str {
        self.y_unit.as_deref().unwrap_or(&self.unit)
    }

    /// Z unit, falling back to the x unit.
    pub fn z_unit(&self) -> &str {
        self.z_unit.as_deref().unwrap_or(&self.unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_function_codes_roundtrip() {
        for code in (0..=13).chain(20..=22) {
            let f = CalibrationFunction::from_code(code).expect("known");
            assert_eq!(f.code(), code);
        }
        assert!(CalibrationFunction::from_code(17).is_none());
        assert!(CalibrationFunction::ExpRecovery.is_fitted());
        assert!(!CalibrationFunction::UncalibratedOd.is_fitted());
    }

    #[test]
    fn test_signed16_straight_line() {
        let cal = IntensityCalibration::signed16();
        assert_relative_eq!(cal.apply(0.0), -32768.0);
        assert_relative_eq!(cal.apply(32768.0), 0.0);
    }

    #[test]
    fn test_poly_and_zero_clip() {
        let mut cal = IntensityCalibration {
            function: CalibrationFunction::Poly2,
            coefficients: vec![-10.0, 1.0, 0.5],
            value_unit: "OD".into(),
            zero_clip: false,
        };
        assert_relative_eq!(cal.apply(2.0), -10.0 + 2.0 + 2.0);
        cal.zero_clip = true;
        assert_relative_eq!(cal.apply(2.0), 0.0);
    }

    #[test]
    fn test_uncalibrated_od() {
        let cal = IntensityCalibration {
            function: CalibrationFunction::UncalibratedOd,
            coefficients: vec![],
            value_unit: "Uncalibrated OD".into(),
            zero_clip: false,
        };
        assert_relative_eq!(cal.apply(0.0), 0.0);
        assert!(cal.apply(255.0).is_finite());
    }

    #[test]
    fn test_set_unit_fallback() {
        let mut cal = Calibration::default();
        cal.set_unit(Some(""));
        assert_eq!(cal.unit, PIXEL_UNIT);
        cal.set_unit(Some("um"));
        assert_eq!(cal.unit, "um");
        assert_eq!(cal.z_unit(), "um");
    }

    #[test]
    fn test_conflict() {
        let a = Calibration::default();
        let mut b = Calibration::default();
        assert!(!a.conflicts_with(&b));
        b.pixel_width = 0.5;
        assert!(a.conflicts_with(&b));
    }

    #[test]
    fn test_dims_zero_defaults() {
        let dims = HyperstackDims::new(0, 4, 0);
        assert_eq!(dims, HyperstackDims::new(1, 4, 1));
        assert_eq!(dims.product(), 4);
    }
}
