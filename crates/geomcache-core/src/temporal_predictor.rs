//! Temporal prediction of B-frame streams.
//!
//! A B-frame value is predicted from the surrounding I-frames (interpolation)
//! and, when the two previous ticks were visible, from their motion
//! (extrapolation). Each 8-bit parameter is picked by a binary search that
//! minimizes the byte entropy of the residuals. The search assumes the entropy
//! curve is unimodal in the parameter; any parameter value decodes correctly,
//! a bad pick only costs compression ratio.

use crate::encoder_buffer::EncoderBuffer;
use crate::file_format::PREDICTOR_CONTROL_SIZE;
use crate::shannon_entropy::ByteHistogram;
use crate::status::{GeomCacheError, StatusResult};
use crate::stream_data::Component;

const MODE_INTERPOLATE: u8 = 0;
const MODE_COMBINE: u8 = 1;

/// Predictor chosen for one stream of one B-frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalPredictor {
    /// `floor + (ceil - floor) * lerp_factor / 255`
    Interpolate { lerp_factor: u8 },
    /// Interpolation blended towards motion extrapolation by `combine_factor / 255`.
    Combine {
        lerp_factor: u8,
        acceleration: u8,
        combine_factor: u8,
    },
}

impl Default for TemporalPredictor {
    fn default() -> Self {
        TemporalPredictor::Interpolate { lerp_factor: 0 }
    }
}

impl TemporalPredictor {
    pub fn control(self) -> PredictorControl {
        match self {
            TemporalPredictor::Interpolate { lerp_factor } => PredictorControl {
                mode: MODE_INTERPOLATE,
                lerp_factor,
                acceleration: 0,
                combine_factor: 0,
            },
            TemporalPredictor::Combine {
                lerp_factor,
                acceleration,
                combine_factor,
            } => PredictorControl {
                mode: MODE_COMBINE,
                lerp_factor,
                acceleration,
                combine_factor,
            },
        }
    }

    pub fn uses_motion(self) -> bool {
        matches!(self, TemporalPredictor::Combine { .. })
    }
}

/// Four-byte stream header preceding B-frame residuals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PredictorControl {
    pub mode: u8,
    pub lerp_factor: u8,
    pub acceleration: u8,
    pub combine_factor: u8,
}

impl PredictorControl {
    pub fn encode(&self, buffer: &mut EncoderBuffer) {
        buffer.encode_bytes(&self.to_bytes());
    }

    pub fn to_bytes(&self) -> [u8; PREDICTOR_CONTROL_SIZE] {
        [self.mode, self.lerp_factor, self.acceleration, self.combine_factor]
    }

    pub fn from_bytes(bytes: [u8; PREDICTOR_CONTROL_SIZE]) -> Self {
        Self {
            mode: bytes[0],
            lerp_factor: bytes[1],
            acceleration: bytes[2],
            combine_factor: bytes[3],
        }
    }

    pub fn predictor(&self) -> StatusResult<TemporalPredictor> {
        match self.mode {
            MODE_INTERPOLATE => Ok(TemporalPredictor::Interpolate {
                lerp_factor: self.lerp_factor,
            }),
            MODE_COMBINE => Ok(TemporalPredictor::Combine {
                lerp_factor: self.lerp_factor,
                acceleration: self.acceleration,
                combine_factor: self.combine_factor,
            }),
            mode => Err(GeomCacheError::InvalidParameter(format!("unknown predictor mode {}", mode))),
        }
    }
}

/// Values of the two ticks before the predicted one.
#[derive(Debug, Clone, Copy)]
pub struct MotionReference<'a, T> {
    /// Tick `t - 2`.
    pub prev0: &'a [T],
    /// Tick `t - 1`.
    pub prev1: &'a [T],
}

/// Reference streams a B-frame stream is predicted from.
#[derive(Debug, Clone, Copy)]
pub struct TemporalReferences<'a, T> {
    pub floor: &'a [T],
    pub ceil: &'a [T],
    pub motion: Option<MotionReference<'a, T>>,
}

impl<'a, T: Component> TemporalReferences<'a, T> {
    pub fn new(floor: &'a [T], ceil: &'a [T], motion: Option<MotionReference<'a, T>>) -> Self {
        Self { floor, ceil, motion }
    }

    fn check_len(&self, len: usize) -> StatusResult<()> {
        let motion_ok = self
            .motion
            .map_or(true, |m| m.prev0.len() == len && m.prev1.len() == len);
        if self.floor.len() == len && self.ceil.len() == len && motion_ok {
            Ok(())
        } else {
            Err(GeomCacheError::FrameSequence(format!(
                "reference stream length mismatch for {} values",
                len
            )))
        }
    }

    #[inline]
    fn interpolate(&self, i: usize, lerp_factor: u8) -> i32 {
        let floor: i32 = self.floor[i].as_();
        let ceil: i32 = self.ceil[i].as_();
        floor + ((ceil - floor) * lerp_factor as i32) / 255
    }

    #[inline]
    fn extrapolate(motion: &MotionReference<'_, T>, i: usize, acceleration: u8) -> i32 {
        let prev0: i32 = motion.prev0[i].as_();
        let prev1: i32 = motion.prev1[i].as_();
        prev1 + ((prev1 - prev0) * acceleration as i32) / 128
    }

    /// Prediction for element `i`.
    #[inline]
    fn predict(&self, i: usize, predictor: TemporalPredictor) -> StatusResult<T> {
        match predictor {
            TemporalPredictor::Interpolate { lerp_factor } => Ok(T::wrap_from_i32(self.interpolate(i, lerp_factor))),
            TemporalPredictor::Combine {
                lerp_factor,
                acceleration,
                combine_factor,
            } => {
                let motion = self.motion.as_ref().ok_or_else(|| {
                    GeomCacheError::FrameSequence("combine predictor without motion references".to_string())
                })?;
                let interpolated = self.interpolate(i, lerp_factor);
                let extrapolated = Self::extrapolate(motion, i, acceleration);
                let combined = interpolated + ((extrapolated - interpolated) * combine_factor as i32) / 255;
                Ok(T::wrap_from_i32(combined))
            }
        }
    }

    fn residual_entropy(&self, values: &[T], predict: impl Fn(usize) -> i32) -> f64 {
        let mut histogram = ByteHistogram::new();
        for (i, &value) in values.iter().enumerate() {
            let residual = value.wrapping_sub(&T::wrap_from_i32(predict(i)));
            residual.for_each_le_byte(|b| histogram.push(b));
        }
        histogram.entropy()
    }
}

/// Smallest-cost parameter under the unimodality assumption.
///
/// Follows the sign of `cost(mid + 1) - cost(mid)`, ties move left.
pub fn binary_search_parameter(mut cost: impl FnMut(u8) -> f64) -> u8 {
    let (mut lo, mut hi) = (0u8, u8::MAX);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if cost(mid) <= cost(mid + 1) {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    lo
}

/// Picks the predictor with the lowest residual entropy for `values`.
///
/// The interpolation factor is searched first, then the acceleration on the
/// pure motion residual, then the blend between the two.
pub fn search_predictor<T: Component>(values: &[T], refs: &TemporalReferences<'_, T>) -> StatusResult<TemporalPredictor> {
    refs.check_len(values.len())?;

    let lerp_factor = binary_search_parameter(|f| refs.residual_entropy(values, |i| refs.interpolate(i, f)));

    let Some(motion) = refs.motion.as_ref() else {
        return Ok(TemporalPredictor::Interpolate { lerp_factor });
    };

    let acceleration = binary_search_parameter(|a| {
        refs.residual_entropy(values, |i| TemporalReferences::extrapolate(motion, i, a))
    });

    let combine_factor = binary_search_parameter(|c| {
        refs.residual_entropy(values, |i| {
            let interpolated = refs.interpolate(i, lerp_factor);
            let extrapolated = TemporalReferences::extrapolate(motion, i, acceleration);
            interpolated + ((extrapolated - interpolated) * c as i32) / 255
        })
    });

    Ok(TemporalPredictor::Combine {
        lerp_factor,
        acceleration,
        combine_factor,
    })
}

/// `value - prediction` per element, wrapping in the element type.
pub fn encode_residuals<T: Component>(
    values: &[T],
    refs: &TemporalReferences<'_, T>,
    predictor: TemporalPredictor,
) -> StatusResult<Vec<T>> {
    refs.check_len(values.len())?;
    values
        .iter()
        .enumerate()
        .map(|(i, &value)| Ok(value.wrapping_sub(&refs.predict(i, predictor)?)))
        .collect()
}

/// Inverse of `encode_residuals`.
pub fn decode_residuals<T: Component>(
    residuals: &[T],
    refs: &TemporalReferences<'_, T>,
    predictor: TemporalPredictor,
) -> StatusResult<Vec<T>> {
    refs.check_len(residuals.len())?;
    residuals
        .iter()
        .enumerate()
        .map(|(i, &residual)| Ok(residual.wrapping_add(&refs.predict(i, predictor)?)))
        .collect()
}
