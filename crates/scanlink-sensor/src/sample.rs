//! Fixed-point measurement samples and their unit conversions.

use scanlink_protocol::{QualityMode, SamplePoint};

/// Flag bit marking the first sample of a new rotation.
pub const SYNC_FLAG: u8 = 0x01;

/// Raw angle units per 90 degrees (`2^14`).
const ANGLE_Q14_PER_QUADRANT: f32 = 16_384.0;

/// Raw distance units per millimetre.
const DISTANCE_Q2_PER_MM: f32 = 4.0;

/// One measurement in the sensor's fixed-point encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawSample {
    /// Bearing; degrees are `raw * 90 / 2^14`.
    pub angle_z_q14: u16,
    /// Range; millimetres are `raw / 4`.
    pub dist_mm_q2: u32,
    /// Signal quality, 0–255.
    pub quality: u8,
    /// Status bits; see [`SYNC_FLAG`].
    pub flag: u8,
}

impl RawSample {
    /// Builds a sample from its raw fields with no flags set.
    #[must_use]
    pub const fn new(angle_z_q14: u16, dist_mm_q2: u32, quality: u8) -> Self {
        Self {
            angle_z_q14,
            dist_mm_q2,
            quality,
            flag: 0,
        }
    }

    /// Marks this sample as the first of a rotation.
    #[must_use]
    pub const fn with_sync(mut self) -> Self {
        self.flag |= SYNC_FLAG;
        self
    }

    /// Returns `true` when the sensor flagged this sample as a rotation start.
    #[must_use]
    pub const fn is_sync(&self) -> bool {
        self.flag & SYNC_FLAG != 0
    }

    /// Bearing in degrees.
    #[must_use]
    pub fn angle_degrees(&self) -> f32 {
        f32::from(self.angle_z_q14) * 90.0 / ANGLE_Q14_PER_QUADRANT
    }

    /// Range in millimetres.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        reason = "ranges stay far below f32's exact integer limit"
    )]
    pub fn distance_mm(&self) -> f32 {
        self.dist_mm_q2 as f32 / DISTANCE_Q2_PER_MM
    }

    /// Converts to response units.
    #[must_use]
    pub fn to_point(&self, quality: QualityMode) -> SamplePoint {
        SamplePoint {
            angle: self.angle_degrees(),
            distance: self.distance_mm(),
            quality: quality.apply(self.quality),
        }
    }
}

/// Sorts samples by ascending angle within each rotation.
///
/// Rotations are delimited by samples carrying [`SYNC_FLAG`], so a batch that
/// spans a rotation boundary keeps its boundary in place.
pub fn ascend_by_rotation(samples: &mut [RawSample]) {
    for rotation in samples.chunk_by_mut(|_, next| !next.is_sync()) {
        rotation.sort_by_key(|sample| sample.angle_z_q14);
    }
}

/// Builds the raw angle for a bearing in degrees.
///
/// Used by the simulator and test doubles.
#[must_use]
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "input is clamped to the encodable range first"
)]
pub fn angle_to_q14(degrees: f32) -> u16 {
    let raw = (degrees * ANGLE_Q14_PER_QUADRANT / 90.0).round();
    raw.clamp(0.0, f32::from(u16::MAX)) as u16
}
