//! Dead reckoning and smoothing for vehicles this peer does not own.
//!
//! A non-owning peer never simulates a remote vehicle. It extrapolates the
//! last authoritative sample along its velocity and eases the rendered pose
//! toward that prediction a fixed fraction per network tick.

use glam::Vec3;

use crate::replication::VehicleMirror;
use crate::vehicle::{Pose, VehicleState};

/// Default blend factor per tick.
pub const DEFAULT_INTERPOLATION_FACTOR: f32 = 0.4;

/// Default cap on extrapolation from one sample, in seconds.
pub const DEFAULT_MAX_EXTRAPOLATION_SECS: f32 = 1.0;

/// Smoothing parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingParams {
    /// Fraction of the remaining gap closed each tick, in `[0, 1]`.
    pub interpolation_factor: f32,
    /// Elapsed time since a sample is clamped to this.
    pub max_extrapolation_secs: f32,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            interpolation_factor: DEFAULT_INTERPOLATION_FACTOR,
            max_extrapolation_secs: DEFAULT_MAX_EXTRAPOLATION_SECS,
        }
    }
}

impl From<&racerr_config::ReplicationConfig> for SmoothingParams {
    fn from(config: &racerr_config::ReplicationConfig) -> Self {
        Self {
            interpolation_factor: config.interpolation_factor.clamp(0.0, 1.0),
            max_extrapolation_secs: config.max_extrapolation_secs.max(0.0),
        }
    }
}

/// Where the sampled vehicle should be at `now`:
/// `position + elapsed * linear_velocity`, with `elapsed` clamped to
/// `[0, max_extrapolation_secs]`.
pub fn predict_position(sample: &VehicleState, now: f64, max_extrapolation_secs: f32) -> Vec3 {
    let elapsed = (now - sample.timestamp).max(0.0) as f32;
    let elapsed = elapsed.min(max_extrapolation_secs);
    sample.position + sample.linear_velocity * elapsed
}

/// Moves `current` a fraction `factor` of the way to `target`.
pub fn blend_pose(current: Pose, target: Pose, factor: f32) -> Pose {
    Pose {
        position: current.position.lerp(target.position, factor),
        rotation: current.rotation.lerp(target.rotation, factor),
    }
}

/// One network tick of smoothing for a remote vehicle. Without any
/// authoritative sample the mirror keeps its spawn pose untouched.
pub fn smoothing_step(mirror: &mut VehicleMirror, now: f64, params: SmoothingParams) {
    let Some(sample) = mirror.last_sample else {
        return;
    };
    let target = Pose {
        position: predict_position(&sample, now, params.max_extrapolation_secs),
        rotation: sample.rotation,
    };
    mirror.rendered = blend_pose(mirror.rendered, target, params.interpolation_factor);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
