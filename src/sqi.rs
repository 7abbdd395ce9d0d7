//! Channel Signal Quality Index (§4.5): per-channel 0-100 score combining
//! SNR, motion, saturation and IMU penalty curves. Weights live in
//! [`crate::config::SqiWeights`] rather than being hard-coded here, per
//! design note 9.

use crate::config::SqiWeights;
use crate::types::{Channel, SqiInputs};

/// Score a face-ROI channel window (§4.5).
pub fn face_sqi(inputs: SqiInputs, weights: &SqiWeights) -> f64 {
    let snr_penalty = (weights.face_snr_floor_db - inputs.snr_db).max(0.0) * weights.face_snr_slope;
    let motion_penalty =
        (inputs.motion_px - weights.face_motion_floor_px).max(0.0) * weights.face_motion_slope;
    let imu_penalty = (inputs.imu_g - weights.face_imu_floor_g).max(0.0) * weights.face_imu_slope;
    clamp_score(100.0 - snr_penalty - motion_penalty - imu_penalty)
}

/// Score a fingertip channel window (§4.5).
pub fn finger_sqi(inputs: SqiInputs, weights: &SqiWeights) -> f64 {
    let snr_penalty =
        (weights.finger_snr_floor_db - inputs.snr_db).max(0.0) * weights.finger_snr_slope;
    let sat_penalty = (inputs.saturation_pct - weights.finger_sat_floor_pct).max(0.0)
        * weights.finger_sat_slope;
    let imu_penalty = (inputs.imu_g - weights.finger_imu_floor_g).max(0.0) * weights.finger_imu_slope;
    clamp_score(100.0 - snr_penalty - sat_penalty - imu_penalty)
}

/// Dispatch by [`Channel`], for call sites that don't know the site statically.
pub fn sqi_for_channel(channel: Channel, inputs: SqiInputs, weights: &SqiWeights) -> f64 {
    match channel {
        Channel::Face => face_sqi(inputs, weights),
        Channel::Finger => finger_sqi(inputs, weights),
    }
}

fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}
