//! Immutable configuration records.
//!
//! Calibration constants (filter cutoffs, SQI penalty slopes, PTT confidence
//! weights, gate thresholds) are kept as `Default` values on plain structs
//! rather than module-level `pub const`s, so every component constructor
//! takes its configuration explicitly instead of reading a process-wide
//! singleton. See design note 9.

/// Top-level session configuration, built once per capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub target_sample_rate_hz: f64,
    pub pipeline: PipelineConfig,
    pub sqi_weights: SqiWeights,
    pub ptt: PttConfig,
    pub good_sync: GoodSyncGates,
    pub realtime: RealtimeConfig,
    pub trend: TrendConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_sample_rate_hz: 100.0,
            pipeline: PipelineConfig::default(),
            sqi_weights: SqiWeights::default(),
            ptt: PttConfig::default(),
            good_sync: GoodSyncGates::default(),
            realtime: RealtimeConfig::default(),
            trend: TrendConfig::default(),
        }
    }
}

/// Band-pass and minimum-overlap parameters for the signal pipeline (§4.3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub band_low_hz: f64,
    pub band_high_hz: f64,
    pub filter_order: usize,
    pub min_overlap_s: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            band_low_hz: 0.7,
            band_high_hz: 4.0,
            filter_order: 2,
            min_overlap_s: 5.0,
        }
    }
}

/// Penalty-curve weights for channel SQI (§4.5). Calibration values, kept in
/// one place per design note 9 rather than hard-coded at each call site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SqiWeights {
    pub face_snr_floor_db: f64,
    pub face_snr_slope: f64,
    pub face_motion_floor_px: f64,
    pub face_motion_slope: f64,
    pub face_imu_floor_g: f64,
    pub face_imu_slope: f64,

    pub finger_snr_floor_db: f64,
    pub finger_snr_slope: f64,
    pub finger_sat_floor_pct: f64,
    pub finger_sat_slope: f64,
    pub finger_imu_floor_g: f64,
    pub finger_imu_slope: f64,
}

impl Default for SqiWeights {
    fn default() -> Self {
        Self {
            face_snr_floor_db: 6.0,
            face_snr_slope: 10.0,
            face_motion_floor_px: 0.5,
            face_motion_slope: 40.0,
            face_imu_floor_g: 0.05,
            face_imu_slope: 200.0,

            finger_snr_floor_db: 10.0,
            finger_snr_slope: 8.0,
            finger_sat_floor_pct: 0.05,
            finger_sat_slope: 500.0,
            finger_imu_floor_g: 0.05,
            finger_imu_slope: 200.0,
        }
    }
}

/// PTT windowing, confidence-model and quality-label thresholds (§4.6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PttConfig {
    pub window_s: f64,
    pub min_windows: usize,
    pub max_lag_ms: f64,
    pub confidence_corr_weight_w1: f64,
    pub confidence_corr_weight_w2: f64,
    pub confidence_withhold_threshold: f64,
    /// Floor of the `f(c)` correlation ramp: `f(c) = clip((c - corr_floor) /
    /// corr_span, 0, 1)`. Below this correlation score `f(c)` is zero.
    pub corr_floor: f64,
    /// Span of the `f(c)` correlation ramp; `f(c)` reaches 1 at
    /// `corr_floor + corr_span`.
    pub corr_span: f64,
    /// Scale of the `g(s)` sharpness ramp: `g(s) = clip(s / sharpness_scale,
    /// 0, 1)`, where `s` is [`crate::peaks::Peak::sharpness`] averaged over
    /// the session's windows. Calibrated against this crate's trough-to-trough
    /// FWHM definition (see `GoodSyncGates::max_fwhm_ms`), not the `0.2`
    /// figure a narrow, literature-typical systolic-only FWHM would imply.
    pub sharpness_scale: f64,
    pub excellent_threshold: f64,
    pub good_threshold: f64,
    pub fair_threshold: f64,
    pub plausible_lag_range_ms: (f64, f64),
}

impl Default for PttConfig {
    fn default() -> Self {
        Self {
            window_s: 4.0,
            min_windows: 3,
            max_lag_ms: 500.0,
            confidence_corr_weight_w1: 1.0,
            confidence_corr_weight_w2: 1.0,
            confidence_withhold_threshold: 60.0,
            corr_floor: 0.5,
            corr_span: 0.4,
            sharpness_scale: 0.05,
            excellent_threshold: 85.0,
            good_threshold: 70.0,
            fair_threshold: 60.0,
            plausible_lag_range_ms: (50.0, 150.0),
        }
    }
}

/// Gates for the good-sync segment scanner (§4.7).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoodSyncGates {
    pub window_s: f64,
    pub overlap_fraction: f64,
    pub min_sqi: f64,
    pub max_motion_px: f64,
    pub max_saturation_pct: f64,
    pub min_corr: f64,
    /// Upper bound on the average systolic FWHM admitted into a segment.
    ///
    /// `peaks::trough_and_fwhm` measures width at the midpoint between a
    /// peak and the lower of its two flanking troughs, i.e. against the
    /// full peak-to-trough swing rather than a narrow systolic-only foot.
    /// For a near-symmetric single-peak-per-cycle pulse that works out to
    /// roughly half the cardiac period (~420-440 ms for a 72 bpm pulse at
    /// 100 Hz), not the ~120 ms a literature-typical narrow systolic FWHM
    /// would suggest. Calibrated against that definition with headroom
    /// above a clean pulse so motion-broadened peaks still get rejected.
    pub max_fwhm_ms: f64,
    pub min_segment_duration_s: f64,
}

impl Default for GoodSyncGates {
    fn default() -> Self {
        Self {
            window_s: 6.0,
            overlap_fraction: 0.5,
            min_sqi: 60.0,
            max_motion_px: 1.0,
            max_saturation_pct: 0.15,
            min_corr: 0.80,
            max_fwhm_ms: 480.0,
            min_segment_duration_s: 4.0,
        }
    }
}

/// Ring-buffer sizing, refresh gating and tip-ladder thresholds for the
/// realtime engine (§4.8).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RealtimeConfig {
    pub buffer_seconds: f64,
    pub min_snr_window_s: f64,
    pub hr_window_s: f64,
    pub queue_capacity: usize,
    pub saturation_threshold_pct: f64,
    pub motion_threshold_px: f64,
    pub low_snr_threshold_db: f64,
    pub hr_mismatch_threshold_bpm: f64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            buffer_seconds: 20.0,
            min_snr_window_s: 4.0,
            hr_window_s: 10.0,
            queue_capacity: 60,
            saturation_threshold_pct: 0.15,
            motion_threshold_px: 1.0,
            low_snr_threshold_db: 6.0,
            hr_mismatch_threshold_bpm: 10.0,
        }
    }
}

/// Vascular trend store parameters (§4.9).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendConfig {
    pub window_size: usize,
    pub min_baseline: usize,
    pub ptt_confidence_threshold_pct: f64,
    pub combined_sqi_threshold: f64,
    pub z_clip: f64,
    pub index_midpoint: f64,
    pub index_scale: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            min_baseline: 5,
            ptt_confidence_threshold_pct: 70.0,
            combined_sqi_threshold: 70.0,
            z_clip: 2.0,
            index_midpoint: 50.0,
            index_scale: 12.5,
        }
    }
}
