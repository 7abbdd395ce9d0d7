//! Data model (§3). Every entity here is a plain, serde-derived struct; the
//! only place domain invariants are enforced is at construction sites in the
//! owning module (resample, pipeline, ptt, ...), not via custom types.

use serde::{Deserialize, Serialize};

/// A single timestamped scalar reading from one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimestampedSample {
    /// Monotonic capture timestamp, nanoseconds.
    pub timestamp_ns: i64,
    pub value: f64,
}

/// Raw face/finger luma streams for one session, as handed to the pipeline.
#[derive(Debug, Clone, Default)]
pub struct RawSeriesBuffer {
    pub face: Vec<TimestampedSample>,
    pub finger: Vec<TimestampedSample>,
}

/// Uniformly sampled, band-passed, z-scored dual-channel output of the
/// signal pipeline (§4.3). Immutable once produced.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedSeries {
    pub time_ms: Vec<f64>,
    pub face: Vec<f64>,
    pub finger: Vec<f64>,
    pub sample_rate_hz: f64,
    pub is_valid: bool,
    pub drift_ms_per_s: f64,
}

impl ProcessedSeries {
    /// An invalid, empty series, produced on `INSUFFICIENT_DATA` /
    /// `UNSTABLE_SIGNAL` per §7's short-circuit propagation policy.
    pub fn invalid(sample_rate_hz: f64, drift_ms_per_s: f64) -> Self {
        Self {
            time_ms: Vec::new(),
            face: Vec::new(),
            finger: Vec::new(),
            sample_rate_hz,
            is_valid: false,
            drift_ms_per_s,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.time_ms.len()
    }
}

/// PTT quality label (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PttQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    Unknown,
}

/// Pulse transit time result for one analysis window set (§4.6).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PttResult {
    pub lag_ms: f64,
    pub corr_score: f64,
    pub stability_sd_ms: f64,
    pub confidence_pct: f64,
    pub quality: PttQuality,
}

impl PttResult {
    pub fn unknown() -> Self {
        Self {
            lag_ms: 0.0,
            corr_score: 0.0,
            stability_sd_ms: 0.0,
            confidence_pct: 0.0,
            quality: PttQuality::Unknown,
        }
    }
}

/// Which site a channel-specific quantity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Face,
    Finger,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Face => "face",
            Channel::Finger => "finger",
        }
    }
}

/// Inputs to per-channel SQI scoring (§4.5).
#[derive(Debug, Clone, Copy, Default)]
pub struct SqiInputs {
    pub snr_db: f64,
    pub motion_px: f64,
    pub saturation_pct: f64,
    pub imu_g: f64,
}

/// A detected pulse peak and its derived descriptors (§4.4, glossary: rise
/// time, reflection ratio).
#[derive(Debug, Clone, Copy)]
pub struct Peak {
    pub index: usize,
    pub value: f64,
    /// Sharpness = (peak - trough) / FWHM-in-samples.
    pub sharpness: f64,
    pub fwhm_ms: f64,
    /// Time from the pulse foot (preceding trough) to this peak.
    pub rise_ms: f64,
    /// Secondary (dicrotic) wave amplitude over primary peak amplitude, both
    /// measured above the foot trough. Zero when no secondary wave is found.
    pub refl_ratio: f64,
}

/// Output of the peak detector: indices plus instantaneous HR track.
#[derive(Debug, Clone, Default)]
pub struct PeakDetectionResult {
    pub peaks: Vec<Peak>,
    /// Instantaneous HR (bpm) aligned to `peaks[1..]` (one fewer than peak count).
    pub instantaneous_hr_bpm: Vec<f64>,
}

/// One external capture sample, aligned across both channels (§6).
#[derive(Debug, Clone, Copy)]
pub struct SignalSample {
    pub timestamp_ns: i64,
    pub face_mean_luma: f64,
    pub finger_mean_luma: f64,
    pub face_motion_rms_px: f64,
    pub finger_saturation_pct: f64,
    pub torch_enabled: bool,
}

/// Optional IMU trace aligned to the same clock as `SignalSample` (§6).
#[derive(Debug, Clone, Default)]
pub struct ImuTrace {
    pub timestamps_ns: Vec<i64>,
    pub accel_rms_g: Vec<f64>,
}

impl ImuTrace {
    /// RMS of `accel_rms_g` samples falling within `[t0_ms, t1_ms]`, the
    /// scalar form §4.5's IMU penalty term and `SqiInputs::imu_g` expect.
    /// Used by callers that have a raw IMU trace instead of an
    /// already-aggregated session scalar. Zero when no samples fall in range.
    pub fn rms_in_window(&self, t0_ms: f64, t1_ms: f64) -> f64 {
        let mut sum_sq = 0.0;
        let mut count = 0usize;
        for (&ts_ns, &g) in self.timestamps_ns.iter().zip(self.accel_rms_g.iter()) {
            let ts_ms = ts_ns as f64 / 1_000_000.0;
            if ts_ms >= t0_ms && ts_ms <= t1_ms {
                sum_sq += g * g;
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            (sum_sq / count as f64).sqrt()
        }
    }
}

/// Live, ring-buffer-derived quality snapshot (§4.8 / §3).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RealTimeQualityState {
    pub face_snr_db: Option<f64>,
    pub finger_snr_db: Option<f64>,
    pub face_motion_rms_px: f64,
    pub finger_saturation_pct: f64,
    pub hr_agreement_delta_bpm: Option<f64>,
    pub tip: QualityTip,
    pub updated_at_ms: i64,
}

/// Deterministic priority-ladder tip (§4.8), a closed enum rather than a
/// free-form string so the UI layer can localize it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QualityTip {
    HoldStill,
    PressFirmer,
    ImproveLighting,
    HrMismatch,
    Ok,
    WarmingUp,
}

/// A time segment where both channels meet every good-sync gate (§4.7).
#[derive(Debug, Clone, Serialize)]
pub struct ExportSegment {
    pub start_s: f64,
    pub end_s: f64,
    pub ptt: PttResult,
    pub corr: f64,
    pub sqi_face: f64,
    pub sqi_finger: f64,
    /// Optional extension point for exporter-specific metadata and harmonic
    /// summaries (§6). A closed enum rather than an open string-keyed map, so
    /// a caller can match on the known variants and still round-trip a
    /// forward-compatible payload through `Unknown`.
    pub extra: Vec<(String, ExportExtra)>,
}

impl ExportSegment {
    pub fn duration_s(&self) -> f64 {
        self.end_s - self.start_s
    }
}

/// A single exporter-facing metadata value attached to an [`ExportSegment`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "value")]
pub enum ExportExtra {
    Number(f64),
    Text(String),
    Flag(bool),
    /// A value this core doesn't model explicitly, preserved verbatim so an
    /// exporter can still see a newer producer's fields.
    Unknown { label: String, json: String },
}

/// Entry appended to the rolling vascular-trend window (§4.9). Field names
/// match the persisted JSON schema exactly (`t`/`ptt`/`rise`/`refl`), so this
/// one struct is both the in-memory and on-disk representation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VascularTrendEntry {
    #[serde(rename = "t")]
    pub timestamp_ms: i64,
    pub ptt: f64,
    pub rise: f64,
    pub refl: f64,
}

impl VascularTrendEntry {
    pub fn is_finite(&self) -> bool {
        self.ptt.is_finite() && self.rise.is_finite() && self.refl.is_finite()
    }
}

/// Per-session vascular trend summary (§4.9).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct VascularTrendSummary {
    pub index: f64,
    pub delta_ptt_ms: f64,
    pub delta_rise_ms: f64,
    pub delta_refl_ratio: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imu_rms_in_window_ignores_samples_outside_range() {
        let trace = ImuTrace {
            timestamps_ns: vec![0, 1_000_000_000, 2_000_000_000],
            accel_rms_g: vec![0.10, 0.20, 100.0],
        };
        let rms = trace.rms_in_window(0.0, 1500.0);
        let expected = ((0.10f64.powi(2) + 0.20f64.powi(2)) / 2.0).sqrt();
        assert!((rms - expected).abs() < 1e-9);
    }

    #[test]
    fn imu_rms_in_window_is_zero_without_overlap() {
        let trace = ImuTrace {
            timestamps_ns: vec![0, 1_000_000_000],
            accel_rms_g: vec![0.5, 0.5],
        };
        assert_eq!(trace.rms_in_window(5_000.0, 6_000.0), 0.0);
    }
}
