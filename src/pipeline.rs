//! Signal pipeline (§4.3): resample -> band-pass -> detrend -> z-score.
//! Pure function, no shared state; the only side effect is logging.

use crate::cancel::CancellationToken;
use crate::config::PipelineConfig;
use crate::dsp;
use crate::error::{CoreError, CoreResult};
use crate::resample;
use crate::types::{ProcessedSeries, RawSeriesBuffer};

/// Run the full pipeline on `raw`, producing a [`ProcessedSeries`].
///
/// Per §7's propagation policy, `INSUFFICIENT_DATA` and `UNSTABLE_SIGNAL`
/// never surface as an `Err` here: they short-circuit to an invalid,
/// zero-length `ProcessedSeries` instead. Only malformed input (caught
/// upstream in [`resample::resample`] as `INVALID_INPUT`) or cancellation
/// propagate as errors.
pub fn process(
    raw: &RawSeriesBuffer,
    fs_out: f64,
    config: &PipelineConfig,
    cancel: &CancellationToken,
) -> CoreResult<ProcessedSeries> {
    let uniform = match resample::resample(&raw.face, &raw.finger, fs_out) {
        Ok(u) => u,
        Err(CoreError::InsufficientData { .. }) => {
            log::warn!("pipeline: resample reported insufficient overlap, emitting invalid series");
            return Ok(ProcessedSeries::invalid(fs_out, 0.0));
        }
        Err(other) => return Err(other),
    };

    if cancel.is_cancelled() {
        return Err(CoreError::Cancelled);
    }

    let overlap_s = uniform.time_ms.len() as f64 / uniform.sample_rate_hz;
    if overlap_s < config.min_overlap_s {
        log::warn!(
            "pipeline: overlap {overlap_s:.2}s below minimum {:.2}s, emitting invalid series",
            config.min_overlap_s
        );
        return Ok(ProcessedSeries::invalid(fs_out, uniform.drift_ms_per_s));
    }

    // Face and finger channels are independent through band-pass, detrend and
    // z-score, so run the two band-pass filters side by side instead of
    // sequentially.
    let (face_filtered, finger_filtered) = rayon::join(
        || {
            dsp::butter_bandpass(
                &uniform.face,
                uniform.sample_rate_hz,
                config.band_low_hz,
                config.band_high_hz,
                config.filter_order,
                config.min_overlap_s,
            )
        },
        || {
            dsp::butter_bandpass(
                &uniform.finger,
                uniform.sample_rate_hz,
                config.band_low_hz,
                config.band_high_hz,
                config.filter_order,
                config.min_overlap_s,
            )
        },
    );

    if cancel.is_cancelled() {
        return Err(CoreError::Cancelled);
    }

    let face_detrended = dsp::linear_detrend(&face_filtered);
    let finger_detrended = dsp::linear_detrend(&finger_filtered);

    let face_z = dsp::zscore(&face_detrended);
    let finger_z = dsp::zscore(&finger_detrended);

    let face_std = sample_std(&face_z);
    let finger_std = sample_std(&finger_z);
    let is_valid = face_std.is_finite() && finger_std.is_finite() && face_std > 1e-9 && finger_std > 1e-9;

    if !is_valid {
        let (channel, std) = if face_std <= finger_std { ("face", face_std) } else { ("finger", finger_std) };
        let unstable = CoreError::UnstableSignal { channel, std };
        log::warn!("pipeline: {unstable}");
    }

    Ok(ProcessedSeries {
        time_ms: uniform.time_ms,
        face: face_z,
        finger: finger_z,
        sample_rate_hz: uniform.sample_rate_hz,
        is_valid,
        drift_ms_per_s: uniform.drift_ms_per_s,
    })
}

fn sample_std(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    let n = signal.len() as f64;
    let mean = signal.iter().sum::<f64>() / n;
    (signal.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{self, SimConfig};

    #[test]
    fn valid_session_zscores_both_channels() {
        // (P2)
        let sim_cfg = SimConfig {
            hr_bpm: 72.0,
            ptt_ms: 120.0,
            noise_level: 0.02,
            fs_hz: 100.0,
            duration_s: 30.0,
            drift_ms_per_s: 0.0,
            seed: 1,
        };
        let raw = sim::generate(&sim_cfg);
        let out = process(&raw, 100.0, &PipelineConfig::default(), &CancellationToken::new())
            .expect("pipeline ok");
        assert!(out.is_valid);

        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
        let std = |v: &[f64]| {
            let m = mean(v);
            (v.iter().map(|x| (x - m).powi(2)).sum::<f64>() / v.len() as f64).sqrt()
        };
        assert!(mean(&out.face).abs() < 1e-2);
        assert!(mean(&out.finger).abs() < 1e-2);
        assert!((std(&out.face) - 1.0).abs() < 0.01);
        assert!((std(&out.finger) - 1.0).abs() < 0.01);
    }

    #[test]
    fn short_session_is_invalid_not_an_error() {
        let sim_cfg = SimConfig {
            hr_bpm: 72.0,
            ptt_ms: 100.0,
            noise_level: 0.0,
            fs_hz: 100.0,
            duration_s: 2.0,
            drift_ms_per_s: 0.0,
            seed: 2,
        };
        let raw = sim::generate(&sim_cfg);
        let out = process(&raw, 100.0, &PipelineConfig::default(), &CancellationToken::new())
            .expect("pipeline does not error on insufficient data");
        assert!(!out.is_valid);
        assert_eq!(out.sample_count(), 0);
    }

    #[test]
    fn cancellation_short_circuits() {
        let sim_cfg = SimConfig {
            hr_bpm: 72.0,
            ptt_ms: 100.0,
            noise_level: 0.0,
            fs_hz: 100.0,
            duration_s: 30.0,
            drift_ms_per_s: 0.0,
            seed: 3,
        };
        let raw = sim::generate(&sim_cfg);
        let token = CancellationToken::new();
        token.cancel();
        let result = process(&raw, 100.0, &PipelineConfig::default(), &token);
        assert!(matches!(result, Err(CoreError::Cancelled)));
    }
}
