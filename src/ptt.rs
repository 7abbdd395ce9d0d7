//! PTT calculator (§4.6): sliding-window cross-correlation between the two
//! processed channels, sub-sample lag refinement, and a confidence model
//! combining correlation strength, channel SQI and pulse sharpness.

use crate::config::PttConfig;
use crate::dsp;
use crate::peaks;
use crate::types::{PttQuality, PttResult, ProcessedSeries};

/// Session-level channel quality scores (0-100), computed upstream by
/// [`crate::sqi`] from raw capture metrics and fed in explicitly rather than
/// recomputed here.
#[derive(Debug, Clone, Copy)]
pub struct SqiSummary {
    pub face: f64,
    pub finger: f64,
}

/// Compute PTT for a full processed session (§4.6). Never errors: on
/// insufficient windows this returns `quality = UNKNOWN` with zero
/// confidence, per §7's propagation policy.
pub fn compute(series: &ProcessedSeries, sqi: SqiSummary, config: &PttConfig) -> PttResult {
    if !series.is_valid || series.sample_count() == 0 {
        return PttResult::unknown();
    }

    let fs = series.sample_rate_hz;
    let window_samples = (config.window_s * fs).round().max(1.0) as usize;
    let num_windows = series.face.len() / window_samples;

    if num_windows < config.min_windows {
        let reason = crate::error::CoreError::InsufficientWindows { have: num_windows, need: config.min_windows };
        log::warn!("ptt: {reason}, reporting UNKNOWN");
        return PttResult::unknown();
    }

    let max_lag_samples = (config.max_lag_ms / 1000.0 * fs).round().max(1.0) as usize;

    struct WindowResult {
        index: usize,
        lag_ms: f64,
        corr: f64,
        sharpness: f64,
    }

    let mut windows = Vec::with_capacity(num_windows);
    for w in 0..num_windows {
        let start = w * window_samples;
        let end = start + window_samples;
        let face_win = &series.face[start..end];
        let finger_win = &series.finger[start..end];

        let Some(peak) = dsp::cross_correlate(face_win, finger_win, max_lag_samples) else {
            continue;
        };
        let lag_ms = peak.lag_samples / fs * 1000.0;

        let face_peaks = peaks::detect_peaks(face_win, fs);
        let sharpness = if face_peaks.peaks.is_empty() {
            0.0
        } else {
            face_peaks.peaks.iter().map(|p| p.sharpness).sum::<f64>() / face_peaks.peaks.len() as f64
        };

        windows.push(WindowResult {
            index: w,
            lag_ms,
            corr: peak.corr,
            sharpness,
        });
    }

    if windows.len() < config.min_windows {
        log::warn!("ptt: too few windows produced a cross-correlation peak, reporting UNKNOWN");
        return PttResult::unknown();
    }

    let lag_ms = median_earliest_tie(windows.iter().map(|w| (w.index, w.lag_ms)).collect());
    let corr_score = median_earliest_tie(windows.iter().map(|w| (w.index, w.corr)).collect());
    let stability_sd_ms = sample_sd(&windows.iter().map(|w| w.lag_ms).collect::<Vec<_>>());
    let avg_sharpness = windows.iter().map(|w| w.sharpness).sum::<f64>() / windows.len() as f64;

    let f_corr = ((corr_score - config.corr_floor) / config.corr_span).clamp(0.0, 1.0);
    let g_sharp = (avg_sharpness / config.sharpness_scale).clamp(0.0, 1.0);
    let confidence = 100.0
        * config.confidence_corr_weight_w1
        * (sqi.face / 100.0)
        * config.confidence_corr_weight_w2
        * (sqi.finger / 100.0)
        * f_corr
        * g_sharp;
    let confidence = confidence.clamp(0.0, 100.0);

    let all_outside_plausible_range = windows.iter().all(|w| {
        w.lag_ms < config.plausible_lag_range_ms.0 || w.lag_ms > config.plausible_lag_range_ms.1
    });

    let mut quality = quality_from_confidence(confidence, config);
    if all_outside_plausible_range && quality_rank(quality) > quality_rank(PttQuality::Fair) {
        quality = PttQuality::Fair;
    }

    PttResult {
        lag_ms: lag_ms.clamp(-config.max_lag_ms, config.max_lag_ms),
        corr_score: corr_score.clamp(-1.0, 1.0),
        stability_sd_ms,
        confidence_pct: confidence,
        quality,
    }
}

/// §3 invariant: `confidence_pct == 0` iff `quality == UNKNOWN`. The
/// confidence model can legitimately compute an exact zero (e.g. `f(c) == 0`
/// when correlation never clears `corr_floor`), which must report the same
/// label as the early `PttResult::unknown()` returns above.
pub(crate) fn quality_from_confidence(confidence: f64, config: &PttConfig) -> PttQuality {
    if confidence <= 0.0 {
        PttQuality::Unknown
    } else if confidence >= config.excellent_threshold {
        PttQuality::Excellent
    } else if confidence >= config.good_threshold {
        PttQuality::Good
    } else if confidence >= config.fair_threshold {
        PttQuality::Fair
    } else {
        PttQuality::Poor
    }
}

/// Ordering used only to compare quality labels for the "cap at FAIR" edge
/// policy; higher rank means better quality.
fn quality_rank(q: PttQuality) -> u8 {
    match q {
        PttQuality::Unknown => 0,
        PttQuality::Poor => 1,
        PttQuality::Fair => 2,
        PttQuality::Good => 3,
        PttQuality::Excellent => 4,
    }
}

fn sample_sd(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Median of `(window_index, value)` pairs; for an even count, break the tie
/// between the two middle candidates by keeping the earlier window's value
/// (§4.6: "Ties in median broken by earlier window").
fn median_earliest_tie(mut pairs: Vec<(usize, f64)>) -> f64 {
    pairs.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    let n = pairs.len();
    if n % 2 == 1 {
        pairs[n / 2].1
    } else {
        let a = pairs[n / 2 - 1];
        let b = pairs[n / 2];
        if a.0 <= b.0 { a.1 } else { b.1 }
    }
}
