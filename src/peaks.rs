//! Peak detector (§4.4): local maxima with a minimum-distance refractory
//! window and a prominence floor, plus derived instantaneous HR and
//! per-peak sharpness.

use crate::types::{Peak, PeakDetectionResult};

/// Standard deviations above the mean a candidate must clear (§4.4 default).
pub const PROMINENCE_K: f64 = 0.3;
/// Refractory window as a fraction of a second (150 bpm ceiling).
pub const REFRACTORY_S: f64 = 0.4;

/// Detect peaks in a uniformly sampled signal at `fs` Hz.
pub fn detect_peaks(signal: &[f64], fs: f64) -> PeakDetectionResult {
    if signal.len() < 3 {
        return PeakDetectionResult::default();
    }

    let n = signal.len() as f64;
    let mean = signal.iter().sum::<f64>() / n;
    let std = (signal.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();
    let threshold = mean + PROMINENCE_K * std;
    let refractory = (fs * REFRACTORY_S).round().max(1.0) as usize;

    let mut accepted_indices: Vec<usize> = Vec::new();
    let mut last_accepted: Option<usize> = None;

    for i in 1..signal.len() - 1 {
        let is_local_max = signal[i] > signal[i - 1] && signal[i] > signal[i + 1];
        if !is_local_max || signal[i] < threshold {
            continue;
        }
        if let Some(last) = last_accepted {
            if i - last < refractory {
                // Ties / close candidates resolve to the earlier index.
                continue;
            }
        }
        accepted_indices.push(i);
        last_accepted = Some(i);
    }

    let peaks: Vec<Peak> = accepted_indices
        .iter()
        .enumerate()
        .map(|(pos, &i)| {
            let morphology = trough_and_fwhm(signal, i);
            let sharpness = if morphology.fwhm_samples > 0.0 {
                (signal[i] - morphology.trough_min) / morphology.fwhm_samples
            } else {
                0.0
            };
            let rise_samples = (i - morphology.left_trough_idx) as f64;
            // Bound the dicrotic-wave search by the onset of the next pulse
            // (or the end of the signal), so a smoothly descending cycle
            // never mistakes the following pulse's rise for a secondary wave.
            let cycle_end = accepted_indices
                .get(pos + 1)
                .copied()
                .unwrap_or(signal.len() - 1);
            let refl_ratio = reflection_ratio(signal, i, cycle_end, &morphology);
            Peak {
                index: i,
                value: signal[i],
                sharpness,
                fwhm_ms: morphology.fwhm_samples / fs * 1000.0,
                rise_ms: rise_samples / fs * 1000.0,
                refl_ratio,
            }
        })
        .collect();

    let instantaneous_hr_bpm: Vec<f64> = peaks
        .windows(2)
        .map(|pair| {
            let interval_s = (pair[1].index - pair[0].index) as f64 / fs;
            if interval_s > 0.0 { 60.0 / interval_s } else { 0.0 }
        })
        .collect();

    PeakDetectionResult {
        peaks,
        instantaneous_hr_bpm,
    }
}

/// Troughs flanking a detected peak plus its full-width at half-maximum, in
/// samples. Shared by sharpness, rise time and reflection-ratio derivation.
struct PeakMorphology {
    left_trough_idx: usize,
    right_trough_idx: usize,
    trough_min: f64,
    fwhm_samples: f64,
}

/// Find the nearest local minima flanking `peak_idx` and the full-width at
/// half-maximum (in samples) measured against the lower of the two troughs.
fn trough_and_fwhm(signal: &[f64], peak_idx: usize) -> PeakMorphology {
    let left_trough_idx = {
        let mut j = peak_idx;
        while j > 0 && signal[j - 1] <= signal[j] {
            j -= 1;
        }
        j
    };
    let right_trough_idx = {
        let mut j = peak_idx;
        while j < signal.len() - 1 && signal[j + 1] <= signal[j] {
            j += 1;
        }
        j
    };

    let trough_min = signal[left_trough_idx].min(signal[right_trough_idx]);
    let half = trough_min + (signal[peak_idx] - trough_min) / 2.0;

    let mut left_half = peak_idx;
    while left_half > left_trough_idx && signal[left_half] >= half {
        left_half -= 1;
    }
    let mut right_half = peak_idx;
    while right_half < right_trough_idx && signal[right_half] >= half {
        right_half += 1;
    }

    let fwhm_samples = (right_half.saturating_sub(left_half)).max(1) as f64;
    PeakMorphology {
        left_trough_idx,
        right_trough_idx,
        trough_min,
        fwhm_samples,
    }
}

/// Ratio of a secondary (dicrotic) wave's amplitude to the primary peak's,
/// both measured above the foot trough. A dicrotic notch sits close behind
/// the primary peak, so `trough_and_fwhm`'s "first local minimum" walk stops
/// there rather than at the true pulse foot; this instead scans out to
/// `cycle_end` (the onset of the next detected pulse, or the signal's end)
/// so a plain descending cycle is never mistaken for a dicrotic rebound.
/// Returns 0 when no secondary wave is found.
fn reflection_ratio(signal: &[f64], peak_idx: usize, cycle_end: usize, morphology: &PeakMorphology) -> f64 {
    let primary_amplitude = signal[peak_idx] - morphology.trough_min;
    if primary_amplitude <= 1e-12 || cycle_end <= peak_idx {
        return 0.0;
    }

    // Dicrotic notch: the first local minimum walking forward from the peak.
    let mut notch_idx = peak_idx;
    while notch_idx < cycle_end && signal[notch_idx + 1] <= signal[notch_idx] {
        notch_idx += 1;
    }
    if notch_idx >= cycle_end {
        return 0.0;
    }

    // Secondary wave: the highest point between the notch and the cycle bound.
    let mut secondary_idx = notch_idx;
    for i in notch_idx..=cycle_end {
        if signal[i] > signal[secondary_idx] {
            secondary_idx = i;
        }
    }
    if secondary_idx == notch_idx || secondary_idx == cycle_end {
        return 0.0;
    }

    let secondary_amplitude = (signal[secondary_idx] - morphology.trough_min).max(0.0);
    (secondary_amplitude / primary_amplitude).clamp(0.0, 1.0)
}

/// Average rise time and reflection ratio across all detected peaks in a
/// session, the per-session scalars the vascular trend store standardises
/// against its rolling baseline (§4.9, glossary). Returns `None` when no
/// peaks were detected.
pub fn average_morphology(result: &PeakDetectionResult) -> Option<(f64, f64)> {
    if result.peaks.is_empty() {
        return None;
    }
    let n = result.peaks.len() as f64;
    let rise_ms = result.peaks.iter().map(|p| p.rise_ms).sum::<f64>() / n;
    let refl_ratio = result.peaks.iter().map(|p| p.refl_ratio).sum::<f64>() / n;
    Some((rise_ms, refl_ratio))
}
