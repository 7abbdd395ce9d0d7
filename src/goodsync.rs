//! Good-sync segment detector (§4.7): a sliding-window multi-gate scan that
//! marks the stretches of a session where both channels are simultaneously
//! clean enough, and well enough correlated, to trust a windowed PTT
//! estimate. Adjacent admitted windows are merged into contiguous segments.

use crate::config::{GoodSyncGates, PttConfig, SqiWeights};
use crate::dsp;
use crate::error::{CoreError, CoreResult, InvalidInputError};
use crate::peaks;
use crate::sqi;
use crate::types::{ExportSegment, ProcessedSeries, SqiInputs};

/// Per-sample auxiliary capture metrics aligned to a [`ProcessedSeries`].
/// These never go through the band-pass/z-score pipeline; they are raw
/// per-frame statistics the caller collects alongside the luma samples.
pub struct AuxMetrics<'a> {
    pub face_motion_px: &'a [f64],
    pub finger_saturation_pct: &'a [f64],
}

/// Scan `series` for good-sync windows and return the merged segments,
/// ordered by `start_s` (§4.7).
///
/// `aux`'s two arrays must be aligned sample-for-sample with `series` (same
/// length); a mismatch is `INVALID_INPUT` rather than an out-of-bounds
/// panic, per §7.
pub fn scan(
    series: &ProcessedSeries,
    aux: &AuxMetrics,
    gates: &GoodSyncGates,
    ptt_config: &PttConfig,
    sqi_weights: &SqiWeights,
) -> CoreResult<Vec<ExportSegment>> {
    if !series.is_valid || series.sample_count() == 0 {
        return Ok(Vec::new());
    }
    let n = series.sample_count();
    if aux.face_motion_px.len() != n {
        return Err(CoreError::InvalidInput(InvalidInputError::MismatchedLengths {
            name_a: "series",
            len_a: n,
            name_b: "aux.face_motion_px",
            len_b: aux.face_motion_px.len(),
        }));
    }
    if aux.finger_saturation_pct.len() != n {
        return Err(CoreError::InvalidInput(InvalidInputError::MismatchedLengths {
            name_a: "series",
            len_a: n,
            name_b: "aux.finger_saturation_pct",
            len_b: aux.finger_saturation_pct.len(),
        }));
    }

    let fs = series.sample_rate_hz;
    let window_samples = (gates.window_s * fs).round().max(1.0) as usize;
    if window_samples == 0 || series.face.len() < window_samples {
        return Ok(Vec::new());
    }
    let step = ((window_samples as f64) * (1.0 - gates.overlap_fraction))
        .round()
        .max(1.0) as usize;
    let max_lag_samples = (ptt_config.max_lag_ms / 1000.0 * fs).round().max(1.0) as usize;

    let mut admitted: Vec<(usize, usize, AdmittedWindow)> = Vec::new();
    let mut start = 0;
    while start + window_samples <= series.face.len() {
        let end = start + window_samples;
        if let Some(w) = evaluate_window(series, aux, start, end, fs, max_lag_samples, gates, sqi_weights) {
            admitted.push((start, end, w));
        }
        start += step;
    }

    Ok(merge_adjacent(&admitted, series, ptt_config, max_lag_samples, gates))
}

struct AdmittedWindow {
    corr: f64,
    sqi_face: f64,
    sqi_finger: f64,
}

fn evaluate_window(
    series: &ProcessedSeries,
    aux: &AuxMetrics,
    start: usize,
    end: usize,
    fs: f64,
    max_lag_samples: usize,
    gates: &GoodSyncGates,
    sqi_weights: &SqiWeights,
) -> Option<AdmittedWindow> {
    let face_seg = &series.face[start..end];
    let finger_seg = &series.finger[start..end];

    let avg_motion = mean(&aux.face_motion_px[start..end]);
    let avg_saturation = mean(&aux.finger_saturation_pct[start..end]);

    let sqi_face = sqi::face_sqi(
        SqiInputs {
            snr_db: dsp::snr_db(face_seg, fs),
            motion_px: avg_motion,
            saturation_pct: 0.0,
            imu_g: 0.0,
        },
        sqi_weights,
    );
    let sqi_finger = sqi::finger_sqi(
        SqiInputs {
            snr_db: dsp::snr_db(finger_seg, fs),
            motion_px: 0.0,
            saturation_pct: avg_saturation,
            imu_g: 0.0,
        },
        sqi_weights,
    );

    let peak = dsp::cross_correlate(face_seg, finger_seg, max_lag_samples)?;
    let face_peaks = peaks::detect_peaks(face_seg, fs);
    let avg_fwhm_ms = if face_peaks.peaks.is_empty() {
        f64::INFINITY
    } else {
        face_peaks.peaks.iter().map(|p| p.fwhm_ms).sum::<f64>() / face_peaks.peaks.len() as f64
    };

    let admits = sqi_face >= gates.min_sqi
        && sqi_finger >= gates.min_sqi
        && avg_motion <= gates.max_motion_px
        && avg_saturation <= gates.max_saturation_pct
        && peak.corr >= gates.min_corr
        && avg_fwhm_ms <= gates.max_fwhm_ms;

    admits.then_some(AdmittedWindow {
        corr: peak.corr,
        sqi_face,
        sqi_finger,
    })
}

/// Merge windows whose sample ranges touch or overlap into contiguous
/// segments, dropping any shorter than `min_segment_duration_s`, and
/// recompute one PTT estimate per merged segment (§4.7).
fn merge_adjacent(
    admitted: &[(usize, usize, AdmittedWindow)],
    series: &ProcessedSeries,
    ptt_config: &PttConfig,
    max_lag_samples: usize,
    gates: &GoodSyncGates,
) -> Vec<ExportSegment> {
    if admitted.is_empty() {
        return Vec::new();
    }
    let fs = series.sample_rate_hz;
    let mut segments = Vec::new();

    let mut run_start = admitted[0].0;
    let mut run_end = admitted[0].1;
    let mut run_members: Vec<&AdmittedWindow> = vec![&admitted[0].2];

    for (start, end, w) in &admitted[1..] {
        if *start <= run_end {
            run_end = run_end.max(*end);
            run_members.push(w);
        } else {
            segments.push(finalize_segment(
                run_start,
                run_end,
                &run_members,
                series,
                ptt_config,
                max_lag_samples,
                fs,
            ));
            run_start = *start;
            run_end = *end;
            run_members = vec![w];
        }
    }
    segments.push(finalize_segment(
        run_start,
        run_end,
        &run_members,
        series,
        ptt_config,
        max_lag_samples,
        fs,
    ));

    segments
        .into_iter()
        .filter(|s| s.duration_s() >= gates.min_segment_duration_s)
        .collect()
}

fn finalize_segment(
    start: usize,
    end: usize,
    members: &[&AdmittedWindow],
    series: &ProcessedSeries,
    ptt_config: &PttConfig,
    max_lag_samples: usize,
    fs: f64,
) -> ExportSegment {
    let face_seg = &series.face[start..end];
    let finger_seg = &series.finger[start..end];
    let peak = dsp::cross_correlate(face_seg, finger_seg, max_lag_samples);

    let avg_corr = members.iter().map(|w| w.corr).sum::<f64>() / members.len() as f64;
    let avg_sqi_face = members.iter().map(|w| w.sqi_face).sum::<f64>() / members.len() as f64;
    let avg_sqi_finger = members.iter().map(|w| w.sqi_finger).sum::<f64>() / members.len() as f64;

    let ptt = match peak {
        Some(p) => {
            let lag_ms = p.lag_samples / fs * 1000.0;
            let f_corr = ((p.corr - ptt_config.corr_floor) / ptt_config.corr_span).clamp(0.0, 1.0);
            let confidence = (100.0
                * ptt_config.confidence_corr_weight_w1
                * (avg_sqi_face / 100.0)
                * ptt_config.confidence_corr_weight_w2
                * (avg_sqi_finger / 100.0)
                * f_corr)
                .clamp(0.0, 100.0);
            let quality = crate::ptt::quality_from_confidence(confidence, ptt_config);
            crate::types::PttResult {
                lag_ms,
                corr_score: p.corr,
                stability_sd_ms: 0.0,
                confidence_pct: confidence,
                quality,
            }
        }
        None => crate::types::PttResult::unknown(),
    };

    ExportSegment {
        start_s: start as f64 / fs,
        end_s: end as f64 / fs,
        ptt,
        corr: avg_corr,
        sqi_face: avg_sqi_face,
        sqi_finger: avg_sqi_finger,
        extra: Vec::new(),
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::config::PipelineConfig;
    use crate::pipeline;
    use crate::sim::{self, SimConfig};

    #[test]
    fn clean_session_yields_segments_covering_most_of_the_recording() {
        let sim_cfg = SimConfig {
            hr_bpm: 72.0,
            ptt_ms: 120.0,
            noise_level: 0.01,
            fs_hz: 100.0,
            duration_s: 60.0,
            drift_ms_per_s: 0.0,
            seed: 21,
        };
        let raw = sim::generate(&sim_cfg);
        let series = pipeline::process(
            &raw,
            100.0,
            &PipelineConfig::default(),
            &CancellationToken::new(),
        )
        .expect("pipeline ok");

        let n = series.sample_count();
        let aux = AuxMetrics {
            face_motion_px: &vec![0.0; n],
            finger_saturation_pct: &vec![0.0; n],
        };
        let segments = scan(
            &series,
            &aux,
            &GoodSyncGates::default(),
            &PttConfig::default(),
            &crate::config::SqiWeights::default(),
        )
        .expect("aligned aux arrays scan ok");
        assert!(!segments.is_empty(), "expected at least one good-sync segment");
        let total: f64 = segments.iter().map(|s| s.duration_s()).sum();
        assert!(total >= 30.0, "covered only {total}s of a 60s clean session");
    }

    #[test]
    fn excessive_motion_rejects_every_window() {
        // (Scenario 4)
        let sim_cfg = SimConfig {
            hr_bpm: 72.0,
            ptt_ms: 120.0,
            noise_level: 0.01,
            fs_hz: 100.0,
            duration_s: 60.0,
            drift_ms_per_s: 0.0,
            seed: 22,
        };
        let raw = sim::generate(&sim_cfg);
        let series = pipeline::process(
            &raw,
            100.0,
            &PipelineConfig::default(),
            &CancellationToken::new(),
        )
        .expect("pipeline ok");

        let n = series.sample_count();
        let aux = AuxMetrics {
            face_motion_px: &vec![5.0; n], // well above the 1.0px gate
            finger_saturation_pct: &vec![0.0; n],
        };
        let segments = scan(
            &series,
            &aux,
            &GoodSyncGates::default(),
            &PttConfig::default(),
            &crate::config::SqiWeights::default(),
        )
        .expect("scan ok even when every window is rejected");
        assert!(segments.is_empty());
    }

    #[test]
    fn mismatched_aux_length_is_invalid_input() {
        let sim_cfg = SimConfig {
            duration_s: 30.0,
            ..SimConfig::default()
        };
        let raw = sim::generate(&sim_cfg);
        let series = pipeline::process(
            &raw,
            100.0,
            &PipelineConfig::default(),
            &CancellationToken::new(),
        )
        .expect("pipeline ok");

        let aux = AuxMetrics {
            face_motion_px: &vec![0.0; series.sample_count() - 1],
            finger_saturation_pct: &vec![0.0; series.sample_count()],
        };
        let result = scan(
            &series,
            &aux,
            &GoodSyncGates::default(),
            &PttConfig::default(),
            &crate::config::SqiWeights::default(),
        );
        assert!(matches!(
            result,
            Err(CoreError::InvalidInput(InvalidInputError::MismatchedLengths { .. }))
        ));
    }

    #[test]
    fn empty_series_yields_no_segments() {
        let series = crate::types::ProcessedSeries::invalid(100.0, 0.0);
        let aux = AuxMetrics {
            face_motion_px: &[],
            finger_saturation_pct: &[],
        };
        let segments = scan(
            &series,
            &aux,
            &GoodSyncGates::default(),
            &PttConfig::default(),
            &crate::config::SqiWeights::default(),
        )
        .expect("invalid series short-circuits before any length check");
        assert!(segments.is_empty());
    }
}
