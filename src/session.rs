//! Session orchestration: wires the per-component analyzers together into
//! one call, the way a combined-analysis entry point fans out to several
//! independent analyzers and bundles their results into a single struct.
//! Everything here is composition over the other modules' public functions;
//! no new DSP lives in this file.

use crate::cancel::CancellationToken;
use crate::config::SessionConfig;
use crate::dsp;
use crate::error::CoreResult;
use crate::goodsync::{self, AuxMetrics};
use crate::peaks;
use crate::pipeline;
use crate::ptt::{self, SqiSummary};
use crate::sqi;
use crate::trend::TrendStore;
use crate::types::{ExportSegment, ProcessedSeries, PttResult, RawSeriesBuffer, SqiInputs, VascularTrendSummary};

/// Per-session auxiliary capture metrics, aligned sample-for-sample to the
/// [`ProcessedSeries`] the pipeline produces (same length, same grid). The
/// caller (the capture subsystem, outside this core) is responsible for
/// resampling raw motion/saturation/IMU telemetry onto that grid.
pub struct SessionAuxMetrics<'a> {
    pub face_motion_px: &'a [f64],
    pub finger_saturation_pct: &'a [f64],
    /// Single scalar IMU RMS summary for the session (§4.5's IMU penalty term).
    pub imu_rms_g: f64,
}

/// Everything the signal processing and fusion engine can say about one
/// capture session, bundled the way `AudioFeatures` bundles BPM and volume.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub series: ProcessedSeries,
    pub ptt: PttResult,
    pub sqi_face: f64,
    pub sqi_finger: f64,
    pub segments: Vec<ExportSegment>,
    pub trend: Option<VascularTrendSummary>,
}

/// Run the full pipeline → {PTT, SQI} → good-sync → vascular trend chain for
/// one session (§2's data flow diagram), recording it against `trend_store`
/// when it's good enough to trust.
pub fn analyze_session(
    raw: &RawSeriesBuffer,
    aux: &SessionAuxMetrics,
    config: &SessionConfig,
    trend_store: &TrendStore,
    session_timestamp_ms: i64,
    cancel: &CancellationToken,
) -> CoreResult<SessionReport> {
    let series = pipeline::process(raw, config.target_sample_rate_hz, &config.pipeline, cancel)?;

    if !series.is_valid {
        log::warn!("analyze_session: pipeline produced an invalid series, skipping downstream analysis");
        return Ok(SessionReport {
            series,
            ptt: PttResult::unknown(),
            sqi_face: 0.0,
            sqi_finger: 0.0,
            segments: Vec::new(),
            trend: None,
        });
    }

    let fs = series.sample_rate_hz;
    let avg_motion = mean(aux.face_motion_px);
    let avg_saturation = mean(aux.finger_saturation_pct);

    let (sqi_face, sqi_finger) = rayon::join(
        || {
            sqi::face_sqi(
                SqiInputs {
                    snr_db: dsp::snr_db(&series.face, fs),
                    motion_px: avg_motion,
                    saturation_pct: 0.0,
                    imu_g: aux.imu_rms_g,
                },
                &config.sqi_weights,
            )
        },
        || {
            sqi::finger_sqi(
                SqiInputs {
                    snr_db: dsp::snr_db(&series.finger, fs),
                    motion_px: 0.0,
                    saturation_pct: avg_saturation,
                    imu_g: aux.imu_rms_g,
                },
                &config.sqi_weights,
            )
        },
    );

    if cancel.is_cancelled() {
        return Err(crate::error::CoreError::Cancelled);
    }

    let ptt_result = ptt::compute(
        &series,
        SqiSummary { face: sqi_face, finger: sqi_finger },
        &config.ptt,
    );

    let goodsync_aux = AuxMetrics {
        face_motion_px: aux.face_motion_px,
        finger_saturation_pct: aux.finger_saturation_pct,
    };
    let segments = goodsync::scan(&series, &goodsync_aux, &config.good_sync, &config.ptt, &config.sqi_weights)?;

    let face_peaks = peaks::detect_peaks(&series.face, fs);
    let morphology = peaks::average_morphology(&face_peaks);

    let trend = match (morphology, ptt_result.quality) {
        (Some((rise_ms, refl_ratio)), q) if q != crate::types::PttQuality::Unknown => {
            let combined_sqi = (sqi_face + sqi_finger) / 2.0;
            trend_store.maybe_record_and_summarize(
                session_timestamp_ms,
                Some(ptt_result.lag_ms),
                ptt_result.confidence_pct,
                combined_sqi,
                rise_ms,
                refl_ratio,
            )?
        }
        _ => None,
    };

    Ok(SessionReport {
        series,
        ptt: ptt_result,
        sqi_face,
        sqi_finger,
        segments,
        trend,
    })
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
    use crate::config::{SessionConfig, TrendConfig};
    use crate::sim::{self, SimConfig};
    use std::fs;
    use std::path::PathBuf;

    fn temp_store_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("session_test_{name}_{:?}.json", std::thread::current().id()))
    }

    #[test]
    fn clean_session_produces_a_report_and_skips_trend_before_baseline() {
        let path = temp_store_path("clean_session");
        let _ = fs::remove_file(&path);

        let sim_cfg = SimConfig {
            hr_bpm: 72.0,
            ptt_ms: 120.0,
            noise_level: 0.02,
            fs_hz: 100.0,
            duration_s: 30.0,
            drift_ms_per_s: 0.0,
            seed: 99,
        };
        let raw = sim::generate(&sim_cfg);
        let n = (sim_cfg.fs_hz * sim_cfg.duration_s) as usize;
        let aux = SessionAuxMetrics {
            face_motion_px: &vec![0.0; n],
            finger_saturation_pct: &vec![0.0; n],
            imu_rms_g: 0.0,
        };
        let config = SessionConfig::default();
        let store = TrendStore::new(&path, TrendConfig::default());

        let report = analyze_session(&raw, &aux, &config, &store, 0, &CancellationToken::new())
            .expect("session analysis ok");

        assert!(report.series.is_valid);
        assert!(report.sqi_face > 0.0);
        assert!(report.sqi_finger > 0.0);
        assert!((report.ptt.lag_ms - 120.0).abs() <= 10.0);
        // First session ever: no baseline to standardise against yet.
        assert!(report.trend.is_none());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn invalid_session_short_circuits_without_touching_trend_store() {
        let path = temp_store_path("invalid_session");
        let _ = fs::remove_file(&path);

        let sim_cfg = SimConfig {
            duration_s: 1.0,
            ..SimConfig::default()
        };
        let raw = sim::generate(&sim_cfg);
        let n = (sim_cfg.fs_hz * sim_cfg.duration_s) as usize;
        let aux = SessionAuxMetrics {
            face_motion_px: &vec![0.0; n],
            finger_saturation_pct: &vec![0.0; n],
            imu_rms_g: 0.0,
        };
        let config = SessionConfig::default();
        let store = TrendStore::new(&path, TrendConfig::default());

        let report = analyze_session(&raw, &aux, &config, &store, 0, &CancellationToken::new())
            .expect("short session still returns Ok");
        assert!(!report.series.is_valid);
        assert!(report.trend.is_none());
        assert!(!path.exists(), "trend store must not be created for a skipped session");

        let _ = fs::remove_file(&path);
    }
}
