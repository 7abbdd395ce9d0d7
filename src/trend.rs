//! Vascular trend store (§4.9): an append-only rolling window of accepted
//! sessions, persisted as JSON, that standardises each new session's PTT,
//! rise time and reflection ratio against its own history and maps the
//! result to a 0-100 index. Persistence uses a write-temp-then-rename
//! scheme so a crash mid-write never corrupts the store.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use serde::Deserialize;

use crate::config::TrendConfig;
use crate::error::CoreResult;
use crate::types::{VascularTrendEntry, VascularTrendSummary};

/// On-disk shape of one entry, with optional numeric fields so a `null` (the
/// JSON form `serde_json` gives a non-finite float on write) deserializes
/// instead of failing the whole array. §6: "non-finite entries silently
/// filtered on load" is a per-entry filter, not a whole-file failure.
#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "t")]
    timestamp_ms: i64,
    ptt: Option<f64>,
    rise: Option<f64>,
    refl: Option<f64>,
}

impl RawEntry {
    fn into_finite(self) -> Option<VascularTrendEntry> {
        let entry = VascularTrendEntry {
            timestamp_ms: self.timestamp_ms,
            ptt: self.ptt?,
            rise: self.rise?,
            refl: self.refl?,
        };
        entry.is_finite().then_some(entry)
    }
}

/// Guards read-modify-write access to the trend file. One process-wide lock
/// rather than per-path locks: the core only ever manages a single store per
/// process.
fn store_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// A rolling vascular trend window backed by a JSON file at `path`.
pub struct TrendStore {
    path: PathBuf,
    config: TrendConfig,
}

impl TrendStore {
    pub fn new(path: impl Into<PathBuf>, config: TrendConfig) -> Self {
        Self { path: path.into(), config }
    }

    /// Evaluate and (if accepted) record one session's vascular metrics
    /// (§4.9). Returns `None` when the session is rejected by the gates or
    /// when there isn't yet enough history to standardise against.
    pub fn maybe_record_and_summarize(
        &self,
        timestamp_ms: i64,
        ptt_ms: Option<f64>,
        ptt_confidence_pct: f64,
        combined_sqi: f64,
        rise_ms: f64,
        refl_ratio: f64,
    ) -> CoreResult<Option<VascularTrendSummary>> {
        let Some(ptt_ms) = ptt_ms else {
            return Ok(None);
        };
        if ptt_confidence_pct < self.config.ptt_confidence_threshold_pct
            || combined_sqi < self.config.combined_sqi_threshold
        {
            return Ok(None);
        }

        let _guard = store_lock().lock().unwrap_or_else(|p| p.into_inner());

        let mut history = self.load();
        let summary = if history.len() >= self.config.min_baseline {
            Some(summarize(&history, ptt_ms, rise_ms, refl_ratio, &self.config))
        } else {
            None
        };

        let entry = VascularTrendEntry {
            timestamp_ms,
            ptt: ptt_ms,
            rise: rise_ms,
            refl: refl_ratio,
        };
        history.push(entry);
        if history.len() > self.config.window_size {
            let drop = history.len() - self.config.window_size;
            history.drain(0..drop);
        }
        self.persist(&history);

        Ok(summary)
    }

    /// Best-effort load: a missing or corrupt file is treated as empty
    /// history rather than surfaced as an error (§6, §7).
    fn load(&self) -> Vec<VascularTrendEntry> {
        match File::open(&self.path) {
            Ok(file) => {
                let reader = BufReader::new(file);
                match serde_json::from_reader::<_, Vec<RawEntry>>(reader) {
                    Ok(entries) => entries.into_iter().filter_map(RawEntry::into_finite).collect(),
                    Err(e) => {
                        log::warn!(
                            "trend: {} is corrupt ({e}), treating as empty history",
                            self.path.display()
                        );
                        Vec::new()
                    }
                }
            }
            Err(_) => Vec::new(),
        }
    }

    /// Write-temp-then-rename so a crash mid-write never leaves a partially
    /// written store behind (§5). Failure is logged and swallowed: losing a
    /// single session's persisted entry is not fatal.
    fn persist(&self, history: &[VascularTrendEntry]) {
        if let Err(e) = self.try_persist(history) {
            let failure = crate::error::CoreError::PersistenceFailure(format!(
                "{}: {e}",
                self.path.display()
            ));
            log::warn!("trend: {failure}");
        }
    }

    fn try_persist(&self, history: &[VascularTrendEntry]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = tmp_path_for(&self.path);
        {
            let file = File::create(&tmp_path)?;
            let writer = BufWriter::new(file);
            serde_json::to_writer_pretty(writer, history)?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn summarize(
    history: &[VascularTrendEntry],
    ptt_ms: f64,
    rise_ms: f64,
    refl_ratio: f64,
    config: &TrendConfig,
) -> VascularTrendSummary {
    let ptt_values: Vec<f64> = history.iter().map(|e| e.ptt).collect();
    let rise_values: Vec<f64> = history.iter().map(|e| e.rise).collect();
    let refl_values: Vec<f64> = history.iter().map(|e| e.refl).collect();

    let (ptt_mean, ptt_std) = mean_and_std(&ptt_values);
    let (rise_mean, rise_std) = mean_and_std(&rise_values);
    let (refl_mean, refl_std) = mean_and_std(&refl_values);

    let delta_ptt_ms = ptt_ms - ptt_mean;
    let delta_rise_ms = rise_ms - rise_mean;
    let delta_refl_ratio = refl_ratio - refl_mean;

    let z_ptt = standardize(delta_ptt_ms, ptt_std, config.z_clip);
    let z_rise = standardize(delta_rise_ms, rise_std, config.z_clip);
    let z_refl = standardize(delta_refl_ratio, refl_std, config.z_clip);

    // Longer PTT, shorter rise, lower reflection => more compliant
    // vasculature => higher index.
    let composite = (z_ptt - z_rise - z_refl) / 3.0;
    let index = (config.index_midpoint + config.index_scale * composite)
        .round()
        .clamp(0.0, 100.0);

    VascularTrendSummary {
        index,
        delta_ptt_ms,
        delta_rise_ms,
        delta_refl_ratio,
    }
}

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    let std = if std < 1e-6 { 1.0 } else { std };
    (mean, std)
}

fn standardize(delta: f64, std: f64, clip: f64) -> f64 {
    (delta / std).clamp(-clip, clip)
}
