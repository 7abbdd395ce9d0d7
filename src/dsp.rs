//! DSP primitives (§4.1): Butterworth band-pass, z-score, linear detrend,
//! band power, and cross-correlation with sub-sample peak refinement. Every
//! higher-level component (`pipeline`, `ptt`, `sqi`, `realtime`) is built out
//! of these.

use biquad::{Biquad as _, Coefficients, DirectForm1, ToHertz, Type};
use rustfft::FftPlanner;
use rustfft::num_complex::Complex;

/// Cascade of `order` second-order Butterworth sections implementing the
/// band-pass [`f_low`, `f_high`] Hz at sample rate `fs` (§4.1). For series
/// covering at least `zero_phase_min_s` seconds the cascade runs forward then
/// backward (zero phase); shorter series run forward-only with a 2x-length
/// ramp-up prefix that is discarded from the output.
pub fn butter_bandpass(
    signal: &[f64],
    fs: f64,
    f_low: f64,
    f_high: f64,
    order: usize,
    zero_phase_min_s: f64,
) -> Vec<f64> {
    if signal.is_empty() || order == 0 {
        return signal.to_vec();
    }

    let duration_s = signal.len() as f64 / fs;
    if duration_s >= zero_phase_min_s {
        let forward = run_cascade(signal, fs, f_low, f_high, order);
        let mut backward: Vec<f64> = forward.into_iter().rev().collect();
        backward = run_cascade(&backward, fs, f_low, f_high, order);
        backward.reverse();
        backward
    } else {
        let prefix_len = signal.len().min((2.0 * signal.len() as f64) as usize).max(1);
        let mut padded = Vec::with_capacity(prefix_len + signal.len());
        // Ramp-up prefix: the signal reflected about its first sample, so the
        // filter's transient settles before the samples we actually keep.
        for i in (0..prefix_len).rev() {
            let src = i.min(signal.len() - 1);
            padded.push(signal[src]);
        }
        padded.extend_from_slice(signal);
        let filtered = run_cascade(&padded, fs, f_low, f_high, order);
        filtered[prefix_len..].to_vec()
    }
}

const BUTTERWORTH_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

fn run_cascade(signal: &[f64], fs: f64, f_low: f64, f_high: f64, order: usize) -> Vec<f64> {
    let hp_coeffs = match Coefficients::<f64>::from_params(
        Type::HighPass,
        fs.hz(),
        f_low.hz(),
        BUTTERWORTH_Q,
    ) {
        Ok(c) => c,
        Err(_) => return signal.to_vec(),
    };
    let lp_coeffs = match Coefficients::<f64>::from_params(
        Type::LowPass,
        fs.hz(),
        f_high.hz(),
        BUTTERWORTH_Q,
    ) {
        Ok(c) => c,
        Err(_) => return signal.to_vec(),
    };

    let mut high_pass_stages: Vec<DirectForm1<f64>> =
        (0..order).map(|_| DirectForm1::<f64>::new(hp_coeffs)).collect();
    let mut low_pass_stages: Vec<DirectForm1<f64>> =
        (0..order).map(|_| DirectForm1::<f64>::new(lp_coeffs)).collect();

    signal
        .iter()
        .map(|&x| {
            let mut sample = x;
            for stage in high_pass_stages.iter_mut() {
                sample = stage.run(sample);
            }
            for stage in low_pass_stages.iter_mut() {
                sample = stage.run(sample);
            }
            sample
        })
        .collect()
}

/// Subtract mean, divide by sample standard deviation. Returns zeros if std
/// is below `1e-9` rather than dividing by near-zero (§4.1, §7).
pub fn zscore(signal: &[f64]) -> Vec<f64> {
    if signal.is_empty() {
        return Vec::new();
    }
    let n = signal.len() as f64;
    let mean = signal.iter().sum::<f64>() / n;
    let variance = signal.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    if std < 1e-9 {
        return vec![0.0; signal.len()];
    }
    signal.iter().map(|&x| (x - mean) / std).collect()
}

/// Remove the best-fit line (least squares) from the signal.
pub fn linear_detrend(signal: &[f64]) -> Vec<f64> {
    let n = signal.len();
    if n < 2 {
        return signal.to_vec();
    }
    let n_f = n as f64;
    let x_mean = (n_f - 1.0) / 2.0;
    let y_mean = signal.iter().sum::<f64>() / n_f;

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &y) in signal.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    let slope = if den.abs() > 1e-12 { num / den } else { 0.0 };
    let intercept = y_mean - slope * x_mean;

    signal
        .iter()
        .enumerate()
        .map(|(i, &y)| y - (slope * i as f64 + intercept))
        .collect()
}

/// Welch-style band power: Hann-windowed FFT magnitude-squared, summed over
/// bins falling in `[lo, hi)` Hz. Shared by channel SQI's SNR penalty and the
/// realtime engine's live SNR estimate, per design note 9.
pub fn power_in_band(signal: &[f64], fs: f64, lo: f64, hi: f64) -> f64 {
    if signal.len() < 8 {
        return 0.0;
    }
    let n = signal.len();
    let hann: Vec<f64> = (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos()))
        .collect();

    let mut buffer: Vec<Complex<f64>> = signal
        .iter()
        .zip(hann.iter())
        .map(|(&s, &w)| Complex::new(s * w, 0.0))
        .collect();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut buffer);

    let freq_per_bin = fs / n as f64;
    let half = n / 2 + 1;
    buffer[..half]
        .iter()
        .enumerate()
        .filter(|(k, _)| {
            let f = *k as f64 * freq_per_bin;
            f >= lo && f < hi
        })
        .map(|(_, c)| c.norm_sqr())
        .sum()
}

/// Physiological pulse band vs. adjacent noise band, shared by every SNR
/// call site (channel SQI, good-sync gating, the realtime engine) so the
/// split is defined once rather than copied at each call site (design note 9).
pub const PULSE_SIGNAL_BAND_HZ: (f64, f64) = (0.7, 4.0);
pub const PULSE_NOISE_BAND_HZ: (f64, f64) = (4.0, 8.0);

/// Welch-style SNR in dB between the physiological pulse band and the
/// adjacent noise band (§4.8's "SNR per channel via Welch-style power ratio").
pub fn snr_db(signal: &[f64], fs: f64) -> f64 {
    let signal_power = power_in_band(signal, fs, PULSE_SIGNAL_BAND_HZ.0, PULSE_SIGNAL_BAND_HZ.1);
    let noise_power = power_in_band(signal, fs, PULSE_NOISE_BAND_HZ.0, PULSE_NOISE_BAND_HZ.1).max(1e-9);
    10.0 * (signal_power / noise_power).log10()
}

/// Result of a cross-correlation sweep (§4.1).
#[derive(Debug, Clone, Copy)]
pub struct XCorrPeak {
    /// Sub-sample-refined lag (positive means `b` lags `a`).
    pub lag_samples: f64,
    /// Normalized correlation at the refined peak, clamped to [-1, 1].
    pub corr: f64,
}

/// Cross-correlate equal-length `a`, `b` over `k in [-max_lag, max_lag]`.
/// Normalization uses `sqrt(sum(a^2) * sum(b^2))` computed once on the full
/// (zero-lag, overlap-maximal) arrays rather than recomputed per lag: the
/// per-lag variant under-normalizes at large lags and biases `corr_score`
/// upward for short windows.
pub fn cross_correlate(a: &[f64], b: &[f64], max_lag: usize) -> Option<XCorrPeak> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let n = a.len() as i64;
    let max_lag = max_lag as i64;

    let norm = (a.iter().map(|v| v * v).sum::<f64>() * b.iter().map(|v| v * v).sum::<f64>())
        .sqrt();
    if norm < 1e-12 {
        return None;
    }

    let mut best_k = 0i64;
    let mut best_r = f64::NEG_INFINITY;
    let mut r_at = |k: i64| -> f64 {
        let mut sum = 0.0;
        let (lo, hi) = if k >= 0 { (0, n - k) } else { (-k, n) };
        if lo >= hi {
            return 0.0;
        }
        for i in lo..hi {
            sum += a[i as usize] * b[(i + k) as usize];
        }
        sum / norm
    };

    let mut all_r: Vec<(i64, f64)> = Vec::with_capacity((2 * max_lag + 1) as usize);
    for k in -max_lag..=max_lag {
        let r = r_at(k);
        all_r.push((k, r));
        if r > best_r {
            best_r = r;
            best_k = k;
        }
    }

    // Parabolic interpolation around the argmax; reject non-concave fits.
    let idx = all_r.iter().position(|&(k, _)| k == best_k).unwrap();
    let refined_lag = if idx > 0 && idx < all_r.len() - 1 {
        let y_minus = all_r[idx - 1].1;
        let y_0 = all_r[idx].1;
        let y_plus = all_r[idx + 1].1;
        let denom = y_minus - 2.0 * y_0 + y_plus;
        if denom < -1e-9 {
            let p = 0.5 * (y_minus - y_plus) / denom;
            best_k as f64 + p.clamp(-1.0, 1.0)
        } else {
            best_k as f64
        }
    } else {
        best_k as f64
    };

    Some(XCorrPeak {
        lag_samples: refined_lag,
        corr: best_r.clamp(-1.0, 1.0),
    })
}

/// Deterministic sine generator, used by tests and by [`crate::sim`].
pub fn sine_wave(freq_hz: f64, fs: f64, n: usize, phase: f64) -> Vec<f64> {
    (0..n)
        .map(|i| (2.0 * std::f64::consts::PI * freq_hz * i as f64 / fs + phase).sin())
        .collect()
}

/// Small deterministic pseudo-random generator (splitmix64) so tests don't
/// need an external `rand` dependency for reproducible noise.
pub struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed.wrapping_add(0x9E3779B97F4A7C15) }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E3779B97F4A7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }

    /// Uniform sample in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Approximately standard-normal sample via Box-Muller.
    pub fn next_gaussian(&mut self) -> f64 {
        let u1 = self.next_f64().max(1e-12);
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}

/// Gaussian white noise scaled by `amplitude`, deterministic given `seed`.
pub fn gaussian_noise(n: usize, amplitude: f64, seed: u64) -> Vec<f64> {
    let mut rng = DeterministicRng::new(seed);
    (0..n).map(|_| rng.next_gaussian() * amplitude).collect()
}
