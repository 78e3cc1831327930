use anyhow::{bail, Result};
use num_complex::Complex64;
use rustfft::FftPlanner;
use serde::Serialize;
use std::f64::consts::PI;

/// One-sided power spectrum of a uniformly sampled signal.
#[derive(Debug, Clone, Serialize)]
pub struct PowerSpectrum {
    /// Bin frequencies in cycles per unit time, `k / (n * dt)`.
    pub frequencies: Vec<f64>,
    /// Hann-windowed periodogram power per bin (relative units).
    pub power: Vec<f64>,
}

impl PowerSpectrum {
    /// Frequency of the strongest non-DC bin: the quickest way to read
    /// a dominant period off a trajectory coordinate.
    pub fn peak_frequency(&self) -> Option<f64> {
        self.power
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(idx, _)| self.frequencies[idx])
    }
}

/// Computes the one-sided power spectrum of `samples` taken `dt` apart.
///
/// The mean is removed and a Hann window applied before the transform,
/// so a periodic orbit shows up as a sharp line and broadband content
/// (chaos) as a continuous floor. Power is relative, not calibrated to
/// any physical unit.
pub fn power_spectrum(samples: &[f64], dt: f64) -> Result<PowerSpectrum> {
    if samples.len() < 2 {
        bail!("Power spectrum needs at least two samples.");
    }
    if !(dt > 0.0) || !dt.is_finite() {
        bail!("Sample spacing dt must be positive and finite.");
    }
    if samples.iter().any(|v| !v.is_finite()) {
        bail!("Samples must all be finite.");
    }

    let n = samples.len();
    let mean = samples.iter().sum::<f64>() / n as f64;
    let mut buffer: Vec<Complex64> = samples
        .iter()
        .enumerate()
        .map(|(i, &v)| Complex64::new((v - mean) * hann(i, n), 0.0))
        .collect();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut buffer);

    let bins = n / 2 + 1;
    let norm = 1.0 / (n as f64);
    let mut frequencies = Vec::with_capacity(bins);
    let mut power = Vec::with_capacity(bins);
    for (k, value) in buffer.iter().take(bins).enumerate() {
        frequencies.push(k as f64 / (n as f64 * dt));
        power.push(value.norm_sqr() * norm);
    }

    Ok(PowerSpectrum { frequencies, power })
}

fn hann(i: usize, n: usize) -> f64 {
    0.5 * (1.0 - (2.0 * PI * i as f64 / (n - 1) as f64).cos())
}
