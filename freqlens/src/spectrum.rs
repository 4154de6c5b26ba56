use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{AnalysisError, Result};
use crate::signal::FrequencyBand;

pub const DEFAULT_FFT_SIZE: usize = 2048;

/// Taper applied to the fft frame before transforming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpectrumWindow {
    /// Samples are used as-is, zero-padded or truncated to the fft size.
    #[default]
    Rectangular,
    Hann,
}

/// Computes magnitude spectra, sharing fft plans and windows between calls.
#[derive(Clone)]
pub struct SpectrumAnalyzer {
    planner: Arc<Mutex<FftPlanner<f64>>>,
    hanns: Arc<RwLock<HashMap<usize, Arc<Vec<f64>>>>>,
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self {
            planner: Arc::new(Mutex::new(FftPlanner::new())),
            hanns: Default::default(),
        }
    }
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer").finish_non_exhaustive()
    }
}

impl SpectrumAnalyzer {
    /// Magnitudes of bins `0..=fft_size / 2` of the real input `samples`,
    /// which are truncated or zero-padded to `fft_size` first.
    #[instrument(skip(self, samples), level = "trace")]
    pub fn magnitude_spectrum(
        &self,
        samples: &[f64],
        fft_size: usize,
        window: SpectrumWindow,
    ) -> Result<Vec<f64>> {
        if fft_size < 2 {
            return Err(AnalysisError::InvalidFftSize(fft_size));
        }

        let fft = self
            .planner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .plan_fft_forward(fft_size);

        let mut buffer = samples
            .iter()
            .copied()
            .chain(std::iter::repeat(0.0))
            .take(fft_size)
            .map(|sample| Complex::new(sample, 0.0))
            .collect::<Vec<_>>();

        if window == SpectrumWindow::Hann {
            let hann = self.get_hann(fft_size);
            buffer
                .iter_mut()
                .zip(hann.iter())
                .for_each(|(value, weight)| *value *= *weight);
        }

        fft.process(&mut buffer);

        // the upper half mirrors the lower half for real input
        Ok(buffer
            .into_iter()
            .take(fft_size / 2 + 1)
            .map(|value| value.norm())
            .collect())
    }

    /// Frequencies of the strongest and weakest fft bins inside `band`,
    /// returned as `(dominant, least_dominant)`.
    ///
    /// Bins are scanned in ascending frequency order and the first bin wins
    /// ties, so a flat spectrum reports the lowest in-band bin for both.
    #[instrument(skip(self, samples), level = "trace")]
    pub fn dominant_frequencies(
        &self,
        samples: &[f64],
        sample_rate: u32,
        band: FrequencyBand,
        fft_size: usize,
        window: SpectrumWindow,
    ) -> Result<(f64, f64)> {
        let magnitudes = self.magnitude_spectrum(samples, fft_size, window)?;

        let mut in_band = magnitudes
            .iter()
            .enumerate()
            .map(|(bin, &magnitude)| (bin_frequency(bin, sample_rate, fft_size), magnitude))
            .filter(|(frequency, _)| band.contains(*frequency));

        let first = in_band.next().ok_or(AnalysisError::EmptyBand {
            lowcut: band.lowcut,
            highcut: band.highcut,
            resolution: sample_rate as f64 / fft_size as f64,
        })?;

        let (dominant, least_dominant) =
            in_band.fold((first, first), |(max, min), bin| {
                (
                    if bin.1 > max.1 { bin } else { max },
                    if bin.1 < min.1 { bin } else { min },
                )
            });

        Ok((dominant.0, least_dominant.0))
    }

    fn get_hann(&self, size: usize) -> Arc<Vec<f64>> {
        let read = self.hanns.read().unwrap_or_else(PoisonError::into_inner);

        match read.get(&size) {
            Some(hann) => hann.clone(),
            None => {
                drop(read);
                self.generate_hann(size)
            }
        }
    }

    #[instrument(skip(self), level = "trace")]
    fn generate_hann(&self, size: usize) -> Arc<Vec<f64>> {
        let hann = Arc::new(generate_hanning_window(size));
        let mut write = self.hanns.write().unwrap_or_else(PoisonError::into_inner);
        write.insert(size, hann.clone());
        hann
    }
}

/// Centre frequency of fft bin `bin`.
pub fn bin_frequency(bin: usize, sample_rate: u32, fft_size: usize) -> f64 {
    bin as f64 * sample_rate as f64 / fft_size as f64
}

/// See [`SpectrumAnalyzer::dominant_frequencies`], without a window.
pub fn dominant_frequencies(
    samples: &[f64],
    sample_rate: u32,
    band: FrequencyBand,
    fft_size: usize,
) -> Result<(f64, f64)> {
    SpectrumAnalyzer::default().dominant_frequencies(
        samples,
        sample_rate,
        band,
        fft_size,
        SpectrumWindow::Rectangular,
    )
}

fn generate_hanning_window(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (std::f64::consts::TAU * (i as f64 / size as f64)).cos()))
        .collect()
}
