use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{AnalysisError, Result};
use crate::filter::{ButterworthBandpass, DEFAULT_ORDER, MAX_ORDER};
use crate::signal::{FrequencyBand, Signal};
use crate::spectrum::{SpectrumAnalyzer, SpectrumWindow, DEFAULT_FFT_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub filter_order: usize,
    pub fft_size: usize,
    pub window: SpectrumWindow,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            filter_order: DEFAULT_ORDER,
            fft_size: DEFAULT_FFT_SIZE,
            window: SpectrumWindow::Rectangular,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_ORDER).contains(&self.filter_order) {
            return Err(AnalysisError::InvalidFilterOrder(self.filter_order));
        }
        if self.fft_size < 2 {
            return Err(AnalysisError::InvalidFftSize(self.fft_size));
        }
        Ok(())
    }
}

/// Loudness and spectral summary of one signal inside one band, measured
/// after bandpass filtering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandAnalysis {
    pub rms: f64,
    pub peak: f64,
    pub dominant_freq: f64,
    pub least_dominant_freq: f64,
}

/// Root mean square of `samples`.
pub fn rms(samples: &[f64]) -> Result<f64> {
    if samples.is_empty() {
        return Err(AnalysisError::EmptySignal);
    }

    let mean_square = samples.iter().map(|x| x * x).sum::<f64>() / samples.len() as f64;
    Ok(mean_square.sqrt())
}

/// Largest absolute sample value.
pub fn peak(samples: &[f64]) -> Result<f64> {
    samples
        .iter()
        .map(|x| x.abs())
        .reduce(f64::max)
        .ok_or(AnalysisError::EmptySignal)
}

#[derive(Debug, Clone, Default)]
pub struct BandAnalyzer {
    spectrum: SpectrumAnalyzer,
    config: AnalysisConfig,
}

impl BandAnalyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            spectrum: SpectrumAnalyzer::default(),
            config,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Bandpass filters `signal` to `band` and measures the result.
    #[instrument(skip(self, signal), fields(len = signal.len()), level = "trace")]
    pub fn analyze_band(&self, signal: &Signal, band: FrequencyBand) -> Result<BandAnalysis> {
        let filter =
            ButterworthBandpass::design(band, signal.sample_rate(), self.config.filter_order)?;
        let filtered = filter.apply(signal.samples());

        let rms = rms(&filtered)?;
        let peak = peak(&filtered)?;
        let (dominant_freq, least_dominant_freq) = self.spectrum.dominant_frequencies(
            &filtered,
            signal.sample_rate(),
            band,
            self.config.fft_size,
            self.config.window,
        )?;

        Ok(BandAnalysis {
            rms,
            peak,
            dominant_freq,
            least_dominant_freq,
        })
    }
}

/// Analyses `band` of `signal` with the default configuration.
pub fn analyze_band(signal: &Signal, band: FrequencyBand) -> Result<BandAnalysis> {
    BandAnalyzer::default().analyze_band(signal, band)
}

#[cfg(test)]
mod tests {
    use std::f64::consts::TAU;

    use super::*;

    const SR: u32 = 44_100;

    fn sine_signal(freq: f64, amplitude: f64) -> Signal {
        let samples = (0..SR)
            .map(|i| amplitude * (TAU * freq * i as f64 / SR as f64).sin())
            .collect();
        Signal::new(samples, SR).unwrap()
    }

    #[test]
    fn rms_and_peak_of_known_values() {
        let samples = [3.0, -4.0, 0.0, 0.0];
        assert_eq!(rms(&samples).unwrap(), 2.5);
        assert_eq!(peak(&samples).unwrap(), 4.0);
        assert_eq!(peak(&[-0.5]).unwrap(), 0.5);
    }

    #[test]
    fn peak_equals_max_magnitude() {
        let samples = sine_signal(97.0, 0.8).into_samples();
        let max = samples.iter().fold(0.0f64, |acc, x| acc.max(x.abs()));
        assert_eq!(peak(&samples).unwrap(), max);
        assert!(rms(&samples).unwrap() >= 0.0);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert_eq!(rms(&[]), Err(AnalysisError::EmptySignal));
        assert_eq!(peak(&[]), Err(AnalysisError::EmptySignal));

        let empty = Signal::new(Vec::new(), SR).unwrap();
        assert_eq!(
            analyze_band(&empty, FrequencyBand::new(400.0, 500.0)),
            Err(AnalysisError::EmptySignal)
        );
    }

    #[test]
    fn analyses_tone_inside_band() {
        let signal = sine_signal(440.0, 1.0);
        let band = FrequencyBand::new(400.0, 500.0);
        let analysis = analyze_band(&signal, band).unwrap();

        assert!((analysis.dominant_freq - 440.0).abs() <= SR as f64 / DEFAULT_FFT_SIZE as f64);
        assert!(band.contains(analysis.least_dominant_freq));
        assert!(analysis.rms > 0.6 && analysis.rms < 0.75, "{}", analysis.rms);
        assert!(analysis.peak >= analysis.rms);
    }

    #[test]
    fn out_of_band_tone_is_quiet() {
        let signal = sine_signal(5_000.0, 1.0);
        let analysis = analyze_band(&signal, FrequencyBand::new(400.0, 500.0)).unwrap();
        assert!(analysis.rms < 2e-3, "{}", analysis.rms);
    }

    #[test]
    fn repeated_analysis_is_bit_identical() {
        let signal = sine_signal(1_250.0, 0.5);
        let band = FrequencyBand::new(1_000.0, 2_000.0);
        let analyzer = BandAnalyzer::default();

        let first = analyzer.analyze_band(&signal, band).unwrap();
        let second = analyzer.analyze_band(&signal, band).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, analyze_band(&signal, band).unwrap());
    }

    #[test]
    fn band_errors_surface() {
        let signal = sine_signal(440.0, 1.0);

        for band in [
            FrequencyBand::new(1_000.0, 500.0),
            FrequencyBand::new(0.0, SR as f64),
        ] {
            assert!(matches!(
                analyze_band(&signal, band),
                Err(AnalysisError::InvalidBand { .. })
            ));
        }
        assert!(matches!(
            analyze_band(&signal, FrequencyBand::new(440.0, 445.0)),
            Err(AnalysisError::EmptyBand { .. })
        ));
    }

    #[test]
    fn config_is_validated() {
        let config = AnalysisConfig {
            fft_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            BandAnalyzer::new(config),
            Err(AnalysisError::InvalidFftSize(0))
        ));

        let hann = AnalysisConfig {
            window: SpectrumWindow::Hann,
            fft_size: 4096,
            ..Default::default()
        };
        let analyzer = BandAnalyzer::new(hann).unwrap();
        let analysis = analyzer
            .analyze_band(&sine_signal(440.0, 1.0), FrequencyBand::new(400.0, 500.0))
            .unwrap();
        assert!((analysis.dominant_freq - 440.0).abs() <= SR as f64 / 4096.0);
    }

    #[test]
    fn rejects_orders_beyond_the_limit() {
        let config = AnalysisConfig {
            filter_order: MAX_ORDER + 1,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(AnalysisError::InvalidFilterOrder(MAX_ORDER + 1))
        );

        let highest = BandAnalyzer::new(AnalysisConfig {
            filter_order: MAX_ORDER,
            ..Default::default()
        })
        .unwrap();
        let analysis = highest
            .analyze_band(&sine_signal(440.0, 1.0), FrequencyBand::new(400.0, 500.0))
            .unwrap();
        assert!(analysis.rms.is_finite() && analysis.rms > 0.1, "{}", analysis.rms);
        assert!(analysis.peak.is_finite());
    }

    /// Counts every event it sees, spans are accepted and ignored.
    #[derive(Clone, Default)]
    struct EventCounter(std::sync::Arc<std::sync::atomic::AtomicUsize>);

    impl tracing::Subscriber for EventCounter {
        fn enabled(&self, _: &tracing::Metadata<'_>) -> bool {
            true
        }

        fn new_span(&self, _: &tracing::span::Attributes<'_>) -> tracing::span::Id {
            tracing::span::Id::from_u64(1)
        }

        fn record(&self, _: &tracing::span::Id, _: &tracing::span::Record<'_>) {}

        fn record_follows_from(&self, _: &tracing::span::Id, _: &tracing::span::Id) {}

        fn event(&self, _: &tracing::Event<'_>) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }

        fn enter(&self, _: &tracing::span::Id) {}

        fn exit(&self, _: &tracing::span::Id) {}
    }

    #[test]
    fn analysis_emits_no_events() {
        let counter = EventCounter::default();
        let signal = sine_signal(440.0, 1.0);
        let band = FrequencyBand::new(400.0, 500.0);

        tracing::subscriber::with_default(counter.clone(), || {
            let analyzer = BandAnalyzer::new(AnalysisConfig {
                window: SpectrumWindow::Hann,
                ..Default::default()
            })
            .unwrap();
            analyzer.analyze_band(&signal, band).unwrap();
            analyzer
                .compare_tracks(&signal, &signal, &[band, FrequencyBand::new(60.0, 250.0)])
                .unwrap();
        });

        assert_eq!(counter.0.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
