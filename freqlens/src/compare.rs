use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::analyzer::{BandAnalysis, BandAnalyzer};
use crate::error::{AnalysisError, Result};
use crate::signal::{FrequencyBand, Signal};

/// Both tracks measured over the same band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRecord {
    pub band: FrequencyBand,
    pub track_1: BandAnalysis,
    pub track_2: BandAnalysis,
}

impl ComparisonRecord {
    /// How much louder track 1 is than track 2 in this band, in dB.
    /// `None` when either track is silent in the band.
    pub fn rms_difference_db(&self) -> Option<f64> {
        level_difference_db(self.track_1.rms, self.track_2.rms)
    }

    pub fn peak_difference_db(&self) -> Option<f64> {
        level_difference_db(self.track_1.peak, self.track_2.peak)
    }
}

fn level_difference_db(first: f64, second: f64) -> Option<f64> {
    (first > 0.0 && second > 0.0).then(|| 20.0 * (first / second).log10())
}

impl BandAnalyzer {
    /// Analyses every band of both tracks, one record per band in the order
    /// given. The first failing band aborts the whole comparison.
    #[instrument(skip_all, fields(bands = bands.len()), level = "trace")]
    pub fn compare_tracks(
        &self,
        signal_1: &Signal,
        signal_2: &Signal,
        bands: &[FrequencyBand],
    ) -> Result<Vec<ComparisonRecord>> {
        check_sample_rates(signal_1, signal_2)?;

        bands
            .iter()
            .map(|&band| self.compare_band(signal_1, signal_2, band))
            .collect()
    }

    /// Same as [`BandAnalyzer::compare_tracks`] with bands and tracks
    /// analysed on the rayon pool. Results are identical and keep band order.
    #[instrument(skip_all, fields(bands = bands.len()), level = "trace")]
    pub fn compare_tracks_parallel(
        &self,
        signal_1: &Signal,
        signal_2: &Signal,
        bands: &[FrequencyBand],
    ) -> Result<Vec<ComparisonRecord>> {
        check_sample_rates(signal_1, signal_2)?;

        bands
            .par_iter()
            .map(|&band| {
                let (track_1, track_2) = rayon::join(
                    || self.analyze_band(signal_1, band),
                    || self.analyze_band(signal_2, band),
                );
                Ok(ComparisonRecord {
                    band,
                    track_1: track_1?,
                    track_2: track_2?,
                })
            })
            .collect()
    }

    fn compare_band(
        &self,
        signal_1: &Signal,
        signal_2: &Signal,
        band: FrequencyBand,
    ) -> Result<ComparisonRecord> {
        Ok(ComparisonRecord {
            band,
            track_1: self.analyze_band(signal_1, band)?,
            track_2: self.analyze_band(signal_2, band)?,
        })
    }
}

fn check_sample_rates(signal_1: &Signal, signal_2: &Signal) -> Result<()> {
    if signal_1.sample_rate() != signal_2.sample_rate() {
        return Err(AnalysisError::SampleRateMismatch {
            first: signal_1.sample_rate(),
            second: signal_2.sample_rate(),
        });
    }
    Ok(())
}

/// Compares two tracks band by band with the default configuration.
pub fn compare_tracks(
    signal_1: &Signal,
    signal_2: &Signal,
    bands: &[FrequencyBand],
) -> Result<Vec<ComparisonRecord>> {
    BandAnalyzer::default().compare_tracks(signal_1, signal_2, bands)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(rms: f64, peak: f64) -> BandAnalysis {
        BandAnalysis {
            rms,
            peak,
            dominant_freq: 100.0,
            least_dominant_freq: 120.0,
        }
    }

    #[test]
    fn level_differences() {
        let record = ComparisonRecord {
            band: FrequencyBand::new(60.0, 250.0),
            track_1: analysis(0.2, 1.0),
            track_2: analysis(0.1, 1.0),
        };
        let difference = record.rms_difference_db().unwrap();
        assert!((difference - 6.0206).abs() < 1e-4, "{difference}");
        assert_eq!(record.peak_difference_db(), Some(0.0));

        let silent = ComparisonRecord {
            track_2: analysis(0.0, 0.0),
            ..record
        };
        assert_eq!(silent.rms_difference_db(), None);
        assert_eq!(silent.peak_difference_db(), None);
    }

    #[test]
    fn mismatch_detected_before_bands() {
        let first = Signal::new(vec![0.0; 8], 44_100).unwrap();
        let second = Signal::new(vec![0.0; 8], 48_000).unwrap();

        assert_eq!(
            compare_tracks(&first, &second, &[]),
            Err(AnalysisError::SampleRateMismatch {
                first: 44_100,
                second: 48_000
            })
        );
    }
}
