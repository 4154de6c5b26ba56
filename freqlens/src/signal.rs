use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// Mono samples paired with the rate they were captured at.
///
/// A `Signal` is never mutated after construction, operations that change
/// the samples hand back a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    samples: Vec<f64>,
    sample_rate: u32,
}

impl Signal {
    pub fn new(samples: Vec<f64>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(AnalysisError::InvalidSampleRate);
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn nyquist(&self) -> f64 {
        self.sample_rate as f64 / 2.0
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Returns a copy of this signal with every sample multiplied by `gain`.
    pub fn with_gain(&self, gain: f64) -> Self {
        Self {
            samples: self.samples.iter().map(|sample| sample * gain).collect(),
            sample_rate: self.sample_rate,
        }
    }

    pub fn into_samples(self) -> Vec<f64> {
        self.samples
    }
}

/// A frequency interval in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub lowcut: f64,
    pub highcut: f64,
}

impl FrequencyBand {
    pub const fn new(lowcut: f64, highcut: f64) -> Self {
        Self { lowcut, highcut }
    }

    /// Checks that the band can be realised as a bandpass filter at
    /// `sample_rate`, i.e. `0 < lowcut < highcut < nyquist`.
    pub fn validate(&self, sample_rate: u32) -> Result<()> {
        let nyquist = sample_rate as f64 / 2.0;
        let in_range = self.lowcut.is_finite()
            && self.highcut.is_finite()
            && self.lowcut > 0.0
            && self.highcut < nyquist
            && self.lowcut < self.highcut;

        if in_range {
            Ok(())
        } else {
            Err(AnalysisError::InvalidBand {
                lowcut: self.lowcut,
                highcut: self.highcut,
                sample_rate,
            })
        }
    }

    pub fn width(&self) -> f64 {
        self.highcut - self.lowcut
    }

    /// Inclusive on both edges.
    pub fn contains(&self, frequency: f64) -> bool {
        frequency >= self.lowcut && frequency <= self.highcut
    }
}

impl From<(f64, f64)> for FrequencyBand {
    fn from((lowcut, highcut): (f64, f64)) -> Self {
        Self::new(lowcut, highcut)
    }
}

impl fmt::Display for FrequencyBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz - {}Hz", self.lowcut, self.highcut)
    }
}
