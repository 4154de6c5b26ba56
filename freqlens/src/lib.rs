//! Band-by-band loudness and spectral comparison of two mono signals.
//!
//! Each band is isolated with a Butterworth bandpass, then measured for
//! RMS, peak amplitude and the strongest and weakest fft bins it contains.

pub mod analyzer;
pub mod compare;
pub mod error;
pub mod filter;
pub mod signal;
pub mod spectrum;

pub use analyzer::{analyze_band, peak, rms, AnalysisConfig, BandAnalysis, BandAnalyzer};
pub use compare::{compare_tracks, ComparisonRecord};
pub use error::{AnalysisError, Result};
pub use filter::{bandpass_filter, ButterworthBandpass};
pub use signal::{FrequencyBand, Signal};
pub use spectrum::{dominant_frequencies, SpectrumAnalyzer, SpectrumWindow};
