#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error("invalid band {lowcut}Hz - {highcut}Hz for sample rate {sample_rate}Hz, cutoffs must satisfy 0 < lowcut < highcut < nyquist")]
    InvalidBand {
        lowcut: f64,
        highcut: f64,
        sample_rate: u32,
    },
    #[error("no fft bins fall inside {lowcut}Hz - {highcut}Hz (bin resolution is {resolution}Hz)")]
    EmptyBand {
        lowcut: f64,
        highcut: f64,
        resolution: f64,
    },
    #[error("signal contains no samples")]
    EmptySignal,
    #[error("sample rates differ between tracks ({first}Hz vs {second}Hz)")]
    SampleRateMismatch { first: u32, second: u32 },
    #[error("sample rate must be greater than zero")]
    InvalidSampleRate,
    #[error("filter order {0} cannot be realised, must be between 1 and {max}", max = crate::filter::MAX_ORDER)]
    InvalidFilterOrder(usize),
    #[error("fft size {0} is too small, need at least 2")]
    InvalidFftSize(usize),
}

pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;
