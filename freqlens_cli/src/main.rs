use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use freqlens::{AnalysisConfig, BandAnalyzer, FrequencyBand, Signal, SpectrumWindow};
use tracing::{debug, info, instrument};

mod loader;
mod normalize;
mod report;

use report::{ComparisonReport, Format};

/// Broad mixing bands used when none are given on the command line.
const DEFAULT_BANDS: [(f64, f64); 7] = [
    (20.0, 60.0),
    (60.0, 250.0),
    (250.0, 500.0),
    (500.0, 2_000.0),
    (2_000.0, 4_000.0),
    (4_000.0, 6_000.0),
    (6_000.0, 16_000.0),
];

#[derive(Debug, clap::Parser)]
#[command(version, about = "Compare the spectral balance of two recordings band by band")]
enum Command {
    /// Compare a track against a reference track.
    Compare {
        track: PathBuf,
        reference: PathBuf,
        #[command(flatten)]
        analysis: AnalysisArgs,
        /// Match the reference's overall RMS to the track before comparing.
        #[arg(short, long)]
        normalize: bool,
        /// Analyse bands on all cores.
        #[arg(short, long)]
        parallel: bool,
        #[arg(short, long, value_enum, default_value_t)]
        format: Format,
    },
    /// Analyse the bands of a single track.
    Analyze {
        path: PathBuf,
        #[command(flatten)]
        analysis: AnalysisArgs,
    },
}

#[derive(Debug, clap::Args)]
struct AnalysisArgs {
    /// Frequency band as LOW-HIGH in Hz, may be repeated.
    #[arg(short, long = "band", value_parser = parse_band)]
    bands: Vec<FrequencyBand>,
    /// Rate both tracks are decoded and resampled to.
    #[arg(short, long, default_value_t = 44_100)]
    sample_rate: u32,
    #[arg(long, default_value_t = 2048)]
    fft_size: usize,
    /// Butterworth filter order, from 1 to 32.
    #[arg(long, default_value_t = 5)]
    order: usize,
    #[arg(long, value_enum, default_value_t)]
    window: Window,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum Window {
    #[default]
    Rectangular,
    Hann,
}

impl From<Window> for SpectrumWindow {
    fn from(window: Window) -> Self {
        match window {
            Window::Rectangular => SpectrumWindow::Rectangular,
            Window::Hann => SpectrumWindow::Hann,
        }
    }
}

impl AnalysisArgs {
    fn config(&self) -> AnalysisConfig {
        AnalysisConfig {
            filter_order: self.order,
            fft_size: self.fft_size,
            window: self.window.into(),
        }
    }

    fn bands(&self) -> Vec<FrequencyBand> {
        if self.bands.is_empty() {
            DEFAULT_BANDS.into_iter().map(FrequencyBand::from).collect()
        } else {
            self.bands.clone()
        }
    }
}

fn parse_band(value: &str) -> Result<FrequencyBand, String> {
    let (low, high) = value
        .split_once('-')
        .ok_or_else(|| format!("expected LOW-HIGH, got `{value}`"))?;
    let parse = |part: &str| {
        part.trim()
            .parse::<f64>()
            .map_err(|err| format!("invalid frequency `{part}`: {err}"))
    };
    Ok(FrequencyBand::new(parse(low)?, parse(high)?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    {
        use tracing_subscriber::prelude::*;

        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(tracing_subscriber::EnvFilter::from_default_env())
            .init()
    }

    match Command::parse() {
        Command::Compare {
            track,
            reference,
            analysis,
            normalize,
            parallel,
            format,
        } => {
            compare(track, reference, &analysis, normalize, parallel, format).await
        }
        Command::Analyze { path, analysis } => analyze(path, &analysis).await,
    }
}

#[instrument(skip(analysis), level = "trace")]
async fn compare(
    track: PathBuf,
    reference: PathBuf,
    analysis: &AnalysisArgs,
    normalize: bool,
    parallel: bool,
    format: Format,
) -> anyhow::Result<()> {
    let config = analysis.config();
    let analyzer = BandAnalyzer::new(config)?;
    let bands = analysis.bands();
    let sample_rate = analysis.sample_rate;

    let start = std::time::Instant::now();
    let (signal_1, signal_2) = tokio::try_join!(
        load_in_background(track.clone(), sample_rate),
        load_in_background(reference.clone(), sample_rate),
    )?;
    let elapsed = start.elapsed();
    info!(?elapsed, "completed decode");

    let signal_2 = if normalize {
        normalize::match_rms(&signal_1, &signal_2)
    } else {
        signal_2
    };

    let start = std::time::Instant::now();
    let records = tokio::task::spawn_blocking(move || {
        if parallel {
            analyzer.compare_tracks_parallel(&signal_1, &signal_2, &bands)
        } else {
            analyzer.compare_tracks(&signal_1, &signal_2, &bands)
        }
    })
    .await
    .context("analysis task panicked")??;
    let elapsed = start.elapsed();
    info!(?elapsed, bands = records.len(), "completed comparison");

    let report = ComparisonReport {
        track: &track,
        reference: &reference,
        sample_rate,
        normalized: normalize,
        config: &config,
        bands: &records,
    };
    print!("{}", report.render(format)?);
    Ok(())
}

#[instrument(skip(analysis), level = "trace")]
async fn analyze(path: PathBuf, analysis: &AnalysisArgs) -> anyhow::Result<()> {
    let analyzer = BandAnalyzer::new(analysis.config())?;
    let bands = analysis.bands();
    let signal = load_in_background(path.clone(), analysis.sample_rate).await?;

    let results = tokio::task::spawn_blocking(move || {
        bands
            .into_iter()
            .map(|band| Ok((band, analyzer.analyze_band(&signal, band)?)))
            .collect::<freqlens::Result<Vec<_>>>()
    })
    .await
    .context("analysis task panicked")??;

    print!("{}", report::render_analysis(&path, &results));
    Ok(())
}

async fn load_in_background(path: PathBuf, sample_rate: u32) -> anyhow::Result<Signal> {
    debug!(?path, sample_rate, "loading");
    tokio::task::spawn_blocking(move || loader::load(&path, sample_rate))
        .await
        .context("decode task panicked")?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bands() {
        assert_eq!(parse_band("200-500"), Ok(FrequencyBand::new(200.0, 500.0)));
        assert_eq!(
            parse_band(" 20.5 - 60 "),
            Ok(FrequencyBand::new(20.5, 60.0))
        );
        assert!(parse_band("200").is_err());
        assert!(parse_band("low-500").is_err());
    }

    #[test]
    fn cli_arguments() {
        let command = Command::try_parse_from([
            "freqlens",
            "compare",
            "mix.wav",
            "reference.wav",
            "-b",
            "200-500",
            "--band",
            "2000-4000",
            "--window",
            "hann",
            "--normalize",
            "--format",
            "json",
        ])
        .unwrap();

        let Command::Compare {
            analysis,
            normalize,
            format,
            parallel,
            ..
        } = command
        else {
            panic!("expected compare");
        };
        assert!(normalize);
        assert!(!parallel);
        assert_eq!(format, Format::Json);
        assert_eq!(
            analysis.bands(),
            vec![
                FrequencyBand::new(200.0, 500.0),
                FrequencyBand::new(2_000.0, 4_000.0)
            ]
        );
        assert_eq!(analysis.config().window, SpectrumWindow::Hann);
        assert_eq!(analysis.config().fft_size, 2048);
    }

    #[test]
    fn default_bands_are_valid_at_default_rate() {
        let command = Command::try_parse_from(["freqlens", "analyze", "mix.wav"]).unwrap();
        let Command::Analyze { analysis, .. } = command else {
            panic!("expected analyze");
        };

        let bands = analysis.bands();
        assert_eq!(bands.len(), DEFAULT_BANDS.len());
        assert!(bands
            .iter()
            .all(|band| band.validate(analysis.sample_rate).is_ok()));
        assert_eq!(analysis.config(), AnalysisConfig::default());
    }
}
