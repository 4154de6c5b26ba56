use std::path::Path;

use freqlens::{AnalysisConfig, BandAnalysis, ComparisonRecord, FrequencyBand};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Serialize)]
pub struct ComparisonReport<'a> {
    pub track: &'a Path,
    pub reference: &'a Path,
    pub sample_rate: u32,
    pub normalized: bool,
    pub config: &'a AnalysisConfig,
    pub bands: &'a [ComparisonRecord],
}

impl ComparisonReport<'_> {
    pub fn render(&self, format: Format) -> anyhow::Result<String> {
        Ok(match format {
            Format::Text => render_text(self.bands),
            Format::Json => serde_json::to_string_pretty(self)?,
        })
    }
}

pub fn render_text(records: &[ComparisonRecord]) -> String {
    let mut out = String::new();

    for record in records {
        let band = record.band;
        out.push_str(&format!("Band {}Hz - {}Hz:\n", band.lowcut, band.highcut));
        out.push_str(&format!("  Track 1 - {}\n", describe(&record.track_1)));
        out.push_str(&format!("  Track 2 - {}\n", describe(&record.track_2)));
        match record.rms_difference_db() {
            Some(difference) => out.push_str(&format!(
                "  Track 1 is {difference:+.2} dB relative to track 2\n"
            )),
            None => out.push_str("  Level difference undefined (silent band)\n"),
        }
        out.push('\n');
    }

    out
}

pub fn render_analysis(path: &Path, results: &[(FrequencyBand, BandAnalysis)]) -> String {
    let mut out = format!("{}\n", path.display());
    for (band, analysis) in results {
        out.push_str(&format!("  {band}: {}\n", describe(analysis)));
    }
    out
}

fn describe(analysis: &BandAnalysis) -> String {
    format!(
        "RMS: {:.2}, Peak: {:.2}, Dominant Freq: {:.2}Hz, Least Dominant Freq: {:.2}Hz",
        analysis.rms, analysis.peak, analysis.dominant_freq, analysis.least_dominant_freq
    )
}
