use std::path::Path;

use anyhow::{anyhow, bail, Context};
use freqlens::Signal;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::{
    audio::AudioBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::{debug, info, instrument, trace, warn};

/// Decodes `path` into a mono signal at `target_sample_rate`, averaging all
/// channels and resampling when the file was recorded at a different rate.
#[instrument(level = "trace")]
pub fn load(path: &Path, target_sample_rate: u32) -> anyhow::Result<Signal> {
    debug!("opening file");
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let mut probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("unsupported audio format in {}", path.display()))?;

    let metadata = probed.metadata.get();
    trace!(?metadata, "read metadata");
    let format = &mut probed.format;
    let tracks = format.tracks();
    if tracks.len() != 1 {
        warn!(?tracks, "file has multiple tracks, using the first audio one");
    }
    let track = tracks
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("no audio track in {}", path.display()))?;
    info!(params = ?track.codec_params, "read codec params");

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("no decoder for codec")?;
    let track_id = track.id;
    let mut source_rate = track.codec_params.sample_rate;

    let mut channels: Vec<Vec<f32>> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(err) if is_end_of_stream(&err) => break,
            Err(err) => return Err(err).context("reading packets failed"),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(Error::DecodeError(err)) => {
                warn!(err, "skipping undecodable packet");
                continue;
            }
            Err(err) => return Err(err).context("decoding failed"),
        };
        source_rate = Some(decoded.spec().rate);

        let mut converted: AudioBuffer<f32> =
            AudioBuffer::new(decoded.capacity() as u64, *decoded.spec());
        decoded.convert(&mut converted);
        let planes = converted.planes();
        let planes_slice = planes.planes();
        if channels.len() != planes_slice.len() {
            trace!("resizing channels due to size mismatch");
            channels.resize_with(planes_slice.len(), Vec::new);
        }
        channels
            .iter_mut()
            .zip(planes_slice)
            .for_each(|(channel, plane)| channel.extend_from_slice(plane));
    }

    let source_rate = source_rate.ok_or_else(|| anyhow!("unknown sample rate"))?;
    let mono = downmix(&channels);
    if mono.is_empty() {
        bail!("no audio decoded from {}", path.display());
    }
    debug!(samples = mono.len(), channels = channels.len(), source_rate, "decoded");

    let samples = if source_rate == target_sample_rate {
        mono
    } else {
        resample(mono, source_rate, target_sample_rate)?
    };

    Ok(Signal::new(
        samples.into_iter().map(f64::from).collect(),
        target_sample_rate,
    )?)
}

/// Symphonia reports the end of a stream as an unexpected eof io error.
fn is_end_of_stream(err: &Error) -> bool {
    matches!(err, Error::IoError(err) if err.kind() == std::io::ErrorKind::UnexpectedEof)
}

fn downmix(channels: &[Vec<f32>]) -> Vec<f32> {
    let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
    let count = channels.len() as f32;

    (0..frames)
        .map(|frame| channels.iter().map(|channel| channel[frame]).sum::<f32>() / count)
        .collect()
}

#[instrument(skip(samples), fields(len = samples.len()), level = "trace")]
fn resample(samples: Vec<f32>, from: u32, to: u32) -> anyhow::Result<Vec<f32>> {
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = to as f64 / from as f64;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, samples.len(), 1)
        .context("failed to build resampler")?;
    let delay = resampler.output_delay();
    let expected = (samples.len() as f64 * ratio).ceil() as usize;

    let mut resampled = resampler
        .process(&[samples], None)
        .context("resampling failed")?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("resampler returned no channels"))?;

    // the sinc filter lags by `delay` frames, flush it until the tail is out
    while resampled.len() < delay + expected {
        let tail = resampler
            .process_partial::<Vec<f32>>(None, None)
            .context("flushing resampler failed")?;
        match tail.into_iter().next() {
            Some(tail) if !tail.is_empty() => resampled.extend(tail),
            _ => break,
        }
    }
    trace!(delay, expected, produced = resampled.len(), "flushed resampler");

    resampled.drain(..delay.min(resampled.len()));
    resampled.truncate(expected);
    Ok(resampled)
}

#[cfg(test)]
mod tests {
    use std::f32::consts::TAU;

    use super::*;

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, frames: &[Vec<f32>]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for frame in frames {
            for sample in frame {
                writer
                    .write_sample((sample * i16::MAX as f32) as i16)
                    .unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn downmix_averages_channels() {
        let mono = downmix(&[vec![1.0, 0.5, 0.0], vec![0.0, 0.5, 1.0]]);
        assert_eq!(mono, vec![0.5, 0.5, 0.5]);
        assert!(downmix(&[]).is_empty());
    }

    #[test]
    fn loads_stereo_wav_as_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let frames: Vec<Vec<f32>> = (0..4_410)
            .map(|i| {
                let left = 0.5 * (TAU * 440.0 * i as f32 / 44_100.0).sin();
                vec![left, -left]
            })
            .collect();
        write_wav(&path, 44_100, 2, &frames);

        let signal = load(&path, 44_100).unwrap();
        assert_eq!(signal.sample_rate(), 44_100);
        assert_eq!(signal.len(), 4_410);
        // opposite channels cancel out
        assert!(signal.samples().iter().all(|x| x.abs() < 1e-3));
    }

    #[test]
    fn resamples_to_target_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let frames: Vec<Vec<f32>> = (0..22_050)
            .map(|i| vec![0.5 * (TAU * 440.0 * i as f32 / 22_050.0).sin()])
            .collect();
        write_wav(&path, 22_050, 1, &frames);

        let signal = load(&path, 44_100).unwrap();
        assert_eq!(signal.sample_rate(), 44_100);
        assert_eq!(signal.len(), 44_100);

        // delay is trimmed, so output stays in phase with the source tone
        for j in 10_000..30_000 {
            let want = 0.5 * (std::f64::consts::TAU * 440.0 * j as f64 / 44_100.0).sin();
            let got = signal.samples()[j];
            assert!((got - want).abs() < 0.05, "sample {j}: {got} vs {want}");
        }
    }

    #[test]
    fn only_eof_ends_the_packet_stream() {
        use std::io::{Error as IoError, ErrorKind};

        assert!(is_end_of_stream(&Error::IoError(IoError::new(
            ErrorKind::UnexpectedEof,
            "end of stream"
        ))));
        assert!(!is_end_of_stream(&Error::IoError(IoError::new(
            ErrorKind::PermissionDenied,
            "denied"
        ))));
        assert!(!is_end_of_stream(&Error::ResetRequired));
        assert!(!is_end_of_stream(&Error::DecodeError("bad frame")));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("missing.wav"), 44_100).is_err());
    }
}
