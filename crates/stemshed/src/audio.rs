//! Audio decoding for analysis.

use std::path::Path;

use anyhow::{Context, Result};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decode an audio file to mono f32 samples, returning `(samples, sample_rate)`.
///
/// Handles every upload format we accept (WAV, MP3, FLAC, M4A/AAC) via
/// Symphonia. Multichannel input is downmixed by averaging channels.
pub fn read_audio_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open audio file: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("unsupported audio format: {}", path.display()))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .context("no audio track found")?
        .clone();
    let sample_rate = track
        .codec_params
        .sample_rate
        .context("could not determine sample rate")?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("failed to create audio decoder")?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e).context("error reading audio packet"),
        };

        if packet.track_id() != track.id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(e).context("error decoding audio"),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);

        if channels <= 1 {
            samples.extend_from_slice(buf.samples());
        } else {
            for frame in buf.samples().chunks_exact(channels) {
                samples.push(frame.iter().sum::<f32>() / channels as f32);
            }
        }
    }

    Ok((samples, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use tempfile::TempDir;

    fn write_wav(path: &Path, channels: u16, samples: &[f32]) {
        let spec = WavSpec {
            channels,
            sample_rate: 22_050,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn reads_mono_wav_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mono.wav");
        write_wav(&path, 1, &[0.1, -0.2, 0.3, -0.4]);

        let (samples, sample_rate) = read_audio_mono(&path).unwrap();
        assert_eq!(sample_rate, 22_050);
        assert_eq!(samples.len(), 4);
        assert!((samples[0] - 0.1).abs() < 1e-6);
        assert!((samples[3] + 0.4).abs() < 1e-6);
    }

    #[test]
    fn downmixes_stereo_by_averaging() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stereo.wav");
        // Interleaved L/R frames: (1.0, 0.0) and (0.5, -0.5)
        write_wav(&path, 2, &[1.0, 0.0, 0.5, -0.5]);

        let (samples, _) = read_audio_mono(&path).unwrap();
        assert_eq!(samples.len(), 2);
        assert!((samples[0] - 0.5).abs() < 1e-6);
        assert!(samples[1].abs() < 1e-6);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = read_audio_mono(Path::new("/nonexistent/audio.wav")).unwrap_err();
        assert!(err.to_string().contains("failed to open"));
    }
}
