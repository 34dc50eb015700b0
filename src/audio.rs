//! Waveform helpers: silence buffers, validity checks, PCM conversion and WAV output.

use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::error::SynthesisError;

/// Length of the universal fallback buffer.
pub const CANONICAL_SILENCE_SECS: f32 = 0.1;

/// `secs` seconds of zero samples at `sample_rate`.
pub fn silence(secs: f32, sample_rate: u32) -> Vec<f32> {
    vec![0.0; (sample_rate as f64 * secs.max(0.0) as f64) as usize]
}

/// The fallback result used whenever synthesis cannot produce valid audio.
pub fn canonical_silence(sample_rate: u32) -> Vec<i16> {
    vec![0; (sample_rate as f64 * CANONICAL_SILENCE_SECS as f64) as usize]
}

/// Model output is usable when it has samples and at least one is non-zero.
pub fn is_valid_waveform(samples: &[f32]) -> bool {
    !samples.is_empty() && samples.iter().any(|&s| s != 0.0)
}

/// Peak-normalize to full scale and convert to signed 16-bit PCM.
pub fn to_pcm16(samples: &[f32]) -> Result<Vec<i16>, SynthesisError> {
    if samples.is_empty() {
        return Err(SynthesisError::post_process("waveform is empty"));
    }
    let mut peak = 0.0f32;
    for &s in samples {
        if !s.is_finite() {
            return Err(SynthesisError::post_process("waveform contains non-finite samples"));
        }
        peak = peak.max(s.abs());
    }
    if peak == 0.0 {
        return Err(SynthesisError::post_process("waveform peak is zero"));
    }
    let scale = i16::MAX as f32 / peak;
    Ok(samples.iter().map(|&s| (s * scale) as i16).collect())
}

/// Write mono 16-bit samples to a WAV file.
pub fn save_wav(samples: &[i16], path: &Path, sample_rate: u32) -> Result<(), SynthesisError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .map_err(|e| SynthesisError::runtime("create WAV file", e))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| SynthesisError::runtime("write WAV sample", e))?;
    }
    writer
        .finalize()
        .map_err(|e| SynthesisError::runtime("finalize WAV file", e))
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn canonical_silence_is_tenth_of_a_second() {
        assert_eq!(canonical_silence(44_100).len(), 4_410);
        assert_eq!(canonical_silence(22_050).len(), 2_205);
        assert!(canonical_silence(44_100).iter().all(|&s| s == 0));
    }

    #[test]
    fn silence_length_follows_rate() {
        assert_eq!(silence(0.5, 44_100).len(), 22_050);
        assert!(silence(-1.0, 44_100).is_empty());
    }

    #[test]
    fn validity_rejects_empty_and_all_zero() {
        assert!(!is_valid_waveform(&[]));
        assert!(!is_valid_waveform(&[0.0; 16]));
        assert!(is_valid_waveform(&[0.0, 0.01, 0.0]));
    }

    #[test]
    fn pcm16_normalizes_to_full_scale() {
        let pcm = to_pcm16(&[0.0, 0.25, -0.5]).unwrap();
        assert_eq!(pcm, vec![0, 16_383, -32_767]);
    }

    #[test]
    fn pcm16_rejects_pathological_input() {
        assert_eq!(to_pcm16(&[]).unwrap_err().kind(), "post_process");
        assert_eq!(to_pcm16(&[0.0, 0.0]).unwrap_err().kind(), "post_process");
        assert_eq!(
            to_pcm16(&[0.1, f32::NAN]).unwrap_err().kind(),
            "post_process"
        );
    }

    #[test]
    fn save_wav_writes_riff_header() {
        let temp_file = NamedTempFile::new().unwrap();
        save_wav(&[0, 100, -100, 0], temp_file.path(), 44_100).unwrap();

        let mut buffer = Vec::new();
        std::fs::File::open(temp_file.path())
            .unwrap()
            .read_to_end(&mut buffer)
            .unwrap();
        assert_eq!(&buffer[0..4], b"RIFF");
    }
}
