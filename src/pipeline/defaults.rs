use crate::audio::to_pcm16;
use crate::error::SynthesisError;
use crate::pipeline::traits::WaveformPostProcessor;

/// Peak-normalizes the waveform and converts it to 16-bit PCM.
pub struct Pcm16Converter;

impl WaveformPostProcessor for Pcm16Converter {
    fn process(&self, waveform: &[f32]) -> Result<Vec<i16>, SynthesisError> {
        to_pcm16(waveform)
    }
}
