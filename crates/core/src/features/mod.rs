mod spectral;

use crate::decode::AudioBuffer;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAD_FLOOR_SAMPLES: usize = 22_050;

/// Analysis parameters for the feature extractor. The defaults pin down the
/// numeric contract: a fixed 275-value vector (1 zcr + 12 chroma + 128 mfcc +
/// 128 mel + 6 tonnetz) for any input duration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureConfig {
    /// Buffers shorter than this are zero-padded up to it before analysis.
    pub pad_floor_samples: usize,
    /// Upper bound on the spectral window; shrinks to the signal length so
    /// short clips never exceed the available samples.
    pub max_window: usize,
    pub zcr_frame: usize,
    pub zcr_hop: usize,
    pub mel_bands: usize,
    pub mel_hop: usize,
    pub chroma_bins: usize,
    pub hpss_window: usize,
    pub hpss_hop: usize,
    pub hpss_kernel: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            pad_floor_samples: DEFAULT_PAD_FLOOR_SAMPLES,
            max_window: 512,
            zcr_frame: 2_048,
            zcr_hop: 512,
            mel_bands: 128,
            mel_hop: 512,
            chroma_bins: 12,
            hpss_window: 2_048,
            hpss_hop: 512,
            hpss_kernel: 31,
        }
    }
}

impl FeatureConfig {
    /// Length of the extracted vector: zcr + chroma + mfcc + mel + tonnetz.
    pub fn vector_len(&self) -> usize {
        1 + self.chroma_bins + 2 * self.mel_bands + spectral::TONNETZ_DIMS
    }
}

/// Fixed-length concatenation of the time-averaged feature bands, in the
/// order zcr, chroma, mfcc, mel, tonnetz.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FeatureError {
    #[error("signal is empty")]
    EmptySignal,

    #[error("{stage} analysis produced no frames")]
    NoFrames { stage: &'static str },

    #[error("{stage} produced a non-finite value")]
    NonFinite { stage: &'static str },
}

pub type Result<T> = std::result::Result<T, FeatureError>;

#[derive(Clone, Debug, Default)]
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Computes the feature vector for a clip. The output length depends only
    /// on the configuration, never on the clip duration.
    pub fn extract(&self, audio: &AudioBuffer) -> Result<FeatureVector> {
        if audio.samples.is_empty() {
            return Err(FeatureError::EmptySignal);
        }
        let sr = audio.sample_rate_hz as f32;

        let mut data = audio.samples.clone();
        if data.len() < self.config.pad_floor_samples {
            data.resize(self.config.pad_floor_samples, 0.0);
        }

        let mut out = Vec::with_capacity(self.config.vector_len());

        let zcr = spectral::zero_crossing_rate(&data, self.config.zcr_frame, self.config.zcr_hop);
        out.push(reduce(&zcr, "zcr")?);

        // Spectral resolution adapts to signals shorter than the default
        // window, so a short clip degrades instead of failing outright.
        let n_fft = self.config.max_window.min(data.len());

        let mag = spectral::stft_magnitude(&data, n_fft, (n_fft / 4).max(1));
        if mag.is_empty() {
            return Err(FeatureError::NoFrames { stage: "chroma" });
        }
        let chroma_fb = spectral::chroma_filterbank(sr, n_fft, self.config.chroma_bins);
        let mut chroma = spectral::apply_filterbank(&chroma_fb, &mag);
        spectral::normalize_inf(&mut chroma);
        extend(&mut out, spectral::frame_mean(&chroma), "chroma")?;

        // One power mel spectrogram feeds both the cepstral and the mel bands.
        let mut power = spectral::stft_magnitude(&data, n_fft, self.config.mel_hop);
        if power.is_empty() {
            return Err(FeatureError::NoFrames { stage: "mel" });
        }
        spectral::square(&mut power);
        let mel_fb = spectral::mel_filterbank(sr, n_fft, self.config.mel_bands);
        let mel = spectral::apply_filterbank(&mel_fb, &power);

        let mut mel_db = mel.clone();
        spectral::power_to_db(&mut mel_db, 80.0);
        let mfcc = spectral::dct_ortho(&mel_db);
        extend(&mut out, spectral::frame_mean(&mfcc), "mfcc")?;
        extend(&mut out, spectral::frame_mean(&mel), "mel")?;

        // Tonnetz reads only the harmonic part of the signal.
        let hpss_window = self.config.hpss_window.min(data.len());
        let hpss_mag = spectral::stft_magnitude(&data, hpss_window, self.config.hpss_hop);
        if hpss_mag.is_empty() {
            return Err(FeatureError::NoFrames { stage: "tonnetz" });
        }
        let harmonic = spectral::harmonic_magnitude(&hpss_mag, self.config.hpss_kernel);
        let ton_fb = spectral::chroma_filterbank(sr, hpss_window, self.config.chroma_bins);
        let ton_chroma = spectral::apply_filterbank(&ton_fb, &harmonic);
        let tonnetz = spectral::tonnetz_projection(&ton_chroma);
        extend(&mut out, spectral::frame_mean(&tonnetz), "tonnetz")?;

        debug_assert_eq!(out.len(), self.config.vector_len());
        Ok(FeatureVector(out))
    }
}

fn reduce(values: &[f32], stage: &'static str) -> Result<f32> {
    if values.is_empty() {
        return Err(FeatureError::NoFrames { stage });
    }
    let mean =
        (values.iter().map(|&v| f64::from(v)).sum::<f64>() / values.len() as f64) as f32;
    if !mean.is_finite() {
        return Err(FeatureError::NonFinite { stage });
    }
    Ok(mean)
}

fn extend(out: &mut Vec<f32>, band: Vec<f32>, stage: &'static str) -> Result<()> {
    if band.is_empty() {
        return Err(FeatureError::NoFrames { stage });
    }
    if band.iter().any(|v| !v.is_finite()) {
        return Err(FeatureError::NonFinite { stage });
    }
    out.extend(band);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(freq: f32, secs: f32) -> AudioBuffer {
        let sr = 44_100u32;
        let n = (secs * sr as f32) as usize;
        AudioBuffer {
            sample_rate_hz: sr,
            samples: (0..n)
                .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sr as f32).sin())
                .collect(),
        }
    }

    #[test]
    fn vector_length_is_constant_across_durations() {
        let extractor = FeatureExtractor::default();
        let expected = extractor.config().vector_len();
        assert_eq!(expected, 275);
        for secs in [0.1f32, 0.5, 1.0, 3.0] {
            let fv = extractor.extract(&clip(440.0, secs)).unwrap();
            assert_eq!(fv.len(), expected, "length drifted at {secs}s");
        }
    }

    #[test]
    fn short_clip_matches_explicitly_padded_clip() {
        let extractor = FeatureExtractor::default();
        let short = clip(300.0, 0.1);
        let mut padded = short.clone();
        padded.samples.resize(DEFAULT_PAD_FLOOR_SAMPLES, 0.0);
        assert!(short.samples.len() < DEFAULT_PAD_FLOOR_SAMPLES);
        assert_eq!(
            extractor.extract(&short).unwrap(),
            extractor.extract(&padded).unwrap()
        );
    }

    #[test]
    fn padding_preserves_original_prefix() {
        let short = clip(300.0, 0.1);
        let mut padded = short.samples.clone();
        padded.resize(DEFAULT_PAD_FLOOR_SAMPLES, 0.0);
        assert_eq!(padded.len(), DEFAULT_PAD_FLOOR_SAMPLES);
        assert_eq!(&padded[..short.samples.len()], short.samples.as_slice());
        assert!(padded[short.samples.len()..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn empty_signal_is_rejected() {
        let extractor = FeatureExtractor::default();
        let empty = AudioBuffer {
            sample_rate_hz: 44_100,
            samples: Vec::new(),
        };
        assert!(matches!(
            extractor.extract(&empty),
            Err(FeatureError::EmptySignal)
        ));
    }

    #[test]
    fn non_finite_input_is_surfaced() {
        let extractor = FeatureExtractor::default();
        let mut bad = clip(440.0, 0.6);
        bad.samples[1_000] = f32::NAN;
        assert!(matches!(
            extractor.extract(&bad),
            Err(FeatureError::NonFinite { .. })
        ));
    }

    #[test]
    fn silence_yields_finite_features() {
        let extractor = FeatureExtractor::default();
        let silence = AudioBuffer {
            sample_rate_hz: 44_100,
            samples: vec![0.0; 22_050],
        };
        let fv = extractor.extract(&silence).unwrap();
        assert!(fv.as_slice().iter().all(|v| v.is_finite()));
        // No crossings and no chroma energy in silence.
        assert_eq!(fv.as_slice()[0], 0.0);
    }

    #[test]
    fn tone_produces_nonzero_chroma_energy() {
        let extractor = FeatureExtractor::default();
        let fv = extractor.extract(&clip(440.0, 1.0)).unwrap();
        let chroma = &fv.as_slice()[1..13];
        assert!(chroma.iter().any(|&v| v > 0.0));
    }
}
