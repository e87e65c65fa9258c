use crate::config::AudioConfig;
use bytes::Bytes;
use ffmpeg_sidecar::{download, paths::ffmpeg_path};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Mono sample buffer at a fixed sample rate, capped at the configured
/// maximum clip length by the decoder.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate_hz: u32,
    pub samples: Vec<f32>,
}

impl AudioBuffer {
    pub fn duration(&self) -> Duration {
        if self.sample_rate_hz == 0 {
            return Duration::from_secs(0);
        }
        let micros =
            (self.samples.len() as u128 * 1_000_000u128) / u128::from(self.sample_rate_hz);
        Duration::from_micros(micros.min(u128::from(u64::MAX)) as u64)
    }
}

/// A decoded clip together with the encoded source bytes, so the
/// transcription branch can reuse them without a second filesystem read.
#[derive(Clone, Debug)]
pub struct LoadedClip {
    pub encoded: Bytes,
    pub audio: AudioBuffer,
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("audio source unreadable: {0}")]
    SourceUnreadable(String),

    #[error("audio source is empty")]
    EmptySource,

    #[error("ffmpeg unavailable: {0}")]
    FfmpegUnavailable(String),

    #[error("ffmpeg failed: {0}")]
    FfmpegFailed(String),

    #[error("invalid pcm output: {0}")]
    InvalidPcm(String),

    #[error("decoded stream contained no samples")]
    NoSamples,
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Decodes an encoded audio file into mono f32 samples at the configured
/// sample rate, reading at most the configured clip length.
#[derive(Clone, Debug)]
pub struct AudioLoader {
    config: AudioConfig,
}

impl Default for AudioLoader {
    fn default() -> Self {
        Self {
            config: AudioConfig::default(),
        }
    }
}

impl AudioLoader {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    pub async fn load(&self, path: &Path) -> Result<LoadedClip> {
        let encoded = tokio::fs::read(path)
            .await
            .map_err(|e| DecodeError::SourceUnreadable(format!("{}: {e}", path.display())))?;
        if encoded.is_empty() {
            return Err(DecodeError::EmptySource);
        }
        let encoded = Bytes::from(encoded);

        self.ensure_ffmpeg_available()?;
        let samples = self.decode_with_ffmpeg(encoded.clone()).await?;
        if samples.is_empty() {
            return Err(DecodeError::NoSamples);
        }

        let audio = AudioBuffer {
            sample_rate_hz: self.config.sample_rate_hz,
            samples,
        };
        tracing::debug!(
            samples = audio.samples.len(),
            duration_ms = audio.duration().as_millis() as u64,
            "decoded clip"
        );
        Ok(LoadedClip { encoded, audio })
    }

    fn ensure_ffmpeg_available(&self) -> Result<()> {
        download::auto_download().map_err(|e| DecodeError::FfmpegUnavailable(e.to_string()))
    }

    fn parse_f32le_mono(raw: &[u8]) -> Result<Vec<f32>> {
        if !raw.len().is_multiple_of(4usize) {
            return Err(DecodeError::InvalidPcm(format!(
                "f32le byte length must be multiple of 4, got {}",
                raw.len()
            )));
        }
        let mut out = Vec::with_capacity(raw.len() / 4);
        for chunk in raw.chunks_exact(4) {
            out.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        Ok(out)
    }

    async fn decode_with_ffmpeg(&self, encoded: Bytes) -> Result<Vec<f32>> {
        let rate = self.config.sample_rate_hz.to_string();
        let max_secs = format!("{:.3}", self.config.max_clip_secs);

        let mut child = tokio::process::Command::new(ffmpeg_path())
            .args([
                "-hide_banner",
                "-nostdin",
                "-loglevel",
                "error",
                "-i",
                "pipe:0",
                "-vn",
                "-sn",
                "-dn",
                "-ac",
                "1",
                "-ar",
                &rate,
                "-t",
                &max_secs,
                "-f",
                "f32le",
                "-acodec",
                "pcm_f32le",
                "pipe:1",
            ])
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            DecodeError::FfmpegFailed("ffmpeg stdin unavailable (pipe not created)".to_owned())
        })?;
        let mut stdout = child.stdout.take().ok_or_else(|| {
            DecodeError::FfmpegFailed("ffmpeg stdout unavailable (pipe not created)".to_owned())
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            DecodeError::FfmpegFailed("ffmpeg stderr unavailable (pipe not created)".to_owned())
        })?;

        let stdin_task = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            stdin.write_all(&encoded).await?;
            stdin.shutdown().await?;
            Ok::<(), std::io::Error>(())
        });

        let stdout_task = tokio::spawn(async move {
            use tokio::io::AsyncReadExt;
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).await?;
            Ok::<Vec<u8>, std::io::Error>(buf)
        });

        let stderr_task = tokio::spawn(async move {
            use tokio::io::AsyncReadExt;
            let mut buf = Vec::new();
            stderr.read_to_end(&mut buf).await?;
            Ok::<Vec<u8>, std::io::Error>(buf)
        });

        let status = child
            .wait()
            .await
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?;

        // ffmpeg may exit before consuming all of its stdin (the -t cap);
        // a broken pipe on the writer side is expected then.
        if let Err(e) = stdin_task
            .await
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?
        {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(DecodeError::FfmpegFailed(e.to_string()));
            }
        }

        let stdout_bytes = stdout_task
            .await
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?;

        let stderr_bytes = stderr_task
            .await
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?;

        if !status.success() {
            let stderr_s = String::from_utf8_lossy(&stderr_bytes).trim().to_owned();
            return Err(DecodeError::FfmpegFailed(format!(
                "exit_code={:?} stderr={stderr_s}",
                status.code()
            )));
        }

        Self::parse_f32le_mono(&stdout_bytes)
    }
}
