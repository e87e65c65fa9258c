//! Spectral primitives backing the feature extractor: framed analysis,
//! mel/chroma filterbanks, DCT, and harmonic/percussive masking.
//!
//! Frame layout throughout is frames-major: `frames[t][bin]`.

use rustfft::{num_complex::Complex, FftPlanner};

const A440_HZ: f64 = 440.0;
const SIGN_EPS: f32 = 1e-10;
const NORM_EPS: f32 = 1e-10;

pub(super) const TONNETZ_DIMS: usize = 6;

/// Periodic Hann window.
fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / n as f64).cos()) as f32)
        .collect()
}

/// Mirror-pads `x` by `pad` samples on each side (no edge duplication).
fn reflect_pad(x: &[f32], pad: usize) -> Vec<f32> {
    let n = x.len();
    let mut out = Vec::with_capacity(n + 2 * pad);
    for i in 0..pad {
        let idx = (pad - i).min(n - 1);
        out.push(x[idx]);
    }
    out.extend_from_slice(x);
    for i in 0..pad {
        let idx = n - 1 - (i + 1).min(n - 1);
        out.push(x[idx]);
    }
    out
}

/// Centered magnitude STFT: Hann window of `n_fft`, reflect padding of
/// `n_fft / 2` on both sides, `n_fft / 2 + 1` bins per frame.
pub(super) fn stft_magnitude(x: &[f32], n_fft: usize, hop: usize) -> Vec<Vec<f32>> {
    if n_fft == 0 || hop == 0 || x.is_empty() {
        return Vec::new();
    }
    let padded = reflect_pad(x, n_fft / 2);
    if padded.len() < n_fft {
        return Vec::new();
    }
    let n_frames = 1 + (padded.len() - n_fft) / hop;
    let n_bins = n_fft / 2 + 1;
    let window = hann_window(n_fft);

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let mut buffer = vec![Complex::new(0.0f32, 0.0f32); n_fft];

    let mut frames = Vec::with_capacity(n_frames);
    for t in 0..n_frames {
        let offset = t * hop;
        for i in 0..n_fft {
            buffer[i] = Complex::new(padded[offset + i] * window[i], 0.0);
        }
        fft.process(&mut buffer);
        let mut mag = Vec::with_capacity(n_bins);
        for bin in buffer.iter().take(n_bins) {
            mag.push(bin.norm());
        }
        frames.push(mag);
    }
    frames
}

/// Squares a magnitude spectrogram in place, yielding power.
pub(super) fn square(frames: &mut [Vec<f32>]) {
    for frame in frames.iter_mut() {
        for v in frame.iter_mut() {
            *v *= *v;
        }
    }
}

/// Per-frame zero-crossing rate over centered frames. Samples with magnitude
/// below `SIGN_EPS` count as positive, so a silent padded tail does not
/// register crossings against a positive signal.
pub(super) fn zero_crossing_rate(x: &[f32], frame: usize, hop: usize) -> Vec<f32> {
    if frame == 0 || hop == 0 || x.is_empty() {
        return Vec::new();
    }
    // Edge padding, matching centered framing of the other representations.
    let pad = frame / 2;
    let mut padded = Vec::with_capacity(x.len() + 2 * pad);
    padded.extend(std::iter::repeat(x[0]).take(pad));
    padded.extend_from_slice(x);
    padded.extend(std::iter::repeat(x[x.len() - 1]).take(pad));

    if padded.len() < frame {
        return Vec::new();
    }
    let negative: Vec<bool> = padded
        .iter()
        .map(|&v| if v.abs() <= SIGN_EPS { false } else { v < 0.0 })
        .collect();

    let n_frames = 1 + (padded.len() - frame) / hop;
    let mut rates = Vec::with_capacity(n_frames);
    for t in 0..n_frames {
        let offset = t * hop;
        let mut crossings = 0usize;
        for i in offset + 1..offset + frame {
            if negative[i] != negative[i - 1] {
                crossings += 1;
            }
        }
        rates.push(crossings as f32 / frame as f32);
    }
    rates
}

fn hz_to_mel(f: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f64.ln() / 27.0;
    if f >= min_log_hz {
        min_log_mel + (f / min_log_hz).ln() / logstep
    } else {
        f / f_sp
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f64.ln() / 27.0;
    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        f_sp * mel
    }
}

/// Triangular mel filterbank (Slaney scale, area-normalized), rows
/// `[n_mels][n_fft / 2 + 1]`.
pub(super) fn mel_filterbank(sr: f32, n_fft: usize, n_mels: usize) -> Vec<Vec<f32>> {
    let n_bins = n_fft / 2 + 1;
    let f_max = sr as f64 / 2.0;
    let mel_max = hz_to_mel(f_max);

    let mel_f: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(i as f64 * mel_max / (n_mels + 1) as f64))
        .collect();
    let fft_freqs: Vec<f64> = (0..n_bins)
        .map(|k| k as f64 * sr as f64 / n_fft as f64)
        .collect();

    let mut fb = Vec::with_capacity(n_mels);
    for m in 0..n_mels {
        let lower = mel_f[m];
        let center = mel_f[m + 1];
        let upper = mel_f[m + 2];
        let enorm = 2.0 / (upper - lower);
        let mut row = Vec::with_capacity(n_bins);
        for &f in &fft_freqs {
            let rising = if center > lower {
                (f - lower) / (center - lower)
            } else {
                0.0
            };
            let falling = if upper > center {
                (upper - f) / (upper - center)
            } else {
                0.0
            };
            let w = rising.min(falling).max(0.0) * enorm;
            row.push(w as f32);
        }
        fb.push(row);
    }
    fb
}

/// Log-frequency chroma filterbank: Gaussian bumps around each pitch class,
/// A440 reference, octave-weighted, rows rotated so row 0 is C.
/// Rows `[n_chroma][n_fft / 2 + 1]`.
pub(super) fn chroma_filterbank(sr: f32, n_fft: usize, n_chroma: usize) -> Vec<Vec<f32>> {
    let n_bins = n_fft / 2 + 1;
    let nc = n_chroma as f64;

    // Pitch position (in chroma bins) of every FFT bin; bin 0 is placed
    // 1.5 octaves below bin 1 to absorb DC energy.
    let mut frqbins = vec![0.0f64; n_fft];
    for k in 1..n_fft {
        let freq = k as f64 * sr as f64 / n_fft as f64;
        frqbins[k] = nc * (freq / (A440_HZ / 16.0)).log2();
    }
    frqbins[0] = frqbins[1] - 1.5 * nc;

    let mut binwidth = vec![1.0f64; n_fft];
    for k in 0..n_fft - 1 {
        binwidth[k] = (frqbins[k + 1] - frqbins[k]).max(1.0);
    }

    let n2 = (nc / 2.0).round();
    let mut wts = vec![vec![0.0f64; n_fft]; n_chroma];
    for (c, row) in wts.iter_mut().enumerate() {
        for k in 0..n_fft {
            let d = (frqbins[k] - c as f64 + n2 + 10.0 * nc).rem_euclid(nc) - n2;
            row[k] = (-0.5 * (2.0 * d / binwidth[k]).powi(2)).exp();
        }
    }

    // L2-normalize each FFT bin across pitch classes.
    for k in 0..n_fft {
        let norm: f64 = wts.iter().map(|row| row[k] * row[k]).sum::<f64>().sqrt();
        if norm > 1e-30 {
            for row in wts.iter_mut() {
                row[k] /= norm;
            }
        }
    }

    // Downweight bins far from the center octave (ctroct 5, width 2).
    for k in 0..n_fft {
        let w = (-0.5 * ((frqbins[k] / nc - 5.0) / 2.0).powi(2)).exp();
        for row in wts.iter_mut() {
            row[k] *= w;
        }
    }

    // Rotate so that row 0 corresponds to C rather than A.
    let roll = 3 * (n_chroma / 12);
    let mut fb = Vec::with_capacity(n_chroma);
    for c in 0..n_chroma {
        let src = &wts[(c + roll) % n_chroma];
        fb.push(src.iter().take(n_bins).map(|&v| v as f32).collect());
    }
    fb
}

/// Projects each frame through a filterbank: `out[t][r] = fb[r] . frames[t]`.
pub(super) fn apply_filterbank(fb: &[Vec<f32>], frames: &[Vec<f32>]) -> Vec<Vec<f32>> {
    frames
        .iter()
        .map(|frame| {
            fb.iter()
                .map(|row| {
                    let mut acc = 0.0f64;
                    for (w, v) in row.iter().zip(frame.iter()) {
                        acc += f64::from(*w) * f64::from(*v);
                    }
                    acc as f32
                })
                .collect()
        })
        .collect()
}

/// Scales each frame by its infinity norm, leaving silent frames untouched.
pub(super) fn normalize_inf(frames: &mut [Vec<f32>]) {
    for frame in frames.iter_mut() {
        let max = frame.iter().fold(0.0f32, |m, &v| m.max(v.abs()));
        if max > NORM_EPS {
            for v in frame.iter_mut() {
                *v /= max;
            }
        }
    }
}

/// Converts a power spectrogram to decibels (ref 1.0) and clamps the dynamic
/// range to `top_db` below the global peak.
pub(super) fn power_to_db(frames: &mut [Vec<f32>], top_db: f32) {
    let amin = 1e-10f32;
    let mut peak = f32::NEG_INFINITY;
    for frame in frames.iter_mut() {
        for v in frame.iter_mut() {
            *v = 10.0 * v.max(amin).log10();
            peak = peak.max(*v);
        }
    }
    let floor = peak - top_db;
    for frame in frames.iter_mut() {
        for v in frame.iter_mut() {
            *v = v.max(floor);
        }
    }
}

/// Orthonormal DCT-II along each frame.
pub(super) fn dct_ortho(frames: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let Some(first) = frames.first() else {
        return Vec::new();
    };
    let n = first.len();
    if n == 0 {
        return frames.to_vec();
    }
    let scale0 = (1.0 / n as f64).sqrt();
    let scale = (2.0 / n as f64).sqrt();
    let mut cos_table = vec![0.0f64; n * n];
    for k in 0..n {
        for i in 0..n {
            cos_table[k * n + i] =
                (std::f64::consts::PI / n as f64 * (i as f64 + 0.5) * k as f64).cos();
        }
    }

    frames
        .iter()
        .map(|frame| {
            (0..n)
                .map(|k| {
                    let mut acc = 0.0f64;
                    for i in 0..n {
                        acc += f64::from(frame[i]) * cos_table[k * n + i];
                    }
                    (acc * if k == 0 { scale0 } else { scale }) as f32
                })
                .collect()
        })
        .collect()
}

fn median_of(window: &mut [f32]) -> f32 {
    window.sort_unstable_by(f32::total_cmp);
    window[window.len() / 2]
}

/// Harmonic component of a magnitude spectrogram: median filtering along
/// time (harmonic) and frequency (percussive), combined into a soft mask
/// (power 2) applied to the input. Out-of-range taps read as zero.
pub(super) fn harmonic_magnitude(frames: &[Vec<f32>], kernel: usize) -> Vec<Vec<f32>> {
    let n_frames = frames.len();
    if n_frames == 0 {
        return Vec::new();
    }
    let n_bins = frames[0].len();
    let half = (kernel / 2) as isize;
    let mut window = vec![0.0f32; kernel.max(1)];

    let mut out = vec![vec![0.0f32; n_bins]; n_frames];
    for t in 0..n_frames {
        for f in 0..n_bins {
            // Median across time at fixed frequency.
            for (w, dt) in window.iter_mut().zip(-half..=half) {
                let tt = t as isize + dt;
                *w = if tt >= 0 && (tt as usize) < n_frames {
                    frames[tt as usize][f]
                } else {
                    0.0
                };
            }
            let harm = median_of(&mut window);

            // Median across frequency at fixed time.
            for (w, df) in window.iter_mut().zip(-half..=half) {
                let ff = f as isize + df;
                *w = if ff >= 0 && (ff as usize) < n_bins {
                    frames[t][ff as usize]
                } else {
                    0.0
                };
            }
            let perc = median_of(&mut window);

            let z = harm.max(perc);
            let mask = if z > 1e-30 {
                let h = (harm / z).powi(2);
                let p = (perc / z).powi(2);
                h / (h + p)
            } else {
                0.0
            };
            out[t][f] = frames[t][f] * mask;
        }
    }
    out
}

/// Projects L1-normalized chroma frames onto the six tonal-interval axes
/// (fifths, minor thirds, major thirds; sine and cosine components each).
pub(super) fn tonnetz_projection(chroma_frames: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let Some(first) = chroma_frames.first() else {
        return Vec::new();
    };
    let n_chroma = first.len();
    let radii = [1.0f64, 1.0, 1.0, 1.0, 0.5, 0.5];
    let scale = [7.0f64 / 6.0, 7.0 / 6.0, 3.0 / 2.0, 3.0 / 2.0, 2.0 / 3.0, 2.0 / 3.0];

    let mut phi = vec![vec![0.0f64; n_chroma]; TONNETZ_DIMS];
    for (j, row) in phi.iter_mut().enumerate() {
        for (c, v) in row.iter_mut().enumerate() {
            let mut pos = scale[j] * c as f64;
            if j % 2 == 0 {
                pos -= 0.5;
            }
            *v = radii[j] * (std::f64::consts::PI * pos).cos();
        }
    }

    chroma_frames
        .iter()
        .map(|chroma| {
            let l1: f32 = chroma.iter().map(|v| v.abs()).sum();
            let inv = if l1 > NORM_EPS { 1.0 / l1 } else { 1.0 };
            phi.iter()
                .map(|row| {
                    let mut acc = 0.0f64;
                    for (w, v) in row.iter().zip(chroma.iter()) {
                        acc += w * f64::from(*v * inv);
                    }
                    acc as f32
                })
                .collect()
        })
        .collect()
}

/// Mean across frames, one value per bin.
pub(super) fn frame_mean(frames: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = frames.first() else {
        return Vec::new();
    };
    let n_bins = first.len();
    let mut sums = vec![0.0f64; n_bins];
    for frame in frames {
        for (s, v) in sums.iter_mut().zip(frame.iter()) {
            *s += f64::from(*v);
        }
    }
    let count = frames.len() as f64;
    sums.into_iter().map(|s| (s / count) as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sr: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sr).sin())
            .collect()
    }

    #[test]
    fn stft_frame_count_and_bins() {
        let x = sine(440.0, 44_100.0, 22_050);
        let frames = stft_magnitude(&x, 512, 128);
        assert!(!frames.is_empty());
        assert_eq!(frames[0].len(), 257);
        // Centered analysis: one frame per hop over the padded signal.
        assert_eq!(frames.len(), 1 + 22_050 / 128);
    }

    #[test]
    fn stft_peak_tracks_input_frequency() {
        let sr = 44_100.0;
        let x = sine(2_000.0, sr, 22_050);
        let frames = stft_magnitude(&x, 512, 128);
        let mid = &frames[frames.len() / 2];
        let peak = mid
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        let expected = (2_000.0 / sr * 512.0).round() as usize;
        assert!(peak.abs_diff(expected) <= 1, "peak {peak} expected {expected}");
    }

    #[test]
    fn zcr_alternating_signal_is_near_one() {
        let x: Vec<f32> = (0..4_096).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let rates = zero_crossing_rate(&x, 2_048, 512);
        assert!(!rates.is_empty());
        for r in rates {
            assert!(r > 0.9, "rate {r} should be close to 1");
        }
    }

    #[test]
    fn zcr_constant_signal_is_zero() {
        let x = vec![0.5f32; 4_096];
        let rates = zero_crossing_rate(&x, 2_048, 512);
        assert!(rates.iter().all(|&r| r == 0.0));
    }

    #[test]
    fn mel_filterbank_rows_cover_spectrum() {
        let fb = mel_filterbank(44_100.0, 512, 128);
        assert_eq!(fb.len(), 128);
        assert_eq!(fb[0].len(), 257);
        for (m, row) in fb.iter().enumerate() {
            assert!(row.iter().all(|&w| w >= 0.0));
            assert!(row.iter().any(|&w| w > 0.0), "mel row {m} is empty");
        }
    }

    #[test]
    fn chroma_filterbank_a440_lands_on_a() {
        let sr = 44_100.0;
        let fb = chroma_filterbank(sr, 4_096, 12);
        let bin = (440.0 / sr * 4_096.0).round() as usize;
        let strongest = (0..12).max_by(|&a, &b| fb[a][bin].total_cmp(&fb[b][bin])).unwrap();
        // Row 0 is C, so A is row 9.
        assert_eq!(strongest, 9);
    }

    #[test]
    fn dct_of_constant_concentrates_in_dc() {
        let frames = vec![vec![1.0f32; 16]];
        let out = dct_ortho(&frames);
        assert!((out[0][0] - 4.0).abs() < 1e-5);
        for &v in &out[0][1..] {
            assert!(v.abs() < 1e-5);
        }
    }

    #[test]
    fn power_to_db_clamps_dynamic_range() {
        let mut frames = vec![vec![1.0f32, 1e-12]];
        power_to_db(&mut frames, 80.0);
        assert!((frames[0][0] - 0.0).abs() < 1e-5);
        assert!((frames[0][1] - (-80.0)).abs() < 1e-5);
    }

    #[test]
    fn harmonic_mask_keeps_steady_tone() {
        // A bin that is loud in every frame is harmonic; an isolated burst
        // in one frame is percussive and should be attenuated.
        let mut frames = vec![vec![0.0f32; 8]; 64];
        for frame in frames.iter_mut() {
            frame[3] = 1.0;
        }
        frames[32] = vec![1.0; 8];
        let out = harmonic_magnitude(&frames, 31);
        assert!(out[16][3] > 0.9, "steady tone suppressed: {}", out[16][3]);
        assert!(out[32][6] < 0.1, "burst survived: {}", out[32][6]);
    }

    #[test]
    fn tonnetz_projection_is_six_dimensional() {
        let chroma = vec![vec![0.1f32; 12]; 5];
        let out = tonnetz_projection(&chroma);
        assert_eq!(out.len(), 5);
        assert!(out.iter().all(|f| f.len() == TONNETZ_DIMS));
    }

    #[test]
    fn frame_mean_averages_per_bin() {
        let frames = vec![vec![1.0f32, 3.0], vec![3.0, 5.0]];
        let mean = frame_mean(&frames);
        assert_eq!(mean, vec![2.0, 4.0]);
    }
}
