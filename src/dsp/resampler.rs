// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Rational resampler: changes a stream's sample rate by an exact `U/D`
//! ratio using a single pair of fixed-size FFTs per call (spec.md 4.3).

use num_complex::Complex;
use thiserror::Error;

use super::fft::{FftEngine, FftOpt};
use super::filter::{dtft_at, synth_impulse_response, WindowKind};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResamplerError {
    #[error("unworkable rate pair: {0}")]
    BadRate(String),
    #[error("resampler buffer size mismatch: in.len={in_len} out.len={out_len}, required in={expected_in} out={expected_out}")]
    BadBufferSize {
        in_len: usize,
        out_len: usize,
        expected_in: usize,
        expected_out: usize,
    },
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// `true` if `n` is already a "good size" (no prime factor above 7).
fn is_7_smooth(n: u64) -> bool {
    if n == 0 || n > u32::MAX as u64 {
        return false;
    }
    FftEngine::good_size(n as u32) as u64 == n
}

/// Rational resampler changing a stream's rate from `Fin` to `Fout` by an
/// exact `U/D` ratio, using overlap-block FFT resampling (spec.md 4.3).
///
/// Each call consumes exactly [`Resampler::input_len`] samples and produces
/// exactly [`Resampler::output_len`] samples. The anti-alias filter is
/// applied directly in the frequency domain by pointwise multiplication of
/// the forward transform, so `Lx` doubles as both the analysis length and
/// the filter's frequency-domain image length.
pub struct Resampler {
    u: u32,
    d: u32,
    lx: usize,
    ly: usize,
    n_taps: usize,
    h_time: Vec<f32>,
    h_freq: Vec<Complex<f32>>,
    in_fft: FftEngine,
    out_fft: FftEngine,
    freq_scratch: Vec<Complex<f32>>,
    spectrum: Vec<Complex<f32>>,
    time_scratch: Vec<Complex<f32>>,
    history: Vec<Complex<f32>>,
    discard_count: usize,
    scale: f32,
}

impl Resampler {
    /// Build a resampler converting `fin` Hz to `fout` Hz, analyzing blocks
    /// spanning at least `time_span` seconds of input (spec.md 4.3 step 0).
    pub fn new(fin: f64, fout: f64, time_span: f64) -> Result<Self, ResamplerError> {
        if fin <= 0.0 || fout <= 0.0 {
            return Err(ResamplerError::BadRate(format!(
                "sample rates must be positive (fin={fin}, fout={fout})"
            )));
        }
        if time_span <= 0.0 {
            return Err(ResamplerError::BadRate(format!(
                "time_span must be positive (got {time_span})"
            )));
        }

        let fin_i = fin.round() as u64;
        let fout_i = fout.round() as u64;
        if fin_i == 0 || fout_i == 0 {
            return Err(ResamplerError::BadRate(
                "sample rates must round to a positive integer Hz".to_string(),
            ));
        }

        let g = gcd(fin_i, fout_i);
        let u = (fout_i / g) as u32;
        let d = (fin_i / g) as u32;

        // Smallest multiple of D that is >= T*Fin and already a good
        // (7-smooth) FFT size, so Lx stays exactly divisible by D.
        let min_samples = (time_span * fin).ceil() as u64;
        let mut k = min_samples.div_ceil(d as u64).max(1);
        let lx = loop {
            let candidate = k * d as u64;
            if is_7_smooth(candidate) {
                break candidate;
            }
            k += 1;
            if k > min_samples.div_ceil(d as u64).max(1) + 10_000 {
                return Err(ResamplerError::BadRate(format!(
                    "could not find a good analysis length for fin={fin} fout={fout} time_span={time_span}"
                )));
            }
        } as usize;
        let ly = lx * u as usize / d as usize;

        if lx > u32::MAX as usize || ly > u32::MAX as usize {
            return Err(ResamplerError::BadRate(
                "analysis length overflowed a practical FFT size".to_string(),
            ));
        }

        // Anti-alias low-pass at the Nyquist of the slower of the two rates.
        let nyquist_new = fin.min(fout) as f32 / 2.0;
        let transition = (nyquist_new * 0.1).max(1.0);
        let stopband_db = 50.0f32;
        let raw_taps = (fin as f32 * stopband_db / (22.0 * transition)).ceil().max(1.0) as usize;
        let n_taps = raw_taps | 1;
        if n_taps >= lx {
            return Err(ResamplerError::BadRate(format!(
                "time_span {time_span} is too short to hold the anti-alias filter ({n_taps} taps, Lx={lx})"
            )));
        }

        let h_time_raw = synth_impulse_response(-nyquist_new, nyquist_new, fin as f32, n_taps, WindowKind::Hann);
        let peak = dtft_at(&h_time_raw, 0.0, fin as f32).norm();
        let scale_h = if peak > 1e-12 { 1.0 / peak } else { 1.0 };
        let h_time: Vec<f32> = h_time_raw.iter().map(|&c| c * scale_h).collect();

        let mut h_padded: Vec<Complex<f32>> = h_time.iter().map(|&c| Complex::new(c, 0.0)).collect();
        h_padded.resize(lx, Complex::new(0.0, 0.0));

        let mut in_fft = FftEngine::new(lx, FftOpt::Estimate);
        let mut h_freq = vec![Complex::new(0.0, 0.0); lx];
        in_fft.fft(&h_padded, &mut h_freq).expect("sized correctly");

        let out_fft = FftEngine::new(ly, FftOpt::Estimate);
        let discard_count = (n_taps as u64 * u as u64 / d as u64) as usize;

        tracing::debug!(
            fin, fout, u, d, lx, ly, n_taps, discard_count, "Resampler::new synthesized"
        );

        Ok(Self {
            u,
            d,
            lx,
            ly,
            n_taps,
            h_time,
            h_freq,
            in_fft,
            out_fft,
            freq_scratch: vec![Complex::new(0.0, 0.0); lx],
            spectrum: vec![Complex::new(0.0, 0.0); ly],
            time_scratch: vec![Complex::new(0.0, 0.0); ly],
            history: vec![Complex::new(0.0, 0.0); d as usize],
            discard_count,
            scale: u as f32 / lx as f32,
        })
    }

    /// Interpolation factor `U` (`Fout / gcd(Fin, Fout)`).
    pub fn interpolation(&self) -> u32 {
        self.u
    }

    /// Decimation factor `D` (`Fin / gcd(Fin, Fout)`).
    pub fn decimation(&self) -> u32 {
        self.d
    }

    /// Required input buffer length, `Lx`.
    pub fn input_len(&self) -> usize {
        self.lx
    }

    /// Required output buffer length, `Ly = Lx * U / D`.
    pub fn output_len(&self) -> usize {
        self.ly
    }

    /// `getInputBufferSize` (spec.md 6): alias for [`Resampler::input_len`].
    pub fn input_buffer_size(&self) -> usize {
        self.lx
    }

    /// `getOutputBufferSize` (spec.md 6): alias for [`Resampler::output_len`].
    pub fn output_buffer_size(&self) -> usize {
        self.ly
    }

    /// Tap count of the internal anti-alias filter (`getFilterLength`,
    /// spec.md 6).
    pub fn filter_length(&self) -> usize {
        self.n_taps
    }

    /// Number of leading output samples of every call that fall in the
    /// circular-boundary zone and are reconstructed from `history` rather
    /// than trusted from the raw FFT pipeline output (spec.md 4.3 step 6).
    /// On the very first call `history` is still all zeros, so that call's
    /// boundary region is the only one not anchored to real prior samples.
    pub fn discard_count(&self) -> usize {
        self.discard_count
    }

    /// Last `D` raw input samples retained across calls (spec.md 4.3 step 6).
    pub fn history(&self) -> &[Complex<f32>] {
        &self.history
    }

    /// Apply the resampler to one `Lx`-sample block, producing one
    /// `Ly`-sample block (spec.md 4.3 steps 1-6).
    pub fn apply(
        &mut self,
        input: &[Complex<f32>],
        output: &mut [Complex<f32>],
    ) -> Result<(), ResamplerError> {
        if input.len() != self.lx || output.len() != self.ly {
            return Err(ResamplerError::BadBufferSize {
                in_len: input.len(),
                out_len: output.len(),
                expected_in: self.lx,
                expected_out: self.ly,
            });
        }

        self.in_fft
            .fft(input, &mut self.freq_scratch)
            .expect("sized correctly");

        for (x, &h) in self.freq_scratch.iter_mut().zip(self.h_freq.iter()) {
            *x *= h;
        }

        let half = self.lx.min(self.ly) / 2;
        for v in self.spectrum.iter_mut() {
            *v = Complex::new(0.0, 0.0);
        }
        self.spectrum[..half].copy_from_slice(&self.freq_scratch[..half]);
        let ly = self.ly;
        let lx = self.lx;
        self.spectrum[ly - half..].copy_from_slice(&self.freq_scratch[lx - half..]);

        self.out_fft
            .ifft(&self.spectrum, &mut self.time_scratch)
            .expect("sized correctly");

        for (o, y) in output.iter_mut().zip(self.time_scratch.iter()) {
            *o = y * self.scale;
        }

        // The first `discard_count` output samples of every call are
        // contaminated by the block FFT's circular (wrap-around) boundary:
        // the anti-alias filter has `n_taps` taps of memory that, at index
        // 0, reach back into the *previous* call's tail rather than wrapping
        // to the end of the current block. Patch them with a direct
        // time-domain convolution against `history` (the previous call's
        // last `D` input samples), which is exact for the filtering step;
        // the output-rate position is located by nearest-sample mapping
        // (`Fin/Lx == Fout/Ly` makes this mapping exact on the input side,
        // approximate only in how a fractional output instant rounds to an
        // input sample) rather than full band-limited interpolation, since
        // this patch only ever covers the narrow boundary zone that is
        // replaced on every call and so never accumulates error.
        self.patch_boundary(input, output);

        let d = self.d as usize;
        self.history.copy_from_slice(&input[input.len() - d..]);

        Ok(())
    }

    /// Recompute `output[0..discard_count]` from `history` (this call's
    /// leading context) and the start of `input` via direct FIR convolution,
    /// replacing the circularly-corrupted values the FFT pipeline produced
    /// there (spec.md 4.3 step 6 / 9 design note).
    fn patch_boundary(&mut self, input: &[Complex<f32>], output: &mut [Complex<f32>]) {
        let n = self.discard_count.min(output.len());
        if n == 0 {
            return;
        }

        let left_ctx = self.n_taps.saturating_sub(1);
        let u = self.u.max(1) as u64;
        let d = self.d as u64;
        // Largest input-rate index (relative to `input[0]`) needed to
        // produce output sample `n - 1`.
        let right_len = ((n as u64 - 1) * d / u) as usize + 1;
        let right_len = right_len.min(input.len());

        let total = left_ctx + right_len;
        let mut ext = vec![Complex::new(0.0f32, 0.0); total];
        let hist_take = left_ctx.min(self.history.len());
        if hist_take > 0 {
            ext[left_ctx - hist_take..left_ctx]
                .copy_from_slice(&self.history[self.history.len() - hist_take..]);
        }
        ext[left_ctx..].copy_from_slice(&input[..right_len]);

        for (j, o) in output[..n].iter_mut().enumerate() {
            let in_idx = (j as u64 * d / u) as usize;
            let center = in_idx + left_ctx;
            let mut acc = Complex::new(0.0f32, 0.0);
            for (k, &h) in self.h_time.iter().enumerate() {
                if k <= center {
                    let src = center - k;
                    if src < ext.len() {
                        acc += ext[src] * h;
                    }
                }
            }
            *o = acc;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::PI;

    #[test]
    fn resampler_ratio_and_lengths_s5() {
        // S5: Fin=625000, Fout=48000, time_span=0.05.
        let r = Resampler::new(625_000.0, 48_000.0, 0.05).unwrap();
        let g = gcd(625_000, 48_000);
        assert_eq!(r.interpolation(), (48_000 / g) as u32);
        assert_eq!(r.decimation(), (625_000 / g) as u32);
        assert_eq!(r.input_len() % r.decimation() as usize, 0);
        assert_eq!(
            r.output_len(),
            r.input_len() * r.interpolation() as usize / r.decimation() as usize
        );
        assert!(r.input_len() as f64 >= 0.05 * 625_000.0);
    }

    #[test]
    fn resampler_preserves_tone_frequency_s5() {
        let fin = 625_000.0f64;
        let fout = 48_000.0f64;
        let mut r = Resampler::new(fin, fout, 0.05).unwrap();

        let lx = r.input_len();
        let ly = r.output_len();
        let tone_hz = 10_000.0f32;

        let input: Vec<Complex<f32>> = (0..lx)
            .map(|n| {
                let t = n as f32 / fin as f32;
                Complex::new((2.0 * PI * tone_hz * t).cos(), (2.0 * PI * tone_hz * t).sin())
            })
            .collect();
        let mut output = vec![Complex::new(0.0, 0.0); ly];
        r.apply(&input, &mut output).unwrap();

        // Measure the dominant frequency away from the first-call warm-up
        // region using a Goertzel-style correlation against the expected
        // output tone.
        let skip = r.discard_count() + 8;
        let tail = &output[skip..];
        let mut acc = Complex::new(0.0f32, 0.0);
        for (n, &y) in tail.iter().enumerate() {
            let t = n as f32 / fout as f32;
            let local_osc = Complex::new((2.0 * PI * tone_hz * t).cos(), -(2.0 * PI * tone_hz * t).sin());
            acc += y * local_osc;
        }
        let mag = acc.norm() / tail.len() as f32;
        assert_relative_eq!(mag, 1.0, epsilon = 0.15);
    }

    #[test]
    fn resampler_streaming_phase_continuity_multi_call() {
        // spec.md 9 design note: feed a long continuous tone across many
        // calls and check phase continuity across block boundaries.
        let fin = 625_000.0f64;
        let fout = 48_000.0f64;
        let mut r = Resampler::new(fin, fout, 0.05).unwrap();

        let lx = r.input_len();
        let ly = r.output_len();
        let tone_hz = 10_000.0f32;
        let num_blocks = 4usize;

        let mut full_output = Vec::with_capacity(ly * num_blocks);
        for b in 0..num_blocks {
            let input: Vec<Complex<f32>> = (0..lx)
                .map(|n| {
                    let sample_idx = (b * lx + n) as f32;
                    let t = sample_idx / fin as f32;
                    Complex::new((2.0 * PI * tone_hz * t).cos(), (2.0 * PI * tone_hz * t).sin())
                })
                .collect();
            let mut output = vec![Complex::new(0.0, 0.0); ly];
            r.apply(&input, &mut output).unwrap();
            full_output.extend_from_slice(&output);
        }

        // Only the very first call's boundary has no real history behind it
        // (the save-buffer starts at zero); every later call boundary is
        // patched from the previous call's actual tail, so phase should stay
        // continuous across the whole concatenated stream from here on.
        let skip = r.discard_count();
        let tail = &full_output[skip..];
        let mut acc = Complex::new(0.0f32, 0.0);
        for (n, &y) in tail.iter().enumerate() {
            let t = n as f32 / fout as f32;
            let local_osc =
                Complex::new((2.0 * PI * tone_hz * t).cos(), -(2.0 * PI * tone_hz * t).sin());
            acc += y * local_osc;
        }
        let mag = acc.norm() / tail.len() as f32;
        assert_relative_eq!(
            mag,
            1.0,
            epsilon = 0.15
        );

        // The second call's boundary region is now reconstructed from
        // `history`, not left zeroed, so it should carry real signal.
        let second_boundary = &full_output[ly..ly + r.discard_count()];
        assert!(
            second_boundary.iter().any(|c| c.norm() > 0.1),
            "a non-first call's boundary region should be corrected from history, not left at zero"
        );
    }

    #[test]
    fn resampler_rejects_bad_buffer_sizes() {
        let mut r = Resampler::new(48_000.0, 8_000.0, 0.02).unwrap();
        let input = vec![Complex::new(0.0, 0.0); r.input_len() + 1];
        let mut output = vec![Complex::new(0.0, 0.0); r.output_len()];
        assert!(matches!(
            r.apply(&input, &mut output),
            Err(ResamplerError::BadBufferSize { .. })
        ));
    }

    #[test]
    fn resampler_rejects_degenerate_rates() {
        assert!(Resampler::new(0.0, 48_000.0, 0.02).is_err());
        assert!(Resampler::new(48_000.0, 48_000.0, 0.0).is_err());
    }

    #[test]
    fn resampler_history_tracks_last_d_input_samples() {
        let mut r = Resampler::new(48_000.0, 8_000.0, 0.02).unwrap();
        let lx = r.input_len();
        let input: Vec<Complex<f32>> = (0..lx).map(|n| Complex::new(n as f32, 0.0)).collect();
        let mut output = vec![Complex::new(0.0, 0.0); r.output_len()];
        r.apply(&input, &mut output).unwrap();
        let d = r.decimation() as usize;
        assert_eq!(r.history(), &input[lx - d..]);
    }
}
