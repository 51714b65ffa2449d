// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Welch-style periodogram accumulator: half-overlapped windowed segments
//! of a continuous complex stream, FFT'd and summed or exponentially
//! averaged into a power accumulator (spec.md 4.4).

use num_complex::Complex;

use super::fft::{shift_real, FftEngine, FftOpt};
use super::filter::{window_value, WindowKind};

/// Welch periodogram accumulator over a continuous complex input stream.
pub struct Periodogram {
    fft: FftEngine,
    window: Vec<f32>,
    window_energy: f32,
    alpha: f32,
    acc: Vec<f32>,
    save: Vec<Complex<f32>>,
    pending: Vec<Complex<f32>>,
    count: u32,
    segment_scratch: Vec<Complex<f32>>,
    spectrum_scratch: Vec<Complex<f32>>,
}

impl Periodogram {
    /// Build an accumulator over segments of `segment_length` samples
    /// (forced even, rounded up by one if odd), exponential averaging
    /// factor `alpha` (clamped to `[0, 1)`), and the given window kind.
    pub fn new(segment_length: usize, alpha: f32, window: WindowKind) -> Self {
        let n = if segment_length % 2 == 1 {
            tracing::warn!(
                requested = segment_length,
                "Periodogram::new: segment length must be even, rounding up"
            );
            segment_length + 1
        } else {
            segment_length
        };
        let alpha = alpha.clamp(0.0, 0.999_999);

        let raw: Vec<f32> = (0..n).map(|i| window_value(window, i, n)).collect();
        let raw_energy: f32 = raw.iter().map(|w| w * w).sum();
        let scale = if raw_energy > 1e-12 {
            (n as f32 / raw_energy).sqrt()
        } else {
            1.0
        };
        let win: Vec<f32> = raw.iter().map(|w| w * scale).collect();
        let window_energy: f32 = win.iter().map(|w| w * w).sum();

        tracing::debug!(segment_length = n, alpha, ?window, "Periodogram::new");

        Self {
            fft: FftEngine::new(n, FftOpt::Estimate),
            window: win,
            window_energy,
            alpha,
            acc: vec![0.0f32; n],
            save: vec![Complex::new(0.0, 0.0); n / 2],
            pending: Vec::new(),
            count: 0,
            segment_scratch: vec![Complex::new(0.0, 0.0); n],
            spectrum_scratch: vec![Complex::new(0.0, 0.0); n],
        }
    }

    /// Segment length `N`.
    pub fn size(&self) -> usize {
        self.acc.len()
    }

    /// Number of segments accumulated so far (only incremented when
    /// `alpha == 0`, matching the spec's "running sum" count semantics).
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Switch the accumulation mode between running-sum (`alpha == 0`) and
    /// exponential averaging, without resetting the accumulator (ported
    /// from `Periodogram::setAlpha` in the original source).
    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = alpha.clamp(0.0, 0.999_999);
    }

    /// Consume `input` (of any length), accumulating one segment for every
    /// `N/2` fresh samples that complete a half-overlapped window.
    pub fn accumulate(&mut self, input: &[Complex<f32>]) {
        self.pending.extend_from_slice(input);
        let half = self.acc.len() / 2;
        if half == 0 {
            return;
        }
        while self.pending.len() >= half {
            let chunk: Vec<Complex<f32>> = self.pending.drain(..half).collect();

            self.segment_scratch[..half].copy_from_slice(&self.save);
            self.segment_scratch[half..].copy_from_slice(&chunk);
            for (s, &w) in self.segment_scratch.iter_mut().zip(self.window.iter()) {
                *s *= w;
            }

            self.fft
                .fft(&self.segment_scratch, &mut self.spectrum_scratch)
                .expect("sized correctly");

            if self.alpha == 0.0 {
                for (a, x) in self.acc.iter_mut().zip(self.spectrum_scratch.iter()) {
                    *a += x.norm_sqr();
                }
                self.count += 1;
            } else {
                for (a, x) in self.acc.iter_mut().zip(self.spectrum_scratch.iter()) {
                    *a = self.alpha * *a + (1.0 - self.alpha) * x.norm_sqr();
                }
            }

            self.save.copy_from_slice(&chunk);
        }
    }

    /// DC-centered image of the accumulator.
    pub fn get(&self) -> Vec<f32> {
        let mut out = vec![0.0f32; self.acc.len()];
        shift_real(&self.acc, &mut out);
        out
    }

    /// Factor by which a caller should divide [`Periodogram::get`]'s output
    /// to obtain a normalized PSD estimate (spec.md 4.4, 9 Open Question 2).
    pub fn scale_factor(&self) -> f32 {
        if self.alpha == 0.0 {
            let n = self.count.max(1) as f32;
            1.0 / (n * self.window_energy)
        } else {
            1.0 / self.window_energy
        }
    }

    /// Zero the accumulator, empty the save-buffer, and reset the count.
    pub fn clear(&mut self) {
        self.acc.fill(0.0);
        self.save.fill(Complex::new(0.0, 0.0));
        self.pending.clear();
        self.count = 0;
    }
}
