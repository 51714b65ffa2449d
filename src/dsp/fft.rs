// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Thin wrapper around `rustfft`: fixed-length forward/inverse complex DFTs,
//! DC-centered <-> zero-bin-first reordering, and a "good size" search over
//! 7-smooth transform lengths.

use std::sync::Arc;

use num_complex::Complex;
use rustfft::FftPlanner;
use thiserror::Error;

/// Optimization hint passed to the underlying DFT library at construction.
///
/// `rustfft`'s planner has no equivalent of fftw's MEASURE/PATIENT/EXHAUST
/// tuning passes, so every variant currently produces the same plan; the
/// hint is accepted (and stored) purely for interface fidelity with callers
/// that select it, and never changes a numeric result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FftOpt {
    Estimate,
    Measure,
    Patient,
    Exhaust,
}

impl Default for FftOpt {
    fn default() -> Self {
        FftOpt::Estimate
    }
}

/// Errors raised by [`FftEngine`] operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FftError {
    #[error("vector arguments to FftEngine::{op} must be the same size: in.len={in_len} out.len={out_len}")]
    UnmatchedSizes {
        op: &'static str,
        in_len: usize,
        out_len: usize,
    },
    #[error("vector argument to FftEngine::{op} must be length {expected} but was {actual}")]
    BadSize {
        op: &'static str,
        actual: usize,
        expected: usize,
    },
}

/// Fixed-length forward/inverse complex-to-complex DFT.
///
/// Unnormalized: `fft` computes `out[k] = sum_n in[n] * e^{-j2*pi*k*n/N}`,
/// `ifft` computes `out[n] = sum_k in[k] * e^{+j2*pi*k*n/N}`, so
/// `ifft(fft(x))` scales `x` by `N`.
pub struct FftEngine {
    len: usize,
    opt: FftOpt,
    forward: Arc<dyn rustfft::Fft<f32>>,
    inverse: Arc<dyn rustfft::Fft<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl FftEngine {
    /// Build an engine for transforms of length `len` (`len >= 2`).
    pub fn new(len: usize, opt: FftOpt) -> Self {
        assert!(len >= 2, "FftEngine length must be at least 2, got {len}");
        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(len);
        let inverse = planner.plan_fft_inverse(len);
        tracing::trace!(len, ?opt, "FftEngine::new");
        Self {
            len,
            opt,
            forward,
            inverse,
            scratch: vec![Complex::new(0.0, 0.0); len],
        }
    }

    /// Convenience constructor matching the source's `FFT::make`.
    pub fn make(len: usize, opt: FftOpt) -> Arc<Self> {
        Arc::new(Self::new(len, opt))
    }

    /// The fixed transform length this engine was constructed for.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn opt(&self) -> FftOpt {
        self.opt
    }

    fn check_sizes(
        &self,
        op: &'static str,
        in_len: usize,
        out_len: usize,
    ) -> Result<(), FftError> {
        if in_len != out_len {
            return Err(FftError::UnmatchedSizes {
                op,
                in_len,
                out_len,
            });
        }
        if in_len != self.len {
            return Err(FftError::BadSize {
                op,
                actual: in_len,
                expected: self.len,
            });
        }
        Ok(())
    }

    /// Forward DFT. `in.len() == out.len() == len()`, else an error.
    ///
    /// `in` and `out` may alias the same buffer; an internal scratch buffer
    /// makes the copy so the in-place `rustfft` kernel never observes the
    /// caller's aliasing choice.
    pub fn fft(&mut self, input: &[Complex<f32>], out: &mut [Complex<f32>]) -> Result<(), FftError> {
        self.check_sizes("fft", input.len(), out.len())?;
        self.scratch.copy_from_slice(input);
        self.forward.process(&mut self.scratch);
        out.copy_from_slice(&self.scratch);
        Ok(())
    }

    /// Inverse DFT, unnormalized (`ifft(fft(x)) == len() * x`).
    pub fn ifft(&mut self, input: &[Complex<f32>], out: &mut [Complex<f32>]) -> Result<(), FftError> {
        self.check_sizes("ifft", input.len(), out.len())?;
        self.scratch.copy_from_slice(input);
        self.inverse.process(&mut self.scratch);
        out.copy_from_slice(&self.scratch);
        Ok(())
    }

    /// Map zero-bin-first ordering to DC-centered ordering.
    pub fn shift(input: &[Complex<f32>], out: &mut [Complex<f32>]) -> Result<(), FftError> {
        shift_impl(input, out)
    }

    /// Inverse of [`FftEngine::shift`].
    pub fn ishift(input: &[Complex<f32>], out: &mut [Complex<f32>]) -> Result<(), FftError> {
        ishift_impl(input, out)
    }

    /// Smallest `n >= min_size` of the form `2^a * 3^b * 5^c * 7^d`.
    pub fn good_size(min_size: u32) -> u32 {
        good_size_impl(min_size)
    }
}

fn shift_impl(input: &[Complex<f32>], out: &mut [Complex<f32>]) -> Result<(), FftError> {
    if input.len() != out.len() {
        return Err(FftError::UnmatchedSizes {
            op: "shift",
            in_len: input.len(),
            out_len: out.len(),
        });
    }
    if input.len() % 2 == 0 {
        // Even length: shift and ishift coincide.
        return ishift_impl(input, out);
    }
    let n = input.len();
    let mid = (n - 1) / 2;
    let tmp: Vec<Complex<f32>> = input.to_vec();
    for (i, &v) in tmp.iter().enumerate() {
        out[(mid + i) % n] = v;
    }
    Ok(())
}

fn ishift_impl(input: &[Complex<f32>], out: &mut [Complex<f32>]) -> Result<(), FftError> {
    if input.len() != out.len() {
        return Err(FftError::UnmatchedSizes {
            op: "ishift",
            in_len: input.len(),
            out_len: out.len(),
        });
    }
    let n = input.len();
    let mid = (n + 1) / 2;
    let tmp: Vec<Complex<f32>> = input.to_vec();
    for (i, &v) in tmp.iter().enumerate() {
        out[(mid + i) % n] = v;
    }
    Ok(())
}

/// `shift`/`ishift` reordering specialized to real-valued buffers, used by
/// the periodogram's `get()` (the spec calls for a DC-centered image of a
/// nonnegative real accumulator, not a complex spectrum).
pub(crate) fn shift_real(input: &[f32], out: &mut [f32]) {
    let n = input.len();
    if n == 0 {
        return;
    }
    let mid = if n % 2 == 0 { n / 2 } else { (n - 1) / 2 };
    for (i, &v) in input.iter().enumerate() {
        out[(mid + i) % n] = v;
    }
}

fn good_size_impl(min_size: u32) -> u32 {
    let min_size = min_size.max(1);
    // Bounded search: never look past 2^(ceil(log2(min_size)) + 2).
    let mut max_n: u32 = 0;
    while (1u64 << max_n) < min_size as u64 {
        max_n += 1;
    }
    max_n += 1;
    let max_val: u64 = 4u64 << max_n;

    let mut best_val = max_val;
    let mut vn: u64 = 1;
    for _n in 0..max_n {
        let mut vm: u64 = 1;
        for _m in 0..4 {
            let mut vp: u64 = 1;
            for _p in 0..3 {
                let mut vq: u64 = 1;
                for _q in 0..3 {
                    let v = vn * vm * vp * vq;
                    if v >= min_size as u64 && v < best_val {
                        best_val = v;
                        if v == min_size as u64 {
                            return v as u32;
                        }
                    }
                    vq *= 7;
                }
                vp *= 5;
            }
            vm *= 3;
        }
        vn *= 2;
    }
    best_val as u32
}
