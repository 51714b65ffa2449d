// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! `trx-signals`: frequency-domain DSP building blocks for software-defined
//! radio — a complex FFT wrapper, a windowed overlap-save FIR filter, a
//! rational resampler, and a Welch-style periodogram.
//!
//! See [`dsp`] for the four components. Construction is fallible and
//! sizing-driven (no config file, no environment variables); `apply`/
//! `accumulate`/`get` entry points operate on caller-owned buffers of fixed
//! size, documented per component.

pub mod dsp;

pub use dsp::{
    FftEngine, FftError, FftOpt, Filter, FilterError, FilterSpec, InOutMode, Periodogram,
    Resampler, ResamplerError, WindowKind,
};
