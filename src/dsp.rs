// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Frequency-domain DSP building blocks: a complex FFT wrapper, a windowed
//! FIR filter applied via overlap-save, a rational resampler built on the
//! same overlap-save discipline, and a Welch-style periodogram.
//!
//! Each component owns its internal state (save-buffers, FFT plans) and is
//! not safe for concurrent access by multiple threads; independent
//! instances over disjoint buffers may run in parallel with no
//! coordination.

pub mod fft;
pub mod filter;
pub mod periodogram;
pub mod resampler;

pub use self::fft::{FftEngine, FftError, FftOpt};
pub use self::filter::{Filter, FilterError, FilterSpec, InOutMode, WindowKind};
pub use self::periodogram::Periodogram;
pub use self::resampler::{Resampler, ResamplerError};
