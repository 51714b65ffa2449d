// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Windowed FIR filter, synthesized by the window method and applied via
//! overlap-save convolution in the frequency domain.

use std::f32::consts::PI;

use num_complex::Complex;
use thiserror::Error;

use super::fft::{FftEngine, FftOpt};

/// Window applied to the synthesized impulse response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    None,
    Hamming,
    Hann,
    Blackman,
}

impl Default for WindowKind {
    fn default() -> Self {
        WindowKind::Hann
    }
}

/// Evaluate the window of `kind` at tap `n` of `m` total taps.
pub(crate) fn window_value(kind: WindowKind, n: usize, m: usize) -> f32 {
    if m <= 1 {
        return 1.0;
    }
    let denom = (m - 1) as f32;
    let n = n as f32;
    match kind {
        WindowKind::None => 1.0,
        WindowKind::Hamming => 0.54 - 0.46 * (2.0 * PI * n / denom).cos(),
        WindowKind::Hann => 0.5 * (1.0 - (2.0 * PI * n / denom).cos()),
        WindowKind::Blackman => {
            0.42 - 0.5 * (2.0 * PI * n / denom).cos() + 0.08 * (4.0 * PI * n / denom).cos()
        }
    }
}

/// A passband description driving window-method FIR synthesis (spec.md
/// section 3, "Filter spec").
#[derive(Debug, Clone, Copy)]
pub struct FilterSpec {
    pub fs: f32,
    pub fl: f32,
    pub fh: f32,
    pub transition_width: f32,
    pub stopband_db: f32,
    pub taps: Option<usize>,
    pub window: WindowKind,
    pub gain: f32,
}

impl FilterSpec {
    pub fn new(fs: f32, fl: f32, fh: f32, transition_width: f32) -> Self {
        Self {
            fs,
            fl,
            fh,
            transition_width,
            stopband_db: 50.0,
            taps: None,
            window: WindowKind::Hann,
            gain: 1.0,
        }
    }

    pub fn with_stopband_db(mut self, db: f32) -> Self {
        self.stopband_db = db;
        self
    }

    pub fn with_taps(mut self, taps: usize) -> Self {
        self.taps = Some(taps);
        self
    }

    pub fn with_window(mut self, window: WindowKind) -> Self {
        self.window = window;
        self
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    fn validate(&self) -> Result<(), FilterError> {
        if !(self.fl >= -self.fs / 2.0 && self.fl < self.fh && self.fh <= self.fs / 2.0) {
            return Err(FilterError::InvalidSpec(format!(
                "filter edges must satisfy -Fs/2 <= fl < fh <= Fs/2 (Fs={}, fl={}, fh={})",
                self.fs, self.fl, self.fh
            )));
        }
        if self.transition_width <= 0.0 {
            return Err(FilterError::InvalidSpec(
                "transition width must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Tap count per spec.md 4.2: `M = ceil(Fs*A / (22*w)) | 1`, forced odd.
    fn derive_tap_count(&self) -> usize {
        if let Some(taps) = self.taps {
            return taps | 1;
        }
        let raw = (self.fs * self.stopband_db / (22.0 * self.transition_width)).ceil();
        let m = raw.max(1.0) as usize;
        m | 1
    }
}

/// Whether input/output buffers passed to [`Filter::apply`] are already in
/// the frequency domain, allowing the corresponding transform to be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InOutMode {
    pub xform_in: bool,
    pub xform_out: bool,
}

impl InOutMode {
    pub const TIME_DOMAIN: InOutMode = InOutMode {
        xform_in: true,
        xform_out: true,
    };

    pub fn new(xform_in: bool, xform_out: bool) -> Self {
        Self {
            xform_in,
            xform_out,
        }
    }
}

impl Default for InOutMode {
    fn default() -> Self {
        Self::TIME_DOMAIN
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FilterError {
    #[error("invalid filter spec: {0}")]
    InvalidSpec(String),
    #[error("synthesized tap count {taps} would meet or exceed the overlap-save transform length {image_len}")]
    TapsExceedTransform { taps: usize, image_len: usize },
    #[error("filter buffer size mismatch: in.len={in_len} out.len={out_len}, required {required}")]
    BadBufferSize {
        in_len: usize,
        out_len: usize,
        required: usize,
    },
    #[error("prototype H has length {actual}, expected {expected}")]
    BadSize { actual: usize, expected: usize },
    #[error("apply_real requires a filter built from a real (conjugate-symmetric) impulse response")]
    NotRealFilter,
}

/// Synthesize the windowed-sinc band-pass impulse response of `m` taps.
pub(crate) fn synth_impulse_response(fl: f32, fh: f32, fs: f32, m: usize, window: WindowKind) -> Vec<f32> {
    let half = (m as f32 - 1.0) / 2.0;
    let mut h = Vec::with_capacity(m);
    for n in 0..m {
        let t = n as f32 - half;
        let proto = if t == 0.0 {
            2.0 * (fh - fl) / fs
        } else {
            ((2.0 * PI * fh * t / fs).sin() - (2.0 * PI * fl * t / fs).sin()) / (PI * t)
        };
        h.push(proto * window_value(window, n, m));
    }
    h
}

/// Evaluate the DTFT of a real impulse response at frequency `f` (Hz),
/// sample rate `fs`. Used to find the passband peak for gain normalization.
pub(crate) fn dtft_at(h: &[f32], f: f32, fs: f32) -> Complex<f32> {
    let mut acc = Complex::new(0.0f32, 0.0);
    for (n, &coeff) in h.iter().enumerate() {
        let theta = -2.0 * PI * f * n as f32 / fs;
        acc += Complex::new(coeff * theta.cos(), coeff * theta.sin());
    }
    acc
}

/// Windowed FIR filter stored as a frequency-domain image `H`, applied to
/// streaming input via overlap-save (spec.md 4.2).
pub struct Filter {
    h_freq: Vec<Complex<f32>>,
    overlap: Vec<Complex<f32>>,
    buffer_size: usize,
    image_len: usize,
    n_taps: usize,
    fl: f32,
    fh: f32,
    is_real: bool,
    fft: FftEngine,
    freq_scratch: Vec<Complex<f32>>,
    time_scratch: Vec<Complex<f32>>,
}

impl Filter {
    /// Build a filter from a passband spec and fixed application buffer size.
    pub fn from_spec(spec: &FilterSpec, buffer_size: usize) -> Result<Self, FilterError> {
        spec.validate()?;
        let m = spec.derive_tap_count();
        let h_time = synth_impulse_response(spec.fl, spec.fh, spec.fs, m, spec.window);

        let fc = (spec.fl + spec.fh) / 2.0;
        let peak = dtft_at(&h_time, fc, spec.fs).norm();
        let scale = if peak > 1e-12 { spec.gain / peak } else { spec.gain };

        let image_len = FftEngine::good_size((buffer_size + m - 1) as u32) as usize;
        if m >= image_len {
            return Err(FilterError::TapsExceedTransform {
                taps: m,
                image_len,
            });
        }

        let mut h_padded: Vec<Complex<f32>> = h_time
            .iter()
            .map(|&coeff| Complex::new(coeff * scale, 0.0))
            .collect();
        h_padded.resize(image_len, Complex::new(0.0, 0.0));

        let mut fft = FftEngine::new(image_len, FftOpt::Estimate);
        let mut h_freq = vec![Complex::new(0.0, 0.0); image_len];
        fft.fft(&h_padded, &mut h_freq).expect("sized correctly");

        tracing::debug!(
            taps = m,
            image_len,
            buffer_size,
            fl = spec.fl,
            fh = spec.fh,
            "Filter::from_spec synthesized"
        );

        Ok(Self {
            h_freq,
            overlap: vec![Complex::new(0.0, 0.0); image_len - buffer_size],
            buffer_size,
            image_len,
            n_taps: m,
            fl: spec.fl,
            fh: spec.fh,
            is_real: true,
            fft,
            freq_scratch: vec![Complex::new(0.0, 0.0); image_len],
            time_scratch: vec![Complex::new(0.0, 0.0); image_len],
        })
    }

    /// Build a filter directly from a frequency-domain prototype image,
    /// skipping tap synthesis and windowing (spec.md section 9, Open
    /// Question 3: the prototype path uses `h_proto` verbatim after
    /// gain scaling).
    pub fn from_prototype(
        h_proto: &[Complex<f32>],
        buffer_size: usize,
        gain: f32,
    ) -> Result<Self, FilterError> {
        let image_len = h_proto.len();
        if image_len <= buffer_size {
            return Err(FilterError::BadSize {
                actual: image_len,
                expected: buffer_size + 1,
            });
        }

        // Find the prototype's peak magnitude to normalize to `gain`.
        let peak = h_proto.iter().map(|c| c.norm()).fold(0.0f32, f32::max);
        let scale = if peak > 1e-12 { gain / peak } else { gain };
        let h_freq: Vec<Complex<f32>> = h_proto.iter().map(|&c| c * scale).collect();

        let is_real = is_conjugate_symmetric(&h_freq);

        let fft = FftEngine::new(image_len, FftOpt::Estimate);

        Ok(Self {
            h_freq,
            overlap: vec![Complex::new(0.0, 0.0); image_len - buffer_size],
            buffer_size,
            image_len,
            n_taps: image_len,
            fl: f32::NAN,
            fh: f32::NAN,
            is_real,
            fft,
            freq_scratch: vec![Complex::new(0.0, 0.0); image_len],
            time_scratch: vec![Complex::new(0.0, 0.0); image_len],
        })
    }

    pub fn input_buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn output_buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn filter_length(&self) -> usize {
        self.n_taps
    }

    pub fn image_len(&self) -> usize {
        self.image_len
    }

    pub fn filter_edges(&self) -> (f32, f32) {
        (self.fl, self.fh)
    }

    fn check_lengths(
        &self,
        in_len: usize,
        out_len: usize,
        mode: InOutMode,
    ) -> Result<(), FilterError> {
        let expected_in = if mode.xform_in {
            self.buffer_size
        } else {
            self.image_len
        };
        let expected_out = if mode.xform_out {
            self.buffer_size
        } else {
            self.image_len
        };
        if in_len != expected_in || out_len != expected_out {
            return Err(FilterError::BadBufferSize {
                in_len,
                out_len,
                required: self.buffer_size,
            });
        }
        Ok(())
    }

    /// Apply the filter via overlap-save (spec.md 4.2 steps 1-6).
    pub fn apply(
        &mut self,
        input: &[Complex<f32>],
        output: &mut [Complex<f32>],
        mode: InOutMode,
    ) -> Result<(), FilterError> {
        self.check_lengths(input.len(), output.len(), mode)?;

        if mode.xform_in {
            let overlap_len = self.overlap.len();
            let mut time_in = vec![Complex::new(0.0f32, 0.0); self.image_len];
            time_in[..overlap_len].copy_from_slice(&self.overlap);
            time_in[overlap_len..].copy_from_slice(input);
            self.fft
                .fft(&time_in, &mut self.freq_scratch)
                .expect("sized correctly");
        } else {
            self.freq_scratch.copy_from_slice(input);
        }

        for (x, &h) in self.freq_scratch.iter_mut().zip(self.h_freq.iter()) {
            *x *= h;
        }

        if mode.xform_out {
            let freq_copy = self.freq_scratch.clone();
            self.fft
                .ifft(&freq_copy, &mut self.time_scratch)
                .expect("sized correctly");
            let norm = 1.0 / self.image_len as f32;
            let start = self.image_len - self.buffer_size;
            for (o, y) in output.iter_mut().zip(self.time_scratch[start..].iter()) {
                *o = y * norm;
            }
        } else {
            output.copy_from_slice(&self.freq_scratch);
        }

        // Save-buffer update requires raw time-domain input; when the
        // caller supplies frequency-domain input directly there is no
        // overlap history to maintain (the caller owns that bookkeeping).
        if mode.xform_in {
            let overlap_len = self.overlap.len();
            if overlap_len > 0 {
                self.overlap
                    .copy_from_slice(&input[input.len() - overlap_len..]);
            }
        }

        Ok(())
    }

    /// Real-valued overload; requires the filter's `H` to be
    /// conjugate-symmetric (i.e. correspond to a real impulse response).
    pub fn apply_real(&mut self, input: &[f32], output: &mut [f32]) -> Result<(), FilterError> {
        if !self.is_real {
            return Err(FilterError::NotRealFilter);
        }
        if input.len() != self.buffer_size || output.len() != self.buffer_size {
            return Err(FilterError::BadBufferSize {
                in_len: input.len(),
                out_len: output.len(),
                required: self.buffer_size,
            });
        }
        let complex_in: Vec<Complex<f32>> = input.iter().map(|&v| Complex::new(v, 0.0)).collect();
        let mut complex_out = vec![Complex::new(0.0, 0.0); self.buffer_size];
        self.apply(&complex_in, &mut complex_out, InOutMode::TIME_DOMAIN)?;
        for (o, c) in output.iter_mut().zip(complex_out.iter()) {
            *o = c.re;
        }
        Ok(())
    }
}

fn is_conjugate_symmetric(h: &[Complex<f32>]) -> bool {
    let n = h.len();
    if n == 0 {
        return true;
    }
    for k in 1..n {
        let mirror = h[n - k];
        let diff = (h[k] - mirror.conj()).norm();
        let scale = h[k].norm().max(mirror.norm()).max(1e-6);
        if diff / scale > 1e-2 {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn mag_db(filter: &mut Filter, fs: f32, freq: f32, buffer_size: usize) -> f32 {
        let n = buffer_size;
        let mut input = vec![Complex::new(0.0f32, 0.0); n];
        for (i, v) in input.iter_mut().enumerate() {
            let theta = 2.0 * PI * freq * i as f32 / fs;
            *v = Complex::new(theta.cos(), theta.sin());
        }
        let mut output = vec![Complex::new(0.0, 0.0); n];
        // Run several blocks so the overlap-save transient settles.
        let mut mag = 0.0f32;
        for _ in 0..4 {
            filter
                .apply(&input, &mut output, InOutMode::TIME_DOMAIN)
                .unwrap();
            mag = output.iter().map(|c| c.norm()).fold(0.0, f32::max);
        }
        20.0 * mag.max(1e-12).log10()
    }

    #[test]
    fn filter_passband_and_stopband_s4() {
        let spec = FilterSpec::new(48_000.0, -2_000.0, 10_000.0, 2_000.0)
            .with_stopband_db(35.0)
            .with_window(WindowKind::Hamming);
        let mut filter = Filter::from_spec(&spec, 16_384).unwrap();

        let pass_db = mag_db(&mut filter, 48_000.0, 4_000.0, 16_384);
        assert!(
            pass_db.abs() < 1.0,
            "passband gain should be within 1 dB of unity, got {pass_db} dB"
        );

        let stop_db_low = mag_db(&mut filter, 48_000.0, -8_000.0, 16_384);
        assert!(
            stop_db_low < -35.0,
            "stopband attenuation at -8kHz should be < -35dB, got {stop_db_low}"
        );

        let stop_db_high = mag_db(&mut filter, 48_000.0, 15_000.0, 16_384);
        assert!(
            stop_db_high < -35.0,
            "stopband attenuation at 15kHz should be < -35dB, got {stop_db_high}"
        );
    }

    #[test]
    fn filter_rejects_bad_buffer_size() {
        let spec = FilterSpec::new(48_000.0, -2_000.0, 2_000.0, 1_000.0);
        let mut filter = Filter::from_spec(&spec, 256).unwrap();
        let input = vec![Complex::new(0.0, 0.0); 128];
        let mut output = vec![Complex::new(0.0, 0.0); 256];
        let err = filter
            .apply(&input, &mut output, InOutMode::TIME_DOMAIN)
            .unwrap_err();
        assert!(matches!(err, FilterError::BadBufferSize { .. }));
    }

    #[test]
    fn filter_rejects_invalid_spec() {
        let spec = FilterSpec::new(48_000.0, 10_000.0, 2_000.0, 1_000.0); // fl > fh
        assert!(Filter::from_spec(&spec, 256).is_err());
    }

    #[test]
    fn filter_from_prototype_uses_h_verbatim() {
        // A real impulse at n=0 has a conjugate-symmetric FFT image.
        let len = 64usize;
        let mut proto = vec![Complex::new(0.0f32, 0.0); len];
        proto[0] = Complex::new(1.0, 0.0);
        let mut engine = FftEngine::new(len, FftOpt::Estimate);
        let mut h_proto = vec![Complex::new(0.0, 0.0); len];
        engine.fft(&proto, &mut h_proto).unwrap();

        let mut filter = Filter::from_prototype(&h_proto, 16, 2.0).unwrap();
        assert!(filter.is_real);
        let input = vec![Complex::new(1.0, 0.0); 16];
        let mut output = vec![Complex::new(0.0, 0.0); 16];
        filter
            .apply(&input, &mut output, InOutMode::TIME_DOMAIN)
            .unwrap();
        // DC in, DC out, scaled to the requested gain.
        for o in &output {
            assert_relative_eq!(o.re, 2.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn filter_frequency_domain_mode_skips_transforms() {
        let spec = FilterSpec::new(8_000.0, -1_000.0, 1_000.0, 500.0);
        let mut filter = Filter::from_spec(&spec, 64).unwrap();
        let image_len = filter.image_len();
        let x = vec![Complex::new(1.0, 0.0); image_len];
        let mut y = vec![Complex::new(0.0, 0.0); image_len];
        filter
            .apply(&x, &mut y, InOutMode::new(false, false))
            .unwrap();
        for (out, h) in y.iter().zip(filter.h_freq.iter()) {
            assert_relative_eq!(out.re, h.re, epsilon = 1e-4);
            assert_relative_eq!(out.im, h.im, epsilon = 1e-4);
        }
    }
}
