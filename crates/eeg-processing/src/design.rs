//! IIR coefficient design: Butterworth sections and notches
//!
//! Everything is expressed as cascades of second-order sections with a
//! normalised denominator (`a0 == 1`). Band filters are designed from the
//! analog Butterworth prototype via the usual frequency transforms and the
//! bilinear transform with prewarping, so band edges land exactly at -3 dB.

use eeg_core::{EegError, EegResult};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Highest Butterworth order accepted by the designers
pub const MAX_ORDER: usize = 8;

/// Second-order section `(b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Biquad {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Biquad {
    pub const IDENTITY: Biquad = Biquad { b0: 1.0, b1: 0.0, b2: 0.0, a1: 0.0, a2: 0.0 };

    /// One step of the transposed direct form II recursion
    #[inline]
    pub fn step(&self, state: &mut [f64; 2], input: f64) -> f64 {
        let output = self.b0 * input + state[0];
        state[0] = self.b1 * input - self.a1 * output + state[1];
        state[1] = self.b2 * input - self.a2 * output;
        output
    }

    /// Gain for a constant input
    pub fn dc_gain(&self) -> f64 {
        let den = 1.0 + self.a1 + self.a2;
        let gain = (self.b0 + self.b1 + self.b2) / den;
        if gain.is_finite() { gain } else { 0.0 }
    }

    /// Delay-line contents after an infinitely long constant `input`
    pub fn steady_state(&self, input: f64) -> [f64; 2] {
        let output = self.dc_gain() * input;
        let s1 = self.b2 * input - self.a2 * output;
        let s0 = self.b1 * input - self.a1 * output + s1;
        [s0, s1]
    }

    /// Complex frequency response at normalised angular frequency `omega`
    pub fn response(&self, omega: f64) -> Complex64 {
        let z1 = Complex64::from_polar(1.0, -omega);
        let z2 = z1 * z1;
        let num = z1 * self.b1 + z2 * self.b2 + self.b0;
        let den = z1 * self.a1 + z2 * self.a2 + 1.0;
        num / den
    }

    fn scaled(self, gain: f64) -> Biquad {
        Biquad {
            b0: self.b0 * gain,
            b1: self.b1 * gain,
            b2: self.b2 * gain,
            ..self
        }
    }
}

/// Frequency response of a cascade
pub fn cascade_response(sections: &[Biquad], omega: f64) -> Complex64 {
    sections
        .iter()
        .fold(Complex64::new(1.0, 0.0), |acc, section| acc * section.response(omega))
}

/// Butterworth high-pass, `order` poles, cutoff in Hz
pub fn butterworth_highpass(order: usize, cutoff: f64, sampling_rate: f64) -> EegResult<Vec<Biquad>> {
    check_order(order)?;
    check_frequency("high-pass cutoff", cutoff, sampling_rate)?;

    let k = (PI * cutoff / sampling_rate).tan();
    let k2 = k * k;
    let mut sections = Vec::with_capacity((order + 1) / 2);

    for index in 0..order / 2 {
        // damping of the index-th conjugate pole pair
        let q = 2.0 * (PI * (2 * index + 1) as f64 / (2 * order) as f64).sin();
        let norm = k2 + q * k + 1.0;
        sections.push(Biquad {
            b0: 1.0 / norm,
            b1: -2.0 / norm,
            b2: 1.0 / norm,
            a1: 2.0 * (k2 - 1.0) / norm,
            a2: (k2 - q * k + 1.0) / norm,
        });
    }

    if order % 2 == 1 {
        let norm = k + 1.0;
        sections.push(Biquad {
            b0: 1.0 / norm,
            b1: -1.0 / norm,
            b2: 0.0,
            a1: (k - 1.0) / norm,
            a2: 0.0,
        });
    }

    Ok(sections)
}

/// Butterworth low-pass, `order` poles, cutoff in Hz
pub fn butterworth_lowpass(order: usize, cutoff: f64, sampling_rate: f64) -> EegResult<Vec<Biquad>> {
    check_order(order)?;
    check_frequency("low-pass cutoff", cutoff, sampling_rate)?;

    let k = (PI * cutoff / sampling_rate).tan();
    let k2 = k * k;
    let mut sections = Vec::with_capacity((order + 1) / 2);

    for index in 0..order / 2 {
        let q = 2.0 * (PI * (2 * index + 1) as f64 / (2 * order) as f64).sin();
        let norm = k2 + q * k + 1.0;
        sections.push(Biquad {
            b0: k2 / norm,
            b1: 2.0 * k2 / norm,
            b2: k2 / norm,
            a1: 2.0 * (k2 - 1.0) / norm,
            a2: (k2 - q * k + 1.0) / norm,
        });
    }

    if order % 2 == 1 {
        let norm = k + 1.0;
        sections.push(Biquad {
            b0: k / norm,
            b1: k / norm,
            b2: 0.0,
            a1: (k - 1.0) / norm,
            a2: 0.0,
        });
    }

    Ok(sections)
}

/// Butterworth band-pass with `order` sections, passband `[low, high]` Hz
pub fn butterworth_bandpass(order: usize, low: f64, high: f64, sampling_rate: f64) -> EegResult<Vec<Biquad>> {
    check_order(order)?;
    check_band(low, high, sampling_rate)?;

    let fs2 = 2.0 * sampling_rate;
    let (w0, bw) = prewarped_band(low, high, sampling_rate);

    let mut poles = Vec::with_capacity(2 * order);
    for p in prototype_poles(order) {
        let half = p * (bw / 2.0);
        let disc = (half * half - w0 * w0).sqrt();
        poles.push(bilinear(half + disc, fs2));
        poles.push(bilinear(half - disc, fs2));
    }

    let mut sections: Vec<Biquad> = conjugate_sections(&poles)
        .into_iter()
        .map(|(a1, a2)| Biquad { b0: 1.0, b1: 0.0, b2: -1.0, a1, a2 })
        .collect();

    let centre = 2.0 * (w0 / fs2).atan();
    normalise_gain(&mut sections, centre)?;
    Ok(sections)
}

/// Butterworth band-stop with `order` sections, stop band `[low, high]` Hz
pub fn butterworth_bandstop(order: usize, low: f64, high: f64, sampling_rate: f64) -> EegResult<Vec<Biquad>> {
    check_order(order)?;
    check_band(low, high, sampling_rate)?;

    let fs2 = 2.0 * sampling_rate;
    let (w0, bw) = prewarped_band(low, high, sampling_rate);

    let mut poles = Vec::with_capacity(2 * order);
    for p in prototype_poles(order) {
        let half = (bw / 2.0) / p;
        let disc = (half * half - w0 * w0).sqrt();
        poles.push(bilinear(half + disc, fs2));
        poles.push(bilinear(half - disc, fs2));
    }

    // transmission zeros at +-j*w0 land on the unit circle at the centre angle
    let centre = 2.0 * (w0 / fs2).atan();
    let b1 = -2.0 * centre.cos();

    let mut sections: Vec<Biquad> = conjugate_sections(&poles)
        .into_iter()
        .map(|(a1, a2)| Biquad { b0: 1.0, b1, b2: 1.0, a1, a2 })
        .collect();

    normalise_gain(&mut sections, 0.0)?;
    Ok(sections)
}

/// Second-order IIR notch at `frequency` Hz with quality factor `quality`
///
/// The -3 dB bandwidth is `frequency / quality`.
pub fn iir_notch(frequency: f64, quality: f64, sampling_rate: f64) -> EegResult<Biquad> {
    check_frequency("notch frequency", frequency, sampling_rate)?;
    if !quality.is_finite() || quality <= 0.0 {
        return Err(EegError::InvalidFilterDesign {
            reason: format!("notch quality factor must be positive, got {}", quality),
        });
    }

    let w0 = 2.0 * PI * frequency / sampling_rate;
    let bw = w0 / quality;
    let beta = (bw / 2.0).tan();
    let gain = 1.0 / (1.0 + beta);
    let cos_w0 = w0.cos();

    Ok(Biquad {
        b0: gain,
        b1: -2.0 * gain * cos_w0,
        b2: gain,
        a1: -2.0 * gain * cos_w0,
        a2: 2.0 * gain - 1.0,
    })
}

fn check_order(order: usize) -> EegResult<()> {
    if order == 0 || order > MAX_ORDER {
        return Err(EegError::InvalidFilterDesign {
            reason: format!("order must be within 1..={}, got {}", MAX_ORDER, order),
        });
    }
    Ok(())
}

fn check_frequency(what: &str, frequency: f64, sampling_rate: f64) -> EegResult<()> {
    if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
        return Err(EegError::InvalidSamplingRate {
            rate: sampling_rate,
            valid_range: "positive and finite",
        });
    }
    let nyquist = sampling_rate / 2.0;
    if !frequency.is_finite() || frequency <= 0.0 || frequency >= nyquist {
        return Err(EegError::InvalidFilterDesign {
            reason: format!("{} {} Hz outside (0, {}) Hz", what, frequency, nyquist),
        });
    }
    Ok(())
}

fn check_band(low: f64, high: f64, sampling_rate: f64) -> EegResult<()> {
    check_frequency("low edge", low, sampling_rate)?;
    check_frequency("high edge", high, sampling_rate)?;
    if low >= high {
        return Err(EegError::InvalidFilterDesign {
            reason: format!("low edge {} Hz must be below high edge {} Hz", low, high),
        });
    }
    Ok(())
}

/// Analog centre frequency and bandwidth after prewarping both edges
fn prewarped_band(low: f64, high: f64, sampling_rate: f64) -> (f64, f64) {
    let fs2 = 2.0 * sampling_rate;
    let w1 = fs2 * (PI * low / sampling_rate).tan();
    let w2 = fs2 * (PI * high / sampling_rate).tan();
    ((w1 * w2).sqrt(), w2 - w1)
}

/// Left half-plane poles of the unit-cutoff analog Butterworth prototype
fn prototype_poles(order: usize) -> impl Iterator<Item = Complex64> {
    (0..order).map(move |k| {
        let angle = PI * (2 * k + order + 1) as f64 / (2 * order) as f64;
        Complex64::from_polar(1.0, angle)
    })
}

fn bilinear(pole: Complex64, fs2: f64) -> Complex64 {
    (pole + fs2) / (fs2 - pole)
}

/// Group digital poles into `(a1, a2)` denominators.
///
/// Each conjugate pair is represented by its upper member; real poles are
/// paired up in order, a lone real pole gives a first-order denominator.
fn conjugate_sections(poles: &[Complex64]) -> Vec<(f64, f64)> {
    const IMAG_TOLERANCE: f64 = 1e-12;

    let mut sections = Vec::with_capacity(poles.len() / 2 + 1);
    let mut real = Vec::new();

    for pole in poles {
        if pole.im > IMAG_TOLERANCE {
            sections.push((-2.0 * pole.re, pole.norm_sqr()));
        } else if pole.im.abs() <= IMAG_TOLERANCE {
            real.push(pole.re);
        }
    }

    for pair in real.chunks(2) {
        match *pair {
            [r1, r2] => sections.push((-(r1 + r2), r1 * r2)),
            [r] => sections.push((-r, 0.0)),
            _ => {}
        }
    }

    sections
}

/// Spread a gain correction over all sections so `|H(omega)| == 1`
fn normalise_gain(sections: &mut [Biquad], omega: f64) -> EegResult<()> {
    let gain = cascade_response(sections, omega).norm();
    if !gain.is_finite() || gain <= f64::EPSILON {
        return Err(EegError::InvalidFilterDesign {
            reason: format!("degenerate gain {} at reference frequency", gain),
        });
    }

    let per_section = gain.powf(-1.0 / sections.len() as f64);
    for section in sections.iter_mut() {
        *section = section.scaled(per_section);
    }
    Ok(())
}
