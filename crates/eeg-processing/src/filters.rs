//! Filter application: persistent delay lines and whole-window transforms

use crate::design::Biquad;
use eeg_core::{EegError, EegResult};

/// Most sections a single delay line can hold
pub const MAX_SECTIONS: usize = 4;

/// Fixed-size record of coefficients plus their delay-line state.
///
/// One record exists per (channel, causal stage); its state survives
/// across ticks so consecutive windows are filtered as one stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayLine {
    sections: [Biquad; MAX_SECTIONS],
    state: [[f64; 2]; MAX_SECTIONS],
    len: usize,
}

impl DelayLine {
    pub fn new(sections: &[Biquad]) -> EegResult<Self> {
        if sections.len() > MAX_SECTIONS {
            return Err(EegError::InvalidFilterDesign {
                reason: format!(
                    "{} sections do not fit a delay line of {}",
                    sections.len(),
                    MAX_SECTIONS
                ),
            });
        }

        let mut stored = [Biquad::IDENTITY; MAX_SECTIONS];
        stored[..sections.len()].copy_from_slice(sections);

        Ok(DelayLine {
            sections: stored,
            state: [[0.0; 2]; MAX_SECTIONS],
            len: sections.len(),
        })
    }

    /// Run one sample through every section
    #[inline]
    pub fn process_sample(&mut self, input: f64) -> f64 {
        let mut value = input;
        for (section, state) in self.sections[..self.len].iter().zip(self.state.iter_mut()) {
            value = section.step(state, value);
        }
        value
    }

    pub fn process_in_place(&mut self, samples: &mut [f64]) {
        for sample in samples.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    /// Zero the delay line, keeping the coefficients
    pub fn reset(&mut self) {
        self.state = [[0.0; 2]; MAX_SECTIONS];
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections[..self.len]
    }

    pub fn state(&self) -> &[[f64; 2]] {
        &self.state[..self.len]
    }
}

/// Forward-backward filtering of a whole window.
///
/// The window is extended by odd reflection at both ends, each pass starts
/// from the steady state for the first sample it sees, and the padding is
/// removed afterwards. Windows shorter than two samples are returned as is.
pub fn zero_phase(sections: &[Biquad], input: &[f64]) -> Vec<f64> {
    let n = input.len();
    if n < 2 || sections.is_empty() {
        return input.to_vec();
    }

    let pad = (3 * (2 * sections.len() + 1)).min(n - 1);
    let first = input[0];
    let last = input[n - 1];

    let mut extended = Vec::with_capacity(n + 2 * pad);
    extended.extend((1..=pad).rev().map(|i| 2.0 * first - input[i]));
    extended.extend_from_slice(input);
    extended.extend((1..=pad).map(|i| 2.0 * last - input[n - 1 - i]));

    let initial = unit_steady_state(sections);
    run_from_steady_state(sections, &initial, &mut extended);
    extended.reverse();
    run_from_steady_state(sections, &initial, &mut extended);
    extended.reverse();

    extended[pad..pad + n].to_vec()
}

/// Subtract the least-squares straight line
pub fn detrend_linear(samples: &mut [f64]) {
    let n = samples.len();
    if n < 2 {
        samples.iter_mut().for_each(|s| *s = 0.0);
        return;
    }

    let nf = n as f64;
    let t_mean = (nf - 1.0) / 2.0;
    let y_mean = samples.iter().sum::<f64>() / nf;

    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (i, &y) in samples.iter().enumerate() {
        let dt = i as f64 - t_mean;
        sxy += dt * (y - y_mean);
        sxx += dt * dt;
    }
    let slope = sxy / sxx;

    for (i, y) in samples.iter_mut().enumerate() {
        *y -= y_mean + slope * (i as f64 - t_mean);
    }
}

/// Per-section steady state for a unit constant fed into the cascade
fn unit_steady_state(sections: &[Biquad]) -> Vec<[f64; 2]> {
    let mut gain = 1.0;
    sections
        .iter()
        .map(|section| {
            let state = section.steady_state(gain);
            gain *= section.dc_gain();
            state
        })
        .collect()
}

fn run_from_steady_state(sections: &[Biquad], initial: &[[f64; 2]], samples: &mut [f64]) {
    let Some(&x0) = samples.first() else {
        return;
    };
    let mut states: Vec<[f64; 2]> = initial.iter().map(|z| [z[0] * x0, z[1] * x0]).collect();

    for sample in samples.iter_mut() {
        let mut value = *sample;
        for (section, state) in sections.iter().zip(states.iter_mut()) {
            value = section.step(state, value);
        }
        *sample = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{butterworth_bandstop, butterworth_highpass, iir_notch};
    use std::f64::consts::PI;

    const FS: f64 = 512.0;

    fn sine(freq: f64, amplitude: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / FS).sin())
            .collect()
    }

    #[test]
    fn test_delay_line_sample_matches_batch() {
        let sections = butterworth_highpass(4, 1.0, FS).unwrap();
        let input = sine(7.0, 30.0, 300);

        let mut batch = DelayLine::new(&sections).unwrap();
        let mut batch_out = input.clone();
        batch.process_in_place(&mut batch_out);

        let mut single = DelayLine::new(&sections).unwrap();
        let single_out: Vec<f64> = input.iter().map(|&x| single.process_sample(x)).collect();

        assert_eq!(batch_out, single_out);
        assert_eq!(batch, single);
    }

    #[test]
    fn test_delay_line_reset() {
        let mut line = DelayLine::new(&[iir_notch(50.0, 30.0, FS).unwrap()]).unwrap();
        line.process_in_place(&mut sine(10.0, 5.0, 64));
        assert!(line.state().iter().any(|s| s[0] != 0.0));

        line.reset();
        assert!(line.state().iter().all(|s| *s == [0.0, 0.0]));
        assert_eq!(line.sections().len(), 1);
    }

    #[test]
    fn test_delay_line_capacity() {
        let sections = vec![Biquad::IDENTITY; MAX_SECTIONS + 1];
        assert!(DelayLine::new(&sections).is_err());
    }

    #[test]
    fn test_zero_phase_keeps_out_of_band_sine_in_place() {
        let sections = butterworth_bandstop(2, 48.0, 52.0, FS).unwrap();
        let input = sine(10.0, 20.0, 2048);
        let output = zero_phase(&sections, &input);

        assert_eq!(output.len(), input.len());
        for i in 200..1800 {
            assert!((output[i] - input[i]).abs() < 0.05, "sample {} drifted", i);
        }
    }

    #[test]
    fn test_zero_phase_removes_line_noise() {
        let sections = butterworth_bandstop(2, 48.0, 52.0, FS).unwrap();
        let input = sine(50.0, 20.0, 2048);
        let output = zero_phase(&sections, &input);

        let tail_peak = output[500..1500].iter().fold(0.0f64, |m, x| m.max(x.abs()));
        assert!(tail_peak < 1.0);
    }

    #[test]
    fn test_zero_phase_constant_and_short_input() {
        let sections = butterworth_bandstop(2, 48.0, 52.0, FS).unwrap();
        let constant = vec![4.0; 100];
        for value in zero_phase(&sections, &constant) {
            assert!((value - 4.0).abs() < 1e-9);
        }

        assert_eq!(zero_phase(&sections, &[1.5]), vec![1.5]);
        assert!(zero_phase(&sections, &[]).is_empty());
        assert_eq!(zero_phase(&sections, &[1.0, 2.0, 3.0]).len(), 3);
    }

    #[test]
    fn test_detrend_removes_line() {
        let mut samples: Vec<f64> = (0..50).map(|i| 3.0 + 0.5 * i as f64).collect();
        detrend_linear(&mut samples);
        assert!(samples.iter().all(|s| s.abs() < 1e-9));

        let mut single = vec![7.0];
        detrend_linear(&mut single);
        assert_eq!(single, vec![0.0]);
    }
}
