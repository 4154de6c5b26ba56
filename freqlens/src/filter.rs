//! Butterworth bandpass design and causal filtering.
//!
//! The analog lowpass prototype is transformed to a bandpass around the
//! prewarped cutoffs and mapped to the z-plane with the bilinear transform.
//! The resulting transfer function is run as a cascade of second-order
//! sections so that narrow bands at low frequencies stay stable.

use std::f64::consts::PI;

use num_complex::Complex64;
use tracing::instrument;

use crate::error::{AnalysisError, Result};
use crate::signal::FrequencyBand;

pub const DEFAULT_ORDER: usize = 5;

/// Highest prototype order accepted by [`ButterworthBandpass::design`].
pub const MAX_ORDER: usize = 32;

/// `2 * fs` for the bilinear transform with frequencies normalised to nyquist.
const BILINEAR_K: f64 = 4.0;

/// H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy, PartialEq)]
struct Biquad {
    b: [f64; 3],
    a: [f64; 2],
}

/// Direct form II transposed state.
#[derive(Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}

impl BiquadState {
    fn process(&mut self, x: f64, c: &Biquad) -> f64 {
        let y = c.b[0] * x + self.z1;
        self.z1 = c.b[1] * x - c.a[0] * y + self.z2;
        self.z2 = c.b[2] * x - c.a[1] * y;
        y
    }
}

impl Biquad {
    /// Section with zeros at z = 1 and z = -1 and the given pole pair.
    fn bandpass(pole_sum: f64, pole_product: f64, gain: f64) -> Self {
        Self {
            b: [gain, 0.0, -gain],
            a: [-pole_sum, pole_product],
        }
    }

    /// Finite coefficients with both poles strictly inside the unit circle.
    fn is_stable(&self) -> bool {
        let [a1, a2] = self.a;
        self.b.iter().chain(&self.a).all(|coeff| coeff.is_finite())
            && self.b[0] != 0.0
            && a2.abs() < 1.0
            && a1.abs() < 1.0 + a2
    }

    fn response(&self, z_inv: Complex64) -> Complex64 {
        let z_inv2 = z_inv * z_inv;
        let num = self.b[0] + z_inv * self.b[1] + z_inv2 * self.b[2];
        let den = 1.0 + z_inv * self.a[0] + z_inv2 * self.a[1];
        num / den
    }
}

/// A digital Butterworth bandpass of a given order (the realised transfer
/// function is of order `2 * order`).
#[derive(Debug, Clone, PartialEq)]
pub struct ButterworthBandpass {
    sections: Vec<Biquad>,
    sample_rate: u32,
}

impl ButterworthBandpass {
    #[instrument(level = "trace")]
    pub fn design(band: FrequencyBand, sample_rate: u32, order: usize) -> Result<Self> {
        if !(1..=MAX_ORDER).contains(&order) {
            return Err(AnalysisError::InvalidFilterOrder(order));
        }
        band.validate(sample_rate)?;

        let nyquist = sample_rate as f64 / 2.0;
        let warped_low = prewarp(band.lowcut / nyquist);
        let warped_high = prewarp(band.highcut / nyquist);
        let bandwidth = warped_high - warped_low;
        let centre = (warped_low * warped_high).sqrt();

        let to_bandpass = |pole: Complex64| {
            let scaled = pole * (bandwidth / 2.0);
            let offset = (scaled * scaled - centre * centre).sqrt();
            [scaled + offset, scaled - offset]
        };
        let to_digital = |pole: Complex64| (BILINEAR_K + pole) / (BILINEAR_K - pole);

        // each section takes one `bandwidth * k` factor of the overall gain
        // over its own pair of (k - p) terms, keeping every factor near unity
        let section_gain = |first: Complex64, second: Complex64| {
            (bandwidth * BILINEAR_K / ((BILINEAR_K - first) * (BILINEAR_K - second))).re
        };
        let mut sections = Vec::with_capacity(order);

        // prototype poles in the upper half plane, their conjugates are implied
        for i in 0..order / 2 {
            let theta = PI * (order - 1 - 2 * i) as f64 / (2 * order) as f64;
            let prototype = Complex64::new(-theta.cos(), theta.sin());

            for analog in to_bandpass(prototype) {
                let digital = to_digital(analog);
                sections.push(Biquad::bandpass(
                    2.0 * digital.re,
                    digital.norm_sqr(),
                    section_gain(analog, analog.conj()),
                ));
            }
        }

        // odd orders carry a real prototype pole at s = -1, its bandpass image
        // is either a conjugate pair or two real poles
        if order % 2 == 1 {
            let [first, second] = to_bandpass(Complex64::new(-1.0, 0.0));
            let gain = section_gain(first, second);
            let (first, second) = (to_digital(first), to_digital(second));
            sections.push(Biquad::bandpass(
                (first + second).re,
                (first * second).re,
                gain,
            ));
        }

        // poles crowd the unit circle as the order grows against a narrow band
        if !sections.iter().all(Biquad::is_stable) {
            return Err(AnalysisError::InvalidFilterOrder(order));
        }

        Ok(Self {
            sections,
            sample_rate,
        })
    }

    /// Filters `samples` causally from a zero initial state. The input is
    /// left untouched and the output has the same length.
    #[instrument(skip_all, fields(len = samples.len()), level = "trace")]
    pub fn apply(&self, samples: &[f64]) -> Vec<f64> {
        let mut states: Vec<BiquadState> =
            self.sections.iter().map(|_| BiquadState::default()).collect();

        samples
            .iter()
            .map(|&sample| {
                self.sections
                    .iter()
                    .zip(states.iter_mut())
                    .fold(sample, |x, (section, state)| state.process(x, section))
            })
            .collect()
    }

    /// Expanded numerator and denominator polynomials in `z^-1`, normalised
    /// so that `a[0] == 1`.
    pub fn transfer_function(&self) -> (Vec<f64>, Vec<f64>) {
        self.sections.iter().fold(
            (vec![1.0], vec![1.0]),
            |(b, a), section| {
                let den = [1.0, section.a[0], section.a[1]];
                (convolve(&b, &section.b), convolve(&a, &den))
            },
        )
    }

    /// Gain of the filter at `frequency` Hz.
    pub fn magnitude_response(&self, frequency: f64) -> f64 {
        let omega = 2.0 * PI * frequency / self.sample_rate as f64;
        let z_inv = Complex64::from_polar(1.0, -omega);

        self.sections
            .iter()
            .map(|section| section.response(z_inv))
            .fold(Complex64::new(1.0, 0.0), |acc, h| acc * h)
            .norm()
    }
}

/// Maps a cutoff normalised to nyquist onto the analog axis used by the
/// bilinear transform.
fn prewarp(normalised: f64) -> f64 {
    BILINEAR_K * (PI * normalised / 2.0).tan()
}

fn convolve(lhs: &[f64], rhs: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; lhs.len() + rhs.len() - 1];
    for (i, l) in lhs.iter().enumerate() {
        for (j, r) in rhs.iter().enumerate() {
            out[i + j] += l * r;
        }
    }
    out
}

/// Designs a Butterworth bandpass of `order` for `band` and runs `samples`
/// through it.
pub fn bandpass_filter(
    samples: &[f64],
    band: FrequencyBand,
    sample_rate: u32,
    order: usize,
) -> Result<Vec<f64>> {
    Ok(ButterworthBandpass::design(band, sample_rate, order)?.apply(samples))
}
