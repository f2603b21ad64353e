// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Waveforms driving simulated input points.

use std::f64::consts::TAU;
use std::time::Duration;

use rand::Rng;
use rpio_core::Value;

/// Shape of a simulated signal over time.
#[derive(Debug, Clone, PartialEq)]
pub enum Waveform {
    /// A fixed value.
    Constant(f64),
    /// Linear rise from `min` to `max`, then restart.
    Ramp {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
        /// Duration of one rise.
        period: Duration,
    },
    /// Sine oscillating between `min` and `max`.
    Sine {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
        /// Duration of one oscillation.
        period: Duration,
    },
    /// Alternates between `min` and `max` every half period.
    Square {
        /// Low level.
        min: f64,
        /// High level.
        max: f64,
        /// Duration of one low/high pair.
        period: Duration,
    },
    /// Uniform noise in `[min, max]`.
    Random {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
}

impl Waveform {
    /// Samples the waveform `elapsed` after start.
    pub fn sample(&self, elapsed: Duration) -> f64 {
        match *self {
            Waveform::Constant(v) => v,
            Waveform::Ramp { min, max, period } => min + (max - min) * phase(elapsed, period),
            Waveform::Sine { min, max, period } => {
                let mid = (min + max) / 2.0;
                let amplitude = (max - min) / 2.0;
                mid + amplitude * (TAU * phase(elapsed, period)).sin()
            }
            Waveform::Square { min, max, period } => {
                if phase(elapsed, period) < 0.5 {
                    min
                } else {
                    max
                }
            }
            Waveform::Random { min, max } => {
                let (low, high) = if min <= max { (min, max) } else { (max, min) };
                if low == high {
                    low
                } else {
                    rand::thread_rng().gen_range(low..=high)
                }
            }
        }
    }

    /// Samples the waveform and shapes the result like `template`.
    pub fn sample_like(&self, elapsed: Duration, template: &Value) -> Value {
        conform(template, self.sample(elapsed))
    }
}

/// Position within the current period, in `[0, 1)`.
fn phase(elapsed: Duration, period: Duration) -> f64 {
    if period.is_zero() {
        return 0.0;
    }
    (elapsed.as_secs_f64() / period.as_secs_f64()).fract()
}

/// Converts a sample to the variant of `template`.
///
/// Booleans are true above zero; integers are rounded and saturated.
pub fn conform(template: &Value, sample: f64) -> Value {
    match template {
        Value::Bool(_) => Value::Bool(sample > 0.0),
        Value::Int16(_) => Value::Int16(sample.round() as i16),
        Value::Int32(_) => Value::Int32(sample.round() as i32),
        Value::Int64(_) => Value::Int64(sample.round() as i64),
        Value::UInt16(_) => Value::UInt16(sample.round() as u16),
        Value::UInt32(_) => Value::UInt32(sample.round() as u32),
        Value::UInt64(_) => Value::UInt64(sample.round() as u64),
        Value::Float32(_) => Value::Float32(sample as f32),
        Value::Float64(_) => Value::Float64(sample),
        Value::String(_) => Value::String(format!("{:.3}", sample)),
        Value::Bytes(_) => Value::Bytes(sample.to_be_bytes().to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_ramp_and_square() {
        let ramp = Waveform::Ramp {
            min: 0.0,
            max: 10.0,
            period: SECOND,
        };
        assert_eq!(ramp.sample(Duration::ZERO), 0.0);
        assert!((ramp.sample(Duration::from_millis(500)) - 5.0).abs() < 1e-9);
        assert!((ramp.sample(Duration::from_millis(1500)) - 5.0).abs() < 1e-9);

        let square = Waveform::Square {
            min: -1.0,
            max: 1.0,
            period: SECOND,
        };
        assert_eq!(square.sample(Duration::from_millis(100)), -1.0);
        assert_eq!(square.sample(Duration::from_millis(600)), 1.0);
    }

    #[test]
    fn test_sine_bounds() {
        let sine = Waveform::Sine {
            min: 2.0,
            max: 4.0,
            period: SECOND,
        };
        assert!((sine.sample(Duration::from_millis(250)) - 4.0).abs() < 1e-9);
        for ms in (0..1000).step_by(37) {
            let v = sine.sample(Duration::from_millis(ms));
            assert!((2.0 - 1e-9..=4.0 + 1e-9).contains(&v));
        }
    }

    #[test]
    fn test_random_within_range() {
        let random = Waveform::Random { min: 5.0, max: 1.0 };
        for _ in 0..100 {
            let v = random.sample(Duration::ZERO);
            assert!((1.0..=5.0).contains(&v));
        }
        assert_eq!(Waveform::Random { min: 3.0, max: 3.0 }.sample(Duration::ZERO), 3.0);
    }

    #[test]
    fn test_conform() {
        assert_eq!(conform(&Value::Bool(false), 0.7), Value::Bool(true));
        assert_eq!(conform(&Value::Int16(0), 41.6), Value::Int16(42));
        assert_eq!(conform(&Value::UInt16(0), -3.0), Value::UInt16(0));
        assert_eq!(conform(&Value::Float64(0.0), 1.25), Value::Float64(1.25));
    }

    #[test]
    fn test_zero_period_is_flat() {
        let ramp = Waveform::Ramp {
            min: 1.0,
            max: 2.0,
            period: Duration::ZERO,
        };
        assert_eq!(ramp.sample(SECOND), 1.0);
    }
}
