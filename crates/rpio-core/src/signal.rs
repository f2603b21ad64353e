// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The narrow interface between drivers and the host's typed signals.
//!
//! A driver only ever calls four things on a signal: [`Signal::check_in`]
//! for inputs, [`Signal::check_out`] and [`Signal::set_write_status`] for
//! outputs, and [`Signal::invalidate`] on failure. [`SignalCell`] is a
//! thread-safe implementation used by the runner and the tests.

use std::fmt;

use parking_lot::Mutex;

use crate::types::{StatusCode, Value};

// =============================================================================
// Signal trait
// =============================================================================

/// A sample handed from an output signal to the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSample {
    /// The value to write.
    pub value: Value,
    /// Whether the host considers the value valid.
    pub valid: bool,
}

/// Host-side signal bound to one remote point.
pub trait Signal: Send + Sync {
    /// Returns the signal name, used in logs.
    fn name(&self) -> &str;

    /// Stores a freshly received input value.
    fn check_in(&self, value: Value, valid: bool);

    /// Takes the output value the host has set since the last call.
    ///
    /// Returns `None` when nothing new is pending.
    fn check_out(&self) -> Option<OutputSample> {
        None
    }

    /// Receives the status of the last write of this signal.
    fn set_write_status(&self, _status: StatusCode) {}

    /// Marks the current value as invalid.
    fn invalidate(&self);
}

// =============================================================================
// SignalCell
// =============================================================================

#[derive(Debug, Default)]
struct CellState {
    value: Option<Value>,
    valid: bool,
    pending: Option<Value>,
    write_status: StatusCode,
    check_ins: u64,
}

/// A mutex-guarded in-memory [`Signal`].
///
/// The host reads inputs with [`value`](Self::value)/[`is_valid`](Self::is_valid)
/// and sets outputs with [`set`](Self::set).
pub struct SignalCell {
    name: String,
    state: Mutex<CellState>,
}

impl SignalCell {
    /// Creates an empty, invalid signal.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(CellState::default()),
        }
    }

    /// Creates a valid signal holding `value`.
    pub fn with_value(name: impl Into<String>, value: impl Into<Value>) -> Self {
        let cell = Self::new(name);
        {
            let mut state = cell.state.lock();
            state.value = Some(value.into());
            state.valid = true;
        }
        cell
    }

    /// Returns the current value, valid or not.
    pub fn value(&self) -> Option<Value> {
        self.state.lock().value.clone()
    }

    /// Returns the current value only if it is valid.
    pub fn valid_value(&self) -> Option<Value> {
        let state = self.state.lock();
        if state.valid { state.value.clone() } else { None }
    }

    /// Returns `true` if the current value is valid.
    pub fn is_valid(&self) -> bool {
        self.state.lock().valid
    }

    /// Sets a new output value. The driver picks it up on its next cycle.
    pub fn set(&self, value: impl Into<Value>) {
        let value = value.into();
        let mut state = self.state.lock();
        state.value = Some(value.clone());
        state.valid = true;
        state.pending = Some(value);
    }

    /// Returns the status of the last write.
    pub fn write_status(&self) -> StatusCode {
        self.state.lock().write_status
    }

    /// Returns how many values have been checked in.
    pub fn check_in_count(&self) -> u64 {
        self.state.lock().check_ins
    }
}

impl Signal for SignalCell {
    fn name(&self) -> &str {
        &self.name
    }

    fn check_in(&self, value: Value, valid: bool) {
        let mut state = self.state.lock();
        state.value = Some(value);
        state.valid = valid;
        state.check_ins += 1;
    }

    fn check_out(&self) -> Option<OutputSample> {
        let mut state = self.state.lock();
        let value = state.pending.take()?;
        Some(OutputSample {
            value,
            valid: state.valid,
        })
    }

    fn set_write_status(&self, status: StatusCode) {
        self.state.lock().write_status = status;
    }

    fn invalidate(&self) {
        let mut state = self.state.lock();
        state.valid = false;
    }
}

impl fmt::Debug for SignalCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SignalCell")
            .field("name", &self.name)
            .field("value", &state.value)
            .field("valid", &state.valid)
            .field("write_status", &state.write_status)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_in_and_invalidate() {
        let cell = SignalCell::new("tank_level");
        assert!(!cell.is_valid());

        cell.check_in(Value::Float64(3.5), true);
        assert_eq!(cell.valid_value(), Some(Value::Float64(3.5)));
        assert_eq!(cell.check_in_count(), 1);

        cell.invalidate();
        assert!(!cell.is_valid());
        assert_eq!(cell.value(), Some(Value::Float64(3.5)));
        assert_eq!(cell.valid_value(), None);
    }

    #[test]
    fn test_check_out_only_once() {
        let cell = SignalCell::new("valve_cmd");
        assert!(cell.check_out().is_none());

        cell.set(true);
        let sample = cell.check_out().unwrap();
        assert_eq!(sample.value, Value::Bool(true));
        assert!(sample.valid);
        assert!(cell.check_out().is_none());
    }

    #[test]
    fn test_latest_output_wins() {
        let cell = SignalCell::new("setpoint");
        cell.set(1.0f64);
        cell.set(2.0f64);
        assert_eq!(cell.check_out().unwrap().value, Value::Float64(2.0));
    }

    #[test]
    fn test_write_status() {
        let cell = SignalCell::with_value("setpoint", 10i32);
        assert_eq!(cell.write_status(), StatusCode::GOOD);
        cell.set_write_status(StatusCode::BAD_NOT_WRITABLE);
        assert_eq!(cell.write_status(), StatusCode::BAD_NOT_WRITABLE);
    }
}
