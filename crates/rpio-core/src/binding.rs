// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Per-signal binding between a host signal and one remote point.
//!
//! A [`PointBinding`] carries two single-slot mailboxes:
//!
//! - the **input mailbox**, filled by the subscription feed on the endpoint's
//!   notification thread and drained by the cyclic driver. The latest value
//!   and the `updated` flag live under one lock, so a reader that sees
//!   `updated` also sees the value that came with it. Older, unconsumed
//!   notifications are overwritten. The mailbox is stamped with a connection
//!   epoch; a feed only delivers under the epoch it was built with, so a
//!   retired feed can never fill the mailbox of a later connection.
//! - the **output slot**, holding the value queued for the next batched write
//!   and the status of the last one.
//!
//! Each binding has its own locks; unrelated points never contend.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::signal::Signal;
use crate::types::{DataValue, Direction, PointDescriptor, PointId, StatusCode, Value};

#[derive(Debug, Default)]
struct Mailbox {
    latest: Option<DataValue>,
    updated: bool,
    epoch: u64,
}

#[derive(Debug, Default)]
struct OutputSlot {
    pending: Option<Value>,
    status: StatusCode,
}

/// Binds one host signal to one remote point.
pub struct PointBinding {
    descriptor: PointDescriptor,
    signal: Arc<dyn Signal>,
    mailbox: Mutex<Mailbox>,
    output: Mutex<OutputSlot>,
    available: AtomicBool,
    fault_logged: AtomicBool,
}

impl PointBinding {
    /// Creates a binding. The point starts unavailable.
    pub fn new(descriptor: PointDescriptor, signal: Arc<dyn Signal>) -> Self {
        Self {
            descriptor,
            signal,
            mailbox: Mutex::new(Mailbox::default()),
            output: Mutex::new(OutputSlot::default()),
            available: AtomicBool::new(false),
            fault_logged: AtomicBool::new(false),
        }
    }

    /// Returns the signal name.
    pub fn name(&self) -> &str {
        self.signal.name()
    }

    /// Returns the bound signal.
    pub fn signal(&self) -> &Arc<dyn Signal> {
        &self.signal
    }

    /// Returns the point descriptor.
    pub fn descriptor(&self) -> &PointDescriptor {
        &self.descriptor
    }

    /// Returns the remote point identifier.
    pub fn point_id(&self) -> &PointId {
        &self.descriptor.point_id
    }

    /// Returns the data direction.
    pub fn direction(&self) -> Direction {
        self.descriptor.direction
    }

    // -------------------------------------------------------------------------
    // Input mailbox
    // -------------------------------------------------------------------------

    /// Returns the current connection epoch.
    pub fn epoch(&self) -> u64 {
        self.mailbox.lock().epoch
    }

    /// Stores a notification, replacing any unconsumed one.
    ///
    /// The value is dropped and `false` returned if `epoch` is no longer
    /// current.
    pub fn deliver(&self, epoch: u64, value: DataValue) -> bool {
        let mut mailbox = self.mailbox.lock();
        if mailbox.epoch != epoch {
            return false;
        }
        mailbox.latest = Some(value);
        mailbox.updated = true;
        true
    }

    /// Consumes the pending update, if any.
    ///
    /// Returns `None` when nothing arrived since the last call.
    pub fn take_update(&self) -> Option<DataValue> {
        let mut mailbox = self.mailbox.lock();
        if !mailbox.updated {
            return None;
        }
        mailbox.updated = false;
        mailbox.latest.clone()
    }

    /// Returns `true` if an unconsumed update is waiting.
    pub fn has_update(&self) -> bool {
        self.mailbox.lock().updated
    }

    /// Drops any pending update.
    pub fn clear_mailbox(&self) {
        let mut mailbox = self.mailbox.lock();
        mailbox.latest = None;
        mailbox.updated = false;
    }

    /// Ends the current epoch if it is still `epoch`.
    ///
    /// Deliveries stamped with it are refused from now on.
    pub(crate) fn retire(&self, epoch: u64) {
        let mut mailbox = self.mailbox.lock();
        if mailbox.epoch == epoch {
            mailbox.epoch = mailbox.epoch.wrapping_add(1);
        }
    }

    // -------------------------------------------------------------------------
    // Output slot
    // -------------------------------------------------------------------------

    /// Queues a value for the next batched write, replacing an older one.
    pub fn queue_write(&self, value: Value) {
        self.output.lock().pending = Some(value);
    }

    /// Returns the queued value, if any, without clearing it.
    pub fn pending_write(&self) -> Option<Value> {
        self.output.lock().pending.clone()
    }

    /// Records the status of a completed write and clears the queued value.
    pub fn complete_write(&self, status: StatusCode) {
        let mut output = self.output.lock();
        output.pending = None;
        output.status = status;
    }

    /// Returns the status of the last completed write.
    pub fn write_status(&self) -> StatusCode {
        self.output.lock().status
    }

    // -------------------------------------------------------------------------
    // Availability & fault flags
    // -------------------------------------------------------------------------

    /// Returns `true` if the point was resolvable during the current connection.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Sets the availability flag.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Marks the point faulted. Returns `true` on the transition into the fault.
    pub fn enter_fault(&self) -> bool {
        !self.fault_logged.swap(true, Ordering::AcqRel)
    }

    /// Clears the fault. Returns `true` on the transition out of the fault.
    pub fn clear_fault(&self) -> bool {
        self.fault_logged.swap(false, Ordering::AcqRel)
    }

    /// Returns `true` while a fault is standing.
    pub fn is_faulted(&self) -> bool {
        self.fault_logged.load(Ordering::Acquire)
    }

    /// Resets per-connection state before a new establishment attempt.
    pub(crate) fn reset_for_attempt(&self) {
        self.set_available(false);
        let mut mailbox = self.mailbox.lock();
        mailbox.latest = None;
        mailbox.updated = false;
        mailbox.epoch = mailbox.epoch.wrapping_add(1);
    }
}

impl fmt::Debug for PointBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointBinding")
            .field("signal", &self.name())
            .field("point", &self.descriptor.point_id)
            .field("direction", &self.descriptor.direction)
            .field("available", &self.is_available())
            .field("faulted", &self.is_faulted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalCell;

    fn binding(direction: Direction) -> PointBinding {
        let signal = Arc::new(SignalCell::new("level"));
        PointBinding::new(
            PointDescriptor::new(PointId::new("2", "Tank.Level"), direction),
            signal,
        )
    }

    #[test]
    fn test_update_consumed_once() {
        let b = binding(Direction::Input);
        assert!(b.take_update().is_none());

        assert!(b.deliver(b.epoch(), DataValue::good(1.0f64)));
        assert!(b.has_update());
        assert_eq!(b.take_update(), Some(DataValue::good(1.0f64)));
        assert!(b.take_update().is_none());
    }

    #[test]
    fn test_latest_notification_wins() {
        let b = binding(Direction::Input);
        let epoch = b.epoch();
        b.deliver(epoch, DataValue::good(1i32));
        b.deliver(epoch, DataValue::good(2i32));
        assert_eq!(b.take_update(), Some(DataValue::good(2i32)));
    }

    #[test]
    fn test_fault_edges() {
        let b = binding(Direction::Input);
        assert!(!b.clear_fault());
        assert!(b.enter_fault());
        assert!(!b.enter_fault());
        assert!(b.is_faulted());
        assert!(b.clear_fault());
        assert!(!b.clear_fault());
    }

    #[test]
    fn test_output_slot() {
        let b = binding(Direction::Output);
        assert!(b.pending_write().is_none());

        b.queue_write(Value::Int32(5));
        b.queue_write(Value::Int32(6));
        assert_eq!(b.pending_write(), Some(Value::Int32(6)));

        b.complete_write(StatusCode::BAD_NOT_WRITABLE);
        assert!(b.pending_write().is_none());
        assert_eq!(b.write_status(), StatusCode::BAD_NOT_WRITABLE);
    }

    #[test]
    fn test_reset_for_attempt() {
        let b = binding(Direction::Input);
        b.set_available(true);
        b.deliver(b.epoch(), DataValue::good(1i32));
        b.reset_for_attempt();
        assert!(!b.is_available());
        assert!(!b.has_update());
    }

    #[test]
    fn test_stale_epoch_refused() {
        let b = binding(Direction::Input);
        let old = b.epoch();
        b.reset_for_attempt();
        let current = b.epoch();
        assert_ne!(old, current);

        assert!(!b.deliver(old, DataValue::good(1i32)));
        assert!(!b.has_update());
        assert!(b.deliver(current, DataValue::good(2i32)));
        assert_eq!(b.take_update(), Some(DataValue::good(2i32)));
    }

    #[test]
    fn test_retire_only_ends_matching_epoch() {
        let b = binding(Direction::Input);
        let old = b.epoch();
        b.reset_for_attempt();
        let current = b.epoch();

        b.retire(old);
        assert_eq!(b.epoch(), current);

        b.retire(current);
        assert!(!b.deliver(current, DataValue::good(1i32)));
    }

    #[test]
    fn test_concurrent_delivery_pairs_value_and_flag() {
        let b = Arc::new(binding(Direction::Input));
        let producer = {
            let b = Arc::clone(&b);
            std::thread::spawn(move || {
                let epoch = b.epoch();
                for i in 0..1000i32 {
                    b.deliver(epoch, DataValue::good(i));
                }
            })
        };

        let mut last = -1i64;
        for _ in 0..1000 {
            if let Some(update) = b.take_update() {
                let v = update.value.and_then(|v| v.as_i64()).unwrap();
                assert!(v >= last, "updates must never go backwards");
                last = v;
            }
        }
        producer.join().unwrap();
        if let Some(update) = b.take_update() {
            assert_eq!(update.value, Some(Value::Int32(999)));
        }
    }
}
