// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Address resolution contract.
//!
//! Locator syntax is owned by the protocol backend. The driver only sees the
//! resulting [`PointDescriptor`].

use std::collections::HashMap;

use crate::error::{DriverError, DriverResult};
use crate::types::PointDescriptor;

/// Turns a signal locator into a point descriptor.
pub trait AddressResolver: Send + Sync {
    /// Resolves `locator`.
    fn resolve(&self, locator: &str) -> DriverResult<PointDescriptor>;
}

impl<F> AddressResolver for F
where
    F: Fn(&str) -> DriverResult<PointDescriptor> + Send + Sync,
{
    fn resolve(&self, locator: &str) -> DriverResult<PointDescriptor> {
        self(locator)
    }
}

/// A resolver backed by a fixed locator table.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<String, PointDescriptor>,
}

impl StaticResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry.
    pub fn insert(&mut self, locator: impl Into<String>, descriptor: PointDescriptor) {
        self.entries.insert(locator.into(), descriptor);
    }

    /// Adds an entry, builder style.
    pub fn with(mut self, locator: impl Into<String>, descriptor: PointDescriptor) -> Self {
        self.insert(locator, descriptor);
        self
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AddressResolver for StaticResolver {
    fn resolve(&self, locator: &str) -> DriverResult<PointDescriptor> {
        self.entries
            .get(locator)
            .cloned()
            .ok_or_else(|| DriverError::address_resolution(locator, "unknown locator"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, PointId};

    #[test]
    fn test_static_resolver() {
        let descriptor = PointDescriptor::new(PointId::new("2", "Pump.Run"), Direction::Output);
        let resolver = StaticResolver::new().with("pump_run", descriptor.clone());

        assert_eq!(resolver.resolve("pump_run").unwrap(), descriptor);
        let err = resolver.resolve("missing").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |locator: &str| -> DriverResult<PointDescriptor> {
            Ok(PointDescriptor::new(PointId::new("pi", locator), Direction::Input).with_size_bits(1))
        };
        let descriptor = resolver.resolve("12.3").unwrap();
        assert_eq!(descriptor.point_id.identifier, "12.3");
        assert_eq!(descriptor.size_bits, Some(1));
    }
}
