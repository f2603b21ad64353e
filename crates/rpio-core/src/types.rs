// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core data types shared by sessions, bindings and the cyclic driver.
//!
//! - [`Value`]: a remote value as carried by notifications and writes
//! - [`StatusCode`]: per-item quality/status reported by the endpoint
//! - [`DataValue`]: a value paired with its status
//! - [`PointId`] / [`PointDescriptor`]: opaque remote point addressing
//! - [`DriverState`]: the cyclic driver's state machine states

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Value
// =============================================================================

/// A remote point value.
///
/// # Examples
///
/// ```
/// use rpio_core::types::Value;
///
/// let level = Value::Float64(42.5);
/// assert_eq!(level.as_f64(), Some(42.5));
///
/// let pump = Value::from(true);
/// assert_eq!(pump.as_bool(), Some(true));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// Boolean value
    Bool(bool),

    /// Signed 16-bit integer
    Int16(i16),

    /// Signed 32-bit integer
    Int32(i32),

    /// Signed 64-bit integer
    Int64(i64),

    /// Unsigned 16-bit integer
    UInt16(u16),

    /// Unsigned 32-bit integer
    UInt32(u32),

    /// Unsigned 64-bit integer
    UInt64(u64),

    /// 32-bit floating point
    Float32(f32),

    /// 64-bit floating point
    Float64(f64),

    /// UTF-8 string
    String(String),

    /// Raw bytes
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns the type name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "Bool",
            Value::Int16(_) => "Int16",
            Value::Int32(_) => "Int32",
            Value::Int64(_) => "Int64",
            Value::UInt16(_) => "UInt16",
            Value::UInt32(_) => "UInt32",
            Value::UInt64(_) => "UInt64",
            Value::Float32(_) => "Float32",
            Value::Float64(_) => "Float64",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
        }
    }

    /// Returns `true` if this is a numeric value.
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Value::Bool(_) | Value::String(_) | Value::Bytes(_))
    }

    /// Converts the value to f64 if numeric or boolean.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::Int16(v) => Some(*v as f64),
            Value::Int32(v) => Some(*v as f64),
            Value::Int64(v) => Some(*v as f64),
            Value::UInt16(v) => Some(*v as f64),
            Value::UInt32(v) => Some(*v as f64),
            Value::UInt64(v) => Some(*v as f64),
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            Value::String(_) | Value::Bytes(_) => None,
        }
    }

    /// Converts the value to i64 if it is an integer or boolean.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(v) => Some(*v as i64),
            Value::Int16(v) => Some(*v as i64),
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            Value::UInt16(v) => Some(*v as i64),
            Value::UInt32(v) => Some(*v as i64),
            Value::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Converts the value to bool. Numbers map to `value != 0`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::String(_) | Value::Bytes(_) => None,
            other => other.as_f64().map(|v| v != 0.0),
        }
    }

    /// Returns the string slice if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the natural width of the value in bits, if it has one.
    pub fn size_bits(&self) -> Option<u32> {
        match self {
            Value::Bool(_) => Some(1),
            Value::Int16(_) | Value::UInt16(_) => Some(16),
            Value::Int32(_) | Value::UInt32(_) | Value::Float32(_) => Some(32),
            Value::Int64(_) | Value::UInt64(_) | Value::Float64(_) => Some(64),
            Value::String(_) | Value::Bytes(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::UInt16(v) => write!(f, "{}", v),
            Value::UInt32(v) => write!(f, "{}", v),
            Value::UInt64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "\"{}\"", v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

macro_rules! impl_from_for_value {
    ($variant:ident, $type:ty) => {
        impl From<$type> for Value {
            fn from(v: $type) -> Self {
                Value::$variant(v)
            }
        }
    };
}

impl_from_for_value!(Bool, bool);
impl_from_for_value!(Int16, i16);
impl_from_for_value!(Int32, i32);
impl_from_for_value!(Int64, i64);
impl_from_for_value!(UInt16, u16);
impl_from_for_value!(UInt32, u32);
impl_from_for_value!(UInt64, u64);
impl_from_for_value!(Float32, f32);
impl_from_for_value!(Float64, f64);
impl_from_for_value!(String, String);
impl_from_for_value!(Bytes, Vec<u8>);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

// =============================================================================
// StatusCode
// =============================================================================

/// A 32-bit quality/status code as reported by the remote endpoint.
///
/// The two most significant bits carry the severity: `00` good,
/// `01` uncertain, `10`/`11` bad. The remaining bits identify the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(u32);

impl StatusCode {
    const SEVERITY_MASK: u32 = 0xC000_0000;
    const SEVERITY_UNCERTAIN: u32 = 0x4000_0000;
    const SEVERITY_BAD: u32 = 0x8000_0000;

    /// The operation succeeded.
    pub const GOOD: StatusCode = StatusCode(0);
    /// The value is usable but its quality is uncertain.
    pub const UNCERTAIN: StatusCode = StatusCode(0x4000_0000);
    /// Generic bad status.
    pub const BAD: StatusCode = StatusCode(0x8000_0000);
    /// Communication with the endpoint failed.
    pub const BAD_COMMUNICATION_ERROR: StatusCode = StatusCode(0x8005_0000);
    /// The request timed out.
    pub const BAD_TIMEOUT: StatusCode = StatusCode(0x800A_0000);
    /// No value has been received yet.
    pub const BAD_WAITING_FOR_INITIAL_DATA: StatusCode = StatusCode(0x8032_0000);
    /// The point does not exist on the endpoint.
    pub const BAD_NODE_ID_UNKNOWN: StatusCode = StatusCode(0x8034_0000);
    /// The point does not accept writes.
    pub const BAD_NOT_WRITABLE: StatusCode = StatusCode(0x803B_0000);
    /// The value type does not match the point type.
    pub const BAD_TYPE_MISMATCH: StatusCode = StatusCode(0x8074_0000);
    /// The session is not connected.
    pub const BAD_NOT_CONNECTED: StatusCode = StatusCode(0x808A_0000);
    /// The endpoint is shutting down or still booting.
    pub const BAD_SERVER_HALTED: StatusCode = StatusCode(0x800E_0000);

    /// Creates a status code from its raw value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// Returns `true` for a good status.
    #[inline]
    pub const fn is_good(&self) -> bool {
        self.0 & Self::SEVERITY_MASK == 0
    }

    /// Returns `true` for an uncertain status.
    #[inline]
    pub const fn is_uncertain(&self) -> bool {
        self.0 & Self::SEVERITY_MASK == Self::SEVERITY_UNCERTAIN
    }

    /// Returns `true` for a bad status.
    #[inline]
    pub const fn is_bad(&self) -> bool {
        self.0 & Self::SEVERITY_BAD != 0
    }

    /// Returns the symbolic name of well-known codes.
    pub fn name(&self) -> Option<&'static str> {
        let name = match *self {
            Self::GOOD => "Good",
            Self::UNCERTAIN => "Uncertain",
            Self::BAD => "Bad",
            Self::BAD_COMMUNICATION_ERROR => "BadCommunicationError",
            Self::BAD_TIMEOUT => "BadTimeout",
            Self::BAD_WAITING_FOR_INITIAL_DATA => "BadWaitingForInitialData",
            Self::BAD_NODE_ID_UNKNOWN => "BadNodeIdUnknown",
            Self::BAD_NOT_WRITABLE => "BadNotWritable",
            Self::BAD_TYPE_MISMATCH => "BadTypeMismatch",
            Self::BAD_NOT_CONNECTED => "BadNotConnected",
            Self::BAD_SERVER_HALTED => "BadServerHalted",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} (0x{:08X})", name, self.0),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

impl From<u32> for StatusCode {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

// =============================================================================
// DataValue
// =============================================================================

/// A value with the status the endpoint attached to it.
///
/// `value` is `None` when the endpoint had nothing to report (typically
/// alongside a bad status).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValue {
    /// The value, if any.
    pub value: Option<Value>,
    /// The quality/status code.
    pub status: StatusCode,
}

impl DataValue {
    /// Creates a good data value.
    pub fn good(value: impl Into<Value>) -> Self {
        Self {
            value: Some(value.into()),
            status: StatusCode::GOOD,
        }
    }

    /// Creates a value-less data value with the given status.
    pub fn status_only(status: StatusCode) -> Self {
        Self {
            value: None,
            status,
        }
    }

    /// Returns the value if the status is not bad.
    pub fn usable_value(&self) -> Option<&Value> {
        if self.status.is_bad() {
            None
        } else {
            self.value.as_ref()
        }
    }
}

// =============================================================================
// PointId
// =============================================================================

/// Opaque identifier of a remote point.
///
/// A namespace (or region) plus a local identifier. Byte/bit offsets of
/// process-image backends are expressed the same way (`"pi"`, `"12.3"`).
/// The core never interprets either part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointId {
    /// Namespace or region.
    pub namespace: String,
    /// Identifier local to the namespace.
    pub identifier: String,
}

impl PointId {
    /// Creates a new point identifier.
    pub fn new(namespace: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            identifier: identifier.into(),
        }
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.identifier)
    }
}

// =============================================================================
// Direction & PointDescriptor
// =============================================================================

/// Data direction of a point as seen from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Remote to host.
    #[default]
    Input,
    /// Host to remote.
    Output,
    /// Both.
    Bidirectional,
}

impl Direction {
    /// Returns `true` if values flow from the remote point into the host.
    #[inline]
    pub fn is_input(&self) -> bool {
        matches!(self, Direction::Input | Direction::Bidirectional)
    }

    /// Returns `true` if the host writes values to the remote point.
    #[inline]
    pub fn is_output(&self) -> bool {
        matches!(self, Direction::Output | Direction::Bidirectional)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
            Direction::Bidirectional => write!(f, "bidirectional"),
        }
    }
}

/// Resolved address of one signal: `{pointID, sizeInBits-or-NA, direction}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointDescriptor {
    /// The remote point.
    pub point_id: PointId,
    /// Width in bits, when the backend addresses by size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bits: Option<u32>,
    /// Data direction.
    pub direction: Direction,
}

impl PointDescriptor {
    /// Creates a descriptor without a size.
    pub fn new(point_id: PointId, direction: Direction) -> Self {
        Self {
            point_id,
            size_bits: None,
            direction,
        }
    }

    /// Sets the size in bits.
    pub fn with_size_bits(mut self, bits: u32) -> Self {
        self.size_bits = Some(bits);
        self
    }
}

// =============================================================================
// DriverState
// =============================================================================

/// State of a [`CyclicDriver`](crate::driver::CyclicDriver).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    /// No session; the next cycle starts connecting.
    #[default]
    Idle,
    /// An establishment attempt is in flight.
    Connecting,
    /// Connected; values are exchanged every cycle.
    Transceiving,
    /// Shutdown requested; tearing down.
    Closing,
    /// Terminal.
    Stopped,
}

impl DriverState {
    /// Returns `true` for the terminal state.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, DriverState::Stopped)
    }

    /// Returns `true` while values are being exchanged.
    #[inline]
    pub fn is_transceiving(&self) -> bool {
        matches!(self, DriverState::Transceiving)
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverState::Idle => write!(f, "IDLE"),
            DriverState::Connecting => write!(f, "CONNECTING"),
            DriverState::Transceiving => write!(f, "TRANSCEIVING"),
            DriverState::Closing => write!(f, "CLOSING"),
            DriverState::Stopped => write!(f, "STOPPED"),
        }
    }
}

// =============================================================================
// EndpointKey
// =============================================================================

/// Identity of a driver instance: remote endpoint plus addressing scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointKey {
    /// Endpoint locator, e.g. a URL.
    pub endpoint: String,
    /// Addressing scope within the endpoint.
    pub scope: String,
}

impl EndpointKey {
    /// Creates a new endpoint key.
    pub fn new(endpoint: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            scope: scope.into(),
        }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.endpoint, self.scope)
    }
}

// =============================================================================
// Tests
// =============================================================================
