//! Error types for device and interface operations following the
//! M-ERRORS-CANONICAL-STRUCTS guideline.
//!
//! Every error belongs to one of four categories (capability, argument,
//! resource, device) and maps onto a negative code from the stack-wide
//! errno space through [`NetError::code`]. Structured errors carry a
//! backtrace when the `std` feature is enabled.

use core::fmt;

#[cfg(feature = "std")]
use std::backtrace::Backtrace;

/// Result type alias for device and interface operations.
pub type Result<T> = core::result::Result<T, NetError>;

/// Stack-wide error numbers (positive values, negated on the wire).
pub mod errno {
    /// I/O error
    pub const EIO: i32 = 5;
    /// Try again
    pub const EAGAIN: i32 = 11;
    /// Out of memory
    pub const ENOMEM: i32 = 12;
    /// No such device
    pub const ENODEV: i32 = 19;
    /// Invalid argument
    pub const EINVAL: i32 = 22;
    /// Bad message
    pub const EBADMSG: i32 = 74;
    /// Operation not supported
    pub const ENOTSUP: i32 = 95;
    /// Address not available
    pub const EADDRNOTAVAIL: i32 = 99;
    /// No buffer space available
    pub const ENOBUFS: i32 = 105;
    /// Connection timed out
    pub const ETIMEDOUT: i32 = 110;
    /// Operation already in progress
    pub const EALREADY: i32 = 114;
}

// =============================================================================
// Error Kind Enums (Internal)
// =============================================================================

/// Capability error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum CapabilityErrorKind {
    Unsupported,
    AddressNotImplemented,
}

/// Argument error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum ArgumentErrorKind {
    BufferTooSmall,
    InvalidLength,
    InvalidValue,
    InvalidStackSize,
    InvalidPriority,
    InvalidName,
    BadMessage,
    NotRegistered,
}

/// Resource error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum ResourceErrorKind {
    NoFreeSlot,
    NoFreeTask,
    AlreadyBound,
    FilterFull,
}

/// Device error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum DeviceErrorKind {
    Io,
    Timeout,
    Nack,
    BadResponse,
}

// =============================================================================
// Main Error Type
// =============================================================================

/// Network device and interface error.
///
/// This is the error type returned by every `NetDev` and interface
/// operation. Use [`NetError::code`] to obtain the negative errno value
/// when a C-style return code is needed.
#[derive(Debug)]
pub enum NetError {
    /// The option or operation is not implemented by this device class
    Capability(CapabilityError),
    /// Bad buffer, length, stack size, priority, name or handle
    Argument(ArgumentError),
    /// No free interface slot or task, or the device is already bound
    Resource(ResourceError),
    /// The transceiver failed or did not answer
    Device(DeviceError),
}

// =============================================================================
// Structured Error Types
// =============================================================================

/// Capability error with optional backtrace
#[derive(Debug)]
pub struct CapabilityError {
    kind: CapabilityErrorKind,
    #[cfg(feature = "std")]
    backtrace: Backtrace,
}

impl CapabilityError {
    pub(crate) fn new(kind: CapabilityErrorKind) -> Self {
        Self {
            kind,
            #[cfg(feature = "std")]
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if the option is simply not supported by the device class
    pub fn is_unsupported(&self) -> bool {
        matches!(self.kind, CapabilityErrorKind::Unsupported)
    }

    /// Check if the bound driver does not answer the address option
    pub fn is_address_not_implemented(&self) -> bool {
        matches!(self.kind, CapabilityErrorKind::AddressNotImplemented)
    }
}

/// Argument error with optional backtrace
#[derive(Debug)]
pub struct ArgumentError {
    kind: ArgumentErrorKind,
    #[cfg(feature = "std")]
    backtrace: Backtrace,
}

impl ArgumentError {
    pub(crate) fn new(kind: ArgumentErrorKind) -> Self {
        Self {
            kind,
            #[cfg(feature = "std")]
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if the caller's buffer is too small
    pub fn is_buffer_too_small(&self) -> bool {
        matches!(self.kind, ArgumentErrorKind::BufferTooSmall)
    }

    /// Check if the stack memory is below the minimum
    pub fn is_invalid_stack_size(&self) -> bool {
        matches!(self.kind, ArgumentErrorKind::InvalidStackSize)
    }

    /// Check if the priority is outside the scheduler's range
    pub fn is_invalid_priority(&self) -> bool {
        matches!(self.kind, ArgumentErrorKind::InvalidPriority)
    }

    /// Check if the handle does not name a registered interface
    pub fn is_not_registered(&self) -> bool {
        matches!(self.kind, ArgumentErrorKind::NotRegistered)
    }

    /// Check if a frame was rejected as not being a telegram
    pub fn is_bad_message(&self) -> bool {
        matches!(self.kind, ArgumentErrorKind::BadMessage)
    }
}

/// Resource error with optional backtrace
#[derive(Debug)]
pub struct ResourceError {
    kind: ResourceErrorKind,
    #[cfg(feature = "std")]
    backtrace: Backtrace,
}

impl ResourceError {
    pub(crate) fn new(kind: ResourceErrorKind) -> Self {
        Self {
            kind,
            #[cfg(feature = "std")]
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if the device is already bound to an interface
    pub fn is_already_bound(&self) -> bool {
        matches!(self.kind, ResourceErrorKind::AlreadyBound)
    }

    /// Check if the interface table is full
    pub fn is_no_free_slot(&self) -> bool {
        matches!(self.kind, ResourceErrorKind::NoFreeSlot)
    }

    /// Check if the scheduler had no task-control block left
    pub fn is_no_free_task(&self) -> bool {
        matches!(self.kind, ResourceErrorKind::NoFreeTask)
    }

    /// Check if the L2 source filter has no room left
    pub fn is_filter_full(&self) -> bool {
        matches!(self.kind, ResourceErrorKind::FilterFull)
    }
}

/// Device error with optional backtrace
#[derive(Debug)]
pub struct DeviceError {
    kind: DeviceErrorKind,
    #[cfg(feature = "std")]
    backtrace: Backtrace,
}

impl DeviceError {
    pub(crate) fn new(kind: DeviceErrorKind) -> Self {
        Self {
            kind,
            #[cfg(feature = "std")]
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if the transceiver did not answer in time
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, DeviceErrorKind::Timeout)
    }

    /// Check if the bus negatively acknowledged a telegram
    pub fn is_nack(&self) -> bool {
        matches!(self.kind, DeviceErrorKind::Nack)
    }
}

// =============================================================================
// Convenience Constructors for NetError
// =============================================================================

impl NetError {
    // Capability errors
    pub fn unsupported() -> Self {
        Self::Capability(CapabilityError::new(CapabilityErrorKind::Unsupported))
    }

    pub fn address_not_implemented() -> Self {
        Self::Capability(CapabilityError::new(CapabilityErrorKind::AddressNotImplemented))
    }

    // Argument errors
    pub fn buffer_too_small() -> Self {
        Self::Argument(ArgumentError::new(ArgumentErrorKind::BufferTooSmall))
    }

    pub fn invalid_length() -> Self {
        Self::Argument(ArgumentError::new(ArgumentErrorKind::InvalidLength))
    }

    pub fn invalid_value() -> Self {
        Self::Argument(ArgumentError::new(ArgumentErrorKind::InvalidValue))
    }

    pub fn bad_message() -> Self {
        Self::Argument(ArgumentError::new(ArgumentErrorKind::BadMessage))
    }

    pub(crate) fn invalid_stack_size() -> Self {
        Self::Argument(ArgumentError::new(ArgumentErrorKind::InvalidStackSize))
    }

    pub(crate) fn invalid_priority() -> Self {
        Self::Argument(ArgumentError::new(ArgumentErrorKind::InvalidPriority))
    }

    pub(crate) fn invalid_name() -> Self {
        Self::Argument(ArgumentError::new(ArgumentErrorKind::InvalidName))
    }

    pub(crate) fn not_registered() -> Self {
        Self::Argument(ArgumentError::new(ArgumentErrorKind::NotRegistered))
    }

    // Resource errors
    pub(crate) fn no_free_slot() -> Self {
        Self::Resource(ResourceError::new(ResourceErrorKind::NoFreeSlot))
    }

    pub(crate) fn no_free_task() -> Self {
        Self::Resource(ResourceError::new(ResourceErrorKind::NoFreeTask))
    }

    pub(crate) fn already_bound() -> Self {
        Self::Resource(ResourceError::new(ResourceErrorKind::AlreadyBound))
    }

    pub(crate) fn filter_full() -> Self {
        Self::Resource(ResourceError::new(ResourceErrorKind::FilterFull))
    }

    // Device errors
    pub fn io() -> Self {
        Self::Device(DeviceError::new(DeviceErrorKind::Io))
    }

    pub fn timeout() -> Self {
        Self::Device(DeviceError::new(DeviceErrorKind::Timeout))
    }

    pub fn nack() -> Self {
        Self::Device(DeviceError::new(DeviceErrorKind::Nack))
    }

    pub fn bad_response() -> Self {
        Self::Device(DeviceError::new(DeviceErrorKind::BadResponse))
    }

    /// Check if this is the uniform "option not supported" answer
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Capability(e) if e.is_unsupported())
    }

    /// Check if this is an argument error
    pub fn is_argument(&self) -> bool {
        matches!(self, Self::Argument(_))
    }

    /// Check if this is a resource error
    pub fn is_resource(&self) -> bool {
        matches!(self, Self::Resource(_))
    }

    /// Negative errno value for this error.
    ///
    /// Distinct failure causes map onto distinct codes, so a C-style
    /// caller can tell "already bound" from "no free slot" without
    /// access to the structured error.
    pub fn code(&self) -> i32 {
        let positive = match self {
            Self::Capability(e) => match e.kind {
                CapabilityErrorKind::Unsupported => errno::ENOTSUP,
                CapabilityErrorKind::AddressNotImplemented => errno::EADDRNOTAVAIL,
            },
            Self::Argument(e) => match e.kind {
                ArgumentErrorKind::BufferTooSmall => errno::ENOBUFS,
                ArgumentErrorKind::BadMessage => errno::EBADMSG,
                ArgumentErrorKind::NotRegistered => errno::ENODEV,
                ArgumentErrorKind::InvalidLength
                | ArgumentErrorKind::InvalidValue
                | ArgumentErrorKind::InvalidStackSize
                | ArgumentErrorKind::InvalidPriority
                | ArgumentErrorKind::InvalidName => errno::EINVAL,
            },
            Self::Resource(e) => match e.kind {
                ResourceErrorKind::NoFreeSlot | ResourceErrorKind::FilterFull => errno::ENOMEM,
                ResourceErrorKind::NoFreeTask => errno::EAGAIN,
                ResourceErrorKind::AlreadyBound => errno::EALREADY,
            },
            Self::Device(e) => match e.kind {
                DeviceErrorKind::Timeout => errno::ETIMEDOUT,
                DeviceErrorKind::Io | DeviceErrorKind::Nack | DeviceErrorKind::BadResponse => {
                    errno::EIO
                }
            },
        };
        -positive
    }

    fn category(&self) -> &'static str {
        match self {
            Self::Capability(_) => "Capability",
            Self::Argument(_) => "Argument",
            Self::Resource(_) => "Resource",
            Self::Device(_) => "Device",
        }
    }
}

/// Fold a result into the stack's return-code convention.
///
/// Zero or positive means success (bytes processed), negative is an errno.
pub fn to_return_code(result: Result<usize>) -> i32 {
    match result {
        Ok(n) => i32::try_from(n).unwrap_or(i32::MAX),
        Err(e) => e.code(),
    }
}

// =============================================================================
// Display Implementation
// =============================================================================

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let category = self.category();
        match self {
            NetError::Capability(e) => write!(f, "{category} error: {:?}", e.kind),
            NetError::Argument(e) => write!(f, "{category} error: {:?}", e.kind),
            NetError::Resource(e) => write!(f, "{category} error: {:?}", e.kind),
            NetError::Device(e) => write!(f, "{category} error: {:?}", e.kind),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for NetError {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(f, "{=str} error ({=i32})", self.category(), self.code());
    }
}

// Implement std::error::Error for std-based applications
#[cfg(feature = "std")]
impl std::error::Error for NetError {}
