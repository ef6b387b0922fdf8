use thiserror::Error;

/// Malformed application frame. Always recovered locally by dropping the frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Fewer bytes than one full frame.
    #[error("short buffer: need {needed} bytes, have {available}")]
    ShortBuffer { needed: usize, available: usize },

    /// The length byte does not match the fixed payload size.
    #[error("length mismatch: expected {expected}, found {found}")]
    LengthMismatch { expected: u8, found: u8 },

    /// Opcode other than the single supported one.
    #[error("unsupported opcode 0x{0:04x}")]
    UnsupportedOpcode(u16),
}

/// Errors surfaced by the coalescer's local write path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoalescerError {
    #[error("unknown channel index {0}")]
    UnknownChannel(usize),
}

/// Errors returned by [`crate::runtime::RuntimeHandle`] calls.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The event loop has shut down and no longer accepts commands.
    #[error("event loop is not running")]
    Closed,

    /// The targeted device is not in the registry.
    #[error("unknown device {0}")]
    UnknownDevice(crate::registry::DeviceId),

    /// The targeted device has no channel driver (not a connected Amber device).
    #[error("device {0} has no channel driver")]
    NoDriver(crate::registry::DeviceId),

    #[error(transparent)]
    Coalescer(#[from] CoalescerError),

    /// The name store could not persist a rename.
    #[error(transparent)]
    NameStore(#[from] anyhow::Error),
}
