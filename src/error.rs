//! Step status codes
//!
//! The four outcomes a single `step` can report, distinguishing what the
//! decoder saw from what a handler saw. All failures are non-fatal: the
//! caller may inspect, retry, or abort. Nothing here ever panics on a
//! well-formed `Machine`.

/// Outcome of a single decode+execute cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StepStatus {
    /// The instruction executed and architectural state was updated.
    #[error("success")]
    Success,
    /// Reserved catch-all for failures that don't fit the other variants.
    #[error("unknown error")]
    UnknownError,
    /// The opcode byte (or group sub-opcode) is not a valid 8086 encoding.
    #[error("undefined opcode")]
    UndefinedOpcode,
    /// A valid 8086 encoding that this core does not implement.
    #[error("unimplemented opcode")]
    UnimplementedOpcode,
    /// A handler received an encoding it refuses (e.g. MOV to CS).
    #[error("invalid operation")]
    InvalidOperation,
}

impl StepStatus {
    /// True if the step committed its side effects.
    pub fn is_success(self) -> bool {
        matches!(self, StepStatus::Success)
    }
}
