//! # Error Taxonomy
//!
//! Each module carries its own `Error` enum. This module names the protocol
//! level category each of those errors belongs to, so callers can branch on
//! the category without matching every variant.

/// Protocol-level category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An inbound reference id is not present in the host's registry.
    UnknownReference,
    /// Neither a registered handler nor an operation of the target matches the name.
    MethodNotFound,
    /// The invoked operation itself failed.
    DispatchFailure,
    /// A response arrived for an id with no pending request.
    UnmatchedResponse,
    /// An endpoint or method name is already claimed.
    RegistrationConflict,
    /// The channel failed or closed.
    TransportFailure,
    /// The remote host answered with an `error` response.
    Remote,
    /// A frame or message broke the protocol.
    Protocol,
    /// The configured request timeout elapsed.
    Timeout,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::UnknownReference => "unknown reference",
            Self::MethodNotFound => "method not found",
            Self::DispatchFailure => "dispatch failure",
            Self::UnmatchedResponse => "unmatched response",
            Self::RegistrationConflict => "registration conflict",
            Self::TransportFailure => "transport failure",
            Self::Remote => "remote error",
            Self::Protocol => "protocol violation",
            Self::Timeout => "timeout",
        };
        f.write_str(name)
    }
}
