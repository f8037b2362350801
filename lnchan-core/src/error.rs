#[cfg(feature = "use_backtrace")]
use backtrace::Backtrace;
use log::{error, warn};

use ChannelErrorKind::*;

use crate::prelude::*;

/// Kind of channel error
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelErrorKind {
    /// No channel with the given identifier
    NotFound(String),
    /// A channel with the same identifier already exists
    DuplicateChannel(String),
    /// The operation is not legal from the current state
    InvalidTransition(String),
    /// The counterparty declined a negotiated close
    CounterpartyRejected(String),
    /// The chain layer rejected a transaction
    BroadcastFailed(String),
    /// Balance query on a channel with no meaningful spendable balance
    NotApplicable(String),
    /// A new HTLC would exceed what the offerer may spend
    InsufficientBalance(String),
    /// An internal accounting invariant was broken.  The operation was
    /// aborted and nothing was applied.
    InvariantViolation(String),
}

/// Channel error
#[derive(Clone)]
pub struct ChannelError {
    /// The kind of error
    pub kind: ChannelErrorKind,
    /// A non-resolved backtrace
    #[cfg(feature = "use_backtrace")]
    pub bt: Backtrace,
}

// Explicit PartialEq which ignores backtrace.
impl PartialEq for ChannelError {
    fn eq(&self, other: &ChannelError) -> bool {
        self.kind == other.kind
    }
}

impl ChannelError {
    fn new(kind: ChannelErrorKind) -> Self {
        ChannelError {
            kind,
            #[cfg(feature = "use_backtrace")]
            bt: Backtrace::new_unresolved(),
        }
    }

    /// Resolve the backtrace for display to the user
    #[cfg(feature = "use_backtrace")]
    pub fn resolved_backtrace(&self) -> Backtrace {
        let mut mce = self.clone();
        mce.bt.resolve();
        mce.bt
    }

    /// Return a new ChannelError with the message prepended
    pub fn prepend_msg(&self, premsg: String) -> ChannelError {
        let modkind = match &self.kind {
            NotFound(s0) => NotFound(premsg + s0),
            DuplicateChannel(s0) => DuplicateChannel(premsg + s0),
            InvalidTransition(s0) => InvalidTransition(premsg + s0),
            CounterpartyRejected(s0) => CounterpartyRejected(premsg + s0),
            BroadcastFailed(s0) => BroadcastFailed(premsg + s0),
            NotApplicable(s0) => NotApplicable(premsg + s0),
            InsufficientBalance(s0) => InsufficientBalance(premsg + s0),
            InvariantViolation(s0) => InvariantViolation(premsg + s0),
        };
        ChannelError {
            kind: modkind,
            #[cfg(feature = "use_backtrace")]
            bt: self.bt.clone(),
        }
    }

    /// The message without the kind prefix
    pub fn message(&self) -> &str {
        match &self.kind {
            NotFound(s)
            | DuplicateChannel(s)
            | InvalidTransition(s)
            | CounterpartyRejected(s)
            | BroadcastFailed(s)
            | NotApplicable(s)
            | InsufficientBalance(s)
            | InvariantViolation(s) => s,
        }
    }

    /// The kind, without the message
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NotFound(_) => "NotFound",
            DuplicateChannel(_) => "DuplicateChannel",
            InvalidTransition(_) => "InvalidTransition",
            CounterpartyRejected(_) => "CounterpartyRejected",
            BroadcastFailed(_) => "BroadcastFailed",
            NotApplicable(_) => "NotApplicable",
            InsufficientBalance(_) => "InsufficientBalance",
            InvariantViolation(_) => "InvariantViolation",
        }
    }

    /// Whether the caller may reasonably retry the same operation later
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, CounterpartyRejected(_) | BroadcastFailed(_))
    }

    /// Whether this indicates a programming error rather than a caller error
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, InvariantViolation(_))
    }
}

impl core::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{:?}", self.kind)
    }
}

impl core::fmt::Debug for ChannelError {
    #[cfg(not(feature = "use_backtrace"))]
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("ChannelError").field("kind", &self.kind).finish()
    }
    #[cfg(feature = "use_backtrace")]
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("ChannelError")
            .field("kind", &self.kind)
            .field("bt", &self.resolved_backtrace())
            .finish()
    }
}

impl std::error::Error for ChannelError {}

impl Into<String> for ChannelError {
    fn into(self) -> String {
        match self.kind {
            NotFound(s) => "not found: ".to_string() + &s,
            DuplicateChannel(s) => "duplicate channel: ".to_string() + &s,
            InvalidTransition(s) => "invalid transition: ".to_string() + &s,
            CounterpartyRejected(s) => "counterparty rejected: ".to_string() + &s,
            BroadcastFailed(s) => "broadcast failed: ".to_string() + &s,
            NotApplicable(s) => "not applicable: ".to_string() + &s,
            InsufficientBalance(s) => "insufficient balance: ".to_string() + &s,
            InvariantViolation(s) => "invariant violation: ".to_string() + &s,
        }
    }
}

/// An unknown channel id was referenced
pub fn not_found(msg: impl Into<String>) -> ChannelError {
    ChannelError::new(NotFound(msg.into()))
}

/// A channel id collided on insertion
pub fn duplicate_channel(msg: impl Into<String>) -> ChannelError {
    let s = msg.into();
    warn!("DUPLICATE CHANNEL: {}", &s);
    ChannelError::new(DuplicateChannel(s))
}

/// The operation is not legal from the current state
pub fn invalid_transition(msg: impl Into<String>) -> ChannelError {
    let s = msg.into();
    warn!("INVALID TRANSITION: {}", &s);
    ChannelError::new(InvalidTransition(s))
}

/// The counterparty declined a negotiated close
pub fn counterparty_rejected(msg: impl Into<String>) -> ChannelError {
    let s = msg.into();
    warn!("COUNTERPARTY REJECTED: {}", &s);
    ChannelError::new(CounterpartyRejected(s))
}

/// The chain layer rejected a transaction
pub fn broadcast_failed(msg: impl Into<String>) -> ChannelError {
    let s = msg.into();
    error!("BROADCAST FAILED: {}", &s);
    ChannelError::new(BroadcastFailed(s))
}

/// The channel has no meaningful balance in its current state
pub fn not_applicable(msg: impl Into<String>) -> ChannelError {
    ChannelError::new(NotApplicable(msg.into()))
}

/// The offerer cannot afford a new HTLC
pub fn insufficient_balance(msg: impl Into<String>) -> ChannelError {
    let s = msg.into();
    warn!("INSUFFICIENT BALANCE: {}", &s);
    ChannelError::new(InsufficientBalance(s))
}

/// An accounting invariant was broken
pub fn invariant_violation(msg: impl Into<String>) -> ChannelError {
    let s = msg.into();
    error!("INVARIANT VIOLATION: {}", &s);
    let err = ChannelError::new(InvariantViolation(s));
    #[cfg(feature = "use_backtrace")]
    error!("BACKTRACE:\n{:?}", &err.resolved_backtrace());
    err
}

/// Return an invalid transition error from the current function
#[doc(hidden)]
#[macro_export]
macro_rules! transition_err {
    ($($arg:tt)*) => (
        return Err($crate::error::invalid_transition(format!(
            "{}: {}",
            short_function!(),
            format!($($arg)*)
        )))
    )
}

/// Return an invariant violation error from the current function
#[doc(hidden)]
#[macro_export]
macro_rules! invariant_err {
    ($($arg:tt)*) => (
        return Err($crate::error::invariant_violation(format!(
            "{}: {}",
            short_function!(),
            format!($($arg)*)
        )))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_error_test() {
        assert_eq!(format!("{}", not_found("testing")), "NotFound(\"testing\")");
        assert_eq!(Into::<String>::into(not_found("testing")), "not found: testing");
        assert_eq!(
            format!("{}", invalid_transition("testing")),
            "InvalidTransition(\"testing\")"
        );
        assert_eq!(
            Into::<String>::into(invalid_transition("testing")),
            "invalid transition: testing"
        );
        assert_eq!(
            Into::<String>::into(broadcast_failed("testing")),
            "broadcast failed: testing"
        );
        assert_eq!(
            Into::<String>::into(invariant_violation("testing")),
            "invariant violation: testing"
        );
    }

    #[test]
    fn prepend_and_classify_test() {
        let err = counterparty_rejected("fee too low").prepend_msg("close: ".to_string());
        assert_eq!(err.kind, CounterpartyRejected("close: fee too low".to_string()));
        assert_eq!(err.message(), "close: fee too low");
        assert!(err.is_retryable());
        assert!(!err.is_fatal());
        assert!(invariant_violation("x").is_fatal());
        assert!(!not_applicable("x").is_retryable());
        assert_eq!(err.kind_name(), "CounterpartyRejected");
        assert_eq!(not_found("x").kind_name(), "NotFound");
    }

    #[test]
    fn equality_ignores_backtrace_test() {
        assert_eq!(not_found("a"), not_found("a"));
        assert_ne!(not_found("a"), not_found("b"));
    }

    fn fails() -> Result<(), ChannelError> {
        transition_err!("state is {}", "closed");
    }

    #[test]
    fn transition_err_macro_test() {
        let err = fails().unwrap_err();
        assert_eq!(err.kind, InvalidTransition("fails: state is closed".to_string()));
    }
}
