use core::fmt::{self, Display, Formatter};

use epistle_core::response::Response;

/// SMTP reply codes used by the built-in handlers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Debug)]
pub enum Status {
    HelpMessage = 214,
    ServiceReady = 220,
    GoodBye = 221,
    AuthSucceeded = 235,
    Ok = 250,
    CannotVerify = 252,
    AuthContinue = 334,
    StartMailInput = 354,
    Unavailable = 421,
    ActionAborted = 451,
    AuthTemporaryFailure = 454,
    UnknownCommand = 500,
    SyntaxError = 501,
    NotImplemented = 502,
    InvalidCommandSequence = 503,
    AuthMechanismUnsupported = 504,
    AuthRequired = 530,
    AuthInvalid = 535,
    Rejected = 550,
    ExceededStorage = 552,
}

impl Status {
    /// Checks if the status is a permanent rejection
    #[must_use]
    pub fn is_permanent(self) -> bool {
        u16::from(self) >= 500
    }

    /// Checks if the status is a temporary rejection
    #[must_use]
    pub fn is_temporary(self) -> bool {
        (400..500).contains(&u16::from(self))
    }
}

impl From<Status> for u16 {
    fn from(value: Status) -> Self {
        value as Self
    }
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(fmt, "{}", u16::from(*self))
    }
}

/// Shorthand for an SMTP reply with one of the named codes.
#[must_use]
pub fn reply(status: Status, text: impl Into<std::borrow::Cow<'static, str>>) -> Response {
    Response::smtp(status.into(), text)
}

#[cfg(test)]
mod test {
    use super::Status;

    #[test]
    fn status() {
        assert!(Status::Rejected.is_permanent());
        assert!(!Status::Rejected.is_temporary());

        assert!(Status::Unavailable.is_temporary());
        assert!(!Status::Unavailable.is_permanent());

        assert_eq!(u16::from(Status::Rejected), 550);
        assert_eq!(Status::Ok.to_string(), "250");
    }
}
