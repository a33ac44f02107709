//! Hook results and their chain semantics.
//!
//! Hooks are typed extension points consulted by a
//! [`crate::hookable::HookableCommand`]. Each hook returns a [`HookResult`]
//! whose code dictates whether the chain continues and what reply is
//! synthesized.

use std::borrow::Cow;

use crate::response::Dsn;

/// The verdict of a single hook.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum HookCode {
    /// Accept the command; the chain keeps running but the result is
    /// recorded and overrides later `Declined` outcomes.
    Ok,
    /// No opinion; the chain keeps running.
    #[default]
    Declined,
    /// Reject permanently; the chain stops.
    Deny,
    /// Reject temporarily; the chain stops.
    DenySoft,
    /// Reject and drop the connection; the chain stops.
    Disconnect,
}

impl HookCode {
    /// Whether this code terminates the hook chain.
    #[must_use]
    pub const fn terminates(self) -> bool {
        matches!(self, Self::Deny | Self::DenySoft | Self::Disconnect)
    }
}

/// The outcome of one hook invocation.
///
/// Carries an optional protocol return code, enhanced status, and message
/// so a hook can shape the synthesized reply; absent fields fall back to
/// protocol defaults.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct HookResult {
    code: HookCode,
    status: Option<u16>,
    dsn: Option<Dsn>,
    message: Option<Cow<'static, str>>,
}

impl HookResult {
    #[must_use]
    pub fn declined() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn ok() -> Self {
        Self {
            code: HookCode::Ok,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn deny() -> Self {
        Self {
            code: HookCode::Deny,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn deny_soft() -> Self {
        Self {
            code: HookCode::DenySoft,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn disconnect() -> Self {
        Self {
            code: HookCode::Disconnect,
            ..Self::default()
        }
    }

    /// Override the protocol return code of the synthesized reply.
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach an enhanced status code to the synthesized reply.
    #[must_use]
    pub const fn with_dsn(mut self, dsn: Dsn) -> Self {
        self.dsn = Some(dsn);
        self
    }

    /// Attach a message to the synthesized reply.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<Cow<'static, str>>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> HookCode {
        self.code
    }

    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    #[must_use]
    pub const fn dsn(&self) -> Option<Dsn> {
        self.dsn
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}
