//! Typed session state.
//!
//! Session state is a map from [`StateKey`] to [`StateValue`]: a tagged
//! variant with one arm per canonical key and extension arms for
//! third-party handlers. Typed accessors return `None` both for absent
//! keys and for arm mismatches, so readers never see a value of the wrong
//! shape. Note the distinction between an absent sender (no MAIL yet) and
//! a present null sender (`MAIL FROM:<>`).

use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use ahash::AHashMap;

use crate::address::Address;

/// How the client introduced itself.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HeloMode {
    Helo,
    Ehlo,
    Lhlo,
}

impl Display for HeloMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Helo => "HELO",
            Self::Ehlo => "EHLO",
            Self::Lhlo => "LHLO",
        })
    }
}

/// The recorded HELO/EHLO/LHLO greeting: mode plus the client's name.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Hello {
    pub mode: HeloMode,
    pub name: String,
}

/// Keys into a session state tier.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum StateKey {
    /// The current HELO mode; SMTP's carry-over key across resets.
    Hello,
    /// The envelope sender of the current transaction.
    Sender,
    /// The recipient list of the current transaction.
    Recipients,
    /// The size declared by the client, e.g. via the SIZE parameter.
    SizeHint,
    /// The authenticated identity.
    Identity,
    /// Whether STARTTLS/STLS has completed on this connection.
    TlsStarted,
    /// Extension arm for third-party handlers.
    Custom(Cow<'static, str>),
}

impl StateKey {
    #[must_use]
    pub const fn custom(name: &'static str) -> Self {
        Self::Custom(Cow::Borrowed(name))
    }
}

/// Values stored in a session state tier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateValue {
    Hello(Hello),
    /// `None` is the null reverse-path (`MAIL FROM:<>`).
    Sender(Option<Address>),
    Recipients(Vec<Address>),
    Size(usize),
    Identity(String),
    Flag(bool),
    Text(String),
    Bytes(Arc<[u8]>),
}

/// One tier of session state.
#[derive(Default, Debug, Clone)]
pub struct StateMap {
    entries: AHashMap<StateKey, StateValue>,
}

impl StateMap {
    #[must_use]
    pub fn get(&self, key: &StateKey) -> Option<&StateValue> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: StateKey, value: StateValue) -> Option<StateValue> {
        self.entries.insert(key, value)
    }

    pub fn remove(&mut self, key: &StateKey) -> Option<StateValue> {
        self.entries.remove(key)
    }

    #[must_use]
    pub fn contains(&self, key: &StateKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn hello(&self) -> Option<&Hello> {
        match self.entries.get(&StateKey::Hello) {
            Some(StateValue::Hello(hello)) => Some(hello),
            _ => None,
        }
    }

    pub fn set_hello(&mut self, hello: Hello) {
        self.entries.insert(StateKey::Hello, StateValue::Hello(hello));
    }

    /// `None` means no sender has been stored; `Some(None)` is the null
    /// reverse-path.
    #[must_use]
    pub fn sender(&self) -> Option<Option<&Address>> {
        match self.entries.get(&StateKey::Sender) {
            Some(StateValue::Sender(sender)) => Some(sender.as_ref()),
            _ => None,
        }
    }

    pub fn set_sender(&mut self, sender: Option<Address>) {
        self.entries.insert(StateKey::Sender, StateValue::Sender(sender));
    }

    #[must_use]
    pub fn recipients(&self) -> Option<&[Address]> {
        match self.entries.get(&StateKey::Recipients) {
            Some(StateValue::Recipients(recipients)) => Some(recipients),
            _ => None,
        }
    }

    pub fn push_recipient(&mut self, recipient: Address) {
        match self.entries.get_mut(&StateKey::Recipients) {
            Some(StateValue::Recipients(recipients)) => recipients.push(recipient),
            _ => {
                self.entries
                    .insert(StateKey::Recipients, StateValue::Recipients(vec![recipient]));
            }
        }
    }

    /// Cardinality of the recipient list, or 0 when absent.
    #[must_use]
    pub fn rcpt_count(&self) -> usize {
        self.recipients().map_or(0, <[Address]>::len)
    }

    #[must_use]
    pub fn size_hint(&self) -> Option<usize> {
        match self.entries.get(&StateKey::SizeHint) {
            Some(StateValue::Size(size)) => Some(*size),
            _ => None,
        }
    }

    pub fn set_size_hint(&mut self, size: usize) {
        self.entries.insert(StateKey::SizeHint, StateValue::Size(size));
    }

    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        match self.entries.get(&StateKey::Identity) {
            Some(StateValue::Identity(identity)) => Some(identity),
            _ => None,
        }
    }

    pub fn set_identity(&mut self, identity: String) {
        self.entries
            .insert(StateKey::Identity, StateValue::Identity(identity));
    }

    #[must_use]
    pub fn flag(&self, key: &StateKey) -> bool {
        matches!(self.entries.get(key), Some(StateValue::Flag(true)))
    }

    pub fn set_flag(&mut self, key: StateKey, value: bool) {
        self.entries.insert(key, StateValue::Flag(value));
    }

    #[must_use]
    pub fn text(&self, key: &StateKey) -> Option<&str> {
        match self.entries.get(key) {
            Some(StateValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn set_text(&mut self, key: StateKey, text: String) {
        self.entries.insert(key, StateValue::Text(text));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{HeloMode, Hello, StateKey, StateMap, StateValue};
    use crate::address::Address;

    fn address(addr: &str) -> Address {
        Address(mailparse::addrparse(addr).unwrap().remove(0))
    }

    #[test]
    fn absent_reads_return_none() {
        let state = StateMap::default();
        assert!(state.hello().is_none());
        assert!(state.sender().is_none());
        assert!(state.recipients().is_none());
        assert_eq!(state.rcpt_count(), 0);
    }

    #[test]
    fn null_sender_is_distinct_from_absent() {
        let mut state = StateMap::default();
        assert_eq!(state.sender(), None);

        state.set_sender(None);
        assert_eq!(state.sender(), Some(None));
    }

    #[test]
    fn recipients_accumulate_in_order() {
        let mut state = StateMap::default();
        state.push_recipient(address("a@example.com"));
        state.push_recipient(address("b@example.com"));

        assert_eq!(state.rcpt_count(), 2);
        let recipients = state.recipients().unwrap();
        assert_eq!(recipients[0].mailbox(), "a@example.com");
        assert_eq!(recipients[1].mailbox(), "b@example.com");
    }

    #[test]
    fn arm_mismatch_reads_as_absent() {
        let mut state = StateMap::default();
        state.insert(StateKey::Hello, StateValue::Flag(true));
        assert!(state.hello().is_none());
    }

    #[test]
    fn custom_keys_are_isolated() {
        let mut state = StateMap::default();
        state.set_text(StateKey::custom("pop3.user"), "alice".to_string());
        state.set_hello(Hello {
            mode: HeloMode::Ehlo,
            name: "client.example".to_string(),
        });

        assert_eq!(state.text(&StateKey::custom("pop3.user")), Some("alice"));
        assert!(state.text(&StateKey::custom("pop3.pass")).is_none());
        assert_eq!(state.hello().unwrap().mode, HeloMode::Ehlo);
    }
}
