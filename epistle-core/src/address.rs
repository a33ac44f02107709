use std::{
    fmt::{Debug, Display},
    ops::Deref,
};

use mailparse::MailAddr;
use serde::{Deserialize, Serialize, de};

/// An envelope address as carried in session state.
///
/// Wraps the parsed [`MailAddr`] so protocol crates can share one
/// representation for reverse paths and forward paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Address(pub MailAddr);

impl Address {
    /// The bare `local@domain` form, without any display name.
    #[must_use]
    pub fn mailbox(&self) -> String {
        match &self.0 {
            MailAddr::Group(group) => group.group_name.clone(),
            MailAddr::Single(single) => single.addr.clone(),
        }
    }

    /// The domain part of the address, if there is one.
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        match &self.0 {
            MailAddr::Group(_) => None,
            MailAddr::Single(single) => single.addr.rsplit_once('@').map(|(_, domain)| domain),
        }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<MailAddr> for Address {
    fn from(value: MailAddr) -> Self {
        Self(value)
    }
}

impl Deref for Address {
    type Target = MailAddr;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let addr = match &self.0 {
            MailAddr::Group(group_info) => group_info.to_string(),
            MailAddr::Single(single_info) => single_info.to_string(),
        };
        serializer.serialize_str(addr.as_str())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Addr;

        impl de::Visitor<'_> for Addr {
            type Value = Address;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("an email address")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                mailparse::addrparse(v)
                    .map(|mut a| a.remove(0))
                    .map(Address)
                    .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(v), &Self))
            }
        }

        deserializer.deserialize_str(Addr)
    }
}
