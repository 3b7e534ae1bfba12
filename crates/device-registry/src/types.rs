use serde::{Deserialize, Serialize};

/// Transport kind of the TCP/IP device variant; also its descriptor scheme.
pub const TCPIP_TAG: &str = "tcpip";

/// Persisted and transmitted form of one device.
///
/// Immutable by convention: edits build a new descriptor (see the `with_*` helpers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Transport variant, e.g. `tcpip`. Encoded as the `<tag>://` prefix.
    pub type_tag: String,
    pub name: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub host: String,
    pub port: u16,
    /// `None` means no key configured. An empty key is never stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psk: Option<String>,
}

impl DeviceDescriptor {
    pub fn tcpip(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            type_tag: TCPIP_TAG.to_string(),
            name: name.into(),
            user: String::new(),
            password: String::new(),
            host: host.into(),
            port,
            psk: None,
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    pub fn with_psk(mut self, psk: impl Into<String>) -> Self {
        let psk = psk.into();
        self.psk = if psk.is_empty() { None } else { Some(psk) };
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// True iff a non-empty pre-shared key is configured.
    pub fn has_psk(&self) -> bool {
        self.psk.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// One persisted registry record: implementation identifier plus encoded descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub type_name: String,
    pub payload: String,
}

impl RegistryEntry {
    pub fn new(type_name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            payload: payload.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_psk_normalizes_to_none() {
        let d = DeviceDescriptor::tcpip("lab", "10.0.0.2", 13110).with_psk("");
        assert_eq!(d.psk, None);
        assert!(!d.has_psk());
        let d = d.with_psk("s3cret");
        assert!(d.has_psk());
    }
}
