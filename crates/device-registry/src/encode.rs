use crate::{DeviceDescriptor, Error, Result};

/// Field delimiter of the descriptor string. Never escaped.
pub const DELIMITER: char = ':';

/// Separator between the transport tag and the field list.
pub const SCHEME_SEPARATOR: &str = "://";

/// Encode a descriptor as `<tag>://user:password:name:host:port:psk`.
///
/// Fails with [`Error::InvalidField`] when any field contains the delimiter, since
/// the format has no escaping and the string could not be decoded back.
pub fn encode(desc: &DeviceDescriptor) -> Result<String> {
    validate_tag(&desc.type_tag)?;
    if desc.port == 0 {
        return Err(Error::InvalidField {
            field: "port",
            reason: "port must be in 1..=65535".into(),
        });
    }
    let psk = desc.psk.as_deref().unwrap_or("");
    let fields: [(&'static str, &str); 5] = [
        ("user", &desc.user),
        ("password", &desc.password),
        ("name", &desc.name),
        ("host", &desc.host),
        ("psk", psk),
    ];
    for (field, value) in fields {
        check_field(field, value)?;
    }
    check_host(&desc.host)?;
    Ok(format!(
        "{tag}{SCHEME_SEPARATOR}{user}{d}{password}{d}{name}{d}{host}{d}{port}{d}{psk}",
        tag = desc.type_tag,
        user = desc.user,
        password = desc.password,
        name = desc.name,
        host = desc.host,
        port = desc.port,
        d = DELIMITER,
    ))
}

fn check_field(field: &'static str, value: &str) -> Result<()> {
    if value.contains(DELIMITER) {
        return Err(Error::InvalidField {
            field,
            reason: format!("contains the delimiter '{DELIMITER}'"),
        });
    }
    if value.contains(['\n', '\r']) {
        return Err(Error::InvalidField {
            field,
            reason: "contains a line break".into(),
        });
    }
    Ok(())
}

/// Decoding trims the host and maps an empty one to `localhost`; refuse hosts
/// that would not come back unchanged.
fn check_host(host: &str) -> Result<()> {
    let reason = if host.trim().is_empty() {
        "host must not be empty"
    } else if host.trim() != host {
        "host has surrounding whitespace"
    } else {
        return Ok(());
    };
    Err(Error::InvalidField {
        field: "host",
        reason: reason.into(),
    })
}

pub(crate) fn validate_tag(tag: &str) -> Result<()> {
    if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::InvalidField {
            field: "type_tag",
            reason: format!("transport tag must be non-empty ASCII alphanumeric, got {tag:?}"),
        });
    }
    Ok(())
}
