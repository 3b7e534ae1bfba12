use crate::encode::{validate_tag, DELIMITER, SCHEME_SEPARATOR};
use crate::{DeviceDescriptor, Error, Result};

const FIELD_COUNT: usize = 6;
const DEFAULT_HOST: &str = "localhost";

/// Decode a descriptor string of any transport kind.
pub fn decode(s: &str) -> Result<DeviceDescriptor> {
    let (tag, rest) = s
        .split_once(SCHEME_SEPARATOR)
        .ok_or_else(|| Error::Format(format!("missing '<tag>{SCHEME_SEPARATOR}' prefix")))?;
    validate_tag(tag).map_err(|e| Error::Format(e.to_string()))?;

    let fields: Vec<&str> = rest.split(DELIMITER).collect();
    if fields.len() != FIELD_COUNT {
        return Err(Error::Format(format!(
            "expected {FIELD_COUNT} fields, found {}",
            fields.len()
        )));
    }
    let port = parse_port(fields[4])?;
    let host = match fields[3].trim() {
        "" => DEFAULT_HOST.to_string(),
        h => h.to_string(),
    };
    let psk = match fields[5] {
        "" => None,
        k => Some(k.to_string()),
    };
    Ok(DeviceDescriptor {
        type_tag: tag.to_string(),
        user: fields[0].to_string(),
        password: fields[1].to_string(),
        name: fields[2].to_string(),
        host,
        port,
        psk,
    })
}

/// Decode a descriptor string, requiring a specific transport tag.
pub fn decode_as(tag: &str, s: &str) -> Result<DeviceDescriptor> {
    let desc = decode(s)?;
    if desc.type_tag != tag {
        return Err(Error::Format(format!(
            "expected '{tag}{SCHEME_SEPARATOR}' descriptor, found '{}{SCHEME_SEPARATOR}'",
            desc.type_tag
        )));
    }
    Ok(desc)
}

fn parse_port(raw: &str) -> Result<u16> {
    // Plain ASCII digits only; no sign, no grouping, no locale
    let t = raw.trim();
    if t.is_empty() || !t.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::Format(format!("port is not a number: {raw:?}")));
    }
    match t.parse::<u32>() {
        Ok(p @ 1..=65535) => Ok(p as u16),
        _ => Err(Error::Format(format!("port out of range 1..=65535: {raw:?}"))),
    }
}
