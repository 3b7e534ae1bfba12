use crate::{UnitCache, UnitFormat};
use anyhow::Context;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Parse unit definitions from YAML (`name: "key=value;..."` per line) into `cache`.
///
/// All definitions are parsed before anything is cached, so a file with one bad
/// unit leaves the cache untouched.
pub fn load_unit_definitions(yaml: &str, cache: &UnitCache) -> anyhow::Result<Vec<Arc<UnitFormat>>> {
    let doc: Value = serde_yaml::from_str(yaml).context("parsing unit definitions")?;
    let map = match doc {
        Value::Null => Mapping::new(),
        Value::Mapping(map) => map,
        other => anyhow::bail!("unit definitions must be a mapping, found {}", kind(&other)),
    };
    let mut parsed = Vec::with_capacity(map.len());
    for (key, value) in map {
        let name = key
            .as_str()
            .with_context(|| format!("unit name must be a string, found {}", kind(&key)))?
            .to_string();
        let config = match &value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => anyhow::bail!(
                "unit `{name}`: config must be a string, found {}",
                kind(other)
            ),
        };
        parsed.push(UnitFormat::parse(&name, &config)?);
    }
    let units: Vec<Arc<UnitFormat>> = parsed.into_iter().map(|u| cache.insert_parsed(u)).collect();
    tracing::info!(n = units.len(), "loaded unit definitions");
    Ok(units)
}

pub fn load_unit_file(path: impl AsRef<Path>, cache: &UnitCache) -> anyhow::Result<Vec<Arc<UnitFormat>>> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading unit definitions: {}", path.display()))?;
    load_unit_definitions(&raw, cache)
        .with_context(|| format!("loading unit definitions: {}", path.display()))
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Activity, ConfigError, ConversionKind};

    const UNITS: &str = r#"
temperature: "label=Temperature;formatString=%.1f °C;numerator=1;denominator=10"
lastSeen: "label=Last seen;conversion=unixSecondsUTC;formatString=[year]-[month]-[day]"
count:
"#;

    #[test]
    fn loads_in_file_order() {
        let cache = UnitCache::new();
        let units = load_unit_definitions(UNITS, &cache).unwrap();
        let names: Vec<&str> = units.iter().map(|u| u.name()).collect();
        assert_eq!(names, vec!["temperature", "lastSeen", "count"]);
        assert_eq!(cache.len(), 3);

        let t = cache.get("temperature").unwrap();
        assert_eq!(t.format(215), "21.5 °C");
        let seen = cache.get("lastSeen").unwrap();
        assert_eq!(seen.conversion(), ConversionKind::UnixSecondsUtc);
        assert_eq!(seen.format(1_000_000_000), "2001-09-09");
        assert_eq!(seen.activity_hint(1), Activity::Inactive);
        assert_eq!(cache.get("count").unwrap().format(3), "3");
    }

    #[test]
    fn bad_unit_is_named_and_nothing_is_cached() {
        let cache = UnitCache::new();
        let yaml = "ok: \"label=fine\"\nbroken: \"denominator=0\"\n";
        let err = load_unit_definitions(yaml, &cache).unwrap_err();
        let config = err.downcast_ref::<ConfigError>().unwrap();
        assert_eq!(config.unit, "broken");
        assert_eq!(config.field, "denominator");
        assert!(cache.is_empty());
    }

    #[test]
    fn rejects_non_mapping_documents_and_values() {
        let cache = UnitCache::new();
        assert!(load_unit_definitions("- a\n- b\n", &cache).is_err());
        assert!(load_unit_definitions("a: [1, 2]\n", &cache).is_err());
        assert!(load_unit_definitions("", &cache).unwrap().is_empty());
    }

    #[test]
    fn loads_from_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("units.yaml");
        fs::write(&path, UNITS)?;
        let cache = UnitCache::new();
        assert_eq!(load_unit_file(&path, &cache)?.len(), 3);
        assert!(load_unit_file(dir.path().join("missing.yaml"), &cache).is_err());
        Ok(())
    }
}
