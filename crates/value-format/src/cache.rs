use crate::{ConfigError, UnitFormat};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

static GLOBAL: OnceLock<UnitCache> = OnceLock::new();

/// Append-only cache of parsed units, keyed by name.
///
/// The first successfully parsed value for a name is kept for the lifetime of
/// the cache; later inserts for the same name return the stored value.
#[derive(Debug, Default)]
pub struct UnitCache {
    units: RwLock<HashMap<String, Arc<UnitFormat>>>,
}

impl UnitCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide cache, created on first use and never torn down.
    pub fn global() -> &'static UnitCache {
        GLOBAL.get_or_init(UnitCache::new)
    }

    pub fn get(&self, name: &str) -> Option<Arc<UnitFormat>> {
        let units = self.units.read().unwrap_or_else(|p| p.into_inner());
        units.get(name).cloned()
    }

    /// Cached unit for `name`, parsing `config` on first use.
    pub fn get_or_parse(&self, name: &str, config: &str) -> Result<Arc<UnitFormat>, ConfigError> {
        if let Some(unit) = self.get(name) {
            return Ok(unit);
        }
        let parsed = UnitFormat::parse(name, config)?;
        Ok(self.insert_parsed(parsed))
    }

    /// Insert a parsed unit unless its name is already cached; returns the cached value.
    pub fn insert_parsed(&self, unit: UnitFormat) -> Arc<UnitFormat> {
        let mut units = self.units.write().unwrap_or_else(|p| p.into_inner());
        Arc::clone(
            units
                .entry(unit.name().to_string())
                .or_insert_with(|| Arc::new(unit)),
        )
    }

    pub fn names(&self) -> Vec<String> {
        let units = self.units.read().unwrap_or_else(|p| p.into_inner());
        let mut names: Vec<String> = units.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.units.read().map(|u| u.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_parse_wins() {
        let cache = UnitCache::new();
        let a = cache.get_or_parse("speed", "label=km/h").unwrap();
        let b = cache.get_or_parse("speed", "label=mph").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.label(), "km/h");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_parse_is_not_cached() {
        let cache = UnitCache::new();
        assert!(cache.get_or_parse("bad", "numerator=0").is_err());
        assert!(cache.get("bad").is_none());
        assert!(cache.is_empty());
        assert!(cache.get_or_parse("bad", "numerator=2").is_ok());
    }

    #[test]
    fn concurrent_first_parses_agree() {
        let cache = Arc::new(UnitCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get_or_parse("level", "denominator=4").unwrap())
            })
            .collect();
        let units: Vec<Arc<UnitFormat>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for u in &units {
            assert!(Arc::ptr_eq(u, &units[0]));
        }
        assert_eq!(cache.names(), vec!["level".to_string()]);
    }

    #[test]
    fn global_is_shared() {
        let unit = UnitCache::global()
            .get_or_parse("cache-test-global", "label=shared")
            .unwrap();
        let again = UnitCache::global().get("cache-test-global").unwrap();
        assert!(Arc::ptr_eq(&unit, &again));
    }
}
