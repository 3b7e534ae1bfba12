use crate::metrics::DeviceMetrics;
use crate::{Device, Error, RegistryEntry, Result, TypeRegistry};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// Storage backend for registry entries.
pub trait RegistryStore {
    /// Stored entries, or `None` if nothing has been stored yet.
    fn read(&self) -> Result<Option<Vec<RegistryEntry>>>;

    fn write(&self, entries: &[RegistryEntry]) -> Result<()>;
}

/// Registry persisted as a YAML list of `{ type_name, payload }` records.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RegistryStore for FileStore {
    fn read(&self) -> Result<Option<Vec<RegistryEntry>>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Corrupt(format!(
                    "reading {}: {e}",
                    self.path.display()
                )))
            }
        };
        if raw.trim().is_empty() {
            return Ok(Some(Vec::new()));
        }
        let entries: Vec<RegistryEntry> = serde_yaml::from_str(&raw)
            .map_err(|e| Error::Corrupt(format!("parsing {}: {e}", self.path.display())))?;
        Ok(Some(entries))
    }

    fn write(&self, entries: &[RegistryEntry]) -> Result<()> {
        let yaml = serde_yaml::to_string(entries)
            .map_err(|e| Error::Persistence(format!("encoding registry: {e}")))?;
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)
            .map_err(|e| Error::Persistence(format!("creating {}: {e}", parent.display())))?;
        // Readers never see a partial file; the temp file is removed if persisting fails
        let mut tmp = NamedTempFile::new_in(parent)
            .map_err(|e| Error::Persistence(format!("temp file in {}: {e}", parent.display())))?;
        tmp.write_all(yaml.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| Error::Persistence(format!("writing {}: {e}", tmp.path().display())))?;
        tmp.persist(&self.path).map_err(|e| {
            Error::Persistence(format!("replacing {}: {}", self.path.display(), e.error))
        })?;
        Ok(())
    }
}

/// In-memory store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Option<Vec<RegistryEntry>>>,
}

impl MemoryStore {
    pub fn with_entries(entries: Vec<RegistryEntry>) -> Self {
        Self {
            entries: Mutex::new(Some(entries)),
        }
    }

    pub fn snapshot(&self) -> Option<Vec<RegistryEntry>> {
        self.entries.lock().ok().and_then(|e| e.clone())
    }
}

impl RegistryStore for MemoryStore {
    fn read(&self) -> Result<Option<Vec<RegistryEntry>>> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .map_err(|_| Error::Corrupt("memory store lock poisoned".into()))
    }

    fn write(&self, entries: &[RegistryEntry]) -> Result<()> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| Error::Persistence("memory store lock poisoned".into()))?;
        *guard = Some(entries.to_vec());
        Ok(())
    }
}

/// Ordered list of persisted devices.
#[derive(Default, Clone)]
pub struct DeviceRegistry {
    entries: Vec<RegistryEntry>,
    metrics: Option<DeviceMetrics>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<RegistryEntry>) -> Self {
        Self {
            entries,
            metrics: None,
        }
    }

    /// Load from `store`. Never fails: a missing source gives an empty registry,
    /// and so does a corrupt one (after logging the problem).
    pub fn load(store: &dyn RegistryStore) -> Self {
        match store.read() {
            Ok(Some(entries)) => {
                tracing::info!(n = entries.len(), "loaded device registry");
                Self::from_entries(entries)
            }
            Ok(None) => {
                tracing::debug!("no stored device registry; starting empty");
                Self::new()
            }
            Err(e) => {
                tracing::error!(error = %e, "device registry unreadable; starting empty");
                Self::new()
            }
        }
    }

    /// Load from `store` for a read-modify-write cycle. Unlike [`DeviceRegistry::load`]
    /// this surfaces `Corrupt`, so an unreadable registry is never overwritten.
    pub fn try_load(store: &dyn RegistryStore) -> Result<Self> {
        Ok(store
            .read()?
            .map(Self::from_entries)
            .unwrap_or_default())
    }

    pub fn with_metrics(mut self, metrics: DeviceMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn save(&self, store: &dyn RegistryStore) -> Result<()> {
        store.write(&self.entries).map_err(|e| match e {
            Error::Persistence(_) => e,
            other => Error::Persistence(other.to_string()),
        })?;
        tracing::debug!(n = self.entries.len(), "saved device registry");
        Ok(())
    }

    /// Append an entry for `device`, using its type name and encoded descriptor.
    pub fn add_device(&mut self, device: &dyn Device) -> Result<()> {
        let payload = device.serialize()?;
        self.entries
            .push(RegistryEntry::new(device.type_name(), payload));
        Ok(())
    }

    pub fn insert(&mut self, entry: RegistryEntry) {
        self.entries.push(entry);
    }

    pub fn remove(&mut self, index: usize) -> Option<RegistryEntry> {
        if index < self.entries.len() {
            Some(self.entries.remove(index))
        } else {
            None
        }
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn reconstruct_all(&self, types: &TypeRegistry) -> Vec<Box<dyn Device>> {
        let devices = reconstruct_all(&self.entries, types);
        if let Some(m) = &self.metrics {
            m.devices_loaded.set(devices.len() as i64);
            m.entries_skipped
                .inc_by((self.entries.len() - devices.len()) as u64);
        }
        devices
    }
}

/// Build live devices in stored order, skipping (and logging) every entry that
/// cannot be reconstructed.
pub fn reconstruct_all(entries: &[RegistryEntry], types: &TypeRegistry) -> Vec<Box<dyn Device>> {
    let mut out = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        match types.construct(entry) {
            Ok(dev) => out.push(dev),
            Err(e) => {
                tracing::warn!(index, type_name = %entry.type_name, error = %e, "skipping registry entry");
            }
        }
    }
    out
}
