use crate::lifecycle::{ConnectionState, InputStream, OutputStream};
use crate::{encode, DeviceDescriptor, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Temporary per-process device identifier, assigned in creation order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next() -> Self {
        Self(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev-{}", self.0)
    }
}

/// Extended-protocol metadata reported by a device. Empty until negotiated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub encoding: String,
    #[serde(default)]
    pub supported_protocols: Vec<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl DeviceInfo {
    pub fn is_empty(&self) -> bool {
        *self == DeviceInfo::default()
    }
}

/// Receiver of connection status changes. All callbacks default to no-ops.
pub trait StatusListener: Send + Sync {
    fn connection_opened(&self, _device: &str) {}
    fn connection_failed(&self, _device: &str, _message: &str) {}
    fn connection_closed(&self, _device: &str) {}
}

/// Non-owning slot holding at most one listener.
///
/// The slot never keeps a listener alive; a released listener is simply no longer
/// returned by [`ListenerSlot::get`].
#[derive(Default)]
pub struct ListenerSlot {
    inner: RwLock<Option<Weak<dyn StatusListener>>>,
}

impl ListenerSlot {
    pub fn set(&self, listener: Weak<dyn StatusListener>) {
        if let Ok(mut slot) = self.inner.write() {
            *slot = Some(listener);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.inner.write() {
            *slot = None;
        }
    }

    pub fn get(&self) -> Option<Arc<dyn StatusListener>> {
        self.inner.read().ok()?.as_ref()?.upgrade()
    }
}

/// Atomically replaced snapshot cell; readers never observe a partial update.
pub(crate) struct Snapshot<T>(RwLock<Arc<T>>);

impl<T: Default> Default for Snapshot<T> {
    fn default() -> Self {
        Self(RwLock::new(Arc::new(T::default())))
    }
}

impl<T> Snapshot<T> {
    pub(crate) fn load(&self) -> Arc<T> {
        match self.0.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub(crate) fn store(&self, value: T) {
        let value = Arc::new(value);
        match self.0.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }
}

/// A live, reconnectable device.
pub trait Device: Send + Sync {
    /// Session identifier, unique within this process.
    fn id(&self) -> SessionId;

    /// Implementation identifier under which the device is registered.
    fn type_name(&self) -> &str;

    fn descriptor(&self) -> &DeviceDescriptor;

    /// Encoded descriptor, as persisted in the registry.
    fn serialize(&self) -> Result<String> {
        encode(self.descriptor())
    }

    fn label(&self) -> String {
        let name = &self.descriptor().name;
        if name.is_empty() {
            self.display_address()
        } else {
            name.clone()
        }
    }

    fn display_address(&self) -> String;

    /// Confirmation prompt shown before connecting, or `None` if none is required.
    fn connection_message(&self, skip_confirmation: bool) -> Option<String> {
        if skip_confirmation {
            return None;
        }
        Some(format!(
            "Connect to {} at {}?",
            self.label(),
            self.display_address()
        ))
    }

    fn state(&self) -> ConnectionState;

    fn prepare(&self) -> bool;

    fn connect(&self) -> Result<()>;

    fn input_stream(&self) -> Result<InputStream>;

    fn output_stream(&self) -> Result<OutputStream>;

    fn close(&self);

    fn set_listener(&self, listener: Weak<dyn StatusListener>);

    fn clear_listener(&self);

    fn listener(&self) -> Option<Arc<dyn StatusListener>>;

    fn device_info(&self) -> Arc<DeviceInfo>;

    fn set_device_info(&self, info: DeviceInfo);

    /// Capability query only; the encrypted channel itself is negotiated elsewhere.
    fn try_to_use_encryption(&self) -> bool {
        self.descriptor().has_psk()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quiet;
    impl StatusListener for Quiet {}

    #[test]
    fn session_ids_increase() {
        let a = SessionId::next();
        let b = SessionId::next();
        assert!(b > a);
        assert!(a.to_string().starts_with("dev-"));
    }

    #[test]
    fn listener_slot_does_not_own() {
        let slot = ListenerSlot::default();
        assert!(slot.get().is_none());

        let listener: Arc<dyn StatusListener> = Arc::new(Quiet);
        slot.set(Arc::downgrade(&listener));
        assert!(slot.get().is_some());
        assert_eq!(Arc::strong_count(&listener), 1);

        drop(listener);
        assert!(slot.get().is_none());
    }

    #[test]
    fn listener_slot_replaces_silently() {
        let slot = ListenerSlot::default();
        let first: Arc<dyn StatusListener> = Arc::new(Quiet);
        let second: Arc<dyn StatusListener> = Arc::new(Quiet);
        slot.set(Arc::downgrade(&first));
        slot.set(Arc::downgrade(&second));
        let current = slot.get().unwrap();
        assert!(Arc::ptr_eq(&current, &second));
        slot.clear();
        assert!(slot.get().is_none());
    }

    #[test]
    fn snapshot_swaps_whole_value() {
        let cell: Snapshot<DeviceInfo> = Snapshot::default();
        let before = cell.load();
        assert!(before.is_empty());
        cell.store(DeviceInfo {
            name: "Weather station".into(),
            ..Default::default()
        });
        assert!(before.is_empty());
        assert_eq!(cell.load().name, "Weather station");
    }
}
