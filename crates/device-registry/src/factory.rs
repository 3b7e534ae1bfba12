use crate::{Device, Error, RegistryEntry, Result, TcpIpDevice, TCPIP_TYPE_NAME};
use device_transport::Environment;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Builds a live device from an encoded descriptor.
pub type DeviceFactory = Box<dyn Fn(&str) -> Result<Box<dyn Device>> + Send + Sync>;

static GLOBAL: OnceLock<TypeRegistry> = OnceLock::new();

/// Mapping from implementation identifier to device constructor.
///
/// Populate it at startup, then treat it as read-only; the process-wide instance
/// is frozen by [`TypeRegistry::install_global`].
#[derive(Default)]
pub struct TypeRegistry {
    factories: HashMap<String, DeviceFactory>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in TCP/IP variant.
    pub fn with_defaults(env: Arc<dyn Environment>) -> Self {
        let mut types = Self::new();
        types.register(TCPIP_TYPE_NAME, move |payload| {
            let dev = TcpIpDevice::from_payload(payload, Arc::clone(&env))?;
            Ok(Box::new(dev) as Box<dyn Device>)
        });
        types
    }

    /// Register (or replace) the constructor for `type_name`.
    pub fn register<F>(&mut self, type_name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&str) -> Result<Box<dyn Device>> + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        if self.factories.contains_key(&type_name) {
            tracing::warn!(type_name, "replacing registered device constructor");
        }
        self.factories.insert(type_name, Box::new(factory));
        self
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Construct the device described by one registry entry.
    pub fn construct(&self, entry: &RegistryEntry) -> Result<Box<dyn Device>> {
        let factory = self
            .factories
            .get(&entry.type_name)
            .ok_or_else(|| Error::Reconstruction {
                type_name: entry.type_name.clone(),
                reason: "no constructor registered".into(),
            })?;
        factory(&entry.payload).map_err(|e| Error::Reconstruction {
            type_name: entry.type_name.clone(),
            reason: e.to_string(),
        })
    }

    /// Freeze this registry as the process-wide instance. Returns it back if one
    /// was already installed.
    pub fn install_global(self) -> core::result::Result<&'static TypeRegistry, TypeRegistry> {
        GLOBAL.set(self)?;
        GLOBAL.get().ok_or_else(TypeRegistry::new)
    }

    pub fn global() -> Option<&'static TypeRegistry> {
        GLOBAL.get()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}
