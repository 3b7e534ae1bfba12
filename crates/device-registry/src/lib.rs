//! device-registry: persisted registry of remote devices and their connection lifecycle
//!
//! A device is described by a compact descriptor string
//! (`tcpip://user:password:name:host:port:psk`). The registry stores
//! `(type name, descriptor)` pairs and rebuilds live [`Device`] objects through a
//! [`TypeRegistry`] of constructors; each device then walks the
//! `New -> Prepared -> Connecting -> Connected -> Closed` lifecycle.

mod error;
pub use error::{Error, Result};

mod types;
pub use types::*;

mod encode;
pub use encode::{encode, DELIMITER, SCHEME_SEPARATOR};

mod decode;
pub use decode::{decode, decode_as};

mod lifecycle;
pub use lifecycle::{
    ConnectOptions, ConnectionState, InputStream, Lifecycle, OutputStream,
    DEFAULT_CONNECT_TIMEOUT,
};

mod device;
pub use device::{Device, DeviceInfo, ListenerSlot, SessionId, StatusListener};

mod network;
pub use network::{NetworkDevice, TcpIpDevice, TCPIP_TYPE_NAME};

mod factory;
pub use factory::{DeviceFactory, TypeRegistry};

mod loader;
pub use loader::{reconstruct_all, DeviceRegistry, FileStore, MemoryStore, RegistryStore};

mod metrics;
pub use metrics::{DeviceMetrics, MetricsHub};
