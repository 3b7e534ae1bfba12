use crate::device::{ListenerSlot, Snapshot};
use crate::lifecycle::{ConnectOptions, ConnectionState, InputStream, Lifecycle, OutputStream};
use crate::metrics::DeviceMetrics;
use crate::{
    decode_as, Device, DeviceDescriptor, DeviceInfo, Result, SessionId, StatusListener, TCPIP_TAG,
};
use device_transport::{Endpoint, Environment, TcpTransport, Transport};
use std::sync::{Arc, Weak};

/// Registry type name of [`TcpIpDevice`].
pub const TCPIP_TYPE_NAME: &str = "device_registry::TcpIpDevice";

/// Device reachable through any byte-stream [`Transport`].
pub struct NetworkDevice<T: Transport> {
    session: SessionId,
    type_name: &'static str,
    descriptor: DeviceDescriptor,
    lifecycle: Lifecycle<T>,
    listener: ListenerSlot,
    info: Snapshot<DeviceInfo>,
    metrics: Option<DeviceMetrics>,
}

/// The TCP/IP device variant.
pub type TcpIpDevice = NetworkDevice<TcpTransport>;

impl<T: Transport> NetworkDevice<T> {
    pub fn new(type_name: &'static str, descriptor: DeviceDescriptor, transport: T) -> Self {
        Self::with_options(type_name, descriptor, transport, ConnectOptions::default())
    }

    pub fn with_options(
        type_name: &'static str,
        descriptor: DeviceDescriptor,
        transport: T,
        options: ConnectOptions,
    ) -> Self {
        let endpoint = Endpoint::new(descriptor.host.clone(), descriptor.port);
        let session = SessionId::next();
        tracing::debug!(device = %session, type_name, %endpoint, "device created");
        Self {
            session,
            type_name,
            descriptor,
            lifecycle: Lifecycle::new(transport, endpoint, options),
            listener: ListenerSlot::default(),
            info: Snapshot::default(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: DeviceMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn transport(&self) -> &T {
        self.lifecycle.transport()
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.lifecycle.endpoint()
    }

    fn log_name(&self) -> String {
        format!("{} ({})", self.label(), self.session)
    }
}

impl TcpIpDevice {
    pub fn tcpip(descriptor: DeviceDescriptor, env: Arc<dyn Environment>) -> Self {
        Self::new(TCPIP_TYPE_NAME, descriptor, TcpTransport::new(env))
    }

    /// Rebuild a TCP/IP device from its registry payload.
    pub fn from_payload(payload: &str, env: Arc<dyn Environment>) -> Result<Self> {
        let descriptor = decode_as(TCPIP_TAG, payload)?;
        Ok(Self::tcpip(descriptor, env))
    }
}

impl<T: Transport> Device for NetworkDevice<T> {
    fn id(&self) -> SessionId {
        self.session
    }

    fn type_name(&self) -> &str {
        self.type_name
    }

    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn display_address(&self) -> String {
        self.lifecycle.endpoint().to_string()
    }

    fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    fn prepare(&self) -> bool {
        self.lifecycle.prepare(&self.log_name())
    }

    fn connect(&self) -> Result<()> {
        let name = self.log_name();
        if let Some(m) = &self.metrics {
            m.connect_attempts.inc();
        }
        match self.lifecycle.connect(&name) {
            Ok(()) => {
                if let Some(l) = self.listener.get() {
                    l.connection_opened(&name);
                }
                Ok(())
            }
            Err(e) => {
                if let Some(m) = &self.metrics {
                    m.connect_failures.inc();
                }
                if let Some(l) = self.listener.get() {
                    l.connection_failed(&name, &e.to_string());
                }
                Err(e)
            }
        }
    }

    fn input_stream(&self) -> Result<InputStream> {
        self.lifecycle.input_stream()
    }

    fn output_stream(&self) -> Result<OutputStream> {
        self.lifecycle.output_stream()
    }

    fn close(&self) {
        let name = self.log_name();
        if self.lifecycle.close(&name) {
            if let Some(l) = self.listener.get() {
                l.connection_closed(&name);
            }
        }
    }

    fn set_listener(&self, listener: Weak<dyn StatusListener>) {
        self.listener.set(listener);
    }

    fn clear_listener(&self) {
        self.listener.clear();
    }

    fn listener(&self) -> Option<Arc<dyn StatusListener>> {
        self.listener.get()
    }

    fn device_info(&self) -> Arc<DeviceInfo> {
        self.info.load()
    }

    fn set_device_info(&self, info: DeviceInfo) {
        self.info.store(info);
    }
}

impl<T: Transport> Drop for NetworkDevice<T> {
    fn drop(&mut self) {
        // Silent teardown: no listener callbacks while being destroyed
        self.lifecycle.close(&self.session.to_string());
    }
}
