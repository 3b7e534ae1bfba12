use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct DeviceMetrics {
    pub devices_loaded: IntGauge,
    pub entries_skipped: IntCounter,
    pub connect_attempts: IntCounter,
    pub connect_failures: IntCounter,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub dev: DeviceMetrics,
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let devices_loaded = IntGauge::new(
            "opdi_devices_loaded",
            "Number of devices reconstructed from the registry",
        )
        .map_err(|e| format!("metrics init error: {e}"))?;
        let entries_skipped = IntCounter::new(
            "opdi_registry_entries_skipped",
            "Registry entries dropped during reconstruction",
        )
        .map_err(|e| format!("metrics init error: {e}"))?;
        let connect_attempts =
            IntCounter::new("opdi_connect_attempts", "Total device connect attempts")
                .map_err(|e| format!("metrics init error: {e}"))?;
        let connect_failures =
            IntCounter::new("opdi_connect_failures", "Device connect attempts that failed")
                .map_err(|e| format!("metrics init error: {e}"))?;
        let dev = DeviceMetrics {
            devices_loaded,
            entries_skipped,
            connect_attempts,
            connect_failures,
        };
        let _ = registry.register(Box::new(dev.devices_loaded.clone()));
        let _ = registry.register(Box::new(dev.entries_skipped.clone()));
        let _ = registry.register(Box::new(dev.connect_attempts.clone()));
        let _ = registry.register(Box::new(dev.connect_failures.clone()));
        Ok(Self { registry, dev })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_exposition_lists_all_series() {
        let hub = MetricsHub::new().unwrap();
        hub.dev.devices_loaded.set(3);
        hub.dev.entries_skipped.inc();
        let text = hub.encode_text();
        assert!(text.contains("opdi_devices_loaded 3"));
        assert!(text.contains("opdi_registry_entries_skipped 1"));
        assert!(text.contains("opdi_connect_attempts 0"));
        assert!(text.contains("opdi_connect_failures 0"));
    }
}
