use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::io::{BufRead, BufReader, Write};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tracing::{info, warn};

use device_registry as devreg;
use device_registry::Device;
use device_transport::{AlwaysAvailable, TcpTransport};
use value_format as vf;

#[derive(Parser, Debug)]
#[command(
    name = "opdi",
    version,
    about = "Remote device registry and connection tool",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a descriptor string from its fields
    DescriptorEncode {
        /// Display name
        #[arg(long)]
        name: String,
        /// Host name or IP address
        #[arg(long)]
        host: String,
        /// TCP port
        #[arg(long, default_value_t = 13110u16)]
        port: u16,
        #[arg(long, default_value = "")]
        user: String,
        #[arg(long, default_value = "")]
        password: String,
        /// Pre-shared key for encrypted sessions
        #[arg(long)]
        psk: Option<String>,
    },
    /// Parse and validate a descriptor string
    DescriptorDecode {
        descriptor: String,
        /// Print the decoded fields as JSON
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// List devices stored in a registry file
    DeviceList {
        /// Registry YAML file
        #[arg(long, default_value = "configs/devices.yaml")]
        registry: String,
        /// Print prometheus metrics after listing
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
    /// Add a TCP/IP device to a registry file
    DeviceAdd {
        #[arg(long, default_value = "configs/devices.yaml")]
        registry: String,
        /// Descriptor string (tcpip://user:password:name:host:port:psk)
        descriptor: String,
    },
    /// Remove a device from a registry file by position
    DeviceRemove {
        #[arg(long, default_value = "configs/devices.yaml")]
        registry: String,
        #[arg(long)]
        index: usize,
    },
    /// Connect to a device, optionally send a probe line, then close
    DeviceConnect {
        #[arg(long, default_value = "configs/devices.yaml")]
        registry: String,
        /// Registry position of the device
        #[arg(long)]
        index: Option<usize>,
        /// Descriptor string (instead of --index)
        #[arg(long)]
        descriptor: Option<String>,
        /// Connect timeout in milliseconds
        #[arg(long, default_value_t = 10_000u64)]
        timeout_ms: u64,
        /// Line to send after connecting; the first reply line is printed
        #[arg(long)]
        probe: Option<String>,
        /// Milliseconds to wait for the probe reply
        #[arg(long, default_value_t = 2_000u64)]
        reply_ms: u64,
        /// Skip the confirmation prompt
        #[arg(long, action = ArgAction::SetTrue)]
        yes: bool,
    },
    /// Format a raw value with a unit from a unit definitions file
    UnitFormat {
        /// Unit definitions YAML file
        #[arg(long, default_value = "configs/units.yaml")]
        units: String,
        /// Unit name
        #[arg(long)]
        unit: String,
        /// Raw value
        #[arg(long, allow_hyphen_values = true)]
        value: i64,
    },
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::DescriptorEncode {
            name,
            host,
            port,
            user,
            password,
            psk,
        } => descriptor_encode(&name, &host, port, &user, &password, psk.as_deref()),
        Commands::DescriptorDecode { descriptor, json } => descriptor_decode(&descriptor, json),
        Commands::DeviceList { registry, metrics } => device_list(&registry, metrics),
        Commands::DeviceAdd {
            registry,
            descriptor,
        } => device_add(&registry, &descriptor),
        Commands::DeviceRemove { registry, index } => device_remove(&registry, index),
        Commands::DeviceConnect {
            registry,
            index,
            descriptor,
            timeout_ms,
            probe,
            reply_ms,
            yes,
        } => device_connect(
            &registry,
            index,
            descriptor.as_deref(),
            Duration::from_millis(timeout_ms),
            probe.as_deref(),
            Duration::from_millis(reply_ms),
            yes,
        ),
        Commands::UnitFormat { units, unit, value } => unit_format(&units, &unit, value),
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn type_registry() -> Result<&'static devreg::TypeRegistry> {
    let defaults = devreg::TypeRegistry::with_defaults(Arc::new(AlwaysAvailable));
    match defaults.install_global() {
        Ok(types) => Ok(types),
        Err(_) => devreg::TypeRegistry::global()
            .ok_or_else(|| anyhow::anyhow!("device type registry unavailable")),
    }
}

fn descriptor_encode(
    name: &str,
    host: &str,
    port: u16,
    user: &str,
    password: &str,
    psk: Option<&str>,
) -> Result<()> {
    let mut desc = devreg::DeviceDescriptor::tcpip(name, host, port).with_credentials(user, password);
    if let Some(psk) = psk {
        desc = desc.with_psk(psk);
    }
    println!("{}", devreg::encode(&desc)?);
    Ok(())
}

fn descriptor_decode(descriptor: &str, json: bool) -> Result<()> {
    let desc = devreg::decode(descriptor)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&desc)?);
    } else {
        println!(
            "ok: {} ({}://{}:{}, encryption={})",
            desc.name,
            desc.type_tag,
            desc.host,
            desc.port,
            if desc.has_psk() { "psk" } else { "off" }
        );
    }
    Ok(())
}

fn device_list(registry: &str, metrics: bool) -> Result<()> {
    let store = devreg::FileStore::new(registry);
    let hub = devreg::MetricsHub::new().map_err(anyhow::Error::msg)?;
    let reg = devreg::DeviceRegistry::load(&store).with_metrics(hub.dev.clone());
    let devices = reg.reconstruct_all(type_registry()?);
    if devices.len() < reg.len() {
        warn!(
            skipped = reg.len() - devices.len(),
            "some registry entries could not be loaded"
        );
    }
    for dev in &devices {
        println!(
            "{}\t{}\t{}\tencryption={}",
            dev.id(),
            dev.label(),
            dev.display_address(),
            dev.try_to_use_encryption()
        );
    }
    if metrics {
        print!("{}", hub.encode_text());
    }
    Ok(())
}

/// Registry for a command that saves it back; refuses to start from a corrupt file.
fn load_for_update(store: &devreg::FileStore) -> Result<devreg::DeviceRegistry> {
    devreg::DeviceRegistry::try_load(store).with_context(|| {
        format!(
            "refusing to modify unreadable registry {}",
            store.path().display()
        )
    })
}

fn device_add(registry: &str, descriptor: &str) -> Result<()> {
    let store = devreg::FileStore::new(registry);
    let mut reg = load_for_update(&store)?;
    let dev = devreg::TcpIpDevice::from_payload(descriptor, Arc::new(AlwaysAvailable))?;
    reg.add_device(&dev)?;
    reg.save(&store)?;
    info!(device = %dev.label(), n = reg.len(), "device added");
    println!("added: {} ({})", dev.label(), dev.display_address());
    Ok(())
}

fn device_remove(registry: &str, index: usize) -> Result<()> {
    let store = devreg::FileStore::new(registry);
    let mut reg = load_for_update(&store)?;
    let removed = reg
        .remove(index)
        .ok_or_else(|| anyhow::anyhow!("no device at index {index} ({} stored)", reg.len()))?;
    reg.save(&store)?;
    println!("removed: {}", removed.payload);
    Ok(())
}

struct PrintListener;

impl devreg::StatusListener for PrintListener {
    fn connection_opened(&self, device: &str) {
        info!(device, "connection opened");
    }

    fn connection_failed(&self, device: &str, message: &str) {
        warn!(device, message, "connection failed");
    }

    fn connection_closed(&self, device: &str) {
        info!(device, "connection closed");
    }
}

#[allow(clippy::too_many_arguments)]
fn device_connect(
    registry: &str,
    index: Option<usize>,
    descriptor: Option<&str>,
    timeout: Duration,
    probe: Option<&str>,
    reply_wait: Duration,
    yes: bool,
) -> Result<()> {
    let payload = match (index, descriptor) {
        (Some(i), None) => {
            let reg = devreg::DeviceRegistry::load(&devreg::FileStore::new(registry));
            let entry = reg
                .entries()
                .get(i)
                .ok_or_else(|| anyhow::anyhow!("no device at index {i}"))?;
            if entry.type_name != devreg::TCPIP_TYPE_NAME {
                anyhow::bail!("device {i} is a {}, not a TCP/IP device", entry.type_name);
            }
            entry.payload.clone()
        }
        (None, Some(d)) => d.to_string(),
        _ => anyhow::bail!("provide --index <n> or --descriptor <string>"),
    };
    let desc = devreg::decode_as(devreg::TCPIP_TAG, &payload)?;
    let dev = Arc::new(devreg::NetworkDevice::with_options(
        devreg::TCPIP_TYPE_NAME,
        desc,
        TcpTransport::new(Arc::new(AlwaysAvailable)),
        devreg::ConnectOptions {
            connect_timeout: timeout,
        },
    ));
    let listener: Arc<dyn devreg::StatusListener> = Arc::new(PrintListener);
    dev.set_listener(Arc::downgrade(&listener));

    if let Some(question) = dev.connection_message(yes) {
        print!("{question} [y/N] ");
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            println!("aborted");
            return Ok(());
        }
    }

    if !dev.prepare() {
        anyhow::bail!("network unavailable; cannot prepare {}", dev.label());
    }
    if let Err(e) = dev.connect() {
        if e.is_retryable() {
            eprintln!("{e} (retry possible)");
        }
        return Err(e.into());
    }
    println!("connected: {} ({})", dev.label(), dev.state());

    if let Some(line) = probe {
        let mut out = dev.output_stream()?;
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
        out.flush()?;

        let input = dev.input_stream()?;
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut reply = String::new();
            let res = BufReader::new(input).read_line(&mut reply).map(|_| reply);
            let _ = tx.send(res);
        });
        match rx.recv_timeout(reply_wait) {
            Ok(Ok(reply)) if !reply.is_empty() => println!("reply: {}", reply.trim_end()),
            Ok(Ok(_)) => println!("peer closed the connection"),
            Ok(Err(e)) => warn!(error = %e, "reading reply failed"),
            // Closing the device below unblocks the reader
            Err(_) => println!("no reply within {} ms", reply_wait.as_millis()),
        }
    }

    dev.close();
    println!("closed: {} ({})", dev.label(), dev.state());
    Ok(())
}

fn unit_format(units: &str, name: &str, value: i64) -> Result<()> {
    let cache = vf::UnitCache::global();
    vf::load_unit_file(units, cache)?;
    let unit = cache
        .get(name)
        .ok_or_else(|| anyhow::anyhow!("unit not defined in {units}: {name}"))?;
    let text = vf::format(&unit, value);
    let hint = vf::activity_hint(&unit, value);
    info!(unit = name, raw = value, "formatted value");
    println!("{}: {} ({:?})", unit.label(), text, hint);
    Ok(())
}
