//! BLE GATT transport: device discovery, characteristic subscription,
//! and command writes.
//!
//! The tracker advertises a single service whose one characteristic
//! carries both directions: commands are written to it and responses
//! arrive as notifications. Discovery is by advertised device name; the
//! connection is retried with backoff because BLE links come up flaky.

use std::time::{Duration, Instant};

use bluer::gatt::remote::Characteristic;
use bluer::{Adapter, AdapterEvent, Address, Device, Session, Uuid};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::commands::CommandPort;
use crate::errors::{Result, SyncError};

/// TI SimpleKeyService and its state characteristic, the firmware's
/// command/notify channel.
pub const DEFAULT_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000ffe0_0000_1000_8000_00805f9b34fb);
pub const DEFAULT_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000ffe1_0000_1000_8000_00805f9b34fb);

const SCAN_TIMEOUT_SECS: u64 = 30;
const MAX_CONNECT_RETRIES: u32 = 3;
const RETRY_DELAY_MS: u64 = 500;
const NOTIFICATION_QUEUE: usize = 64;

#[derive(Debug, Clone)]
pub struct GattConfig {
    /// Advertised device name to scan for.
    pub device_name: String,
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    pub scan_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl GattConfig {
    pub fn for_device(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            service_uuid: DEFAULT_SERVICE_UUID,
            characteristic_uuid: DEFAULT_CHARACTERISTIC_UUID,
            scan_timeout: Duration::from_secs(SCAN_TIMEOUT_SECS),
            max_retries: MAX_CONNECT_RETRIES,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        }
    }
}

/// Connected handle on the tracker's command characteristic.
pub struct GattTransport {
    characteristic: Characteristic,
    _session: Session,
}

impl GattTransport {
    /// Discover the device by name, connect, and resolve the command
    /// characteristic.
    pub async fn connect(config: &GattConfig) -> Result<Self> {
        let session = Session::new().await.map_err(transport_err)?;
        let adapter = session.default_adapter().await.map_err(transport_err)?;
        adapter.set_powered(true).await.map_err(transport_err)?;

        let address = scan_for_device(&adapter, &config.device_name, config.scan_timeout).await?;
        let device = adapter.device(address).map_err(transport_err)?;

        connect_with_retries(&device, config).await?;
        let characteristic = resolve_characteristic(&device, config).await?;

        info!(
            "connected to {} ({}), characteristic {} resolved",
            config.device_name, address, config.characteristic_uuid
        );
        Ok(Self {
            characteristic,
            _session: session,
        })
    }

    /// Subscribe to notifications. Payloads are forwarded in arrival
    /// order into the returned channel; the channel closes when the
    /// device stops notifying.
    pub async fn subscribe(&self) -> Result<mpsc::Receiver<Vec<u8>>> {
        let stream = self.characteristic.notify().await.map_err(transport_err)?;
        let (tx, rx) = mpsc::channel(NOTIFICATION_QUEUE);

        tokio::spawn(async move {
            futures::pin_mut!(stream);
            while let Some(payload) = stream.next().await {
                debug!("notification: {} bytes", payload.len());
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
            debug!("notification stream ended");
        });

        Ok(rx)
    }
}

impl CommandPort for GattTransport {
    async fn write_command(&mut self, command: &str) -> Result<()> {
        self.characteristic
            .write(command.as_bytes())
            .await
            .map_err(transport_err)
    }
}

fn transport_err(e: bluer::Error) -> SyncError {
    SyncError::Transport(e.to_string())
}

async fn scan_for_device(adapter: &Adapter, name: &str, timeout: Duration) -> Result<Address> {
    info!("scanning for device {name:?}");
    let mut events = adapter.discover_devices().await.map_err(transport_err)?;
    let deadline = Instant::now() + timeout;

    while let Some(event) = events.next().await {
        if let AdapterEvent::DeviceAdded(address) = event {
            let device = adapter.device(address).map_err(transport_err)?;
            let advertised = device.name().await.map_err(transport_err)?;
            if advertised.as_deref() == Some(name) {
                info!("device discovered: {name:?} at {address}");
                return Ok(address);
            }
            debug!("ignoring {address} ({advertised:?})");
        }

        if Instant::now() > deadline {
            break;
        }
    }

    Err(SyncError::Transport(format!(
        "device {name:?} not found within {timeout:?}"
    )))
}

async fn connect_with_retries(device: &Device, config: &GattConfig) -> Result<()> {
    let mut last_error = None;
    for attempt in 0..config.max_retries {
        if attempt > 0 {
            let delay = config.retry_delay * (1 << (attempt - 1).min(3));
            warn!(
                "retrying connection after {:?} (attempt {})",
                delay, attempt
            );
            tokio::time::sleep(delay).await;
        }

        if device.is_connected().await.map_err(transport_err)? {
            return Ok(());
        }
        match device.connect().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!("connection attempt {} failed: {}", attempt, e);
                last_error = Some(transport_err(e));
            }
        }
    }
    Err(last_error
        .unwrap_or_else(|| SyncError::Transport("max connect retries exceeded".into())))
}

async fn resolve_characteristic(device: &Device, config: &GattConfig) -> Result<Characteristic> {
    for service in device.services().await.map_err(transport_err)? {
        if service.uuid().await.map_err(transport_err)? != config.service_uuid {
            continue;
        }
        for characteristic in service.characteristics().await.map_err(transport_err)? {
            if characteristic.uuid().await.map_err(transport_err)? == config.characteristic_uuid {
                return Ok(characteristic);
            }
        }
    }
    Err(SyncError::Transport(format!(
        "service {} / characteristic {} not found on device",
        config.service_uuid, config.characteristic_uuid
    )))
}
