use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use log::{debug, info, warn};
use tokio::time::{sleep, Duration, Instant};

use crate::config::types::PeripheralFilter;
use crate::device::constants::SCAN_POLL_DELAY;
use crate::device::transport::BtleTransport;
use crate::device::types::PeripheralHandle;
use crate::error::ScanError;

async fn start_scanning(manager: &Manager) -> Result<Vec<Adapter>, ScanError> {
    let adapters = manager.adapters().await?;
    if adapters.is_empty() {
        return Err(ScanError::NoAdapter);
    }

    // the board does not always advertise its service, so scan unfiltered and match afterwards
    for adapter in &adapters {
        info!("Scanning using adapter {}...", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
        adapter.start_scan(ScanFilter::default()).await?;
    }

    Ok(adapters)
}

async fn stop_scanning(adapters: &[Adapter]) {
    for adapter in adapters {
        if let Err(err) = adapter.stop_scan().await {
            debug!("Failed to stop scanning: {:?}", err);
        }
    }
}

async fn find_peripheral(adapters: &[Adapter], filter: &PeripheralFilter) -> Option<(Peripheral, Option<String>)> {
    for adapter in adapters {
        let peripherals = match adapter.peripherals().await {
            Ok(v) => v,
            Err(err) => {
                warn!("Failed to query BLE adapter for peripherals: {}", err);
                continue;
            },
        };

        for peripheral in peripherals {
            match peripheral.properties().await {
                Err(err) => {
                    warn!("Could not query peripheral for properties: {:?}", err);
                },
                Ok(None) => {
                    debug!("Peripheral has no properties");
                },
                Ok(Some(properties)) => {
                    let address = properties.address.to_string();
                    if filter.matches(&address, properties.local_name.as_deref()) {
                        info!(
                            "Using peripheral {} {:?} {}",
                            properties.address,
                            properties.address_type,
                            properties.local_name.as_deref().unwrap_or("NONE"),
                        );
                        return Some((peripheral, properties.local_name));
                    }
                },
            }
        }
    }

    None
}

fn is_permission_error(err: &ScanError) -> bool {
    matches!(err, ScanError::Btle { source: btleplug::Error::PermissionDenied })
}

/// Scans until a peripheral matching `filter` shows up, or `scan_timeout` elapses.
pub async fn scan_for_peripheral(filter: &PeripheralFilter, scan_timeout: Duration) -> Result<(PeripheralHandle, BtleTransport), ScanError> {
    let manager = Manager::new().await?;
    let adapters = match start_scanning(&manager).await {
        Ok(adapters) => adapters,
        Err(err) if is_permission_error(&err) => return Err(ScanError::PermissionDenied),
        Err(err) => return Err(err),
    };

    let deadline = Instant::now() + scan_timeout;

    loop {
        if let Some((peripheral, name)) = find_peripheral(&adapters, filter).await {
            stop_scanning(&adapters).await;
            let transport = BtleTransport::new(peripheral);
            return Ok((transport.handle(name), transport));
        }

        if Instant::now() >= deadline {
            stop_scanning(&adapters).await;
            return Err(ScanError::NotFound(scan_timeout.as_millis() as u64));
        }

        debug!("No peripherals matched");
        sleep(Duration::from_millis(SCAN_POLL_DELAY)).await;
    }
}
