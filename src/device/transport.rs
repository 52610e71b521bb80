use futures::future::{self, BoxFuture};
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use btleplug::api::Peripheral as _;
use btleplug::platform::Peripheral;
use log::{debug, info};

use crate::device::constants::ENABLE_NOTIFICATION_VALUE;
use crate::device::types::{CapabilityTree, CharacteristicDescriptor, NotificationDescriptor, PeripheralHandle, ServiceDescriptor};
use crate::error::DeviceError;

/// Payloads of a single characteristic, in arrival order.
pub type NotificationStream = BoxStream<'static, Vec<u8>>;

/// The operations the connection driver needs from a bluetooth stack.
///
/// Each call resolves when the stack reports the matching event; the driver
/// turns the results into `TransportEvent`s.
pub trait Transport: Send + Sync + 'static {
    fn connect(&self) -> BoxFuture<'_, Result<(), DeviceError>>;

    fn discover(&self) -> BoxFuture<'_, Result<CapabilityTree, DeviceError>>;

    /// Opens the stream of payloads of `characteristic`. Called before notifications are enabled
    /// so that no early payload is missed.
    fn notifications<'a>(&'a self, characteristic: &'a CharacteristicDescriptor) -> BoxFuture<'a, Result<NotificationStream, DeviceError>>;

    /// Requests local delivery of notifications and writes the enable value to `descriptor`.
    /// Resolves once the write has been acknowledged.
    fn enable_notifications<'a>(
        &'a self,
        characteristic: &'a CharacteristicDescriptor,
        descriptor: &'a NotificationDescriptor,
    ) -> BoxFuture<'a, Result<(), DeviceError>>;

    fn is_connected(&self) -> BoxFuture<'_, Result<bool, DeviceError>>;

    fn disconnect(&self) -> BoxFuture<'_, Result<(), DeviceError>>;
}

/// [`Transport`] backed by a btleplug peripheral.
#[derive(Debug, Clone)]
pub struct BtleTransport {
    peripheral: Peripheral,
}

impl BtleTransport {
    pub fn new(peripheral: Peripheral) -> Self {
        BtleTransport { peripheral }
    }

    pub fn handle(&self, name: Option<String>) -> PeripheralHandle {
        PeripheralHandle {
            id: format!("{:?}", self.peripheral.id()),
            address: self.peripheral.address().to_string(),
            name,
        }
    }
}

fn capability_tree(peripheral: &Peripheral) -> CapabilityTree {
    let services = peripheral
        .services()
        .into_iter()
        .map(|service| ServiceDescriptor {
            uuid: service.uuid,
            characteristics: service
                .characteristics
                .into_iter()
                .map(|characteristic| CharacteristicDescriptor {
                    uuid: characteristic.uuid,
                    service: characteristic.service_uuid,
                    descriptors: characteristic
                        .descriptors
                        .into_iter()
                        .map(|descriptor| NotificationDescriptor { uuid: descriptor.uuid })
                        .collect(),
                })
                .collect(),
        })
        .collect();

    CapabilityTree { services }
}

impl Transport for BtleTransport {
    fn connect(&self) -> BoxFuture<'_, Result<(), DeviceError>> {
        async move {
            info!("Connecting to peripheral...");
            self.peripheral.connect().await?;
            Ok(())
        }.boxed()
    }

    fn discover(&self) -> BoxFuture<'_, Result<CapabilityTree, DeviceError>> {
        async move {
            info!("Connected; Discovering services...");
            self.peripheral.discover_services().await?;
            Ok(capability_tree(&self.peripheral))
        }.boxed()
    }

    fn notifications<'a>(&'a self, characteristic: &'a CharacteristicDescriptor) -> BoxFuture<'a, Result<NotificationStream, DeviceError>> {
        async move {
            let uuid = characteristic.uuid;
            let stream = self.peripheral.notifications().await?;

            let stream = stream
                .filter_map(move |notification| {
                    future::ready((notification.uuid == uuid).then_some(notification.value))
                })
                .boxed();

            Ok(stream)
        }.boxed()
    }

    fn enable_notifications<'a>(
        &'a self,
        characteristic: &'a CharacteristicDescriptor,
        descriptor: &'a NotificationDescriptor,
    ) -> BoxFuture<'a, Result<(), DeviceError>> {
        async move {
            let target = self.peripheral
                .characteristics()
                .into_iter()
                .find(|c| c.uuid == characteristic.uuid && c.service_uuid == characteristic.service)
                .ok_or(DeviceError::MissingCharacteristic)?;

            // btleplug writes the enable value to the configuration descriptor as part of
            // subscribing; several platforms refuse a direct write to that descriptor.
            debug!(
                "Subscribing to characteristic {:?} (writes {:02x?} to descriptor {:?})",
                target.uuid, ENABLE_NOTIFICATION_VALUE, descriptor.uuid,
            );
            self.peripheral.subscribe(&target).await?;
            Ok(())
        }.boxed()
    }

    fn is_connected(&self) -> BoxFuture<'_, Result<bool, DeviceError>> {
        async move {
            Ok(self.peripheral.is_connected().await?)
        }.boxed()
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<(), DeviceError>> {
        async move {
            self.peripheral.disconnect().await?;
            Ok(())
        }.boxed()
    }
}
