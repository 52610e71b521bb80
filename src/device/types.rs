use std::fmt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::constants::{make_notification_characteristic_uuid, make_notification_descriptor_uuid, make_primary_service_uuid};
use crate::error::TransportError;

/// Identifies the remote device. Obtained from a scan result, never created by the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeripheralHandle {
    pub id: String,
    pub address: String,
    pub name: Option<String>,
}

impl fmt::Display for PeripheralHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    ServiceDiscovery,
    NotificationSetup,
    Streaming,
    Disconnecting,
}

impl ConnectionState {
    /// True while connecting, discovering or enabling notifications.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::ServiceDiscovery | ConnectionState::NotificationSetup
        )
    }

    /// True from the start of a connect until the connection is released again.
    pub fn is_active(&self) -> bool {
        self.is_setup() || *self == ConnectionState::Streaming
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting…",
            ConnectionState::ServiceDiscovery => "Discovering services…",
            ConnectionState::NotificationSetup => "Enabling notifications…",
            ConnectionState::Streaming => "Streaming",
            ConnectionState::Disconnecting => "Disconnecting…",
        };

        write!(f, "{}", result)
    }
}

/// One decoded sensor reading: acceleration on three axes and the relative height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    StateChange(ConnectionState),
    ConnectionLost(TransportError),
}

/// The well-known identifiers looked up in the capability tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GattIds {
    pub service: Uuid,
    pub characteristic: Uuid,
    pub descriptor: Uuid,
}

impl Default for GattIds {
    fn default() -> Self {
        GattIds {
            service: make_primary_service_uuid(),
            characteristic: make_notification_characteristic_uuid(),
            descriptor: make_notification_descriptor_uuid(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDescriptor {
    pub uuid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicDescriptor {
    pub uuid: Uuid,
    pub service: Uuid,
    pub descriptors: Vec<NotificationDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicDescriptor>,
}

/// Services, characteristics and descriptors advertised by a peripheral.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityTree {
    pub services: Vec<ServiceDescriptor>,
}

impl CapabilityTree {
    pub fn service(&self, uuid: &Uuid) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|service| service.uuid == *uuid)
    }
}

impl ServiceDescriptor {
    pub fn characteristic(&self, uuid: &Uuid) -> Option<&CharacteristicDescriptor> {
        self.characteristics.iter().find(|characteristic| characteristic.uuid == *uuid)
    }
}

impl CharacteristicDescriptor {
    pub fn descriptor(&self, uuid: &Uuid) -> Option<&NotificationDescriptor> {
        self.descriptors.iter().find(|descriptor| descriptor.uuid == *uuid)
    }
}

/// Everything the bluetooth stack can tell the connection state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    ServicesResolved(CapabilityTree),
    DescriptorWritten,
    NotificationPayload(Vec<u8>),
    Closed(TransportError),
}
