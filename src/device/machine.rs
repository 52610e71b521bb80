//! Connection state machine without any I/O.
//!
//! The driver in `device::connection` feeds [`TransportEvent`]s into
//! [`ConnectionMachine::handle`] and executes the [`Command`]s it returns.
//! Keeping the transitions free of I/O lets them be exercised without a
//! bluetooth stack.

use log::{debug, info, trace, warn};

use crate::device::frame::decode;
use crate::device::types::{CharacteristicDescriptor, ConnectionState, GattIds, NotificationDescriptor, SensorSample, TransportEvent, CapabilityTree};
use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Initiate the transport level connect.
    Connect,
    /// Resolve the capability tree of the peripheral.
    DiscoverServices,
    /// Request local delivery of notifications and write the enable value to the descriptor.
    EnableNotifications {
        characteristic: CharacteristicDescriptor,
        descriptor: NotificationDescriptor,
    },
    /// Hand a decoded sample to the subscriber.
    Deliver(SensorSample),
    /// Release the transport level connection, then call [`ConnectionMachine::released`].
    Release,
    /// Tell the caller that the connection is gone.
    ReportLost(TransportError),
}

#[derive(Debug)]
pub struct ConnectionMachine {
    ids: GattIds,
    state: ConnectionState,
    // failure that caused the current Disconnecting, reported once released
    pending_loss: Option<TransportError>,
    malformed_frames: u64,
    delivered_samples: u64,
}

impl ConnectionMachine {
    pub fn new(ids: GattIds) -> Self {
        ConnectionMachine {
            ids,
            state: ConnectionState::Disconnected,
            pending_loss: None,
            malformed_frames: 0,
            delivered_samples: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Number of notification payloads dropped because they did not decode.
    pub fn malformed_frames(&self) -> u64 {
        self.malformed_frames
    }

    pub fn delivered_samples(&self) -> u64 {
        self.delivered_samples
    }

    fn transition(&mut self, state: ConnectionState) {
        if self.state != state {
            info!("Connection state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// Begins a connection attempt. Does nothing unless disconnected.
    pub fn start(&mut self) -> Vec<Command> {
        if self.state != ConnectionState::Disconnected {
            return vec![];
        }

        self.pending_loss = None;
        self.malformed_frames = 0;
        self.delivered_samples = 0;
        self.transition(ConnectionState::Connecting);
        vec![Command::Connect]
    }

    /// Explicit stop requested by the caller. Does nothing if already (dis)connecting away.
    pub fn stop(&mut self) -> Vec<Command> {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Disconnecting => vec![],
            _ => {
                self.transition(ConnectionState::Disconnecting);
                vec![Command::Release]
            },
        }
    }

    /// The transport connection has been released after a [`Command::Release`].
    pub fn released(&mut self) -> Vec<Command> {
        if self.state != ConnectionState::Disconnecting {
            return vec![];
        }

        self.transition(ConnectionState::Disconnected);
        self.pending_loss.take().map(Command::ReportLost).into_iter().collect()
    }

    fn fail(&mut self, reason: TransportError) -> Vec<Command> {
        warn!("Connection setup failed: {}", reason);
        self.pending_loss = Some(reason);
        self.transition(ConnectionState::Disconnecting);
        vec![Command::Release]
    }

    pub fn handle(&mut self, event: TransportEvent) -> Vec<Command> {
        match (self.state, event) {
            (ConnectionState::Connecting, TransportEvent::Connected) => {
                self.transition(ConnectionState::ServiceDiscovery);
                vec![Command::DiscoverServices]
            },
            (ConnectionState::ServiceDiscovery, TransportEvent::ServicesResolved(tree)) => {
                self.services_resolved(&tree)
            },
            (ConnectionState::NotificationSetup, TransportEvent::DescriptorWritten) => {
                self.transition(ConnectionState::Streaming);
                vec![]
            },
            (ConnectionState::Streaming, TransportEvent::NotificationPayload(payload)) => {
                match decode(&payload) {
                    Ok(sample) => {
                        self.delivered_samples += 1;
                        vec![Command::Deliver(sample)]
                    },
                    Err(err) => {
                        self.malformed_frames += 1;
                        trace!("Dropping notification {:?}: {}", String::from_utf8_lossy(&payload), err);
                        vec![]
                    },
                }
            },
            (ConnectionState::Disconnected, TransportEvent::Closed(_)) => vec![],
            (ConnectionState::Disconnecting, TransportEvent::Closed(reason)) => {
                debug!("Transport closed while disconnecting: {}", reason);
                self.released()
            },
            (_, TransportEvent::Closed(reason)) => {
                warn!("Connection lost: {}", reason);
                self.transition(ConnectionState::Disconnected);
                vec![Command::ReportLost(reason)]
            },
            (state, event) => {
                debug!("Ignoring {:?} in state {:?}", event_name(&event), state);
                vec![]
            },
        }
    }

    fn services_resolved(&mut self, tree: &CapabilityTree) -> Vec<Command> {
        let Some(service) = tree.service(&self.ids.service) else {
            return self.fail(TransportError::MissingService);
        };

        let Some(characteristic) = service.characteristic(&self.ids.characteristic) else {
            return self.fail(TransportError::MissingCharacteristic);
        };

        let Some(descriptor) = characteristic.descriptor(&self.ids.descriptor) else {
            return self.fail(TransportError::MissingDescriptor);
        };

        info!("Enabling notifications on {:?} {:?}", service.uuid, characteristic.uuid);
        self.transition(ConnectionState::NotificationSetup);
        vec![Command::EnableNotifications {
            characteristic: characteristic.clone(),
            descriptor: descriptor.clone(),
        }]
    }
}

fn event_name(event: &TransportEvent) -> &'static str {
    match event {
        TransportEvent::Connected => "Connected",
        TransportEvent::ServicesResolved(_) => "ServicesResolved",
        TransportEvent::DescriptorWritten => "DescriptorWritten",
        TransportEvent::NotificationPayload(_) => "NotificationPayload",
        TransportEvent::Closed(_) => "Closed",
    }
}
