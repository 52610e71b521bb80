use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::fmt;
use futures::{FutureExt, SinkExt, StreamExt};
use futures::channel::mpsc::Sender;
use futures::future::{BoxFuture, Shared};
use log::{debug, info, warn};
use tokio::spawn;
use tokio::sync::watch;
use tokio::time::{interval, sleep, timeout, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::device::constants::{LINK_CHECK_DEADLINE, LINK_CHECK_INTERVAL, RELEASE_DEADLINE, SETUP_TIMEOUT};
use crate::device::machine::{Command, ConnectionMachine};
use crate::device::transport::{NotificationStream, Transport};
use crate::device::types::{ConnectionState, DeviceEvent, GattIds, PeripheralHandle, SensorSample, TransportEvent};
use crate::error::TransportError;

/// Receives every decoded sample. Invoked from the connection task, so it must not block.
pub type SampleCallback = Arc<dyn Fn(SensorSample) + Send + Sync>;

// Resolves once a connection task has exited and released its transport.
type TaskDone = Shared<BoxFuture<'static, ()>>;

#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub ids: GattIds,
    pub setup_timeout: Duration,
    pub link_check_interval: Duration,
    pub link_check_deadline: Duration,
    pub release_deadline: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        ConnectionSettings {
            ids: GattIds::default(),
            setup_timeout: Duration::from_millis(SETUP_TIMEOUT),
            link_check_interval: Duration::from_millis(LINK_CHECK_INTERVAL),
            link_check_deadline: Duration::from_millis(LINK_CHECK_DEADLINE),
            release_deadline: Duration::from_millis(RELEASE_DEADLINE),
        }
    }
}

/// Refers to one connection started by [`ConnectionManager::connect`].
#[derive(Clone)]
pub struct ConnectionHandle {
    id: u64,
    peripheral: PeripheralHandle,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    done: TaskDone,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("peripheral", &self.peripheral)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl ConnectionHandle {
    pub fn peripheral(&self) -> &PeripheralHandle {
        &self.peripheral
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Waits until the connection reaches a state accepted by `accept` and returns that state.
    /// Returns the last state if the connection task has gone away.
    pub async fn wait_for<F>(&mut self, accept: F) -> ConnectionState
        where F: Fn(ConnectionState) -> bool
    {
        loop {
            let state = *self.state.borrow_and_update();
            if accept(state) {
                return state;
            }

            if self.state.changed().await.is_err() {
                return *self.state.borrow();
            }
        }
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Owns the (single) connection to a peripheral.
///
/// Connections are strictly sequential: a new connection task does not touch the transport
/// before the task of the previous connection has released it.
pub struct ConnectionManager {
    settings: ConnectionSettings,
    senders: Vec<Sender<DeviceEvent>>,
    // the most recent connection, kept after it has been disconnected
    latest: Option<ConnectionHandle>,
    next_id: u64,
}

impl ConnectionManager {
    pub fn new(settings: ConnectionSettings, senders: Vec<Sender<DeviceEvent>>) -> Self {
        ConnectionManager {
            settings,
            senders,
            latest: None,
            next_id: 1,
        }
    }

    pub fn state(&self) -> ConnectionState {
        match &self.latest {
            Some(handle) => handle.state(),
            None => ConnectionState::Disconnected,
        }
    }

    pub fn handle(&self) -> Option<&ConnectionHandle> {
        self.latest.as_ref()
    }

    /// Starts connecting to `peripheral` and returns a handle to the connection.
    ///
    /// While a connection to the same peripheral is being set up or is streaming, the existing
    /// handle is returned and `transport` and `on_sample` are dropped. Any other previous
    /// connection is cancelled; the new one waits until that one has released its transport
    /// before connecting.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect<T: Transport>(&mut self, peripheral: PeripheralHandle, transport: T, on_sample: SampleCallback) -> ConnectionHandle {
        let mut previous: Option<TaskDone> = None;

        if let Some(latest) = self.latest.take() {
            if latest.peripheral == peripheral && latest.state().is_active() && !latest.cancel.is_cancelled() {
                debug!("Already connecting/connected to {}", peripheral);
                self.latest = Some(latest.clone());
                return latest;
            }

            if latest.state() != ConnectionState::Disconnected {
                info!("Replacing connection to {} with {}", latest.peripheral, peripheral);
            }
            latest.cancel.cancel();
            previous = Some(latest.done);
        }

        let id = self.next_id;
        self.next_id += 1;

        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();

        let driver = Driver {
            transport,
            machine: ConnectionMachine::new(self.settings.ids),
            settings: self.settings,
            state_tx,
            senders: self.senders.clone(),
            on_sample,
            notifications: None,
            released: false,
        };

        info!("Connecting to {}", peripheral);
        let task = spawn(driver.run(cancel.clone(), previous));
        let done: TaskDone = task
            .map(|result| {
                if let Err(err) = result {
                    warn!("Connection task failed: {:?}", err);
                }
            })
            .boxed()
            .shared();

        let handle = ConnectionHandle {
            id,
            peripheral,
            state: state_rx,
            cancel,
            done,
        };
        self.latest = Some(handle.clone());
        handle
    }

    /// Disconnects the connection referred to by `handle`.
    ///
    /// The returned future resolves once the connection task has released the transport; from
    /// then on the sample callback of this connection is never invoked again. This also holds
    /// for a handle that has since been replaced by a newer connection. Disconnecting a
    /// connection that is already gone resolves once its task has finished. Transport errors
    /// while disconnecting are logged and otherwise ignored.
    pub fn disconnect(&mut self, handle: &ConnectionHandle) -> impl Future<Output = ()> + Send + 'static {
        handle.cancel.cancel();
        handle.done.clone()
    }
}

enum Step {
    Event(TransportEvent),
    Stop,
    Idle,
}

struct Driver<T: Transport> {
    transport: T,
    machine: ConnectionMachine,
    settings: ConnectionSettings,
    state_tx: watch::Sender<ConnectionState>,
    senders: Vec<Sender<DeviceEvent>>,
    on_sample: SampleCallback,
    notifications: Option<NotificationStream>,
    released: bool,
}

impl<T: Transport> Driver<T> {
    async fn run(mut self, cancel: CancellationToken, previous: Option<TaskDone>) {
        let mut pending: VecDeque<Command> = self.machine.start().into();
        self.publish_state().await;

        if let Some(previous) = previous {
            // the previous connection may share the peripheral; connecting before it has
            // released the transport would have the new link torn down by that release
            debug!("Waiting for the previous connection to be released");
            previous.await;
        }

        let setup_deadline = sleep(self.settings.setup_timeout);
        tokio::pin!(setup_deadline);

        let mut link_check = interval(self.settings.link_check_interval);
        link_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
        link_check.reset();

        loop {
            let step = match pending.pop_front() {
                Some(Command::Deliver(sample)) => {
                    (self.on_sample)(sample);
                    Step::Idle
                },
                Some(Command::ReportLost(reason)) => {
                    self.send(DeviceEvent::ConnectionLost(reason)).await;
                    Step::Idle
                },
                Some(Command::Release) => {
                    self.release().await;
                    pending.extend(self.machine.released());
                    Step::Idle
                },
                Some(command) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Step::Stop,
                        _ = &mut setup_deadline, if self.machine.state().is_setup() => {
                            Step::Event(TransportEvent::Closed(TransportError::SetupTimeout))
                        },
                        event = self.execute(command) => Step::Event(event),
                    }
                },
                None => match self.machine.state() {
                    ConnectionState::Disconnected => break,
                    ConnectionState::Streaming => {
                        let notifications = self.notifications.as_mut();
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => Step::Stop,
                            payload = next_payload(notifications) => match payload {
                                Some(payload) => Step::Event(TransportEvent::NotificationPayload(payload)),
                                None => Step::Event(TransportEvent::Closed(TransportError::StreamEnded)),
                            },
                            _ = link_check.tick() => {
                                match timeout(self.settings.link_check_deadline, self.transport.is_connected()).await {
                                    Err(_) => {
                                        warn!("Checking for connection status took too long");
                                        Step::Event(TransportEvent::Closed(TransportError::LinkLost))
                                    },
                                    Ok(Err(err)) => {
                                        warn!("Error checking for connection state: {:?}", err);
                                        Step::Event(TransportEvent::Closed(TransportError::LinkLost))
                                    },
                                    Ok(Ok(false)) => Step::Event(TransportEvent::Closed(TransportError::LinkLost)),
                                    Ok(Ok(true)) => Step::Idle,
                                }
                            },
                        }
                    },
                    _ => {
                        // every setup command yields an event, so this only waits out the deadline
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => Step::Stop,
                            _ = &mut setup_deadline => Step::Event(TransportEvent::Closed(TransportError::SetupTimeout)),
                        }
                    },
                },
            };

            match step {
                Step::Event(event) => pending.extend(self.machine.handle(event)),
                Step::Stop => pending.extend(self.machine.stop()),
                Step::Idle => {},
            }

            self.publish_state().await;
        }

        if !self.released {
            // the connection ended through a transport failure; make sure nothing stays half open
            self.release().await;
        }

        debug!(
            "Connection task finished: {} samples delivered, {} malformed frames dropped",
            self.machine.delivered_samples(),
            self.machine.malformed_frames(),
        );
    }

    async fn execute(&mut self, command: Command) -> TransportEvent {
        let result = match command {
            Command::Connect => self.transport.connect().await.map(|_| TransportEvent::Connected),
            Command::DiscoverServices => self.transport.discover().await.map(TransportEvent::ServicesResolved),
            Command::EnableNotifications { characteristic, descriptor } => {
                match self.transport.notifications(&characteristic).await {
                    Ok(stream) => {
                        self.notifications = Some(stream);
                        self.transport
                            .enable_notifications(&characteristic, &descriptor)
                            .await
                            .map(|_| TransportEvent::DescriptorWritten)
                    },
                    Err(err) => Err(err),
                }
            },
            Command::Deliver(_) | Command::Release | Command::ReportLost(_) => {
                unreachable!("handled by the driver loop")
            },
        };

        result.unwrap_or_else(|err| {
            warn!("Transport operation failed: {:?}", err);
            TransportEvent::Closed(err.into())
        })
    }

    async fn release(&mut self) {
        self.released = true;
        self.notifications = None;

        // the outcome (not connected) already matches the intent, so failures are only logged
        match timeout(self.settings.release_deadline, self.transport.disconnect()).await {
            Err(_) => warn!("Disconnecting took too long; giving up on it"),
            Ok(Err(err)) => debug!("Ignoring error while disconnecting: {:?}", err),
            Ok(Ok(())) => {},
        }
    }

    async fn publish_state(&mut self) {
        let state = self.machine.state();
        let previous = self.state_tx.send_replace(state);

        if previous != state {
            self.send(DeviceEvent::StateChange(state)).await;
        }
    }

    async fn send(&mut self, event: DeviceEvent) {
        for sender in &mut self.senders {
            if let Err(err) = sender.send(event.clone()).await {
                debug!("Failed to send DeviceEvent: {:?}", err);
            }
        }
    }
}

async fn next_payload(notifications: Option<&mut NotificationStream>) -> Option<Vec<u8>> {
    match notifications {
        Some(stream) => stream.next().await,
        None => None,
    }
}
