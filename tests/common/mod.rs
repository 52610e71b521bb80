//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::future::{self, BoxFuture};
use futures::{FutureExt, StreamExt};
use blueiot_viewer::device::connection::SampleCallback;
use blueiot_viewer::device::transport::{NotificationStream, Transport};
use blueiot_viewer::device::types::{
    CapabilityTree, CharacteristicDescriptor, DeviceEvent, GattIds, NotificationDescriptor, PeripheralHandle,
    SensorSample, ServiceDescriptor,
};
use blueiot_viewer::error::{DeviceError, DrawError};
use blueiot_viewer::render::surface::{Canvas, DrawSurface, RenderSurfaceSize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    Succeed,
    Fail,
    Hang,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectBehavior {
    Succeed,
    Fail,
    Hang,
    // marks the link as down only after the delay
    Delay(Duration),
}

#[derive(Debug, Clone)]
pub struct MockBehavior {
    pub connect: ConnectBehavior,
    pub tree: CapabilityTree,
    pub enable_fails: bool,
    pub disconnect: DisconnectBehavior,
}

impl Default for MockBehavior {
    fn default() -> Self {
        MockBehavior {
            connect: ConnectBehavior::Succeed,
            tree: sensor_tree(),
            enable_fails: false,
            disconnect: DisconnectBehavior::Succeed,
        }
    }
}

struct MockInner {
    behavior: MockBehavior,
    payloads: Mutex<Option<UnboundedReceiver<Vec<u8>>>>,
    connected: AtomicBool,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

/// Scripted transport. Payloads pushed into the sender returned by [`MockTransport::new`] are
/// delivered as notifications once the connection streams.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

impl MockTransport {
    pub fn new(behavior: MockBehavior) -> (MockTransport, UnboundedSender<Vec<u8>>) {
        let (sender, receiver) = unbounded();
        let inner = MockInner {
            behavior,
            payloads: Mutex::new(Some(receiver)),
            connected: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        };

        (MockTransport { inner: Arc::new(inner) }, sender)
    }

    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.inner.disconnects.load(Ordering::SeqCst)
    }

    pub fn is_connected_now(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Makes the link check fail from now on.
    pub fn drop_link(&self) {
        self.inner.connected.store(false, Ordering::SeqCst);
    }
}

impl Transport for MockTransport {
    fn connect(&self) -> BoxFuture<'_, Result<(), DeviceError>> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);

        match self.inner.behavior.connect {
            ConnectBehavior::Succeed => {
                self.inner.connected.store(true, Ordering::SeqCst);
                future::ready(Ok(())).boxed()
            },
            ConnectBehavior::Fail => future::ready(Err(DeviceError::MissingCharacteristic)).boxed(),
            ConnectBehavior::Hang => future::pending().boxed(),
        }
    }

    fn discover(&self) -> BoxFuture<'_, Result<CapabilityTree, DeviceError>> {
        future::ready(Ok(self.inner.behavior.tree.clone())).boxed()
    }

    fn notifications<'a>(&'a self, _characteristic: &'a CharacteristicDescriptor) -> BoxFuture<'a, Result<NotificationStream, DeviceError>> {
        let receiver = self.inner.payloads.lock().unwrap().take();
        let stream: NotificationStream = match receiver {
            Some(receiver) => receiver.boxed(),
            // later connections get a stream that stays open without payloads
            None => futures::stream::pending().boxed(),
        };

        future::ready(Ok(stream)).boxed()
    }

    fn enable_notifications<'a>(
        &'a self,
        _characteristic: &'a CharacteristicDescriptor,
        _descriptor: &'a NotificationDescriptor,
    ) -> BoxFuture<'a, Result<(), DeviceError>> {
        if self.inner.behavior.enable_fails {
            future::ready(Err(DeviceError::MissingCharacteristic)).boxed()
        } else {
            future::ready(Ok(())).boxed()
        }
    }

    fn is_connected(&self) -> BoxFuture<'_, Result<bool, DeviceError>> {
        future::ready(Ok(self.inner.connected.load(Ordering::SeqCst))).boxed()
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<(), DeviceError>> {
        let behavior = self.inner.behavior.disconnect;

        async move {
            match behavior {
                DisconnectBehavior::Hang => future::pending::<()>().await,
                DisconnectBehavior::Delay(delay) => tokio::time::sleep(delay).await,
                DisconnectBehavior::Succeed | DisconnectBehavior::Fail => {},
            }

            self.inner.connected.store(false, Ordering::SeqCst);
            self.inner.disconnects.fetch_add(1, Ordering::SeqCst);

            if behavior == DisconnectBehavior::Fail {
                return Err(DeviceError::MissingCharacteristic);
            }
            Ok(())
        }.boxed()
    }
}

pub fn sensor_tree() -> CapabilityTree {
    let ids = GattIds::default();

    CapabilityTree {
        services: vec![ServiceDescriptor {
            uuid: ids.service,
            characteristics: vec![CharacteristicDescriptor {
                uuid: ids.characteristic,
                service: ids.service,
                descriptors: vec![NotificationDescriptor { uuid: ids.descriptor }],
            }],
        }],
    }
}

pub fn peripheral(address: &str) -> PeripheralHandle {
    PeripheralHandle {
        id: address.to_string(),
        address: address.to_string(),
        name: Some("iBeacon".to_string()),
    }
}

/// Collects every sample handed to its callback.
#[derive(Clone, Default)]
pub struct SampleRecorder {
    samples: Arc<Mutex<Vec<SensorSample>>>,
}

impl SampleRecorder {
    pub fn callback(&self) -> SampleCallback {
        let samples = self.samples.clone();
        Arc::new(move |sample| samples.lock().unwrap().push(sample))
    }

    pub fn samples(&self) -> Vec<SensorSample> {
        self.samples.lock().unwrap().clone()
    }
}

/// Polls `condition`, letting the (possibly paused) clock advance between attempts.
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    condition()
}

/// Receives events until the first connection-lost event and returns everything received.
pub async fn until_loss(events: &mut futures::channel::mpsc::Receiver<DeviceEvent>) -> Vec<DeviceEvent> {
    let mut received = Vec::new();
    while let Some(event) = events.next().await {
        let lost = matches!(event, DeviceEvent::ConnectionLost(_));
        received.push(event);
        if lost {
            break;
        }
    }
    received
}

pub fn drain(events: &mut futures::channel::mpsc::Receiver<DeviceEvent>) -> Vec<DeviceEvent> {
    let mut drained = Vec::new();
    while let Ok(Some(event)) = events.try_next() {
        drained.push(event);
    }
    drained
}

#[derive(Default)]
struct RecordingInner {
    valid: bool,
    frames: Vec<Canvas>,
}

/// Surface that keeps a copy of every posted frame.
#[derive(Clone)]
pub struct RecordingSurface {
    inner: Arc<Mutex<RecordingInner>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        RecordingSurface {
            inner: Arc::new(Mutex::new(RecordingInner { valid: true, frames: Vec::new() })),
        }
    }

    pub fn invalidate(&self) {
        self.inner.lock().unwrap().valid = false;
    }

    pub fn frame_count(&self) -> usize {
        self.inner.lock().unwrap().frames.len()
    }

    pub fn frames(&self) -> Vec<Canvas> {
        self.inner.lock().unwrap().frames.clone()
    }

    pub fn last_frame(&self) -> Option<Canvas> {
        self.inner.lock().unwrap().frames.last().cloned()
    }
}

impl DrawSurface for RecordingSurface {
    fn lock_canvas(&mut self, size: RenderSurfaceSize) -> Result<Canvas, DrawError> {
        if !self.inner.lock().unwrap().valid {
            return Err(DrawError::SurfaceInvalid);
        }
        Canvas::new(size)
    }

    fn unlock_canvas_and_post(&mut self, canvas: Canvas) -> Result<(), DrawError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.valid {
            return Err(DrawError::SurfaceInvalid);
        }
        inner.frames.push(canvas);
        Ok(())
    }
}
