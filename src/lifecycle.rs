//! Glue between the hosting environment and the core.
//!
//! Surface events start and stop the render loop; visibility events connect
//! and disconnect the peripheral. Samples flow from the connection into the
//! shared [`SampleSlot`] and are pulled from there by the render thread.

use std::future::Future;
use std::sync::Arc;
use futures::channel::mpsc::Sender;
use log::{debug, info};

use crate::device::connection::{ConnectionHandle, ConnectionManager, ConnectionSettings};
use crate::device::transport::Transport;
use crate::device::types::{ConnectionState, DeviceEvent, PeripheralHandle};
use crate::error::RenderError;
use crate::render::render_loop::{self, LoopHandle, RenderSettings};
use crate::render::slot::SampleSlot;
use crate::render::surface::{DrawSurface, RenderSurfaceSize};

pub struct LifecycleCoordinator<T: Transport + Clone> {
    samples: SampleSlot,
    render_settings: RenderSettings,
    render: Option<LoopHandle>,
    connections: ConnectionManager,
    target: Option<(PeripheralHandle, T)>,
    connection: Option<ConnectionHandle>,
}

impl<T: Transport + Clone> LifecycleCoordinator<T> {
    pub fn new(connection_settings: ConnectionSettings, render_settings: RenderSettings, senders: Vec<Sender<DeviceEvent>>) -> Self {
        LifecycleCoordinator {
            samples: SampleSlot::new(),
            render_settings,
            render: None,
            connections: ConnectionManager::new(connection_settings, senders),
            target: None,
            connection: None,
        }
    }

    pub fn samples(&self) -> &SampleSlot {
        &self.samples
    }

    /// A drawing surface became available. Any render loop tied to an earlier surface is
    /// stopped and joined before the new one starts.
    pub fn surface_created<S: DrawSurface>(&mut self, surface: S, size: RenderSurfaceSize) -> Result<(), RenderError> {
        if let Some(previous) = self.render.take() {
            debug!("Surface created while a render loop is still running; stopping it first");
            previous.stop();
        }

        self.render = Some(render_loop::start(surface, self.samples.clone(), size, self.render_settings)?);
        Ok(())
    }

    pub fn surface_resized(&mut self, size: RenderSurfaceSize) {
        match &self.render {
            Some(render) => render.resize(size),
            None => debug!("Ignoring resize to {}x{} without a surface", size.width, size.height),
        }
    }

    /// The surface is about to go away. Returns only after the render thread has exited.
    pub fn surface_destroyed(&mut self) {
        if let Some(render) = self.render.take() {
            render.stop();
        }
    }

    pub fn is_rendering(&self) -> bool {
        self.render.is_some()
    }

    /// Sets the peripheral to connect to the next time the consumer becomes visible.
    pub fn set_peripheral(&mut self, peripheral: PeripheralHandle, transport: T) {
        info!("Target peripheral is {}", peripheral);
        self.target = Some((peripheral, transport));
    }

    pub fn peripheral(&self) -> Option<&PeripheralHandle> {
        self.target.as_ref().map(|(peripheral, _)| peripheral)
    }

    /// The consumer of the samples is visible: connect to the target peripheral.
    /// Returns `None` if no peripheral has been set.
    pub fn consumer_visible(&mut self) -> Option<ConnectionHandle> {
        let (peripheral, transport) = self.target.clone()?;

        if let Some(connection) = &self.connection {
            if connection.peripheral() == &peripheral && connection.state().is_active() {
                return Some(connection.clone());
            }
        }

        // a fresh connection starts from "no data" rather than a stale reading
        self.samples.clear();

        let samples = self.samples.clone();
        let handle = self.connections.connect(peripheral, transport, Arc::new(move |sample| samples.publish(sample)));
        self.connection = Some(handle.clone());
        Some(handle)
    }

    /// The consumer is gone: disconnect. The disconnect is best effort; transport errors while
    /// disconnecting are swallowed since not being connected is what was asked for.
    pub fn consumer_hidden(&mut self) -> impl Future<Output = ()> + Send + 'static {
        let disconnect = self.connection.take().map(|handle| self.connections.disconnect(&handle));

        async move {
            if let Some(disconnect) = disconnect {
                disconnect.await;
            }
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connections.state()
    }
}
