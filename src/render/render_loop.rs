use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use log::{debug, info, trace, warn};

use crate::error::{readable_thread_panic_error, DrawError, JoinInterrupted, RenderError};
use crate::render::scene::Scene;
use crate::render::slot::SampleSlot;
use crate::render::surface::{DrawSurface, RenderSurfaceSize, SharedSurfaceSize};

/**
 * Target pause (milliseconds) between two frames.
 */
pub const FRAME_INTERVAL: u64 = 16;

/**
 * How long (milliseconds) `stop` waits for the exit acknowledgement before it retries.
 */
const STOP_WAIT_SLICE: u64 = 100;

#[derive(Debug, Clone, Copy)]
pub struct RenderSettings {
    pub frame_interval: Duration,
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings { frame_interval: Duration::from_millis(FRAME_INTERVAL) }
    }
}

/// Keeps the render thread drawing while set.
#[derive(Debug, Clone)]
pub struct RunFlag {
    running: Arc<AtomicBool>,
}

impl RunFlag {
    pub fn new(running: bool) -> Self {
        RunFlag { running: Arc::new(AtomicBool::new(running)) }
    }

    pub fn set(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Owns a running render thread. Dropping the handle stops the thread.
pub struct LoopHandle {
    run: RunFlag,
    size: SharedSurfaceSize,
    exited: Receiver<()>,
    thread: Option<JoinHandle<()>>,
}

/// Spawns the render thread for `surface`. The thread owns the surface until [`LoopHandle::stop`].
pub fn start<S: DrawSurface>(surface: S, samples: SampleSlot, size: RenderSurfaceSize, settings: RenderSettings) -> Result<LoopHandle, RenderError> {
    let run = RunFlag::new(true);
    let shared_size = SharedSurfaceSize::new(size);
    let (exit_tx, exit_rx) = channel::<()>();

    let thread = {
        let run = run.clone();
        let shared_size = shared_size.clone();

        thread::Builder::new()
            .name("render-loop".to_string())
            .spawn(move || render_thread(surface, samples, run, shared_size, settings, exit_tx))?
    };

    info!("Render loop started ({}x{})", size.width, size.height);
    Ok(LoopHandle {
        run,
        size: shared_size,
        exited: exit_rx,
        thread: Some(thread),
    })
}

impl LoopHandle {
    /// The new size is picked up by the next frame; a frame in progress keeps the old one.
    pub fn resize(&self, size: RenderSurfaceSize) {
        debug!("Render surface resized to {}x{}", size.width, size.height);
        self.size.store(size);
    }

    pub fn size(&self) -> RenderSurfaceSize {
        self.size.load()
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map(|thread| !thread.is_finished()).unwrap_or(false)
    }

    /// Stops the render thread and blocks until it has exited. The surface may be torn down
    /// as soon as this returns.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn wait_for_exit(&self, slice: Duration) -> Result<(), JoinInterrupted> {
        match self.exited.recv_timeout(slice) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => Ok(()),
            Err(RecvTimeoutError::Timeout) => Err(JoinInterrupted),
        }
    }

    fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        self.run.set(false);

        let mut retries: u32 = 0;
        while let Err(err) = self.wait_for_exit(Duration::from_millis(STOP_WAIT_SLICE)) {
            retries += 1;
            debug!("{} ({} times); waiting again", err, retries);
        }

        if let Err(err) = thread.join() {
            warn!("Render thread failed: {}", readable_thread_panic_error(&err));
        }

        info!("Render loop stopped");
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn draw_frame<S: DrawSurface>(surface: &mut S, size: RenderSurfaceSize, scene: &mut Scene, samples: &SampleSlot, elapsed: Duration) -> Result<(), DrawError> {
    let mut canvas = surface.lock_canvas(size)?;
    scene.paint(&mut canvas, samples.latest(), elapsed);
    surface.unlock_canvas_and_post(canvas)
}

fn render_thread<S: DrawSurface>(
    mut surface: S,
    samples: SampleSlot,
    run: RunFlag,
    size: SharedSurfaceSize,
    settings: RenderSettings,
    // dropped when this function returns or unwinds, which is what `stop` waits for
    exited: Sender<()>,
) {
    let mut scene = Scene::new();
    let mut previous_frame = Instant::now();
    let mut drawn: u64 = 0;
    let mut skipped: u64 = 0;

    while run.is_running() {
        let now = Instant::now();
        let elapsed = now - previous_frame;
        previous_frame = now;

        match draw_frame(&mut surface, size.load(), &mut scene, &samples, elapsed) {
            Ok(()) => drawn += 1,
            Err(err) => {
                skipped += 1;
                trace!("Skipping frame: {}", err);
            },
        }

        thread::sleep(settings.frame_interval);
    }

    debug!("Render thread exiting: {} frames drawn, {} skipped", drawn, skipped);
    let _ = exited.send(());
}
