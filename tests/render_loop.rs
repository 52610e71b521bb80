mod common;

use std::thread;
use std::time::{Duration, Instant};
use blueiot_viewer::device::types::SensorSample;
use blueiot_viewer::render::render_loop::{self, RenderSettings};
use blueiot_viewer::render::scene::{paint_no_data, BALL};
use blueiot_viewer::render::slot::SampleSlot;
use blueiot_viewer::render::surface::{Canvas, RenderSurfaceSize};

use common::RecordingSurface;

fn fast_settings() -> RenderSettings {
    RenderSettings { frame_interval: Duration::from_millis(2) }
}

fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[test]
fn first_frame_shows_no_data() {
    let surface = RecordingSurface::new();
    let size = RenderSurfaceSize::new(64, 48);
    let handle = render_loop::start(surface.clone(), SampleSlot::new(), size, fast_settings()).unwrap();

    assert!(wait_until(|| surface.frame_count() >= 1));
    handle.stop();

    let mut expected = Canvas::new(size).unwrap();
    paint_no_data(&mut expected);
    assert_eq!(surface.frames()[0], expected);
}

#[test]
fn published_samples_are_drawn() {
    let surface = RecordingSurface::new();
    let samples = SampleSlot::new();
    let handle = render_loop::start(surface.clone(), samples.clone(), RenderSurfaceSize::new(120, 80), fast_settings()).unwrap();

    samples.publish(SensorSample { x: 0.0, y: 0.0, z: 9.81, height: 0.0 });
    // a level board keeps the ball in the middle of the play area
    assert!(wait_until(|| surface.last_frame().and_then(|frame| frame.pixel(46, 40)) == Some(BALL)));

    handle.stop();
}

#[test]
fn resize_applies_to_whole_frames() {
    let surface = RecordingSurface::new();
    let before = RenderSurfaceSize::new(64, 48);
    let after = RenderSurfaceSize::new(32, 32);
    let handle = render_loop::start(surface.clone(), SampleSlot::new(), before, fast_settings()).unwrap();

    assert!(wait_until(|| surface.frame_count() >= 1));
    handle.resize(after);
    assert_eq!(handle.size(), after);
    assert!(wait_until(|| surface.last_frame().map(|frame| frame.size()) == Some(after)));
    handle.stop();

    let sizes: Vec<RenderSurfaceSize> = surface.frames().iter().map(|frame| frame.size()).collect();
    assert!(sizes.iter().all(|size| *size == before || *size == after));

    // once the new size has been picked up the old one never comes back
    let first_after = sizes.iter().position(|size| *size == after).unwrap();
    assert!(sizes[first_after..].iter().all(|size| *size == after));
}

#[test]
fn nothing_is_drawn_after_stop() {
    let surface = RecordingSurface::new();
    let handle = render_loop::start(surface.clone(), SampleSlot::new(), RenderSurfaceSize::new(16, 16), fast_settings()).unwrap();

    assert!(wait_until(|| surface.frame_count() >= 3));
    assert!(handle.is_running());
    handle.stop();

    let frames = surface.frame_count();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(surface.frame_count(), frames);
}

#[test]
fn invalid_surface_skips_frames_until_stopped() {
    let surface = RecordingSurface::new();
    surface.invalidate();
    let handle = render_loop::start(surface.clone(), SampleSlot::new(), RenderSurfaceSize::new(16, 16), fast_settings()).unwrap();

    thread::sleep(Duration::from_millis(30));
    assert!(handle.is_running());
    handle.stop();

    assert_eq!(surface.frame_count(), 0);
}

#[test]
fn dropping_the_handle_stops_the_loop() {
    let surface = RecordingSurface::new();
    let handle = render_loop::start(surface.clone(), SampleSlot::new(), RenderSurfaceSize::new(16, 16), fast_settings()).unwrap();

    assert!(wait_until(|| surface.frame_count() >= 1));
    drop(handle);

    let frames = surface.frame_count();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(surface.frame_count(), frames);
}

#[test]
fn stop_outlasts_a_long_frame_pause() {
    let surface = RecordingSurface::new();
    let settings = RenderSettings { frame_interval: Duration::from_millis(250) };
    let handle = render_loop::start(surface.clone(), SampleSlot::new(), RenderSurfaceSize::new(16, 16), settings).unwrap();

    assert!(wait_until(|| surface.frame_count() >= 1));
    let started = Instant::now();
    handle.stop();

    // the thread was asleep between frames, so stop had to keep waiting for it
    assert!(started.elapsed() >= Duration::from_millis(100));

    let frames = surface.frame_count();
    thread::sleep(Duration::from_millis(400));
    assert_eq!(surface.frame_count(), frames);
}

#[test]
fn oversized_surface_skips_frames_until_resized() {
    let surface = RecordingSurface::new();
    let handle = render_loop::start(surface.clone(), SampleSlot::new(), RenderSurfaceSize::new(u32::MAX, u32::MAX), fast_settings()).unwrap();

    thread::sleep(Duration::from_millis(30));
    assert!(handle.is_running());
    assert_eq!(surface.frame_count(), 0);

    handle.resize(RenderSurfaceSize::new(16, 16));
    assert!(wait_until(|| surface.frame_count() >= 1));
    handle.stop();
}
