mod common;

use std::thread;
use std::time::Duration;
use futures::channel::mpsc::channel;
use blueiot_viewer::device::connection::ConnectionSettings;
use blueiot_viewer::device::types::{ConnectionState, DeviceEvent, SensorSample};
use blueiot_viewer::lifecycle::LifecycleCoordinator;
use blueiot_viewer::render::render_loop::RenderSettings;
use blueiot_viewer::render::scene::BALL;
use blueiot_viewer::render::surface::RenderSurfaceSize;

use common::{drain, eventually, peripheral, DisconnectBehavior, MockBehavior, MockTransport, RecordingSurface};

fn coordinator() -> LifecycleCoordinator<MockTransport> {
    LifecycleCoordinator::new(
        ConnectionSettings::default(),
        RenderSettings { frame_interval: Duration::from_millis(2) },
        vec![],
    )
}

fn wait_for_frames(surface: &RecordingSurface, count: usize) -> bool {
    for _ in 0..2500 {
        if surface.frame_count() >= count {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn surface_events_start_and_stop_rendering() {
    let mut coordinator = coordinator();
    let surface = RecordingSurface::new();
    assert!(!coordinator.is_rendering());

    coordinator.surface_created(surface.clone(), RenderSurfaceSize::new(32, 32)).unwrap();
    assert!(coordinator.is_rendering());
    assert!(wait_for_frames(&surface, 1));

    coordinator.surface_resized(RenderSurfaceSize::new(24, 16));
    coordinator.surface_destroyed();
    assert!(!coordinator.is_rendering());

    let frames = surface.frame_count();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(surface.frame_count(), frames);
}

#[test]
fn new_surface_replaces_the_previous_loop() {
    let mut coordinator = coordinator();
    let first = RecordingSurface::new();
    let second = RecordingSurface::new();

    coordinator.surface_created(first.clone(), RenderSurfaceSize::new(16, 16)).unwrap();
    assert!(wait_for_frames(&first, 1));
    coordinator.surface_created(second.clone(), RenderSurfaceSize::new(16, 16)).unwrap();

    // the first loop has been joined before the second one started
    let frames = first.frame_count();
    assert!(wait_for_frames(&second, 3));
    assert_eq!(first.frame_count(), frames);

    coordinator.surface_destroyed();
}

#[test]
fn resize_and_destroy_without_surface_are_ignored() {
    let mut coordinator = coordinator();
    coordinator.surface_resized(RenderSurfaceSize::new(10, 10));
    coordinator.surface_destroyed();
    assert!(!coordinator.is_rendering());
}

#[tokio::test(start_paused = true)]
async fn visible_without_peripheral_does_nothing() {
    let mut coordinator = coordinator();
    assert!(coordinator.consumer_visible().is_none());
    assert_eq!(coordinator.connection_state(), ConnectionState::Disconnected);

    // hiding with nothing connected resolves right away
    coordinator.consumer_hidden().await;
}

#[tokio::test(start_paused = true)]
async fn visibility_connects_and_disconnects() {
    let mut coordinator = coordinator();
    let (transport, payloads) = MockTransport::new(MockBehavior::default());
    coordinator.set_peripheral(peripheral("00:07:80:7F:A6:E0"), transport.clone());
    assert_eq!(coordinator.peripheral(), Some(&peripheral("00:07:80:7F:A6:E0")));

    // a reading left over from an earlier connection is not shown
    coordinator.samples().publish(SensorSample { x: 9.0, y: 9.0, z: 9.0, height: 9.0 });

    let mut handle = coordinator.consumer_visible().unwrap();
    assert_eq!(coordinator.samples().latest(), None);
    handle.wait_for(|state| state == ConnectionState::Streaming).await;

    payloads.unbounded_send(b"1,2,3,4".to_vec()).unwrap();
    let samples = coordinator.samples().clone();
    assert!(eventually(|| samples.latest() == Some(SensorSample { x: 1.0, y: 2.0, z: 3.0, height: 4.0 })).await);

    // visible again while streaming keeps the same connection
    assert_eq!(coordinator.consumer_visible(), Some(handle.clone()));
    assert_eq!(transport.connects(), 1);

    coordinator.consumer_hidden().await;
    assert_eq!(handle.state(), ConnectionState::Disconnected);
    assert_eq!(coordinator.connection_state(), ConnectionState::Disconnected);
    assert_eq!(transport.disconnects(), 1);
}

#[tokio::test(start_paused = true)]
async fn failing_disconnect_still_completes_hiding() {
    let (sender, mut events) = channel(64);
    let mut coordinator: LifecycleCoordinator<MockTransport> = LifecycleCoordinator::new(
        ConnectionSettings::default(),
        RenderSettings::default(),
        vec![sender],
    );
    let behavior = MockBehavior { disconnect: DisconnectBehavior::Fail, ..MockBehavior::default() };
    let (transport, _payloads) = MockTransport::new(behavior);
    coordinator.set_peripheral(peripheral("00:07:80:7F:A6:E0"), transport.clone());

    let mut handle = coordinator.consumer_visible().unwrap();
    handle.wait_for(|state| state == ConnectionState::Streaming).await;

    coordinator.consumer_hidden().await;
    assert_eq!(handle.state(), ConnectionState::Disconnected);
    assert_eq!(coordinator.connection_state(), ConnectionState::Disconnected);
    assert_eq!(transport.disconnects(), 1);

    let events = drain(&mut events);
    assert!(!events.iter().any(|event| matches!(event, DeviceEvent::ConnectionLost(_))));
    assert!(matches!(events.last(), Some(DeviceEvent::StateChange(ConnectionState::Disconnected))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn samples_reach_the_screen() {
    let mut coordinator = coordinator();
    let surface = RecordingSurface::new();
    let (transport, payloads) = MockTransport::new(MockBehavior::default());

    coordinator.surface_created(surface.clone(), RenderSurfaceSize::new(120, 80)).unwrap();
    coordinator.set_peripheral(peripheral("00:07:80:7F:A6:E0"), transport);

    let mut handle = coordinator.consumer_visible().unwrap();
    handle.wait_for(|state| state == ConnectionState::Streaming).await;
    payloads.unbounded_send(b"0.0,0.0,9.81,0.0".to_vec()).unwrap();

    // a level board keeps the ball in the middle of the play area
    let drawn = eventually(|| surface.last_frame().and_then(|frame| frame.pixel(46, 40)) == Some(BALL)).await;
    assert!(drawn);

    coordinator.consumer_hidden().await;
    coordinator.surface_destroyed();
}
