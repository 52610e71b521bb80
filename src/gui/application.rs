use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use futures::channel::mpsc::{channel, Receiver, Sender};
use futures::{SinkExt, StreamExt};
use iced::{Alignment, Application, Command, Element, Length, Settings, Size, Subscription, subscription, window};
use iced::event::{self, Event};
use iced::theme::Theme;
use iced::time::{every as iced_time_every};
use iced::widget::{button, column, container, image, row, text};
use log::{error, info, warn};

use crate::config::io::ConfigIO;
use crate::config::types::Config;
use crate::device::scan::scan_for_peripheral;
use crate::device::transport::BtleTransport;
use crate::device::types::{ConnectionState, DeviceEvent};
use crate::error::{AppRunError, ScanError};
use crate::gui::types::Message;
use crate::lifecycle::LifecycleCoordinator;
use crate::render::surface::{FramebufferSurface, RenderSurfaceSize};
use crate::RunOverrides;

// how often the window picks up the latest posted frame
const DISPLAY_INTERVAL: u64 = 33;
// height reserved below the surface for the status row
const STATUS_BAR_HEIGHT: u32 = 48;
const INITIAL_WINDOW_WIDTH: u32 = 640;
const INITIAL_WINDOW_HEIGHT: u32 = 560;

fn surface_size_for_window(width: u32, height: u32) -> RenderSurfaceSize {
    RenderSurfaceSize::new(width, height.saturating_sub(STATUS_BAR_HEIGHT))
}

type DeviceEventReceiver = Arc<Mutex<Option<Receiver<DeviceEvent>>>>;

// Forwards the events of every connection made by the coordinator into the iced runtime. The
// receiver is taken exactly once; iced keeps the subscription alive for as long as its id is
// returned from `subscription()`.
fn device_event_subscription(receiver: DeviceEventReceiver) -> Subscription<DeviceEvent> {
    struct DeviceEvents;

    subscription::channel(
        std::any::TypeId::of::<DeviceEvents>(),
        64,
        move |mut output| async move {
            let receiver = receiver.lock().expect("Failed to lock device event receiver").take();

            if let Some(mut receiver) = receiver {
                while let Some(event) = receiver.next().await {
                    if output.send(event).await.is_err() {
                        break;
                    }
                }
            }

            futures::future::pending::<Infallible>().await
        },
    )
}

pub struct ApplicationFlags {
    config_io: ConfigIO,
    overrides: RunOverrides,
}

pub struct ViewerApplication {
    // messages that the user must click away
    notices: Vec<String>,

    config_io: ConfigIO,
    overrides: RunOverrides,
    config: Option<Config>,

    // None until the config has been loaded
    coordinator: Option<LifecycleCoordinator<BtleTransport>>,
    device_event_sender: Sender<DeviceEvent>,
    device_event_receiver: DeviceEventReceiver,

    surface: FramebufferSurface,
    surface_size: RenderSurfaceSize,
    frame: Option<(u64, image::Handle)>,

    scanning: bool,
    paused: bool,
    closing: bool,
    lost_reason: Option<String>,
    status: String,
}

impl ViewerApplication {
    fn load_config(&self) -> Command<Message> {
        let config_io = self.config_io.clone();

        let fut = async move {
            let (config, error_message) = match config_io.read().await {
                Ok(config) => (config, None),
                Err(err) => {
                    let mut error_message: Option<String> = None;

                    if err.is_file_not_found_error() {
                        info!("Config file not found, using defaults");
                    } else {
                        error!("Failed to load config: {:?}", &err);
                        error_message = Some(format!("Failed to load config: {}", &err));
                    }
                    (Config::default(), error_message)
                }
            };

            // writes the defaults on first start and fills in fields added since the file was written
            if error_message.is_none() {
                if let Err(err) = config_io.save(&config).await {
                    warn!("Failed to save config: {:?}", &err);
                }
            }

            (config, error_message)
        };

        Command::perform(fut, Message::ConfigLoadComplete)
    }

    fn start_scan(&mut self) -> Command<Message> {
        let Some(config) = &self.config else {
            return Command::none();
        };

        let mut filter = config.peripheral.clone();
        self.overrides.apply(&mut filter);
        let scan_timeout = config.scan_timeout();

        self.scanning = true;
        self.status = "Scanning…".to_string();

        let fut = async move {
            scan_for_peripheral(&filter, scan_timeout).await.map_err(|err| {
                error!("Scan failed: {:?}", &err);
                match err {
                    ScanError::PermissionDenied => "Not allowed to access Bluetooth!".to_string(),
                    err => err.to_string(),
                }
            })
        };

        Command::perform(fut, Message::ScanComplete)
    }

    fn connect(&mut self) {
        self.lost_reason = None;
        if let Some(coordinator) = &mut self.coordinator {
            if let Some(handle) = coordinator.consumer_visible() {
                info!("Connecting to {}", handle.peripheral());
            }
        }
    }

    fn disconnect(&mut self) -> Option<impl std::future::Future<Output = ()> + Send + 'static> {
        self.coordinator.as_mut().map(|coordinator| coordinator.consumer_hidden())
    }

    fn refresh_frame(&mut self) {
        let Some((generation, canvas)) = self.surface.front() else {
            return;
        };

        if let Some((current, _)) = &self.frame {
            if *current == generation {
                return;
            }
        }

        let size = canvas.size();
        self.frame = Some((generation, image::Handle::from_pixels(size.width, size.height, canvas.into_pixels())));
    }

    fn refresh_status(&mut self) {
        if self.scanning {
            return;
        }

        if let Some(coordinator) = &self.coordinator {
            if let Some(peripheral) = coordinator.peripheral() {
                let state = coordinator.connection_state();
                self.status = match (&self.lost_reason, state) {
                    (Some(reason), ConnectionState::Disconnected) => format!("{}: Connection lost ({})", peripheral, reason),
                    _ => format!("{}: {}", peripheral, state),
                };
            }
        }
    }
}

impl Application for ViewerApplication {
    type Executor = iced::executor::Default;
    type Message = Message;
    type Theme = Theme;
    type Flags = ApplicationFlags;

    fn new(flags: ApplicationFlags) -> (ViewerApplication, Command<Self::Message>) {
        let (device_event_sender, device_event_receiver) = channel(64);

        let app = ViewerApplication {
            notices: Vec::new(),
            config_io: flags.config_io,
            overrides: flags.overrides,
            config: None,
            coordinator: None,
            device_event_sender,
            device_event_receiver: Arc::new(Mutex::new(Some(device_event_receiver))),
            surface: FramebufferSurface::new(),
            surface_size: surface_size_for_window(INITIAL_WINDOW_WIDTH, INITIAL_WINDOW_HEIGHT),
            frame: None,
            scanning: false,
            paused: false,
            closing: false,
            lost_reason: None,
            status: "Loading…".to_string(),
        };

        let command = app.load_config();
        (app, command)
    }

    fn title(&self) -> String {
        String::from(concat!("blueIOT Viewer ", env!("CARGO_PKG_VERSION")))
    }

    fn update(&mut self, message: Message) -> Command<Self::Message> {
        match message {
            Message::ConfigLoadComplete((config, error_message)) => {
                info!("Config load complete");
                if let Some(error_message) = error_message {
                    self.notices.push(error_message);
                }

                let mut coordinator = LifecycleCoordinator::new(
                    config.connection_settings(),
                    config.render_settings(),
                    vec![self.device_event_sender.clone()],
                );

                if let Err(err) = coordinator.surface_created(self.surface.clone(), self.surface_size) {
                    error!("Failed to start render loop: {:?}", &err);
                    self.notices.push(format!("Failed to start rendering: {}", &err));
                }

                self.coordinator = Some(coordinator);
                self.config = Some(config);
                return self.start_scan();
            },
            Message::ScanComplete(result) => {
                self.scanning = false;

                match result {
                    Ok((peripheral, transport)) => {
                        if let Some(coordinator) = &mut self.coordinator {
                            coordinator.set_peripheral(peripheral, transport);
                        }

                        if !self.paused && !self.closing {
                            self.connect();
                        }
                        self.refresh_status();
                    },
                    Err(message) => {
                        self.status = message;
                    },
                }
            },
            Message::Rescan => {
                if !self.scanning {
                    let disconnect = self.disconnect();
                    let scan = self.start_scan();

                    return match disconnect {
                        Some(disconnect) => Command::batch(vec![
                            Command::perform(disconnect, Message::Disconnected),
                            scan,
                        ]),
                        None => scan,
                    };
                }
            },
            Message::TogglePause => {
                if self.paused {
                    self.paused = false;
                    self.connect();
                    self.refresh_status();
                } else {
                    self.paused = true;
                    if let Some(disconnect) = self.disconnect() {
                        return Command::perform(disconnect, Message::Disconnected);
                    }
                }
            },
            Message::Disconnected(()) => {
                info!("Disconnected");
                self.refresh_status();
            },
            Message::DeviceEvent(DeviceEvent::StateChange(state)) => {
                info!("Connection state is now {}", state);
                self.refresh_status();
            },
            Message::DeviceEvent(DeviceEvent::ConnectionLost(reason)) => {
                warn!("Connection lost: {}", reason);
                // the user decides when to reconnect
                self.paused = true;
                self.lost_reason = Some(reason.to_string());
                self.refresh_status();
                if let Some(disconnect) = self.disconnect() {
                    return Command::perform(disconnect, Message::Disconnected);
                }
            },
            Message::Tick => {
                self.refresh_frame();
            },
            Message::NoticeConfirmed => {
                if !self.notices.is_empty() {
                    self.notices.remove(0);
                }
            },
            Message::EventOccurred(Event::Window(_, window::Event::Resized { width, height })) => {
                self.surface_size = surface_size_for_window(width, height);
                if let Some(coordinator) = &mut self.coordinator {
                    coordinator.surface_resized(self.surface_size);
                }
            },
            Message::EventOccurred(Event::Window(id, window::Event::CloseRequested)) => {
                info!("Close requested");
                self.closing = true;

                // the surface goes first so nothing draws into a closing window
                if let Some(coordinator) = &mut self.coordinator {
                    coordinator.surface_destroyed();
                }
                self.surface.invalidate();

                if let Some(disconnect) = self.disconnect() {
                    return Command::perform(disconnect, move |_| Message::CloseReady(id));
                }
                return window::close(id);
            },
            Message::CloseReady(id) => {
                return window::close(id);
            },

            _ => {}
        }

        Command::none()
    }

    fn subscription(&self) -> Subscription<Message> {
        Subscription::batch([
            event::listen().map(Message::EventOccurred),
            iced_time_every(Duration::from_millis(DISPLAY_INTERVAL)).map(|_| Message::Tick),
            device_event_subscription(self.device_event_receiver.clone()).map(Message::DeviceEvent),
        ])
    }

    fn view(&self) -> Element<Message> {
        if let Some(notice) = self.notices.first() {
            return container(
                column![
                    text(notice),

                    button(text("Okay"))
                        .on_press(Message::NoticeConfirmed),

                ].align_items(Alignment::Center).spacing(20),
            )
            .width(Length::Fill)
            .padding(20)
            .into()
        }

        let surface: Element<Message> = match &self.frame {
            Some((_, handle)) => image(handle.clone())
                .width(Length::Fill)
                .height(Length::Fill)
                .into(),
            None => container(text("Loading…"))
                .width(Length::Fill)
                .height(Length::Fill)
                .center_x()
                .center_y()
                .into(),
        };

        let mut toggle_button = button(text(if self.paused { "Resume" } else { "Pause" }));
        let mut rescan_button = button(text("Rescan"));

        if !self.scanning && !self.closing {
            toggle_button = toggle_button.on_press(Message::TogglePause);
            rescan_button = rescan_button.on_press(Message::Rescan);
        }

        column![
            surface,

            row![
                text(&self.status).width(Length::Fill),
                toggle_button,
                rescan_button,
            ]
                .spacing(10)
                .padding(8)
                .height(STATUS_BAR_HEIGHT as f32)
                .align_items(Alignment::Center),
        ]
        .into()
    }
}

pub fn run_application(overrides: RunOverrides) -> Result<(), AppRunError> {
    let config_io = ConfigIO::new_sync()?;
    let mut config_locker = config_io.locker()?;
    let _lock_guard = config_locker.lock()?;

    let flags = ApplicationFlags { config_io, overrides };
    let mut settings = Settings::with_flags(flags);

    // handle exits ourselves (Event::CloseRequested)
    settings.id = Some("blueiot-viewer".to_string());
    settings.window.exit_on_close_request = false;
    settings.window.size = Size::new(INITIAL_WINDOW_WIDTH as f32, INITIAL_WINDOW_HEIGHT as f32);
    settings.window.min_size = Some(Size::new(240.0, 240.0));

    // this function will call process::exit() unless there was a startup error
    ViewerApplication::run(settings)?;
    Ok(())
}
