use std::any::Any;
use std::io;
use thiserror::Error;
use msgbox::IconType;
use std::fmt::Display;
use std::str::Utf8Error;
use btleplug;
use iced;
use serde_json;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

impl ConfigError {
    pub fn is_file_not_found_error(&self) -> bool {
        match self {
            ConfigError::IOError { source } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (iced): {source}")]
    Iced { #[from] source: iced::Error },

    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },
}

/// Errors raised by a single call into the bluetooth stack.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("A required bluetooth characteristic is not available")]
    MissingCharacteristic,
}

/// Why a connection attempt or an established connection ended.
///
/// Every variant is terminal for the current connection: the state machine
/// resolves it to `Disconnected` and reports it once as connection-lost.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Bluetooth transport failure: {0}")]
    Btle(String),

    #[error("The peripheral does not offer the sensor service")]
    MissingService,

    #[error("The sensor service does not offer the notification characteristic")]
    MissingCharacteristic,

    #[error("The notification characteristic has no notification configuration descriptor")]
    MissingDescriptor,

    #[error("Connection setup did not complete in time")]
    SetupTimeout,

    #[error("The peripheral is no longer connected")]
    LinkLost,

    #[error("The notification stream ended")]
    StreamEnded,
}

impl From<DeviceError> for TransportError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::MissingCharacteristic => TransportError::MissingCharacteristic,
            DeviceError::Btle { source } => TransportError::Btle(source.to_string()),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Payload is not four comma separated decimal numbers")]
    Malformed,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawError {
    #[error("The drawing surface is no longer valid")]
    SurfaceInvalid,

    #[error("The drawing surface is busy")]
    Busy,

    #[error("The drawing surface is too large")]
    TooLarge,
}

/// A wait for the render thread to exit elapsed before the thread acknowledged.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Waiting for the render thread was interrupted")]
pub struct JoinInterrupted;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to spawn render thread: {source}")]
    Spawn { #[from] source: io::Error },
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Error while scanning (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapter is available")]
    NoAdapter,

    #[error("Not allowed to access bluetooth")]
    PermissionDenied,

    #[error("No matching peripheral found within {0} ms")]
    NotFound(u64),
}

pub fn readable_thread_panic_error(error: &Box<dyn Any + Send + 'static>) -> String {
    let mut stringified = String::from("???");

    if let Some(s) = error.downcast_ref::<&str>() {
        stringified = format!("{}", s);
    }
    else if let Some(s) = error.downcast_ref::<String>() {
        stringified = format!("{}", s);
    }
    let type_id = (**error).type_id();

    format!("panic from thread: [{:?}]: [{}]", type_id, stringified)
}

pub fn error_msgbox<T: Display>(message: &'static str, error: &T) {
    let message = format!("{}: {}", message, error);
    eprintln!("{}", &message);
    if let Err(err) = msgbox::create(concat!("blueIOT Viewer ", env!("CARGO_PKG_VERSION")), &message, IconType::Error) {
        eprintln!("Failed to create msgbox: {:?}", err);
    }
}
