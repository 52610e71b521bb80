use iced::{window, Event};

use crate::config::types::Config;
use crate::device::transport::BtleTransport;
use crate::device::types::{DeviceEvent, PeripheralHandle};

#[derive(Debug, Clone)]
pub enum Message {
    EventOccurred(Event),
    ConfigLoadComplete((Config, Option<String>)),
    ScanComplete(Result<(PeripheralHandle, BtleTransport), String>),
    DeviceEvent(DeviceEvent),
    Tick,
    TogglePause,
    Rescan,
    NoticeConfirmed,
    Disconnected(()),
    CloseReady(window::Id),
}
