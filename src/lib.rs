use std::env;
use crate::config::types::PeripheralFilter;
use crate::gui::application::run_application;
use crate::error::AppRunError;

pub mod config;
pub mod device;
pub mod error;
pub mod gui;
pub mod lifecycle;
pub mod render;

pub fn init_logging(level: log::LevelFilter) {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Warn)
        .level_for("blueiot_viewer", level)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(
            fern::log_file(log_file).expect("Failed to open LOG_FILE")
        );
    }

    dispatch.apply().expect("Failed to initialize logger");
}

/// Settings given on the command line; they take precedence over the config file for one run.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub address: Option<String>,
    pub name_contains: Option<String>,
}

impl RunOverrides {
    pub fn apply(&self, filter: &mut PeripheralFilter) {
        if self.address.is_none() && self.name_contains.is_none() {
            return;
        }

        // an explicit selection replaces the configured one entirely
        filter.address = self.address.clone();
        filter.name_contains = self.name_contains.clone();
    }
}

pub fn run(overrides: RunOverrides) -> Result<(), AppRunError> {
    run_application(overrides)?;
    Ok(())
}
