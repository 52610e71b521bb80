use clap::{Parser};
use log::info;
use msgbox::IconType;
use blueiot_viewer::{init_logging, run, RunOverrides};
use blueiot_viewer::error::{error_msgbox, AppRunError, ConfigError};

#[derive(Parser, Debug)]
#[command(author, version)]
#[command(about = "Shows the acceleration and height readings of a blueIOT sensor tag.\n\nExample: ./target/release/blueiot-viewer --address 00:07:80:7F:A6:E0", long_about = None)]
struct Args {
    /// Connect to the peripheral with this bluetooth address, instead of the configured one
    #[arg(long)]
    address: Option<String>,

    /// Connect to the first peripheral whose advertised name contains this text
    #[arg(long)]
    name: Option<String>,

    /// Log debug messages, such as the number of malformed frames
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), AppRunError> {
    let args = Args::parse();

    init_logging(if args.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info });
    info!(concat!("blueIOT Viewer ", env!("CARGO_PKG_VERSION")));

    let overrides = RunOverrides {
        address: args.address,
        name_contains: args.name,
    };

    match run(overrides) {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            msgbox::create(
                concat!("blueIOT Viewer ", env!("CARGO_PKG_VERSION")),
                "This application has already been started",
                IconType::Error,
            ).expect("Could not create msgbox");
            Ok(())
        },
        Err(err) => {
            error_msgbox("Unexpected error", &err);
            Err(err)
        }
        Ok(_) => Ok(())
    }
}
