use uuid::Uuid;

/**
 * How long (milliseconds) connecting, discovering services and enabling notifications may take in total.
 */
pub const SETUP_TIMEOUT: u64 = 10_000;

/**
 * How often (milliseconds) to check whether a streaming peripheral is still connected.
 */
pub const LINK_CHECK_INTERVAL: u64 = 1000;

/**
 * How long (milliseconds) checking if the peripheral is still connected may take
 */
pub const LINK_CHECK_DEADLINE: u64 = 2000;

/**
 * How long (milliseconds) releasing the transport may take before the connection is considered
 * gone anyway.
 */
pub const RELEASE_DEADLINE: u64 = 3000;

/**
 * Lower bound (milliseconds) for a configured setup timeout.
 */
pub const MIN_SETUP_TIMEOUT: u64 = 1000;

/**
 * How often (milliseconds) to look at the scan results again.
 */
pub const SCAN_POLL_DELAY: u64 = 500;

/**
 * How long (milliseconds) to scan for a matching peripheral before giving up.
 */
pub const SCAN_TIMEOUT: u64 = 15_000;

/**
 * The UUID of the blueIOT primary service
 */
pub const BLUEIOT_PRIMARY_SERVICE: &str = "06cce3a0-af8c-11e3-a5e2-0800200c9a66";

/**
 * The UUID of the characteristic that pushes "x, y, z, height" sensor lines.
 */
pub const BLUEIOT_NOTIFICATION_CHARACTERISTIC: &str = "06cce3a1-af8c-11e3-a5e2-0800200c9a66";

/**
 * The standard Client Characteristic Configuration descriptor.
 */
pub const CLIENT_CHARACTERISTIC_CONFIGURATION: &str = "00002902-0000-1000-8000-00805f9b34fb";

/**
 * Value written to the configuration descriptor to enable notifications.
 */
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/**
 * Address and name pattern of the sensor boards the viewer connects to by default.
 */
pub const DEFAULT_PERIPHERAL_ADDRESS: &str = "00:07:80:7F:A6:E0";
pub const DEFAULT_PERIPHERAL_NAME: &str = "iBeacon";

pub fn make_primary_service_uuid() -> Uuid {
    Uuid::parse_str(BLUEIOT_PRIMARY_SERVICE).unwrap()
}

pub fn make_notification_characteristic_uuid() -> Uuid {
    Uuid::parse_str(BLUEIOT_NOTIFICATION_CHARACTERISTIC).unwrap()
}

pub fn make_notification_descriptor_uuid() -> Uuid {
    Uuid::parse_str(CLIENT_CHARACTERISTIC_CONFIGURATION).unwrap()
}
