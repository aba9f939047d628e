//! BLE GATT Service Protocol Constants for Loop Tracks Indicators
//!
//! The indicator exposes one custom service with a Nordic-UART style pair of
//! characteristics: the app writes commands to TX and reads acknowledgements
//! from RX.

/// BLE Service UUID, advertised so the app can pick out Loop Tracks devices
pub const SERVICE_UUID: &str = "a73ba101-8192-4a51-b42d-ae9cd14b14a5";

/// TX Characteristic UUID (write without response)
pub const TX_UUID: &str = "6e400002-b5a3-f393-e0a9-e50e24dcca9e";

/// RX Characteristic UUID (read/notify)
pub const RX_UUID: &str = "6e400003-b5a3-f393-e0a9-e50e24dcca9e";

/// Command keys, the part before the `:` on the wire
pub mod keys {
    /// Wi-Fi credentials, value is `<ssid>,<password>`
    pub const WIFI: &str = "wifi";

    /// Transit system selection
    pub const CITY: &str = "city";

    /// Indicator line color
    pub const COLOR: &str = "color";

    /// Bare reset command, carries no value
    pub const RESET: &str = "reset";
}

/// Separator between a command key and its value
pub const KEY_SEPARATOR: char = ':';

/// Separator between SSID and password in the Wi-Fi value
pub const VALUE_SEPARATOR: char = ',';
