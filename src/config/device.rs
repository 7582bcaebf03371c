//! Typed form of the picture-frame client's `config.h`.
//!
//! The server validates the profile at start-up, sizes its frames from the
//! display section and can regenerate the header for the firmware build.

use crate::core::bitmap::EPBM_HEADER_LEN;
use crate::utils::error::{FrameError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;

/// Highest GPIO number on the ESP32-S3.
pub const MAX_GPIO: u8 = 48;
pub const MIN_SLEEP_SECONDS: u32 = 60;
pub const STANDARD_BAUD_RATES: [u32; 11] = [
    9600, 19200, 38400, 57600, 74880, 115200, 230400, 460800, 921600, 1_500_000, 2_000_000,
];
const MAX_UTC_OFFSET_SECONDS: i32 = 14 * 3600;
const MAX_DST_OFFSET_SECONDS: i32 = 2 * 3600;
const MIN_STREAM_CHUNK: usize = 512;
const MAX_STREAM_CHUNK: usize = 65536;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub server_host: String,
    pub server_port: u16,
    pub image_endpoint: String,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            server_host: "pidev.local".to_string(),
            server_port: 8080,
            image_endpoint: "test.png".to_string(),
        }
    }
}

/// 7.3" six-colour panel on the GxEPD2_730c_GDEP073E01 driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayPins {
    pub width: u16,
    pub height: u16,
    pub sck: u8,
    pub mosi: u8,
    pub cs: u8,
    pub dc: u8,
    pub res: u8,
    pub busy: u8,
}

impl Default for DisplayPins {
    fn default() -> Self {
        Self {
            width: 800,
            height: 480,
            sck: 7,
            mosi: 9,
            cs: 10,
            dc: 11,
            res: 12,
            busy: 13,
        }
    }
}

/// Shares the SPI bus (`mosi`, `sck`) with the display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdCardPins {
    pub enable: u8,
    pub detect: u8,
    pub cs: u8,
    pub miso: u8,
    pub mosi: u8,
    pub sck: u8,
}

impl Default for SdCardPins {
    fn default() -> Self {
        Self {
            enable: 16,
            detect: 15,
            cs: 14,
            miso: 8,
            mosi: 9,
            sck: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    pub rx: u8,
    pub tx: u8,
    pub baud: u32,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            rx: 44,
            tx: 43,
            baud: 115200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeripheralPins {
    /// Inverted logic, LOW is on.
    pub led: u8,
    pub buzzer: u8,
    pub battery_adc: u8,
    pub battery_enable: u8,
    /// KEY0 (right, green), KEY1 (middle), KEY2 (left).
    pub buttons: [u8; 3],
}

impl Default for PeripheralPins {
    fn default() -> Self {
        Self {
            led: 6,
            buzzer: 45,
            battery_adc: 1,
            battery_enable: 21,
            buttons: [3, 4, 5],
        }
    }
}

/// When the client wakes to fetch a new frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum UpdateSchedule {
    Interval {
        seconds: u32,
    },
    /// Fixed local hours, NTP synchronised.
    WakeHours {
        hours: Vec<u8>,
        utc_offset_seconds: i32,
        dst_offset_seconds: i32,
        fallback_sleep_seconds: u32,
    },
}

impl Default for UpdateSchedule {
    fn default() -> Self {
        UpdateSchedule::Interval { seconds: 21600 }
    }
}

/// How the client holds the downloaded image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BufferSizing {
    /// Download and decode in chunks.
    Stream { chunk_bytes: usize },
    /// Whole frame in memory.
    Image { total_bytes: usize },
}

impl Default for BufferSizing {
    fn default() -> Self {
        BufferSizing::Stream { chunk_bytes: 8192 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DeviceProfile {
    pub network: NetworkSettings,
    pub display: DisplayPins,
    pub sd_card: SdCardPins,
    pub serial: SerialSettings,
    pub peripherals: PeripheralPins,
    pub schedule: UpdateSchedule,
    pub buffer: BufferSizing,
}

impl DeviceProfile {
    /// Seeed reTerminal E1002 as shipped in the client header.
    pub fn reterminal_e1002() -> Self {
        Self::default()
    }

    pub fn frame_len(&self) -> usize {
        EPBM_HEADER_LEN + self.display.width as usize * self.display.height as usize
    }

    pub fn image_url(&self) -> String {
        format!(
            "http://{}:{}/{}",
            self.network.server_host, self.network.server_port, self.network.image_endpoint
        )
    }

    /// Every GPIO assignment as `(function, pin)`.
    pub fn pin_assignments(&self) -> Vec<(&'static str, u8)> {
        let d = &self.display;
        let sd = &self.sd_card;
        let p = &self.peripherals;
        vec![
            ("display.sck", d.sck),
            ("display.mosi", d.mosi),
            ("display.cs", d.cs),
            ("display.dc", d.dc),
            ("display.res", d.res),
            ("display.busy", d.busy),
            ("sd_card.enable", sd.enable),
            ("sd_card.detect", sd.detect),
            ("sd_card.cs", sd.cs),
            ("sd_card.miso", sd.miso),
            ("sd_card.mosi", sd.mosi),
            ("sd_card.sck", sd.sck),
            ("serial.rx", self.serial.rx),
            ("serial.tx", self.serial.tx),
            ("peripherals.led", p.led),
            ("peripherals.buzzer", p.buzzer),
            ("peripherals.battery_adc", p.battery_adc),
            ("peripherals.battery_enable", p.battery_enable),
            ("peripherals.buttons[0]", p.buttons[0]),
            ("peripherals.buttons[1]", p.buttons[1]),
            ("peripherals.buttons[2]", p.buttons[2]),
        ]
    }

    fn validate_pins(&self) -> Result<()> {
        let mut owners: HashMap<u8, &'static str> = HashMap::new();
        for (function, pin) in self.pin_assignments() {
            validation::validate_range(&format!("device.{}", function), pin, 0, MAX_GPIO)?;

            // SD 卡與顯示器共用 SPI 匯流排
            let shared_bus = (function == "sd_card.mosi" && pin == self.display.mosi)
                || (function == "sd_card.sck" && pin == self.display.sck);
            if shared_bus {
                continue;
            }

            if let Some(owner) = owners.insert(pin, function) {
                return Err(FrameError::ConfigValidationError {
                    field: format!("device.{}", function),
                    message: format!("GPIO {} is already used by {}", pin, owner),
                });
            }
        }
        Ok(())
    }

    fn validate_network(&self) -> Result<()> {
        let network = &self.network;
        validation::validate_non_empty_string("device.network.server_host", &network.server_host)?;
        if network.server_host.contains("://")
            || network.server_host.chars().any(|c| c.is_whitespace() || breaks_c_string(c))
        {
            return Err(FrameError::InvalidConfigValueError {
                field: "device.network.server_host".to_string(),
                value: network.server_host.clone(),
                reason: "Host must be a bare name or address without scheme, whitespace, quotes or backslashes"
                    .to_string(),
            });
        }
        validation::validate_range("device.network.server_port", network.server_port, 1, u16::MAX)?;

        validation::validate_non_empty_string("device.network.image_endpoint", &network.image_endpoint)?;
        if network.image_endpoint.starts_with('/')
            || network.image_endpoint.chars().any(|c| c.is_whitespace() || breaks_c_string(c))
        {
            return Err(FrameError::InvalidConfigValueError {
                field: "device.network.image_endpoint".to_string(),
                value: network.image_endpoint.clone(),
                reason: "Endpoint must be relative and contain no whitespace, quotes or backslashes".to_string(),
            });
        }
        Ok(())
    }

    fn validate_schedule(&self) -> Result<()> {
        match &self.schedule {
            UpdateSchedule::Interval { seconds } => {
                validation::validate_range("device.schedule.seconds", *seconds, MIN_SLEEP_SECONDS, u32::MAX)
            }
            UpdateSchedule::WakeHours {
                hours,
                utc_offset_seconds,
                dst_offset_seconds,
                fallback_sleep_seconds,
            } => {
                if hours.is_empty() {
                    return Err(FrameError::MissingConfigError {
                        field: "device.schedule.hours".to_string(),
                    });
                }
                let mut seen = [false; 24];
                for hour in hours {
                    validation::validate_range("device.schedule.hours", *hour, 0, 23)?;
                    if std::mem::replace(&mut seen[*hour as usize], true) {
                        return Err(FrameError::InvalidConfigValueError {
                            field: "device.schedule.hours".to_string(),
                            value: hour.to_string(),
                            reason: "Wake hour listed more than once".to_string(),
                        });
                    }
                }
                validation::validate_range(
                    "device.schedule.utc_offset_seconds",
                    *utc_offset_seconds,
                    -MAX_UTC_OFFSET_SECONDS,
                    MAX_UTC_OFFSET_SECONDS,
                )?;
                validation::validate_range(
                    "device.schedule.dst_offset_seconds",
                    *dst_offset_seconds,
                    0,
                    MAX_DST_OFFSET_SECONDS,
                )?;
                validation::validate_range(
                    "device.schedule.fallback_sleep_seconds",
                    *fallback_sleep_seconds,
                    MIN_SLEEP_SECONDS,
                    u32::MAX,
                )
            }
        }
    }

    fn validate_buffer(&self) -> Result<()> {
        match self.buffer {
            BufferSizing::Stream { chunk_bytes } => validation::validate_range(
                "device.buffer.chunk_bytes",
                chunk_bytes,
                MIN_STREAM_CHUNK,
                MAX_STREAM_CHUNK,
            ),
            BufferSizing::Image { total_bytes } => {
                validation::validate_positive_number("device.buffer.total_bytes", total_bytes, self.frame_len())
            }
        }
    }

    /// Regenerates `config.h` for the firmware build.
    pub fn render_header(&self) -> String {
        let mut out = String::new();
        let n = &self.network;
        let d = &self.display;
        let sd = &self.sd_card;
        let s = &self.serial;
        let p = &self.peripherals;

        out.push_str("// Configuration for iot-image client\n");
        out.push_str("// Generated by iot-image for reTerminal e1002\n");
        out.push_str("#ifndef IOT_IMAGE_CONFIG_H\n#define IOT_IMAGE_CONFIG_H\n\n");
        out.push_str("#include \"arduino_secrets.h\"\n\n");

        out.push_str("// WiFi credentials (from arduino_secrets.h)\n");
        define(&mut out, "WIFI_SSID", "SECRET_SSID");
        define(&mut out, "WIFI_PASSWORD", "SECRET_PASS");

        out.push_str("\n// Server configuration\n");
        define(&mut out, "SERVER_HOST", format!("\"{}\"", n.server_host));
        define(&mut out, "SERVER_PORT", n.server_port);
        define(&mut out, "IMAGE_ENDPOINT", format!("\"{}\"", n.image_endpoint));

        match &self.schedule {
            UpdateSchedule::Interval { seconds } => {
                let _ = writeln!(out, "\n// Update interval in seconds ({:.1} hours)", *seconds as f64 / 3600.0);
                define(&mut out, "UPDATE_INTERVAL_SEC", seconds);
            }
            UpdateSchedule::WakeHours {
                hours,
                utc_offset_seconds,
                dst_offset_seconds,
                fallback_sleep_seconds,
            } => {
                out.push_str("\n// Wake at fixed local hours (NTP synchronised)\n");
                let list = hours.iter().map(|h| h.to_string()).collect::<Vec<_>>().join(", ");
                define(&mut out, "WAKE_HOURS", format!("{{{}}}", list));
                define(&mut out, "WAKE_HOURS_COUNT", hours.len());
                define(&mut out, "TIMEZONE_OFFSET_SEC", utc_offset_seconds);
                define(&mut out, "DST_OFFSET_SEC", dst_offset_seconds);
                out.push_str("// Sleep used when the clock cannot be synchronised\n");
                define(&mut out, "FALLBACK_SLEEP_SEC", fallback_sleep_seconds);
            }
        }

        out.push_str("\n// === ePaper Display Pins ===\n");
        define_aligned(&mut out, "EPD_WIDTH", d.width, None);
        define_aligned(&mut out, "EPD_HEIGHT", d.height, None);
        define_aligned(&mut out, "EPD_SCK_PIN", d.sck, None);
        define_aligned(&mut out, "EPD_MOSI_PIN", d.mosi, None);
        define_aligned(&mut out, "EPD_CS_PIN", d.cs, None);
        define_aligned(&mut out, "EPD_DC_PIN", d.dc, None);
        define_aligned(&mut out, "EPD_RES_PIN", d.res, None);
        define_aligned(&mut out, "EPD_BUSY_PIN", d.busy, None);

        out.push_str("\n// === SD Card Pins ===\n");
        define_aligned(&mut out, "SD_EN_PIN", sd.enable, Some("Power enable"));
        define_aligned(&mut out, "SD_DET_PIN", sd.detect, Some("Card detection"));
        define_aligned(&mut out, "SD_CS_PIN", sd.cs, Some("Chip select"));
        define_aligned(&mut out, "SD_MISO_PIN", sd.miso, None);
        let mosi_note = (sd.mosi == d.mosi).then_some("Shared with display");
        define_aligned(&mut out, "SD_MOSI_PIN", sd.mosi, mosi_note);
        let sck_note = (sd.sck == d.sck).then_some("Shared with display");
        define_aligned(&mut out, "SD_SCK_PIN", sd.sck, sck_note);

        out.push_str("\n// === Serial Port Configuration ===\n");
        define(&mut out, "SERIAL_RX", s.rx);
        define(&mut out, "SERIAL_TX", s.tx);
        define(&mut out, "SERIAL_BAUD", s.baud);

        out.push_str("\n// === LED and Buzzer (Optional) ===\n");
        let _ = writeln!(out, "#define LED_PIN {}           // Onboard LED (inverted logic: LOW=ON)", p.led);
        define(&mut out, "BUZZER_PIN", p.buzzer);

        out.push_str("\n// === Battery Monitoring (Optional) ===\n");
        define(&mut out, "BATTERY_ADC_PIN", p.battery_adc);
        define(&mut out, "BATTERY_ENABLE_PIN", p.battery_enable);

        out.push_str("\n// === Button Pins (Optional) ===\n");
        let labels = ["Right button (Green)", "Middle button", "Left button"];
        for (i, (pin, label)) in p.buttons.iter().zip(labels).enumerate() {
            let _ = writeln!(out, "#define BUTTON_KEY{} {}       // {}", i, pin, label);
        }

        match self.buffer {
            BufferSizing::Stream { chunk_bytes } => {
                out.push_str("\n// PNG streaming buffer size\n");
                out.push_str("// Used for downloading chunks and decoding on-the-fly\n");
                define(&mut out, "STREAM_BUFFER_SIZE", chunk_bytes);
            }
            BufferSizing::Image { total_bytes } => {
                let _ = writeln!(out, "\n// Whole-frame buffer ({} bytes per EPBM frame)", self.frame_len());
                define(&mut out, "IMAGE_BUFFER_SIZE", total_bytes);
            }
        }

        out.push_str("\n#endif // IOT_IMAGE_CONFIG_H\n");
        out
    }
}

/// Would end or escape the C string literal it is written into.
fn breaks_c_string(c: char) -> bool {
    matches!(c, '"' | '\\') || c.is_control()
}

fn define(out: &mut String, name: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "#define {} {}", name, value);
}

fn define_aligned(out: &mut String, name: &str, value: impl std::fmt::Display, comment: Option<&str>) {
    match comment {
        Some(comment) => {
            let _ = writeln!(out, "#define {:<13} {:<5} // {}", name, value, comment);
        }
        None => {
            let _ = writeln!(out, "#define {:<13} {}", name, value);
        }
    }
}

impl Validate for DeviceProfile {
    fn validate(&self) -> Result<()> {
        self.validate_network()?;
        validation::validate_range("device.display.width", self.display.width, 1, u16::MAX)?;
        validation::validate_range("device.display.height", self.display.height, 1, u16::MAX)?;
        self.validate_pins()?;
        if !STANDARD_BAUD_RATES.contains(&self.serial.baud) {
            return Err(FrameError::InvalidConfigValueError {
                field: "device.serial.baud".to_string(),
                value: self.serial.baud.to_string(),
                reason: "Not a standard UART baud rate".to_string(),
            });
        }
        self.validate_schedule()?;
        self.validate_buffer()
    }
}
