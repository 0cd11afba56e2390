/*
 * Timing: all periodic ticks in msec
 *
 */

pub const ADC_PERIOD_MS: u32 = 5;
pub const DEBOUNCE_PERIOD_MS: u32 = 50;
pub const DRIVE_PERIOD_MS: u32 = 100;
pub const BOOT_PERIOD_MS: u32 = 200;

/// Settle window of a button in debounce ticks: 4 x 50ms
///
/// The tick running when the edge arrives is not counted, so the edge
/// stays masked for 200 to 250 msec.
pub const DEBOUNCE_TICKS: u8 = 4;

/// E-brake reverse pulse in debounce ticks: 1 x 50ms
pub const EBRAKE_TICKS: u8 = 1;

/// ADC watchdog limit in 5ms ticks
pub const ADC_WATCHDOG_TICKS: u32 = 1000;

/// Number of ADC samples averaged per calibration phase
pub const CALIBRATION_SAMPLES: usize = 10;

/// Direction change settle time in drive ticks: 5 x 100ms
pub const DIRECTION_CHANGE_TICKS: u8 = 5;

/// Convert msec into 100ms drive ticks
pub const fn drive_ticks(ms: u32) -> u32 {
    ms / DRIVE_PERIOD_MS
}

/*
 * PWM duty levels: 0 ..= WHEEL_PERIOD
 *
 */

pub const WHEEL_PERIOD: u16 = 50005;
pub const WHEEL_OFF: u16 = 0;
pub const TIPTOE: u16 = 7500;
pub const CRAWL: u16 = 10000;
pub const LINE_SPEED: u16 = 20000;
pub const SLOW: u16 = 30000;
pub const FAST: u16 = 45000;

/*
 * Serial link and protocol
 *
 */

pub const RING_SIZE: usize = 32;
pub const HOST_COMMAND_SIZE: usize = 32;
pub const LINE_SIZE: usize = 32;
pub const LINE_SLOTS: usize = 4;
pub const COMMAND_SIZE: usize = 20;
pub const COMMAND_SLOTS: usize = 4;

pub const COMMAND_PREFIX: u8 = b'^';
pub const COMMAND_TERMINATOR: u8 = 0x0D;
pub const LINE_TERMINATOR: u8 = 0x0A;

pub const PIN_CODE: &[u8] = b"^5115";

/// Offset of the SSID in a `+CWJAP:"` response
pub const SSID_OFFSET: usize = 8;
/// Offset of the address in a `+CIFSR:STAIP,"` response
pub const IP_OFFSET: usize = 14;

pub const MAX_SSID_LEN: usize = 32;
pub const MAX_IP_LEN: usize = 16;

pub const SERVER_PORT: u16 = 55155;

pub const AT_SET_MUX: &[u8] = b"AT+CIPMUX=1\r\n";
pub const AT_SET_SERVER: &[u8] = b"AT+CIPSERVER=1,55155\r\n";
pub const AT_REQUEST_SSID: &[u8] = b"AT+CWJAP?\r\n";
pub const AT_REQUEST_IP: &[u8] = b"AT+CIFSR\r\n";
pub const AT_PING: &[u8] = b"AT+PING=\"www.google.com\"\r\n";

/// Keep-alive ping period in 200ms boot ticks: 10 sec
pub const PING_TICKS: u16 = 50;

/// Default duration of a manual remote move in drive ticks
pub const MOVE_TICKS: u16 = 10;

/*
 * Display
 *
 */

pub const DISPLAY_LINES: usize = 4;
pub const DISPLAY_WIDTH: usize = 10;

/// Line-follow tunables: gains in duty units, timings in 100ms drive ticks
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct DriveConfig {
    /// proportional gain: duty reduction per unit of steering error
    pub kp: i32,
    /// largest |error| still considered centered
    pub deadzone: i32,
    /// smallest |error| handled as a sharp turn
    pub sharp: i32,
    /// wheel duty when centered
    pub nominal: u16,
    /// lowest duty of the slowed wheel in the proportional regime
    pub minimum: u16,
    /// duty while searching for the line
    pub cautious: u16,
    /// duty while spinning in place to align
    pub align: u16,
    pub brake_recover: u32,
    pub align_min: u32,
    pub align_timeout: u32,
    pub search_timeout: u32,
    pub settle: u32,
    /// optional dwell on the line before turning onto it
    pub intercept: Option<u32>,
    pub turn_timeout: u32,
    pub travel_pause: u32,
    pub travel: u32,
    pub circle_pause: u32,
    pub circle_min: u32,
    pub exit: u32,
    /// hold wheels stopped before reversing their direction
    pub enforce_direction_change_delay: bool,
}

impl Default for DriveConfig {
    fn default() -> Self {
        DriveConfig {
            kp: 160,
            deadzone: 20,
            sharp: 150,
            nominal: WHEEL_PERIOD,
            minimum: WHEEL_PERIOD / 2,
            cautious: SLOW,
            align: LINE_SPEED,
            brake_recover: drive_ticks(500),
            align_min: drive_ticks(500),
            align_timeout: drive_ticks(2000),
            search_timeout: drive_ticks(1000),
            settle: drive_ticks(500),
            intercept: None,
            turn_timeout: drive_ticks(3000),
            travel_pause: drive_ticks(2000),
            travel: drive_ticks(8000),
            circle_pause: drive_ticks(2000),
            circle_min: drive_ticks(25000),
            exit: drive_ticks(3000),
            enforce_direction_change_delay: false,
        }
    }
}

/// Robot configuration
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct Config {
    pub drive: DriveConfig,
    /// PIN expected in front of every remote command
    pub pin: &'static [u8],
    /// keep-alive ping period in boot ticks
    pub ping: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            drive: DriveConfig::default(),
            pin: PIN_CODE,
            ping: PING_TICKS,
        }
    }
}
