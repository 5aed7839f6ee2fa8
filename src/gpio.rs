use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GpioError, GpioWarning};
use crate::session::GpioSession;

/// Pin identifier in the active numbering mode.
pub type Channel = u32;

/// Invoked with no arguments whenever a watched edge fires.
pub type EdgeCallback = Arc<dyn Fn() + Send + Sync>;

pub const DEFAULT_CONSUMER: &str = env!("CARGO_PKG_NAME");
pub const DEFAULT_POLLTIME: Duration = Duration::from_millis(200);
pub const DEFAULT_REMOVE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Board,
    Bcm,
    TegraSoc,
    Cvm,
}

impl Mode {
    pub fn code(self) -> i32 {
        match self {
            Mode::Board => 10,
            Mode::Bcm => 11,
            Mode::TegraSoc => 1000,
            Mode::Cvm => 1001,
        }
    }
}

impl TryFrom<i32> for Mode {
    type Error = GpioError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            10 => Ok(Mode::Board),
            11 => Ok(Mode::Bcm),
            1000 => Ok(Mode::TegraSoc),
            1001 => Ok(Mode::Cvm),
            _ => Err(GpioError::InvalidArgument(format!(
                "{code} is not a valid numbering mode"
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Board => "BOARD",
            Mode::Bcm => "BCM",
            Mode::TegraSoc => "TEGRA_SOC",
            Mode::Cvm => "CVM",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn code(self) -> i32 {
        match self {
            Direction::Out => 0,
            Direction::In => 1,
        }
    }
}

impl TryFrom<i32> for Direction {
    type Error = GpioError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Direction::Out),
            1 => Ok(Direction::In),
            _ => Err(GpioError::InvalidArgument(format!(
                "{code} is not a valid direction, expected IN or OUT"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Pull {
    #[default]
    Off,
    Down,
    Up,
}

impl Pull {
    pub fn code(self) -> i32 {
        match self {
            Pull::Off => 0,
            Pull::Down => 1,
            Pull::Up => 2,
        }
    }
}

impl TryFrom<i32> for Pull {
    type Error = GpioError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Pull::Off),
            1 => Ok(Pull::Down),
            2 => Ok(Pull::Up),
            _ => Err(GpioError::InvalidArgument(format!(
                "{code} is not a valid pull_up_down, expected PUD_OFF, PUD_UP or PUD_DOWN"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn code(self) -> i32 {
        match self {
            Level::Low => 0,
            Level::High => 1,
        }
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

impl TryFrom<i32> for Level {
    type Error = GpioError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Level::Low),
            1 => Ok(Level::High),
            _ => Err(GpioError::InvalidArgument(format!(
                "{code} is not a valid level, expected HIGH or LOW"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

impl Edge {
    pub fn code(self) -> i32 {
        match self {
            Edge::Rising => 1,
            Edge::Falling => 2,
            Edge::Both => 3,
        }
    }
}

impl TryFrom<i32> for Edge {
    type Error = GpioError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Edge::Rising),
            2 => Ok(Edge::Falling),
            3 => Ok(Edge::Both),
            _ => Err(GpioError::InvalidArgument(format!(
                "{code} is not a valid edge, expected RISING, FALLING or BOTH"
            ))),
        }
    }
}

/// Current function of a channel as reported by `gpio_function`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    In,
    Out,
    HardPwm,
    Unknown,
}

impl Function {
    pub fn code(self) -> i32 {
        match self {
            Function::Out => 0,
            Function::In => 1,
            Function::HardPwm => 43,
            Function::Unknown => -1,
        }
    }
}

impl From<Direction> for Function {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::In => Function::In,
            Direction::Out => Function::Out,
        }
    }
}

/// Values for `output`: one level for every channel, or one level per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Levels<'a> {
    Uniform(Level),
    PerChannel(&'a [Level]),
}

impl From<Level> for Levels<'_> {
    fn from(level: Level) -> Self {
        Levels::Uniform(level)
    }
}

impl<'a> From<&'a [Level]> for Levels<'a> {
    fn from(levels: &'a [Level]) -> Self {
        Levels::PerChannel(levels)
    }
}

#[derive(Debug, Clone)]
pub struct SetupOptions {
    pub pull: Pull,
    pub initial: Option<Level>,
    pub consumer: String,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            pull: Pull::Off,
            initial: None,
            consumer: DEFAULT_CONSUMER.to_string(),
        }
    }
}

impl SetupOptions {
    pub fn with_pull(pull: Pull) -> Self {
        Self {
            pull,
            ..Self::default()
        }
    }

    pub fn with_initial(initial: Level) -> Self {
        Self {
            initial: Some(initial),
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct EventDetect {
    pub callback: Option<EdgeCallback>,
    /// Milliseconds. Negative values are rejected.
    pub bouncetime_ms: Option<i64>,
    /// How long a watcher blocks per wait before checking for cancellation.
    pub polltime: Duration,
}

impl Default for EventDetect {
    fn default() -> Self {
        Self {
            callback: None,
            bouncetime_ms: None,
            polltime: DEFAULT_POLLTIME,
        }
    }
}

impl EventDetect {
    pub fn with_callback(callback: EdgeCallback) -> Self {
        Self {
            callback: Some(callback),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Hardware,
    Dummy,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderKind::Hardware => "hardware",
            ProviderKind::Dummy => "dummy",
        })
    }
}

/// A software PWM session on one channel.
pub trait PwmChannel: Send {
    fn channel(&self) -> Channel;
    fn frequency_hz(&self) -> f64;
    fn is_started(&self) -> bool;
    fn start(&mut self, duty_cycle_percent: f64) -> Result<(), GpioError>;
    fn change_frequency(&mut self, frequency_hz: f64) -> Result<(), GpioError>;
    fn change_duty_cycle(&mut self, duty_cycle_percent: f64) -> Result<(), GpioError>;
    fn stop(&mut self);
}

/// Capability surface shared by the hardware and dummy providers.
///
/// Mode, warnings and bookkeeping live in the provider's [`GpioSession`], so the
/// default methods below behave identically for every provider.
pub trait GpioProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn session(&self) -> &GpioSession;

    fn set_warnings(&self, enabled: bool) {
        self.session().set_warnings(enabled);
    }

    fn set_mode(&self, mode: Mode) -> Result<(), GpioError> {
        self.session().set_mode(mode)
    }

    fn mode(&self) -> Option<Mode> {
        self.session().mode()
    }

    fn setup(
        &self,
        channels: &[Channel],
        direction: Direction,
        options: &SetupOptions,
    ) -> Result<(), GpioError>;

    /// Releases the given channels, or every channel when `None`. Never fails.
    fn cleanup(&self, channels: Option<&[Channel]>) -> Option<GpioWarning>;

    fn input(&self, channel: Channel) -> Result<Level, GpioError>;

    fn output(&self, channels: &[Channel], levels: Levels<'_>) -> Result<(), GpioError>;

    /// At most one registration per channel; repeated calls are silently ignored.
    fn add_event_detect(
        &self,
        channel: Channel,
        edge: Edge,
        options: EventDetect,
    ) -> Result<(), GpioError>;

    fn remove_event_detect(&self, channel: Channel, timeout: Duration);

    fn event_detected(&self, channel: Channel) -> bool;

    fn add_event_callback(&self, channel: Channel, callback: EdgeCallback)
    -> Result<(), GpioError>;

    fn wait_for_edge(
        &self,
        channel: Channel,
        edge: Edge,
        bouncetime_ms: Option<i64>,
        timeout_ms: Option<i64>,
    ) -> Result<Option<Level>, GpioError>;

    fn gpio_function(&self, channel: Channel) -> Function;

    fn pwm(&self, channel: Channel, frequency_hz: f64) -> Result<Box<dyn PwmChannel>, GpioError>;
}

pub(crate) fn validate_setup(direction: Direction, pull: Pull) -> Result<(), GpioError> {
    if direction == Direction::Out && pull != Pull::Off {
        return Err(GpioError::InvalidArgument(
            "pull_up_down parameter is not valid for outputs".into(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_bouncetime(bouncetime_ms: Option<i64>) -> Result<Option<Duration>, GpioError> {
    non_negative_millis(bouncetime_ms, "bouncetime")
}

pub(crate) fn validate_timeout(timeout_ms: Option<i64>) -> Result<Option<Duration>, GpioError> {
    non_negative_millis(timeout_ms, "timeout")
}

fn non_negative_millis(value: Option<i64>, name: &str) -> Result<Option<Duration>, GpioError> {
    value
        .map(|ms| {
            u64::try_from(ms).map(Duration::from_millis).map_err(|_| {
                GpioError::InvalidArgument(format!(
                    "{name} must be an integer greater than or equal to 0, got {ms}"
                ))
            })
        })
        .transpose()
}

/// Pairs each channel with the level it should be driven to.
pub(crate) fn pair_levels(
    channels: &[Channel],
    levels: Levels<'_>,
) -> Result<Vec<(Channel, Level)>, GpioError> {
    match levels {
        Levels::Uniform(level) => Ok(channels.iter().map(|ch| (*ch, level)).collect()),
        Levels::PerChannel(levels) => {
            if levels.len() != channels.len() {
                return Err(GpioError::InvalidArgument(format!(
                    "number of values ({}) does not match number of channels ({})",
                    levels.len(),
                    channels.len()
                )));
            }
            Ok(channels.iter().copied().zip(levels.iter().copied()).collect())
        }
    }
}
