mod backend;
mod config;
mod error;
mod gpio;
mod resolver;
mod session;

pub use config::{AppConfig, HardwareConfig, InputConfig, PinConfig, TriggerConfig};
pub use error::{GpioError, GpioWarning};
pub use gpio::{
    Channel, DEFAULT_CONSUMER, DEFAULT_POLLTIME, DEFAULT_REMOVE_TIMEOUT, Direction, Edge,
    EdgeCallback, EventDetect, Function, GpioProvider, Level, Levels, Mode, ProviderKind, Pull,
    PwmChannel, SetupOptions,
};
pub use resolver::{GpioResolver, select_provider};
pub use session::{ChannelConfig, EdgeDispatcher, EventRegistration, GpioSession};

#[cfg(feature = "hardware-gpio")]
pub use backend::LibgpiodGpio;
pub use backend::{DummyGpio, DummyPwm};
