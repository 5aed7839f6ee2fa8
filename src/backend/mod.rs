pub mod dummy;
#[cfg(feature = "hardware-gpio")]
pub mod libgpiod;

pub use dummy::{DummyGpio, DummyPwm};
#[cfg(feature = "hardware-gpio")]
pub use libgpiod::LibgpiodGpio;
