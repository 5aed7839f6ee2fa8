use std::sync::{Arc, OnceLock};

use log::info;

use crate::backend::DummyGpio;
use crate::config::{AppConfig, HardwareConfig};
use crate::error::{GpioError, GpioWarning};
use crate::gpio::{Direction, Edge, EdgeCallback, EventDetect, GpioProvider, Mode, SetupOptions};

/// Binds to the hardware provider when possible and to [`DummyGpio`] otherwise.
///
/// Failing to reach the hardware is never fatal; the reason is logged and the
/// dummy takes over.
pub fn select_provider(hardware: Option<&HardwareConfig>) -> Arc<dyn GpioProvider> {
    if let Some(provider) = hardware_provider(hardware) {
        return provider;
    }
    info!("Using dummy gpio provider");
    Arc::new(DummyGpio::new())
}

#[cfg(feature = "hardware-gpio")]
fn hardware_provider(hardware: Option<&HardwareConfig>) -> Option<Arc<dyn GpioProvider>> {
    use crate::backend::LibgpiodGpio;
    use log::warn;

    let Some(hardware) = hardware else {
        info!("No hardware pin map configured");
        return None;
    };
    match LibgpiodGpio::new(hardware) {
        Ok(provider) => {
            info!("Using libgpiod gpio provider");
            Some(Arc::new(provider))
        }
        Err(e) => {
            warn!("Hardware gpio unavailable, falling back to dummy: {e}");
            None
        }
    }
}

#[cfg(not(feature = "hardware-gpio"))]
fn hardware_provider(_hardware: Option<&HardwareConfig>) -> Option<Arc<dyn GpioProvider>> {
    info!("Built without hardware-gpio support");
    None
}

/// Owns the provider selection for one process and the two operations the
/// face controller needs from it.
pub struct GpioResolver {
    config: Arc<AppConfig>,
    provider: OnceLock<Arc<dyn GpioProvider>>,
}

impl GpioResolver {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            config,
            provider: OnceLock::new(),
        }
    }

    /// Skips selection and binds the given provider.
    pub fn with_provider(config: Arc<AppConfig>, provider: Arc<dyn GpioProvider>) -> Self {
        let resolver = Self::new(config);
        let _ = resolver.provider.set(provider);
        resolver
    }

    /// Resolved on first use; later calls return the same provider.
    pub fn provider(&self) -> &Arc<dyn GpioProvider> {
        self.provider
            .get_or_init(|| select_provider(self.config.hardware.as_ref()))
    }

    /// Watches `input.trigger.pin` for falling edges using BOARD numbering.
    pub fn configure_input_with_callback(&self, callback: EdgeCallback) -> Result<(), GpioError> {
        let pin = self.config.trigger_pin();
        let provider = self.provider();

        provider.set_mode(Mode::Board)?;
        provider.setup(&[pin], Direction::In, &SetupOptions::default())?;
        provider.add_event_detect(pin, Edge::Falling, EventDetect::with_callback(callback))?;

        info!(
            "Trigger configured on pin {pin} using {} provider",
            provider.kind()
        );
        Ok(())
    }

    pub fn release_resources(&self) -> Option<GpioWarning> {
        self.provider().cleanup(None)
    }
}
