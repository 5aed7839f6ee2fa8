use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::error::{GpioError, GpioWarning};
use crate::gpio::{
    Channel, Direction, Edge, EdgeCallback, EventDetect, Function, GpioProvider, Level, Levels,
    ProviderKind, PwmChannel, SetupOptions, pair_levels, validate_bouncetime, validate_setup,
    validate_timeout,
};
use crate::session::{ChannelConfig, EdgeDispatcher, EventRegistration, GpioSession};

/// Stand-in provider for machines without GPIO hardware.
///
/// Arguments are validated exactly like the hardware provider validates them,
/// but no pin is ever touched: reads report `High`, edges never fire and
/// waits return immediately.
#[derive(Default)]
pub struct DummyGpio {
    session: GpioSession,
}

impl DummyGpio {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GpioProvider for DummyGpio {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Dummy
    }

    fn session(&self) -> &GpioSession {
        &self.session
    }

    fn setup(
        &self,
        channels: &[Channel],
        direction: Direction,
        options: &SetupOptions,
    ) -> Result<(), GpioError> {
        validate_setup(direction, options.pull)?;

        debug!(
            "dummy gpio: setup {channels:?} as {direction:?} (pull {:?}, initial {:?}, consumer {})",
            options.pull, options.initial, options.consumer
        );
        self.session.record_setup(
            channels,
            ChannelConfig {
                direction,
                pull: options.pull,
            },
        );
        Ok(())
    }

    fn cleanup(&self, channels: Option<&[Channel]>) -> Option<GpioWarning> {
        if self.session.mode().is_none() {
            return self.session.warn(GpioWarning::NothingToCleanUp);
        }

        let released = self.session.release(channels);
        debug!("dummy gpio: released channels {released:?}");
        None
    }

    fn input(&self, channel: Channel) -> Result<Level, GpioError> {
        debug!("dummy gpio: input on channel {channel}");
        Ok(Level::High)
    }

    fn output(&self, channels: &[Channel], levels: Levels<'_>) -> Result<(), GpioError> {
        let pairs = pair_levels(channels, levels)?;
        debug!("dummy gpio: output {pairs:?}");
        Ok(())
    }

    fn add_event_detect(
        &self,
        channel: Channel,
        edge: Edge,
        options: EventDetect,
    ) -> Result<(), GpioError> {
        let bouncetime = validate_bouncetime(options.bouncetime_ms)?;

        let registration = EventRegistration {
            edge,
            bouncetime,
            polltime: options.polltime,
            dispatcher: Arc::new(EdgeDispatcher::new(options.callback)),
        };
        if !self.session.register_event(channel, registration) {
            debug!("dummy gpio: channel {channel} already has event detection, ignoring");
            return Ok(());
        }

        debug!("dummy gpio: watching channel {channel} for {edge:?} edges");
        Ok(())
    }

    fn remove_event_detect(&self, channel: Channel, _timeout: Duration) {
        if self.session.unregister_event(channel).is_some() {
            debug!("dummy gpio: stopped watching channel {channel}");
        }
    }

    fn event_detected(&self, _channel: Channel) -> bool {
        false
    }

    fn add_event_callback(
        &self,
        channel: Channel,
        callback: EdgeCallback,
    ) -> Result<(), GpioError> {
        // An unregistered channel is accepted and the callback dropped.
        if let Some(registration) = self.session.registration(channel) {
            registration.dispatcher.add_callback(callback);
        }
        Ok(())
    }

    fn wait_for_edge(
        &self,
        channel: Channel,
        edge: Edge,
        bouncetime_ms: Option<i64>,
        timeout_ms: Option<i64>,
    ) -> Result<Option<Level>, GpioError> {
        validate_bouncetime(bouncetime_ms)?;
        validate_timeout(timeout_ms)?;

        debug!("dummy gpio: wait for {edge:?} on channel {channel} returns immediately");
        Ok(None)
    }

    fn gpio_function(&self, _channel: Channel) -> Function {
        Function::Unknown
    }

    fn pwm(&self, channel: Channel, frequency_hz: f64) -> Result<Box<dyn PwmChannel>, GpioError> {
        Ok(Box::new(DummyPwm::new(channel, frequency_hz)))
    }
}

pub struct DummyPwm {
    channel: Channel,
    frequency_hz: f64,
    started: bool,
}

impl DummyPwm {
    pub fn new(channel: Channel, frequency_hz: f64) -> Self {
        Self {
            channel,
            // Sign inversion is long-standing observable behaviour of the dummy.
            // TODO: drop the negation once no caller compares against it.
            frequency_hz: -frequency_hz,
            started: false,
        }
    }
}

impl PwmChannel for DummyPwm {
    fn channel(&self) -> Channel {
        self.channel
    }

    fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    fn is_started(&self) -> bool {
        self.started
    }

    fn start(&mut self, _duty_cycle_percent: f64) -> Result<(), GpioError> {
        Ok(())
    }

    fn change_frequency(&mut self, _frequency_hz: f64) -> Result<(), GpioError> {
        Ok(())
    }

    fn change_duty_cycle(&mut self, _duty_cycle_percent: f64) -> Result<(), GpioError> {
        Ok(())
    }

    fn stop(&mut self) {}
}
