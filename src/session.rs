use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use log::warn;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{GpioError, GpioWarning};
use crate::gpio::{Channel, Direction, Edge, EdgeCallback, Mode, Pull};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub direction: Direction,
    pub pull: Pull,
}

/// Fans a detected edge out to every callback attached to a registration.
pub struct EdgeDispatcher {
    callbacks: RwLock<Vec<EdgeCallback>>,
    detected: AtomicBool,
}

impl EdgeDispatcher {
    pub fn new(callback: Option<EdgeCallback>) -> Self {
        Self {
            callbacks: RwLock::new(callback.into_iter().collect()),
            detected: AtomicBool::new(false),
        }
    }

    pub fn add_callback(&self, callback: EdgeCallback) {
        self.callbacks.write().push(callback);
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn dispatch(&self) {
        self.detected.store(true, Ordering::Release);
        // callbacks may register further callbacks, so don't hold the lock while calling
        let callbacks = self.callbacks.read().clone();
        for callback in callbacks {
            callback();
        }
    }

    /// Returns whether an edge fired since the last call, clearing the flag.
    pub fn take_detected(&self) -> bool {
        self.detected.swap(false, Ordering::AcqRel)
    }
}

#[derive(Clone)]
pub struct EventRegistration {
    pub edge: Edge,
    pub bouncetime: Option<Duration>,
    pub polltime: Duration,
    pub dispatcher: Arc<EdgeDispatcher>,
}

/// Per-provider GPIO context: numbering mode, warnings flag, channel cache and
/// event registrations.
pub struct GpioSession {
    mode: OnceLock<Mode>,
    warnings: AtomicBool,
    channels: RwLock<FxHashMap<Channel, ChannelConfig>>,
    events: RwLock<FxHashMap<Channel, EventRegistration>>,
}

impl Default for GpioSession {
    fn default() -> Self {
        Self {
            mode: OnceLock::new(),
            warnings: AtomicBool::new(false),
            channels: RwLock::new(FxHashMap::default()),
            events: RwLock::new(FxHashMap::default()),
        }
    }
}

impl GpioSession {
    pub fn set_warnings(&self, enabled: bool) {
        self.warnings.store(enabled, Ordering::Relaxed);
    }

    pub fn warnings_enabled(&self) -> bool {
        self.warnings.load(Ordering::Relaxed)
    }

    /// First writer wins. Repeating the active mode is accepted.
    pub fn set_mode(&self, mode: Mode) -> Result<(), GpioError> {
        let current = *self.mode.get_or_init(|| mode);
        if current != mode {
            return Err(GpioError::ConflictingState(format!(
                "A different mode ({current}) has already been set, cannot switch to {mode}"
            )));
        }
        Ok(())
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode.get().copied()
    }

    /// Logs and returns the warning when warnings are enabled.
    pub fn warn(&self, warning: GpioWarning) -> Option<GpioWarning> {
        if !self.warnings_enabled() {
            return None;
        }
        warn!("{warning}");
        Some(warning)
    }

    pub fn record_setup(&self, channels: &[Channel], config: ChannelConfig) {
        let mut cache = self.channels.write();
        for channel in channels {
            cache.insert(*channel, config);
        }
    }

    pub fn channel_config(&self, channel: Channel) -> Option<ChannelConfig> {
        self.channels.read().get(&channel).copied()
    }

    pub fn configured_channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.channels.read().keys().copied().collect();
        channels.sort_unstable();
        channels
    }

    /// Returns `false` without touching the existing entry when the channel is
    /// already registered.
    pub fn register_event(&self, channel: Channel, registration: EventRegistration) -> bool {
        match self.events.write().entry(channel) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(registration);
                true
            }
        }
    }

    pub fn registration(&self, channel: Channel) -> Option<EventRegistration> {
        self.events.read().get(&channel).cloned()
    }

    pub fn unregister_event(&self, channel: Channel) -> Option<EventRegistration> {
        self.events.write().remove(&channel)
    }

    /// Forgets cached configuration and registrations for the given channels,
    /// or for everything when `None`. Returns the channels that were known.
    pub fn release(&self, channels: Option<&[Channel]>) -> Vec<Channel> {
        let mut cache = self.channels.write();
        let mut events = self.events.write();

        let mut released: Vec<Channel> = match channels {
            Some(channels) => channels
                .iter()
                .copied()
                .filter(|ch| cache.contains_key(ch) || events.contains_key(ch))
                .collect(),
            None => cache.keys().chain(events.keys()).copied().collect(),
        };
        released.sort_unstable();
        released.dedup();

        for channel in &released {
            cache.remove(channel);
            events.remove(channel);
        }
        released
    }
}
