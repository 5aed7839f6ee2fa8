use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, sleep, yield_now};
use std::time::{Duration, Instant};

use libgpiod::{chip::Chip, line, line::EventClock, request};
use parking_lot::{FairMutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::{HardwareConfig, PinConfig};
use crate::error::{GpioError, GpioWarning};
use crate::gpio::{
    Channel, DEFAULT_REMOVE_TIMEOUT, Direction, Edge, EdgeCallback, EventDetect, Function,
    GpioProvider, Level, Levels, Mode, ProviderKind, Pull, PwmChannel, SetupOptions, pair_levels,
    validate_bouncetime, validate_setup, validate_timeout,
};
use crate::session::{ChannelConfig, EdgeDispatcher, EventRegistration, GpioSession};

const EVENT_BUFFER_CAPACITY: usize = 64;
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Provider backed by the Linux GPIO character device through libgpiod.
pub struct LibgpiodGpio {
    session: GpioSession,
    hardware: HardwareConfig,
    lines: RwLock<FxHashMap<Channel, LineHandle>>,
}

struct LineHandle {
    listener: Option<EdgeListener>, // stop before the request is released
    target: LineTarget,
}

/// What a blocking operation needs from a line, usable without holding `lines`.
#[derive(Clone)]
struct LineTarget {
    line: u32,
    direction: Direction,
    pull: Pull,
    gpiod_handle: Arc<FairMutex<GpiodHandle>>,
}

struct GpiodHandle {
    request: request::Request,
}

impl GpiodHandle {
    fn new(chip: &str, line_cfg: &line::Config, consumer: &str) -> Result<Self, GpioError> {
        let chip = open_chip(chip)?;
        let request = Self::request_lines(&chip, line_cfg, consumer)?;
        Ok(Self { request })
    }

    fn request_lines(
        chip: &Chip,
        line_cfg: &line::Config,
        consumer: &str,
    ) -> Result<request::Request, GpioError> {
        let mut req_cfg = request::Config::new()
            .map_err(|e| GpioError::Hardware(format!("request config: {e}")))?;
        req_cfg
            .set_consumer(consumer)
            .map_err(|e| GpioError::Hardware(format!("request consumer: {e}")))?;
        chip.request_lines(Some(&req_cfg), line_cfg)
            .map_err(|e| GpioError::Hardware(format!("request lines: {e}")))
    }
}

fn open_chip(path: &str) -> Result<Chip, GpioError> {
    let p = PathBuf::from(path);
    Chip::open(&p).map_err(|e| GpioError::Hardware(format!("open chip {path}: {e}")))
}

struct EdgeListener {
    channel: Channel,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EdgeListener {
    fn new(
        channel: Channel,
        gpiod_handle: Arc<FairMutex<GpiodHandle>>,
        dispatcher: Arc<EdgeDispatcher>,
        polltime: Duration,
    ) -> Result<Self, GpioError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_flag = cancel.clone();
        let mut buffer = request::Buffer::new(EVENT_BUFFER_CAPACITY)
            .map_err(|e| GpioError::Hardware(format!("event buffer: {e}")))?;

        let handle = std::thread::spawn(move || {
            while !cancel_flag.load(Ordering::Relaxed) {
                let hdl = gpiod_handle.lock();
                let req = &hdl.request;

                let has_event = match req.wait_edge_events(Some(polltime)) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("wait edge events error for channel {channel}: {e}");
                        drop(hdl);
                        yield_now();
                        continue;
                    }
                };
                if !has_event {
                    continue;
                }

                let events = match req.read_edge_events(&mut buffer) {
                    Ok(evts) => evts,
                    Err(e) => {
                        warn!("read edge events error for channel {channel}: {e}");
                        drop(hdl);
                        yield_now();
                        continue;
                    }
                };
                let fired = events.filter_map(Result::ok).count();
                drop(hdl);

                for _ in 0..fired {
                    dispatcher.dispatch();
                }
            }
        });

        Ok(Self {
            channel,
            cancel,
            handle: Some(handle),
        })
    }

    fn stop(mut self, timeout: Duration) {
        self.shutdown(timeout);
    }

    /// Waits at most `timeout` for the watcher thread to exit, detaching it otherwise.
    fn shutdown(&mut self, timeout: Duration) {
        self.cancel.store(true, Ordering::Relaxed);
        let Some(handle) = self.handle.take() else {
            return;
        };
        if !join_within(handle, timeout) {
            warn!(
                "edge listener for channel {} did not stop within {timeout:?}, detaching",
                self.channel
            );
        }
    }
}

impl Drop for EdgeListener {
    fn drop(&mut self) {
        self.shutdown(DEFAULT_REMOVE_TIMEOUT);
    }
}

/// Joins the thread if it finishes before `timeout`. Returns `false` when it
/// was left running.
fn join_within(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() && Instant::now() < deadline {
        sleep(STOP_POLL_INTERVAL);
    }
    if !handle.is_finished() {
        return false;
    }
    let _ = handle.join();
    true
}

fn check_numbering(current: Option<Mode>, numbering: Mode) -> Result<(), GpioError> {
    match current {
        None => Err(GpioError::InvalidState(
            "set the pin numbering mode before setting up channels".into(),
        )),
        Some(mode) if mode != numbering => Err(GpioError::InvalidState(format!(
            "pin map uses {numbering} numbering but mode is {mode}"
        ))),
        Some(_) => Ok(()),
    }
}

impl LibgpiodGpio {
    /// Opens every configured chip once so an absent or inaccessible device is
    /// reported here rather than on first use.
    pub fn new(hardware: &HardwareConfig) -> Result<Self, GpioError> {
        if hardware.pins.is_empty() {
            return Err(GpioError::Config("hardware pin map is empty".into()));
        }

        let chips: FxHashSet<&str> = hardware.pins.values().map(|p| p.chip.as_str()).collect();
        for chip in chips {
            open_chip(chip)?;
            debug!("libgpiod: chip {chip} is available");
        }

        info!(
            "libgpiod: {} channels mapped using {} numbering",
            hardware.pins.len(),
            hardware.numbering
        );
        Ok(Self {
            session: GpioSession::default(),
            hardware: hardware.clone(),
            lines: RwLock::new(FxHashMap::default()),
        })
    }

    fn pin_config(&self, channel: Channel) -> Result<&PinConfig, GpioError> {
        self.hardware.pins.get(&channel).ok_or_else(|| {
            GpioError::InvalidArgument(format!("channel {channel} is not mapped to a gpio line"))
        })
    }

    fn ensure_numbering(&self) -> Result<(), GpioError> {
        check_numbering(self.session.mode(), self.hardware.numbering)
    }

    fn make_line_settings(
        direction: Direction,
        pull: Pull,
        initial: Option<Level>,
        edge: Option<(Edge, Option<Duration>)>,
    ) -> Result<line::Settings, GpioError> {
        let mut ls = line::Settings::new()
            .map_err(|e| GpioError::Hardware(format!("libgpiod settings: {e}")))?;

        match direction {
            Direction::Out => {
                ls.set_direction(line::Direction::Output)
                    .map_err(|e| GpioError::Hardware(format!("set direction: {e}")))?;
                if let Some(level) = initial {
                    ls.set_output_value(to_value(level))
                        .map_err(|e| GpioError::Hardware(format!("set output value: {e}")))?;
                }
            }
            Direction::In => {
                ls.set_direction(line::Direction::Input)
                    .map_err(|e| GpioError::Hardware(format!("set direction: {e}")))?;
                let bias = match pull {
                    Pull::Off => None,
                    Pull::Up => Some(line::Bias::PullUp),
                    Pull::Down => Some(line::Bias::PullDown),
                };
                ls.set_bias(bias)
                    .map_err(|e| GpioError::Hardware(format!("set bias: {e}")))?;
            }
        }

        if let Some((edge, bouncetime)) = edge {
            let edge = match edge {
                Edge::Rising => line::Edge::Rising,
                Edge::Falling => line::Edge::Falling,
                Edge::Both => line::Edge::Both,
            };
            ls.set_edge_detection(Some(edge))
                .map_err(|e| GpioError::Hardware(format!("set edge detection: {e}")))?;
            ls.set_event_clock(EventClock::Realtime)
                .map_err(|e| GpioError::Hardware(format!("set event clock: {e}")))?;
            if let Some(period) = bouncetime {
                ls.set_debounce_period(period);
            }
        }

        Ok(ls)
    }

    fn make_line_config(offset: u32, settings: line::Settings) -> Result<line::Config, GpioError> {
        let mut cfg =
            line::Config::new().map_err(|e| GpioError::Hardware(format!("line config: {e}")))?;
        cfg.add_line_settings(&[offset], settings)
            .map_err(|e| GpioError::Hardware(format!("line config add settings: {e}")))?;
        Ok(cfg)
    }

    fn reconfigure(
        target: &LineTarget,
        edge: Option<(Edge, Option<Duration>)>,
    ) -> Result<(), GpioError> {
        let settings = Self::make_line_settings(target.direction, target.pull, None, edge)?;
        let line_cfg = Self::make_line_config(target.line, settings)?;
        target
            .gpiod_handle
            .lock()
            .request
            .reconfigure_lines(&line_cfg)
            .map_err(|e| GpioError::Hardware(format!("reconfigure lines: {e}")))?;
        Ok(())
    }

    /// Blocks until one edge arrives or `timeout` elapses. `None` waits forever.
    fn wait_once(target: &LineTarget, timeout: Option<Duration>) -> Result<Option<Level>, GpioError> {
        let hdl = target.gpiod_handle.lock();
        let req = &hdl.request;
        let mut buffer = request::Buffer::new(1)
            .map_err(|e| GpioError::Hardware(format!("event buffer: {e}")))?;

        let has_event = req
            .wait_edge_events(timeout)
            .map_err(|e| GpioError::Hardware(format!("wait edge events: {e}")))?;
        if !has_event {
            return Ok(None);
        }

        let events = req
            .read_edge_events(&mut buffer)
            .map_err(|e| GpioError::Hardware(format!("read edge events: {e}")))?;
        for evt in events {
            let evt = match evt {
                Ok(e) => e,
                Err(_) => continue,
            };
            match evt.event_type() {
                Ok(line::EdgeKind::Rising) => return Ok(Some(Level::High)),
                Ok(line::EdgeKind::Falling) => return Ok(Some(Level::Low)),
                Err(_) => continue,
            }
        }
        Ok(None)
    }
}

fn to_value(level: Level) -> line::Value {
    match level {
        Level::Low => line::Value::InActive,
        Level::High => line::Value::Active,
    }
}

fn not_set_up(channel: Channel) -> GpioError {
    GpioError::InvalidState(format!("channel {channel} has not been set up"))
}

fn ensure_input(target: &LineTarget, channel: Channel) -> Result<(), GpioError> {
    if target.direction != Direction::In {
        return Err(GpioError::InvalidState(format!(
            "channel {channel} must be set up as an input"
        )));
    }
    Ok(())
}

fn stop_all(listeners: Vec<EdgeListener>) {
    for listener in listeners {
        listener.stop(DEFAULT_REMOVE_TIMEOUT);
    }
}

impl GpioProvider for LibgpiodGpio {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Hardware
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
        self.ensure_numbering()?;

        let mut stale = Vec::new();
        let mut lines = self.lines.write();
        for channel in channels {
            let pin = self.pin_config(*channel)?;
            let settings =
                Self::make_line_settings(direction, options.pull, options.initial, None)?;
            let line_cfg = Self::make_line_config(pin.line, settings)?;

            match lines.get_mut(channel) {
                Some(handle) => {
                    if let Some(listener) = handle.listener.take() {
                        stale.push(listener);
                        self.session.unregister_event(*channel);
                    }
                    let reconfigured = handle
                        .target
                        .gpiod_handle
                        .lock()
                        .request
                        .reconfigure_lines(&line_cfg);
                    if let Err(e) = reconfigured {
                        drop(lines);
                        stop_all(stale);
                        return Err(GpioError::Hardware(format!("reconfigure lines: {e}")));
                    }
                    handle.target.direction = direction;
                    handle.target.pull = options.pull;
                }
                None => {
                    let gpiod_handle =
                        match GpiodHandle::new(&pin.chip, &line_cfg, &options.consumer) {
                            Ok(h) => h,
                            Err(e) => {
                                drop(lines);
                                stop_all(stale);
                                return Err(e);
                            }
                        };
                    lines.insert(
                        *channel,
                        LineHandle {
                            listener: None,
                            target: LineTarget {
                                line: pin.line,
                                direction,
                                pull: options.pull,
                                gpiod_handle: Arc::new(FairMutex::new(gpiod_handle)),
                            },
                        },
                    );
                }
            }
            self.session.record_setup(
                &[*channel],
                ChannelConfig {
                    direction,
                    pull: options.pull,
                },
            );
        }
        drop(lines);
        stop_all(stale);
        Ok(())
    }

    fn cleanup(&self, channels: Option<&[Channel]>) -> Option<GpioWarning> {
        if self.session.mode().is_none() {
            return self.session.warn(GpioWarning::NothingToCleanUp);
        }

        self.session.release(channels);
        let released: Vec<(Channel, LineHandle)> = {
            let mut lines = self.lines.write();
            let targets: Vec<Channel> = match channels {
                Some(channels) => channels.to_vec(),
                None => lines.keys().copied().collect(),
            };
            targets
                .into_iter()
                .filter_map(|ch| lines.remove(&ch).map(|handle| (ch, handle)))
                .collect()
        };

        // listener callbacks may call back into the provider, so stop them unlocked
        for (channel, mut handle) in released {
            if let Some(listener) = handle.listener.take() {
                listener.stop(DEFAULT_REMOVE_TIMEOUT);
            }
            debug!("libgpiod: released channel {channel}");
        }
        None
    }

    fn input(&self, channel: Channel) -> Result<Level, GpioError> {
        let lines = self.lines.read();
        let handle = lines.get(&channel).ok_or_else(|| not_set_up(channel))?;

        let value = handle
            .target
            .gpiod_handle
            .lock()
            .request
            .value(handle.target.line)
            .map_err(|e| GpioError::Hardware(format!("get value: {e}")))?;
        Ok(match value {
            line::Value::InActive => Level::Low,
            line::Value::Active => Level::High,
        })
    }

    fn output(&self, channels: &[Channel], levels: Levels<'_>) -> Result<(), GpioError> {
        let pairs = pair_levels(channels, levels)?;
        let lines = self.lines.read();

        for (channel, level) in pairs {
            let handle = lines.get(&channel).ok_or_else(|| not_set_up(channel))?;
            if handle.target.direction != Direction::Out {
                return Err(GpioError::InvalidState(format!(
                    "channel {channel} must be set up as an output"
                )));
            }
            handle
                .target
                .gpiod_handle
                .lock()
                .request
                .set_value(handle.target.line, to_value(level))
                .map_err(|e| GpioError::Hardware(format!("set value: {e}")))?;
        }
        Ok(())
    }

    fn add_event_detect(
        &self,
        channel: Channel,
        edge: Edge,
        options: EventDetect,
    ) -> Result<(), GpioError> {
        let bouncetime = validate_bouncetime(options.bouncetime_ms)?;

        if self.session.registration(channel).is_some() {
            debug!("libgpiod: channel {channel} already has event detection, ignoring");
            return Ok(());
        }

        let mut lines = self.lines.write();
        let handle = lines.get_mut(&channel).ok_or_else(|| not_set_up(channel))?;
        ensure_input(&handle.target, channel)?;

        // claimed under the write lock so only one caller ever starts a listener
        let dispatcher = Arc::new(EdgeDispatcher::new(options.callback));
        let registration = EventRegistration {
            edge,
            bouncetime,
            polltime: options.polltime,
            dispatcher: dispatcher.clone(),
        };
        if !self.session.register_event(channel, registration) {
            debug!("libgpiod: channel {channel} already has event detection, ignoring");
            return Ok(());
        }

        let started = Self::reconfigure(&handle.target, Some((edge, bouncetime)))
            .and_then(|()| {
                EdgeListener::new(
                    channel,
                    handle.target.gpiod_handle.clone(),
                    dispatcher,
                    options.polltime,
                )
            });
        match started {
            Ok(listener) => handle.listener = Some(listener),
            Err(e) => {
                self.session.unregister_event(channel);
                return Err(e);
            }
        }
        info!("libgpiod: watching channel {channel} for {edge:?} edges");
        Ok(())
    }

    fn remove_event_detect(&self, channel: Channel, timeout: Duration) {
        let (listener, target) = {
            let mut lines = self.lines.write();
            self.session.unregister_event(channel);
            let Some(handle) = lines.get_mut(&channel) else {
                return;
            };
            (handle.listener.take(), handle.target.clone())
        };

        if let Some(listener) = listener {
            listener.stop(timeout);
            if let Err(e) = Self::reconfigure(&target, None) {
                warn!("libgpiod: failed to disable edge detection on channel {channel}: {e}");
            }
        }
    }

    fn event_detected(&self, channel: Channel) -> bool {
        self.session
            .registration(channel)
            .map(|r| r.dispatcher.take_detected())
            .unwrap_or(false)
    }

    fn add_event_callback(
        &self,
        channel: Channel,
        callback: EdgeCallback,
    ) -> Result<(), GpioError> {
        let registration = self.session.registration(channel).ok_or_else(|| {
            GpioError::InvalidState(format!(
                "add event detection to channel {channel} before adding a callback"
            ))
        })?;
        registration.dispatcher.add_callback(callback);
        Ok(())
    }

    fn wait_for_edge(
        &self,
        channel: Channel,
        edge: Edge,
        bouncetime_ms: Option<i64>,
        timeout_ms: Option<i64>,
    ) -> Result<Option<Level>, GpioError> {
        let bouncetime = validate_bouncetime(bouncetime_ms)?;
        let timeout = validate_timeout(timeout_ms)?;

        if self.session.registration(channel).is_some() {
            return Err(GpioError::ConflictingState(format!(
                "edge detection is already enabled on channel {channel}"
            )));
        }

        let target = self
            .lines
            .read()
            .get(&channel)
            .map(|handle| handle.target.clone())
            .ok_or_else(|| not_set_up(channel))?;
        ensure_input(&target, channel)?;

        Self::reconfigure(&target, Some((edge, bouncetime)))?;
        let observed = Self::wait_once(&target, timeout);
        Self::reconfigure(&target, None)?;
        observed
    }

    fn gpio_function(&self, channel: Channel) -> Function {
        self.session
            .channel_config(channel)
            .map(|c| Function::from(c.direction))
            .unwrap_or(Function::Unknown)
    }

    fn pwm(&self, channel: Channel, _frequency_hz: f64) -> Result<Box<dyn PwmChannel>, GpioError> {
        Err(GpioError::Unsupported(format!(
            "PWM on channel {channel} is not available through libgpiod"
        )))
    }
}
