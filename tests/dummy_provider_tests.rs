use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use robothead::{
    DEFAULT_REMOVE_TIMEOUT, Direction, DummyGpio, DummyPwm, Edge, EdgeCallback, EventDetect,
    Function, GpioError, GpioProvider, GpioWarning, Level, Levels, Mode, ProviderKind, Pull,
    PwmChannel, SetupOptions,
};

fn counting_callback(counter: &Arc<AtomicUsize>) -> EdgeCallback {
    let counter = counter.clone();
    Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn reports_dummy_kind() {
    let gpio = DummyGpio::new();
    assert_eq!(gpio.kind(), ProviderKind::Dummy);
    assert_eq!(gpio.mode(), None);
}

#[test]
fn invalid_direction_is_rejected_without_touching_state() {
    let gpio = DummyGpio::new();

    let result = Direction::try_from(7)
        .and_then(|direction| gpio.setup(&[12], direction, &SetupOptions::default()));

    assert!(matches!(result, Err(GpioError::InvalidArgument(_))));
    assert_eq!(gpio.mode(), None);
    assert!(gpio.session().configured_channels().is_empty());
}

#[test]
fn invalid_pull_code_is_rejected() {
    assert!(matches!(
        Pull::try_from(5),
        Err(GpioError::InvalidArgument(_))
    ));
    assert_eq!(Pull::try_from(2).unwrap(), Pull::Up);
    assert_eq!(Pull::try_from(1).unwrap(), Pull::Down);
    assert_eq!(Pull::try_from(0).unwrap(), Pull::Off);
}

#[test]
fn pull_resistor_on_output_is_rejected_for_every_channel() {
    let gpio = DummyGpio::new();

    for channel in [1, 7, 12, 40] {
        for pull in [Pull::Up, Pull::Down] {
            let result = gpio.setup(&[channel], Direction::Out, &SetupOptions::with_pull(pull));
            assert!(
                matches!(result, Err(GpioError::InvalidArgument(_))),
                "channel {channel} with {pull:?} should be rejected"
            );
        }
    }
    assert!(gpio.session().configured_channels().is_empty());
}

#[test]
fn setup_records_channel_configuration() {
    let gpio = DummyGpio::new();

    gpio.setup(&[11, 13], Direction::In, &SetupOptions::with_pull(Pull::Up))
        .unwrap();
    gpio.setup(&[15], Direction::Out, &SetupOptions::with_initial(Level::Low))
        .unwrap();

    assert_eq!(gpio.session().configured_channels(), vec![11, 13, 15]);
    let cfg = gpio.session().channel_config(13).unwrap();
    assert_eq!(cfg.direction, Direction::In);
    assert_eq!(cfg.pull, Pull::Up);
    assert_eq!(
        gpio.session().channel_config(15).unwrap().direction,
        Direction::Out
    );
}

#[test]
fn set_mode_is_idempotent_but_never_switches() {
    let gpio = DummyGpio::new();

    gpio.set_mode(Mode::Board).unwrap();
    gpio.set_mode(Mode::Board).unwrap();
    assert_eq!(gpio.mode(), Some(Mode::Board));

    let result = gpio.set_mode(Mode::Bcm);
    assert!(matches!(result, Err(GpioError::ConflictingState(_))));
    assert_eq!(gpio.mode(), Some(Mode::Board));
}

#[test]
fn unknown_mode_code_is_rejected() {
    let gpio = DummyGpio::new();

    let result = Mode::try_from(42).and_then(|mode| gpio.set_mode(mode));

    assert!(matches!(result, Err(GpioError::InvalidArgument(_))));
    assert_eq!(gpio.mode(), None);
    assert_eq!(Mode::try_from(1000).unwrap(), Mode::TegraSoc);
    assert_eq!(Mode::Cvm.code(), 1001);
}

#[test]
fn duplicate_event_detect_keeps_first_registration() {
    let gpio = DummyGpio::new();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    gpio.add_event_detect(
        7,
        Edge::Falling,
        EventDetect {
            callback: Some(counting_callback(&first)),
            bouncetime_ms: Some(20),
            ..EventDetect::default()
        },
    )
    .unwrap();
    gpio.add_event_detect(
        7,
        Edge::Rising,
        EventDetect {
            callback: Some(counting_callback(&second)),
            bouncetime_ms: Some(300),
            ..EventDetect::default()
        },
    )
    .unwrap();

    let registration = gpio.session().registration(7).unwrap();
    assert_eq!(registration.edge, Edge::Falling);
    assert_eq!(registration.bouncetime, Some(Duration::from_millis(20)));
    assert_eq!(registration.dispatcher.callback_count(), 1);

    registration.dispatcher.dispatch();
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 0);
    assert!(!gpio.event_detected(7));
}

#[test]
fn negative_bouncetime_is_rejected_before_registering() {
    let gpio = DummyGpio::new();

    let result = gpio.add_event_detect(
        7,
        Edge::Both,
        EventDetect {
            bouncetime_ms: Some(-1),
            ..EventDetect::default()
        },
    );

    assert!(matches!(result, Err(GpioError::InvalidArgument(_))));
    assert!(gpio.session().registration(7).is_none());
}

#[test]
fn invalid_edge_code_is_rejected() {
    assert!(matches!(
        Edge::try_from(0),
        Err(GpioError::InvalidArgument(_))
    ));
    assert_eq!(Edge::try_from(2).unwrap(), Edge::Falling);
}

#[test]
fn remove_event_detect_allows_new_registration() {
    let gpio = DummyGpio::new();

    gpio.remove_event_detect(9, DEFAULT_REMOVE_TIMEOUT);

    gpio.add_event_detect(9, Edge::Falling, EventDetect::default())
        .unwrap();
    gpio.remove_event_detect(9, DEFAULT_REMOVE_TIMEOUT);
    assert!(gpio.session().registration(9).is_none());

    gpio.add_event_detect(9, Edge::Rising, EventDetect::default())
        .unwrap();
    assert_eq!(gpio.session().registration(9).unwrap().edge, Edge::Rising);
}

#[test]
fn add_event_callback_attaches_to_existing_registration() {
    let gpio = DummyGpio::new();
    let hits = Arc::new(AtomicUsize::new(0));

    // no registration yet: accepted and dropped
    gpio.add_event_callback(3, counting_callback(&hits)).unwrap();
    assert!(gpio.session().registration(3).is_none());

    gpio.add_event_detect(3, Edge::Both, EventDetect::default())
        .unwrap();
    gpio.add_event_callback(3, counting_callback(&hits)).unwrap();
    gpio.add_event_callback(3, counting_callback(&hits)).unwrap();

    let registration = gpio.session().registration(3).unwrap();
    assert_eq!(registration.dispatcher.callback_count(), 2);
    registration.dispatcher.dispatch();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn input_always_reads_high() {
    let gpio = DummyGpio::new();
    gpio.setup(&[18], Direction::Out, &SetupOptions::default())
        .unwrap();

    gpio.output(&[18], Level::Low.into()).unwrap();
    assert_eq!(gpio.input(18).unwrap(), Level::High);

    gpio.output(&[18], Level::High.into()).unwrap();
    assert_eq!(gpio.input(18).unwrap(), Level::High);
    assert_eq!(gpio.input(99).unwrap(), Level::High);
}

#[test]
fn output_requires_matching_level_count() {
    let gpio = DummyGpio::new();

    gpio.output(&[1, 2, 3], Levels::Uniform(Level::High))
        .unwrap();
    gpio.output(&[1, 2], Levels::PerChannel(&[Level::High, Level::Low]))
        .unwrap();

    let result = gpio.output(&[1, 2, 3], Levels::PerChannel(&[Level::High]));
    assert!(matches!(result, Err(GpioError::InvalidArgument(_))));
}

#[test]
fn wait_for_edge_validates_before_returning_nothing() {
    let gpio = DummyGpio::new();

    let result = gpio.wait_for_edge(5, Edge::Rising, None, Some(-10));
    assert!(matches!(result, Err(GpioError::InvalidArgument(_))));

    let result = gpio.wait_for_edge(5, Edge::Rising, Some(-1), None);
    assert!(matches!(result, Err(GpioError::InvalidArgument(_))));

    assert_eq!(gpio.wait_for_edge(5, Edge::Both, Some(0), Some(0)).unwrap(), None);
    assert_eq!(gpio.wait_for_edge(5, Edge::Falling, None, None).unwrap(), None);
}

#[test]
fn event_detected_and_gpio_function_are_fixed() {
    let gpio = DummyGpio::new();
    gpio.setup(&[4], Direction::In, &SetupOptions::default())
        .unwrap();
    gpio.add_event_detect(4, Edge::Rising, EventDetect::default())
        .unwrap();

    assert!(!gpio.event_detected(4));
    assert_eq!(gpio.gpio_function(4), Function::Unknown);
    assert_eq!(Function::Unknown.code(), -1);
}

#[test]
fn cleanup_without_mode_warns_only_when_enabled() {
    let gpio = DummyGpio::new();

    assert_eq!(gpio.cleanup(None), None);

    gpio.set_warnings(true);
    assert_eq!(gpio.cleanup(None), Some(GpioWarning::NothingToCleanUp));

    gpio.set_warnings(false);
    assert_eq!(gpio.cleanup(Some(&[1, 2])), None);
}

#[test]
fn cleanup_releases_selected_or_all_channels() {
    let gpio = DummyGpio::new();
    gpio.set_warnings(true);
    gpio.set_mode(Mode::Bcm).unwrap();
    gpio.setup(&[5, 6, 13], Direction::In, &SetupOptions::default())
        .unwrap();
    gpio.add_event_detect(6, Edge::Falling, EventDetect::default())
        .unwrap();

    assert_eq!(gpio.cleanup(Some(&[6])), None);
    assert_eq!(gpio.session().configured_channels(), vec![5, 13]);
    assert!(gpio.session().registration(6).is_none());

    assert_eq!(gpio.cleanup(None), None);
    assert!(gpio.session().configured_channels().is_empty());

    // redundant cleanup is harmless
    assert_eq!(gpio.cleanup(None), None);
    assert_eq!(gpio.mode(), Some(Mode::Bcm));
}

#[test]
fn pwm_session_keeps_negated_frequency() {
    let gpio = DummyGpio::new();
    let mut pwm = gpio.pwm(33, 50.0).unwrap();

    assert_eq!(pwm.channel(), 33);
    assert_eq!(pwm.frequency_hz(), -50.0);
    assert!(!pwm.is_started());

    pwm.start(7.5).unwrap();
    pwm.change_frequency(60.0).unwrap();
    pwm.change_duty_cycle(10.0).unwrap();
    pwm.stop();

    assert_eq!(pwm.frequency_hz(), -50.0);
    assert!(!pwm.is_started());

    let direct = DummyPwm::new(32, 1000.0);
    assert_eq!(direct.frequency_hz(), -1000.0);
}

#[test]
fn provider_is_usable_behind_trait_object() {
    let gpio: Arc<dyn GpioProvider> = Arc::new(DummyGpio::new());

    gpio.set_mode(Mode::Board).unwrap();
    gpio.setup(&[7], Direction::In, &SetupOptions::default())
        .unwrap();
    gpio.add_event_detect(7, Edge::Falling, EventDetect::default())
        .unwrap();

    assert_eq!(gpio.mode(), Some(Mode::Board));
    assert_eq!(gpio.cleanup(None), None);
}
