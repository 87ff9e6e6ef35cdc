#![allow(missing_docs)]
//! Host-level tests for `LedStrip` on the simulated board.

use embassy_futures::block_on;
use embassy_time::{Duration, Instant};
use smart_leds::SmartLedsWrite;
use static_cell::StaticCell;
use strip_carrier::Error;
use strip_carrier::carrier::CarrierState;
use strip_carrier::dma::TransferState;
use strip_carrier::duration_buffer::{DurationBuffer, LeadIn, buffer_len};
use strip_carrier::frame::test_pattern::TestPattern;
use strip_carrier::frame::{Frame1d, Layout, Rgb, colors};
use strip_carrier::hal::DmaChannel;
use strip_carrier::hal::sim::{SimBoard, SimDma, SimTimer};
use strip_carrier::led_strip::{BusyPolicy, LedStrip, LedStripConfig, RefreshStats};
use strip_carrier::timing::TimingProfile;

const PROFILE: TimingProfile = TimingProfile::FULL_SPEED;
const LED_COUNT: usize = 3;
const LEN: usize = buffer_len(LED_COUNT);
const FULL_GREEN: Rgb = Rgb::new(0, 255, 0);

type SimStrip<'a> = LedStrip<SimTimer<'a>, SimDma<'a>, LED_COUNT, LEN>;

fn strip_on<'a>(
    board: &'a SimBoard,
    buffer: &'static mut DurationBuffer<LEN>,
    state: &'static TransferState,
    config: LedStripConfig,
) -> SimStrip<'a> {
    LedStrip::new(board.timer(), board.dma(), buffer, state, config).expect("valid strip")
}

/// Runs the frame in flight and the reset time after it to the end.
fn drain(board: &SimBoard, strip: &mut SimStrip<'_>) {
    board.run_until_idle(10_000);
    while !strip.poll_ready().expect("channel takes the reset time") {
        board.run_until_idle(10_000);
    }
}

fn shown(board: &SimBoard, strip: &mut SimStrip<'_>) -> Frame1d<LED_COUNT> {
    drain(board, strip);
    board
        .take_waveform()
        .decode_frame(&PROFILE, Layout::WS2812)
        .expect("complete frame")
}

fn at(millis: u64) -> Instant {
    Instant::from_millis(millis)
}

#[test]
fn new_starts_the_carrier_and_first_service_sends_green() {
    static BUFFER: StaticCell<DurationBuffer<LEN>> = StaticCell::new();
    static STATE: TransferState = TransferState::new();
    let board = SimBoard::new();
    // stale contents are reset by `new`
    let buffer = BUFFER.init(DurationBuffer::with_lead_in(&PROFILE, LeadIn::Low));
    let mut strip = strip_on(&board, buffer, &STATE, LedStripConfig::default());

    assert_eq!(strip.carrier_state(), CarrierState::Running);
    assert!(board.is_running() && board.is_routed());
    assert_eq!(strip.buffer()[0], 255);
    assert_eq!(strip.service(at(0)), Ok(true));
    assert_eq!(board.run_until_idle(10_000), LEN);
    assert_eq!(
        board.take_waveform().decode_frame(&PROFILE, Layout::WS2812),
        Ok(Frame1d::<LED_COUNT>::filled(FULL_GREEN))
    );
    assert_eq!(
        Frame1d::<LED_COUNT>::filled(FULL_GREEN),
        TestPattern::ALL_GREEN.render::<LED_COUNT>(0)
    );
    assert_eq!(
        strip.stats(),
        RefreshStats {
            armed: 1,
            dropped: 0,
            queued: 0
        }
    );
}

#[test]
fn service_honours_the_refresh_interval() {
    static BUFFER: StaticCell<DurationBuffer<LEN>> = StaticCell::new();
    static STATE: TransferState = TransferState::new();
    let board = SimBoard::new();
    let buffer = BUFFER.init(DurationBuffer::new(&PROFILE));
    let mut strip = strip_on(&board, buffer, &STATE, LedStripConfig::default());

    assert_eq!(strip.service(at(1_000)), Ok(true));
    // still streaming
    assert_eq!(strip.service(at(1_010)), Ok(false));
    drain(&board, &mut strip);
    assert_eq!(strip.service(at(1_029)), Ok(false));
    assert_eq!(strip.service(at(1_030)), Ok(true));
    drain(&board, &mut strip);
    assert_eq!(strip.service(at(1_031)), Ok(false));
    assert_eq!(strip.stats().armed, 2);
}

#[test]
fn drop_policy_rejects_refresh_mid_transfer() {
    static BUFFER: StaticCell<DurationBuffer<LEN>> = StaticCell::new();
    static STATE: TransferState = TransferState::new();
    let board = SimBoard::new();
    let buffer = BUFFER.init(DurationBuffer::new(&PROFILE));
    let mut strip = strip_on(&board, buffer, &STATE, LedStripConfig::default());

    assert_eq!(strip.refresh(), Ok(Some(1)));
    board.advance(10);
    assert_eq!(strip.refresh(), Err(Error::Busy));
    assert_eq!(strip.refresh(), Err(Error::Busy));
    assert_eq!(strip.stats().dropped, 2);
    assert_eq!(board.cursor(), 10);

    board.run_until_idle(10_000);
    // frame out, reset time only just started
    assert_eq!(strip.refresh(), Err(Error::Busy));
    assert!(strip.is_busy());
    assert_eq!(board.run_until_idle(10_000), 40);
    assert_eq!(strip.refresh(), Ok(Some(2)));
    assert_eq!(strip.stats().dropped, 3);
}

#[test]
fn queue_policy_sends_on_the_next_idle_service() {
    static BUFFER: StaticCell<DurationBuffer<LEN>> = StaticCell::new();
    static STATE: TransferState = TransferState::new();
    let board = SimBoard::new();
    let buffer = BUFFER.init(DurationBuffer::new(&PROFILE));
    let config = LedStripConfig::default()
        .with_lead_in(LeadIn::Low)
        .with_busy_policy(BusyPolicy::Queue)
        .with_refresh_interval(None);
    let mut strip = strip_on(&board, buffer, &STATE, config);

    assert_eq!(strip.service(at(0)), Ok(true));
    strip.set_frame([colors::RED, colors::BLUE, colors::WHITE]);
    assert_eq!(strip.refresh(), Ok(None));
    assert_eq!(strip.refresh(), Ok(None));
    assert_eq!(strip.stats().queued, 1);
    assert_eq!(shown(&board, &mut strip), Frame1d::filled(FULL_GREEN));

    assert_eq!(strip.service(at(5)), Ok(true));
    assert_eq!(
        shown(&board, &mut strip),
        Frame1d::from([colors::RED, colors::BLUE, colors::WHITE])
    );
    // no interval, nothing pending
    assert_eq!(strip.service(at(10_000)), Ok(false));
}

#[test]
fn back_to_back_frames_are_separated_by_the_reset_time() {
    static BUFFER: StaticCell<DurationBuffer<LEN>> = StaticCell::new();
    static STATE: TransferState = TransferState::new();
    let board = SimBoard::new();
    let buffer = BUFFER.init(DurationBuffer::new(&PROFILE));
    let config = LedStripConfig::default()
        .with_lead_in(LeadIn::Low)
        .with_busy_policy(BusyPolicy::Queue);
    let mut strip = strip_on(&board, buffer, &STATE, config);

    assert_eq!(strip.service(at(0)), Ok(true));
    strip.set_frame(Frame1d::filled(colors::WHITE));
    assert_eq!(strip.refresh(), Ok(None));
    board.run_until_idle(10_000);
    // the reset time goes out before the queued frame
    assert_eq!(strip.service(at(1)), Ok(false));
    assert_eq!(board.run_until_idle(10_000), 40);
    assert_eq!(strip.service(at(2)), Ok(true));
    board.run_until_idle(10_000);

    let waveform = board.take_waveform();
    assert_eq!(waveform.pulses().count(), 2 * LED_COUNT * 24);
    let latch_ticks = 40 * u32::from(PROFILE.period());
    assert_eq!(waveform.low_gaps().filter(|gap| *gap >= latch_ticks).count(), 1);
    assert!(waveform.low_gaps().max() >= Some(latch_ticks));
}

#[test]
fn reset_time_rounds_up_to_whole_periods() {
    let config = LedStripConfig::default();
    assert_eq!(config.reset_time, Duration::from_micros(50));
    assert_eq!(config.reset_periods(), 40);
    assert_eq!(LedStripConfig::new(TimingProfile::HALF_SPEED).reset_periods(), 40);
    assert_eq!(config.with_reset_time(Duration::from_micros(51)).reset_periods(), 41);
    assert_eq!(config.with_reset_time(Duration::from_micros(300)).reset_periods(), 240);
}

#[test]
fn long_reset_time_spans_several_transfers() {
    static BUFFER: StaticCell<DurationBuffer<LEN>> = StaticCell::new();
    static STATE: TransferState = TransferState::new();
    let board = SimBoard::new();
    let buffer = BUFFER.init(DurationBuffer::new(&PROFILE));
    let config = LedStripConfig::default().with_reset_time(Duration::from_micros(300));
    let mut strip = strip_on(&board, buffer, &STATE, config);

    assert_eq!(strip.refresh(), Ok(Some(1)));
    board.run_until_idle(10_000);
    let mut held = 0;
    while !strip.poll_ready().expect("channel takes the reset time") {
        held += board.run_until_idle(10_000);
    }
    assert_eq!(held, 240);
    assert_eq!(strip.refresh(), Ok(Some(2)));
}

#[test]
fn zero_reset_time_rearms_at_once() {
    static BUFFER: StaticCell<DurationBuffer<LEN>> = StaticCell::new();
    static STATE: TransferState = TransferState::new();
    let board = SimBoard::new();
    let buffer = BUFFER.init(DurationBuffer::new(&PROFILE));
    let config = LedStripConfig::default().with_reset_time(Duration::from_micros(0));
    let mut strip = strip_on(&board, buffer, &STATE, config);

    assert_eq!(strip.refresh(), Ok(Some(1)));
    board.run_until_idle(10_000);
    assert!(!strip.is_busy());
    assert_eq!(strip.refresh(), Ok(Some(2)));
}

#[test]
fn chase_pattern_advances_once_per_refresh() {
    static BUFFER: StaticCell<DurationBuffer<LEN>> = StaticCell::new();
    static STATE: TransferState = TransferState::new();
    let board = SimBoard::new();
    let buffer = BUFFER.init(DurationBuffer::new(&PROFILE));
    let config = LedStripConfig::default().with_lead_in(LeadIn::Low);
    let mut strip = strip_on(&board, buffer, &STATE, config);
    strip.set_pattern(TestPattern::Chase {
        color: colors::WHITE,
        background: colors::BLACK,
    });

    let mut lit = Vec::new();
    for refresh in 0..4 {
        assert_eq!(strip.service(at(refresh * 30)), Ok(true));
        let frame = shown(&board, &mut strip);
        lit.push(frame.iter().position(|pixel| *pixel == colors::WHITE));
    }
    assert_eq!(lit, [Some(0), Some(1), Some(2), Some(0)]);
}

#[test]
fn smart_leds_write_checks_length_and_busy() {
    static BUFFER: StaticCell<DurationBuffer<LEN>> = StaticCell::new();
    static STATE: TransferState = TransferState::new();
    let board = SimBoard::new();
    let buffer = BUFFER.init(DurationBuffer::new(&PROFILE));
    let config = LedStripConfig::default().with_lead_in(LeadIn::Low);
    let mut strip = strip_on(&board, buffer, &STATE, config);

    assert_eq!(
        strip.write([colors::BLUE; 2]),
        Err(Error::PatternLength {
            expected: 3,
            actual: 2
        })
    );
    assert_eq!(strip.write([colors::BLUE; 3]), Ok(()));
    assert_eq!(strip.write([colors::RED; 3]), Err(Error::Busy));
    assert_eq!(shown(&board, &mut strip), Frame1d::filled(colors::BLUE));
    assert_eq!(strip.frame(), Frame1d::filled(colors::RED));
}

#[test]
fn wait_idle_reports_the_finished_generation() {
    static BUFFER: StaticCell<DurationBuffer<LEN>> = StaticCell::new();
    static STATE: TransferState = TransferState::new();
    let board = SimBoard::new();
    let buffer = BUFFER.init(DurationBuffer::new(&PROFILE));
    let mut strip = strip_on(&board, buffer, &STATE, LedStripConfig::default());

    strip.refresh().expect("idle strip");
    assert!(strip.is_busy());
    board.run_until_idle(10_000);
    assert_eq!(block_on(strip.wait_idle()), 1);
    // the reset time is still owed
    assert!(strip.is_busy());
    assert_eq!(strip.poll_ready(), Ok(false));
    board.run_until_idle(10_000);
    assert_eq!(strip.poll_ready(), Ok(true));
    assert!(!strip.is_busy());
}

#[test]
fn shutdown_aborts_and_releases_everything() {
    static BUFFER: StaticCell<DurationBuffer<LEN>> = StaticCell::new();
    static STATE: TransferState = TransferState::new();
    let board = SimBoard::new();
    let buffer = BUFFER.init(DurationBuffer::new(&PROFILE));
    let mut strip = strip_on(&board, buffer, &STATE, LedStripConfig::default());

    strip.refresh().expect("idle strip");
    board.advance(5);
    let (_timer, dma, buffer) = strip.shutdown();
    assert!(!dma.is_armed());
    assert!(!board.is_running());
    assert!(!board.is_routed());
    assert!(!STATE.is_in_flight());
    assert_eq!(buffer.len(), LEN);
    assert_eq!(board.advance(100), 0);
}

#[test]
fn transfer_duration_covers_the_whole_buffer() {
    static BUFFER: StaticCell<DurationBuffer<LEN>> = StaticCell::new();
    static STATE: TransferState = TransferState::new();
    let board = SimBoard::new();
    let buffer = BUFFER.init(DurationBuffer::new(&PROFILE));
    let strip = strip_on(&board, buffer, &STATE, LedStripConfig::default());

    // 74 periods of 1.25 us
    assert_eq!(strip.transfer_duration(), Duration::from_micros(93));
    assert_eq!(SimStrip::LED_COUNT, 3);
}
