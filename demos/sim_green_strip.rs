//! Drives a simulated 17-LED strip for a few refreshes and prints what the strip receives.

use embassy_time::{Duration, Instant};
use static_cell::StaticCell;
use strip_carrier::Result;
use strip_carrier::dma::TransferState;
use strip_carrier::duration_buffer::{DurationBuffer, buffer_len};
use strip_carrier::frame::Layout;
use strip_carrier::frame::test_pattern::TestPattern;
use strip_carrier::hal::sim::SimBoard;
use strip_carrier::led_strip::{LedStrip, LedStripConfig};
use strip_carrier::timing::TimingProfile;

const LED_COUNT: usize = 17;
const LEN: usize = buffer_len(LED_COUNT);
const PROFILE: TimingProfile = TimingProfile::FULL_SPEED;

static BUFFER: StaticCell<DurationBuffer<LEN>> = StaticCell::new();
static STATE: TransferState = TransferState::new();

fn main() -> Result<()> {
    let board = SimBoard::new();
    let buffer = BUFFER.init(DurationBuffer::new(&PROFILE));
    let mut strip = LedStrip::<_, _, LED_COUNT, LEN>::new(
        board.timer(),
        board.dma(),
        buffer,
        &STATE,
        LedStripConfig::new(PROFILE),
    )?;
    println!(
        "{LED_COUNT} LEDs, {LEN} byte buffer, {} us per transfer",
        strip.transfer_duration().as_micros()
    );

    // Simulated host loop: one service call per millisecond. The board runs whatever
    // the call armed, a frame or the reset time after one.
    let mut now = Instant::from_millis(0);
    for _ in 0..100 {
        let sent = strip.service(now)?;
        board.run_until_idle(usize::MAX);
        if sent {
            let waveform = board.take_waveform();
            let frame = waveform.decode_frame::<LED_COUNT>(&PROFILE, Layout::WS2812)?;
            println!(
                "t={} ms: {} pulses, first LED {:?}, last LED {:?}",
                now.as_millis(),
                waveform.pulses().count(),
                frame[0],
                frame[LED_COUNT - 1]
            );
        }
        now += Duration::from_millis(1);
    }

    // The leading full-period pulse reads as a 1 on the first wire bit, which shows
    // once the first LED is meant to be dark.
    strip.set_pattern(TestPattern::OFF);
    strip.service(now)?;
    board.run_until_idle(usize::MAX);
    let frame = board
        .take_waveform()
        .decode_frame::<LED_COUNT>(&PROFILE, Layout::WS2812)?;
    println!("all off, as received: first LED {:?}", frame[0]);

    let stats = strip.stats();
    println!("{} transfers armed, {} dropped", stats.armed, stats.dropped);
    strip.shutdown();
    Ok(())
}
