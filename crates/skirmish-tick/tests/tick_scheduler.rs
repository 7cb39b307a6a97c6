//! Integration tests for the tick scheduler and timer queue.
//!
//! Uses paused Tokio time so `sleep_until` resolves as soon as the runtime
//! auto-advances the clock.

use std::time::Duration;

use skirmish_tick::{TickConfig, TickScheduler, TimerQueue, TimerSlot};

// =========================================================================
// Helpers
// =========================================================================

fn config_1hz() -> TickConfig {
    TickConfig {
        initial_jitter_us: 0,
        ..TickConfig::default()
    }
}

// =========================================================================
// TickConfig
// =========================================================================

#[test]
fn test_default_config_ticks_once_per_second() {
    let cfg = TickConfig::default();
    assert_eq!(cfg.tick_rate_hz, 1);
    assert_eq!(cfg.tick_duration(), Duration::from_secs(1));
}

#[test]
fn test_validated_raises_zero_rate_to_one() {
    let cfg = TickConfig::with_rate(0).validated();
    assert_eq!(cfg.tick_rate_hz, 1);
}

#[test]
fn test_validated_caps_rate_at_maximum() {
    let cfg = TickConfig::with_rate(500).validated();
    assert_eq!(cfg.tick_rate_hz, TickConfig::MAX_TICK_RATE_HZ);
}

#[test]
fn test_with_rate_sets_duration() {
    let cfg = TickConfig::with_rate(10);
    assert_eq!(cfg.tick_duration(), Duration::from_millis(100));
}

// =========================================================================
// Scheduler
// =========================================================================

#[test]
fn test_scheduler_initial_state() {
    let s = TickScheduler::new(config_1hz());
    assert_eq!(s.tick_count(), 0);
    assert_eq!(s.tick_rate_hz(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_fires_and_increments() {
    let mut s = TickScheduler::new(config_1hz());

    let info = s.wait_for_tick().await;
    assert_eq!(info.tick, 1);
    assert_eq!(info.dt, Duration::from_secs(1));
    assert!(!info.overrun);
    assert_eq!(info.ticks_skipped, 0);
}

#[tokio::test(start_paused = true)]
async fn test_ticks_are_one_second_apart() {
    let mut s = TickScheduler::new(config_1hz());
    let start = tokio::time::Instant::now();

    for expected in 1..=3 {
        let info = s.wait_for_tick().await;
        assert_eq!(info.tick, expected);
    }
    assert_eq!(start.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_record_tick_end_without_wait_is_none() {
    let mut s = TickScheduler::new(config_1hz());
    assert!(s.record_tick_end().is_none());

    s.wait_for_tick().await;
    assert!(s.record_tick_end().is_some());
    assert!(s.record_tick_end().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stall_skips_ticks_then_resumes_full_period() {
    let mut s = TickScheduler::new(config_1hz());
    s.wait_for_tick().await;

    // Simulate the actor being busy for 3.5 ticks.
    tokio::time::advance(Duration::from_millis(3_500)).await;
    let info = s.wait_for_tick().await;
    assert!(info.overrun);
    assert_eq!(info.ticks_skipped, 2);

    // The schedule restarts from the late tick instead of bursting.
    let before = tokio::time::Instant::now();
    let info = s.wait_for_tick().await;
    assert!(!info.overrun);
    assert_eq!(before.elapsed(), Duration::from_secs(1));
}

// =========================================================================
// select! loop with timers (mirrors the orchestrator actor)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_select_loop_drives_timer_queue() {
    let mut s = TickScheduler::new(config_1hz());
    let mut timers = TimerQueue::new();
    let mut slot = TimerSlot::Idle;
    slot.arm(timers.schedule(3, "countdown"));

    let (tx, mut rx) = tokio::sync::mpsc::channel::<&str>(4);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        tx.send("stop").await.ok();
    });

    let mut fired_at = None;
    loop {
        tokio::select! {
            Some(cmd) = rx.recv() => {
                assert_eq!(cmd, "stop");
                break;
            }
            info = s.wait_for_tick() => {
                for (token, event) in timers.advance() {
                    if slot.holds(token) {
                        slot.disarm();
                        assert_eq!(event, "countdown");
                        fired_at = Some(info.tick);
                    }
                }
                s.record_tick_end();
            }
        }
    }

    assert_eq!(fired_at, Some(3));
    assert!(slot.is_idle());
}
