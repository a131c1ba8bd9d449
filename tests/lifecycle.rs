//! 连接生命周期集成测试：排空扫描、滑动空闲窗口、强制丢弃
//! Connection lifecycle integration tests: drain sweeps, the sliding idle
//! window, and forced drops

pub mod common;

use common::harness::{entries, CallLog, LifecycleHarness, ScriptedConnection};
use merlin_acceptor::{DrainState, Managed};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

fn new_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// A manager-style graceful shutdown: one notify sweep over the whole
/// population, then a close sweep. Every connection sees each hook exactly
/// once, notify strictly before close, and repeating either sweep changes
/// nothing.
#[tokio::test]
async fn test_graceful_drain_sweeps_population_in_two_phases() {
    let harness = LifecycleHarness::with_idle_timeout(Duration::from_secs(5));
    let log = new_log();
    let mut population = harness.population(3, &log).await;

    for managed in population.iter_mut() {
        managed.fire_notify_pending_shutdown();
    }
    for managed in population.iter_mut() {
        managed.fire_close_when_idle(false);
    }
    // 再扫一遍必须毫无效果
    // A second pass over both phases must have no effect
    for managed in population.iter_mut() {
        managed.fire_notify_pending_shutdown();
        managed.fire_close_when_idle(false);
    }

    let recorded = entries(&log);
    assert_eq!(recorded.len(), 6);
    for index in 0..3 {
        let notify = format!("conn{}:notify_pending_shutdown", index);
        let close = format!("conn{}:close_when_idle", index);
        let notify_at = recorded.iter().position(|entry| *entry == notify);
        let close_at = recorded.iter().position(|entry| *entry == close);
        assert!(notify_at.is_some() && close_at.is_some());
        assert!(notify_at < close_at);
    }
    for managed in &population {
        assert_eq!(managed.drain_state(), DrainState::ClosingWhenIdle);
    }

    for managed in population.iter_mut() {
        managed.detach().await;
    }
    harness.shutdown().await;
}

/// A hard shutdown skips the notify phase entirely.
#[tokio::test]
async fn test_forced_close_needs_no_prior_notify() {
    let harness = LifecycleHarness::with_idle_timeout(Duration::from_secs(5));
    let log = new_log();
    let mut population = harness.population(2, &log).await;

    for managed in population.iter_mut() {
        managed.fire_close_when_idle(true);
    }

    let recorded = entries(&log);
    assert_eq!(
        recorded,
        vec!["conn0:close_when_idle", "conn1:close_when_idle"]
    );

    for managed in population.iter_mut() {
        managed.detach().await;
    }
    harness.shutdown().await;
}

/// Forcibly dropping a connection invokes only the drop hook, never the
/// drain hooks, and leaves the connection immediately destroyable.
#[tokio::test]
async fn test_drop_connection_fires_no_drain_hooks() {
    let harness = LifecycleHarness::with_idle_timeout(Duration::from_secs(5));
    let log = new_log();
    let mut population = harness.population(1, &log).await;
    let managed = &mut population[0];

    assert!(managed.drop_connection());
    assert_eq!(entries(&log), vec!["conn0:drop_connection"]);
    assert_eq!(managed.drain_state(), DrainState::None);
    assert!(managed.can_destroy());

    managed.detach().await;
    harness.shutdown().await;
}

/// The sliding-window contract with a 60000ms interval: resets at 59999ms
/// keep pushing the deadline, and only a full window with no reset fires
/// the expiry callback.
#[tokio::test(start_paused = true)]
async fn test_sliding_idle_window_only_expires_without_reset() {
    let window = Duration::from_millis(60_000);
    let harness = LifecycleHarness::with_idle_timeout(window);
    let log = new_log();
    let mut population = harness.population(1, &log).await;
    let managed = &mut population[0];

    managed.reset_timeout().await.unwrap();

    // 两次都在到期前1ms重置，连接可以无限期存活
    // Two resets at 1ms before expiry, the connection lives indefinitely
    for _ in 0..2 {
        sleep(Duration::from_millis(59_999)).await;
        managed.poll_timeout_events();
        assert!(entries(&log).is_empty());
        managed.reset_timeout().await.unwrap();
    }

    // 完整窗口内无重置，回调恰好触发一次
    // A full window with no reset fires the callback exactly once
    sleep(window + Duration::from_millis(1)).await;
    managed.poll_timeout_events();
    assert_eq!(entries(&log), vec!["conn0:timeout_expired"]);

    managed.detach().await;
    harness.shutdown().await;
}

/// Connections sharing one facility expire independently, each on its own
/// deadline.
#[tokio::test(start_paused = true)]
async fn test_idle_expiry_is_per_connection() {
    let harness = LifecycleHarness::with_idle_timeout(Duration::from_millis(100));
    let log = new_log();
    let mut population = harness.population(2, &log).await;

    population[0].reset_timeout().await.unwrap();
    population[1]
        .reset_timeout_to(Duration::from_millis(300))
        .await
        .unwrap();

    sleep(Duration::from_millis(150)).await;
    for managed in population.iter_mut() {
        managed.poll_timeout_events();
    }
    assert_eq!(entries(&log), vec!["conn0:timeout_expired"]);

    sleep(Duration::from_millis(200)).await;
    for managed in population.iter_mut() {
        managed.poll_timeout_events();
    }
    assert_eq!(
        entries(&log),
        vec!["conn0:timeout_expired", "conn1:timeout_expired"]
    );

    for managed in population.iter_mut() {
        managed.detach().await;
    }
    harness.shutdown().await;
}

/// A pre-shutdown eviction pass closes connections idle beyond the
/// threshold, but a connection reporting zero idle time is exempt no
/// matter the threshold.
#[tokio::test]
async fn test_idle_eviction_pass_exempts_zero_idle_time() {
    let harness = LifecycleHarness::with_idle_timeout(Duration::from_secs(5));
    let log = new_log();
    let mut population = harness.population(3, &log).await;
    population[0].connection_mut().idle_for = Duration::from_secs(30);
    population[1].connection_mut().idle_for = Duration::ZERO;
    population[2].connection_mut().idle_for = Duration::from_secs(2);

    let threshold = Duration::from_secs(10);
    for managed in population.iter_mut() {
        if managed.idle_eviction_candidate(threshold) {
            managed.fire_close_when_idle(true);
        }
    }

    // 只有超过阈值且非零空闲的连接被驱逐
    // Only the connection both above threshold and non-zero idle is evicted
    assert_eq!(entries(&log), vec!["conn0:close_when_idle"]);
    assert_eq!(population[1].drain_state(), DrainState::None);
    assert_eq!(population[2].drain_state(), DrainState::None);

    for managed in population.iter_mut() {
        managed.detach().await;
    }
    harness.shutdown().await;
}

/// Detaching removes the membership entry and invalidates the pending
/// idle registration; later resets degenerate to no-ops.
#[tokio::test(start_paused = true)]
async fn test_detach_invalidates_registrations_and_membership() {
    let harness = LifecycleHarness::with_idle_timeout(Duration::from_millis(50));
    let log = new_log();
    let mut population = harness.population(1, &log).await;
    let managed = &mut population[0];
    let id = managed.connection_id().unwrap();
    assert!(harness.ctx.registry().contains(id));

    managed.reset_timeout().await.unwrap();
    managed.detach().await;
    assert!(!harness.ctx.registry().contains(id));
    assert!(managed.connection_id().is_none());

    sleep(Duration::from_millis(100)).await;
    managed.poll_timeout_events();
    assert!(entries(&log).is_empty());

    managed.reset_timeout().await.unwrap();
    sleep(Duration::from_millis(100)).await;
    managed.poll_timeout_events();
    assert!(entries(&log).is_empty());

    harness.shutdown().await;
}

/// A connection whose manager has been dropped keeps working: drain and
/// drop paths still run, and timeout resets become no-ops instead of
/// errors.
#[tokio::test]
async fn test_connection_outlives_its_manager() {
    let harness = LifecycleHarness::with_idle_timeout(Duration::from_secs(5));
    let log = new_log();
    let conn = ScriptedConnection::new("orphan", log.clone());
    let mut managed = Managed::attached(conn, &harness.ctx).await;

    harness.shutdown().await;
    // 此时弱引用已无法升级
    // The weak back-reference no longer upgrades at this point
    assert!(managed.manager().is_none());

    managed.reset_timeout().await.unwrap();
    managed.fire_notify_pending_shutdown();
    managed.fire_close_when_idle(false);
    assert!(managed.drop_connection());
    assert_eq!(
        entries(&log),
        vec![
            "orphan:notify_pending_shutdown",
            "orphan:close_when_idle",
            "orphan:drop_connection"
        ]
    );
}

/// Diagnostics sweep: dumping state reaches every connection and mutates
/// nothing.
#[tokio::test]
async fn test_dump_state_sweep_is_read_only() {
    let harness = LifecycleHarness::with_idle_timeout(Duration::from_secs(5));
    let log = new_log();
    let mut population = harness.population(2, &log).await;

    for managed in &population {
        managed.dump_state(1);
    }

    assert_eq!(entries(&log), vec!["conn0:dump_state", "conn1:dump_state"]);
    for managed in &population {
        assert_eq!(managed.drain_state(), DrainState::None);
    }

    for managed in population.iter_mut() {
        managed.detach().await;
    }
    harness.shutdown().await;
}
