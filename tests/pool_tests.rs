//! Browser pool properties: bounded concurrency, guaranteed release,
//! launch-failure tolerance, draining, and load balancing.

mod common;

use common::{FakeDriver, SessionState};
use gatepass::browser::BrowserPool;
use gatepass::config::PoolConfig;
use gatepass::error::{Error, PoolError};
use gatepass::metrics::Metrics;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn pool(state: &Arc<SessionState>, processes: usize, per_process: usize) -> Arc<BrowserPool> {
    common::test_pool(state, processes, per_process)
}

#[tokio::test]
async fn acquire_fails_before_initialize() {
    let state = SessionState::new();
    let pool = pool(&state, 1, 2);

    let err = pool.acquire(None).await.unwrap_err();
    assert!(matches!(err, Error::Pool(PoolError::ResourceExhausted(_))));
}

#[tokio::test]
async fn initialize_is_idempotent() {
    let state = SessionState::new();
    let driver = FakeDriver::new(Arc::clone(&state));
    let pool = Arc::new(BrowserPool::new(
        Arc::clone(&driver) as Arc<dyn gatepass::driver::BrowserDriver>,
        PoolConfig::builder().process_count(3).build(),
        Arc::new(Metrics::new()),
    ));

    pool.initialize().await.unwrap();
    pool.initialize().await.unwrap();
    assert_eq!(driver.launches.load(Ordering::SeqCst), 3);
    assert_eq!(pool.stats().await.process_count, 3);
}

#[tokio::test]
async fn partial_launch_failures_are_tolerated() {
    let state = SessionState::new();
    let driver = FakeDriver::failing_first(Arc::clone(&state), 2);
    let pool = Arc::new(BrowserPool::new(
        driver,
        PoolConfig::builder().process_count(4).build(),
        Arc::new(Metrics::new()),
    ));

    pool.initialize().await.unwrap();
    assert_eq!(pool.stats().await.process_count, 2);

    // The survivors still serve sessions
    let session = pool.acquire(None).await.unwrap();
    pool.release(session).await;
}

#[tokio::test]
async fn zero_successful_launches_is_fatal() {
    let state = SessionState::new();
    let driver = FakeDriver::failing_first(Arc::clone(&state), 2);
    let pool = Arc::new(BrowserPool::new(
        driver,
        PoolConfig::builder().process_count(2).build(),
        Arc::new(Metrics::new()),
    ));

    let err = pool.initialize().await.unwrap_err();
    assert!(matches!(err, Error::Pool(PoolError::NoProcesses)));
}

#[tokio::test]
async fn bounded_concurrency_never_exceeds_capacity() {
    let state = SessionState::new();
    *state.session_delay.lock() = Duration::from_millis(5);
    let pool = pool(&state, 2, 3); // capacity 6
    pool.initialize().await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            let session = pool.acquire(None).await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            pool.release(session).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(
        state.max_active.load(Ordering::SeqCst) <= 6,
        "high-water mark {} exceeded capacity",
        state.max_active.load(Ordering::SeqCst)
    );
    assert_eq!(state.active.load(Ordering::SeqCst), 0);
    assert_eq!(pool.active_sessions(), 0);
}

#[tokio::test]
async fn third_caller_blocks_until_release() {
    let state = SessionState::new();
    let pool = pool(&state, 2, 1); // capacity 2
    pool.initialize().await.unwrap();

    let first = pool.acquire(None).await.unwrap();
    let second = pool.acquire(None).await.unwrap();

    // Third acquisition must not complete while both slots are held
    let blocked = tokio::time::timeout(Duration::from_millis(100), pool.acquire(None)).await;
    assert!(blocked.is_err(), "third caller should still be waiting");

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire(None).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    pool.release(first).await;

    let third = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("third caller should unblock after a release")
        .unwrap()
        .unwrap();

    pool.release(second).await;
    pool.release(third).await;
    assert_eq!(state.active.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn sessions_release_even_when_work_fails() {
    let state = SessionState::new();
    let pool = pool(&state, 1, 4);
    pool.initialize().await.unwrap();

    for i in 0..8 {
        let session = pool.acquire(None).await.unwrap();
        let work: Result<(), &str> = if i % 2 == 0 { Ok(()) } else { Err("boom") };
        // Release runs on both paths, mirroring the orchestrator discipline
        pool.release(session).await;
        let _ = work;
    }

    assert_eq!(state.opened.load(Ordering::SeqCst), 8);
    assert_eq!(state.closed.load(Ordering::SeqCst), 8);
    assert_eq!(state.active.load(Ordering::SeqCst), 0);
    assert_eq!(pool.active_sessions(), 0);
}

#[tokio::test]
async fn waiters_are_not_starved_under_churn() {
    let state = SessionState::new();
    let pool = pool(&state, 1, 2); // capacity 2, heavy contention
    pool.initialize().await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..30 {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            let session = pool.acquire(None).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
            pool.release(session).await;
        }));
    }

    // Every waiter completes within a bounded window
    let all = futures::future::join_all(handles);
    let done = tokio::time::timeout(Duration::from_secs(10), all)
        .await
        .expect("every contending caller should eventually acquire");
    assert!(done.into_iter().all(|r| r.is_ok()));
    assert_eq!(state.active.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn acquisitions_balance_across_processes() {
    let state = SessionState::new();
    let pool = pool(&state, 2, 4); // capacity 8
    pool.initialize().await.unwrap();

    let mut sessions = Vec::new();
    for _ in 0..6 {
        sessions.push(pool.acquire(None).await.unwrap());
    }

    let stats = pool.stats().await;
    for process in &stats.processes {
        assert_eq!(
            process.active_sessions, 3,
            "least-loaded selection should spread sessions evenly"
        );
    }

    for session in sessions {
        pool.release(session).await;
    }
}

#[tokio::test]
async fn shutdown_rejects_new_acquires_and_is_idempotent() {
    let state = SessionState::new();
    let pool = pool(&state, 1, 2);
    pool.initialize().await.unwrap();

    let held = pool.acquire(None).await.unwrap();
    let release_pool = Arc::clone(&pool);
    let releaser = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        release_pool.release(held).await;
    });

    pool.shutdown().await;
    pool.shutdown().await; // second call is a no-op
    releaser.await.unwrap();

    let err = pool.acquire(None).await.unwrap_err();
    assert!(matches!(err, Error::Pool(PoolError::ResourceExhausted(_))));
}

#[tokio::test]
async fn shutdown_force_closes_after_grace() {
    let state = SessionState::new();
    let pool = pool(&state, 1, 2);
    pool.initialize().await.unwrap();

    // Never released: shutdown must still terminate within its grace period
    let _leaked = pool.acquire(None).await.unwrap();

    let done = tokio::time::timeout(Duration::from_secs(5), pool.shutdown()).await;
    assert!(done.is_ok(), "shutdown must not hang on unreleased sessions");
    assert!(!pool.is_initialized());
}

#[tokio::test]
async fn proxy_reaches_the_session() {
    let state = SessionState::new();
    let pool = pool(&state, 1, 2);
    pool.initialize().await.unwrap();

    let proxy = gatepass::proxy::ProxySpec::parse("10.9.8.7:3128").unwrap();
    let session = pool.acquire(Some(proxy.clone())).await.unwrap();
    assert_eq!(session.proxy(), Some(&proxy));
    pool.release(session).await;
}

#[tokio::test]
async fn fingerprint_override_applies_user_agent() {
    let state = SessionState::new();
    let pool = pool(&state, 1, 2);
    pool.initialize().await.unwrap();

    let session = pool
        .acquire_with(None, Some("AgentSmith/9.0".into()))
        .await
        .unwrap();
    assert_eq!(session.fingerprint().user_agent, "AgentSmith/9.0");
    pool.release(session).await;
}
