mod common;

use common::*;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use switchyard::config::{BackoffStrategy, SchedulerConfig};
use switchyard::execution::{
    TaskError, TaskPriority, TaskScheduler, TaskSpec, TaskState,
};

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn test_higher_priority_runs_first() {
    let scheduler = TaskScheduler::new(fast_scheduler_config(1));
    let order = Arc::new(Mutex::new(Vec::new()));

    let submissions = [
        ("background", TaskPriority::Background),
        ("normal", TaskPriority::Normal),
        ("critical", TaskPriority::Critical),
        ("low", TaskPriority::Low),
        ("high", TaskPriority::High),
    ];
    let ids: Vec<_> = submissions
        .iter()
        .map(|&(label, priority)| {
            let order = order.clone();
            scheduler.submit(
                TaskSpec::new(move |_| {
                    order.lock().push(label);
                    Ok(Value::Null)
                })
                .priority(priority),
            )
        })
        .collect();

    // Everything is queued before the single worker starts.
    scheduler.start();
    for id in &ids {
        scheduler.wait_for_completion(id, WAIT).unwrap();
    }
    scheduler.stop(Duration::from_secs(1));

    assert_eq!(
        *order.lock(),
        vec!["critical", "high", "normal", "low", "background"]
    );
}

#[test]
fn test_equal_priority_is_fifo() {
    let scheduler = TaskScheduler::new(fast_scheduler_config(1));
    let order = Arc::new(Mutex::new(Vec::new()));

    let ids: Vec<_> = (0..20)
        .map(|i| {
            let order = order.clone();
            scheduler.submit_fn(move |_| {
                order.lock().push(i);
                Ok(Value::Null)
            })
        })
        .collect();

    scheduler.start();
    for id in &ids {
        scheduler.wait_for_completion(id, WAIT).unwrap();
    }
    scheduler.stop(Duration::from_secs(1));

    assert_eq!(*order.lock(), (0..20).collect::<Vec<_>>());
}

#[test]
fn test_retries_until_exhausted() {
    let scheduler = TaskScheduler::new(fast_scheduler_config(2));
    scheduler.start();

    let attempts = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let error_calls = errors.clone();
    let id = scheduler.submit(
        TaskSpec::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("always fails")
        })
        .max_retries(2)
        .retry_delay(Duration::from_millis(10))
        .on_error(move |_| {
            error_calls.fetch_add(1, Ordering::SeqCst);
        }),
    );

    let result = scheduler.wait_for_completion(&id, WAIT).unwrap();
    assert!(!result.success);
    assert_eq!(result.retry_count, 2);
    assert_eq!(
        result.error,
        Some(TaskError::Execution {
            message: "always fails".to_string()
        })
    );
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(scheduler.task_state(&id), Some(TaskState::Failed));

    thread::sleep(Duration::from_millis(50));
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    scheduler.stop(Duration::from_secs(1));
}

#[test]
fn test_success_after_retry_fires_success_callback_once() {
    let scheduler = TaskScheduler::new(fast_scheduler_config(1));
    scheduler.start();

    let successes = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(AtomicUsize::new(0));
    let seen = successes.clone();
    let error_calls = errors.clone();
    let id = scheduler.submit(
        TaskSpec::new(|ctx| {
            if ctx.attempt() < 2 {
                anyhow::bail!("not yet")
            }
            Ok(json!({"attempt": ctx.attempt()}))
        })
        .max_retries(3)
        .retry_delay(Duration::from_millis(5))
        .on_success(move |value| seen.lock().push(value.clone()))
        .on_error(move |_| {
            error_calls.fetch_add(1, Ordering::SeqCst);
        }),
    );

    let result = scheduler.wait_for_completion(&id, WAIT).unwrap();
    assert!(result.success);
    assert_eq!(result.retry_count, 2);

    thread::sleep(Duration::from_millis(50));
    assert_eq!(*successes.lock(), vec![json!({"attempt": 2})]);
    assert_eq!(errors.load(Ordering::SeqCst), 0);
    scheduler.stop(Duration::from_secs(1));
}

#[test]
fn test_backoff_grows_between_attempts() {
    let scheduler = TaskScheduler::new(fast_scheduler_config(1));
    scheduler.start();

    let stamps = Arc::new(Mutex::new(Vec::new()));
    let recorder = stamps.clone();
    let id = scheduler.submit(
        TaskSpec::new(move |_| {
            recorder.lock().push(Instant::now());
            anyhow::bail!("fail")
        })
        .max_retries(2)
        .retry_delay(Duration::from_millis(50)),
    );
    scheduler.wait_for_completion(&id, WAIT).unwrap();
    scheduler.stop(Duration::from_secs(1));

    let stamps = stamps.lock();
    assert_eq!(stamps.len(), 3);
    // 50ms before the first retry, 100ms before the second.
    assert!(stamps[1] - stamps[0] >= Duration::from_millis(45));
    assert!(stamps[2] - stamps[1] >= Duration::from_millis(95));
}

#[test]
fn test_intermediate_failure_is_visible_mid_retry() {
    let scheduler = TaskScheduler::new(fast_scheduler_config(1));
    scheduler.start();

    let id = scheduler.submit(
        TaskSpec::new(|ctx| {
            if ctx.attempt() == 0 {
                anyhow::bail!("first try")
            }
            Ok(json!("second try"))
        })
        .max_retries(1)
        .retry_delay(Duration::from_millis(300)),
    );

    let intermediate = scheduler
        .get_result(&id, Some(Duration::from_millis(200)))
        .unwrap();
    assert!(!intermediate.success);
    assert_eq!(intermediate.retry_count, 0);
    assert_eq!(scheduler.task_state(&id), Some(TaskState::RetryScheduled));

    let last = scheduler.wait_for_completion(&id, WAIT).unwrap();
    assert!(last.success);
    assert_eq!(last.retry_count, 1);
    scheduler.stop(Duration::from_secs(1));
}

#[test]
fn test_timeout_is_a_distinct_failure() {
    let scheduler = TaskScheduler::new(fast_scheduler_config(1));
    scheduler.start();

    let started = Instant::now();
    let id = scheduler.submit(
        TaskSpec::new(|ctx| {
            let deadline = Instant::now() + Duration::from_secs(10);
            while Instant::now() < deadline && !ctx.is_cancelled() {
                thread::sleep(Duration::from_millis(5));
            }
            Ok(json!("too late"))
        })
        .timeout(Duration::from_millis(100)),
    );

    let result = scheduler
        .get_result(&id, Some(Duration::from_millis(300)))
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(300));
    assert!(!result.success);
    assert!(result.error.as_ref().unwrap().is_timeout());
    assert_eq!(result.error, Some(TaskError::Timeout { timeout_ms: 100 }));
    scheduler.stop(Duration::from_secs(1));
}

#[test]
fn test_fast_work_within_timeout_succeeds() {
    let scheduler = TaskScheduler::new(fast_scheduler_config(1));
    scheduler.start();
    let id = scheduler.submit(
        TaskSpec::new(|_| Ok(json!("quick"))).timeout(Duration::from_secs(2)),
    );
    let result = scheduler.wait_for_completion(&id, WAIT).unwrap();
    assert_eq!(result.value, Some(json!("quick")));
    scheduler.stop(Duration::from_secs(1));
}

#[test]
fn test_stop_returns_while_worker_sleeps_in_backoff() {
    let scheduler = TaskScheduler::new(SchedulerConfig {
        backoff_strategy: BackoffStrategy::Blocking,
        ..fast_scheduler_config(1)
    });
    scheduler.start();

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let id = scheduler.submit(
        TaskSpec::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("fail")
        })
        .max_retries(1)
        .retry_delay(Duration::from_secs(5)),
    );

    scheduler
        .get_result(&id, Some(Duration::from_secs(2)))
        .unwrap();
    assert_eq!(scheduler.task_state(&id), Some(TaskState::RetryScheduled));

    let started = Instant::now();
    scheduler.stop(Duration::from_secs(1));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(900), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(1500), "{elapsed:?}");
    assert!(!scheduler.is_running());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[test]
fn test_stop_on_idle_pool_is_quick() {
    let scheduler = TaskScheduler::new(fast_scheduler_config(3));
    scheduler.start();
    let started = Instant::now();
    scheduler.stop(Duration::from_secs(5));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(scheduler.worker_count(), 0);
}

#[test]
fn test_cancel_before_start_skips_work() {
    let scheduler = TaskScheduler::new(fast_scheduler_config(1));
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let doomed = scheduler.submit_fn(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Null)
    });
    let survivor = scheduler.submit_fn(|_| Ok(json!("ran")));

    assert!(scheduler.cancel(&doomed));
    scheduler.start();
    assert!(scheduler.wait_for_completion(&survivor, WAIT).unwrap().success);
    scheduler.stop(Duration::from_secs(1));

    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.task_state(&doomed), Some(TaskState::Cancelled));
    assert!(scheduler.get_result(&doomed, None).is_none());
}

#[test]
fn test_cancelled_task_stays_discarded_after_clear_completed() {
    let scheduler = TaskScheduler::new(fast_scheduler_config(1));
    let runs = Arc::new(AtomicUsize::new(0));
    let callbacks = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let fired = callbacks.clone();
    let doomed = scheduler.submit(
        TaskSpec::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        })
        .on_success(move |_| {
            fired.fetch_add(1, Ordering::SeqCst);
        }),
    );
    let survivor = scheduler.submit_fn(|_| Ok(json!("ran")));

    assert!(scheduler.cancel(&doomed));
    scheduler.clear_completed();
    scheduler.start();
    assert!(scheduler.wait_for_completion(&survivor, WAIT).unwrap().success);
    scheduler.stop(Duration::from_secs(1));

    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(callbacks.load(Ordering::SeqCst), 0);
    assert!(scheduler.get_result(&doomed, None).is_none());
    assert_eq!(scheduler.queue_size(), 0);
}

#[test]
fn test_introspection_is_not_blocked_by_stop() {
    let scheduler = Arc::new(TaskScheduler::new(fast_scheduler_config(1)));
    scheduler.start();
    let id = scheduler.submit_fn(|_| {
        thread::sleep(Duration::from_millis(800));
        Ok(Value::Null)
    });

    let deadline = Instant::now() + WAIT;
    while scheduler.task_state(&id) != Some(TaskState::Running) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }

    let stopper = {
        let scheduler = scheduler.clone();
        thread::spawn(move || scheduler.stop(Duration::from_secs(2)))
    };
    thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    let stats = scheduler.stats();
    scheduler.worker_count();
    assert!(started.elapsed() < Duration::from_millis(200));
    assert!(!stats.running);

    stopper.join().unwrap();
    assert!(scheduler.wait_for_completion(&id, WAIT).unwrap().success);
}

#[test]
fn test_cancel_running_task_fails() {
    let scheduler = TaskScheduler::new(fast_scheduler_config(1));
    scheduler.start();
    let id = scheduler.submit_fn(|_| {
        thread::sleep(Duration::from_millis(300));
        Ok(Value::Null)
    });

    let deadline = Instant::now() + WAIT;
    while scheduler.task_state(&id) != Some(TaskState::Running) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(!scheduler.cancel(&id));
    assert!(scheduler.wait_for_completion(&id, WAIT).unwrap().success);
    assert!(!scheduler.cancel(&id));
    scheduler.stop(Duration::from_secs(1));
}

#[test]
fn test_workers_run_in_parallel() {
    let scheduler = TaskScheduler::new(fast_scheduler_config(3));
    scheduler.start();

    let started = Instant::now();
    let ids: Vec<_> = (0..3)
        .map(|_| {
            scheduler.submit_fn(|_| {
                thread::sleep(Duration::from_millis(200));
                Ok(Value::Null)
            })
        })
        .collect();
    for id in &ids {
        scheduler.wait_for_completion(id, WAIT).unwrap();
    }
    assert!(started.elapsed() < Duration::from_millis(550));
    scheduler.stop(Duration::from_secs(1));
}

#[test]
fn test_get_result_unknown_id_times_out() {
    let scheduler = TaskScheduler::new(fast_scheduler_config(1));
    let other = TaskScheduler::new(fast_scheduler_config(1));
    let foreign = other.submit_fn(|_| Ok(Value::Null));

    let started = Instant::now();
    assert!(scheduler
        .get_result(&foreign, Some(Duration::from_millis(50)))
        .is_none());
    assert!(started.elapsed() >= Duration::from_millis(45));
    assert_eq!(scheduler.task_state(&foreign), None);
}

#[test]
fn test_drop_stops_running_scheduler() {
    let scheduler = TaskScheduler::new(fast_scheduler_config(2));
    scheduler.start();
    let id = scheduler.submit_fn(|_| Ok(Value::Null));
    scheduler.wait_for_completion(&id, WAIT).unwrap();

    let started = Instant::now();
    drop(scheduler);
    assert!(started.elapsed() < Duration::from_secs(1));
}
