//! Integration tests for the scheduler: admission, execution, delivery,
//! and shutdown.

use std::time::Duration;
use taskpool::config::MAX_QUEUE_CAPACITY;
use taskpool::{
    Error, Lifecycle, NewTask, Processor, Scheduler, SchedulerConfig, ShutdownPolicy, TaskContext,
    TaskId, processor_fn,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const GENEROUS: Duration = Duration::from_secs(10);

/// Returns `<input>_done` after `delay`.
fn suffix_processor(delay: Duration) -> impl Processor + 'static {
    processor_fn(move |_ctx, req| async move {
        tokio::time::sleep(delay).await;
        Ok::<_, anyhow::Error>(format!("{}_done", req.input))
    })
}

/// Reports each task it picks up on `started`, then blocks until `gate` is
/// cancelled.
fn gated_processor(
    gate: CancellationToken,
    started: mpsc::UnboundedSender<TaskId>,
) -> impl Processor + 'static {
    processor_fn(move |_ctx, req| {
        let gate = gate.clone();
        let started = started.clone();
        async move {
            let _ = started.send(req.id);
            gate.cancelled().await;
            Ok::<_, anyhow::Error>(format!("{}_done", req.input))
        }
    })
}

async fn wait_for_state(scheduler: &Scheduler, want: Lifecycle) {
    timeout(GENEROUS, async {
        while scheduler.state() != want {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("scheduler never reached the expected state");
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

#[test]
fn zero_sizes_fall_back_to_defaults() {
    let scheduler = Scheduler::new(0, 0, suffix_processor(Duration::ZERO));
    assert_eq!(scheduler.worker_count(), 4);
    assert_eq!(scheduler.queue_capacity(), 8);
    assert_eq!(scheduler.state(), Lifecycle::Created);

    let scheduler = Scheduler::new(3, 0, suffix_processor(Duration::ZERO));
    assert_eq!(scheduler.worker_count(), 3);
    assert_eq!(scheduler.queue_capacity(), 6);

    let scheduler = Scheduler::new(2, 5, suffix_processor(Duration::ZERO));
    assert_eq!(scheduler.queue_capacity(), 5);
}

#[test]
fn oversized_capacity_is_capped() {
    let scheduler = Scheduler::new(1, usize::MAX, suffix_processor(Duration::ZERO));
    assert_eq!(scheduler.queue_capacity(), MAX_QUEUE_CAPACITY);
}

// ---------------------------------------------------------------------------
// Execution and delivery
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_task_yields_exactly_one_result() {
    let scheduler = Scheduler::new(3, 50, suffix_processor(Duration::from_millis(1)));

    let handles: Vec<_> = (0..50)
        .map(|i| {
            scheduler
                .submit_new(NewTask::new("echo", format!("in-{i}")))
                .expect("queue sized for every task")
        })
        .collect();

    scheduler.start();

    for (i, handle) in handles.into_iter().enumerate() {
        let result = timeout(GENEROUS, handle.wait())
            .await
            .expect("result not delivered in time")
            .expect("task was not run");
        assert_eq!(result.output(), Some(format!("in-{i}_done").as_str()));
        assert!(result.error().is_none());
        assert!(result.worker_id < 3);
    }

    scheduler.stop().await;
    let stats = scheduler.stats();
    assert_eq!(stats.submitted, 50);
    assert_eq!(stats.completed, 50);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.dropped, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn processor_errors_pass_through_unchanged() {
    let processor = processor_fn(|_ctx, req| async move {
        if req.input.as_text() == Some("X") {
            anyhow::bail!("cannot process {}", req.input);
        }
        Ok(format!("{}_done", req.input))
    });
    let scheduler = Scheduler::new(2, 8, processor);
    scheduler.start();

    let inputs = ["X", "ok", "X", "fine", "X"];
    let handles: Vec<_> = inputs
        .iter()
        .map(|input| scheduler.submit_new(NewTask::new("check", *input)).unwrap())
        .collect();

    for (input, handle) in inputs.iter().zip(handles) {
        let result = timeout(GENEROUS, handle.wait()).await.unwrap().unwrap();
        if *input == "X" {
            assert!(result.output().is_none());
            let err = result.error().expect("error expected for X");
            assert_eq!(err.to_string(), "cannot process X");
        } else {
            assert_eq!(result.output(), Some(format!("{input}_done").as_str()));
        }
    }

    scheduler.stop().await;
    let stats = scheduler.stats();
    assert_eq!(stats.failed, 3);
    assert_eq!(stats.completed, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn task_metadata_reaches_processor() {
    let processor = processor_fn(|_ctx, req| async move {
        Ok::<_, anyhow::Error>(format!(
            "{}|{}|{}|{}",
            req.workflow_id,
            req.input,
            req.user_id.as_deref().unwrap_or("-"),
            req.archive_id.as_deref().unwrap_or("-"),
        ))
    });
    let scheduler = Scheduler::new(1, 4, processor);
    scheduler.start();

    let handle = scheduler
        .submit_new(
            NewTask::new("summarize", serde_json::json!({"doc": 7}))
                .user_id("u-1")
                .archive_id("a-9"),
        )
        .unwrap();
    let result = timeout(GENEROUS, handle.wait()).await.unwrap().unwrap();
    assert_eq!(result.output(), Some(r#"summarize|{"doc":7}|u-1|a-9"#));

    scheduler.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn caller_context_is_handed_to_processor() {
    let (observed_tx, mut observed_rx) = mpsc::unbounded_channel();
    let processor = processor_fn(move |ctx, req| {
        let observed_tx = observed_tx.clone();
        async move {
            ctx.cancelled().await;
            let _ = observed_tx.send(req.id);
            Err::<String, _>(anyhow::anyhow!("cancelled by caller"))
        }
    });
    let scheduler = Scheduler::new(1, 4, processor);
    scheduler.start();

    let ctx = TaskContext::new();
    let handle = scheduler
        .submit_new(NewTask::new("slow", "x").context(ctx.clone()))
        .unwrap();
    let id = handle.id();

    ctx.cancel();
    let seen = timeout(GENEROUS, observed_rx.recv()).await.unwrap();
    assert_eq!(seen, Some(id));

    // Either the submitter noticed its own cancellation first or it got
    // the processor's error; it never gets a success.
    match handle.wait().await {
        Ok(result) => assert!(result.error().is_some()),
        Err(e) => assert!(matches!(e, Error::Cancelled)),
    }

    scheduler.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_handle_discards_result_without_stalling() {
    let config = SchedulerConfig::new(1, 4).shutdown_policy(ShutdownPolicy::Drain);
    let scheduler = Scheduler::from_config(config, suffix_processor(Duration::from_millis(1)));

    let abandoned_by_caller = scheduler.submit_new(NewTask::new("echo", "gone")).unwrap();
    let kept = scheduler.submit_new(NewTask::new("echo", "kept")).unwrap();
    drop(abandoned_by_caller);

    scheduler.start();
    let result = timeout(GENEROUS, kept.wait()).await.unwrap().unwrap();
    assert_eq!(result.output(), Some("kept_done"));

    scheduler.stop().await;
    let stats = scheduler.stats();
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.dropped, 1);
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn admission_is_bounded_by_capacity() {
    let scheduler = Scheduler::new(2, 4, suffix_processor(Duration::ZERO));

    // Nothing drains before start, so exactly `capacity` tasks fit.
    let mut handles = Vec::new();
    for i in 0..4 {
        handles.push(
            scheduler
                .submit_new(NewTask::new("echo", format!("{i}")))
                .expect("within capacity"),
        );
    }
    assert_eq!(scheduler.queue_depth(), 4);

    let err = scheduler
        .submit_new(NewTask::new("echo", "overflow"))
        .unwrap_err();
    assert!(matches!(err, Error::QueueFull { capacity: 4 }));

    let stats = scheduler.stats();
    assert_eq!(stats.submitted, 4);
    assert_eq!(stats.rejected, 1);

    scheduler.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn saturated_pool_rejects_overflow() {
    let gate = CancellationToken::new();
    let (started_tx, _started_rx) = mpsc::unbounded_channel();
    let scheduler = Scheduler::new(2, 2, gated_processor(gate.clone(), started_tx));
    scheduler.start();

    // At most workers + capacity tasks can be admitted while the gate is shut.
    let mut rejected = 0;
    let mut handles = Vec::new();
    for i in 0..5 {
        match scheduler.submit_new(NewTask::new("blocked", format!("{i}"))) {
            Ok(handle) => handles.push(handle),
            Err(Error::QueueFull { .. }) => rejected += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert!(rejected >= 1, "expected at least one rejection");

    gate.cancel();
    for handle in handles {
        timeout(GENEROUS, handle.wait()).await.unwrap().unwrap();
    }
    scheduler.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submit_never_blocks_on_busy_workers() {
    let gate = CancellationToken::new();
    let (started_tx, _started_rx) = mpsc::unbounded_channel();
    let scheduler = Scheduler::new(1, 2, gated_processor(gate.clone(), started_tx));
    scheduler.start();

    let outcome = timeout(Duration::from_secs(1), async {
        let mut handles = Vec::new();
        for i in 0..100 {
            if let Ok(handle) = scheduler.submit_new(NewTask::new("blocked", format!("{i}"))) {
                handles.push(handle);
            }
        }
        handles
    })
    .await;
    let handles = outcome.expect("submit blocked");
    assert!(handles.len() <= 3);
    assert!(scheduler.stats().rejected >= 97);

    gate.cancel();
    scheduler.stop().await;
}

#[tokio::test]
async fn submit_after_stop_is_rejected() {
    let scheduler = Scheduler::new(1, 2, suffix_processor(Duration::ZERO));
    scheduler.start();
    scheduler.stop().await;

    let err = scheduler
        .submit_new(NewTask::new("echo", "late"))
        .unwrap_err();
    assert!(matches!(err, Error::Stopped));
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_is_idempotent() {
    let scheduler = Scheduler::new(3, 6, suffix_processor(Duration::ZERO));
    scheduler.start();
    scheduler.start();
    assert_eq!(scheduler.state(), Lifecycle::Started);
    assert_eq!(scheduler.live_workers(), 3);

    scheduler.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_joins_all_workers_and_can_repeat() {
    let scheduler = Scheduler::new(4, 8, suffix_processor(Duration::from_millis(1)));
    scheduler.start();
    assert_eq!(scheduler.live_workers(), 4);

    timeout(GENEROUS, scheduler.stop()).await.expect("stop hung");
    assert_eq!(scheduler.state(), Lifecycle::Stopped);
    assert_eq!(scheduler.live_workers(), 0);

    timeout(GENEROUS, scheduler.stop())
        .await
        .expect("second stop hung");
    assert_eq!(scheduler.live_workers(), 0);
}

#[tokio::test]
async fn stop_before_start_is_terminal() {
    let scheduler = Scheduler::new(2, 4, suffix_processor(Duration::ZERO));
    timeout(GENEROUS, scheduler.stop()).await.expect("stop hung");
    assert_eq!(scheduler.state(), Lifecycle::Stopped);

    scheduler.start();
    assert_eq!(scheduler.state(), Lifecycle::Stopped);
    assert_eq!(scheduler.live_workers(), 0);
}

// ---------------------------------------------------------------------------
// Shutdown policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn abandon_policy_closes_queued_result_channels() {
    let scheduler = Scheduler::new(2, 4, suffix_processor(Duration::ZERO));
    let handles: Vec<_> = (0..3)
        .map(|i| scheduler.submit_new(NewTask::new("echo", format!("{i}"))).unwrap())
        .collect();

    scheduler.stop().await;

    for handle in handles {
        let err = timeout(GENEROUS, handle.wait()).await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Abandoned));
    }
    assert_eq!(scheduler.stats().abandoned, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abandon_policy_lets_in_flight_task_finish() {
    let gate = CancellationToken::new();
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let scheduler = Scheduler::new(1, 4, gated_processor(gate.clone(), started_tx));
    scheduler.start();

    let in_flight = scheduler.submit_new(NewTask::new("job", "a")).unwrap();
    let started = timeout(GENEROUS, started_rx.recv()).await.unwrap();
    assert_eq!(started, Some(in_flight.id()));

    let queued: Vec<_> = ["b", "c"]
        .iter()
        .map(|input| scheduler.submit_new(NewTask::new("job", *input)).unwrap())
        .collect();

    let stopper = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.stop().await })
    };
    wait_for_state(&scheduler, Lifecycle::Stopped).await;
    gate.cancel();
    timeout(GENEROUS, stopper).await.unwrap().unwrap();

    let result = in_flight.wait().await.unwrap();
    assert_eq!(result.output(), Some("a_done"));
    for handle in queued {
        assert!(matches!(handle.wait().await, Err(Error::Abandoned)));
    }

    let stats = scheduler.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.abandoned, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_stops_both_return_after_queue_is_cleared() {
    let gate = CancellationToken::new();
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let scheduler = Scheduler::new(1, 4, gated_processor(gate.clone(), started_tx));
    scheduler.start();

    let _in_flight = scheduler.submit_new(NewTask::new("job", "a")).unwrap();
    timeout(GENEROUS, started_rx.recv()).await.unwrap();
    let mut queued = scheduler.submit_new(NewTask::new("job", "b")).unwrap();

    let first = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.stop().await })
    };
    wait_for_state(&scheduler, Lifecycle::Stopped).await;
    let second = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.stop().await })
    };
    gate.cancel();

    timeout(GENEROUS, second).await.unwrap().unwrap();
    assert!(matches!(queued.try_take(), Err(Error::Abandoned)));

    timeout(GENEROUS, first).await.unwrap().unwrap();
    assert_eq!(scheduler.stats().abandoned, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn drain_policy_runs_everything_queued() {
    let config = SchedulerConfig::new(1, 10).shutdown_policy(ShutdownPolicy::Drain);
    let scheduler = Scheduler::from_config(config, suffix_processor(Duration::from_millis(5)));
    scheduler.start();

    let handles: Vec<_> = (0..6)
        .map(|i| scheduler.submit_new(NewTask::new("echo", format!("d{i}"))).unwrap())
        .collect();

    timeout(GENEROUS, scheduler.stop()).await.expect("stop hung");

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.wait().await.expect("drained task must run");
        assert_eq!(result.output(), Some(format!("d{i}_done").as_str()));
    }
    let stats = scheduler.stats();
    assert_eq!(stats.completed, 6);
    assert_eq!(stats.abandoned, 0);
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn thousand_tasks_through_small_queue() {
    let scheduler = Scheduler::new(4, 8, suffix_processor(Duration::from_millis(1)));
    scheduler.start();

    let run = async {
        let mut handles = Vec::with_capacity(1000);
        for i in 0..1000 {
            let new = NewTask::new("echo", format!("t{i}"));
            loop {
                match scheduler.submit_new(new.clone()) {
                    Ok(handle) => {
                        handles.push((i, handle));
                        break;
                    }
                    Err(Error::QueueFull { .. }) => {
                        tokio::time::sleep(Duration::from_millis(1)).await
                    }
                    Err(e) => panic!("unexpected submit error: {e}"),
                }
            }
        }

        for (i, handle) in handles {
            let result = handle.wait().await.expect("result lost");
            assert_eq!(result.output(), Some(format!("t{i}_done").as_str()));
        }
    };
    timeout(GENEROUS, run).await.expect("deadlock or starvation");

    scheduler.stop().await;
    let stats = scheduler.stats();
    assert_eq!(stats.completed, 1000);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.dropped, 0);
}
