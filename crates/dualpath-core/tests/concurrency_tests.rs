use dualpath_core::{Classification, ExperimentBuilder, Operation};
use dualpath_test_utils::{long_running_experiment, sleeping, RecordingPublisher, RecordingReporter};
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_sequential_execution_sums_runtimes() {
    let experiment = long_running_experiment("long-running").build().unwrap();

    let start = Instant::now();
    let value = experiment.run().await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(value, 1);
    assert!(elapsed >= Duration::from_secs(1), "took {elapsed:?}");
}

#[tokio::test]
async fn test_concurrent_execution_takes_the_slowest_behavior() {
    let experiment = long_running_experiment("long-running")
        .concurrency(None)
        .build()
        .unwrap();

    let start = Instant::now();
    let value = experiment.run().await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(value, 1);
    assert!(elapsed >= Duration::from_millis(800), "took {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1000), "took {elapsed:?}");
}

#[tokio::test]
async fn test_concurrent_timeout_records_timeout_error() {
    let publisher = RecordingPublisher::new();
    let reporter = RecordingReporter::new();
    let experiment = long_running_experiment("long-running")
        .concurrency(Some(Duration::from_millis(500)))
        .publish(publisher.sink())
        .report_errors(reporter.reporter())
        .build()
        .unwrap();

    let start = Instant::now();
    let value = experiment.run().await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(value, 1);
    assert!(elapsed < Duration::from_millis(800), "took {elapsed:?}");

    let run = publisher.last().unwrap();
    assert_eq!(run.operations, vec![Operation::Timeout]);
    assert_eq!(run.names_in(Classification::Mismatched), vec!["candidate"]);
    assert_eq!(reporter.calls(), 1);
}

#[tokio::test]
async fn test_timed_out_control_is_returned_as_error() {
    let experiment = ExperimentBuilder::new("slow-control")
        .use_control(sleeping(400, 1))
        .try_candidate(sleeping(10, 1))
        .concurrency(Some(Duration::from_millis(100)))
        .build()
        .unwrap();

    let err = experiment.run().await.unwrap_err();

    assert!(err.as_behavior().is_some_and(|e| e.is_timeout()));
}

#[tokio::test]
async fn test_concurrent_result_keeps_registration_order() {
    let experiment = ExperimentBuilder::new("ordered")
        .use_control(sleeping(50, 1))
        .behavior("slowest", sleeping(200, 1))
        .behavior("fastest", sleeping(1, 2))
        .behavior("middle", sleeping(100, 1))
        .concurrency(None)
        .build()
        .unwrap();

    let result = experiment.conduct().await;

    let names: Vec<_> = result.candidates().iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["slowest", "fastest", "middle"]);
    let mismatched: Vec<_> = result.mismatched().map(|c| c.name()).collect();
    assert_eq!(mismatched, vec!["fastest"]);
}

#[tokio::test]
async fn test_concurrent_runs_record_runtimes_per_behavior() {
    let experiment = ExperimentBuilder::new("runtimes")
        .use_control(sleeping(20, 1))
        .try_candidate(sleeping(120, 1))
        .concurrency(None)
        .build()
        .unwrap();

    let result = experiment.conduct().await;

    assert!(result.control().runtime() >= Duration::from_millis(20));
    assert!(result.control().runtime() < Duration::from_millis(120));
    assert!(result.candidates()[0].runtime() >= Duration::from_millis(120));
}
