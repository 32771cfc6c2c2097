use crate::*;

#[test]
fn test_pool_error_display() {
    let unavailable = PoolError::NoAvailableWorkers { waited_ms: 5000 };
    assert_eq!(unavailable.to_string(), "没有可用的Worker: 等待 5000ms 后超时");

    let not_found = PoolError::worker_not_found("worker-3");
    assert_eq!(not_found.to_string(), "Worker未找到: worker-3");

    let batch = PoolError::BatchFailed {
        batch_id: "b-1".to_string(),
        attempts: 4,
        last_error: "操作超时: 30000ms".to_string(),
    };
    assert_eq!(
        batch.to_string(),
        "批次 b-1 在 4 次尝试后永久失败: 操作超时: 30000ms"
    );

    assert_eq!(
        PoolError::ShuttingDown.to_string(),
        "调度器正在关闭，拒绝新的提交"
    );
    assert_eq!(
        PoolError::template("未闭合的标签").to_string(),
        "模板错误: 未闭合的标签"
    );
}

#[test]
fn test_is_fatal() {
    assert!(PoolError::worker_spawn("no runtime").is_fatal());
    assert!(PoolError::config_error("batch_size = 0").is_fatal());
    assert!(PoolError::Internal("bug".to_string()).is_fatal());

    assert!(!PoolError::NoAvailableWorkers { waited_ms: 1 }.is_fatal());
    assert!(!PoolError::timeout_error("slow").is_fatal());
    assert!(!PoolError::ShuttingDown.is_fatal());
}

#[test]
fn test_retryable_and_scheduling_failures_are_distinct() {
    let unavailable = PoolError::NoAvailableWorkers { waited_ms: 100 };
    assert!(unavailable.is_scheduling_failure());
    assert!(!unavailable.is_retryable());

    for err in [
        PoolError::timeout_error("attempt 1"),
        PoolError::WorkerCrashed {
            worker_id: "w-1".to_string(),
        },
        PoolError::task_execution("batch rejected"),
    ] {
        assert!(err.is_retryable(), "{err} should be retryable");
        assert!(!err.is_scheduling_failure());
    }

    assert!(!PoolError::invalid_payload("missing template").is_retryable());
    assert!(!PoolError::BatchFailed {
        batch_id: "b".to_string(),
        attempts: 4,
        last_error: String::new(),
    }
    .is_retryable());
}

#[test]
fn test_conversions() {
    let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let err: PoolError = json_err.into();
    assert!(matches!(err, PoolError::Serialization(_)));

    let err: PoolError = anyhow::anyhow!("boom").into();
    assert_eq!(err.to_string(), "内部错误: boom");
}
