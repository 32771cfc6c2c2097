pub mod task_execution;
pub mod worker_lifecycle;

pub use task_execution::BatchExecutor;
pub use worker_lifecycle::{LocalWorkerSpawner, Worker, WorkerEnvelope, WorkerHandle, WorkerSpawner};
