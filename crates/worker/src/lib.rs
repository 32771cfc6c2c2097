pub mod collaborators;
pub mod components;
pub mod executor_registry;
pub mod executors;

pub use components::{
    BatchExecutor, LocalWorkerSpawner, Worker, WorkerEnvelope, WorkerHandle, WorkerSpawner,
};
pub use executor_registry::ExecutorRegistry;
pub use executors::{
    run_blocking, RenderExecutor, RenderPayload, TaskExecutor, TransformExecutor, TransformPayload,
    ValidateExecutor, ValidatePayload,
};
