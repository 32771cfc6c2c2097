pub mod app_config;
pub mod logging;
pub mod pool_scheduler;

pub use app_config::*;
pub use logging::*;
pub use pool_scheduler::*;
