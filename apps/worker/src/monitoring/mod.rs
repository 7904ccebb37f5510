pub mod checker;
/// Monitoring engine module - turns stored checks into probes and state changes
///
/// This module is responsible for:
/// - Validating stored check records
/// - Executing HTTP/HTTPS probes with a per-check timeout
/// - Deriving up/down state and deciding when to alert
/// - Scheduling the check and log rotation cycles
pub mod executor;
pub mod processor;
pub mod scheduler;
pub mod types;
pub mod validation;


pub use checker::HttpChecker;
pub use executor::MonitoringExecutor;
pub use processor::OutcomeProcessor;
pub use scheduler::{MonitoringScheduler, ScheduleConfig};
