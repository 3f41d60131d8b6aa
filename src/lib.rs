pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod report;
pub mod storage;

pub use config::{Direction, RetryPolicy, TransferConfig};
pub use core::{RunReport, RunState, SyncEngine};
pub use error::{Result, SyncError};
pub use report::Reporter;
