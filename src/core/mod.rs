pub mod cutoff;
pub mod engine;
pub mod retry;
pub mod scanner;
pub mod transfer;
pub mod verify;

pub use cutoff::{select_window, Clock, CutoffSpec, SystemClock};
pub use engine::SyncEngine;
pub use retry::{AttemptError, AttemptOutcome, RetryController, RunReport, RunState};
pub use scanner::{FileCandidate, FileScanner, ScanEntry, SkipReason};
pub use transfer::{TransferExecutor, TransferPlan, TransferResult};
pub use verify::SizeVerifier;
