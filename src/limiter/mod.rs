//! Attempt tracking and lockout state management.

mod attempts;
mod clock;
mod decision;
mod policy;
mod record;
mod registry;
mod sweeper;

pub use attempts::AttemptLimiter;
pub use clock::{Clock, ManualClock, SystemClock};
pub use decision::AttemptDecision;
pub use policy::{AttemptPolicy, LockoutMode, DEFAULT_BLOCK, DEFAULT_MAX_ATTEMPTS, DEFAULT_WINDOW};
pub use record::AttemptRecord;
pub use registry::{Guard, GuardRegistry};
pub use sweeper::spawn_sweeper;
