pub mod lateness;
pub mod monitor;
pub mod sweep;

pub use lateness::{evaluate, Verdict};
pub use monitor::{Monitor, MonitorStatus};
pub use sweep::{MessageSweep, Sweep, SweepReport, VisitSweep};
