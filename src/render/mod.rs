//! Render orchestration: shared control state, the thread-safe monitor,
//! the pass-loop driver and the per-tile worker.

pub mod control;
pub mod driver;
pub mod monitor;
pub(crate) mod worker;

pub use self::control::RenderControl;
pub use self::driver::{ RenderDriver, RenderSummary };
pub use self::monitor::{
    CallbackProgressBar, ConsoleProgressBar, ProgressBar, ProgressCallback,
    RenderMonitor, SilentProgressBar,
};
