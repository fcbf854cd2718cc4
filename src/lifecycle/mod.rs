//! Lifecycle Controller
//!
//! Install/activate sequencing and explicit cache invalidation.

pub mod controller;

pub use controller::{
    ActivateReport, InstallReport, LifecycleController, LifecycleError, WorkerState,
};
