//! Utility modules
//!
//! HTTP helpers, logging, native architecture detection, single instance
//! enforcement and the self-update check.

pub mod http;
pub mod logging;
pub mod single_instance;
pub mod system_arch;
pub mod update_checker;

pub use logging::init_logging;
pub use single_instance::SingleInstanceGuard;
pub use system_arch::native_arch;
pub use update_checker::UpdateChecker;
