// Re-export all items from the submodules
mod platform;
mod task_info;

// Re-export task info
pub use task_info::TaskInfo;

// Re-export platform config
pub use platform::{PlatformConfig, PlatformEntry, CONFIG_ENV_VAR};
