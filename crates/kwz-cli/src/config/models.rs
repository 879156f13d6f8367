use kwzflow::engine::config as core_config;
use std::path::PathBuf;

pub struct AppConfig {
    /// Configuration file the run was built from, if any.
    pub source: Option<PathBuf>,
    pub core_config: core_config::KwzConfig,
}
