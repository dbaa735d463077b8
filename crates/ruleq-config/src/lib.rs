//! Configuration loading
//!
//! Queues, timers and rules are declared in YAML and read once at startup.
//! Three tags let a setup be split across files:
//!
//! | Tag | Result |
//! |---|---|
//! | `!include file.yaml` | the included document |
//! | `!include_dir_merge_list dir` | the lists of every YAML file in `dir`, concatenated |
//! | `!env_var NAME [default]` | the variable's value, else the default read as YAML |
//!
//! ```ignore
//! let config: AppConfig = ruleq_config::load_config("demos/configuration.yaml")?;
//! ```

mod error;
mod loader;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_yaml, load_yaml_string, YamlLoader};
pub use serde_yaml::Value;
