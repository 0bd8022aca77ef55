mod config;
mod layers;
mod manager;
mod merge;

pub use config::PochiConfig;
pub use layers::{ConfigLayerEntry, ConfigLayerSource, ConfigLayerStack};
pub use manager::{CONFIG_DIR_NAME, CONFIG_FILE_NAME, ConfigManager};
pub use merge::merge_toml_values;
