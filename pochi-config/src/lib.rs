//! Configuration for the Pochi layout engine.
//!
//! Settings live in `pochi.toml` files that are layered from the user's home
//! directory up to the workspace root. See [`ConfigManager`] for the lookup
//! order.

pub mod debug;
pub mod layout;
pub mod loader;

pub use debug::{DebugConfig, TraceLevel};
pub use layout::LayoutConfig;
pub use loader::{
    CONFIG_FILE_NAME, CONFIG_DIR_NAME, ConfigLayerEntry, ConfigLayerSource, ConfigLayerStack,
    ConfigManager, PochiConfig, merge_toml_values,
};
