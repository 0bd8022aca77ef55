//! Shared traits and helper types reused across the Pochi layout crates.
//! The layout engine reports failures and state changes through these
//! contracts so embedders can plug in their own observability backends
//! without the engine depending on them.

pub mod errors;
pub mod paths;
pub mod reference;
pub mod telemetry;

pub use errors::{DisplayErrorFormatter, ErrorFormatter, ErrorReporter, NoopErrorReporter};
pub use paths::{file_name_key, normalize_path};
pub use reference::{MemoryErrorReporter, MemoryTelemetry};
pub use telemetry::{NoopTelemetry, TelemetrySink};
