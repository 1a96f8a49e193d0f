//! Database repositories for each table.

pub mod properties;

pub use properties::PropertiesRepo;
