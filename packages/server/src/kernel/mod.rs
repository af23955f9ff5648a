// Startup wiring shared by the binary and tests
pub mod deps;

pub use deps::*;
