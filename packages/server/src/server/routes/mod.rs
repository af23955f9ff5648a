// HTTP routes
pub mod health;
pub mod profiles;
pub mod sync;

pub use health::*;
pub use profiles::*;
pub use sync::*;
