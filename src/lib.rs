pub mod address;
pub mod error;
pub mod instrument;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod session;

// Re-export the primary types so users can depend on the crate
// without knowing the internal module layout.
pub use error::{Error, Result};
pub use instrument::*;
pub use session::{Session, SessionFactory, Vxi11Factory, Vxi11Session};
