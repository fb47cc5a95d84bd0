//! Types library for the order book depth mirror
//!
//! This library provides the core type definitions shared by the mirror
//! service and its HTTP gateway.
//!
//! # Modules
//! - `ids`: Instrument identifiers (Symbol)
//! - `numeric`: Fixed-point decimal types (Price, Quantity)
//! - `depth`: Depth snapshot and diff event types
//! - `errors`: Error taxonomy

// Public modules
pub mod depth;
pub mod errors;
pub mod ids;
pub mod numeric;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::depth::*;
    pub use crate::errors::*;
    pub use crate::ids::*;
    pub use crate::numeric::*;
}
