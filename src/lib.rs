//! A staged, hook-extensible flow engine for building tool servers in Rust.
//!

pub use meridian_internal::*;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use meridian_internal::prelude::*;
}
