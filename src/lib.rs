//! # Warning: Unstable API
//!
//! This library API is unstable and subject to breaking changes without notice.
//! Only the CLI interface is considered stable. Use at your own risk.
//!
//! To use the CLI tool, install with: `cargo install driftscan`

// All modules declared here for library structure
// Mark everything as doc(hidden) to avoid exposing unstable API in docs
#[doc(hidden)]
pub mod compare;
#[doc(hidden)]
pub mod config;
#[doc(hidden)]
pub mod corpus;
#[doc(hidden)]
pub mod grouping;
#[doc(hidden)]
pub mod keywords;
#[doc(hidden)]
pub mod model;
#[doc(hidden)]
pub mod sampling;
#[doc(hidden)]
pub mod significance;
#[doc(hidden)]
pub mod snapshot;
#[doc(hidden)]
pub mod windows;

// Re-export execute functions for convenience (also hidden from docs)
#[doc(hidden)]
pub use compare::execute_compare;
#[doc(hidden)]
pub use keywords::execute_keywords;

// Debug logging macro - only prints when config.debug is true
#[macro_export]
macro_rules! debug_println {
    ($config:expr, $($arg:tt)*) => {
        if $config.debug {
            println!($($arg)*);
        }
    };
}
