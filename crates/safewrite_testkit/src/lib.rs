//! # SafeWrite Testkit
//!
//! Test utilities for SafeWrite.
//!
//! This crate provides:
//! - Scratch destinations in temporary directories
//! - Recording sinks that capture what a session delivered
//! - Writers that fail on demand
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use safewrite_testkit::prelude::*;
//!
//! #[test]
//! fn test_commit() {
//!     let target = TempTarget::with_content("out.txt", b"old");
//!     // ... run a session against target.path()
//!     assert_eq!(target.read().unwrap(), b"new");
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod failing;
pub mod fixtures;
pub mod generators;
pub mod recorder;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::failing::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::recorder::*;
}

pub use failing::*;
pub use fixtures::*;
pub use generators::*;
pub use recorder::*;
