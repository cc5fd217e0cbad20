//! # SafeWrite Stage
//!
//! Staging buffers for SafeWrite transactional output.
//!
//! A staging buffer holds everything a caller writes until the owning
//! session decides whether the output is delivered or dropped. Buffers are
//! **opaque byte stores** - they do not know where the payload is going.
//!
//! ## Design Principles
//!
//! - Buffers look like ordinary `Write + Seek` streams
//! - Finishing a buffer consumes it, so a finished payload cannot grow
//! - Staging files are guarded and deleted on every path that does not
//!   explicitly keep them
//!
//! ## Available Buffers
//!
//! - [`MemoryStage`] - Growable in-memory buffer, handed over as [`bytes::Bytes`]
//! - [`FileStage`] - Staging file on disk, read back with [`FileChunks`]
//!
//! ## Example
//!
//! ```rust
//! use safewrite_stage::{MemoryStage, StagingBuffer};
//! use std::io::Write;
//!
//! let mut stage = MemoryStage::new();
//! stage.write_all(b"hello world").unwrap();
//! let staged = Box::new(stage).finish().unwrap();
//! assert_eq!(staged.len(), 11);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod chunks;
mod error;
mod file;
mod memory;
mod stage;

pub use chunks::{FileChunks, DEFAULT_CHUNK_SIZE};
pub use error::{StageError, StageResult};
pub use file::{FileStage, StagedFile, STAGING_SUFFIX};
pub use memory::MemoryStage;
pub use stage::{Staged, StagingBuffer};
