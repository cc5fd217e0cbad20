//! # SafeWrite Core
//!
//! Transactional output: write through a proxy stream, and the destination
//! only changes if everything went well.
//!
//! This crate provides:
//! - [`Session`], a `Write + Seek` stream that stages output until it is
//!   committed or discarded
//! - [`Sink`], the destinations a session can deliver to (paths, open
//!   streams, closures, or nowhere)
//! - Atomic replacement of files through a sibling staging file and rename
//! - Entry points for the common cases: [`open`], [`writer`], [`closer`],
//!   [`printer`] and [`dump`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use safewrite_core::Config;
//! use std::io::Write;
//!
//! let config = Config::new().create_parents(true);
//! let mut session = config.open("out/data.txt")?;
//! session.write_all(b"all or nothing")?;
//! session.commit()?;
//! # Ok::<(), safewrite_core::Error>(())
//! ```
//!
//! If the session is dropped before `commit`, or an error is returned from
//! [`Session::run`], `out/data.txt` is left exactly as it was.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod commit;
mod config;
mod dump;
mod error;
mod mode;
mod open;
mod session;
mod sink;

pub use commit::{CommitReport, Destination};
pub use config::{Config, DryRun, RedirectFn, RedirectTextFn, Staging, SymlinkPolicy};
pub use dump::{dump, dump_to_path, Format};
pub use error::{Error, Result, ScopeError};
pub use mode::OpenMode;
pub use open::{closer, open, printer, writer, Printer};
pub use session::{Outcome, Session, SessionState};
pub use sink::{CallableSink, Sink, StreamSink};

pub use safewrite_stage::{StageError, DEFAULT_CHUNK_SIZE, STAGING_SUFFIX};
