//! # Shuck Archive
//!
//! Streaming archive extraction: container header codecs, stream
//! decompression, entry selection and the session driver that ties
//! them together.
//!
//! - **TAR**: POSIX tar with GNU long-name extensions
//! - **CPIO**: newc and legacy odc ASCII forms
//! - **AR**: Unix archives and `.deb` packages
//! - compression wrappers: gzip, bzip2, xz, raw lzma, zstd and
//!   Unix compress, sniffed from signature bytes
//!
//! ## Example
//!
//! ```rust,no_run
//! use shuck_archive::action::ListAction;
//! use shuck_archive::filter::Selector;
//! use shuck_archive::session::{ArchiveFormat, Compression, Session};
//! use shuck_core::source::Monitor;
//! use std::path::Path;
//!
//! let mut session = Session::from_file(
//!     Path::new("bundle.tar.gz"),
//!     Compression::Auto,
//!     ArchiveFormat::Auto,
//!     Selector::accept_all(),
//!     Monitor::new(),
//! ).unwrap();
//! let mut list = ListAction::new(std::io::stdout(), false);
//! let report = session.run(&mut list).unwrap();
//! println!("{} entries", report.entries);
//! ```
//!
//! ## Format Detection
//!
//! [`detect::CompressionFormat::sniff`] identifies the compression wrapper from magic
//! bytes without consuming them; the container format is sniffed the
//! same way when a [`session::Session`] is built with
//! [`session::ArchiveFormat::Auto`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod detect;
pub mod filter;
pub mod headers;
pub mod links;
pub mod policy;
pub mod session;
pub mod transform;

pub use action::{CommandAction, EntryAction, ExtractAction, ListAction, WriteAction};
pub use detect::CompressionFormat;
pub use filter::{Decision, Selector};
pub use headers::{ArCodec, CpioCodec, HeaderCodec, TarCodec, TarWriter};
pub use links::PendingLink;
pub use policy::Policy;
pub use session::{ArchiveFormat, Compression, Report, Session, probe_file};
