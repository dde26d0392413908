//! # tooldock
//!
//! Verified provisioning of versioned third-party tool binaries (compilers,
//! linters, node and relayer binaries, shared libraries) for a build
//! toolchain, either on the developer machine ("local") or for docker images.
//!
//! Tools are declared in a [`Catalog`]. For each (tool, version, platform)
//! one verified copy lives in the cache, and the binaries consumers expect
//! are published as symlinks into it.
//!
//! ```no_run
//! use tooldock::{Catalog, HttpFetcher, Layout, Provisioner};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let catalog = Catalog::load("tooldock.toml")?;
//! let provisioner = Provisioner::new(catalog, Layout::from_env()?, HttpFetcher::new()?);
//! provisioner.ensure_local("go")?;
//! provisioner.ensure_docker("gaia")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules Overview
//! - [`catalog`] – Tool definitions, sources and the TOML catalog format
//! - [`platform`] – `(os, arch)` targets, including the synthetic docker OS
//! - [`global`] – Cache root and the directory layout beneath it
//! - [`state`] – Filesystem-only "is this tool installed" check
//! - [`installer`] – The [`Provisioner`]: fetch, verify, unpack, publish
//! - [`archive`] – tar.gz, zip and raw payload unpacking
//! - [`digest`] – Declared checksums and the streaming hasher
//! - [`publish`] – Destination symlinks
//! - [`materialize`] – Copying installed binaries out as real files
//! - [`fetch`] – Transport seam and the HTTP implementation

#[cfg(not(unix))]
compile_error!("tooldock publishes symlinks and unix permission bits and needs a unix host");

pub mod archive;
pub mod catalog;
pub mod digest;
pub mod error;
pub mod fetch;
pub mod global;
pub mod installer;
pub mod materialize;
pub mod platform;
pub mod publish;
pub mod state;

pub use archive::ArchiveFormat;
pub use catalog::*;
pub use digest::{Checksum, HashAlgorithm};
pub use error::{Error, Result};
pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use global::cache::Layout;
pub use installer::Provisioner;
pub use platform::Platform;
