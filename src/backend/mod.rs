//! Indexing backends
//!
//! The worker never touches PDB bytes itself. Everything between "the
//! package is ready" and "symbols and sources are published" goes through
//! an [`IndexingBackend`]:
//!
//! ```text
//! package.symbols.nupkg ──► unpack_dir/ ──► srcsrv stream ──► pdb
//!                                │                            │
//!                                └──► sources_dir/<id>/<ver>  └──► symbols_dir
//! ```
//!
//! [`ToolchainBackend`] drives the Debugging Tools for Windows. Tests plug
//! in their own implementations.

pub mod srcsrv;
pub mod toolchain;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::report::PackageIdentity;

pub use toolchain::ToolchainBackend;

/// Where a backend finds its tools and publishes its output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding `symstore` and `srcsrv/{srctool,pdbstr}`
    pub debugging_tools_dir: PathBuf,
    /// Base URL debuggers fetch sources from
    pub source_server_url: String,
    /// Source store, laid out as `<id>/<version>/<relative path>`
    pub sources_dir: PathBuf,
    /// Symbol store managed by `symstore`
    pub symbols_dir: PathBuf,
}

/// Byte-level symbol and source processing for a single package
pub trait IndexingBackend: Send + Sync {
    /// Read the package manifest, if the package can be opened and carries one
    fn load_identity(&self, package: &Path) -> Option<PackageIdentity>;

    /// Unpack `package` into `unpack_dir`, source-index its symbols and
    /// publish symbols and sources to `stores`.
    ///
    /// `unpack_dir` exists and is empty when this is called; the caller
    /// deletes it afterwards.
    fn process(&self, package: &Path, unpack_dir: &Path, stores: &StoreConfig) -> Result<()>;
}
