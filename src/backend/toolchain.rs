//! Backend driving the Debugging Tools for Windows
//!
//! Per package:
//! 1. Extract the `.symbols.nupkg` archive into the unpack directory
//! 2. For every PDB: list its sources (`srctool -r`), render a `srcsrv`
//!    stream and embed it (`pdbstr -w -s:srcsrv`)
//! 3. Copy `src/**` into `<sources>/<id>/<version>/`
//! 4. Publish every PDB to the symbol store (`symstore add`)

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;

use ignore::WalkBuilder;
use regex::Regex;

use super::srcsrv;
use super::{IndexingBackend, StoreConfig};
use crate::error::{Result, SymbolIndexError};
use crate::report::PackageIdentity;

/// Directory inside a symbol package that holds the sources
const SOURCE_DIR: &str = "src";

/// [`IndexingBackend`] built on `srctool`, `pdbstr` and `symstore`
#[derive(Debug, Default, Clone)]
pub struct ToolchainBackend;

impl ToolchainBackend {
    pub fn new() -> Self {
        Self
    }
}

fn tool_path(stores: &StoreConfig, relative: &[&str], name: &str) -> PathBuf {
    let mut path = stores.debugging_tools_dir.clone();
    path.extend(relative);
    path.push(format!("{}{}", name, std::env::consts::EXE_SUFFIX));
    path
}

/// Run a tool and return its standard output.
///
/// `srctool` reports the number of files it found as its exit code, so
/// callers choose whether a non-zero status is a failure.
fn run_tool(tool: &Path, args: &[OsString], check_status: bool) -> Result<String> {
    let name = tool
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| tool.display().to_string());

    tracing::trace!("Running {} {:?}", tool.display(), args);
    let output = Command::new(tool)
        .args(args)
        .output()
        .map_err(|e| SymbolIndexError::ToolError {
            tool: name.clone(),
            message: format!("failed to launch {}: {}", tool.display(), e),
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if check_status && !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = if stderr.trim().is_empty() {
            stdout.trim()
        } else {
            stderr.trim()
        };
        return Err(SymbolIndexError::ToolError {
            tool: name,
            message: format!("exited with {}: {}", output.status, detail),
        });
    }

    if stdout.trim().is_empty() {
        tracing::trace!("{} produced no output", name);
    } else {
        tracing::trace!("{} output: {}", name, stdout.trim());
    }
    Ok(stdout)
}

fn package_error(path: &Path, message: impl Into<String>) -> SymbolIndexError {
    SymbolIndexError::PackageError {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

/// Parse `<id>` and `<version>` out of a nuspec document
pub fn parse_nuspec(content: &str) -> Option<PackageIdentity> {
    let element = |name: &str| -> Option<String> {
        let re = Regex::new(&format!(r"(?s)<{0}>\s*([^<]+?)\s*</{0}>", name)).ok()?;
        Some(re.captures(content)?.get(1)?.as_str().to_string())
    };
    let id = element("id")?;
    let version = element("version")?;
    Some(PackageIdentity::new(id, version))
}

fn read_manifest(package: &Path) -> Result<PackageIdentity> {
    let file = File::open(package).map_err(|e| SymbolIndexError::io(package, e))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| package_error(package, e.to_string()))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| package_error(package, e.to_string()))?;
        let name = entry.name().to_string();
        if name.contains('/') || !name.to_ascii_lowercase().ends_with(".nuspec") {
            continue;
        }

        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|e| package_error(package, format!("unreadable manifest {}: {}", name, e)))?;
        let identity = parse_nuspec(&content)
            .ok_or_else(|| package_error(package, format!("{} has no id or version", name)))?;
        if !identity.is_path_safe() {
            return Err(package_error(
                package,
                format!("{} declares an invalid id or version: {}", name, identity),
            ));
        }
        return Ok(identity);
    }

    Err(package_error(package, "package has no manifest"))
}

fn extract(package: &Path, unpack_dir: &Path) -> Result<()> {
    let file = File::open(package).map_err(|e| SymbolIndexError::io(package, e))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| package_error(package, e.to_string()))?;
    archive
        .extract(unpack_dir)
        .map_err(|e| package_error(package, format!("extraction failed: {}", e)))
}

/// Files below `root`, sorted, including hidden and ignored ones
fn walk_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkBuilder::new(root)
        .standard_filters(false)
        .build()
        .flatten()
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

fn is_pdb(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdb"))
}

fn relative_sources(source_root: &Path) -> Vec<String> {
    walk_files(source_root)
        .iter()
        .filter_map(|path| path.strip_prefix(source_root).ok())
        .map(|relative| relative.to_string_lossy().replace('\\', "/"))
        .collect()
}

impl ToolchainBackend {
    fn index_symbols(
        &self,
        pdb: &Path,
        identity: &PackageIdentity,
        sources: &[String],
        stores: &StoreConfig,
    ) -> Result<()> {
        let srctool = tool_path(stores, &["srcsrv"], "srctool");
        let listing = run_tool(&srctool, &["-r".into(), pdb.into()], false)?;
        let pdb_files: Vec<String> = listing
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();
        if pdb_files.is_empty() {
            tracing::debug!("{} lists no source files", pdb.display());
            return Ok(());
        }

        let Some(base) = srcsrv::determine_base_path(&pdb_files, sources) else {
            tracing::warn!(
                "No source files of {} found in package {}, not source indexing",
                pdb.display(),
                identity
            );
            return Ok(());
        };

        let entries = srcsrv::source_entries(&pdb_files, &base);
        let stream = srcsrv::render_stream(&stores.source_server_url, identity, &entries);
        let mut stream_path = pdb.as_os_str().to_owned();
        stream_path.push(".stream");
        let stream_path = PathBuf::from(stream_path);
        fs::write(&stream_path, stream).map_err(|e| SymbolIndexError::io(&stream_path, e))?;

        let pdbstr = tool_path(stores, &["srcsrv"], "pdbstr");
        let mut pdb_arg = OsString::from("-p:");
        pdb_arg.push(pdb);
        let mut stream_arg = OsString::from("-i:");
        stream_arg.push(&stream_path);
        run_tool(
            &pdbstr,
            &["-w".into(), pdb_arg, stream_arg, "-s:srcsrv".into()],
            true,
        )?;

        tracing::info!(
            "Source indexed {} ({} files) for {}",
            pdb.display(),
            entries.len(),
            identity
        );
        Ok(())
    }

    fn upload_sources(
        &self,
        source_root: &Path,
        identity: &PackageIdentity,
        stores: &StoreConfig,
    ) -> Result<()> {
        let destination_root = stores
            .sources_dir
            .join(&identity.id)
            .join(&identity.version);

        for source in walk_files(source_root) {
            let Ok(relative) = source.strip_prefix(source_root) else {
                continue;
            };
            let destination = destination_root.join(relative);
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).map_err(|e| SymbolIndexError::io(parent, e))?;
            }
            fs::copy(&source, &destination).map_err(|e| SymbolIndexError::io(&destination, e))?;
            tracing::debug!("Uploaded {} to {}", source.display(), destination.display());
        }
        Ok(())
    }

    fn upload_symbols(
        &self,
        pdbs: &[PathBuf],
        identity: &PackageIdentity,
        stores: &StoreConfig,
    ) -> Result<()> {
        if pdbs.is_empty() {
            return Ok(());
        }

        fs::create_dir_all(&stores.symbols_dir)
            .map_err(|e| SymbolIndexError::io(&stores.symbols_dir, e))?;
        let symstore = tool_path(stores, &[], "symstore");
        for pdb in pdbs {
            run_tool(
                &symstore,
                &[
                    "add".into(),
                    "/f".into(),
                    pdb.into(),
                    "/s".into(),
                    stores.symbols_dir.clone().into(),
                    "/t".into(),
                    identity.id.clone().into(),
                    "/v".into(),
                    identity.version.clone().into(),
                ],
                true,
            )?;
            tracing::info!("Published {} for {}", pdb.display(), identity);
        }
        Ok(())
    }
}

impl IndexingBackend for ToolchainBackend {
    fn load_identity(&self, package: &Path) -> Option<PackageIdentity> {
        match read_manifest(package) {
            Ok(identity) => Some(identity),
            Err(e) => {
                tracing::debug!("Could not read manifest of {}: {}", package.display(), e);
                None
            }
        }
    }

    fn process(&self, package: &Path, unpack_dir: &Path, stores: &StoreConfig) -> Result<()> {
        let identity = read_manifest(package)?;
        extract(package, unpack_dir)?;

        let pdbs: Vec<PathBuf> = walk_files(unpack_dir)
            .into_iter()
            .filter(|path| is_pdb(path))
            .collect();
        let source_root = unpack_dir.join(SOURCE_DIR);
        let sources = relative_sources(&source_root);
        tracing::debug!(
            "{} contains {} pdb files and {} source files",
            identity,
            pdbs.len(),
            sources.len()
        );

        for pdb in &pdbs {
            self.index_symbols(pdb, &identity, &sources, stores)?;
        }
        if source_root.is_dir() {
            self.upload_sources(&source_root, &identity, stores)?;
        }
        self.upload_symbols(&pdbs, &identity, stores)
    }
}
