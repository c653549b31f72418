//! `srcsrv` stream rendering
//!
//! A source-indexed PDB carries a `srcsrv` stream that maps every compiled
//! source path to a URL on the source server. Entries use the layout
//!
//! ```text
//! <path in pdb>*<package id>*<package version>*<path relative to src/>
//! ```
//!
//! and the debugger expands `%var2%/%var3%/%var4%` into
//! `<source_server_url>/<id>/<version>/<relative path>`.

use crate::report::PackageIdentity;

const SEPARATORS: &[char] = &['\\', '/'];

/// Line ending expected by the Windows debuggers
const EOL: &str = "\r\n";

/// One source file listed in a PDB
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Path as recorded in the PDB
    pub original: String,
    /// Path below the package `src/` directory, `/`-separated
    pub relative: String,
}

fn file_name(path: &str) -> &str {
    path.rsplit(SEPARATORS).next().unwrap_or(path)
}

/// Find the build-machine directory that corresponds to the package `src/`
/// directory.
///
/// `pdb_files` are the paths recorded in the PDB, `sources` the files of the
/// package `src/` tree relative to it. The first PDB path whose file name
/// occurs exactly once in `sources` decides the base. Comparison ignores
/// ASCII case and separator style.
pub fn determine_base_path(pdb_files: &[String], sources: &[String]) -> Option<String> {
    for file in pdb_files {
        let name = file_name(file);
        let mut matches = sources
            .iter()
            .filter(|source| file_name(source).eq_ignore_ascii_case(name));
        let (Some(relative), None) = (matches.next(), matches.next()) else {
            continue;
        };

        let normalized = file.replace('\\', "/").to_ascii_lowercase();
        let relative = relative.replace('\\', "/").to_ascii_lowercase();
        if normalized.len() <= relative.len() || !normalized.ends_with(&relative) {
            continue;
        }

        let cut = normalized.len() - relative.len();
        if !normalized[..cut].ends_with('/') {
            continue;
        }
        if let Some(base) = file.get(..cut) {
            return Some(base.trim_end_matches(SEPARATORS).to_string());
        }
    }
    None
}

/// Entries for every PDB path that lives below `base`
pub fn source_entries(pdb_files: &[String], base: &str) -> Vec<SourceEntry> {
    let base_lower = base.to_ascii_lowercase();
    pdb_files
        .iter()
        .filter_map(|file| {
            let lower = file.to_ascii_lowercase();
            let start = lower.find(&base_lower)? + base.len();
            let relative = file
                .get(start..)?
                .trim_start_matches(SEPARATORS)
                .replace('\\', "/");
            if relative.is_empty() {
                return None;
            }
            Some(SourceEntry {
                original: file.clone(),
                relative,
            })
        })
        .collect()
}

/// Render the `srcsrv` stream for one PDB
pub fn render_stream(
    source_server_url: &str,
    identity: &PackageIdentity,
    entries: &[SourceEntry],
) -> String {
    let mut lines = vec![
        "SRCSRV: ini ------------------------------------------------".to_string(),
        "VERSION=2".to_string(),
        "INDEXVERSION=2".to_string(),
        "VERCTRL=http".to_string(),
        "SRCSRV: variables ------------------------------------------".to_string(),
        "SRCSRVVERCTRL=http".to_string(),
        format!("HTTP_ALIAS={}", source_server_url.trim_end_matches('/')),
        "HTTP_EXTRACT_TARGET=%HTTP_ALIAS%/%var2%/%var3%/%var4%".to_string(),
        "SRCSRVTRG=%http_extract_target%".to_string(),
        "SRCSRVCMD=".to_string(),
        "SRCSRV: source files ---------------------------------------".to_string(),
    ];
    lines.extend(entries.iter().map(|entry| {
        format!(
            "{}*{}*{}*{}",
            entry.original, identity.id, identity.version, entry.relative
        )
    }));
    lines.push("SRCSRV: end ------------------------------------------------".to_string());

    let mut stream = lines.join(EOL);
    stream.push_str(EOL);
    stream
}
