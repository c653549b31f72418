//! Per-package indexing reports and package identities
//!
//! Every package submitted through the processor produces exactly one
//! [`IndexReport`], either from the worker once the package has been handled
//! or synthesized by the processor when the batch timed out.

use std::fmt;
use std::path::Path;

use regex::Regex;
use serde::Serialize;

/// Package id used when nothing better is known
pub const UNKNOWN: &str = "Unknown";

/// NuGet package id grammar
const ID_PATTERN: &str = r"^\w+([._-]\w+)*$";

/// Dotted version, optionally with pre-release and build metadata
const VERSION_PATTERN: &str = r"^[0-9A-Za-z]+([.+-][0-9A-Za-z]+)*$";

fn matches_pattern(pattern: &str, value: &str) -> bool {
    Regex::new(pattern).is_ok_and(|re| re.is_match(value))
}

/// Suffixes stripped from a package file name before deriving an identity
const PACKAGE_SUFFIXES: &[&str] = &[".symbols.nupkg", ".nupkg"];

/// Outcome of indexing a single package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IndexStatus {
    None,
    Succeeded,
    Failed,
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexStatus::None => "none",
            IndexStatus::Succeeded => "succeeded",
            IndexStatus::Failed => "failed",
        };
        f.pad(name)
    }
}

/// Identity of a symbol package: its id and version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PackageIdentity {
    pub id: String,
    pub version: String,
}

impl PackageIdentity {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }

    /// Identity used when a package cannot be inspected at all
    pub fn unknown() -> Self {
        Self::new(UNKNOWN, UNKNOWN)
    }

    /// Derive an identity from a `<id>.<version>.symbols.nupkg` file name.
    ///
    /// The version starts at the first dot-separated segment that begins with
    /// a digit. Returns `None` when the name carries no version segment.
    pub fn from_file_name(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let lower = name.to_ascii_lowercase();
        let stem = PACKAGE_SUFFIXES
            .iter()
            .find(|suffix| lower.ends_with(*suffix))
            .map(|suffix| &name[..name.len() - suffix.len()])?;

        let split = stem
            .char_indices()
            .find(|(idx, c)| *c == '.' && stem[idx + 1..].starts_with(|n: char| n.is_ascii_digit()))
            .map(|(idx, _)| idx)?;

        let identity = Self::new(&stem[..split], &stem[split + 1..]);
        identity.is_path_safe().then_some(identity)
    }

    /// Whether id and version are plain names: no separators, no `..`, no
    /// root. Only such identities may name directories.
    pub fn is_path_safe(&self) -> bool {
        matches_pattern(ID_PATTERN, &self.id) && matches_pattern(VERSION_PATTERN, &self.version)
    }

    /// Name of the per-package unpack directory
    pub fn directory_name(&self) -> String {
        format!("{}.{}", self.id, self.version)
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

/// Status report for a single package. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    package_id: String,
    package_version: String,
    status: IndexStatus,
    messages: Vec<String>,
}

impl IndexReport {
    pub fn new(
        package_id: impl Into<String>,
        package_version: impl Into<String>,
        status: IndexStatus,
        messages: Vec<String>,
    ) -> Self {
        Self {
            package_id: package_id.into(),
            package_version: package_version.into(),
            status,
            messages,
        }
    }

    /// Successful report for a package
    pub fn succeeded(identity: &PackageIdentity) -> Self {
        Self::new(
            identity.id.clone(),
            identity.version.clone(),
            IndexStatus::Succeeded,
            Vec::new(),
        )
    }

    /// Failed report for a package with the given reason
    pub fn failed(identity: &PackageIdentity, message: impl Into<String>) -> Self {
        Self::new(
            identity.id.clone(),
            identity.version.clone(),
            IndexStatus::Failed,
            vec![message.into()],
        )
    }

    pub fn package_id(&self) -> &str {
        &self.package_id
    }

    pub fn package_version(&self) -> &str {
        &self.package_version
    }

    pub fn status(&self) -> IndexStatus {
        self.status
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn is_success(&self) -> bool {
        self.status == IndexStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_identity_from_symbols_file_name() {
        let identity =
            PackageIdentity::from_file_name(&PathBuf::from("/upload/A.1.0.symbols.nupkg")).unwrap();
        assert_eq!(identity, PackageIdentity::new("A", "1.0"));
    }

    #[test]
    fn test_identity_from_dotted_id() {
        let identity = PackageIdentity::from_file_name(&PathBuf::from(
            "Company.Product.Core.2.3.1-beta.symbols.nupkg",
        ))
        .unwrap();
        assert_eq!(identity.id, "Company.Product.Core");
        assert_eq!(identity.version, "2.3.1-beta");
    }

    #[test]
    fn test_identity_requires_version_segment() {
        assert!(PackageIdentity::from_file_name(&PathBuf::from("missing.nupkg")).is_none());
        assert!(PackageIdentity::from_file_name(&PathBuf::from("notes.txt")).is_none());
    }

    #[test]
    fn test_path_safe_identities() {
        assert!(PackageIdentity::new("Nuclei", "0.8.1.0").is_path_safe());
        assert!(PackageIdentity::new("Company.Product_Core-x", "2.3.1-beta.1+build").is_path_safe());
        assert!(PackageIdentity::unknown().is_path_safe());

        for (id, version) in [
            ("/abs/victim", "1"),
            ("../../x", "1"),
            ("a/b", "1"),
            (r"a\b", "1"),
            (r"C:\victim", "1"),
            ("..", "1"),
            ("", "1"),
            ("Nuclei", "1/../../x"),
            ("Nuclei", ".."),
            ("Nuclei", ""),
        ] {
            assert!(
                !PackageIdentity::new(id, version).is_path_safe(),
                "{:?} {:?} accepted",
                id,
                version
            );
        }
    }

    #[test]
    fn test_identity_from_unsafe_file_name() {
        assert!(PackageIdentity::from_file_name(&PathBuf::from("..1.0.symbols.nupkg")).is_none());
    }

    #[test]
    fn test_directory_name() {
        let identity = PackageIdentity::new("Nuclei", "0.8.1.0");
        assert_eq!(identity.directory_name(), "Nuclei.0.8.1.0");
    }

    #[test]
    fn test_report_serializes_status() {
        let report = IndexReport::failed(&PackageIdentity::new("A", "1.0"), "broken");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "Failed");
        assert_eq!(json["messages"][0], "broken");
        assert!(!report.is_success());
    }
}
