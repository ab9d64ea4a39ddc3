//! Identifier parsing.
//!
//! Turns an opaque identifier string into a typed [`Descriptor`]. Rules are
//! checked in order and the first match wins:
//!
//! 1. `npm:` prefix or a leading `@` → package registry (`name[@version]`,
//!    version defaults to `latest`; a scope's own `@` is never a separator)
//! 2. `github:`, `gh:`, `github.com/` or `http(s)://github.com/` → version
//!    control (`owner/repo[@ref|#ref|/tree/ref]`, ref defaults to `main`)
//! 3. `file://` or `file:` → local path, made absolute
//! 4. anything else → [`SlipwayError::UnrecognizedIdentifier`]

use std::fmt;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SlipwayError};

pub const DEFAULT_PACKAGE_VERSION: &str = "latest";
pub const DEFAULT_VCS_REF: &str = "main";
pub const LOCAL_REF: &str = "local";

const PACKAGE_PREFIXES: &[&str] = &["npm:"];
const VCS_PREFIXES: &[&str] = &[
    "https://github.com/",
    "http://github.com/",
    "github.com/",
    "github:",
    "gh:",
];
const LOCAL_PREFIXES: &[&str] = &["file://", "file:"];

static OWNER_REPO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<owner>[A-Za-z0-9][A-Za-z0-9_.-]*)/(?P<repo>[A-Za-z0-9_.-]+)$")
        .expect("static regex")
});

static PACKAGE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(@[a-z0-9][a-z0-9._~-]*/)?[a-z0-9][a-z0-9._~-]*$").expect("static regex")
});

/// Where an artifact comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    PackageRegistry,
    VersionControl,
    LocalPath,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::PackageRegistry => write!(f, "package_registry"),
            Scheme::VersionControl => write!(f, "version_control"),
            Scheme::LocalPath => write!(f, "local_path"),
        }
    }
}

/// Parsed identifier. Equal input strings always produce equal descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Descriptor {
    pub scheme: Scheme,
    /// Package name, `owner/repo`, or absolute path.
    pub location: String,
    /// Version, git ref, or `local`.
    pub reference: String,
}

impl Descriptor {
    /// `owner` and `repo` halves of a version-control location.
    pub fn owner_repo(&self) -> Option<(&str, &str)> {
        if self.scheme != Scheme::VersionControl {
            return None;
        }
        self.location.split_once('/')
    }

    /// Local filesystem path for `LocalPath` descriptors.
    pub fn local_path(&self) -> Option<&Path> {
        (self.scheme == Scheme::LocalPath).then(|| Path::new(&self.location))
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            Scheme::PackageRegistry => write!(f, "npm:{}@{}", self.location, self.reference),
            Scheme::VersionControl => write!(f, "github:{}@{}", self.location, self.reference),
            Scheme::LocalPath => write!(f, "file:{}", self.location),
        }
    }
}

/// Parse an identifier into a [`Descriptor`].
pub fn parse(identifier: &str) -> Result<Descriptor> {
    let raw = identifier.trim();
    if raw.is_empty() {
        return Err(unrecognized(identifier, "empty identifier"));
    }

    if raw.starts_with('@') {
        return parse_package(identifier, raw);
    }
    if let Some(rest) = strip_any_prefix(raw, PACKAGE_PREFIXES) {
        return parse_package(identifier, rest);
    }
    if let Some(rest) = strip_any_prefix(raw, VCS_PREFIXES) {
        return parse_vcs(identifier, rest);
    }
    if let Some(rest) = strip_any_prefix(raw, LOCAL_PREFIXES) {
        return parse_local(identifier, rest);
    }

    Err(unrecognized(identifier, "no known scheme prefix"))
}

/// Whether the identifier starts with a prefix this resolver understands,
/// regardless of whether the rest of it is well formed.
pub fn has_known_prefix(identifier: &str) -> bool {
    let raw = identifier.trim();
    raw.starts_with('@')
        || strip_any_prefix(raw, PACKAGE_PREFIXES).is_some()
        || strip_any_prefix(raw, VCS_PREFIXES).is_some()
        || strip_any_prefix(raw, LOCAL_PREFIXES).is_some()
}

fn strip_any_prefix<'a>(raw: &'a str, prefixes: &[&str]) -> Option<&'a str> {
    prefixes.iter().find_map(|p| match raw.get(..p.len()) {
        Some(head) if head.eq_ignore_ascii_case(p) => Some(&raw[p.len()..]),
        _ => None,
    })
}

fn unrecognized(identifier: &str, why: &str) -> SlipwayError {
    SlipwayError::UnrecognizedIdentifier(format!("'{}': {}", identifier, why))
}

fn parse_package(identifier: &str, body: &str) -> Result<Descriptor> {
    // Split on the last '@' that is not the scope marker at position 0.
    let (name, version) = match body.rfind('@') {
        Some(idx) if idx > 0 => (&body[..idx], &body[idx + 1..]),
        _ => (body, ""),
    };

    if !PACKAGE_NAME.is_match(name) {
        return Err(unrecognized(identifier, "invalid package name"));
    }
    let version = if version.is_empty() {
        DEFAULT_PACKAGE_VERSION
    } else {
        version
    };

    Ok(Descriptor {
        scheme: Scheme::PackageRegistry,
        location: name.to_string(),
        reference: version.to_string(),
    })
}

fn parse_vcs(identifier: &str, body: &str) -> Result<Descriptor> {
    let (path, reference) = if let Some((path, r)) = body.split_once('@') {
        (path, Some(r))
    } else if let Some((path, r)) = body.split_once('#') {
        (path, Some(r))
    } else if let Some((path, r)) = body.split_once("/tree/") {
        (path, Some(r))
    } else {
        (body, None)
    };

    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let caps = OWNER_REPO
        .captures(path)
        .ok_or_else(|| unrecognized(identifier, "expected owner/repo"))?;

    let reference = match reference.map(|r| r.trim_matches('/')) {
        Some("") => return Err(unrecognized(identifier, "empty ref")),
        Some(r) => r,
        None => DEFAULT_VCS_REF,
    };

    Ok(Descriptor {
        scheme: Scheme::VersionControl,
        location: format!("{}/{}", &caps["owner"], &caps["repo"]),
        reference: reference.to_string(),
    })
}

fn parse_local(identifier: &str, body: &str) -> Result<Descriptor> {
    let body = strip_drive_slash(body);
    if body.is_empty() {
        return Err(unrecognized(identifier, "empty path"));
    }

    let path = PathBuf::from(body);
    let absolute = if path.is_absolute() {
        path
    } else {
        std::path::absolute(&path)
            .map_err(|e| unrecognized(identifier, &format!("cannot resolve path: {}", e)))?
    };

    Ok(Descriptor {
        scheme: Scheme::LocalPath,
        location: absolute.to_string_lossy().to_string(),
        reference: LOCAL_REF.to_string(),
    })
}

/// `file:///C:/x` leaves `/C:/x`; drop the slash in front of a drive letter.
fn strip_drive_slash(body: &str) -> &str {
    let bytes = body.as_bytes();
    if bytes.len() >= 3 && bytes[0] == b'/' && bytes[1].is_ascii_alphabetic() && bytes[2] == b':'
    {
        &body[1..]
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(location: &str, reference: &str) -> Descriptor {
        Descriptor {
            scheme: Scheme::PackageRegistry,
            location: location.to_string(),
            reference: reference.to_string(),
        }
    }

    fn vcs(location: &str, reference: &str) -> Descriptor {
        Descriptor {
            scheme: Scheme::VersionControl,
            location: location.to_string(),
            reference: reference.to_string(),
        }
    }

    // -- Package registry --

    #[test]
    fn test_npm_prefix_default_version() {
        assert_eq!(parse("npm:tts-adapter").unwrap(), pkg("tts-adapter", "latest"));
    }

    #[test]
    fn test_npm_prefix_with_version() {
        assert_eq!(parse("npm:tts-adapter@1.2.3").unwrap(), pkg("tts-adapter", "1.2.3"));
    }

    #[test]
    fn test_scoped_name_not_split_on_scope_marker() {
        assert_eq!(parse("@acme/tts").unwrap(), pkg("@acme/tts", "latest"));
        assert_eq!(parse("npm:@acme/tts").unwrap(), pkg("@acme/tts", "latest"));
    }

    #[test]
    fn test_scoped_name_with_version() {
        assert_eq!(parse("@acme/tts@2.0.0-beta.1").unwrap(), pkg("@acme/tts", "2.0.0-beta.1"));
        assert_eq!(parse("npm:@acme/tts@^1").unwrap(), pkg("@acme/tts", "^1"));
    }

    #[test]
    fn test_invalid_package_names() {
        assert!(parse("npm:").is_err());
        assert!(parse("@").is_err());
        assert!(parse("@acme").is_err());
        assert!(parse("npm:Bad Name").is_err());
    }

    // -- Version control --

    #[test]
    fn test_github_short_prefix() {
        assert_eq!(parse("github:acme/tts").unwrap(), vcs("acme/tts", "main"));
        assert_eq!(parse("gh:acme/tts@v2").unwrap(), vcs("acme/tts", "v2"));
    }

    #[test]
    fn test_github_url_forms() {
        assert_eq!(parse("https://github.com/acme/tts").unwrap(), vcs("acme/tts", "main"));
        assert_eq!(parse("https://github.com/acme/tts.git").unwrap(), vcs("acme/tts", "main"));
        assert_eq!(parse("https://github.com/acme/tts/").unwrap(), vcs("acme/tts", "main"));
        assert_eq!(
            parse("https://github.com/acme/tts/tree/release-1").unwrap(),
            vcs("acme/tts", "release-1")
        );
        assert_eq!(parse("github.com/acme/tts#dev").unwrap(), vcs("acme/tts", "dev"));
        assert_eq!(parse("HTTPS://GitHub.com/acme/tts").unwrap(), vcs("acme/tts", "main"));
    }

    #[test]
    fn test_github_ref_with_slashes() {
        assert_eq!(parse("github:acme/tts@feature/x").unwrap(), vcs("acme/tts", "feature/x"));
    }

    #[test]
    fn test_github_malformed() {
        assert!(parse("github:acme").is_err());
        assert!(parse("github:acme/tts/extra").is_err());
        assert!(parse("github:acme/tts@").is_err());
        assert!(parse("gh:").is_err());
    }

    // -- Local paths --

    #[test]
    fn test_file_absolute() {
        let d = parse("file:///srv/services/demo").unwrap();
        assert_eq!(d.scheme, Scheme::LocalPath);
        assert_eq!(d.location, "/srv/services/demo");
        assert_eq!(d.reference, LOCAL_REF);
        assert_eq!(d.local_path(), Some(Path::new("/srv/services/demo")));
    }

    #[test]
    fn test_file_relative_made_absolute() {
        let d = parse("file:./services/demo").unwrap();
        assert!(Path::new(&d.location).is_absolute());
        assert!(d.location.ends_with("services/demo"));
    }

    #[test]
    fn test_drive_letter_slash_stripped() {
        assert_eq!(strip_drive_slash("/C:/work/demo"), "C:/work/demo");
        assert_eq!(strip_drive_slash("/srv/demo"), "/srv/demo");
    }

    #[test]
    fn test_file_with_at_sign_not_split() {
        let d = parse("file:///srv/demo@2").unwrap();
        assert_eq!(d.location, "/srv/demo@2");
    }

    // -- General --

    #[test]
    fn test_unrecognized() {
        let err = parse("ftp://example.com/x").unwrap_err();
        assert!(matches!(err, SlipwayError::UnrecognizedIdentifier(_)));
        assert!(parse("").is_err());
        assert!(parse("   ").is_err());
    }

    #[test]
    fn test_has_known_prefix() {
        assert!(has_known_prefix("github:"));
        assert!(has_known_prefix("@x"));
        assert!(has_known_prefix("file:"));
        assert!(!has_known_prefix("openai"));
    }

    #[test]
    fn test_parse_is_deterministic() {
        for id in [
            "npm:@acme/tts@1.0.0",
            "github:acme/tts@v1",
            "https://github.com/acme/tts",
            "file:///srv/demo",
        ] {
            assert_eq!(parse(id).unwrap(), parse(id).unwrap(), "{}", id);
        }
    }

    #[test]
    fn test_owner_repo() {
        let d = parse("github:acme/tts").unwrap();
        assert_eq!(d.owner_repo(), Some(("acme", "tts")));
        assert_eq!(parse("npm:x").unwrap().owner_repo(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(parse("gh:acme/tts").unwrap().to_string(), "github:acme/tts@main");
        assert_eq!(parse("@acme/tts").unwrap().to_string(), "npm:@acme/tts@latest");
    }
}
