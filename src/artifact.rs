use std::path::Path;

use regex::Regex;

use crate::types::ModuleName;

/// Suffix the bundler appends to the debug build of a module entry.
const SOURCEMAP_SUFFIX: &str = "_sourcemap";

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("invalid artifact pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("artifact pattern needs exactly 2 capture groups (name, version), found {0}")]
    CaptureGroups(usize),
}

// ---------------------------------------------------------------------------
// Naming contract
// ---------------------------------------------------------------------------

/// Caller-supplied `<module>-<versionHash>.<ext>` matcher.
///
/// Group 1 captures the module name, group 2 the version. A match only counts
/// when it starts at the beginning of the file name.
#[derive(Debug, Clone)]
pub struct ArtifactPattern {
    regex: Regex,
}

/// A build output that names a publishable module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub module: ModuleName,
    pub version: String,
    pub file_name: String,
}

impl ArtifactPattern {
    pub fn new(pattern: &str) -> Result<Self, ArtifactError> {
        let regex = Regex::new(pattern)?;
        let groups = regex.captures_len() - 1;
        if groups != 2 {
            return Err(ArtifactError::CaptureGroups(groups));
        }
        Ok(Self { regex })
    }

    /// Pattern for one known module: `^(<name>)-(<hash>)\.<ext>$`.
    pub fn for_module(name: &str, ext: &str) -> Result<Self, ArtifactError> {
        let pattern = format!(
            r"^({})-([A-Za-z0-9_-]+)\.{}$",
            regex::escape(&name.trim().to_lowercase()),
            regex::escape(ext.trim_start_matches('.')),
        );
        Self::new(&pattern)
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Extract `(module, version)` from a file name, or `None` when the file is
    /// not a publishable module (shared chunk, asset, source map...).
    pub fn parse(&self, file_name: &str) -> Option<Artifact> {
        let caps = self.regex.captures(file_name)?;
        if caps.get(0)?.start() != 0 {
            return None;
        }
        let name = caps.get(1)?.as_str();
        let version = caps.get(2)?.as_str();
        if name.is_empty() || version.is_empty() {
            return None;
        }
        Some(Artifact {
            module: ModuleName::new(name),
            version: version.to_owned(),
            file_name: file_name.to_owned(),
        })
    }
}

fn is_sourcemap(file_name: &str) -> bool {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|stem| stem.ends_with(SOURCEMAP_SUFFIX))
}

/// Scan a build output directory for the first file (in name order) matching
/// `pattern`. Source-map builds are never published.
#[tracing::instrument(skip(pattern), fields(pattern = pattern.as_str()), err)]
pub async fn discover(dir: &Path, pattern: &ArtifactPattern) -> std::io::Result<Option<Artifact>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort();

    for name in &names {
        if is_sourcemap(name) {
            continue;
        }
        if let Some(artifact) = pattern.parse(name) {
            return Ok(Some(artifact));
        }
    }

    tracing::debug!(dir = %dir.display(), "no publishable artifact");
    Ok(None)
}

// ---------------------------------------------------------------------------
// Module filter
// ---------------------------------------------------------------------------

/// Case-insensitive substring filter restricting a batch to matching modules.
#[derive(Debug, Clone, Default)]
pub struct ModuleFilter(Option<String>);

impl ModuleFilter {
    pub fn new(expr: Option<&str>) -> Self {
        Self(
            expr.map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty()),
        )
    }

    pub fn matches(&self, module: &ModuleName) -> bool {
        self.0
            .as_deref()
            .is_none_or(|expr| module.as_str().contains(expr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_module_and_version() {
        let pattern = ArtifactPattern::for_module("shop-cart", "js").unwrap();
        let artifact = pattern.parse("shop-cart-Bx9_k2-A.js").unwrap();
        assert_eq!(artifact.module.as_str(), "shop-cart");
        assert_eq!(artifact.version, "Bx9_k2-A");
        assert_eq!(artifact.file_name, "shop-cart-Bx9_k2-A.js");
    }

    #[test]
    fn module_name_is_normalized() {
        let pattern = ArtifactPattern::new(r"(Shop-Cart)-(.*)\.js").unwrap();
        let artifact = pattern.parse("Shop-Cart-abc.js").unwrap();
        assert_eq!(artifact.module.as_str(), "shop-cart");
    }

    #[test]
    fn rejects_non_matching_names() {
        let pattern = ArtifactPattern::for_module("shop-cart", "js").unwrap();
        assert!(pattern.parse("vendor-abc.js").is_none());
        assert!(pattern.parse("shop-cart.js").is_none());
        assert!(pattern.parse("shop-cart-abc.css").is_none());
        assert!(pattern.parse("shop-cart-abc.js.map").is_none());
    }

    #[test]
    fn match_must_start_at_beginning() {
        let pattern = ArtifactPattern::new(r"(cart)-(.*)\.js").unwrap();
        assert!(pattern.parse("shop-cart-abc.js").is_none());
        assert!(pattern.parse("cart-abc.js").is_some());
    }

    #[test]
    fn ext_with_leading_dot_is_accepted() {
        let pattern = ArtifactPattern::for_module("site-html", ".html").unwrap();
        assert!(pattern.parse("site-html-0123456789.html").is_some());
    }

    #[test]
    fn pattern_requires_two_groups() {
        let err = ArtifactPattern::new(r"(cart)-.*\.js").unwrap_err();
        assert!(matches!(err, ArtifactError::CaptureGroups(1)));
        assert!(ArtifactPattern::new(r"(a)-(b)-(c)").is_err());
        assert!(matches!(
            ArtifactPattern::new(r"(unclosed"),
            Err(ArtifactError::Regex(_))
        ));
    }

    #[test]
    fn special_characters_in_name_are_escaped() {
        let pattern = ArtifactPattern::for_module("a.b", "js").unwrap();
        assert!(pattern.parse("axb-123.js").is_none());
        assert!(pattern.parse("a.b-123.js").is_some());
    }

    #[test]
    fn sourcemap_detection() {
        assert!(is_sourcemap("shop-cart-abc_sourcemap.js"));
        assert!(!is_sourcemap("shop-cart-abc.js"));
    }

    #[test]
    fn filter_matches_substring_case_insensitively() {
        let filter = ModuleFilter::new(Some("CART"));
        assert!(filter.matches(&ModuleName::new("shop-cart")));
        assert!(!filter.matches(&ModuleName::new("shop-checkout")));
        assert!(ModuleFilter::new(None).matches(&ModuleName::new("anything")));
        assert!(ModuleFilter::new(Some("  ")).matches(&ModuleName::new("anything")));
    }

    #[tokio::test]
    async fn discover_skips_sourcemaps_and_picks_first_match() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "shop-cart-aaa_sourcemap.js",
            "shop-cart-bbb.js",
            "vendor-ccc.js",
            "styles.css",
        ] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let pattern = ArtifactPattern::for_module("shop-cart", "js").unwrap();
        let artifact = discover(dir.path(), &pattern).await.unwrap().unwrap();
        assert_eq!(artifact.version, "bbb");
    }

    #[tokio::test]
    async fn discover_returns_none_without_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vendor-ccc.js"), b"").unwrap();

        let pattern = ArtifactPattern::for_module("shop-cart", "js").unwrap();
        assert!(discover(dir.path(), &pattern).await.unwrap().is_none());
    }
}
