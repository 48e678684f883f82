use std::collections::HashMap;
use std::path::Path;

const GZIP_EXTENSION: &str = ".gz";
const GZIP_ENCODING: &str = "gzip";

/// Types served regardless of what the MIME database says
const BUILTIN_TYPES: &[(&str, &str)] = &[
    ("js", "application/javascript"),
    ("mjs", "application/javascript"),
];

/// Content type and optional content encoding to present to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDecision {
    pub content_type: String,
    pub encoding: Option<String>,
}

/// Derives content type/encoding for a destination name.
///
/// Overrides are keyed by extension including the leading dot (`".svg"`) and
/// win over the MIME database, except for `name.ext.gz` which always resolves
/// to the inner extension's type with `gzip` encoding.
#[derive(Debug, Clone, Default)]
pub struct ContentClassifier {
    overrides: HashMap<String, String>,
}

impl ContentClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: HashMap<String, String>) -> Self {
        Self { overrides }
    }

    /// Add a single extension override
    pub fn with_override<E: Into<String>, T: Into<String>>(mut self, ext: E, content_type: T) -> Self {
        self.overrides.insert(ext.into(), content_type.into());
        self
    }

    pub fn classify(&self, filename: &str) -> ContentDecision {
        let (name, ext) = split_extension(filename);
        let mut content_type = self.overrides.get(ext).cloned();
        let mut encoding = None;

        if ext == GZIP_EXTENSION && name.contains('.') {
            content_type = Some(lookup_path(name));
            encoding = Some(GZIP_ENCODING.to_string());
        }

        let content_type = content_type.unwrap_or_else(|| lookup_extension(ext));

        ContentDecision {
            content_type,
            encoding,
        }
    }
}

/// Split the last path component into `(name, ext)`, `ext` keeping its dot.
///
/// A dot in the first position does not start an extension, so `.bashrc`
/// has none.
fn split_extension(filename: &str) -> (&str, &str) {
    let base = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);

    match base.rfind('.') {
        Some(idx) if idx > 0 => base.split_at(idx),
        _ => (base, ""),
    }
}

fn lookup_path(name: &str) -> String {
    let (_, ext) = split_extension(name);
    lookup_extension(ext)
}

fn lookup_extension(ext: &str) -> String {
    let ext = ext.trim_start_matches('.');
    let builtin = BUILTIN_TYPES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        .map(|(_, content_type)| content_type.to_string());

    builtin.unwrap_or_else(|| {
        mime_guess::from_ext(ext)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_up_database_type() {
        let classifier = ContentClassifier::new();

        assert_eq!(classifier.classify("hello.js").content_type, "application/javascript");
        assert_eq!(classifier.classify("lib/esm.mjs").content_type, "application/javascript");
        assert_eq!(classifier.classify("hello.html").content_type, "text/html");
        assert_eq!(classifier.classify("img/logo.png").content_type, "image/png");
        assert_eq!(classifier.classify("hello.js").encoding, None);
    }

    #[test]
    fn test_unknown_extension_is_octet_stream() {
        let classifier = ContentClassifier::new();

        assert_eq!(
            classifier.classify("hello.dfadfasdf").content_type,
            "application/octet-stream"
        );
        assert_eq!(classifier.classify("README").content_type, "application/octet-stream");
        assert_eq!(classifier.classify(".bashrc").content_type, "application/octet-stream");
    }

    #[test]
    fn test_double_extension_gzip() {
        let classifier = ContentClassifier::new();

        assert_eq!(
            classifier.classify("archive.tar.gz"),
            ContentDecision {
                content_type: "application/x-tar".to_string(),
                encoding: Some("gzip".to_string()),
            }
        );
        assert_eq!(
            classifier.classify("dist/hello.js.gz"),
            ContentDecision {
                content_type: "application/javascript".to_string(),
                encoding: Some("gzip".to_string()),
            }
        );
    }

    #[test]
    fn test_plain_gzip_has_no_encoding() {
        let decision = ContentClassifier::new().classify("backup.gz");

        assert_eq!(decision.content_type, "application/gzip");
        assert_eq!(decision.encoding, None);
    }

    #[test]
    fn test_prefers_override_over_database() {
        let classifier = ContentClassifier::new()
            .with_override(".svgs", "text/plain")
            .with_override(".html", "fake/news");

        assert_eq!(classifier.classify("hello.html").content_type, "fake/news");
        assert_eq!(classifier.classify("hello.svgs").content_type, "text/plain");
        assert_eq!(classifier.classify("hello.css").content_type, "text/css");
    }

    #[test]
    fn test_override_beats_builtin_javascript_type() {
        let classifier = ContentClassifier::new().with_override(".js", "text/javascript");

        assert_eq!(classifier.classify("hello.js").content_type, "text/javascript");
        assert_eq!(
            classifier.classify("hello.js.gz").content_type,
            "application/javascript"
        );
    }

    #[test]
    fn test_gzip_rule_beats_gz_override() {
        let classifier = ContentClassifier::new().with_override(".gz", "application/x-custom");

        assert_eq!(classifier.classify("site.css.gz").content_type, "text/css");
        assert_eq!(classifier.classify("dump.gz").content_type, "application/x-custom");
    }
}
