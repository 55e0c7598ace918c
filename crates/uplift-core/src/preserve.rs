use std::path::Path;

/// Deduplicated set of root-relative paths that must survive purge, install,
/// snapshot, and restore. Matching is exact-path or path-prefix on the
/// normalized form; a preserved directory protects everything beneath it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreserveSet {
    entries: Vec<String>,
}

impl PreserveSet {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized = Vec::new();
        for entry in entries {
            let entry = normalize(entry.as_ref());
            if entry.is_empty() || normalized.contains(&entry) {
                continue;
            }
            normalized.push(entry);
        }
        Self {
            entries: normalized,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when `rel` is a preserved path or lives beneath one.
    pub fn contains(&self, rel: &Path) -> bool {
        let rel = normalize_path(rel);
        if rel.is_empty() {
            return false;
        }
        self.entries
            .iter()
            .any(|entry| rel == *entry || rel.starts_with(&format!("{entry}/")))
    }

    /// True when some preserved path lives strictly beneath `rel`; purge must
    /// recurse into such a directory instead of deleting it wholesale.
    pub fn shelters(&self, rel: &Path) -> bool {
        let rel = normalize_path(rel);
        if rel.is_empty() {
            return !self.entries.is_empty();
        }
        let prefix = format!("{rel}/");
        self.entries.iter().any(|entry| entry.starts_with(&prefix))
    }
}

fn normalize(path: &str) -> String {
    let mut value = path.trim().replace('\\', "/");
    while let Some(stripped) = value.strip_prefix("./") {
        value = stripped.to_string();
    }
    value.trim_matches('/').to_string()
}

fn normalize_path(path: &Path) -> String {
    let mut parts = Vec::new();
    for component in path.components() {
        if let std::path::Component::Normal(part) = component {
            parts.push(part.to_string_lossy().into_owned());
        }
    }
    parts.join("/")
}
