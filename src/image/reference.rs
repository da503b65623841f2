//! Image reference parsing and qualification.
//!
//! A reference is qualified into `registry/repository:tag` form so it can
//! key the image cache and address the OCI distribution API. A bare
//! single-segment name (`alpine`) is qualified against
//! `index.docker.io/library/`; a missing tag defaults to `latest`.

const DEFAULT_REGISTRY: &str = "index.docker.io";
const DEFAULT_NAMESPACE: &str = "library";
const DEFAULT_TAG: &str = "latest";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

impl Reference {
    /// The form used as the image-cache directory name and log messages:
    /// `registry/repository:tag`.
    pub fn qualified(&self) -> String {
        format!("{}/{}:{}", self.registry, self.repository, self.tag)
    }

    pub fn manifest_url(&self) -> String {
        format!(
            "https://{}/v2/{}/manifests/{}",
            self.registry, self.repository, self.tag
        )
    }

    pub fn blob_url(&self, digest: &str) -> String {
        format!(
            "https://{}/v2/{}/blobs/{}",
            self.registry, self.repository, digest
        )
    }
}

pub fn parse(raw: &str) -> Reference {
    // A colon after the last slash is a tag separator; a colon with a slash
    // after it belongs to a registry host:port and is not a tag.
    let (before_tag, tag) = match raw.rsplit_once(':') {
        Some((before, tag)) if !before.is_empty() && !tag.contains('/') => {
            (before.to_string(), tag.to_string())
        }
        _ => (raw.to_string(), DEFAULT_TAG.to_string()),
    };

    let mut parts: Vec<&str> = before_tag.split('/').collect();

    let registry = if parts.len() > 1 && (parts[0].contains('.') || parts[0].contains(':')) {
        parts.remove(0).to_string()
    } else {
        DEFAULT_REGISTRY.to_string()
    };

    let repository = if parts.len() == 1 {
        format!("{}/{}", DEFAULT_NAMESPACE, parts[0])
    } else {
        parts.join("/")
    };

    Reference {
        registry,
        repository,
        tag,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_gets_library_namespace_and_latest_tag() {
        let r = parse("alpine");
        assert_eq!(r.registry, "index.docker.io");
        assert_eq!(r.repository, "library/alpine");
        assert_eq!(r.tag, "latest");
    }

    #[test]
    fn tag_is_preserved_when_present() {
        let r = parse("alpine:3.19");
        assert_eq!(r.repository, "library/alpine");
        assert_eq!(r.tag, "3.19");
    }

    #[test]
    fn namespaced_name_keeps_its_namespace() {
        let r = parse("library/ubuntu:22.04");
        assert_eq!(r.repository, "library/ubuntu");
        assert_eq!(r.tag, "22.04");
    }

    #[test]
    fn explicit_registry_host_is_recognized() {
        let r = parse("ghcr.io/foo/bar:v1");
        assert_eq!(r.registry, "ghcr.io");
        assert_eq!(r.repository, "foo/bar");
        assert_eq!(r.tag, "v1");
    }

    #[test]
    fn qualified_form_matches_cache_directory_naming() {
        let r = parse("alpine:3.19");
        assert_eq!(r.qualified(), "index.docker.io/library/alpine:3.19");
    }
}
