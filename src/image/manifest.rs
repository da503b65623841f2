//! Minimal OCI/Docker v2 image manifest and config types. In practice every
//! registry serves schema2 manifests for a single-platform pull, so no
//! manifest-list dispatch is implemented.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub digest: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "mediaType", default)]
    pub media_type: String,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(rename = "Env", default, deserialize_with = "null_as_empty")]
    pub env: Vec<String>,
    #[serde(rename = "Entrypoint", default, deserialize_with = "null_as_empty")]
    pub entrypoint: Vec<String>,
    #[serde(rename = "Cmd", default, deserialize_with = "null_as_empty")]
    pub cmd: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfigFile {
    #[serde(default)]
    pub config: ImageConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_a_schema2_manifest() {
        let json = r#"{
            "schemaVersion": 2,
            "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
            "config": {"mediaType": "application/vnd.docker.container.image.v1+json", "digest": "sha256:aaa", "size": 10},
            "layers": [{"mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip", "digest": "sha256:bbb", "size": 100}]
        }"#;
        let manifest: Manifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.layers.len(), 1);
        assert_eq!(manifest.config.digest, "sha256:aaa");
    }

    #[test]
    fn deserializes_image_config_default_command() {
        let json = r#"{"config": {"Env": ["PATH=/usr/bin"], "Entrypoint": null, "Cmd": ["/bin/sh"]}}"#;
        let file: ImageConfigFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.config.cmd, vec!["/bin/sh".to_string()]);
        assert_eq!(file.config.env, vec!["PATH=/usr/bin".to_string()]);
        assert!(file.config.entrypoint.is_empty());
    }
}
