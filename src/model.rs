//! On-disk serde data model: run options and container details.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// `status/<id>/containerDetails.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContainerStatus {
    Created,
    Running,
    Stopped,
    Exited,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Stopped => "stopped",
            ContainerStatus::Exited => "exited",
        };
        write!(f, "{}", s)
    }
}

/// One entry of `runOptions.mounts`; only `mount_type == "bind"` is
/// supported by the assembler and init.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountDescriptor {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub mount_type: String,
}

/// The workspace mount: the orchestrator's project directory, bound into
/// the container at a fixed target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceMount {
    pub source: String,
    pub target: String,
}

/// Fields the orchestrator is allowed to request but this driver does not
/// implement; their presence is a hard failure at `Start`, never a silent
/// no-op.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsupportedOptions {
    #[serde(default)]
    pub security_opt: Vec<String>,
    #[serde(default)]
    pub cap_add: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    pub image: String,
    #[serde(default)]
    pub entrypoint: String,
    #[serde(default)]
    pub cmd: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub workspace_mount: Option<WorkspaceMount>,
    #[serde(default)]
    pub mounts: Vec<MountDescriptor>,
    #[serde(flatten)]
    pub unsupported: UnsupportedOptions,
}

impl RunOptions {
    /// Returns the unsupported field names actually set, if any.
    pub fn unsupported_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if !self.unsupported.security_opt.is_empty() {
            fields.push("securityOpt");
        }
        if !self.unsupported.cap_add.is_empty() {
            fields.push("capAdd");
        }
        fields
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDetails {
    pub id: String,
    pub status: ContainerStatus,
    pub created_at: String,
    #[serde(default)]
    pub started_at: String,
    #[serde(default)]
    pub labels: Vec<String>,
}
