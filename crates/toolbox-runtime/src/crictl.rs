//! CRI backend driven through `crictl`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::command::CliCommand;
use crate::traits::{first_id, looks_like_container_id, POD_NAME_LABEL, POD_NAMESPACE_LABEL};
use crate::{
    ContainerInfo, ContainerRuntime, PodSummary, Result, RuntimeError, RuntimeKind,
};

/// Default CRI endpoint of containerd.
pub const DEFAULT_ENDPOINT: &str = "unix:///run/containerd/containerd.sock";

/// Bundle directory containerd creates for each task in the k8s.io namespace.
pub const CONTAINERD_TASK_DIR: &str = "/run/containerd/io.containerd.runtime.v2.task/k8s.io";

/// Container runtime reached through `crictl`.
#[derive(Debug)]
pub struct CrictlRuntime {
    cli: CliCommand,
}

impl CrictlRuntime {
    /// Drive the crictl binary at `binary` against `endpoint`.
    pub fn new(binary: impl Into<PathBuf>, endpoint: &str) -> Self {
        let cli = CliCommand::new(binary).env("CONTAINER_RUNTIME_ENDPOINT", endpoint);
        Self { cli }
    }

    fn ps(&self, extra: &[&str]) -> Result<Option<String>> {
        let mut args = vec!["ps", "-q", "--state", "Running"];
        args.extend_from_slice(extra);
        Ok(first_id(&self.cli.run_checked(&args)?))
    }
}

impl ContainerRuntime for CrictlRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Crictl
    }

    fn find_container(&self, pod: &str, container: Option<&str>) -> Result<String> {
        let label = format!("{}={}", POD_NAME_LABEL, pod);
        let mut filter = vec!["--label", label.as_str()];
        if let Some(name) = container {
            filter.push("--name");
            filter.push(name);
        }

        if let Some(id) = self.ps(&filter)? {
            debug!(pod = %pod, container_id = %id, "container found by pod label");
            return Ok(id);
        }

        if looks_like_container_id(pod) {
            if let Some(id) = self.ps(&["--id", pod])? {
                debug!(container_id = %id, "argument is a container id");
                return Ok(id);
            }
        }

        Err(RuntimeError::ContainerNotFound(pod.to_string()))
    }

    fn inspect(&self, id: &str) -> Result<ContainerInfo> {
        let stdout = self.cli.run_checked(&["inspect", id])?;
        parse_inspect(&stdout, Path::new(CONTAINERD_TASK_DIR))
    }

    fn list_pods(&self) -> Result<Vec<PodSummary>> {
        let stdout = self.cli.run_checked(&["pods", "-o", "json"])?;
        parse_pods(&stdout)
    }

    fn passthrough(&self, args: &[String]) -> Result<ExitStatus> {
        self.cli.run_inherited(args)
    }
}

#[derive(Debug, Deserialize)]
struct Inspect {
    status: InspectStatus,
    #[serde(default)]
    info: Option<InspectInfo>,
}

#[derive(Debug, Deserialize)]
struct InspectStatus {
    id: String,
    #[serde(default)]
    metadata: Option<Metadata>,
    #[serde(default)]
    labels: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InspectInfo {
    #[serde(default)]
    pid: Option<i32>,
    #[serde(default)]
    runtime_spec: Option<RuntimeSpec>,
}

#[derive(Debug, Deserialize)]
struct RuntimeSpec {
    #[serde(default)]
    root: Option<SpecRoot>,
}

#[derive(Debug, Deserialize)]
struct SpecRoot {
    path: String,
}

/// Parse `crictl inspect` output.
///
/// A relative OCI root path is resolved against `<task_dir>/<id>`.
pub fn parse_inspect(json: &str, task_dir: &Path) -> Result<ContainerInfo> {
    let inspect: Inspect = serde_json::from_str(json)?;
    let id = inspect.status.id;

    let (pid, root) = match inspect.info {
        Some(info) => (
            info.pid.filter(|p| *p > 0),
            info.runtime_spec.and_then(|s| s.root).map(|r| r.path),
        ),
        None => {
            warn!(container_id = %id, "crictl inspect has no info section (not verbose?)");
            (None, None)
        }
    };

    let root_path = root.map(|r| {
        let r = PathBuf::from(r);
        if r.is_absolute() {
            r
        } else {
            task_dir.join(&id).join(r)
        }
    });

    Ok(ContainerInfo {
        name: inspect.status.metadata.map(|m| m.name),
        pod: inspect.status.labels.get(POD_NAME_LABEL).cloned(),
        id,
        pid,
        root_path,
    })
}

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<PodItem>,
}

#[derive(Debug, Deserialize)]
struct PodItem {
    id: String,
    metadata: Metadata,
    #[serde(default)]
    state: String,
    #[serde(default)]
    labels: HashMap<String, String>,
}

/// Parse `crictl pods -o json` output.
pub fn parse_pods(json: &str) -> Result<Vec<PodSummary>> {
    let list: PodList = serde_json::from_str(json)?;
    Ok(list
        .items
        .into_iter()
        .map(|item| PodSummary {
            id: item.id,
            namespace: item
                .metadata
                .namespace
                .or_else(|| item.labels.get(POD_NAMESPACE_LABEL).cloned()),
            name: item.metadata.name,
            state: item
                .state
                .strip_prefix("SANDBOX_")
                .unwrap_or(&item.state)
                .to_lowercase(),
        })
        .collect())
}
