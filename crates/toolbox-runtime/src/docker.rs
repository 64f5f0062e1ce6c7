//! Docker backend, used on plain container hosts or when forced.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::process::ExitStatus;

use serde::Deserialize;
use tracing::debug;

use crate::command::CliCommand;
use crate::traits::{first_id, looks_like_container_id, POD_NAME_LABEL, POD_NAMESPACE_LABEL};
use crate::{
    ContainerInfo, ContainerRuntime, PodSummary, Result, RuntimeError, RuntimeKind,
};

/// Container runtime reached through `docker`.
#[derive(Debug)]
pub struct DockerRuntime {
    cli: CliCommand,
}

impl DockerRuntime {
    /// Use `docker` from PATH.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::BinaryNotFound` if docker is not installed.
    pub fn new() -> Result<Self> {
        Ok(Self {
            cli: CliCommand::from_path("docker")?,
        })
    }

    /// Use a specific docker binary.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            cli: CliCommand::new(binary),
        }
    }

    fn ps_filter(&self, filter: &str) -> Result<Option<String>> {
        let stdout = self.cli.run_checked(&["ps", "-q", "--filter", filter])?;
        Ok(first_id(&stdout))
    }
}

impl ContainerRuntime for DockerRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Docker
    }

    fn find_container(&self, pod: &str, container: Option<&str>) -> Result<String> {
        // dockershim names containers k8s_<container>_<pod>_<namespace>_<uid>_<attempt>
        let filters = match container {
            Some(c) => vec![
                format!("name=k8s_{}_{}_", c, pod),
                format!("name={}", c),
            ],
            None => vec![
                format!("label={}={}", POD_NAME_LABEL, pod),
                format!("name={}", pod),
            ],
        };

        for filter in &filters {
            if let Some(id) = self.ps_filter(filter)? {
                debug!(pod = %pod, filter = %filter, container_id = %id, "container found");
                return Ok(id);
            }
        }

        if looks_like_container_id(pod) {
            if let Some(id) = self.ps_filter(&format!("id={}", pod))? {
                return Ok(id);
            }
        }

        Err(RuntimeError::ContainerNotFound(pod.to_string()))
    }

    fn inspect(&self, id: &str) -> Result<ContainerInfo> {
        let stdout = self.cli.run_checked(&["inspect", id])?;
        parse_inspect(&stdout)
    }

    fn list_pods(&self) -> Result<Vec<PodSummary>> {
        let stdout = self.cli.run_checked(&["ps", "--format", "{{json .}}"])?;
        parse_ps(&stdout)
    }

    fn passthrough(&self, args: &[String]) -> Result<ExitStatus> {
        self.cli.run_inherited(args)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Inspect {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    state: Option<State>,
    #[serde(default)]
    graph_driver: Option<GraphDriver>,
    #[serde(default)]
    config: Option<Config>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct State {
    #[serde(default)]
    pid: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GraphDriver {
    #[serde(default)]
    data: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Config {
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
}

/// Parse `docker inspect` output (a JSON array with one element).
pub fn parse_inspect(json: &str) -> Result<ContainerInfo> {
    let mut list: Vec<Inspect> = serde_json::from_str(json)?;
    if list.is_empty() {
        return Err(RuntimeError::ParseError("docker inspect returned no containers".into()));
    }
    let inspect = list.swap_remove(0);

    let pod = inspect
        .config
        .and_then(|c| c.labels)
        .and_then(|mut l| l.remove(POD_NAME_LABEL));

    Ok(ContainerInfo {
        id: inspect.id,
        name: inspect.name.map(|n| n.trim_start_matches('/').to_string()),
        pod,
        pid: inspect.state.map(|s| s.pid).filter(|p| *p > 0),
        root_path: inspect
            .graph_driver
            .and_then(|g| g.data)
            .and_then(|mut d| d.remove("MergedDir"))
            .map(PathBuf::from),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PsLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(default)]
    names: String,
    #[serde(default)]
    labels: String,
    #[serde(default)]
    state: String,
}

/// Split docker's `k=v,k=v` label rendering.
fn parse_labels(labels: &str) -> HashMap<&str, &str> {
    labels
        .split(',')
        .filter_map(|kv| kv.split_once('='))
        .collect()
}

/// Parse `docker ps --format '{{json .}}'`, one container per line, into
/// pods. Containers without a pod label are listed under their own name.
pub fn parse_ps(stdout: &str) -> Result<Vec<PodSummary>> {
    let mut pods: BTreeMap<(Option<String>, String), PodSummary> = BTreeMap::new();

    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        let ps: PsLine = serde_json::from_str(line)?;
        let labels = parse_labels(&ps.labels);
        let name = labels
            .get(POD_NAME_LABEL)
            .map(|s| s.to_string())
            .unwrap_or_else(|| ps.names.clone());
        let namespace = labels.get(POD_NAMESPACE_LABEL).map(|s| s.to_string());

        pods.entry((namespace.clone(), name.clone()))
            .or_insert_with(|| PodSummary {
                id: ps.id.clone(),
                name,
                namespace,
                state: ps.state.to_lowercase(),
            });
    }

    Ok(pods.into_values().collect())
}
