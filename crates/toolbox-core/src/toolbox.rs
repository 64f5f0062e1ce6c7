//! The diagnostic operations.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::thread;
use std::time::Duration;

use chrono::Local;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use toolbox_runtime::{
    ContainerInfo, ContainerRuntime, CrictlRuntime, DockerRuntime, PodSummary, RuntimeKind,
};
use toolbox_tools::{Tool, ToolCache};
use tracing::{debug, info, warn};

use crate::artifact::{dumps_dir_name, Artifact, ArtifactKind, ProfileFormat};
use crate::jattach::{Jattach, JfrAction, JfrCommand};
use crate::nsenter::{Nsenter, SHELL_NAMESPACES};
use crate::procfs::{JavaProcess, Procfs};
use crate::profiler::{install_into, AsyncProfiler, ProfilerEvent};
use crate::relocate::{hand_over, relocate, Owner};
use crate::target::{choose_java, root_path, Target};
use crate::transfer::{self, Transfer};
use crate::wait::{wait_for_stop, StopReason};
use crate::{Config, Result, ToolboxError};

/// Prompt shown while a recording runs.
pub const STOP_PROMPT: &str = "Press any key to stop...";

/// Name of the recording `jfr_profile` starts.
const PROFILE_RECORDING: &str = "diag_profile";

/// Options shared by the async-profiler profile operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileOptions {
    pub event: ProfilerEvent,
    pub format: ProfileFormat,
    /// Fixed duration instead of waiting for a key.
    pub duration: Option<Duration>,
}

/// Result of a `jfr` command.
#[derive(Debug, Clone)]
pub struct JfrOutcome {
    /// What the JVM answered.
    pub output: String,
    /// Relocated recording for stop/dump.
    pub file: Option<PathBuf>,
}

/// Stack selection for `jfr_to_flamegraph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlamegraphMode {
    #[default]
    Cpu,
    Alloc,
    Lock,
}

/// Entry point for every diagnostic operation.
pub struct Toolbox {
    config: Config,
    runtime: Result<Box<dyn ContainerRuntime>>,
    tools: ToolCache,
    procfs: Procfs,
    nsenter: Option<PathBuf>,
    output_dir: PathBuf,
    owner: Option<Owner>,
}

impl Toolbox {
    /// Build from configuration, selecting the runtime backend and writing
    /// results to the current directory.
    ///
    /// A missing runtime is only an error for operations that need one.
    pub fn from_config(config: Config) -> Result<Self> {
        let tools = ToolCache::new(config.cache_dir.clone())?;
        let runtime = select_runtime(&config, &tools)
            .inspect_err(|e| debug!(error = %e, "no container runtime"));
        if let Ok(r) = &runtime {
            info!(runtime = %r.kind(), "container runtime selected");
        }
        let output_dir = std::env::current_dir()?;
        Ok(Self::build(config, runtime, tools, output_dir))
    }

    pub fn new(
        config: Config,
        runtime: Box<dyn ContainerRuntime>,
        tools: ToolCache,
        output_dir: PathBuf,
    ) -> Self {
        Self::build(config, Ok(runtime), tools, output_dir)
    }

    fn build(
        config: Config,
        runtime: Result<Box<dyn ContainerRuntime>>,
        tools: ToolCache,
        output_dir: PathBuf,
    ) -> Self {
        let procfs = Procfs::new(&config.proc_root);
        let owner = config.sudo_user.as_deref().and_then(Owner::lookup);
        Self {
            config,
            runtime,
            tools,
            procfs,
            nsenter: which::which("nsenter").ok(),
            output_dir,
            owner,
        }
    }

    /// Use this nsenter binary instead of the one in PATH.
    pub fn with_nsenter(mut self, binary: impl Into<PathBuf>) -> Self {
        self.nsenter = Some(binary.into());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn runtime(&self) -> Result<&dyn ContainerRuntime> {
        match &self.runtime {
            Ok(runtime) => Ok(runtime.as_ref()),
            Err(e) => Err(ToolboxError::RuntimeUnavailable(e.to_string())),
        }
    }

    fn nsenter(&self, target: i32) -> Result<Nsenter> {
        let binary = self
            .nsenter
            .as_ref()
            .ok_or_else(|| ToolboxError::BinaryNotFound("nsenter".into()))?;
        Ok(Nsenter::new(binary, target))
    }

    // ==================== Resolution ====================

    /// Container of `pod` and its init PID.
    fn running_container(
        &self,
        pod: &str,
        container: Option<&str>,
    ) -> Result<(ContainerInfo, i32)> {
        let runtime = self.runtime()?;
        let id = runtime.find_container(pod, container)?;
        let info = runtime.inspect(&id)?;
        let pid = info
            .pid
            .ok_or_else(|| ToolboxError::PidNotFound(format!("container {} is not running", id)))?;
        Ok((info, pid))
    }

    /// Resolve pod → container → init PID → root path → JVM.
    pub fn resolve(&self, pod: &str, container: Option<&str>) -> Result<Target> {
        let (info, pid) = self.running_container(pod, container)?;
        let root = root_path(info.root_path.as_deref(), self.procfs.root(), pid);

        let java = match self.config.java_pid {
            Some(forced) => {
                debug!(pid = forced, "using JAVAPID");
                self.procfs.describe(forced)?
            }
            None => {
                let (chosen, others) = choose_java(self.procfs.java_processes(pid)?, pod)?;
                if !others.is_empty() {
                    let pids: Vec<i32> = others.iter().map(|p| p.host_pid).collect();
                    warn!(
                        chosen = chosen.host_pid,
                        others = ?pids,
                        "several java processes, set JAVAPID to pick another"
                    );
                }
                chosen
            }
        };

        info!(
            pod = %pod,
            container_id = %info.id,
            pid,
            java_pid = java.host_pid,
            java_ns_pid = java.ns_pid,
            root = ?root,
            "target resolved"
        );
        Ok(Target {
            pod: pod.to_string(),
            container: info,
            pid,
            root_path: root,
            java,
        })
    }

    /// Pod names close to `name`, best first.
    pub fn suggest_pods(&self, name: &str) -> Vec<String> {
        let pods = match self.runtime().and_then(|r| r.list_pods().map_err(ToolboxError::from)) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "cannot list pods for suggestions");
                return Vec::new();
            }
        };
        suggest(name, pods.iter().map(|p| p.name.as_str()))
    }

    fn jattach(&self) -> Result<Jattach> {
        Ok(Jattach::new(self.tools.ensure(Tool::Jattach)?))
    }

    fn stamp(&self, kind: ArtifactKind, pod: &str) -> (String, PathBuf) {
        let name = Artifact::now(kind, pod).file_name();
        let in_container = Path::new("/tmp").join(&name);
        (name, in_container)
    }

    fn collect(&self, target: &Target, in_container: &Path) -> Result<PathBuf> {
        relocate(target.root()?, in_container, &self.output_dir, self.owner)
    }

    fn write_result(&self, path: &Path, data: &[u8]) -> Result<()> {
        fs::write(path, data)?;
        if let Some(owner) = self.owner {
            hand_over(path, owner);
        }
        Ok(())
    }

    // ==================== Operations ====================

    /// Interactive shell in the container namespaces, host mount namespace
    /// kept, starting in the container root.
    pub fn shell(&self, pod: &str, container: Option<&str>) -> Result<ExitStatus> {
        let (info, pid) = self.running_container(pod, container)?;
        let root = root_path(info.root_path.as_deref(), self.procfs.root(), pid)
            .ok_or_else(|| ToolboxError::RootPathNotFound(info.id.clone()))?;

        eprintln!("Container root filesystem is the current directory: {}", root.display());
        self.nsenter(pid)?
            .run_inherited(SHELL_NAMESPACES, &self.config.shell, &[], Some(&root))
    }

    /// Run jattach with arbitrary arguments against the JVM.
    pub fn jattach_passthrough(&self, pod: &str, args: &[String]) -> Result<ExitStatus> {
        let target = self.resolve(pod, None)?;
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.jattach()?.run_inherited(target.java.host_pid, &refs)
    }

    pub fn heapdump(&self, pod: &str, all: bool) -> Result<PathBuf> {
        let target = self.resolve(pod, None)?;
        target.root()?;
        let (_, in_container) = self.stamp(ArtifactKind::HeapDump, pod);
        self.jattach()?.dumpheap(target.java.host_pid, &in_container, all)?;
        self.collect(&target, &in_container)
    }

    pub fn threaddump(&self, pod: &str) -> Result<PathBuf> {
        let target = self.resolve(pod, None)?;
        let dump = self.jattach()?.threaddump(target.java.host_pid)?;
        let (name, _) = self.stamp(ArtifactKind::ThreadDump, pod);
        let path = self.output_dir.join(name);
        self.write_result(&path, &dump)?;
        info!(path = %path.display(), "thread dump written");
        Ok(path)
    }

    pub fn jfr(
        &self,
        pod: &str,
        action: JfrAction,
        name: &str,
        settings: &str,
    ) -> Result<JfrOutcome> {
        let target = self.resolve(pod, None)?;
        let (_, in_container) = self.stamp(ArtifactKind::Recording, pod);
        let command = JfrCommand {
            action,
            name,
            settings,
            filename: Some(&in_container),
        };
        if command.writes_file() {
            target.root()?;
        }

        let output = self.jattach()?.jcmd(target.java.host_pid, &command.render())?;
        let file = if command.writes_file() {
            Some(self.collect(&target, &in_container)?)
        } else {
            None
        };
        Ok(JfrOutcome { output, file })
    }

    /// Record with JFR until the operator stops it.
    pub fn jfr_profile(
        &self,
        pod: &str,
        settings: &str,
        duration: Option<Duration>,
    ) -> Result<PathBuf> {
        let target = self.resolve(pod, None)?;
        target.root()?;
        let jattach = self.jattach()?;
        let pid = target.java.host_pid;

        let start = JfrCommand {
            action: JfrAction::Start,
            name: PROFILE_RECORDING,
            settings,
            filename: None,
        };
        let answer = jattach.jcmd(pid, &start.render())?;
        debug!(answer = %answer.trim(), "recording started");

        finish_after_wait(wait_for_stop(STOP_PROMPT, duration), || {
            let (_, in_container) = self.stamp(ArtifactKind::Recording, pod);
            let stop = JfrCommand {
                action: JfrAction::Stop,
                name: PROFILE_RECORDING,
                settings,
                filename: Some(&in_container),
            };
            jattach.jcmd(pid, &stop.render())?;
            self.collect(&target, &in_container)
        })
    }

    fn profiler_for(&self, target: &Target) -> Result<AsyncProfiler> {
        let root = target.root()?;
        self.tools.ensure(Tool::AsyncProfiler)?;
        install_into(root, &self.tools.home(Tool::AsyncProfiler))?;
        Ok(AsyncProfiler::new(self.nsenter(target.pid)?, target.java.ns_pid))
    }

    /// Run profiler.sh with arbitrary arguments.
    pub fn async_profiler(&self, pod: &str, args: &[String]) -> Result<ExitStatus> {
        let target = self.resolve(pod, None)?;
        self.profiler_for(&target)?.passthrough(args)
    }

    pub fn async_profiler_profile(&self, pod: &str, opts: ProfileOptions) -> Result<PathBuf> {
        let results = self.async_profiler_profile_many(&[pod.to_string()], opts)?;
        match results.into_iter().next() {
            Some((_, result)) => result,
            None => Err(ToolboxError::InvalidArgument("no pod given".into())),
        }
    }

    /// Profile several pods over the same time window.
    ///
    /// Pods that fail to start are reported in the result and skipped; the
    /// others are still stopped and collected.
    pub fn async_profiler_profile_many(
        &self,
        pods: &[String],
        opts: ProfileOptions,
    ) -> Result<Vec<(String, Result<PathBuf>)>> {
        if pods.is_empty() {
            return Err(ToolboxError::InvalidArgument("no pod given".into()));
        }
        let extra = self.config.async_profiler_args();

        struct Running {
            target: Target,
            profiler: AsyncProfiler,
            in_container: PathBuf,
        }

        let mut results: Vec<(String, Result<PathBuf>)> = Vec::new();
        let mut running: Vec<(String, Running)> = Vec::new();

        for pod in pods {
            let started = (|| -> Result<Running> {
                let target = self.resolve(pod, None)?;
                let profiler = self.profiler_for(&target)?;
                let (_, in_container) = self.stamp(ArtifactKind::Profile(opts.format), pod);
                let answer = profiler.start(opts.event, &in_container, opts.format, &extra)?;
                info!(
                    pod = %pod,
                    event = opts.event.as_arg(),
                    answer = %answer,
                    "profiling started"
                );
                Ok(Running {
                    target,
                    profiler,
                    in_container,
                })
            })();

            match started {
                Ok(r) => running.push((pod.clone(), r)),
                Err(e) => {
                    warn!(pod = %pod, error = %e, "could not start profiling");
                    results.push((pod.clone(), Err(e)));
                }
            }
        }

        if running.is_empty() {
            return Ok(results);
        }

        finish_after_wait(wait_for_stop(STOP_PROMPT, opts.duration), || {
            for (pod, r) in running {
                let collected = r
                    .profiler
                    .stop(&r.in_container, opts.format, &extra)
                    .and_then(|_| self.collect(&r.target, &r.in_container));
                match &collected {
                    Ok(path) => info!(pod = %pod, path = %path.display(), "profile collected"),
                    Err(e) => warn!(pod = %pod, error = %e, "could not collect profile"),
                }
                results.push((pod, collected));
            }
            Ok(results)
        })
    }

    /// Run crictl with the configured endpoint.
    pub fn crictl(&self, args: &[String]) -> Result<ExitStatus> {
        let binary = crictl_binary(&self.tools)?;
        let crictl = CrictlRuntime::new(binary, &self.config.runtime_endpoint);
        Ok(crictl.passthrough(args)?)
    }

    pub fn list_pods(&self) -> Result<Vec<PodSummary>> {
        Ok(self.runtime()?.list_pods()?)
    }

    pub fn transfer(&self, file: &Path) -> Result<Transfer> {
        transfer::transfer(file, &self.config.transfer_url)
    }

    /// Convert a JFR recording to an HTML flamegraph on the host.
    pub fn jfr_to_flamegraph(
        &self,
        input: &Path,
        output: Option<&Path>,
        mode: FlamegraphMode,
    ) -> Result<PathBuf> {
        if !input.is_file() {
            return Err(ToolboxError::InvalidArgument(format!(
                "{} does not exist",
                input.display()
            )));
        }
        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| input.with_extension("html"));

        let java = which::which("java").map_err(|_| ToolboxError::BinaryNotFound("java".into()))?;
        self.tools.ensure(Tool::AsyncProfiler)?;
        let converter = self.tools.home(Tool::AsyncProfiler).join("build/converter.jar");

        let mut cmd = Command::new(java);
        cmd.arg("-cp").arg(&converter).arg("jfr2flame");
        match mode {
            FlamegraphMode::Cpu => {}
            FlamegraphMode::Alloc => {
                cmd.arg("--alloc");
            }
            FlamegraphMode::Lock => {
                cmd.arg("--lock");
            }
        }
        cmd.arg(input).arg(&output);
        debug!(cmd = ?cmd, "converting recording");

        let out = cmd.output()?;
        if !out.status.success() {
            return Err(ToolboxError::CommandFailed {
                command: "jfr2flame".to_string(),
                reason: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        if !output.is_file() {
            return Err(ToolboxError::OutputMissing(output));
        }
        info!(output = %output.display(), "flamegraph written");
        Ok(output)
    }

    /// `count` thread dumps `interval` apart, optionally a heap dump last,
    /// all in one new directory.
    pub fn collect_multiple_dumps(
        &self,
        pod: &str,
        count: u32,
        interval: Duration,
        heapdump: bool,
    ) -> Result<PathBuf> {
        if count == 0 {
            return Err(ToolboxError::InvalidArgument("count must be at least 1".into()));
        }
        let target = self.resolve(pod, None)?;
        if heapdump {
            target.root()?;
        }
        let jattach = self.jattach()?;

        let dir = self.output_dir.join(dumps_dir_name(pod, &Local::now()));
        fs::create_dir_all(&dir)?;
        if let Some(owner) = self.owner {
            hand_over(&dir, owner);
        }

        for i in 1..=count {
            let dump = jattach.threaddump(target.java.host_pid)?;
            let artifact = Artifact::now(ArtifactKind::ThreadDump, pod);
            let mut path = dir.join(artifact.file_name());
            // several dumps can land in the same second
            if path.exists() {
                path = dir.join(artifact.numbered_file_name(i));
            }
            self.write_result(&path, &dump)?;
            eprintln!("Thread dump {}/{} written to {}", i, count, path.display());

            if i < count {
                thread::sleep(interval);
            }
        }

        if heapdump {
            let (_, in_container) = self.stamp(ArtifactKind::HeapDump, pod);
            jattach.dumpheap(target.java.host_pid, &in_container, false)?;
            let path = relocate(target.root()?, &in_container, &dir, self.owner)?;
            eprintln!("Heap dump written to {}", path.display());
        }

        Ok(dir)
    }

    pub fn list_java_pids(&self, pod: &str) -> Result<Vec<JavaProcess>> {
        let (_, pid) = self.running_container(pod, None)?;
        self.procfs.java_processes(pid)
    }
}

/// Run `finish` once a wait is over, even when the wait failed. A failed wait
/// is returned after `finish` ran.
fn finish_after_wait<T>(
    waited: Result<StopReason>,
    finish: impl FnOnce() -> Result<T>,
) -> Result<T> {
    match waited {
        Ok(reason) => {
            if reason == StopReason::Interrupted {
                info!("interrupted, stopping");
            }
            finish()
        }
        Err(e) => {
            warn!(error = %e, "waiting for stop failed, stopping anyway");
            if let Err(finish_err) = finish() {
                warn!(error = %finish_err, "stopping failed too");
            }
            Err(e)
        }
    }
}

fn select_runtime(config: &Config, tools: &ToolCache) -> Result<Box<dyn ContainerRuntime>> {
    let runtime: Box<dyn ContainerRuntime> = match config.runtime_kind() {
        RuntimeKind::Crictl => {
            let binary = crictl_binary(tools)?;
            Box::new(CrictlRuntime::new(binary, &config.runtime_endpoint))
        }
        RuntimeKind::Docker => Box::new(DockerRuntime::new()?),
    };
    Ok(runtime)
}

/// crictl from PATH, or the cached download.
fn crictl_binary(tools: &ToolCache) -> Result<PathBuf> {
    match which::which("crictl") {
        Ok(path) => Ok(path),
        Err(_) => Ok(tools.ensure(Tool::Crictl)?),
    }
}

/// Fuzzy-rank `candidates` against `name`, keeping the best five.
pub fn suggest<'a>(name: &str, candidates: impl Iterator<Item = &'a str>) -> Vec<String> {
    let matcher = SkimMatcherV2::default();
    let mut scored: Vec<(i64, &str)> = candidates
        .filter_map(|c| matcher.fuzzy_match(c, name).map(|s| (s, c)))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(b.1)));
    scored.dedup_by(|a, b| a.1 == b.1);
    scored.into_iter().take(5).map(|(_, c)| c.to_string()).collect()
}
