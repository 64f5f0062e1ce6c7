//! Operations against a fake runtime, a fake procfs and a fake jattach.

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;

use tempfile::TempDir;
use toolbox_core::{
    Config, JfrAction, ProfileFormat, ProfileOptions, ProfilerEvent, Toolbox, ToolboxError,
};
use toolbox_runtime::{ContainerInfo, ContainerRuntime, PodSummary, RuntimeError, RuntimeKind};
use toolbox_tools::{Arch, Tool, ToolCache};

const CONTAINER_ID: &str = "4d5e6f7a8b9c0d1e2f3a";
const INIT_PID: i32 = 100;
const POD_NS: u64 = 4026532001;

const OTHER_CONTAINER_ID: &str = "9a8b7c6d5e4f3a2b1c0d";
const OTHER_INIT_PID: i32 = 300;
const OTHER_POD_NS: u64 = 4026532002;

#[derive(Clone)]
struct FakePod {
    name: &'static str,
    id: &'static str,
    pid: Option<i32>,
    root: Option<PathBuf>,
}

struct FakeRuntime {
    pods: Vec<FakePod>,
}

impl FakeRuntime {
    fn pod(&self, id: &str) -> Option<&FakePod> {
        self.pods.iter().find(|p| p.id == id)
    }
}

impl ContainerRuntime for FakeRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Crictl
    }

    fn find_container(
        &self,
        pod: &str,
        _container: Option<&str>,
    ) -> toolbox_runtime::Result<String> {
        self.pods
            .iter()
            .find(|p| p.name == pod)
            .map(|p| p.id.to_string())
            .ok_or_else(|| RuntimeError::ContainerNotFound(pod.to_string()))
    }

    fn inspect(&self, id: &str) -> toolbox_runtime::Result<ContainerInfo> {
        let pod = self
            .pod(id)
            .ok_or_else(|| RuntimeError::ContainerNotFound(id.to_string()))?;
        Ok(ContainerInfo {
            id: id.to_string(),
            name: Some("app".into()),
            pod: Some(pod.name.into()),
            pid: pod.pid,
            root_path: pod.root.clone(),
        })
    }

    fn list_pods(&self) -> toolbox_runtime::Result<Vec<PodSummary>> {
        Ok(["web-0", "web-1", "db-0"]
            .iter()
            .map(|name| PodSummary {
                id: format!("{}-sandbox", name),
                name: name.to_string(),
                namespace: Some("default".into()),
                state: "ready".into(),
            })
            .collect())
    }

    fn passthrough(&self, _args: &[String]) -> toolbox_runtime::Result<ExitStatus> {
        Err(RuntimeError::BinaryNotFound("crictl".into()))
    }
}

fn add_process(proc_root: &Path, pid: i32, ns: u64, comm: &str, args: &[&str], ns_pid: i32) {
    let dir = proc_root.join(pid.to_string());
    fs::create_dir_all(dir.join("ns")).unwrap();
    symlink(format!("pid:[{}]", ns), dir.join("ns/pid")).unwrap();
    fs::write(dir.join("comm"), format!("{}\n", comm)).unwrap();
    let mut cmdline = args.join("\0");
    cmdline.push('\0');
    fs::write(dir.join("cmdline"), cmdline).unwrap();
    fs::write(
        dir.join("status"),
        format!("Name:\t{}\nPid:\t{}\nNSpid:\t{}\t{}\n", comm, pid, pid, ns_pid),
    )
    .unwrap();
}

fn write_script(path: &Path, script: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, script).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// jattach stand-in writing dumps below the fake container root.
fn fake_jattach(cache: &ToolCache, root: &Path) {
    let script = format!(
        r#"#!/bin/sh
root='{}'
pid=$1
shift
case "$1" in
  threaddump) echo "Full thread dump pid=$pid" ;;
  dumpheap) echo "heap $3" > "$root$2" ;;
  jcmd)
    case "$2" in
      *filename=*) echo "recording" > "$root${{2##*filename=}}" ;;
    esac
    echo "ok $2"
    ;;
  *) echo "unknown command" >&2; exit 1 ;;
esac
"#,
        root.display()
    );
    write_script(&cache.entry_point(Tool::Jattach), &script);
}

/// nsenter stand-in: with `--mount` the program is taken from the target's
/// root, otherwise it runs as is.
fn fake_nsenter(path: &Path, proc_root: &Path) {
    let script = format!(
        r#"#!/bin/sh
proc='{}'
target=
mount=
while [ $# -gt 0 ]; do
  case "$1" in
    --target) target=$2; shift 2 ;;
    --mount) mount=1; shift ;;
    --) shift; break ;;
    *) shift ;;
  esac
done
prog=$1
shift
if [ -n "$mount" ]; then
  exec "$proc/$target/root$prog" "$@"
fi
exec "$prog" "$@"
"#,
        proc_root.display()
    );
    write_script(path, &script);
}

/// profiler.sh stand-in logging its arguments to `/tmp/profiler.log` of the
/// container it was copied into; `stop` writes the `-f` file.
const FAKE_PROFILER: &str = r#"#!/bin/sh
root=$(cd "$(dirname "$0")/../.." && pwd)
echo "$@" >> "$root/tmp/profiler.log"
file=
prev=
for a in "$@"; do
  if [ "$prev" = "-f" ]; then file=$a; fi
  prev=$a
done
case "$1" in
  start) echo "Profiling started" ;;
  stop) echo "profile" > "$root$file"; echo "OK" ;;
esac
"#;

/// profiler.sh that cannot attach.
const FAILING_PROFILER: &str = "#!/bin/sh\necho 'could not attach' >&2\nexit 1\n";

struct Fixture {
    dir: TempDir,
    /// Root filesystem of web-0, reached through `<proc>/100/root`.
    root: PathBuf,
    /// Root filesystem of web-1.
    other_root: PathBuf,
    /// Root path the runtime reports for web-0.
    reported_root: PathBuf,
    out: PathBuf,
    proc_root: PathBuf,
    cache_dir: PathBuf,
    nsenter: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("rootfs");
        let other_root = dir.path().join("rootfs-web-1");
        let reported_root = dir.path().join("overlay");
        let out = dir.path().join("out");
        let proc_root = dir.path().join("proc");
        let cache_dir = dir.path().join("cache");
        let nsenter = dir.path().join("bin/nsenter");
        fs::create_dir_all(root.join("tmp")).unwrap();
        fs::create_dir_all(other_root.join("tmp")).unwrap();
        fs::create_dir_all(&reported_root).unwrap();
        fs::create_dir_all(&out).unwrap();

        add_process(&proc_root, INIT_PID, POD_NS, "tini", &["/tini", "--", "run.sh"], 1);
        add_process(&proc_root, 120, POD_NS, "java", &["java", "-jar", "worker.jar"], 9);
        add_process(&proc_root, 110, POD_NS, "java", &["/usr/bin/java", "-jar", "app.jar"], 7);
        add_process(&proc_root, 130, POD_NS, "sh", &["sh"], 12);
        add_process(&proc_root, 200, 4026532999, "java", &["java", "-jar", "other.jar"], 1);
        add_process(&proc_root, OTHER_INIT_PID, OTHER_POD_NS, "tini", &["/tini"], 1);
        add_process(&proc_root, 310, OTHER_POD_NS, "java", &["java", "-jar", "b.jar"], 5);
        symlink(&root, proc_root.join(INIT_PID.to_string()).join("root")).unwrap();
        symlink(&other_root, proc_root.join(OTHER_INIT_PID.to_string()).join("root")).unwrap();

        let cache = ToolCache::with_arch(&cache_dir, Arch::X64);
        fake_jattach(&cache, &root);
        write_script(&cache.entry_point(Tool::AsyncProfiler), FAKE_PROFILER);
        write_script(&other_root.join("tmp/async-profiler/profiler.sh"), FAILING_PROFILER);
        fake_nsenter(&nsenter, &proc_root);

        Self {
            dir,
            root,
            other_root,
            reported_root,
            out,
            proc_root,
            cache_dir,
            nsenter,
        }
    }

    fn config(&self, vars: &[(&str, &str)]) -> Config {
        let mut map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        map.insert("HOST_PROC".into(), self.proc_root.display().to_string());
        map.insert("K8S_DIAG_CACHE_DIR".into(), self.cache_dir.display().to_string());
        Config::from_lookup(|key| map.get(key).cloned()).unwrap()
    }

    fn pods(&self) -> Vec<FakePod> {
        vec![
            FakePod {
                name: "web-0",
                id: CONTAINER_ID,
                pid: Some(INIT_PID),
                root: Some(self.reported_root.clone()),
            },
            FakePod {
                name: "shop/web-0",
                id: CONTAINER_ID,
                pid: Some(INIT_PID),
                root: Some(self.reported_root.clone()),
            },
            FakePod {
                name: "web-1",
                id: OTHER_CONTAINER_ID,
                pid: Some(OTHER_INIT_PID),
                root: None,
            },
        ]
    }

    fn toolbox_with(&self, pods: Vec<FakePod>, vars: &[(&str, &str)]) -> Toolbox {
        Toolbox::new(
            self.config(vars),
            Box::new(FakeRuntime { pods }),
            ToolCache::with_arch(&self.cache_dir, Arch::X64),
            self.out.clone(),
        )
        .with_nsenter(&self.nsenter)
    }

    fn toolbox(&self) -> Toolbox {
        self.toolbox_with(self.pods(), &[])
    }

    /// web-0 as the runtime sees it, changed by `edit`.
    fn web_0(&self, edit: impl FnOnce(&mut FakePod)) -> Vec<FakePod> {
        let mut pods = self.pods();
        edit(&mut pods[0]);
        pods
    }

    fn profiler_log(&self) -> Vec<String> {
        fs::read_to_string(self.root.join("tmp/profiler.log"))
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

#[test]
fn test_resolve_picks_lowest_java_pid() {
    let fx = Fixture::new();
    let target = fx.toolbox().resolve("web-0", None).unwrap();

    assert_eq!(target.pid, INIT_PID);
    assert_eq!(target.java.host_pid, 110);
    assert_eq!(target.java.ns_pid, 7);
    assert_eq!(target.container.id, CONTAINER_ID);
}

#[test]
fn test_root_path_prefers_procfs_over_runtime() {
    let fx = Fixture::new();
    let target = fx.toolbox().resolve("web-0", None).unwrap();
    assert_eq!(
        target.root_path,
        Some(fx.proc_root.join(INIT_PID.to_string()).join("root"))
    );
    assert_eq!(
        fs::canonicalize(target.root().unwrap()).unwrap(),
        fs::canonicalize(&fx.root).unwrap()
    );
}

#[test]
fn test_root_path_falls_back_to_runtime() {
    let fx = Fixture::new();
    fs::remove_file(fx.proc_root.join(INIT_PID.to_string()).join("root")).unwrap();
    let target = fx.toolbox().resolve("web-0", None).unwrap();
    assert_eq!(target.root_path.as_deref(), Some(fx.reported_root.as_path()));
}

#[test]
fn test_resolve_honours_javapid() {
    let fx = Fixture::new();
    let target = fx
        .toolbox_with(fx.pods(), &[("JAVAPID", "120")])
        .resolve("web-0", None)
        .unwrap();
    assert_eq!(target.java.host_pid, 120);
    assert_eq!(target.java.ns_pid, 9);
}

#[test]
fn test_list_java_pids_stays_in_namespace() {
    let fx = Fixture::new();
    let mut pids: Vec<i32> = fx
        .toolbox()
        .list_java_pids("web-0")
        .unwrap()
        .iter()
        .map(|p| p.host_pid)
        .collect();
    pids.sort();
    assert_eq!(pids, vec![110, 120]);
}

#[test]
fn test_threaddump_written_to_output_dir() {
    let fx = Fixture::new();
    let path = fx.toolbox().threaddump("web-0").unwrap();

    assert_eq!(path.parent(), Some(fx.out.as_path()));
    let name = file_name(&path);
    assert!(name.starts_with("threaddump_web-0_"));
    assert!(name.ends_with(".txt"));
    assert_eq!(fs::read_to_string(&path).unwrap(), "Full thread dump pid=110\n");
}

#[test]
fn test_heapdump_relocated_out_of_container() {
    let fx = Fixture::new();
    let path = fx.toolbox().heapdump("web-0", true).unwrap();

    assert_eq!(path.parent(), Some(fx.out.as_path()));
    assert!(file_name(&path).starts_with("heapdump_web-0_"));
    assert_eq!(fs::read_to_string(&path).unwrap(), "heap -all\n");
    assert!(!fx.root.join("tmp").join(file_name(&path)).exists());
}

#[test]
fn test_jfr_dump_relocates_recording() {
    let fx = Fixture::new();
    let outcome = fx
        .toolbox()
        .jfr("web-0", JfrAction::Dump, "diag", "profile")
        .unwrap();

    let file = outcome.file.unwrap();
    assert!(file_name(&file).ends_with(".jfr"));
    assert_eq!(fs::read_to_string(&file).unwrap(), "recording\n");
    assert!(outcome.output.starts_with("ok JFR.dump name=diag filename=/tmp/recording_web-0_"));
}

#[test]
fn test_jfr_check_writes_nothing() {
    let fx = Fixture::new();
    let outcome = fx
        .toolbox()
        .jfr("web-0", JfrAction::Check, "diag", "profile")
        .unwrap();
    assert!(outcome.file.is_none());
    assert_eq!(outcome.output.trim(), "ok JFR.check");
    assert_eq!(fs::read_dir(&fx.out).unwrap().count(), 0);
}

#[test]
fn test_jfr_profile_with_duration() {
    let fx = Fixture::new();
    let path = fx
        .toolbox()
        .jfr_profile("web-0", "default", Some(Duration::from_millis(50)))
        .unwrap();
    assert!(file_name(&path).starts_with("recording_web-0_"));
    assert!(path.is_file());
}

#[test]
fn test_collect_multiple_dumps() {
    let fx = Fixture::new();
    let dir = fx
        .toolbox()
        .collect_multiple_dumps("web-0", 2, Duration::ZERO, true)
        .unwrap();

    assert!(file_name(&dir).starts_with("dumps_web-0_"));
    let mut names: Vec<String> = fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names.len(), 3);
    assert_eq!(names.iter().filter(|n| n.starts_with("threaddump_")).count(), 2);
    assert_eq!(names.iter().filter(|n| n.starts_with("heapdump_")).count(), 1);
}

#[test]
fn test_collect_multiple_dumps_same_second_names() {
    let fx = Fixture::new();
    let dir = fx
        .toolbox()
        .collect_multiple_dumps("shop/web-0", 3, Duration::ZERO, false)
        .unwrap();

    assert_eq!(dir.parent(), Some(fx.out.as_path()));
    assert!(file_name(&dir).starts_with("dumps_shop-web-0_"));
    let names: Vec<String> = fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 3);
    assert!(names.iter().all(|n| n.starts_with("threaddump_shop-web-0_")));
}

#[test]
fn test_collect_multiple_dumps_rejects_zero() {
    let fx = Fixture::new();
    let err = fx
        .toolbox()
        .collect_multiple_dumps("web-0", 0, Duration::ZERO, false)
        .unwrap_err();
    assert!(matches!(err, ToolboxError::InvalidArgument(_)));
}

#[test]
fn test_missing_container_exit_code() {
    let fx = Fixture::new();
    let err = fx.toolbox().threaddump("nope-0").unwrap_err();
    assert!(matches!(err, ToolboxError::ContainerNotFound(ref p) if p == "nope-0"));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn test_stopped_container_exit_code() {
    let fx = Fixture::new();
    let pods = fx.web_0(|p| p.pid = None);
    let err = fx.toolbox_with(pods, &[]).threaddump("web-0").unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_missing_root_exit_code() {
    let fx = Fixture::new();
    fs::remove_file(fx.proc_root.join(INIT_PID.to_string()).join("root")).unwrap();
    let pods = fx.web_0(|p| p.root = None);
    let err = fx.toolbox_with(pods, &[]).heapdump("web-0", false).unwrap_err();
    assert!(matches!(err, ToolboxError::RootPathNotFound(_)));
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn test_suggest_and_list_pods() {
    let fx = Fixture::new();
    let toolbox = fx.toolbox();
    assert_eq!(toolbox.list_pods().unwrap().len(), 3);

    let suggestions = toolbox.suggest_pods("web");
    assert!(suggestions.contains(&"web-0".to_string()));
    assert!(!suggestions.contains(&"db-0".to_string()));
}

#[test]
fn test_shell_runs_in_container_root() {
    let fx = Fixture::new();
    let cwd_file = fx.dir.path().join("shell.cwd");
    let shell = fx.dir.path().join("bin/fake-shell");
    write_script(
        &shell,
        &format!("#!/bin/sh\npwd -P > '{}'\nexit 3\n", cwd_file.display()),
    );

    let shell_var = shell.display().to_string();
    let toolbox = fx.toolbox_with(fx.pods(), &[("SHELL", shell_var.as_str())]);
    let status = toolbox.shell("web-0", None).unwrap();

    assert_eq!(status.code(), Some(3));
    let cwd = fs::read_to_string(&cwd_file).unwrap();
    assert_eq!(PathBuf::from(cwd.trim()), fs::canonicalize(&fx.root).unwrap());
}

#[test]
fn test_shell_without_nsenter() {
    let fx = Fixture::new();
    let toolbox = fx
        .toolbox()
        .with_nsenter(fx.dir.path().join("bin/missing-nsenter"));
    let err = toolbox.shell("web-0", None).unwrap_err();
    assert!(matches!(err, ToolboxError::Io(_)));
}

#[test]
fn test_async_profiler_passthrough_appends_pid() {
    let fx = Fixture::new();
    let args = vec!["status".to_string()];
    let status = fx.toolbox().async_profiler("web-0", &args).unwrap();

    assert!(status.success());
    assert!(fx.root.join("tmp/async-profiler/profiler.sh").is_file());
    assert_eq!(fx.profiler_log(), vec!["status 7"]);
}

#[test]
fn test_async_profiler_profile_passes_options() {
    let fx = Fixture::new();
    let toolbox = fx.toolbox_with(fx.pods(), &[("ASYNC_PROFILER_OPTIONS", "--cstack fp")]);
    let opts = ProfileOptions {
        event: ProfilerEvent::Wall,
        format: ProfileFormat::Collapsed,
        duration: Some(Duration::from_millis(50)),
    };
    let path = toolbox.async_profiler_profile("web-0", opts).unwrap();

    assert_eq!(path.parent(), Some(fx.out.as_path()));
    let name = file_name(&path);
    assert!(name.starts_with("profile_web-0_"));
    assert!(name.ends_with(".collapsed"));
    assert_eq!(fs::read_to_string(&path).unwrap(), "profile\n");
    assert!(!fx.root.join("tmp").join(&name).exists());

    let file = format!("/tmp/{}", name);
    assert_eq!(
        fx.profiler_log(),
        vec![
            format!("start -e wall -f {} -o collapsed --cstack fp 7", file),
            format!("stop -f {} -o collapsed --cstack fp 7", file),
        ]
    );
}

#[test]
fn test_async_profiler_profile_many_keeps_going() {
    let fx = Fixture::new();
    let pods = vec!["web-1".to_string(), "nope-0".to_string(), "web-0".to_string()];
    let opts = ProfileOptions {
        duration: Some(Duration::from_millis(50)),
        ..ProfileOptions::default()
    };
    let results = fx.toolbox().async_profiler_profile_many(&pods, opts).unwrap();
    assert_eq!(results.len(), 3);

    let result = |pod: &str| {
        results
            .iter()
            .find(|(p, _)| p == pod)
            .map(|(_, r)| r)
            .unwrap()
    };
    assert!(matches!(
        result("web-1"),
        Err(ToolboxError::CommandFailed { reason, .. }) if reason == "could not attach"
    ));
    assert!(matches!(result("nope-0"), Err(ToolboxError::ContainerNotFound(_))));

    let path = result("web-0").as_ref().unwrap();
    assert_eq!(path.parent(), Some(fx.out.as_path()));
    assert!(file_name(path).ends_with(".html"));
    assert_eq!(fs::read_to_string(path).unwrap(), "profile\n");

    let log = fx.profiler_log();
    assert_eq!(log.len(), 2);
    assert!(log[0].starts_with("start -e cpu "));
    assert!(log[1].starts_with("stop "));
    assert!(!fx.other_root.join("tmp/profiler.log").exists());
}

#[test]
fn test_async_profiler_profile_single_failure() {
    let fx = Fixture::new();
    let err = fx
        .toolbox()
        .async_profiler_profile("web-1", ProfileOptions::default())
        .unwrap_err();
    assert!(matches!(err, ToolboxError::CommandFailed { .. }));
}
