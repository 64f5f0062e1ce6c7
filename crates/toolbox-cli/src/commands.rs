//! Command handlers for CLI tools.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use toolbox_core::{JavaProcess, ProfileOptions, Toolbox, ToolboxError};
use toolbox_runtime::PodSummary;
use tracing::warn;

use crate::cli::{flamegraph_mode, Commands, OutputFormat};

/// Result type for command operations.
pub type Result<T> = std::result::Result<T, ToolboxError>;

/// Execute a CLI command, returning the process exit code.
pub fn execute(command: Commands, toolbox: &Toolbox) -> Result<i32> {
    match command {
        Commands::Shell { pod, container } => {
            status_code(toolbox.shell(&pod, container.as_deref())?)
        }
        Commands::Jattach { pod, args } => status_code(toolbox.jattach_passthrough(&pod, &args)?),
        Commands::GetHeapdump { pod, all } => report(toolbox.heapdump(&pod, all)?, "Heap dump"),
        Commands::GetThreaddump { pod } => report(toolbox.threaddump(&pod)?, "Thread dump"),
        Commands::Jfr {
            pod,
            action,
            name,
            settings,
        } => {
            let outcome = toolbox.jfr(&pod, action.into(), &name, &settings)?;
            let answer = outcome.output.trim();
            if !answer.is_empty() {
                println!("{}", answer);
            }
            match outcome.file {
                Some(file) => report(file, "Recording"),
                None => Ok(0),
            }
        }
        Commands::JfrProfile {
            pod,
            settings,
            duration,
        } => report(
            toolbox.jfr_profile(&pod, &settings, duration.map(Duration::from_secs))?,
            "Recording",
        ),
        Commands::AsyncProfiler { pod, args } => status_code(toolbox.async_profiler(&pod, &args)?),
        Commands::AsyncProfilerProfile { pod, profile } => {
            report(toolbox.async_profiler_profile(&pod, profile.options())?, "Profile")
        }
        Commands::AsyncProfilerProfileMany { pods, profile } => {
            cmd_profile_many(toolbox, &pods, profile.options())
        }
        Commands::Crictl { args } => status_code(toolbox.crictl(&args)?),
        Commands::ListPods { format } => {
            print_pods(&toolbox.list_pods()?, format)?;
            Ok(0)
        }
        Commands::Transfer { file } => {
            let t = toolbox.transfer(&file)?;
            println!("Uploaded to {}", t.url);
            println!("Download and decrypt with:");
            println!("  {}", t.download_command());
            Ok(0)
        }
        Commands::JfrToFlamegraph {
            input,
            output,
            alloc,
            lock,
        } => report(
            toolbox.jfr_to_flamegraph(&input, output.as_deref(), flamegraph_mode(alloc, lock))?,
            "Flamegraph",
        ),
        Commands::CollectMultipleDumps {
            pod,
            count,
            interval,
            heapdump,
        } => report(
            toolbox.collect_multiple_dumps(&pod, count, Duration::from_secs(interval), heapdump)?,
            "Dumps",
        ),
        Commands::ListJavaPids { pod } => {
            print_java_processes(&toolbox.list_java_pids(&pod)?);
            Ok(0)
        }
    }
}

/// Pod argument of a command, for suggestions.
pub fn pod_of(command: &Commands) -> Option<&str> {
    match command {
        Commands::Shell { pod, .. }
        | Commands::Jattach { pod, .. }
        | Commands::GetHeapdump { pod, .. }
        | Commands::GetThreaddump { pod }
        | Commands::Jfr { pod, .. }
        | Commands::JfrProfile { pod, .. }
        | Commands::AsyncProfiler { pod, .. }
        | Commands::AsyncProfilerProfile { pod, .. }
        | Commands::CollectMultipleDumps { pod, .. }
        | Commands::ListJavaPids { pod } => Some(pod.as_str()),
        _ => None,
    }
}

fn report(path: PathBuf, what: &str) -> Result<i32> {
    eprintln!("{} written to:", what);
    println!("{}", path.display());
    Ok(0)
}

fn status_code(status: ExitStatus) -> Result<i32> {
    Ok(status.code().unwrap_or(1))
}

fn cmd_profile_many(toolbox: &Toolbox, pods: &[String], opts: ProfileOptions) -> Result<i32> {
    let results = toolbox.async_profiler_profile_many(pods, opts)?;
    Ok(report_profiles(&results))
}

/// Print collected profiles and failures; 1 when any pod failed.
fn report_profiles(results: &[(String, Result<PathBuf>)]) -> i32 {
    let mut failed = 0;
    for (pod, result) in results {
        match result {
            Ok(path) => println!("{}", path.display()),
            Err(e) => {
                failed += 1;
                eprintln!("{}: {}", pod, e);
            }
        }
    }
    if failed > 0 {
        warn!(failed, total = results.len(), "some pods were not profiled");
        return 1;
    }
    0
}

fn print_pods(pods: &[PodSummary], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if pods.is_empty() {
                println!("No pods found.");
                return Ok(());
            }
            println!("{:<40}  {:<20}  {:<10}  ID", "NAME", "NAMESPACE", "STATE");
            println!("{}", "-".repeat(90));
            for pod in pods {
                println!(
                    "{:<40}  {:<20}  {:<10}  {}",
                    truncate(&pod.name, 40),
                    truncate(pod.namespace.as_deref().unwrap_or("-"), 20),
                    pod.state,
                    truncate(&pod.id, 13)
                );
            }
            println!("\n{} pod(s)", pods.len());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(pods)?);
        }
        OutputFormat::Brief => {
            for pod in pods {
                println!("{}", pod.name);
            }
        }
    }
    Ok(())
}

fn print_java_processes(found: &[JavaProcess]) {
    if found.is_empty() {
        println!("No java processes found.");
        return;
    }
    println!("{:<8}  {:<8}  COMMAND", "PID", "NS PID");
    for p in found {
        println!("{:<8}  {:<8}  {}", p.host_pid, p.ns_pid, truncate(&p.cmdline, 100));
    }
}

/// Print close pod names after a container lookup failed.
pub fn print_suggestions(toolbox: &Toolbox, pod: &str) {
    let suggestions = toolbox.suggest_pods(pod);
    if suggestions.is_empty() {
        return;
    }
    eprintln!("Did you mean:");
    for s in suggestions {
        eprintln!("  {}", s);
    }
}

/// Truncates a string to the given length, adding "..." if truncated.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_print_pods_all_formats() {
        let pods = vec![PodSummary {
            id: "0123456789abcdef".into(),
            name: "pulsar-broker-0".into(),
            namespace: Some("pulsar".into()),
            state: "ready".into(),
        }];
        print_pods(&pods, OutputFormat::Table).unwrap();
        print_pods(&pods, OutputFormat::Json).unwrap();
        print_pods(&pods, OutputFormat::Brief).unwrap();
        print_pods(&[], OutputFormat::Table).unwrap();
    }

    #[test]
    fn test_pod_of() {
        let cli = Cli::parse_from(["k8s-diagnostics-toolbox", "get_threaddump", "web-0"]);
        assert_eq!(cli.command.as_ref().and_then(pod_of), Some("web-0"));

        let cli = Cli::parse_from(["k8s-diagnostics-toolbox", "list_pods"]);
        assert_eq!(cli.command.as_ref().and_then(pod_of), None);
    }

    #[test]
    fn test_report_profiles_exit_code() {
        let ok = ("web-0".to_string(), Ok(PathBuf::from("/out/profile_web-0.html")));
        assert_eq!(report_profiles(&[ok]), 0);

        let results = vec![
            ("web-0".to_string(), Ok(PathBuf::from("/out/profile_web-0.html"))),
            (
                "web-1".to_string(),
                Err(ToolboxError::CommandFailed {
                    command: "profiler.sh start".into(),
                    reason: "attach failed".into(),
                }),
            ),
        ];
        assert_eq!(report_profiles(&results), 1);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 8), "hello...");
        assert_eq!(truncate("hi", 2), "hi");
    }
}
