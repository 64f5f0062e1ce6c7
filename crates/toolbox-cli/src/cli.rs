//! Command-line interface definition using clap.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use toolbox_core::{
    FlamegraphMode, JfrAction, ProfileFormat, ProfileOptions, ProfilerEvent, DEFAULT_RECORDING,
    DEFAULT_SETTINGS,
};

/// Build version string with git hash and build date.
fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");
    const BUILD_DATE: &str = env!("BUILD_DATE");

    static VERSION_STRING: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    VERSION_STRING.get_or_init(|| format!("{} ({}, {})", VERSION, GIT_HASH, BUILD_DATE))
}

/// Diagnostics for Java processes in Kubernetes pods and containers
#[derive(Parser, Debug)]
#[command(name = "k8s-diagnostics-toolbox")]
#[command(author, version = version_string(), about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "snake_case")]
pub enum Commands {
    /// Open a shell in the namespaces of a pod's container
    Shell {
        pod: String,

        /// Container name when the pod has several
        #[arg(short, long)]
        container: Option<String>,
    },

    /// Run jattach with arbitrary arguments against the pod's JVM
    Jattach {
        pod: String,

        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Take a heap dump and copy it to the current directory
    GetHeapdump {
        pod: String,

        /// Include unreachable objects
        #[arg(long)]
        all: bool,
    },

    /// Take a thread dump and write it to the current directory
    GetThreaddump { pod: String },

    /// Control a Java Flight Recorder recording
    Jfr {
        pod: String,

        #[arg(value_enum)]
        action: JfrActionArg,

        /// Recording name
        #[arg(long, default_value = DEFAULT_RECORDING)]
        name: String,

        /// JFR settings (default or profile)
        #[arg(long, default_value = DEFAULT_SETTINGS)]
        settings: String,
    },

    /// Record with Java Flight Recorder until a key is pressed
    JfrProfile {
        pod: String,

        /// JFR settings (default or profile)
        #[arg(long, default_value = DEFAULT_SETTINGS)]
        settings: String,

        /// Record for this many seconds instead of waiting for a key
        #[arg(short, long)]
        duration: Option<u64>,
    },

    /// Run async-profiler's profiler.sh with arbitrary arguments
    AsyncProfiler {
        pod: String,

        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Profile with async-profiler until a key is pressed
    AsyncProfilerProfile {
        pod: String,

        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// Profile several pods with async-profiler over the same time window
    AsyncProfilerProfileMany {
        #[arg(required = true)]
        pods: Vec<String>,

        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// Run crictl against the configured runtime endpoint
    Crictl {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// List pods known to the container runtime
    ListPods {
        /// Output format (table, json, brief)
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Encrypt a file and upload it for download elsewhere
    Transfer { file: PathBuf },

    /// Convert a JFR recording to an HTML flamegraph
    JfrToFlamegraph {
        input: PathBuf,

        /// Output file (default: input with .html extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Allocation flamegraph
        #[arg(long, conflicts_with = "lock")]
        alloc: bool,

        /// Lock contention flamegraph
        #[arg(long)]
        lock: bool,
    },

    /// Take a series of thread dumps, optionally followed by a heap dump
    CollectMultipleDumps {
        pod: String,

        /// Number of thread dumps
        #[arg(long, default_value_t = 3)]
        count: u32,

        /// Seconds between thread dumps
        #[arg(long, default_value_t = 5)]
        interval: u64,

        /// Finish with a heap dump
        #[arg(long)]
        heapdump: bool,
    },

    /// List the Java processes of a pod
    ListJavaPids { pod: String },
}

/// Options of the async-profiler profile tools.
#[derive(clap::Args, Debug, Clone)]
pub struct ProfileArgs {
    /// Profiling event
    #[arg(short, long, value_enum, default_value = "cpu")]
    pub event: EventArg,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "html")]
    pub format: FormatArg,

    /// Profile for this many seconds instead of waiting for a key
    #[arg(short, long)]
    pub duration: Option<u64>,
}

impl ProfileArgs {
    pub fn options(&self) -> ProfileOptions {
        ProfileOptions {
            event: self.event.into(),
            format: self.format.into(),
            duration: self.duration.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum JfrActionArg {
    Start,
    Stop,
    Dump,
    Check,
}

impl From<JfrActionArg> for JfrAction {
    fn from(a: JfrActionArg) -> Self {
        match a {
            JfrActionArg::Start => JfrAction::Start,
            JfrActionArg::Stop => JfrAction::Stop,
            JfrActionArg::Dump => JfrAction::Dump,
            JfrActionArg::Check => JfrAction::Check,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EventArg {
    Cpu,
    Alloc,
    Lock,
    Wall,
    Itimer,
}

impl From<EventArg> for ProfilerEvent {
    fn from(e: EventArg) -> Self {
        match e {
            EventArg::Cpu => ProfilerEvent::Cpu,
            EventArg::Alloc => ProfilerEvent::Alloc,
            EventArg::Lock => ProfilerEvent::Lock,
            EventArg::Wall => ProfilerEvent::Wall,
            EventArg::Itimer => ProfilerEvent::Itimer,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Html,
    Jfr,
    Collapsed,
    Flat,
}

impl From<FormatArg> for ProfileFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Html => ProfileFormat::Html,
            FormatArg::Jfr => ProfileFormat::Jfr,
            FormatArg::Collapsed => ProfileFormat::Collapsed,
            FormatArg::Flat => ProfileFormat::Flat,
        }
    }
}

/// Output format for list commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Brief,
}

/// Flamegraph mode from the `--alloc`/`--lock` flags.
pub fn flamegraph_mode(alloc: bool, lock: bool) -> FlamegraphMode {
    if alloc {
        FlamegraphMode::Alloc
    } else if lock {
        FlamegraphMode::Lock
    } else {
        FlamegraphMode::Cpu
    }
}

impl Cli {
    /// Returns the log level based on verbosity.
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
