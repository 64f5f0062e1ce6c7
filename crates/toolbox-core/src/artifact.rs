//! Names of produced files.

use std::fmt;

use chrono::{DateTime, Local};

/// Timestamp format used in every file name.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H%M%S";

/// What a produced file contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    ThreadDump,
    HeapDump,
    Recording,
    Profile(ProfileFormat),
    Flamegraph,
}

impl ArtifactKind {
    pub fn prefix(self) -> &'static str {
        match self {
            ArtifactKind::ThreadDump => "threaddump",
            ArtifactKind::HeapDump => "heapdump",
            ArtifactKind::Recording => "recording",
            ArtifactKind::Profile(_) => "profile",
            ArtifactKind::Flamegraph => "flamegraph",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::ThreadDump => "txt",
            ArtifactKind::HeapDump => "hprof",
            ArtifactKind::Recording => "jfr",
            ArtifactKind::Profile(format) => format.extension(),
            ArtifactKind::Flamegraph => "html",
        }
    }
}

/// async-profiler output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfileFormat {
    #[default]
    Html,
    Jfr,
    Collapsed,
    Flat,
}

impl ProfileFormat {
    /// Value of async-profiler's `-o` option.
    pub fn as_arg(self) -> &'static str {
        match self {
            ProfileFormat::Html => "flamegraph",
            ProfileFormat::Jfr => "jfr",
            ProfileFormat::Collapsed => "collapsed",
            ProfileFormat::Flat => "flat",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ProfileFormat::Html => "html",
            ProfileFormat::Jfr => "jfr",
            ProfileFormat::Collapsed => "collapsed",
            ProfileFormat::Flat => "txt",
        }
    }
}

/// A file name of the form `<kind>_<pod>_<timestamp>.<ext>`.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub pod: String,
    pub timestamp: DateTime<Local>,
}

impl Artifact {
    /// An artifact stamped with the current local time.
    pub fn now(kind: ArtifactKind, pod: &str) -> Self {
        Self {
            kind,
            pod: pod.to_string(),
            timestamp: Local::now(),
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.stem(), self.kind.extension())
    }

    /// File name with a sequence number, for several artifacts stamped in
    /// the same second.
    pub fn numbered_file_name(&self, n: u32) -> String {
        format!("{}_{}.{}", self.stem(), n, self.kind.extension())
    }

    fn stem(&self) -> String {
        format!(
            "{}_{}_{}",
            self.kind.prefix(),
            sanitize(&self.pod),
            self.timestamp.format(TIMESTAMP_FORMAT)
        )
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Keep pod names usable as file name parts.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Directory name for `collect_multiple_dumps`.
pub fn dumps_dir_name(pod: &str, timestamp: &DateTime<Local>) -> String {
    format!("dumps_{}_{}", sanitize(pod), timestamp.format(TIMESTAMP_FORMAT))
}
