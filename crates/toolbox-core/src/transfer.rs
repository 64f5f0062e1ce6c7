//! Encrypted upload of result files.

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::{debug, info};
use url::Url;

use crate::{Result, ToolboxError};

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(3600);

/// Outcome of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub url: String,
    pub passphrase: String,
    pub file_name: String,
}

impl Transfer {
    /// Shell command that fetches and decrypts the upload.
    pub fn download_command(&self) -> String {
        format!(
            "curl -s {} | gpg --decrypt --batch --passphrase '{}' > {}",
            self.url, self.passphrase, self.file_name
        )
    }
}

/// Random passphrase for symmetric encryption.
pub fn generate_passphrase() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Upload URL for `name` under `base`.
pub fn upload_url(base: &str, name: &str) -> Result<Url> {
    let mut base = Url::parse(base)
        .map_err(|e| ToolboxError::Config(format!("invalid transfer url '{}': {}", base, e)))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(name)
        .map_err(|e| ToolboxError::InvalidArgument(format!("invalid file name '{}': {}", name, e)))
}

/// gpg arguments for a symmetric encryption reading the passphrase from stdin.
fn gpg_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "--batch",
        "--yes",
        "--symmetric",
        "--cipher-algo",
        "AES256",
        "--pinentry-mode",
        "loopback",
        "--passphrase-fd",
        "0",
        "--output",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(output.as_os_str().to_owned());
    args.push(input.as_os_str().to_owned());
    args
}

/// `gpg --symmetric` `input` into `output`.
pub fn encrypt(input: &Path, output: &Path, passphrase: &str) -> Result<()> {
    let gpg = which::which("gpg").map_err(|_| ToolboxError::BinaryNotFound("gpg".into()))?;
    debug!(input = %input.display(), output = %output.display(), "encrypting");

    let mut child = Command::new(gpg)
        .args(gpg_args(input, output))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        writeln!(stdin, "{}", passphrase)?;
    }
    let out = child.wait_with_output()?;

    if out.status.success() {
        Ok(())
    } else {
        Err(ToolboxError::CommandFailed {
            command: "gpg --symmetric".to_string(),
            reason: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        })
    }
}

/// PUT `file` to `url`, returning the body the server answers with
/// (transfer.sh answers with the download URL).
pub fn upload(file: &Path, url: &Url) -> Result<String> {
    let body = fs::File::open(file)?;
    let len = body.metadata()?.len();
    info!(url = %url, bytes = len, "uploading");

    let client = reqwest::blocking::Client::builder()
        .timeout(UPLOAD_TIMEOUT)
        .build()?;
    let response = client
        .put(url.clone())
        .body(reqwest::blocking::Body::sized(body, len))
        .send()?;

    let status = response.status();
    let text = response.text()?;
    if !status.is_success() {
        return Err(ToolboxError::Http(format!("upload failed with {}: {}", status, text.trim())));
    }
    Ok(text.trim().to_string())
}

/// Encrypt `file`, upload it and remove the encrypted copy.
pub fn transfer(file: &Path, base_url: &str) -> Result<Transfer> {
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ToolboxError::InvalidArgument(format!("{} is not a file", file.display())))?;
    if !file.is_file() {
        return Err(ToolboxError::InvalidArgument(format!(
            "{} does not exist",
            file.display()
        )));
    }

    let passphrase = generate_passphrase();
    let encrypted_name = format!("{}.gpg", file_name);
    let url = upload_url(base_url, &encrypted_name)?;

    // removed when dropped
    let encrypted = encrypted_file()?;
    encrypt(file, encrypted.path(), &passphrase)?;
    let answer = upload(encrypted.path(), &url)?;

    let url = if answer.starts_with("http") {
        answer
    } else {
        url.to_string()
    };
    Ok(Transfer {
        url,
        passphrase,
        file_name,
    })
}

/// Fresh, exclusively created file for the encrypted copy.
fn encrypted_file() -> Result<NamedTempFile> {
    Ok(tempfile::Builder::new()
        .prefix("k8s-diag-")
        .suffix(".gpg")
        .tempfile()?)
}
