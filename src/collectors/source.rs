use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time;
use tracing::debug;

/// Why a single source could not produce a value. Never leaves the
/// collectors: every aggregator turns it into an absent or default field.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{what} is not available")]
    Unavailable { what: String },
    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    #[error("{program} exited with status {code:?}")]
    Exit { program: String, code: Option<i32> },
    #[error("failed to read {what}: {source}")]
    Io {
        what: String,
        #[source]
        source: io::Error,
    },
    #[error("unexpected output from {what}")]
    Parse { what: String },
}

impl SourceError {
    pub fn parse(what: impl Into<String>) -> Self {
        Self::Parse { what: what.into() }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::PermissionDenied)
    }

    fn from_io(what: impl Into<String>, source: io::Error) -> Self {
        let what = what.into();
        if source.kind() == io::ErrorKind::NotFound {
            Self::Unavailable { what }
        } else {
            Self::Io { what, source }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs `program` to completion or until `timeout` elapses, whichever comes
/// first. The child is killed when the deadline passes. Any exit status is
/// returned as `Ok`; callers decide which codes are acceptable.
pub async fn run_command(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<CommandOutput, SourceError> {
    let mut cmd = Command::new(program);
    cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);

    match time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        }),
        Ok(Err(err)) => Err(SourceError::from_io(program, err)),
        Err(_elapsed) => Err(SourceError::Timeout {
            program: program.to_string(),
            timeout,
        }),
    }
}

/// Like [`run_command`], but a non-zero exit status is an error.
pub async fn run_checked(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<String, SourceError> {
    let output = run_command(program, args, timeout).await?;
    if !output.success() {
        return Err(SourceError::Exit {
            program: program.to_string(),
            code: output.code,
        });
    }
    Ok(output.stdout)
}

pub fn read_source(path: &Path) -> Result<String, SourceError> {
    std::fs::read_to_string(path).map_err(|err| SourceError::from_io(path.display().to_string(), err))
}

/// Whether `program` resolves to an executable, either as a path or via `PATH`.
pub fn tool_exists(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Collapses a source result into an optional value, recording why it is
/// missing at debug level.
pub fn degrade<T>(what: &'static str, result: Result<T, SourceError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(source = what, error = %err, "source degraded");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Writes an executable `/bin/sh` script named `name` into `dir` and
    /// returns its path.
    pub(crate) fn stub_script(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        // A child forked by a concurrent test can still hold the write handle
        // until it execs, which makes our exec fail with ETXTBSY.
        for _ in 0..100 {
            match std::process::Command::new(&path).output() {
                Err(err) if err.raw_os_error() == Some(nix::libc::ETXTBSY) => {
                    std::thread::sleep(Duration::from_millis(10))
                }
                _ => break,
            }
        }
        path.display().to_string()
    }

    /// A script that prints `stdout` verbatim whatever its arguments.
    pub(crate) fn stub_tool(dir: &Path, name: &str, stdout: &str) -> String {
        stub_script(dir, name, &format!("cat <<'EOF'\n{stdout}\nEOF"))
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let err = run_command("hostpulse-no-such-tool", &[], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn slow_program_times_out() {
        if !tool_exists("sleep") {
            return;
        }
        let err = run_command("sleep", &["5"], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Timeout { .. }));
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported_by_run_checked() {
        if !tool_exists("false") {
            return;
        }
        let output = run_command("false", &[], Duration::from_secs(2)).await.unwrap();
        assert!(!output.success());
        let err = run_checked("false", &[], Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Exit { .. }));
    }

    #[test]
    fn missing_file_is_unavailable() {
        let err = read_source(Path::new("/nonexistent/hostpulse/file")).unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
        assert!(!err.is_permission_denied());
    }

    #[tokio::test]
    async fn stub_tool_output_is_captured() {
        let dir = tempfile::tempdir().unwrap();
        let tool = stub_tool(dir.path(), "fake-vcgencmd", "temp=51.0'C");
        let out = run_checked(&tool, &["measure_temp"], Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(out.trim(), "temp=51.0'C");
    }

    #[test]
    fn degrade_keeps_ok_values() {
        assert_eq!(degrade("test", Ok::<_, SourceError>(3)), Some(3));
        assert_eq!(degrade::<u8>("test", Err(SourceError::parse("x"))), None);
    }
}
