use crate::services::error::{ConvertError, ConvertResult};
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, error, info};

/// Most stderr we keep in an error message.
const STDERR_EXCERPT: usize = 600;

/// A fixed external tool invocation: program plus argument template.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: String,
    args: Vec<OsString>,
    env: Vec<(OsString, OsString)>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.env
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }
}

/// Runs a tool to completion within `timeout`.
///
/// The child runs in its own process group. When the deadline passes the whole
/// group is killed, so launchers that fork a worker (LibreOffice) do not leave
/// it running. Spawn failures, timeouts and non-zero exits all surface as
/// `Conversion`.
pub async fn run_tool(command: &ToolCommand, timeout: Duration) -> ConvertResult<()> {
    let started = Instant::now();
    debug!("Running {} {:?}", command.program, command.args);

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .envs(command.env.iter().map(|(k, v)| (k, v)))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn().map_err(|e| {
        error!("Failed to start {}: {}", command.program, e);
        ConvertError::Conversion(format!("Failed to start {}: {}", command.program, e))
    })?;
    let pid = child.id();

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| {
            ConvertError::Conversion(format!("Failed to wait for {}: {}", command.program, e))
        })?,
        Err(_) => {
            // Dropping the wait future drops the child, and kill_on_drop reaps it
            if let Some(pid) = pid {
                kill_group(pid).await;
            }
            error!(
                "⏱️  {} exceeded {}s and was killed",
                command.program,
                timeout.as_secs()
            );
            return Err(ConvertError::Conversion(format!(
                "{} timed out after {}s",
                command.program,
                timeout.as_secs()
            )));
        }
    };

    if !output.status.success() {
        let stderr = excerpt(&String::from_utf8_lossy(&output.stderr));
        error!("{} failed with {}: {}", command.program, output.status, stderr);
        return Err(ConvertError::Conversion(format!(
            "{} exited with {}: {}",
            command.program, output.status, stderr
        )));
    }

    info!(
        "🔧 {} finished in {:?}",
        command.program,
        started.elapsed()
    );
    Ok(())
}

/// Kills every process in the group led by `pid`.
#[cfg(unix)]
async fn kill_group(pid: u32) {
    let result = Command::new("sh")
        .arg("-c")
        .arg(format!("kill -KILL -{}", pid))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = result {
        error!("Failed to kill process group {}: {}", pid, e);
    }
}

#[cfg(not(unix))]
async fn kill_group(_pid: u32) {}

/// Checks that a declared output file exists and is non-empty.
pub async fn ensure_output(path: &Path) -> ConvertResult<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(meta.len()),
        Ok(_) => Err(ConvertError::Conversion(format!(
            "Output {} is empty",
            display_name(path)
        ))),
        Err(_) => Err(ConvertError::Conversion(format!(
            "Output {} was not produced",
            display_name(path)
        ))),
    }
}

/// Whether `program` resolves to an executable file, either as a path or via `PATH`.
/// Used by the health check and by tests that need a real tool.
pub fn tool_available(program: &str) -> bool {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate);
    }

    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| is_executable(&dir.join(program))))
        .unwrap_or(false)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}

fn excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_EXCERPT {
        return trimmed.to_string();
    }
    let mut end = STDERR_EXCERPT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &trimmed[..end])
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;

    /// Writes an executable `/bin/sh` script standing in for an external tool.
    pub fn fake_tool(dir: &Path, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn test_successful_tool() {
        let cmd = ToolCommand::new("sh").arg("-c").arg("exit 0");
        run_tool(&cmd, Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_conversion_error() {
        let cmd = ToolCommand::new("sh")
            .arg("-c")
            .arg("echo broken input >&2; exit 3");
        let err = run_tool(&cmd, Duration::from_secs(5)).await.unwrap_err();
        match err {
            ConvertError::Conversion(msg) => assert!(msg.contains("broken input")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_tool() {
        let cmd = ToolCommand::new("sleep").arg("30");
        let started = Instant::now();
        let err = run_tool(&cmd, Duration::from_millis(200)).await.unwrap_err();
        assert!(matches!(err, ConvertError::Conversion(ref m) if m.contains("timed out")));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_forked_workers() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("worker.pid");
        let launcher = fake_tool(
            dir.path(),
            "launcher",
            &format!("sleep 30 &\necho $! > '{}'\nwait", pid_file.display()),
        );

        let err = run_tool(&ToolCommand::new(launcher), Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Conversion(ref m) if m.contains("timed out")));

        let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
        let stat = format!("/proc/{}/stat", pid);
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            // Gone, or a zombie waiting for its new parent to reap it
            let state = std::fs::read_to_string(&stat)
                .ok()
                .and_then(|s| s.rsplit(')').next().and_then(|rest| rest.trim_start().chars().next()));
            if matches!(state, None | Some('Z')) {
                break;
            }
            assert!(Instant::now() < deadline, "forked worker {} survived the timeout", pid);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let cmd = ToolCommand::new("definitely-not-a-real-converter-binary");
        let err = run_tool(&cmd, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ConvertError::Conversion(_)));
        assert!(!tool_available("definitely-not-a-real-converter-binary"));
        assert!(tool_available("sh"));
    }

    #[tokio::test]
    async fn test_env_is_passed() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("env.txt");
        let cmd = ToolCommand::new("sh")
            .arg("-c")
            .arg(format!("printf %s \"$CONVERT_MARKER\" > '{}'", out.display()))
            .env("CONVERT_MARKER", "marker");
        run_tool(&cmd, Duration::from_secs(5)).await.unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "marker");
    }

    #[tokio::test]
    async fn test_ensure_output() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.pdf");
        assert!(ensure_output(&missing).await.is_err());

        let empty = dir.path().join("empty.pdf");
        std::fs::write(&empty, b"").unwrap();
        assert!(ensure_output(&empty).await.is_err());

        let full = dir.path().join("full.pdf");
        std::fs::write(&full, b"%PDF-1.4").unwrap();
        assert_eq!(ensure_output(&full).await.unwrap(), 8);
    }

    #[test]
    fn test_excerpt_truncates() {
        let long = "e".repeat(STDERR_EXCERPT * 2);
        assert_eq!(excerpt(&long).chars().count(), STDERR_EXCERPT + 1);
        assert_eq!(excerpt("  short \n"), "short");
    }
}
