//! Spawning the server process.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use docbridge_core::{
    ENV_HOST, ENV_PORT, LaunchTarget, NoopOutputSink, OutputSinkPort, OutputStream,
    ServiceEndpoint, SupervisorError, SupervisorResult,
};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::stream::spawn_stream_reader;

/// A freshly spawned child with its output already being drained.
#[derive(Debug)]
pub struct LaunchedChild {
    pub child: Child,
    pub pid: u32,
}

/// Builds the command line and environment, spawns, wires up the drains.
#[derive(Clone)]
pub struct ProcessLauncher {
    sink: Arc<dyn OutputSinkPort>,
}

impl ProcessLauncher {
    pub fn new(sink: Arc<dyn OutputSinkPort>) -> Self {
        Self { sink }
    }

    /// Spawn `target`, telling it to bind `endpoint` through
    /// `DOCBRIDGE_HOST` and `DOCBRIDGE_PORT`.
    ///
    /// Missing paths are reported as `LaunchTargetMissing` before anything
    /// is spawned; OS spawn errors become `LaunchFailure` with the raw error
    /// code attached.
    pub fn launch(
        &self,
        target: &LaunchTarget,
        endpoint: &ServiceEndpoint,
    ) -> SupervisorResult<LaunchedChild> {
        target.verify()?;

        let previous = std::env::var_os(&target.search_path_var);
        let search_path = search_path(&target.working_dir, previous);

        let mut cmd = Command::new(&target.executable);
        cmd.args(target.args())
            .current_dir(&target.working_dir)
            .env(&target.search_path_var, &search_path)
            .env("PYTHONUNBUFFERED", "1")
            .env(ENV_HOST, endpoint.host())
            .env(ENV_PORT, endpoint.port().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            executable = %target.executable.display(),
            working_dir = %target.working_dir.display(),
            search_path = ?search_path,
            endpoint = %endpoint,
            "Spawning server process"
        );

        let mut child = cmd.spawn().map_err(|e| {
            let err = SupervisorError::launch_failure(&target.executable, &e);
            warn!(error = %err, "Failed to spawn server process");
            err
        })?;

        let Some(pid) = child.id() else {
            let e = std::io::Error::other("process exited before its pid could be read");
            return Err(SupervisorError::launch_failure(&target.executable, &e));
        };

        self.spawn_drains(&mut child, pid);
        info!(pid = %pid, executable = %target.executable.display(), "Server process spawned");

        Ok(LaunchedChild { child, pid })
    }

    fn spawn_drains(&self, child: &mut Child, pid: u32) {
        if let Some(stdout) = child.stdout.take() {
            spawn_stream_reader(stdout, pid, OutputStream::Stdout, Arc::clone(&self.sink));
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_stream_reader(stderr, pid, OutputStream::Stderr, Arc::clone(&self.sink));
        }
    }
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self::new(Arc::new(NoopOutputSink))
    }
}

/// `working_dir` followed by the entries of `previous`.
///
/// Falls back to just `working_dir` if the combined value cannot be
/// represented (an entry containing the platform separator).
pub fn search_path(working_dir: &Path, previous: Option<OsString>) -> OsString {
    let mut entries = vec![working_dir.to_path_buf()];
    if let Some(previous) = previous.filter(|p| !p.is_empty()) {
        entries.extend(std::env::split_paths(&previous));
    }

    std::env::join_paths(entries).unwrap_or_else(|e| {
        warn!(error = %e, "Ignoring inherited search path");
        working_dir.as_os_str().to_os_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbridge_core::LaunchRole;
    use std::path::PathBuf;

    #[test]
    fn search_path_prefixes_working_dir() {
        let dir = PathBuf::from("/opt/backend");
        assert_eq!(search_path(&dir, None), OsString::from("/opt/backend"));
        assert_eq!(
            search_path(&dir, Some(OsString::new())),
            OsString::from("/opt/backend")
        );

        let previous = std::env::join_paths(["/usr/lib/site", "/home/u/lib"]).unwrap();
        let joined = search_path(&dir, Some(previous));
        let parts: Vec<PathBuf> = std::env::split_paths(&joined).collect();
        assert_eq!(
            parts,
            vec![
                PathBuf::from("/opt/backend"),
                PathBuf::from("/usr/lib/site"),
                PathBuf::from("/home/u/lib"),
            ]
        );
    }

    #[test]
    fn missing_executable_is_reported_before_spawn() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "").unwrap();
        let target = LaunchTarget::for_backend(dir.path());

        let err = ProcessLauncher::default()
            .launch(&target, &ServiceEndpoint::default())
            .unwrap_err();
        assert!(matches!(
            err,
            SupervisorError::LaunchTargetMissing {
                role: LaunchRole::Executable,
                ..
            }
        ));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use docbridge_core::OutputChunk;
        use std::os::unix::fs::PermissionsExt;
        use std::sync::Mutex;
        use std::time::Duration;

        #[derive(Default)]
        struct Collect(Mutex<Vec<(OutputStream, OutputChunk)>>);

        impl OutputSinkPort for Collect {
            fn append(&self, stream: OutputStream, chunk: OutputChunk) {
                self.0.lock().unwrap().push((stream, chunk));
            }
        }

        fn write_script(path: &Path, body: &str, mode: u32) {
            std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
        }

        #[tokio::test]
        async fn launch_wires_environment_and_output() {
            let dir = tempfile::tempdir().unwrap();
            let exe = dir.path().join("server");
            write_script(
                &exe,
                r#"echo "entry=$1"; echo "path=$PYTHONPATH"; echo "cwd=$(pwd)"; echo "bind=$DOCBRIDGE_HOST:$DOCBRIDGE_PORT"; echo oops >&2"#,
                0o755,
            );
            std::fs::write(dir.path().join("main.py"), "").unwrap();
            let target = LaunchTarget::new(&exe, dir.path().join("main.py"), dir.path());

            let sink = Arc::new(Collect::default());
            let endpoint = ServiceEndpoint::loopback(9100);
            let mut launched = ProcessLauncher::new(sink.clone())
                .launch(&target, &endpoint)
                .unwrap();
            assert!(launched.pid > 0);

            let status = tokio::time::timeout(Duration::from_secs(5), launched.child.wait())
                .await
                .unwrap()
                .unwrap();
            assert!(status.success());
            // Let the drains reach EOF
            tokio::time::sleep(Duration::from_millis(200)).await;

            let lines: Vec<String> = sink
                .0
                .lock()
                .unwrap()
                .iter()
                .map(|(stream, chunk)| format!("{stream}:{chunk}"))
                .collect();
            let working_dir = dir.path().canonicalize().unwrap();
            assert!(lines.iter().any(|l| l.starts_with("stdout:entry=") && l.ends_with("main.py")));
            assert!(
                lines
                    .iter()
                    .any(|l| l.starts_with(&format!("stdout:path={}", dir.path().display())))
            );
            assert!(
                lines
                    .iter()
                    .any(|l| l == &format!("stdout:cwd={}", working_dir.display()))
            );
            assert!(lines.contains(&"stdout:bind=127.0.0.1:9100".to_string()));
            assert!(lines.contains(&"stderr:oops".to_string()));
        }

        #[tokio::test]
        async fn spawn_error_keeps_os_error_kind() {
            let dir = tempfile::tempdir().unwrap();
            let exe = dir.path().join("server");
            // Present but not executable
            write_script(&exe, "exit 0", 0o644);
            std::fs::write(dir.path().join("main.py"), "").unwrap();
            let target = LaunchTarget::new(&exe, dir.path().join("main.py"), dir.path());

            let err = ProcessLauncher::default()
                .launch(&target, &ServiceEndpoint::default())
                .unwrap_err();
            match err {
                SupervisorError::LaunchFailure { kind, code, .. } => {
                    assert_eq!(kind, std::io::ErrorKind::PermissionDenied);
                    assert!(code.is_some());
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }
}
