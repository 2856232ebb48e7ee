//! Launch target resolution for the bundled backend.
//!
//! The backend ships inside the application bundle as:
//!
//! ```text
//! <backend_dir>/
//!   venv/bin/python        (venv\Scripts\python.exe on Windows)
//!   main.py
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::SupervisorError;

/// Environment variable that carries the module search path.
pub const DEFAULT_SEARCH_PATH_VAR: &str = "PYTHONPATH";

/// Entry script name inside the backend directory.
pub const DEFAULT_ENTRY_SCRIPT: &str = "main.py";

/// Which part of the launch target a path refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LaunchRole {
    Executable,
    EntryScript,
    WorkingDir,
}

impl fmt::Display for LaunchRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Executable => "executable",
            Self::EntryScript => "entry script",
            Self::WorkingDir => "working directory",
        };
        f.write_str(name)
    }
}

/// Everything needed to spawn the server process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchTarget {
    /// Interpreter or server binary.
    pub executable: PathBuf,
    /// Script passed as the first argument.
    pub entry_script: PathBuf,
    /// Working directory, also prefixed onto the search path.
    pub working_dir: PathBuf,
    /// Name of the module search-path variable.
    pub search_path_var: String,
}

impl LaunchTarget {
    /// Create a target from explicit paths.
    pub fn new(
        executable: impl Into<PathBuf>,
        entry_script: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executable: executable.into(),
            entry_script: entry_script.into(),
            working_dir: working_dir.into(),
            search_path_var: DEFAULT_SEARCH_PATH_VAR.to_string(),
        }
    }

    /// Standard bundle layout rooted at `backend_dir`.
    pub fn for_backend(backend_dir: &Path) -> Self {
        Self::new(
            venv_interpreter(backend_dir),
            backend_dir.join(DEFAULT_ENTRY_SCRIPT),
            backend_dir,
        )
    }

    /// Override the search-path variable name.
    #[must_use]
    pub fn with_search_path_var(mut self, var: impl Into<String>) -> Self {
        self.search_path_var = var.into();
        self
    }

    /// Arguments passed to the executable.
    pub fn args(&self) -> Vec<&Path> {
        vec![self.entry_script.as_path()]
    }

    /// Check that every path exists before spawning.
    ///
    /// The OS spawn call remains the authoritative check; this only
    /// produces a clearer error for the common "bundle incomplete" case.
    pub fn verify(&self) -> Result<(), SupervisorError> {
        let checks = [
            (LaunchRole::Executable, &self.executable, false),
            (LaunchRole::EntryScript, &self.entry_script, false),
            (LaunchRole::WorkingDir, &self.working_dir, true),
        ];

        for (role, path, want_dir) in checks {
            let present = if want_dir {
                path.is_dir()
            } else {
                path.is_file()
            };
            if !present {
                return Err(SupervisorError::LaunchTargetMissing {
                    role,
                    path: path.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(windows)]
fn venv_interpreter(backend_dir: &Path) -> PathBuf {
    backend_dir.join("venv").join("Scripts").join("python.exe")
}

#[cfg(not(windows))]
fn venv_interpreter(backend_dir: &Path) -> PathBuf {
    backend_dir.join("venv").join("bin").join("python")
}
