/// Shell selection for spawned sessions
use portable_pty::CommandBuilder;
use std::path::{Path, PathBuf};

use crate::DEFAULT_TERM;

/// Which program to run behind a local terminal and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// Program to launch; `None` picks the platform default
    pub program: Option<String>,
    pub args: Vec<String>,
    /// Value exported as `TERM`
    pub term: String,
    /// Extra environment on top of the inherited one
    pub env: Vec<(String, String)>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            term: DEFAULT_TERM.to_string(),
            env: Vec::new(),
        }
    }
}

impl ShellConfig {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: Some(program.into()),
            ..Self::default()
        }
    }

    pub fn program(&self) -> String {
        self.program.clone().unwrap_or_else(default_shell)
    }

    /// Build the command for one session rooted at `cwd`
    pub fn command(&self, cwd: &Path) -> CommandBuilder {
        let mut cmd = CommandBuilder::new(self.program());
        cmd.args(&self.args);
        cmd.cwd(cwd);
        cmd.env("TERM", &self.term);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Platform default interactive shell
pub fn default_shell() -> String {
    if cfg!(windows) {
        "powershell.exe".to_string()
    } else {
        std::env::var("SHELL")
            .ok()
            .filter(|shell| !shell.trim().is_empty())
            .unwrap_or_else(|| "bash".to_string())
    }
}

/// The invoking user's home directory, falling back to the process cwd
pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .filter(|path| path.is_dir())
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// Working directory for a new session.
///
/// A requested directory that does not exist falls back to `default`.
pub fn resolve_cwd(requested: Option<&str>, default: &Path) -> PathBuf {
    match requested.map(str::trim).filter(|dir| !dir.is_empty()) {
        Some(dir) => {
            let path = expand_tilde(dir);
            if path.is_dir() {
                path
            } else {
                tracing::warn!(requested = %dir, fallback = %default.display(), "requested cwd is not a directory");
                default.to_path_buf()
            }
        }
        None => default.to_path_buf(),
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        home_dir()
    } else if let Some(rest) = path.strip_prefix("~/") {
        home_dir().join(rest)
    } else {
        PathBuf::from(path)
    }
}
