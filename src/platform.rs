//! Platform glue: WSL detection, external tool invocation and game processes
//!
//! The packer and the asset converter are Windows executables. When the
//! workbench runs under WSL they are still started directly (through WSL
//! interop), but every path handed to them on the command line must be
//! converted to its Windows form first.
//!
//! # Examples
//!
//! ```
//! use dbd_workbench::platform::wsl_to_windows_path;
//! use std::path::Path;
//!
//! assert_eq!(
//!     wsl_to_windows_path(Path::new("/mnt/c/Games/DeadByDaylight")),
//!     Some("C:\\Games\\DeadByDaylight".to_string())
//! );
//! ```

use crate::{Error, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use sysinfo::System;

/// Whether the process runs inside the Windows Subsystem for Linux
pub fn is_wsl() -> bool {
    env::var("WSL_DISTRO_NAME").is_ok()
        || fs::read_to_string("/proc/version")
            .map(|v| v.contains("microsoft") || v.contains("WSL"))
            .unwrap_or(false)
}

/// Convert WSL path to Windows path (e.g., /mnt/c/foo -> C:\foo)
///
/// Paths outside `/mnt/<drive>` are returned unchanged.
pub fn wsl_to_windows_path(wsl_path: &Path) -> Option<String> {
    let path_str = wsl_path.to_string_lossy();

    if let Some(rest) = path_str.strip_prefix("/mnt/") {
        let mut parts = rest.splitn(2, '/');
        let drive = parts.next().filter(|d| d.len() == 1)?;
        let tail = parts.next().unwrap_or("").replace('/', "\\");
        return Some(format!("{}:\\{}", drive.to_uppercase(), tail));
    }

    Some(path_str.to_string())
}

/// An external executable configured in the settings
#[derive(Debug, Clone)]
pub struct ExternalTool {
    name: String,
    path: PathBuf,
    windows_paths: bool,
}

impl ExternalTool {
    /// Describe the tool `name` living at `path`
    ///
    /// Arguments are converted to Windows paths when running under WSL and
    /// the tool is a Windows executable.
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        let is_windows_exe = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("exe") || ext.eq_ignore_ascii_case("bat"))
            .unwrap_or(false);
        let windows_paths = !cfg!(windows) && is_windows_exe && is_wsl();
        Self {
            name: name.into(),
            path,
            windows_paths,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render a path argument the way the tool expects it
    pub fn path_arg(&self, path: &Path) -> String {
        if self.windows_paths {
            wsl_to_windows_path(path).unwrap_or_else(|| path.display().to_string())
        } else {
            path.display().to_string()
        }
    }

    /// Run the tool to completion
    ///
    /// `subject` names the file being processed in error messages. A non-zero
    /// exit becomes [`Error::Conversion`] carrying the tail of the output.
    pub fn run(&self, args: &[String], subject: &Path) -> Result<()> {
        if !self.path.is_file() {
            return Err(Error::missing_path(&format!("{} executable", self.name), &self.path));
        }

        let command_line = format!("{} {}", self.path.display(), args.join(" "));
        tracing::debug!("Running {}", command_line);

        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed_precise}]") {
            pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
        }
        pb.set_message(format!(
            "{} {}",
            self.name,
            subject.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
        ));
        pb.enable_steady_tick(Duration::from_millis(100));

        let output = Command::new(&self.path)
            .args(args)
            .stdin(Stdio::null())
            .output();
        pb.finish_and_clear();
        let output = output?;

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let all_output: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
            let start_idx = all_output.len().saturating_sub(30);
            for line in &all_output[start_idx..] {
                tracing::warn!("{}: {}", self.name, line);
            }

            let status = match output.status.code() {
                Some(code) => format!("exit code {}", code),
                None => "terminated by signal".to_string(),
            };
            return Err(Error::Conversion {
                tool: self.name.clone(),
                status,
                subject: subject.to_path_buf(),
                command: command_line,
            });
        }
        Ok(())
    }
}

/// Start the game launcher without waiting for it
pub fn launch_detached(launcher: &Path) -> Result<()> {
    if !launcher.is_file() {
        return Err(Error::missing_path("launcher", launcher));
    }
    tracing::info!("Launching {}", launcher.display());

    let mut cmd = Command::new(launcher);
    if let Some(dir) = launcher.parent() {
        cmd.current_dir(dir);
    }
    cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
    cmd.spawn()?;
    Ok(())
}

/// Whether a running process belongs to the game
///
/// Explicit `names` match exactly (case-insensitive, `.exe` optional);
/// otherwise any process whose name starts with `game_name` matches.
pub fn is_game_process(process_name: &str, names: &[String], game_name: &str) -> bool {
    let lower = process_name.to_ascii_lowercase();
    if names.is_empty() {
        return !game_name.is_empty() && lower.starts_with(&game_name.to_ascii_lowercase());
    }
    let bare = lower.strip_suffix(".exe").unwrap_or(&lower);
    names.iter().any(|name| {
        let name = name.to_ascii_lowercase();
        let name = name.strip_suffix(".exe").unwrap_or(&name);
        name == bare
    })
}

/// Terminate running game processes; returns the names that were signalled
pub fn kill_game_processes(names: &[String], game_name: &str) -> Vec<String> {
    let system = System::new_all();
    let mut killed = Vec::new();

    for process in system.processes().values() {
        let name = process.name().to_string_lossy().to_string();
        if !is_game_process(&name, names, game_name) {
            continue;
        }
        if process.kill() {
            tracing::info!("Terminated {} (pid {})", name, process.pid());
            killed.push(name);
        } else {
            tracing::warn!("Could not terminate {} (pid {})", name, process.pid());
        }
    }

    killed.sort();
    killed.dedup();
    killed
}
