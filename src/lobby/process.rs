//! Worker process spawn and termination.

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::debug;

use crate::config::LobbyConfig;
use crate::error::{ConfigError, LobbyError};

/// Pipe buffer matching the scanner's line budget.
#[cfg(target_os = "linux")]
const PIPE_SIZE: libc::c_int = 1 << 20; // 1MiB

/// A spawned worker with its output pipes taken.
pub(crate) struct WorkerProcess {
    pub child: Child,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Builds the worker argument vector from the comma-split `exe` plus the
/// standardized lobby flags.
pub(crate) fn build_args(cfg: &LobbyConfig) -> Result<Vec<String>, ConfigError> {
    let mut args: Vec<String> = cfg.exe.split(',').map(str::to_string).collect();
    if args.first().map_or(true, |exe| exe.is_empty()) {
        return Err(ConfigError::ExeUnconfigured);
    }
    args.push("-nographics".to_string());
    args.push("-batchmode".to_string());
    args.push("--roomname".to_string());
    // The worker splits its own argv on spaces; smuggle them through as NBSP.
    args.push(cfg.session.replace(' ', "\u{00a0}"));
    if cfg.log_dir.is_some() {
        args.push("-logMatchData".to_string());
    }
    if !cfg.password.is_empty() {
        args.push("--password".to_string());
        args.push(cfg.password.clone());
    }
    if let Some(bind) = cfg.listen.split(',').next().filter(|addr| !addr.is_empty()) {
        args.push("--bind-address".to_string());
        args.push(bind.to_string());
    }
    Ok(args)
}

/// Resolves the executable against `PATH` so a missing binary fails before
/// anything is spawned.
pub(crate) fn resolve_exe(exe: &str) -> Result<PathBuf, ConfigError> {
    let path = Path::new(exe);
    if path.components().count() > 1 {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(ConfigError::ExeNotFound { exe: exe.into() });
    }
    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).collect::<Vec<_>>())
        .unwrap_or_default()
        .into_iter()
        .map(|dir| dir.join(exe))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| ConfigError::ExeNotFound { exe: exe.into() })
}

pub(crate) fn spawn(cfg: &LobbyConfig) -> Result<WorkerProcess, LobbyError> {
    let args = build_args(cfg)?;
    let exe = resolve_exe(&args[0])?;
    let mut cmd = Command::new(&exe);
    cmd.args(&args[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    apply_preload(&mut cmd, cfg);
    debug!(exe = %exe.display(), ?args, "spawning worker");
    let mut child = cmd.spawn().map_err(LobbyError::Io)?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| LobbyError::Io(io::Error::other("stdout pipe missing")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| LobbyError::Io(io::Error::other("stderr pipe missing")))?;
    grow_pipe(&stdout);
    grow_pipe(&stderr);
    Ok(WorkerProcess {
        child,
        stdout,
        stderr,
    })
}

/// Injects the network-interception companion when its shared object sits
/// next to the supervisor binary and the bind triple is fully configured.
fn apply_preload(cmd: &mut Command, cfg: &LobbyConfig) {
    let Ok(current) = env::current_exe() else {
        return;
    };
    let preload = PathBuf::from(format!("{}-preload.so", current.display()));
    if !preload.exists() {
        return;
    }
    let listen: Vec<&str> = cfg.listen.split(',').collect();
    if listen.len() != 3 || listen.iter().any(|addr| addr.is_empty()) {
        return;
    }
    debug!(preload = %preload.display(), listen = %cfg.listen, "preload enabled");
    cmd.env("LD_PRELOAD", &preload)
        .env("LOBBY_LISTEN", listen[0])
        .env("LOBBY_LISTEN1", listen[1])
        .env("LOBBY_LISTEN2", listen[2]);
}

#[cfg(target_os = "linux")]
fn grow_pipe(pipe: &impl std::os::fd::AsRawFd) {
    // Best effort.
    let rc = unsafe { libc::fcntl(pipe.as_raw_fd(), libc::F_SETPIPE_SZ, PIPE_SIZE) };
    if rc < 0 {
        debug!("F_SETPIPE_SZ refused, keeping default pipe size");
    }
}

#[cfg(not(target_os = "linux"))]
fn grow_pipe<T>(_pipe: &T) {}

/// Asks the worker to exit: SIGTERM where possible, kill otherwise. The
/// caller escalates to an unconditional kill after the grace period.
pub(crate) fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc == 0 {
            return;
        }
        debug!(pid, "SIGTERM failed, killing");
    }
    if let Err(err) = child.start_kill() {
        debug!(error = %err, "kill failed, worker already gone");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> LobbyConfig {
        LobbyConfig {
            exe: "worker,-extraflag".into(),
            session: "Test Room".into(),
            ..LobbyConfig::default()
        }
    }

    #[test]
    fn args_carry_the_standard_flags() {
        let args = build_args(&cfg()).expect("args");
        assert_eq!(args[0], "worker");
        assert_eq!(args[1], "-extraflag");
        assert!(args.contains(&"-nographics".to_string()));
        assert!(args.contains(&"-batchmode".to_string()));
        let room = args
            .iter()
            .position(|arg| arg == "--roomname")
            .expect("roomname flag");
        assert_eq!(args[room + 1], "Test\u{00a0}Room");
        assert!(!args.contains(&"-logMatchData".to_string()));
        assert!(!args.contains(&"--password".to_string()));
    }

    #[test]
    fn optional_flags_appear_when_configured() {
        let cfg = LobbyConfig {
            log_dir: Some("/tmp/logs".into()),
            password: "hunter2".into(),
            listen: "10.0.0.1:27002,10.0.0.1:27003,10.0.0.1:27004".into(),
            ..cfg()
        };
        let args = build_args(&cfg).expect("args");
        assert!(args.contains(&"-logMatchData".to_string()));
        let pw = args
            .iter()
            .position(|arg| arg == "--password")
            .expect("password flag");
        assert_eq!(args[pw + 1], "hunter2");
        let bind = args
            .iter()
            .position(|arg| arg == "--bind-address")
            .expect("bind flag");
        assert_eq!(args[bind + 1], "10.0.0.1:27002");
    }

    #[test]
    fn empty_exe_is_a_config_error() {
        let cfg = LobbyConfig {
            exe: String::new(),
            ..cfg()
        };
        assert_eq!(build_args(&cfg), Err(ConfigError::ExeUnconfigured));
    }

    #[test]
    fn missing_executables_fail_before_spawn() {
        let err = resolve_exe("definitely-not-a-real-worker-binary")
            .err()
            .expect("lookup must fail");
        assert!(matches!(err, ConfigError::ExeNotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn path_relative_executables_resolve() {
        let exe = resolve_exe("sh").expect("sh on PATH");
        assert!(exe.is_file());
    }
}
