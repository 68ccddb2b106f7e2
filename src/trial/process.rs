//! Building and running the external sampling process.
//!
//! One candidate evaluation rebuilds the runner with the TTL curve baked
//! in as preprocessor defines, then runs it as the leader of a fresh
//! process group with its statistics arriving on piped stderr. Control
//! is three signals, always sent to the whole group:
//!
//! | Signal  | Meaning                                        |
//! |---------|------------------------------------------------|
//! | SIGHUP  | soft restart: report statistics, keep sampling |
//! | SIGTERM | graceful stop (the runner does not catch it)   |
//! | SIGINT  | interrupt: the runner reports and exits        |
//!
//! The runner is started with `-q`, which suppresses its periodic
//! output; statistics then appear only in response to a signal, so the
//! first soft restart doubles as the handshake that gets the stream
//! flowing.
//!
//! [`TrialBackend`] and [`TrialStream`] are the seams that keep the
//! decision logic testable: the supervisor drives whatever stream it is
//! handed, and tests hand it scripted ones.

use anyhow::{bail, Context, Result};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, Stdio};

use std::os::unix::process::CommandExt;

use crate::config::{DecoderParams, PARAM_OBJECTS};
use crate::interrupt;
use crate::ttl::CoeffPair;

/// Compile-and-launch capability for one candidate.
pub trait TrialBackend {
    type Stream: TrialStream;

    /// Rebuild the runner with the candidate baked in.
    fn prepare(&mut self, coeffs: &CoeffPair) -> Result<()>;

    /// Start one sampling process.
    fn launch(&mut self) -> Result<Self::Stream>;
}

/// One live sampling session's line stream and control surface.
pub trait TrialStream {
    /// Next stderr line, `None` at end of stream.
    fn next_line(&mut self) -> Result<Option<String>>;

    /// Soft restart: ask the runner to report and continue.
    fn continue_sampling(&mut self) -> Result<()>;

    /// Graceful stop: ask the whole group to terminate.
    fn request_stop(&mut self) -> Result<()>;
}

/// Real backend: `make` rebuilds plus a process-group launch.
#[derive(Debug)]
pub struct MakeBackend {
    root: PathBuf,
    program: PathBuf,
    params: DecoderParams,
    runner_args: Vec<String>,
}

impl MakeBackend {
    pub fn new(
        root: PathBuf,
        program: PathBuf,
        params: DecoderParams,
        runner_args: Vec<String>,
    ) -> Self {
        Self {
            root,
            program,
            params,
            runner_args,
        }
    }

    fn run_make(&self, args: &[&str], defines: Option<&str>) -> Result<()> {
        let mut command = Command::new("make");
        command.arg("-s").args(args).current_dir(&self.root);
        if let Some(defines) = defines {
            command.env("EXTRA", defines);
        }
        let status = command
            .status()
            .with_context(|| format!("Failed to run make in {}", self.root.display()))?;
        if !status.success() {
            bail!("make {} failed with {}", args.join(" "), status);
        }
        Ok(())
    }
}

impl TrialBackend for MakeBackend {
    type Stream = DecoderStream;

    fn prepare(&mut self, coeffs: &CoeffPair) -> Result<()> {
        let defines = self.params.extra_defines(coeffs);
        // The parameter objects bake in the defines; -B forces their
        // rebuild even though no source changed.
        let mut rebuild: Vec<&str> = vec!["-B"];
        rebuild.extend_from_slice(PARAM_OBJECTS);
        self.run_make(&rebuild, Some(&defines))
            .context("Candidate object rebuild failed")?;

        let target = self.program.to_string_lossy().into_owned();
        self.run_make(&[&target], None)
            .context("Runner link step failed")?;
        Ok(())
    }

    fn launch(&mut self) -> Result<DecoderStream> {
        let mut args = Vec::with_capacity(self.runner_args.len() + 1);
        args.push("-q".to_string());
        args.extend(self.runner_args.iter().cloned());
        DecoderStream::spawn(&self.root, &self.program, &args)
    }
}

/// Live runner process with piped stderr.
///
/// The child leads its own process group so control signals reach any
/// helper it forks without touching the tuner itself.
#[derive(Debug)]
pub struct DecoderStream {
    child: Child,
    reader: BufReader<ChildStderr>,
    group: i32,
}

impl DecoderStream {
    fn spawn(root: &Path, program: &Path, args: &[String]) -> Result<Self> {
        let exe = if program.is_absolute() {
            program.to_path_buf()
        } else {
            root.join(program)
        };
        let mut child = Command::new(&exe)
            .args(args)
            .current_dir(root)
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
            .with_context(|| format!("Failed to launch {}", exe.display()))?;
        let stderr = match child.stderr.take() {
            Some(stderr) => stderr,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                bail!("Runner was spawned without a stderr pipe");
            }
        };
        let group = child.id() as i32;
        interrupt::register_group(group);
        Ok(Self {
            child,
            reader: BufReader::new(stderr),
            group,
        })
    }

    /// Send a signal to the whole sampling group.
    ///
    /// A group that already exited (ESRCH) is fine: the reader sees end
    /// of stream and the session winds down through the normal path.
    fn signal_group(&self, signal: libc::c_int) -> Result<()> {
        let rc = unsafe { libc::killpg(self.group, signal) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        Err(err).with_context(|| format!("Failed to signal process group {}", self.group))
    }
}

impl TrialStream for DecoderStream {
    fn next_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .context("Failed to read runner stderr")?;
        if read == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }

    fn continue_sampling(&mut self) -> Result<()> {
        self.signal_group(libc::SIGHUP)
    }

    fn request_stop(&mut self) -> Result<()> {
        self.signal_group(libc::SIGTERM)
    }
}

impl Drop for DecoderStream {
    fn drop(&mut self) {
        // Interrupt mirrors the terminal path (the runner reports and
        // exits); SIGKILL on the direct child keeps the reap from
        // blocking on a wedged runner. The leader stays a zombie until
        // the wait, so the group id cannot have been recycled.
        let _ = self.signal_group(libc::SIGINT);
        let _ = self.child.kill();
        let _ = self.child.wait();
        interrupt::clear_group();
    }
}

/// Scripted stream for supervisor tests: queued lines, counted signals.
#[cfg(test)]
pub struct ScriptedStream {
    lines: std::collections::VecDeque<String>,
    pub soft_restarts: usize,
    pub stop_requests: usize,
}

#[cfg(test)]
impl ScriptedStream {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            soft_restarts: 0,
            stop_requests: 0,
        }
    }
}

#[cfg(test)]
impl TrialStream for ScriptedStream {
    fn next_line(&mut self) -> Result<Option<String>> {
        // After a stop request the runner is gone; the stream ends.
        if self.stop_requests > 0 {
            return Ok(None);
        }
        Ok(self.lines.pop_front())
    }

    fn continue_sampling(&mut self) -> Result<()> {
        self.soft_restarts += 1;
        Ok(())
    }

    fn request_stop(&mut self) -> Result<()> {
        self.stop_requests += 1;
        Ok(())
    }
}

/// Scripted backend for objective tests: queued sessions, recorded
/// rebuilds and launches.
#[cfg(test)]
pub struct ScriptedBackend {
    sessions: std::collections::VecDeque<Vec<String>>,
    pub prepared: Vec<(f64, f64)>,
    pub launches: usize,
}

#[cfg(test)]
impl ScriptedBackend {
    pub fn new(sessions: &[&[&str]]) -> Self {
        Self {
            sessions: sessions
                .iter()
                .map(|lines| lines.iter().map(|line| line.to_string()).collect())
                .collect(),
            prepared: Vec::new(),
            launches: 0,
        }
    }
}

#[cfg(test)]
impl TrialBackend for ScriptedBackend {
    type Stream = ScriptedStream;

    fn prepare(&mut self, coeffs: &CoeffPair) -> Result<()> {
        self.prepared.push((coeffs.a, coeffs.b));
        Ok(())
    }

    fn launch(&mut self) -> Result<ScriptedStream> {
        self.launches += 1;
        let lines = self
            .sessions
            .pop_front()
            .context("Scripted backend ran out of sessions")?;
        Ok(ScriptedStream::new(lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_shell(script: &str) -> DecoderStream {
        DecoderStream::spawn(
            Path::new("."),
            Path::new("/bin/sh"),
            &["-c".to_string(), script.to_string()],
        )
        .expect("failed to spawn /bin/sh")
    }

    #[test]
    fn test_stream_reads_lines_to_eof() {
        let mut stream = spawn_shell("echo one >&2; echo two >&2");
        assert_eq!(stream.next_line().unwrap().as_deref(), Some("one"));
        assert_eq!(stream.next_line().unwrap().as_deref(), Some("two"));
        assert_eq!(stream.next_line().unwrap(), None);
    }

    #[test]
    fn test_stop_request_terminates_the_group() {
        // The sleep inherits the stderr pipe; only a group-wide signal
        // closes the stream promptly.
        let mut stream = spawn_shell("echo ready >&2; sleep 30; echo late >&2");
        assert_eq!(stream.next_line().unwrap().as_deref(), Some("ready"));
        stream.request_stop().unwrap();
        assert_eq!(stream.next_line().unwrap(), None);
    }

    #[test]
    fn test_signals_after_exit_are_benign() {
        let mut stream = spawn_shell("exit 0");
        assert_eq!(stream.next_line().unwrap(), None);
        stream.continue_sampling().unwrap();
        stream.request_stop().unwrap();
    }

    #[test]
    fn test_scripted_stream_ends_after_stop() {
        let mut stream = ScriptedStream::new(["10 1:10", "20 1:20"]);
        assert!(stream.next_line().unwrap().is_some());
        stream.request_stop().unwrap();
        assert_eq!(stream.next_line().unwrap(), None);
        assert_eq!(stream.stop_requests, 1);
    }
}
