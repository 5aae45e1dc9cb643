//! Launching the tool.
//!
//! `ProcessRunner` is the seam between the invocation core and whatever
//! actually starts processes. `LocalProcessRunner` is the only place in the
//! crate that spawns the tool: it runs it in a new process group, registers
//! the PID with the process guard, and streams merged stdout/stderr into a
//! log sink. `DryRunRunner` records what would have run.

use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use crate::args::ArgumentList;
use crate::error::{InvocationError, Result};
use crate::process_guard::{self, CommandProcessGroup};

/// Everything needed to launch the tool once.
#[derive(Debug, Clone, Copy)]
pub struct ProcessRequest<'a> {
    pub args: &'a ArgumentList,
    pub environment: &'a BTreeMap<String, String>,
    pub working_dir: &'a Path,
}

/// How the tool exited. `code` is `None` when it was killed by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub trait ProcessRunner {
    /// Run to completion and report the exit status. Only launch and wait
    /// failures are errors; a non-zero exit is a normal `ProcessExit`.
    fn run(&mut self, request: ProcessRequest<'_>) -> Result<ProcessExit>;
}

/// Runs the tool on this machine, echoing its output into `sink`.
pub struct LocalProcessRunner<W: Write> {
    sink: W,
}

impl LocalProcessRunner<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> LocalProcessRunner<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    pub fn into_sink(self) -> W {
        self.sink
    }

    fn stream(&mut self, reader: impl io::Read) -> io::Result<()> {
        for line in BufReader::new(reader).split(b'\n') {
            self.sink.write_all(&line?)?;
            self.sink.write_all(b"\n")?;
        }
        self.sink.flush()
    }
}

impl<W: Write> ProcessRunner for LocalProcessRunner<W> {
    fn run(&mut self, request: ProcessRequest<'_>) -> Result<ProcessExit> {
        let argv = request.args.to_vec();
        let Some((program, rest)) = argv.split_first() else {
            return Err(InvocationError::config("Empty command line"));
        };

        if let Some(signal) = process_guard::cancellation_signal() {
            warn!("Step cancelled, not launching {}", program);
            return Err(InvocationError::Cancelled { signal });
        }

        writeln!(self.sink, "$ {}", request.args)?;

        let (reader, writer) = io::pipe().map_err(InvocationError::Process)?;

        // The Command owns both write ends; it must be dropped before
        // reading so the pipe reports EOF when the tool exits.
        let mut child = {
            let mut cmd = Command::new(program);
            cmd.args(rest)
                .env_clear()
                .envs(request.environment)
                .current_dir(request.working_dir)
                .stdin(Stdio::null())
                .stdout(writer.try_clone().map_err(InvocationError::Process)?)
                .stderr(writer)
                .in_new_process_group();
            cmd.spawn().map_err(InvocationError::Process)?
        };

        let pid = child.id();
        if let Some(signal) = process_guard::track_child(pid) {
            if let Err(e) = child.wait() {
                warn!("Failed to reap PID {}: {}", pid, e);
            }
            return Err(InvocationError::Cancelled { signal });
        }
        debug!("Spawned {} as PID {}", program, pid);

        let streamed = self.stream(reader);
        let status = child.wait();
        process_guard::untrack_child(pid);

        if let Err(e) = streamed {
            warn!("Lost tool output: {}", e);
        }
        let status = status.map_err(InvocationError::Process)?;

        if let Some(signal) = process_guard::cancellation_signal() {
            return Err(InvocationError::Cancelled { signal });
        }

        match status.code() {
            Some(code) => info!("{} exited with code {}", program, code),
            None => warn!("{} was terminated by a signal", program),
        }
        Ok(ProcessExit {
            code: status.code(),
        })
    }
}

/// A request as seen by `DryRunRunner`.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub args: ArgumentList,
    pub environment: BTreeMap<String, String>,
    pub working_dir: PathBuf,
}

impl RecordedRequest {
    /// Masked rendering of the command line.
    pub fn command_line(&self) -> String {
        self.args.to_command_line()
    }
}

/// Records requests without launching anything.
#[derive(Debug, Default)]
pub struct DryRunRunner {
    exit_code: i32,
    requests: Vec<RecordedRequest>,
}

impl DryRunRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit code reported for every request.
    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn requests(&self) -> &[RecordedRequest] {
        &self.requests
    }

    pub fn invocation_count(&self) -> usize {
        self.requests.len()
    }
}

impl ProcessRunner for DryRunRunner {
    fn run(&mut self, request: ProcessRequest<'_>) -> Result<ProcessExit> {
        info!("[DRY RUN] Would execute: {}", request.args);
        self.requests.push(RecordedRequest {
            args: request.args.clone(),
            environment: request.environment.clone(),
            working_dir: request.working_dir.to_path_buf(),
        });
        Ok(ProcessExit::from_code(self.exit_code))
    }
}
