//! Lifecycle of the spawned tool process.
//!
//! The tool runs in its own process group with a parent-death signal, and
//! its PID is tracked in a global registry. When the step is interrupted
//! (SIGINT, SIGTERM, SIGHUP) the registered process groups get SIGTERM,
//! then SIGKILL after a grace period, and the signal is recorded so the
//! runner can report cancellation. The caller still unwinds normally, which
//! lets the invocation delete its temp artifacts before the binary exits.
//!
//! Both the registry and the cancellation flag are process-wide. Once a
//! cancellation is recorded every later local run is refused until
//! `reset_cancellation` is called; the binary runs one step per process.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Signal that cancelled the step, 0 while running normally.
static CANCELLED_BY: AtomicI32 = AtomicI32::new(0);

/// Registry tracking spawned tool processes.
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
}

impl ChildRegistry {
    /// Get or create the global child registry
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        debug!("Registered child process PID {}", pid);
    }

    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        debug!("Unregistered child process PID {}", pid);
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// Stop every tracked tool: SIGTERM to each process group, then SIGKILL
    /// to whatever is still running after `grace_period`.
    pub fn terminate_all(&mut self, grace_period: Duration) {
        let targets: Vec<u32> = self.pids.drain().collect();
        if targets.is_empty() {
            debug!("No tool process to stop");
            return;
        }
        info!("Stopping {} tool process(es)", targets.len());

        signal_groups(&targets, Signal::SIGTERM);
        let survivors = wait_for_exit(&targets, grace_period);
        if survivors.is_empty() {
            info!("Tool stopped");
            return;
        }

        warn!("{} process group(s) ignored SIGTERM, killing", survivors.len());
        signal_groups(&survivors, Signal::SIGKILL);
    }
}

/// Signal each group, falling back to the leader alone when the group is
/// gone (the leader may not have called setpgid yet).
fn signal_groups(leaders: &[u32], sig: Signal) {
    for &leader in leaders {
        let group = Pid::from_raw(-(leader as i32));
        if let Err(group_err) = signal::kill(group, sig) {
            if let Err(e) = signal::kill(Pid::from_raw(leader as i32), sig) {
                let message = format!(
                    "{:?} to {} failed: group {}, process {}",
                    sig, leader, group_err, e
                );
                if sig == Signal::SIGKILL {
                    error!("{}", message);
                } else {
                    debug!("{}", message);
                }
            }
        } else {
            debug!("Sent {:?} to process group {}", sig, leader);
        }
    }
}

/// Poll until every process is gone or `timeout` passes; returns the rest.
fn wait_for_exit(pids: &[u32], timeout: Duration) -> Vec<u32> {
    let deadline = Instant::now() + timeout;
    loop {
        let running: Vec<u32> = pids.iter().copied().filter(|&p| is_running(p)).collect();
        if running.is_empty() || Instant::now() >= deadline {
            return running;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

/// Exists and is not a zombie (state `Z` or `X` in /proc/<pid>/stat).
fn is_running(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => !matches!(stat.split_whitespace().nth(2), Some("Z" | "X")),
        Err(_) => true,
    }
}

/// Register `pid` in the global registry.
///
/// If the step was cancelled first, the new process group is killed instead
/// and the signal returned. `cancel` stores the signal before it locks the
/// registry, so every child is either registered before `terminate_all`
/// runs or sees the flag here.
#[must_use]
pub fn track_child(pid: u32) -> Option<i32> {
    let global = ChildRegistry::global();
    let mut registry = match global.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(sig) = cancellation_signal() {
        warn!("Step already cancelled, killing PID {}", pid);
        signal_groups(&[pid], Signal::SIGKILL);
        return Some(sig);
    }
    registry.register(pid);
    None
}

/// Remove `pid` from the global registry.
pub fn untrack_child(pid: u32) {
    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.unregister(pid);
    }
}

/// The signal that cancelled the step, if any.
pub fn cancellation_signal() -> Option<i32> {
    match CANCELLED_BY.load(Ordering::SeqCst) {
        0 => None,
        sig => Some(sig),
    }
}

/// Record a cancellation and stop every tracked tool process.
pub fn cancel(sig: i32, grace_period: Duration) {
    CANCELLED_BY.store(sig, Ordering::SeqCst);
    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.terminate_all(grace_period);
    }
}

/// Clear a recorded cancellation so later runs in this process may launch.
pub fn reset_cancellation() {
    CANCELLED_BY.store(0, Ordering::SeqCst);
}

/// Install handlers for SIGINT, SIGTERM and SIGHUP.
///
/// The first signal cancels the running tool and lets the step unwind
/// (and clean up). A second signal exits immediately with `128 + signal`.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::thread;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    thread::spawn(move || {
        for sig in signals.forever() {
            let signal_name = match sig {
                SIGINT => "SIGINT",
                SIGTERM => "SIGTERM",
                SIGHUP => "SIGHUP",
                _ => "UNKNOWN",
            };

            if cancellation_signal().is_some() {
                warn!("Received {} again, exiting without cleanup", signal_name);
                std::process::exit(128 + sig);
            }

            info!("Received {} signal, stopping the tool...", signal_name);
            cancel(sig, Duration::from_secs(3));
        }
    });

    Ok(())
}

/// Extension trait for std::process::Command to set up process groups
pub trait CommandProcessGroup {
    /// Run the command as the leader of a new process group that dies
    /// with its parent.
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::other)?;

                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }

                Ok(())
            });
        }
        self
    }
}
