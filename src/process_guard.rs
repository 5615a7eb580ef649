//! Child process lifecycle for package-manager and encryption commands
//!
//! Every command the runner spawns gets its own process group and a
//! parent-death signal. The group leader PID is tracked in a global
//! registry so a SIGTERM delivered to vmtend (scheduler timeout, shutdown
//! before reboot) also stops an in-flight `apt-get` or `yum` instead of
//! leaving it holding the package lock.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Registry of process-group leaders spawned by this invocation
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
    cleanup_initiated: bool,
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
        debug!("Registered child process group {}", pid);
    }

    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        debug!("Unregistered child process group {}", pid);
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// SIGTERM every tracked group, wait up to `grace_period`, then SIGKILL survivors.
    pub fn terminate_all(&mut self, grace_period: Duration) {
        if self.cleanup_initiated {
            return;
        }
        self.cleanup_initiated = true;

        if self.pids.is_empty() {
            return;
        }

        info!("Terminating {} child process group(s)", self.pids.len());

        let pids: Vec<u32> = self.pids.iter().copied().collect();
        for &pid in &pids {
            if let Err(e) = signal_group(pid, Signal::SIGTERM) {
                warn!("Failed to send SIGTERM to process group {}: {}", pid, e);
            }
        }

        let start = Instant::now();
        while start.elapsed() < grace_period {
            if pids.iter().all(|&pid| !is_process_alive(pid)) {
                self.pids.clear();
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        for &pid in &pids {
            if is_process_alive(pid) {
                warn!("Process group {} ignored SIGTERM, sending SIGKILL", pid);
                let _ = signal_group(pid, Signal::SIGKILL);
            }
        }
        self.pids.clear();
    }
}

/// Negative PID addresses the whole group, so children of `sh -c` get the signal too.
fn signal_group(pgid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(-(pgid as i32)), signal)
}

/// SIGKILL a single process.
///
/// Only the PID is signalled, never its group: the caller may share that
/// group. The kernel's parent-death signal reaches only the victim's direct
/// `sh -c` children; anything those shells forked keeps running. Prefer
/// [`terminate_process`] for another vmtend.
pub fn kill_process(pid: u32) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL)
}

/// SIGTERM a single process, then SIGKILL it if it outlives `grace_period`.
///
/// A vmtend receiving SIGTERM stops the whole group of every command it
/// spawned (see [`init_signal_handlers`]), so `apt-get` or `yum` behind a
/// `sh -c` goes down with it and releases the package lock.
pub fn terminate_process(pid: u32, grace_period: Duration) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM)?;

    let start = Instant::now();
    while start.elapsed() < grace_period {
        if !is_process_alive(pid) {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    warn!("Process {} ignored SIGTERM, sending SIGKILL", pid);
    kill_process(pid)
}

/// True when the process exists and is neither a zombie nor dead.
pub fn is_process_alive(pid: u32) -> bool {
    if pid == 0 || signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    // Field 3 of /proc/<pid>/stat is the state letter
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        let fields: Vec<&str> = stat.split_whitespace().collect();
        if fields.len() > 2 {
            return !matches!(fields[2], "Z" | "X");
        }
    }

    true
}

/// Install SIGINT/SIGTERM/SIGHUP handlers that reap children and exit 128+signo.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("Received signal {}, stopping child commands", sig);
            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.terminate_all(Duration::from_secs(3));
            }
            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Extension trait for `std::process::Command` to set up process groups
pub trait CommandProcessGroup {
    /// Run the command as leader of a new process group that dies with us.
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
