//! Command execution for package-manager and disk tooling.
//!
//! `CommandRunner` is the seam every orchestrator goes through to touch the
//! OS. `ShellRunner` is the production implementation: it spawns `sh -c`
//! non-interactively, in its own process group, registered with the
//! [`ChildRegistry`] for cleanup. `MockRunner` records calls and serves
//! scripted results; it is only built for tests and with the `test-util`
//! feature.
//!
//! A nonzero exit status is *not* an `Err`: callers decide whether a failed
//! command is fatal. `Err` is reserved for "could not run it at all".

use crate::error::{Result, VmTendError};
use crate::process_guard::{ChildRegistry, CommandProcessGroup};
use std::process::{Command, Stdio};
#[cfg(any(test, feature = "test-util"))]
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{debug, info};

/// Exit status and captured text of one command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit code (-1 if terminated by a signal).
    pub exit_code: i32,
    /// Standard output followed by standard error.
    pub text: String,
}

impl CommandOutput {
    pub fn new(exit_code: i32, text: impl Into<String>) -> Self {
        Self {
            exit_code,
            text: text.into(),
        }
    }

    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes shell command lines. No command is ever given stdin.
pub trait CommandRunner {
    /// Run `cmd` with extra environment variables, capturing its output.
    fn run_capture_with_env(&self, cmd: &str, env: &[(String, String)]) -> Result<CommandOutput>;

    /// Run `cmd`, capturing its output.
    fn run_capture(&self, cmd: &str) -> Result<CommandOutput> {
        self.run_capture_with_env(cmd, &[])
    }

    /// Run `cmd` and return only its exit code.
    fn run(&self, cmd: &str) -> Result<i32> {
        self.run_capture(cmd).map(|output| output.exit_code)
    }

    /// Whether commands are only logged, never executed.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Production runner that spawns `sh -c <cmd>`.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    dry_run: bool,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// A runner that logs every command and reports success without executing it.
    pub fn dry_run() -> Self {
        Self { dry_run: true }
    }
}

impl CommandRunner for ShellRunner {
    fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn run_capture_with_env(&self, cmd: &str, env: &[(String, String)]) -> Result<CommandOutput> {
        if self.dry_run {
            info!("[DRY RUN] {} env={:?}", cmd, env);
            return Ok(CommandOutput::new(0, ""));
        }

        debug!("Running: {} env={:?}", cmd, env);

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .in_new_process_group();
        for (key, value) in env {
            command.env(key, value);
        }

        let child = command
            .spawn()
            .map_err(|e| VmTendError::command(format!("failed to spawn `{}`: {}", cmd, e)))?;
        let pid = child.id();

        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.register(pid);
        }

        let waited = child.wait_with_output();

        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.unregister(pid);
        }

        let output =
            waited.map_err(|e| VmTendError::command(format!("failed waiting for `{}`: {}", cmd, e)))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        let exit_code = output.status.code().unwrap_or(-1);

        debug!("`{}` exited with {}", cmd, exit_code);
        Ok(CommandOutput { exit_code, text })
    }
}

/// One recorded invocation on a [`MockRunner`].
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub command: String,
    pub env: Vec<(String, String)>,
}

#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Default)]
struct MockState {
    rules: Vec<(String, VecDeque<CommandOutput>, CommandOutput)>,
    calls: Vec<RecordedCommand>,
    dry_run: bool,
}

/// Test double that records commands and serves scripted results.
///
/// Results are keyed by substring: the first rule whose pattern occurs in
/// the command line answers it. A rule can queue one-shot results before
/// falling back to its sticky result. Unmatched commands succeed with empty
/// output. Clones share state, so a test can keep a handle while the
/// orchestrator owns another.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone, Default)]
pub struct MockRunner {
    state: Arc<Mutex<MockState>>,
}

#[cfg(any(test, feature = "test-util"))]
impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `dry_run` from [`CommandRunner::is_dry_run`]. Commands are
    /// still recorded and answered from the rules.
    pub fn set_dry_run(&self, dry_run: bool) -> &Self {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).dry_run = dry_run;
        self
    }

    /// Answer every command containing `pattern` with `output`.
    pub fn on(&self, pattern: &str, output: CommandOutput) -> &Self {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rules
            .push((pattern.to_string(), VecDeque::new(), output));
        self
    }

    /// Answer the next command containing `pattern` with `output`, once.
    pub fn once(&self, pattern: &str, output: CommandOutput) -> &Self {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(rule) = state.rules.iter_mut().find(|rule| rule.0 == pattern) {
            rule.1.push_back(output);
        } else {
            state.rules.push((
                pattern.to_string(),
                VecDeque::from([output]),
                CommandOutput::default(),
            ));
        }
        self
    }

    /// Every command line run so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.command).collect()
    }

    pub fn calls(&self) -> Vec<RecordedCommand> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).calls.clone()
    }

    /// Commands that contained `pattern`.
    pub fn commands_matching(&self, pattern: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|cmd| cmd.contains(pattern))
            .collect()
    }
}

#[cfg(any(test, feature = "test-util"))]
impl CommandRunner for MockRunner {
    fn is_dry_run(&self) -> bool {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).dry_run
    }

    fn run_capture_with_env(&self, cmd: &str, env: &[(String, String)]) -> Result<CommandOutput> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.calls.push(RecordedCommand {
            command: cmd.to_string(),
            env: env.to_vec(),
        });
        let answer = state
            .rules
            .iter_mut()
            .find(|(pattern, _, _)| cmd.contains(pattern.as_str()))
            .map(|(_, queued, sticky)| queued.pop_front().unwrap_or_else(|| sticky.clone()));
        Ok(answer.unwrap_or_default())
    }
}
