//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::io;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

use crate::backend::{
    Backend, BackendFuture, InstanceHandle, InstanceRequest, InstanceState, InstanceStatus,
};
use crate::remote::{
    CommandOutput, CommandRunner, RemoteCommandOutput, RemoteError, RemoteExecutor,
};

fn locked<T>(mutex: &StdMutex<T>) -> StdMutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
/// An empty queue behaves like a binary that cannot be started.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<StdMutex<VecDeque<CommandOutput>>>,
    invocations: Arc<StdMutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        locked(&self.invocations).clone()
    }

    /// Pushes a successful exit status with no output.
    pub fn push_success(&self) {
        self.push_output(Some(0), "");
    }

    /// Pushes a response with no exit code to simulate abnormal termination.
    pub fn push_missing_exit_code(&self) {
        self.push_output(None, "");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(&self, code: Option<i32>, output: impl Into<String>) {
        locked(&self.responses).push_back(CommandOutput {
            code,
            output: output.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError> {
        locked(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        locked(&self.responses)
            .pop_front()
            .ok_or_else(|| RemoteError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Remote executor double that records commands and replays scripted
/// results. Commands without a scripted result succeed with empty output.
#[derive(Clone, Debug, Default)]
pub struct StubExecutor {
    responses: Arc<StdMutex<VecDeque<RemoteCommandOutput>>>,
    commands: Arc<StdMutex<Vec<RemoteInvocation>>>,
}

/// Host and command pair recorded by [`StubExecutor`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteInvocation {
    /// Host the command was addressed to.
    pub host: String,
    /// Command text passed to the remote shell.
    pub command: String,
}

impl StubExecutor {
    /// Creates an executor that succeeds for every command.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the result for the next command.
    pub fn push_result(&self, exit_code: i32, output: impl Into<String>) {
        locked(&self.responses).push_back(RemoteCommandOutput {
            exit_code,
            output: output.into(),
        });
    }

    /// Returns every command executed so far, in order.
    #[must_use]
    pub fn invocations(&self) -> Vec<RemoteInvocation> {
        locked(&self.commands).clone()
    }
}

impl RemoteExecutor for StubExecutor {
    fn execute(&self, host: &str, command: &str) -> RemoteCommandOutput {
        locked(&self.commands).push(RemoteInvocation {
            host: host.to_owned(),
            command: command.to_owned(),
        });
        locked(&self.responses)
            .pop_front()
            .unwrap_or(RemoteCommandOutput {
                exit_code: 0,
                output: String::new(),
            })
    }
}

/// Failure injected into [`ScriptedBackend`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("scripted backend failure: {0}")]
pub struct ScriptedBackendFailure(pub String);

#[derive(Debug, Default)]
struct ScriptedBackendState {
    next_id: u32,
    servers: BTreeMap<String, InstanceStatus>,
    create_failure: Option<String>,
    destroy_failure: Option<String>,
    created: Vec<InstanceRequest>,
    destroyed: Vec<String>,
}

/// In-memory backend double.
///
/// Created servers are named `server-<n>`, report `running` and carry the
/// address `10.0.0.<n>` until a test overrides them.
#[derive(Clone, Debug, Default)]
pub struct ScriptedBackend {
    state: Arc<StdMutex<ScriptedBackendState>>,
}

impl ScriptedBackend {
    /// Creates a backend with no servers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `create` call fail with `message`.
    pub fn fail_create(&self, message: impl Into<String>) {
        locked(&self.state).create_failure = Some(message.into());
    }

    /// Makes every subsequent `destroy` call fail with `message`.
    pub fn fail_destroy(&self, message: impl Into<String>) {
        locked(&self.state).destroy_failure = Some(message.into());
    }

    /// Replaces the reported status of server `id`.
    pub fn set_status(&self, id: &str, state: InstanceState, address: Option<&str>) {
        locked(&self.state).servers.insert(
            id.to_owned(),
            InstanceStatus {
                state,
                address: address.map(str::to_owned),
            },
        );
    }

    /// Drops server `id` as if it had been removed out of band.
    pub fn forget(&self, id: &str) {
        locked(&self.state).servers.remove(id);
    }

    /// Returns the requests passed to `create`, in order.
    #[must_use]
    pub fn created_requests(&self) -> Vec<InstanceRequest> {
        locked(&self.state).created.clone()
    }

    /// Returns the server identifiers passed to `destroy`, in order.
    #[must_use]
    pub fn destroyed_ids(&self) -> Vec<String> {
        locked(&self.state).destroyed.clone()
    }
}

impl Backend for ScriptedBackend {
    type Error = ScriptedBackendFailure;

    fn create<'a>(
        &'a self,
        request: &'a InstanceRequest,
    ) -> BackendFuture<'a, InstanceHandle, Self::Error> {
        Box::pin(async move {
            let mut state = locked(&self.state);
            if let Some(message) = state.create_failure.clone() {
                return Err(ScriptedBackendFailure(message));
            }
            state.next_id += 1;
            let id = format!("server-{}", state.next_id);
            let address = format!("10.0.0.{}", state.next_id);
            state.servers.insert(
                id.clone(),
                InstanceStatus {
                    state: InstanceState::Running,
                    address: Some(address),
                },
            );
            state.created.push(request.clone());
            Ok(InstanceHandle {
                id,
                zone: request.zone.clone(),
            })
        })
    }

    fn describe<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, Option<InstanceStatus>, Self::Error> {
        Box::pin(async move { Ok(locked(&self.state).servers.get(&handle.id).cloned()) })
    }

    fn destroy(&self, handle: InstanceHandle) -> BackendFuture<'_, (), Self::Error> {
        Box::pin(async move {
            let mut state = locked(&self.state);
            if let Some(message) = state.destroy_failure.clone() {
                return Err(ScriptedBackendFailure(message));
            }
            state.servers.remove(&handle.id);
            state.destroyed.push(handle.id);
            Ok(())
        })
    }
}

/// In-memory sink for `tracing` output.
///
/// Run code under [`LogCapture::in_scope`] and inspect the formatted events
/// with [`LogCapture::contents`].
#[derive(Clone, Debug, Default)]
pub struct LogCapture {
    buffer: Arc<StdMutex<Vec<u8>>>,
}

impl LogCapture {
    /// Creates an empty capture buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `body` with a subscriber that writes every event into this
    /// buffer.
    pub fn in_scope<T>(&self, body: impl FnOnce() -> T) -> T {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, body)
    }

    /// Returns everything logged so far.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&locked(&self.buffer)).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        locked(&self.buffer).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }

    /// Removes variables for the guard's lifetime, restoring them on drop.
    pub async fn unset_vars(keys: &[&str]) -> Self {
        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(keys.len());
        for key in keys {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::remove_var(key) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
