//! A single script environment and its lifecycle
//!
//! ```text
//! Unstarted --start/restart/execute--> Running --suspend--> Suspended
//!                                         ^                     |
//!                                         +--restart/execute----+
//! ```
//!
//! Each environment guards its flags, source buffer and cancellation token
//! with its own lock, so unrelated environments never contend. That lock is
//! never held across an executor call, so `suspend` can reach an in-flight
//! run and `execute` can push a fragment into a script that is still running.
//! The namespace synchronizes itself and is shared by all concurrent runs.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bindings::Packages;
use crate::builtins::{self, Emit};
use crate::error::{Error, Result};
use crate::executor::{ExecError, Executor, Namespace, Value};
use crate::lock;
use crate::registry::RegistryShared;
use crate::script::Script;

/// Registry-scoped environment identifier, never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvId(pub(crate) u64);

impl EnvId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receives every print-style emission of a running script
///
/// Returning an error aborts the script from inside the print call. The sink
/// runs on the script's thread with no environment lock held, so it may call
/// back into the environment it is given.
pub type OutputSink = Arc<dyn Fn(&Environment, &str) -> anyhow::Result<()> + Send + Sync>;

/// Handle to a script environment
///
/// Cloning the handle is cheap; all clones refer to the same environment.
#[derive(Clone)]
pub struct Environment {
    inner: Arc<EnvInner>,
}

struct EnvInner {
    id: EnvId,
    registry: Weak<RegistryShared>,
    executor: Arc<dyn Executor>,
    state: Mutex<EnvState>,
    namespace: Namespace,
}

struct EnvState {
    started: bool,
    suspended: bool,
    source: String,
    /// Bumped on every append; lets a save tell whether it saw the latest source
    revision: u64,
    dirty: bool,
    script_id: Option<String>,
    cancel: Option<CancellationToken>,
}

impl EnvState {
    /// Replace the cancellation token and mark the environment running
    fn arm(&mut self) -> CancellationToken {
        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        self.started = true;
        self.suspended = false;
        token
    }
}

impl Environment {
    pub(crate) fn new(
        id: EnvId,
        registry: Weak<RegistryShared>,
        executor: Arc<dyn Executor>,
        packages: Arc<Packages>,
        source: String,
        script_id: Option<String>,
        sink: Option<OutputSink>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<EnvInner>| {
            let namespace = Namespace::new(packages);
            builtins::install(&namespace, make_emit(weak.clone(), sink));

            EnvInner {
                id,
                registry,
                executor,
                state: Mutex::new(EnvState {
                    started: false,
                    suspended: true,
                    source,
                    revision: 0,
                    dirty: false,
                    script_id,
                    cancel: None,
                }),
                namespace,
            }
        });
        Self { inner }
    }

    fn state(&self) -> MutexGuard<'_, EnvState> {
        lock(&self.inner.state)
    }

    /// Run the whole source buffer for the first time
    ///
    /// Blocks until the executor returns and passes its result through.
    pub fn start(&self) -> Result<Value> {
        let (cancel, source) = {
            let mut state = self.state();
            if state.started {
                return Err(Error::AlreadyStarted);
            }
            (state.arm(), state.source.clone())
        };

        info!(target: "scripting", "Starting environment {}", self.id());
        self.run(&cancel, &source, false)
    }

    /// Ask the current run to stop
    ///
    /// Variables and side effects produced so far are kept.
    pub fn suspend(&self) -> Result<()> {
        let mut state = self.state();
        if state.suspended {
            return Err(Error::AlreadySuspended);
        }
        if let Some(cancel) = &state.cancel {
            cancel.cancel();
        }
        state.suspended = true;

        info!(target: "scripting", "Suspended environment {}", self.id());
        Ok(())
    }

    /// Cancel any current run and execute the whole source again from a clean namespace
    ///
    /// Does not wait for the cancelled run to return; a run that is slow to
    /// notice its token may still write variables after they were cleared.
    pub fn restart(&self) -> Result<Value> {
        let (cancel, source) = {
            let mut state = self.state();
            if let Some(old) = &state.cancel {
                old.cancel();
            }
            (state.arm(), state.source.clone())
        };

        info!(target: "scripting", "Restarting environment {}", self.id());
        self.run(&cancel, &source, true)
    }

    /// Run `fragment` against the existing namespace
    ///
    /// Resumes a suspended or unstarted environment. With `append_to_source`
    /// the fragment becomes part of the source buffer under a timestamp marker
    /// and the environment turns dirty.
    pub fn execute(&self, fragment: &str, append_to_source: bool) -> Result<Value> {
        let cancel = {
            let mut state = self.state();
            if append_to_source {
                let marked = format!(
                    "{}\n// Added on {}:\n{}",
                    state.source,
                    chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false),
                    fragment
                );
                state.source = marked;
                state.revision += 1;
                state.dirty = true;
            }
            if state.suspended || !state.started {
                state.arm()
            } else {
                state.cancel.get_or_insert_with(CancellationToken::new).clone()
            }
        };

        debug!(
            target: "scripting",
            "Executing fragment in environment {} (append: {})",
            self.id(),
            append_to_source
        );
        self.run(&cancel, fragment, false)
    }

    fn run(&self, cancel: &CancellationToken, source: &str, fresh: bool) -> Result<Value> {
        if fresh {
            self.inner.namespace.clear_vars();
        }
        let result = self
            .inner
            .executor
            .execute(cancel, &self.inner.namespace, source);

        if let Err(e) = &result {
            debug!(target: "scripting", "Environment {} run ended with error: {}", self.id(), e);
        }
        result.map_err(Error::from)
    }

    /// Signal cancellation without touching the lifecycle flags
    pub(crate) fn cancel(&self) {
        if let Some(cancel) = &self.state().cancel {
            cancel.cancel();
        }
    }

    /// Stop as far as possible and unregister from the owning registry
    pub fn forget(&self) {
        match self.inner.registry.upgrade() {
            Some(registry) => registry.remove(self),
            None => self.cancel(),
        }
    }

    /// Persist the current source buffer
    ///
    /// An empty `id` saves under the bound script id, or a freshly generated
    /// one if the environment is not bound. On success the environment is bound
    /// to the saved script and, unless source was appended meanwhile, is no
    /// longer dirty.
    pub fn save_script(&self, id: &str) -> Result<Script> {
        let registry = self
            .inner
            .registry
            .upgrade()
            .ok_or(Error::RegistryDropped)?;

        let (id, source, revision) = {
            let state = self.state();
            let id = if id.is_empty() {
                state.script_id.clone().unwrap_or_default()
            } else {
                id.to_string()
            };
            (id, state.source.clone(), state.revision)
        };

        let script = registry.save_script(&id, &source)?;

        let mut state = self.state();
        if state.revision == revision {
            state.dirty = false;
        }
        state.script_id = Some(script.id.clone());
        drop(state);

        info!(target: "scripting", "Environment {} saved as script {}", self.id(), script.id);
        Ok(script)
    }

    pub fn id(&self) -> EnvId {
        self.inner.id
    }

    /// The script this environment was created from or last saved as
    pub fn script_id(&self) -> Option<String> {
        self.state().script_id.clone()
    }

    /// The accumulated source buffer
    pub fn source(&self) -> String {
        self.state().source.clone()
    }

    /// Whether source was appended since the last successful save
    pub fn dirty(&self) -> bool {
        self.state().dirty
    }

    /// Whether execution has ever started
    pub fn started(&self) -> bool {
        self.state().started
    }

    pub fn suspended(&self) -> bool {
        self.state().suspended
    }

    /// The interpreter state shared by every run of this environment
    pub fn namespace(&self) -> &Namespace {
        &self.inner.namespace
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Environment")
            .field("id", &self.inner.id)
            .field("script_id", &state.script_id)
            .field("started", &state.started)
            .field("suspended", &state.suspended)
            .field("dirty", &state.dirty)
            .finish()
    }
}

/// Builtins hold a weak handle so the namespace doesn't keep its own environment alive
fn make_emit(env: Weak<EnvInner>, sink: Option<OutputSink>) -> Emit {
    Arc::new(move |msg: &str| -> std::result::Result<(), ExecError> {
        let (Some(sink), Some(inner)) = (&sink, env.upgrade()) else {
            return Ok(());
        };
        sink(&Environment { inner }, msg).map_err(ExecError::Sink)
    })
}
