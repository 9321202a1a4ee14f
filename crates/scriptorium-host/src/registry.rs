use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bindings::{PackageConfigurator, PackageTable};
use crate::environment::{EnvId, Environment, OutputSink};
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::lock;
use crate::script::{Script, ScriptLoader, ScriptPersister, ScriptStorer};
use crate::store::StoreError;

/// Kind tag written to scripts saved by a registry unless configured otherwise
pub const DEFAULT_SCRIPT_KIND: &str = "script";

/// Owns the table of live environments
///
/// Cloning the handle is cheap; all clones refer to the same registry.
#[derive(Clone)]
pub struct Registry {
    shared: Arc<RegistryShared>,
}

pub(crate) struct RegistryShared {
    table: Mutex<Table>,
    store: Option<Arc<dyn ScriptPersister>>,
    executor: Arc<dyn Executor>,
    script_kind: String,
}

struct Table {
    envs: HashMap<EnvId, Environment>,
    /// Strictly increasing, survives removals and resets
    next_id: u64,
}

/// Builder for [`Registry`]
pub struct RegistryBuilder {
    executor: Arc<dyn Executor>,
    store: Option<Arc<dyn ScriptPersister>>,
    configurator: Option<Box<dyn PackageConfigurator>>,
    script_kind: String,
}

impl RegistryBuilder {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            store: None,
            configurator: None,
            script_kind: DEFAULT_SCRIPT_KIND.to_string(),
        }
    }

    /// Store used by autorun and script saves
    pub fn with_store(mut self, store: Arc<dyn ScriptPersister>) -> Self {
        self.store = Some(store);
        self
    }

    /// Package bindings to apply when the registry is built
    ///
    /// The bindings go into the process-wide [`PackageTable`], so every
    /// environment created afterwards sees them, whichever registry creates it.
    pub fn with_configurator(mut self, configurator: impl PackageConfigurator + 'static) -> Self {
        self.configurator = Some(Box::new(configurator));
        self
    }

    /// Kind tag written to saved scripts
    pub fn with_script_kind(mut self, kind: impl Into<String>) -> Self {
        self.script_kind = kind.into();
        self
    }

    pub fn build(self) -> Registry {
        if let Some(configurator) = &self.configurator {
            debug!(target: "scripting", "Applying package configurator (affects the whole process)");
            PackageTable::global().configure(configurator.as_ref());
        }

        Registry {
            shared: Arc::new(RegistryShared {
                table: Mutex::new(Table {
                    envs: HashMap::new(),
                    next_id: 0,
                }),
                store: self.store,
                executor: self.executor,
                script_kind: self.script_kind,
            }),
        }
    }
}

impl Registry {
    pub fn builder(executor: Arc<dyn Executor>) -> RegistryBuilder {
        RegistryBuilder::new(executor)
    }

    /// Register a new, unstarted environment for `source`
    pub fn create_environment(
        &self,
        source: impl Into<String>,
        sink: Option<OutputSink>,
    ) -> Environment {
        self.shared.create(source.into(), None, sink)
    }

    /// Register a new, unstarted environment bound to `script`
    pub fn create_environment_from_script(
        &self,
        script: &Script,
        sink: Option<OutputSink>,
    ) -> Environment {
        self.shared
            .create(script.code.clone(), Some(script.id.clone()), sink)
    }

    pub fn lookup(&self, id: EnvId) -> Option<Environment> {
        lock(&self.shared.table).envs.get(&id).cloned()
    }

    /// A copy of the current table
    pub fn list_all(&self) -> HashMap<EnvId, Environment> {
        lock(&self.shared.table).envs.clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.shared.table).envs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel the environment's current run and unregister it
    ///
    /// Does not wait for the run to unwind.
    pub fn remove(&self, env: &Environment) {
        self.shared.remove(env);
    }

    /// Cancel every environment and empty the table
    pub fn reset_all(&self) {
        let mut table = lock(&self.shared.table);
        for env in table.envs.values() {
            env.cancel();
        }
        let count = table.envs.len();
        table.envs = HashMap::new();
        info!(target: "scripting", "Reset registry, dropped {} environment(s)", count);
    }

    /// Create and start an environment for every script at autorun `level`
    ///
    /// With `run_async` each start runs on its own task and nothing is
    /// returned to observe it. Otherwise the starts run one after another on
    /// this thread. In both cases a failing script is only logged; the only
    /// error returned is failing to fetch the scripts.
    pub fn start_autorun(
        &self,
        level: i32,
        run_async: bool,
        sink: Option<OutputSink>,
    ) -> Result<()> {
        let store = self.shared.store.as_ref().ok_or(Error::NoPersister)?;
        let scripts = store.get_autorun_scripts(level)?;

        info!(
            target: "scripting",
            "Starting {} autorun script(s) at level {}",
            scripts.len(),
            level
        );

        for script in &scripts {
            let env = self.create_environment_from_script(script, sink.clone());
            if run_async {
                spawn_start(env, script.id.clone());
            } else if let Err(e) = env.start() {
                warn!(target: "scripting", "Autorun script {} failed: {}", script.id, e);
            }
        }
        Ok(())
    }

    /// Save `code` under `id`, generating an id if empty
    ///
    /// An existing script keeps its autorun level and notes; only code and
    /// kind are overwritten. A new script never autoruns.
    pub fn save_script(&self, id: &str, code: &str) -> Result<Script> {
        self.shared.save_script(id, code)
    }

    pub fn has_store(&self) -> bool {
        self.shared.store.is_some()
    }
}

impl RegistryShared {
    fn create(
        self: &Arc<Self>,
        source: String,
        script_id: Option<String>,
        sink: Option<OutputSink>,
    ) -> Environment {
        let mut table = lock(&self.table);
        let id = EnvId(table.next_id);
        table.next_id += 1;

        let env = Environment::new(
            id,
            Arc::downgrade(self),
            self.executor.clone(),
            PackageTable::global().snapshot(),
            source,
            script_id,
            sink,
        );
        table.envs.insert(id, env.clone());

        debug!(target: "scripting", "Created environment {}", id);
        env
    }

    pub(crate) fn remove(&self, env: &Environment) {
        let mut table = lock(&self.table);
        env.cancel();
        if table.envs.remove(&env.id()).is_some() {
            debug!(target: "scripting", "Forgot environment {}", env.id());
        }
    }

    pub(crate) fn save_script(&self, id: &str, code: &str) -> Result<Script> {
        let store = self.store.as_ref().ok_or(Error::NoPersister)?;

        let id = if id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            id.to_string()
        };

        // Only a confirmed miss creates a new record; other load failures
        // must not overwrite whatever is stored
        let mut script = match store.get_script(&id) {
            Ok(existing) => existing,
            Err(StoreError::NotFound(_)) => Script::new(id),
            Err(e) => return Err(e.into()),
        };
        script.kind = self.script_kind.clone();
        script.code = code.to_string();

        store.store_script(&script)?;
        info!(target: "scripting", "Saved script {}", script.id);
        Ok(script)
    }
}

fn spawn_start(env: Environment, script_id: String) {
    let task = move || {
        if let Err(e) = env.start() {
            warn!(target: "scripting", "Autorun script {} failed: {}", script_id, e);
        }
    };

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(task);
        }
        Err(_) => {
            if let Err(e) = std::thread::Builder::new()
                .name("scriptorium-autorun".to_string())
                .spawn(task)
            {
                error!(target: "scripting", "Failed to spawn autorun thread: {}", e);
            }
        }
    }
}
