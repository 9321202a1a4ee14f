// Integration tests for the environment registry

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{capture_sink, LineExecutor};
use scriptorium_host::{
    DirStore, Error, ExecError, FunctionBindings, PackageConfigurator, Registry, Script,
    ScriptLoader, ScriptStorer, TypeBindings, Value, AUTORUN_NEVER,
};
use tempfile::TempDir;

fn registry_with_dir_store() -> (TempDir, Arc<DirStore>, Registry, Arc<LineExecutor>) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = Arc::new(DirStore::new(temp_dir.path().join("scripts")));
    let executor = Arc::new(LineExecutor::default());
    let registry = Registry::builder(executor.clone())
        .with_store(store.clone())
        .build();
    (temp_dir, store, registry, executor)
}

#[test]
fn test_save_without_persister_fails() {
    let registry = Registry::builder(Arc::new(LineExecutor::default())).build();
    let err = registry.save_script("", "print anything").unwrap_err();
    assert!(matches!(err, Error::NoPersister));
    assert_eq!(err.to_string(), "script persister not specified");
}

#[test]
fn test_quick_script_start_then_suspend() {
    let (_temp, _store, registry, _) = registry_with_dir_store();
    let (sink, captured) = capture_sink();
    let env = registry.create_environment("print done", Some(sink));

    assert_eq!(env.start().unwrap(), Value::Int(4));
    assert_eq!(captured.lock().unwrap()[0].1, "done");

    assert!(env.suspend().is_ok());
    assert!(matches!(env.suspend(), Err(Error::AlreadySuspended)));
}

#[test]
fn test_ids_unique_across_churn() {
    let (_temp, _store, registry, _) = registry_with_dir_store();
    let mut ids = HashSet::new();
    for _ in 0..50 {
        let a = registry.create_environment("", None);
        let b = registry.create_environment("", None);
        a.forget();
        assert!(ids.insert(a.id()));
        assert!(ids.insert(b.id()));
    }
    registry.reset_all();
    let after_reset = registry.create_environment("", None);
    assert!(ids.insert(after_reset.id()));
}

#[test]
fn test_edit_and_save_round_trip_through_dir_store() {
    let (_temp, store, registry, executor) = registry_with_dir_store();
    store
        .store_script(
            &Script::new("greeter")
                .with_code("print hello")
                .with_autorun(1)
                .with_notes("greets"),
        )
        .unwrap();

    let script = store.get_script("greeter").unwrap();
    let env = registry.create_environment_from_script(&script, None);
    env.start().unwrap();
    env.execute("print again", true).unwrap();
    assert!(env.dirty());

    let saved = env.save_script("").unwrap();
    assert!(!env.dirty());
    assert_eq!(saved.id, "greeter");
    assert_eq!(saved.autorun, 1);
    assert_eq!(saved.notes, "greets");

    let reloaded = store.get_script("greeter").unwrap();
    assert!(reloaded.code.starts_with("print hello\n// Added on "));
    assert!(reloaded.code.ends_with("\nprint again"));

    // The appended source still runs cleanly from scratch
    env.restart().unwrap();
    assert_eq!(executor.runs(), 3);
}

#[test]
fn test_save_under_new_id_creates_record() {
    let (_temp, store, registry, _) = registry_with_dir_store();
    let env = registry.create_environment("print x", None);

    let saved = env.save_script("copy").unwrap();
    assert_eq!(saved.autorun, AUTORUN_NEVER);
    assert_eq!(env.script_id().as_deref(), Some("copy"));
    assert_eq!(store.get_script("copy").unwrap().code, "print x");
}

#[test]
fn test_save_with_invalid_id_is_store_error() {
    let (_temp, _store, registry, _) = registry_with_dir_store();
    let env = registry.create_environment("print x", None);
    env.execute("print y", true).unwrap();

    assert!(matches!(env.save_script("../evil"), Err(Error::Store(_))));
    assert!(env.dirty());
}

#[test]
fn test_autorun_from_dir_store() {
    let (_temp, store, registry, executor) = registry_with_dir_store();
    for (id, level) in [("one", 0), ("two", 0), ("later", 1), ("never", AUTORUN_NEVER)] {
        store
            .store_script(&Script::new(id).with_autorun(level).with_code("print hi"))
            .unwrap();
    }

    let (sink, captured) = capture_sink();
    registry.start_autorun(0, false, Some(sink)).unwrap();

    assert_eq!(executor.runs(), 2);
    assert_eq!(captured.lock().unwrap().len(), 2);
    let mut bound: Vec<String> = registry
        .list_all()
        .values()
        .filter_map(|e| e.script_id())
        .collect();
    bound.sort();
    assert_eq!(bound, vec!["one", "two"]);
}

#[test]
fn test_concurrent_suspend_stops_run_without_blocking_others() {
    let (_temp, _store, registry, _) = registry_with_dir_store();
    let spinner = registry.create_environment("spin", None);
    let other = registry.create_environment("print side", None);

    let running = spinner.clone();
    let handle = thread::spawn(move || running.start());

    let deadline = Instant::now() + Duration::from_secs(5);
    while !spinner.started() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }

    // Unrelated environments and registry operations proceed while spin runs
    other.start().unwrap();
    assert_eq!(registry.list_all().len(), 2);

    spinner.suspend().unwrap();
    let result = handle.join().unwrap();
    assert!(matches!(result, Err(Error::Exec(ExecError::Cancelled))));

    // Fragments resume the suspended environment against the same namespace
    spinner.execute("set resumed yes", false).unwrap();
    assert!(!spinner.suspended());
    assert_eq!(
        spinner.namespace().get("resumed"),
        Some(Value::from("yes"))
    );
}

#[test]
fn test_remove_cancels_in_flight_run() {
    let (_temp, _store, registry, _) = registry_with_dir_store();
    let env = registry.create_environment("spin", None);

    let running = env.clone();
    let handle = thread::spawn(move || running.start());
    while !env.started() {
        thread::sleep(Duration::from_millis(1));
    }

    registry.remove(&env);
    assert!(registry.lookup(env.id()).is_none());
    assert!(handle.join().unwrap().unwrap_err().is_cancelled());
}

struct GreetingPackage;

impl PackageConfigurator for GreetingPackage {
    fn configure_packages(&self, functions: &mut FunctionBindings, _types: &mut TypeBindings) {
        functions
            .entry("integration_greeting".to_string())
            .or_default()
            .insert(
                "hello".to_string(),
                Arc::new(|_: &[Value]| -> Result<Value, ExecError> { Ok(Value::from("hello")) }),
            );
    }
}

#[test]
fn test_configurator_is_process_wide() {
    let executor = Arc::new(LineExecutor::default());
    let _configured = Registry::builder(executor.clone())
        .with_configurator(GreetingPackage)
        .build();

    // A registry built without the configurator still sees the bindings
    let plain = Registry::builder(executor).build();
    let env = plain.create_environment("call integration_greeting.hello", None);
    assert_eq!(env.start().unwrap(), Value::from("hello"));
}

#[test]
fn test_sink_error_surfaces_from_start() {
    let registry = Registry::builder(Arc::new(LineExecutor::default())).build();
    let sink: scriptorium_host::OutputSink = Arc::new(
        |_: &scriptorium_host::Environment, msg: &str| -> anyhow::Result<()> {
            anyhow::ensure!(msg != "stop", "sink refused {msg}");
            Ok(())
        },
    );
    let env = registry.create_environment("print ok\nprint stop\nset unreachable 1", Some(sink));

    let err = env.start().unwrap_err();
    assert!(err.to_string().contains("sink refused stop"));
    assert_eq!(env.namespace().get("unreachable"), None);
}
