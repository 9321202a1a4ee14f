// Runs real `sh` children through a registry; Unix only
#![cfg(unix)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use scriptorium_host::{Environment, Error, ExecError, OutputSink, Registry, Value};
use scriptorium_process::ProcessExecutor;

fn registry() -> Registry {
    Registry::builder(Arc::new(
        ProcessExecutor::default().with_poll_interval(Duration::from_millis(5)),
    ))
    .build()
}

fn capture_sink() -> (OutputSink, Arc<Mutex<String>>) {
    let captured = Arc::new(Mutex::new(String::new()));
    let out = captured.clone();
    let sink: OutputSink = Arc::new(move |_: &Environment, msg: &str| -> anyhow::Result<()> {
        out.lock().unwrap().push_str(msg);
        Ok(())
    });
    (sink, captured)
}

#[test]
fn test_stdout_goes_to_sink() {
    let (sink, captured) = capture_sink();
    let env = registry().create_environment("echo one; echo two", Some(sink));

    assert_eq!(env.start().unwrap(), Value::Int(0));
    assert_eq!(*captured.lock().unwrap(), "one\ntwo\n");
}

#[test]
fn test_variables_carry_between_fragments() {
    let (sink, captured) = capture_sink();
    let env = registry().create_environment("echo '::set GREETING=hi there'", Some(sink));
    env.start().unwrap();
    assert_eq!(
        env.namespace().get("GREETING"),
        Some(Value::from("hi there"))
    );

    env.execute("echo \"$GREETING again\"", true).unwrap();
    assert_eq!(*captured.lock().unwrap(), "hi there again\n");
}

#[test]
fn test_nonzero_exit_is_runtime_error() {
    let env = registry().create_environment("exit 3", None);
    let err = env.start().unwrap_err();
    assert!(matches!(err, Error::Exec(ExecError::Runtime(_))));
    assert!(err.to_string().contains("status 3"));
}

#[test]
fn test_suspend_kills_child() {
    let env = registry().create_environment("sleep 30", None);
    let running = env.clone();
    let started_at = Instant::now();
    let handle = thread::spawn(move || running.start());

    while !env.started() {
        thread::sleep(Duration::from_millis(1));
    }
    thread::sleep(Duration::from_millis(50));
    env.suspend().unwrap();

    let result = handle.join().unwrap();
    assert!(result.unwrap_err().is_cancelled());
    assert!(started_at.elapsed() < Duration::from_secs(10));
}

#[test]
fn test_sink_error_stops_child() {
    let sink: OutputSink = Arc::new(|_: &Environment, _: &str| -> anyhow::Result<()> {
        anyhow::bail!("closed")
    });
    let env = registry().create_environment("echo first; sleep 30", Some(sink));

    let started_at = Instant::now();
    let err = env.start().unwrap_err();
    assert!(matches!(err, Error::Exec(ExecError::Sink(_))));
    assert!(started_at.elapsed() < Duration::from_secs(10));
}
