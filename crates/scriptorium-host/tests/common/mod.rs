// Shared helpers for the registry integration tests

use std::sync::{Arc, Mutex};

use scriptorium_host::{Environment, OutputSink};

#[allow(dead_code)]
#[path = "../../src/testing.rs"]
mod testing;

pub use testing::LineExecutor;

/// A sink that records every message along with the emitting environment's id
pub fn capture_sink() -> (OutputSink, Arc<Mutex<Vec<(u64, String)>>>) {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let out = captured.clone();
    let sink: OutputSink = Arc::new(move |env: &Environment, msg: &str| -> anyhow::Result<()> {
        out.lock().unwrap().push((env.id().get(), msg.to_string()));
        Ok(())
    });
    (sink, captured)
}
