//! The process-wide panic hook lives in its own test binary.

use resilient_api_client::logging::{LogLevel, LoggerConfig, MemoryTransport};
use resilient_api_client::{ErrorDispatcher, ErrorKind, StructuredLogger};
use std::sync::{Arc, Mutex};

#[test]
fn test_panic_hook_logs_fatal_and_runs_fallback() {
    let memory = MemoryTransport::new("memory");
    let logger = StructuredLogger::with_config(
        "worker",
        LoggerConfig::new()
            .with_level(LogLevel::Error)
            .with_transports(vec![Arc::new(memory.clone())]),
    );
    let dispatcher = ErrorDispatcher::new(logger);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    dispatcher.set_fallback_handler(move |err, ctx| {
        let source = ctx.and_then(|c| c.get("source")).cloned();
        sink.lock().unwrap().push((err.kind(), err.to_string(), source));
    });
    dispatcher.install_panic_hook();

    let outcome = std::panic::catch_unwind(|| panic!("worker exploded"));
    assert!(outcome.is_err());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, ErrorKind::Unhandled);
    assert_eq!(seen[0].1, "panic: worker exploded");
    assert_eq!(seen[0].2, Some(serde_json::json!("panic_hook")));

    let fatal: Vec<_> = memory
        .entries()
        .into_iter()
        .filter(|e| e.level == LogLevel::Fatal)
        .collect();
    assert_eq!(fatal.len(), 1);
    assert_eq!(fatal[0].message, "Uncaught panic");
    assert_eq!(fatal[0].data.as_ref().unwrap()["message"], "worker exploded");
}
