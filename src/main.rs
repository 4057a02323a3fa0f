//! Purpose: `hello-loopback` entry point.
//! Role: Binary crate root; binds the loopback server, then requests it forever.
//! Invariants: stdout carries only native greeting lines; diagnostics go to stderr.
//! Invariants: The process exits only on a fatal startup error (listen or runtime failure).
//! Invariants: Process exit code is derived from `to_exit_code`.
use std::convert::Infallible;
use std::error::Error as StdError;
use std::io::{self, IsTerminal};

use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

use hello_loopback::core::error::{Error, ErrorKind, to_exit_code};
use hello_loopback::driver::LoopbackDriver;
use hello_loopback::server::LoopbackServer;

fn main() {
    let err = match run() {
        Ok(never) => match never {},
        Err(err) => err,
    };
    emit_error(&err);
    std::process::exit(to_exit_code(err.kind()));
}

fn run() -> Result<Infallible, Error> {
    init_tracing();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| {
            Error::new(ErrorKind::Runtime)
                .with_message("failed to start runtime")
                .with_source(err)
        })?;

    let server = runtime.block_on(async {
        let server = LoopbackServer::bind().await?;
        Ok::<_, Error>(server.spawn())
    })?;
    tracing::info!(addr = %server.local_addr(), "loopback server listening");

    let driver = LoopbackDriver::new(server.local_addr())?;
    driver.run_forever()
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    err.message()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:?}", err.kind()))
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut current = err.source();
    while let Some(source) = current {
        causes.push(source.to_string());
        current = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(addr) = err.addr() {
        inner.insert("addr".to_string(), json!(addr.to_string()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(addr) = err.addr() {
        lines.push(format!("addr: {addr}"));
    }
    for cause in error_causes(err) {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}
