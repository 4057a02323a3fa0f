//! Purpose: End-to-end tests for the `hello-loopback` binary.
//! Exports: None (integration test module).
//! Role: Validate stdout greeting lines, liveness, and teardown of the real process.
//! Invariants: Bounded waits avoid test flakiness.
//! Invariants: Child processes are killed and reaped on drop.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle, sleep};
use std::time::{Duration, Instant};

const GREETING_LINE: &[u8] = b"Hello from C\n";

struct Running {
    child: Child,
}

impl Running {
    fn spawn() -> Self {
        Self::spawn_with_args(&[])
    }

    fn spawn_with_args(args: &[&str]) -> Self {
        Self::spawn_with(args, None)
    }

    fn spawn_with_log_filter(filter: &str) -> Self {
        Self::spawn_with(&[], Some(filter))
    }

    fn spawn_with(args: &[&str], log_filter: Option<&str>) -> Self {
        let mut command = Command::new(env!("CARGO_BIN_EXE_hello-loopback"));
        command
            .args(args)
            .env_remove("RUST_LOG")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(filter) = log_filter {
            command.env("RUST_LOG", filter);
        }
        let child = command.spawn().expect("spawn");
        Self { child }
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn read_lines(stream: impl Read + Send + 'static) -> (Receiver<Vec<u8>>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel();
    let reader = thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        loop {
            let mut line = Vec::new();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    });
    (rx, reader)
}

fn drain(rx: &Receiver<Vec<u8>>) -> usize {
    let mut count = 0;
    for line in rx.try_iter() {
        assert_eq!(line, GREETING_LINE, "unexpected stdout line");
        count += 1;
    }
    count
}

#[test]
fn prints_greetings_and_keeps_running() {
    let mut running = Running::spawn();
    let stdout = running.child.stdout.take().expect("stdout");
    let (lines, reader) = read_lines(stdout);

    let first = lines
        .recv_timeout(Duration::from_secs(10))
        .expect("first greeting");
    assert_eq!(first, GREETING_LINE);

    sleep(Duration::from_millis(100));
    assert!(running.child.try_wait().expect("try_wait").is_none());
    let early = drain(&lines);

    sleep(Duration::from_millis(200));
    assert!(running.child.try_wait().expect("try_wait").is_none());
    let later = drain(&lines);
    assert!(
        early + later > 0,
        "no greetings after the first within 300ms"
    );

    running.child.kill().expect("kill");
    let status = running.child.wait().expect("wait");
    assert!(!status.success());

    let deadline = Instant::now() + Duration::from_secs(5);
    while !reader.is_finished() {
        assert!(Instant::now() < deadline, "stdout reader did not finish");
        sleep(Duration::from_millis(10));
    }
    reader.join().expect("reader");
    drain(&lines);
}

#[test]
fn announces_listen_address_on_stderr_only() {
    let mut running = Running::spawn();
    let stdout = running.child.stdout.take().expect("stdout");
    let stderr = running.child.stderr.take().expect("stderr");
    let (out_lines, _out_reader) = read_lines(stdout);
    let (err_lines, _err_reader) = read_lines(stderr);

    let deadline = Instant::now() + Duration::from_secs(10);
    let announced = loop {
        assert!(Instant::now() < deadline, "no listen announcement on stderr");
        match err_lines.recv_timeout(Duration::from_millis(100)) {
            Ok(line) => {
                let text = String::from_utf8_lossy(&line).to_string();
                if text.contains("loopback server listening") {
                    break text;
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => panic!("stderr closed early"),
        }
    };
    assert!(announced.contains("127.0.0.1:"));

    out_lines
        .recv_timeout(Duration::from_secs(10))
        .expect("greeting");
    drain(&out_lines);
}

#[test]
fn ignores_command_line_arguments() {
    let mut running = Running::spawn_with_args(&["--help", "extra"]);
    let stdout = running.child.stdout.take().expect("stdout");
    let (lines, _reader) = read_lines(stdout);

    let first = lines
        .recv_timeout(Duration::from_secs(10))
        .expect("first greeting");
    assert_eq!(first, GREETING_LINE);
    assert!(running.child.try_wait().expect("try_wait").is_none());
}

#[test]
fn one_greeting_line_per_handled_request() {
    let mut running = Running::spawn_with_log_filter("tower_http=debug");
    let stdout = running.child.stdout.take().expect("stdout");
    let stderr = running.child.stderr.take().expect("stderr");
    let (out_lines, out_reader) = read_lines(stdout);
    let (err_lines, err_reader) = read_lines(stderr);

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut greetings = 0;
    while greetings < 50 {
        assert!(
            Instant::now() < deadline,
            "only {greetings} greetings within 10s"
        );
        if let Ok(line) = out_lines.recv_timeout(Duration::from_millis(100)) {
            assert_eq!(line, GREETING_LINE);
            greetings += 1;
        }
    }

    running.child.kill().expect("kill");
    running.child.wait().expect("wait");
    out_reader.join().expect("stdout reader");
    err_reader.join().expect("stderr reader");

    greetings += drain(&out_lines);
    let responses = err_lines
        .try_iter()
        .filter(|line| String::from_utf8_lossy(line).contains("finished processing request"))
        .count();

    // The driver is sequential, so at most one greeting can precede its response event at kill time.
    assert!(responses > 0, "no response events on stderr");
    assert!(
        greetings == responses || greetings == responses + 1,
        "greetings: {greetings}, responses: {responses}"
    );
}
