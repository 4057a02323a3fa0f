//! Purpose: Library crate behind the `hello-loopback` binary.
//! Exports: `core` (errors), `native` (C greeting bridge), `server`, `driver`.
//! Role: Keeps the binary a thin wiring layer so tests can drive each piece directly.
//! Invariants: Nothing in this crate writes to stdout except the native greeting.
pub mod core;
pub mod driver;
pub mod native;
pub mod server;
