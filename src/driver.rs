//! Purpose: Drive the loopback server by requesting it from the same process, forever.
//! Exports: `LoopbackDriver`, `loopback_url`.
//! Role: Blocking HTTP client loop on the caller's thread (ureq).
//! Invariants: Target URL is `http://<bound addr>/`; built once per driver.
//! Invariants: `run_forever` never returns; responses and errors are discarded.
use std::io;
use std::net::SocketAddr;

use url::Url;

use crate::core::error::{Error, ErrorKind};

pub fn loopback_url(addr: SocketAddr) -> Result<Url, Error> {
    Url::parse(&format!("http://{addr}/")).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("invalid loopback url")
            .with_addr(addr)
            .with_source(err)
    })
}

pub struct LoopbackDriver {
    agent: ureq::Agent,
    url: Url,
}

impl LoopbackDriver {
    pub fn new(addr: SocketAddr) -> Result<Self, Error> {
        Ok(Self {
            agent: ureq::AgentBuilder::new().build(),
            url: loopback_url(addr)?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Issues one blocking GET and returns the response status.
    ///
    /// Error statuses still count as a completed request; only transport failures are errors.
    pub fn request_once(&self) -> Result<u16, Error> {
        let response = match self.agent.get(self.url.as_str()).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(err)) => {
                return Err(Error::new(ErrorKind::Io)
                    .with_message("loopback request failed")
                    .with_source(err));
            }
        };
        let status = response.status();
        // Reading to EOF hands the connection back to the agent's pool.
        let mut body = response.into_reader();
        let _ = io::copy(&mut body, &mut io::sink());
        Ok(status)
    }

    pub fn run_forever(&self) -> ! {
        loop {
            if let Err(err) = self.request_once() {
                tracing::trace!(error = %err, "discarded loopback request failure");
            }
        }
    }
}
