//! In-process engine worker: one background thread fed over a channel.
//!
//! Requests run one at a time, to completion, in the order they were posted.
//! The caller never blocks on computation; it only blocks when it asks for a
//! response.

use crate::dispatch::Dispatcher;
use crate::protocol::Response;
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use tracing::debug;

enum Envelope {
    Message(Value),
    Shutdown,
}

pub struct EngineWorker {
    requests: Sender<Envelope>,
    responses: Receiver<Response>,
    handle: Option<JoinHandle<()>>,
}

impl EngineWorker {
    pub fn spawn() -> Result<Self> {
        let (requests, inbox) = mpsc::channel::<Envelope>();
        let (outbox, responses) = mpsc::channel::<Response>();

        let handle = thread::Builder::new()
            .name("graph-engine".to_string())
            .spawn(move || {
                let dispatcher = Dispatcher::default();
                for envelope in inbox {
                    let message = match envelope {
                        Envelope::Message(message) => message,
                        Envelope::Shutdown => break,
                    };
                    let Some(response) = dispatcher.handle(&message) else {
                        debug!("ignored message of unknown kind");
                        continue;
                    };
                    if outbox.send(response).is_err() {
                        break;
                    }
                }
                debug!("engine worker stopped");
            })
            .context("failed to spawn engine worker thread")?;

        Ok(Self {
            requests,
            responses,
            handle: Some(handle),
        })
    }

    /// Queues a message. Returns as soon as it is queued.
    pub fn post(&self, message: Value) -> Result<()> {
        self.requests
            .send(Envelope::Message(message))
            .map_err(|_| anyhow!("engine worker has stopped"))
    }

    /// Blocks until the next response is available.
    pub fn recv(&self) -> Result<Response> {
        self.responses.recv().context("engine worker has stopped")
    }

    /// The next response if one is ready.
    pub fn try_recv(&self) -> Result<Option<Response>> {
        match self.responses.try_recv() {
            Ok(response) => Ok(Some(response)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(anyhow!("engine worker has stopped")),
        }
    }
}

impl Drop for EngineWorker {
    fn drop(&mut self) {
        let _ = self.requests.send(Envelope::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
