//! `RunHandle` (§4.1): the lazy, finite sequence of demultiplexed events plus the mid-run
//! `Answer`/`Close` operations. The driving task is grounded on `serve::run::handle_run`'s
//! spawn-task-plus-channel dispatch: a background task drives the runtime stream while this
//! handle exposes only the homogenized event channel to the caller.

use agento_protocol::RunEvent;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::runtime::RunError;

pub struct RunHandle {
    pub events: mpsc::Receiver<RunEvent>,
    answers: mpsc::Sender<Value>,
    driver: JoinHandle<()>,
}

impl RunHandle {
    pub(crate) fn new(events: mpsc::Receiver<RunEvent>, answers: mpsc::Sender<Value>, driver: JoinHandle<()>) -> Self {
        Self { events, answers, driver }
    }

    /// Re-injects a payload into the runtime's inbound channel in response to
    /// `user_input_required` (§4.1).
    pub async fn answer(&self, payload: Value) -> Result<(), RunError> {
        self.answers.send(payload).await.map_err(|_| RunError::NoActiveRun)
    }

    /// Clones the inbound answer sender so a caller can hand it to a separate task (e.g. an HTTP
    /// handler that outlives the SSE request driving `events`) without retaining the whole handle.
    pub fn answer_sender(&self) -> mpsc::Sender<Value> {
        self.answers.clone()
    }

    /// Cancels the run. The driving task is aborted; any in-flight runtime call is dropped.
    pub fn close(self) {
        self.driver.abort();
    }
}
