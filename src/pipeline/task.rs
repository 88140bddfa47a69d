//! Background worker for one conversion

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{ConvertError, Result};
use crate::models::BuildResult;

use super::{ChannelSink, ConversionPipeline, ConversionRequest, ProgressEvent};

/// Submits conversions to the blocking thread pool
pub struct ConversionTask;

impl ConversionTask {
    /// Start a run on a blocking worker. Must be called inside a tokio runtime.
    pub fn spawn(config: Config, request: ConversionRequest) -> ConversionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let pipeline = ConversionPipeline::new(config, Arc::new(ChannelSink::new(tx)))
            .with_cancellation(cancel.clone());

        let join = tokio::task::spawn_blocking(move || pipeline.run(&request));

        ConversionHandle {
            events: rx,
            cancel,
            join,
        }
    }
}

/// Caller side of a running conversion
pub struct ConversionHandle {
    events: UnboundedReceiver<ProgressEvent>,
    cancel: CancellationToken,
    join: JoinHandle<Result<BuildResult>>,
}

impl ConversionHandle {
    /// Request cancellation; observed at the next stage boundary or tool poll
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token shared with the worker
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next progress event; `None` once the worker has finished
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    /// Wait for the final result
    pub async fn wait(self) -> Result<BuildResult> {
        self.join
            .await
            .map_err(|e| ConvertError::Other(format!("Conversion worker failed: {}", e)))?
    }
}
