//! Wire messages and their JSON codec

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::job::RenderParams;
use crate::types::{ChannelId, JobId, Sample, WorkerId};

/// Messages sent from the coordinator to a worker render unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// Bootstrap the worker's engine and configure its buffer timings
    ///
    /// The worker answers with `worker_init` or `init_error`.
    #[serde(rename_all = "camelCase")]
    Init {
        worker_id: WorkerId,
        /// Opaque engine payload from the asset-delivery collaborator
        bootstrap_data: Arc<[u8]>,
        render_ahead_seconds: f64,
        retention_seconds: f64,
        sample_rate: u32,
        /// Engine quantum: jobs are rendered in sub-blocks of this many frames
        block_size: u32,
        num_workers: u32,
    },

    /// Render `block_size` frames of `channel_id` starting at `start_frame`
    #[serde(rename_all = "camelCase")]
    Job {
        job_id: JobId,
        channel_id: ChannelId,
        start_frame: u64,
        block_size: u32,
        params: RenderParams,
    },

    /// Drop all resources and exit; the worker answers with `worker_stopped`
    Shutdown,
}

/// Messages sent from a worker render unit back to the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Engine bootstrapped, ready for jobs
    #[serde(rename_all = "camelCase")]
    WorkerInit { worker_id: WorkerId },

    /// Engine failed to bootstrap
    #[serde(rename_all = "camelCase")]
    InitError { worker_id: WorkerId, error: String },

    /// Answer to one `job`: exactly one of `samples` / `error` is set
    #[serde(rename_all = "camelCase")]
    Result {
        worker_id: WorkerId,
        job_id: JobId,
        channel_id: ChannelId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        samples: Option<Vec<Sample>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Worker left its message loop
    #[serde(rename_all = "camelCase")]
    WorkerStopped { worker_id: WorkerId },

    /// Any `type` tag this version doesn't know. Logged and ignored.
    #[serde(other)]
    Unrecognized,
}

impl WorkerMessage {
    /// The `type` tag of this message
    pub fn tag(&self) -> &'static str {
        match self {
            WorkerMessage::WorkerInit { .. } => "worker_init",
            WorkerMessage::InitError { .. } => "init_error",
            WorkerMessage::Result { .. } => "result",
            WorkerMessage::WorkerStopped { .. } => "worker_stopped",
            WorkerMessage::Unrecognized => "unrecognized",
        }
    }
}

/// Failure to encode or decode a wire message
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Encode a message as JSON
pub fn encode<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(ProtocolError::Encode)
}

/// Decode a JSON message from a worker
///
/// Unknown `type` tags decode to [`WorkerMessage::Unrecognized`] rather than
/// failing, so newer workers can't break an older coordinator.
pub fn decode_worker_message(text: &str) -> Result<WorkerMessage, ProtocolError> {
    serde_json::from_str(text).map_err(ProtocolError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_message_shape() {
        let message = HostMessage::Init {
            worker_id: WorkerId(1),
            bootstrap_data: Arc::from(&b"\0asm"[..]),
            render_ahead_seconds: 1.0,
            retention_seconds: 4.0,
            sample_rate: 48000,
            block_size: 128,
            num_workers: 2,
        };
        let value: serde_json::Value = serde_json::from_str(&encode(&message).unwrap()).unwrap();
        assert_eq!(value["type"], "init");
        assert_eq!(value["workerId"], 1);
        assert_eq!(value["renderAheadSeconds"], 1.0);
        assert_eq!(value["retentionSeconds"], 4.0);
        assert_eq!(value["sampleRate"], 48000);
        assert_eq!(value["bootstrapData"].as_array().map(|a| a.len()), Some(4));
    }

    #[test]
    fn test_job_message_shape() {
        let message = HostMessage::Job {
            job_id: JobId(12),
            channel_id: ChannelId(0),
            start_frame: 96000,
            block_size: 48000,
            params: RenderParams { state_generation: 3 },
        };
        let value: serde_json::Value = serde_json::from_str(&encode(&message).unwrap()).unwrap();
        assert_eq!(value["type"], "job");
        assert_eq!(value["jobId"], 12);
        assert_eq!(value["channelId"], 0);
        assert_eq!(value["startFrame"], 96000);
        assert_eq!(value["blockSize"], 48000);
        assert_eq!(value["params"]["stateGeneration"], 3);
    }

    #[test]
    fn test_decode_worker_init() {
        let message = decode_worker_message(r#"{"type":"worker_init","workerId":3}"#).unwrap();
        assert_eq!(message, WorkerMessage::WorkerInit { worker_id: WorkerId(3) });
        assert_eq!(message.tag(), "worker_init");
    }

    #[test]
    fn test_decode_result_with_error() {
        let message = decode_worker_message(
            r#"{"type":"result","workerId":0,"jobId":4,"channelId":1,"error":"out of memory"}"#,
        )
        .unwrap();
        match message {
            WorkerMessage::Result { samples, error, .. } => {
                assert!(samples.is_none());
                assert_eq!(error.as_deref(), Some("out of memory"));
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_not_fatal() {
        let message = decode_worker_message(r#"{"type":"progress"}"#).unwrap();
        assert_eq!(message, WorkerMessage::Unrecognized);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(matches!(
            decode_worker_message("not json"),
            Err(ProtocolError::Decode(_))
        ));
    }
}
