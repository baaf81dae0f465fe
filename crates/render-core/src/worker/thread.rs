//! Worker message loop

use crossbeam::channel::{Receiver, Sender};

use super::engine::{EngineError, EngineSetup, RenderEngine};
use crate::protocol::{HostMessage, RenderParams, RenderResult, WorkerMessage};
use crate::types::{ChannelId, Sample, WorkerId};

/// Run a worker until it receives `shutdown` or the coordinator goes away
pub(super) fn run_worker(
    id: WorkerId,
    mut engine: Box<dyn RenderEngine>,
    rx: Receiver<HostMessage>,
    tx: Sender<WorkerMessage>,
) {
    log::info!("Render {} started", id);

    let mut setup: Option<EngineSetup> = None;

    while let Ok(message) = rx.recv() {
        let reply = match message {
            HostMessage::Init {
                worker_id,
                bootstrap_data,
                render_ahead_seconds,
                retention_seconds,
                sample_rate,
                block_size,
                num_workers,
            } => {
                let candidate = EngineSetup {
                    worker_id,
                    sample_rate,
                    block_size: block_size.max(1),
                    render_ahead_seconds,
                    retention_seconds,
                    num_workers,
                };
                match engine.bootstrap(&bootstrap_data, &candidate) {
                    Ok(()) => {
                        log::debug!(
                            "{} bootstrapped ({} bytes, {}Hz, quantum {})",
                            id,
                            bootstrap_data.len(),
                            sample_rate,
                            candidate.block_size
                        );
                        setup = Some(candidate);
                        WorkerMessage::WorkerInit { worker_id: id }
                    }
                    Err(e) => {
                        log::error!("{} failed to bootstrap: {}", id, e);
                        setup = None;
                        WorkerMessage::InitError {
                            worker_id: id,
                            error: e.to_string(),
                        }
                    }
                }
            }

            HostMessage::Job {
                job_id,
                channel_id,
                start_frame,
                block_size,
                params,
            } => {
                let rendered = match &setup {
                    Some(setup) => render_job(
                        engine.as_mut(),
                        setup.block_size,
                        channel_id,
                        start_frame,
                        block_size,
                        &params,
                    ),
                    None => Err(EngineError::NotBootstrapped),
                };
                let result = match rendered {
                    Ok(samples) => RenderResult::ok(id, job_id, channel_id, samples),
                    Err(e) => RenderResult::failed(id, job_id, channel_id, e.to_string()),
                };
                result.into_message()
            }

            HostMessage::Shutdown => break,
        };

        if tx.send(reply).is_err() {
            log::debug!("{}: coordinator disconnected", id);
            return;
        }
    }

    let _ = tx.send(WorkerMessage::WorkerStopped { worker_id: id });
    log::info!("Render {} stopped", id);
}

/// Render `frames` frames as consecutive engine quanta
fn render_job(
    engine: &mut dyn RenderEngine,
    quantum: u32,
    channel: ChannelId,
    start_frame: u64,
    frames: u32,
    params: &RenderParams,
) -> Result<Vec<Sample>, EngineError> {
    let quantum = quantum as usize;
    let mut samples = vec![0.0; frames as usize];
    for (i, block) in samples.chunks_mut(quantum).enumerate() {
        let block_start = start_frame + (i * quantum) as u64;
        engine.render_block(channel, block_start, params, block)?;
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::SilenceEngine;
    use crate::types::JobId;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts render_block calls and writes the block start as the sample value
    struct CountingEngine {
        calls: Arc<AtomicUsize>,
    }

    impl RenderEngine for CountingEngine {
        fn bootstrap(&mut self, _data: &[u8], _setup: &EngineSetup) -> Result<(), EngineError> {
            Ok(())
        }

        fn render_block(
            &mut self,
            _channel: ChannelId,
            start_frame: u64,
            _params: &RenderParams,
            out: &mut [Sample],
        ) -> Result<(), EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            out.fill(start_frame as Sample);
            Ok(())
        }
    }

    fn init_message(block_size: u32) -> HostMessage {
        HostMessage::Init {
            worker_id: WorkerId(0),
            bootstrap_data: Arc::from(Vec::<u8>::new()),
            render_ahead_seconds: 1.0,
            retention_seconds: 4.0,
            sample_rate: 48000,
            block_size,
            num_workers: 1,
        }
    }

    fn spawn(engine: Box<dyn RenderEngine>) -> (Sender<HostMessage>, Receiver<WorkerMessage>) {
        let (host_tx, host_rx) = crossbeam::channel::unbounded();
        let (worker_tx, worker_rx) = crossbeam::channel::unbounded();
        std::thread::spawn(move || run_worker(WorkerId(0), engine, host_rx, worker_tx));
        (host_tx, worker_rx)
    }

    #[test]
    fn test_job_rendered_in_quanta() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = spawn(Box::new(CountingEngine { calls: calls.clone() }));

        tx.send(init_message(128)).unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            WorkerMessage::WorkerInit { worker_id: WorkerId(0) }
        );

        tx.send(HostMessage::Job {
            job_id: JobId(1),
            channel_id: ChannelId(0),
            start_frame: 1000,
            block_size: 300,
            params: RenderParams::default(),
        })
        .unwrap();

        let result = RenderResult::from_message(rx.recv_timeout(Duration::from_secs(5)).unwrap()).unwrap();
        assert!(result.is_ok());
        assert_eq!(result.samples.len(), 300);
        // 128 + 128 + 44
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.samples[0], 1000.0);
        assert_eq!(result.samples[128], 1128.0);
        assert_eq!(result.samples[299], 1256.0);

        tx.send(HostMessage::Shutdown).unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            WorkerMessage::WorkerStopped { worker_id: WorkerId(0) }
        );
    }

    #[test]
    fn test_job_before_init_fails() {
        let (tx, rx) = spawn(Box::new(SilenceEngine));
        tx.send(HostMessage::Job {
            job_id: JobId(7),
            channel_id: ChannelId(1),
            start_frame: 0,
            block_size: 64,
            params: RenderParams::default(),
        })
        .unwrap();

        let result = RenderResult::from_message(rx.recv_timeout(Duration::from_secs(5)).unwrap()).unwrap();
        assert_eq!(result.job, JobId(7));
        assert!(!result.is_ok());
    }
}
