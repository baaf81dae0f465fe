//! The engine interface a worker hosts
//!
//! What happens inside an engine (synthesis, mixing graph, effects) is not
//! this crate's business. A worker only needs to bootstrap it once and ask
//! it for blocks of samples.

use std::f64::consts::TAU;
use std::sync::Arc;

use thiserror::Error;

use crate::protocol::RenderParams;
use crate::types::{ChannelId, Sample, WorkerId};

/// Errors reported by an engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Engine bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("Engine render failed: {0}")]
    Render(String),

    #[error("Engine received a job before init")]
    NotBootstrapped,
}

/// Settings delivered with `init`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSetup {
    pub worker_id: WorkerId,
    pub sample_rate: u32,
    /// Frames per `render_block` call
    pub block_size: u32,
    pub render_ahead_seconds: f64,
    pub retention_seconds: f64,
    pub num_workers: u32,
}

/// An independently instantiated audio-processing engine
///
/// Implementations are driven from a single worker thread and never shared.
pub trait RenderEngine: Send {
    /// Instantiate the engine from the opaque bootstrap payload
    fn bootstrap(&mut self, data: &[u8], setup: &EngineSetup) -> Result<(), EngineError>;

    /// Render `out.len()` frames of `channel` starting at `start_frame`
    ///
    /// `out.len()` is at most the setup's `block_size`.
    fn render_block(
        &mut self,
        channel: ChannelId,
        start_frame: u64,
        params: &RenderParams,
        out: &mut [Sample],
    ) -> Result<(), EngineError>;
}

/// Creates the engine for each worker
pub type EngineFactory = Arc<dyn Fn(WorkerId) -> Box<dyn RenderEngine> + Send + Sync>;

/// Wrap a constructor for a concrete engine type as an [`EngineFactory`]
pub fn engine_factory<E, F>(make: F) -> EngineFactory
where
    E: RenderEngine + 'static,
    F: Fn(WorkerId) -> E + Send + Sync + 'static,
{
    Arc::new(move |id: WorkerId| Box::new(make(id)) as Box<dyn RenderEngine>)
}

/// Engine that renders silence
#[derive(Debug, Default)]
pub struct SilenceEngine;

impl RenderEngine for SilenceEngine {
    fn bootstrap(&mut self, _data: &[u8], _setup: &EngineSetup) -> Result<(), EngineError> {
        Ok(())
    }

    fn render_block(
        &mut self,
        _channel: ChannelId,
        _start_frame: u64,
        _params: &RenderParams,
        out: &mut [Sample],
    ) -> Result<(), EngineError> {
        out.fill(0.0);
        Ok(())
    }
}

/// Engine that renders a sine per channel (channel `n` at `base_hz * (n + 1)`)
///
/// Phase is derived from the absolute frame index, so any worker can render
/// any block and consecutive blocks join without discontinuities.
#[derive(Debug)]
pub struct ToneEngine {
    base_hz: f64,
    amplitude: f64,
    sample_rate: Option<u32>,
}

impl ToneEngine {
    pub fn new(base_hz: f64, amplitude: f64) -> Self {
        Self {
            base_hz,
            amplitude,
            sample_rate: None,
        }
    }
}

impl Default for ToneEngine {
    fn default() -> Self {
        Self::new(220.0, 0.2)
    }
}

impl RenderEngine for ToneEngine {
    fn bootstrap(&mut self, _data: &[u8], setup: &EngineSetup) -> Result<(), EngineError> {
        if setup.sample_rate == 0 {
            return Err(EngineError::Bootstrap("sample rate is zero".to_string()));
        }
        self.sample_rate = Some(setup.sample_rate);
        Ok(())
    }

    fn render_block(
        &mut self,
        channel: ChannelId,
        start_frame: u64,
        _params: &RenderParams,
        out: &mut [Sample],
    ) -> Result<(), EngineError> {
        let sample_rate = self.sample_rate.ok_or(EngineError::NotBootstrapped)? as f64;
        let freq = self.base_hz * (channel.0 as f64 + 1.0);
        for (i, sample) in out.iter_mut().enumerate() {
            // Wrap the frame index per period to keep precision on long sessions
            let t = ((start_frame + i as u64) as f64 * freq / sample_rate).fract();
            *sample = (self.amplitude * (TAU * t).sin()) as Sample;
        }
        Ok(())
    }
}
