//! render-probe - Run the render pipeline against a tone engine
//!
//! Starts the worker pool, keeps every channel topped up and plays the rings
//! out, either through a simulated device clock or (with the `cpal-output`
//! feature) through the sound card. Prints per-channel counters once a
//! second and on exit.
//!
//! ## Usage
//!
//! ```text
//! render-probe [CONFIG.yaml] [--seconds N] [--device NAME]
//! render-probe [CONFIG.yaml] --list-devices
//! ```
//!
//! `--list-devices` prints the output devices that can run at the
//! configured sample rate and exits.
//!
//! Without a config path, `<config dir>/render-core/pipeline.yaml` is used.
//! A missing or invalid file falls back to the defaults. Set RUST_LOG=debug for job-level logs.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use render_core::config::{default_config_path, PipelineConfig};
use render_core::worker::{engine_factory, ToneEngine};
use render_core::{PipelineEvent, RealtimeOutputDriver, RenderPipeline};

/// Control loop poll interval
const STEP_POLL: Duration = Duration::from_millis(5);

struct Args {
    config_path: Option<PathBuf>,
    seconds: f64,
    device: Option<String>,
    list_devices: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config_path: None,
        seconds: 5.0,
        device: None,
        list_devices: false,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--seconds" => {
                let value = iter.next().context("--seconds needs a value")?;
                args.seconds = value
                    .parse()
                    .with_context(|| format!("Invalid --seconds value '{}'", value))?;
            }
            "--device" => {
                args.device = Some(iter.next().context("--device needs a value")?);
            }
            "--list-devices" => args.list_devices = true,
            other if other.starts_with("--") => bail!("Unknown flag '{}'", other),
            path => args.config_path = Some(PathBuf::from(path)),
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;
    let config_path = args
        .config_path
        .clone()
        .unwrap_or_else(|| default_config_path("pipeline.yaml"));
    let config = PipelineConfig::load(&config_path);

    if args.list_devices {
        return list_devices(config.sample_rate);
    }

    log::info!("render-probe starting up ({}s run)", args.seconds);

    let (mut pipeline, driver) = RenderPipeline::initialize(
        config,
        Vec::<u8>::new(),
        engine_factory(|_| ToneEngine::default()),
    )
    .context("Failed to initialize render pipeline")?;
    let events = pipeline.subscribe();

    let output = start_device(&pipeline, driver, &args)?;

    let started = Instant::now();
    let run_for = Duration::from_secs_f64(args.seconds.max(0.0));
    let mut next_report = started + Duration::from_secs(1);

    while started.elapsed() < run_for {
        pipeline.step(STEP_POLL)?;

        for event in events.try_iter() {
            match event {
                PipelineEvent::Underrun { channel, frames } => {
                    log::debug!("{} underran by {} frames", channel, frames)
                }
                PipelineEvent::RenderFailure {
                    channel, reason, ..
                } => log::warn!("{} render failure: {}", channel, reason),
                other => log::debug!("{:?}", other),
            }
        }

        if Instant::now() >= next_report {
            print_stats(&pipeline);
            next_report += Duration::from_secs(1);
        }
    }

    pipeline.stop();
    drop(output);
    print_stats(&pipeline);
    pipeline.shutdown();
    Ok(())
}

fn print_stats(pipeline: &RenderPipeline) {
    for stats in pipeline.stats() {
        println!(
            "{}: playhead {:>9} headroom {:>6} written {:>9} underrun {:>7} contended {:>5} failures {}",
            stats.channel,
            stats.playhead_frames,
            stats.headroom_frames,
            stats.written_frames,
            stats.underrun_frames,
            stats.contended_frames,
            stats.render_failures
        );
    }
}

#[cfg(feature = "cpal-output")]
fn list_devices(sample_rate: u32) -> Result<()> {
    use render_core::audio::{list_output_devices, AudioError};

    let devices = match list_output_devices(sample_rate) {
        Ok(devices) => devices,
        Err(AudioError::NoDevices) => {
            println!("No output device plays f32 at {}Hz", sample_rate);
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to list output devices"),
    };

    println!("Output devices at {}Hz:", sample_rate);
    for device in devices {
        println!(
            "  {} {} ({} channels)",
            if device.is_default { "*" } else { " " },
            device.id.display_label(),
            device.max_channels
        );
    }
    Ok(())
}

#[cfg(not(feature = "cpal-output"))]
fn list_devices(_sample_rate: u32) -> Result<()> {
    bail!("--list-devices needs the cpal-output feature")
}

#[cfg(feature = "cpal-output")]
fn start_device(
    pipeline: &RenderPipeline,
    driver: RealtimeOutputDriver,
    args: &Args,
) -> Result<render_core::audio::OutputHandle> {
    use render_core::audio::{start_output, AudioConfig, DeviceId};

    let mut audio = AudioConfig::default();
    if let Some(name) = &args.device {
        audio = audio.with_device(DeviceId::new(name.as_str()));
    }
    let handle = start_output(&audio, pipeline.config().sample_rate, driver)
        .context("Failed to open audio output")?;
    println!(
        "Playing on {} ({} channels, {:.1}ms buffer)",
        handle.device_name(),
        handle.channels(),
        handle.latency_ms()
    );
    Ok(handle)
}

/// Calls the driver from its own thread at the pace a device would
#[cfg(not(feature = "cpal-output"))]
struct SimulatedDevice {
    running: std::sync::Arc<std::sync::atomic::AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

#[cfg(not(feature = "cpal-output"))]
impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        self.running
            .store(false, std::sync::atomic::Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(not(feature = "cpal-output"))]
fn start_device(
    pipeline: &RenderPipeline,
    mut driver: RealtimeOutputDriver,
    args: &Args,
) -> Result<SimulatedDevice> {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use render_core::OutputProcessor;

    const CALLBACK_FRAMES: usize = 512;
    const DEVICE_CHANNELS: usize = 2;

    if args.device.is_some() {
        log::warn!("--device ignored: built without the cpal-output feature");
    }

    let period = Duration::from_secs_f64(CALLBACK_FRAMES as f64 / pipeline.config().sample_rate as f64);
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();

    let thread = std::thread::Builder::new()
        .name("simulated-device".to_string())
        .spawn(move || {
            let mut buffer = vec![0.0; CALLBACK_FRAMES * DEVICE_CHANNELS];
            let mut next = Instant::now() + period;
            while flag.load(Ordering::Acquire) {
                driver.process(&mut buffer, DEVICE_CHANNELS);
                std::thread::sleep(next.saturating_duration_since(Instant::now()));
                next += period;
            }
        })
        .context("Failed to spawn simulated device thread")?;

    println!(
        "Playing on simulated device ({} channels, {} frame callbacks)",
        DEVICE_CHANNELS, CALLBACK_FRAMES
    );
    Ok(SimulatedDevice {
        running,
        thread: Some(thread),
    })
}
