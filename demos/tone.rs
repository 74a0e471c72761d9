//! Feed a 440 Hz sine through the driver the way an emulator would
//!
//! ```text
//! cargo run --example tone -- null
//! cargo run --example tone -- wav out.wav
//! cargo run --example tone --features playback -- playback
//! ```

use anyhow::{bail, Context, Result};
use pcm_bridge::{AudioDriver, BackendKind, DriverConfig, SampleBlock};
use std::time::{Duration, Instant};

const BLOCKS_PER_SECOND: u32 = 60;
const SECONDS: u32 = 3;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next().as_deref() {
        None | Some("null") => DriverConfig::low_latency().with_backend(BackendKind::Null),
        Some("wav") => DriverConfig::studio()
            .with_backend(BackendKind::Wav)
            .with_device(args.next().unwrap_or_else(|| "tone.wav".into())),
        Some("playback") => DriverConfig::stable(),
        Some(other) => bail!("unknown backend '{other}' (expected null, wav or playback)"),
    };

    let mut driver = AudioDriver::new(config).context("creating audio driver")?;
    let params = driver
        .try_init(44_100)
        .context("initializing audio device")?;

    let frames_per_block = (params.sample_rate / BLOCKS_PER_SECOND) as usize;
    let step = 440.0 * std::f32::consts::TAU / params.sample_rate as f32;
    let mut phase = 0.0f32;

    let start = Instant::now();
    for block_index in 0..BLOCKS_PER_SECOND * SECONDS {
        let mut samples = Vec::with_capacity(frames_per_block);
        for _ in 0..frames_per_block {
            samples.push(phase.sin() * 0.8);
            phase = (phase + step) % std::f32::consts::TAU;
        }
        driver.play_samples(&SampleBlock::float32(samples, 1)?);

        let due = start + Duration::from_secs(1) * (block_index + 1) / BLOCKS_PER_SECOND;
        std::thread::sleep(due.saturating_duration_since(Instant::now()));
    }

    let stats = driver.stats();
    driver.close();
    println!(
        "{} blocks, {} overruns, {} underruns, {} dropped writes",
        stats.blocks_received, stats.overruns, stats.underruns, stats.dropped_writes
    );
    Ok(())
}
