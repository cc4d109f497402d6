//! # Audio Capture Module
//!
//! Live acquisition through CPAL (Cross-Platform Audio Library). The input
//! callback rechunks whatever buffer sizes the driver delivers into blocks of
//! exactly `step_size` mono samples and hands them to the processing session
//! as [`AudioEvent`]s.
//!
//! Stream errors reported by the driver become [`AudioEvent::Fault`], which
//! the processor treats as a skipped tick.

use anyhow::{Result, anyhow};
use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use tracing::{info, warn};

use crate::config::Config;

/// What the acquisition side delivers to the processing thread.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    /// Exactly `step_size` mono samples.
    Block(Vec<f32>),
    /// The driver reported a problem for the current period.
    Fault(String),
}

/// Starts capturing from the default input device.
///
/// # Arguments
/// * `config` - Supplies the sample rate and block size
/// * `sender` - Channel to the processing session
///
/// # Returns
/// * `Ok(stream)` - The running stream; capture stops when it is dropped
/// * `Err(e)` - No device, no f32 format at the configured rate, or the
///   stream could not be built
pub fn start_audio_capture(config: &Config, sender: Sender<AudioEvent>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    info!(device = %device.name()?, "Using audio input device");

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, config.sample_rate).ok_or_else(|| {
        anyhow!(
            "No f32 input format supports {} Hz; set sample_rate in the config to a rate the device offers",
            config.sample_rate
        )
    })?;

    let stream_config: cpal::StreamConfig = supported_config
        .with_sample_rate(cpal::SampleRate(config.sample_rate))
        .into();
    let channels = usize::from(stream_config.channels.max(1));
    info!(
        sample_rate = config.sample_rate,
        channels,
        block = config.step_size,
        "Selected input format"
    );

    let step = config.step_size;
    let fault_sender = sender.clone();
    let err_fn = move |err: cpal::StreamError| {
        warn!("An error occurred on the audio stream: {}", err);
        let _ = fault_sender.try_send(AudioEvent::Fault(err.to_string()));
    };

    // Accumulates the first channel across callbacks until a full block is ready.
    let mut pending: Vec<f32> = Vec::with_capacity(step * 2);

    let stream = device.build_input_stream(
        &stream_config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            pending.extend(data.iter().step_by(channels));

            while pending.len() >= step {
                let block = pending[..step].to_vec();
                // Blocks are dropped if the processing thread falls behind.
                let _ = sender.try_send(AudioEvent::Block(block));
                pending.drain(..step);
            }
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok(stream)
}

/// Picks an f32 input configuration whose rate range covers `sample_rate`,
/// preferring mono and then the fewest channels.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    sample_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .filter(|c| c.min_sample_rate().0 <= sample_rate && sample_rate <= c.max_sample_rate().0)
        .min_by_key(|c| c.channels())
}
