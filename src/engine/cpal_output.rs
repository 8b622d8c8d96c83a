//! System output through cpal
//!
//! `cpal::Stream` is not `Send` on every host, so a dedicated thread builds
//! the stream, plays it, and keeps it alive until told to stop. The render
//! callback runs on cpal's own audio thread.

use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Sender};

use crate::engine::buffer::AudioBuffer;
use crate::engine::device::{OutputDevice, RenderCallback};
use crate::engine::source::SourceFormat;
use crate::error::{EngineError, Result};

/// Default system output device
pub struct CpalDevice {
    name: String,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalDevice {
    pub fn new() -> Self {
        Self {
            name: "cpal".to_string(),
            stop_tx: None,
            thread: None,
        }
    }
}

impl Default for CpalDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn stream_error(reason: &str, e: impl std::error::Error + Send + Sync + 'static) -> EngineError {
    EngineError::EngineStart {
        reason: reason.to_string(),
        source: Some(Box::new(e)),
    }
}

impl OutputDevice for CpalDevice {
    fn start(&mut self, format: &SourceFormat, mut callback: RenderCallback) -> Result<()> {
        if self.thread.is_some() {
            return Err(EngineError::engine_start("cpal device is already running"));
        }

        let format = *format;
        let (ready_tx, ready_rx) = bounded::<Result<String>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let spawned = thread::Builder::new()
            .name("repitch-cpal".to_string())
            .spawn(move || {
                let host = cpal::default_host();
                let Some(device) = host.default_output_device() else {
                    let _ = ready_tx.send(Err(EngineError::engine_start("no default output device")));
                    return;
                };
                let name = device.name().unwrap_or_else(|_| "unknown".to_string());

                let config = cpal::StreamConfig {
                    channels: format.channels,
                    sample_rate: cpal::SampleRate(format.sample_rate),
                    buffer_size: cpal::BufferSize::Default,
                };
                let channels = format.channels as usize;
                let mut scratch = AudioBuffer::new(0, channels, format.sample_rate);

                let stream = device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        scratch.set_len(data.len() / channels);
                        callback(&mut scratch);
                        for (i, frame) in data.chunks_mut(channels).enumerate() {
                            for (ch, sample) in frame.iter_mut().enumerate() {
                                *sample = scratch.samples[ch][i];
                            }
                        }
                    },
                    |err| log::error!("[DEVICE] cpal stream error: {}", err),
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(stream_error("could not build output stream", e)));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(stream_error("could not start output stream", e)));
                    return;
                }

                let _ = ready_tx.send(Ok(name));
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| stream_error("could not spawn output thread", e))?;

        match ready_rx.recv() {
            Ok(Ok(name)) => {
                log::info!("[DEVICE] Playing through {}", name);
                self.name = name;
                self.stop_tx = Some(stop_tx);
                self.thread = Some(spawned);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = spawned.join();
                Err(e)
            }
            Err(_) => {
                let _ = spawned.join();
                Err(EngineError::engine_start("output thread exited during start"))
            }
        }
    }

    fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::warn!("[DEVICE] cpal output thread panicked");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.stop();
    }
}
