//! Loopback audio capture over cpal.
//!
//! On Windows the WASAPI backend opens an input stream on the default
//! *render* device, which is the loopback of whatever the host is playing.
//! Elsewhere the default input device is used (e.g. a PulseAudio/PipeWire
//! monitor source when the operator has selected one).
//!
//! cpal streams are not `Send`, so each session parks its stream on a
//! dedicated thread and hands packets out through a bounded channel. The
//! engine side pulls packets non-blocking; when the channel is full the
//! callback drops the oldest-by-arrival data rather than stalling the
//! audio driver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use lanscr_core::capture::{AudioPacket, AudioSourceFactory, AudioSpec, LoopbackAudio, SampleKind};
use lanscr_core::{Error, Result};

/// Packets buffered between the audio callback and the subscriber loop.
const CHANNEL_CAPACITY: usize = 64;

/// Opens one loopback session per subscriber.
pub struct SystemLoopbackFactory;

impl SystemLoopbackFactory {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemLoopbackFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSourceFactory for SystemLoopbackFactory {
    fn open(&self) -> Result<Box<dyn LoopbackAudio>> {
        SystemLoopback::open().map(|s| Box::new(s) as Box<dyn LoopbackAudio>)
    }
}

/// One live loopback session.
pub struct SystemLoopback {
    spec: AudioSpec,
    rx: Receiver<AudioPacket>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SystemLoopback {
    pub fn open() -> Result<Self> {
        let (init_tx, init_rx) = std::sync::mpsc::channel::<Result<AudioSpec>>();
        let (tx, rx) = bounded::<AudioPacket>(CHANNEL_CAPACITY);
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker_shutdown = Arc::clone(&shutdown);
        let worker = std::thread::spawn(move || capture_thread(init_tx, tx, worker_shutdown));

        match init_rx.recv() {
            Ok(Ok(spec)) => Ok(Self {
                spec,
                rx,
                shutdown,
                worker: Some(worker),
            }),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(Error::Audio("capture thread died during setup".into()))
            }
        }
    }
}

impl LoopbackAudio for SystemLoopback {
    fn spec(&self) -> AudioSpec {
        self.spec
    }

    fn next_packet(&mut self) -> Result<Option<AudioPacket>> {
        match self.rx.try_recv() {
            Ok(packet) => Ok(Some(packet)),
            Err(crossbeam_channel::TryRecvError::Empty) => Ok(None),
            Err(crossbeam_channel::TryRecvError::Disconnected) => {
                Err(Error::Audio("loopback stream ended".into()))
            }
        }
    }
}

impl Drop for SystemLoopback {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn pick_device() -> Result<Device> {
    let host = cpal::default_host();
    #[cfg(windows)]
    let device = host.default_output_device();
    #[cfg(not(windows))]
    let device = host.default_input_device();
    device.ok_or_else(|| Error::Audio("no loopback endpoint available".into()))
}

fn push(tx: &Sender<AudioPacket>, packet: AudioPacket) {
    match tx.try_send(packet) {
        Ok(()) | Err(TrySendError::Disconnected(_)) => {}
        Err(TrySendError::Full(_)) => {
            // Subscriber is behind; dropping here keeps the driver callback
            // real-time. The WAV pump's own deadline handles the peer.
        }
    }
}

/// Owns the cpal stream for the session's lifetime.
fn capture_thread(
    init_tx: std::sync::mpsc::Sender<Result<AudioSpec>>,
    tx: Sender<AudioPacket>,
    shutdown: Arc<AtomicBool>,
) {
    let setup = (|| -> Result<(cpal::Stream, AudioSpec)> {
        let device = pick_device()?;
        let supported = device
            .default_input_config()
            .or_else(|_| device.default_output_config())
            .map_err(|e| Error::Audio(e.to_string()))?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.config();

        let spec = AudioSpec {
            sample_rate: config.sample_rate,
            channels: config.channels,
            kind: match sample_format {
                SampleFormat::F32 => SampleKind::Float32,
                SampleFormat::I16 => SampleKind::Int16,
                _ => SampleKind::Unsupported,
            },
        };

        let err_fn = |e| log::debug!("Loopback stream error: {e}");
        let stream = match sample_format {
            SampleFormat::F32 => {
                let tx = tx.clone();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        push(
                            &tx,
                            AudioPacket {
                                data: Bytes::copy_from_slice(bytemuck::cast_slice(data)),
                                samples: data.len(),
                                silent: false,
                            },
                        );
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::I16 => {
                let tx = tx.clone();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        push(
                            &tx,
                            AudioPacket {
                                data: Bytes::copy_from_slice(bytemuck::cast_slice(data)),
                                samples: data.len(),
                                silent: false,
                            },
                        );
                    },
                    err_fn,
                    None,
                )
            }
            other => {
                // Unrecognized mix format: keep the cadence, report counts
                // only. Downstream renders these packets as silence.
                log::warn!("Loopback format {other:?} not supported, streaming silence");
                let tx = tx.clone();
                device.build_input_stream_raw(
                    &config,
                    other,
                    move |data: &cpal::Data, _: &cpal::InputCallbackInfo| {
                        push(
                            &tx,
                            AudioPacket {
                                data: Bytes::new(),
                                samples: data.len(),
                                silent: true,
                            },
                        );
                    },
                    err_fn,
                    None,
                )
            }
        }
        .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        Ok((stream, spec))
    })();

    match setup {
        Ok((stream, spec)) => {
            let _ = init_tx.send(Ok(spec));
            while !shutdown.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(50));
            }
            drop(stream);
        }
        Err(e) => {
            let _ = init_tx.send(Err(e));
        }
    }
}
