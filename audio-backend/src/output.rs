//! cpal output transport shared by the mixer backends.
//!
//! A worker thread owns the cpal device and stream so no non-`Send` objects
//! cross thread boundaries; the backend talks to it over a control channel.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{error, warn};

use crate::mix::MixerCore;
use crate::BackendError;

pub(crate) fn device_available() -> bool {
    cpal::default_host().default_output_device().is_some()
}

enum CtrlMsg {
    Shutdown,
}

pub(crate) struct OutputDriver {
    ctrl_tx: Sender<CtrlMsg>,
    sample_rate: u32,
    channels: u16,
}

impl OutputDriver {
    pub fn open(core: Arc<Mutex<MixerCore>>) -> Result<Self, BackendError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| BackendError::Io("no output device".into()))?;

        let mut supported = device
            .supported_output_configs()
            .map_err(|e| BackendError::Io(e.to_string()))?
            .collect::<Vec<_>>();
        if supported.is_empty() {
            return Err(BackendError::Format("no supported output configs".into()));
        }

        // Prefer f32 stereo; otherwise take whatever the device offers.
        let chosen = supported
            .iter()
            .find(|c| c.sample_format() == SampleFormat::F32 && c.channels() >= 2)
            .cloned()
            .or_else(|| supported.pop())
            .ok_or_else(|| BackendError::Format("no usable output config".into()))?;
        if chosen.sample_format() != SampleFormat::F32 {
            return Err(BackendError::Format(format!(
                "device offers {:?}, need f32 output",
                chosen.sample_format()
            )));
        }
        let config = chosen.with_max_sample_rate().config();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels;

        let (ctrl_tx, ctrl_rx) = unbounded::<CtrlMsg>();
        let (ready_tx, ready_rx) = bounded::<Result<(), BackendError>>(1);

        thread::Builder::new()
            .name("mixer-output".into())
            .spawn(move || worker_loop(device, config, core, ctrl_rx, ready_tx))
            .map_err(|e| BackendError::Io(e.to_string()))?;

        // Wait for the worker to report whether the stream came up.
        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => Ok(Self {
                ctrl_tx,
                sample_rate,
                channels,
            }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(BackendError::Io("output worker did not start".into())),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[allow(dead_code)]
    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl Drop for OutputDriver {
    fn drop(&mut self) {
        let _ = self.ctrl_tx.send(CtrlMsg::Shutdown);
    }
}

fn worker_loop(
    device: Device,
    config: StreamConfig,
    core: Arc<Mutex<MixerCore>>,
    ctrl_rx: Receiver<CtrlMsg>,
    ready_tx: Sender<Result<(), BackendError>>,
) {
    let channels = config.channels as usize;
    let data_cb = move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
        data.iter_mut().for_each(|s| *s = 0.0);
        // A panic must not unwind into the driver's FFI callback; emit
        // silence for the block instead.
        let mixed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            core.lock().mix(data, channels);
        }));
        if mixed.is_err() {
            data.iter_mut().for_each(|s| *s = 0.0);
        }
    };
    let err_cb = |err: cpal::StreamError| {
        error!(%err, "output stream error");
    };

    let stream = match device.build_output_stream(&config, data_cb, err_cb, None) {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(BackendError::Io(e.to_string())));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(BackendError::Io(e.to_string())));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    // The stream lives on this thread until shutdown.
    loop {
        match ctrl_rx.recv() {
            Ok(CtrlMsg::Shutdown) | Err(_) => break,
        }
    }
    if let Err(e) = stream.pause() {
        warn!(%e, "pausing output stream on shutdown");
    }
}
