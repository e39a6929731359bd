// SPDX-License-Identifier: GPL-3.0-only

//! Per-stream exposure control
//!
//! Tracks exposure mode, the cached current time and the device-reported
//! bounds for every stream of the active use case, and drives exposure
//! writes against a device that can transiently report busy. The cached
//! exposure value is advisory display state: manual writes do not update it,
//! the authoritative value always arrives through the device's exposure
//! push.

use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::constants::{
    EXPOSURE_RETRY_ATTEMPTS, EXPOSURE_RETRY_PAUSE, PARAM_AUTO_EXPOSURE_PREFIX,
    PARAM_EXPOSURE_TIME_PREFIX,
};
use crate::device::{DepthDevice, DeviceError, ExposureMode, ExposureUpdate};
use crate::errors::{BridgeResult, ParameterError};
use crate::params::{ParamDescriptor, ParamValue, ParameterGateway};

use super::stream_map::StreamIndexMap;
use crate::device::StreamId;

/// Retry behavior for exposure writes that hit the busy status.
///
/// `attempts` bounds the total number of device calls; `pause` is slept
/// between them. Injectable so tests run without wall-clock delays.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: EXPOSURE_RETRY_ATTEMPTS,
            pause: EXPOSURE_RETRY_PAUSE,
        }
    }
}

#[derive(Debug, Clone)]
struct StreamEntry {
    id: StreamId,
    auto: bool,
    /// Last exposure time pushed by the hardware, microseconds
    current_us: u32,
    limits: (u32, u32),
}

/// Exposure-control state and mutation protocol for all active streams
pub struct ExposureController {
    device: Arc<dyn DepthDevice>,
    gateway: Arc<ParameterGateway>,
    stream_map: Arc<RwLock<StreamIndexMap>>,
    state: Mutex<Vec<StreamEntry>>,
    policy: RetryPolicy,
}

impl ExposureController {
    pub fn new(
        device: Arc<dyn DepthDevice>,
        gateway: Arc<ParameterGateway>,
        stream_map: Arc<RwLock<StreamIndexMap>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            device,
            gateway,
            stream_map,
            state: Mutex::new(Vec::new()),
            policy,
        }
    }

    /// Rebuild exposure state from the device for the current stream set.
    ///
    /// Queries mode and limits per stream, refreshes the gateway
    /// declarations (new ranges, default = range max) and removes
    /// declarations for stream slots that no longer exist. Called at
    /// startup and after every use-case switch, after the stream index map
    /// has been rebuilt.
    pub fn reinit(&self) -> BridgeResult<()> {
        let ids: Vec<StreamId> = self.stream_map.read().unwrap().ids().to_vec();

        let mut entries = Vec::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            let limits = self.device.exposure_limits(*id)?;
            let mode = self.device.exposure_mode(*id)?;
            let auto = mode == ExposureMode::Automatic;
            entries.push(StreamEntry {
                id: *id,
                auto,
                current_us: limits.1,
                limits,
            });
            self.declare_stream_params(i, auto, limits);
        }

        // Drop declarations of slots beyond the new stream count
        let mut i = ids.len();
        while self
            .gateway
            .is_declared(&format!("{}{}", PARAM_EXPOSURE_TIME_PREFIX, i))
        {
            self.gateway
                .undeclare(&format!("{}{}", PARAM_EXPOSURE_TIME_PREFIX, i));
            self.gateway
                .undeclare(&format!("{}{}", PARAM_AUTO_EXPOSURE_PREFIX, i));
            i += 1;
        }

        *self.state.lock().unwrap() = entries;
        Ok(())
    }

    fn declare_stream_params(&self, index: usize, auto: bool, limits: (u32, u32)) {
        let auto_name = format!("{}{}", PARAM_AUTO_EXPOSURE_PREFIX, index);
        let time_name = format!("{}{}", PARAM_EXPOSURE_TIME_PREFIX, index);

        if self.gateway.is_declared(&time_name) {
            self.gateway.redeclare_integer_range(
                &time_name,
                limits.0 as i64,
                limits.1 as i64,
                limits.1 as i64,
            );
            let _ = self.gateway.set(&auto_name, ParamValue::Bool(auto));
        } else {
            self.gateway.declare(
                ParamDescriptor::new(
                    &auto_name,
                    &format!("Controls auto exposure for stream {}", index),
                )
                .constraints("Cannot set the exposure_time parameter while this parameter's value is true"),
                ParamValue::Bool(auto),
            );
            self.gateway.declare(
                ParamDescriptor::new(
                    &time_name,
                    &format!("Current exposure time for stream {}", index),
                )
                .integer_range(limits.0 as i64, limits.1 as i64)
                .constraints(
                    "Cannot be set if auto_exposure is true. \
                     Must be within the integer range for the current use case.",
                ),
                ParamValue::Int(limits.1 as i64),
            );
        }
    }

    /// Number of streams in the current exposure state
    pub fn stream_count(&self) -> usize {
        self.state.lock().unwrap().len()
    }

    /// Whether a stream is in automatic mode
    pub fn auto_enabled(&self, index: usize) -> Option<bool> {
        self.state.lock().unwrap().get(index).map(|e| e.auto)
    }

    /// Device-reported exposure bounds of a stream
    pub fn limits(&self, index: usize) -> Option<(u32, u32)> {
        self.state.lock().unwrap().get(index).map(|e| e.limits)
    }

    /// Cached exposure time of a stream, microseconds
    pub fn current_exposure(&self, index: usize) -> Option<u32> {
        self.state.lock().unwrap().get(index).map(|e| e.current_us)
    }

    /// Write a manual exposure time for a stream.
    ///
    /// No-op success while the stream is in automatic mode: the device owns
    /// the value there and external writes are silently ignored. Otherwise
    /// the write is retried on the busy status up to the policy's attempt
    /// budget; any other failure aborts immediately. Success does not touch
    /// the cached value, which is re-read from the hardware push.
    pub fn set_exposure_time(&self, index: usize, micros: u32) -> BridgeResult<()> {
        let (id, auto) = {
            let state = self.state.lock().unwrap();
            let entry = state
                .get(index)
                .ok_or(ParameterError::NoSuchStream(index))?;
            (entry.id, entry.auto)
        };
        if auto {
            debug!(stream = index, "Exposure write ignored, stream is in automatic mode");
            return Ok(());
        }

        info!(stream = index, micros, "Setting exposure time");
        // The lock is not held here: the retry loop may block for the whole
        // attempt budget.
        let mut remaining = self.policy.attempts;
        loop {
            match self.device.set_exposure_time(id, micros) {
                Ok(()) => return Ok(()),
                Err(DeviceError::Busy) => {
                    remaining -= 1;
                    if remaining == 0 {
                        warn!(stream = index, "Exposure write still busy after retry budget");
                        return Err(DeviceError::Busy.into());
                    }
                    thread::sleep(self.policy.pause);
                }
                Err(e) => {
                    warn!(stream = index, error = %e, "Exposure write rejected");
                    return Err(e.into());
                }
            }
        }
    }

    /// Switch a stream between automatic and manual exposure.
    ///
    /// The cached mode only changes after the device confirms.
    pub fn enable_auto_exposure(&self, index: usize, enable: bool) -> BridgeResult<()> {
        let id = {
            let state = self.state.lock().unwrap();
            state
                .get(index)
                .map(|e| e.id)
                .ok_or(ParameterError::NoSuchStream(index))?
        };

        info!(stream = index, enable, "Setting auto exposure");
        let mode = if enable {
            ExposureMode::Automatic
        } else {
            ExposureMode::Manual
        };
        self.device.set_exposure_mode(id, mode)?;
        if let Some(entry) = self.state.lock().unwrap().get_mut(index) {
            entry.auto = enable;
        }
        Ok(())
    }

    /// Handle an autonomous exposure change pushed by the hardware.
    ///
    /// Updates the cached value and republishes it through the gateway only
    /// when it actually changed; repeat pushes of the same value are
    /// swallowed to avoid feedback loops. Never fails: propagation errors
    /// are logged and must not abort frame processing.
    pub fn on_hardware_exposure_update(&self, update: ExposureUpdate) {
        let index = match self.stream_map.read().unwrap().lookup(update.stream_id) {
            Ok(index) => index,
            Err(_) => {
                warn!(
                    stream_id = %update.stream_id,
                    "Exposure push for a stream outside the current use case, dropped"
                );
                return;
            }
        };

        {
            let mut state = self.state.lock().unwrap();
            let Some(entry) = state.get_mut(index) else {
                return;
            };
            if entry.current_us == update.micros {
                return;
            }
            entry.current_us = update.micros;
        }

        let name = format!("{}{}", PARAM_EXPOSURE_TIME_PREFIX, index);
        if let Err(e) = self.gateway.set(&name, ParamValue::Int(update.micros as i64)) {
            info!(stream = index, error = %e, "Could not propagate exposure update");
        }
    }
}
