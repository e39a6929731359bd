// SPDX-License-Identifier: GPL-3.0-only

//! Bridge node lifecycle
//!
//! [`CameraNode`] owns the whole bridge: it initializes the device, declares
//! the parameter surface, spins up the dispatch and demand threads and
//! starts capture. Externally submitted parameter batches enter through
//! [`CameraNode::apply_parameters`].

use std::sync::mpsc::sync_channel;
use std::sync::{Arc, RwLock};
use std::thread;

use tracing::{info, warn};

use crate::bridge::calibration::Calibration;
use crate::bridge::demand::ListenerDemandTracker;
use crate::bridge::dispatch::FrameDispatcher;
use crate::bridge::exposure::{ExposureController, RetryPolicy};
use crate::bridge::stream_map::StreamIndexMap;
use crate::bridge::usecase::UseCaseSwitcher;
use crate::bridge::worker::{LoopAction, LoopController};
use crate::bridge::{PublishFlags, TopicSet};
use crate::config::Config;
use crate::constants::{
    optical_frame_id, DEMAND_POLL_INTERVAL, DEVICE_EVENT_QUEUE_DEPTH, PARAM_AVAILABLE_USECASES,
    PARAM_MODEL, PARAM_SERIAL, PARAM_USECASE,
};
use crate::device::{DepthDevice, ExposureMode};
use crate::errors::{BridgeResult, ParameterError};
use crate::params::{
    auto_exposure_index, batch_conflict, exposure_time_index, ParamDescriptor, ParamValue,
    ParamWrite, ParameterGateway,
};

/// A running bridge between one depth camera and the pub/sub surface
pub struct CameraNode {
    device: Arc<dyn DepthDevice>,
    gateway: Arc<ParameterGateway>,
    topics: Arc<RwLock<TopicSet>>,
    exposure: Arc<ExposureController>,
    switcher: UseCaseSwitcher,
    dispatch_loop: Option<LoopController>,
    demand_loop: Option<LoopController>,
}

impl CameraNode {
    /// Bring the bridge up: initialize the device, declare parameters,
    /// start the worker threads and begin capturing.
    pub fn start(device: Arc<dyn DepthDevice>, config: &Config) -> BridgeResult<Self> {
        device.initialize()?;
        let model = device.name()?;
        let serial = device.serial();
        let use_cases = device.use_cases()?;
        info!(model = %model, serial = %serial, "Device initialized");

        // Configured use case, if any, takes effect before anything is
        // derived from the stream set
        if let Some(use_case) = &config.usecase {
            device.set_use_case(use_case)?;
        }
        let current_use_case = device.current_use_case()?;

        let gateway = Arc::new(ParameterGateway::new());
        declare_device_params(&gateway, &serial, &model, &use_cases, &current_use_case);

        let stream_ids = device.stream_ids()?;
        let stream_map = Arc::new(RwLock::new(StreamIndexMap::new()));
        stream_map.write().unwrap().rebuild(stream_ids.clone());

        // Seed exposure modes from the configuration before the controller
        // reads them back from the device
        for (index, auto) in config.auto_exposure.iter().enumerate() {
            let Some(id) = stream_ids.get(index) else {
                warn!(stream = index, "Configured exposure mode has no stream, ignored");
                continue;
            };
            let mode = if *auto {
                ExposureMode::Automatic
            } else {
                ExposureMode::Manual
            };
            device.set_exposure_mode(*id, mode)?;
        }

        let exposure = Arc::new(ExposureController::new(
            Arc::clone(&device),
            Arc::clone(&gateway),
            Arc::clone(&stream_map),
            RetryPolicy::default(),
        ));
        exposure.reinit()?;

        // Manual exposure seeds; no-ops on streams left in automatic mode
        for (index, micros) in config.exposure_time.iter().enumerate() {
            if let Err(e) = exposure.set_exposure_time(index, *micros) {
                warn!(stream = index, error = %e, "Configured exposure time not applied");
            }
        }

        let calibration = Arc::new(RwLock::new(Calibration::from_lens(
            &device.lens_parameters()?,
        )));

        let (events_tx, events_rx) = sync_channel(DEVICE_EVENT_QUEUE_DEPTH);
        device.register_exposure_listener(events_tx.clone())?;

        let topics = Arc::new(RwLock::new(TopicSet::new(
            &config.node_name,
            stream_ids.len(),
        )));
        let flags = Arc::new(PublishFlags::new());

        let dispatcher = FrameDispatcher::new(
            optical_frame_id(&config.node_name),
            Arc::clone(&stream_map),
            Arc::clone(&topics),
            Arc::clone(&calibration),
            Arc::clone(&flags),
            Arc::clone(&exposure),
        );
        let dispatch_loop = dispatcher.spawn(events_rx);

        let mut tracker = ListenerDemandTracker::new(
            Arc::clone(&device),
            Arc::clone(&topics),
            flags,
            events_tx,
        );
        let demand_loop = LoopController::start("demand-poll", move || {
            tracker.tick();
            thread::sleep(DEMAND_POLL_INTERVAL);
            LoopAction::Continue
        });

        let switcher = UseCaseSwitcher::new(
            Arc::clone(&device),
            Arc::clone(&gateway),
            stream_map,
            Arc::clone(&topics),
            calibration,
            Arc::clone(&exposure),
        );

        device.start_capture()?;
        info!(node = %config.node_name, use_case = %current_use_case, "Bridge running");

        Ok(Self {
            device,
            gateway,
            topics,
            exposure,
            switcher,
            dispatch_loop: Some(dispatch_loop),
            demand_loop: Some(demand_loop),
        })
    }

    /// Apply one externally submitted parameter batch.
    ///
    /// Items are validated and applied in order; the first failure stops
    /// processing and earlier items stay applied. Batches that write both
    /// the exposure time and the auto-exposure mode of the same stream are
    /// rejected without applying anything.
    pub fn apply_parameters(&self, batch: &[ParamWrite]) -> BridgeResult<()> {
        if let Some(stream) = batch_conflict(batch) {
            return Err(ParameterError::ConflictingBatch(stream).into());
        }

        for write in batch {
            self.gateway.check_write(write)?;
            self.apply_one(write)?;
        }
        Ok(())
    }

    fn apply_one(&self, write: &ParamWrite) -> BridgeResult<()> {
        if write.name == PARAM_USECASE {
            let name = write
                .value
                .as_str()
                .ok_or_else(|| ParameterError::WrongType(write.name.clone()))?;
            // The switcher publishes the new value itself on success
            return self.switcher.switch_to(name);
        }

        if let Some(index) = exposure_time_index(&write.name) {
            let micros = write
                .value
                .as_int()
                .ok_or_else(|| ParameterError::WrongType(write.name.clone()))?;
            self.exposure.set_exposure_time(index, micros as u32)?;
            self.gateway.set(&write.name, write.value.clone())?;
            return Ok(());
        }

        if let Some(index) = auto_exposure_index(&write.name) {
            let enable = write
                .value
                .as_bool()
                .ok_or_else(|| ParameterError::WrongType(write.name.clone()))?;
            self.exposure.enable_auto_exposure(index, enable)?;
            self.gateway.set(&write.name, write.value.clone())?;
            return Ok(());
        }

        self.gateway.set(&write.name, write.value.clone())?;
        Ok(())
    }

    pub fn gateway(&self) -> &Arc<ParameterGateway> {
        &self.gateway
    }

    pub fn topics(&self) -> &Arc<RwLock<TopicSet>> {
        &self.topics
    }

    pub fn exposure(&self) -> &Arc<ExposureController> {
        &self.exposure
    }

    /// Stop the worker threads and capture. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(mut demand) = self.demand_loop.take() {
            demand.stop();
        }
        if let Some(mut dispatch) = self.dispatch_loop.take() {
            dispatch.stop();
        }
        if let Err(e) = self.device.stop_capture() {
            warn!(error = %e, "Stopping capture failed during shutdown");
        }
        info!("Bridge stopped");
    }
}

impl Drop for CameraNode {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn declare_device_params(
    gateway: &ParameterGateway,
    serial: &str,
    model: &str,
    use_cases: &[String],
    current: &str,
) {
    gateway.declare(
        ParamDescriptor::new(PARAM_SERIAL, "Serial number of the camera").read_only(),
        ParamValue::Str(serial.to_string()),
    );
    gateway.declare(
        ParamDescriptor::new(PARAM_MODEL, "Model name of the camera").read_only(),
        ParamValue::Str(model.to_string()),
    );
    gateway.declare(
        ParamDescriptor::new(PARAM_AVAILABLE_USECASES, "Use cases supported by the camera")
            .read_only(),
        ParamValue::StrList(use_cases.to_vec()),
    );
    gateway.declare(
        ParamDescriptor::new(PARAM_USECASE, "Active use case")
            .constraints(&format!("One of: {}", use_cases.join(", "))),
        ParamValue::Str(current.to_string()),
    );
}
