// SPDX-License-Identifier: GPL-3.0-only

//! Use-case switching
//!
//! A use case is the device's operating mode and defines the active stream
//! set. Switching is a stop-the-world operation: capture halts, the device
//! reconfigures, and every piece of derived state (stream index map, topic
//! channels, exposure declarations, calibration) is rebuilt before capture
//! restarts. There is no rollback. If the device rejects the new mode or a
//! rebuild step fails, capture stays stopped and the error propagates; a
//! half-restored old mode would be worse than a stopped camera.

use std::sync::{Arc, Mutex, RwLock};

use tracing::{error, info, warn};

use crate::constants::PARAM_USECASE;
use crate::device::{DepthDevice, DeviceError};
use crate::errors::BridgeResult;
use crate::params::{ParamValue, ParameterGateway};

use super::calibration::Calibration;
use super::exposure::ExposureController;
use super::stream_map::StreamIndexMap;
use super::TopicSet;

pub struct UseCaseSwitcher {
    device: Arc<dyn DepthDevice>,
    gateway: Arc<ParameterGateway>,
    stream_map: Arc<RwLock<StreamIndexMap>>,
    topics: Arc<RwLock<TopicSet>>,
    calibration: Arc<RwLock<Calibration>>,
    exposure: Arc<ExposureController>,
    /// Serializes switches; concurrent requests queue up here
    switch_guard: Mutex<()>,
}

impl UseCaseSwitcher {
    pub fn new(
        device: Arc<dyn DepthDevice>,
        gateway: Arc<ParameterGateway>,
        stream_map: Arc<RwLock<StreamIndexMap>>,
        topics: Arc<RwLock<TopicSet>>,
        calibration: Arc<RwLock<Calibration>>,
        exposure: Arc<ExposureController>,
    ) -> Self {
        Self {
            device,
            gateway,
            stream_map,
            topics,
            calibration,
            exposure,
            switch_guard: Mutex::new(()),
        }
    }

    /// Switch the device to `name` and rebuild all derived state.
    ///
    /// On any error after the stop, capture is left stopped and the error
    /// returns to the caller.
    pub fn switch_to(&self, name: &str) -> BridgeResult<()> {
        let _guard = self.switch_guard.lock().unwrap();

        // Validate availability up front so an unknown name does not
        // interrupt a running capture.
        if !self.device.use_cases()?.iter().any(|u| u == name) {
            return Err(DeviceError::UnknownUseCase(name.to_string()).into());
        }

        info!(use_case = name, "Switching use case");
        self.device.stop_capture()?;

        if let Err(e) = self.device.set_use_case(name) {
            error!(use_case = name, error = %e, "Use case change failed, capture left stopped");
            return Err(e.into());
        }

        self.rebuild_derived_state()?;

        if let Err(e) = self.gateway.set(PARAM_USECASE, ParamValue::Str(name.to_string())) {
            warn!(error = %e, "Could not publish the new use case value");
        }

        self.device.start_capture()?;
        info!(use_case = name, "Use case active");
        Ok(())
    }

    /// Rebuild the stream index map, topic channels, exposure declarations
    /// and calibration from the device's current state. Capture must be
    /// stopped.
    fn rebuild_derived_state(&self) -> BridgeResult<()> {
        let ids = self.device.stream_ids()?;
        let streams = ids.len();
        self.stream_map.write().unwrap().rebuild(ids);
        self.topics.write().unwrap().resize(streams);
        self.exposure.reinit()?;
        *self.calibration.write().unwrap() = Calibration::from_lens(&self.device.lens_parameters()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::exposure::RetryPolicy;
    use crate::constants::PARAM_EXPOSURE_TIME_PREFIX;
    use crate::device::simulated::SimulatedDevice;
    use crate::params::ParamDescriptor;
    use std::time::Duration;

    fn setup() -> (Arc<SimulatedDevice>, Arc<ParameterGateway>, UseCaseSwitcher) {
        let device = Arc::new(SimulatedDevice::default_camera());
        device.initialize().unwrap();

        let gateway = Arc::new(ParameterGateway::new());
        gateway.declare(
            ParamDescriptor::new(PARAM_USECASE, "Active use case"),
            ParamValue::Str("MODE_9_5FPS".to_string()),
        );

        let stream_map = Arc::new(RwLock::new(StreamIndexMap::new()));
        stream_map
            .write()
            .unwrap()
            .rebuild(device.stream_ids().unwrap());
        let topics = Arc::new(RwLock::new(TopicSet::new("node", 1)));
        let calibration = Arc::new(RwLock::new(Calibration::from_lens(
            &device.lens_parameters().unwrap(),
        )));
        let exposure = Arc::new(ExposureController::new(
            Arc::clone(&device) as Arc<dyn DepthDevice>,
            Arc::clone(&gateway),
            Arc::clone(&stream_map),
            RetryPolicy {
                attempts: 5,
                pause: Duration::ZERO,
            },
        ));
        exposure.reinit().unwrap();

        let switcher = UseCaseSwitcher::new(
            Arc::clone(&device) as Arc<dyn DepthDevice>,
            Arc::clone(&gateway),
            stream_map,
            Arc::clone(&topics),
            calibration,
            exposure,
        );
        device.start_capture().unwrap();
        (device, gateway, switcher)
    }

    #[test]
    fn test_switch_rebuilds_state_and_restarts_capture() {
        let (device, gateway, switcher) = setup();

        switcher.switch_to("MODE_MIXED_30_5").unwrap();

        assert!(device.is_capturing());
        assert_eq!(device.current_use_case().unwrap(), "MODE_MIXED_30_5");
        assert_eq!(
            gateway.get(PARAM_USECASE),
            Some(ParamValue::Str("MODE_MIXED_30_5".to_string()))
        );
        // Second stream's exposure parameter appears with the new bounds
        let name = format!("{}1", PARAM_EXPOSURE_TIME_PREFIX);
        let descriptor = gateway.describe(&name).unwrap();
        assert_eq!(descriptor.integer_range, Some((8, 1300)));
    }

    #[test]
    fn test_switch_back_drops_stale_stream_parameters() {
        let (_device, gateway, switcher) = setup();
        switcher.switch_to("MODE_MIXED_30_5").unwrap();
        assert!(gateway.is_declared("exposure_time_1"));

        switcher.switch_to("MODE_9_5FPS").unwrap();
        assert!(gateway.is_declared("exposure_time_0"));
        assert!(!gateway.is_declared("exposure_time_1"));
        assert!(!gateway.is_declared("auto_exposure_1"));
    }

    #[test]
    fn test_unknown_use_case_keeps_capture_running() {
        let (device, _gateway, switcher) = setup();

        let result = switcher.switch_to("MODE_NOPE");

        assert!(result.is_err());
        assert!(device.is_capturing());
        assert_eq!(device.current_use_case().unwrap(), "MODE_9_5FPS");
    }

    #[test]
    fn test_failed_switch_leaves_capture_stopped() {
        let (device, gateway, switcher) = setup();
        device.script_use_case_failure();

        let result = switcher.switch_to("MODE_MIXED_30_5");

        assert!(result.is_err());
        assert!(!device.is_capturing());
        // Old value retained; no partial rollback happened
        assert_eq!(
            gateway.get(PARAM_USECASE),
            Some(ParamValue::Str("MODE_9_5FPS".to_string()))
        );
    }
}
