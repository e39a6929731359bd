// SPDX-License-Identifier: GPL-3.0-only

//! Simulated depth camera backend
//!
//! A software implementation of [`DepthDevice`] with scripted use cases,
//! stream sets and exposure limits. It backs the `run` subcommand when no
//! hardware is present and doubles as the test device: busy responses and
//! call failures can be scripted, and every mutation is observable.

use std::sync::mpsc::SyncSender;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use super::{
    DepthDevice, DeviceError, DeviceEvent, DeviceResult, ExposureMode, ExposureUpdate, IrFrame,
    LensParameters, PointCloudFrame, PointXyzc, StreamId,
};

/// One stream of a scripted use case
#[derive(Debug, Clone)]
pub struct StreamSpec {
    pub id: StreamId,
    pub width: u32,
    pub height: u32,
    /// Exposure time bounds (min, max) in microseconds
    pub exposure_limits: (u32, u32),
}

impl StreamSpec {
    pub fn new(id: u16, width: u32, height: u32, exposure_limits: (u32, u32)) -> Self {
        Self {
            id: StreamId(id),
            width,
            height,
            exposure_limits,
        }
    }
}

/// A scripted operating mode
#[derive(Debug, Clone)]
pub struct UseCaseSpec {
    pub name: String,
    pub streams: Vec<StreamSpec>,
}

impl UseCaseSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            streams: Vec::new(),
        }
    }

    pub fn stream(mut self, spec: StreamSpec) -> Self {
        self.streams.push(spec);
        self
    }
}

/// Per-stream exposure state tracked by the simulator
#[derive(Debug, Clone)]
struct SimStream {
    spec: StreamSpec,
    mode: ExposureMode,
    exposure_us: u32,
}

/// Mutable simulator state behind one lock
struct SimState {
    initialized: bool,
    capturing: bool,
    current_use_case: usize,
    streams: Vec<SimStream>,
    pc_listener: Option<SyncSender<DeviceEvent>>,
    ir_listener: Option<SyncSender<DeviceEvent>>,
    exposure_listener: Option<SyncSender<DeviceEvent>>,
    // Scripting
    busy_remaining: u32,
    fail_next_use_case: bool,
    register_failures_remaining: u32,
    // Observability
    exposure_write_calls: u32,
}

/// Simulated depth camera
pub struct SimulatedDevice {
    serial: String,
    name: String,
    use_cases: Vec<UseCaseSpec>,
    lens: LensParameters,
    state: Mutex<SimState>,
}

/// Builder for [`SimulatedDevice`]
pub struct SimulatedDeviceBuilder {
    serial: String,
    name: String,
    use_cases: Vec<UseCaseSpec>,
    lens: LensParameters,
}

impl SimulatedDeviceBuilder {
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn use_case(mut self, spec: UseCaseSpec) -> Self {
        self.use_cases.push(spec);
        self
    }

    pub fn lens(mut self, lens: LensParameters) -> Self {
        self.lens = lens;
        self
    }

    pub fn build(self) -> SimulatedDevice {
        assert!(
            !self.use_cases.is_empty(),
            "simulated device needs at least one use case"
        );
        let streams = streams_for(&self.use_cases[0]);
        SimulatedDevice {
            serial: self.serial,
            name: self.name,
            use_cases: self.use_cases,
            lens: self.lens,
            state: Mutex::new(SimState {
                initialized: false,
                capturing: false,
                current_use_case: 0,
                streams,
                pc_listener: None,
                ir_listener: None,
                exposure_listener: None,
                busy_remaining: 0,
                fail_next_use_case: false,
                register_failures_remaining: 0,
                exposure_write_calls: 0,
            }),
        }
    }
}

fn streams_for(use_case: &UseCaseSpec) -> Vec<SimStream> {
    use_case
        .streams
        .iter()
        .map(|spec| SimStream {
            spec: spec.clone(),
            mode: ExposureMode::Automatic,
            exposure_us: spec.exposure_limits.1,
        })
        .collect()
}

/// Default lens parameters for the simulated sensor
pub fn default_lens() -> LensParameters {
    LensParameters {
        focal_length: (210.0, 210.0),
        principal_point: (112.0, 86.0),
        distortion_radial: [0.12, -0.3, 0.09],
        distortion_tangential: (0.0, 0.0),
    }
}

impl SimulatedDevice {
    pub fn builder(serial: &str) -> SimulatedDeviceBuilder {
        SimulatedDeviceBuilder {
            serial: serial.to_string(),
            name: "SimToF".to_string(),
            use_cases: Vec::new(),
            lens: default_lens(),
        }
    }

    /// A two-mode camera resembling a small time-of-flight module, used by
    /// the CLI when no device description is given
    pub fn default_camera() -> Self {
        Self::builder("SIM0001")
            .name("SimToF 300")
            .use_case(
                UseCaseSpec::new("MODE_9_5FPS").stream(StreamSpec::new(
                    0xA001,
                    224,
                    172,
                    (8, 2000),
                )),
            )
            .use_case(
                UseCaseSpec::new("MODE_MIXED_30_5")
                    .stream(StreamSpec::new(0xB001, 224, 172, (8, 300)))
                    .stream(StreamSpec::new(0xB002, 224, 172, (8, 1300))),
            )
            .build()
    }

    // --- Scripting hooks (tests) ---

    /// Make the next `n` exposure writes return the busy status
    pub fn script_busy(&self, n: u32) {
        self.state.lock().unwrap().busy_remaining = n;
    }

    /// Make the next use-case switch fail
    pub fn script_use_case_failure(&self) {
        self.state.lock().unwrap().fail_next_use_case = true;
    }

    /// Make the next `n` listener registrations fail
    pub fn script_register_failure(&self, n: u32) {
        self.state.lock().unwrap().register_failures_remaining = n;
    }

    // --- Observability (tests and diagnostics) ---

    /// Number of exposure write calls that reached the device
    pub fn exposure_write_calls(&self) -> u32 {
        self.state.lock().unwrap().exposure_write_calls
    }

    /// Last value written for a stream, in microseconds
    pub fn exposure_us(&self, stream: StreamId) -> Option<u32> {
        let state = self.state.lock().unwrap();
        state
            .streams
            .iter()
            .find(|s| s.spec.id == stream)
            .map(|s| s.exposure_us)
    }

    pub fn is_capturing(&self) -> bool {
        self.state.lock().unwrap().capturing
    }

    pub fn point_cloud_listener_registered(&self) -> bool {
        self.state.lock().unwrap().pc_listener.is_some()
    }

    pub fn ir_listener_registered(&self) -> bool {
        self.state.lock().unwrap().ir_listener.is_some()
    }

    // --- Frame and exposure injection ---

    /// Deliver a synthetic point cloud frame for a stream.
    ///
    /// Returns true if the frame was handed to a registered listener while
    /// capture was running, false if it was dropped (matching hardware,
    /// which generates nothing in those states).
    pub fn push_point_cloud(&self, stream: StreamId, timestamp_us: u64) -> bool {
        let (sender, geometry) = {
            let state = self.state.lock().unwrap();
            if !state.capturing {
                return false;
            }
            let Some(sim) = state.streams.iter().find(|s| s.spec.id == stream) else {
                return false;
            };
            match &state.pc_listener {
                Some(tx) => (tx.clone(), (sim.spec.width, sim.spec.height)),
                None => return false,
            }
        };
        let frame = synth_point_cloud(stream, geometry.0, geometry.1, timestamp_us);
        sender.send(DeviceEvent::PointCloud(frame)).is_ok()
    }

    /// Deliver a synthetic intensity frame for a stream
    pub fn push_ir_image(&self, stream: StreamId, timestamp_us: u64) -> bool {
        let (sender, geometry) = {
            let state = self.state.lock().unwrap();
            if !state.capturing {
                return false;
            }
            let Some(sim) = state.streams.iter().find(|s| s.spec.id == stream) else {
                return false;
            };
            match &state.ir_listener {
                Some(tx) => (tx.clone(), (sim.spec.width, sim.spec.height)),
                None => return false,
            }
        };
        let frame = synth_ir_image(stream, geometry.0, geometry.1, timestamp_us);
        sender.send(DeviceEvent::IrImage(frame)).is_ok()
    }

    /// Push an autonomous exposure change, as the hardware does in
    /// automatic mode
    pub fn push_exposure_update(&self, stream: StreamId, micros: u32) -> bool {
        let sender = {
            let mut state = self.state.lock().unwrap();
            if let Some(sim) = state.streams.iter_mut().find(|s| s.spec.id == stream) {
                sim.exposure_us = micros;
            }
            match &state.exposure_listener {
                Some(tx) => tx.clone(),
                None => return false,
            }
        };
        sender
            .send(DeviceEvent::Exposure(ExposureUpdate {
                stream_id: stream,
                micros,
            }))
            .is_ok()
    }

    fn with_stream<T>(
        state: &mut SimState,
        stream: StreamId,
        f: impl FnOnce(&mut SimStream) -> T,
    ) -> DeviceResult<T> {
        state
            .streams
            .iter_mut()
            .find(|s| s.spec.id == stream)
            .map(f)
            .ok_or(DeviceError::UnknownStream(stream))
    }
}

impl DepthDevice for SimulatedDevice {
    fn name(&self) -> DeviceResult<String> {
        Ok(self.name.clone())
    }

    fn serial(&self) -> String {
        self.serial.clone()
    }

    fn initialize(&self) -> DeviceResult<()> {
        let mut state = self.state.lock().unwrap();
        state.initialized = true;
        info!(serial = %self.serial, "Simulated device initialized");
        Ok(())
    }

    fn use_cases(&self) -> DeviceResult<Vec<String>> {
        Ok(self.use_cases.iter().map(|u| u.name.clone()).collect())
    }

    fn current_use_case(&self) -> DeviceResult<String> {
        let state = self.state.lock().unwrap();
        Ok(self.use_cases[state.current_use_case].name.clone())
    }

    fn set_use_case(&self, name: &str) -> DeviceResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.initialized {
            return Err(DeviceError::NotConnected);
        }
        if state.capturing {
            // Mirrors hardware: reconfiguration requires stopped capture
            return Err(DeviceError::Rejected(
                "capture must be stopped before changing the use case".to_string(),
            ));
        }
        if state.fail_next_use_case {
            state.fail_next_use_case = false;
            return Err(DeviceError::Rejected("scripted use case failure".to_string()));
        }
        let Some(idx) = self.use_cases.iter().position(|u| u.name == name) else {
            return Err(DeviceError::UnknownUseCase(name.to_string()));
        };
        state.current_use_case = idx;
        state.streams = streams_for(&self.use_cases[idx]);
        debug!(use_case = name, streams = state.streams.len(), "Use case set");
        Ok(())
    }

    fn stream_ids(&self) -> DeviceResult<Vec<StreamId>> {
        let state = self.state.lock().unwrap();
        if !state.initialized {
            return Err(DeviceError::NotConnected);
        }
        Ok(state.streams.iter().map(|s| s.spec.id).collect())
    }

    fn start_capture(&self) -> DeviceResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.initialized {
            return Err(DeviceError::NotConnected);
        }
        state.capturing = true;
        Ok(())
    }

    fn stop_capture(&self) -> DeviceResult<()> {
        let mut state = self.state.lock().unwrap();
        state.capturing = false;
        Ok(())
    }

    fn exposure_limits(&self, stream: StreamId) -> DeviceResult<(u32, u32)> {
        let mut state = self.state.lock().unwrap();
        Self::with_stream(&mut state, stream, |s| s.spec.exposure_limits)
    }

    fn exposure_mode(&self, stream: StreamId) -> DeviceResult<ExposureMode> {
        let mut state = self.state.lock().unwrap();
        Self::with_stream(&mut state, stream, |s| s.mode)
    }

    fn set_exposure_mode(&self, stream: StreamId, mode: ExposureMode) -> DeviceResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::with_stream(&mut state, stream, |s| s.mode = mode)
    }

    fn set_exposure_time(&self, stream: StreamId, micros: u32) -> DeviceResult<()> {
        let (sender, update) = {
            let mut state = self.state.lock().unwrap();
            state.exposure_write_calls += 1;
            if state.busy_remaining > 0 {
                state.busy_remaining -= 1;
                return Err(DeviceError::Busy);
            }
            Self::with_stream(&mut state, stream, |s| s.exposure_us = micros)?;
            // Hardware confirms applied values through the exposure push
            match &state.exposure_listener {
                Some(tx) => (
                    Some(tx.clone()),
                    ExposureUpdate {
                        stream_id: stream,
                        micros,
                    },
                ),
                None => (None, ExposureUpdate { stream_id: stream, micros }),
            }
        };
        if let Some(tx) = sender {
            let _ = tx.try_send(DeviceEvent::Exposure(update));
        }
        Ok(())
    }

    fn lens_parameters(&self) -> DeviceResult<LensParameters> {
        Ok(self.lens)
    }

    fn register_point_cloud_listener(&self, sender: SyncSender<DeviceEvent>) -> DeviceResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.register_failures_remaining > 0 {
            state.register_failures_remaining -= 1;
            return Err(DeviceError::Rejected("scripted registration failure".to_string()));
        }
        state.pc_listener = Some(sender);
        Ok(())
    }

    fn unregister_point_cloud_listener(&self) -> DeviceResult<()> {
        self.state.lock().unwrap().pc_listener = None;
        Ok(())
    }

    fn register_ir_listener(&self, sender: SyncSender<DeviceEvent>) -> DeviceResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.register_failures_remaining > 0 {
            state.register_failures_remaining -= 1;
            return Err(DeviceError::Rejected("scripted registration failure".to_string()));
        }
        state.ir_listener = Some(sender);
        Ok(())
    }

    fn unregister_ir_listener(&self) -> DeviceResult<()> {
        self.state.lock().unwrap().ir_listener = None;
        Ok(())
    }

    fn register_exposure_listener(&self, sender: SyncSender<DeviceEvent>) -> DeviceResult<()> {
        self.state.lock().unwrap().exposure_listener = Some(sender);
        Ok(())
    }
}

fn synth_point_cloud(stream: StreamId, width: u32, height: u32, timestamp_us: u64) -> PointCloudFrame {
    let mut points = Vec::with_capacity((width * height) as usize);
    for row in 0..height {
        for col in 0..width {
            // Gently sloped plane roughly a meter away
            let z = 1.0 + (row as f32) / (height as f32) * 0.5;
            points.push(PointXyzc {
                x: (col as f32 - width as f32 / 2.0) * 0.002,
                y: (row as f32 - height as f32 / 2.0) * 0.002,
                z,
                confidence: 1.0,
            });
        }
    }
    PointCloudFrame {
        stream_id: stream,
        width,
        height,
        timestamp_us,
        points,
    }
}

fn synth_ir_image(stream: StreamId, width: u32, height: u32, timestamp_us: u64) -> IrFrame {
    let mut data = Vec::with_capacity((width * height) as usize);
    for row in 0..height {
        for col in 0..width {
            data.push(((row + col) % 256) as u8);
        }
    }
    IrFrame {
        stream_id: stream,
        width,
        height,
        timestamp_us,
        data,
    }
}

/// Background frame source driving a [`SimulatedDevice`] at a fixed rate.
///
/// Used by the `run` subcommand so the bridge has live data without
/// hardware. Frames are only delivered while capture is running and the
/// corresponding listener is registered, exactly like the device itself.
pub struct FrameSource {
    handle: Option<JoinHandle<()>>,
    stop: Arc<std::sync::atomic::AtomicBool>,
}

impl FrameSource {
    pub fn spawn(device: Arc<SimulatedDevice>, interval: Duration) -> Self {
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            while !stop_clone.load(std::sync::atomic::Ordering::SeqCst) {
                let ids = device.stream_ids().unwrap_or_default();
                let now_us = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_micros() as u64;
                for id in ids {
                    device.push_point_cloud(id, now_us);
                    device.push_ir_image(id, now_us);
                }
                thread::sleep(interval);
            }
        });
        Self {
            handle: Some(handle),
            stop,
        }
    }

    pub fn stop(&mut self) {
        self.stop.store(true, std::sync::atomic::Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_device() -> SimulatedDevice {
        SimulatedDevice::default_camera()
    }

    #[test]
    fn test_use_case_switch_replaces_streams() {
        let dev = test_device();
        dev.initialize().unwrap();
        assert_eq!(dev.stream_ids().unwrap().len(), 1);

        dev.set_use_case("MODE_MIXED_30_5").unwrap();
        assert_eq!(dev.stream_ids().unwrap().len(), 2);
    }

    #[test]
    fn test_use_case_rejected_while_capturing() {
        let dev = test_device();
        dev.initialize().unwrap();
        dev.start_capture().unwrap();
        assert!(matches!(
            dev.set_use_case("MODE_MIXED_30_5"),
            Err(DeviceError::Rejected(_))
        ));
    }

    #[test]
    fn test_busy_scripting() {
        let dev = test_device();
        dev.initialize().unwrap();
        let id = dev.stream_ids().unwrap()[0];
        dev.script_busy(2);
        assert!(matches!(dev.set_exposure_time(id, 500), Err(DeviceError::Busy)));
        assert!(matches!(dev.set_exposure_time(id, 500), Err(DeviceError::Busy)));
        assert!(dev.set_exposure_time(id, 500).is_ok());
        assert_eq!(dev.exposure_write_calls(), 3);
        assert_eq!(dev.exposure_us(id), Some(500));
    }

    #[test]
    fn test_frames_dropped_without_capture_or_listener() {
        let dev = test_device();
        dev.initialize().unwrap();
        let id = dev.stream_ids().unwrap()[0];

        // No capture, no listener
        assert!(!dev.push_point_cloud(id, 1));

        let (tx, rx) = std::sync::mpsc::sync_channel(4);
        dev.register_point_cloud_listener(tx).unwrap();
        // Listener but capture stopped
        assert!(!dev.push_point_cloud(id, 2));

        dev.start_capture().unwrap();
        assert!(dev.push_point_cloud(id, 3));
        let event = rx.try_recv().unwrap();
        match event {
            DeviceEvent::PointCloud(frame) => {
                assert_eq!(frame.stream_id, id);
                assert_eq!(frame.points.len(), (frame.width * frame.height) as usize);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
