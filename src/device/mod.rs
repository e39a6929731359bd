// SPDX-License-Identifier: GPL-3.0-only

//! Depth camera device abstraction
//!
//! [`DepthDevice`] is the boundary to the camera SDK. The bridge core only
//! ever talks to this trait, which keeps the coordination logic testable
//! against the simulated backend and portable across SDK versions.
//!
//! Frame delivery is message based: registering a listener hands the device
//! a bounded channel sender, and the device pushes [`DeviceEvent`]s from its
//! own delivery context. Stopping capture guarantees that no further events
//! are in flight once the call returns.

pub mod simulated;

use std::fmt;
use std::sync::mpsc::SyncSender;

use bytemuck::{Pod, Zeroable};

/// Opaque device-assigned stream identifier.
///
/// Not guaranteed contiguous or stable across use-case changes; the bridge
/// maps these to dense indices via the stream index map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u16);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-stream exposure mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureMode {
    /// Device adjusts exposure autonomously and pushes updates
    Automatic,
    /// Exposure time is set explicitly
    Manual,
}

/// Errors returned by device calls
#[derive(Debug, Clone)]
pub enum DeviceError {
    /// Transient: the device cannot apply the mutation yet. The only
    /// status that is retried.
    Busy,
    /// No suitable camera was found during probing
    NoCameraFound,
    /// Device has not been initialized or the connection was lost
    NotConnected,
    /// The requested use case is not available on this device
    UnknownUseCase(String),
    /// The stream id is not part of the active use case
    UnknownStream(StreamId),
    /// Any other non-success status; never retried
    Rejected(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Busy => write!(f, "device is busy"),
            DeviceError::NoCameraFound => write!(f, "no suitable cameras found"),
            DeviceError::NotConnected => write!(f, "device not connected"),
            DeviceError::UnknownUseCase(name) => write!(f, "unknown use case '{}'", name),
            DeviceError::UnknownStream(id) => write!(f, "unknown stream {}", id),
            DeviceError::Rejected(msg) => write!(f, "device rejected operation: {}", msg),
        }
    }
}

impl std::error::Error for DeviceError {}

/// Result type alias for device calls
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Lens parameters reported by the device, used to derive calibration info
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LensParameters {
    /// Focal length (fx, fy) in pixels
    pub focal_length: (f64, f64),
    /// Principal point (cx, cy) in pixels
    pub principal_point: (f64, f64),
    /// Radial distortion coefficients (k1, k2, k3)
    pub distortion_radial: [f64; 3],
    /// Tangential distortion coefficients (p1, p2)
    pub distortion_tangential: (f64, f64),
}

/// One point cloud sample: coordinates in meters plus confidence.
///
/// Matches the wire layout of point cloud payloads, so frames can be packed
/// into publication buffers without per-point conversion.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct PointXyzc {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub confidence: f32,
}

/// A 3D frame delivered by the device.
///
/// Dense and row-major: `points.len() == width * height`, one record per
/// pixel regardless of confidence.
#[derive(Debug, Clone)]
pub struct PointCloudFrame {
    pub stream_id: StreamId,
    pub width: u32,
    pub height: u32,
    /// Hardware timestamp in microseconds
    pub timestamp_us: u64,
    pub points: Vec<PointXyzc>,
}

/// An intensity frame delivered by the device, one byte per pixel
#[derive(Debug, Clone)]
pub struct IrFrame {
    pub stream_id: StreamId,
    pub width: u32,
    pub height: u32,
    /// Hardware timestamp in microseconds
    pub timestamp_us: u64,
    pub data: Vec<u8>,
}

/// Pushed by the device when it autonomously changes exposure
/// (automatic mode)
#[derive(Debug, Clone, Copy)]
pub struct ExposureUpdate {
    pub stream_id: StreamId,
    /// New exposure time in microseconds
    pub micros: u32,
}

/// Asynchronous device push, delivered into the dispatcher's bounded queue
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    PointCloud(PointCloudFrame),
    IrImage(IrFrame),
    Exposure(ExposureUpdate),
}

/// Pick a camera from a probed device set.
///
/// With a serial the match must be exact; without one the first device
/// wins. An empty set or a serial nobody carries is [`DeviceError::NoCameraFound`].
pub fn probe<D>(devices: Vec<std::sync::Arc<D>>, serial: Option<&str>) -> DeviceResult<std::sync::Arc<D>>
where
    D: DepthDevice + ?Sized,
{
    match serial {
        Some(serial) => devices.into_iter().find(|d| d.serial() == serial),
        None => devices.into_iter().next(),
    }
    .ok_or(DeviceError::NoCameraFound)
}

/// Boundary to the camera SDK.
///
/// Mutating calls may block for the duration of a retry loop upstream, so
/// they must never be invoked from the frame-delivery context.
pub trait DepthDevice: Send + Sync {
    /// Camera model name
    fn name(&self) -> DeviceResult<String>;

    /// Camera serial number
    fn serial(&self) -> String;

    /// One-time initialization; must precede every other call
    fn initialize(&self) -> DeviceResult<()>;

    /// Names of all operating modes supported by this device
    fn use_cases(&self) -> DeviceResult<Vec<String>>;

    /// Name of the active operating mode
    fn current_use_case(&self) -> DeviceResult<String>;

    /// Switch the operating mode. Replaces the stream set; capture must be
    /// stopped first.
    fn set_use_case(&self, name: &str) -> DeviceResult<()>;

    /// Stream identifiers of the active use case, in enumeration order.
    /// This order defines the dense stream indices.
    fn stream_ids(&self) -> DeviceResult<Vec<StreamId>>;

    fn start_capture(&self) -> DeviceResult<()>;

    /// Stop capture. After this returns, no further frame events are in
    /// flight.
    fn stop_capture(&self) -> DeviceResult<()>;

    /// Exposure time bounds (min, max) in microseconds for a stream
    fn exposure_limits(&self, stream: StreamId) -> DeviceResult<(u32, u32)>;

    fn exposure_mode(&self, stream: StreamId) -> DeviceResult<ExposureMode>;

    fn set_exposure_mode(&self, stream: StreamId, mode: ExposureMode) -> DeviceResult<()>;

    /// Write a manual exposure time. May fail with [`DeviceError::Busy`]
    /// transiently.
    fn set_exposure_time(&self, stream: StreamId, micros: u32) -> DeviceResult<()>;

    fn lens_parameters(&self) -> DeviceResult<LensParameters>;

    /// Enable generation and delivery of 3D frames
    fn register_point_cloud_listener(&self, sender: SyncSender<DeviceEvent>) -> DeviceResult<()>;

    fn unregister_point_cloud_listener(&self) -> DeviceResult<()>;

    /// Enable generation and delivery of intensity frames
    fn register_ir_listener(&self, sender: SyncSender<DeviceEvent>) -> DeviceResult<()>;

    fn unregister_ir_listener(&self) -> DeviceResult<()>;

    /// Subscribe to autonomous exposure changes
    fn register_exposure_listener(&self, sender: SyncSender<DeviceEvent>) -> DeviceResult<()>;
}

#[cfg(test)]
mod tests {
    use super::simulated::SimulatedDevice;
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_probe_by_serial() {
        let devices = vec![
            Arc::new(SimulatedDevice::builder("A").use_case(
                super::simulated::UseCaseSpec::new("M").stream(
                    super::simulated::StreamSpec::new(1, 8, 8, (8, 100)),
                ),
            ).build()),
            Arc::new(SimulatedDevice::default_camera()),
        ];

        let picked = probe(devices.clone(), Some("SIM0001")).unwrap();
        assert_eq!(picked.serial(), "SIM0001");

        let first = probe(devices.clone(), None).unwrap();
        assert_eq!(first.serial(), "A");

        assert!(matches!(
            probe(devices, Some("NOPE")),
            Err(DeviceError::NoCameraFound)
        ));
        assert!(matches!(
            probe(Vec::<Arc<SimulatedDevice>>::new(), None),
            Err(DeviceError::NoCameraFound)
        ));
    }
}
