// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Total attempts for an exposure write while the device reports busy
pub const EXPOSURE_RETRY_ATTEMPTS: u32 = 5;

/// Pause between exposure write attempts when the device is busy
pub const EXPOSURE_RETRY_PAUSE: Duration = Duration::from_millis(200);

/// Interval of the consumer-demand poll that drives listener registration.
///
/// Deliberately coarse. Registration churn is more expensive than a few
/// hundred milliseconds of unconsumed frames, so demand changes are picked
/// up on the next tick rather than edge-triggered.
pub const DEMAND_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Depth of the bounded queue carrying device events to the dispatcher
pub const DEVICE_EVENT_QUEUE_DEPTH: usize = 16;

/// Depth of each subscriber's queue; full queues drop, never block
pub const SUBSCRIBER_QUEUE_DEPTH: usize = 16;

/// How long the dispatch loop waits for an event before re-checking its
/// stop signal
pub const DISPATCH_RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Bytes per point cloud record: x, y, z, confidence as f32
pub const POINT_STEP: u32 = 16;

/// Distortion model reported in calibration info
pub const DISTORTION_MODEL: &str = "plumb_bob";

/// Parameter names exposed through the gateway
pub const PARAM_SERIAL: &str = "serial";
pub const PARAM_MODEL: &str = "model";
pub const PARAM_USECASE: &str = "usecase";
pub const PARAM_AVAILABLE_USECASES: &str = "available_usecases";
pub const PARAM_AUTO_EXPOSURE_PREFIX: &str = "auto_exposure_";
pub const PARAM_EXPOSURE_TIME_PREFIX: &str = "exposure_time_";

/// Topic name for the calibration info channel
pub fn camera_info_topic(node_name: &str) -> String {
    format!("{}/camera_info", node_name)
}

/// Topic name for the point cloud channel of a stream index
pub fn point_cloud_topic(node_name: &str, stream: usize) -> String {
    format!("{}/point_cloud_{}", node_name, stream)
}

/// Topic name for the depth image channel of a stream index
pub fn depth_image_topic(node_name: &str, stream: usize) -> String {
    format!("{}/depth_image_{}", node_name, stream)
}

/// Topic name for the gray image channel of a stream index
pub fn gray_image_topic(node_name: &str, stream: usize) -> String {
    format!("{}/gray_image_{}", node_name, stream)
}

/// Frame id attached to every published payload header
pub fn optical_frame_id(node_name: &str) -> String {
    format!("{}_optical_frame", node_name)
}
