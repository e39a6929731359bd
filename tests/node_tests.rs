// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the bridge node lifecycle

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tof_bridge::device::simulated::SimulatedDevice;
use tof_bridge::device::DepthDevice;
use tof_bridge::errors::{BridgeError, ParameterError};
use tof_bridge::node::CameraNode;
use tof_bridge::params::{ParamValue, ParamWrite};
use tof_bridge::Config;

/// Long enough for at least two demand poll ticks
const DEMAND_SETTLE: Duration = Duration::from_millis(600);

fn mixed_mode_config() -> Config {
    Config {
        node_name: "test_node".to_string(),
        usecase: Some("MODE_MIXED_30_5".to_string()),
        auto_exposure: vec![false, false],
        ..Config::default()
    }
}

fn start_node(config: &Config) -> (Arc<SimulatedDevice>, CameraNode) {
    let device = Arc::new(SimulatedDevice::default_camera());
    let node = CameraNode::start(Arc::clone(&device) as Arc<dyn DepthDevice>, config).unwrap();
    (device, node)
}

#[test]
fn test_startup_declares_device_parameters() {
    let (device, node) = start_node(&mixed_mode_config());
    let gateway = node.gateway();

    assert_eq!(
        gateway.get("serial"),
        Some(ParamValue::Str("SIM0001".to_string()))
    );
    assert_eq!(
        gateway.get("model"),
        Some(ParamValue::Str("SimToF 300".to_string()))
    );
    assert_eq!(
        gateway.get("usecase"),
        Some(ParamValue::Str("MODE_MIXED_30_5".to_string()))
    );
    assert_eq!(
        gateway.get("available_usecases"),
        Some(ParamValue::StrList(vec![
            "MODE_9_5FPS".to_string(),
            "MODE_MIXED_30_5".to_string(),
        ]))
    );

    // Per-stream exposure parameters with the device-reported bounds
    let d0 = gateway.describe("exposure_time_0").unwrap();
    assert_eq!(d0.integer_range, Some((8, 300)));
    let d1 = gateway.describe("exposure_time_1").unwrap();
    assert_eq!(d1.integer_range, Some((8, 1300)));

    assert!(device.is_capturing());
}

#[test]
fn test_manual_exposure_write_reaches_one_stream_only() {
    let (device, node) = start_node(&mixed_mode_config());
    let ids = device.stream_ids().unwrap();

    node.apply_parameters(&[ParamWrite::new("exposure_time_0", ParamValue::Int(150))])
        .unwrap();

    assert_eq!(device.exposure_us(ids[0]), Some(150));
    // Stream 1 keeps its default (the limit maximum)
    assert_eq!(device.exposure_us(ids[1]), Some(1300));
    assert_eq!(
        node.gateway().get("exposure_time_0"),
        Some(ParamValue::Int(150))
    );
}

#[test]
fn test_auto_mode_exposure_write_is_accepted_but_ignored() {
    // Streams default to automatic mode
    let config = Config {
        node_name: "test_node".to_string(),
        ..Config::default()
    };
    let (device, node) = start_node(&config);

    node.apply_parameters(&[ParamWrite::new("exposure_time_0", ParamValue::Int(150))])
        .unwrap();

    assert_eq!(device.exposure_write_calls(), 0);
}

#[test]
fn test_use_case_switch_via_parameter() {
    let (device, node) = start_node(&mixed_mode_config());

    node.apply_parameters(&[ParamWrite::new(
        "usecase",
        ParamValue::Str("MODE_9_5FPS".to_string()),
    )])
    .unwrap();

    assert!(device.is_capturing());
    assert_eq!(device.current_use_case().unwrap(), "MODE_9_5FPS");
    let gateway = node.gateway();
    assert_eq!(
        gateway.get("usecase"),
        Some(ParamValue::Str("MODE_9_5FPS".to_string()))
    );
    // Stream 1's parameters are gone, stream 0's bounds widened
    assert!(!gateway.is_declared("exposure_time_1"));
    assert!(!gateway.is_declared("auto_exposure_1"));
    let d0 = gateway.describe("exposure_time_0").unwrap();
    assert_eq!(d0.integer_range, Some((8, 2000)));
}

#[test]
fn test_conflicting_batch_rejected_wholesale() {
    let (device, node) = start_node(&mixed_mode_config());

    let result = node.apply_parameters(&[
        ParamWrite::new("auto_exposure_0", ParamValue::Bool(true)),
        ParamWrite::new("exposure_time_0", ParamValue::Int(150)),
    ]);

    assert!(matches!(
        result,
        Err(BridgeError::Parameter(ParameterError::ConflictingBatch(0)))
    ));
    // Nothing was applied
    assert_eq!(device.exposure_write_calls(), 0);
    assert_eq!(
        node.gateway().get("auto_exposure_0"),
        Some(ParamValue::Bool(false))
    );
}

#[test]
fn test_batch_stops_at_first_failure_without_rollback() {
    let (device, node) = start_node(&mixed_mode_config());
    let ids = device.stream_ids().unwrap();

    let result = node.apply_parameters(&[
        ParamWrite::new("exposure_time_0", ParamValue::Int(150)),
        // Out of range for stream 1
        ParamWrite::new("exposure_time_1", ParamValue::Int(5000)),
    ]);

    assert!(result.is_err());
    // The first item stays applied
    assert_eq!(device.exposure_us(ids[0]), Some(150));
    assert_eq!(
        node.gateway().get("exposure_time_0"),
        Some(ParamValue::Int(150))
    );
    assert_eq!(
        node.gateway().get("exposure_time_1"),
        Some(ParamValue::Int(1300))
    );
}

#[test]
fn test_demand_drives_frame_delivery() {
    let config = Config {
        node_name: "test_node".to_string(),
        ..Config::default()
    };
    let (device, node) = start_node(&config);
    let id = device.stream_ids().unwrap()[0];

    // Without consumers the device generates nothing
    thread::sleep(DEMAND_SETTLE);
    assert!(!device.point_cloud_listener_registered());
    assert!(!device.push_point_cloud(id, 1));

    let sub = node.topics().read().unwrap().cloud[0].subscribe();
    thread::sleep(DEMAND_SETTLE);
    assert!(device.point_cloud_listener_registered());

    assert!(device.push_point_cloud(id, 42));
    let msg = sub.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(msg.width, 224);
    assert_eq!(msg.height, 172);
    assert_eq!(msg.header.stamp_ns, 42_000);
    assert_eq!(msg.header.frame_id, "test_node_optical_frame");

    // Dropping the last consumer unregisters the listener again
    drop(sub);
    thread::sleep(DEMAND_SETTLE);
    assert!(!device.point_cloud_listener_registered());
    assert!(!device.push_point_cloud(id, 43));
}

#[test]
fn test_hardware_exposure_push_updates_parameter() {
    let (device, node) = start_node(&Config {
        node_name: "test_node".to_string(),
        ..Config::default()
    });
    let id = device.stream_ids().unwrap()[0];
    let updates = node.gateway().subscribe_updates();

    assert!(device.push_exposure_update(id, 180));

    let update = updates.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(update.name, "exposure_time_0");
    assert_eq!(update.value, ParamValue::Int(180));
    assert_eq!(
        node.gateway().get("exposure_time_0"),
        Some(ParamValue::Int(180))
    );
}

#[test]
fn test_shutdown_stops_capture_and_is_idempotent() {
    let (device, mut node) = start_node(&mixed_mode_config());
    assert!(device.is_capturing());

    node.shutdown();
    assert!(!device.is_capturing());

    node.shutdown();
    assert!(!device.is_capturing());
}
