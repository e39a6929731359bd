// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! Both commands run against the simulated camera backend. `list` prints
//! the device's use cases with their stream geometry and exposure bounds,
//! `run` brings the whole bridge up and feeds it synthetic frames until
//! interrupted.

use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::Duration;

use tof_bridge::config::Config;
use tof_bridge::device::simulated::{FrameSource, SimulatedDevice};
use tof_bridge::device::DepthDevice;
use tof_bridge::node::CameraNode;

/// Interval between synthetic frames fed to the running bridge
const FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// List the use cases of the simulated camera
pub fn list_use_cases() -> Result<(), Box<dyn std::error::Error>> {
    let device = SimulatedDevice::default_camera();
    device.initialize()?;

    println!("{} (serial {})", device.name()?, device.serial());
    println!();
    for use_case in device.use_cases()? {
        device.set_use_case(&use_case)?;
        println!("  {}", use_case);
        for (index, id) in device.stream_ids()?.iter().enumerate() {
            let (min, max) = device.exposure_limits(*id)?;
            println!(
                "    stream {} (id {}): exposure {}..{} us",
                index, id, min, max
            );
        }
    }
    Ok(())
}

/// Run the bridge until Ctrl-C
pub fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config_path {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    let device = tof_bridge::device::probe(
        vec![Arc::new(SimulatedDevice::default_camera())],
        config.serial.as_deref(),
    )?;

    let mut node = CameraNode::start(
        Arc::clone(&device) as Arc<dyn DepthDevice>,
        &config,
    )?;
    let _source = FrameSource::spawn(Arc::clone(&device), FRAME_INTERVAL);

    let (stop_tx, stop_rx) = channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })?;

    println!("Bridge running as '{}'. Press Ctrl-C to stop.", config.node_name);
    let _ = stop_rx.recv();

    node.shutdown();
    Ok(())
}
