// SPDX-License-Identifier: GPL-3.0-only

//! tof-bridge - A pub/sub bridge for multi-stream time-of-flight depth cameras
//!
//! This library exposes a stateful depth camera as a set of typed pub/sub
//! topics (point clouds, depth images, intensity images, calibration info)
//! plus a declarative parameter surface for use-case switching and exposure
//! control.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`device`]: Depth camera abstraction and the simulated backend
//! - [`bridge`]: Coordination between device state and the outputs
//!   (stream indexing, exposure control, use-case switching, demand
//!   tracking, frame dispatch)
//! - [`node`]: Lifecycle of one running bridge
//! - [`params`]: Parameter gateway with validation and change notification
//! - [`pubsub`]: In-process typed topics with live consumer counts
//! - [`config`]: Startup configuration handling

pub mod bridge;
pub mod config;
pub mod constants;
pub mod device;
pub mod errors;
pub mod node;
pub mod params;
pub mod pubsub;

// Re-export commonly used types
pub use config::Config;
pub use errors::{BridgeError, BridgeResult, ParameterError};
pub use node::CameraNode;
pub use params::{ParamValue, ParamWrite};
