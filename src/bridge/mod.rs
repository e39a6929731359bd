// SPDX-License-Identifier: GPL-3.0-only

//! Device-state coordination layer
//!
//! Everything between the raw device and the pub/sub transport: the stream
//! index map, exposure control, use-case switching, demand-driven listener
//! registration and frame dispatch.

pub mod calibration;
pub mod demand;
pub mod dispatch;
pub mod exposure;
pub mod stream_map;
pub mod usecase;
pub mod worker;

use std::sync::atomic::{AtomicBool, Ordering};

use crate::constants::{
    camera_info_topic, depth_image_topic, gray_image_topic, point_cloud_topic,
};
use crate::pubsub::{CameraInfoMsg, ImageMsg, PointCloudMsg, Topic};

/// Which output kinds currently have at least one consumer anywhere.
///
/// Maintained by the demand tracker on every poll tick and read by the
/// dispatcher to skip payload construction nobody pays attention to.
/// Advisory state; last-write-wins races are tolerable.
#[derive(Debug, Default)]
pub struct PublishFlags {
    cloud: AtomicBool,
    depth: AtomicBool,
    gray: AtomicBool,
}

impl PublishFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, cloud: bool, depth: bool, gray: bool) {
        self.cloud.store(cloud, Ordering::Relaxed);
        self.depth.store(depth, Ordering::Relaxed);
        self.gray.store(gray, Ordering::Relaxed);
    }

    pub fn cloud(&self) -> bool {
        self.cloud.load(Ordering::Relaxed)
    }

    pub fn depth(&self) -> bool {
        self.depth.load(Ordering::Relaxed)
    }

    pub fn gray(&self) -> bool {
        self.gray.load(Ordering::Relaxed)
    }
}

/// The per-stream output channels plus the shared calibration channel.
///
/// Indexed by dense stream index. Resized on use-case switches; topics of
/// surviving indices are kept so their subscribers stay attached.
pub struct TopicSet {
    node_name: String,
    pub cloud: Vec<Topic<PointCloudMsg>>,
    pub depth: Vec<Topic<ImageMsg>>,
    pub gray: Vec<Topic<ImageMsg>>,
    pub info: Topic<CameraInfoMsg>,
}

impl TopicSet {
    pub fn new(node_name: &str, streams: usize) -> Self {
        let mut set = Self {
            node_name: node_name.to_string(),
            cloud: Vec::new(),
            depth: Vec::new(),
            gray: Vec::new(),
            info: Topic::new(&camera_info_topic(node_name)),
        };
        set.resize(streams);
        set
    }

    /// Grow or shrink the per-stream channels to `streams` entries
    pub fn resize(&mut self, streams: usize) {
        while self.cloud.len() < streams {
            let i = self.cloud.len();
            self.cloud
                .push(Topic::new(&point_cloud_topic(&self.node_name, i)));
            self.depth
                .push(Topic::new(&depth_image_topic(&self.node_name, i)));
            self.gray
                .push(Topic::new(&gray_image_topic(&self.node_name, i)));
        }
        self.cloud.truncate(streams);
        self.depth.truncate(streams);
        self.gray.truncate(streams);
    }

    pub fn stream_count(&self) -> usize {
        self.cloud.len()
    }
}
