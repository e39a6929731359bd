// SPDX-License-Identifier: GPL-3.0-only

//! Frame dispatch
//!
//! Consumes the bounded device event queue on its own thread and turns
//! frames into typed payloads. Payload construction is independent per
//! output kind and gated by the demand flags, so nothing is built for a
//! kind without consumers. Frames whose stream id is not part of the
//! current use case (a race during a switch) are dropped with a logged
//! error, never propagated.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::constants::{DISPATCH_RECV_TIMEOUT, POINT_STEP};
use crate::device::{DeviceEvent, IrFrame, PointCloudFrame};
use crate::pubsub::{Header, ImageEncoding, ImageMsg, PointCloudMsg};

use super::calibration::Calibration;
use super::exposure::ExposureController;
use super::stream_map::StreamIndexMap;
use super::worker::{LoopAction, LoopController};
use super::{PublishFlags, TopicSet};

pub struct FrameDispatcher {
    frame_id: String,
    stream_map: Arc<RwLock<StreamIndexMap>>,
    topics: Arc<RwLock<TopicSet>>,
    calibration: Arc<RwLock<Calibration>>,
    flags: Arc<PublishFlags>,
    exposure: Arc<ExposureController>,
}

impl FrameDispatcher {
    pub fn new(
        frame_id: String,
        stream_map: Arc<RwLock<StreamIndexMap>>,
        topics: Arc<RwLock<TopicSet>>,
        calibration: Arc<RwLock<Calibration>>,
        flags: Arc<PublishFlags>,
        exposure: Arc<ExposureController>,
    ) -> Self {
        Self {
            frame_id,
            stream_map,
            topics,
            calibration,
            flags,
            exposure,
        }
    }

    /// Consume the event queue until stopped or the device side hangs up
    pub fn spawn(self, events: Receiver<DeviceEvent>) -> LoopController {
        LoopController::start("frame-dispatch", move || {
            match events.recv_timeout(DISPATCH_RECV_TIMEOUT) {
                Ok(event) => {
                    self.handle(event);
                    LoopAction::Continue
                }
                Err(RecvTimeoutError::Timeout) => LoopAction::Continue,
                Err(RecvTimeoutError::Disconnected) => LoopAction::Stop,
            }
        })
    }

    /// Route one device event
    pub fn handle(&self, event: DeviceEvent) {
        match event {
            DeviceEvent::PointCloud(frame) => self.handle_point_cloud(frame),
            DeviceEvent::IrImage(frame) => self.handle_ir_image(frame),
            DeviceEvent::Exposure(update) => self.exposure.on_hardware_exposure_update(update),
        }
    }

    fn header(&self, timestamp_us: u64) -> Header {
        Header {
            frame_id: self.frame_id.clone(),
            stamp_ns: timestamp_us * 1000,
        }
    }

    fn handle_point_cloud(&self, frame: PointCloudFrame) {
        let index = match self.stream_map.read().unwrap().lookup(frame.stream_id) {
            Ok(index) => index,
            Err(e) => {
                warn!(stream_id = %frame.stream_id, error = %e, "Dropping 3D frame");
                return;
            }
        };

        let header = self.header(frame.timestamp_us);
        let topics = self.topics.read().unwrap();
        if index >= topics.stream_count() {
            warn!(stream = index, "Dropping 3D frame, no channel for stream index");
            return;
        }

        if self.flags.cloud() {
            let msg = PointCloudMsg {
                header: header.clone(),
                width: frame.width,
                height: frame.height,
                point_step: POINT_STEP,
                row_step: POINT_STEP * frame.width,
                data: bytemuck::cast_slice(&frame.points).to_vec(),
            };
            topics.cloud[index].publish(&msg);
        }

        if self.flags.depth() {
            // Depth is the z slot of each point cloud record
            let depth: Vec<f32> = frame.points.iter().map(|p| p.z).collect();
            let msg = ImageMsg {
                header: header.clone(),
                width: frame.width,
                height: frame.height,
                encoding: ImageEncoding::Float32,
                step: ImageEncoding::Float32.bytes_per_pixel() * frame.width,
                data: bytemuck::cast_slice(&depth).to_vec(),
            };
            topics.depth[index].publish(&msg);
        }

        let info = self
            .calibration
            .read()
            .unwrap()
            .to_msg(header, frame.width, frame.height);
        topics.info.publish(&info);
    }

    fn handle_ir_image(&self, frame: IrFrame) {
        let index = match self.stream_map.read().unwrap().lookup(frame.stream_id) {
            Ok(index) => index,
            Err(e) => {
                warn!(stream_id = %frame.stream_id, error = %e, "Dropping intensity frame");
                return;
            }
        };

        let header = self.header(frame.timestamp_us);
        let topics = self.topics.read().unwrap();
        if index >= topics.stream_count() {
            warn!(stream = index, "Dropping intensity frame, no channel for stream index");
            return;
        }

        if self.flags.gray() {
            let msg = ImageMsg {
                header: header.clone(),
                width: frame.width,
                height: frame.height,
                encoding: ImageEncoding::Mono8,
                step: frame.width,
                data: frame.data,
            };
            topics.gray[index].publish(&msg);
        } else {
            return;
        }

        let info = self
            .calibration
            .read()
            .unwrap()
            .to_msg(header, frame.width, frame.height);
        topics.info.publish(&info);
    }
}
