// SPDX-License-Identifier: GPL-3.0-only

//! Calibration info derived from device lens parameters
//!
//! Captured once at startup and refreshed on every use-case change,
//! otherwise constant. The matrix layout follows the plumb_bob convention:
//! D = (k1, k2, p1, p2, k3), K the 3x3 intrinsic matrix, R identity (no
//! stereo rectification), P the 3x4 projection built from K.

use crate::constants::DISTORTION_MODEL;
use crate::device::LensParameters;
use crate::pubsub::{CameraInfoMsg, Header};

#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    pub d: [f64; 5],
    pub k: [f64; 9],
    pub r: [f64; 9],
    pub p: [f64; 12],
}

impl Calibration {
    pub fn from_lens(lens: &LensParameters) -> Self {
        let (fx, fy) = lens.focal_length;
        let (cx, cy) = lens.principal_point;
        let [k1, k2, k3] = lens.distortion_radial;
        let (p1, p2) = lens.distortion_tangential;

        Self {
            d: [k1, k2, p1, p2, k3],
            k: [fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0],
            r: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            p: [fx, 0.0, cx, 0.0, 0.0, fy, cy, 0.0, 0.0, 0.0, 1.0, 0.0],
        }
    }

    /// Snapshot as a publishable payload for a frame's geometry and stamp
    pub fn to_msg(&self, header: Header, width: u32, height: u32) -> CameraInfoMsg {
        CameraInfoMsg {
            header,
            width,
            height,
            distortion_model: DISTORTION_MODEL.to_string(),
            d: self.d,
            k: self.k,
            r: self.r,
            p: self.p,
        }
    }
}
