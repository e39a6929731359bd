// SPDX-License-Identifier: GPL-3.0-only

//! In-process publish/subscribe transport
//!
//! Topics are typed, many-to-many and non-blocking: publishing clones the
//! payload to each live subscriber and drops it for subscribers whose queue
//! is full, so a slow consumer never stalls the frame dispatcher. The live
//! consumer count of each topic is the sole input to listener demand
//! tracking.

use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::Serialize;

use crate::constants::SUBSCRIBER_QUEUE_DEPTH;

/// Common payload header
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
    /// Coordinate frame the payload is expressed in
    pub frame_id: String,
    /// Hardware timestamp in nanoseconds
    pub stamp_ns: u64,
}

/// Pixel encoding of an image payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImageEncoding {
    /// Single-channel 32-bit float (depth in meters)
    Float32,
    /// Single-channel 8-bit (intensity)
    Mono8,
}

impl ImageEncoding {
    /// Bytes per pixel for this encoding
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            ImageEncoding::Float32 => 4,
            ImageEncoding::Mono8 => 1,
        }
    }
}

/// Dense point cloud payload: one (x, y, z, confidence) f32 record per pixel
#[derive(Debug, Clone, Serialize)]
pub struct PointCloudMsg {
    pub header: Header,
    pub width: u32,
    pub height: u32,
    /// Bytes per point record
    pub point_step: u32,
    /// Bytes per row
    pub row_step: u32,
    /// Packed records, row-major
    pub data: Vec<u8>,
}

/// Single-channel image payload
#[derive(Debug, Clone, Serialize)]
pub struct ImageMsg {
    pub header: Header,
    pub width: u32,
    pub height: u32,
    pub encoding: ImageEncoding,
    /// Bytes per row
    pub step: u32,
    pub data: Vec<u8>,
}

/// Calibration snapshot published alongside every frame
#[derive(Debug, Clone, Serialize)]
pub struct CameraInfoMsg {
    pub header: Header,
    pub width: u32,
    pub height: u32,
    pub distortion_model: String,
    /// Distortion coefficients (k1, k2, p1, p2, k3)
    pub d: [f64; 5],
    /// 3x3 intrinsic matrix, row-major
    pub k: [f64; 9],
    /// 3x3 rectification matrix, row-major
    pub r: [f64; 9],
    /// 3x4 projection matrix, row-major
    pub p: [f64; 12],
}

struct Slot<T> {
    tx: SyncSender<T>,
    alive: Weak<()>,
}

/// A typed topic. Clonable handle; all clones publish to the same
/// subscriber set.
pub struct Topic<T> {
    name: String,
    slots: Arc<Mutex<Vec<Slot<T>>>>,
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<T: Clone> Topic<T> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            slots: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a new consumer. Dropping the returned subscriber detaches it
    /// and is immediately visible in [`Topic::consumer_count`].
    pub fn subscribe(&self) -> Subscriber<T> {
        let (tx, rx) = std::sync::mpsc::sync_channel(SUBSCRIBER_QUEUE_DEPTH);
        let token = Arc::new(());
        self.slots.lock().unwrap().push(Slot {
            tx,
            alive: Arc::downgrade(&token),
        });
        Subscriber { rx, _token: token }
    }

    /// Number of live consumers
    pub fn consumer_count(&self) -> usize {
        let mut slots = self.slots.lock().unwrap();
        slots.retain(|s| s.alive.upgrade().is_some());
        slots.len()
    }

    /// Deliver a payload to every live consumer. Full queues drop the
    /// payload for that consumer only.
    pub fn publish(&self, msg: &T) {
        let mut slots = self.slots.lock().unwrap();
        slots.retain(|slot| {
            if slot.alive.upgrade().is_none() {
                return false;
            }
            match slot.tx.try_send(msg.clone()) {
                Ok(()) | Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
    }
}

/// Receiving end of a topic subscription
pub struct Subscriber<T> {
    rx: Receiver<T>,
    _token: Arc<()>,
}

impl<T> Subscriber<T> {
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        self.rx.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let topic: Topic<u32> = Topic::new("t");
        let a = topic.subscribe();
        let b = topic.subscribe();

        topic.publish(&7);

        assert_eq!(a.try_recv().unwrap(), 7);
        assert_eq!(b.try_recv().unwrap(), 7);
    }

    #[test]
    fn test_consumer_count_tracks_drops() {
        let topic: Topic<u32> = Topic::new("t");
        assert_eq!(topic.consumer_count(), 0);

        let a = topic.subscribe();
        let b = topic.subscribe();
        assert_eq!(topic.consumer_count(), 2);

        drop(a);
        assert_eq!(topic.consumer_count(), 1);
        drop(b);
        assert_eq!(topic.consumer_count(), 0);
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let topic: Topic<u32> = Topic::new("t");
        let sub = topic.subscribe();

        for i in 0..(SUBSCRIBER_QUEUE_DEPTH as u32 + 5) {
            topic.publish(&i);
        }

        // Queue holds the first SUBSCRIBER_QUEUE_DEPTH payloads; the rest
        // were dropped, and the subscriber is still attached.
        assert_eq!(topic.consumer_count(), 1);
        assert_eq!(sub.try_recv().unwrap(), 0);
    }

    #[test]
    fn test_clone_publishes_to_same_subscribers() {
        let topic: Topic<&'static str> = Topic::new("t");
        let sub = topic.subscribe();
        let handle = topic.clone();

        handle.publish(&"hello");
        assert_eq!(sub.try_recv().unwrap(), "hello");
    }
}
