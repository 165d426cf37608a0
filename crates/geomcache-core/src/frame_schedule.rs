//! I/B frame layout of a cache and the dependency counts derived from it.
//!
//! Everything here is a pure function of the frame count and the B-frame
//! settings, so the number of readers of every raw frame is known before
//! encoding starts. A mesh drops a raw frame when its last reader is done.

use std::ops::RangeInclusive;

use crate::file_format::FrameType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSchedule {
    frame_types: Vec<FrameType>,
    previous_index_frame: Vec<u32>,
    next_index_frame: Vec<u32>,
}

impl FrameSchedule {
    /// Tick `t` is an I-frame when B-frames are off, it is the last tick, or
    /// `t % index_frame_distance == 0`.
    pub fn new(num_frames: u32, use_b_frames: bool, index_frame_distance: u32) -> Self {
        let distance = index_frame_distance.max(1);
        let n = num_frames as usize;
        let frame_types: Vec<FrameType> = (0..num_frames)
            .map(|t| {
                if !use_b_frames || t + 1 == num_frames || t % distance == 0 {
                    FrameType::IFrame
                } else {
                    FrameType::BFrame
                }
            })
            .collect();

        let mut previous_index_frame = vec![0u32; n];
        let mut last = 0u32;
        for t in 0..n {
            if frame_types[t] == FrameType::IFrame {
                last = t as u32;
            }
            previous_index_frame[t] = last;
        }

        let mut next_index_frame = vec![0u32; n];
        let mut next = num_frames.saturating_sub(1);
        for t in (0..n).rev() {
            if frame_types[t] == FrameType::IFrame {
                next = t as u32;
            }
            next_index_frame[t] = next;
        }

        Self {
            frame_types,
            previous_index_frame,
            next_index_frame,
        }
    }

    pub fn num_frames(&self) -> u32 {
        self.frame_types.len() as u32
    }

    pub fn frame_type(&self, tick: u32) -> FrameType {
        self.frame_types[tick as usize]
    }

    pub fn is_index_frame(&self, tick: u32) -> bool {
        self.frame_type(tick) == FrameType::IFrame
    }

    /// Closest I-frame at or before `tick`.
    pub fn floor_index_frame(&self, tick: u32) -> u32 {
        self.previous_index_frame[tick as usize]
    }

    /// Closest I-frame at or after `tick`.
    pub fn ceil_index_frame(&self, tick: u32) -> u32 {
        self.next_index_frame[tick as usize]
    }

    /// Ticks whose motion references (`t - 1`, `t - 2`) a B-frame reads.
    pub fn motion_references(&self, tick: u32) -> Option<(u32, u32)> {
        if self.is_index_frame(tick) || tick < 2 {
            None
        } else {
            Some((tick - 2, tick - 1))
        }
    }

    /// Ticks a mesh encodes once raw frame `tick` has arrived.
    ///
    /// B-frames wait for their ceiling I-frame; its arrival releases every
    /// tick after the previous I-frame, in ascending order.
    pub fn encode_batch(&self, tick: u32) -> Option<RangeInclusive<u32>> {
        if !self.is_index_frame(tick) {
            return None;
        }
        let start = if tick == 0 {
            0
        } else {
            self.floor_index_frame(tick - 1) + 1
        };
        Some(start..=tick)
    }

    /// How many encode steps read raw frame `tick`, its own encode included.
    ///
    /// A B-frame reads its floor and ceiling I-frames, itself, and the two
    /// previous ticks when it has them.
    pub fn raw_frame_readers(&self, tick: u32) -> u32 {
        let n = self.num_frames();
        let mut readers = 1;

        if self.is_index_frame(tick) {
            let b_frames_between = |lo: u32, hi: u32| {
                if hi > lo + 1 {
                    (lo + 1..hi).filter(|&t| !self.is_index_frame(t)).count() as u32
                } else {
                    0
                }
            };
            if tick > 0 {
                readers += b_frames_between(self.floor_index_frame(tick - 1), tick);
            }
            if tick + 1 < n {
                readers += b_frames_between(tick, self.ceil_index_frame(tick + 1));
            }
        }

        for t in [tick + 1, tick + 2] {
            if t < n && self.motion_references(t).is_some() {
                readers += 1;
            }
        }
        readers
    }

    /// Raw frames read when encoding `tick`, each listed once per read.
    pub fn raw_frames_read_by(&self, tick: u32) -> Vec<u32> {
        match self.frame_type(tick) {
            FrameType::IFrame => vec![tick],
            FrameType::BFrame => {
                let mut reads = vec![self.floor_index_frame(tick), self.ceil_index_frame(tick), tick];
                if let Some((prev0, prev1)) = self.motion_references(tick) {
                    reads.push(prev0);
                    reads.push(prev1);
                }
                reads
            }
        }
    }
}
