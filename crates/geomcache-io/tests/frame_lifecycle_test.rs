//! Lifecycle properties over arbitrary frame counts and I-frame distances.

mod common;

use proptest::prelude::*;

use geomcache_core::file_format::{BlockCompressionFormat, FrameType, FRAME_ALIGNMENT};
use geomcache_core::status::{Status, StatusResult};
use geomcache_core::vector_extensions::Aabb;
use geomcache_core::{EncoderOptions, FrameSchedule};
use geomcache_io::{EncodedFrame, FrameSink, GeomCacheEncoder, WriterStats};

use common::*;

#[derive(Default)]
struct RecordingSink {
    static_data: Option<Vec<u8>>,
    frames: Vec<EncodedFrame>,
}

impl FrameSink for &mut RecordingSink {
    fn write_static_data(&mut self, payload: Vec<u8>) -> Status {
        assert!(self.static_data.is_none());
        self.static_data = Some(payload);
        Ok(())
    }

    fn write_frame(&mut self, frame: EncodedFrame) -> Status {
        assert!(self.static_data.is_some());
        self.frames.push(frame);
        Ok(())
    }

    fn finish(self) -> StatusResult<WriterStats> {
        Ok(WriterStats {
            num_frames: self.frames.len() as u32,
            ..Default::default()
        })
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_every_frame_written_once_in_order(
        num_frames in 1u32..14,
        distance in 1u32..7,
        use_b_frames in any::<bool>(),
    ) {
        let options = EncoderOptions::default()
            .with_block_compression_format(BlockCompressionFormat::Deflate)
            .with_b_frames(use_b_frames)
            .with_index_frame_distance(distance);
        let schedule = FrameSchedule::new(num_frames, options.use_b_frames(), options.index_frame_distance());

        let mut sink = RecordingSink::default();
        let mut encoder = GeomCacheEncoder::new(test_scene(&options), &options, num_frames, &mut sink).unwrap();
        for t in 0..num_frames {
            encoder.add_frame(t as f32, Aabb::empty(), t + 1 == num_frames, frame_input(t)).unwrap();
            // a frame is released as soon as its batch is written
            prop_assert!(encoder.pending_frames().count() <= distance as usize + 1);
            if schedule.frame_type(t) == FrameType::IFrame {
                prop_assert_eq!(encoder.frames_written(), t + 1);
            }
        }
        let stats = encoder.finish().unwrap();
        prop_assert_eq!(stats.num_frames, num_frames);

        for (t, frame) in sink.frames.iter().enumerate() {
            prop_assert_eq!(frame.index, t as u32);
            prop_assert_eq!(frame.frame_type, schedule.frame_type(t as u32));
            prop_assert_eq!(frame.payload.len() % FRAME_ALIGNMENT, 0);
        }
    }
}
