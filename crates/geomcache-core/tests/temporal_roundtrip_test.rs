//! Temporal and spatial residual round trips over arbitrary stream contents.

use proptest::prelude::*;

use geomcache_core::mesh_predictor::MeshPredictor;
use geomcache_core::stream_data::Component;
use geomcache_core::temporal_predictor::{
    decode_residuals, encode_residuals, search_predictor, MotionReference, PredictorControl, TemporalPredictor,
    TemporalReferences,
};

fn predictor_strategy() -> impl Strategy<Value = TemporalPredictor> {
    prop_oneof![
        any::<u8>().prop_map(|lerp_factor| TemporalPredictor::Interpolate { lerp_factor }),
        (any::<u8>(), any::<u8>(), any::<u8>()).prop_map(|(lerp_factor, acceleration, combine_factor)| {
            TemporalPredictor::Combine {
                lerp_factor,
                acceleration,
                combine_factor,
            }
        }),
    ]
}

fn check_round_trip<T: Component>(streams: [Vec<T>; 5], predictor: TemporalPredictor) {
    let [floor, ceil, prev0, prev1, current] = streams;
    let motion = MotionReference {
        prev0: &prev0,
        prev1: &prev1,
    };
    let refs = TemporalReferences::new(&floor, &ceil, Some(motion));

    let residuals = encode_residuals(&current, &refs, predictor).unwrap();
    let control = PredictorControl::from_bytes(predictor.control().to_bytes());
    let decoded = decode_residuals(&residuals, &refs, control.predictor().unwrap()).unwrap();
    assert_eq!(decoded, current);
}

fn streams<T: Arbitrary + Clone + 'static>(components: usize) -> impl Strategy<Value = [Vec<T>; 5]> {
    (1usize..64).prop_flat_map(move |vertices| {
        let len = vertices * components;
        prop::array::uniform5(prop::collection::vec(any::<T>(), len))
    })
}

proptest! {
    #[test]
    fn positions_round_trip(streams in streams::<u16>(3), predictor in predictor_strategy()) {
        check_round_trip(streams, predictor);
    }

    #[test]
    fn texcoords_and_qtangents_round_trip(
        texcoords in streams::<i16>(2),
        qtangents in streams::<i16>(4),
        predictor in predictor_strategy(),
    ) {
        check_round_trip(texcoords, predictor);
        check_round_trip(qtangents, predictor);
    }

    #[test]
    fn colors_round_trip(streams in streams::<u8>(1), predictor in predictor_strategy()) {
        check_round_trip(streams, predictor);
    }

    #[test]
    fn searched_predictor_round_trips(streams in streams::<u16>(3), with_motion in any::<bool>()) {
        let [floor, ceil, prev0, prev1, current] = streams;
        let motion = with_motion.then_some(MotionReference { prev0: &prev0, prev1: &prev1 });
        let refs = TemporalReferences::new(&floor, &ceil, motion);

        let predictor = search_predictor(&current, &refs).unwrap();
        prop_assert_eq!(predictor.uses_motion(), with_motion);
        let residuals = encode_residuals(&current, &refs, predictor).unwrap();
        prop_assert_eq!(decode_residuals(&residuals, &refs, predictor).unwrap(), current);
    }

    #[test]
    fn spatial_residuals_round_trip(
        positions in prop::collection::vec(any::<u16>(), 3 * 16),
        seed in prop::collection::vec(0u32..16, 3 * 12),
    ) {
        let predictor = MeshPredictor::build([seed.as_slice()], &positions);
        prop_assert_eq!(predictor.num_vertices(), 16);

        let mut values = predictor.encode_residuals(&positions, 3);
        predictor.decode_residuals(&mut values, 3);
        prop_assert_eq!(values, positions);
    }
}

#[test]
fn test_search_finds_midpoint_interpolation() {
    let floor: Vec<u16> = (0..300).map(|i| i * 10).collect();
    let spans: Vec<u16> = (0..300).map(|i| (i % 7 + 1) * 100).collect();
    let ceil: Vec<u16> = floor.iter().zip(&spans).map(|(f, d)| f + d).collect();
    let current: Vec<u16> = floor.iter().zip(&spans).map(|(f, d)| f + d / 2).collect();
    let refs = TemporalReferences::new(&floor, &ceil, None);

    let predictor = search_predictor(&current, &refs).unwrap();
    let TemporalPredictor::Interpolate { lerp_factor } = predictor else {
        panic!("expected interpolation, got {:?}", predictor);
    };
    assert!((120..=135).contains(&lerp_factor), "lerp factor {}", lerp_factor);

    let residuals = encode_residuals(&current, &refs, predictor).unwrap();
    assert!(residuals.iter().all(|&r| r <= 1 || r == u16::MAX));
}
