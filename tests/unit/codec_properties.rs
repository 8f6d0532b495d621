//! Property tests for the frame codec.

use optosigma_shot::codec::{Codec, Request, ResponseOutcome, Travel};
use optosigma_shot::profile::units::MAX_PULSES;
use optosigma_shot::{ControllerModel, Pulses, StageModel};
use proptest::prelude::*;

proptest! {
    /// A relative move parses back to the same axis and signed amount.
    #[test]
    fn move_frame_parses_back(axis in 0usize..4, delta in -MAX_PULSES..=MAX_PULSES) {
        let spec = ControllerModel::Shot304Gs.spec();
        let codec = Codec::new(&spec);
        let travel = Travel::new(Pulses(0), &StageModel::Sgsp120Yaw.spec());

        let command = codec.encode_move(axis, Pulses(delta), &travel, None).unwrap();
        let frames: Vec<_> = command.frames().collect();

        prop_assert_eq!(frames.len(), 2);
        prop_assert_eq!(
            codec.decode_request(frames[0].as_bytes()),
            Some(Request::Move { axis, delta: Pulses(delta) })
        );
        prop_assert_eq!(codec.decode_request(frames[1].as_bytes()), Some(Request::Go));
    }

    /// Targets outside the travel window never produce a frame.
    #[test]
    fn travel_window_is_enforced(position in -25_000i64..=25_000, delta in -60_000i64..=60_000) {
        let spec = ControllerModel::Shot302Gs.spec();
        let codec = Codec::new(&spec);
        let travel = Travel::new(Pulses(position), &StageModel::Sgsp26_100.spec());

        let result = codec.encode_move(0, Pulses(delta), &travel, None);
        let target = position + delta;
        prop_assert_eq!(result.is_ok(), (-25_000..=25_000).contains(&target));
    }

    /// Rendered status replies decode to the same positions.
    #[test]
    fn status_reply_decodes_positions(
        positions in proptest::collection::vec(-MAX_PULSES..=MAX_PULSES, 1..=4),
        busy in any::<bool>(),
    ) {
        let spec = ControllerModel::Shot304Gs.spec();
        let codec = Codec::new(&spec);
        let pulses: Vec<Pulses> = positions.iter().copied().map(Pulses).collect();

        let frame = codec.encode_status(&pulses, busy, false).unwrap();
        let ResponseOutcome::Status(report) = codec.decode_response(frame.as_bytes()) else {
            return Err(TestCaseError::fail("status reply expected"));
        };

        prop_assert_eq!(report.positions.as_slice(), pulses.as_slice());
        prop_assert_eq!(report.busy.any(), busy);
        prop_assert!(report.accepted);
    }

    /// Arbitrary bytes decode without panicking.
    #[test]
    fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..160)) {
        let spec = ControllerModel::Shot702.spec();
        let codec = Codec::new(&spec);
        let _ = codec.decode_response(&bytes);
        let _ = codec.decode_request(&bytes);
    }
}
