//! Delta Frames
//!
//! Once per fixed tick the encoder asks every object for its next delta
//! size (which refreshes its dirty flag), then writes only the dirty ones
//! behind a `position_update` header. Snapshots and join frames use the
//! full encoding and ignore dirtiness.

use std::sync::{Mutex, PoisonError};

use crate::game::object::GameObject;
use crate::game::state::State;
use crate::network::protocol::{frame_header_size, write_frame_header, MSG_POSITION_UPDATE, MSG_SNAPSHOT};

/// Steady-state frame builder. Reuses one scratch buffer across ticks.
#[derive(Debug, Default)]
pub struct DeltaEncoder {
    scratch: Mutex<Vec<u8>>,
}

impl DeltaEncoder {
    /// Create an encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build this tick's delta frame, or `None` when nothing changed.
    ///
    /// Must run once per tick under the registry's exclusive lock: the size
    /// pass is what moves each object's shadow position forward.
    pub fn encode(&self, state: &mut State) -> Option<Vec<u8>> {
        let header = frame_header_size(MSG_POSITION_UPDATE);
        let payload: usize = state.iter_mut().map(|obj| obj.delta_size()).sum();

        let mut buf = self.scratch.lock().unwrap_or_else(PoisonError::into_inner);
        buf.clear();
        buf.resize(header + payload, 0);

        let mut offset = write_frame_header(&mut buf, MSG_POSITION_UPDATE);
        for obj in state.iter_mut() {
            if !obj.is_dirty() {
                continue;
            }
            offset += obj.to_delta_bytes(&mut buf, offset);
            obj.mark_clean();
        }

        if offset == header {
            return None;
        }
        Some(buf[..offset].to_vec())
    }
}

/// Full encoding of every object, for a newly joined observer.
pub fn encode_snapshot(state: &State) -> Vec<u8> {
    let payload: usize = state.iter().map(|obj| obj.size()).sum();
    let mut buf = vec![0u8; frame_header_size(MSG_SNAPSHOT) + payload];

    let mut offset = write_frame_header(&mut buf, MSG_SNAPSHOT);
    for obj in state.iter() {
        offset += obj.to_bytes(&mut buf, offset);
    }
    buf
}

/// Full encoding of one object under a message kind.
pub fn encode_object_frame(kind: &str, obj: &dyn GameObject) -> Vec<u8> {
    let mut buf = vec![0u8; frame_header_size(kind) + obj.size()];
    let offset = write_frame_header(&mut buf, kind);
    obj.to_bytes(&mut buf, offset);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::{Direction, Point};
    use crate::game::concrete::Concrete;
    use crate::game::object::{Object, ObjectType};
    use crate::game::player::Player;
    use crate::network::protocol::{decode_frame, MSG_PLAYER_JOINED};

    const FIXED_DELTA: f64 = 1.0 / 30.0;

    fn world() -> State {
        let mut state = State::new();
        state.insert(Box::new(Player::new(1, "a", Point::ORIGIN, 800.0)));
        state.insert(Box::new(Player::new(2, "b", Point::new(50.0, 50.0), 800.0)));
        state.insert(Box::new(Concrete::new(3, Point::new(7.0, 7.0))));
        state
    }

    fn steer(state: &mut State, id: u32, direction: Direction) {
        state
            .get_mut(id)
            .and_then(|o| o.as_character_mut())
            .unwrap()
            .move_toward(direction);
    }

    #[test]
    fn test_quiescent_tick_emits_nothing() {
        let encoder = DeltaEncoder::new();
        let mut state = world();

        state.tick_entities(FIXED_DELTA);
        assert!(encoder.encode(&mut state).is_none());
        assert!(encoder.encode(&mut state).is_none());
    }

    #[test]
    fn test_only_moved_objects_are_written() {
        let encoder = DeltaEncoder::new();
        let mut state = world();
        steer(&mut state, 1, Direction::Right);

        state.tick_entities(FIXED_DELTA);
        let frame = decode_frame(&encoder.encode(&mut state).unwrap()).unwrap();

        assert_eq!(frame.kind, MSG_POSITION_UPDATE);
        assert_eq!(frame.records.len(), 1);
        let record = frame.records[0];
        assert_eq!(record.id, 1);
        assert_eq!(record.object_type, ObjectType::Player);
        let pos = record.position.unwrap();
        assert!((pos.x - 800.0 / 30.0).abs() < 1e-3);
        assert_eq!(pos.y, 0.0);

        // Velocity persists: the next tick moves it again by the same step.
        state.tick_entities(FIXED_DELTA);
        let frame = decode_frame(&encoder.encode(&mut state).unwrap()).unwrap();
        let next = frame.records[0].position.unwrap();
        assert!(((next.x - pos.x) - pos.x).abs() < 1e-3);

        // Stopped: nothing further.
        steer(&mut state, 1, Direction::Stop);
        state.tick_entities(FIXED_DELTA);
        assert!(encoder.encode(&mut state).is_none());
    }

    #[test]
    fn test_moved_between_ticks_outside_tick() {
        let encoder = DeltaEncoder::new();
        let mut state = world();
        state
            .get_mut(3)
            .and_then(|o| o.as_concrete_mut())
            .unwrap()
            .set_position(Point::new(8.0, 7.0));

        let frame = decode_frame(&encoder.encode(&mut state).unwrap()).unwrap();
        assert_eq!(frame.records.len(), 1);
        assert_eq!(frame.records[0].id, 3);
        assert_eq!(frame.records[0].position, Some(Point::new(8.0, 7.0)));
    }

    #[test]
    fn test_plain_dirty_object_sent_once() {
        let encoder = DeltaEncoder::new();
        let mut state = world();
        let mut flagged = Object::new(9);
        flagged.mark_dirty();
        state.insert(Box::new(flagged));

        let frame = decode_frame(&encoder.encode(&mut state).unwrap()).unwrap();
        assert_eq!(frame.records.len(), 1);
        assert_eq!(frame.records[0].id, 9);
        assert_eq!(frame.records[0].position, None);

        assert!(encoder.encode(&mut state).is_none());
    }

    #[test]
    fn test_snapshot_has_every_object() {
        let mut state = world();
        state.insert(Box::new(Object::new(4)));

        let frame = decode_frame(&encode_snapshot(&state)).unwrap();
        assert_eq!(frame.kind, MSG_SNAPSHOT);
        let ids: Vec<_> = frame.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(frame.records[1].position, Some(Point::new(50.0, 50.0)));
    }

    #[test]
    fn test_snapshot_ignores_dirtiness() {
        let encoder = DeltaEncoder::new();
        let mut state = world();
        assert!(encoder.encode(&mut state).is_none());

        let frame = decode_frame(&encode_snapshot(&state)).unwrap();
        assert_eq!(frame.records.len(), 3);
    }

    #[test]
    fn test_object_frame() {
        let player = Player::new(5, "e", Point::new(10.5, 20.25), 800.0);
        let bytes = encode_object_frame(MSG_PLAYER_JOINED, &player);
        assert_eq!(bytes.len(), 4 + MSG_PLAYER_JOINED.len() + 13);

        let frame = decode_frame(&bytes).unwrap();
        assert_eq!(frame.kind, MSG_PLAYER_JOINED);
        assert_eq!(frame.records[0].position, Some(Point::new(10.5, 20.25)));
    }
}
