use std::collections::BTreeMap;
use std::sync::mpsc::Sender;

use muxplex_frame::Prefix;

use crate::proxy::StreamEvent;

/// Which side opened a logical stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Opened by this endpoint.
    Local,
    /// Opened by the peer.
    Remote,
}

impl Direction {
    /// Prefix stamped on frames this side sends for the stream.
    ///
    /// The peer keeps the stream under the other direction, so the prefix
    /// names the peer's registry.
    pub fn outbound_prefix(self) -> Prefix {
        match self {
            Direction::Local => Prefix::Remote,
            Direction::Remote => Prefix::Local,
        }
    }

    /// Registry an inbound frame with this prefix is addressed to.
    pub fn from_prefix(byte: u8) -> Option<Self> {
        match Prefix::try_from(byte) {
            Ok(Prefix::Local) => Some(Direction::Local),
            Ok(Prefix::Remote) => Some(Direction::Remote),
            _ => None,
        }
    }
}

/// Per-stream bookkeeping held by the endpoint.
#[derive(Debug)]
pub(crate) struct StreamSlot {
    pub(crate) serial: u64,
    pub(crate) events: Sender<StreamEvent>,
    pub(crate) first_packet_sent: bool,
}

/// Open streams, keyed by direction and id.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    local: BTreeMap<u8, StreamSlot>,
    remote: BTreeMap<u8, StreamSlot>,
}

impl Registry {
    fn side(&self, direction: Direction) -> &BTreeMap<u8, StreamSlot> {
        match direction {
            Direction::Local => &self.local,
            Direction::Remote => &self.remote,
        }
    }

    fn side_mut(&mut self, direction: Direction) -> &mut BTreeMap<u8, StreamSlot> {
        match direction {
            Direction::Local => &mut self.local,
            Direction::Remote => &mut self.remote,
        }
    }

    pub(crate) fn contains(&self, direction: Direction, id: u8) -> bool {
        self.side(direction).contains_key(&id)
    }

    pub(crate) fn get(&self, direction: Direction, id: u8) -> Option<&StreamSlot> {
        self.side(direction).get(&id)
    }

    pub(crate) fn get_mut(&mut self, direction: Direction, id: u8) -> Option<&mut StreamSlot> {
        self.side_mut(direction).get_mut(&id)
    }

    pub(crate) fn insert(&mut self, direction: Direction, id: u8, slot: StreamSlot) {
        self.side_mut(direction).insert(id, slot);
    }

    /// Remove a slot, optionally only if it belongs to the given lifetime.
    pub(crate) fn remove(
        &mut self,
        direction: Direction,
        id: u8,
        serial: Option<u64>,
    ) -> Option<StreamSlot> {
        let side = self.side_mut(direction);
        let current = side
            .get(&id)
            .is_some_and(|slot| serial.is_none_or(|serial| serial == slot.serial));
        if current {
            side.remove(&id)
        } else {
            None
        }
    }

    /// Remove every slot, local streams first, each side in id order.
    pub(crate) fn drain(&mut self) -> Vec<(Direction, u8, StreamSlot)> {
        let local = std::mem::take(&mut self.local)
            .into_iter()
            .map(|(id, slot)| (Direction::Local, id, slot));
        let remote = std::mem::take(&mut self.remote)
            .into_iter()
            .map(|(id, slot)| (Direction::Remote, id, slot));
        local.chain(remote).collect()
    }

    pub(crate) fn len(&self, direction: Direction) -> usize {
        self.side(direction).len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    fn slot(serial: u64) -> StreamSlot {
        let (events, _rx) = mpsc::channel();
        StreamSlot {
            serial,
            events,
            first_packet_sent: false,
        }
    }

    #[test]
    fn prefixes_route_to_the_peer() {
        assert_eq!(Direction::Local.outbound_prefix(), Prefix::Remote);
        assert_eq!(Direction::Remote.outbound_prefix(), Prefix::Local);
        assert_eq!(Direction::from_prefix(0xAA), Some(Direction::Local));
        assert_eq!(Direction::from_prefix(0xBB), Some(Direction::Remote));
        assert_eq!(Direction::from_prefix(0xCC), None);
        assert_eq!(Direction::from_prefix(0x00), None);
    }

    #[test]
    fn directions_are_independent() {
        let mut registry = Registry::default();
        registry.insert(Direction::Local, 3, slot(1));
        registry.insert(Direction::Remote, 3, slot(2));

        assert_eq!(registry.get(Direction::Local, 3).map(|s| s.serial), Some(1));
        assert_eq!(registry.get(Direction::Remote, 3).map(|s| s.serial), Some(2));
        assert_eq!(registry.len(Direction::Local), 1);
        assert_eq!(registry.len(Direction::Remote), 1);
    }

    #[test]
    fn remove_checks_serial() {
        let mut registry = Registry::default();
        registry.insert(Direction::Local, 7, slot(10));

        assert!(registry.remove(Direction::Local, 7, Some(9)).is_none());
        assert!(registry.contains(Direction::Local, 7));
        assert!(registry.remove(Direction::Local, 7, Some(10)).is_some());
        assert!(!registry.contains(Direction::Local, 7));
        assert!(registry.remove(Direction::Local, 7, None).is_none());
    }

    #[test]
    fn drain_is_ordered() {
        let mut registry = Registry::default();
        registry.insert(Direction::Remote, 1, slot(1));
        registry.insert(Direction::Local, 9, slot(2));
        registry.insert(Direction::Local, 2, slot(3));

        let order: Vec<_> = registry
            .drain()
            .into_iter()
            .map(|(direction, id, _)| (direction, id))
            .collect();
        assert_eq!(
            order,
            vec![
                (Direction::Local, 2),
                (Direction::Local, 9),
                (Direction::Remote, 1)
            ]
        );
        assert_eq!(registry.len(Direction::Local), 0);
    }
}
