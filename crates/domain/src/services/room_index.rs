//! Geo-room index.
//!
//! Tracks which connections are interested in which viewport room. Each
//! connection belongs to at most one room; joining a different room moves it.
//! Empty rooms are pruned immediately, so enumeration only ever yields live
//! rooms.
//!
//! The index is plain data with no interior locking. Callers that share it
//! between tasks must hold one lock across join/leave and any complete
//! fan-out pass.

use std::collections::{hash_map, HashMap, HashSet};

use crate::error::ValidationError;
use crate::models::geo::{GeoPoint, RoomKey};
use crate::models::realtime::ConnectionId;

/// A live room as seen during enumeration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomEntry {
    pub key: RoomKey,
    pub center: GeoPoint,
    pub radius_meters: f64,
    pub member_count: usize,
}

#[derive(Debug, Default)]
pub struct GeoRoomIndex {
    rooms: HashMap<RoomKey, HashSet<ConnectionId>>,
    memberships: HashMap<ConnectionId, RoomKey>,
}

impl GeoRoomIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `connection` to the room for `(center, radius_meters)`, creating it if absent.
    ///
    /// A connection already in a different room is moved out of it first.
    pub fn join(
        &mut self,
        connection: ConnectionId,
        center: GeoPoint,
        radius_meters: f64,
    ) -> Result<RoomKey, ValidationError> {
        let key = RoomKey::new(center, radius_meters)?;

        if let Some(previous) = self.memberships.insert(connection, key) {
            if previous != key {
                self.remove_member(&previous, connection);
            }
        }
        self.rooms.entry(key).or_default().insert(connection);

        Ok(key)
    }

    /// Removes `connection` from the room for `(center, radius_meters)`.
    ///
    /// Leaving a room that does not exist, or that the connection is not a
    /// member of, is a no-op. Returns whether anything was removed.
    pub fn leave(&mut self, connection: ConnectionId, center: GeoPoint, radius_meters: f64) -> bool {
        let Ok(key) = RoomKey::new(center, radius_meters) else {
            return false;
        };

        if self.memberships.get(&connection) == Some(&key) {
            self.memberships.remove(&connection);
        }
        self.remove_member(&key, connection)
    }

    /// Removes `connection` from every room. Returns the room it left, if any.
    pub fn leave_all(&mut self, connection: ConnectionId) -> Option<RoomKey> {
        let key = self.memberships.remove(&connection)?;
        self.remove_member(&key, connection);
        Some(key)
    }

    /// Enumerates live rooms. Each call starts a fresh pass over the current state.
    pub fn all_rooms(&self) -> Rooms<'_> {
        Rooms {
            inner: self.rooms.iter(),
        }
    }

    /// Members of `key`, empty when the room does not exist.
    pub fn members(&self, key: &RoomKey) -> impl Iterator<Item = ConnectionId> + '_ {
        self.rooms.get(key).into_iter().flatten().copied()
    }

    /// The room `connection` currently belongs to.
    pub fn room_of(&self, connection: ConnectionId) -> Option<RoomKey> {
        self.memberships.get(&connection).copied()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    fn remove_member(&mut self, key: &RoomKey, connection: ConnectionId) -> bool {
        let Some(members) = self.rooms.get_mut(key) else {
            return false;
        };
        let removed = members.remove(&connection);
        if members.is_empty() {
            self.rooms.remove(key);
        }
        removed
    }
}

/// Iterator over live rooms returned by [`GeoRoomIndex::all_rooms`].
#[derive(Clone)]
pub struct Rooms<'a> {
    inner: hash_map::Iter<'a, RoomKey, HashSet<ConnectionId>>,
}

impl Iterator for Rooms<'_> {
    type Item = RoomEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, members)| RoomEntry {
            key: *key,
            center: key.center(),
            radius_meters: key.radius_meters(),
            member_count: members.len(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Rooms<'_> {}
