// loxvm: a bytecode virtual machine for a small dynamically-typed
// scripting language.
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

//! The open-addressed hash table (component C3). One `Table<Value>`
//! backs both the string-intern set and the VM's globals map, exactly
//! as in the original design: the intern table stores `Value::Nil` in
//! every slot and is only ever queried by `find_string`, while the
//! globals table stores real values and is queried by `get`/`set`.

use crate::object::{Heap, StringHandle};
use crate::value::Value;

const MAX_LOAD_FACTOR: f64 = 0.75;
const MIN_CAPACITY: usize = 8;

#[derive(Clone)]
enum Slot<V> {
    Empty,
    Tombstone,
    Occupied { key: StringHandle, hash: u32, value: V },
}

/// An open-addressed, linear-probed hash table keyed by interned
/// string identity. Deletion leaves behind a tombstone so that probe
/// chains broken by a delete still terminate correctly.
pub struct Table<V> {
    entries: Vec<Slot<V>>,
    /// Occupied (non-tombstone) slots. This is what the 0.75 load
    /// factor is measured against, so a table full of tombstones
    /// never grows on their account alone.
    count: usize,
    /// Tombstones currently in `entries`, tracked only so we can
    /// notice when probe chains are getting clogged with them and
    /// compact in place (see `ensure_capacity_for_insert`) — without
    /// this a table could, in principle, fill entirely with
    /// tombstones and leave no empty slot for probing to terminate on.
    tombstones: usize,
}

impl<V: Clone> Default for Table<V> {
    fn default() -> Self {
        Table {
            entries: Vec::new(),
            count: 0,
            tombstones: 0,
        }
    }
}

impl<V: Clone> Table<V> {
    pub fn new() -> Self {
        Table::default()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Probe starting at `hash`, returning the index of the matching
    /// occupied slot, or of the first tombstone/empty slot seen along
    /// the way (so `set` can reuse a tombstone instead of walking past
    /// it into virgin territory).
    fn find_slot(entries: &[Slot<V>], key: StringHandle, hash: u32) -> usize {
        let cap = entries.len();
        debug_assert!(cap.is_power_of_two());
        let mut index = (hash as usize) & (cap - 1);
        let mut tombstone: Option<usize> = None;
        loop {
            match &entries[index] {
                Slot::Empty => return tombstone.unwrap_or(index),
                Slot::Tombstone => {
                    if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                }
                Slot::Occupied { key: k, .. } if *k == key => return index,
                Slot::Occupied { .. } => {}
            }
            index = (index + 1) & (cap - 1);
        }
    }

    fn grow(&mut self, new_capacity: usize) {
        let mut new_entries: Vec<Slot<V>> = (0..new_capacity).map(|_| Slot::Empty).collect();
        for slot in self.entries.drain(..) {
            if let Slot::Occupied { key, hash, value } = slot {
                let index = Self::find_slot(&new_entries, key, hash);
                new_entries[index] = Slot::Occupied { key, hash, value };
            }
        }
        self.entries = new_entries;
        self.tombstones = 0;
    }

    fn ensure_capacity_for_insert(&mut self) {
        if self.entries.is_empty() {
            self.grow(MIN_CAPACITY);
        } else if (self.count + 1) as f64 > self.capacity() as f64 * MAX_LOAD_FACTOR {
            self.grow(self.capacity() * 2);
        } else if self.count + self.tombstones >= self.capacity() {
            // Probe chains are saturated with tombstones even though
            // real occupancy is low; compact in place so `find_slot`
            // is still guaranteed to terminate.
            self.grow(self.capacity());
        }
    }

    pub fn get(&self, key: StringHandle, hash: u32) -> Option<&V> {
        if self.entries.is_empty() {
            return None;
        }
        match &self.entries[Self::find_slot(&self.entries, key, hash)] {
            Slot::Occupied { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Inserts or overwrites `key => value`. Returns `true` if `key`
    /// was not already present.
    pub fn set(&mut self, key: StringHandle, hash: u32, value: V) -> bool {
        self.ensure_capacity_for_insert();
        let index = Self::find_slot(&self.entries, key, hash);
        let was_tombstone = matches!(self.entries[index], Slot::Tombstone);
        let is_new = !matches!(self.entries[index], Slot::Occupied { .. });
        if is_new {
            self.count += 1;
            if was_tombstone {
                self.tombstones -= 1;
            }
        }
        self.entries[index] = Slot::Occupied { key, hash, value };
        is_new
    }

    /// Replaces the entry for `key` with a tombstone. Returns `true`
    /// if `key` was present.
    pub fn delete(&mut self, key: StringHandle, hash: u32) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let index = Self::find_slot(&self.entries, key, hash);
        if matches!(self.entries[index], Slot::Occupied { .. }) {
            self.entries[index] = Slot::Tombstone;
            self.count -= 1;
            self.tombstones += 1;
            true
        } else {
            false
        }
    }

    /// The intern-lookup variant: finds a canonical string handle by
    /// byte content rather than by handle identity, so that freshly
    /// lexed/concatenated bytes (which have no handle yet) can be
    /// checked for an existing interned copy.
    pub fn find_string(&self, heap: &Heap, bytes: &str, hash: u32) -> Option<StringHandle> {
        if self.entries.is_empty() {
            return None;
        }
        let cap = self.entries.len();
        let mut index = (hash as usize) & (cap - 1);
        loop {
            match &self.entries[index] {
                Slot::Empty => return None,
                Slot::Occupied {
                    key,
                    hash: entry_hash,
                    ..
                } if *entry_hash == hash && heap.string(*key).as_str() == bytes => {
                    return Some(*key)
                }
                _ => {}
            }
            index = (index + 1) & (cap - 1);
        }
    }
}

/// The FNV-1a 32-bit hash used to key both the intern table and the
/// globals table.
pub fn fnv1a_hash(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &byte in bytes {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

/// Convenience alias: the table type actually used for globals and
/// for the intern set (which stores `Value::Nil` in every slot).
pub type ValueTable = Table<Value>;

/// Interns `s`, returning the canonical handle for its bytes: an
/// existing one if the intern table already has a match, otherwise a
/// freshly allocated one that is inserted before being returned (§4.2).
/// This is the single call site responsible for maintaining invariant
/// 2 (every string anywhere is the canonical interned instance) — the
/// VM's string concatenation, the compiler's string/identifier
/// constants, and any native function that manufactures a string all
/// route through this function rather than allocating directly.
pub fn intern(heap: &mut crate::object::Heap, table: &mut ValueTable, s: &str) -> StringHandle {
    let hash = fnv1a_hash(s.as_bytes());
    if let Some(existing) = table.find_string(heap, s, hash) {
        return existing;
    }
    let handle = heap.alloc_string(hash, s.into());
    table.set(handle, hash, Value::Nil);
    handle
}
