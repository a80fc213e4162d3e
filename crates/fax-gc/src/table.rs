//! Open-addressed hash table - String→Value map with tombstones.
//!
//! Backs string interning, the globals-by-name lookup, instance fields
//! and class method tables. Keys are interned
//! [`ObjString`](crate::object::ObjString) pointers, compared by
//! identity, which is sound only because every distinct byte sequence is
//! guaranteed a single canonical `ObjString`.

use crate::object::{Obj, ObjKind};
use crate::value::Value;

const MAX_LOAD_FACTOR: f64 = 0.75;
const INITIAL_CAPACITY: usize = 8;

#[derive(Clone, Copy)]
struct Entry {
    key: Option<*mut Obj>,
    value: Value,
}

impl Entry {
    fn empty() -> Self {
        Entry {
            key: None,
            value: Value::Nil,
        }
    }

    /// A tombstone is a deleted slot: empty key, but a `true` value so
    /// probe chains that ran through it stay intact.
    fn is_tombstone(&self) -> bool {
        self.key.is_none() && matches!(self.value, Value::Bool(true))
    }
}

pub struct Table {
    entries: Vec<Entry>,
    count: usize, // live entries + tombstones
}

impl Table {
    pub fn new() -> Self {
        Table {
            entries: Vec::new(),
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn approx_size(&self) -> usize {
        self.entries.len() * std::mem::size_of::<Entry>()
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    unsafe fn key_hash(key: *mut Obj) -> u32 {
        match &(*key).kind {
            ObjKind::String(s) => s.hash,
            _ => unreachable!("table keys are always interned strings"),
        }
    }

    /// Finds the first slot matching `key`, or failing that, the first
    /// tombstone seen, or failing that, the first empty slot.
    fn find_entry(entries: &[Entry], capacity: usize, key: *mut Obj) -> usize {
        let hash = unsafe { Self::key_hash(key) };
        let mut index = (hash as usize) % capacity;
        let mut first_tombstone: Option<usize> = None;
        loop {
            let entry = &entries[index];
            match entry.key {
                Some(k) if std::ptr::eq(k, key) => return index,
                None if entry.is_tombstone() => {
                    if first_tombstone.is_none() {
                        first_tombstone = Some(index);
                    }
                }
                None => {
                    return first_tombstone.unwrap_or(index);
                }
                Some(_) => {}
            }
            index = (index + 1) % capacity;
        }
    }

    fn grow(&mut self) {
        let new_capacity = if self.capacity() == 0 {
            INITIAL_CAPACITY
        } else {
            self.capacity() * 2
        };
        let mut new_entries = vec![Entry::empty(); new_capacity];
        let mut live = 0;
        for entry in &self.entries {
            if let Some(key) = entry.key {
                let index = Self::find_entry(&new_entries, new_capacity, key);
                new_entries[index] = Entry {
                    key: Some(key),
                    value: entry.value,
                };
                live += 1;
            }
        }
        self.entries = new_entries;
        self.count = live;
    }

    /// Inserts or overwrites `key`→`value`. Returns `true` if this is a
    /// brand-new key.
    pub fn set(&mut self, key: *mut Obj, value: Value) -> bool {
        if self.capacity() == 0 || (self.count + 1) as f64 > self.capacity() as f64 * MAX_LOAD_FACTOR {
            self.grow();
        }
        let index = Self::find_entry(&self.entries, self.capacity(), key);
        let entry = &mut self.entries[index];
        let is_new_key = entry.key.is_none();
        if is_new_key && !entry.is_tombstone() {
            self.count += 1;
        }
        entry.key = Some(key);
        entry.value = value;
        is_new_key
    }

    pub fn get(&self, key: *mut Obj) -> Option<Value> {
        if self.capacity() == 0 {
            return None;
        }
        let index = Self::find_entry(&self.entries, self.capacity(), key);
        self.entries[index].key.map(|_| self.entries[index].value)
    }

    /// Deletes `key`, leaving a tombstone behind so probe chains through
    /// it keep working.
    pub fn delete(&mut self, key: *mut Obj) -> bool {
        if self.capacity() == 0 {
            return false;
        }
        let index = Self::find_entry(&self.entries, self.capacity(), key);
        if self.entries[index].key.is_none() {
            return false;
        }
        self.entries[index] = Entry {
            key: None,
            value: Value::Bool(true),
        };
        true
    }

    /// The interning primitive: walks the probe chain comparing by
    /// {length, hash, byte-equality} and returns the canonical
    /// `ObjString` pointer on a hit.
    pub fn find_string(&self, bytes: &[u8], hash: u32) -> Option<*mut Obj> {
        if self.capacity() == 0 {
            return None;
        }
        let capacity = self.capacity();
        let mut index = (hash as usize) % capacity;
        loop {
            let entry = &self.entries[index];
            match entry.key {
                None if !entry.is_tombstone() => return None,
                Some(key) => {
                    if let ObjKind::String(s) = unsafe { &(*key).kind } {
                        if s.bytes.len() == bytes.len() && s.hash == hash && &*s.bytes == bytes {
                            return Some(key);
                        }
                    }
                }
                _ => {}
            }
            index = (index + 1) % capacity;
        }
    }

    /// Deletes every entry whose key is an unmarked string. Called
    /// during GC between mark and sweep, so dead strings don't keep
    /// their slot (and their backing memory) alive forever.
    pub fn remove_unmarked(&mut self) {
        for entry in &mut self.entries {
            if let Some(key) = entry.key {
                if !unsafe { (*key).is_marked } {
                    *entry = Entry {
                        key: None,
                        value: Value::Bool(true),
                    };
                }
            }
        }
    }

    /// Iterates live (non-tombstone) entries, for GC marking of table
    /// contents (class method tables, instance field tables).
    pub fn iter(&self) -> impl Iterator<Item = (*mut Obj, Value)> + '_ {
        self.entries
            .iter()
            .filter_map(|e| e.key.map(|k| (k, e.value)))
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

/// FNV-1a, 32-bit.
pub fn fnv1a_hash(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}
