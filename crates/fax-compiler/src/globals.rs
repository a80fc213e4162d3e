//! Global-by-slot bookkeeping. Rather than looking globals up by name hash
//! at runtime, `GET_GLOBAL`/`SET_GLOBAL`/`DEFINE_GLOBAL` compile to a
//! 1-byte slot index, so the compiler itself must own the name-to-slot
//! assignment; the VM's globals store (`fax-vm`) just mirrors the layout
//! this table builds.

use fax_gc::{Heap, Obj, Table, Value};

use crate::context::VarState;

pub const GLOBALS_MAX: usize = u8::MAX as usize + 1;

/// Name→slot table plus the const/var state of each assigned slot. Slots
/// are assigned monotonically and never reused: once a slot is assigned
/// to a name it is stable for the rest of compilation.
pub struct GlobalsTable {
    names: Table,
    states: Vec<VarState>,
    names_by_slot: Vec<*mut Obj>,
}

impl GlobalsTable {
    pub fn new() -> Self {
        GlobalsTable {
            names: Table::new(),
            states: Vec::new(),
            names_by_slot: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// The interned name backing each assigned slot, in slot order. The
    /// VM copies this after every compile to size and label its own
    /// runtime globals store the same way, and uses it to name the
    /// offending variable in `Undefined variable` errors.
    pub fn names_by_slot(&self) -> &[*mut Obj] {
        &self.names_by_slot
    }

    /// Returns the existing slot for `name`, or assigns a fresh one in
    /// `Uninitialized` state: a bare forward reference, not yet backed by
    /// a `var`/`const` declaration. `DEFINE_GLOBAL` resolves it at
    /// runtime, or a `GET_GLOBAL` against it later fails with "Undefined
    /// variable".
    pub fn slot_for(&mut self, name: *mut Obj) -> Result<u8, &'static str> {
        if let Some(Value::Number(slot)) = self.names.get(name) {
            return Ok(slot as u8);
        }
        if self.states.len() >= GLOBALS_MAX {
            return Err("Too many global variables.");
        }
        let slot = self.states.len() as u8;
        self.names.set(name, Value::Number(slot as f64));
        self.states.push(VarState::Uninitialized);
        self.names_by_slot.push(name);
        Ok(slot)
    }

    pub fn state(&self, slot: u8) -> VarState {
        self.states[slot as usize]
    }

    /// Marks `slot` defined, fixing its constness for the remainder of
    /// compilation, so a later write to a `const` slot becomes a compile
    /// error.
    pub fn define(&mut self, slot: u8, is_const: bool) {
        self.states[slot as usize] = if is_const {
            VarState::Readable
        } else {
            VarState::Writeable
        };
    }

    pub fn mark_roots(&self, heap: &mut Heap) {
        for (key, _) in self.names.iter() {
            heap.mark_object(key);
        }
    }
}

impl Default for GlobalsTable {
    fn default() -> Self {
        Self::new()
    }
}
