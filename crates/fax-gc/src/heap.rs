//! The heap: object chain, string intern table, and the tri-color
//! mark-sweep collector.
//!
//! Collection is triggered from inside the `alloc_*` helpers, never by a
//! background thread or explicit VM instruction. Callers contribute their
//! roots through a [`RootProvider`] trait rather than through any global
//! VM or compiler state.

use std::mem;

use crate::object::{Obj, ObjKind, ObjString, UpvalueLoc};
use crate::table::{fnv1a_hash, Table};
use crate::value::Value;

const GC_HEAP_GROW_FACTOR: usize = 2;
const DEFAULT_NEXT_GC: usize = 1024 * 1024;

/// A source of GC roots. The VM and the compiler (mid-compilation, for
/// its constant pool and not-yet-finished function chain) each implement
/// this so `Heap::collect_garbage` doesn't need to know about either one.
///
/// Both methods take `&self`, not `&mut self`: an implementor that also
/// owns the `Heap` it's collecting into (the VM does) can then build a
/// small view struct borrowing its non-heap fields alongside a disjoint
/// `&mut` borrow of the heap field itself, without the borrow checker
/// treating `self` as mutably borrowed twice over.
pub trait RootProvider {
    fn mark_roots(&self, heap: &mut Heap);

    /// Called after marking, before sweeping, to break weak references:
    /// table keys are interned strings held weakly. The default is a
    /// no-op; only the VM's globals table needs this.
    fn handle_weak(&self, _heap: &mut Heap) {}
}

pub struct Heap {
    objects: *mut Obj,
    strings: Table,
    bytes_allocated: usize,
    next_gc: usize,
    gray: Vec<*mut Obj>,
    pub trace_gc: bool,
    pub stress_gc: bool,
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            objects: std::ptr::null_mut(),
            strings: Table::new(),
            bytes_allocated: 0,
            next_gc: DEFAULT_NEXT_GC,
            gray: Vec::new(),
            trace_gc: false,
            stress_gc: false,
        }
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    fn push_object(&mut self, obj: Box<Obj>) -> *mut Obj {
        let ptr = Box::into_raw(obj);
        unsafe {
            (*ptr).next = self.objects;
        }
        self.objects = ptr;
        ptr
    }

    fn should_collect(&self) -> bool {
        self.stress_gc || self.bytes_allocated > self.next_gc
    }

    fn maybe_collect(&mut self, roots: &[&dyn RootProvider]) {
        if self.should_collect() {
            self.collect_garbage(roots);
        }
    }

    /// Interns `bytes` as a string, reusing an existing `ObjString` if one
    /// with the same bytes already exists. The GC-threshold check happens
    /// before the new allocation (if any), so the object under
    /// construction is never a sweep candidate mid-build.
    pub fn copy_string(&mut self, bytes: &[u8], roots: &[&dyn RootProvider]) -> *mut Obj {
        let hash = fnv1a_hash(bytes);
        if let Some(existing) = self.strings.find_string(bytes, hash) {
            return existing;
        }
        self.maybe_collect(roots);
        let obj = Box::new(Obj {
            is_marked: false,
            next: std::ptr::null_mut(),
            kind: ObjKind::String(ObjString {
                bytes: bytes.to_vec().into_boxed_slice(),
                hash,
            }),
        });
        let size = obj.approx_size();
        let ptr = self.push_object(obj);
        self.bytes_allocated += size;
        self.strings.set(ptr, Value::Bool(true));
        ptr
    }

    /// Like [`copy_string`](Self::copy_string) but takes ownership of an
    /// already-built `Box<[u8]>` (used when the caller has just
    /// concatenated or otherwise produced a fresh buffer and copying it
    /// again would be wasteful).
    pub fn take_string(&mut self, bytes: Box<[u8]>, roots: &[&dyn RootProvider]) -> *mut Obj {
        let hash = fnv1a_hash(&bytes);
        if let Some(existing) = self.strings.find_string(&bytes, hash) {
            return existing;
        }
        self.maybe_collect(roots);
        let obj = Box::new(Obj {
            is_marked: false,
            next: std::ptr::null_mut(),
            kind: ObjKind::String(ObjString { bytes, hash }),
        });
        let size = obj.approx_size();
        let ptr = self.push_object(obj);
        self.bytes_allocated += size;
        self.strings.set(ptr, Value::Bool(true));
        ptr
    }

    /// Generic allocator for every non-string object kind. `build` is
    /// called only after the GC-threshold check, so it may itself intern
    /// strings or otherwise allocate without risking the result being
    /// swept before `alloc_obj` returns it.
    pub fn alloc_obj(
        &mut self,
        kind: ObjKind,
        roots: &[&dyn RootProvider],
    ) -> *mut Obj {
        self.maybe_collect(roots);
        let obj = Box::new(Obj {
            is_marked: false,
            next: std::ptr::null_mut(),
            kind,
        });
        let size = obj.approx_size();
        let ptr = self.push_object(obj);
        self.bytes_allocated += size;
        ptr
    }

    pub fn mark_value(&mut self, value: Value) {
        if let Value::Obj(ptr) = value {
            self.mark_object(ptr);
        }
    }

    pub fn mark_object(&mut self, ptr: *mut Obj) {
        if ptr.is_null() {
            return;
        }
        unsafe {
            if (*ptr).is_marked {
                return;
            }
            (*ptr).is_marked = true;
        }
        if self.trace_gc {
            log::trace!("{ptr:p} mark {}", unsafe { (*ptr).kind_name() });
        }
        self.gray.push(ptr);
    }

    fn mark_table(&mut self, table: &Table) {
        let pairs: Vec<(*mut Obj, Value)> = table.iter().collect();
        for (key, value) in pairs {
            self.mark_object(key);
            self.mark_value(value);
        }
    }

    /// Traces one gray object's outgoing references, turning it black.
    fn blacken_object(&mut self, ptr: *mut Obj) {
        if self.trace_gc {
            log::trace!("{ptr:p} blacken");
        }
        // Safety: `ptr` came off the gray worklist, so it was marked
        // reachable and hasn't been freed (sweep only runs after tracing
        // finishes).
        let kind_ptr: *mut ObjKind = unsafe { &mut (*ptr).kind };
        unsafe {
            match &mut *kind_ptr {
                ObjKind::String(_) | ObjKind::Native(_) => {}
                ObjKind::Function(f) => {
                    if let Some(name) = f.name {
                        self.mark_object(name);
                    }
                    for constant in &f.chunk.constants {
                        self.mark_value(*constant);
                    }
                }
                ObjKind::Closure(c) => {
                    self.mark_object(c.function);
                    for &upvalue in &c.upvalues {
                        self.mark_object(upvalue);
                    }
                }
                ObjKind::Upvalue(u) => {
                    if let UpvalueLoc::Closed(v) = u.loc {
                        self.mark_value(v);
                    }
                }
                ObjKind::Class(c) => {
                    self.mark_object(c.name);
                    let methods = mem::replace(&mut c.methods, Table::new());
                    self.mark_table(&methods);
                    c.methods = methods;
                }
                ObjKind::Instance(i) => {
                    self.mark_object(i.class);
                    let fields = mem::replace(&mut i.fields, Table::new());
                    self.mark_table(&fields);
                    i.fields = fields;
                }
                ObjKind::BoundMethod(b) => {
                    self.mark_value(b.receiver);
                    self.mark_object(b.method);
                }
            }
        }
    }

    fn trace_references(&mut self) {
        while let Some(ptr) = self.gray.pop() {
            self.blacken_object(ptr);
        }
    }

    /// Frees every unmarked object in the chain, clearing the mark bit on
    /// survivors for the next cycle.
    fn sweep(&mut self) {
        let mut previous: *mut Obj = std::ptr::null_mut();
        let mut current = self.objects;
        while !current.is_null() {
            unsafe {
                if (*current).is_marked {
                    (*current).is_marked = false;
                    previous = current;
                    current = (*current).next;
                } else {
                    let unreached = current;
                    current = (*current).next;
                    if previous.is_null() {
                        self.objects = current;
                    } else {
                        (*previous).next = current;
                    }
                    self.bytes_allocated -= (*unreached).approx_size();
                    if self.trace_gc {
                        log::trace!("{unreached:p} free");
                    }
                    drop(Box::from_raw(unreached));
                }
            }
        }
    }

    /// Runs one full mark-sweep cycle. `roots` are consulted in order:
    /// each contributes its roots, then (after tracing settles) its weak
    /// references are resolved, and finally the intern table itself is
    /// swept of anything left unmarked.
    pub fn collect_garbage(&mut self, roots: &[&dyn RootProvider]) {
        if self.trace_gc {
            log::trace!("-- gc begin");
        }
        let before = self.bytes_allocated;

        for root in roots {
            root.mark_roots(self);
        }
        self.trace_references();
        for root in roots {
            root.handle_weak(self);
        }
        self.strings.remove_unmarked();
        self.sweep();

        self.next_gc = self.bytes_allocated.max(1) * GC_HEAP_GROW_FACTOR;

        if self.trace_gc {
            log::trace!(
                "-- gc end, collected {} bytes (from {before} to {}), next at {}",
                before.saturating_sub(self.bytes_allocated),
                self.bytes_allocated,
                self.next_gc
            );
        }
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        let mut current = self.objects;
        while !current.is_null() {
            unsafe {
                let next = (*current).next;
                drop(Box::from_raw(current));
                current = next;
            }
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}
