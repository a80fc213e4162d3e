//! One live call: the closure it's executing, the bytecode cursor into
//! that closure's chunk, and the value-stack index where its locals
//! begin. Slot 0 is the receiver in a method/initializer frame, or the
//! closure itself everywhere else.

use fax_gc::Obj;

pub(crate) struct CallFrame {
    pub closure: *mut Obj,
    pub ip: usize,
    pub slots: usize,
}
