//! The dispatch loop: a stack-based bytecode interpreter over the `Chunk`s
//! `fax-compiler` emits, a flat `match` over `OpCode` driving a value stack
//! and a call-frame stack, plus the class/instance/bound-method machinery
//! (`INVOKE`, `SUPER_INVOKE`, `GET_SUPER`, `INHERIT`, `METHOD`) that single
//! inheritance and bound methods require.

use std::io::{self, Write};

use fax_gc::{
    string_bytes, Heap, Obj, ObjBoundMethod, ObjClass, ObjClosure, ObjInstance, ObjKind,
    ObjNative, ObjUpvalue, OpCode, RootProvider, Table, UpvalueLoc, Value,
};
use fax_compiler::GlobalsTable;
use fax_util::FaxError;

use crate::call_frame::CallFrame;
use crate::natives::clock_native;

const FRAMES_MAX: usize = 64;
const STACK_MAX: usize = FRAMES_MAX * 256;

/// A view onto every field `Heap::collect_garbage` needs to mark, built
/// fresh at each allocation site from `&self.stack`/`&self.frames`/etc.
/// directly rather than through a `&self`-taking method, so the borrow
/// checker sees it as disjoint from the `&mut self.heap` borrow the
/// allocation itself needs (same trick `fax-compiler`'s `CompilerRoots`
/// uses).
struct VmRoots<'a> {
    stack: &'a [Value],
    frames: &'a [CallFrame],
    open_upvalues: *mut Obj,
    globals: &'a GlobalsTable,
    global_values: &'a [Value],
    init_string: *mut Obj,
}

impl RootProvider for VmRoots<'_> {
    fn mark_roots(&self, heap: &mut Heap) {
        for &value in self.stack {
            heap.mark_value(value);
        }
        for frame in self.frames {
            heap.mark_object(frame.closure);
        }
        let mut upvalue = self.open_upvalues;
        while !upvalue.is_null() {
            heap.mark_object(upvalue);
            upvalue = unsafe { upvalue_next(upvalue) };
        }
        for &value in self.global_values {
            heap.mark_value(value);
        }
        self.globals.mark_roots(heap);
        heap.mark_object(self.init_string);
    }
}

unsafe fn upvalue_slot(ptr: *mut Obj) -> usize {
    match &(*ptr).kind {
        ObjKind::Upvalue(u) => match u.loc {
            UpvalueLoc::Open(slot) => slot,
            UpvalueLoc::Closed(_) => unreachable!("closed upvalue left on the open list"),
        },
        _ => unreachable!("upvalue_slot called on a non-upvalue object"),
    }
}

unsafe fn upvalue_next(ptr: *mut Obj) -> *mut Obj {
    match &(*ptr).kind {
        ObjKind::Upvalue(u) => u.next_open,
        _ => unreachable!("upvalue_next called on a non-upvalue object"),
    }
}

/// The bytecode interpreter. Owns the heap, the runtime globals store,
/// and the two stacks: the value stack and the call-frame stack, plus the
/// open-upvalue list. Single-threaded, non-`Send`/non-`Sync` like every
/// other owner of raw `*mut Obj` pointers in this crate graph.
pub struct Vm {
    heap: Heap,
    globals: GlobalsTable,
    global_values: Vec<Value>,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    open_upvalues: *mut Obj,
    init_string: *mut Obj,
    stdout: Box<dyn Write>,
    stderr: Box<dyn Write>,
    pub trace_exec: bool,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_io(Box::new(io::stdout()), Box::new(io::stderr()))
    }

    /// Builds a `Vm` writing `print` output and runtime-error reports to
    /// the given sinks instead of the process's own stdout/stderr. The
    /// REPL uses this to run each line against the same instance, and
    /// tests use it to capture output without touching the real streams.
    pub fn with_io(stdout: Box<dyn Write>, stderr: Box<dyn Write>) -> Self {
        let mut heap = Heap::new();
        let init_string = heap.copy_string(b"init", &[]);
        let mut vm = Vm {
            heap,
            globals: GlobalsTable::new(),
            global_values: Vec::new(),
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            open_upvalues: std::ptr::null_mut(),
            init_string,
            stdout,
            stderr,
            trace_exec: false,
        };
        vm.define_native("clock", 0, clock_native);
        vm
    }

    pub fn set_trace_gc(&mut self, on: bool) {
        self.heap.trace_gc = on;
    }

    pub fn set_stress_gc(&mut self, on: bool) {
        self.heap.stress_gc = on;
    }

    /// Compiles and runs `source` against this VM's existing globals and
    /// heap, so a REPL can call this once per line and have later lines
    /// see earlier ones' top-level declarations.
    pub fn interpret(&mut self, source: &[u8]) -> Result<(), FaxError> {
        let function_ptr = fax_compiler::compile(source, &mut self.heap, &mut self.globals)?;
        self.push(Value::Obj(function_ptr));
        let closure_ptr = self.alloc(ObjKind::Closure(ObjClosure {
            function: function_ptr,
            upvalues: Vec::new(),
        }));
        self.pop();
        self.push(Value::Obj(closure_ptr));
        self.call(closure_ptr, 0)?;
        self.run()
    }

    // ---- allocation (GC-rooted through `VmRoots`) ---------------------
    //
    // Each helper builds its `VmRoots` from direct field references
    // (`&self.stack`, `&self.frames`, ...), never through a `&self`-taking
    // method: the latter would borrow all of `self` and conflict with the
    // `&mut self.heap` the allocation call itself needs. Built inline like
    // this, the borrow checker sees the two borrows as disjoint fields.

    fn intern(&mut self, bytes: &[u8]) -> *mut Obj {
        let roots = VmRoots {
            stack: &self.stack,
            frames: &self.frames,
            open_upvalues: self.open_upvalues,
            globals: &self.globals,
            global_values: &self.global_values,
            init_string: self.init_string,
        };
        self.heap.copy_string(bytes, &[&roots])
    }

    fn take_string(&mut self, bytes: Box<[u8]>) -> *mut Obj {
        let roots = VmRoots {
            stack: &self.stack,
            frames: &self.frames,
            open_upvalues: self.open_upvalues,
            globals: &self.globals,
            global_values: &self.global_values,
            init_string: self.init_string,
        };
        self.heap.take_string(bytes, &[&roots])
    }

    fn alloc(&mut self, kind: ObjKind) -> *mut Obj {
        let roots = VmRoots {
            stack: &self.stack,
            frames: &self.frames,
            open_upvalues: self.open_upvalues,
            globals: &self.globals,
            global_values: &self.global_values,
            init_string: self.init_string,
        };
        self.heap.alloc_obj(kind, &[&roots])
    }

    fn define_native(&mut self, name: &'static str, arity: u8, function: fax_gc::NativeFn) {
        // Push the name, then the native object, before writing either
        // into the globals store, so both stay GC-reachable through the
        // allocation that might collect.
        let name_ptr = self.intern(name.as_bytes());
        self.push(Value::Obj(name_ptr));
        let native_ptr = self.alloc(ObjKind::Native(ObjNative { arity, name, function }));
        self.push(Value::Obj(native_ptr));

        let slot = self
            .globals
            .slot_for(name_ptr)
            .expect("fewer than 256 builtins are ever registered");
        self.globals.define(slot, false);
        if self.global_values.len() <= slot as usize {
            self.global_values.resize(slot as usize + 1, Value::Undefined);
        }
        self.global_values[slot as usize] = Value::Obj(native_ptr);

        self.pop();
        self.pop();
    }

    // ---- stack primitives ----------------------------------------------

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("pop on an empty value stack")
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues = std::ptr::null_mut();
    }

    // ---- bytecode reading ------------------------------------------------

    fn current_chunk(&self) -> *const fax_gc::Chunk {
        let frame = self.frames.last().expect("read outside any active frame");
        unsafe {
            match &(*frame.closure).kind {
                ObjKind::Closure(c) => match &(*c.function).kind {
                    ObjKind::Function(f) => &f.chunk as *const fax_gc::Chunk,
                    _ => unreachable!("call frame's function slot holds a non-function"),
                },
                _ => unreachable!("call frame holds a non-closure object"),
            }
        }
    }

    fn read_byte(&mut self) -> u8 {
        let chunk = self.current_chunk();
        let frame = self.frames.last_mut().unwrap();
        let byte = unsafe { (*chunk).code[frame.ip] };
        frame.ip += 1;
        byte
    }

    fn read_short(&mut self) -> u16 {
        let hi = self.read_byte() as u16;
        let lo = self.read_byte() as u16;
        (hi << 8) | lo
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte();
        let chunk = self.current_chunk();
        unsafe { (*chunk).constants[index as usize] }
    }

    fn read_string(&mut self) -> *mut Obj {
        match self.read_constant() {
            Value::Obj(ptr) => ptr,
            _ => unreachable!("constant referenced by a string operand was not a string"),
        }
    }

    // ---- type tests ------------------------------------------------------

    fn is_class(&self, ptr: *mut Obj) -> bool {
        unsafe { matches!(&(*ptr).kind, ObjKind::Class(_)) }
    }

    fn is_instance(&self, ptr: *mut Obj) -> bool {
        unsafe { matches!(&(*ptr).kind, ObjKind::Instance(_)) }
    }

    fn is_string(&self, value: Value) -> bool {
        matches!(value, Value::Obj(ptr) if unsafe { matches!(&(*ptr).kind, ObjKind::String(_)) })
    }

    // ---- value formatting (OP_PRINT, runtime error text) ------------------

    fn format_value(&self, value: Value) -> String {
        match value {
            Value::Nil => "nil".to_string(),
            Value::Undefined => "undefined".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(n),
            Value::Obj(ptr) => self.format_object(ptr),
        }
    }

    fn format_object(&self, ptr: *mut Obj) -> String {
        unsafe {
            match &(*ptr).kind {
                ObjKind::String(s) => String::from_utf8_lossy(&s.bytes).into_owned(),
                ObjKind::Function(f) => match f.name {
                    Some(name) => {
                        format!("<fn {}>", String::from_utf8_lossy(string_bytes(name)))
                    }
                    None => "<script>".to_string(),
                },
                ObjKind::Native(n) => format!("<native fn {}>", n.name),
                ObjKind::Closure(c) => self.format_object(c.function),
                ObjKind::Upvalue(_) => "upvalue".to_string(),
                ObjKind::Class(c) => String::from_utf8_lossy(string_bytes(c.name)).into_owned(),
                ObjKind::Instance(i) => {
                    let class_name = match &(*i.class).kind {
                        ObjKind::Class(c) => String::from_utf8_lossy(string_bytes(c.name)).into_owned(),
                        _ => unreachable!("instance's class slot holds a non-class"),
                    };
                    format!("{class_name} instance")
                }
                ObjKind::BoundMethod(b) => self.format_object(b.method),
            }
        }
    }

    // ---- errors ------------------------------------------------------

    /// Builds the frame-by-frame trace (each frame: file line and function
    /// name, or "script" for the top level), writes the message and trace
    /// to the error sink, resets both stacks, and returns the error for
    /// the caller to propagate.
    fn runtime_error(&mut self, message: impl Into<String>) -> FaxError {
        let message = message.into();
        log::debug!("runtime error: {message}");
        let mut trace = Vec::with_capacity(self.frames.len());
        for frame in self.frames.iter().rev() {
            let (name, line) = unsafe {
                match &(*frame.closure).kind {
                    ObjKind::Closure(c) => match &(*c.function).kind {
                        ObjKind::Function(f) => {
                            let line = f.chunk.lines.get(frame.ip.saturating_sub(1)).copied().unwrap_or(0);
                            let name = match f.name {
                                Some(n) => String::from_utf8_lossy(string_bytes(n)).into_owned(),
                                None => "script".to_string(),
                            };
                            (name, line)
                        }
                        _ => unreachable!("call frame's function slot holds a non-function"),
                    },
                    _ => unreachable!("call frame holds a non-closure object"),
                }
            };
            if name == "script" {
                trace.push(format!("[line {line}] in script"));
            } else {
                trace.push(format!("[line {line}] in {name}()"));
            }
        }

        let _ = writeln!(self.stderr, "{message}");
        for line in &trace {
            let _ = writeln!(self.stderr, "{line}");
        }

        self.reset_stack();
        FaxError::runtime(message, trace)
    }

    // ---- calling ------------------------------------------------------

    fn call_value(&mut self, callee: Value, arg_count: u8) -> Result<(), FaxError> {
        if let Value::Obj(ptr) = callee {
            let kind_is = unsafe { &(*ptr).kind };
            match kind_is {
                ObjKind::Closure(_) => return self.call(ptr, arg_count),
                ObjKind::Native(_) => return self.call_native(ptr, arg_count),
                ObjKind::Class(_) => return self.call_class(ptr, arg_count),
                ObjKind::BoundMethod(_) => return self.call_bound_method(ptr, arg_count),
                _ => {}
            }
        }
        Err(self.runtime_error("Can only call functions and classes."))
    }

    fn call(&mut self, closure_ptr: *mut Obj, arg_count: u8) -> Result<(), FaxError> {
        let arity = unsafe {
            match &(*closure_ptr).kind {
                ObjKind::Closure(c) => match &(*c.function).kind {
                    ObjKind::Function(f) => f.arity,
                    _ => unreachable!("closure's function slot holds a non-function"),
                },
                _ => unreachable!("call() invoked on a non-closure object"),
            }
        };
        if arg_count != arity {
            return Err(self.runtime_error(format!(
                "Expected {arity} arguments but got {arg_count}."
            )));
        }
        if self.frames.len() == FRAMES_MAX {
            return Err(self.runtime_error("Stack overflow."));
        }
        let base = self.stack.len() - arg_count as usize - 1;
        self.frames.push(CallFrame { closure: closure_ptr, ip: 0, slots: base });
        Ok(())
    }

    fn call_native(&mut self, ptr: *mut Obj, arg_count: u8) -> Result<(), FaxError> {
        let (arity, function) = unsafe {
            match &(*ptr).kind {
                ObjKind::Native(n) => (n.arity, n.function),
                _ => unreachable!("call_native() invoked on a non-native object"),
            }
        };
        if arg_count != arity {
            return Err(self.runtime_error(format!(
                "Expected {arity} arguments but got {arg_count}."
            )));
        }
        let start = self.stack.len() - arg_count as usize;
        let args: Vec<Value> = self.stack[start..].to_vec();
        let mut result = Value::Nil;
        if !function(&args, &mut result) {
            return Err(self.runtime_error("Error in native call."));
        }
        self.stack.truncate(start - 1);
        self.push(result);
        Ok(())
    }

    fn call_class(&mut self, class_ptr: *mut Obj, arg_count: u8) -> Result<(), FaxError> {
        let instance_ptr = self.alloc(ObjKind::Instance(ObjInstance {
            class: class_ptr,
            fields: Table::new(),
        }));
        let slot = self.stack.len() - arg_count as usize - 1;
        self.stack[slot] = Value::Obj(instance_ptr);

        let initializer = unsafe {
            match &(*class_ptr).kind {
                ObjKind::Class(c) => c.methods.get(self.init_string),
                _ => unreachable!("call_class() invoked on a non-class object"),
            }
        };
        match initializer {
            Some(Value::Obj(init_ptr)) => self.call(init_ptr, arg_count),
            _ => {
                if arg_count != 0 {
                    return Err(self.runtime_error(format!(
                        "Expected 0 arguments but got {arg_count}."
                    )));
                }
                Ok(())
            }
        }
    }

    fn call_bound_method(&mut self, ptr: *mut Obj, arg_count: u8) -> Result<(), FaxError> {
        let (receiver, method_ptr) = unsafe {
            match &(*ptr).kind {
                ObjKind::BoundMethod(b) => (b.receiver, b.method),
                _ => unreachable!("call_bound_method() invoked on a non-bound-method object"),
            }
        };
        let slot = self.stack.len() - arg_count as usize - 1;
        self.stack[slot] = receiver;
        self.call(method_ptr, arg_count)
    }

    fn bind_method(&mut self, class_ptr: *mut Obj, name_ptr: *mut Obj) -> Result<(), FaxError> {
        let method = unsafe {
            match &(*class_ptr).kind {
                ObjKind::Class(c) => c.methods.get(name_ptr),
                _ => unreachable!("bind_method() invoked on a non-class object"),
            }
        };
        match method {
            Some(Value::Obj(method_ptr)) => {
                let receiver = self.peek(0);
                let bound_ptr = self.alloc(ObjKind::BoundMethod(ObjBoundMethod {
                    receiver,
                    method: method_ptr,
                }));
                self.pop();
                self.push(Value::Obj(bound_ptr));
                Ok(())
            }
            _ => Err(self.undefined_property_error(name_ptr)),
        }
    }

    fn invoke(&mut self, name_ptr: *mut Obj, arg_count: u8) -> Result<(), FaxError> {
        let receiver = self.peek(arg_count as usize);
        let instance_ptr = match receiver {
            Value::Obj(p) if self.is_instance(p) => p,
            _ => return Err(self.runtime_error("Only instances have methods.")),
        };

        // Fields shadow methods: a field holding a callable wins over a
        // method of the same name.
        let field = unsafe {
            match &(*instance_ptr).kind {
                ObjKind::Instance(i) => i.fields.get(name_ptr),
                _ => unreachable!(),
            }
        };
        if let Some(value) = field {
            let slot = self.stack.len() - arg_count as usize - 1;
            self.stack[slot] = value;
            return self.call_value(value, arg_count);
        }

        let class_ptr = unsafe {
            match &(*instance_ptr).kind {
                ObjKind::Instance(i) => i.class,
                _ => unreachable!(),
            }
        };
        self.invoke_from_class(class_ptr, name_ptr, arg_count)
    }

    fn invoke_from_class(
        &mut self,
        class_ptr: *mut Obj,
        name_ptr: *mut Obj,
        arg_count: u8,
    ) -> Result<(), FaxError> {
        let method = unsafe {
            match &(*class_ptr).kind {
                ObjKind::Class(c) => c.methods.get(name_ptr),
                _ => unreachable!("invoke_from_class() invoked on a non-class object"),
            }
        };
        match method {
            Some(Value::Obj(method_ptr)) => self.call(method_ptr, arg_count),
            _ => Err(self.undefined_property_error(name_ptr)),
        }
    }

    fn undefined_property_error(&mut self, name_ptr: *mut Obj) -> FaxError {
        let name = String::from_utf8_lossy(unsafe { string_bytes(name_ptr) }).into_owned();
        self.runtime_error(format!("Undefined property '{name}'."))
    }

    /// Looks a global slot's name up in `GlobalsTable`'s reverse map, so
    /// `GET_GLOBAL`/`SET_GLOBAL` errors name the offending variable.
    fn global_name(&self, slot: usize) -> String {
        match self.globals.names_by_slot().get(slot) {
            Some(&ptr) => String::from_utf8_lossy(unsafe { string_bytes(ptr) }).into_owned(),
            None => "?".to_string(),
        }
    }

    fn undefined_variable_error(&mut self, slot: usize) -> FaxError {
        let name = self.global_name(slot);
        self.runtime_error(format!("Undefined variable '{name}'."))
    }

    fn define_method(&mut self, name_ptr: *mut Obj) {
        let method = self.peek(0);
        if let Value::Obj(class_ptr) = self.peek(1) {
            if let ObjKind::Class(c) = unsafe { &mut (*class_ptr).kind } {
                c.methods.set(name_ptr, method);
            }
        }
        self.pop();
    }

    // ---- closures & upvalues -------------------------------------------

    fn capture_upvalue(&mut self, local_slot: usize) -> *mut Obj {
        let mut prev: *mut Obj = std::ptr::null_mut();
        let mut current = self.open_upvalues;
        while !current.is_null() && unsafe { upvalue_slot(current) } > local_slot {
            prev = current;
            current = unsafe { upvalue_next(current) };
        }
        if !current.is_null() && unsafe { upvalue_slot(current) } == local_slot {
            return current;
        }

        let created = self.alloc(ObjKind::Upvalue(ObjUpvalue {
            loc: UpvalueLoc::Open(local_slot),
            next_open: current,
        }));
        if prev.is_null() {
            self.open_upvalues = created;
        } else {
            unsafe {
                if let ObjKind::Upvalue(u) = &mut (*prev).kind {
                    u.next_open = created;
                }
            }
        }
        created
    }

    /// Closes every open upvalue whose slot is at or above `from_slot`,
    /// copying the stack value into the upvalue itself so it survives
    /// the slot being reused or popped.
    fn close_upvalues(&mut self, from_slot: usize) {
        while !self.open_upvalues.is_null() && unsafe { upvalue_slot(self.open_upvalues) } >= from_slot {
            let ptr = self.open_upvalues;
            let slot = unsafe { upvalue_slot(ptr) };
            let value = self.stack[slot];
            unsafe {
                if let ObjKind::Upvalue(u) = &mut (*ptr).kind {
                    u.loc = UpvalueLoc::Closed(value);
                    self.open_upvalues = u.next_open;
                }
            }
        }
    }

    fn read_upvalue_value(&self, slot: usize) -> Value {
        let closure_ptr = self.frames.last().unwrap().closure;
        unsafe {
            let upvalue_ptr = match &(*closure_ptr).kind {
                ObjKind::Closure(c) => c.upvalues[slot],
                _ => unreachable!(),
            };
            match &(*upvalue_ptr).kind {
                ObjKind::Upvalue(u) => match u.loc {
                    UpvalueLoc::Open(s) => self.stack[s],
                    UpvalueLoc::Closed(v) => v,
                },
                _ => unreachable!(),
            }
        }
    }

    fn write_upvalue_value(&mut self, slot: usize, value: Value) {
        let closure_ptr = self.frames.last().unwrap().closure;
        unsafe {
            let upvalue_ptr = match &(*closure_ptr).kind {
                ObjKind::Closure(c) => c.upvalues[slot],
                _ => unreachable!(),
            };
            match &mut (*upvalue_ptr).kind {
                ObjKind::Upvalue(u) => match &mut u.loc {
                    UpvalueLoc::Open(s) => self.stack[*s] = value,
                    UpvalueLoc::Closed(v) => *v = value,
                },
                _ => unreachable!(),
            }
        }
    }

    fn closure_op(&mut self) -> Result<(), FaxError> {
        let function_ptr = match self.read_constant() {
            Value::Obj(ptr) => ptr,
            _ => unreachable!("OP_CLOSURE's constant was not a function"),
        };
        let upvalue_count = unsafe {
            match &(*function_ptr).kind {
                ObjKind::Function(f) => f.upvalue_count,
                _ => unreachable!(),
            }
        };
        let closure_ptr = self.alloc(ObjKind::Closure(ObjClosure {
            function: function_ptr,
            upvalues: Vec::with_capacity(upvalue_count as usize),
        }));
        self.push(Value::Obj(closure_ptr));

        let base = self.frames.last().unwrap().slots;
        let enclosing_closure = self.frames.last().unwrap().closure;
        for _ in 0..upvalue_count {
            let is_local = self.read_byte();
            let index = self.read_byte();
            let upvalue_ptr = if is_local != 0 {
                self.capture_upvalue(base + index as usize)
            } else {
                unsafe {
                    match &(*enclosing_closure).kind {
                        ObjKind::Closure(c) => c.upvalues[index as usize],
                        _ => unreachable!(),
                    }
                }
            };
            unsafe {
                if let ObjKind::Closure(c) = &mut (*closure_ptr).kind {
                    c.upvalues.push(upvalue_ptr);
                }
            }
        }
        Ok(())
    }

    // ---- arithmetic ------------------------------------------------------

    fn add(&mut self) -> Result<(), FaxError> {
        let b = self.peek(0);
        let a = self.peek(1);
        if self.is_string(a) && self.is_string(b) {
            self.concatenate()
        } else if let (Value::Number(x), Value::Number(y)) = (a, b) {
            self.pop();
            self.pop();
            self.push(Value::Number(x + y));
            Ok(())
        } else {
            Err(self.runtime_error("Operands must be two numbers or two strings."))
        }
    }

    /// Concatenates the two string operands, kept on the stack (only
    /// peeked, not popped) through the allocation that might collect,
    /// so they stay reachable as GC roots while `take_string` runs.
    fn concatenate(&mut self) -> Result<(), FaxError> {
        let b_ptr = match self.peek(0) {
            Value::Obj(p) => p,
            _ => unreachable!(),
        };
        let a_ptr = match self.peek(1) {
            Value::Obj(p) => p,
            _ => unreachable!(),
        };
        let mut bytes = Vec::new();
        unsafe {
            bytes.extend_from_slice(string_bytes(a_ptr));
            bytes.extend_from_slice(string_bytes(b_ptr));
        }
        let result_ptr = self.take_string(bytes.into_boxed_slice());
        self.pop();
        self.pop();
        self.push(Value::Obj(result_ptr));
        Ok(())
    }

    fn binary_number_op(&mut self, op: fn(f64, f64) -> Value) -> Result<(), FaxError> {
        match (self.peek(1), self.peek(0)) {
            (Value::Number(a), Value::Number(b)) => {
                self.pop();
                self.pop();
                self.push(op(a, b));
                Ok(())
            }
            _ => Err(self.runtime_error("Operands must be numbers.")),
        }
    }

    // ---- properties ------------------------------------------------------

    fn get_property(&mut self) -> Result<(), FaxError> {
        let name_ptr = self.read_string();
        let instance_ptr = match self.peek(0) {
            Value::Obj(p) if self.is_instance(p) => p,
            _ => return Err(self.runtime_error("Only instances have properties.")),
        };
        let field = unsafe {
            match &(*instance_ptr).kind {
                ObjKind::Instance(i) => i.fields.get(name_ptr),
                _ => unreachable!(),
            }
        };
        if let Some(value) = field {
            self.pop();
            self.push(value);
            return Ok(());
        }
        let class_ptr = unsafe {
            match &(*instance_ptr).kind {
                ObjKind::Instance(i) => i.class,
                _ => unreachable!(),
            }
        };
        self.bind_method(class_ptr, name_ptr)
    }

    fn set_property(&mut self) -> Result<(), FaxError> {
        let name_ptr = self.read_string();
        let instance_ptr = match self.peek(1) {
            Value::Obj(p) if self.is_instance(p) => p,
            _ => return Err(self.runtime_error("Only instances have fields.")),
        };
        let value = self.peek(0);
        unsafe {
            if let ObjKind::Instance(i) = &mut (*instance_ptr).kind {
                i.fields.set(name_ptr, value);
            }
        }
        let value = self.pop();
        self.pop();
        self.push(value);
        Ok(())
    }

    fn inherit(&mut self) -> Result<(), FaxError> {
        let superclass = self.peek(1);
        let super_ptr = match superclass {
            Value::Obj(p) if self.is_class(p) => p,
            _ => return Err(self.runtime_error("Superclass must be a class.")),
        };
        let sub_ptr = match self.peek(0) {
            Value::Obj(p) => p,
            _ => unreachable!("OP_INHERIT's subclass operand was not an object"),
        };
        let methods: Vec<(*mut Obj, Value)> = unsafe {
            match &(*super_ptr).kind {
                ObjKind::Class(c) => c.methods.iter().collect(),
                _ => unreachable!(),
            }
        };
        unsafe {
            if let ObjKind::Class(sub) = &mut (*sub_ptr).kind {
                for (key, value) in methods {
                    sub.methods.set(key, value);
                }
            }
        }
        // Pops the subclass, leaving the superclass as the `super` local
        // the compiler opened a scope around (real clox's `OP_INHERIT`).
        self.pop();
        Ok(())
    }

    // ---- the dispatch loop ------------------------------------------------

    fn run(&mut self) -> Result<(), FaxError> {
        loop {
            // Mirrors clox's `DEBUG_TRACE_EXECUTION`: print the stack, then
            // disassemble the instruction about to run, before executing it.
            if self.trace_exec {
                let chunk = self.current_chunk();
                let offset = self.frames.last().unwrap().ip;
                print!("          ");
                for &value in &self.stack {
                    print!("[ {} ]", self.format_value(value));
                }
                println!();
                unsafe {
                    fax_gc::disassemble_instruction(&*chunk, offset);
                }
            }

            let byte = self.read_byte();
            let op = match OpCode::try_from(byte) {
                Ok(op) => op,
                Err(_) => return Err(self.runtime_error("Invalid opcode.")),
            };

            match op {
                OpCode::Constant => {
                    let value = self.read_constant();
                    self.push(value);
                }
                OpCode::Nil => self.push(Value::Nil),
                OpCode::True => self.push(Value::Bool(true)),
                OpCode::False => self.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frames.last().unwrap().slots;
                    self.push(self.stack[base + slot]);
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frames.last().unwrap().slots;
                    self.stack[base + slot] = self.peek(0);
                }
                OpCode::GetGlobal => {
                    let slot = self.read_byte() as usize;
                    let value = self.global_values.get(slot).copied().unwrap_or(Value::Undefined);
                    if matches!(value, Value::Undefined) {
                        return Err(self.undefined_variable_error(slot));
                    }
                    self.push(value);
                }
                OpCode::DefineGlobal => {
                    let slot = self.read_byte() as usize;
                    let value = self.pop();
                    if self.global_values.len() <= slot {
                        self.global_values.resize(slot + 1, Value::Undefined);
                    }
                    self.global_values[slot] = value;
                }
                OpCode::SetGlobal => {
                    let slot = self.read_byte() as usize;
                    let existing = self.global_values.get(slot).copied().unwrap_or(Value::Undefined);
                    if matches!(existing, Value::Undefined) {
                        return Err(self.undefined_variable_error(slot));
                    }
                    self.global_values[slot] = self.peek(0);
                }
                OpCode::GetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let value = self.read_upvalue_value(slot);
                    self.push(value);
                }
                OpCode::SetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let value = self.peek(0);
                    self.write_upvalue_value(slot, value);
                }
                OpCode::GetProperty => self.get_property()?,
                OpCode::SetProperty => self.set_property()?,
                OpCode::GetSuper => {
                    let name_ptr = self.read_string();
                    let super_ptr = match self.pop() {
                        Value::Obj(p) => p,
                        _ => unreachable!("OP_GET_SUPER's operand was not an object"),
                    };
                    self.bind_method(super_ptr, name_ptr)?;
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(Value::values_equal(a, b)));
                }
                OpCode::Less => self.binary_number_op(|a, b| Value::Bool(a < b))?,
                OpCode::Greater => self.binary_number_op(|a, b| Value::Bool(a > b))?,
                OpCode::Add => self.add()?,
                OpCode::Subtract => self.binary_number_op(|a, b| Value::Number(a - b))?,
                OpCode::Multiply => self.binary_number_op(|a, b| Value::Number(a * b))?,
                OpCode::Divide => self.binary_number_op(|a, b| Value::Number(a / b))?,
                OpCode::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(!value.is_truthy()));
                }
                OpCode::Negate => match self.peek(0) {
                    Value::Number(n) => {
                        self.pop();
                        self.push(Value::Number(-n));
                    }
                    _ => return Err(self.runtime_error("Operand must be a number.")),
                },
                OpCode::Print => {
                    let value = self.pop();
                    let text = self.format_value(value);
                    let _ = writeln!(self.stdout, "{text}");
                }
                OpCode::Jump => {
                    let offset = self.read_short();
                    self.frames.last_mut().unwrap().ip += offset as usize;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_short();
                    if !self.peek(0).is_truthy() {
                        self.frames.last_mut().unwrap().ip += offset as usize;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_short();
                    self.frames.last_mut().unwrap().ip -= offset as usize;
                }
                OpCode::Call => {
                    let arg_count = self.read_byte();
                    let callee = self.peek(arg_count as usize);
                    self.call_value(callee, arg_count)?;
                }
                OpCode::Invoke => {
                    let name_ptr = self.read_string();
                    let arg_count = self.read_byte();
                    self.invoke(name_ptr, arg_count)?;
                }
                OpCode::SuperInvoke => {
                    let name_ptr = self.read_string();
                    let arg_count = self.read_byte();
                    let super_ptr = match self.pop() {
                        Value::Obj(p) => p,
                        _ => unreachable!("OP_SUPER_INVOKE's operand was not an object"),
                    };
                    self.invoke_from_class(super_ptr, name_ptr, arg_count)?;
                }
                OpCode::Closure => self.closure_op()?,
                OpCode::CloseUpvalue => {
                    let top = self.stack.len() - 1;
                    self.close_upvalues(top);
                    self.pop();
                }
                OpCode::Return => {
                    let result = self.pop();
                    let base = self.frames.last().unwrap().slots;
                    self.close_upvalues(base);
                    self.frames.pop();
                    if self.frames.is_empty() {
                        self.pop();
                        return Ok(());
                    }
                    self.stack.truncate(base);
                    self.push(result);
                }
                OpCode::Class => {
                    let name_ptr = self.read_string();
                    let class_ptr = self.alloc(ObjKind::Class(ObjClass {
                        name: name_ptr,
                        methods: Table::new(),
                    }));
                    self.push(Value::Obj(class_ptr));
                }
                OpCode::Inherit => self.inherit()?,
                OpCode::Method => {
                    let name_ptr = self.read_string();
                    self.define_method(name_ptr);
                }
            }
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

/// `%g`-ish number formatting: whole-valued doubles print without a
/// trailing `.0`.
fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
