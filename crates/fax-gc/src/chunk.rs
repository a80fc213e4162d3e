//! Chunk - compiled bytecode for a single function body.
//!
//! A `Chunk` is a byte array, a companion line-number array, and a
//! constant pool, with 16-bit big-endian jump operands.

use crate::value::Value;

/// The complete opcode set. Each variant is one byte; operand bytes (0-3)
/// follow in the instruction stream and are not part of this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Constant,
    Nil,
    True,
    False,
    Pop,
    GetLocal,
    SetLocal,
    GetGlobal,
    DefineGlobal,
    SetGlobal,
    GetUpvalue,
    SetUpvalue,
    GetProperty,
    SetProperty,
    GetSuper,
    Equal,
    Less,
    Greater,
    Add,
    Subtract,
    Multiply,
    Divide,
    Not,
    Negate,
    Print,
    Jump,
    JumpIfFalse,
    Loop,
    Call,
    Invoke,
    SuperInvoke,
    Closure,
    CloseUpvalue,
    Return,
    Class,
    Inherit,
    Method,
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        use OpCode::*;
        const TABLE: &[OpCode] = &[
            Constant,
            Nil,
            True,
            False,
            Pop,
            GetLocal,
            SetLocal,
            GetGlobal,
            DefineGlobal,
            SetGlobal,
            GetUpvalue,
            SetUpvalue,
            GetProperty,
            SetProperty,
            GetSuper,
            Equal,
            Less,
            Greater,
            Add,
            Subtract,
            Multiply,
            Divide,
            Not,
            Negate,
            Print,
            Jump,
            JumpIfFalse,
            Loop,
            Call,
            Invoke,
            SuperInvoke,
            Closure,
            CloseUpvalue,
            Return,
            Class,
            Inherit,
            Method,
        ];
        TABLE.get(byte as usize).copied().ok_or(byte)
    }
}

/// Bytecode for one function body: flat instruction stream, a parallel
/// per-byte line-number array, and the constant pool. The invariant
/// `lines.len() == code.len()` holds after every `write`.
#[derive(Default)]
pub struct Chunk {
    pub code: Vec<u8>,
    pub lines: Vec<u32>,
    pub constants: Vec<Value>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, byte: u8, line: u32) {
        self.code.push(byte);
        self.lines.push(line);
    }

    pub fn write_op(&mut self, op: OpCode, line: u32) {
        self.write(op as u8, line);
    }

    /// Appends `value` to the constant pool and returns its index, or
    /// `None` if the pool is already at the 255-entry limit.
    pub fn add_constant(&mut self, value: Value) -> Option<u8> {
        if self.constants.len() >= u8::MAX as usize + 1 {
            return None;
        }
        self.constants.push(value);
        Some((self.constants.len() - 1) as u8)
    }

    /// Patches a 16-bit jump operand at `offset` to the current code
    /// length, called once the jump target is known.
    pub fn patch_jump(&mut self, offset: usize) -> Result<(), &'static str> {
        let jump = self.code.len() - offset - 2;
        if jump > u16::MAX as usize {
            return Err("Too much code to jump over.");
        }
        let jump = jump as u16;
        self.code[offset] = (jump >> 8) as u8;
        self.code[offset + 1] = jump as u8;
        Ok(())
    }

    pub fn approx_size(&self) -> usize {
        self.code.len()
            + self.lines.len() * std::mem::size_of::<u32>()
            + self.constants.len() * std::mem::size_of::<Value>()
    }
}

/// Diagnostic disassembler, prints one line per instruction: offset,
/// source line, mnemonic, operands.
pub fn disassemble_chunk(chunk: &Chunk, name: &str) {
    println!("== {name} ==");
    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(chunk, offset);
    }
}

pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> usize {
    print!("{offset:04} ");
    if offset > 0 && chunk.lines[offset] == chunk.lines[offset - 1] {
        print!("   | ");
    } else {
        print!("{:4} ", chunk.lines[offset]);
    }

    let byte = chunk.code[offset];
    let op = match OpCode::try_from(byte) {
        Ok(op) => op,
        Err(_) => {
            println!("Unknown opcode {byte}");
            return offset + 1;
        }
    };

    use OpCode::*;
    match op {
        Constant => constant_instruction("OP_CONSTANT", chunk, offset),
        Nil => simple_instruction("OP_NIL", offset),
        True => simple_instruction("OP_TRUE", offset),
        False => simple_instruction("OP_FALSE", offset),
        Pop => simple_instruction("OP_POP", offset),
        GetLocal => byte_instruction("OP_GET_LOCAL", chunk, offset),
        SetLocal => byte_instruction("OP_SET_LOCAL", chunk, offset),
        GetGlobal => byte_instruction("OP_GET_GLOBAL", chunk, offset),
        DefineGlobal => byte_instruction("OP_DEFINE_GLOBAL", chunk, offset),
        SetGlobal => byte_instruction("OP_SET_GLOBAL", chunk, offset),
        GetUpvalue => byte_instruction("OP_GET_UPVALUE", chunk, offset),
        SetUpvalue => byte_instruction("OP_SET_UPVALUE", chunk, offset),
        GetProperty => constant_instruction("OP_GET_PROPERTY", chunk, offset),
        SetProperty => constant_instruction("OP_SET_PROPERTY", chunk, offset),
        GetSuper => constant_instruction("OP_GET_SUPER", chunk, offset),
        Equal => simple_instruction("OP_EQUAL", offset),
        Less => simple_instruction("OP_LESS", offset),
        Greater => simple_instruction("OP_GREATER", offset),
        Add => simple_instruction("OP_ADD", offset),
        Subtract => simple_instruction("OP_SUBTRACT", offset),
        Multiply => simple_instruction("OP_MULTIPLY", offset),
        Divide => simple_instruction("OP_DIVIDE", offset),
        Not => simple_instruction("OP_NOT", offset),
        Negate => simple_instruction("OP_NEGATE", offset),
        Print => simple_instruction("OP_PRINT", offset),
        Jump => jump_instruction("OP_JUMP", 1, chunk, offset),
        JumpIfFalse => jump_instruction("OP_JUMP_IF_FALSE", 1, chunk, offset),
        Loop => jump_instruction("OP_LOOP", -1, chunk, offset),
        Call => byte_instruction("OP_CALL", chunk, offset),
        Invoke => invoke_instruction("OP_INVOKE", chunk, offset),
        SuperInvoke => invoke_instruction("OP_SUPER_INVOKE", chunk, offset),
        Closure => closure_instruction(chunk, offset),
        CloseUpvalue => simple_instruction("OP_CLOSE_UPVALUE", offset),
        Return => simple_instruction("OP_RETURN", offset),
        Class => constant_instruction("OP_CLASS", chunk, offset),
        Inherit => simple_instruction("OP_INHERIT", offset),
        Method => constant_instruction("OP_METHOD", chunk, offset),
    }
}

fn simple_instruction(name: &str, offset: usize) -> usize {
    println!("{name}");
    offset + 1
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let slot = chunk.code[offset + 1];
    println!("{name:-16} {slot:4}");
    offset + 2
}

fn constant_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let index = chunk.code[offset + 1];
    println!("{name:-16} {index:4} '{:?}'", chunk.constants[index as usize]);
    offset + 2
}

fn jump_instruction(name: &str, sign: i32, chunk: &Chunk, offset: usize) -> usize {
    let hi = chunk.code[offset + 1] as u16;
    let lo = chunk.code[offset + 2] as u16;
    let jump = ((hi << 8) | lo) as i32;
    let target = offset as i32 + 3 + sign * jump;
    println!("{name:-16} {offset:4} -> {target}");
    offset + 3
}

fn invoke_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let index = chunk.code[offset + 1];
    let arg_count = chunk.code[offset + 2];
    println!(
        "{name:-16} ({arg_count} args) {index:4} '{:?}'",
        chunk.constants[index as usize]
    );
    offset + 3
}

fn closure_instruction(chunk: &Chunk, offset: usize) -> usize {
    let mut offset = offset + 1;
    let index = chunk.code[offset];
    offset += 1;
    println!("{:-16} {index:4} '{:?}'", "OP_CLOSURE", chunk.constants[index as usize]);

    if let Value::Obj(ptr) = chunk.constants[index as usize] {
        if let crate::object::ObjKind::Function(f) = unsafe { &(*ptr).kind } {
            for _ in 0..f.upvalue_count {
                let is_local = chunk.code[offset];
                let upvalue_index = chunk.code[offset + 1];
                offset += 2;
                let kind = if is_local != 0 { "local" } else { "upvalue" };
                println!("{offset:04}      |                     {kind} {upvalue_index}");
            }
        }
    }
    offset
}
