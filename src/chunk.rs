//! Contains the `OpCode` enum as well as the chunks containing the bytecode
//! to be interpreted.

use derivative::Derivative;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use paste::paste;
use rustc_hash::FxHashMap as HashMap;
use shrinkwraprs::Shrinkwrap;
use std::fmt::Write;
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, EnumIter};

use crate::heap::Heap;
use crate::types::Span;
use crate::value::Value;

#[derive(Shrinkwrap, Clone, Copy, Debug)]
#[shrinkwrap(mutable)]
pub struct CodeOffset(pub usize);

#[derive(Shrinkwrap, Clone, Copy, Debug)]
pub struct LiteralIndex(pub u16);

/// The set of `OpCodes` emitted by the compiler to be executed by the VM.
///
/// Multi-byte operands are big-endian. Literal operands are u16 indices
/// into the chunk's literal pool.
#[derive(
    IntoPrimitive, TryFromPrimitive, PartialEq, Eq, Debug, Clone, Copy, EnumIter, AsRefStr,
)]
#[repr(u8)]
pub enum OpCode {
    Null,
    True,
    False,
    Constant,
    Pop,

    Add,
    Sub,
    Mul,
    Div,
    LessThan,
    GreaterThan,
    Equal,

    Jump,
    JumpIfFalse,
    Loop,

    GetLocal,
    SetLocal,
    GetGlobal,
    SetGlobal,
    DefineGlobal,

    GetUpvalue,
    SetUpvalue,
    CloseUpvalue,
    CloseFunction,

    Call,
    Invoke,
    Return,

    Class,
    Inherit,
    AttachMethod,
    GetMember,
    SetMember,
    GetSuper,

    Halt,
}

#[cfg(test)]
#[test]
fn test_opcode_size() {
    assert_eq!(std::mem::size_of::<OpCode>(), 1);
}

impl OpCode {
    /// Get the length of the longest `OpCode` name.
    ///
    /// Used for aligning debugging output.
    fn max_name_length() -> usize {
        Self::iter().map(|v| v.as_ref().len()).max().unwrap_or(0)
    }
}

/// Run-length encoded source spans: one entry per span change, counting
/// how many code bytes it covers.
#[derive(Clone, Copy, Debug)]
struct SpanRun {
    span: Span,
    count: u32,
}

/// Wraps a block of bytecode used for interpretation.
///
/// Each function has its own `Chunk`, exclusively owned by its
/// `FunctionCode`. Besides the code itself a chunk carries the literal
/// pool (deduplicated through a value-to-index map) and the run-length
/// encoded source spans of every code byte.
#[derive(Derivative, Clone, Debug)]
#[derivative(PartialEq)]
pub struct Chunk {
    code: Vec<u8>,
    literals: Vec<Value>,
    #[derivative(PartialEq = "ignore")]
    literal_ids: HashMap<Value, u16>,
    #[derivative(PartialEq = "ignore")]
    spans: Vec<SpanRun>,
}
impl Eq for Chunk {}

impl Chunk {
    #[must_use]
    pub fn new() -> Self {
        Self {
            code: Vec::default(),
            literals: Vec::default(),
            literal_ids: HashMap::default(),
            spans: Vec::default(),
        }
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn literals(&self) -> &[Value] {
        &self.literals
    }

    /// Retrieve a literal by index.
    pub fn get_literal<T>(&self, index: T) -> &Value
    where
        T: Into<usize>,
    {
        &self.literals[index.into()]
    }

    /// Write a byte (`OpCode` or operand) into the chunk.
    /// Also update the span information accordingly.
    pub fn write<T>(&mut self, what: T, span: Span)
    where
        T: Into<u8>,
    {
        self.code.push(what.into());
        match self.spans.last_mut() {
            Some(run) if run.span == span => run.count += 1,
            _ => self.spans.push(SpanRun { span, count: 1 }),
        }
    }

    /// Write a 16 bit number big-endian.
    pub fn write_u16(&mut self, what: u16, span: Span) {
        let [high, low] = what.to_be_bytes();
        self.write(high, span);
        self.write(low, span);
    }

    /// Patch a previously reserved 16 bit operand.
    ///
    /// Mainly used for forward jumps where the size of the code to jump
    /// over is not yet known when the jump is emitted.
    pub fn patch_u16(&mut self, offset: CodeOffset, what: u16) {
        let [high, low] = what.to_be_bytes();
        self.code[*offset] = high;
        self.code[*offset + 1] = low;
    }

    /// Add a value to the literal pool and return its index.
    ///
    /// Identical values share a pool slot. Returns `None` once the pool
    /// outgrows its 16 bit indices.
    pub fn add_literal(&mut self, what: Value) -> Option<LiteralIndex> {
        if let Some(index) = self.literal_ids.get(&what) {
            return Some(LiteralIndex(*index));
        }
        let index = u16::try_from(self.literals.len()).ok()?;
        self.literals.push(what);
        self.literal_ids.insert(what, index);
        Some(LiteralIndex(index))
    }

    /// Look up the source span for a byte offset by walking the runs.
    pub fn get_span(&self, offset: CodeOffset) -> Span {
        let mut remaining = *offset;
        for run in &self.spans {
            if remaining < run.count as usize {
                return run.span;
            }
            remaining -= run.count as usize;
        }
        self.spans.last().map_or_else(Span::default, |run| run.span)
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Rough deep size, used by the collection heuristic.
    pub fn byte_size(&self) -> usize {
        self.code.capacity()
            + self.literals.capacity() * std::mem::size_of::<Value>()
            + self.spans.capacity() * std::mem::size_of::<SpanRun>()
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new()
    }
}

/// Debug helper rendering a chunk's code in a human readable format.
///
/// Chunks of functions defined inside this chunk (reachable through
/// `CloseFunction` literals) are rendered after the enclosing chunk.
pub struct ChunkDisassembler<'chunk, 'heap> {
    chunk: &'chunk Chunk,
    heap: &'heap Heap,
    from: String,
    name_alignment: usize,
}

macro_rules! disassemble {
    (
        $self:ident,
        $out:ident,
        $offset:ident,
        $m:expr,
        $(
            $k:ident(
                $($v:ident),* $(,)?
            )
        ),* $(,)?
    ) => {paste! {
        match $m {
            $($(
                OpCode::$v => $self.[<render_ $k _opcode>](&mut $out, stringify!($v), $offset)
            ),*),*
        }
    }}
}

impl<'chunk, 'heap> ChunkDisassembler<'chunk, 'heap> {
    #[must_use]
    pub fn new(chunk: &'chunk Chunk, heap: &'heap Heap, from: &str) -> Self {
        Self {
            chunk,
            heap,
            from: from.to_string(),
            name_alignment: OpCode::max_name_length() + 1,
        }
    }

    /// Render the whole chunk, nested chunks last.
    #[must_use]
    pub fn disassemble(&self) -> String {
        let mut out = format!(
            "=== Chunk from {}, size: {} ===\n",
            self.from,
            self.chunk.len()
        );
        let mut nested = Vec::new();
        let mut offset = 0;
        let mut last_line = None;
        while offset < self.chunk.code.len() {
            let span = self.chunk.get_span(CodeOffset(offset));
            if last_line == Some(span.line) {
                let _ = write!(out, "{:>4} ", "|");
            } else {
                let _ = write!(out, "{:>4} ", *span.line);
                last_line = Some(span.line);
            }
            let _ = write!(out, "{offset:04}: ");

            let opcode = OpCode::try_from_primitive(self.chunk.code[offset])
                .unwrap_or_else(|_| panic!("Unknown opcode: {}", self.chunk.code[offset]));
            if opcode == OpCode::CloseFunction {
                let index = self.read_u16(offset + 1);
                nested.push(*self.chunk.get_literal(index));
            }

            disassemble!(
                self,
                out,
                offset,
                opcode,
                simple(
                    Null,
                    True,
                    False,
                    Pop,
                    Add,
                    Sub,
                    Mul,
                    Div,
                    LessThan,
                    GreaterThan,
                    Equal,
                    CloseUpvalue,
                    Inherit,
                    Return,
                    Halt,
                ),
                literal(
                    Constant,
                    GetGlobal,
                    SetGlobal,
                    DefineGlobal,
                    Class,
                    AttachMethod,
                    GetMember,
                    SetMember,
                    GetSuper,
                ),
                u16(GetLocal, SetLocal, GetUpvalue, SetUpvalue),
                byte(Call),
                jump(Jump, JumpIfFalse, Loop),
                invoke(Invoke),
                close_function(CloseFunction),
            );
            offset += self.instruction_len(offset);
        }

        for value in nested {
            let code = self.heap.function_code(value.as_object());
            let from = format!(
                "{} at {}",
                self.heap.string(code.name),
                code.chunk.get_span(CodeOffset(0))
            );
            out.push('\n');
            out.push_str(&ChunkDisassembler::new(&code.chunk, self.heap, &from).disassemble());
        }
        out
    }

    #[allow(clippy::enum_glob_use)]
    fn instruction_len(&self, offset: usize) -> usize {
        use OpCode::*;
        let opcode = OpCode::try_from_primitive(self.chunk.code[offset]).unwrap();
        1 + match opcode {
            Null | True | False | Pop | Add | Sub | Mul | Div | LessThan | GreaterThan | Equal
            | CloseUpvalue | Inherit | Return | Halt => 0,
            Call => 1,
            Constant | GetGlobal | SetGlobal | DefineGlobal | Class | AttachMethod | GetMember
            | SetMember | GetSuper | Jump | JumpIfFalse | Loop | GetLocal | SetLocal
            | GetUpvalue | SetUpvalue => 2,
            Invoke => 3,
            CloseFunction => 2 + self.upvalue_code_len(offset),
        }
    }

    fn upvalue_code_len(&self, offset: usize) -> usize {
        let index = self.read_u16(offset + 1);
        let value = self.chunk.get_literal(index);
        self.heap.function_code(value.as_object()).upvalue_count * 3
    }

    fn read_u16(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.chunk.code[offset], self.chunk.code[offset + 1]])
    }

    #[allow(clippy::unused_self)]
    fn render_simple_opcode(&self, out: &mut String, name: &str, _offset: usize) {
        let _ = writeln!(out, "{name}");
    }

    fn render_literal_opcode(&self, out: &mut String, name: &str, offset: usize) {
        let index = self.read_u16(offset + 1);
        let value = self.chunk.get_literal(index);
        let _ = writeln!(
            out,
            "{name:-ALIGN$}{index:>4} '{}'",
            value.to_string(self.heap),
            ALIGN = self.name_alignment
        );
    }

    fn render_u16_opcode(&self, out: &mut String, name: &str, offset: usize) {
        let slot = self.read_u16(offset + 1);
        let _ = writeln!(out, "{name:-ALIGN$}{slot:>4}", ALIGN = self.name_alignment);
    }

    fn render_byte_opcode(&self, out: &mut String, name: &str, offset: usize) {
        let arg = self.chunk.code[offset + 1];
        let _ = writeln!(out, "{name:-ALIGN$}{arg:>4}", ALIGN = self.name_alignment);
    }

    fn render_jump_opcode(&self, out: &mut String, name: &str, offset: usize) {
        let jump = usize::from(self.read_u16(offset + 1));
        let after = offset + 3;
        let target = if self.chunk.code[offset] == u8::from(OpCode::Loop) {
            after - jump
        } else {
            after + jump
        };
        let _ = writeln!(
            out,
            "{name:-ALIGN$}{offset:>4} -> {target}",
            ALIGN = self.name_alignment
        );
    }

    fn render_invoke_opcode(&self, out: &mut String, name: &str, offset: usize) {
        let index = self.read_u16(offset + 1);
        let arg_count = self.chunk.code[offset + 3];
        let member = self.chunk.get_literal(index);
        let formatted = format!("{name} ({arg_count} args)");
        let _ = writeln!(
            out,
            "{formatted:-ALIGN$}{index:>4} '{}'",
            member.to_string(self.heap),
            ALIGN = self.name_alignment
        );
    }

    fn render_close_function_opcode(&self, out: &mut String, name: &str, offset: usize) {
        let index = self.read_u16(offset + 1);
        let value = self.chunk.get_literal(index);
        let _ = writeln!(
            out,
            "{name:-ALIGN$}{index:>4} {}",
            value.to_string(self.heap),
            ALIGN = self.name_alignment
        );

        let code = self.heap.function_code(value.as_object());
        let mut pair_offset = offset + 3;
        for _ in 0..code.upvalue_count {
            let is_local = self.chunk.code[pair_offset] == 1;
            let slot = self.read_u16(pair_offset + 1);
            let _ = writeln!(
                out,
                "   | {:04}:  > {} {}",
                pair_offset,
                if is_local { "local" } else { "upvalue" },
                slot
            );
            pair_offset += 3;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Line, Span};

    fn span(line: usize) -> Span {
        Span::new(Line(line), 0)
    }

    #[test]
    fn test_literal_deduplication() {
        let mut chunk = Chunk::new();
        let a = chunk.add_literal(Value::int(7)).unwrap();
        let b = chunk.add_literal(Value::int(8)).unwrap();
        let c = chunk.add_literal(Value::int(7)).unwrap();
        assert_eq!(*a, 0);
        assert_eq!(*b, 1);
        assert_eq!(*c, 0);
        assert_eq!(chunk.literals().len(), 2);
        // An int literal never collides with the float of the same value.
        let d = chunk.add_literal(Value::float(7.0)).unwrap();
        assert_eq!(*d, 2);
    }

    #[test]
    fn test_code_patching() {
        let mut chunk = Chunk::new();
        chunk.write(OpCode::Jump, span(1));
        let patch_offset = CodeOffset(chunk.len());
        chunk.write_u16(0xffff, span(1));

        chunk.patch_u16(patch_offset, 0x1234);
        assert_eq!(chunk.code()[1], 0x12);
        assert_eq!(chunk.code()[2], 0x34);
    }

    #[test]
    fn test_span_runs() {
        let mut chunk = Chunk::new();
        chunk.write(OpCode::Null, span(1));
        chunk.write(OpCode::Pop, span(1));
        chunk.write(OpCode::True, span(2));
        chunk.write(OpCode::Pop, span(3));

        assert_eq!(chunk.get_span(CodeOffset(0)), span(1));
        assert_eq!(chunk.get_span(CodeOffset(1)), span(1));
        assert_eq!(chunk.get_span(CodeOffset(2)), span(2));
        assert_eq!(chunk.get_span(CodeOffset(3)), span(3));
    }

    #[test]
    fn test_chunk_equality_ignores_spans() {
        let mut a = Chunk::new();
        let mut b = Chunk::new();
        a.write(OpCode::Null, span(1));
        b.write(OpCode::Null, span(17));
        assert_eq!(a, b);
        b.write(OpCode::Pop, span(17));
        assert_ne!(a, b);
    }
}
