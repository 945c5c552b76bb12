use super::VM;
use crate::heap::ObjKey;
use crate::value::Value;

impl VM {
    /// Read the next byte from the current frame's bytecode.
    pub(super) fn read_byte(&mut self) -> u8 {
        let frame = self.callstack.current_mut();
        let index = frame.ip;
        frame.ip += 1;
        self.callstack.code_byte(index, &self.heap)
    }

    /// Read a big-endian 16 bit number from the current frame's bytecode.
    pub(super) fn read_u16(&mut self) -> usize {
        (usize::from(self.read_byte()) << 8) + usize::from(self.read_byte())
    }

    /// Read a literal pool index and fetch the value behind it.
    pub(super) fn read_literal(&mut self) -> Value {
        let index = self.read_u16();
        *self
            .heap
            .function_code(self.callstack.code())
            .chunk
            .get_literal(index)
    }

    /// Read a literal that the compiler guarantees to be an interned
    /// string, e.g. a member or global name.
    pub(super) fn read_string(&mut self, opcode_name: &str) -> ObjKey {
        let literal = self.read_literal();
        assert!(
            literal.is_object(),
            "Internal error: non-string operand to {opcode_name}"
        );
        literal.as_object()
    }
}
