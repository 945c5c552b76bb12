//! The compiler module turns the AST into bytecode for the VM to execute.
//!
//! Compilation is single pass: every node is visited once and emits its
//! code immediately. Function bodies are compiled by a fresh nested state
//! linked to its enclosing one, which is what upvalue resolution walks.

mod back;
mod expr;
mod stmt;
mod variables;

use shrinkwraprs::Shrinkwrap;

use crate::ast::Stmt;
use crate::chunk::Chunk;
use crate::config::SCRIPT_NAME;
use crate::heap::{Heap, ObjKey};
use crate::object::{FunctionCode, ObjData};
use crate::types::Span;

#[derive(Shrinkwrap, Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Default, Debug)]
#[shrinkwrap(mutable)]
struct ScopeDepth(i32);

/// Represents a local variable in the current scope.
///
/// The depth is needed to release locals when their scope ends; it stays
/// at -1 between declaration and initialization so that reading a local
/// inside its own initializer is caught. `captured` decides whether scope
/// exit pops the slot or closes it into an upvalue.
#[derive(Debug)]
struct LocalVar<'ast> {
    name: &'ast str,
    depth: i32,
    captured: bool,
}

/// Tracks one captured variable of the function currently being compiled:
/// either a local slot of the enclosing function or an index into the
/// enclosing function's own upvalues.
#[derive(Clone, Copy, Debug)]
struct UpVar {
    index: u16,
    is_local: bool,
}

/// Characterizes the kinds of functions being compiled.
///
/// The script is the top level of a file. It terminates in `Halt` rather
/// than the implicit `null` return of an ordinary function.
#[derive(Copy, Clone, PartialEq, Eq)]
enum FunctionKind {
    Script,
    Function,
}

/// Nestable part of the compiler state.
///
/// One of these exists per function currently being compiled; the vector
/// of them forms the chain of enclosing compilers.
struct NestableState<'ast> {
    code: FunctionCode,
    kind: FunctionKind,
    locals: Vec<LocalVar<'ast>>,
    upvalues: Vec<UpVar>,
    scope_depth: ScopeDepth,
}

impl NestableState<'_> {
    #[must_use]
    fn new(function_name: ObjKey, kind: FunctionKind) -> Self {
        NestableState {
            code: FunctionCode::new(function_name),
            kind,
            // Slot zero holds the function itself; the empty name can
            // never collide with a source identifier.
            locals: vec![LocalVar {
                name: "",
                depth: 0,
                captured: false,
            }],
            upvalues: Vec::new(),
            scope_depth: ScopeDepth::default(),
        }
    }
}

/// Main compiler struct that turns the AST into bytecode.
pub struct Compiler<'ast, 'heap> {
    /// The VM heap. Already present here to store compiled functions
    /// and intern strings.
    heap: &'heap mut Heap,

    had_error: bool,

    nestable_state: Vec<NestableState<'ast>>,
}

/// Compile a parsed program into the `FunctionCode` of the top level
/// script. Returns `None` if any compile error was reported.
pub fn compile(program: &[Stmt], heap: &mut Heap) -> Option<ObjKey> {
    Compiler::new(heap).compile(program)
}

impl<'ast, 'heap> Compiler<'ast, 'heap> {
    #[must_use]
    fn new(heap: &'heap mut Heap) -> Self {
        let function_name = heap.copy_string(SCRIPT_NAME);
        Compiler {
            heap,
            had_error: false,
            nestable_state: vec![NestableState::new(function_name, FunctionKind::Script)],
        }
    }

    fn compile(mut self, program: &'ast [Stmt]) -> Option<ObjKey> {
        for statement in program {
            self.compile_stmt(statement);
        }
        let end_span = program.last().map_or_else(Span::default, Stmt::span);
        self.emit_end(end_span);

        let state = self.nestable_state.pop().unwrap();
        if self.had_error {
            return None;
        }
        let key = self.heap.allocate(ObjData::FunctionCode(state.code));

        #[cfg(feature = "print_code")]
        {
            use crate::chunk::ChunkDisassembler;
            let code = self.heap.function_code(key);
            print!(
                "{}",
                ChunkDisassembler::new(&code.chunk, self.heap, SCRIPT_NAME).disassemble()
            );
        }

        Some(key)
    }

    // Nesting plumbing. Functions are compiled by pushing a fresh state;
    // upvalue resolution temporarily steps into the enclosing state.
    fn start_nesting(&mut self, function_name: &str, kind: FunctionKind) {
        let function_name = self.heap.copy_string(function_name);
        self.nestable_state
            .push(NestableState::new(function_name, kind));
    }

    fn end_nesting(&mut self) -> NestableState<'ast> {
        self.nestable_state.pop().unwrap()
    }

    fn has_enclosing(&self) -> bool {
        self.nestable_state.len() > 1
    }

    /// Call a function from within the enclosing state.
    ///
    /// Mainly used for recursively resolving upvalues.
    fn in_enclosing<F, R>(&mut self, f: F) -> R
    where
        F: Fn(&mut Self) -> R,
    {
        assert!(self.has_enclosing());
        let state = self.nestable_state.pop().unwrap();
        let result = f(self);
        self.nestable_state.push(state);
        result
    }

    fn state(&self) -> &NestableState<'ast> {
        self.nestable_state.last().unwrap()
    }

    fn state_mut(&mut self) -> &mut NestableState<'ast> {
        self.nestable_state.last_mut().unwrap()
    }

    fn current_chunk(&mut self) -> &mut Chunk {
        &mut self.state_mut().code.chunk
    }

    fn current_chunk_len(&mut self) -> usize {
        self.current_chunk().len()
    }

    fn locals(&self) -> &Vec<LocalVar<'ast>> {
        &self.state().locals
    }

    fn locals_mut(&mut self) -> &mut Vec<LocalVar<'ast>> {
        &mut self.state_mut().locals
    }

    fn scope_depth(&self) -> i32 {
        *self.state().scope_depth
    }

    fn function_kind(&self) -> FunctionKind {
        self.state().kind
    }

    /// Report a compile error at the given span.
    fn error(&mut self, message: &str, span: Span) {
        self.had_error = true;
        eprintln!("[line {}] Error: {message}", *span.line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::OpCode;
    use crate::parser::Parser;
    use crate::scanner::Scanner;

    fn compile_source(source: &str, heap: &mut Heap) -> Option<ObjKey> {
        let program = Parser::new(Scanner::new(source.as_bytes())).parse()?;
        compile(&program, heap)
    }

    fn opcodes(source: &str) -> Vec<OpCode> {
        use num_enum::TryFromPrimitive;
        let mut heap = Heap::new(false);
        let key = compile_source(source, &mut heap).expect("compilation failed");
        let chunk = &heap.function_code(key).chunk;
        let mut result = Vec::new();
        let mut offset = 0;
        while offset < chunk.code().len() {
            let op = OpCode::try_from_primitive(chunk.code()[offset]).unwrap();
            result.push(op);
            offset += match op {
                OpCode::Call => 2,
                OpCode::Invoke => 4,
                OpCode::Constant
                | OpCode::GetGlobal
                | OpCode::SetGlobal
                | OpCode::DefineGlobal
                | OpCode::Class
                | OpCode::AttachMethod
                | OpCode::GetMember
                | OpCode::SetMember
                | OpCode::GetSuper
                | OpCode::Jump
                | OpCode::JumpIfFalse
                | OpCode::Loop
                | OpCode::GetLocal
                | OpCode::SetLocal
                | OpCode::GetUpvalue
                | OpCode::SetUpvalue
                | OpCode::CloseFunction => 3,
                _ => 1,
            };
        }
        result
    }

    #[test]
    fn test_expression_statement_pops() {
        assert_eq!(
            opcodes("1 + 2"),
            vec![
                OpCode::Constant,
                OpCode::Constant,
                OpCode::Add,
                OpCode::Pop,
                OpCode::Halt
            ]
        );
    }

    #[test]
    fn test_dedicated_literal_opcodes() {
        assert_eq!(
            opcodes("null true false"),
            vec![
                OpCode::Null,
                OpCode::Pop,
                OpCode::True,
                OpCode::Pop,
                OpCode::False,
                OpCode::Pop,
                OpCode::Halt
            ]
        );
    }

    #[test]
    fn test_if_shape() {
        assert_eq!(
            opcodes("if (true) 1 else 2"),
            vec![
                OpCode::True,
                OpCode::JumpIfFalse,
                OpCode::Pop,
                OpCode::Constant,
                OpCode::Pop,
                OpCode::Jump,
                OpCode::Pop,
                OpCode::Constant,
                OpCode::Pop,
                OpCode::Halt
            ]
        );
    }

    #[test]
    fn test_and_short_circuit_shape() {
        assert_eq!(
            opcodes("true and false"),
            vec![
                OpCode::True,
                OpCode::JumpIfFalse,
                OpCode::Pop,
                OpCode::False,
                OpCode::Pop,
                OpCode::Halt
            ]
        );
    }

    #[test]
    fn test_or_short_circuit_shape() {
        assert_eq!(
            opcodes("true or false"),
            vec![
                OpCode::True,
                OpCode::JumpIfFalse,
                OpCode::Jump,
                OpCode::Pop,
                OpCode::False,
                OpCode::Pop,
                OpCode::Halt
            ]
        );
    }

    #[test]
    fn test_receiver_call_fuses_to_invoke() {
        assert_eq!(
            opcodes("a.b(1)"),
            vec![
                OpCode::GetGlobal,
                OpCode::Constant,
                OpCode::Invoke,
                OpCode::Pop,
                OpCode::Halt
            ]
        );
    }

    #[test]
    fn test_member_read_is_not_fused() {
        assert_eq!(
            opcodes("a.b"),
            vec![
                OpCode::GetGlobal,
                OpCode::GetMember,
                OpCode::Pop,
                OpCode::Halt
            ]
        );
    }

    #[test]
    fn test_local_scope_pops() {
        assert_eq!(
            opcodes("{ let a = 1 a }"),
            vec![
                OpCode::Constant,
                OpCode::GetLocal,
                OpCode::Pop,
                OpCode::Pop,
                OpCode::Halt
            ]
        );
    }

    #[test]
    fn test_upvalue_capture_shape() {
        let mut heap = Heap::new(false);
        let key = compile_source("{ let x = 1 def f() { return x } }", &mut heap).unwrap();
        // The nested function literal sits in the script chunk's pool.
        let script = heap.function_code(key);
        let nested = script
            .chunk
            .literals()
            .iter()
            .find_map(|value| {
                if value.is_object() {
                    match &heap[value.as_object()].data {
                        ObjData::FunctionCode(code) if heap.string(code.name) == "f" => {
                            Some(code)
                        }
                        _ => None,
                    }
                } else {
                    None
                }
            })
            .expect("nested function literal not found");
        assert_eq!(nested.upvalue_count, 1);
        assert_eq!(nested.arity, 0);
    }

    #[test]
    fn test_disassembler_output_shape() {
        use crate::chunk::ChunkDisassembler;
        let mut heap = Heap::new(false);
        let key = compile_source("let a = 1 def f(x) => x print(a)", &mut heap).unwrap();
        let code = heap.function_code(key);
        let dump = ChunkDisassembler::new(&code.chunk, &heap, "<script>").disassemble();

        assert!(dump.starts_with("=== Chunk from <script>, size: "));
        assert!(dump.contains("Constant"));
        assert!(dump.contains("DefineGlobal"));
        assert!(dump.contains("CloseFunction"));
        // The nested function's chunk is rendered after the script chunk.
        assert!(dump.contains("=== Chunk from f at "));
        assert!(dump.contains("Return"));
    }

    #[test]
    fn test_use_before_init_is_an_error() {
        let mut heap = Heap::new(false);
        assert!(compile_source("{ let a = a }", &mut heap).is_none());
    }

    #[test]
    fn test_self_inheritance_is_an_error() {
        let mut heap = Heap::new(false);
        assert!(compile_source("class A : A {}", &mut heap).is_none());
    }

    #[test]
    fn test_invalid_assignment_target() {
        let mut heap = Heap::new(false);
        assert!(compile_source("1 = 2", &mut heap).is_none());
        assert!(compile_source("f() = 2", &mut heap).is_none());
    }

    #[test]
    fn test_unsupported_operator_is_rejected() {
        let mut heap = Heap::new(false);
        assert!(compile_source("1 != 2", &mut heap).is_none());
        assert!(compile_source("!true", &mut heap).is_none());
    }
}
