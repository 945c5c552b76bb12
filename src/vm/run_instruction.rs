/// Main switch for the `OpCode` execution.
///
/// This is a macro for performance reasons: routing every instruction
/// through a function that wraps its result costs measurably on tight
/// interpreter loops.
macro_rules! run_instruction {
    ($self:ident) => {
        $self.collect_garbage();

        #[cfg(feature = "trace_execution")]
        {
            println!(
                "          [ {} ]",
                $self
                    .stack
                    .iter()
                    .map(|v| v.to_string(&$self.heap))
                    .collect::<Vec<_>>()
                    .join(" ][ ")
            );
            let code = $self.heap.function_code($self.callstack.code());
            let ip = $self.callstack.current().ip;
            println!(
                "{:04} {:?}",
                ip,
                OpCode::try_from(code.chunk.code()[ip]).unwrap()
            );
        }

        match OpCode::try_from($self.read_byte()).expect("Internal error: unrecognized opcode") {
            OpCode::Null => $self.stack_push(Value::NULL),
            OpCode::True => $self.stack_push(Value::TRUE),
            OpCode::False => $self.stack_push(Value::FALSE),
            // Index of the literal is the operand, the value lives in the
            // pool of the current chunk.
            OpCode::Constant => {
                let value = $self.read_literal();
                $self.stack_push(value);
            }
            OpCode::Pop => {
                $self.stack.pop().expect("Stack underflow in OP_POP.");
            }
            // All of these work on the top two stack values; the top is
            // the right operand.
            op @ (OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::LessThan
            | OpCode::GreaterThan) => {
                if $self.binary_arithmetic(op).is_err() {
                    return InterpretResult::RuntimeError;
                }
            }
            OpCode::Equal => $self.equal(),
            OpCode::Jump => {
                let offset = $self.read_u16();
                $self.callstack.current_mut().ip += offset;
            }
            // Peeks the condition; the compiler pairs every branch with
            // an explicit Pop.
            OpCode::JumpIfFalse => {
                let offset = $self.read_u16();
                if $self
                    .peek(0)
                    .expect("Stack underflow in OP_JUMP_IF_FALSE")
                    .is_falsey()
                {
                    $self.callstack.current_mut().ip += offset;
                }
            }
            // Offset to jump backwards is the operand.
            OpCode::Loop => {
                let offset = $self.read_u16();
                $self.callstack.current_mut().ip -= offset;
            }
            // Slot relative to the current frame is the operand.
            OpCode::GetLocal => {
                let slot = $self.read_u16();
                $self.stack_push(*$self.stack_get(slot));
            }
            OpCode::SetLocal => {
                let slot = $self.read_u16();
                *$self.stack_get_mut(slot) =
                    *$self.peek(0).expect("Stack underflow in OP_SET_LOCAL");
            }
            OpCode::GetGlobal => {
                if $self.get_global().is_err() {
                    return InterpretResult::RuntimeError;
                }
            }
            OpCode::SetGlobal => {
                if $self.set_global().is_err() {
                    return InterpretResult::RuntimeError;
                }
            }
            OpCode::DefineGlobal => $self.define_global(),
            OpCode::GetUpvalue => $self.get_upvalue(),
            OpCode::SetUpvalue => $self.set_upvalue(),
            // Close the upvalue pointing at the top of the stack.
            OpCode::CloseUpvalue => {
                $self.close_upvalues($self.stack.len() - 1);
                $self.stack.pop();
            }
            OpCode::CloseFunction => $self.close_function(),
            // Argument count is the operand; the callee is on the stack
            // below the arguments.
            OpCode::Call => {
                if $self.call().is_err() {
                    return InterpretResult::RuntimeError;
                }
            }
            // Fused member lookup and call; the receiver stays below the
            // arguments for method dispatch.
            OpCode::Invoke => {
                if $self.invoke().is_err() {
                    return InterpretResult::RuntimeError;
                }
            }
            OpCode::Return => match $self.return_() {
                Err(_) => return InterpretResult::RuntimeError,
                Ok(Some(result)) => return result,
                Ok(None) => {}
            },
            OpCode::Class => $self.class_declaration(),
            OpCode::Inherit => {
                if $self.inherit().is_err() {
                    return InterpretResult::RuntimeError;
                }
            }
            OpCode::AttachMethod => $self.attach_method(),
            OpCode::GetMember => {
                if $self.get_member().is_err() {
                    return InterpretResult::RuntimeError;
                }
            }
            OpCode::SetMember => {
                if $self.set_member().is_err() {
                    return InterpretResult::RuntimeError;
                }
            }
            OpCode::GetSuper => {
                if $self.get_super().is_err() {
                    return InterpretResult::RuntimeError;
                }
            }
            OpCode::Halt => return InterpretResult::Ok(0),
        }
    };
}
