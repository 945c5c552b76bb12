//! Heap object variants.
//!
//! Every heap allocated value shares the same header: the mark bit used by
//! the collector and a property dict keyed by interned strings. Arbitrary
//! attributes can therefore be attached to any object; classes keep their
//! methods there and instances their fields.

use rustc_hash::FxHashMap as HashMap;

use crate::chunk::Chunk;
use crate::heap::{Heap, ObjKey};
use crate::value::Value;
use crate::vm::VM;

/// Property dict shared by every heap object, keyed by interned strings.
pub type PropertyMap = HashMap<ObjKey, Value>;

/// Shared header plus variant payload of a heap object.
#[derive(Debug, Clone)]
pub struct Object {
    pub marked: bool,
    pub dict: PropertyMap,
    pub data: ObjData,
}

impl Object {
    #[must_use]
    pub fn new(data: ObjData) -> Self {
        Self {
            marked: false,
            dict: PropertyMap::default(),
            data,
        }
    }

    /// Immutable objects reject `SetMember`.
    #[must_use]
    pub const fn immutable(&self) -> bool {
        matches!(
            self.data,
            ObjData::String(_) | ObjData::FunctionCode(_) | ObjData::NativeFunction(_)
        )
    }

    pub fn to_string(&self, heap: &Heap) -> String {
        match &self.data {
            ObjData::String(s) => s.bytes.clone(),
            ObjData::FunctionCode(code) => format!("<fn {}>", heap.string(code.name)),
            ObjData::Function(func) => {
                format!("<fn {}>", heap.string(heap.function_code(func.code).name))
            }
            ObjData::UpValue(_) => "upvalue".to_string(),
            ObjData::Class(class) => format!("<class {}>", heap.string(class.name)),
            ObjData::Instance(instance) => {
                let class = heap[instance.class].data.as_class();
                format!("<{} instance>", heap.string(class.name))
            }
            ObjData::Method(method) => {
                let code = heap.function_code(heap[method.func].data.as_function().code);
                format!(
                    "<bound method {} of {}>",
                    heap.string(code.name),
                    method.this_val.to_string(heap)
                )
            }
            ObjData::NativeFunction(native) => {
                format!("<native fn {}>", heap.string(native.name))
            }
            ObjData::BuiltinType(builtin) => format!("<builtin {}>", heap.string(builtin.name)),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ObjData {
    String(LangString),
    FunctionCode(FunctionCode),
    Function(Function),
    UpValue(UpValue),
    Class(Class),
    Instance(Instance),
    Method(Method),
    NativeFunction(NativeFunction),
    BuiltinType(BuiltinType),
}

/// An immutable, interned string with its precomputed hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LangString {
    pub bytes: String,
    pub hash: u64,
}

impl LangString {
    #[must_use]
    pub fn new(bytes: String) -> Self {
        use std::hash::{Hash, Hasher};
        let mut hasher = rustc_hash::FxHasher::default();
        bytes.hash(&mut hasher);
        Self {
            bytes,
            hash: hasher.finish(),
        }
    }
}

/// The immutable compiled body behind a closure: bytecode chunk, name,
/// arity and the number of upvalues its closures capture.
#[derive(Debug, Clone)]
pub struct FunctionCode {
    pub name: ObjKey,
    pub chunk: Chunk,
    pub arity: u8,
    pub upvalue_count: usize,
}

impl FunctionCode {
    #[must_use]
    pub fn new(name: ObjKey) -> Self {
        Self {
            name,
            chunk: Chunk::new(),
            arity: 0,
            upvalue_count: 0,
        }
    }
}

/// A closure: a function code plus the upvalues it captured.
/// Non-capturing functions simply have an empty upvalue vector.
#[derive(Debug, Clone)]
pub struct Function {
    pub code: ObjKey,
    pub upvalues: Vec<ObjKey>,
}

/// A captured local. Open upvalues point at a live stack slot; closing
/// relocates the value into the object itself.
#[derive(Debug, Clone)]
pub enum UpValue {
    Open(usize),
    Closed(Value),
}

impl UpValue {
    pub fn as_open(&self) -> usize {
        match self {
            Self::Open(slot) => *slot,
            Self::Closed(_) => unreachable!("Only call as_open on a known open upvalue!"),
        }
    }
}

/// Methods live in the shared dict, keyed by their interned name.
#[derive(Debug, Clone)]
pub struct Class {
    pub name: ObjKey,
    pub parent: Option<ObjKey>,
}

#[derive(Debug, Clone)]
pub struct Instance {
    pub class: ObjKey,
}

/// A bound method: the receiver (any value) plus the function to run.
#[derive(Debug, Clone)]
pub struct Method {
    pub this_val: Value,
    pub func: ObjKey,
}

pub type NativeFunctionImpl = fn(&mut VM, &[Value]) -> Result<Value, String>;

/// A function implemented in Rust. `arity` of `None` accepts any number
/// of arguments.
#[derive(Debug, Clone)]
pub struct NativeFunction {
    pub name: ObjKey,
    pub arity: Option<u8>,
    pub fun: NativeFunctionImpl,
}

/// Method table attached to a primitive value kind. The table itself is
/// the shared dict; the payload is just the kind's name.
#[derive(Debug, Clone)]
pub struct BuiltinType {
    pub name: ObjKey,
}

// Payload accessors. Callers have already established the variant; a
// mismatch is an internal error.
impl ObjData {
    pub fn as_string(&self) -> &LangString {
        match self {
            Self::String(s) => s,
            x => unreachable!("Expected String, found `{x:?}`"),
        }
    }

    pub fn as_function_code(&self) -> &FunctionCode {
        match self {
            Self::FunctionCode(code) => code,
            x => unreachable!("Expected FunctionCode, found `{x:?}`"),
        }
    }

    pub fn as_function(&self) -> &Function {
        match self {
            Self::Function(func) => func,
            x => unreachable!("Expected Function, found `{x:?}`"),
        }
    }

    pub fn as_upvalue(&self) -> &UpValue {
        match self {
            Self::UpValue(upvalue) => upvalue,
            x => unreachable!("Expected UpValue, found `{x:?}`"),
        }
    }

    pub fn as_upvalue_mut(&mut self) -> &mut UpValue {
        match self {
            Self::UpValue(upvalue) => upvalue,
            x => unreachable!("Expected UpValue, found `{x:?}`"),
        }
    }

    pub fn as_class(&self) -> &Class {
        match self {
            Self::Class(class) => class,
            x => unreachable!("Expected Class, found `{x:?}`"),
        }
    }

    pub fn as_class_mut(&mut self) -> &mut Class {
        match self {
            Self::Class(class) => class,
            x => unreachable!("Expected Class, found `{x:?}`"),
        }
    }
}
