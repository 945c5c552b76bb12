//! The object heap and its mark-sweep garbage collector.
//!
//! All language objects live in a single slot arena; a [`Value`] references
//! an object through the 32-bit key of its slot, which also fits the 48-bit
//! object payload of the NaN-boxed value word. Freed slots go onto a free
//! list and are reused by later allocations.
//!
//! Collection is non-incremental tracing: the VM marks its roots, `trace`
//! drains the gray worklist blackening objects variant by variant, and
//! `sweep` frees everything left unmarked. The interning table holds weak
//! references; dead strings are dropped from it before their slots are
//! reclaimed.

use rustc_hash::FxHashMap as HashMap;

use crate::config::{GC_FIRST_THRESHOLD, GC_HEAP_GROW_FACTOR};
use crate::object::{LangString, ObjData, Object};
use crate::value::Value;

/// Key of an object's slot in the heap arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ObjKey(pub u32);

/// Builtin constants needed in different parts of the heap or VM.
#[derive(Clone, Copy, Debug)]
pub struct BuiltinConstants {
    /// Interned name of the constructor method.
    pub init_string: ObjKey,
}

pub struct Heap {
    slots: Vec<Option<Object>>,
    free_keys: Vec<u32>,
    /// Interned strings by content. Weak: entries are dropped when the
    /// string object dies, before its slot is reclaimed.
    strings_by_bytes: HashMap<String, ObjKey>,
    builtin_constants: Option<BuiltinConstants>,

    gray: Vec<ObjKey>,

    bytes_allocated: usize,
    next_gc: usize,
    /// Force a collection before every instruction.
    pub stress: bool,

    allocated_total: usize,
    freed_total: usize,
}

impl Heap {
    #[must_use]
    pub fn new(stress: bool) -> Self {
        let mut heap = Self {
            slots: Vec::new(),
            free_keys: Vec::new(),
            strings_by_bytes: HashMap::default(),
            builtin_constants: None,
            gray: Vec::new(),
            bytes_allocated: 0,
            next_gc: GC_FIRST_THRESHOLD,
            stress,
            allocated_total: 0,
            freed_total: 0,
        };
        let init_string = heap.copy_string("init");
        heap.builtin_constants = Some(BuiltinConstants { init_string });
        heap
    }

    pub fn builtin_constants(&self) -> &BuiltinConstants {
        self.builtin_constants.as_ref().unwrap()
    }

    /// Add an object to the arena, reusing a free slot when one exists.
    pub fn allocate(&mut self, data: ObjData) -> ObjKey {
        let object = Object::new(data);
        self.bytes_allocated += object_size(&object);
        self.allocated_total += 1;

        let key = if let Some(index) = self.free_keys.pop() {
            self.slots[index as usize] = Some(object);
            ObjKey(index)
        } else {
            self.slots.push(Some(object));
            ObjKey(u32::try_from(self.slots.len() - 1).expect("Heap arena overflow"))
        };

        #[cfg(feature = "log_gc")]
        {
            eprintln!(
                "{:?} allocate {} for {}",
                key,
                humansize::format_size(object_size(&self[key]), humansize::BINARY),
                self[key].to_string(self)
            );
        }

        key
    }

    /// Intern a string given as a borrowed slice.
    ///
    /// Byte-equal strings always resolve to the same key, so string
    /// equality is key equality.
    pub fn copy_string(&mut self, bytes: &str) -> ObjKey {
        if let Some(key) = self.strings_by_bytes.get(bytes) {
            return *key;
        }
        let key = self.allocate(ObjData::String(LangString::new(bytes.to_string())));
        self.strings_by_bytes.insert(bytes.to_string(), key);
        key
    }

    /// Intern a string whose buffer the caller no longer needs.
    pub fn take_string(&mut self, bytes: String) -> ObjKey {
        if let Some(key) = self.strings_by_bytes.get(&bytes) {
            return *key;
        }
        let key = self.allocate(ObjData::String(LangString::new(bytes.clone())));
        self.strings_by_bytes.insert(bytes, key);
        key
    }

    pub fn string(&self, key: ObjKey) -> &str {
        &self[key].data.as_string().bytes
    }

    pub fn function_code(&self, key: ObjKey) -> &crate::object::FunctionCode {
        self[key].data.as_function_code()
    }

    pub const fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub const fn needs_gc(&self) -> bool {
        self.bytes_allocated > self.next_gc
    }

    pub const fn allocated_objects(&self) -> usize {
        self.allocated_total
    }

    pub const fn freed_objects(&self) -> usize {
        self.freed_total
    }

    /// Number of live objects. Mainly interesting to tests.
    pub fn live_objects(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

// Collection.
impl Heap {
    /// Start a collection by marking the values the heap itself holds on to.
    pub fn gc_start(&mut self) {
        #[cfg(feature = "log_gc")]
        eprintln!("-- gc begin");

        let init_string = self.builtin_constants().init_string;
        self.mark_object(init_string);
    }

    pub fn mark_value(&mut self, value: Value) {
        if value.is_object() {
            self.mark_object(value.as_object());
        }
    }

    pub fn mark_object(&mut self, key: ObjKey) {
        let object = self.slots[key.0 as usize]
            .as_mut()
            .expect("Marked a freed object");
        if object.marked {
            return;
        }
        #[cfg(feature = "log_gc")]
        eprintln!("{key:?} mark");
        object.marked = true;
        self.gray.push(key);
    }

    /// Drain the gray worklist, blackening each object by marking
    /// everything it references.
    pub fn trace(&mut self) {
        #[cfg(feature = "log_gc")]
        eprintln!("-- trace start");
        while let Some(key) = self.gray.pop() {
            self.blacken(key);
        }
    }

    fn blacken(&mut self, key: ObjKey) {
        #[cfg(feature = "log_gc")]
        eprintln!("{key:?} blacken");

        let mut children: Vec<Value> = Vec::new();
        {
            let object = self.slots[key.0 as usize].as_ref().unwrap();
            for (&name, &value) in &object.dict {
                children.push(Value::object(name));
                children.push(value);
            }
            match &object.data {
                ObjData::String(_) => {}
                ObjData::NativeFunction(native) => children.push(Value::object(native.name)),
                ObjData::BuiltinType(builtin) => children.push(Value::object(builtin.name)),
                ObjData::Class(class) => {
                    children.push(Value::object(class.name));
                    if let Some(parent) = class.parent {
                        children.push(Value::object(parent));
                    }
                }
                ObjData::UpValue(upvalue) => match upvalue {
                    crate::object::UpValue::Open(_) => {}
                    crate::object::UpValue::Closed(value) => children.push(*value),
                },
                ObjData::Method(method) => {
                    children.push(method.this_val);
                    children.push(Value::object(method.func));
                }
                ObjData::Instance(instance) => children.push(Value::object(instance.class)),
                ObjData::FunctionCode(code) => {
                    children.push(Value::object(code.name));
                    for literal in code.chunk.literals() {
                        children.push(*literal);
                    }
                }
                ObjData::Function(func) => {
                    children.push(Value::object(func.code));
                    for upvalue in &func.upvalues {
                        children.push(Value::object(*upvalue));
                    }
                }
            }
        }
        for child in children {
            self.mark_value(child);
        }
    }

    /// Free every unmarked object and clear the marks of the survivors.
    pub fn sweep(&mut self) {
        #[cfg(feature = "log_gc")]
        eprintln!("-- sweep start");
        #[cfg(feature = "log_gc")]
        let before = self.bytes_allocated;

        // Interned strings must leave the table before their slots go away.
        let mut strings_by_bytes = std::mem::take(&mut self.strings_by_bytes);
        strings_by_bytes.retain(|_, key| self[*key].marked);
        self.strings_by_bytes = strings_by_bytes;

        let mut bytes_allocated = 0;
        for index in 0..self.slots.len() {
            let keep = match &mut self.slots[index] {
                Some(object) if object.marked => {
                    object.marked = false;
                    bytes_allocated += object_size(object);
                    true
                }
                Some(_) => false,
                None => continue,
            };
            if !keep {
                #[cfg(feature = "log_gc")]
                eprintln!("ObjKey({index}) free {}", {
                    let object = self.slots[index].as_ref().unwrap();
                    object.to_string(self)
                });
                self.slots[index] = None;
                self.free_keys.push(u32::try_from(index).unwrap());
                self.freed_total += 1;
            }
        }
        self.bytes_allocated = bytes_allocated;
        self.next_gc = (self.bytes_allocated * GC_HEAP_GROW_FACTOR).max(GC_FIRST_THRESHOLD);

        #[cfg(feature = "log_gc")]
        {
            eprintln!("-- gc end");
            eprintln!(
                "   collected {} (from {} to {}) next at {}",
                humansize::format_size(before - self.bytes_allocated, humansize::BINARY),
                humansize::format_size(before, humansize::BINARY),
                humansize::format_size(self.bytes_allocated, humansize::BINARY),
                humansize::format_size(self.next_gc, humansize::BINARY),
            );
        }
    }

    /// Tear the heap down, freeing every remaining object. Used on
    /// interpreter shutdown so the allocation statistics balance.
    pub fn free_all(&mut self) {
        self.strings_by_bytes.clear();
        self.builtin_constants = None;
        for index in 0..self.slots.len() {
            if self.slots[index].is_some() {
                self.slots[index] = None;
                self.free_keys.push(u32::try_from(index).unwrap());
                self.freed_total += 1;
            }
        }
        self.bytes_allocated = 0;
    }
}

/// Rough deep size of an object, used by the collection heuristic.
fn object_size(object: &Object) -> usize {
    let extra = match &object.data {
        ObjData::String(s) => s.bytes.capacity(),
        ObjData::FunctionCode(code) => code.chunk.byte_size(),
        ObjData::Function(func) => func.upvalues.capacity() * std::mem::size_of::<ObjKey>(),
        _ => 0,
    };
    std::mem::size_of::<Object>()
        + object.dict.capacity() * (std::mem::size_of::<ObjKey>() + std::mem::size_of::<Value>())
        + extra
}

impl std::ops::Index<ObjKey> for Heap {
    type Output = Object;

    fn index(&self, key: ObjKey) -> &Self::Output {
        self.slots[key.0 as usize]
            .as_ref()
            .expect("Access to freed object")
    }
}

impl std::ops::IndexMut<ObjKey> for Heap {
    fn index_mut(&mut self, key: ObjKey) -> &mut Self::Output {
        self.slots[key.0 as usize]
            .as_mut()
            .expect("Access to freed object")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_returns_same_key() {
        let mut heap = Heap::new(false);
        let a = heap.copy_string("hello");
        let b = heap.copy_string("hello");
        let c = heap.take_string("hello".to_string());
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_ne!(a, heap.copy_string("world"));
        assert_eq!(heap.string(a), "hello");
    }

    #[test]
    fn test_collection_frees_unreachable() {
        let mut heap = Heap::new(false);
        let reachable = heap.copy_string("keep");
        let _garbage = heap.copy_string("drop");
        let live_before = heap.live_objects();

        heap.gc_start();
        heap.mark_object(reachable);
        heap.trace();
        heap.sweep();

        assert_eq!(heap.live_objects(), live_before - 1);
        assert_eq!(heap.string(reachable), "keep");
        // The freed slot is reused by the next allocation.
        let reused = heap.copy_string("drop");
        assert_eq!(heap.live_objects(), live_before);
        assert_ne!(reused, reachable);
    }

    #[test]
    fn test_byte_accounting_shrinks_on_sweep() {
        let mut heap = Heap::new(false);
        let before = heap.bytes_allocated();
        heap.copy_string("some much longer garbage string");
        assert!(heap.bytes_allocated() > before);

        heap.gc_start();
        heap.trace();
        heap.sweep();
        // Only the heap's own constants survive.
        assert!(heap.bytes_allocated() < before + 64);
    }

    #[test]
    fn test_free_all_balances_counters() {
        let mut heap = Heap::new(false);
        heap.copy_string("a");
        heap.copy_string("b");
        heap.free_all();
        assert_eq!(heap.allocated_objects(), heap.freed_objects());
        assert_eq!(heap.live_objects(), 0);
    }

    #[test]
    fn test_dict_entries_keep_objects_alive() {
        let mut heap = Heap::new(false);
        let owner = heap.copy_string("owner");
        let name = heap.copy_string("field");
        let held = heap.copy_string("held");
        heap[owner].dict.insert(name, Value::object(held));

        heap.gc_start();
        heap.mark_object(owner);
        heap.trace();
        heap.sweep();

        assert_eq!(heap.string(held), "held");
        assert_eq!(heap.string(name), "field");
    }
}
