//! NaN-boxed runtime values.
//!
//! Every tide value fits in a single 64-bit word. Any bit pattern that is a
//! valid (non-tagged) IEEE-754 double is a float; the remaining quiet-NaN
//! space is carved up between 32-bit ints, the two booleans, `null` and
//! heap object references. Object references carry the key of the object's
//! slot in the [`Heap`] arena in their low 48 bits.

use crate::heap::{Heap, ObjKey};

/// Bits that are set in every non-float value.
const NANISH: u64 = 0x7ffc_0000_0000_0000;

const TAG_INT: u64 = 0x7ffc_0000_0000_0000;
const TAG_BOOL: u64 = 0x7ffe_0000_0000_0002;
const TAG_OBJECT: u64 = 0xfffc_0000_0000_0000;

const NULL_BITS: u64 = 0x7ffe_0000_0000_0000;
const FALSE_BITS: u64 = TAG_BOOL | 2;
const TRUE_BITS: u64 = TAG_BOOL | 3;

const PAYLOAD_48: u64 = 0x0000_ffff_ffff_ffff;
const HIGH_32: u64 = 0xffff_ffff_0000_0000;

/// A single tide runtime value.
///
/// Equality is raw bit equality: floats compare by pattern (so `NaN == NaN`
/// and an int is never equal to a float), objects compare by arena key.
/// Interned strings make byte-equal strings key-equal, so string equality
/// falls out of the bit comparison as well.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value(u64);

impl Value {
    pub const NULL: Self = Self(NULL_BITS);
    pub const TRUE: Self = Self(TRUE_BITS);
    pub const FALSE: Self = Self(FALSE_BITS);

    #[must_use]
    pub fn float(f: f64) -> Self {
        Self(f.to_bits())
    }

    #[must_use]
    pub const fn int(i: i32) -> Self {
        Self(TAG_INT | (i as u32 as u64))
    }

    #[must_use]
    pub const fn bool(b: bool) -> Self {
        if b {
            Self::TRUE
        } else {
            Self::FALSE
        }
    }

    #[must_use]
    pub const fn object(key: ObjKey) -> Self {
        Self(TAG_OBJECT | (key.0 as u64 & PAYLOAD_48))
    }

    #[must_use]
    pub const fn is_float(self) -> bool {
        self.0 & NANISH != NANISH
    }

    #[must_use]
    pub const fn is_int(self) -> bool {
        self.0 & HIGH_32 == TAG_INT
    }

    #[must_use]
    pub const fn is_bool(self) -> bool {
        self.0 | 1 == TRUE_BITS
    }

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == NULL_BITS
    }

    #[must_use]
    pub const fn is_object(self) -> bool {
        self.0 & TAG_OBJECT == TAG_OBJECT
    }

    #[must_use]
    pub fn as_float(self) -> f64 {
        debug_assert!(self.is_float());
        f64::from_bits(self.0)
    }

    #[must_use]
    pub const fn as_int(self) -> i32 {
        debug_assert!(self.is_int());
        self.0 as u32 as i32
    }

    #[must_use]
    pub const fn as_bool(self) -> bool {
        debug_assert!(self.is_bool());
        self.0 == TRUE_BITS
    }

    #[must_use]
    pub const fn as_object(self) -> ObjKey {
        debug_assert!(self.is_object());
        ObjKey((self.0 & PAYLOAD_48) as u32)
    }

    /// Only `null` and `false` are falsey; every other value, including
    /// `0`, `0.0` and the empty string, is truthy.
    #[must_use]
    pub const fn is_falsey(self) -> bool {
        self.0 == NULL_BITS || self.0 == FALSE_BITS
    }

    pub fn to_string(self, heap: &Heap) -> String {
        if self.is_float() {
            format_float(self.as_float())
        } else if self.is_int() {
            format!("{}", self.as_int())
        } else if self.is_bool() {
            format!("{}", self.as_bool())
        } else if self.is_null() {
            "null".to_string()
        } else {
            heap[self.as_object()].to_string(heap)
        }
    }

}

/// Integral finite floats keep one decimal so that `3.0` stays visibly
/// distinct from the int `3`.
pub fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_float() {
            write!(f, "float({})", self.as_float())
        } else if self.is_int() {
            write!(f, "int({})", self.as_int())
        } else if self.is_bool() {
            write!(f, "bool({})", self.as_bool())
        } else if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "object({})", self.as_object().0)
        }
    }
}

// Conversions
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::float(f)
    }
}

impl From<ObjKey> for Value {
    fn from(key: ObjKey) -> Self {
        Self::object(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_roundtrip() {
        for f in [0.0, -0.0, 1.5, -123.25, f64::INFINITY, f64::MIN] {
            let v = Value::float(f);
            assert!(v.is_float());
            assert!(!v.is_int() && !v.is_bool() && !v.is_null() && !v.is_object());
            assert_eq!(v.as_float().to_bits(), f.to_bits());
        }
    }

    #[test]
    fn test_int_roundtrip() {
        for i in [0, 1, -1, i32::MAX, i32::MIN] {
            let v = Value::int(i);
            assert!(v.is_int());
            assert!(!v.is_float() && !v.is_bool() && !v.is_null() && !v.is_object());
            assert_eq!(v.as_int(), i);
        }
    }

    #[test]
    fn test_singletons() {
        assert!(Value::NULL.is_null());
        assert!(Value::TRUE.is_bool() && Value::TRUE.as_bool());
        assert!(Value::FALSE.is_bool() && !Value::FALSE.as_bool());
        assert_ne!(Value::TRUE, Value::FALSE);
        assert_ne!(Value::NULL, Value::FALSE);
    }

    #[test]
    fn test_object_roundtrip() {
        let v = Value::object(ObjKey(0x00ab_cdef));
        assert!(v.is_object());
        assert!(!v.is_float() && !v.is_int() && !v.is_bool() && !v.is_null());
        assert_eq!(v.as_object(), ObjKey(0x00ab_cdef));
    }

    #[test]
    fn test_falsiness() {
        assert!(Value::NULL.is_falsey());
        assert!(Value::FALSE.is_falsey());
        assert!(!Value::TRUE.is_falsey());
        assert!(!Value::int(0).is_falsey());
        assert!(!Value::float(0.0).is_falsey());
    }

    #[test]
    fn test_equality_is_raw_bits() {
        assert_eq!(Value::int(1), Value::int(1));
        // An int is never bit-equal to a float.
        assert_ne!(Value::int(1), Value::float(1.0));
        assert_eq!(Value::float(f64::NAN), Value::float(f64::NAN));
        assert_eq!(Value::object(ObjKey(3)), Value::object(ObjKey(3)));
        assert_ne!(Value::object(ObjKey(3)), Value::object(ObjKey(4)));
    }
}
