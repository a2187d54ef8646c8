//! The closed set of kinds that can cross the boundary

use std::fmt;

use crate::error::ProtocolError;

/// Kind discriminator carried next to every payload on the wire.
///
/// Value kinds are self-describing. Reference kinds carry a registry id as
/// their payload. `Exception` is a sentinel that replaces any return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum TypeTag {
    /// Failure sentinel; payload is a message string id or 0
    Exception = -1,
    /// `undefined`
    Undefined = 0,
    /// `null`
    Null = 1,
    /// Boolean, payload 0 or 1
    Bool = 2,
    /// IEEE-754 double
    Number = 3,
    /// Arbitrary precision integer
    BigInt = 4,
    /// String primitive
    String = 5,
    /// Symbol primitive
    Symbol = 6,
    /// Plain object
    Object = 7,
    /// Script function
    Function = 8,
    /// Host function exposed to the script
    Callback = 9,
    /// Thenable object
    Promise = 10,
    /// Array object
    Array = 11,
    /// Typed array owned by the script
    TypedArray = 12,
    /// Typed array view over a pinned host buffer
    SharedTypedArray = 13,
}

impl TypeTag {
    /// Every tag, in code order.
    pub const ALL: [TypeTag; 15] = [
        TypeTag::Exception,
        TypeTag::Undefined,
        TypeTag::Null,
        TypeTag::Bool,
        TypeTag::Number,
        TypeTag::BigInt,
        TypeTag::String,
        TypeTag::Symbol,
        TypeTag::Object,
        TypeTag::Function,
        TypeTag::Callback,
        TypeTag::Promise,
        TypeTag::Array,
        TypeTag::TypedArray,
        TypeTag::SharedTypedArray,
    ];

    /// Wire code of this tag
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Decode a wire code
    pub fn from_code(code: i32) -> Result<Self, ProtocolError> {
        Self::ALL
            .iter()
            .copied()
            .find(|tag| tag.code() == code)
            .ok_or(ProtocolError::UnknownTag(code))
    }

    /// Transmitted by value, no registry entry
    pub fn is_value_kind(self) -> bool {
        matches!(
            self,
            TypeTag::Undefined | TypeTag::Null | TypeTag::Bool | TypeTag::Number
        )
    }

    /// Transmitted as a registry id
    pub fn is_reference_kind(self) -> bool {
        !self.is_value_kind() && self != TypeTag::Exception
    }

    /// Only the host can originate these; never rebuilt from a bare id.
    pub fn is_special(self) -> bool {
        matches!(self, TypeTag::Callback | TypeTag::SharedTypedArray)
    }

    /// Primitive reference kinds, deduplicated by value on the script side
    pub fn is_primitive_reference(self) -> bool {
        matches!(self, TypeTag::BigInt | TypeTag::String | TypeTag::Symbol)
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Exception => "Exception",
            TypeTag::Undefined => "Undefined",
            TypeTag::Null => "Null",
            TypeTag::Bool => "Bool",
            TypeTag::Number => "Number",
            TypeTag::BigInt => "BigInt",
            TypeTag::String => "String",
            TypeTag::Symbol => "Symbol",
            TypeTag::Object => "Object",
            TypeTag::Function => "Function",
            TypeTag::Callback => "Callback",
            TypeTag::Promise => "Promise",
            TypeTag::Array => "Array",
            TypeTag::TypedArray => "TypedArray",
            TypeTag::SharedTypedArray => "SharedTypedArray",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<i32> for TypeTag {
    type Error = ProtocolError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        TypeTag::from_code(code)
    }
}

/// Element type of a typed array, using the codes shared by both runtimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum TypedArrayKind {
    /// `Int8Array`
    Int8 = 5,
    /// `Uint8Array`
    Uint8 = 6,
    /// `Int16Array`
    Int16 = 7,
    /// `Uint16Array`
    Uint16 = 8,
    /// `Int32Array`
    Int32 = 9,
    /// `Uint32Array`
    Uint32 = 10,
    /// `Float32Array`
    Float32 = 13,
    /// `Float64Array`
    Float64 = 14,
    /// `Uint8ClampedArray`
    Uint8Clamped = 15,
}

impl TypedArrayKind {
    const ALL: [TypedArrayKind; 9] = [
        TypedArrayKind::Int8,
        TypedArrayKind::Uint8,
        TypedArrayKind::Int16,
        TypedArrayKind::Uint16,
        TypedArrayKind::Int32,
        TypedArrayKind::Uint32,
        TypedArrayKind::Float32,
        TypedArrayKind::Float64,
        TypedArrayKind::Uint8Clamped,
    ];

    /// Wire code of this element type
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Decode a wire code
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.code() == code)
    }

    /// Constructor name on the script side
    pub fn constructor_name(self) -> &'static str {
        match self {
            TypedArrayKind::Int8 => "Int8Array",
            TypedArrayKind::Uint8 => "Uint8Array",
            TypedArrayKind::Int16 => "Int16Array",
            TypedArrayKind::Uint16 => "Uint16Array",
            TypedArrayKind::Int32 => "Int32Array",
            TypedArrayKind::Uint32 => "Uint32Array",
            TypedArrayKind::Float32 => "Float32Array",
            TypedArrayKind::Float64 => "Float64Array",
            TypedArrayKind::Uint8Clamped => "Uint8ClampedArray",
        }
    }

    /// Convert a number to what an element of this type stores.
    pub fn coerce(self, value: f64) -> f64 {
        fn wrap(value: f64, modulus: f64) -> f64 {
            if !value.is_finite() {
                return 0.0;
            }
            value.trunc().rem_euclid(modulus)
        }

        match self {
            TypedArrayKind::Float64 => value,
            TypedArrayKind::Float32 => f64::from(value as f32),
            TypedArrayKind::Uint8 => wrap(value, 256.0),
            TypedArrayKind::Uint16 => wrap(value, 65_536.0),
            TypedArrayKind::Uint32 => wrap(value, 4_294_967_296.0),
            TypedArrayKind::Int8 => {
                let v = wrap(value, 256.0);
                if v >= 128.0 {
                    v - 256.0
                } else {
                    v
                }
            }
            TypedArrayKind::Int16 => {
                let v = wrap(value, 65_536.0);
                if v >= 32_768.0 {
                    v - 65_536.0
                } else {
                    v
                }
            }
            TypedArrayKind::Int32 => {
                let v = wrap(value, 4_294_967_296.0);
                if v >= 2_147_483_648.0 {
                    v - 4_294_967_296.0
                } else {
                    v
                }
            }
            TypedArrayKind::Uint8Clamped => {
                if value.is_nan() {
                    0.0
                } else {
                    // round half to even, like the script engine does
                    let clamped = value.clamp(0.0, 255.0);
                    let rounded = clamped.round();
                    if (clamped - clamped.trunc() - 0.5).abs() < f64::EPSILON
                        && rounded % 2.0 != 0.0
                    {
                        rounded - 1.0
                    } else {
                        rounded
                    }
                }
            }
        }
    }
}

impl fmt::Display for TypedArrayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.constructor_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_partition() {
        for tag in TypeTag::ALL {
            if tag == TypeTag::Exception {
                assert!(!tag.is_value_kind() && !tag.is_reference_kind());
            } else {
                assert_ne!(tag.is_value_kind(), tag.is_reference_kind(), "{tag}");
            }
        }
        assert!(TypeTag::Callback.is_special());
        assert!(TypeTag::SharedTypedArray.is_special());
        assert!(!TypeTag::TypedArray.is_special());
    }

    #[test]
    fn test_tag_codes_round_trip() {
        for tag in TypeTag::ALL {
            assert_eq!(TypeTag::from_code(tag.code()), Ok(tag));
        }
        assert_eq!(TypeTag::from_code(14), Err(ProtocolError::UnknownTag(14)));
        assert_eq!(TypeTag::from_code(-2), Err(ProtocolError::UnknownTag(-2)));
    }

    #[test]
    fn test_typed_array_coercion() {
        assert_eq!(TypedArrayKind::Uint8.coerce(257.0), 1.0);
        assert_eq!(TypedArrayKind::Int8.coerce(255.0), -1.0);
        assert_eq!(TypedArrayKind::Int32.coerce(2_147_483_648.0), -2_147_483_648.0);
        assert_eq!(TypedArrayKind::Uint8Clamped.coerce(300.0), 255.0);
        assert_eq!(TypedArrayKind::Uint8Clamped.coerce(2.5), 2.0);
        assert_eq!(TypedArrayKind::Uint8Clamped.coerce(3.5), 4.0);
        assert_eq!(TypedArrayKind::Uint16.coerce(f64::NAN), 0.0);
        assert_eq!(TypedArrayKind::from_code(14), Some(TypedArrayKind::Float64));
        assert_eq!(TypedArrayKind::from_code(11), None);
    }
}
