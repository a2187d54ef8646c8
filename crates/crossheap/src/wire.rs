//! The tagged value wire format
//!
//! A [`WireValue`] is the only thing that ever crosses the boundary: a
//! double payload paired with an `i32` tag code. Both halves are plain
//! numbers so either runtime can pass them without serialization.

use std::fmt;

use crate::error::ProtocolError;
use crate::tag::TypeTag;

/// Largest integer a double represents exactly (2^53 - 1).
pub const MAX_REF_ID: u64 = (1 << 53) - 1;

/// One tagged value as it travels across the boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WireValue {
    /// Literal value for value kinds, reference id for reference kinds
    pub payload: f64,
    /// Raw tag code; decoded with [`TypeTag::from_code`]
    pub tag: i32,
}

impl WireValue {
    /// `undefined`
    pub const UNDEFINED: WireValue = WireValue {
        payload: 0.0,
        tag: TypeTag::Undefined as i32,
    };

    /// `null`
    pub const NULL: WireValue = WireValue {
        payload: 0.0,
        tag: TypeTag::Null as i32,
    };

    /// Pair a payload with a tag
    pub fn new(payload: f64, tag: TypeTag) -> Self {
        WireValue {
            payload,
            tag: tag.code(),
        }
    }

    /// Encode a boolean
    pub fn boolean(value: bool) -> Self {
        WireValue::new(if value { 1.0 } else { 0.0 }, TypeTag::Bool)
    }

    /// Encode a number
    pub fn number(value: f64) -> Self {
        WireValue::new(value, TypeTag::Number)
    }

    /// Encode a reference id of the given kind
    pub fn reference(id: RefId, tag: TypeTag) -> Self {
        WireValue::new(id.to_payload(), tag)
    }

    /// Encode a failure. `message` is a transient string id, `None` for an
    /// error without a message.
    pub fn exception(message: Option<RefId>) -> Self {
        WireValue::new(message.map_or(0.0, RefId::to_payload), TypeTag::Exception)
    }

    /// Decode the tag
    pub fn type_tag(&self) -> Result<TypeTag, ProtocolError> {
        TypeTag::from_code(self.tag)
    }

    /// Whether this carries the Exception sentinel
    pub fn is_exception(&self) -> bool {
        self.tag == TypeTag::Exception.code()
    }

    /// Whether this is `undefined`
    pub fn is_undefined(&self) -> bool {
        self.tag == TypeTag::Undefined.code()
    }

    /// Interpret the payload as a reference id
    pub fn ref_id(&self) -> Result<RefId, ProtocolError> {
        RefId::from_payload(self.payload)
    }
}

impl Default for WireValue {
    fn default() -> Self {
        WireValue::UNDEFINED
    }
}

/// A string-read result: the text plus the tag of what was read.
///
/// `GetString` is the one operation whose return payload is text rather
/// than a double; an Exception tag means the text is meaningless.
#[derive(Debug, Clone, PartialEq)]
pub struct WireText {
    /// The rendered text
    pub text: String,
    /// Raw tag code of the result
    pub tag: i32,
}

impl WireText {
    /// Successful read
    pub fn ok(text: impl Into<String>) -> Self {
        WireText {
            text: text.into(),
            tag: TypeTag::String.code(),
        }
    }

    /// Failed read
    pub fn exception() -> Self {
        WireText {
            text: String::new(),
            tag: TypeTag::Exception.code(),
        }
    }
}

/// A registry id shared by both sides. Never 0, always exactly
/// representable as a double.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefId(u64);

impl RefId {
    /// Wrap a raw id
    pub fn new(raw: u64) -> Result<Self, ProtocolError> {
        if raw == 0 || raw > MAX_REF_ID {
            return Err(ProtocolError::MalformedReference(raw as f64));
        }
        Ok(RefId(raw))
    }

    /// Parse a wire payload
    pub fn from_payload(payload: f64) -> Result<Self, ProtocolError> {
        let in_range = (1.0..=MAX_REF_ID as f64).contains(&payload);
        if !in_range || payload.fract() != 0.0 {
            return Err(ProtocolError::MalformedReference(payload));
        }
        Ok(RefId(payload as u64))
    }

    /// Raw integer value
    pub fn get(self) -> u64 {
        self.0
    }

    /// Encode as a wire payload
    pub fn to_payload(self) -> f64 {
        self.0 as f64
    }
}

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out ids starting at 1; 0 stays reserved.
#[derive(Debug, Clone)]
pub struct RefIdAllocator {
    next: u64,
}

impl Default for RefIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl RefIdAllocator {
    /// Start a fresh id sequence
    pub fn new() -> Self {
        RefIdAllocator { next: 1 }
    }

    /// Take the next id. Ids are never reused.
    pub fn allocate(&mut self) -> Result<RefId, ProtocolError> {
        let id = RefId::new(self.next).map_err(|_| ProtocolError::IdSpaceExhausted)?;
        self.next += 1;
        Ok(id)
    }
}

/// Up to three positional arguments for the fixed-arity fast path.
///
/// Missing arguments travel as `undefined`; the receiver recovers the
/// intended arity with [`FixedArgs::arity`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FixedArgs(pub [WireValue; 3]);

impl FixedArgs {
    /// Largest argument count the fast path carries.
    pub const MAX: usize = 3;

    /// Pack arguments, padding with `undefined`. Returns `None` when there
    /// are more than [`FixedArgs::MAX`].
    pub fn pack(args: &[WireValue]) -> Option<Self> {
        if args.len() > Self::MAX {
            return None;
        }
        let mut packed = [WireValue::UNDEFINED; 3];
        packed[..args.len()].copy_from_slice(args);
        Some(FixedArgs(packed))
    }

    /// Count of arguments to forward: trailing `undefined` values are dropped.
    pub fn arity(&self) -> usize {
        arity_without_trailing(&self.0, WireValue::is_undefined)
    }
}

/// Number of leading items to keep once trailing items matching
/// `is_missing` are cut off.
pub fn arity_without_trailing<T>(items: &[T], is_missing: impl Fn(&T) -> bool) -> usize {
    items
        .iter()
        .rposition(|item| !is_missing(item))
        .map_or(0, |last| last + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_id_rejects_reserved_and_fractional() {
        assert_eq!(
            RefId::from_payload(0.0),
            Err(ProtocolError::MalformedReference(0.0))
        );
        assert!(RefId::from_payload(1.5).is_err());
        assert!(RefId::from_payload(-3.0).is_err());
        assert!(RefId::from_payload(f64::NAN).is_err());
        assert!(RefId::from_payload(9_007_199_254_740_992.0).is_err());
        assert_eq!(RefId::from_payload(42.0).map(RefId::get), Ok(42));
    }

    #[test]
    fn test_allocator_starts_at_one() {
        let mut ids = RefIdAllocator::new();
        assert_eq!(ids.allocate().map(RefId::get), Ok(1));
        assert_eq!(ids.allocate().map(RefId::get), Ok(2));
    }

    #[test]
    fn test_fixed_args_arity() {
        let a = WireValue::number(1.0);
        let u = WireValue::UNDEFINED;
        assert_eq!(FixedArgs([a, u, u]).arity(), 1);
        assert_eq!(FixedArgs([a, a, u]).arity(), 2);
        assert_eq!(FixedArgs([a, u, a]).arity(), 3);
        assert_eq!(FixedArgs([u, u, u]).arity(), 0);
        assert_eq!(FixedArgs::pack(&[a]).map(|f| f.arity()), Some(1));
        assert_eq!(FixedArgs::pack(&[a, a, a, a]), None);
    }

    #[test]
    fn test_exception_payload() {
        assert_eq!(WireValue::exception(None).payload, 0.0);
        assert!(WireValue::exception(None).is_exception());
        let id = RefId::new(7).map(|id| WireValue::exception(Some(id)));
        assert_eq!(id.map(|w| w.payload), Ok(7.0));
    }
}
