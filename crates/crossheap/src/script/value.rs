//! Script-side value representation
//!
//! A deliberately small object model for the embedded engine: primitives,
//! plain objects with ordered properties, arrays, native functions and typed
//! arrays. Objects are reference counted; an object is collected when its
//! last strong handle is dropped, which is what drives finalization.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::error::ScriptError;
use crate::memory::{SharedBuffer, TypedArrayData};
use crate::tag::TypedArrayKind;

use super::finalize::FinalizerToken;

/// Native function pointer: `(this, args) -> result`
pub type NativeFn = Rc<dyn Fn(&ScriptValue, &[ScriptValue]) -> Result<ScriptValue, ScriptError>>;

/// A value living in the script heap.
#[derive(Clone, Default)]
pub enum ScriptValue {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Bool(bool),
    /// Double
    Number(f64),
    /// Integer primitive (bounded to 128 bits in this model)
    BigInt(i128),
    /// String primitive
    String(Rc<str>),
    /// Symbol primitive, compared by identity
    Symbol(Rc<Symbol>),
    /// Any heap object
    Object(ObjectRef),
}

/// A unique symbol with an optional description
#[derive(Debug)]
pub struct Symbol {
    description: Option<String>,
}

impl Symbol {
    /// Create a fresh symbol
    pub fn new(description: Option<String>) -> Rc<Self> {
        Rc::new(Symbol { description })
    }

    /// The description given at creation
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Shared handle to a heap object.
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<ScriptObject>>);

/// Non-owning handle to a heap object
#[derive(Clone)]
pub struct WeakObject(Weak<RefCell<ScriptObject>>);

/// A heap object: its kind plus ordered own properties.
pub struct ScriptObject {
    pub(crate) kind: ObjectKind,
    pub(crate) properties: IndexMap<PropertyKey, ScriptValue>,
    pub(crate) finalizer: Option<FinalizerToken>,
}

/// What kind of object this is
pub enum ObjectKind {
    /// Ordinary object
    Plain,
    /// Dense array
    Array(Vec<ScriptValue>),
    /// Callable object
    Function(Function),
    /// Typed array view; may alias a pinned host buffer
    TypedArray(SharedBuffer),
}

/// A native function object
#[derive(Clone)]
pub struct Function {
    /// Name used in error messages
    pub name: String,
    /// Behavior
    pub call: NativeFn,
    /// Whether `new` is allowed
    pub constructible: bool,
}

/// Property key: strings and symbols
#[derive(Clone, Debug)]
pub enum PropertyKey {
    /// String key (array indices are canonical decimal strings)
    String(Rc<str>),
    /// Symbol key
    Symbol(Rc<Symbol>),
}

impl PartialEq for PropertyKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropertyKey::String(a), PropertyKey::String(b)) => a == b,
            (PropertyKey::Symbol(a), PropertyKey::Symbol(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for PropertyKey {}

impl Hash for PropertyKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            PropertyKey::String(s) => s.hash(state),
            PropertyKey::Symbol(s) => (Rc::as_ptr(s) as usize).hash(state),
        }
    }
}

impl PropertyKey {
    /// String key
    pub fn string(key: &str) -> Self {
        PropertyKey::String(Rc::from(key))
    }

    /// Array index this key names, if any
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PropertyKey::String(s) => {
                let canonical = !s.is_empty() && (s.as_ref() == "0" || !s.starts_with('0'));
                if canonical && s.bytes().all(|b| b.is_ascii_digit()) {
                    s.parse().ok()
                } else {
                    None
                }
            }
            PropertyKey::Symbol(_) => None,
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(key: &str) -> Self {
        PropertyKey::string(key)
    }
}

impl From<usize> for PropertyKey {
    fn from(index: usize) -> Self {
        PropertyKey::String(Rc::from(index.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════════
// Object handles
// ═══════════════════════════════════════════════════════════════════

impl ObjectRef {
    fn from_kind(kind: ObjectKind) -> Self {
        ObjectRef(Rc::new(RefCell::new(ScriptObject {
            kind,
            properties: IndexMap::new(),
            finalizer: None,
        })))
    }

    /// `{}`
    pub fn plain() -> Self {
        Self::from_kind(ObjectKind::Plain)
    }

    /// Array holding `items`
    pub fn array(items: Vec<ScriptValue>) -> Self {
        Self::from_kind(ObjectKind::Array(items))
    }

    /// Native function
    pub fn function(function: Function) -> Self {
        Self::from_kind(ObjectKind::Function(function))
    }

    /// Typed array over `buffer` (aliases it, no copy)
    pub fn typed_array(buffer: SharedBuffer) -> Self {
        Self::from_kind(ObjectKind::TypedArray(buffer))
    }

    /// Borrow the object
    pub fn borrow(&self) -> Ref<'_, ScriptObject> {
        self.0.borrow()
    }

    pub(crate) fn borrow_mut(&self) -> RefMut<'_, ScriptObject> {
        self.0.borrow_mut()
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Address used as identity key
    pub fn address(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Weak handle
    pub fn downgrade(&self) -> WeakObject {
        WeakObject(Rc::downgrade(&self.0))
    }

    /// Number of strong handles (for diagnostics)
    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Whether the object is callable
    pub fn is_function(&self) -> bool {
        matches!(self.borrow().kind, ObjectKind::Function(_))
    }

    /// Whether the object is an array
    pub fn is_array(&self) -> bool {
        matches!(self.borrow().kind, ObjectKind::Array(_))
    }

    /// Whether the object is a typed array
    pub fn is_typed_array(&self) -> bool {
        matches!(self.borrow().kind, ObjectKind::TypedArray(_))
    }

    /// Function data, if callable
    pub fn function_data(&self) -> Option<Function> {
        match &self.borrow().kind {
            ObjectKind::Function(f) => Some(f.clone()),
            _ => None,
        }
    }

    /// Elements, if an array
    pub fn array_items(&self) -> Option<Vec<ScriptValue>> {
        match &self.borrow().kind {
            ObjectKind::Array(items) => Some(items.clone()),
            _ => None,
        }
    }

    /// Backing buffer, if a typed array
    pub fn typed_buffer(&self) -> Option<SharedBuffer> {
        match &self.borrow().kind {
            ObjectKind::TypedArray(buffer) => Some(buffer.clone()),
            _ => None,
        }
    }

    /// Own property lookup, ignoring array/typed-array elements
    pub fn own_property(&self, key: &PropertyKey) -> Option<ScriptValue> {
        self.borrow().properties.get(key).cloned()
    }

    pub(crate) fn attach_finalizer(&self, token: FinalizerToken) {
        self.borrow_mut().finalizer = Some(token);
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let object = self.borrow();
        match &object.kind {
            ObjectKind::Plain => write!(f, "Object({} props)", object.properties.len()),
            ObjectKind::Array(items) => write!(f, "Array({})", items.len()),
            ObjectKind::Function(func) => write!(f, "Function({})", func.name),
            ObjectKind::TypedArray(buffer) => {
                let buffer = buffer.borrow();
                write!(f, "{}({})", buffer.kind(), buffer.len())
            }
        }
    }
}

impl WeakObject {
    /// Upgrade if the object is still alive
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.0.upgrade().map(ObjectRef)
    }

    /// Whether the object has not been collected yet
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakObject(alive: {})", self.0.strong_count() > 0)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Values
// ═══════════════════════════════════════════════════════════════════

impl ScriptValue {
    /// String primitive
    pub fn string(s: &str) -> Self {
        ScriptValue::String(Rc::from(s))
    }

    /// Fresh symbol
    pub fn symbol(description: Option<&str>) -> Self {
        ScriptValue::Symbol(Symbol::new(description.map(str::to_owned)))
    }

    /// `{}`
    pub fn object() -> Self {
        ScriptValue::Object(ObjectRef::plain())
    }

    /// Array of `items`
    pub fn array(items: Vec<ScriptValue>) -> Self {
        ScriptValue::Object(ObjectRef::array(items))
    }

    /// Typed array owning a copy of `data`
    pub fn typed_array(data: TypedArrayData) -> Self {
        ScriptValue::Object(ObjectRef::typed_array(Rc::new(RefCell::new(data))))
    }

    /// Empty typed array of `kind`
    pub fn empty_typed_array(kind: TypedArrayKind) -> Self {
        ScriptValue::typed_array(TypedArrayData::zeroed(kind, 0))
    }

    /// Callable native function
    pub fn native_fn<F>(name: &str, f: F) -> Self
    where
        F: Fn(&ScriptValue, &[ScriptValue]) -> Result<ScriptValue, ScriptError> + 'static,
    {
        ScriptValue::Object(ObjectRef::function(Function {
            name: name.to_owned(),
            call: Rc::new(f),
            constructible: false,
        }))
    }

    /// Native function usable with `new`
    pub fn native_constructor<F>(name: &str, f: F) -> Self
    where
        F: Fn(&ScriptValue, &[ScriptValue]) -> Result<ScriptValue, ScriptError> + 'static,
    {
        ScriptValue::Object(ObjectRef::function(Function {
            name: name.to_owned(),
            call: Rc::new(f),
            constructible: true,
        }))
    }

    /// Whether this is `undefined`
    pub fn is_undefined(&self) -> bool {
        matches!(self, ScriptValue::Undefined)
    }

    /// Whether this is `null` or `undefined`
    pub fn is_nullish(&self) -> bool {
        matches!(self, ScriptValue::Undefined | ScriptValue::Null)
    }

    /// Object handle, if an object
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            ScriptValue::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Number, if a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ScriptValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// String contents, if a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Strict equality (`===`)
    pub fn strict_equals(&self, other: &ScriptValue) -> bool {
        match (self, other) {
            (ScriptValue::Undefined, ScriptValue::Undefined) => true,
            (ScriptValue::Null, ScriptValue::Null) => true,
            (ScriptValue::Bool(a), ScriptValue::Bool(b)) => a == b,
            (ScriptValue::Number(a), ScriptValue::Number(b)) => a == b,
            (ScriptValue::BigInt(a), ScriptValue::BigInt(b)) => a == b,
            (ScriptValue::String(a), ScriptValue::String(b)) => a == b,
            (ScriptValue::Symbol(a), ScriptValue::Symbol(b)) => Rc::ptr_eq(a, b),
            (ScriptValue::Object(a), ScriptValue::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::Undefined => write!(f, "undefined"),
            ScriptValue::Null => write!(f, "null"),
            ScriptValue::Bool(b) => write!(f, "{}", b),
            ScriptValue::Number(n) => write!(f, "{}", n),
            ScriptValue::BigInt(n) => write!(f, "{}n", n),
            ScriptValue::String(s) => write!(f, "{:?}", s.as_ref()),
            ScriptValue::Symbol(s) => write!(f, "Symbol({})", s.description().unwrap_or("")),
            ScriptValue::Object(o) => write!(f, "{:?}", o),
        }
    }
}

impl From<bool> for ScriptValue {
    fn from(b: bool) -> Self {
        ScriptValue::Bool(b)
    }
}

impl From<f64> for ScriptValue {
    fn from(n: f64) -> Self {
        ScriptValue::Number(n)
    }
}

impl From<i32> for ScriptValue {
    fn from(n: i32) -> Self {
        ScriptValue::Number(f64::from(n))
    }
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        ScriptValue::string(s)
    }
}

impl From<ObjectRef> for ScriptValue {
    fn from(o: ObjectRef) -> Self {
        ScriptValue::Object(o)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_key_index() {
        assert_eq!(PropertyKey::string("0").as_index(), Some(0));
        assert_eq!(PropertyKey::string("12").as_index(), Some(12));
        assert_eq!(PropertyKey::string("012").as_index(), None);
        assert_eq!(PropertyKey::string("-1").as_index(), None);
        assert_eq!(PropertyKey::string("").as_index(), None);
        assert_eq!(PropertyKey::string("length").as_index(), None);
    }

    #[test]
    fn test_symbol_keys_compare_by_identity() {
        let a = Symbol::new(Some("k".into()));
        let b = Symbol::new(Some("k".into()));
        assert_eq!(PropertyKey::Symbol(a.clone()), PropertyKey::Symbol(a.clone()));
        assert_ne!(PropertyKey::Symbol(a), PropertyKey::Symbol(b));
    }

    #[test]
    fn test_strict_equality() {
        let obj = ObjectRef::plain();
        assert!(ScriptValue::Object(obj.clone()).strict_equals(&ScriptValue::Object(obj)));
        assert!(!ScriptValue::object().strict_equals(&ScriptValue::object()));
        assert!(!ScriptValue::Number(f64::NAN).strict_equals(&ScriptValue::Number(f64::NAN)));
        assert!(ScriptValue::string("a").strict_equals(&ScriptValue::string("a")));
    }
}
