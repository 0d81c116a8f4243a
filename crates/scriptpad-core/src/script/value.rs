//! Runtime values.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::types::Type;

/// Nesting depth at which list rendering stops descending.
const MAX_RENDER_DEPTH: usize = 8;

/// A PadScript value.
///
/// Lists and exceptions are shared references: cloning a `Value` clones the
/// handle, not the contents.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    Double(f64),
    Bool(bool),
    Str(Arc<str>),
    List(ListRef),
    Exception(Arc<ExceptionValue>),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(Arc::from(s.as_ref()))
    }

    /// Value of a declared but unassigned variable of type `ty`.
    pub fn default_for(ty: &Type) -> Value {
        match ty {
            Type::Int => Value::Int(0),
            Type::Double => Value::Double(0.0),
            Type::Bool => Value::Bool(false),
            _ => Value::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the runtime type, as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "Int64",
            Value::Double(_) => "Double",
            Value::Bool(_) => "Boolean",
            Value::Str(_) => "String",
            Value::List(_) => "List",
            Value::Exception(e) => e.kind.name(),
        }
    }

    /// Whether the runtime value inhabits the static type `ty`.
    pub fn conforms_to(&self, ty: &Type) -> bool {
        match (self, ty) {
            (_, Type::Object) => true,
            (Value::Null, t) => t.is_reference(),
            (Value::Int(_), Type::Int) => true,
            (Value::Int(_) | Value::Double(_), Type::Double) => true,
            (Value::Bool(_), Type::Bool) => true,
            (Value::Str(_), Type::String) => true,
            (Value::List(_), Type::List(_)) => true,
            (Value::Exception(_), Type::Exception) => true,
            (Value::Exception(e), Type::AggregateException) => {
                e.kind == ExceptionKind::Aggregate
            }
            _ => false,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Equality as the `==` operator sees it: numbers compare numerically,
    /// strings by content, lists and exceptions by identity.
    pub fn runtime_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(_) | Value::Double(_), Value::Int(_) | Value::Double(_)) => {
                self.as_double() == other.as_double()
            }
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a.ptr_eq(b),
            (Value::Exception(a), Value::Exception(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(v) => write!(f, "{v}"),
            Value::Double(v) => f.write_str(&format_double(*v)),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Str(s) => f.write_str(s),
            Value::List(list) => {
                if depth >= MAX_RENDER_DEPTH {
                    return f.write_str("[...]");
                }
                // Snapshot so a self-containing list does not re-lock.
                let items = list.snapshot();
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.render(f, depth + 1)?;
                }
                f.write_str("]")
            }
            Value::Exception(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}

/// Structural equality, used when comparing session snapshots.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a.ptr_eq(b) || a.snapshot() == b.snapshot(),
            (Value::Exception(a), Value::Exception(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

/// Format a double the way script output shows it.
pub fn format_double(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        format!("{v}")
    }
}

/// Shared, mutable list storage.
#[derive(Debug, Clone, Default)]
pub struct ListRef(Arc<Mutex<Vec<Value>>>);

impl ListRef {
    pub fn new(items: Vec<Value>) -> Self {
        Self(Arc::new(Mutex::new(items)))
    }

    /// Lock the list. A poisoned lock is recovered; list operations never
    /// leave the vector in a broken state.
    pub fn lock(&self) -> MutexGuard<'_, Vec<Value>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Vec<Value> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ptr_eq(&self, other: &ListRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    Exception,
    Aggregate,
}

impl ExceptionKind {
    pub fn name(self) -> &'static str {
        match self {
            ExceptionKind::Exception => "Exception",
            ExceptionKind::Aggregate => "AggregateException",
        }
    }
}

/// An exception object created by `new Exception(...)` or
/// `new AggregateException(...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionValue {
    pub kind: ExceptionKind,
    pub message: String,
    /// Inner exceptions; only populated for aggregates.
    pub inner: Vec<Arc<ExceptionValue>>,
}

impl ExceptionValue {
    pub const DEFAULT_MESSAGE: &'static str = "Exception of type 'System.Exception' was thrown.";
    pub const AGGREGATE_MESSAGE: &'static str = "One or more errors occurred.";

    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: ExceptionKind::Exception,
            message: message.into(),
            inner: Vec::new(),
        }
    }

    pub fn aggregate(message: Option<String>, inner: Vec<Arc<ExceptionValue>>) -> Self {
        Self {
            kind: ExceptionKind::Aggregate,
            message: message.unwrap_or_else(|| Self::AGGREGATE_MESSAGE.to_string()),
            inner,
        }
    }
}

impl fmt::Display for ExceptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendering() {
        assert_eq!(Value::Int(-42).to_string(), "-42");
        assert_eq!(Value::Double(3.0).to_string(), "3");
        assert_eq!(Value::Double(2.5).to_string(), "2.5");
        assert_eq!(Value::Double(f64::NAN).to_string(), "NaN");
        assert_eq!(Value::Double(f64::NEG_INFINITY).to_string(), "-Infinity");
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::str("hi").to_string(), "hi");
    }

    #[test]
    fn test_list_rendering() {
        let inner = Value::List(ListRef::new(vec![Value::Int(1), Value::Int(2)]));
        let outer = Value::List(ListRef::new(vec![inner, Value::str("x")]));
        assert_eq!(outer.to_string(), "[[1, 2], x]");
    }

    #[test]
    fn test_self_containing_list_renders() {
        let list = ListRef::new(Vec::new());
        list.lock().push(Value::List(list.clone()));
        let rendered = Value::List(list).to_string();
        assert!(rendered.contains("[...]"));
    }

    #[test]
    fn test_exception_rendering() {
        let e = Value::Exception(Arc::new(ExceptionValue::new("boom")));
        assert_eq!(e.to_string(), "Exception: boom");
        let agg = ExceptionValue::aggregate(None, Vec::new());
        assert_eq!(agg.to_string(), "AggregateException: One or more errors occurred.");
    }

    #[test]
    fn test_runtime_equality() {
        assert!(Value::Int(2).runtime_eq(&Value::Double(2.0)));
        assert!(Value::str("a").runtime_eq(&Value::str("a")));
        let a = ListRef::new(vec![Value::Int(1)]);
        let b = ListRef::new(vec![Value::Int(1)]);
        assert!(!Value::List(a.clone()).runtime_eq(&Value::List(b.clone())));
        assert!(Value::List(a.clone()).runtime_eq(&Value::List(a.clone())));
        // Structural equality still sees them as equal
        assert_eq!(Value::List(a), Value::List(b));
    }

    #[test]
    fn test_conformance() {
        assert!(Value::Int(1).conforms_to(&Type::Double));
        assert!(Value::Null.conforms_to(&Type::String));
        assert!(!Value::Null.conforms_to(&Type::Int));
        assert!(!Value::str("x").conforms_to(&Type::Int));
    }
}
