//! Static types of PadScript.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Double,
    Bool,
    String,
    /// Dynamically checked; every value converts to it.
    Object,
    List(Box<Type>),
    Exception,
    AggregateException,
    /// Type of the `null` literal before conversion.
    Null,
    Void,
}

impl Type {
    pub fn list_of(element: Type) -> Type {
        Type::List(Box::new(element))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Double)
    }

    /// Whether values of this type may be `null`.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Type::String
                | Type::Object
                | Type::List(_)
                | Type::Exception
                | Type::AggregateException
                | Type::Null
        )
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, Type::Exception | Type::AggregateException)
    }

    /// Implicit conversion from `self` to `target`.
    pub fn is_assignable_to(&self, target: &Type) -> bool {
        if self == target {
            return *self != Type::Void;
        }
        match (self, target) {
            (Type::Void, _) | (_, Type::Void) => false,
            (_, Type::Object) => true,
            (Type::Int, Type::Double) => true,
            (Type::Null, t) => t.is_reference(),
            (Type::AggregateException, Type::Exception) => true,
            _ => false,
        }
    }

    /// The type that both branches of `?:` convert to, if any.
    pub fn common(a: &Type, b: &Type) -> Option<Type> {
        if b.is_assignable_to(a) && *a != Type::Null {
            Some(a.clone())
        } else if a.is_assignable_to(b) {
            Some(b.clone())
        } else {
            None
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::Double => f.write_str("double"),
            Type::Bool => f.write_str("bool"),
            Type::String => f.write_str("string"),
            Type::Object => f.write_str("object"),
            Type::List(element) => write!(f, "List<{element}>"),
            Type::Exception => f.write_str("Exception"),
            Type::AggregateException => f.write_str("AggregateException"),
            Type::Null => f.write_str("<null>"),
            Type::Void => f.write_str("void"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implicit_conversions() {
        assert!(Type::Int.is_assignable_to(&Type::Double));
        assert!(!Type::Double.is_assignable_to(&Type::Int));
        assert!(Type::Bool.is_assignable_to(&Type::Object));
        assert!(Type::Null.is_assignable_to(&Type::String));
        assert!(!Type::Null.is_assignable_to(&Type::Int));
        assert!(Type::AggregateException.is_assignable_to(&Type::Exception));
        assert!(!Type::Void.is_assignable_to(&Type::Object));
        assert!(!Type::list_of(Type::Int).is_assignable_to(&Type::list_of(Type::Double)));
    }

    #[test]
    fn test_common_type() {
        assert_eq!(Type::common(&Type::Int, &Type::Double), Some(Type::Double));
        assert_eq!(Type::common(&Type::Null, &Type::String), Some(Type::String));
        assert_eq!(Type::common(&Type::String, &Type::Null), Some(Type::String));
        assert_eq!(Type::common(&Type::Bool, &Type::String), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Type::list_of(Type::list_of(Type::Int)).to_string(), "List<List<int>>");
    }
}
