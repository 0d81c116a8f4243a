//! Host libraries available to scripts through references.
//!
//! ```text
//! Library (#r name)
//!   └── Namespace (using N;)
//!         └── HostType (Math, Console, List, ...)
//!               ├── static methods  (HostMethod)
//!               └── static properties (HostProperty)
//! ```

use super::host::{Fault, HostContext};
use super::types::Type;
use super::value::Value;

/// Signature of a host function.
pub type HostFn = fn(&HostContext, &[Value]) -> Result<Value, Fault>;

/// Parameter type of a host method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamTy {
    Int,
    Double,
    /// `int` or `double`; see [`Ret::SameNumeric`].
    Number,
    Bool,
    String,
    Object,
}

impl ParamTy {
    pub fn accepts(self, ty: &Type) -> bool {
        match self {
            ParamTy::Int => ty.is_assignable_to(&Type::Int),
            ParamTy::Double => ty.is_assignable_to(&Type::Double),
            ParamTy::Number => ty.is_numeric(),
            ParamTy::Bool => ty.is_assignable_to(&Type::Bool),
            ParamTy::String => ty.is_assignable_to(&Type::String),
            ParamTy::Object => ty.is_assignable_to(&Type::Object),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ParamTy::Int => "int",
            ParamTy::Double => "double",
            ParamTy::Number => "number",
            ParamTy::Bool => "bool",
            ParamTy::String => "string",
            ParamTy::Object => "object",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Params {
    Fixed(&'static [ParamTy]),
    /// Any number of arguments of one type (`params T[]`).
    Variadic(ParamTy),
}

/// Return type of a host method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ret {
    Void,
    Int,
    Double,
    Bool,
    String,
    /// `int` when every argument is `int`, otherwise `double`.
    SameNumeric,
}

impl Ret {
    pub fn resolve(self, args: &[Type]) -> Type {
        match self {
            Ret::Void => Type::Void,
            Ret::Int => Type::Int,
            Ret::Double => Type::Double,
            Ret::Bool => Type::Bool,
            Ret::String => Type::String,
            Ret::SameNumeric => {
                if args.iter().all(|t| *t == Type::Int) {
                    Type::Int
                } else {
                    Type::Double
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct HostMethod {
    pub name: &'static str,
    pub params: Params,
    pub ret: Ret,
    pub func: HostFn,
}

#[derive(Debug)]
pub struct HostProperty {
    pub name: &'static str,
    pub ret: Ret,
    pub get: fn() -> Value,
}

/// How the binder treats a host type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// Only static members.
    Static,
    /// `List<T>`
    List,
    Exception,
    AggregateException,
}

#[derive(Debug)]
pub struct HostType {
    pub name: &'static str,
    pub kind: TypeKind,
    pub methods: &'static [HostMethod],
    pub properties: &'static [HostProperty],
}

impl HostType {
    pub fn method(&self, name: &str) -> Option<&'static HostMethod> {
        // Tables are 'static, so is every entry
        let methods: &'static [HostMethod] = self.methods;
        methods.iter().find(|m| m.name == name)
    }

    pub fn property(&self, name: &str) -> Option<&'static HostProperty> {
        let properties: &'static [HostProperty] = self.properties;
        properties.iter().find(|p| p.name == name)
    }

    /// Number of generic arguments the type takes.
    pub fn arity(&self) -> usize {
        usize::from(self.kind == TypeKind::List)
    }
}

#[derive(Debug)]
pub struct Namespace {
    pub name: &'static str,
    pub types: &'static [HostType],
}

impl Namespace {
    pub fn find_type(&self, name: &str) -> Option<&'static HostType> {
        let types: &'static [HostType] = self.types;
        types.iter().find(|t| t.name == name)
    }
}

#[derive(Debug)]
pub struct Library {
    pub name: &'static str,
    pub namespaces: &'static [Namespace],
}

/// Every library a script can reference.
pub static LIBRARIES: &[Library] = &[
    Library {
        name: "System.Runtime",
        namespaces: &[
            Namespace {
                name: "System",
                types: &[MATH, CONSOLE, CONVERT, EXCEPTION, AGGREGATE_EXCEPTION],
            },
            Namespace {
                name: "System.Collections.Generic",
                types: &[LIST],
            },
        ],
    },
    Library {
        name: "System.Threading",
        namespaces: &[Namespace {
            name: "System.Threading",
            types: &[THREAD],
        }],
    },
    Library {
        name: "Pad.Api",
        namespaces: &[Namespace {
            name: "Pad.Api",
            types: &[HOST],
        }],
    },
];

pub fn library(name: &str) -> Option<&'static Library> {
    LIBRARIES.iter().find(|lib| lib.name == name)
}

/// Namespaces provided by the given set of referenced libraries.
pub fn namespaces<'a>(
    references: impl IntoIterator<Item = &'a str>,
) -> impl Iterator<Item = &'static Namespace> {
    references
        .into_iter()
        .filter_map(library)
        .flat_map(|lib| lib.namespaces.iter())
        .collect::<Vec<_>>()
        .into_iter()
}

// ============================================================================
// System
// ============================================================================

const MATH: HostType = HostType {
    name: "Math",
    kind: TypeKind::Static,
    methods: &[
        HostMethod {
            name: "Abs",
            params: Params::Fixed(&[ParamTy::Number]),
            ret: Ret::SameNumeric,
            func: math_abs,
        },
        HostMethod {
            name: "Max",
            params: Params::Fixed(&[ParamTy::Number, ParamTy::Number]),
            ret: Ret::SameNumeric,
            func: math_max,
        },
        HostMethod {
            name: "Min",
            params: Params::Fixed(&[ParamTy::Number, ParamTy::Number]),
            ret: Ret::SameNumeric,
            func: math_min,
        },
        HostMethod {
            name: "Pow",
            params: Params::Fixed(&[ParamTy::Double, ParamTy::Double]),
            ret: Ret::Double,
            func: |_, args| Ok(Value::Double(num(&args[0]).powf(num(&args[1])))),
        },
        HostMethod {
            name: "Sqrt",
            params: Params::Fixed(&[ParamTy::Double]),
            ret: Ret::Double,
            func: |_, args| Ok(Value::Double(num(&args[0]).sqrt())),
        },
        HostMethod {
            name: "Floor",
            params: Params::Fixed(&[ParamTy::Double]),
            ret: Ret::Double,
            func: |_, args| Ok(Value::Double(num(&args[0]).floor())),
        },
        HostMethod {
            name: "Ceiling",
            params: Params::Fixed(&[ParamTy::Double]),
            ret: Ret::Double,
            func: |_, args| Ok(Value::Double(num(&args[0]).ceil())),
        },
        HostMethod {
            name: "Round",
            params: Params::Fixed(&[ParamTy::Double]),
            ret: Ret::Double,
            func: |_, args| Ok(Value::Double(num(&args[0]).round_ties_even())),
        },
    ],
    properties: &[HostProperty {
        name: "PI",
        ret: Ret::Double,
        get: || Value::Double(std::f64::consts::PI),
    }],
};

const CONSOLE: HostType = HostType {
    name: "Console",
    kind: TypeKind::Static,
    methods: &[
        HostMethod {
            name: "WriteLine",
            params: Params::Variadic(ParamTy::Object),
            ret: Ret::Void,
            func: console_write,
        },
        HostMethod {
            name: "Write",
            params: Params::Variadic(ParamTy::Object),
            ret: Ret::Void,
            func: console_write,
        },
    ],
    properties: &[],
};

const CONVERT: HostType = HostType {
    name: "Convert",
    kind: TypeKind::Static,
    methods: &[
        HostMethod {
            name: "ToInt32",
            params: Params::Fixed(&[ParamTy::Object]),
            ret: Ret::Int,
            func: convert_to_int,
        },
        HostMethod {
            name: "ToDouble",
            params: Params::Fixed(&[ParamTy::Object]),
            ret: Ret::Double,
            func: convert_to_double,
        },
        HostMethod {
            name: "ToString",
            params: Params::Fixed(&[ParamTy::Object]),
            ret: Ret::String,
            func: |_, args| Ok(Value::str(args[0].to_string())),
        },
        HostMethod {
            name: "ToBoolean",
            params: Params::Fixed(&[ParamTy::Object]),
            ret: Ret::Bool,
            func: convert_to_bool,
        },
    ],
    properties: &[],
};

const EXCEPTION: HostType = HostType {
    name: "Exception",
    kind: TypeKind::Exception,
    methods: &[],
    properties: &[],
};

const AGGREGATE_EXCEPTION: HostType = HostType {
    name: "AggregateException",
    kind: TypeKind::AggregateException,
    methods: &[],
    properties: &[],
};

const LIST: HostType = HostType {
    name: "List",
    kind: TypeKind::List,
    methods: &[],
    properties: &[],
};

// ============================================================================
// System.Threading
// ============================================================================

const THREAD: HostType = HostType {
    name: "Thread",
    kind: TypeKind::Static,
    methods: &[HostMethod {
        name: "Sleep",
        params: Params::Fixed(&[ParamTy::Int]),
        ret: Ret::Void,
        func: wait,
    }],
    properties: &[],
};

// ============================================================================
// Pad.Api
// ============================================================================

const HOST: HostType = HostType {
    name: "Host",
    kind: TypeKind::Static,
    methods: &[
        HostMethod {
            name: "Print",
            params: Params::Variadic(ParamTy::Object),
            ret: Ret::Void,
            func: host_print,
        },
        HostMethod {
            name: "Wait",
            params: Params::Fixed(&[ParamTy::Int]),
            ret: Ret::Void,
            func: wait,
        },
    ],
    properties: &[HostProperty {
        name: "Version",
        ret: Ret::String,
        get: || Value::str(env!("CARGO_PKG_VERSION")),
    }],
};

// ============================================================================
// Implementations
// ============================================================================

fn num(value: &Value) -> f64 {
    value.as_double().unwrap_or(f64::NAN)
}

fn math_abs(_: &HostContext, args: &[Value]) -> Result<Value, Fault> {
    match &args[0] {
        Value::Int(v) => v.checked_abs().map(Value::Int).ok_or_else(|| {
            Fault::single("Negating the minimum value of a twos complement number is invalid.")
        }),
        other => Ok(Value::Double(num(other).abs())),
    }
}

fn math_max(_: &HostContext, args: &[Value]) -> Result<Value, Fault> {
    Ok(match (&args[0], &args[1]) {
        (Value::Int(a), Value::Int(b)) => Value::Int(*a.max(b)),
        (a, b) => Value::Double(num(a).max(num(b))),
    })
}

fn math_min(_: &HostContext, args: &[Value]) -> Result<Value, Fault> {
    Ok(match (&args[0], &args[1]) {
        (Value::Int(a), Value::Int(b)) => Value::Int(*a.min(b)),
        (a, b) => Value::Double(num(a).min(num(b))),
    })
}

/// `Console.WriteLine(format, args...)`: `{n}` placeholders in the first
/// argument are replaced by the following arguments.
fn console_write(ctx: &HostContext, args: &[Value]) -> Result<Value, Fault> {
    let text = match args {
        [] => String::new(),
        [single] => single.to_string(),
        [format, rest @ ..] => {
            let mut text = format.to_string();
            for (i, arg) in rest.iter().enumerate() {
                text = text.replace(&format!("{{{i}}}"), &arg.to_string());
            }
            text
        }
    };
    ctx.output().info(&text);
    Ok(Value::Null)
}

fn host_print(ctx: &HostContext, args: &[Value]) -> Result<Value, Fault> {
    let parts: Vec<String> = args.iter().map(Value::to_string).collect();
    ctx.output().info(&parts.join(" "));
    Ok(Value::Null)
}

fn wait(ctx: &HostContext, args: &[Value]) -> Result<Value, Fault> {
    ctx.sleep(args[0].as_int().unwrap_or_default())?;
    Ok(Value::Null)
}

const INT32_RANGE: &str = "Value was either too large or too small for an Int32.";
const BAD_FORMAT: &str = "Input string was not in a correct format.";

fn to_int32(v: f64) -> Result<Value, Fault> {
    let rounded = v.round_ties_even();
    if rounded.is_nan() || rounded < f64::from(i32::MIN) || rounded > f64::from(i32::MAX) {
        return Err(Fault::single(INT32_RANGE));
    }
    Ok(Value::Int(rounded as i64))
}

fn convert_to_int(_: &HostContext, args: &[Value]) -> Result<Value, Fault> {
    match &args[0] {
        Value::Null => Ok(Value::Int(0)),
        Value::Int(v) => {
            if i32::try_from(*v).is_ok() {
                Ok(Value::Int(*v))
            } else {
                Err(Fault::single(INT32_RANGE))
            }
        }
        Value::Double(v) => to_int32(*v),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Str(s) => {
            let parsed: i64 = s.trim().parse().map_err(|_| Fault::single(BAD_FORMAT))?;
            if i32::try_from(parsed).is_ok() {
                Ok(Value::Int(parsed))
            } else {
                Err(Fault::single(INT32_RANGE))
            }
        }
        other => Err(invalid_cast(other, "Int32")),
    }
}

fn convert_to_double(_: &HostContext, args: &[Value]) -> Result<Value, Fault> {
    match &args[0] {
        Value::Null => Ok(Value::Double(0.0)),
        Value::Int(_) | Value::Double(_) => Ok(Value::Double(num(&args[0]))),
        Value::Bool(b) => Ok(Value::Double(if *b { 1.0 } else { 0.0 })),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| Fault::single(BAD_FORMAT)),
        other => Err(invalid_cast(other, "Double")),
    }
}

fn convert_to_bool(_: &HostContext, args: &[Value]) -> Result<Value, Fault> {
    match &args[0] {
        Value::Null => Ok(Value::Bool(false)),
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::Int(v) => Ok(Value::Bool(*v != 0)),
        Value::Double(v) => Ok(Value::Bool(*v != 0.0)),
        Value::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(Fault::single(format!(
                "String '{s}' was not recognized as a valid Boolean."
            ))),
        },
        other => Err(invalid_cast(other, "Boolean")),
    }
}

fn invalid_cast(value: &Value, target: &str) -> Fault {
    Fault::single(format!(
        "Unable to cast object of type '{}' to type '{target}'.",
        value.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::execute::AbortHandle;
    use crate::output::{Emission, RecordingOutput};

    fn context() -> (Arc<RecordingOutput>, HostContext) {
        let output = Arc::new(RecordingOutput::new());
        let ctx = HostContext::new(output.clone(), AbortHandle::new());
        (output, ctx)
    }

    fn call(type_name: &str, method: &str, args: &[Value]) -> Result<Value, Fault> {
        let (_, ctx) = context();
        let host_type = LIBRARIES
            .iter()
            .flat_map(|lib| lib.namespaces.iter())
            .find_map(|ns| ns.find_type(type_name))
            .unwrap();
        (host_type.method(method).unwrap().func)(&ctx, args)
    }

    #[test]
    fn test_library_lookup() {
        assert!(library("System.Runtime").is_some());
        assert!(library("Missing.Library").is_none());
        let names: Vec<&str> = namespaces(["System.Runtime", "Pad.Api"])
            .map(|ns| ns.name)
            .collect();
        assert_eq!(names, ["System", "System.Collections.Generic", "Pad.Api"]);
    }

    #[test]
    fn test_same_numeric_return() {
        assert_eq!(Ret::SameNumeric.resolve(&[Type::Int, Type::Int]), Type::Int);
        assert_eq!(Ret::SameNumeric.resolve(&[Type::Int, Type::Double]), Type::Double);
    }

    #[test]
    fn test_math() {
        assert_eq!(call("Math", "Max", &[Value::Int(3), Value::Int(7)]).unwrap(), Value::Int(7));
        assert_eq!(
            call("Math", "Round", &[Value::Double(2.5)]).unwrap(),
            Value::Double(2.0)
        );
        assert!(call("Math", "Abs", &[Value::Int(i64::MIN)]).is_err());
    }

    #[test]
    fn test_convert_to_int32() {
        assert_eq!(
            call("Convert", "ToInt32", &[Value::Double(3.5)]).unwrap(),
            Value::Int(4)
        );
        assert_eq!(
            call("Convert", "ToInt32", &[Value::str(" 42 ")]).unwrap(),
            Value::Int(42)
        );
        assert_eq!(
            call("Convert", "ToInt32", &[Value::str("abc")]),
            Err(Fault::single(BAD_FORMAT))
        );
        assert_eq!(
            call("Convert", "ToInt32", &[Value::Int(1 << 40)]),
            Err(Fault::single(INT32_RANGE))
        );
    }

    #[test]
    fn test_console_formats_placeholders() {
        let (output, ctx) = context();
        console_write(&ctx, &[Value::str("{0} + {1}"), Value::Int(1), Value::Int(2)]).unwrap();
        assert_eq!(output.emissions(), vec![Emission::Info("1 + 2".to_string())]);
    }

    #[test]
    fn test_print_joins_arguments() {
        let (output, ctx) = context();
        host_print(&ctx, &[Value::str("a"), Value::Int(1), Value::Bool(false)]).unwrap();
        assert_eq!(output.emissions(), vec![Emission::Info("a 1 False".to_string())]);
    }
}
