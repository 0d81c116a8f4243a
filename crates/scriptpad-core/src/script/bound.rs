//! Type-checked program representation executed by the interpreter.
//!
//! Names are resolved to slots: locals index the current frame, globals
//! index the session's variable table and functions the session's function
//! table. A later submission that redeclares a name gets a new slot, so code
//! bound earlier keeps seeing the variable it was compiled against.

use std::sync::Arc;

use super::ast::UnaryOp;
use super::library::{HostMethod, HostProperty};
use super::types::Type;
use super::value::{ExceptionKind, Value};
use crate::state::Import;

/// Result of binding one submission.
#[derive(Debug, Clone)]
pub struct BoundSubmission {
    /// Complete reference set after this submission.
    pub references: Vec<String>,
    /// Complete import list after this submission.
    pub imports: Vec<Import>,
    /// Variables declared by this submission, in slot order after the
    /// prior state's variables.
    pub globals: Vec<GlobalDecl>,
    /// Functions declared by this submission, in slot order after the
    /// prior state's functions.
    pub functions: Vec<Arc<Function>>,
    pub body: Vec<BStmt>,
    /// Trailing expression, if the submission ends with one.
    pub result: Option<BExpr>,
    /// Locals needed by nested top-level blocks.
    pub frame_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalDecl {
    pub name: String,
    pub ty: Type,
}

/// A user-declared function.
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub params: Vec<(String, Type)>,
    pub ret: Type,
    pub body: Vec<BStmt>,
    pub frame_size: usize,
}

impl Function {
    /// `Name(int, string)`, as shown in diagnostics.
    pub fn signature(name: &str, params: &[Type]) -> String {
        let params: Vec<String> = params.iter().map(Type::to_string).collect();
        format!("{name}({})", params.join(", "))
    }
}

#[derive(Debug, Clone)]
pub enum BStmt {
    Expr(BExpr),
    /// Variable declaration; uninitialised declarations get the type's
    /// default value as a constant.
    InitLocal { slot: usize, value: BExpr },
    InitGlobal { slot: usize, value: BExpr },
    Block(Vec<BStmt>),
    If {
        cond: BExpr,
        then: Box<BStmt>,
        els: Option<Box<BStmt>>,
    },
    While {
        cond: BExpr,
        body: Box<BStmt>,
    },
    For {
        init: Option<Box<BStmt>>,
        cond: Option<BExpr>,
        step: Vec<BExpr>,
        body: Box<BStmt>,
    },
    Foreach {
        slot: usize,
        /// Declared type of the loop variable.
        ty: Type,
        iter: BExpr,
        body: Box<BStmt>,
    },
    Break,
    Continue,
    Return(Option<BExpr>),
    Throw(BExpr),
}

#[derive(Debug, Clone)]
pub struct BExpr {
    pub kind: BExprKind,
    pub ty: Type,
}

impl BExpr {
    pub fn new(kind: BExprKind, ty: Type) -> Self {
        Self { kind, ty }
    }

    pub fn constant(value: Value, ty: Type) -> Self {
        Self::new(BExprKind::Const(value), ty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
}

/// Operation selected by the binder for a binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryKind {
    /// Checked 64-bit integer arithmetic.
    Int(ArithOp),
    Double(ArithOp),
    Concat,
    Compare(CompareOp),
    Equal,
    NotEqual,
}

/// Built-in instance members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    ToString,
    StrLength,
    StrToUpper,
    StrToLower,
    StrTrim,
    StrContains,
    StrStartsWith,
    StrEndsWith,
    StrIndexOf,
    StrSubstring,
    StrReplace,
    ListCount,
    ListAdd,
    ListClear,
    ListContains,
    ListRemoveAt,
    ExceptionMessage,
}

/// An assignable location.
#[derive(Debug, Clone)]
pub enum Place {
    Local(usize),
    Global(usize),
    Element { list: Box<BExpr>, index: Box<BExpr> },
}

#[derive(Debug, Clone)]
pub enum BExprKind {
    Const(Value),
    Local(usize),
    Global(usize),
    Property(&'static HostProperty),
    HostCall {
        method: &'static HostMethod,
        args: Vec<BExpr>,
    },
    UserCall {
        function: usize,
        args: Vec<BExpr>,
    },
    Intrinsic {
        op: Intrinsic,
        target: Box<BExpr>,
        args: Vec<BExpr>,
    },
    /// `list[i]` or `s[i]`
    Index {
        target: Box<BExpr>,
        index: Box<BExpr>,
    },
    NewList,
    NewException {
        kind: ExceptionKind,
        message: Option<Box<BExpr>>,
        inner: Vec<BExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<BExpr>,
    },
    Binary {
        op: BinaryKind,
        lhs: Box<BExpr>,
        rhs: Box<BExpr>,
    },
    And(Box<BExpr>, Box<BExpr>),
    Or(Box<BExpr>, Box<BExpr>),
    Conditional {
        cond: Box<BExpr>,
        then: Box<BExpr>,
        els: Box<BExpr>,
    },
    Assign {
        place: Place,
        /// Compound operator; the value is then the right operand.
        op: Option<BinaryKind>,
        value: Box<BExpr>,
    },
    IncDec {
        place: Place,
        increment: bool,
        prefix: bool,
    },
    /// Implicit conversion to `ty` (only `int -> double` changes the value).
    Convert(Box<BExpr>),
}
