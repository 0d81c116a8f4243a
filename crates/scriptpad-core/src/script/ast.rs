//! Syntax tree produced by the parser.

use super::diagnostic::Pos;

/// A parsed submission: directives, declarations and statements in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// `#r "Library"`
    Reference { name: String, pos: Pos },
    /// `#load "path"`
    Load { path: String, pos: Pos },
    /// `using A.B;` or `using static A.B.T;`
    Using {
        path: Vec<String>,
        is_static: bool,
        pos: Pos,
    },
    Function(FunctionDecl),
    Stmt(Stmt),
    /// Final expression without a terminating semicolon; its value is the
    /// value of the submission.
    Trailing(Expr),
}

impl Item {
    pub fn is_directive(&self) -> bool {
        matches!(
            self,
            Item::Reference { .. } | Item::Load { .. } | Item::Using { .. }
        )
    }
}

/// A type as written in source, e.g. `int`, `List<string>`, `System.Exception`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeName {
    pub path: Vec<String>,
    pub args: Vec<TypeName>,
    pub pos: Pos,
}

impl std::fmt::Display for TypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.join("."))?;
        if !self.args.is_empty() {
            let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
            write!(f, "<{}>", args.join(", "))?;
        }
        Ok(())
    }
}

/// Declared type of a variable: explicit or inferred with `var`.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclType {
    Var(Pos),
    Named(TypeName),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: TypeName,
    pub name: String,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub ret: TypeName,
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub name: String,
    pub init: Option<Expr>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    VarDecl {
        ty: DeclType,
        declarators: Vec<Declarator>,
    },
    Expr(Expr),
    Block(Vec<Stmt>),
    If {
        cond: Expr,
        then: Box<Stmt>,
        els: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Vec<Expr>,
        body: Box<Stmt>,
    },
    Foreach {
        ty: DeclType,
        name: String,
        iter: Expr,
        body: Box<Stmt>,
        pos: Pos,
    },
    Break(Pos),
    Continue(Pos),
    Return(Option<Expr>, Pos),
    Throw(Expr, Pos),
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Double(f64),
    Str(String),
    Bool(bool),
    Null,
    Name(String),
    Member {
        target: Box<Expr>,
        name: String,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    New {
        ty: TypeName,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `target = value` or compound `target op= value`.
    Assign {
        op: Option<BinaryOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    IncDec {
        target: Box<Expr>,
        increment: bool,
        prefix: bool,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
    },
}

impl Expr {
    /// Flatten `a.b.c` into `["a", "b", "c"]` when the expression is a pure
    /// dotted name.
    pub fn dotted_path(&self) -> Option<Vec<String>> {
        match &self.kind {
            ExprKind::Name(name) => Some(vec![name.clone()]),
            ExprKind::Member { target, name } => {
                let mut path = target.dotted_path()?;
                path.push(name.clone());
                Some(path)
            }
            _ => None,
        }
    }

    /// Whether the expression may appear as a statement on its own.
    pub fn is_statement_expression(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Assign { .. }
                | ExprKind::IncDec { .. }
                | ExprKind::Call { .. }
                | ExprKind::New { .. }
        )
    }
}
