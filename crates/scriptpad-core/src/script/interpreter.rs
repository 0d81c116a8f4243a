//! Tree-walking evaluator for bound submissions.

use std::sync::Arc;

use super::ast::UnaryOp;
use super::bound::*;
use super::host::{Fault, HostContext};
use super::types::Type;
use super::value::{ExceptionKind, ExceptionValue, ListRef, Value};

/// Deepest allowed nesting of user function calls.
const MAX_CALL_DEPTH: usize = 100;

const DIVIDE_BY_ZERO: &str = "Attempted to divide by zero.";
const OVERFLOW: &str = "Arithmetic operation resulted in an overflow.";
const NULL_REFERENCE: &str = "Object reference not set to an instance of an object.";
const INDEX_RANGE: &str =
    "Index was out of range. Must be non-negative and less than the size of the collection. (Parameter 'index')";
const STACK_EXHAUSTED: &str = "Insufficient execution stack to continue the execution of the program.";

type Exec<T> = Result<T, Fault>;

/// Control flow out of a statement.
#[derive(Debug)]
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Execution state of one submission: the working copy of the session's
/// variable slots plus the function table.
pub struct Machine<'a> {
    globals: Vec<Value>,
    functions: Vec<Arc<Function>>,
    host: &'a HostContext,
    depth: usize,
}

impl<'a> Machine<'a> {
    pub fn new(globals: Vec<Value>, functions: Vec<Arc<Function>>, host: &'a HostContext) -> Self {
        Self {
            globals,
            functions,
            host,
            depth: 0,
        }
    }

    /// Run the submission body and evaluate its trailing expression.
    ///
    /// Returns the submission's value (`None` when it has no trailing
    /// expression or the expression is `void`).
    pub fn run(&mut self, submission: &BoundSubmission) -> Exec<Option<Value>> {
        let mut frame = vec![Value::Null; submission.frame_size];
        for stmt in &submission.body {
            self.exec(stmt, &mut frame)?;
        }
        match &submission.result {
            Some(expr) => {
                let value = self.eval(expr, &mut frame)?;
                Ok((expr.ty != Type::Void).then_some(value))
            }
            None => Ok(None),
        }
    }

    /// The variable slots after the run.
    pub fn into_globals(self) -> Vec<Value> {
        self.globals
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn exec_loop_body(&mut self, body: &BStmt, frame: &mut [Value]) -> Exec<Option<Flow>> {
        Ok(match self.exec(body, frame)? {
            Flow::Break => Some(Flow::Normal),
            Flow::Return(value) => Some(Flow::Return(value)),
            Flow::Normal | Flow::Continue => None,
        })
    }

    fn exec(&mut self, stmt: &BStmt, frame: &mut [Value]) -> Exec<Flow> {
        match stmt {
            BStmt::Expr(expr) => {
                self.eval(expr, frame)?;
            }
            BStmt::InitLocal { slot, value } => {
                frame[*slot] = self.eval(value, frame)?;
            }
            BStmt::InitGlobal { slot, value } => {
                self.globals[*slot] = self.eval(value, frame)?;
            }
            BStmt::Block(stmts) => {
                for stmt in stmts {
                    let flow = self.exec(stmt, frame)?;
                    if !matches!(flow, Flow::Normal) {
                        return Ok(flow);
                    }
                }
            }
            BStmt::If { cond, then, els } => {
                if self.eval_bool(cond, frame)? {
                    return self.exec(then, frame);
                } else if let Some(els) = els {
                    return self.exec(els, frame);
                }
            }
            BStmt::While { cond, body } => loop {
                self.host.check()?;
                if !self.eval_bool(cond, frame)? {
                    break;
                }
                if let Some(flow) = self.exec_loop_body(body, frame)? {
                    return Ok(flow);
                }
            },
            BStmt::For {
                init,
                cond,
                step,
                body,
            } => {
                if let Some(init) = init {
                    self.exec(init, frame)?;
                }
                loop {
                    self.host.check()?;
                    if let Some(cond) = cond {
                        if !self.eval_bool(cond, frame)? {
                            break;
                        }
                    }
                    if let Some(flow) = self.exec_loop_body(body, frame)? {
                        return Ok(flow);
                    }
                    for expr in step {
                        self.eval(expr, frame)?;
                    }
                }
            }
            BStmt::Foreach {
                slot,
                ty,
                iter,
                body,
            } => {
                let items = match self.eval(iter, frame)? {
                    Value::List(list) => list.snapshot(),
                    Value::Str(s) => s.chars().map(|c| Value::str(c.to_string())).collect(),
                    Value::Null => return Err(Fault::single(NULL_REFERENCE)),
                    other => return Err(invalid_operand(&other)),
                };
                for item in items {
                    self.host.check()?;
                    frame[*slot] = convert_value(item, ty);
                    if let Some(flow) = self.exec_loop_body(body, frame)? {
                        return Ok(flow);
                    }
                }
            }
            BStmt::Break => return Ok(Flow::Break),
            BStmt::Continue => return Ok(Flow::Continue),
            BStmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, frame)?,
                    None => Value::Null,
                };
                return Ok(Flow::Return(value));
            }
            BStmt::Throw(expr) => {
                return Err(match self.eval(expr, frame)? {
                    Value::Exception(exception) => Fault::from_exception(&exception),
                    _ => Fault::single(NULL_REFERENCE),
                });
            }
        }
        Ok(Flow::Normal)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn eval_bool(&mut self, expr: &BExpr, frame: &mut [Value]) -> Exec<bool> {
        let value = self.eval(expr, frame)?;
        value.as_bool().ok_or_else(|| invalid_operand(&value))
    }

    fn eval_all(&mut self, exprs: &[BExpr], frame: &mut [Value]) -> Exec<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e, frame)).collect()
    }

    fn eval(&mut self, expr: &BExpr, frame: &mut [Value]) -> Exec<Value> {
        match &expr.kind {
            BExprKind::Const(value) => Ok(value.clone()),
            BExprKind::Local(slot) => Ok(frame[*slot].clone()),
            BExprKind::Global(slot) => Ok(self.globals[*slot].clone()),
            BExprKind::Property(property) => Ok((property.get)()),
            BExprKind::HostCall { method, args } => {
                let args = self.eval_all(args, frame)?;
                (method.func)(self.host, &args)
            }
            BExprKind::UserCall { function, args } => {
                let args = self.eval_all(args, frame)?;
                self.call(*function, args)
            }
            BExprKind::Intrinsic { op, target, args } => {
                let target = self.eval(target, frame)?;
                let args = self.eval_all(args, frame)?;
                intrinsic(*op, target, &args)
            }
            BExprKind::Index { target, index } => {
                let target = self.eval(target, frame)?;
                let index = self.eval(index, frame)?;
                index_get(&target, &index)
            }
            BExprKind::NewList => Ok(Value::List(ListRef::new(Vec::new()))),
            BExprKind::NewException {
                kind,
                message,
                inner,
            } => {
                let message = match message {
                    Some(message) => match self.eval(message, frame)? {
                        Value::Null => None,
                        value => Some(value.to_string()),
                    },
                    None => None,
                };
                let mut exceptions = Vec::with_capacity(inner.len());
                for expr in inner {
                    match self.eval(expr, frame)? {
                        Value::Exception(e) => exceptions.push(e),
                        _ => {
                            return Err(Fault::single(
                                "An element of innerExceptions was null. (Parameter 'innerExceptions')",
                            ));
                        }
                    }
                }
                let exception = match kind {
                    ExceptionKind::Exception => ExceptionValue::new(
                        message.unwrap_or_else(|| ExceptionValue::DEFAULT_MESSAGE.to_string()),
                    ),
                    ExceptionKind::Aggregate => ExceptionValue::aggregate(message, exceptions),
                };
                Ok(Value::Exception(Arc::new(exception)))
            }
            BExprKind::Unary { op, operand } => {
                let value = self.eval(operand, frame)?;
                unary(*op, value)
            }
            BExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs, frame)?;
                let rhs = self.eval(rhs, frame)?;
                binary(*op, &lhs, &rhs)
            }
            BExprKind::And(lhs, rhs) => {
                Ok(Value::Bool(self.eval_bool(lhs, frame)? && self.eval_bool(rhs, frame)?))
            }
            BExprKind::Or(lhs, rhs) => {
                Ok(Value::Bool(self.eval_bool(lhs, frame)? || self.eval_bool(rhs, frame)?))
            }
            BExprKind::Conditional { cond, then, els } => {
                if self.eval_bool(cond, frame)? {
                    self.eval(then, frame)
                } else {
                    self.eval(els, frame)
                }
            }
            BExprKind::Assign { place, op, value } => {
                let location = self.locate(place, frame)?;
                let rhs = self.eval(value, frame)?;
                let new = match op {
                    Some(op) => binary(*op, &self.read(&location, frame)?, &rhs)?,
                    None => rhs,
                };
                let new = convert_value(new, &expr.ty);
                self.write(&location, frame, new.clone())?;
                Ok(new)
            }
            BExprKind::IncDec {
                place,
                increment,
                prefix,
            } => {
                let location = self.locate(place, frame)?;
                let old = self.read(&location, frame)?;
                let new = match &old {
                    Value::Int(v) => {
                        let delta = if *increment { 1 } else { -1 };
                        Value::Int(v.checked_add(delta).ok_or_else(|| Fault::single(OVERFLOW))?)
                    }
                    Value::Double(v) => Value::Double(if *increment { v + 1.0 } else { v - 1.0 }),
                    other => return Err(invalid_operand(other)),
                };
                self.write(&location, frame, new.clone())?;
                Ok(if *prefix { new } else { old })
            }
            BExprKind::Convert(inner) => {
                let value = self.eval(inner, frame)?;
                Ok(convert_value(value, &expr.ty))
            }
        }
    }

    fn call(&mut self, slot: usize, args: Vec<Value>) -> Exec<Value> {
        self.host.check()?;
        if self.depth >= MAX_CALL_DEPTH {
            return Err(Fault::single(STACK_EXHAUSTED));
        }
        let function = self.functions[slot].clone();
        let mut frame = vec![Value::Null; function.frame_size.max(args.len())];
        for (local, arg) in frame.iter_mut().zip(args) {
            *local = arg;
        }

        self.depth += 1;
        let mut result = Ok(Value::Null);
        for stmt in &function.body {
            match self.exec(stmt, &mut frame) {
                Ok(Flow::Return(value)) => {
                    result = Ok(value);
                    break;
                }
                Ok(_) => {}
                Err(fault) => {
                    result = Err(fault);
                    break;
                }
            }
        }
        self.depth -= 1;
        result
    }

    // ------------------------------------------------------------------
    // Places
    // ------------------------------------------------------------------

    fn locate(&mut self, place: &Place, frame: &mut [Value]) -> Exec<Location> {
        Ok(match place {
            Place::Local(slot) => Location::Local(*slot),
            Place::Global(slot) => Location::Global(*slot),
            Place::Element { list, index } => {
                let list = match self.eval(list, frame)? {
                    Value::List(list) => list,
                    Value::Null => return Err(Fault::single(NULL_REFERENCE)),
                    other => return Err(invalid_operand(&other)),
                };
                let index = self.eval(index, frame)?.as_int().unwrap_or(-1);
                Location::Element(list, index)
            }
        })
    }

    fn read(&self, location: &Location, frame: &[Value]) -> Exec<Value> {
        match location {
            Location::Local(slot) => Ok(frame[*slot].clone()),
            Location::Global(slot) => Ok(self.globals[*slot].clone()),
            Location::Element(list, index) => {
                let items = list.lock();
                element_index(*index, items.len()).map(|i| items[i].clone())
            }
        }
    }

    fn write(&mut self, location: &Location, frame: &mut [Value], value: Value) -> Exec<()> {
        match location {
            Location::Local(slot) => frame[*slot] = value,
            Location::Global(slot) => self.globals[*slot] = value,
            Location::Element(list, index) => {
                let mut items = list.lock();
                let i = element_index(*index, items.len())?;
                items[i] = value;
            }
        }
        Ok(())
    }
}

/// A place after its list and index have been evaluated.
enum Location {
    Local(usize),
    Global(usize),
    Element(ListRef, i64),
}

fn element_index(index: i64, len: usize) -> Exec<usize> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < len)
        .ok_or_else(|| Fault::single(INDEX_RANGE))
}

fn invalid_operand(value: &Value) -> Fault {
    Fault::single(format!(
        "Operation is not valid for a value of type '{}'.",
        value.type_name()
    ))
}

/// Apply an implicit conversion to a runtime value.
fn convert_value(value: Value, ty: &Type) -> Value {
    match (value, ty) {
        (Value::Int(v), Type::Double) => Value::Double(v as f64),
        (value, _) => value,
    }
}

fn int_operands(lhs: &Value, rhs: &Value) -> Exec<(i64, i64)> {
    let a = lhs.as_int().ok_or_else(|| invalid_operand(lhs))?;
    let b = rhs.as_int().ok_or_else(|| invalid_operand(rhs))?;
    Ok((a, b))
}

fn double_operands(lhs: &Value, rhs: &Value) -> Exec<(f64, f64)> {
    let a = lhs.as_double().ok_or_else(|| invalid_operand(lhs))?;
    let b = rhs.as_double().ok_or_else(|| invalid_operand(rhs))?;
    Ok((a, b))
}

fn binary(op: BinaryKind, lhs: &Value, rhs: &Value) -> Exec<Value> {
    match op {
        BinaryKind::Int(op) => {
            let (a, b) = int_operands(lhs, rhs)?;
            if matches!(op, ArithOp::Div | ArithOp::Rem) && b == 0 {
                return Err(Fault::single(DIVIDE_BY_ZERO));
            }
            let result = match op {
                ArithOp::Add => a.checked_add(b),
                ArithOp::Sub => a.checked_sub(b),
                ArithOp::Mul => a.checked_mul(b),
                ArithOp::Div => a.checked_div(b),
                ArithOp::Rem => a.checked_rem(b),
            };
            result.map(Value::Int).ok_or_else(|| Fault::single(OVERFLOW))
        }
        BinaryKind::Double(op) => {
            let (a, b) = double_operands(lhs, rhs)?;
            Ok(Value::Double(match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
                ArithOp::Rem => a % b,
            }))
        }
        BinaryKind::Concat => Ok(Value::str(format!("{lhs}{rhs}"))),
        BinaryKind::Compare(op) => {
            let result = if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
                match op {
                    CompareOp::Lt => a < b,
                    CompareOp::Le => a <= b,
                    CompareOp::Gt => a > b,
                    CompareOp::Ge => a >= b,
                }
            } else {
                let (a, b) = double_operands(lhs, rhs)?;
                match op {
                    CompareOp::Lt => a < b,
                    CompareOp::Le => a <= b,
                    CompareOp::Gt => a > b,
                    CompareOp::Ge => a >= b,
                }
            };
            Ok(Value::Bool(result))
        }
        BinaryKind::Equal => Ok(Value::Bool(lhs.runtime_eq(rhs))),
        BinaryKind::NotEqual => Ok(Value::Bool(!lhs.runtime_eq(rhs))),
    }
}

fn unary(op: UnaryOp, value: Value) -> Exec<Value> {
    match (op, value) {
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Neg, Value::Int(v)) => v
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| Fault::single(OVERFLOW)),
        (UnaryOp::Neg, Value::Double(v)) => Ok(Value::Double(-v)),
        (UnaryOp::Plus, value @ (Value::Int(_) | Value::Double(_))) => Ok(value),
        (_, other) => Err(invalid_operand(&other)),
    }
}

fn index_get(target: &Value, index: &Value) -> Exec<Value> {
    let index = index.as_int().ok_or_else(|| invalid_operand(index))?;
    match target {
        Value::List(list) => {
            let items = list.lock();
            element_index(index, items.len()).map(|i| items[i].clone())
        }
        Value::Str(s) => usize::try_from(index)
            .ok()
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::str(c.to_string()))
            .ok_or_else(|| Fault::single("Index was outside the bounds of the array.")),
        Value::Null => Err(Fault::single(NULL_REFERENCE)),
        other => Err(invalid_operand(other)),
    }
}

fn string_arg(args: &[Value], i: usize, name: &str) -> Exec<String> {
    match args.get(i) {
        Some(Value::Str(s)) => Ok(s.to_string()),
        _ => Err(Fault::single(format!(
            "Value cannot be null. (Parameter '{name}')"
        ))),
    }
}

fn int_arg(args: &[Value], i: usize) -> i64 {
    args.get(i).and_then(Value::as_int).unwrap_or_default()
}

fn intrinsic(op: Intrinsic, target: Value, args: &[Value]) -> Exec<Value> {
    if target.is_null() {
        return Err(Fault::single(NULL_REFERENCE));
    }
    if op == Intrinsic::ToString {
        return Ok(Value::str(target.to_string()));
    }
    match target {
        Value::Str(s) => string_intrinsic(op, &s, args),
        Value::List(list) => list_intrinsic(op, &list, args),
        Value::Exception(e) if op == Intrinsic::ExceptionMessage => Ok(Value::str(&e.message)),
        other => Err(invalid_operand(&other)),
    }
}

fn string_intrinsic(op: Intrinsic, s: &str, args: &[Value]) -> Exec<Value> {
    Ok(match op {
        Intrinsic::StrLength => Value::Int(s.chars().count() as i64),
        Intrinsic::StrToUpper => Value::str(s.to_uppercase()),
        Intrinsic::StrToLower => Value::str(s.to_lowercase()),
        Intrinsic::StrTrim => Value::str(s.trim()),
        Intrinsic::StrContains => Value::Bool(s.contains(&string_arg(args, 0, "value")?)),
        Intrinsic::StrStartsWith => Value::Bool(s.starts_with(&string_arg(args, 0, "value")?)),
        Intrinsic::StrEndsWith => Value::Bool(s.ends_with(&string_arg(args, 0, "value")?)),
        Intrinsic::StrIndexOf => {
            let needle = string_arg(args, 0, "value")?;
            let index = s
                .find(&needle)
                .map(|byte| s[..byte].chars().count() as i64)
                .unwrap_or(-1);
            Value::Int(index)
        }
        Intrinsic::StrSubstring => {
            let chars: Vec<char> = s.chars().collect();
            let start = int_arg(args, 0);
            let start = usize::try_from(start)
                .ok()
                .filter(|&i| i <= chars.len())
                .ok_or_else(|| {
                    Fault::single(
                        "startIndex cannot be larger than length of string. (Parameter 'startIndex')",
                    )
                })?;
            let end = if args.len() > 1 {
                usize::try_from(int_arg(args, 1))
                    .ok()
                    .and_then(|len| start.checked_add(len))
                    .filter(|&end| end <= chars.len())
                    .ok_or_else(|| {
                        Fault::single(
                            "Index and length must refer to a location within the string. (Parameter 'length')",
                        )
                    })?
            } else {
                chars.len()
            };
            Value::str(chars[start..end].iter().collect::<String>())
        }
        Intrinsic::StrReplace => {
            let old = string_arg(args, 0, "oldValue")?;
            if old.is_empty() {
                return Err(Fault::single(
                    "String cannot be of zero length. (Parameter 'oldValue')",
                ));
            }
            let new = args
                .get(1)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Value::str(s.replace(&old, &new))
        }
        _ => return Err(invalid_operand(&Value::str(s))),
    })
}

fn list_intrinsic(op: Intrinsic, list: &ListRef, args: &[Value]) -> Exec<Value> {
    let mut items = list.lock();
    Ok(match op {
        Intrinsic::ListCount => Value::Int(items.len() as i64),
        Intrinsic::ListAdd => {
            items.push(args.first().cloned().unwrap_or_default());
            Value::Null
        }
        Intrinsic::ListClear => {
            items.clear();
            Value::Null
        }
        Intrinsic::ListContains => {
            let needle = args.first().cloned().unwrap_or_default();
            Value::Bool(items.iter().any(|item| item.runtime_eq(&needle)))
        }
        Intrinsic::ListRemoveAt => {
            let i = element_index(int_arg(args, 0), items.len())?;
            items.remove(i);
            Value::Null
        }
        _ => {
            drop(items);
            return Err(invalid_operand(&Value::List(list.clone())));
        }
    })
}
