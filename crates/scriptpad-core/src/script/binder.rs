//! Name resolution and type checking.
//!
//! The binder walks a parsed submission against the prior session state and
//! produces a [`BoundSubmission`]. Every binding error of the submission is
//! collected; an expression that fails to bind yields `None` and its parents
//! stay silent, so each mistake is reported once.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use super::ast::*;
use super::bound::*;
use super::diagnostic::{Diagnostic, Pos};
use super::library::{self, HostMethod, HostType, Namespace, Params, TypeKind};
use super::types::Type;
use super::value::{ExceptionKind, Value};
use crate::state::{Import, SessionState};

/// Bind a submission against the prior state.
///
/// `base_references` is the engine's configured reference set; it is used
/// as-is for the first submission and merged into the state's set after.
pub fn bind(
    submission: &Submission,
    prior: Option<&SessionState>,
    base_references: &[String],
) -> Result<BoundSubmission, Vec<Diagnostic>> {
    let mut binder = Binder::new(prior, base_references);

    for item in &submission.items {
        match item {
            Item::Reference { name, pos } => binder.add_reference(name, *pos),
            Item::Using {
                path,
                is_static,
                pos,
            } => binder.add_import(path, *is_static, *pos),
            _ => {}
        }
    }

    let mut declared_functions = Vec::new();
    for item in &submission.items {
        if let Item::Function(decl) = item {
            if let Some(sig) = binder.declare_function(decl) {
                declared_functions.push((decl, sig));
            }
        }
    }

    let mut body = Vec::new();
    let mut result = None;
    for item in &submission.items {
        match item {
            Item::Stmt(stmt) => binder.bind_top_level(stmt, &mut body),
            Item::Trailing(expr) => result = binder.bind_expr(expr),
            _ => {}
        }
    }
    let frame_size = binder.frame.next_slot;

    // Bodies last: they see every variable of the submission.
    let mut functions = Vec::new();
    for (decl, sig) in declared_functions {
        if let Some(function) = binder.bind_function(decl, sig) {
            functions.push(Arc::new(function));
        }
    }

    if !binder.diagnostics.is_empty() {
        let mut diagnostics = binder.diagnostics;
        diagnostics.sort_by_key(|d| (d.pos.file, d.pos.line, d.pos.col));
        return Err(diagnostics);
    }

    Ok(BoundSubmission {
        references: binder.references,
        imports: binder.imports,
        globals: binder.new_globals,
        functions,
        body,
        result,
        frame_size,
    })
}

#[derive(Debug, Clone)]
struct GlobalRef {
    slot: usize,
    ty: Type,
    /// The declaration failed to bind; uses stay silent.
    poisoned: bool,
}

#[derive(Debug, Clone)]
struct FnSig {
    slot: usize,
    params: Vec<Type>,
    ret: Type,
    poisoned: bool,
}

#[derive(Debug, Clone)]
struct LocalVar {
    slot: usize,
    ty: Type,
    poisoned: bool,
}

/// Local variable frame of the top level or of one function body.
#[derive(Debug, Default)]
struct Frame {
    scopes: Vec<FxHashMap<String, LocalVar>>,
    next_slot: usize,
    loops: usize,
    /// Signature and return type of the enclosing function.
    function: Option<(String, Type)>,
}

impl Frame {
    fn lookup(&self, name: &str) -> Option<&LocalVar> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }
}

/// Outcome of binding one declarator.
struct DeclaredVar {
    ty: Type,
    init: Option<BExpr>,
    poisoned: bool,
}

struct Binder {
    references: Vec<String>,
    imports: Vec<Import>,
    globals: FxHashMap<String, GlobalRef>,
    global_base: usize,
    new_globals: Vec<GlobalDecl>,
    functions: FxHashMap<String, FnSig>,
    function_base: usize,
    function_count: usize,
    /// Names declared by this submission.
    declared: FxHashSet<String>,
    frame: Frame,
    diagnostics: Vec<Diagnostic>,
}

impl Binder {
    fn new(prior: Option<&SessionState>, base_references: &[String]) -> Self {
        let mut references: Vec<String> = prior
            .map(|state| state.references.clone())
            .unwrap_or_default();
        for name in base_references {
            if !references.contains(name) {
                references.push(name.clone());
            }
        }

        let mut globals = FxHashMap::default();
        let mut functions = FxHashMap::default();
        let (mut global_base, mut function_base) = (0, 0);
        let mut imports = Vec::new();
        if let Some(state) = prior {
            for (name, &slot) in &state.variable_names {
                let ty = state.variables[slot].ty.clone();
                globals.insert(
                    name.clone(),
                    GlobalRef {
                        slot,
                        ty,
                        poisoned: false,
                    },
                );
            }
            for (name, &slot) in &state.function_names {
                let function = &state.functions[slot];
                functions.insert(
                    name.clone(),
                    FnSig {
                        slot,
                        params: function.params.iter().map(|(_, t)| t.clone()).collect(),
                        ret: function.ret.clone(),
                        poisoned: false,
                    },
                );
            }
            global_base = state.slot_count();
            function_base = state.function_table().len();
            imports = state.imports.clone();
        }

        Self {
            references,
            imports,
            globals,
            global_base,
            new_globals: Vec::new(),
            functions,
            function_base,
            function_count: 0,
            declared: FxHashSet::default(),
            frame: Frame::default(),
            diagnostics: Vec::new(),
        }
    }

    fn error(&mut self, code: &'static str, message: impl Into<String>, pos: Pos) {
        self.diagnostics.push(Diagnostic::new(code, message, pos));
    }

    // ------------------------------------------------------------------
    // References, imports and type lookup
    // ------------------------------------------------------------------

    fn add_reference(&mut self, name: &str, pos: Pos) {
        if library::library(name).is_none() {
            self.error(
                "SP0006",
                format!("Metadata file '{name}' could not be found"),
                pos,
            );
        } else if !self.references.iter().any(|r| r == name) {
            self.references.push(name.to_string());
        }
    }

    fn namespace(&self, name: &str) -> Option<&'static Namespace> {
        library::namespaces(self.references.iter().map(String::as_str)).find(|ns| ns.name == name)
    }

    fn add_import(&mut self, path: &[String], is_static: bool, pos: Pos) {
        let full = path.join(".");
        let import = if is_static {
            if self.qualified_type(path).is_none() {
                self.type_not_found(&full, pos);
                return;
            }
            Import::Static(full)
        } else if self.namespace(&full).is_some() {
            Import::Namespace(full)
        } else {
            if self.qualified_type(path).is_some() {
                self.error(
                    "SP0138",
                    format!(
                        "A 'using namespace' directive can only be applied to namespaces; '{full}' \
                         is a type not a namespace. Consider a 'using static' directive instead"
                    ),
                    pos,
                );
            } else {
                self.type_not_found(&full, pos);
            }
            return;
        };
        if !self.imports.contains(&import) {
            self.imports.push(import);
        }
    }

    fn type_not_found(&mut self, name: &str, pos: Pos) {
        self.error(
            "SP0246",
            format!(
                "The type or namespace name '{name}' could not be found (are you missing a \
                 using directive or an assembly reference?)"
            ),
            pos,
        );
    }

    /// A host type named by a fully qualified path.
    fn qualified_type(&self, path: &[String]) -> Option<&'static HostType> {
        let (name, ns) = path.split_last()?;
        if ns.is_empty() {
            return None;
        }
        self.namespace(&ns.join("."))?.find_type(name)
    }

    /// A host type named by a simple name (through imported namespaces) or
    /// by a qualified path.
    fn host_type(&self, path: &[String]) -> Option<&'static HostType> {
        if let [name] = path {
            self.imports.iter().find_map(|import| match import {
                Import::Namespace(ns) => self.namespace(ns)?.find_type(name),
                Import::Static(_) => None,
            })
        } else {
            self.qualified_type(path)
        }
    }

    /// Types brought in by `using static`.
    fn static_imports(&self) -> Vec<&'static HostType> {
        self.imports
            .iter()
            .filter_map(|import| match import {
                Import::Static(full) => {
                    let path: Vec<String> = full.split('.').map(str::to_string).collect();
                    self.qualified_type(&path)
                }
                Import::Namespace(_) => None,
            })
            .collect()
    }

    fn resolve_type(&mut self, ty: &TypeName, allow_void: bool) -> Option<Type> {
        if let ([name], []) = (ty.path.as_slice(), ty.args.as_slice()) {
            let builtin = match name.as_str() {
                "int" | "long" => Some(Type::Int),
                "double" | "float" => Some(Type::Double),
                "bool" => Some(Type::Bool),
                "string" => Some(Type::String),
                "object" => Some(Type::Object),
                "void" if allow_void => Some(Type::Void),
                "void" => {
                    self.error(
                        "SP1547",
                        "Keyword 'void' cannot be used in this context",
                        ty.pos,
                    );
                    return None;
                }
                _ => None,
            };
            if builtin.is_some() {
                return builtin;
            }
        }

        let Some(host) = self.host_type(&ty.path) else {
            self.type_not_found(&ty.to_string(), ty.pos);
            return None;
        };
        if ty.args.len() != host.arity() {
            if host.arity() == 0 {
                self.error(
                    "SP0308",
                    format!(
                        "The non-generic type '{}' cannot be used with type arguments",
                        host.name
                    ),
                    ty.pos,
                );
            } else {
                self.error(
                    "SP0305",
                    format!(
                        "Using the generic type '{}<T>' requires {} type arguments",
                        host.name,
                        host.arity()
                    ),
                    ty.pos,
                );
            }
            return None;
        }
        match host.kind {
            TypeKind::Static => {
                self.error(
                    "SP0723",
                    format!("Cannot declare a variable of static type '{}'", host.name),
                    ty.pos,
                );
                None
            }
            TypeKind::List => {
                let element = self.resolve_type(&ty.args[0], false)?;
                Some(Type::list_of(element))
            }
            TypeKind::Exception => Some(Type::Exception),
            TypeKind::AggregateException => Some(Type::AggregateException),
        }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn declare_function(&mut self, decl: &FunctionDecl) -> Option<FnSig> {
        if !self.declared.insert(decl.name.clone()) {
            self.error(
                "SP0111",
                format!("The submission already defines a member called '{}'", decl.name),
                decl.pos,
            );
            return None;
        }

        let ret = self.resolve_type(&decl.ret, true);
        let mut params = Vec::new();
        let mut poisoned = ret.is_none();
        let mut seen = FxHashSet::default();
        for param in &decl.params {
            if !seen.insert(param.name.as_str()) {
                self.error(
                    "SP0100",
                    format!("The parameter name '{}' is a duplicate", param.name),
                    param.pos,
                );
                poisoned = true;
            }
            match self.resolve_type(&param.ty, false) {
                Some(ty) => params.push(ty),
                None => {
                    poisoned = true;
                    params.push(Type::Object);
                }
            }
        }

        let sig = FnSig {
            slot: self.function_base + self.function_count,
            params,
            ret: ret.unwrap_or(Type::Object),
            poisoned,
        };
        self.function_count += 1;
        self.functions.insert(decl.name.clone(), sig.clone());
        Some(sig)
    }

    fn bind_function(&mut self, decl: &FunctionDecl, sig: FnSig) -> Option<Function> {
        let signature = Function::signature(&decl.name, &sig.params);
        let outer = std::mem::replace(
            &mut self.frame,
            Frame {
                function: Some((signature.clone(), sig.ret.clone())),
                ..Frame::default()
            },
        );

        let mut params_scope = FxHashMap::default();
        for (i, (param, ty)) in decl.params.iter().zip(&sig.params).enumerate() {
            params_scope.insert(
                param.name.clone(),
                LocalVar {
                    slot: i,
                    ty: ty.clone(),
                    poisoned: sig.poisoned,
                },
            );
        }
        self.frame.next_slot = decl.params.len();
        self.frame.scopes.push(params_scope);

        let body = self.bind_block(&decl.body);

        if sig.ret != Type::Void && !sig.poisoned && !always_exits(&decl.body) {
            self.error(
                "SP0161",
                format!("'{signature}': not all code paths return a value"),
                decl.pos,
            );
        }

        let frame = std::mem::replace(&mut self.frame, outer);
        if sig.poisoned {
            return None;
        }
        Some(Function {
            name: decl.name.clone(),
            params: decl
                .params
                .iter()
                .map(|p| p.name.clone())
                .zip(sig.params)
                .collect(),
            ret: sig.ret,
            body: body?,
            frame_size: frame.next_slot,
        })
    }

    fn bind_declarator(&mut self, ty: &DeclType, named: Option<&Type>, d: &Declarator) -> DeclaredVar {
        let init = d.init.as_ref().map(|e| (self.bind_expr(e), e.pos));
        match ty {
            DeclType::Var(_) => {
                let Some((init, pos)) = init else {
                    self.error(
                        "SP0818",
                        "Implicitly-typed variables must be initialized",
                        d.pos,
                    );
                    return DeclaredVar {
                        ty: Type::Object,
                        init: None,
                        poisoned: true,
                    };
                };
                let Some(init) = init else {
                    return DeclaredVar {
                        ty: Type::Object,
                        init: None,
                        poisoned: true,
                    };
                };
                if matches!(init.ty, Type::Null | Type::Void) {
                    self.error(
                        "SP0815",
                        format!("Cannot assign {} to an implicitly-typed variable", init.ty),
                        pos,
                    );
                    return DeclaredVar {
                        ty: Type::Object,
                        init: None,
                        poisoned: true,
                    };
                }
                DeclaredVar {
                    ty: init.ty.clone(),
                    init: Some(init),
                    poisoned: false,
                }
            }
            DeclType::Named(_) => {
                let Some(target) = named else {
                    return DeclaredVar {
                        ty: Type::Object,
                        init: None,
                        poisoned: true,
                    };
                };
                let init = match init {
                    Some((Some(value), pos)) => self.coerce(value, target, pos),
                    Some((None, _)) => None,
                    None => Some(BExpr::constant(Value::default_for(target), target.clone())),
                };
                DeclaredVar {
                    ty: target.clone(),
                    init,
                    poisoned: false,
                }
            }
        }
    }

    /// Resolve the declared type of a `VarDecl`; `Err(())` means an
    /// error was reported.
    fn decl_type(&mut self, ty: &DeclType, count: usize) -> Result<Option<Type>, ()> {
        match ty {
            DeclType::Var(pos) => {
                if count > 1 {
                    self.error(
                        "SP0819",
                        "Implicitly-typed variables cannot have multiple declarators",
                        *pos,
                    );
                    return Err(());
                }
                Ok(None)
            }
            DeclType::Named(name) => self.resolve_type(name, false).map(Some).ok_or(()),
        }
    }

    fn bind_top_level(&mut self, stmt: &Stmt, out: &mut Vec<BStmt>) {
        let Stmt::VarDecl { ty, declarators } = stmt else {
            if let Some(bound) = self.bind_stmt(stmt) {
                out.push(bound);
            }
            return;
        };

        let named = self.decl_type(ty, declarators.len());
        for d in declarators {
            let declared = match &named {
                Ok(named) => self.bind_declarator(ty, named.as_ref(), d),
                Err(()) => {
                    if let Some(init) = &d.init {
                        self.bind_expr(init);
                    }
                    DeclaredVar {
                        ty: Type::Object,
                        init: None,
                        poisoned: true,
                    }
                }
            };

            if !self.declared.insert(d.name.clone()) {
                self.error(
                    "SP0102",
                    format!("The submission already contains a definition for '{}'", d.name),
                    d.pos,
                );
                continue;
            }
            let slot = self.global_base + self.new_globals.len();
            self.new_globals.push(GlobalDecl {
                name: d.name.clone(),
                ty: declared.ty.clone(),
            });
            self.globals.insert(
                d.name.clone(),
                GlobalRef {
                    slot,
                    ty: declared.ty,
                    poisoned: declared.poisoned,
                },
            );
            if let Some(value) = declared.init {
                out.push(BStmt::InitGlobal { slot, value });
            }
        }
    }

    fn declare_local(&mut self, name: &str, ty: Type, poisoned: bool, pos: Pos) -> usize {
        if self.frame.lookup(name).is_some() {
            self.error(
                "SP0128",
                format!("A local variable or parameter named '{name}' is already defined in this scope"),
                pos,
            );
        }
        let slot = self.frame.next_slot;
        self.frame.next_slot += 1;
        if self.frame.scopes.is_empty() {
            self.frame.scopes.push(FxHashMap::default());
        }
        if let Some(scope) = self.frame.scopes.last_mut() {
            scope.insert(name.to_string(), LocalVar { slot, ty, poisoned });
        }
        slot
    }

    fn bind_local_decl(&mut self, ty: &DeclType, declarators: &[Declarator]) -> Option<BStmt> {
        let named = self.decl_type(ty, declarators.len());
        let mut inits = Vec::new();
        let mut ok = named.is_ok();
        for d in declarators {
            let declared = match &named {
                Ok(named) => self.bind_declarator(ty, named.as_ref(), d),
                Err(()) => {
                    if let Some(init) = &d.init {
                        self.bind_expr(init);
                    }
                    DeclaredVar {
                        ty: Type::Object,
                        init: None,
                        poisoned: true,
                    }
                }
            };
            let slot = self.declare_local(&d.name, declared.ty, declared.poisoned, d.pos);
            match declared.init {
                Some(value) => inits.push(BStmt::InitLocal { slot, value }),
                None => ok = false,
            }
        }
        if !ok {
            return None;
        }
        Some(if inits.len() == 1 {
            inits.remove(0)
        } else {
            BStmt::Block(inits)
        })
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn bind_block(&mut self, stmts: &[Stmt]) -> Option<Vec<BStmt>> {
        self.frame.scopes.push(FxHashMap::default());
        let mut bound = Vec::with_capacity(stmts.len());
        let mut ok = true;
        for stmt in stmts {
            match self.bind_stmt(stmt) {
                Some(stmt) => bound.push(stmt),
                None => ok = false,
            }
        }
        self.frame.scopes.pop();
        ok.then_some(bound)
    }

    fn bind_condition(&mut self, cond: &Expr) -> Option<BExpr> {
        let bound = self.bind_expr(cond)?;
        self.coerce(bound, &Type::Bool, cond.pos)
    }

    fn bind_loop_body(&mut self, body: &Stmt) -> Option<BStmt> {
        self.frame.loops += 1;
        let bound = self.bind_stmt(body);
        self.frame.loops -= 1;
        bound
    }

    fn bind_stmt(&mut self, stmt: &Stmt) -> Option<BStmt> {
        match stmt {
            Stmt::VarDecl { ty, declarators } => self.bind_local_decl(ty, declarators),
            Stmt::Expr(expr) => {
                if !expr.is_statement_expression() {
                    self.error(
                        "SP0201",
                        "Only assignment, call, increment, decrement, and new object expressions \
                         can be used as a statement",
                        expr.pos,
                    );
                    return None;
                }
                self.bind_expr(expr).map(BStmt::Expr)
            }
            Stmt::Block(stmts) => self.bind_block(stmts).map(BStmt::Block),
            Stmt::If { cond, then, els } => {
                let cond = self.bind_condition(cond);
                let then = self.bind_stmt(then);
                let els = els.as_ref().map(|e| self.bind_stmt(e));
                let els = match els {
                    Some(Some(e)) => Some(Box::new(e)),
                    Some(None) => return None,
                    None => None,
                };
                Some(BStmt::If {
                    cond: cond?,
                    then: Box::new(then?),
                    els,
                })
            }
            Stmt::While { cond, body } => {
                let cond = self.bind_condition(cond);
                let body = self.bind_loop_body(body);
                Some(BStmt::While {
                    cond: cond?,
                    body: Box::new(body?),
                })
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                self.frame.scopes.push(FxHashMap::default());
                let bound = self.bind_for(init.as_deref(), cond.as_ref(), step, body);
                self.frame.scopes.pop();
                bound
            }
            Stmt::Foreach {
                ty,
                name,
                iter,
                body,
                pos,
            } => {
                self.frame.scopes.push(FxHashMap::default());
                let bound = self.bind_foreach(ty, name, iter, body, *pos);
                self.frame.scopes.pop();
                bound
            }
            Stmt::Break(pos) | Stmt::Continue(pos) => {
                if self.frame.loops == 0 {
                    self.error(
                        "SP0139",
                        "No enclosing loop out of which to break or continue",
                        *pos,
                    );
                    return None;
                }
                Some(if matches!(stmt, Stmt::Break(_)) {
                    BStmt::Break
                } else {
                    BStmt::Continue
                })
            }
            Stmt::Return(value, pos) => self.bind_return(value.as_ref(), *pos),
            Stmt::Throw(value, pos) => {
                let bound = self.bind_expr(value)?;
                if !(bound.ty.is_exception() || bound.ty == Type::Null) {
                    self.error(
                        "SP0155",
                        "The type caught or thrown must be derived from System.Exception",
                        *pos,
                    );
                    return None;
                }
                Some(BStmt::Throw(bound))
            }
            Stmt::Empty => Some(BStmt::Block(Vec::new())),
        }
    }

    fn bind_for(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        step: &[Expr],
        body: &Stmt,
    ) -> Option<BStmt> {
        let init = match init {
            Some(stmt) => Some(self.bind_stmt(stmt).map(Box::new)),
            None => None,
        };
        let cond = cond.map(|c| self.bind_condition(c));
        let mut steps = Vec::new();
        let mut ok = true;
        for expr in step {
            if !expr.is_statement_expression() {
                self.error(
                    "SP0201",
                    "Only assignment, call, increment, decrement, and new object expressions \
                     can be used as a statement",
                    expr.pos,
                );
                ok = false;
                continue;
            }
            match self.bind_expr(expr) {
                Some(bound) => steps.push(bound),
                None => ok = false,
            }
        }
        let body = self.bind_loop_body(body);

        let init = match init {
            Some(Some(stmt)) => Some(stmt),
            Some(None) => return None,
            None => None,
        };
        let cond = match cond {
            Some(Some(c)) => Some(c),
            Some(None) => return None,
            None => None,
        };
        if !ok {
            return None;
        }
        Some(BStmt::For {
            init,
            cond,
            step: steps,
            body: Box::new(body?),
        })
    }

    fn bind_foreach(
        &mut self,
        ty: &DeclType,
        name: &str,
        iter: &Expr,
        body: &Stmt,
        pos: Pos,
    ) -> Option<BStmt> {
        let bound_iter = self.bind_expr(iter);
        let element = match &bound_iter {
            Some(b) => match &b.ty {
                Type::List(element) => Some((**element).clone()),
                Type::String => Some(Type::String),
                other => {
                    self.error(
                        "SP1579",
                        format!(
                            "foreach statement cannot operate on variables of type '{other}' \
                             because '{other}' does not contain a public instance or extension \
                             definition for 'GetEnumerator'"
                        ),
                        iter.pos,
                    );
                    None
                }
            },
            None => None,
        };

        let var_ty = match ty {
            DeclType::Var(_) => element.clone(),
            DeclType::Named(type_name) => {
                let declared = self.resolve_type(type_name, false);
                if let (Some(declared), Some(element)) = (&declared, &element) {
                    if !element.is_assignable_to(declared) {
                        self.error(
                            "SP0030",
                            format!("Cannot convert type '{element}' to '{declared}'"),
                            type_name.pos,
                        );
                    }
                }
                declared
            }
        };

        let slot = self.declare_local(
            name,
            var_ty.clone().unwrap_or(Type::Object),
            var_ty.is_none(),
            pos,
        );
        let body = self.bind_loop_body(body);
        Some(BStmt::Foreach {
            slot,
            ty: var_ty?,
            iter: bound_iter?,
            body: Box::new(body?),
        })
    }

    fn bind_return(&mut self, value: Option<&Expr>, pos: Pos) -> Option<BStmt> {
        let Some((signature, ret)) = self.frame.function.clone() else {
            self.error(
                "SP8102",
                "A return statement is not allowed at the top level of a submission",
                pos,
            );
            if let Some(value) = value {
                self.bind_expr(value);
            }
            return None;
        };
        match (value, ret == Type::Void) {
            (None, true) => Some(BStmt::Return(None)),
            (Some(value), true) => {
                self.bind_expr(value);
                self.error(
                    "SP0127",
                    format!(
                        "Since '{signature}' returns void, a return keyword must not be \
                         followed by an object expression"
                    ),
                    pos,
                );
                None
            }
            (None, false) => {
                self.error(
                    "SP0126",
                    format!("An object of a type convertible to '{ret}' is required"),
                    pos,
                );
                None
            }
            (Some(value), false) => {
                let bound = self.bind_expr(value)?;
                let bound = self.coerce(bound, &ret, value.pos)?;
                Some(BStmt::Return(Some(bound)))
            }
        }
    }

    // ------------------------------------------------------------------
    // Conversions
    // ------------------------------------------------------------------

    /// Implicitly convert `expr` to `target`, or report why it cannot be.
    fn coerce(&mut self, expr: BExpr, target: &Type, pos: Pos) -> Option<BExpr> {
        if let Some(converted) = convert(expr.clone(), target) {
            return Some(converted);
        }
        if expr.ty == Type::Null {
            self.error(
                "SP0037",
                format!("Cannot convert null to '{target}' because it is a non-nullable value type"),
                pos,
            );
        } else {
            self.error(
                "SP0029",
                format!("Cannot implicitly convert type '{}' to '{target}'", expr.ty),
                pos,
            );
        }
        None
    }

    /// Bind arguments against parameter types, reporting count and type
    /// mismatches for `method`.
    fn bind_args(&mut self, method: &str, params: &[Type], args: &[Expr], pos: Pos) -> Option<Vec<BExpr>> {
        let bound = self.bind_exprs(args)?;
        if bound.len() != params.len() {
            self.error(
                "SP1501",
                format!("No overload for method '{method}' takes {} arguments", args.len()),
                pos,
            );
            return None;
        }
        let mut converted = Vec::with_capacity(bound.len());
        let mut ok = true;
        for (i, (arg, param)) in bound.into_iter().zip(params).enumerate() {
            let from = arg.ty.clone();
            match convert(arg, param) {
                Some(arg) => converted.push(arg),
                None => {
                    self.error(
                        "SP1503",
                        format!("Argument {}: cannot convert from '{from}' to '{param}'", i + 1),
                        args[i].pos,
                    );
                    ok = false;
                }
            }
        }
        ok.then_some(converted)
    }

    fn bind_exprs(&mut self, exprs: &[Expr]) -> Option<Vec<BExpr>> {
        let bound: Vec<Option<BExpr>> = exprs.iter().map(|e| self.bind_expr(e)).collect();
        bound.into_iter().collect()
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn bind_expr(&mut self, expr: &Expr) -> Option<BExpr> {
        let pos = expr.pos;
        match &expr.kind {
            ExprKind::Int(v) => Some(BExpr::constant(Value::Int(*v), Type::Int)),
            ExprKind::Double(v) => Some(BExpr::constant(Value::Double(*v), Type::Double)),
            ExprKind::Str(s) => Some(BExpr::constant(Value::str(s), Type::String)),
            ExprKind::Bool(b) => Some(BExpr::constant(Value::Bool(*b), Type::Bool)),
            ExprKind::Null => Some(BExpr::constant(Value::Null, Type::Null)),
            ExprKind::Name(name) => self.bind_name(name, pos),
            ExprKind::Member { target, name } => self.bind_member(target, name, pos),
            ExprKind::Call { callee, args } => self.bind_call(callee, args, pos),
            ExprKind::Index { target, index } => self.bind_index(target, index),
            ExprKind::New { ty, args } => self.bind_new(ty, args, pos),
            ExprKind::Unary { op, operand } => self.bind_unary(*op, operand, pos),
            ExprKind::Binary { op, lhs, rhs } => self.bind_binary(*op, lhs, rhs, pos),
            ExprKind::Assign { op, target, value } => self.bind_assign(*op, target, value, pos),
            ExprKind::IncDec {
                target,
                increment,
                prefix,
            } => self.bind_incdec(target, *increment, *prefix, pos),
            ExprKind::Conditional { cond, then, els } => {
                let cond = self.bind_condition(cond);
                let then_b = self.bind_expr(then);
                let els_b = self.bind_expr(els);
                let (cond, then_b, els_b) = (cond?, then_b?, els_b?);
                let Some(ty) = Type::common(&then_b.ty, &els_b.ty).filter(|t| *t != Type::Void)
                else {
                    self.error(
                        "SP0173",
                        format!(
                            "Type of conditional expression cannot be determined because there \
                             is no implicit conversion between '{}' and '{}'",
                            then_b.ty, els_b.ty
                        ),
                        pos,
                    );
                    return None;
                };
                let then_b = convert(then_b, &ty)?;
                let els_b = convert(els_b, &ty)?;
                Some(BExpr::new(
                    BExprKind::Conditional {
                        cond: Box::new(cond),
                        then: Box::new(then_b),
                        els: Box::new(els_b),
                    },
                    ty,
                ))
            }
        }
    }

    /// Whether `name` denotes a value (local, variable or imported
    /// property) rather than a type or namespace.
    fn is_value_name(&self, name: &str) -> bool {
        self.frame.lookup(name).is_some()
            || self.globals.contains_key(name)
            || self
                .static_imports()
                .iter()
                .any(|t| t.property(name).is_some())
    }

    fn bind_name(&mut self, name: &str, pos: Pos) -> Option<BExpr> {
        if let Some(local) = self.frame.lookup(name) {
            return (!local.poisoned)
                .then(|| BExpr::new(BExprKind::Local(local.slot), local.ty.clone()));
        }
        if let Some(global) = self.globals.get(name) {
            return (!global.poisoned)
                .then(|| BExpr::new(BExprKind::Global(global.slot), global.ty.clone()));
        }
        if let Some(property) = self
            .static_imports()
            .iter()
            .find_map(|t| t.property(name))
        {
            return Some(BExpr::new(
                BExprKind::Property(property),
                property.ret.resolve(&[]),
            ));
        }
        if self.functions.contains_key(name)
            || self.static_imports().iter().any(|t| t.method(name).is_some())
        {
            self.error(
                "SP0428",
                format!("Cannot convert method group '{name}' to non-delegate type 'object'"),
                pos,
            );
            return None;
        }
        if let Some(host) = self.host_type(&[name.to_string()]) {
            self.error(
                "SP0119",
                format!("'{}' is a type, which is not valid in the given context", host.name),
                pos,
            );
            return None;
        }
        self.unknown_name(name, pos);
        None
    }

    fn unknown_name(&mut self, name: &str, pos: Pos) {
        self.error(
            "SP0103",
            format!("The name '{name}' does not exist in the current context"),
            pos,
        );
    }

    /// If `target` names a host type (`Math`, `System.Console`), return it.
    /// Reports an error and returns `Err` when the path names nothing.
    fn static_target(&mut self, target: &Expr) -> Result<Option<&'static HostType>, ()> {
        let Some(path) = target.dotted_path() else {
            return Ok(None);
        };
        if self.is_value_name(&path[0]) {
            return Ok(None);
        }
        if let Some(host) = self.host_type(&path) {
            return Ok(Some(host));
        }
        if path.len() == 1 {
            // Unknown simple names fall through to value binding, which
            // reports them.
            return Ok(None);
        }
        if self.namespace(&path.join(".")).is_some() || self.namespace(&path[0]).is_some() {
            self.type_not_found(&path.join("."), target.pos);
        } else {
            self.unknown_name(&path[0], target.pos);
        }
        Err(())
    }

    fn no_member(&mut self, owner: &str, name: &str, pos: Pos) {
        self.error(
            "SP0117",
            format!("'{owner}' does not contain a definition for '{name}'"),
            pos,
        );
    }

    fn bind_member(&mut self, target: &Expr, name: &str, pos: Pos) -> Option<BExpr> {
        if let Some(host) = self.static_target(target).ok()? {
            if let Some(property) = host.property(name) {
                return Some(BExpr::new(
                    BExprKind::Property(property),
                    property.ret.resolve(&[]),
                ));
            }
            if host.method(name).is_some() {
                self.error(
                    "SP0428",
                    format!("Cannot convert method group '{name}' to non-delegate type 'object'"),
                    pos,
                );
            } else {
                self.no_member(host.name, name, pos);
            }
            return None;
        }

        let target_b = self.bind_expr(target)?;
        let (op, ty) = match (&target_b.ty, name) {
            (Type::String, "Length") => (Intrinsic::StrLength, Type::Int),
            (Type::List(_), "Count") => (Intrinsic::ListCount, Type::Int),
            (Type::Exception | Type::AggregateException, "Message") => {
                (Intrinsic::ExceptionMessage, Type::String)
            }
            (ty, _) => {
                let owner = ty.to_string();
                self.no_member(&owner, name, pos);
                return None;
            }
        };
        Some(BExpr::new(
            BExprKind::Intrinsic {
                op,
                target: Box::new(target_b),
                args: Vec::new(),
            },
            ty,
        ))
    }

    fn bind_host_call(
        &mut self,
        method: &'static HostMethod,
        args: &[Expr],
        pos: Pos,
    ) -> Option<BExpr> {
        let bound = self.bind_exprs(args)?;
        let accepted = match method.params {
            Params::Fixed(params) => {
                if params.len() != bound.len() {
                    self.error(
                        "SP1501",
                        format!(
                            "No overload for method '{}' takes {} arguments",
                            method.name,
                            bound.len()
                        ),
                        pos,
                    );
                    return None;
                }
                params.to_vec()
            }
            Params::Variadic(param) => vec![param; bound.len()],
        };
        let mut ok = true;
        for (i, (arg, param)) in bound.iter().zip(&accepted).enumerate() {
            if !param.accepts(&arg.ty) {
                self.error(
                    "SP1503",
                    format!(
                        "Argument {}: cannot convert from '{}' to '{}'",
                        i + 1,
                        arg.ty,
                        param.name()
                    ),
                    args[i].pos,
                );
                ok = false;
            }
        }
        if !ok {
            return None;
        }
        let arg_types: Vec<Type> = bound.iter().map(|a| a.ty.clone()).collect();
        Some(BExpr::new(
            BExprKind::HostCall {
                method,
                args: bound,
            },
            method.ret.resolve(&arg_types),
        ))
    }

    fn bind_call(&mut self, callee: &Expr, args: &[Expr], pos: Pos) -> Option<BExpr> {
        match &callee.kind {
            ExprKind::Name(name) => {
                if self.frame.lookup(name).is_some() || self.globals.contains_key(name) {
                    self.error("SP0149", "Method name expected", callee.pos);
                    return None;
                }
                if let Some(sig) = self.functions.get(name).cloned() {
                    let bound = self.bind_args(name, &sig.params, args, pos);
                    if sig.poisoned {
                        return None;
                    }
                    return Some(BExpr::new(
                        BExprKind::UserCall {
                            function: sig.slot,
                            args: bound?,
                        },
                        sig.ret,
                    ));
                }
                if let Some(method) = self
                    .static_imports()
                    .iter()
                    .find_map(|t| t.method(name))
                {
                    return self.bind_host_call(method, args, pos);
                }
                self.bind_exprs(args);
                self.unknown_name(name, callee.pos);
                None
            }
            ExprKind::Member { target, name } => {
                if let Some(host) = self.static_target(target).ok()? {
                    let Some(method) = host.method(name) else {
                        self.no_member(host.name, name, callee.pos);
                        return None;
                    };
                    return self.bind_host_call(method, args, pos);
                }
                let target_b = self.bind_expr(target);
                self.bind_instance_call(target_b?, name, args, pos)
            }
            _ => {
                self.error("SP0149", "Method name expected", callee.pos);
                None
            }
        }
    }

    fn bind_instance_call(
        &mut self,
        target: BExpr,
        name: &str,
        args: &[Expr],
        pos: Pos,
    ) -> Option<BExpr> {
        let element = match &target.ty {
            Type::List(element) => Some((**element).clone()),
            _ => None,
        };
        let (op, params, ret): (Intrinsic, Vec<Type>, Type) = match (&target.ty, name) {
            (ty, "ToString") if *ty != Type::Null => (Intrinsic::ToString, vec![], Type::String),
            (Type::String, "ToUpper") => (Intrinsic::StrToUpper, vec![], Type::String),
            (Type::String, "ToLower") => (Intrinsic::StrToLower, vec![], Type::String),
            (Type::String, "Trim") => (Intrinsic::StrTrim, vec![], Type::String),
            (Type::String, "Contains") => (Intrinsic::StrContains, vec![Type::String], Type::Bool),
            (Type::String, "StartsWith") => (Intrinsic::StrStartsWith, vec![Type::String], Type::Bool),
            (Type::String, "EndsWith") => (Intrinsic::StrEndsWith, vec![Type::String], Type::Bool),
            (Type::String, "IndexOf") => (Intrinsic::StrIndexOf, vec![Type::String], Type::Int),
            (Type::String, "Substring") => {
                let params = if args.len() == 2 {
                    vec![Type::Int, Type::Int]
                } else {
                    vec![Type::Int]
                };
                (Intrinsic::StrSubstring, params, Type::String)
            }
            (Type::String, "Replace") => {
                (Intrinsic::StrReplace, vec![Type::String, Type::String], Type::String)
            }
            (Type::List(_), "Add") => (Intrinsic::ListAdd, vec![element.unwrap_or(Type::Object)], Type::Void),
            (Type::List(_), "Clear") => (Intrinsic::ListClear, vec![], Type::Void),
            (Type::List(_), "Contains") => {
                (Intrinsic::ListContains, vec![element.unwrap_or(Type::Object)], Type::Bool)
            }
            (Type::List(_), "RemoveAt") => (Intrinsic::ListRemoveAt, vec![Type::Int], Type::Void),
            (ty, _) => {
                let owner = ty.to_string();
                self.bind_exprs(args);
                self.no_member(&owner, name, pos);
                return None;
            }
        };
        let args = self.bind_args(name, &params, args, pos)?;
        Some(BExpr::new(
            BExprKind::Intrinsic {
                op,
                target: Box::new(target),
                args,
            },
            ret,
        ))
    }

    fn bind_index(&mut self, target: &Expr, index: &Expr) -> Option<BExpr> {
        let target_b = self.bind_expr(target);
        let index_b = self.bind_expr(index);
        let (target_b, index_b) = (target_b?, index_b?);
        let index_b = self.coerce(index_b, &Type::Int, index.pos)?;
        let ty = match &target_b.ty {
            Type::List(element) => (**element).clone(),
            Type::String => Type::String,
            other => {
                self.error(
                    "SP0021",
                    format!("Cannot apply indexing with [] to an expression of type '{other}'"),
                    target.pos,
                );
                return None;
            }
        };
        Some(BExpr::new(
            BExprKind::Index {
                target: Box::new(target_b),
                index: Box::new(index_b),
            },
            ty,
        ))
    }

    fn bind_new(&mut self, ty: &TypeName, args: &[Expr], pos: Pos) -> Option<BExpr> {
        if self
            .host_type(&ty.path)
            .is_some_and(|host| host.kind == TypeKind::Static)
        {
            self.error(
                "SP0712",
                format!("Cannot create an instance of the static class '{}'", ty),
                pos,
            );
            return None;
        }
        let resolved = self.resolve_type(ty, false)?;
        let bound = self.bind_exprs(args)?;
        let no_constructor = |binder: &mut Self| {
            binder.error(
                "SP1729",
                format!(
                    "'{resolved}' does not contain a constructor that takes {} arguments",
                    args.len()
                ),
                pos,
            );
        };

        match &resolved {
            Type::List(_) if bound.is_empty() => {
                Some(BExpr::new(BExprKind::NewList, resolved.clone()))
            }
            Type::Exception if bound.len() <= 1 => {
                let message = match bound.into_iter().next() {
                    Some(arg) => Some(Box::new(self.coerce(arg, &Type::String, args[0].pos)?)),
                    None => None,
                };
                Some(BExpr::new(
                    BExprKind::NewException {
                        kind: ExceptionKind::Exception,
                        message,
                        inner: Vec::new(),
                    },
                    Type::Exception,
                ))
            }
            Type::AggregateException => {
                let mut bound = bound.into_iter().peekable();
                let message = bound
                    .next_if(|arg| arg.ty == Type::String)
                    .map(Box::new);
                let offset = usize::from(message.is_some());
                let mut inner = Vec::new();
                let mut ok = true;
                for (i, arg) in bound.enumerate() {
                    let from = arg.ty.clone();
                    match convert(arg, &Type::Exception) {
                        Some(arg) => inner.push(arg),
                        None => {
                            self.error(
                                "SP1503",
                                format!(
                                    "Argument {}: cannot convert from '{from}' to 'Exception'",
                                    i + offset + 1
                                ),
                                args[i + offset].pos,
                            );
                            ok = false;
                        }
                    }
                }
                ok.then(|| {
                    BExpr::new(
                        BExprKind::NewException {
                            kind: ExceptionKind::Aggregate,
                            message,
                            inner,
                        },
                        Type::AggregateException,
                    )
                })
            }
            _ => {
                no_constructor(self);
                None
            }
        }
    }

    fn bind_unary(&mut self, op: UnaryOp, operand: &Expr, pos: Pos) -> Option<BExpr> {
        let operand_b = self.bind_expr(operand)?;
        let ty = match (op, &operand_b.ty) {
            (UnaryOp::Not, Type::Bool) => Type::Bool,
            (UnaryOp::Neg | UnaryOp::Plus, Type::Int) => Type::Int,
            (UnaryOp::Neg | UnaryOp::Plus, Type::Double) => Type::Double,
            (_, ty) => {
                self.error(
                    "SP0023",
                    format!(
                        "Operator '{}' cannot be applied to operand of type '{ty}'",
                        op.symbol()
                    ),
                    pos,
                );
                return None;
            }
        };
        Some(BExpr::new(
            BExprKind::Unary {
                op,
                operand: Box::new(operand_b),
            },
            ty,
        ))
    }

    fn bind_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr, pos: Pos) -> Option<BExpr> {
        let lhs_b = self.bind_expr(lhs);
        let rhs_b = self.bind_expr(rhs);
        let (lhs_b, rhs_b) = (lhs_b?, rhs_b?);

        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            if lhs_b.ty != Type::Bool || rhs_b.ty != Type::Bool {
                self.operator_error(op, &lhs_b.ty, &rhs_b.ty, pos);
                return None;
            }
            let (l, r) = (Box::new(lhs_b), Box::new(rhs_b));
            let kind = if op == BinaryOp::And {
                BExprKind::And(l, r)
            } else {
                BExprKind::Or(l, r)
            };
            return Some(BExpr::new(kind, Type::Bool));
        }

        let Some((kind, operand_ty, result_ty)) = binary_kind(op, &lhs_b.ty, &rhs_b.ty) else {
            self.operator_error(op, &lhs_b.ty, &rhs_b.ty, pos);
            return None;
        };
        let (lhs_b, rhs_b) = match operand_ty {
            Some(ty) => (convert(lhs_b, &ty)?, convert(rhs_b, &ty)?),
            None => (lhs_b, rhs_b),
        };
        Some(BExpr::new(
            BExprKind::Binary {
                op: kind,
                lhs: Box::new(lhs_b),
                rhs: Box::new(rhs_b),
            },
            result_ty,
        ))
    }

    fn operator_error(&mut self, op: BinaryOp, lhs: &Type, rhs: &Type, pos: Pos) {
        self.error(
            "SP0019",
            format!(
                "Operator '{}' cannot be applied to operands of type '{lhs}' and '{rhs}'",
                op.symbol()
            ),
            pos,
        );
    }

    fn bind_place(&mut self, target: &Expr) -> Option<(Place, Type)> {
        match &target.kind {
            ExprKind::Name(name) => {
                if let Some(local) = self.frame.lookup(name) {
                    return (!local.poisoned).then(|| (Place::Local(local.slot), local.ty.clone()));
                }
                if let Some(global) = self.globals.get(name) {
                    return (!global.poisoned)
                        .then(|| (Place::Global(global.slot), global.ty.clone()));
                }
                if self.is_value_name(name)
                    || self.functions.contains_key(name)
                    || self.host_type(&[name.clone()]).is_some()
                {
                    self.not_assignable(target.pos);
                } else {
                    self.unknown_name(name, target.pos);
                }
                None
            }
            ExprKind::Index { target: list, index } => {
                let list_b = self.bind_expr(list);
                let index_b = self.bind_expr(index);
                let (list_b, index_b) = (list_b?, index_b?);
                let index_b = self.coerce(index_b, &Type::Int, index.pos)?;
                match &list_b.ty {
                    Type::List(element) => {
                        let element = (**element).clone();
                        Some((
                            Place::Element {
                                list: Box::new(list_b),
                                index: Box::new(index_b),
                            },
                            element,
                        ))
                    }
                    Type::String => {
                        self.error(
                            "SP0200",
                            "Property or indexer 'string.this[int]' cannot be assigned to -- it is read only",
                            target.pos,
                        );
                        None
                    }
                    other => {
                        self.error(
                            "SP0021",
                            format!("Cannot apply indexing with [] to an expression of type '{other}'"),
                            list.pos,
                        );
                        None
                    }
                }
            }
            _ => {
                self.bind_expr(target)?;
                self.not_assignable(target.pos);
                None
            }
        }
    }

    fn not_assignable(&mut self, pos: Pos) {
        self.error(
            "SP0131",
            "The left-hand side of an assignment must be a variable, property or indexer",
            pos,
        );
    }

    fn bind_assign(
        &mut self,
        op: Option<BinaryOp>,
        target: &Expr,
        value: &Expr,
        pos: Pos,
    ) -> Option<BExpr> {
        let place = self.bind_place(target);
        let value_b = self.bind_expr(value);
        let ((place, ty), value_b) = (place?, value_b?);

        let Some(op) = op else {
            let value_b = self.coerce(value_b, &ty, value.pos)?;
            return Some(BExpr::new(
                BExprKind::Assign {
                    place,
                    op: None,
                    value: Box::new(value_b),
                },
                ty,
            ));
        };

        let Some((kind, operand_ty, result_ty)) = binary_kind(op, &ty, &value_b.ty) else {
            self.operator_error(op, &ty, &value_b.ty, pos);
            return None;
        };
        if !result_ty.is_assignable_to(&ty) || (result_ty == Type::Double && ty == Type::Int) {
            self.error(
                "SP0029",
                format!("Cannot implicitly convert type '{result_ty}' to '{ty}'"),
                pos,
            );
            return None;
        }
        let value_b = match operand_ty {
            Some(operand_ty) => convert(value_b, &operand_ty)?,
            None => value_b,
        };
        Some(BExpr::new(
            BExprKind::Assign {
                place,
                op: Some(kind),
                value: Box::new(value_b),
            },
            ty,
        ))
    }

    fn bind_incdec(&mut self, target: &Expr, increment: bool, prefix: bool, pos: Pos) -> Option<BExpr> {
        let (place, ty) = self.bind_place(target)?;
        if !ty.is_numeric() {
            let symbol = if increment { "++" } else { "--" };
            self.error(
                "SP0023",
                format!("Operator '{symbol}' cannot be applied to operand of type '{ty}'"),
                pos,
            );
            return None;
        }
        Some(BExpr::new(
            BExprKind::IncDec {
                place,
                increment,
                prefix,
            },
            ty,
        ))
    }
}

/// Implicit conversion without diagnostics.
fn convert(expr: BExpr, target: &Type) -> Option<BExpr> {
    if expr.ty == *target {
        Some(expr)
    } else if expr.ty.is_assignable_to(target) {
        Some(BExpr::new(BExprKind::Convert(Box::new(expr)), target.clone()))
    } else {
        None
    }
}

/// Select the operation for `lhs op rhs`: the bound operation, the type both
/// operands convert to (if they need converting), and the result type.
fn binary_kind(op: BinaryOp, lhs: &Type, rhs: &Type) -> Option<(BinaryKind, Option<Type>, Type)> {
    let arith = match op {
        BinaryOp::Add => Some(ArithOp::Add),
        BinaryOp::Sub => Some(ArithOp::Sub),
        BinaryOp::Mul => Some(ArithOp::Mul),
        BinaryOp::Div => Some(ArithOp::Div),
        BinaryOp::Rem => Some(ArithOp::Rem),
        _ => None,
    };
    if *lhs == Type::Void || *rhs == Type::Void {
        return None;
    }
    if let Some(arith) = arith {
        if op == BinaryOp::Add && (*lhs == Type::String || *rhs == Type::String) {
            return Some((BinaryKind::Concat, None, Type::String));
        }
        return match (lhs, rhs) {
            (Type::Int, Type::Int) => Some((BinaryKind::Int(arith), None, Type::Int)),
            (l, r) if l.is_numeric() && r.is_numeric() => Some((
                BinaryKind::Double(arith),
                Some(Type::Double),
                Type::Double,
            )),
            _ => None,
        };
    }

    let compare = match op {
        BinaryOp::Lt => Some(CompareOp::Lt),
        BinaryOp::Le => Some(CompareOp::Le),
        BinaryOp::Gt => Some(CompareOp::Gt),
        BinaryOp::Ge => Some(CompareOp::Ge),
        _ => None,
    };
    if let Some(compare) = compare {
        return (lhs.is_numeric() && rhs.is_numeric())
            .then_some((BinaryKind::Compare(compare), None, Type::Bool));
    }

    // == and !=
    let comparable = (lhs.is_numeric() && rhs.is_numeric())
        || lhs.is_assignable_to(rhs)
        || rhs.is_assignable_to(lhs)
        || (*lhs == Type::Null && *rhs == Type::Null);
    if !comparable {
        return None;
    }
    let kind = if op == BinaryOp::Eq {
        BinaryKind::Equal
    } else {
        BinaryKind::NotEqual
    };
    Some((kind, None, Type::Bool))
}

/// Whether control can never fall off the end of `stmts`.
fn always_exits(stmts: &[Stmt]) -> bool {
    stmts.iter().any(stmt_exits)
}

fn stmt_exits(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Return(..) | Stmt::Throw(..) => true,
        Stmt::Block(stmts) => always_exits(stmts),
        Stmt::If {
            then,
            els: Some(els),
            ..
        } => stmt_exits(then) && stmt_exits(els),
        Stmt::While { cond, body } => is_true_literal(cond) && !breaks_out(body),
        Stmt::For { cond, body, .. } => {
            cond.as_ref().is_none_or(is_true_literal) && !breaks_out(body)
        }
        _ => false,
    }
}

fn is_true_literal(expr: &Expr) -> bool {
    matches!(expr.kind, ExprKind::Bool(true))
}

/// Whether a `break` in `stmt` leaves the enclosing loop.
fn breaks_out(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Break(_) => true,
        Stmt::Block(stmts) => stmts.iter().any(breaks_out),
        Stmt::If { then, els, .. } => {
            breaks_out(then) || els.as_deref().is_some_and(breaks_out)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parser::parse_source;

    fn base() -> Vec<String> {
        vec![
            "System.Runtime".to_string(),
            "System.Threading".to_string(),
            "Pad.Api".to_string(),
        ]
    }

    fn bind_ok(source: &str) -> BoundSubmission {
        let sub = parse_source(source, 0).unwrap();
        match bind(&sub, None, &base()) {
            Ok(bound) => bound,
            Err(diags) => panic!("unexpected diagnostics: {diags:?}"),
        }
    }

    fn bind_err(source: &str) -> Vec<Diagnostic> {
        let sub = parse_source(source, 0).unwrap();
        bind(&sub, None, &base()).unwrap_err()
    }

    fn codes(diags: &[Diagnostic]) -> Vec<&'static str> {
        diags.iter().map(|d| d.code).collect()
    }

    #[test]
    fn test_top_level_declaration_is_global() {
        let bound = bind_ok("int x = 5;");
        assert_eq!(
            bound.globals,
            vec![GlobalDecl {
                name: "x".to_string(),
                ty: Type::Int
            }]
        );
        assert!(matches!(bound.body[0], BStmt::InitGlobal { slot: 0, .. }));
    }

    #[test]
    fn test_trailing_expression_type() {
        let bound = bind_ok("1 + 2.5");
        assert_eq!(bound.result.unwrap().ty, Type::Double);
    }

    #[test]
    fn test_var_inference() {
        let bound = bind_ok("var s = \"a\" + 1;");
        assert_eq!(bound.globals[0].ty, Type::String);
    }

    #[test]
    fn test_all_binding_errors_are_reported() {
        let diags = bind_err("int a = \"s\";\nbool b = 1;\nundefined;");
        assert_eq!(codes(&diags), ["SP0029", "SP0029", "SP0201"]);
    }

    #[test]
    fn test_unknown_name() {
        let diags = bind_err("y + 1");
        assert_eq!(codes(&diags), ["SP0103"]);
        assert_eq!(
            diags[0].to_string(),
            "(1,1): error SP0103: The name 'y' does not exist in the current context"
        );
    }

    #[test]
    fn test_poisoned_variable_reports_once() {
        let diags = bind_err("var x = missing;\nx + 1");
        assert_eq!(codes(&diags), ["SP0103"]);
    }

    #[test]
    fn test_imports_resolve_types() {
        let diags = bind_err("Math.Sqrt(4)");
        assert_eq!(codes(&diags), ["SP0103"]);

        let bound = bind_ok("using System;\nMath.Sqrt(4)");
        assert_eq!(bound.result.unwrap().ty, Type::Double);
        assert_eq!(bound.imports, vec![Import::Namespace("System".to_string())]);
    }

    #[test]
    fn test_qualified_type_needs_no_import() {
        let bound = bind_ok("System.Math.Max(1, 2)");
        assert_eq!(bound.result.unwrap().ty, Type::Int);
    }

    #[test]
    fn test_using_static() {
        let bound = bind_ok("using static Pad.Api.Host;\nPrint(1)");
        assert_eq!(bound.result.unwrap().ty, Type::Void);
    }

    #[test]
    fn test_using_type_as_namespace() {
        let diags = bind_err("using System.Math;");
        assert_eq!(codes(&diags), ["SP0138"]);
    }

    #[test]
    fn test_unknown_namespace() {
        let diags = bind_err("using Nope;");
        assert_eq!(codes(&diags), ["SP0246"]);
    }

    #[test]
    fn test_namespace_needs_reference() {
        let sub = parse_source("using System.Threading;", 0).unwrap();
        let diags = bind(&sub, None, &["System.Runtime".to_string()]).unwrap_err();
        assert_eq!(codes(&diags), ["SP0246"]);

        let sub = parse_source("#r \"System.Threading\"\nusing System.Threading;", 0).unwrap();
        let bound = bind(&sub, None, &["System.Runtime".to_string()]).unwrap();
        assert!(bound.references.contains(&"System.Threading".to_string()));
    }

    #[test]
    fn test_unknown_reference() {
        let diags = bind_err("#r \"Missing.Lib\"");
        assert_eq!(codes(&diags), ["SP0006"]);
    }

    #[test]
    fn test_duplicate_imports_are_harmless() {
        let bound = bind_ok("using System;\nusing System;");
        assert_eq!(bound.imports.len(), 1);
    }

    #[test]
    fn test_duplicate_global_in_one_submission() {
        let diags = bind_err("int x = 1;\nint x = 2;");
        assert_eq!(codes(&diags), ["SP0102"]);
    }

    #[test]
    fn test_function_must_return() {
        let diags = bind_err("int F(int n) { if (n > 0) { return 1; } }");
        assert_eq!(codes(&diags), ["SP0161"]);
        bind_ok("int F(int n) { if (n > 0) { return 1; } else { return 2; } }");
        bind_ok("int G() { while (true) { } }");
    }

    #[test]
    fn test_recursive_function() {
        let bound = bind_ok("int Fact(int n) { return n <= 1 ? 1 : n * Fact(n - 1); }\nFact(5)");
        assert_eq!(bound.functions.len(), 1);
        assert_eq!(bound.functions[0].frame_size, 1);
    }

    #[test]
    fn test_function_sees_later_globals() {
        bind_ok("int Get() { return counter; }\nint counter = 3;");
    }

    #[test]
    fn test_argument_errors() {
        let diags = bind_err("int F(int n) { return n; }\nF(\"x\");\nF(1, 2);");
        assert_eq!(codes(&diags), ["SP1503", "SP1501"]);
    }

    #[test]
    fn test_return_rules() {
        assert_eq!(codes(&bind_err("return 1;")), ["SP8102"]);
        assert_eq!(codes(&bind_err("void F() { return 1; }")), ["SP0127"]);
        assert_eq!(codes(&bind_err("int F() { return; }")), ["SP0126"]);
    }

    #[test]
    fn test_break_outside_loop() {
        assert_eq!(codes(&bind_err("break;")), ["SP0139"]);
        bind_ok("while (true) { break; }");
    }

    #[test]
    fn test_var_rules() {
        assert_eq!(codes(&bind_err("var x = null;")), ["SP0815"]);
        assert_eq!(codes(&bind_err("var x;")), ["SP0818"]);
    }

    #[test]
    fn test_throw_requires_exception() {
        assert_eq!(codes(&bind_err("throw 5;")), ["SP0155"]);
        bind_ok("using System;\nthrow new Exception(\"boom\");");
    }

    #[test]
    fn test_operator_errors() {
        assert_eq!(codes(&bind_err("true + 1")), ["SP0019"]);
        assert_eq!(codes(&bind_err("-\"s\"")), ["SP0023"]);
        assert_eq!(codes(&bind_err("1 == \"1\"")), ["SP0019"]);
    }

    #[test]
    fn test_compound_assignment() {
        bind_ok("double d = 1; d += 2;");
        bind_ok("string s = \"a\"; s += 1;");
        assert_eq!(codes(&bind_err("int i = 1; i += 1.5;")), ["SP0029"]);
    }

    #[test]
    fn test_list_members() {
        let bound = bind_ok(
            "using System.Collections.Generic;\n\
             var xs = new List<int>();\nxs.Add(1);\nxs[0] = 2;\nxs.Count",
        );
        assert_eq!(bound.result.unwrap().ty, Type::Int);
        assert_eq!(
            codes(&bind_err(
                "using System.Collections.Generic;\nvar xs = new List<int>();\nxs.Add(\"s\");"
            )),
            ["SP1503"]
        );
    }

    #[test]
    fn test_static_type_cannot_be_instantiated() {
        assert_eq!(codes(&bind_err("using System;\nnew Math()")), ["SP0712"]);
    }

    #[test]
    fn test_locals_cannot_shadow_locals() {
        let diags = bind_err("{ int a = 1; { int a = 2; } }");
        assert_eq!(codes(&diags), ["SP0128"]);
    }

    #[test]
    fn test_prior_state_is_visible() {
        use crate::state::StateBuilder;

        let state = StateBuilder::from_prior(None)
            .references(base())
            .variables(vec![Value::Int(5)], vec![("x".to_string(), Type::Int)])
            .build();
        let sub = parse_source("x + 1", 0).unwrap();
        let bound = bind(&sub, Some(&state), &base()).unwrap();
        assert!(bound.globals.is_empty());
        assert_eq!(bound.result.unwrap().ty, Type::Int);

        // Redeclaring takes a new slot
        let sub = parse_source("string x = \"s\";", 0).unwrap();
        let bound = bind(&sub, Some(&state), &base()).unwrap();
        assert!(matches!(bound.body[0], BStmt::InitGlobal { slot: 1, .. }));
    }
}
