use super::pattern::BindMode;
use super::{Completion, Control, Interpreter};
use crate::script::ast::{
    DeclKind, ForBinding, ForInit, SwitchCase, Stmt, VarDecl, CatchClause, Expr,
};
use crate::script::env::Env;
use crate::script::value::{JsStr, PropertyKey, Value};

/// Where a loop body's completion leaves the loop: `None` keeps iterating.
fn loop_exit(completion: Completion, labels: &[JsStr]) -> Option<Completion> {
    match completion {
        Completion::Normal | Completion::Continue(None) => None,
        Completion::Continue(Some(label)) if labels.contains(&label) => None,
        Completion::Break(None) => Some(Completion::Normal),
        Completion::Break(Some(label)) if labels.contains(&label) => Some(Completion::Normal),
        other => Some(other),
    }
}

/// Whether a statement list declares anything block-scoped.
fn needs_scope(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|stmt| {
        matches!(
            stmt,
            Stmt::Function(_)
                | Stmt::Class(_)
                | Stmt::VarDecl(VarDecl {
                    kind: DeclKind::Let | DeclKind::Const,
                    ..
                })
        )
    })
}

impl Interpreter {
    /// Declares the functions, classes and lexical bindings of one block.
    fn hoist_declarations(&mut self, stmts: &[Stmt], env: &Env) {
        for stmt in stmts {
            match stmt {
                Stmt::Function(def) => {
                    if let Some(name) = &def.name {
                        let func = self.make_closure(def, env, None);
                        env.declare(name, Some(Value::Object(func)), true);
                    }
                }
                Stmt::VarDecl(VarDecl { kind, declarations }) if *kind != DeclKind::Var => {
                    let mut names = Vec::new();
                    for decl in declarations {
                        decl.target.bound_names(&mut names);
                    }
                    for name in names {
                        env.declare(&name, None, *kind == DeclKind::Let);
                    }
                }
                Stmt::Class(def) => {
                    if let Some(name) = &def.name {
                        env.declare(name, None, true);
                    }
                }
                _ => {}
            }
        }
    }

    pub(super) fn exec_statements(&mut self, stmts: &[Stmt], env: &Env) -> Result<Completion, Control> {
        self.hoist_declarations(stmts, env);
        for stmt in stmts {
            match self.exec(stmt, env)? {
                Completion::Normal => {}
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_block(&mut self, stmts: &[Stmt], env: &Env) -> Result<Completion, Control> {
        if needs_scope(stmts) {
            self.exec_statements(stmts, &env.child())
        } else {
            self.exec_statements(stmts, env)
        }
    }

    pub(super) fn exec(&mut self, stmt: &Stmt, env: &Env) -> Result<Completion, Control> {
        self.exec_labeled(stmt, env, &[])
    }

    fn exec_labeled(&mut self, stmt: &Stmt, env: &Env, labels: &[JsStr]) -> Result<Completion, Control> {
        crate::script::ensure_sufficient_stack(|| self.exec_inner(stmt, env, labels))
    }

    fn exec_inner(&mut self, stmt: &Stmt, env: &Env, labels: &[JsStr]) -> Result<Completion, Control> {
        self.tick()?;
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr, env)?;
                Ok(Completion::Normal)
            }
            Stmt::VarDecl(decl) => {
                self.exec_var_decl(decl, env)?;
                Ok(Completion::Normal)
            }
            Stmt::Function(_) | Stmt::Empty | Stmt::Debugger => Ok(Completion::Normal),
            Stmt::Class(def) => {
                let ctor = self.eval_class(def, env)?;
                if let Some(name) = &def.name {
                    env.declare(name, Some(Value::Object(ctor)), true);
                }
                Ok(Completion::Normal)
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval(condition, env)?.is_truthy() {
                    self.exec(then_branch, env)
                } else if let Some(else_branch) = else_branch {
                    self.exec(else_branch, env)
                } else {
                    Ok(Completion::Normal)
                }
            }
            Stmt::While { condition, body } => {
                while self.eval(condition, env)?.is_truthy() {
                    let completion = self.exec(body, env)?;
                    if let Some(exit) = loop_exit(completion, labels) {
                        return Ok(exit);
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::DoWhile { body, condition } => {
                loop {
                    let completion = self.exec(body, env)?;
                    if let Some(exit) = loop_exit(completion, labels) {
                        return Ok(exit);
                    }
                    if !self.eval(condition, env)?.is_truthy() {
                        return Ok(Completion::Normal);
                    }
                }
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => self.exec_for(init.as_ref(), test.as_ref(), update.as_ref(), body, env, labels),
            Stmt::ForIn { left, right, body } => self.exec_for_in(left, right, body, env, labels),
            Stmt::ForOf { left, right, body } => self.exec_for_of(left, right, body, env, labels),
            Stmt::Break(label) => Ok(Completion::Break(label.clone())),
            Stmt::Continue(label) => Ok(Completion::Continue(label.clone())),
            Stmt::Labeled { label, body } => {
                let mut inner = labels.to_vec();
                inner.push(label.clone());
                match self.exec_labeled(body, env, &inner)? {
                    Completion::Break(Some(target)) if target == *label => Ok(Completion::Normal),
                    other => Ok(other),
                }
            }
            Stmt::Switch {
                discriminant,
                cases,
            } => self.exec_switch(discriminant, cases, env),
            Stmt::Throw(expr) => {
                let value = self.eval(expr, env)?;
                Err(Control::Throw(value))
            }
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => self.exec_try(block, handler.as_ref(), finalizer.as_deref(), env),
            Stmt::Block(stmts) => self.exec_block(stmts, env),
        }
    }

    fn exec_var_decl(&mut self, decl: &VarDecl, env: &Env) -> Result<(), Control> {
        let mode = match decl.kind {
            DeclKind::Var => BindMode::Assign,
            DeclKind::Let => BindMode::Let,
            DeclKind::Const => BindMode::Const,
        };
        for declarator in &decl.declarations {
            let value = match &declarator.init {
                Some(init) => {
                    let value = self.eval(init, env)?;
                    if let crate::script::ast::Pattern::Ident(name) = &declarator.target {
                        self.name_anonymous(init, &value, name);
                    }
                    value
                }
                None if decl.kind == DeclKind::Var => continue,
                None => Value::Undefined,
            };
            self.bind_pattern(&declarator.target, value, env, mode)?;
        }
        Ok(())
    }

    fn exec_for(
        &mut self,
        init: Option<&ForInit>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        env: &Env,
        labels: &[JsStr],
    ) -> Result<Completion, Control> {
        let loop_env = env.child();
        let mut per_iteration = Vec::new();
        match init {
            Some(ForInit::Decl(decl)) => {
                if decl.kind != DeclKind::Var {
                    let mut names = Vec::new();
                    for declarator in &decl.declarations {
                        declarator.target.bound_names(&mut names);
                    }
                    for name in &names {
                        loop_env.declare(name, None, decl.kind == DeclKind::Let);
                    }
                    if decl.kind == DeclKind::Let {
                        per_iteration = names;
                    }
                }
                self.exec_var_decl(decl, &loop_env)?;
            }
            Some(ForInit::Expr(expr)) => {
                self.eval(expr, &loop_env)?;
            }
            None => {}
        }
        let mut iteration_env = copy_bindings(env, &loop_env, &per_iteration);
        loop {
            if let Some(test) = test
                && !self.eval(test, &iteration_env)?.is_truthy()
            {
                return Ok(Completion::Normal);
            }
            let completion = self.exec(body, &iteration_env)?;
            if let Some(exit) = loop_exit(completion, labels) {
                return Ok(exit);
            }
            iteration_env = copy_bindings(env, &iteration_env, &per_iteration);
            if let Some(update) = update {
                self.eval(update, &iteration_env)?;
            }
        }
    }

    /// Binds a `for…in`/`for…of` head for one iteration.
    fn bind_for_head(&mut self, left: &ForBinding, value: Value, env: &Env) -> Result<Env, Control> {
        match left {
            ForBinding::Decl(DeclKind::Var, pattern) => {
                self.bind_pattern(pattern, value, env, BindMode::Assign)?;
                Ok(env.clone())
            }
            ForBinding::Decl(kind, pattern) => {
                let scope = env.child();
                let mode = if *kind == DeclKind::Const {
                    BindMode::Const
                } else {
                    BindMode::Let
                };
                self.bind_pattern(pattern, value, &scope, mode)?;
                Ok(scope)
            }
            ForBinding::Target(pattern) => {
                self.bind_pattern(pattern, value, env, BindMode::Assign)?;
                Ok(env.clone())
            }
        }
    }

    fn exec_for_in(
        &mut self,
        left: &ForBinding,
        right: &Expr,
        body: &Stmt,
        env: &Env,
        labels: &[JsStr],
    ) -> Result<Completion, Control> {
        let subject = self.eval(right, env)?;
        for key in self.for_in_keys(&subject) {
            if let Value::Object(obj) = &subject
                && !self.has_property(obj, &PropertyKey::String(key.clone()))
            {
                continue;
            }
            let scope = self.bind_for_head(left, Value::String(key), env)?;
            let completion = self.exec(body, &scope)?;
            if let Some(exit) = loop_exit(completion, labels) {
                return Ok(exit);
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_for_of(
        &mut self,
        left: &ForBinding,
        right: &Expr,
        body: &Stmt,
        env: &Env,
        labels: &[JsStr],
    ) -> Result<Completion, Control> {
        let iterable = self.eval(right, env)?;
        let mut record = self.get_iterator(&iterable)?;
        while let Some(value) = self.iterator_step(&mut record)? {
            let result = self
                .bind_for_head(left, value, env)
                .and_then(|scope| self.exec(body, &scope));
            let completion = self.close_on_error(&record, result)?;
            if let Some(exit) = loop_exit(completion, labels) {
                self.iterator_close(&record)?;
                return Ok(exit);
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_switch(&mut self, discriminant: &Expr, cases: &[SwitchCase], env: &Env) -> Result<Completion, Control> {
        let value = self.eval(discriminant, env)?;
        let scope = env.child();
        for case in cases {
            self.hoist_declarations(&case.body, &scope);
        }
        let mut start = None;
        for (i, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test
                && value.strict_equals(&self.eval(test, &scope)?)
            {
                start = Some(i);
                break;
            }
        }
        let Some(start) = start.or_else(|| cases.iter().position(|case| case.test.is_none())) else {
            return Ok(Completion::Normal);
        };
        for case in &cases[start..] {
            for stmt in &case.body {
                match self.exec(stmt, &scope)? {
                    Completion::Normal => {}
                    Completion::Break(None) => return Ok(Completion::Normal),
                    abrupt => return Ok(abrupt),
                }
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_try(
        &mut self,
        block: &[Stmt],
        handler: Option<&CatchClause>,
        finalizer: Option<&[Stmt]>,
        env: &Env,
    ) -> Result<Completion, Control> {
        let result = self.exec_statements(block, &env.child());
        let result = match (result, handler) {
            (Err(Control::Throw(thrown)), Some(handler)) => {
                let scope = env.child();
                let bound = match &handler.param {
                    Some(param) => self.bind_pattern(param, thrown, &scope, BindMode::Let),
                    None => Ok(()),
                };
                bound.and_then(|()| self.exec_statements(&handler.body, &scope.child()))
            }
            (other, _) => other,
        };
        if matches!(result, Err(Control::Abort(_))) {
            return result;
        }
        if let Some(finalizer) = finalizer {
            match self.exec_statements(finalizer, &env.child())? {
                Completion::Normal => {}
                abrupt => return Ok(abrupt),
            }
        }
        result
    }
}

/// A fresh scope under `outer` holding copies of `names` from `from`, so
/// closures created in one iteration keep that iteration's values.
fn copy_bindings(outer: &Env, from: &Env, names: &[JsStr]) -> Env {
    if names.is_empty() {
        return from.clone();
    }
    let next = outer.child();
    for name in names {
        let value = from.lookup(name).and_then(Result::ok).unwrap_or_default();
        next.declare(name, Some(value), true);
    }
    next
}
