//! The tree-walking evaluator: the script host of the original design.
//!
//! Helper names are the root namespace and are reserved; user bindings live
//! beside them in an insertion-ordered scope so the post-run namespace walk
//! (label promotion) is deterministic.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use opscript_ir::{ActionId, RuntimeContext, Span, VIRTUAL_STACK_SLOTS};

use crate::ast::{Expr, ExprKind, Program, Stmt, StmtKind};
use crate::error::Error;
use crate::helpers::{self, HelperKind};
use crate::value::Value;

struct Binding {
    value: Value,
    constant: bool,
}

pub(crate) struct Evaluator {
    pub ctx: RuntimeContext,
    scope: IndexMap<SmolStr, Binding>,
    registry: FxHashMap<SmolStr, HelperKind>,
}

impl Evaluator {
    pub fn new(bindings: impl IntoIterator<Item = (SmolStr, Value)>) -> Self {
        let mut scope = IndexMap::new();
        for (name, value) in bindings {
            scope.insert(
                name,
                Binding {
                    value,
                    constant: true,
                },
            );
        }
        Self {
            ctx: RuntimeContext::new(),
            scope,
            registry: helpers::registry(),
        }
    }

    pub fn run(&mut self, program: &Program) -> Result<(), Error> {
        for stmt in &program.stmts {
            self.stmt(stmt)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), Error> {
        match &stmt.kind {
            StmtKind::Const(name, expr) => {
                let value = self.eval(expr)?;
                self.check_reserved(name, stmt.span)?;
                if self.scope.contains_key(name) {
                    return Err(Error::ConstReassigned {
                        name: name.clone(),
                        span: stmt.span,
                    });
                }
                self.scope.insert(
                    name.clone(),
                    Binding {
                        value,
                        constant: true,
                    },
                );
            }
            StmtKind::Assign(name, expr) => {
                let value = self.eval(expr)?;
                self.bind(name, value, stmt.span)?;
            }
            StmtKind::Destructure(names, expr) => {
                let value = self.eval(expr)?;
                let Value::Action(ptr) = &value else {
                    return Err(Error::InputValidation {
                        helper: SmolStr::new("destructure"),
                        msg: format!("{} cannot be destructured into stack references", value.kind()),
                        span: stmt.span,
                        loc: expr.loc,
                    });
                };
                if names.len() > VIRTUAL_STACK_SLOTS as usize {
                    return Err(Error::InputValidation {
                        helper: SmolStr::new("destructure"),
                        msg: format!(
                            "an action publishes {VIRTUAL_STACK_SLOTS} stack slots, not {}",
                            names.len()
                        ),
                        span: stmt.span,
                        loc: expr.loc,
                    });
                }
                let ptr = *ptr;
                for (name, slot) in names.iter().zip(ptr.stack_refs()) {
                    self.bind(name, Value::StackRef(slot), stmt.span)?;
                }
            }
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
        }
        Ok(())
    }

    fn check_reserved(&self, name: &SmolStr, span: Span) -> Result<(), Error> {
        if self.registry.contains_key(name) {
            return Err(Error::ReservedName {
                name: name.clone(),
                span,
            });
        }
        Ok(())
    }

    fn bind(&mut self, name: &SmolStr, value: Value, span: Span) -> Result<(), Error> {
        self.check_reserved(name, span)?;
        if let Some(existing) = self.scope.get(name) {
            if existing.constant {
                return Err(Error::ConstReassigned {
                    name: name.clone(),
                    span,
                });
            }
        }
        self.scope.insert(
            name.clone(),
            Binding {
                value,
                constant: false,
            },
        );
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, Error> {
        match &expr.kind {
            ExprKind::Int(v) => Ok(Value::Int(*v)),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Ident(name) => match self.scope.get(name) {
                Some(binding) => Ok(binding.value.clone()),
                None => Err(Error::Undefined {
                    name: name.clone(),
                    span: expr.span,
                    loc: expr.loc,
                }),
            },
            ExprKind::Object(entries) => {
                let mut map = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    map.push((key.clone(), self.eval(value)?));
                }
                Ok(Value::Map(map))
            }
            ExprKind::Call(name, args) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                helpers::call(&self.registry, &mut self.ctx, name, values, expr.span, expr.loc)
            }
        }
    }

    /// The post-run namespace walk: every surviving binding holding an
    /// action whose name does not start with `_` becomes a jump
    /// destination. This is how `main = push(2)` grows its JUMPDEST.
    pub fn promote_labels(&mut self) {
        for (name, binding) in &self.scope {
            if name.starts_with('_') {
                continue;
            }
            if let Value::Action(ptr) = &binding.value {
                self.ctx.action_mut(ptr.action()).is_jump_destination = true;
            }
        }
    }

    /// Name table for `$ptr` resolution, underscore bindings included.
    pub fn label_bindings(&self) -> FxHashMap<SmolStr, ActionId> {
        let mut labels = FxHashMap::default();
        for (name, binding) in &self.scope {
            if let Value::Action(ptr) = &binding.value {
                labels.insert(name.clone(), ptr.action());
            }
        }
        labels
    }
}
