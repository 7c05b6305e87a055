//! Lexical scope resolution over the owned script tree.
//!
//! Scopes live in an arena addressed by `ScopeId`; a scope points at its parent
//! by id only. Traversals carry an explicit `ScopeStack` instead of shared
//! enter/leave state.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::script::{
    AssignTarget, DeclarationKind, Expression, Function, FunctionBody, NodeId, Program, Statement,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ScopeId(u32);

impl ScopeId {
    pub const ROOT: Self = Self(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BindingKind {
    Var,
    Let,
    Const,
    Function,
    Param,
}

impl From<DeclarationKind> for BindingKind {
    fn from(kind: DeclarationKind) -> Self {
        match kind {
            DeclarationKind::Var => BindingKind::Var,
            DeclarationKind::Let => BindingKind::Let,
            DeclarationKind::Const => BindingKind::Const,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub parent: Option<ScopeId>,
    /// Function scopes receive hoisted `var` declarations.
    pub is_function: bool,
    pub declarations: BTreeMap<String, BindingKind>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    node_scopes: HashMap<NodeId, ScopeId>,
    /// Names referenced somewhere that no enclosing scope declares.
    pub free_references: BTreeSet<String>,
}

impl ScopeTree {
    pub fn root(&self) -> ScopeId {
        ScopeId::ROOT
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn scope_of(&self, node: NodeId) -> Option<ScopeId> {
        self.node_scopes.get(&node).copied()
    }

    /// Root-scope binding names.
    pub fn root_names(&self) -> BTreeSet<String> {
        self.scope(ScopeId::ROOT).declarations.keys().cloned().collect()
    }

    /// Nearest scope, walking outward from `scope`, that declares `name`.
    /// `None` means the name is a free (global) reference.
    pub fn find_owner(&self, scope: ScopeId, name: &str) -> Option<ScopeId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.scope(id);
            if s.declarations.contains_key(name) {
                return Some(id);
            }
            current = s.parent;
        }
        None
    }

    /// True when `name`, seen from `scope`, is root state or unresolved.
    pub fn is_root_or_free(&self, scope: ScopeId, name: &str) -> bool {
        match self.find_owner(scope, name) {
            Some(owner) => owner == ScopeId::ROOT,
            None => true,
        }
    }

    fn push_scope(&mut self, parent: Option<ScopeId>, is_function: bool) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent,
            is_function,
            declarations: BTreeMap::new(),
        });
        id
    }

    fn declare(&mut self, scope: ScopeId, name: &str, kind: BindingKind) {
        let target = if kind == BindingKind::Var {
            self.function_scope(scope)
        } else {
            scope
        };
        self.scopes[target.0 as usize]
            .declarations
            .entry(name.to_string())
            .or_insert(kind);
    }

    fn function_scope(&self, scope: ScopeId) -> ScopeId {
        let mut current = scope;
        loop {
            let s = self.scope(current);
            if s.is_function {
                return current;
            }
            match s.parent {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESOLVER
// ═══════════════════════════════════════════════════════════════════════════════

struct Resolver {
    tree: ScopeTree,
    /// References seen during the walk, resolved once all hoisting is known.
    references: Vec<(ScopeId, String)>,
}

/// Build the scope tree for the script program. Template expressions are
/// resolved as if they appeared at the top level of the script.
pub fn resolve<'a>(
    program: &Program,
    template_expressions: impl IntoIterator<Item = &'a Expression>,
) -> ScopeTree {
    let mut resolver = Resolver {
        tree: ScopeTree::default(),
        references: Vec::new(),
    };
    let root = resolver.tree.push_scope(None, true);

    for stmt in &program.body {
        resolver.statement(stmt, root);
    }
    for expr in template_expressions {
        resolver.expression(expr, root);
    }

    let Resolver {
        mut tree,
        references,
    } = resolver;
    let free: BTreeSet<String> = references
        .into_iter()
        .filter(|(scope, name)| tree.find_owner(*scope, name).is_none())
        .map(|(_, name)| name)
        .collect();
    tree.free_references = free;

    log::trace!(
        "resolved {} scopes, {} root bindings, {} free references",
        tree.scopes.len(),
        tree.scope(root).declarations.len(),
        tree.free_references.len()
    );
    tree
}

impl Resolver {
    fn statement(&mut self, stmt: &Statement, scope: ScopeId) {
        match stmt {
            Statement::VariableDeclaration { kind, declarators } => {
                for declarator in declarators {
                    for name in declarator.pattern.names() {
                        self.tree.declare(scope, name, (*kind).into());
                    }
                    if let Some(init) = &declarator.init {
                        self.expression(init, scope);
                    }
                }
            }
            Statement::FunctionDeclaration(func) => {
                if let Some(name) = &func.name {
                    self.tree.declare(scope, name, BindingKind::Function);
                }
                self.function(func, scope);
            }
            Statement::Expression { expression } => self.expression(expression, scope),
            Statement::Block { id, body } => {
                let block = self.tree.push_scope(Some(scope), false);
                self.tree.node_scopes.insert(*id, block);
                for s in body {
                    self.statement(s, block);
                }
            }
            Statement::If {
                test,
                consequent,
                alternate,
            } => {
                self.expression(test, scope);
                self.statement(consequent, scope);
                if let Some(alternate) = alternate {
                    self.statement(alternate, scope);
                }
            }
            Statement::Return { argument } => {
                if let Some(argument) = argument {
                    self.expression(argument, scope);
                }
            }
            Statement::Labeled { body, .. } => self.statement(body, scope),
            Statement::Opaque { references, .. } => {
                for name in references {
                    self.reference(name, scope);
                }
            }
        }
    }

    fn function(&mut self, func: &Function, parent: ScopeId) {
        let scope = self.tree.push_scope(Some(parent), true);
        self.tree.node_scopes.insert(func.id, scope);
        for name in &func.param_names {
            self.tree.declare(scope, name, BindingKind::Param);
        }
        match &func.body {
            FunctionBody::Block { statements } => {
                for s in statements {
                    self.statement(s, scope);
                }
            }
            FunctionBody::Expression { expression } => self.expression(expression, scope),
        }
    }

    fn reference(&mut self, name: &str, scope: ScopeId) {
        self.references.push((scope, name.to_string()));
    }

    fn target(&mut self, target: &AssignTarget, scope: ScopeId) {
        match target {
            AssignTarget::Identifier { name } => self.reference(name, scope),
            AssignTarget::Member { object, .. } => self.expression(object, scope),
            AssignTarget::Opaque { names, .. } => {
                for name in names {
                    self.reference(name, scope);
                }
            }
        }
    }

    fn expression(&mut self, expr: &Expression, scope: ScopeId) {
        match expr {
            Expression::Identifier { name } => self.reference(name, scope),
            Expression::Binary { left, right, .. } => {
                self.expression(left, scope);
                self.expression(right, scope);
            }
            Expression::Assignment { target, right, .. } => {
                self.target(target, scope);
                self.expression(right, scope);
            }
            Expression::Update { target, .. } => self.target(target, scope),
            Expression::Call {
                callee, arguments, ..
            } => {
                self.expression(callee, scope);
                for arg in arguments {
                    self.expression(arg, scope);
                }
            }
            Expression::Member { object, .. } => self.expression(object, scope),
            Expression::Parenthesized { expression } => self.expression(expression, scope),
            Expression::Sequence { expressions } => {
                for e in expressions {
                    self.expression(e, scope);
                }
            }
            Expression::Function(func) => self.function(func, scope),
            Expression::Opaque { references, .. } => {
                for name in references {
                    self.reference(name, scope);
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPE-AWARE TRAVERSAL
// ═══════════════════════════════════════════════════════════════════════════════

/// Explicit stack of the scopes enclosing the node being visited.
pub struct ScopeStack<'t> {
    tree: &'t ScopeTree,
    stack: Vec<ScopeId>,
}

impl<'t> ScopeStack<'t> {
    pub fn new(tree: &'t ScopeTree) -> Self {
        Self {
            tree,
            stack: vec![tree.root()],
        }
    }

    pub fn current(&self) -> ScopeId {
        self.stack.last().copied().unwrap_or(ScopeId::ROOT)
    }

    fn enter(&mut self, node: NodeId) {
        let scope = self.tree.scope_of(node).unwrap_or_else(|| self.current());
        self.stack.push(scope);
    }

    fn leave(&mut self) {
        self.stack.pop();
    }
}

/// Read-only walk: `visit` sees every expression node with its current scope.
pub fn walk_statements<F>(statements: &[Statement], stack: &mut ScopeStack, visit: &mut F)
where
    F: FnMut(&Expression, ScopeId),
{
    for stmt in statements {
        walk_statement(stmt, stack, visit);
    }
}

pub fn walk_statement<F>(stmt: &Statement, stack: &mut ScopeStack, visit: &mut F)
where
    F: FnMut(&Expression, ScopeId),
{
    match stmt {
        Statement::VariableDeclaration { declarators, .. } => {
            for declarator in declarators {
                if let Some(init) = &declarator.init {
                    walk_expression(init, stack, visit);
                }
            }
        }
        Statement::FunctionDeclaration(func) => walk_function(func, stack, visit),
        Statement::Expression { expression } => walk_expression(expression, stack, visit),
        Statement::Block { id, body } => {
            stack.enter(*id);
            walk_statements(body, stack, visit);
            stack.leave();
        }
        Statement::If {
            test,
            consequent,
            alternate,
        } => {
            walk_expression(test, stack, visit);
            walk_statement(consequent, stack, visit);
            if let Some(alternate) = alternate {
                walk_statement(alternate, stack, visit);
            }
        }
        Statement::Return { argument } => {
            if let Some(argument) = argument {
                walk_expression(argument, stack, visit);
            }
        }
        Statement::Labeled { body, .. } => walk_statement(body, stack, visit),
        Statement::Opaque { .. } => {}
    }
}

fn walk_function<F>(func: &Function, stack: &mut ScopeStack, visit: &mut F)
where
    F: FnMut(&Expression, ScopeId),
{
    stack.enter(func.id);
    match &func.body {
        FunctionBody::Block { statements } => walk_statements(statements, stack, visit),
        FunctionBody::Expression { expression } => walk_expression(expression, stack, visit),
    }
    stack.leave();
}

pub fn walk_expression<F>(expr: &Expression, stack: &mut ScopeStack, visit: &mut F)
where
    F: FnMut(&Expression, ScopeId),
{
    visit(expr, stack.current());
    match expr {
        Expression::Binary { left, right, .. } => {
            walk_expression(left, stack, visit);
            walk_expression(right, stack, visit);
        }
        Expression::Assignment { target, right, .. } => {
            if let AssignTarget::Member { object, .. } = target {
                walk_expression(object, stack, visit);
            }
            walk_expression(right, stack, visit);
        }
        Expression::Update { target, .. } => {
            if let AssignTarget::Member { object, .. } = target {
                walk_expression(object, stack, visit);
            }
        }
        Expression::Call {
            callee, arguments, ..
        } => {
            walk_expression(callee, stack, visit);
            for arg in arguments {
                walk_expression(arg, stack, visit);
            }
        }
        Expression::Member { object, .. } => walk_expression(object, stack, visit),
        Expression::Parenthesized { expression } => walk_expression(expression, stack, visit),
        Expression::Sequence { expressions } => {
            for e in expressions {
                walk_expression(e, stack, visit);
            }
        }
        Expression::Function(func) => walk_function(func, stack, visit),
        Expression::Identifier { .. } | Expression::Opaque { .. } => {}
    }
}

/// Result of a fold callback.
pub enum Fold {
    /// Keep descending into the (possibly changed) node.
    Continue(Expression),
    /// The node was replaced; do not visit its subtree.
    Replace(Expression),
}

/// Owning rewrite: `fold` may replace any expression node. Replaced nodes are
/// not revisited.
pub fn fold_statements<F>(statements: Vec<Statement>, stack: &mut ScopeStack, fold: &mut F) -> Vec<Statement>
where
    F: FnMut(Expression, ScopeId) -> Fold,
{
    statements
        .into_iter()
        .map(|stmt| fold_statement(stmt, stack, fold))
        .collect()
}

pub fn fold_statement<F>(stmt: Statement, stack: &mut ScopeStack, fold: &mut F) -> Statement
where
    F: FnMut(Expression, ScopeId) -> Fold,
{
    match stmt {
        Statement::VariableDeclaration { kind, declarators } => Statement::VariableDeclaration {
            kind,
            declarators: declarators
                .into_iter()
                .map(|mut declarator| {
                    declarator.init = declarator.init.map(|init| fold_expression(init, stack, fold));
                    declarator
                })
                .collect(),
        },
        Statement::FunctionDeclaration(func) => {
            Statement::FunctionDeclaration(Box::new(fold_function(*func, stack, fold)))
        }
        Statement::Expression { expression } => Statement::Expression {
            expression: fold_expression(expression, stack, fold),
        },
        Statement::Block { id, body } => {
            stack.enter(id);
            let body = fold_statements(body, stack, fold);
            stack.leave();
            Statement::Block { id, body }
        }
        Statement::If {
            test,
            consequent,
            alternate,
        } => Statement::If {
            test: fold_expression(test, stack, fold),
            consequent: Box::new(fold_statement(*consequent, stack, fold)),
            alternate: alternate.map(|alt| Box::new(fold_statement(*alt, stack, fold))),
        },
        Statement::Return { argument } => Statement::Return {
            argument: argument.map(|arg| fold_expression(arg, stack, fold)),
        },
        Statement::Labeled { label, body } => Statement::Labeled {
            label,
            body: Box::new(fold_statement(*body, stack, fold)),
        },
        opaque @ Statement::Opaque { .. } => opaque,
    }
}

fn fold_function<F>(mut func: Function, stack: &mut ScopeStack, fold: &mut F) -> Function
where
    F: FnMut(Expression, ScopeId) -> Fold,
{
    stack.enter(func.id);
    func.body = match func.body {
        FunctionBody::Block { statements } => FunctionBody::Block {
            statements: fold_statements(statements, stack, fold),
        },
        FunctionBody::Expression { expression } => FunctionBody::Expression {
            expression: Box::new(fold_expression(*expression, stack, fold)),
        },
    };
    stack.leave();
    func
}

fn fold_boxed<F>(expr: Box<Expression>, stack: &mut ScopeStack, fold: &mut F) -> Box<Expression>
where
    F: FnMut(Expression, ScopeId) -> Fold,
{
    Box::new(fold_expression(*expr, stack, fold))
}

pub fn fold_expression<F>(expr: Expression, stack: &mut ScopeStack, fold: &mut F) -> Expression
where
    F: FnMut(Expression, ScopeId) -> Fold,
{
    let expr = match fold(expr, stack.current()) {
        Fold::Replace(replaced) => return replaced,
        Fold::Continue(expr) => expr,
    };
    match expr {
        Expression::Binary {
            left,
            operator,
            right,
        } => Expression::Binary {
            left: fold_boxed(left, stack, fold),
            operator,
            right: fold_boxed(right, stack, fold),
        },
        Expression::Assignment {
            operator,
            target,
            right,
        } => Expression::Assignment {
            operator,
            target,
            right: fold_boxed(right, stack, fold),
        },
        Expression::Call {
            callee,
            arguments,
            optional,
        } => Expression::Call {
            callee: fold_boxed(callee, stack, fold),
            arguments: arguments
                .into_iter()
                .map(|arg| fold_expression(arg, stack, fold))
                .collect(),
            optional,
        },
        Expression::Member {
            object,
            property,
            optional,
        } => Expression::Member {
            object: fold_boxed(object, stack, fold),
            property,
            optional,
        },
        Expression::Parenthesized { expression } => Expression::Parenthesized {
            expression: fold_boxed(expression, stack, fold),
        },
        Expression::Sequence { expressions } => Expression::Sequence {
            expressions: expressions
                .into_iter()
                .map(|e| fold_expression(e, stack, fold))
                .collect(),
        },
        Expression::Function(func) => {
            Expression::Function(Box::new(fold_function(*func, stack, fold)))
        }
        other @ (Expression::Identifier { .. }
        | Expression::Update { .. }
        | Expression::Opaque { .. }) => other,
    }
}
