//! Script Module
//!
//! Owned syntax tree for the embedded behavior script, lowered from the oxc
//! arena AST. Only the node kinds the analyzer and generators inspect are
//! modelled; everything else is kept as `Opaque` source text.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    self, Argument, AssignmentTarget, BindingPattern, Expression as OxcExpression,
    SimpleAssignmentTarget, Statement as OxcStatement, VariableDeclarationKind,
};
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use serde::Serialize;

use crate::error::{CompilerError, ERR_SCRIPT_SYNTAX};

/// Identity of a scope-introducing node (function or block).
pub type NodeId = u32;

// ═══════════════════════════════════════════════════════════════════════════════
// TREE TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Statement {
    VariableDeclaration {
        kind: DeclarationKind,
        declarators: Vec<Declarator>,
    },
    FunctionDeclaration(Box<Function>),
    Expression {
        expression: Expression,
    },
    Block {
        id: NodeId,
        body: Vec<Statement>,
    },
    If {
        test: Expression,
        consequent: Box<Statement>,
        alternate: Option<Box<Statement>>,
    },
    Return {
        argument: Option<Expression>,
    },
    Labeled {
        label: String,
        body: Box<Statement>,
    },
    Opaque {
        source: String,
        /// Free identifier references inside the statement text.
        references: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DeclarationKind {
    Var,
    Let,
    Const,
}

impl DeclarationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeclarationKind::Var => "var",
            DeclarationKind::Let => "let",
            DeclarationKind::Const => "const",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Declarator {
    pub pattern: Pattern,
    pub init: Option<Expression>,
}

/// A binding site. Destructuring is kept as source text plus the names it binds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Pattern {
    Identifier { name: String },
    Destructure { source: String, names: Vec<String> },
}

impl Pattern {
    pub fn names(&self) -> Vec<&str> {
        match self {
            Pattern::Identifier { name } => vec![name.as_str()],
            Pattern::Destructure { names, .. } => names.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    pub id: NodeId,
    pub name: Option<String>,
    pub is_arrow: bool,
    pub is_async: bool,
    pub is_generator: bool,
    /// Each parameter's full source text (defaults and rest included).
    pub params: Vec<String>,
    pub param_names: Vec<String>,
    pub body: FunctionBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FunctionBody {
    Block { statements: Vec<Statement> },
    /// Concise arrow body: `x => x + 1`.
    Expression { expression: Box<Expression> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Expression {
    Identifier {
        name: String,
    },
    Binary {
        left: Box<Expression>,
        operator: String,
        right: Box<Expression>,
    },
    Assignment {
        operator: String,
        target: AssignTarget,
        right: Box<Expression>,
    },
    Update {
        operator: String,
        prefix: bool,
        target: AssignTarget,
    },
    Call {
        callee: Box<Expression>,
        arguments: Vec<Expression>,
        optional: bool,
    },
    Member {
        object: Box<Expression>,
        property: String,
        optional: bool,
    },
    Parenthesized {
        expression: Box<Expression>,
    },
    Sequence {
        expressions: Vec<Expression>,
    },
    Function(Box<Function>),
    Opaque {
        source: String,
        /// Free-looking identifier references found inside the opaque text.
        references: Vec<String>,
    },
}

impl Expression {
    pub fn identifier(name: &str) -> Self {
        Expression::Identifier {
            name: name.to_string(),
        }
    }

    pub fn is_function(&self) -> bool {
        match self {
            Expression::Function(_) => true,
            Expression::Parenthesized { expression } => expression.is_function(),
            _ => false,
        }
    }
}

/// Left-hand side of an assignment or operand of `++`/`--`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AssignTarget {
    Identifier {
        name: String,
    },
    Member {
        object: Box<Expression>,
        property: String,
    },
    Opaque {
        source: String,
        names: Vec<String>,
    },
}

impl AssignTarget {
    /// Binding names whose value changes when this target is written.
    /// A member write (`obj.x = 1`) changes the root object binding.
    pub fn names(&self) -> Vec<String> {
        match self {
            AssignTarget::Identifier { name } => vec![name.clone()],
            AssignTarget::Member { object, .. } => root_identifier(object).into_iter().collect(),
            AssignTarget::Opaque { names, .. } => names.clone(),
        }
    }
}

fn root_identifier(expr: &Expression) -> Option<String> {
    match expr {
        Expression::Identifier { name } => Some(name.clone()),
        Expression::Member { object, .. } => root_identifier(object),
        Expression::Parenthesized { expression } => root_identifier(expression),
        Expression::Opaque { references, .. } => references.first().cloned(),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSING (oxc delegate)
// ═══════════════════════════════════════════════════════════════════════════════

/// Hands out node ids. One generator is shared by the script block and every
/// template expression of a component so ids never collide.
#[derive(Debug, Default)]
pub struct NodeIds {
    next: NodeId,
}

impl NodeIds {
    pub fn next(&mut self) -> NodeId {
        let id = self.next;
        self.next += 1;
        id
    }
}

fn source_type() -> SourceType {
    SourceType::default().with_module(true)
}

/// Parse a full script program. `base_offset` is where `code` starts in the
/// component source, used to place diagnostics.
pub fn parse_program(
    code: &str,
    base_offset: usize,
    ids: &mut NodeIds,
    file: &str,
    component_source: &str,
) -> Result<Program, CompilerError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, source_type()).parse();

    if let Some(error) = ret.errors.first() {
        return Err(CompilerError::new(
            ERR_SCRIPT_SYNTAX,
            &format!("Invalid script: {}", error),
            file,
            component_source,
            base_offset,
        ));
    }

    let mut lowerer = Lowerer { source: code, ids };
    let mut body = Vec::new();
    for directive in &ret.program.directives {
        body.push(Statement::Opaque {
            source: lowerer.text(directive.span),
            references: Vec::new(),
        });
    }
    for stmt in &ret.program.body {
        body.push(lowerer.statement(stmt));
    }

    Ok(Program { body })
}

/// Parse one expression from an exact substring (no surrounding braces).
pub fn parse_expression(
    code: &str,
    base_offset: usize,
    ids: &mut NodeIds,
    file: &str,
    component_source: &str,
) -> Result<Expression, CompilerError> {
    let allocator = Allocator::default();
    match Parser::new(&allocator, code, source_type()).parse_expression() {
        Ok(expr) => {
            let mut lowerer = Lowerer { source: code, ids };
            Ok(lowerer.expression(&expr))
        }
        Err(errors) => {
            let message = errors
                .first()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown syntax error".to_string());
            Err(CompilerError::new(
                ERR_SCRIPT_SYNTAX,
                &format!("Invalid expression syntax: {}", message),
                file,
                component_source,
                base_offset,
            ))
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOWERING
// ═══════════════════════════════════════════════════════════════════════════════

struct Lowerer<'s, 'i> {
    source: &'s str,
    ids: &'i mut NodeIds,
}

impl<'s, 'i> Lowerer<'s, 'i> {
    fn text(&self, span: Span) -> String {
        self.source[span.start as usize..span.end as usize].to_string()
    }

    fn statement(&mut self, stmt: &OxcStatement) -> Statement {
        match stmt {
            OxcStatement::VariableDeclaration(decl) => {
                let kind = match decl.kind {
                    VariableDeclarationKind::Var => DeclarationKind::Var,
                    VariableDeclarationKind::Let => DeclarationKind::Let,
                    VariableDeclarationKind::Const => DeclarationKind::Const,
                    _ => return self.opaque_statement(stmt),
                };
                let declarators = decl
                    .declarations
                    .iter()
                    .map(|d| Declarator {
                        pattern: self.pattern(&d.id),
                        init: d.init.as_ref().map(|e| self.expression(e)),
                    })
                    .collect();
                Statement::VariableDeclaration { kind, declarators }
            }
            OxcStatement::FunctionDeclaration(func) => {
                Statement::FunctionDeclaration(Box::new(self.function(func)))
            }
            OxcStatement::ExpressionStatement(expr_stmt) => Statement::Expression {
                expression: self.expression(&expr_stmt.expression),
            },
            OxcStatement::BlockStatement(block) => {
                let id = self.ids.next();
                Statement::Block {
                    id,
                    body: block.body.iter().map(|s| self.statement(s)).collect(),
                }
            }
            OxcStatement::IfStatement(if_stmt) => Statement::If {
                test: self.expression(&if_stmt.test),
                consequent: Box::new(self.statement(&if_stmt.consequent)),
                alternate: if_stmt
                    .alternate
                    .as_ref()
                    .map(|alt| Box::new(self.statement(alt))),
            },
            OxcStatement::ReturnStatement(ret) => Statement::Return {
                argument: ret.argument.as_ref().map(|e| self.expression(e)),
            },
            OxcStatement::LabeledStatement(labeled) => Statement::Labeled {
                label: labeled.label.name.to_string(),
                body: Box::new(self.statement(&labeled.body)),
            },
            _ => self.opaque_statement(stmt),
        }
    }

    fn opaque_statement(&self, stmt: &OxcStatement) -> Statement {
        let mut collector = ReferenceCollector::default();
        collector.visit_statement(stmt);
        Statement::Opaque {
            source: self.text(stmt.span()),
            references: collector.free_references(),
        }
    }

    fn function(&mut self, func: &ast::Function) -> Function {
        let id = self.ids.next();
        let statements = func
            .body
            .as_ref()
            .map(|body| body.statements.iter().map(|s| self.statement(s)).collect())
            .unwrap_or_default();
        Function {
            id,
            name: func.id.as_ref().map(|ident| ident.name.to_string()),
            is_arrow: false,
            is_async: func.r#async,
            is_generator: func.generator,
            params: self.params(&func.params),
            param_names: binding_names_of_params(&func.params),
            body: FunctionBody::Block { statements },
        }
    }

    fn arrow(&mut self, func: &ast::ArrowFunctionExpression) -> Function {
        let id = self.ids.next();
        let body = if func.expression {
            match func.body.statements.first() {
                Some(OxcStatement::ExpressionStatement(stmt)) => FunctionBody::Expression {
                    expression: Box::new(self.expression(&stmt.expression)),
                },
                _ => FunctionBody::Block { statements: vec![] },
            }
        } else {
            FunctionBody::Block {
                statements: func
                    .body
                    .statements
                    .iter()
                    .map(|s| self.statement(s))
                    .collect(),
            }
        };
        Function {
            id,
            name: None,
            is_arrow: true,
            is_async: func.r#async,
            is_generator: false,
            params: self.params(&func.params),
            param_names: binding_names_of_params(&func.params),
            body,
        }
    }

    fn params(&self, params: &ast::FormalParameters) -> Vec<String> {
        let mut out: Vec<String> = params.items.iter().map(|p| self.text(p.span)).collect();
        if let Some(rest) = &params.rest {
            out.push(self.text(rest.span));
        }
        out
    }

    fn pattern(&self, pattern: &BindingPattern) -> Pattern {
        match pattern {
            BindingPattern::BindingIdentifier(ident) => Pattern::Identifier {
                name: ident.name.to_string(),
            },
            _ => {
                let mut collector = BindingNameCollector::default();
                collector.visit_binding_pattern(pattern);
                Pattern::Destructure {
                    source: self.text(pattern.span()),
                    names: collector.names,
                }
            }
        }
    }

    fn expression(&mut self, expr: &OxcExpression) -> Expression {
        match expr {
            OxcExpression::Identifier(ident) => Expression::Identifier {
                name: ident.name.to_string(),
            },
            OxcExpression::BinaryExpression(bin) => Expression::Binary {
                left: Box::new(self.expression(&bin.left)),
                operator: bin.operator.as_str().to_string(),
                right: Box::new(self.expression(&bin.right)),
            },
            OxcExpression::LogicalExpression(logical) => Expression::Binary {
                left: Box::new(self.expression(&logical.left)),
                operator: logical.operator.as_str().to_string(),
                right: Box::new(self.expression(&logical.right)),
            },
            OxcExpression::AssignmentExpression(assign) => Expression::Assignment {
                operator: assign.operator.as_str().to_string(),
                target: self.assignment_target(&assign.left),
                right: Box::new(self.expression(&assign.right)),
            },
            OxcExpression::UpdateExpression(update) => Expression::Update {
                operator: update.operator.as_str().to_string(),
                prefix: update.prefix,
                target: self.simple_target(&update.argument),
            },
            OxcExpression::CallExpression(call) => Expression::Call {
                callee: Box::new(self.expression(&call.callee)),
                arguments: call.arguments.iter().map(|a| self.argument(a)).collect(),
                optional: call.optional,
            },
            OxcExpression::StaticMemberExpression(member) => Expression::Member {
                object: Box::new(self.expression(&member.object)),
                property: member.property.name.to_string(),
                optional: member.optional,
            },
            OxcExpression::ParenthesizedExpression(paren) => Expression::Parenthesized {
                expression: Box::new(self.expression(&paren.expression)),
            },
            OxcExpression::SequenceExpression(seq) => Expression::Sequence {
                expressions: seq.expressions.iter().map(|e| self.expression(e)).collect(),
            },
            OxcExpression::FunctionExpression(func) => {
                Expression::Function(Box::new(self.function(func)))
            }
            OxcExpression::ArrowFunctionExpression(arrow) => {
                Expression::Function(Box::new(self.arrow(arrow)))
            }
            _ => self.opaque_expression(expr),
        }
    }

    fn opaque_expression(&self, expr: &OxcExpression) -> Expression {
        let mut collector = ReferenceCollector::default();
        collector.visit_expression(expr);
        Expression::Opaque {
            source: self.text(expr.span()),
            references: collector.free_references(),
        }
    }

    fn argument(&mut self, arg: &Argument) -> Expression {
        match arg.as_expression() {
            Some(expr) => self.expression(expr),
            None => {
                let mut collector = ReferenceCollector::default();
                collector.visit_argument(arg);
                Expression::Opaque {
                    source: self.text(arg.span()),
                    references: collector.free_references(),
                }
            }
        }
    }

    fn assignment_target(&mut self, target: &AssignmentTarget) -> AssignTarget {
        match target {
            AssignmentTarget::AssignmentTargetIdentifier(ident) => AssignTarget::Identifier {
                name: ident.name.to_string(),
            },
            AssignmentTarget::StaticMemberExpression(member) => AssignTarget::Member {
                object: Box::new(self.expression(&member.object)),
                property: member.property.name.to_string(),
            },
            _ => {
                let mut collector = ReferenceCollector::default();
                collector.visit_assignment_target(target);
                AssignTarget::Opaque {
                    source: self.text(target.span()),
                    names: collector.free_references(),
                }
            }
        }
    }

    fn simple_target(&mut self, target: &SimpleAssignmentTarget) -> AssignTarget {
        match target {
            SimpleAssignmentTarget::AssignmentTargetIdentifier(ident) => AssignTarget::Identifier {
                name: ident.name.to_string(),
            },
            SimpleAssignmentTarget::StaticMemberExpression(member) => AssignTarget::Member {
                object: Box::new(self.expression(&member.object)),
                property: member.property.name.to_string(),
            },
            _ => {
                let mut collector = ReferenceCollector::default();
                collector.visit_simple_assignment_target(target);
                AssignTarget::Opaque {
                    source: self.text(target.span()),
                    names: collector.free_references(),
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLECTORS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct BindingNameCollector {
    names: Vec<String>,
}

impl<'a> Visit<'a> for BindingNameCollector {
    fn visit_binding_identifier(&mut self, ident: &ast::BindingIdentifier<'a>) {
        let name = ident.name.to_string();
        if !self.names.contains(&name) {
            self.names.push(name);
        }
    }
}

fn binding_names_of_params(params: &ast::FormalParameters) -> Vec<String> {
    let mut collector = BindingNameCollector::default();
    collector.visit_formal_parameters(params);
    collector.names
}

/// References inside an opaque subtree, minus names that subtree binds itself.
#[derive(Default)]
struct ReferenceCollector {
    references: Vec<String>,
    bindings: Vec<String>,
}

impl ReferenceCollector {
    fn free_references(self) -> Vec<String> {
        let bindings = self.bindings;
        let mut out: Vec<String> = Vec::new();
        for name in self.references {
            if !bindings.contains(&name) && !out.contains(&name) {
                out.push(name);
            }
        }
        out
    }
}

impl<'a> Visit<'a> for ReferenceCollector {
    fn visit_identifier_reference(&mut self, ident: &ast::IdentifierReference<'a>) {
        self.references.push(ident.name.to_string());
    }

    fn visit_binding_identifier(&mut self, ident: &ast::BindingIdentifier<'a>) {
        self.bindings.push(ident.name.to_string());
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// QUERIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Identifier references of an expression, in first-appearance order.
/// Recurses through binary operations, calls, members, sequences and
/// assignment right-hand sides. A nested function contributes its free
/// references: names it reads that are not its parameters or locals.
pub fn referenced_names(expr: &Expression) -> Vec<String> {
    let mut names = Vec::new();
    collect_references(expr, &mut names);
    names
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

fn collect_references(expr: &Expression, names: &mut Vec<String>) {
    match expr {
        Expression::Identifier { name } => push_unique(names, name),
        Expression::Binary { left, right, .. } => {
            collect_references(left, names);
            collect_references(right, names);
        }
        Expression::Assignment { target, right, .. } => {
            if let AssignTarget::Member { object, .. } = target {
                collect_references(object, names);
            }
            collect_references(right, names);
        }
        Expression::Update { target, .. } => {
            for name in target.names() {
                push_unique(names, &name);
            }
        }
        Expression::Call {
            callee, arguments, ..
        } => {
            collect_references(callee, names);
            for arg in arguments {
                collect_references(arg, names);
            }
        }
        Expression::Member { object, .. } => collect_references(object, names),
        Expression::Parenthesized { expression } => collect_references(expression, names),
        Expression::Sequence { expressions } => {
            for e in expressions {
                collect_references(e, names);
            }
        }
        Expression::Function(func) => {
            for name in function_references(func) {
                push_unique(names, &name);
            }
        }
        Expression::Opaque { references, .. } => {
            for name in references {
                push_unique(names, name);
            }
        }
    }
}

/// Names a function reads from its enclosing scopes.
///
/// Locals are collected per function rather than per block, so a name
/// declared in any nested block of the body counts as local everywhere in it.
pub fn function_references(func: &Function) -> Vec<String> {
    let mut inner = Vec::new();
    let mut locals = func.param_names.clone();
    locals.extend(func.name.iter().cloned());
    match &func.body {
        FunctionBody::Expression { expression } => collect_references(expression, &mut inner),
        FunctionBody::Block { statements } => {
            for stmt in statements {
                collect_statement(stmt, &mut inner, &mut locals);
            }
        }
    }
    inner.retain(|name| !locals.contains(name));
    inner
}

/// Identifier references of a statement, nested function bodies included,
/// minus the names the statement itself declares.
pub fn statement_references(stmt: &Statement) -> Vec<String> {
    let mut names = Vec::new();
    let mut locals = Vec::new();
    collect_statement(stmt, &mut names, &mut locals);
    names.retain(|name| !locals.contains(name));
    names
}

fn collect_statement(stmt: &Statement, names: &mut Vec<String>, locals: &mut Vec<String>) {
    match stmt {
        Statement::VariableDeclaration { declarators, .. } => {
            for declarator in declarators {
                locals.extend(declarator.pattern.names().into_iter().map(String::from));
                if let Some(init) = &declarator.init {
                    collect_references(init, names);
                }
            }
        }
        Statement::FunctionDeclaration(func) => {
            locals.extend(func.name.iter().cloned());
            for name in function_references(func) {
                push_unique(names, &name);
            }
        }
        Statement::Expression { expression } => collect_references(expression, names),
        Statement::Block { body, .. } => {
            for s in body {
                collect_statement(s, names, locals);
            }
        }
        Statement::If {
            test,
            consequent,
            alternate,
        } => {
            collect_references(test, names);
            collect_statement(consequent, names, locals);
            if let Some(alternate) = alternate {
                collect_statement(alternate, names, locals);
            }
        }
        Statement::Return { argument } => {
            if let Some(argument) = argument {
                collect_references(argument, names);
            }
        }
        Statement::Labeled { body, .. } => collect_statement(body, names, locals),
        Statement::Opaque { references, .. } => {
            for name in references {
                push_unique(names, name);
            }
        }
    }
}
