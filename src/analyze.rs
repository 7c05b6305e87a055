//! Reactivity analysis.
//!
//! Classifies root-scope bindings as will-change / used-in-template, pulls
//! `$:` reactive declarations out of the program and orders them so producers
//! run before consumers.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::fragment::{AttributeNode, Component, ExpressionNode, Fragment};
use crate::scope::{self, ScopeStack, ScopeTree};
use crate::script::{referenced_names, AssignTarget, Expression, Statement};
use crate::visitor::{template_expressions, FragmentVisitor};

/// Label marking a reactive declaration: `$: doubled = count * 2`.
pub const REACTIVE_LABEL: &str = "$";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactiveDeclaration {
    /// Position among the program's top-level statements.
    pub source_index: usize,
    /// The labeled statement's body.
    pub body: Statement,
    pub dependencies: Vec<String>,
    pub assignees: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub variables: BTreeSet<String>,
    pub will_change: BTreeSet<String>,
    pub will_use_in_template: BTreeSet<String>,
    /// In execution order.
    pub reactive_declarations: Vec<ReactiveDeclaration>,
    #[serde(skip)]
    pub scopes: ScopeTree,
}

impl Analysis {
    /// Names whose root-scope mutation must notify the update dispatcher:
    /// everything the template reads plus every reactive dependency.
    pub fn invalidated(&self) -> BTreeSet<String> {
        let mut names = self.will_use_in_template.clone();
        for declaration in &self.reactive_declarations {
            names.extend(declaration.dependencies.iter().cloned());
        }
        names
    }

    /// Reactive assignees the script never declares.
    pub fn undeclared_assignees(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for declaration in &self.reactive_declarations {
            for name in &declaration.assignees {
                if !self.variables.contains(name) && !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
        }
        out
    }
}

/// Analyze a parsed component. Reactive declarations are removed from
/// `component.script` and returned in the analysis instead. Attributes named
/// with `event_prefix` are listeners, not rendered values, and do not count
/// as template reads.
pub fn analyze(component: &mut Component, event_prefix: &str) -> Analysis {
    let scopes = scope::resolve(&component.script, template_expressions(&component.html));
    let variables = scopes.root_names();

    let mut will_change = BTreeSet::new();
    let reactive = extract_reactive_declarations(&mut component.script.body);
    for declaration in &reactive {
        will_change.extend(declaration.assignees.iter().cloned());
    }

    {
        let mut stack = ScopeStack::new(&scopes);
        let mut record = |expr: &Expression, scope| {
            for name in mutated_names(expr) {
                if scopes.is_root_or_free(scope, &name) {
                    will_change.insert(name);
                }
            }
        };
        scope::walk_statements(&component.script.body, &mut stack, &mut record);
        for expr in template_expressions(&component.html) {
            scope::walk_expression(expr, &mut stack, &mut record);
        }
    }

    let analysis = Analysis {
        variables,
        will_change,
        will_use_in_template: template_references(&component.html, event_prefix),
        reactive_declarations: order_reactive_declarations(reactive),
        scopes,
    };
    log::debug!(
        "analysis: {} variables, will_change={:?}, will_use_in_template={:?}, {} reactive declarations",
        analysis.variables.len(),
        analysis.will_change,
        analysis.will_use_in_template,
        analysis.reactive_declarations.len()
    );
    analysis
}

/// Target names written by an assignment or update expression.
pub fn mutated_names(expr: &Expression) -> Vec<String> {
    match expr {
        Expression::Assignment { target, .. } | Expression::Update { target, .. } => {
            target.names()
        }
        _ => Vec::new(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REACTIVE DECLARATIONS
// ═══════════════════════════════════════════════════════════════════════════════

fn extract_reactive_declarations(body: &mut Vec<Statement>) -> Vec<ReactiveDeclaration> {
    let mut declarations = Vec::new();
    let mut kept = Vec::with_capacity(body.len());

    for (source_index, stmt) in std::mem::take(body).into_iter().enumerate() {
        match stmt {
            Statement::Labeled { label, body } if label == REACTIVE_LABEL => {
                let mut dependencies = Vec::new();
                let mut assignees = Vec::new();
                collect_reactive_statement(&body, &mut dependencies, &mut assignees);
                dependencies.retain(|name| !assignees.contains(name));
                declarations.push(ReactiveDeclaration {
                    source_index,
                    body: *body,
                    dependencies,
                    assignees,
                });
            }
            other => kept.push(other),
        }
    }

    *body = kept;
    declarations
}

fn push_unique(list: &mut Vec<String>, name: String) {
    if !list.contains(&name) {
        list.push(name);
    }
}

fn collect_reactive_statement(stmt: &Statement, deps: &mut Vec<String>, assignees: &mut Vec<String>) {
    match stmt {
        Statement::Expression { expression } => collect_reactive_expression(expression, deps, assignees),
        Statement::Block { body, .. } => {
            for s in body {
                collect_reactive_statement(s, deps, assignees);
            }
        }
        Statement::If {
            test,
            consequent,
            alternate,
        } => {
            collect_reactive_expression(test, deps, assignees);
            collect_reactive_statement(consequent, deps, assignees);
            if let Some(alternate) = alternate {
                collect_reactive_statement(alternate, deps, assignees);
            }
        }
        Statement::VariableDeclaration { declarators, .. } => {
            for declarator in declarators {
                if let Some(init) = &declarator.init {
                    collect_reactive_expression(init, deps, assignees);
                }
            }
        }
        Statement::Return { argument: Some(argument) } => {
            collect_reactive_expression(argument, deps, assignees)
        }
        Statement::Labeled { body, .. } => collect_reactive_statement(body, deps, assignees),
        Statement::FunctionDeclaration(_) | Statement::Return { argument: None } | Statement::Opaque { .. } => {}
    }
}

fn collect_reactive_expression(expr: &Expression, deps: &mut Vec<String>, assignees: &mut Vec<String>) {
    match expr {
        Expression::Assignment {
            operator,
            target,
            right,
        } => {
            if let AssignTarget::Member { object, .. } = target {
                for name in referenced_names(object) {
                    push_unique(deps, name);
                }
            } else if operator != "=" {
                // Compound assignment reads its target.
                for name in target.names() {
                    push_unique(deps, name);
                }
            }
            collect_reactive_expression(right, deps, assignees);
            for name in target.names() {
                push_unique(assignees, name);
            }
        }
        Expression::Sequence { expressions } => {
            for e in expressions {
                collect_reactive_expression(e, deps, assignees);
            }
        }
        Expression::Parenthesized { expression } => {
            collect_reactive_expression(expression, deps, assignees)
        }
        other => {
            for name in referenced_names(other) {
                push_unique(deps, name);
            }
        }
    }
}

/// Stable topological order: a declaration runs after every declaration that
/// assigns one of its dependencies; otherwise source order is kept. Members
/// of a dependency cycle keep their source order.
pub fn order_reactive_declarations(declarations: Vec<ReactiveDeclaration>) -> Vec<ReactiveDeclaration> {
    let count = declarations.len();
    // producers[i] = indices of declarations that must run before i
    let producers: Vec<Vec<usize>> = (0..count)
        .map(|i| {
            (0..count)
                .filter(|&j| {
                    j != i
                        && declarations[i]
                            .dependencies
                            .iter()
                            .any(|dep| declarations[j].assignees.contains(dep))
                })
                .collect()
        })
        .collect();

    let mut placed = vec![false; count];
    let mut order = Vec::with_capacity(count);
    while order.len() < count {
        let ready = (0..count)
            .filter(|&i| !placed[i])
            .find(|&i| producers[i].iter().all(|&j| placed[j]));
        // A cycle leaves nothing ready; fall back to the earliest pending one.
        let next = match ready {
            Some(i) => i,
            None => match (0..count).find(|&i| !placed[i]) {
                Some(i) => i,
                None => break,
            },
        };
        placed[next] = true;
        order.push(next);
    }

    let mut slots: Vec<Option<ReactiveDeclaration>> = declarations.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE REFERENCES
// ═══════════════════════════════════════════════════════════════════════════════

struct TemplateReferenceCollector<'p> {
    event_prefix: &'p str,
    names: BTreeSet<String>,
}

impl FragmentVisitor for TemplateReferenceCollector<'_> {
    fn visit_attribute(&mut self, attribute: &AttributeNode) {
        if attribute.event_name(self.event_prefix).is_none() {
            self.names.extend(referenced_names(&attribute.value));
        }
    }

    fn visit_expression(&mut self, expression: &ExpressionNode) {
        self.names.extend(referenced_names(&expression.expression));
    }
}

/// Every name the rendered fragment tree reads.
pub fn template_references(fragments: &[Fragment], event_prefix: &str) -> BTreeSet<String> {
    let mut collector = TemplateReferenceCollector {
        event_prefix,
        names: BTreeSet::new(),
    };
    collector.visit_fragments(fragments);
    collector.names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Statement;

    fn declaration(index: usize, deps: &[&str], assignees: &[&str]) -> ReactiveDeclaration {
        ReactiveDeclaration {
            source_index: index,
            body: Statement::Opaque {
                source: String::new(),
                references: Vec::new(),
            },
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            assignees: assignees.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn indices(list: &[ReactiveDeclaration]) -> Vec<usize> {
        list.iter().map(|d| d.source_index).collect()
    }

    #[test]
    fn test_order_producer_before_consumer() {
        let ordered = order_reactive_declarations(vec![
            declaration(0, &["b"], &["c"]),
            declaration(1, &["a"], &["b"]),
        ]);
        assert_eq!(indices(&ordered), vec![1, 0]);
    }

    #[test]
    fn test_order_keeps_source_order_for_independent() {
        let ordered = order_reactive_declarations(vec![
            declaration(0, &["x"], &["y"]),
            declaration(1, &["p"], &["q"]),
            declaration(2, &["m"], &["n"]),
        ]);
        assert_eq!(indices(&ordered), vec![0, 1, 2]);
    }

    #[test]
    fn test_order_chain_across_unrelated() {
        // 0 depends on 2, 1 is unrelated: a plain comparator sort can get this wrong.
        let ordered = order_reactive_declarations(vec![
            declaration(0, &["z"], &["out"]),
            declaration(1, &["u"], &["v"]),
            declaration(2, &["a"], &["z"]),
        ]);
        let position = |i: usize| ordered.iter().position(|d| d.source_index == i).unwrap();
        assert!(position(2) < position(0));
    }

    #[test]
    fn test_order_cycle_terminates() {
        let ordered = order_reactive_declarations(vec![
            declaration(0, &["b"], &["a"]),
            declaration(1, &["a"], &["b"]),
        ]);
        assert_eq!(ordered.len(), 2);
    }
}
