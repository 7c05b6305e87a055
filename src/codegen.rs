//! Codegen module: client (DOM) target.
//!
//! Emits a factory whose `create`/`update`/`destroy` lifecycle builds,
//! patches and removes the fragment tree, with optional hydration of
//! server-rendered markup.

use std::collections::BTreeSet;

use crate::analyze::{mutated_names, Analysis};
use crate::compile::CompileOptions;
use crate::emit::{
    assign, call, escape_js_string, ident, member, method_call, string, string_array, JsExpr,
    JsStmt, Method, Module, Param,
};
use crate::fragment::{Component, ElementNode, Fragment, HydrationSlot};
use crate::printer::{print_expression, print_statement, print_statements};
use crate::scope::{self, Fold, ScopeId, ScopeStack};
use crate::script::{referenced_names, Expression};

/// Name of the emitted batching dispatcher.
const DISPATCHER: &str = "$$update";
const RECOMPUTE: &str = "$$recompute";
const LIFECYCLE: &str = "$$lifecycle";
const PENDING: &str = "$$pending";
const DISPATCHING: &str = "$$dispatching";
const MOUNTED: &str = "$$mounted";
// Generated names all carry the `$$` prefix, which script bindings must not use.
const TARGET: &str = "$$target";
const HYDRATE: &str = "$$hydrate";
const CHANGED: &str = "$$changed";
const INITIAL: &str = "$$initial";
const BATCH: &str = "$$batch";
const NAME: &str = "$$name";

pub struct ClientOutput {
    pub module: Module,
    /// Hydration slots in the order the create walk adopts them.
    pub hydration: Vec<HydrationSlot>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Script expression as an emission-tree operand.
pub(crate) fn script_expr(expr: &Expression) -> JsExpr {
    match expr {
        Expression::Sequence { .. } => JsExpr::Raw(format!("({})", print_expression(expr))),
        _ => JsExpr::Raw(print_expression(expr)),
    }
}

/// `changed.includes("a")` or `["a", "b"].some(($$name) => changed.includes($$name))`.
pub(crate) fn changed_test(names: &[&str], changed: &str) -> JsExpr {
    if let [single] = names {
        return method_call(ident(changed), "includes", vec![string(single)]);
    }
    method_call(
        string_array(names.iter().copied()),
        "some",
        vec![JsExpr::Arrow(
            vec![NAME.to_string()],
            Box::new(method_call(ident(changed), "includes", vec![ident(NAME)])),
        )],
    )
}

/// `let` declarations for reactive assignees the script never declares.
pub(crate) fn undeclared_assignee_bindings(analysis: &Analysis) -> Vec<JsStmt> {
    analysis
        .undeclared_assignees()
        .into_iter()
        .map(|name| JsStmt::Let(name.to_string(), None))
        .collect()
}

/// Reactive declarations in dependency order. With a batch name every block
/// is guarded by its dependencies and folds its assignees into the batch;
/// without one the bodies run unconditionally.
pub(crate) fn reactive_recomputation(analysis: &Analysis, batch: Option<&str>) -> Vec<JsStmt> {
    let mut out = Vec::new();
    for declaration in &analysis.reactive_declarations {
        let body = JsStmt::Raw(print_statement(&declaration.body));
        let Some(changed) = batch else {
            out.push(body);
            continue;
        };
        let mut block = vec![body];
        for assignee in &declaration.assignees {
            block.push(JsStmt::Expr(method_call(
                ident(changed),
                "push",
                vec![string(assignee)],
            )));
        }
        let dependencies: Vec<&str> = declaration.dependencies.iter().map(String::as_str).collect();
        let test = if dependencies.is_empty() {
            ident(INITIAL)
        } else {
            JsExpr::Binary(
                Box::new(ident(INITIAL)),
                "||",
                Box::new(changed_test(&dependencies, changed)),
            )
        };
        out.push(JsStmt::If { test, body: block });
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCRIPT REWRITING
// ═══════════════════════════════════════════════════════════════════════════════

/// Mutations of root-scope state the template (or a reactive declaration)
/// reads become `(mutation, $$update(["name"]))`.
fn invalidate(
    expr: Expression,
    current: ScopeId,
    analysis: &Analysis,
    invalidated: &BTreeSet<String>,
) -> Fold {
    let names: Vec<String> = mutated_names(&expr)
        .into_iter()
        .filter(|name| invalidated.contains(name) && analysis.scopes.is_root_or_free(current, name))
        .collect();
    if names.is_empty() {
        return Fold::Continue(expr);
    }
    let changed: Vec<String> = names.iter().map(|name| escape_js_string(name)).collect();
    let notify = Expression::Call {
        callee: Box::new(Expression::identifier(DISPATCHER)),
        arguments: vec![Expression::Opaque {
            source: format!("[{}]", changed.join(", ")),
            references: vec![],
        }],
        optional: false,
    };
    Fold::Replace(Expression::Parenthesized {
        expression: Box::new(Expression::Sequence {
            expressions: vec![expr, notify],
        }),
    })
}

fn rewrite_script(component: &Component, analysis: &Analysis) -> String {
    let invalidated = analysis.invalidated();
    let mut stack = ScopeStack::new(&analysis.scopes);
    let rewritten = scope::fold_statements(
        component.script.body.clone(),
        &mut stack,
        &mut |expr, current| invalidate(expr, current, analysis, &invalidated),
    );
    print_statements(&rewritten)
}

fn rewrite_template_expression(expr: &Expression, analysis: &Analysis, invalidated: &BTreeSet<String>) -> Expression {
    let mut stack = ScopeStack::new(&analysis.scopes);
    scope::fold_expression(expr.clone(), &mut stack, &mut |e, current| {
        invalidate(e, current, analysis, invalidated)
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// FRAGMENT WALK
// ═══════════════════════════════════════════════════════════════════════════════

struct ClientGenerator<'a> {
    analysis: &'a Analysis,
    options: &'a CompileOptions,
    invalidated: BTreeSet<String>,
    counter: u32,
    bindings: Vec<String>,
    create: Vec<JsStmt>,
    update: Vec<JsStmt>,
    /// Collected in creation order, emitted reversed.
    destroy: Vec<JsStmt>,
    hydration: Vec<HydrationSlot>,
}

impl<'a> ClientGenerator<'a> {
    fn binding(&mut self, prefix: &str) -> String {
        self.counter += 1;
        let sanitized: String = prefix
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let name = format!("$${}_{}", sanitized, self.counter);
        self.bindings.push(name.clone());
        name
    }

    /// `hydrate ? parent.childNodes[i] : fresh` or just `fresh`.
    fn adopt_or_create(&mut self, parent: &str, index: u32, depth: u32, fresh: JsExpr) -> JsExpr {
        if !self.options.hydratable {
            return fresh;
        }
        self.hydration.push(HydrationSlot { depth, index });
        JsExpr::Conditional(
            Box::new(ident(HYDRATE)),
            Box::new(JsExpr::Index(
                Box::new(member(ident(parent), "childNodes")),
                Box::new(JsExpr::Num(index)),
            )),
            Box::new(fresh),
        )
    }

    fn mount(&mut self, parent: &str, node: &str) {
        let append = JsStmt::Expr(method_call(ident(parent), "appendChild", vec![ident(node)]));
        if self.options.hydratable {
            self.create.push(JsStmt::If {
                test: JsExpr::Unary("!", Box::new(ident(HYDRATE))),
                body: vec![append],
            });
        } else {
            self.create.push(append);
        }
        self.destroy.push(JsStmt::Expr(method_call(
            ident(parent),
            "removeChild",
            vec![ident(node)],
        )));
    }

    /// Register an update rule if the expression reads state that changes.
    fn update_rule(&mut self, expr: &Expression, apply: JsStmt) {
        let dependencies: Vec<String> = referenced_names(expr)
            .into_iter()
            .filter(|name| self.analysis.will_change.contains(name))
            .collect();
        if dependencies.is_empty() {
            return;
        }
        let names: Vec<&str> = dependencies.iter().map(String::as_str).collect();
        self.update.push(JsStmt::If {
            test: changed_test(&names, CHANGED),
            body: vec![apply],
        });
    }

    fn fragments(&mut self, fragments: &[Fragment], parent: &str, depth: u32) {
        // Index into the parent's server-rendered child nodes.
        let mut index = 0u32;
        for fragment in fragments {
            match fragment {
                Fragment::Element(el) => {
                    self.element(el, parent, index, depth);
                    index += 1;
                }
                Fragment::Text(text) => {
                    let fresh = method_call(ident("document"), "createTextNode", vec![string(&text.value)]);
                    self.text_node(parent, index, depth, fresh);
                    // Text node plus its hydration marker comment.
                    index += 2;
                }
                Fragment::Expression(node) => {
                    let value = script_expr(&rewrite_template_expression(
                        &node.expression,
                        self.analysis,
                        &self.invalidated,
                    ));
                    let fresh = method_call(ident("document"), "createTextNode", vec![value.clone()]);
                    let name = self.text_node(parent, index, depth, fresh);
                    self.update_rule(
                        &node.expression,
                        JsStmt::Expr(assign(member(ident(&name), "data"), value)),
                    );
                    index += 2;
                }
            }
        }
    }

    fn text_node(&mut self, parent: &str, index: u32, depth: u32, fresh: JsExpr) -> String {
        let name = self.binding("t");
        let node = self.adopt_or_create(parent, index, depth, fresh);
        self.create.push(JsStmt::Expr(assign(ident(&name), node)));
        self.mount(parent, &name);
        name
    }

    fn element(&mut self, el: &ElementNode, parent: &str, index: u32, depth: u32) {
        let name = self.binding(&el.name);
        let fresh = method_call(ident("document"), "createElement", vec![string(&el.name)]);
        let node = self.adopt_or_create(parent, index, depth, fresh);
        self.create.push(JsStmt::Expr(assign(ident(&name), node)));
        self.mount(parent, &name);

        for attribute in &el.attributes {
            let value = rewrite_template_expression(&attribute.value, self.analysis, &self.invalidated);
            match attribute.event_name(&self.options.event_prefix) {
                Some(event) => {
                    let handler = match &value {
                        Expression::Identifier { name } => ident(name),
                        other => {
                            let handler_name = self.binding(&format!("{}_{}", el.name, event));
                            self.create.push(JsStmt::Expr(assign(
                                ident(&handler_name),
                                script_expr(other),
                            )));
                            ident(&handler_name)
                        }
                    };
                    self.create.push(JsStmt::Expr(method_call(
                        ident(&name),
                        "addEventListener",
                        vec![string(event), handler.clone()],
                    )));
                    self.destroy.push(JsStmt::Expr(method_call(
                        ident(&name),
                        "removeEventListener",
                        vec![string(event), handler],
                    )));
                }
                None => {
                    let set = JsStmt::Expr(method_call(
                        ident(&name),
                        "setAttribute",
                        vec![string(&attribute.name), script_expr(&value)],
                    ));
                    self.create.push(set.clone());
                    self.update_rule(&attribute.value, set);
                }
            }
        }

        self.fragments(&el.children, &name, depth + 1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MODULE ASSEMBLY
// ═══════════════════════════════════════════════════════════════════════════════

fn dispatcher() -> JsStmt {
    let drain = JsStmt::While {
        test: JsExpr::Binary(
            Box::new(member(ident(PENDING), "length")),
            ">",
            Box::new(JsExpr::Num(0)),
        ),
        body: vec![
            JsStmt::Const(BATCH.to_string(), ident(PENDING)),
            JsStmt::Expr(assign(ident(PENDING), JsExpr::Array(vec![]))),
            JsStmt::Expr(call(ident(RECOMPUTE), vec![ident(BATCH)])),
            JsStmt::If {
                test: ident(MOUNTED),
                body: vec![JsStmt::Expr(method_call(
                    ident(LIFECYCLE),
                    "update",
                    vec![ident(BATCH)],
                ))],
            },
        ],
    };
    JsStmt::Function {
        name: DISPATCHER.to_string(),
        params: vec![CHANGED.to_string()],
        body: vec![
            JsStmt::ForOf {
                binding: NAME.to_string(),
                iterable: ident(CHANGED),
                body: vec![JsStmt::If {
                    test: JsExpr::Unary(
                        "!",
                        Box::new(method_call(ident(PENDING), "includes", vec![ident(NAME)])),
                    ),
                    body: vec![JsStmt::Expr(method_call(
                        ident(PENDING),
                        "push",
                        vec![ident(NAME)],
                    ))],
                }],
            },
            // Re-entrant calls, and calls made while the script is still
            // instantiating, only enqueue.
            JsStmt::If {
                test: ident(DISPATCHING),
                body: vec![JsStmt::Raw("return;".to_string())],
            },
            JsStmt::Expr(assign(ident(DISPATCHING), JsExpr::Bool(true))),
            // Cleared even when a reactive block or an update throws.
            JsStmt::Try {
                body: vec![drain],
                finalizer: vec![JsStmt::Expr(assign(ident(DISPATCHING), JsExpr::Bool(false)))],
            },
        ],
    }
}

pub fn generate_client(component: &Component, analysis: &Analysis, options: &CompileOptions) -> ClientOutput {
    let mut generator = ClientGenerator {
        analysis,
        options,
        invalidated: analysis.invalidated(),
        counter: 0,
        bindings: Vec::new(),
        create: Vec::new(),
        update: Vec::new(),
        destroy: Vec::new(),
        hydration: Vec::new(),
    };
    generator.fragments(&component.html, TARGET, 0);

    let ClientGenerator {
        bindings,
        mut create,
        update,
        mut destroy,
        hydration,
        ..
    } = generator;

    let mut body = undeclared_assignee_bindings(analysis);
    body.push(JsStmt::Let(PENDING.to_string(), Some(JsExpr::Array(vec![]))));
    // Held until instantiation finishes: top-level script mutations enqueue
    // instead of running reactive code against bindings not yet initialized.
    body.push(JsStmt::Let(DISPATCHING.to_string(), Some(JsExpr::Bool(true))));
    body.push(JsStmt::Let(MOUNTED.to_string(), Some(JsExpr::Bool(false))));
    body.extend(bindings.into_iter().map(|name| JsStmt::Let(name, None)));

    let script = rewrite_script(component, analysis);
    if !script.is_empty() {
        body.push(JsStmt::Raw(script));
    }

    body.push(JsStmt::Function {
        name: RECOMPUTE.to_string(),
        params: vec![CHANGED.to_string(), format!("{} = false", INITIAL)],
        body: reactive_recomputation(analysis, Some(CHANGED)),
    });
    body.push(dispatcher());
    if !analysis.reactive_declarations.is_empty() {
        body.push(JsStmt::Expr(call(
            ident(RECOMPUTE),
            vec![JsExpr::Array(vec![]), JsExpr::Bool(true)],
        )));
    }
    // The initial pass already covers anything queued during instantiation.
    body.push(JsStmt::Expr(assign(ident(PENDING), JsExpr::Array(vec![]))));
    body.push(JsStmt::Expr(assign(ident(DISPATCHING), JsExpr::Bool(false))));

    create.push(JsStmt::Expr(assign(ident(MOUNTED), JsExpr::Bool(true))));
    destroy.reverse();
    destroy.push(JsStmt::Expr(assign(ident(MOUNTED), JsExpr::Bool(false))));

    let mut create_params = vec![Param {
        name: TARGET.to_string(),
        default: None,
    }];
    if options.hydratable {
        create_params.push(Param {
            name: HYDRATE.to_string(),
            default: Some(JsExpr::Binary(
                Box::new(member(member(ident(TARGET), "childNodes"), "length")),
                ">",
                Box::new(JsExpr::Num(0)),
            )),
        });
    }

    let lifecycle = JsExpr::Object(vec![
        Method {
            name: "create".to_string(),
            params: create_params,
            body: create,
        },
        Method {
            name: "update".to_string(),
            params: vec![Param {
                name: CHANGED.to_string(),
                default: None,
            }],
            body: update,
        },
        Method {
            name: "destroy".to_string(),
            params: vec![Param {
                name: TARGET.to_string(),
                default: None,
            }],
            body: destroy,
        },
    ]);
    body.push(JsStmt::Const(LIFECYCLE.to_string(), lifecycle));
    body.push(JsStmt::Return(ident(LIFECYCLE)));

    ClientOutput {
        module: Module { body },
        hydration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_test_single() {
        let printed = crate::emit::print_module(&Module {
            body: vec![JsStmt::Expr(changed_test(&["count"], CHANGED))],
        });
        assert!(printed.contains("$$changed.includes(\"count\");"));
    }

    #[test]
    fn test_changed_test_multiple() {
        let printed = crate::emit::print_module(&Module {
            body: vec![JsStmt::Expr(changed_test(&["a", "b"], CHANGED))],
        });
        assert!(printed.contains("[\"a\", \"b\"].some(($$name) => $$changed.includes($$name));"));
    }
}
