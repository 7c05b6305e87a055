//! Server target: a render function returning the component's markup as one
//! template literal. Every text or interpolation node is followed by a marker
//! comment so the client can hydrate node by node.

use std::collections::BTreeSet;

use crate::analyze::Analysis;
use crate::codegen::{reactive_recomputation, script_expr, undeclared_assignee_bindings};
use crate::compile::CompileOptions;
use crate::emit::{call, ident, string, JsExpr, JsStmt, Module, TemplatePart};
use crate::fragment::{Component, ElementNode, Fragment, HydrationSlot};
use crate::printer::print_statements;
use crate::script::{function_references, referenced_names, statement_references, Statement};

/// Separates adjacent text nodes in rendered markup.
pub const HYDRATION_MARKER: &str = "<!---->";
const ESCAPE: &str = "$$escape";
/// Rendered in place of an empty interpolation: markup has no empty text
/// nodes, and a missing one would shift every later hydration index.
const EMPTY_TEXT: &str = "\u{200b}";

pub struct ServerOutput {
    pub module: Module,
    /// Hydration slots in the order the markup produces them.
    pub hydration: Vec<HydrationSlot>,
}

struct ServerGenerator<'a> {
    options: &'a CompileOptions,
    parts: Vec<TemplatePart>,
    hydration: Vec<HydrationSlot>,
}

impl<'a> ServerGenerator<'a> {
    fn literal(&mut self, text: &str) {
        if let Some(TemplatePart::Literal(last)) = self.parts.last_mut() {
            last.push_str(text);
            return;
        }
        self.parts.push(TemplatePart::Literal(text.to_string()));
    }

    fn escaped(&mut self, value: JsExpr) {
        self.parts
            .push(TemplatePart::Slot(call(ident(ESCAPE), vec![value])));
    }

    fn fragments(&mut self, fragments: &[Fragment], depth: u32) {
        let mut index = 0u32;
        for fragment in fragments {
            self.hydration.push(HydrationSlot { depth, index });
            match fragment {
                Fragment::Element(el) => {
                    self.element(el, depth);
                    index += 1;
                }
                Fragment::Text(text) => {
                    self.literal(&text.value);
                    self.literal(HYDRATION_MARKER);
                    index += 2;
                }
                Fragment::Expression(node) => {
                    let text = call(ident(ESCAPE), vec![script_expr(&node.expression)]);
                    self.parts.push(TemplatePart::Slot(JsExpr::Binary(
                        Box::new(text),
                        "||",
                        Box::new(string(EMPTY_TEXT)),
                    )));
                    self.literal(HYDRATION_MARKER);
                    index += 2;
                }
            }
        }
    }

    fn element(&mut self, el: &ElementNode, depth: u32) {
        self.literal(&format!("<{}", el.name));
        for attribute in &el.attributes {
            if attribute.event_name(&self.options.event_prefix).is_some() {
                continue;
            }
            self.literal(&format!(" {}=\"", attribute.name));
            self.escaped(script_expr(&attribute.value));
            self.literal("\"");
        }
        self.literal(">");
        self.fragments(&el.children, depth + 1);
        self.literal(&format!("</{}>", el.name));
    }
}

/// What the script's top level reads as it runs, and for each top-level
/// function binding, what its body reads if something calls it.
#[derive(Default)]
struct TopLevelReferences {
    eager: BTreeSet<String>,
    functions: Vec<(String, Vec<String>)>,
}

fn top_level_references(statements: &[Statement]) -> TopLevelReferences {
    let mut refs = TopLevelReferences::default();
    for stmt in statements {
        match stmt {
            Statement::VariableDeclaration { declarators, .. } => {
                for declarator in declarators {
                    let Some(init) = &declarator.init else { continue };
                    if init.is_function() {
                        for name in declarator.pattern.names() {
                            refs.functions.push((name.to_string(), referenced_names(init)));
                        }
                    } else {
                        refs.eager.extend(referenced_names(init));
                    }
                }
            }
            Statement::FunctionDeclaration(func) => {
                if let Some(name) = &func.name {
                    refs.functions.push((name.clone(), function_references(func)));
                }
            }
            other => refs.eager.extend(statement_references(other)),
        }
    }
    refs
}

/// Names render time can reach: eager top-level reads, template reads,
/// reactive bodies, and transitively whatever a reachable function reads.
fn reachable_names(statements: &[Statement], analysis: &Analysis) -> BTreeSet<String> {
    let TopLevelReferences {
        eager: mut needed,
        functions,
    } = top_level_references(statements);
    needed.extend(analysis.will_use_in_template.iter().cloned());
    for declaration in &analysis.reactive_declarations {
        needed.extend(statement_references(&declaration.body));
    }
    loop {
        let before = needed.len();
        for (name, reads) in &functions {
            if needed.contains(name) {
                needed.extend(reads.iter().cloned());
            }
        }
        if needed.len() == before {
            return needed;
        }
    }
}

/// Drop top-level declarators initialized with a function nothing at render
/// time can call: handlers only matter in the browser.
fn elide_unused_functions(statements: &[Statement], analysis: &Analysis) -> Vec<Statement> {
    let needed = reachable_names(statements, analysis);

    let mut out = Vec::with_capacity(statements.len());
    for stmt in statements {
        let Statement::VariableDeclaration { kind, declarators } = stmt else {
            out.push(stmt.clone());
            continue;
        };
        let kept: Vec<_> = declarators
            .iter()
            .filter(|declarator| {
                let is_function = declarator.init.as_ref().is_some_and(|init| init.is_function());
                !is_function || declarator.pattern.names().iter().any(|name| needed.contains(*name))
            })
            .cloned()
            .collect();
        if kept.is_empty() {
            log::trace!("elided server-side function declaration");
            continue;
        }
        out.push(Statement::VariableDeclaration {
            kind: *kind,
            declarators: kept,
        });
    }
    out
}

fn escape_helper() -> JsStmt {
    JsStmt::Function {
        name: ESCAPE.to_string(),
        params: vec!["value".to_string()],
        body: vec![JsStmt::Return(JsExpr::Raw(
            "String(value).replace(/&/g, \"&amp;\").replace(/</g, \"&lt;\").replace(/>/g, \"&gt;\").replace(/\"/g, \"&quot;\")"
                .to_string(),
        ))],
    }
}

pub fn generate_server(component: &Component, analysis: &Analysis, options: &CompileOptions) -> ServerOutput {
    let mut generator = ServerGenerator {
        options,
        parts: Vec::new(),
        hydration: Vec::new(),
    };
    generator.fragments(&component.html, 0);
    let ServerGenerator {
        parts, hydration, ..
    } = generator;

    let mut body = undeclared_assignee_bindings(analysis);
    let script = print_statements(&elide_unused_functions(&component.script.body, analysis));
    if !script.is_empty() {
        body.push(JsStmt::Raw(script));
    }
    body.extend(reactive_recomputation(analysis, None));
    if parts.iter().any(|part| matches!(part, TemplatePart::Slot(_))) {
        body.push(escape_helper());
    }
    body.push(JsStmt::Return(JsExpr::Template(parts)));

    ServerOutput {
        module: Module { body },
        hydration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{parse_program, NodeIds};

    fn statements(code: &str) -> Vec<Statement> {
        let mut ids = NodeIds::default();
        parse_program(code, 0, &mut ids, "T.svelte", code).unwrap().body
    }

    #[test]
    fn test_eager_references_skip_function_bodies() {
        let refs = top_level_references(&statements(
            "const fmt = (n) => helper(n); let label = fmt(count); log(label);",
        ));
        let eager: Vec<String> = refs.eager.into_iter().collect();
        assert_eq!(eager, vec!["count", "fmt", "label", "log"]);
        assert_eq!(refs.functions, vec![("fmt".to_string(), vec!["helper".to_string()])]);
    }

    #[test]
    fn test_keeps_function_called_inside_if_block() {
        let kept = elide_unused_functions(
            &statements("let n = 0; const setup = () => { n = 5; }; if (true) { setup(); }"),
            &Analysis::default(),
        );
        assert!(print_statements(&kept).contains("const setup = "));
    }

    #[test]
    fn test_keeps_function_called_inside_loop() {
        let kept = elide_unused_functions(
            &statements("const setup = () => 1; for (const x of [1]) { setup(); }"),
            &Analysis::default(),
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_keeps_functions_reached_through_other_functions() {
        let kept = elide_unused_functions(
            &statements("const helper = () => 1; const unused = () => 2; function init() { helper(); } init();"),
            &Analysis::default(),
        );
        let printed = print_statements(&kept);
        assert!(printed.contains("const helper = "));
        assert!(!printed.contains("unused"));
    }

    #[test]
    fn test_elides_unreferenced_handler() {
        let analysis = Analysis::default();
        let kept = elide_unused_functions(
            &statements("let count = 0; const inc = () => count++;"),
            &analysis,
        );
        assert_eq!(print_statements(&kept), "let count = 0;\n");
    }

    #[test]
    fn test_keeps_function_used_by_template() {
        let mut analysis = Analysis::default();
        analysis.will_use_in_template.insert("format".to_string());
        let kept = elide_unused_functions(
            &statements("const format = (n) => n * 2;"),
            &analysis,
        );
        assert_eq!(kept.len(), 1);
    }
}
