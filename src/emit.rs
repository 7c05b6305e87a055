//! Typed emission tree for generated modules, plus its printer.
//!
//! Generators build `JsStmt`/`JsExpr` values; only `print_module` turns them
//! into text.

const INDENT: &str = "  ";

#[derive(Debug, Clone, PartialEq)]
pub enum JsStmt {
    Let(String, Option<JsExpr>),
    Const(String, JsExpr),
    Expr(JsExpr),
    If { test: JsExpr, body: Vec<JsStmt> },
    Return(JsExpr),
    Function {
        name: String,
        params: Vec<String>,
        body: Vec<JsStmt>,
    },
    While { test: JsExpr, body: Vec<JsStmt> },
    ForOf {
        binding: String,
        iterable: JsExpr,
        body: Vec<JsStmt>,
    },
    Try {
        body: Vec<JsStmt>,
        finalizer: Vec<JsStmt>,
    },
    /// Pre-printed script code (possibly several lines).
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum JsExpr {
    Ident(String),
    Str(String),
    Num(u32),
    Bool(bool),
    Array(Vec<JsExpr>),
    Member(Box<JsExpr>, String),
    Index(Box<JsExpr>, Box<JsExpr>),
    Call(Box<JsExpr>, Vec<JsExpr>),
    Assign(Box<JsExpr>, Box<JsExpr>),
    Unary(&'static str, Box<JsExpr>),
    Binary(Box<JsExpr>, &'static str, Box<JsExpr>),
    Conditional(Box<JsExpr>, Box<JsExpr>, Box<JsExpr>),
    Arrow(Vec<String>, Box<JsExpr>),
    Object(Vec<Method>),
    Template(Vec<TemplatePart>),
    /// Pre-printed script expression.
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<JsStmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<JsExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Literal(String),
    Slot(JsExpr),
}

/// `export default function() { body }`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub body: Vec<JsStmt>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILDERS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn ident(name: &str) -> JsExpr {
    JsExpr::Ident(name.to_string())
}

pub fn string(value: &str) -> JsExpr {
    JsExpr::Str(value.to_string())
}

pub fn member(object: JsExpr, property: &str) -> JsExpr {
    JsExpr::Member(Box::new(object), property.to_string())
}

pub fn call(callee: JsExpr, args: Vec<JsExpr>) -> JsExpr {
    JsExpr::Call(Box::new(callee), args)
}

/// `object.method(args)`
pub fn method_call(object: JsExpr, method: &str, args: Vec<JsExpr>) -> JsExpr {
    call(member(object, method), args)
}

pub fn assign(target: JsExpr, value: JsExpr) -> JsExpr {
    JsExpr::Assign(Box::new(target), Box::new(value))
}

pub fn string_array<'a>(names: impl IntoIterator<Item = &'a str>) -> JsExpr {
    JsExpr::Array(names.into_iter().map(string).collect())
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRINTER
// ═══════════════════════════════════════════════════════════════════════════════

pub fn print_module(module: &Module) -> String {
    let mut printer = Printer::default();
    printer.out.push_str("export default function() {\n");
    printer.statements(&module.body, 1);
    printer.out.push_str("}\n");
    printer.out
}

#[derive(Default)]
struct Printer {
    out: String,
}

impl Printer {
    fn pad(&mut self, depth: usize) {
        for _ in 0..depth {
            self.out.push_str(INDENT);
        }
    }

    fn statements(&mut self, body: &[JsStmt], depth: usize) {
        for stmt in body {
            self.statement(stmt, depth);
        }
    }

    fn block(&mut self, body: &[JsStmt], depth: usize) {
        self.out.push_str("{\n");
        self.statements(body, depth + 1);
        self.pad(depth);
        self.out.push('}');
    }

    fn statement(&mut self, stmt: &JsStmt, depth: usize) {
        if let JsStmt::Raw(code) = stmt {
            for (line, in_template) in code.lines().zip(template_line_starts(code)) {
                // Padding here would change the literal's value.
                if in_template {
                    self.out.push_str(line);
                    self.out.push('\n');
                    continue;
                }
                if line.trim().is_empty() {
                    self.out.push('\n');
                    continue;
                }
                self.pad(depth);
                self.out.push_str(line);
                self.out.push('\n');
            }
            return;
        }

        self.pad(depth);
        match stmt {
            JsStmt::Let(name, init) => {
                self.out.push_str("let ");
                self.out.push_str(name);
                if let Some(init) = init {
                    self.out.push_str(" = ");
                    self.expression(init, depth);
                }
                self.out.push(';');
            }
            JsStmt::Const(name, init) => {
                self.out.push_str("const ");
                self.out.push_str(name);
                self.out.push_str(" = ");
                self.expression(init, depth);
                self.out.push(';');
            }
            JsStmt::Expr(expr) => {
                self.expression(expr, depth);
                self.out.push(';');
            }
            JsStmt::If { test, body } => {
                self.out.push_str("if (");
                self.expression(test, depth);
                self.out.push_str(") ");
                self.block(body, depth);
            }
            JsStmt::Return(expr) => {
                self.out.push_str("return ");
                self.expression(expr, depth);
                self.out.push(';');
            }
            JsStmt::Function { name, params, body } => {
                self.out.push_str("function ");
                self.out.push_str(name);
                self.out.push('(');
                self.out.push_str(&params.join(", "));
                self.out.push_str(") ");
                self.block(body, depth);
            }
            JsStmt::While { test, body } => {
                self.out.push_str("while (");
                self.expression(test, depth);
                self.out.push_str(") ");
                self.block(body, depth);
            }
            JsStmt::ForOf {
                binding,
                iterable,
                body,
            } => {
                self.out.push_str("for (const ");
                self.out.push_str(binding);
                self.out.push_str(" of ");
                self.expression(iterable, depth);
                self.out.push_str(") ");
                self.block(body, depth);
            }
            JsStmt::Try { body, finalizer } => {
                self.out.push_str("try ");
                self.block(body, depth);
                self.out.push_str(" finally ");
                self.block(finalizer, depth);
            }
            JsStmt::Raw(_) => {}
        }
        self.out.push('\n');
    }

    fn expression(&mut self, expr: &JsExpr, depth: usize) {
        match expr {
            JsExpr::Ident(name) => self.out.push_str(name),
            JsExpr::Str(value) => self.out.push_str(&escape_js_string(value)),
            JsExpr::Num(n) => self.out.push_str(&n.to_string()),
            JsExpr::Bool(b) => self.out.push_str(if *b { "true" } else { "false" }),
            JsExpr::Array(items) => {
                self.out.push('[');
                self.list(items, depth);
                self.out.push(']');
            }
            JsExpr::Member(object, property) => {
                self.operand(object, depth);
                self.out.push('.');
                self.out.push_str(property);
            }
            JsExpr::Index(object, index) => {
                self.operand(object, depth);
                self.out.push('[');
                self.expression(index, depth);
                self.out.push(']');
            }
            JsExpr::Call(callee, args) => {
                self.operand(callee, depth);
                self.out.push('(');
                self.list(args, depth);
                self.out.push(')');
            }
            JsExpr::Assign(target, value) => {
                self.expression(target, depth);
                self.out.push_str(" = ");
                self.expression(value, depth);
            }
            JsExpr::Unary(op, operand) => {
                self.out.push_str(op);
                self.operand(operand, depth);
            }
            JsExpr::Binary(left, op, right) => {
                self.operand(left, depth);
                self.out.push(' ');
                self.out.push_str(op);
                self.out.push(' ');
                self.operand(right, depth);
            }
            JsExpr::Conditional(test, consequent, alternate) => {
                self.operand(test, depth);
                self.out.push_str(" ? ");
                self.operand(consequent, depth);
                self.out.push_str(" : ");
                self.operand(alternate, depth);
            }
            JsExpr::Arrow(params, body) => {
                self.out.push('(');
                self.out.push_str(&params.join(", "));
                self.out.push_str(") => ");
                self.operand(body, depth);
            }
            JsExpr::Object(methods) => {
                if methods.is_empty() {
                    self.out.push_str("{}");
                    return;
                }
                self.out.push_str("{\n");
                for method in methods {
                    self.pad(depth + 1);
                    self.out.push_str(&method.name);
                    self.out.push('(');
                    for (i, param) in method.params.iter().enumerate() {
                        if i > 0 {
                            self.out.push_str(", ");
                        }
                        self.out.push_str(&param.name);
                        if let Some(default) = &param.default {
                            self.out.push_str(" = ");
                            self.expression(default, depth + 1);
                        }
                    }
                    self.out.push_str(") ");
                    self.block(&method.body, depth + 1);
                    self.out.push_str(",\n");
                }
                self.pad(depth);
                self.out.push('}');
            }
            JsExpr::Template(parts) => {
                self.out.push('`');
                for part in parts {
                    match part {
                        TemplatePart::Literal(text) => self.out.push_str(&escape_template(text)),
                        TemplatePart::Slot(expr) => {
                            self.out.push_str("${");
                            self.expression(expr, depth);
                            self.out.push('}');
                        }
                    }
                }
                self.out.push('`');
            }
            JsExpr::Raw(code) => self.out.push_str(code),
        }
    }

    /// Operands of member access, calls and operators: compound children are
    /// parenthesized so the printed precedence matches the tree.
    fn operand(&mut self, expr: &JsExpr, depth: usize) {
        match expr {
            JsExpr::Assign(..)
            | JsExpr::Binary(..)
            | JsExpr::Conditional(..)
            | JsExpr::Arrow(..)
            | JsExpr::Raw(_) => {
                self.out.push('(');
                self.expression(expr, depth);
                self.out.push(')');
            }
            _ => self.expression(expr, depth),
        }
    }

    fn list(&mut self, items: &[JsExpr], depth: usize) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expression(item, depth);
        }
    }
}

/// Escape a value as a double-quoted JS string literal.
pub fn escape_js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            '\u{200b}' => out.push_str("\\u200b"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[derive(Clone, Copy)]
enum Context {
    /// Script code, with the number of `{` still open in it.
    Code(u32),
    /// Text of a template literal.
    Template,
}

/// For each line of `code`, whether it starts inside the text of a template
/// literal. Strings, comments and `${}` substitutions are followed; regular
/// expression literals are not.
fn template_line_starts(code: &str) -> Vec<bool> {
    let mut stack = vec![Context::Code(0)];
    let mut starts = vec![false];
    let mut chars = code.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' {
            starts.push(matches!(stack.last(), Some(Context::Template)));
            continue;
        }
        match stack.last().copied() {
            Some(Context::Template) => match c {
                '\\' => {
                    if chars.next() == Some('\n') {
                        starts.push(true);
                    }
                }
                '`' => {
                    stack.pop();
                }
                '$' if chars.peek() == Some(&'{') => {
                    chars.next();
                    stack.push(Context::Code(0));
                }
                _ => {}
            },
            Some(Context::Code(braces)) => match c {
                '`' => stack.push(Context::Template),
                '{' => {
                    stack.pop();
                    stack.push(Context::Code(braces + 1));
                }
                '}' if braces > 0 => {
                    stack.pop();
                    stack.push(Context::Code(braces - 1));
                }
                // Closes a `${` substitution.
                '}' if stack.len() > 1 => {
                    stack.pop();
                }
                '"' | '\'' => {
                    while let Some(next) = chars.next() {
                        match next {
                            '\\' => {
                                if chars.next() == Some('\n') {
                                    starts.push(false);
                                }
                            }
                            '\n' => {
                                starts.push(false);
                                break;
                            }
                            _ if next == c => break,
                            _ => {}
                        }
                    }
                }
                '/' if chars.peek() == Some(&'/') => {
                    while chars.peek().is_some_and(|&next| next != '\n') {
                        chars.next();
                    }
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    let mut previous = ' ';
                    for next in chars.by_ref() {
                        if next == '\n' {
                            starts.push(false);
                        }
                        if previous == '*' && next == '/' {
                            break;
                        }
                        previous = next;
                    }
                }
                _ => {}
            },
            None => {}
        }
    }
    starts
}

/// Escape literal text for a template literal body.
pub fn escape_template(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace("${", "\\${")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_js_string() {
        assert_eq!(escape_js_string("hello"), "\"hello\"");
        assert_eq!(escape_js_string("say \"hi\"\n"), "\"say \\\"hi\\\"\\n\"");
    }

    #[test]
    fn test_escape_template() {
        assert_eq!(escape_template("a`b${c}\\"), "a\\`b\\${c}\\\\");
    }

    #[test]
    fn test_print_if_with_call() {
        let module = Module {
            body: vec![JsStmt::If {
                test: method_call(ident("changed"), "includes", vec![string("count")]),
                body: vec![JsStmt::Expr(assign(
                    member(ident("t_1"), "data"),
                    ident("count"),
                ))],
            }],
        };
        assert_eq!(
            print_module(&module),
            "export default function() {\n  if (changed.includes(\"count\")) {\n    t_1.data = count;\n  }\n}\n"
        );
    }

    #[test]
    fn test_print_object_methods_and_defaults() {
        let object = JsExpr::Object(vec![Method {
            name: "create".into(),
            params: vec![
                Param {
                    name: "target".into(),
                    default: None,
                },
                Param {
                    name: "hydrate".into(),
                    default: Some(JsExpr::Bool(false)),
                },
            ],
            body: vec![],
        }]);
        let module = Module {
            body: vec![JsStmt::Return(object)],
        };
        assert_eq!(
            print_module(&module),
            "export default function() {\n  return {\n    create(target, hydrate = false) {\n    },\n  };\n}\n"
        );
    }

    #[test]
    fn test_raw_statements_are_reindented() {
        let module = Module {
            body: vec![JsStmt::Raw("function f() {\n  return 1;\n}\n".into())],
        };
        assert_eq!(
            print_module(&module),
            "export default function() {\n  function f() {\n    return 1;\n  }\n}\n"
        );
    }

    #[test]
    fn test_raw_template_literal_lines_keep_their_text() {
        let code = "const s = `a\n  b ${ {k: 1}.k }\nc`;\nfunction f() {\n  return s;\n}\n";
        let module = Module {
            body: vec![JsStmt::Raw(code.into())],
        };
        assert_eq!(
            print_module(&module),
            "export default function() {\n  const s = `a\n  b ${ {k: 1}.k }\nc`;\n  function f() {\n    return s;\n  }\n}\n"
        );
    }

    #[test]
    fn test_template_line_starts_ignore_backticks_in_strings_and_comments() {
        let code = "let a = \"`\";\n// `\nlet b = `x\ny`;\nlet c = 1;";
        assert_eq!(template_line_starts(code), vec![false, false, false, true, false]);
    }

    #[test]
    fn test_print_try_finally() {
        let module = Module {
            body: vec![JsStmt::Try {
                body: vec![JsStmt::Expr(call(ident("run"), vec![]))],
                finalizer: vec![JsStmt::Expr(assign(ident("busy"), JsExpr::Bool(false)))],
            }],
        };
        assert_eq!(
            print_module(&module),
            "export default function() {\n  try {\n    run();\n  } finally {\n    busy = false;\n  }\n}\n"
        );
    }

    #[test]
    fn test_template_literal() {
        let expr = JsExpr::Template(vec![
            TemplatePart::Literal("<p>".into()),
            TemplatePart::Slot(ident("count")),
            TemplatePart::Literal("</p>".into()),
        ]);
        let module = Module {
            body: vec![JsStmt::Return(expr)],
        };
        assert_eq!(
            print_module(&module),
            "export default function() {\n  return `<p>${count}</p>`;\n}\n"
        );
    }
}
