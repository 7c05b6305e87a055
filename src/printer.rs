//! Prints the owned script tree back to script text.

use crate::script::{AssignTarget, Expression, Function, FunctionBody, Pattern, Statement};

const INDENT: &str = "  ";

pub fn print_statements(statements: &[Statement]) -> String {
    let mut out = String::new();
    for stmt in statements {
        write_statement(&mut out, stmt, 0);
    }
    out
}

pub fn print_statement(stmt: &Statement) -> String {
    let mut out = String::new();
    write_statement(&mut out, stmt, 0);
    out
}

fn pad(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

fn write_statement(out: &mut String, stmt: &Statement, depth: usize) {
    pad(out, depth);
    write_statement_inline(out, stmt, depth);
    out.push('\n');
}

/// Writes a statement starting at the current column, without trailing newline.
fn write_statement_inline(out: &mut String, stmt: &Statement, depth: usize) {
    match stmt {
        Statement::VariableDeclaration { kind, declarators } => {
            out.push_str(kind.as_str());
            out.push(' ');
            for (i, declarator) in declarators.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                match &declarator.pattern {
                    Pattern::Identifier { name } => out.push_str(name),
                    Pattern::Destructure { source, .. } => out.push_str(source),
                }
                if let Some(init) = &declarator.init {
                    out.push_str(" = ");
                    out.push_str(&print_expression_at(init, depth));
                }
            }
            out.push(';');
        }
        Statement::FunctionDeclaration(func) => write_function(out, func, depth),
        Statement::Expression { expression } => {
            let printed = print_expression_at(expression, depth);
            // A statement may not start with `function` or `{`.
            if printed.starts_with("function") || printed.starts_with('{') {
                out.push('(');
                out.push_str(&printed);
                out.push(')');
            } else {
                out.push_str(&printed);
            }
            out.push(';');
        }
        Statement::Block { body, .. } => write_block(out, body, depth),
        Statement::If {
            test,
            consequent,
            alternate,
        } => {
            out.push_str("if (");
            out.push_str(&print_expression_at(test, depth));
            out.push_str(") ");
            write_nested(out, consequent, depth);
            if let Some(alternate) = alternate {
                out.push_str(" else ");
                write_nested(out, alternate, depth);
            }
        }
        Statement::Return { argument } => {
            out.push_str("return");
            if let Some(argument) = argument {
                out.push(' ');
                out.push_str(&print_expression_at(argument, depth));
            }
            out.push(';');
        }
        Statement::Labeled { label, body } => {
            out.push_str(label);
            out.push_str(": ");
            write_statement_inline(out, body, depth);
        }
        Statement::Opaque { source, .. } => out.push_str(source),
    }
}

/// `if` branches: blocks stay on the same line, anything else is wrapped.
fn write_nested(out: &mut String, stmt: &Statement, depth: usize) {
    match stmt {
        Statement::Block { body, .. } => write_block(out, body, depth),
        Statement::If { .. } => write_statement_inline(out, stmt, depth),
        other => write_block(out, std::slice::from_ref(other), depth),
    }
}

fn write_block(out: &mut String, body: &[Statement], depth: usize) {
    if body.is_empty() {
        out.push_str("{}");
        return;
    }
    out.push_str("{\n");
    for stmt in body {
        write_statement(out, stmt, depth + 1);
    }
    pad(out, depth);
    out.push('}');
}

fn write_function(out: &mut String, func: &Function, depth: usize) {
    if func.is_async {
        out.push_str("async ");
    }
    if func.is_arrow {
        out.push('(');
        out.push_str(&func.params.join(", "));
        out.push_str(") => ");
        match &func.body {
            FunctionBody::Expression { expression } => {
                let printed = print_expression_at(expression, depth);
                if printed.starts_with('{') {
                    out.push('(');
                    out.push_str(&printed);
                    out.push(')');
                } else {
                    out.push_str(&printed);
                }
            }
            FunctionBody::Block { statements } => write_block(out, statements, depth),
        }
        return;
    }
    out.push_str("function");
    if func.is_generator {
        out.push('*');
    }
    if let Some(name) = &func.name {
        out.push(' ');
        out.push_str(name);
    }
    out.push('(');
    out.push_str(&func.params.join(", "));
    out.push_str(") ");
    match &func.body {
        FunctionBody::Block { statements } => write_block(out, statements, depth),
        FunctionBody::Expression { expression } => {
            let body = vec![Statement::Return {
                argument: Some((**expression).clone()),
            }];
            write_block(out, &body, depth)
        }
    }
}

pub fn print_expression(expr: &Expression) -> String {
    print_expression_at(expr, 0)
}

fn print_expression_at(expr: &Expression, depth: usize) -> String {
    let mut out = String::new();
    write_expression(&mut out, expr, depth);
    out
}

fn write_expression(out: &mut String, expr: &Expression, depth: usize) {
    match expr {
        Expression::Identifier { name } => out.push_str(name),
        Expression::Binary {
            left,
            operator,
            right,
        } => {
            write_expression(out, left, depth);
            out.push(' ');
            out.push_str(operator);
            out.push(' ');
            write_expression(out, right, depth);
        }
        Expression::Assignment {
            operator,
            target,
            right,
        } => {
            write_target(out, target, depth);
            out.push(' ');
            out.push_str(operator);
            out.push(' ');
            write_expression(out, right, depth);
        }
        Expression::Update {
            operator,
            prefix,
            target,
        } => {
            if *prefix {
                out.push_str(operator);
                write_target(out, target, depth);
            } else {
                write_target(out, target, depth);
                out.push_str(operator);
            }
        }
        Expression::Call {
            callee,
            arguments,
            optional,
        } => {
            write_callee(out, callee, depth);
            if *optional {
                out.push_str("?.");
            }
            out.push('(');
            for (i, arg) in arguments.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expression(out, arg, depth);
            }
            out.push(')');
        }
        Expression::Member {
            object,
            property,
            optional,
        } => {
            write_callee(out, object, depth);
            out.push_str(if *optional { "?." } else { "." });
            out.push_str(property);
        }
        Expression::Parenthesized { expression } => {
            out.push('(');
            write_expression(out, expression, depth);
            out.push(')');
        }
        Expression::Sequence { expressions } => {
            for (i, e) in expressions.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expression(out, e, depth);
            }
        }
        Expression::Function(func) => write_function(out, func, depth),
        Expression::Opaque { source, .. } => out.push_str(source),
    }
}

/// Callee and member-object position: anything looser than a member chain
/// gets parenthesized.
fn write_callee(out: &mut String, expr: &Expression, depth: usize) {
    match expr {
        Expression::Identifier { .. }
        | Expression::Member { .. }
        | Expression::Call { .. }
        | Expression::Parenthesized { .. }
        | Expression::Opaque { .. } => write_expression(out, expr, depth),
        _ => {
            out.push('(');
            write_expression(out, expr, depth);
            out.push(')');
        }
    }
}

fn write_target(out: &mut String, target: &AssignTarget, depth: usize) {
    match target {
        AssignTarget::Identifier { name } => out.push_str(name),
        AssignTarget::Member { object, property } => {
            write_callee(out, object, depth);
            out.push('.');
            out.push_str(property);
        }
        AssignTarget::Opaque { source, .. } => out.push_str(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{parse_program, NodeIds};

    fn reprint(code: &str) -> String {
        let mut ids = NodeIds::default();
        let program = parse_program(code, 0, &mut ids, "T.svelte", code).unwrap();
        print_statements(&program.body)
    }

    #[test]
    fn test_prints_declarations_and_functions() {
        assert_eq!(
            reprint("let count = 0; function inc(){ count += 1; }"),
            "let count = 0;\nfunction inc() {\n  count += 1;\n}\n"
        );
    }

    #[test]
    fn test_preserves_parentheses() {
        assert_eq!(reprint("x = (a + b) * c;"), "x = (a + b) * c;\n");
    }

    #[test]
    fn test_arrow_and_calls() {
        assert_eq!(
            reprint("const f = (a, b) => a + b; console.log(f(1));"),
            "const f = (a, b) => a + b;\nconsole.log(f(1));\n"
        );
    }

    #[test]
    fn test_if_else_and_updates() {
        assert_eq!(
            reprint("if (a) count++; else { --count; }"),
            "if (a) {\n  count++;\n} else {\n  --count;\n}\n"
        );
    }

    #[test]
    fn test_labeled_statement() {
        assert_eq!(reprint("$: doubled = count * 2"), "$: doubled = count * 2;\n");
    }

    #[test]
    fn test_opaque_passthrough() {
        assert_eq!(reprint("while (x) { x--; }"), "while (x) { x--; }\n");
    }
}
