//! Parse Module
//!
//! Single forward cursor over component source. Markup is parsed by hand; the
//! script block and every `{expression}` are delegated to the oxc parser via
//! `crate::script`.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{line_column, CompilerError, ERR_UNEXPECTED_INPUT};
use crate::fragment::{AttributeNode, Component, ElementNode, ExpressionNode, Fragment, TextNode};
use crate::script::{self, Expression, NodeIds, Program};

const SCRIPT_OPEN: &str = "<script>";
const SCRIPT_CLOSE: &str = "</script>";

lazy_static! {
    static ref TAG_NAME_RE: Regex = Regex::new(r"^[a-zA-Z][a-zA-Z0-9-]*").unwrap();
    static ref ATTRIBUTE_NAME_RE: Regex = Regex::new(r"^[^\s=>/{}]+").unwrap();
    static ref TEXT_RE: Regex = Regex::new(r"^[^<{]+").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPRESSION BOUNDARIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Find the `}` closing the brace at `start_index`, skipping strings and
/// template literals. Returns the byte index of that `}`.
fn find_balanced_brace_end(source: &str, start_index: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string: Option<char> = None;
    // Brace depth saved when entering each `${` of a template literal.
    let mut template_stack: Vec<usize> = Vec::new();
    let mut in_template_literal = false;
    let mut chars = source[start_index..].char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c == '\\' && (in_string.is_some() || in_template_literal) {
            chars.next();
            continue;
        }

        if let Some(quote) = in_string {
            if c == quote {
                in_string = None;
            }
            continue;
        }

        if in_template_literal {
            if c == '`' {
                in_template_literal = false;
            } else if c == '$' && matches!(chars.peek(), Some((_, '{'))) {
                chars.next();
                template_stack.push(depth);
                depth += 1;
                in_template_literal = false;
            }
            continue;
        }

        match c {
            '"' | '\'' => in_string = Some(c),
            '`' => in_template_literal = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if template_stack.last() == Some(&depth) {
                    template_stack.pop();
                    in_template_literal = true;
                } else if depth == 0 {
                    return Some(start_index + i);
                }
            }
            _ => {}
        }
    }

    None
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSER
// ═══════════════════════════════════════════════════════════════════════════════

struct MarkupParser<'s> {
    source: &'s str,
    file: &'s str,
    index: usize,
    ids: NodeIds,
    script: Option<Program>,
}

impl<'s> MarkupParser<'s> {
    fn rest(&self) -> &'s str {
        &self.source[self.index..]
    }

    fn at_end(&self) -> bool {
        self.index >= self.source.len()
    }

    fn matches(&self, literal: &str) -> bool {
        self.rest().starts_with(literal)
    }

    fn eat(&mut self, literal: &str) -> Result<(), CompilerError> {
        if self.matches(literal) {
            self.index += literal.len();
            Ok(())
        } else {
            Err(CompilerError::expected(
                literal,
                self.file,
                self.source,
                self.index,
            ))
        }
    }

    fn read_while(&mut self, re: &Regex) -> &'s str {
        let rest = self.rest();
        match re.find(rest) {
            Some(m) => {
                self.index += m.end();
                &rest[..m.end()]
            }
            None => "",
        }
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        let trimmed = rest.trim_start();
        self.index += rest.len() - trimmed.len();
    }

    /// Fragments until input ends or `until` matches at the cursor.
    fn parse_fragments(&mut self, until: Option<&str>) -> Result<Vec<Fragment>, CompilerError> {
        let mut fragments = Vec::new();
        while !self.at_end() {
            if let Some(end) = until {
                if self.matches(end) {
                    break;
                }
            }
            let start = self.index;
            match self.parse_fragment()? {
                Some(fragment) => fragments.push(fragment),
                // Script blocks and whitespace-only runs consume input without producing a node.
                None if self.index > start => {}
                None => {
                    return Err(match until {
                        Some(end) => CompilerError::expected(end, self.file, self.source, start),
                        None => CompilerError::new(
                            ERR_UNEXPECTED_INPUT,
                            &format!(
                                "Parse error: unexpected {:?} at offset {}",
                                self.rest().chars().next().unwrap_or_default(),
                                start
                            ),
                            self.file,
                            self.source,
                            start,
                        ),
                    });
                }
            }
        }
        Ok(fragments)
    }

    fn parse_fragment(&mut self) -> Result<Option<Fragment>, CompilerError> {
        if self.parse_script()? {
            return Ok(None);
        }
        if let Some(element) = self.parse_element()? {
            return Ok(Some(element));
        }
        if let Some(expression) = self.parse_interpolation()? {
            return Ok(Some(expression));
        }
        Ok(self.parse_text())
    }

    fn parse_script(&mut self) -> Result<bool, CompilerError> {
        if !self.matches(SCRIPT_OPEN) {
            return Ok(false);
        }
        self.eat(SCRIPT_OPEN)?;
        let start = self.index;
        let end = match self.rest().find(SCRIPT_CLOSE) {
            Some(relative) => start + relative,
            None => {
                return Err(CompilerError::expected(
                    SCRIPT_CLOSE,
                    self.file,
                    self.source,
                    self.source.len(),
                ))
            }
        };
        let code = &self.source[start..end];
        log::trace!("script block at {}..{}", start, end);
        let program = script::parse_program(code, start, &mut self.ids, self.file, self.source)?;
        self.script = Some(program);
        self.index = end;
        self.eat(SCRIPT_CLOSE)?;
        Ok(true)
    }

    fn parse_element(&mut self) -> Result<Option<Fragment>, CompilerError> {
        if !self.matches("<") || !TAG_NAME_RE.is_match(&self.rest()[1..]) {
            return Ok(None);
        }
        let offset = self.index;
        self.eat("<")?;
        let name = self.read_while(&TAG_NAME_RE).to_string();
        let attributes = self.parse_attribute_list()?;
        self.eat(">")?;

        let end_tag = format!("</{}>", name);
        let source = self.source;
        let unclosed = |e: CompilerError| {
            if e.expected.as_deref() == Some(end_tag.as_str()) {
                let (line, column) = line_column(source, offset);
                e.with_hint(format!("<{}> opened at {}:{} is never closed", name, line, column))
            } else {
                e
            }
        };
        let children = self.parse_fragments(Some(&end_tag)).map_err(&unclosed)?;
        self.eat(&end_tag).map_err(&unclosed)?;

        Ok(Some(Fragment::Element(ElementNode {
            name,
            attributes,
            children,
            offset: offset as u32,
        })))
    }

    fn parse_attribute_list(&mut self) -> Result<Vec<AttributeNode>, CompilerError> {
        let mut attributes = Vec::new();
        self.skip_whitespace();
        while !self.at_end() && !self.matches(">") {
            attributes.push(self.parse_attribute()?);
            self.skip_whitespace();
        }
        Ok(attributes)
    }

    fn parse_attribute(&mut self) -> Result<AttributeNode, CompilerError> {
        let name = self.read_while(&ATTRIBUTE_NAME_RE).to_string();
        if name.is_empty() {
            return Err(CompilerError::expected(">", self.file, self.source, self.index));
        }
        self.eat("=")?;
        self.eat("{")?;
        let value = self.parse_javascript()?;
        self.eat("}")?;
        Ok(AttributeNode { name, value })
    }

    fn parse_interpolation(&mut self) -> Result<Option<Fragment>, CompilerError> {
        if !self.matches("{") {
            return Ok(None);
        }
        self.eat("{")?;
        let expression = self.parse_javascript()?;
        self.eat("}")?;
        Ok(Some(Fragment::Expression(ExpressionNode { expression })))
    }

    /// Parse one expression starting at the cursor (just past `{`) and advance
    /// to the closing `}`.
    fn parse_javascript(&mut self) -> Result<Expression, CompilerError> {
        let (expression, end) = parse_expression_at(
            self.source,
            self.index,
            &mut self.ids,
            self.file,
        )?;
        self.index = end;
        Ok(expression)
    }

    fn parse_text(&mut self) -> Option<Fragment> {
        let text = self.read_while(&TEXT_RE);
        if text.trim().is_empty() {
            return None;
        }
        Some(Fragment::Text(TextNode {
            value: text.to_string(),
        }))
    }
}

/// Parse the expression that starts at `offset` (just after an opening `{`).
/// Returns the expression and the offset of its closing `}`.
pub fn parse_expression_at(
    source: &str,
    offset: usize,
    ids: &mut NodeIds,
    file: &str,
) -> Result<(Expression, usize), CompilerError> {
    // Scan from the opening brace so depth starts at one.
    let open = offset.saturating_sub(1);
    let end = match source.get(open..open + 1) {
        Some("{") => find_balanced_brace_end(source, open),
        _ => None,
    }
    .ok_or_else(|| CompilerError::expected("}", file, source, source.len()))?;
    let code = &source[offset..end];
    let expression = script::parse_expression(code, offset, ids, file, source)?;
    Ok((expression, end))
}

/// Parse component source into its fragment tree and script program.
pub fn parse(source: &str, file: &str) -> Result<Component, CompilerError> {
    let mut parser = MarkupParser {
        source,
        file,
        index: 0,
        ids: NodeIds::default(),
        script: None,
    };
    let html = parser.parse_fragments(None)?;
    log::debug!(
        "parsed {}: {} top-level fragments, script: {}",
        file,
        html.len(),
        parser.script.is_some()
    );
    Ok(Component {
        html,
        script: parser.script.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_balanced_brace() {
        assert_eq!(find_balanced_brace_end("{hello}", 0), Some(6));
        assert_eq!(find_balanced_brace_end("{a + b}", 0), Some(6));
        assert_eq!(find_balanced_brace_end("{obj.map(x => { return x; })}", 0), Some(28));
        assert_eq!(
            find_balanced_brace_end("{'string with } brace'}", 0),
            Some(22)
        );
        assert_eq!(find_balanced_brace_end("{`a ${b} }`}", 0), Some(11));
        assert_eq!(find_balanced_brace_end("{unclosed", 0), None);
    }

    #[test]
    fn test_parse_expression_at_returns_end() {
        let src = "<p>{count + 1}</p>";
        let mut ids = NodeIds::default();
        let (expr, end) = parse_expression_at(src, 4, &mut ids, "T.svelte").unwrap();
        assert_eq!(end, 13);
        assert!(matches!(expr, Expression::Binary { .. }));
    }
}
