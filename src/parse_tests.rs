//! Markup parser tests: fragment structure, script extraction and the
//! parse failures that abort a compilation.

#[cfg(test)]
mod tests {
    use crate::error::{ERR_EXPECTED_LITERAL, ERR_SCRIPT_SYNTAX, ERR_UNEXPECTED_INPUT};
    use crate::fragment::Fragment;
    use crate::parse::parse;
    use crate::script::{Expression, Statement};

    fn element_names(fragments: &[Fragment]) -> Vec<&str> {
        fragments
            .iter()
            .filter_map(|f| match f {
                Fragment::Element(el) => Some(el.name.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_counter_component_structure() {
        let source = "<script>let count = 0; function inc(){ count += 1; }</script><button on:click={inc}>{count}</button>";
        let component = parse(source, "Counter.svelte").unwrap();

        assert_eq!(component.script.body.len(), 2);
        assert_eq!(component.html.len(), 1);
        let Fragment::Element(button) = &component.html[0] else {
            panic!("expected element");
        };
        assert_eq!(button.name, "button");
        assert_eq!(button.attributes.len(), 1);
        assert_eq!(button.attributes[0].name, "on:click");
        assert_eq!(button.attributes[0].event_name("on:"), Some("click"));
        assert_eq!(button.attributes[0].value, Expression::identifier("inc"));
        assert!(matches!(
            &button.children[..],
            [Fragment::Expression(e)] if e.expression == Expression::identifier("count")
        ));
    }

    #[test]
    fn test_whitespace_only_text_is_dropped() {
        let component = parse("<div>\n  <p>hi</p>\n</div>\n", "T.svelte").unwrap();
        let Fragment::Element(div) = &component.html[0] else {
            panic!("expected element");
        };
        assert_eq!(component.html.len(), 1);
        assert_eq!(element_names(&div.children), vec!["p"]);
        assert_eq!(div.children.len(), 1);
    }

    #[test]
    fn test_text_is_kept_verbatim() {
        let component = parse("<p>Hello, {name}!</p>", "T.svelte").unwrap();
        let Fragment::Element(p) = &component.html[0] else {
            panic!("expected element");
        };
        assert!(matches!(&p.children[0], Fragment::Text(t) if t.value == "Hello, "));
        assert!(matches!(&p.children[1], Fragment::Expression(_)));
        assert!(matches!(&p.children[2], Fragment::Text(t) if t.value == "!"));
    }

    #[test]
    fn test_script_block_is_not_a_fragment() {
        let component = parse("<p>a</p><script>let x = 1;</script><p>b</p>", "T.svelte").unwrap();
        assert_eq!(element_names(&component.html), vec!["p", "p"]);
        assert!(matches!(
            &component.script.body[0],
            Statement::VariableDeclaration { .. }
        ));
    }

    #[test]
    fn test_interpolation_with_nested_braces() {
        let component = parse("<ul>{items.map((x) => { return x; })}</ul>", "T.svelte").unwrap();
        let Fragment::Element(ul) = &component.html[0] else {
            panic!("expected element");
        };
        assert!(matches!(
            &ul.children[0],
            Fragment::Expression(e) if matches!(e.expression, Expression::Call { .. })
        ));
    }

    #[test]
    fn test_component_without_script() {
        let component = parse("<h1>static</h1>", "T.svelte").unwrap();
        assert!(component.script.body.is_empty());
    }

    #[test]
    fn test_missing_closing_tag_names_the_tag() {
        let err = parse("<div><span>hi</div>", "Broken.svelte").unwrap_err();
        assert_eq!(err.code, ERR_EXPECTED_LITERAL);
        assert_eq!(err.expected.as_deref(), Some("</span>"));
        assert_eq!(err.offset, 13);
        assert_eq!(err.file, "Broken.svelte");
        assert!(err.message.contains("</span>"));
        assert!(err.hints.iter().any(|h| h == "<span> opened at 1:6 is never closed"));
    }

    #[test]
    fn test_element_left_open_at_end_of_input() {
        let err = parse("<div>hello", "T.svelte").unwrap_err();
        assert_eq!(err.expected.as_deref(), Some("</div>"));
        assert!(err.hints.iter().any(|h| h == "<div> opened at 1:1 is never closed"));

        let err = parse("<section>\n  <p>a</p>", "T.svelte").unwrap_err();
        assert!(err.hints.iter().any(|h| h == "<section> opened at 1:1 is never closed"));
    }

    #[test]
    fn test_error_position_on_later_line() {
        let err = parse("<div>\n<span></div>", "T.svelte").unwrap_err();
        assert_eq!(err.expected.as_deref(), Some("</span>"));
        assert_eq!((err.line, err.column), (2, 7));
    }

    #[test]
    fn test_unterminated_interpolation() {
        let source = "<p>{count</p>";
        let err = parse(source, "T.svelte").unwrap_err();
        assert_eq!(err.code, ERR_EXPECTED_LITERAL);
        assert_eq!(err.expected.as_deref(), Some("}"));
        assert_eq!(err.offset as usize, source.len());
    }

    #[test]
    fn test_unclosed_script() {
        let err = parse("<script>let a = 1;", "T.svelte").unwrap_err();
        assert_eq!(err.expected.as_deref(), Some("</script>"));
    }

    #[test]
    fn test_stray_closing_tag_at_top_level() {
        let err = parse("<p>a</p></p>", "T.svelte").unwrap_err();
        assert_eq!(err.code, ERR_UNEXPECTED_INPUT);
        assert_eq!(err.offset, 8);
    }

    #[test]
    fn test_invalid_script_is_reported_at_script_start() {
        let err = parse("<script>let = ;</script>", "T.svelte").unwrap_err();
        assert_eq!(err.code, ERR_SCRIPT_SYNTAX);
        assert_eq!(err.offset, 8);
    }

    #[test]
    fn test_invalid_expression() {
        let err = parse("<p>{a +}</p>", "T.svelte").unwrap_err();
        assert_eq!(err.code, ERR_SCRIPT_SYNTAX);
        assert_eq!(err.offset, 4);
    }

    #[test]
    fn test_attribute_requires_braced_value() {
        let err = parse("<p class=\"x\">a</p>", "T.svelte").unwrap_err();
        assert_eq!(err.expected.as_deref(), Some("{"));
    }
}
