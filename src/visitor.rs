use crate::fragment::{AttributeNode, ElementNode, ExpressionNode, Fragment, TextNode};
use crate::script::Expression;

/// The FragmentVisitor trait defines the single traversal mechanism for fragment trees.
///
/// Rules:
/// 1. Traversal order is source order, attributes before children.
/// 2. Implementers override `visit_*` methods to add behavior.
/// 3. Implementers call the matching `walk_*` function to continue traversal unless pruning is intended.
pub trait FragmentVisitor {
    fn visit_fragments(&mut self, fragments: &[Fragment]) {
        walk_fragments(self, fragments);
    }

    fn visit_fragment(&mut self, fragment: &Fragment) {
        walk_fragment(self, fragment);
    }

    fn visit_element(&mut self, element: &ElementNode) {
        walk_element(self, element);
    }

    fn visit_attribute(&mut self, _attribute: &AttributeNode) {
        // Leaf node
    }

    fn visit_text(&mut self, _text: &TextNode) {}

    fn visit_expression(&mut self, _expression: &ExpressionNode) {}
}

pub fn walk_fragments<V: FragmentVisitor + ?Sized>(visitor: &mut V, fragments: &[Fragment]) {
    for fragment in fragments {
        visitor.visit_fragment(fragment);
    }
}

pub fn walk_fragment<V: FragmentVisitor + ?Sized>(visitor: &mut V, fragment: &Fragment) {
    match fragment {
        Fragment::Element(el) => visitor.visit_element(el),
        Fragment::Text(t) => visitor.visit_text(t),
        Fragment::Expression(e) => visitor.visit_expression(e),
    }
}

pub fn walk_element<V: FragmentVisitor + ?Sized>(visitor: &mut V, element: &ElementNode) {
    for attribute in &element.attributes {
        visitor.visit_attribute(attribute);
    }
    visitor.visit_fragments(&element.children);
}

/// Every template expression (attribute values and interpolations) in walk order.
pub fn template_expressions(fragments: &[Fragment]) -> Vec<&Expression> {
    let mut out = Vec::new();
    collect_expressions(fragments, &mut out);
    out
}

fn collect_expressions<'a>(fragments: &'a [Fragment], out: &mut Vec<&'a Expression>) {
    for fragment in fragments {
        match fragment {
            Fragment::Element(el) => {
                out.extend(el.attributes.iter().map(|attribute| &attribute.value));
                collect_expressions(&el.children, out);
            }
            Fragment::Expression(e) => out.push(&e.expression),
            Fragment::Text(_) => {}
        }
    }
}
