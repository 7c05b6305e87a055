use serde::Serialize;

use crate::script::{Expression, Program};

// ═══════════════════════════════════════════════════════════════════════════════
// FRAGMENT IR
// ═══════════════════════════════════════════════════════════════════════════════

/// One node of the parsed markup tree. Built once by the parser, read-only after.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Fragment {
    Element(ElementNode),
    Text(TextNode),
    Expression(ExpressionNode),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementNode {
    pub name: String,
    pub attributes: Vec<AttributeNode>,
    pub children: Vec<Fragment>,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeNode {
    pub name: String,
    pub value: Expression,
}

impl AttributeNode {
    /// Event name if this attribute registers a listener (`on:click` -> `click`).
    pub fn event_name<'a>(&'a self, prefix: &str) -> Option<&'a str> {
        self.name.strip_prefix(prefix).filter(|event| !event.is_empty())
    }
}

/// Verbatim text; never whitespace-only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextNode {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionNode {
    pub expression: Expression,
}

/// Parser output: the fragment tree plus the (optional) script program.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub html: Vec<Fragment>,
    pub script: Program,
}

/// Position of one hydrated node: the child index inside its parent, and how
/// deep that parent sits (0 = the mount target).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HydrationSlot {
    pub depth: u32,
    pub index: u32,
}
