//! A rendering-engine-independent model of the visible page.
//!
//! The locator never touches a live DOM. The page side of the bridge sends
//! over a [`PageSnapshot`]: a tree of [`PageNode`]s carrying the attributes
//! and layout rectangles the targeting heuristics need. The same tree backs
//! the line-per-element summary sent upstream, which is where the
//! sensitive-field redaction rules are enforced.

use serde::{Deserialize, Serialize};

/// Cap on entries in the element summary.
pub const SNAPSHOT_MAX_ELEMENTS: usize = 100;
/// Cap on characters per summary line.
pub const SNAPSHOT_MAX_LINE_CHARS: usize = 100;

/// Input types whose fields are sensitive regardless of naming.
const SENSITIVE_INPUT_TYPES: &[&str] = &["password", "tel", "email", "number"];

/// Name/id/autocomplete fragments that mark a field sensitive.
const SENSITIVE_NAME_PATTERNS: &[&str] = &[
    "password", "passwd", "ssn", "social", "credit", "card", "cvv", "cvc", "pin", "account",
    "routing", "tax",
];

/// A rectangle in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
    }

    /// Whether this rectangle lies entirely within `other`.
    pub fn within(&self, other: &Rect) -> bool {
        self.x >= other.x
            && self.y >= other.y
            && self.x + self.width <= other.x + other.width
            && self.y + self.height <= other.y + other.height
    }
}

/// Viewport dimensions in pixels at capture time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

fn is_empty_string(opt: &Option<String>) -> bool {
    match opt {
        Some(s) => s.is_empty(),
        None => true,
    }
}

/// Attributes of a page element relevant to targeting and redaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeAttributes {
    pub tag: String,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub role: Option<String>,
    /// Rendered text content.
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub text: Option<String>,
    /// Current form value. Never read for form controls; carried only so
    /// tests can prove it is not.
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub aria_label: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub autocomplete: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub input_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tabindex: Option<i32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub has_click_handler: bool,
}

/// A node in the captured page tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageNode {
    pub attributes: NodeAttributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Rect>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PageNode>,
}

impl PageNode {
    pub fn new(tag: &str) -> Self {
        Self {
            attributes: NodeAttributes {
                tag: tag.to_string(),
                ..Default::default()
            },
            bounds: None,
            children: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.attributes.text = Some(text.to_string());
        self
    }

    pub fn with_value(mut self, value: &str) -> Self {
        self.attributes.value = Some(value.to_string());
        self
    }

    pub fn with_aria_label(mut self, label: &str) -> Self {
        self.attributes.aria_label = Some(label.to_string());
        self
    }

    pub fn with_placeholder(mut self, placeholder: &str) -> Self {
        self.attributes.placeholder = Some(placeholder.to_string());
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.attributes.title = Some(title.to_string());
        self
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.attributes.role = Some(role.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.attributes.name = Some(name.to_string());
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.attributes.id = Some(id.to_string());
        self
    }

    pub fn with_autocomplete(mut self, autocomplete: &str) -> Self {
        self.attributes.autocomplete = Some(autocomplete.to_string());
        self
    }

    pub fn with_input_type(mut self, input_type: &str) -> Self {
        self.attributes.input_type = Some(input_type.to_string());
        self
    }

    pub fn with_tabindex(mut self, tabindex: i32) -> Self {
        self.attributes.tabindex = Some(tabindex);
        self
    }

    pub fn with_click_handler(mut self) -> Self {
        self.attributes.has_click_handler = true;
        self
    }

    pub fn with_bounds(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.bounds = Some(Rect {
            x,
            y,
            width,
            height,
        });
        self
    }

    pub fn with_child(mut self, child: PageNode) -> Self {
        self.children.push(child);
        self
    }

    /// Whether this is a form control (input/textarea/select). Form
    /// control values never leave the page context.
    pub fn is_form_control(&self) -> bool {
        matches!(self.attributes.tag.as_str(), "input" | "textarea" | "select")
    }

    /// Whether this field is sensitive: a password/tel/email/number input,
    /// or any control whose name/id/autocomplete matches the denylist.
    pub fn is_sensitive(&self) -> bool {
        if let Some(input_type) = &self.attributes.input_type {
            if SENSITIVE_INPUT_TYPES.contains(&input_type.to_lowercase().as_str()) {
                return true;
            }
        }
        [
            &self.attributes.name,
            &self.attributes.id,
            &self.attributes.autocomplete,
        ]
        .into_iter()
        .flatten()
        .any(|attr| {
            let attr = attr.to_lowercase();
            SENSITIVE_NAME_PATTERNS.iter().any(|p| attr.contains(p))
        })
    }

    /// Whether the element is interactive: an interactive tag, a
    /// button/link role, a tabindex, or an attached click handler.
    pub fn is_interactive(&self) -> bool {
        if matches!(
            self.attributes.tag.as_str(),
            "button" | "a" | "input" | "textarea" | "select"
        ) {
            return true;
        }
        if let Some(role) = &self.attributes.role {
            if matches!(role.as_str(), "button" | "link") {
                return true;
            }
        }
        self.attributes.tabindex.is_some() || self.attributes.has_click_handler
    }

    /// The text used for selector matching and the upstream summary, in
    /// priority order: rendered text, value, aria-label, placeholder,
    /// title. For form controls the value is skipped entirely: typed-in
    /// data must never leave the page context.
    pub fn visible_text(&self) -> Option<&str> {
        let a = &self.attributes;
        let sources: Vec<&Option<String>> = if self.is_form_control() {
            vec![&a.aria_label, &a.placeholder, &a.title]
        } else {
            vec![&a.text, &a.value, &a.aria_label, &a.placeholder, &a.title]
        };
        sources
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
    }
}

/// The page captured at command time, plus the viewport that maps
/// normalized coordinates to pixels. Created per command, never cached:
/// the DOM may have changed by the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub viewport: Viewport,
    pub root: PageNode,
}

/// A node in document order with a backlink to its parent, as produced by
/// [`PageSnapshot::flatten`].
#[derive(Debug, Clone, Copy)]
pub struct FlatNode<'a> {
    pub node: &'a PageNode,
    pub parent: Option<usize>,
    pub depth: usize,
}

impl PageSnapshot {
    pub fn new(url: &str, viewport: Viewport, root: PageNode) -> Self {
        Self {
            url: url.to_string(),
            viewport,
            root,
        }
    }

    /// Flatten the tree into document order, tracking parents and depth
    /// so ancestor walks stay cheap.
    pub fn flatten(&self) -> Vec<FlatNode<'_>> {
        let mut out = Vec::new();
        flatten_into(&self.root, None, 0, &mut out);
        out
    }

    /// Line-per-element summary of the interactive elements, for the
    /// upstream model. Capped at [`SNAPSHOT_MAX_ELEMENTS`] entries of
    /// [`SNAPSHOT_MAX_LINE_CHARS`] chars each; sensitive fields are
    /// reduced to a generic tag.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for flat in self.flatten() {
            if lines.len() >= SNAPSHOT_MAX_ELEMENTS {
                break;
            }
            if !flat.node.is_interactive() {
                continue;
            }
            lines.push(truncate_chars(
                &describe(flat.node),
                SNAPSHOT_MAX_LINE_CHARS,
            ));
        }
        lines.join("\n")
    }
}

fn flatten_into<'a>(
    node: &'a PageNode,
    parent: Option<usize>,
    depth: usize,
    out: &mut Vec<FlatNode<'a>>,
) {
    let index = out.len();
    out.push(FlatNode {
        node,
        parent,
        depth,
    });
    for child in &node.children {
        flatten_into(child, Some(index), depth + 1, out);
    }
}

fn describe(node: &PageNode) -> String {
    let tag = &node.attributes.tag;
    if node.is_sensitive() {
        return format!("{tag} [redacted field]");
    }
    if node.is_form_control() {
        let input_type = node
            .attributes
            .input_type
            .as_deref()
            .unwrap_or("text");
        let label = node.visible_text().unwrap_or_default();
        format!("{tag} type={input_type} \"{label}\"")
    } else {
        format!("{tag} \"{}\"", node.visible_text().unwrap_or_default())
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_within_is_inclusive() {
        let outer = Rect {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 50.0,
        };
        assert!(outer.within(&outer));
        assert!(Rect {
            x: 10.0,
            y: 10.0,
            width: 20.0,
            height: 20.0
        }
        .within(&outer));
        assert!(!Rect {
            x: 90.0,
            y: 40.0,
            width: 20.0,
            height: 20.0
        }
        .within(&outer));
    }
}
