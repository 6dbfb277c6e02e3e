//! Tests for element resolution against a synthetic page tree.

use crate::intent::{BoundingBox, ClickPoint, Target};
use crate::locator::Locator;
use crate::page::{PageNode, PageSnapshot, Viewport, SNAPSHOT_MAX_ELEMENTS, SNAPSHOT_MAX_LINE_CHARS};

fn viewport() -> Viewport {
    Viewport {
        width: 1000.0,
        height: 800.0,
    }
}

fn snapshot(root: PageNode) -> PageSnapshot {
    PageSnapshot::new("https://shop.example/", viewport(), root)
}

fn selector_target(selector: &str) -> Target {
    Target {
        selector: Some(selector.to_string()),
        click_point: None,
        bbox: None,
    }
}

fn node_id(node: &PageNode) -> &str {
    node.attributes.id.as_deref().unwrap_or("")
}

#[test]
fn exact_match_beats_earlier_partial_match() {
    // "Advanced Search" comes first in document order and contains the
    // needle, but the exact-match tier must win.
    let root = PageNode::new("body")
        .with_child(PageNode::new("button").with_text("Advanced Search").with_id("advanced"))
        .with_child(PageNode::new("button").with_text("Search").with_id("plain"));
    let snapshot = snapshot(root);
    let locator = Locator::new(&snapshot);

    let hit = locator.locate(&selector_target("Search")).expect("element");
    assert_eq!(node_id(hit), "plain");
}

#[test]
fn exact_match_is_case_insensitive_and_trimmed() {
    let root = PageNode::new("body")
        .with_child(PageNode::new("button").with_text("  Log In  ").with_id("login"));
    let snapshot = snapshot(root);
    let locator = Locator::new(&snapshot);

    let hit = locator.locate(&selector_target("log in")).expect("element");
    assert_eq!(node_id(hit), "login");
}

#[test]
fn partial_match_is_the_fallback_tier() {
    let root = PageNode::new("body")
        .with_child(PageNode::new("button").with_text("Advanced Search").with_id("advanced"));
    let snapshot = snapshot(root);
    let locator = Locator::new(&snapshot);

    let hit = locator.locate(&selector_target("Search")).expect("element");
    assert_eq!(node_id(hit), "advanced");
}

#[test]
fn first_in_document_order_wins_within_a_tier() {
    let root = PageNode::new("body")
        .with_child(PageNode::new("button").with_text("Search").with_id("first"))
        .with_child(PageNode::new("button").with_text("Search").with_id("second"));
    let snapshot = snapshot(root);
    let locator = Locator::new(&snapshot);

    let hit = locator.locate(&selector_target("Search")).expect("element");
    assert_eq!(node_id(hit), "first");
}

#[test]
fn non_interactive_elements_never_match_text() {
    let root = PageNode::new("body")
        .with_child(PageNode::new("p").with_text("Search results for shoes"));
    let snapshot = snapshot(root);
    let locator = Locator::new(&snapshot);

    assert!(locator.locate(&selector_target("Search")).is_none());
}

#[test]
fn point_hit_walks_up_to_the_interactive_ancestor() {
    let root = PageNode::new("body").with_bounds(0.0, 0.0, 1000.0, 800.0).with_child(
        PageNode::new("button")
            .with_text("Log In")
            .with_id("login")
            .with_bounds(100.0, 200.0, 120.0, 40.0)
            .with_child(
                PageNode::new("span")
                    .with_text("Log In")
                    .with_bounds(110.0, 210.0, 100.0, 20.0),
            ),
    );
    let snapshot = snapshot(root);
    let locator = Locator::new(&snapshot);

    // (160, 220) lands on the span; the walk must surface the button.
    let target = Target {
        selector: None,
        click_point: Some(ClickPoint { x: 0.16, y: 0.275 }),
        bbox: None,
    };
    let hit = locator.locate(&target).expect("element");
    assert_eq!(node_id(hit), "login");
}

#[test]
fn point_without_interactive_ancestor_returns_the_hit_itself() {
    let root = PageNode::new("body").with_bounds(0.0, 0.0, 1000.0, 800.0).with_child(
        PageNode::new("p")
            .with_text("Just a paragraph")
            .with_id("para")
            .with_bounds(0.0, 0.0, 1000.0, 100.0),
    );
    let snapshot = snapshot(root);
    let locator = Locator::new(&snapshot);

    let target = Target {
        selector: None,
        click_point: Some(ClickPoint { x: 0.5, y: 0.05 }),
        bbox: None,
    };
    let hit = locator.locate(&target).expect("element");
    // The body contains the point too, but the paragraph is deeper.
    assert_eq!(node_id(hit), "para");
}

#[test]
fn bounding_box_recovers_target_from_a_decorative_wrapper() {
    let root = PageNode::new("body").with_bounds(0.0, 0.0, 1000.0, 800.0).with_child(
        PageNode::new("div")
            .with_id("wrapper")
            .with_bounds(400.0, 300.0, 200.0, 100.0)
            .with_child(
                PageNode::new("button")
                    .with_text("Go")
                    .with_id("go")
                    .with_bounds(450.0, 330.0, 60.0, 30.0),
            ),
    );
    let snapshot = snapshot(root);
    let locator = Locator::new(&snapshot);

    // The point lands on the wrapper, not the button; the box covers the
    // button's full rectangle.
    let target = Target {
        selector: None,
        click_point: Some(ClickPoint { x: 0.41, y: 0.39 }),
        bbox: Some(BoundingBox {
            x: 0.4,
            y: 0.375,
            width: 0.2,
            height: 0.125,
        }),
    };
    let hit = locator.locate(&target).expect("element");
    assert_eq!(node_id(hit), "go");
}

#[test]
fn text_lookup_overrides_a_mismatched_coordinate_hit() {
    let root = PageNode::new("body")
        .with_bounds(0.0, 0.0, 1000.0, 800.0)
        .with_child(
            PageNode::new("button")
                .with_text("Cart")
                .with_id("cart")
                .with_bounds(100.0, 100.0, 100.0, 40.0),
        )
        .with_child(
            PageNode::new("button")
                .with_text("Checkout")
                .with_id("checkout")
                .with_bounds(100.0, 200.0, 100.0, 40.0),
        );
    let snapshot = snapshot(root);
    let locator = Locator::new(&snapshot);

    // Point resolves to the cart button, but the model described the
    // checkout button. Text search wins.
    let target = Target {
        selector: Some("Checkout".to_string()),
        click_point: Some(ClickPoint { x: 0.12, y: 0.15 }),
        bbox: None,
    };
    let hit = locator.locate(&target).expect("element");
    assert_eq!(node_id(hit), "checkout");
}

#[test]
fn coordinate_hit_is_kept_when_text_lookup_also_fails() {
    let root = PageNode::new("body").with_bounds(0.0, 0.0, 1000.0, 800.0).with_child(
        PageNode::new("button")
            .with_text("Cart")
            .with_id("cart")
            .with_bounds(100.0, 100.0, 100.0, 40.0),
    );
    let snapshot = snapshot(root);
    let locator = Locator::new(&snapshot);

    let target = Target {
        selector: Some("Checkout".to_string()),
        click_point: Some(ClickPoint { x: 0.12, y: 0.15 }),
        bbox: None,
    };
    let hit = locator.locate(&target).expect("element");
    assert_eq!(node_id(hit), "cart");
}

#[test]
fn matching_coordinate_hit_needs_no_text_override() {
    let root = PageNode::new("body")
        .with_bounds(0.0, 0.0, 1000.0, 800.0)
        .with_child(
            PageNode::new("button")
                .with_text("Add to cart")
                .with_id("add")
                .with_bounds(100.0, 100.0, 100.0, 40.0),
        )
        .with_child(
            // Exact-matching decoy later in the tree; the coordinate hit
            // already substring-matches, so it must not be consulted.
            PageNode::new("button")
                .with_text("cart")
                .with_id("decoy")
                .with_bounds(100.0, 300.0, 100.0, 40.0),
        );
    let snapshot = snapshot(root);
    let locator = Locator::new(&snapshot);

    let target = Target {
        selector: Some("cart".to_string()),
        click_point: Some(ClickPoint { x: 0.12, y: 0.15 }),
        bbox: None,
    };
    let hit = locator.locate(&target).expect("element");
    assert_eq!(node_id(hit), "add");
}

#[test]
fn empty_target_resolves_to_nothing() {
    let root = PageNode::new("body")
        .with_child(PageNode::new("button").with_text("Search"));
    let snapshot = snapshot(root);
    let locator = Locator::new(&snapshot);

    let target = Target {
        selector: None,
        click_point: None,
        bbox: None,
    };
    assert!(locator.locate(&target).is_none());
}

#[test]
fn role_tabindex_and_click_handler_make_elements_interactive() {
    let root = PageNode::new("body")
        .with_child(PageNode::new("div").with_role("button").with_text("Menu").with_id("menu"))
        .with_child(PageNode::new("div").with_tabindex(0).with_text("Card").with_id("card"))
        .with_child(PageNode::new("div").with_click_handler().with_text("Banner").with_id("banner"));
    let snapshot = snapshot(root);
    let locator = Locator::new(&snapshot);

    assert_eq!(node_id(locator.locate_by_text("Menu").expect("menu")), "menu");
    assert_eq!(node_id(locator.locate_by_text("Card").expect("card")), "card");
    assert_eq!(node_id(locator.locate_by_text("Banner").expect("banner")), "banner");
}

#[test]
fn password_values_never_surface_anywhere() {
    let field = PageNode::new("input")
        .with_input_type("password")
        .with_name("user-password")
        .with_value("hunter2");
    let root = PageNode::new("body").with_child(field);
    let snapshot = snapshot(root.clone());
    let locator = Locator::new(&snapshot);

    // Text extraction yields nothing for the field.
    assert!(root.children[0].visible_text().is_none());
    // Selector matching cannot reach the value.
    assert!(locator.locate_by_text("hunter2").is_none());
    // The upstream summary carries the generic tag, not the value.
    let summary = snapshot.summary();
    assert!(!summary.contains("hunter2"));
    assert!(summary.contains("[redacted field]"));
}

#[test]
fn form_control_values_are_never_matched_even_when_not_sensitive() {
    let root = PageNode::new("body").with_child(
        PageNode::new("input")
            .with_input_type("text")
            .with_name("city")
            .with_placeholder("Your city")
            .with_value("Lisbon"),
    );
    let snapshot = snapshot(root);
    let locator = Locator::new(&snapshot);

    assert!(locator.locate_by_text("Lisbon").is_none());
    assert!(locator.locate_by_text("Your city").is_some());
}

#[test]
fn denylisted_attribute_names_mark_fields_sensitive() {
    for name in ["cc-cvv", "ssn_field", "routing_number", "tax-id"] {
        let node = PageNode::new("input").with_input_type("text").with_name(name);
        assert!(node.is_sensitive(), "{name} should be sensitive");
    }
    let benign = PageNode::new("input").with_input_type("text").with_name("city");
    assert!(!benign.is_sensitive());
}

#[test]
fn summary_is_capped_and_lines_are_truncated() {
    let mut root = PageNode::new("body")
        .with_child(PageNode::new("button").with_text(&"x".repeat(300)));
    for i in 0..150 {
        root = root.with_child(PageNode::new("a").with_text(&format!("Link {i}")));
    }
    let snapshot = snapshot(root);

    let summary = snapshot.summary();
    assert_eq!(summary.lines().count(), SNAPSHOT_MAX_ELEMENTS);
    for line in summary.lines() {
        assert!(line.chars().count() <= SNAPSHOT_MAX_LINE_CHARS);
    }
}
