//! Maps an action payload's targeting hints to a concrete page element.
//!
//! Two strategies are combined: coordinate targeting (normalized point and
//! optional bounding box from the vision model) and text targeting (the
//! selector the model read off the element). When both are present and
//! disagree, the text hit wins; when text search also comes up empty, the
//! original coordinate hit is kept. Absence is a valid outcome, never an
//! error.

use tracing::{debug, instrument};

use crate::intent::{BoundingBox, ClickPoint, Target};
use crate::page::{FlatNode, PageSnapshot, Rect};

/// Resolves targeting hints against one page snapshot.
///
/// Cheap to build per action; never cache one across commands, the page
/// may have changed.
pub struct Locator<'a> {
    snapshot: &'a PageSnapshot,
    flat: Vec<FlatNode<'a>>,
}

impl<'a> Locator<'a> {
    pub fn new(snapshot: &'a PageSnapshot) -> Self {
        let flat = snapshot.flatten();
        Self { snapshot, flat }
    }

    /// Find the single best-matching element for the given target hints.
    #[instrument(level = "debug", skip(self, target))]
    pub fn locate(&self, target: &Target) -> Option<&'a crate::page::PageNode> {
        let coordinate_hit = target
            .click_point
            .and_then(|point| self.locate_by_point(point, target.bbox));

        match (coordinate_hit, target.selector.as_deref()) {
            (Some(hit), Some(selector)) => {
                if text_matches(hit, selector) {
                    return Some(hit);
                }
                // The coordinate system and the model's own textual
                // description disagree. Text search is the higher-confidence
                // signal when it produces a hit; otherwise keep the
                // coordinate hit.
                debug!(
                    selector,
                    hit_text = hit.visible_text().unwrap_or_default(),
                    "coordinate hit does not match selector, trying text lookup"
                );
                Some(self.locate_by_text(selector).unwrap_or(hit))
            }
            (Some(hit), None) => Some(hit),
            (None, Some(selector)) => self.locate_by_text(selector),
            (None, None) => None,
        }
    }

    /// Coordinate targeting: topmost element at the normalized point,
    /// refined by the bounding box and an interactive-ancestor walk.
    fn locate_by_point(
        &self,
        point: ClickPoint,
        bbox: Option<BoundingBox>,
    ) -> Option<&'a crate::page::PageNode> {
        let vw = self.snapshot.viewport.width;
        let vh = self.snapshot.viewport.height;
        let px = point.x * vw;
        let py = point.y * vh;

        // Topmost: deepest node containing the point, later siblings
        // winning ties the way painting order does.
        let mut hit: Option<usize> = None;
        let mut hit_depth = 0usize;
        for (index, flat) in self.flat.iter().enumerate() {
            if let Some(bounds) = flat.node.bounds {
                if bounds.contains(px, py) && (hit.is_none() || flat.depth >= hit_depth) {
                    hit = Some(index);
                    hit_depth = flat.depth;
                }
            }
        }
        let hit = hit?;

        // A bounding box recovers precise targets even when the raw point
        // lands on a decorative wrapper: prefer the first interactive
        // element whose whole rectangle lies within the box.
        if let Some(bbox) = bbox {
            let region = Rect {
                x: bbox.x * vw,
                y: bbox.y * vh,
                width: bbox.width * vw,
                height: bbox.height * vh,
            };
            if let Some(flat) = self.flat.iter().find(|f| {
                f.node.is_interactive() && f.node.bounds.is_some_and(|b| b.within(&region))
            }) {
                debug!("bounding box refined the point hit to an interactive element");
                return Some(flat.node);
            }
        }

        // Walk up from the point hit until something interactive appears;
        // fall back to the hit itself.
        let mut current = Some(hit);
        while let Some(index) = current {
            if self.flat[index].node.is_interactive() {
                return Some(self.flat[index].node);
            }
            current = self.flat[index].parent;
        }
        Some(self.flat[hit].node)
    }

    /// Text targeting over the interactive elements: exact
    /// case-insensitive trimmed match first, then substring containment.
    /// First element in document order wins within each tier.
    pub fn locate_by_text(&self, selector: &str) -> Option<&'a crate::page::PageNode> {
        let needle = selector.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        let mut candidates = self.flat.iter().filter(|f| f.node.is_interactive());
        if let Some(flat) = candidates
            .clone()
            .find(|f| node_text_lower(f.node).is_some_and(|t| t == needle))
        {
            return Some(flat.node);
        }
        candidates
            .find(|f| node_text_lower(f.node).is_some_and(|t| t.contains(&needle)))
            .map(|f| f.node)
    }
}

fn node_text_lower(node: &crate::page::PageNode) -> Option<String> {
    node.visible_text().map(|t| t.to_lowercase())
}

/// Case-insensitive substring comparison in either direction between an
/// element's visible text and a selector.
fn text_matches(node: &crate::page::PageNode, selector: &str) -> bool {
    let selector = selector.trim().to_lowercase();
    if selector.is_empty() {
        return false;
    }
    match node_text_lower(node) {
        Some(text) if !text.is_empty() => {
            text.contains(&selector) || selector.contains(&text)
        }
        _ => false,
    }
}
