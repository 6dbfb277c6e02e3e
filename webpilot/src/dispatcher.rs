//! Interprets a resolved action against the page and triggers the
//! corresponding visual effect.
//!
//! Every transition is terminal; there is no chaining. The target of a
//! `click` is only ever highlighted and pointed at; the human performs
//! the final click. A model-chosen target on an arbitrary page must
//! always be human-confirmed.

use tracing::{debug, info, instrument};

use crate::errors::NavError;
use crate::intent::{NavAction, NavActionKind, ScrollDirection};
use crate::locator::Locator;
use crate::page::{PageNode, PageSnapshot};

/// Fixed scroll increment in pixels per scroll action.
pub const SCROLL_INCREMENT_PX: f64 = 400.0;

/// Caption shown next to a highlighted target.
const STEP_CAPTION: &str = "Click this highlighted element";

/// The seam to the presentational collaborators: panel, cursor guide, and
/// voice output. Constructed explicitly and injected, never a module-level
/// singleton.
pub trait PageSurface {
    /// Scroll the viewport vertically by `delta_y` pixels (negative is up).
    fn scroll_by(&mut self, delta_y: f64);
    /// Navigate back in session history.
    fn history_back(&mut self);
    /// Persistently highlight the element, scroll it into view, point the
    /// cursor/arrow at it, and show a short-lived caption.
    fn highlight(&mut self, node: &PageNode, caption: &str);
    /// Vocalize a message to the user.
    fn speak(&mut self, text: &str);
}

/// Dispatches action payloads against one page snapshot.
pub struct Dispatcher<'a> {
    snapshot: &'a PageSnapshot,
}

impl<'a> Dispatcher<'a> {
    pub fn new(snapshot: &'a PageSnapshot) -> Self {
        Self { snapshot }
    }

    /// Execute one action payload. A miss is already spoken to the user
    /// here; the returned [`NavError::NotFound`] lets hosts tell a miss
    /// from a genuine failure without re-inspecting the page.
    #[instrument(level = "debug", skip(self, action, surface))]
    pub fn dispatch(
        &self,
        action: &NavAction,
        surface: &mut dyn PageSurface,
    ) -> Result<(), NavError> {
        match action.kind {
            NavActionKind::Scroll => {
                let delta = match action.direction.unwrap_or(ScrollDirection::Down) {
                    ScrollDirection::Up => -SCROLL_INCREMENT_PX,
                    ScrollDirection::Down => SCROLL_INCREMENT_PX,
                };
                surface.scroll_by(delta);
                surface.speak(&action.speak);
                Ok(())
            }
            NavActionKind::GoBack => {
                surface.history_back();
                surface.speak(&action.speak);
                Ok(())
            }
            NavActionKind::Highlight => {
                let outcome = match self.resolve_target(action) {
                    Some(node) => {
                        surface.highlight(node, STEP_CAPTION);
                        Ok(())
                    }
                    None => {
                        debug!(selector = ?action.selector, "no element found to highlight");
                        Err(miss(action.selector.as_deref()))
                    }
                };
                surface.speak(&action.speak);
                outcome
            }
            NavActionKind::Click => {
                let outcome = match self.resolve_target(action) {
                    Some(node) => {
                        // Deliberately no click: only show where to click.
                        surface.highlight(node, STEP_CAPTION);
                        Ok(())
                    }
                    None => {
                        let selector = action.selector.as_deref().unwrap_or("that element");
                        surface.speak(&format!(
                            "Sorry, I could not find {selector} on this page."
                        ));
                        Err(miss(action.selector.as_deref()))
                    }
                };
                surface.speak(&action.speak);
                outcome
            }
        }
    }

    /// Keyword-only guidance that skips the model round-trip: text-target
    /// the keyword and highlight the hit. A miss is spoken and reported
    /// as [`NavError::NotFound`].
    pub fn find_and_guide(
        &self,
        keyword: &str,
        surface: &mut dyn PageSurface,
    ) -> Result<(), NavError> {
        let locator = Locator::new(self.snapshot);
        match locator.locate_by_text(keyword) {
            Some(node) => {
                info!(keyword, "found element for keyword, highlighting");
                surface.highlight(node, STEP_CAPTION);
                surface.speak(&format!(
                    "I found the {keyword}. It's highlighted on the page."
                ));
                Ok(())
            }
            None => {
                surface.speak(&format!(
                    "Sorry, I couldn't find {keyword} on this page."
                ));
                Err(miss(Some(keyword)))
            }
        }
    }

    fn resolve_target(&self, action: &NavAction) -> Option<&'a PageNode> {
        let target = action.target()?;
        Locator::new(self.snapshot).locate(&target)
    }
}

fn miss(selector: Option<&str>) -> NavError {
    NavError::NotFound(format!(
        "no element matched \"{}\"",
        selector.unwrap_or("<no selector>")
    ))
}
