//! Validated, normalized instructions describing what to do on the page.
//!
//! Everything in this module sits on the untrusted side of the model
//! boundary: the raw JSON the model returns is checked field by field and
//! either normalized into an [`ActionIntent`] or rejected. Out-of-range
//! coordinates are clamped (the model occasionally returns slightly
//! out-of-frame points); anything structurally wrong is an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::errors::NavError;

/// Smallest bounding-box extent on either axis, in normalized units.
pub const MIN_BOX_EXTENT: f64 = 0.01;

/// Spoken fallback when the model omits the `speak` field.
const DEFAULT_SPEAK: &str = "Processing...";

/// A point in normalized image coordinates (0.0 to 1.0 on each axis).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClickPoint {
    pub x: f64,
    pub y: f64,
}

impl ClickPoint {
    /// Clamp both coordinates into the unit frame. Returns the clamped
    /// point and whether anything changed.
    pub fn clamped(self) -> (Self, bool) {
        let clamped = Self {
            x: self.x.clamp(0.0, 1.0),
            y: self.y.clamp(0.0, 1.0),
        };
        (clamped, clamped != self)
    }
}

/// A normalized rectangle (0.0 to 1.0 on each axis) describing a target
/// region in a captured image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Clamp the box into the unit frame: origin into [0,1], extents
    /// floored at [`MIN_BOX_EXTENT`], then shrunk so the box never
    /// extends past the right or bottom edge. Returns the clamped box
    /// and whether anything changed.
    pub fn clamped(self) -> (Self, bool) {
        let mut b = Self {
            x: self.x.clamp(0.0, 1.0),
            y: self.y.clamp(0.0, 1.0),
            width: self.width.clamp(MIN_BOX_EXTENT, 1.0),
            height: self.height.clamp(MIN_BOX_EXTENT, 1.0),
        };
        if b.x + b.width > 1.0 {
            b.width = 1.0 - b.x;
        }
        if b.y + b.height > 1.0 {
            b.height = 1.0 - b.y;
        }
        (b, b != self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// Targeting hints for click/highlight actions. At least one of
/// `selector` or `click_point` is guaranteed present after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Visible text the model expects on the element.
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub click_point: Option<ClickPoint>,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
}

/// The action kind, with per-kind payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Click(Target),
    Highlight(Target),
    Scroll(ScrollDirection),
    GoBack,
    /// The model judged the page irrelevant to the goal. Only the spoken
    /// message is surfaced; no element resolution occurs.
    NotFound,
}

/// A validated, normalized instruction from the vision model.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionIntent {
    /// Free-text explanation of what the model saw and why.
    pub reasoning: String,
    /// Message to vocalize to the user.
    pub speak: String,
    pub action: Action,
}

impl ActionIntent {
    /// Validate a raw JSON value from the model into a normalized intent.
    ///
    /// Rejects non-objects, missing/unknown action kinds, wrongly typed
    /// coordinate fields, and click/highlight actions with no usable
    /// targeting hint. Coordinates are clamped rather than rejected.
    pub fn from_json(value: &Value) -> Result<Self, NavError> {
        let obj = value.as_object().ok_or_else(|| {
            NavError::Validation("response is not a JSON object".to_string())
        })?;

        let kind = match obj.get("action") {
            Some(Value::String(s)) => s.as_str(),
            Some(_) => {
                return Err(NavError::Validation(
                    "'action' field is not a string".to_string(),
                ))
            }
            None => {
                return Err(NavError::Validation(
                    "missing 'action' field".to_string(),
                ))
            }
        };

        let click_point = parse_click_point(obj.get("click_point"))?;
        let bbox = parse_bbox(obj.get("bbox"))?;

        let selector = obj
            .get("selector")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let reasoning = obj
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let speak = obj
            .get("speak")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SPEAK)
            .to_string();

        let action = match kind {
            "click" | "highlight" => {
                if selector.is_none() && click_point.is_none() {
                    return Err(NavError::Validation(format!(
                        "{kind} action requires either a selector or click_point coordinates"
                    )));
                }
                let target = Target {
                    selector,
                    click_point,
                    bbox,
                };
                if kind == "click" {
                    Action::Click(target)
                } else {
                    Action::Highlight(target)
                }
            }
            "scroll" => {
                let direction = match obj.get("direction").and_then(Value::as_str) {
                    Some("up") => ScrollDirection::Up,
                    // The model sometimes omits the direction; default down.
                    _ => ScrollDirection::Down,
                };
                Action::Scroll(direction)
            }
            "goback" => Action::GoBack,
            "not_found" => Action::NotFound,
            other => {
                return Err(NavError::Validation(format!(
                    "unknown action '{other}'"
                )))
            }
        };

        Ok(Self {
            reasoning,
            speak,
            action,
        })
    }

    /// Stable name of the action kind, for display surfaces.
    pub fn action_name(&self) -> &'static str {
        match self.action {
            Action::Click(_) => "click",
            Action::Highlight(_) => "highlight",
            Action::Scroll(_) => "scroll",
            Action::GoBack => "goback",
            Action::NotFound => "not_found",
        }
    }

    /// The selector carried by this intent, if any.
    pub fn selector(&self) -> Option<&str> {
        match &self.action {
            Action::Click(t) | Action::Highlight(t) => t.selector.as_deref(),
            _ => None,
        }
    }

    /// Convert into the cross-context dispatch payload. `NotFound` has no
    /// payload; callers speak the message instead.
    pub fn into_payload(self) -> Option<NavAction> {
        let speak = self.speak;
        match self.action {
            Action::Click(target) => Some(NavAction {
                kind: NavActionKind::Click,
                selector: target.selector,
                click_point: target.click_point,
                bbox: target.bbox,
                direction: None,
                speak,
            }),
            Action::Highlight(target) => Some(NavAction {
                kind: NavActionKind::Highlight,
                selector: target.selector,
                click_point: target.click_point,
                bbox: target.bbox,
                direction: None,
                speak,
            }),
            Action::Scroll(direction) => Some(NavAction {
                kind: NavActionKind::Scroll,
                selector: None,
                click_point: None,
                bbox: None,
                direction: Some(direction),
                speak,
            }),
            Action::GoBack => Some(NavAction {
                kind: NavActionKind::GoBack,
                selector: None,
                click_point: None,
                bbox: None,
                direction: None,
                speak,
            }),
            Action::NotFound => None,
        }
    }
}

fn parse_click_point(value: Option<&Value>) -> Result<Option<ClickPoint>, NavError> {
    let value = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };
    let x = value.get("x").and_then(Value::as_f64);
    let y = value.get("y").and_then(Value::as_f64);
    let (x, y) = match (x, y) {
        (Some(x), Some(y)) => (x, y),
        _ => {
            return Err(NavError::Validation(
                "click_point must be an object with numeric x,y coordinates".to_string(),
            ))
        }
    };
    let (point, changed) = ClickPoint { x, y }.clamped();
    if changed {
        warn!(
            original_x = x,
            original_y = y,
            clamped_x = point.x,
            clamped_y = point.y,
            "model returned out-of-frame click_point, clamped"
        );
    }
    Ok(Some(point))
}

fn parse_bbox(value: Option<&Value>) -> Result<Option<BoundingBox>, NavError> {
    let value = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };
    let fields = [
        value.get("x").and_then(Value::as_f64),
        value.get("y").and_then(Value::as_f64),
        value.get("width").and_then(Value::as_f64),
        value.get("height").and_then(Value::as_f64),
    ];
    let raw = match fields {
        [Some(x), Some(y), Some(width), Some(height)] => BoundingBox {
            x,
            y,
            width,
            height,
        },
        _ => {
            return Err(NavError::Validation(
                "bbox must be an object with numeric x,y,width,height".to_string(),
            ))
        }
    };
    let (bbox, changed) = raw.clamped();
    if changed {
        warn!(?raw, clamped = ?bbox, "model returned out-of-frame bbox, clamped");
    }
    Ok(Some(bbox))
}

/// The kind of a dispatched page action. `not_found` never reaches the
/// dispatcher, so it has no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavActionKind {
    Click,
    Highlight,
    Scroll,
    #[serde(rename = "goback")]
    GoBack,
}

/// The cross-context action payload handed to the page dispatcher.
///
/// Also the "last action" value kept for repeat-last: re-dispatching it
/// needs no new model round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavAction {
    #[serde(rename = "action")]
    pub kind: NavActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_point: Option<ClickPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<ScrollDirection>,
    pub speak: String,
}

impl NavAction {
    /// Targeting hints for the locator, for click/highlight payloads.
    pub fn target(&self) -> Option<Target> {
        match self.kind {
            NavActionKind::Click | NavActionKind::Highlight => Some(Target {
                selector: self.selector.clone(),
                click_point: self.click_point,
                bbox: self.bbox,
            }),
            _ => None,
        }
    }
}
