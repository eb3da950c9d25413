//! Page elements.
//!
//! Elements are discriminated by their `type` field. Only the variants the
//! export pipeline reasons about are typed; every other element is kept as
//! raw JSON.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// A node in a page's element tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// `type: "video"`
    Video(MediaElement),
    /// `type: "audio"`
    Audio(MediaElement),
    /// `type: "group"`, contains nested elements.
    Group(GroupElement),
    /// Any other element (text, image, svg, figure, ...).
    Other(Value),
}

/// Which kind of media a clip carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

/// A timed media clip placed on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaElement {
    #[serde(default)]
    pub id: String,

    /// URL, `data:` URI, or local path.
    #[serde(default)]
    pub src: Option<String>,

    /// Trim start as a fraction `[0.0, 1.0]` of the clip's natural duration.
    #[serde(default)]
    pub start_time: f64,

    /// Trim end as a fraction `[0.0, 1.0]` of the clip's natural duration.
    #[serde(default = "full_fraction")]
    pub end_time: f64,

    /// Natural duration of the source clip in milliseconds.
    #[serde(default)]
    pub duration: f64,

    #[serde(default = "full_fraction")]
    pub volume: f64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A group of nested elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupElement {
    #[serde(default)]
    pub children: Vec<Element>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub(crate) fn full_fraction() -> f64 {
    1.0
}

impl MediaElement {
    /// Create a clip with default trim and volume.
    pub fn new(id: impl Into<String>, src: impl Into<String>, duration_ms: f64) -> Self {
        Self {
            id: id.into(),
            src: Some(src.into()),
            start_time: 0.0,
            end_time: 1.0,
            duration: duration_ms,
            volume: 1.0,
            extra: Map::new(),
        }
    }
}

impl Element {
    /// Build an element from raw JSON, dispatching on its `type` field.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let kind = value.get("type").and_then(Value::as_str).map(str::to_owned);
        match kind.as_deref() {
            Some("video") => Ok(Self::Video(serde_json::from_value(strip_type(value))?)),
            Some("audio") => Ok(Self::Audio(serde_json::from_value(strip_type(value))?)),
            Some("group") => Ok(Self::Group(serde_json::from_value(strip_type(value))?)),
            _ => Ok(Self::Other(value)),
        }
    }

    /// Convert back to raw JSON, restoring the `type` field.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Video(media) => Ok(with_type("video", serde_json::to_value(media)?)),
            Self::Audio(media) => Ok(with_type("audio", serde_json::to_value(media)?)),
            Self::Group(group) => Ok(with_type("group", serde_json::to_value(group)?)),
            Self::Other(value) => Ok(value.clone()),
        }
    }

    /// The media payload of a video or audio element.
    pub fn media(&self) -> Option<(MediaKind, &MediaElement)> {
        match self {
            Self::Video(media) => Some((MediaKind::Video, media)),
            Self::Audio(media) => Some((MediaKind::Audio, media)),
            _ => None,
        }
    }

    pub fn media_mut(&mut self) -> Option<(MediaKind, &mut MediaElement)> {
        match self {
            Self::Video(media) => Some((MediaKind::Video, media)),
            Self::Audio(media) => Some((MediaKind::Audio, media)),
            _ => None,
        }
    }
}

/// Depth-first walk over `elements` and all nested group children.
pub fn walk_elements<'a>(elements: &'a [Element], visit: &mut dyn FnMut(&'a Element)) {
    for element in elements {
        visit(element);
        if let Element::Group(group) = element {
            walk_elements(&group.children, visit);
        }
    }
}

/// Mutable depth-first walk over `elements` and all nested group children.
pub fn walk_elements_mut(elements: &mut [Element], visit: &mut dyn FnMut(&mut Element)) {
    for element in elements.iter_mut() {
        visit(element);
        if let Element::Group(group) = element {
            walk_elements_mut(&mut group.children, visit);
        }
    }
}

fn strip_type(mut value: Value) -> Value {
    if let Some(object) = value.as_object_mut() {
        object.remove("type");
    }
    value
}

fn with_type(kind: &str, mut value: Value) -> Value {
    if let Some(object) = value.as_object_mut() {
        object.insert("type".to_string(), Value::String(kind.to_string()));
    }
    value
}

impl<'de> Deserialize<'de> for Element {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Element::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl Serialize for Element {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}
