//! Cook attribute model
//!
//! Attributes are the side-channel a cook uses to drive translation: which
//! object a point instances, per-instance colors, material overrides, and
//! generic property overrides. They are owned by points, primitives or the
//! detail (one value for the whole part), and carry int, float or string data
//! with a fixed tuple size.

use serde::{Deserialize, Serialize};

/// Attribute naming an object to instance, per point or on the detail.
pub const ATTR_INSTANCE: &str = "instance";
/// Override variant of [`ATTR_INSTANCE`], checked when the primary is absent.
pub const ATTR_INSTANCE_OVERRIDE: &str = "instance_override";
/// Detail attribute requesting one component per instance ("split" mode).
pub const ATTR_SPLIT_INSTANCES: &str = "split_instances";
/// Per-instance color override (float tuple of 3 or 4).
pub const ATTR_INSTANCE_COLOR: &str = "instance_color";
/// Material override attribute (string, prim or detail).
pub const ATTR_MATERIAL: &str = "material";
/// Prefix marking generic property-override attributes.
pub const PROPERTY_ATTR_PREFIX: &str = "prop_";

/// Which element class owns an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeOwner {
    Point,
    Primitive,
    Detail,
}

impl AttributeOwner {
    /// Owners in the order the translator scans them when any owner is accepted.
    pub const ALL: [AttributeOwner; 3] = [
        AttributeOwner::Point,
        AttributeOwner::Primitive,
        AttributeOwner::Detail,
    ];
}

/// Raw attribute payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeData {
    Int(Vec<i64>),
    Float(Vec<f32>),
    String(Vec<String>),
}

impl AttributeData {
    /// Number of scalar elements in the payload.
    pub fn len(&self) -> usize {
        match self {
            AttributeData::Int(v) => v.len(),
            AttributeData::Float(v) => v.len(),
            AttributeData::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One named attribute on a part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub owner: AttributeOwner,
    /// Number of scalar components per element (e.g. 3 for an RGB color).
    pub tuple_size: usize,
    pub data: AttributeData,
}

impl Attribute {
    pub fn new(
        name: impl Into<String>,
        owner: AttributeOwner,
        tuple_size: usize,
        data: AttributeData,
    ) -> Self {
        Self {
            name: name.into(),
            owner,
            tuple_size,
            data,
        }
    }

    /// Number of elements (tuples) carried by this attribute.
    pub fn count(&self) -> usize {
        if self.tuple_size == 0 {
            return 0;
        }
        self.data.len() / self.tuple_size
    }

    /// The string values, if this is a string attribute.
    pub fn string_values(&self) -> Option<&[String]> {
        match &self.data {
            AttributeData::String(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// First string value, if any.
    pub fn first_string(&self) -> Option<&str> {
        self.string_values().and_then(|v| v.first()).map(|s| s.as_str())
    }

    /// The float values, if this is a float attribute.
    pub fn float_values(&self) -> Option<&[f32]> {
        match &self.data {
            AttributeData::Float(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// The int values, if this is an int attribute.
    pub fn int_values(&self) -> Option<&[i64]> {
        match &self.data {
            AttributeData::Int(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// First int value, if any.
    pub fn first_int(&self) -> Option<i64> {
        self.int_values().and_then(|v| v.first()).copied()
    }
}

/// Value applied by a generic property override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Int(i64),
    Float(f32),
    String(String),
}

/// A generic property override extracted from a `prop_*` attribute.
///
/// The attribute name minus the prefix is the target property name on the
/// synthesized component or spawned actor. Point-owned data gives one value
/// per instance; prim/detail data gives a single shared value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyAttribute {
    pub property_name: String,
    pub owner: AttributeOwner,
    pub tuple_size: usize,
    pub data: AttributeData,
}

impl PropertyAttribute {
    /// Builds a property override from a raw attribute, if its name carries
    /// the property prefix.
    pub fn from_attribute(attribute: &Attribute) -> Option<Self> {
        let property_name = attribute.name.strip_prefix(PROPERTY_ATTR_PREFIX)?;
        if property_name.is_empty() {
            return None;
        }
        Some(Self {
            property_name: property_name.to_string(),
            owner: attribute.owner,
            tuple_size: attribute.tuple_size.max(1),
            data: attribute.data.clone(),
        })
    }

    /// The value to apply for the given instance index.
    ///
    /// Indexing past the end falls back to element 0, so a detail attribute
    /// (one value) still applies to every instance.
    pub fn value_at(&self, instance_index: usize) -> Option<PropertyValue> {
        let element = |len: usize| -> usize {
            let idx = instance_index * self.tuple_size;
            if idx < len {
                idx
            } else {
                0
            }
        };
        match &self.data {
            AttributeData::Int(v) => v.get(element(v.len())).map(|i| PropertyValue::Int(*i)),
            AttributeData::Float(v) => v.get(element(v.len())).map(|f| PropertyValue::Float(*f)),
            AttributeData::String(v) => v
                .get(element(v.len()))
                .map(|s| PropertyValue::String(s.clone())),
        }
    }
}
