//! Recursive input value model.
//!
//! A [`Value`] is one argument handed to the operation under test. Every input
//! slot of a test case pairs a [`TypeDescriptor`] (what the operation declares)
//! with the `Value` currently occupying it.

use serde::{Deserialize, Serialize};

/// Primitive kinds a slot may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Bool,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveKind {
    /// Whether the kind is a two's complement integer.
    pub fn is_integral(self) -> bool {
        matches!(self, Self::Byte | Self::Short | Self::Int | Self::Long)
    }

    /// Whether arithmetic blending and jitter apply to this kind.
    pub fn is_numeric(self) -> bool {
        self.is_integral() || matches!(self, Self::Float | Self::Double)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Byte => "byte",
            Self::Char => "char",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
        }
    }
}

/// Flavour of a sequence-like collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CollectionKind {
    #[default]
    List,
    Set,
    OrderedSet,
}

/// Flavour of a key/value container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MapKind {
    #[default]
    Hash,
    Ordered,
}

/// Declared type of an input slot, as supplied by the target descriptor provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TypeDescriptor {
    Primitive {
        kind: PrimitiveKind,
    },
    Text,
    Array {
        element: Box<TypeDescriptor>,
    },
    /// Collection whose element type may be erased.
    Collection {
        #[serde(default)]
        kind: CollectionKind,
        #[serde(default)]
        element: Option<Box<TypeDescriptor>>,
    },
    Map {
        #[serde(default)]
        kind: MapKind,
        #[serde(default)]
        key: Option<Box<TypeDescriptor>>,
        #[serde(default)]
        value: Option<Box<TypeDescriptor>>,
    },
    Enum {
        name: String,
        variants: usize,
    },
    /// User-defined type. Only no-argument construction is attempted.
    Custom {
        name: String,
        #[serde(default)]
        default_constructible: bool,
    },
}

impl TypeDescriptor {
    pub fn primitive(kind: PrimitiveKind) -> Self {
        Self::Primitive { kind }
    }

    pub fn array_of(element: TypeDescriptor) -> Self {
        Self::Array {
            element: Box::new(element),
        }
    }

    pub fn list_of(element: TypeDescriptor) -> Self {
        Self::Collection {
            kind: CollectionKind::List,
            element: Some(Box::new(element)),
        }
    }

    pub fn map_of(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        Self::Map {
            kind: MapKind::Hash,
            key: Some(Box::new(key)),
            value: Some(Box::new(value)),
        }
    }

    /// Heuristic shape weight: primitive=1, text=2, array=3, collection=4,
    /// map=5, anything else=6.
    pub fn complexity(&self) -> f64 {
        match self {
            Self::Primitive { .. } => 1.0,
            Self::Text => 2.0,
            Self::Array { .. } => 3.0,
            Self::Collection { .. } => 4.0,
            Self::Map { .. } => 5.0,
            Self::Enum { .. } | Self::Custom { .. } => 6.0,
        }
    }

    /// Short kind label used for input-type distributions.
    pub fn kind_name(&self) -> String {
        match self {
            Self::Primitive { kind } => kind.name().to_string(),
            Self::Text => "text".to_string(),
            Self::Array { element } => format!("array<{}>", element.kind_name()),
            Self::Collection { kind, .. } => match kind {
                CollectionKind::List => "list".to_string(),
                CollectionKind::Set => "set".to_string(),
                CollectionKind::OrderedSet => "ordered-set".to_string(),
            },
            Self::Map { .. } => "map".to_string(),
            Self::Enum { name, .. } | Self::Custom { name, .. } => name.clone(),
        }
    }

    /// Whether the empty-container edge case applies to this slot.
    pub fn is_sequence(&self) -> bool {
        matches!(self, Self::Array { .. } | Self::Collection { .. })
    }
}

/// A concrete primitive value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Primitive {
    Bool(bool),
    Byte(i8),
    Char(char),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl Primitive {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Self::Bool(_) => PrimitiveKind::Bool,
            Self::Byte(_) => PrimitiveKind::Byte,
            Self::Char(_) => PrimitiveKind::Char,
            Self::Short(_) => PrimitiveKind::Short,
            Self::Int(_) => PrimitiveKind::Int,
            Self::Long(_) => PrimitiveKind::Long,
            Self::Float(_) => PrimitiveKind::Float,
            Self::Double(_) => PrimitiveKind::Double,
        }
    }

    /// Numeric reading, `None` for booleans and characters.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Byte(v) => Some(v as f64),
            Self::Short(v) => Some(v as f64),
            Self::Int(v) => Some(v as f64),
            Self::Long(v) => Some(v as f64),
            Self::Float(v) => Some(v as f64),
            Self::Double(v) => Some(v),
            Self::Bool(_) | Self::Char(_) => None,
        }
    }

    /// Cast `value` back into `kind`, rounding integral kinds.
    ///
    /// Out-of-range values saturate. Returns `None` for non-numeric kinds.
    pub fn from_f64(kind: PrimitiveKind, value: f64) -> Option<Self> {
        let rounded = value.round();
        match kind {
            PrimitiveKind::Byte => Some(Self::Byte(rounded as i8)),
            PrimitiveKind::Short => Some(Self::Short(rounded as i16)),
            PrimitiveKind::Int => Some(Self::Int(rounded as i32)),
            PrimitiveKind::Long => Some(Self::Long(rounded as i64)),
            PrimitiveKind::Float => Some(Self::Float(value as f32)),
            PrimitiveKind::Double => Some(Self::Double(value)),
            PrimitiveKind::Bool | PrimitiveKind::Char => None,
        }
    }

    /// Flip one bit of an integral value. Other kinds pass through unchanged.
    pub fn flip_bit(self, bit: u32) -> Self {
        match self {
            Self::Byte(v) => Self::Byte(v ^ (1i8.wrapping_shl(bit % 8))),
            Self::Short(v) => Self::Short(v ^ (1i16.wrapping_shl(bit % 16))),
            Self::Int(v) => Self::Int(v ^ (1i32.wrapping_shl(bit % 32))),
            Self::Long(v) => Self::Long(v ^ (1i64.wrapping_shl(bit % 64))),
            other => other,
        }
    }

    /// Add `delta` to an integral value, saturating at the bounds of its
    /// kind. Other kinds pass through unchanged.
    pub fn saturating_offset(self, delta: i64) -> Self {
        let clamp = |min: i64, max: i64| delta.clamp(min, max);
        match self {
            Self::Byte(v) => {
                Self::Byte(v.saturating_add(clamp(i8::MIN.into(), i8::MAX.into()) as i8))
            }
            Self::Short(v) => {
                Self::Short(v.saturating_add(clamp(i16::MIN.into(), i16::MAX.into()) as i16))
            }
            Self::Int(v) => {
                Self::Int(v.saturating_add(clamp(i32::MIN.into(), i32::MAX.into()) as i32))
            }
            Self::Long(v) => Self::Long(v.saturating_add(delta)),
            other => other,
        }
    }
}

/// Recursive, tagged test-case input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Primitive(Primitive),
    Text(String),
    Array {
        element: Box<TypeDescriptor>,
        items: Vec<Value>,
    },
    Collection {
        kind: CollectionKind,
        items: Vec<Value>,
    },
    Map {
        kind: MapKind,
        entries: Vec<(Value, Value)>,
    },
    /// Variant index of an enum.
    Enum(usize),
    /// Default-constructed instance of a custom type.
    Object {
        type_name: String,
    },
    /// Construction failed; carries no payload.
    Opaque,
    Null,
}

impl Value {
    /// Top-level size: string length, 1 for scalars and objects, element
    /// count for containers, 0 for `Opaque`/`Null`.
    pub fn size(&self) -> f64 {
        match self {
            Self::Text(s) => s.chars().count() as f64,
            Self::Primitive(_) | Self::Enum(_) | Self::Object { .. } => 1.0,
            Self::Array { items, .. } | Self::Collection { items, .. } => items.len() as f64,
            Self::Map { entries, .. } => entries.len() as f64,
            Self::Opaque | Self::Null => 0.0,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this value is an acceptable occupant of a slot declared as `descriptor`.
    ///
    /// `Null` and `Opaque` are accepted everywhere as construction fallbacks.
    pub fn conforms_to(&self, descriptor: &TypeDescriptor) -> bool {
        match (self, descriptor) {
            (Self::Null | Self::Opaque, _) => true,
            (Self::Primitive(p), TypeDescriptor::Primitive { kind }) => p.kind() == *kind,
            (Self::Text(_), TypeDescriptor::Text) => true,
            (Self::Array { .. }, TypeDescriptor::Array { .. }) => true,
            (Self::Collection { kind, .. }, TypeDescriptor::Collection { kind: declared, .. }) => {
                kind == declared
            }
            (Self::Map { kind, .. }, TypeDescriptor::Map { kind: declared, .. }) => {
                kind == declared
            }
            (Self::Enum(idx), TypeDescriptor::Enum { variants, .. }) => idx < variants,
            (Self::Object { type_name }, TypeDescriptor::Custom { name, .. }) => type_name == name,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_size() {
        assert_eq!(Value::Text("héllo".into()).size(), 5.0);
        assert_eq!(Value::Primitive(Primitive::Int(7)).size(), 1.0);
        assert_eq!(Value::Primitive(Primitive::Bool(true)).size(), 1.0);
        assert_eq!(Value::Null.size(), 0.0);
        assert_eq!(Value::Opaque.size(), 0.0);

        let nested = Value::Collection {
            kind: CollectionKind::List,
            items: vec![
                Value::Collection {
                    kind: CollectionKind::List,
                    items: vec![Value::Null; 10],
                },
                Value::Null,
            ],
        };
        // Top-level count only.
        assert_eq!(nested.size(), 2.0);

        let map = Value::Map {
            kind: MapKind::Hash,
            entries: vec![(Value::Text("k".into()), Value::Null); 3],
        };
        assert_eq!(map.size(), 3.0);
    }

    #[test]
    fn test_descriptor_complexity() {
        assert_eq!(TypeDescriptor::primitive(PrimitiveKind::Int).complexity(), 1.0);
        assert_eq!(TypeDescriptor::Text.complexity(), 2.0);
        assert_eq!(TypeDescriptor::array_of(TypeDescriptor::Text).complexity(), 3.0);
        assert_eq!(TypeDescriptor::list_of(TypeDescriptor::Text).complexity(), 4.0);
        assert_eq!(
            TypeDescriptor::map_of(TypeDescriptor::Text, TypeDescriptor::Text).complexity(),
            5.0
        );
        let custom = TypeDescriptor::Custom {
            name: "Widget".into(),
            default_constructible: true,
        };
        assert_eq!(custom.complexity(), 6.0);
    }

    #[test]
    fn test_numeric_cast_back() {
        assert_eq!(
            Primitive::from_f64(PrimitiveKind::Int, 2.6),
            Some(Primitive::Int(3))
        );
        assert_eq!(
            Primitive::from_f64(PrimitiveKind::Byte, 1000.0),
            Some(Primitive::Byte(i8::MAX))
        );
        assert_eq!(Primitive::from_f64(PrimitiveKind::Bool, 1.0), None);
    }

    #[test]
    fn test_flip_bit() {
        assert_eq!(Primitive::Int(0).flip_bit(3), Primitive::Int(8));
        assert_eq!(Primitive::Byte(0).flip_bit(7), Primitive::Byte(i8::MIN));
        assert_eq!(Primitive::Double(1.5).flip_bit(3), Primitive::Double(1.5));
    }

    #[test]
    fn test_saturating_offset() {
        let big = 1i64 << 60;
        assert_eq!(
            Primitive::Long(big).saturating_offset(7),
            Primitive::Long(big + 7)
        );
        assert_eq!(
            Primitive::Long(i64::MAX - 1).saturating_offset(25),
            Primitive::Long(i64::MAX)
        );
        assert_eq!(Primitive::Byte(120).saturating_offset(25), Primitive::Byte(127));
        assert_eq!(
            Primitive::Short(0).saturating_offset(-100_000),
            Primitive::Short(i16::MIN)
        );
        assert_eq!(Primitive::Int(-3).saturating_offset(-4), Primitive::Int(-7));
        assert_eq!(Primitive::Double(2.0).saturating_offset(5), Primitive::Double(2.0));
    }

    #[test]
    fn test_conforms_to() {
        let int = TypeDescriptor::primitive(PrimitiveKind::Int);
        assert!(Value::Primitive(Primitive::Int(1)).conforms_to(&int));
        assert!(!Value::Primitive(Primitive::Long(1)).conforms_to(&int));
        assert!(Value::Null.conforms_to(&int));
        let color = TypeDescriptor::Enum {
            name: "Color".into(),
            variants: 3,
        };
        assert!(Value::Enum(2).conforms_to(&color));
        assert!(!Value::Enum(3).conforms_to(&color));
    }

    #[test]
    fn test_descriptor_serialization() {
        let descriptor = TypeDescriptor::map_of(
            TypeDescriptor::Text,
            TypeDescriptor::array_of(TypeDescriptor::primitive(PrimitiveKind::Long)),
        );
        let json = serde_json::to_string(&descriptor).unwrap();
        let parsed: TypeDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, descriptor);

        let minimal: TypeDescriptor = serde_json::from_str(r#"{"type":"Collection"}"#).unwrap();
        assert_eq!(
            minimal,
            TypeDescriptor::Collection {
                kind: CollectionKind::List,
                element: None
            }
        );
    }
}
