//! Random and edge-case value generation.

use rand::distributions::WeightedIndex;
use rand::prelude::*;

use crate::schema::{
    CollectionKind, GeneratorConfig, InputSlot, MapKind, Primitive, PrimitiveKind,
    TargetSignature, TestCase, TypeDescriptor, Value,
};

/// Weights for the string strategies: printable, repeated pattern, single
/// character run, mixed ASCII/extended, empty or singleton.
const STRING_STRATEGY_WEIGHTS: [u32; 5] = [3, 2, 2, 2, 1];

/// Weights for untyped container elements: int, text, double, bool, array,
/// list, map, null.
const ELEMENT_KIND_WEIGHTS: [u32; 8] = [5, 3, 2, 2, 2, 2, 2, 2];

const PRINTABLE: std::ops::Range<u32> = 32..127;
const EXTENDED: std::ops::Range<u32> = 0x1000..0x10FFF;

/// Random number generator wrapper for value generation.
pub struct ValueGenerator {
    rng: StdRng,
    config: GeneratorConfig,
}

impl ValueGenerator {
    /// Create from seed.
    pub fn new(config: GeneratorConfig, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            config,
        }
    }

    /// Create with random seed.
    pub fn random(config: GeneratorConfig) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            config,
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Underlying RNG, shared with selection and operator choices.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Draw a seed for a derived generator.
    pub fn next_seed(&mut self) -> u64 {
        self.rng.r#gen()
    }

    /// Generate a value for `descriptor` at nesting `depth`.
    ///
    /// Past the configured maximum depth the minimal instance of the kind is
    /// returned instead of recursing.
    pub fn generate(&mut self, descriptor: &TypeDescriptor, depth: usize) -> Value {
        if depth > self.config.max_nesting_depth {
            return self.minimal_value(descriptor);
        }

        match descriptor {
            TypeDescriptor::Primitive { kind } => Value::Primitive(self.primitive(*kind)),
            TypeDescriptor::Text => Value::Text(self.string()),
            TypeDescriptor::Array { element } => {
                let len = self.container_length(self.config.max_array_length, depth);
                let items = (0..len).map(|_| self.generate(element, depth + 1)).collect();
                Value::Array {
                    element: element.clone(),
                    items,
                }
            }
            TypeDescriptor::Collection { kind, element } => {
                let len = self.container_length(self.config.max_collection_size, depth);
                let items = (0..len)
                    .map(|_| self.element(element.as_deref(), depth))
                    .collect();
                Value::Collection { kind: *kind, items }
            }
            TypeDescriptor::Map { kind, key, value } => {
                let len = self.container_length(self.config.max_collection_size, depth);
                let entries = (0..len)
                    .map(|_| {
                        (
                            self.element(key.as_deref(), depth),
                            self.element(value.as_deref(), depth),
                        )
                    })
                    .collect();
                Value::Map {
                    kind: *kind,
                    entries,
                }
            }
            TypeDescriptor::Enum { variants, .. } => {
                if *variants == 0 {
                    Value::Null
                } else {
                    Value::Enum(self.rng.gen_range(0..*variants))
                }
            }
            TypeDescriptor::Custom { .. } => construct_custom(descriptor),
        }
    }

    /// Fresh inputs for every slot.
    pub fn generate_inputs(&mut self, slots: &[TypeDescriptor]) -> Vec<InputSlot> {
        slots
            .iter()
            .map(|descriptor| InputSlot::new(descriptor.clone(), self.generate(descriptor, 0)))
            .collect()
    }

    /// A fresh random test case for `signature`.
    pub fn generate_test_case(&mut self, signature: &TargetSignature, generation: usize) -> TestCase {
        let inputs = self.generate_inputs(&signature.slots);
        TestCase::seeded(signature.target.clone(), inputs, generation)
    }

    /// Degenerate inputs: one null per slot, one empty container per
    /// sequence slot, and one case with every slot at maximal size.
    pub fn edge_cases(&mut self, signature: &TargetSignature, generation: usize) -> Vec<TestCase> {
        let slots = &signature.slots;
        let mut cases = Vec::with_capacity(slots.len() * 2 + 1);

        for null_slot in 0..slots.len() {
            let mut inputs = self.generate_inputs(slots);
            inputs[null_slot].value = Value::Null;
            cases.push(TestCase::seeded(signature.target.clone(), inputs, generation));
        }

        for (empty_slot, descriptor) in slots.iter().enumerate() {
            if !descriptor.is_sequence() {
                continue;
            }
            let mut inputs = self.generate_inputs(slots);
            inputs[empty_slot].value = empty_value(descriptor);
            cases.push(TestCase::seeded(signature.target.clone(), inputs, generation));
        }

        let large = slots
            .iter()
            .map(|descriptor| InputSlot::new(descriptor.clone(), self.large_value(descriptor)))
            .collect();
        cases.push(TestCase::seeded(signature.target.clone(), large, generation));

        cases
    }

    /// Maximal instance of a kind: long text or a container of
    /// `large_input_size` shallow elements.
    pub fn large_value(&mut self, descriptor: &TypeDescriptor) -> Value {
        let n = self.config.large_input_size;
        // Elements sit at the depth limit so nested containers stay small.
        let depth = self.config.max_nesting_depth;
        match descriptor {
            TypeDescriptor::Text => Value::Text("a".repeat(n)),
            TypeDescriptor::Array { element } => Value::Array {
                element: element.clone(),
                items: (0..n).map(|_| self.generate(element, depth)).collect(),
            },
            TypeDescriptor::Collection { kind, element } => Value::Collection {
                kind: *kind,
                items: (0..n).map(|_| self.element(element.as_deref(), depth)).collect(),
            },
            TypeDescriptor::Map { kind, key, value } => Value::Map {
                kind: *kind,
                entries: (0..n)
                    .map(|_| {
                        (
                            self.element(key.as_deref(), depth),
                            self.element(value.as_deref(), depth),
                        )
                    })
                    .collect(),
            },
            other => self.generate(other, 0),
        }
    }

    /// Random primitive of the given kind.
    pub fn primitive(&mut self, kind: PrimitiveKind) -> Primitive {
        match kind {
            PrimitiveKind::Bool => Primitive::Bool(self.rng.gen_bool(0.5)),
            PrimitiveKind::Byte => Primitive::Byte(self.rng.r#gen()),
            PrimitiveKind::Char => Primitive::Char(self.printable_char()),
            PrimitiveKind::Short => Primitive::Short(self.rng.r#gen()),
            PrimitiveKind::Int => Primitive::Int(self.rng.r#gen()),
            PrimitiveKind::Long => Primitive::Long(self.rng.r#gen()),
            PrimitiveKind::Float => Primitive::Float(self.rng.r#gen()),
            PrimitiveKind::Double => Primitive::Double(self.rng.r#gen()),
        }
    }

    /// Random string using one of the weighted strategies.
    pub fn string(&mut self) -> String {
        let length = self.rng.gen_range(1..=self.config.max_string_length.max(1));
        let strategy = WeightedIndex::new(STRING_STRATEGY_WEIGHTS)
            .map(|dist| dist.sample(&mut self.rng))
            .unwrap_or(0);

        match strategy {
            0 => self.printable_string(length),
            1 => {
                let pattern_length = self.rng.gen_range(1..10);
                let pattern = self.printable_string(pattern_length);
                pattern.chars().cycle().take(length).collect()
            }
            2 => "a".repeat(length),
            3 => (0..length)
                .map(|_| {
                    if self.rng.gen_bool(0.5) {
                        self.printable_char()
                    } else {
                        self.extended_char()
                    }
                })
                .collect(),
            _ => {
                if self.rng.gen_bool(0.5) {
                    String::new()
                } else {
                    self.printable_char().to_string()
                }
            }
        }
    }

    /// Printable ASCII string of exactly `length` characters.
    pub fn printable_string(&mut self, length: usize) -> String {
        (0..length).map(|_| self.printable_char()).collect()
    }

    pub fn printable_char(&mut self) -> char {
        char::from_u32(self.rng.gen_range(PRINTABLE)).unwrap_or('a')
    }

    fn extended_char(&mut self) -> char {
        char::from_u32(self.rng.gen_range(EXTENDED)).unwrap_or('\u{FFFD}')
    }

    /// Element of a container: typed when the element type is known,
    /// otherwise drawn from the biased kind chooser.
    fn element(&mut self, descriptor: Option<&TypeDescriptor>, depth: usize) -> Value {
        match descriptor {
            Some(descriptor) => self.generate(descriptor, depth + 1),
            None => self.untyped_element(depth),
        }
    }

    /// Element for a container with erased element type.
    pub fn untyped_element(&mut self, depth: usize) -> Value {
        let kind = WeightedIndex::new(ELEMENT_KIND_WEIGHTS)
            .map(|dist| dist.sample(&mut self.rng))
            .unwrap_or(0);

        match kind {
            0 => Value::Primitive(self.primitive(PrimitiveKind::Int)),
            1 => Value::Text(self.string()),
            2 => Value::Primitive(self.primitive(PrimitiveKind::Double)),
            3 => Value::Primitive(self.primitive(PrimitiveKind::Bool)),
            4 => self.generate(
                &TypeDescriptor::array_of(TypeDescriptor::primitive(PrimitiveKind::Int)),
                depth + 1,
            ),
            5 => self.generate(
                &TypeDescriptor::Collection {
                    kind: CollectionKind::List,
                    element: None,
                },
                depth + 1,
            ),
            6 => self.generate(
                &TypeDescriptor::Map {
                    kind: MapKind::Hash,
                    key: None,
                    value: None,
                },
                depth + 1,
            ),
            _ => Value::Null,
        }
    }

    /// Length in `[0, max >> depth]`. Each nesting level halves the cap.
    fn container_length(&mut self, max: usize, depth: usize) -> usize {
        let cap = max.checked_shr(depth as u32).unwrap_or(0);
        self.rng.gen_range(0..=cap)
    }

    /// Instance used once the depth limit is hit.
    fn minimal_value(&mut self, descriptor: &TypeDescriptor) -> Value {
        match descriptor {
            TypeDescriptor::Primitive { kind } => Value::Primitive(self.primitive(*kind)),
            TypeDescriptor::Text => Value::Text(String::new()),
            TypeDescriptor::Array { .. } | TypeDescriptor::Collection { .. } => {
                empty_value(descriptor)
            }
            TypeDescriptor::Map { kind, .. } => Value::Map {
                kind: *kind,
                entries: Vec::new(),
            },
            TypeDescriptor::Enum { variants, .. } if *variants > 0 => Value::Enum(0),
            TypeDescriptor::Enum { .. } => Value::Null,
            TypeDescriptor::Custom { .. } => construct_custom(descriptor),
        }
    }
}

/// Empty form of a sequence or text kind; `Null` for anything else.
pub fn empty_value(descriptor: &TypeDescriptor) -> Value {
    match descriptor {
        TypeDescriptor::Text => Value::Text(String::new()),
        TypeDescriptor::Array { element } => Value::Array {
            element: element.clone(),
            items: Vec::new(),
        },
        TypeDescriptor::Collection { kind, .. } => Value::Collection {
            kind: *kind,
            items: Vec::new(),
        },
        TypeDescriptor::Map { kind, .. } => Value::Map {
            kind: *kind,
            entries: Vec::new(),
        },
        _ => Value::Null,
    }
}

/// No-argument construction of a custom type, `Opaque` when unavailable.
fn construct_custom(descriptor: &TypeDescriptor) -> Value {
    match descriptor {
        TypeDescriptor::Custom {
            name,
            default_constructible: true,
        } => Value::Object {
            type_name: name.clone(),
        },
        TypeDescriptor::Custom { name, .. } => {
            log::debug!("No default constructor for {name}, using opaque value");
            Value::Opaque
        }
        _ => Value::Opaque,
    }
}
