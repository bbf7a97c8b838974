//! Crossover and mutation over the value model.
//!
//! Both operators dispatch on the value kind of each input slot. A
//! successful operation always leaves a slot with a value that conforms to
//! its declared descriptor.

use rand::prelude::*;
use rand_distr::StandardNormal;

use crate::schema::{FuzzerError, InputSlot, Primitive, TestCase, TypeDescriptor, Value};

use super::generator::ValueGenerator;

/// Scale of the additive Gaussian jitter applied to numbers.
const JITTER_SCALE: f64 = 25.0;
/// Range of the multiplicative jitter factor.
const SCALE_RANGE: std::ops::Range<f64> = 0.5..2.5;
/// Range of a wholesale numeric replacement.
const REPLACEMENT_RANGE: std::ops::Range<f64> = -500.0..500.0;

/// Crossover and mutation operators.
pub struct GeneticOperators {
    generator: ValueGenerator,
}

impl GeneticOperators {
    pub fn new(generator: ValueGenerator) -> Self {
        Self { generator }
    }

    /// Value generator used for fresh elements and operator choices.
    pub fn generator(&mut self) -> &mut ValueGenerator {
        &mut self.generator
    }

    fn rng(&mut self) -> &mut StdRng {
        self.generator.rng()
    }

    /// Longest string or container a splice may produce.
    fn growth_cap(&self) -> usize {
        self.generator.config().large_input_size
    }

    /// Recombine two test cases of the same target slot by slot.
    pub fn crossover(&mut self, first: &TestCase, second: &TestCase) -> Result<TestCase, FuzzerError> {
        if first.target() != second.target() {
            return Err(FuzzerError::MismatchedTargets {
                left: first.target().to_string(),
                right: second.target().to_string(),
            });
        }
        if first.inputs().len() != second.inputs().len() {
            return Err(FuzzerError::SlotCountMismatch {
                left: first.id(),
                right: second.id(),
            });
        }

        let inputs = first
            .inputs()
            .iter()
            .zip(second.inputs())
            .map(|(a, b)| {
                let value = self.crossover_value(&a.value, &b.value, Some(&a.descriptor));
                InputSlot::new(a.descriptor.clone(), value)
            })
            .collect();

        Ok(TestCase::child_of(first, second, inputs))
    }

    /// Derive a mutant with every slot perturbed.
    pub fn mutate(&mut self, parent: &TestCase) -> TestCase {
        let inputs = parent
            .inputs()
            .iter()
            .map(|slot| {
                let value = self.mutate_value(&slot.value, Some(&slot.descriptor));
                InputSlot::new(slot.descriptor.clone(), value)
            })
            .collect();

        TestCase::mutant_of(parent, inputs)
    }

    fn crossover_value(&mut self, a: &Value, b: &Value, descriptor: Option<&TypeDescriptor>) -> Value {
        match (a, b) {
            (Value::Null, other) | (other, Value::Null) => other.clone(),
            (Value::Primitive(x), Value::Primitive(y)) if x.kind() == y.kind() => {
                Value::Primitive(self.crossover_primitives(*x, *y))
            }
            (Value::Text(x), Value::Text(y)) => Value::Text(self.crossover_strings(x, y)),
            (
                Value::Array { element, items: xs },
                Value::Array { items: ys, .. },
            ) => Value::Array {
                element: element.clone(),
                items: self.crossover_items(xs, ys, Some(element)),
            },
            (Value::Collection { kind, items: xs }, Value::Collection { items: ys, .. }) => {
                let element = collection_element(descriptor);
                Value::Collection {
                    kind: *kind,
                    items: self.crossover_items(xs, ys, element),
                }
            }
            (Value::Map { kind, entries: xs }, Value::Map { entries: ys, .. }) => {
                let (_, value_type) = map_types(descriptor);
                let min = xs.len().min(ys.len());
                let mut entries: Vec<(Value, Value)> = (0..min)
                    .map(|i| {
                        let key = if self.rng().gen_bool(0.5) {
                            xs[i].0.clone()
                        } else {
                            ys[i].0.clone()
                        };
                        let value = self.crossover_value(&xs[i].1, &ys[i].1, value_type);
                        (key, value)
                    })
                    .collect();
                let longer = if xs.len() > ys.len() { xs } else { ys };
                entries.extend_from_slice(&longer[min..]);
                Value::Map {
                    kind: *kind,
                    entries,
                }
            }
            _ => {
                if self.rng().gen_bool(0.5) {
                    a.clone()
                } else {
                    b.clone()
                }
            }
        }
    }

    /// Positional recombination up to the shorter length, then the tail of the longer.
    fn crossover_items(
        &mut self,
        xs: &[Value],
        ys: &[Value],
        element: Option<&TypeDescriptor>,
    ) -> Vec<Value> {
        let min = xs.len().min(ys.len());
        let mut items: Vec<Value> = (0..min)
            .map(|i| self.crossover_value(&xs[i], &ys[i], element))
            .collect();
        let longer = if xs.len() > ys.len() { xs } else { ys };
        items.extend_from_slice(&longer[min..]);
        items
    }

    /// Weighted blend for numbers, parent pick for booleans and characters.
    fn crossover_primitives(&mut self, x: Primitive, y: Primitive) -> Primitive {
        match (x.as_f64(), y.as_f64()) {
            (Some(a), Some(b)) => {
                let alpha: f64 = self.rng().r#gen();
                Primitive::from_f64(x.kind(), alpha * a + (1.0 - alpha) * b).unwrap_or(x)
            }
            _ => {
                if self.rng().gen_bool(0.5) {
                    x
                } else {
                    y
                }
            }
        }
    }

    /// Splice two strings with single-point, two-point, uniform or
    /// concatenation crossover.
    fn crossover_strings(&mut self, a: &str, b: &str) -> String {
        if a.is_empty() {
            return b.to_string();
        }
        if b.is_empty() {
            return a.to_string();
        }

        let xs: Vec<char> = a.chars().collect();
        let ys: Vec<char> = b.chars().collect();
        let min = xs.len().min(ys.len());

        match self.rng().gen_range(0..4) {
            0 => {
                let point = self.rng().gen_range(0..=min);
                xs[..point].iter().chain(&ys[point..]).collect()
            }
            1 => {
                let start = self.rng().gen_range(0..=min);
                let end = self.rng().gen_range(start..=min);
                xs[..start]
                    .iter()
                    .chain(&ys[start..end])
                    .chain(&xs[end..])
                    .collect()
            }
            2 => {
                let len = xs.len().max(ys.len());
                (0..len)
                    .filter_map(|i| match (xs.get(i), ys.get(i)) {
                        (Some(&x), Some(&y)) => Some(if self.rng().gen_bool(0.5) { x } else { y }),
                        (x, y) => x.or(y).copied(),
                    })
                    .collect()
            }
            _ => {
                let cap = self.growth_cap().max(xs.len()).max(ys.len());
                xs.iter().chain(&ys).take(cap).collect()
            }
        }
    }

    fn mutate_value(&mut self, value: &Value, descriptor: Option<&TypeDescriptor>) -> Value {
        match value {
            Value::Null => match descriptor {
                Some(descriptor) => self.generator.generate(descriptor, 0),
                None => self.generator.untyped_element(0),
            },
            Value::Primitive(p) => Value::Primitive(self.mutate_primitive(*p)),
            Value::Text(s) => Value::Text(self.mutate_string(s)),
            Value::Array { element, items } => {
                let mut items = items.clone();
                self.mutate_items(&mut items, Some(element));
                Value::Array {
                    element: element.clone(),
                    items,
                }
            }
            Value::Collection { kind, items } => {
                let mut items = items.clone();
                self.mutate_items(&mut items, collection_element(descriptor));
                Value::Collection { kind: *kind, items }
            }
            Value::Map { kind, entries } => {
                let mut entries = entries.clone();
                self.mutate_entries(&mut entries, map_types(descriptor));
                Value::Map {
                    kind: *kind,
                    entries,
                }
            }
            Value::Enum(index) => match descriptor {
                Some(TypeDescriptor::Enum { variants, .. }) if *variants > 0 => {
                    Value::Enum(self.rng().gen_range(0..*variants))
                }
                _ => Value::Enum(*index),
            },
            Value::Object { .. } | Value::Opaque => value.clone(),
        }
    }

    /// Flip booleans, redraw characters, jitter or replace numbers.
    fn mutate_primitive(&mut self, p: Primitive) -> Primitive {
        let Some(x) = p.as_f64() else {
            return match p {
                Primitive::Bool(b) => Primitive::Bool(!b),
                Primitive::Char(_) => Primitive::Char(self.generator.printable_char()),
                other => other,
            };
        };

        let strategies: &[u8] = if p.kind().is_integral() {
            &[0, 1, 2, 3]
        } else {
            &[0, 1, 3]
        };
        let strategy = strategies.choose(self.rng()).copied().unwrap_or(3);

        let mutated = match strategy {
            0 => {
                let noise: f64 = self.rng().sample(StandardNormal);
                if p.kind().is_integral() {
                    // f64 cannot represent every i64 above 2^53.
                    let delta = match (noise * JITTER_SCALE).round() as i64 {
                        0 if noise < 0.0 => -1,
                        0 => 1,
                        delta => delta,
                    };
                    return p.saturating_offset(delta);
                }
                x + noise * JITTER_SCALE
            }
            1 => x * self.rng().gen_range(SCALE_RANGE),
            2 => {
                let bit = self.rng().gen_range(0..64);
                return p.flip_bit(bit);
            }
            _ => self.rng().gen_range(REPLACEMENT_RANGE),
        };

        Primitive::from_f64(p.kind(), mutated).unwrap_or(p)
    }

    fn mutate_string(&mut self, s: &str) -> String {
        if s.is_empty() {
            return self.generator.printable_char().to_string();
        }

        let mut chars: Vec<char> = s.chars().collect();
        let len = chars.len();

        match self.rng().gen_range(0..6) {
            0 => {
                let at = self.rng().gen_range(0..=len);
                let c = self.generator.printable_char();
                chars.insert(at, c);
            }
            1 => {
                if len > 1 {
                    let at = self.rng().gen_range(0..len);
                    chars.remove(at);
                }
            }
            2 => {
                let at = self.rng().gen_range(0..len);
                chars[at] = self.generator.printable_char();
            }
            3 => {
                let start = self.rng().gen_range(0..len);
                let end = self.rng().gen_range(start + 1..=len);
                let room = self.growth_cap().saturating_sub(len);
                let copy: Vec<char> = chars[start..end].iter().take(room).copied().collect();
                chars.extend(copy);
            }
            4 => {
                let start = self.rng().gen_range(0..len);
                let end = self.rng().gen_range(start + 1..=len);
                chars[start..end].reverse();
            }
            _ => return self.generator.printable_string(len),
        }

        chars.into_iter().collect()
    }

    /// Mutate one element, append a fresh one, or drop one.
    fn mutate_items(&mut self, items: &mut Vec<Value>, element: Option<&TypeDescriptor>) {
        let strategy = if items.is_empty() {
            1
        } else {
            self.rng().gen_range(0..3)
        };

        match strategy {
            0 => {
                let at = self.rng().gen_range(0..items.len());
                items[at] = self.mutate_value(&items[at], element);
            }
            1 => {
                let fresh = self.fresh_element(element);
                items.push(fresh);
            }
            _ => {
                if items.len() > 1 {
                    let at = self.rng().gen_range(0..items.len());
                    items.remove(at);
                }
            }
        }
    }

    /// Mutate one value, insert a fresh pair, or drop one pair.
    fn mutate_entries(
        &mut self,
        entries: &mut Vec<(Value, Value)>,
        (key_type, value_type): (Option<&TypeDescriptor>, Option<&TypeDescriptor>),
    ) {
        let strategy = if entries.is_empty() {
            1
        } else {
            self.rng().gen_range(0..3)
        };

        match strategy {
            0 => {
                let at = self.rng().gen_range(0..entries.len());
                entries[at].1 = self.mutate_value(&entries[at].1, value_type);
            }
            1 => {
                let key = self.fresh_element(key_type);
                let value = self.fresh_element(value_type);
                entries.push((key, value));
            }
            _ => {
                if entries.len() > 1 {
                    let at = self.rng().gen_range(0..entries.len());
                    entries.remove(at);
                }
            }
        }
    }

    fn fresh_element(&mut self, element: Option<&TypeDescriptor>) -> Value {
        match element {
            Some(descriptor) => self.generator.generate(descriptor, 1),
            None => self.generator.untyped_element(1),
        }
    }
}

fn collection_element(descriptor: Option<&TypeDescriptor>) -> Option<&TypeDescriptor> {
    match descriptor {
        Some(TypeDescriptor::Collection { element, .. }) => element.as_deref(),
        _ => None,
    }
}

fn map_types(
    descriptor: Option<&TypeDescriptor>,
) -> (Option<&TypeDescriptor>, Option<&TypeDescriptor>) {
    match descriptor {
        Some(TypeDescriptor::Map { key, value, .. }) => (key.as_deref(), value.as_deref()),
        _ => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{GeneratorConfig, PrimitiveKind, TargetSignature};

    fn operators(seed: u64) -> GeneticOperators {
        let config = GeneratorConfig {
            max_string_length: 40,
            max_collection_size: 6,
            max_array_length: 6,
            max_nesting_depth: 2,
            large_input_size: 200,
        };
        GeneticOperators::new(ValueGenerator::new(config, seed))
    }

    fn signature() -> TargetSignature {
        TargetSignature::new(
            "process",
            vec![
                TypeDescriptor::Text,
                TypeDescriptor::primitive(PrimitiveKind::Int),
                TypeDescriptor::primitive(PrimitiveKind::Double),
                TypeDescriptor::primitive(PrimitiveKind::Bool),
                TypeDescriptor::array_of(TypeDescriptor::primitive(PrimitiveKind::Long)),
                TypeDescriptor::Collection {
                    kind: crate::schema::CollectionKind::Set,
                    element: None,
                },
                TypeDescriptor::map_of(TypeDescriptor::Text, TypeDescriptor::Text),
                TypeDescriptor::Enum {
                    name: "Mode".into(),
                    variants: 3,
                },
                TypeDescriptor::Custom {
                    name: "Widget".into(),
                    default_constructible: true,
                },
            ],
        )
    }

    fn single(descriptor: TypeDescriptor, value: Value) -> TestCase {
        TestCase::new("process", vec![InputSlot::new(descriptor, value)])
    }

    fn assert_conforms(tc: &TestCase) {
        for slot in tc.inputs() {
            assert!(
                slot.value.conforms_to(&slot.descriptor),
                "{:?} does not conform to {:?}",
                slot.value,
                slot.descriptor
            );
        }
    }

    #[test]
    fn test_crossover_rejects_mismatched_targets() {
        let mut ops = operators(1);
        let a = TestCase::new("sort", vec![]);
        let b = TestCase::new("hash", vec![]);
        assert!(matches!(
            ops.crossover(&a, &b),
            Err(FuzzerError::MismatchedTargets { .. })
        ));
    }

    #[test]
    fn test_crossover_lineage() {
        let mut ops = operators(2);
        let sig = signature();
        let a = TestCase::seeded("process", ops.generator().generate_inputs(&sig.slots), 3);
        let b = TestCase::seeded("process", ops.generator().generate_inputs(&sig.slots), 7);

        let child = ops.crossover(&a, &b).unwrap();
        assert_eq!(child.generation(), 8);
        assert_eq!(child.parents(), &[a.id(), b.id()]);
        assert_eq!(child.crossover_count(), a.crossover_count() + 1);
        assert_eq!(child.mutation_count(), a.mutation_count());
        assert_eq!(child.fitness(), 0.0);
        assert!(!child.is_evaluated());
    }

    #[test]
    fn test_offspring_conform_to_descriptors() {
        let sig = signature();
        for seed in 0..30 {
            let mut ops = operators(seed);
            let a = ops.generator().generate_test_case(&sig, 0);
            let b = ops.generator().generate_test_case(&sig, 0);

            let child = ops.crossover(&a, &b).unwrap();
            assert_conforms(&child);

            let mutant = ops.mutate(&child);
            assert_conforms(&mutant);
            assert_eq!(mutant.generation(), child.generation() + 1);
        }
    }

    #[test]
    fn test_crossover_null_passes_through() {
        let mut ops = operators(3);
        let a = single(TypeDescriptor::Text, Value::Null);
        let b = single(TypeDescriptor::Text, Value::Text("payload".into()));
        let child = ops.crossover(&a, &b).unwrap();
        assert_eq!(child.inputs()[0].value, Value::Text("payload".into()));
    }

    #[test]
    fn test_numeric_blend_stays_between_parents() {
        let descriptor = TypeDescriptor::primitive(PrimitiveKind::Int);
        for seed in 0..50 {
            let mut ops = operators(seed);
            let a = single(descriptor.clone(), Value::Primitive(Primitive::Int(10)));
            let b = single(descriptor.clone(), Value::Primitive(Primitive::Int(20)));
            let child = ops.crossover(&a, &b).unwrap();
            match child.inputs()[0].value {
                Value::Primitive(Primitive::Int(v)) => assert!((10..=20).contains(&v)),
                ref other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_string_crossover_draws_from_parents() {
        for seed in 0..50 {
            let mut ops = operators(seed);
            let a = single(TypeDescriptor::Text, Value::Text("aaaaaa".into()));
            let b = single(TypeDescriptor::Text, Value::Text("bbbb".into()));
            let child = ops.crossover(&a, &b).unwrap();
            let Value::Text(s) = &child.inputs()[0].value else {
                panic!("text slot lost its kind");
            };
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c == 'a' || c == 'b'));
            assert!(s.chars().count() <= 10);
        }
    }

    #[test]
    fn test_sequence_crossover_keeps_longer_tail() {
        let element = TypeDescriptor::primitive(PrimitiveKind::Int);
        let array = |n: i32| Value::Array {
            element: Box::new(element.clone()),
            items: (0..n).map(|i| Value::Primitive(Primitive::Int(i))).collect(),
        };
        let descriptor = TypeDescriptor::array_of(element.clone());
        let mut ops = operators(4);
        let a = single(descriptor.clone(), array(2));
        let b = single(descriptor, array(5));

        let child = ops.crossover(&a, &b).unwrap();
        let Value::Array { items, .. } = &child.inputs()[0].value else {
            panic!("array slot lost its kind");
        };
        assert_eq!(items.len(), 5);
        assert_eq!(items[4], Value::Primitive(Primitive::Int(4)));
    }

    #[test]
    fn test_mutation_lineage_and_null_regeneration() {
        let mut ops = operators(5);
        let parent = single(TypeDescriptor::Text, Value::Null);
        let mutant = ops.mutate(&parent);
        assert_eq!(mutant.generation(), parent.generation() + 1);
        assert_eq!(mutant.parents(), &[parent.id()]);
        assert_eq!(mutant.mutation_count(), 1);
        assert!(matches!(mutant.inputs()[0].value, Value::Text(_)));
    }

    #[test]
    fn test_boolean_mutation_flips() {
        let mut ops = operators(6);
        let parent = single(
            TypeDescriptor::primitive(PrimitiveKind::Bool),
            Value::Primitive(Primitive::Bool(true)),
        );
        let mutant = ops.mutate(&parent);
        assert_eq!(
            mutant.inputs()[0].value,
            Value::Primitive(Primitive::Bool(false))
        );
    }

    #[test]
    fn test_large_long_mutation_always_moves() {
        let descriptor = TypeDescriptor::primitive(PrimitiveKind::Long);
        let original = Value::Primitive(Primitive::Long(1 << 60));
        for seed in 0..200 {
            let mut ops = operators(seed);
            let parent = single(descriptor.clone(), original.clone());
            let mutant = ops.mutate(&parent);
            assert_ne!(mutant.inputs()[0].value, original, "seed {seed}");
        }
    }

    #[test]
    fn test_empty_string_mutation_grows() {
        let mut ops = operators(7);
        let parent = single(TypeDescriptor::Text, Value::Text(String::new()));
        let mutant = ops.mutate(&parent);
        assert_eq!(mutant.inputs()[0].value.size(), 1.0);
    }

    #[test]
    fn test_opaque_and_custom_unchanged() {
        let mut ops = operators(8);
        let custom = TypeDescriptor::Custom {
            name: "Widget".into(),
            default_constructible: false,
        };
        let parent = single(custom, Value::Opaque);
        assert_eq!(ops.mutate(&parent).inputs()[0].value, Value::Opaque);
    }

    #[test]
    fn test_sequence_mutation_changes_length_by_at_most_one() {
        let descriptor = TypeDescriptor::list_of(TypeDescriptor::Text);
        for seed in 0..30 {
            let mut ops = operators(seed);
            let items = vec![Value::Text("x".into()); 4];
            let parent = single(
                descriptor.clone(),
                Value::Collection {
                    kind: crate::schema::CollectionKind::List,
                    items,
                },
            );
            let mutant = ops.mutate(&parent);
            let size = mutant.inputs()[0].value.size();
            assert!((3.0..=5.0).contains(&size));
        }
    }
}
