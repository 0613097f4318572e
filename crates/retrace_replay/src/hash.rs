//! Deterministic structural hashing.
//!
//! Origin code sometimes returns a hash of an object where the destination
//! computes a different but equivalent one. The checker recovers from that by
//! hashing live objects and looking for the recorded integer, so the hash has
//! to be stable across runs: FxHasher with no random state.

use crate::value::{Object, Value};
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

/// Tuple nesting beyond this is treated as unhashable
const MAX_DEPTH: usize = 64;

/// Hash a hashable value.
///
/// Scalars, tuples of hashables, enum constants, dates and durations are
/// hashable. Mutable containers, streams and instances are not.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn structural_hash(value: &Value) -> Option<i64> {
    let mut hasher = FxHasher::default();
    feed(value, &mut hasher, 0)?;
    Some(hasher.finish() as i64)
}

/// Hash of a tuple built from the given members
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn tuple_hash(members: &[&Value]) -> Option<i64> {
    let mut hasher = FxHasher::default();
    feed_tuple(members.iter().copied(), members.len(), &mut hasher, 0)?;
    Some(hasher.finish() as i64)
}

fn feed(value: &Value, hasher: &mut FxHasher, depth: usize) -> Option<()> {
    if depth > MAX_DEPTH {
        return None;
    }
    match value {
        Value::Null => 0u8.hash(hasher),
        Value::Bool(b) => {
            // Booleans share the integer space, matching 1 == true.
            2u8.hash(hasher);
            i128::from(*b).hash(hasher);
        }
        Value::Int(i) => {
            2u8.hash(hasher);
            i.hash(hasher);
        }
        Value::Float(f) => feed_float(*f, hasher),
        Value::Str(s) => {
            3u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Path(p) => {
            4u8.hash(hasher);
            p.hash(hasher);
        }
        Value::Address(a) => {
            5u8.hash(hasher);
            a.hash(hasher);
        }
        Value::Type(t) => {
            6u8.hash(hasher);
            t.hash(hasher);
        }
        Value::Thread(t) => {
            7u8.hash(hasher);
            t.hash(hasher);
        }
        Value::Std(s) => {
            8u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Ref(r) => {
            let obj = r.try_borrow()?;
            match &*obj {
                Object::Tuple(items) => feed_tuple(items.iter(), items.len(), hasher, depth)?,
                Object::Enum(e) => {
                    10u8.hash(hasher);
                    e.class.hash(hasher);
                    e.name.hash(hasher);
                }
                Object::DateTime(d) => {
                    11u8.hash(hasher);
                    d.timestamp().hash(hasher);
                    d.timestamp_subsec_nanos().hash(hasher);
                }
                Object::Duration(d) => {
                    12u8.hash(hasher);
                    d.num_seconds().hash(hasher);
                    d.subsec_nanos().hash(hasher);
                }
                _ => return None,
            }
        }
    }
    Some(())
}

fn feed_tuple<'v>(
    items: impl Iterator<Item = &'v Value>,
    len: usize,
    hasher: &mut FxHasher,
    depth: usize,
) -> Option<()> {
    9u8.hash(hasher);
    len.hash(hasher);
    for item in items {
        feed(item, hasher, depth + 1)?;
    }
    Some(())
}

#[allow(clippy::cast_possible_truncation)]
fn feed_float(f: f64, hasher: &mut FxHasher) {
    // Integral floats hash like the equal integer.
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e38 {
        2u8.hash(hasher);
        (f as i128).hash(hasher);
    } else {
        1u8.hash(hasher);
        f.to_bits().hash(hasher);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{EnumValue, Instance};
    use proptest::prelude::*;

    #[test]
    fn test_equal_scalars_hash_equal() {
        assert_eq!(structural_hash(&Value::Int(1)), structural_hash(&Value::Float(1.0)));
        assert_eq!(structural_hash(&Value::Int(1)), structural_hash(&Value::Bool(true)));
        assert_ne!(structural_hash(&Value::Int(1)), structural_hash(&Value::Int(2)));
        assert_ne!(structural_hash(&Value::str("1")), structural_hash(&Value::Int(1)));
    }

    #[test]
    fn test_tuples_hash_by_content() {
        let a = Value::tuple(vec![Value::Int(1), Value::str("x")]);
        let b = Value::tuple(vec![Value::Int(1), Value::str("x")]);
        assert_eq!(structural_hash(&a), structural_hash(&b));
        assert_eq!(structural_hash(&a), tuple_hash(&[&Value::Int(1), &Value::str("x")]));
    }

    #[test]
    fn test_unhashable_objects() {
        assert!(structural_hash(&Value::list(vec![])).is_none());
        assert!(structural_hash(&Value::object(Object::Instance(Instance::new("C")))).is_none());
        let nested = Value::tuple(vec![Value::list(vec![])]);
        assert!(structural_hash(&nested).is_none());
    }

    #[test]
    fn test_enum_hash() {
        let red = |v: i128| {
            Value::object(Object::Enum(EnumValue {
                class: "Color".into(),
                name: "RED".into(),
                value: Value::Int(v),
            }))
        };
        assert_eq!(structural_hash(&red(0)), structural_hash(&red(1)));
    }

    proptest::proptest! {
        #[test]
        fn prop_hash_is_deterministic(n in any::<i64>(), s in ".{0,16}") {
            let v = Value::tuple(vec![Value::Int(i128::from(n)), Value::str(s.clone())]);
            let w = Value::tuple(vec![Value::Int(i128::from(n)), Value::str(s)]);
            prop_assert_eq!(structural_hash(&v), structural_hash(&w));
            prop_assert!(structural_hash(&v).is_some());
        }
    }
}
