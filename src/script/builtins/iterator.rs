//! Native iterators behind array, string and collection iteration.

use super::{iter_result, method, symbol_method, this_object};
use crate::script::interpreter::{Control, Interpreter};
use crate::script::object::{ObjectKind, ObjectRef, Property};
use crate::script::realm::Realm;
use crate::script::value::{JsStr, PropertyKey, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterKind {
    Keys,
    Values,
    Entries,
}

/// Position of a native iterator. Array and collection iterators read their
/// target live, so elements added during iteration are visited.
pub enum IteratorState {
    Array {
        target: ObjectRef,
        index: usize,
        kind: IterKind,
    },
    /// Yields code points; `offset` is a byte offset into `text`.
    String { text: JsStr, offset: usize },
    Map {
        target: ObjectRef,
        index: usize,
        kind: IterKind,
    },
    Set {
        target: ObjectRef,
        index: usize,
        kind: IterKind,
    },
    List {
        items: Vec<Value>,
        index: usize,
        kind: IterKind,
    },
    Done,
}

impl IteratorState {
    pub fn list(items: Vec<Value>, kind: IterKind) -> Self {
        Self::List { items, index: 0, kind }
    }

    /// Values kept alive by this iterator.
    pub fn into_values(self) -> Vec<Value> {
        match self {
            Self::Array { target, .. } | Self::Map { target, .. } | Self::Set { target, .. } => {
                vec![Value::Object(target)]
            }
            Self::List { items, .. } => items,
            Self::String { .. } | Self::Done => Vec::new(),
        }
    }

    /// Moves to the next element, yielding its key and value.
    fn advance(&mut self) -> Option<(IterKind, Value, Value)> {
        let step = match self {
            Self::Array { target, index, kind } => {
                let item = match &target.read().kind {
                    ObjectKind::Array(items) => items.get(*index).cloned(),
                    _ => None,
                };
                item.map(|value| {
                    let key = Value::Number(*index as f64);
                    *index += 1;
                    (*kind, key, value)
                })
            }
            Self::String { text, offset } => text[*offset..].chars().next().map(|ch| {
                *offset += ch.len_utf8();
                let value = Value::string(ch.to_string());
                (IterKind::Values, value.clone(), value)
            }),
            Self::Map { target, index, kind } => {
                let entry = match &target.read().kind {
                    ObjectKind::Map(table) => table.next_entry(*index),
                    _ => None,
                };
                entry.map(|(position, key, value)| {
                    *index = position + 1;
                    (*kind, key, value)
                })
            }
            Self::Set { target, index, kind } => {
                let entry = match &target.read().kind {
                    ObjectKind::Set(table) => table.next_entry(*index),
                    _ => None,
                };
                entry.map(|(position, key, _)| {
                    *index = position + 1;
                    (*kind, key.clone(), key)
                })
            }
            Self::List { items, index, kind } => items.get(*index).cloned().map(|value| {
                let key = Value::Number(*index as f64);
                *index += 1;
                (*kind, key, value)
            }),
            Self::Done => None,
        };
        if step.is_none() {
            *self = Self::Done;
        }
        step
    }
}

/// Wraps `state` in an iterator object of this realm.
pub fn make_iterator(interp: &Interpreter, state: IteratorState) -> Value {
    Value::Object(ObjectRef::new(
        ObjectKind::Iterator(state),
        Some(interp.realm().intrinsics.iterator_prototype.clone()),
    ))
}

pub fn install(realm: &Arc<Realm>) {
    let proto = &realm.intrinsics.iterator_prototype;
    method(realm, proto, "next", 0, next);
    symbol_method(realm, proto, &realm.symbols.iterator, "[Symbol.iterator]", |_, this, _| {
        Ok(this.clone())
    });
    let _ = proto.try_define(
        PropertyKey::Symbol(realm.symbols.to_string_tag.clone()),
        Property::meta(Value::string("Iterator")),
    );
}

fn next(interp: &mut Interpreter, this: &Value, _: &[Value]) -> Result<Value, Control> {
    let iterator = this_object(interp, this, "next", |kind| matches!(kind, ObjectKind::Iterator(_)))?;
    let step = match &mut iterator.write().kind {
        ObjectKind::Iterator(state) => state.advance(),
        _ => None,
    };
    Ok(match step {
        Some((IterKind::Keys, key, _)) => iter_result(interp, key, false),
        Some((IterKind::Values, _, value)) => iter_result(interp, value, false),
        Some((IterKind::Entries, key, value)) => {
            let entry = interp.array(vec![key, value]);
            iter_result(interp, entry, false)
        }
        None => iter_result(interp, Value::Undefined, true),
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{eval_error, eval_string};

    #[test]
    fn array_iterators_yield_keys_values_and_entries() {
        let value = eval_string(
            "var a = ['x', 'y'];
             return [[...a.keys()].join(), [...a.values()].join(), JSON.stringify([...a.entries()])].join('|')",
        );
        assert_eq!(value, "0,1|x,y|[[0,\"x\"],[1,\"y\"]]");
    }

    #[test]
    fn exhausted_iterators_stay_done() {
        let value = eval_string(
            "var it = [1][Symbol.iterator]();
             var first = it.next(), second = it.next(), third = it.next();
             return [first.value, first.done, second.done, third.done, it[Symbol.iterator]() === it].join()",
        );
        assert_eq!(value, "1,false,true,true,true");
    }

    #[test]
    fn array_iteration_sees_elements_pushed_during_the_loop() {
        let value = eval_string(
            "var a = [1], seen = [];
             for (var x of a) { seen.push(x); if (a.length < 3) a.push(x + 1); }
             return seen.join()",
        );
        assert_eq!(value, "1,2,3");
    }

    #[test]
    fn string_iteration_walks_code_points() {
        assert_eq!(eval_string("return [...'a😀b'].join('|')"), "a|😀|b");
        assert_eq!(
            eval_error("var next = [][Symbol.iterator]().next; next.call({})"),
            "TypeError: Method next called on incompatible receiver #<Object>"
        );
    }
}
