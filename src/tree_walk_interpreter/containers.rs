use std::{cell::RefCell, rc::Rc};

use super::{
    callable::{Arity, Native},
    format_number, ExecutionErrorKind, Value,
};

pub type List = RefCell<Vec<Value>>;
/// Keys compare with script equality, so the map is a list of pairs.
pub type Map = RefCell<Vec<(Value, Value)>>;

/// Fixed-length storage created by `array[n]`.
#[derive(Debug)]
pub struct Array {
    elements: RefCell<Box<[Value]>>,
}

impl Array {
    pub fn new(length: usize) -> Result<Self, ExecutionErrorKind> {
        let mut elements = Vec::new();
        elements
            .try_reserve_exact(length)
            .map_err(|_| ExecutionErrorKind::ArrayTooLarge(length.to_string()))?;
        elements.resize(length, Value::Null);
        Ok(Self {
            elements: RefCell::new(elements.into_boxed_slice()),
        })
    }

    pub fn len(&self) -> usize {
        self.elements.borrow().len()
    }

    pub fn get(&self, index: &Value) -> Result<Value, ExecutionErrorKind> {
        let elements = self.elements.borrow();
        let index = checked_index(index, elements.len())?;
        Ok(elements[index].clone())
    }

    pub fn set(&self, index: &Value, value: Value) -> Result<(), ExecutionErrorKind> {
        let mut elements = self.elements.borrow_mut();
        let index = checked_index(index, elements.len())?;
        elements[index] = value;
        Ok(())
    }

    pub fn elements(&self) -> Vec<Value> {
        self.elements.borrow().to_vec()
    }
}

fn integer(value: &Value) -> Result<f64, ExecutionErrorKind> {
    match value {
        Value::Number(n) if n.is_finite() && n.fract() == 0.0 => Ok(*n),
        Value::Number(n) => Err(ExecutionErrorKind::InvalidIndex(format_number(*n))),
        other => Err(ExecutionErrorKind::InvalidIndex(other.type_name().to_string())),
    }
}

pub fn checked_index(index: &Value, length: usize) -> Result<usize, ExecutionErrorKind> {
    let n = integer(index)?;
    if n < 0.0 || n >= length as f64 {
        return Err(ExecutionErrorKind::IndexOutOfBounds {
            index: format_number(n),
            length,
        });
    }
    Ok(n as usize)
}

/// Like [`checked_index`] but one past the end is allowed.
fn slice_bound(bound: &Value, length: usize) -> Result<usize, ExecutionErrorKind> {
    let n = integer(bound)?;
    if n < 0.0 || n > length as f64 {
        return Err(ExecutionErrorKind::IndexOutOfBounds {
            index: format_number(n),
            length,
        });
    }
    Ok(n as usize)
}

pub fn map_get(map: &Map, key: &Value) -> Option<Value> {
    map.borrow()
        .iter()
        .find(|(k, _)| k.equals(key))
        .map(|(_, v)| v.clone())
}

pub fn map_insert(map: &Map, key: Value, value: Value) {
    let mut entries = map.borrow_mut();
    match entries.iter_mut().find(|(k, _)| k.equals(&key)) {
        Some(entry) => entry.1 = value,
        None => entries.push((key, value)),
    }
}

fn receiver_list<'a>(
    function: &'static str,
    args: &'a [Value],
) -> Result<&'a Rc<List>, ExecutionErrorKind> {
    match args.first() {
        Some(Value::List(list)) => Ok(list),
        _ => Err(ExecutionErrorKind::InvalidArgument {
            function,
            message: "receiver must be a list".to_string(),
        }),
    }
}

fn receiver_map<'a>(
    function: &'static str,
    args: &'a [Value],
) -> Result<&'a Rc<Map>, ExecutionErrorKind> {
    match args.first() {
        Some(Value::Map(map)) => Ok(map),
        _ => Err(ExecutionErrorKind::InvalidArgument {
            function,
            message: "receiver must be a map".to_string(),
        }),
    }
}

const LIST_METHODS: &[Native] = &[
    Native {
        name: "get",
        arity: Arity::Fixed(1),
        function: |_, args| {
            let list = receiver_list("get", args)?.borrow();
            let index = checked_index(&args[1], list.len())?;
            Ok(list[index].clone())
        },
    },
    Native {
        name: "set",
        arity: Arity::Fixed(2),
        function: |_, args| {
            let mut list = receiver_list("set", args)?.borrow_mut();
            let index = checked_index(&args[1], list.len())?;
            list[index] = args[2].clone();
            Ok(args[2].clone())
        },
    },
    Native {
        name: "size",
        arity: Arity::Fixed(0),
        function: |_, args| Ok(Value::Number(receiver_list("size", args)?.borrow().len() as f64)),
    },
    Native {
        name: "add",
        arity: Arity::Fixed(1),
        function: |_, args| {
            receiver_list("add", args)?.borrow_mut().push(args[1].clone());
            Ok(Value::Null)
        },
    },
    Native {
        name: "remove",
        arity: Arity::Fixed(1),
        function: |_, args| {
            let mut list = receiver_list("remove", args)?.borrow_mut();
            let index = checked_index(&args[1], list.len())?;
            Ok(list.remove(index))
        },
    },
    Native {
        name: "clear",
        arity: Arity::Fixed(0),
        function: |_, args| {
            receiver_list("clear", args)?.borrow_mut().clear();
            Ok(Value::Null)
        },
    },
    Native {
        name: "has",
        arity: Arity::Fixed(1),
        function: |_, args| {
            let list = receiver_list("has", args)?.borrow();
            Ok(Value::Boolean(list.iter().any(|v| v.equals(&args[1]))))
        },
    },
    Native {
        name: "slice",
        arity: Arity::Fixed(2),
        function: |_, args| {
            let list = receiver_list("slice", args)?.borrow();
            let start = slice_bound(&args[1], list.len())?;
            let end = slice_bound(&args[2], list.len())?;
            let slice = list.get(start..end).unwrap_or_default().to_vec();
            Ok(Value::List(Rc::new(RefCell::new(slice))))
        },
    },
];

const MAP_METHODS: &[Native] = &[
    Native {
        name: "get",
        arity: Arity::Fixed(1),
        function: |_, args| Ok(map_get(receiver_map("get", args)?, &args[1]).unwrap_or(Value::Null)),
    },
    Native {
        name: "set",
        arity: Arity::Fixed(2),
        function: |_, args| {
            map_insert(receiver_map("set", args)?, args[1].clone(), args[2].clone());
            Ok(Value::Null)
        },
    },
    Native {
        name: "put",
        arity: Arity::Fixed(2),
        function: |_, args| {
            map_insert(receiver_map("put", args)?, args[1].clone(), args[2].clone());
            Ok(Value::Null)
        },
    },
    Native {
        name: "size",
        arity: Arity::Fixed(0),
        function: |_, args| Ok(Value::Number(receiver_map("size", args)?.borrow().len() as f64)),
    },
    Native {
        name: "remove",
        arity: Arity::Fixed(1),
        function: |_, args| {
            let mut entries = receiver_map("remove", args)?.borrow_mut();
            match entries.iter().position(|(k, _)| k.equals(&args[1])) {
                Some(position) => Ok(entries.remove(position).1),
                None => Ok(Value::Null),
            }
        },
    },
    Native {
        name: "clear",
        arity: Arity::Fixed(0),
        function: |_, args| {
            receiver_map("clear", args)?.borrow_mut().clear();
            Ok(Value::Null)
        },
    },
    Native {
        name: "has_key",
        arity: Arity::Fixed(1),
        function: |_, args| {
            let entries = receiver_map("has_key", args)?.borrow();
            Ok(Value::Boolean(entries.iter().any(|(k, _)| k.equals(&args[1]))))
        },
    },
    Native {
        name: "has_value",
        arity: Arity::Fixed(1),
        function: |_, args| {
            let entries = receiver_map("has_value", args)?.borrow();
            Ok(Value::Boolean(entries.iter().any(|(_, v)| v.equals(&args[1]))))
        },
    },
    Native {
        name: "keys",
        arity: Arity::Fixed(0),
        function: |_, args| {
            let entries = receiver_map("keys", args)?.borrow();
            let keys = entries.iter().map(|(k, _)| k.clone()).collect();
            Ok(Value::List(Rc::new(RefCell::new(keys))))
        },
    },
    Native {
        name: "values",
        arity: Arity::Fixed(0),
        function: |_, args| {
            let entries = receiver_map("values", args)?.borrow();
            let values = entries.iter().map(|(_, v)| v.clone()).collect();
            Ok(Value::List(Rc::new(RefCell::new(values))))
        },
    },
];

pub fn list_method(name: &str) -> Option<Native> {
    LIST_METHODS.iter().find(|method| method.name == name).copied()
}

pub fn map_method(name: &str) -> Option<Native> {
    MAP_METHODS.iter().find(|method| method.name == name).copied()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_array_bounds() {
        let array = Array::new(3).unwrap();
        assert_eq!(array.len(), 3);
        array.set(&Value::Number(2.0), Value::Number(7.0)).unwrap();
        assert!(matches!(
            array.get(&Value::Number(2.0)),
            Ok(Value::Number(n)) if n == 7.0
        ));
        assert!(matches!(array.get(&Value::Number(0.0)), Ok(Value::Null)));
        assert!(matches!(
            array.get(&Value::Number(3.0)),
            Err(ExecutionErrorKind::IndexOutOfBounds { length: 3, .. })
        ));
        assert!(matches!(
            array.set(&Value::Number(-1.0), Value::Null),
            Err(ExecutionErrorKind::IndexOutOfBounds { .. })
        ));
        assert!(matches!(
            array.get(&Value::Number(0.5)),
            Err(ExecutionErrorKind::InvalidIndex(_))
        ));
        assert!(matches!(
            array.get(&Value::String("0".to_string())),
            Err(ExecutionErrorKind::InvalidIndex(_))
        ));
    }

    #[test]
    fn test_unallocatable_array() {
        assert!(matches!(
            Array::new(usize::MAX),
            Err(ExecutionErrorKind::ArrayTooLarge(_))
        ));
        assert_eq!(Array::new(0).unwrap().len(), 0);
    }

    #[test]
    fn test_map_keys_use_script_equality() {
        let map: Map = RefCell::new(vec![]);
        map_insert(&map, Value::Number(1.0), Value::String("one".to_string()));
        map_insert(&map, Value::Number(1.0), Value::String("uno".to_string()));
        map_insert(&map, Value::String("1".to_string()), Value::Null);
        assert_eq!(map.borrow().len(), 2);
        assert!(matches!(
            map_get(&map, &Value::Number(1.0)),
            Some(Value::String(s)) if s == "uno"
        ));
    }

    #[test]
    fn test_method_tables() {
        assert!(list_method("slice").is_some());
        assert!(list_method("keys").is_none());
        assert!(map_method("has_value").is_some());
        assert!(map_method("add").is_none());
    }
}
