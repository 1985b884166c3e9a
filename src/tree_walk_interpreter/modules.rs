use std::{
    cell::RefCell,
    io::{BufRead, Write},
    rc::Rc,
};

use super::{
    callable::{Arity, Callable, Native},
    containers::{map_insert, Map},
    ExecutionErrorKind, Interpreter, Value,
};

/// Loaded by every interpreter before any script runs.
pub const PRELUDE: &[&str] = &["internal", "base"];

pub const MODULE_NAMES: &[&str] = &["internal", "base", "math", "io"];

pub struct Module {
    pub name: &'static str,
    constants: &'static [(&'static str, f64)],
    functions: &'static [Native],
}

pub fn find(name: &str) -> Option<&'static Module> {
    MODULES.iter().find(|module| module.name == name)
}

pub fn inject(interpreter: &mut Interpreter, module: &Module) {
    tracing::trace!(module = module.name, "injecting native module");
    for (name, value) in module.constants {
        interpreter
            .globals
            .insert(name.to_string(), Value::Number(*value));
    }
    for native in module.functions {
        interpreter.globals.insert(
            native.name.to_string(),
            Value::Callable(Rc::new(Callable::Native(*native))),
        );
    }
}

/// Runs a `use` request for one module.
pub fn load(interpreter: &mut Interpreter, name: &str) -> Result<(), ExecutionErrorKind> {
    let module = find(name).ok_or_else(|| ExecutionErrorKind::UnknownModule(name.to_string()))?;
    if !interpreter.loaded_modules.insert(name.to_string()) {
        return Err(ExecutionErrorKind::ModuleAlreadyLoaded(name.to_string()));
    }
    inject(interpreter, module);
    Ok(())
}

fn number(function: &'static str, value: &Value) -> Result<f64, ExecutionErrorKind> {
    match value {
        Value::Number(n) => Ok(*n),
        other => Err(ExecutionErrorKind::InvalidArgument {
            function,
            message: format!("expected a number, got {}", other.type_name()),
        }),
    }
}

macro_rules! unary_math {
    ($name:literal, $op:expr) => {
        Native {
            name: $name,
            arity: Arity::Fixed(1),
            function: |_, args| {
                let op: fn(f64) -> f64 = $op;
                Ok(Value::Number(op(number($name, &args[0])?)))
            },
        }
    };
}

macro_rules! binary_math {
    ($name:literal, $op:expr) => {
        Native {
            name: $name,
            arity: Arity::Fixed(2),
            function: |_, args| {
                let op: fn(f64, f64) -> f64 = $op;
                Ok(Value::Number(op(
                    number($name, &args[0])?,
                    number($name, &args[1])?,
                )))
            },
        }
    };
}

static MODULES: &[Module] = &[
    Module {
        name: "internal",
        constants: &[],
        functions: &[Native {
            name: "clear",
            arity: Arity::Fixed(0),
            function: |interpreter, _| {
                let mut stdout = interpreter.stdout.borrow_mut();
                write!(stdout, "\x1b[2J\x1b[H")?;
                stdout.flush()?;
                Ok(Value::Null)
            },
        }],
    },
    Module {
        name: "base",
        constants: &[],
        functions: &[
            Native {
                name: "print",
                arity: Arity::Fixed(1),
                function: |interpreter, args| {
                    writeln!(interpreter.stdout.borrow_mut(), "{}", args[0])?;
                    Ok(Value::Null)
                },
            },
            Native {
                name: "type",
                arity: Arity::Fixed(1),
                function: |_, args| Ok(Value::String(args[0].type_name().to_string())),
            },
            Native {
                name: "now",
                arity: Arity::Fixed(0),
                function: |_, _| {
                    let elapsed = std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap_or_default();
                    Ok(Value::Number(elapsed.as_millis() as f64))
                },
            },
            Native {
                name: "wait",
                arity: Arity::Fixed(1),
                function: |_, args| {
                    let millis = number("wait", &args[0])?;
                    std::thread::sleep(std::time::Duration::from_millis(millis.max(0.0) as u64));
                    Ok(Value::Null)
                },
            },
            Native {
                name: "read_file",
                arity: Arity::Fixed(1),
                function: |_, args| match &args[0] {
                    Value::String(path) => Ok(Value::String(std::fs::read_to_string(path)?)),
                    other => Err(ExecutionErrorKind::InvalidArgument {
                        function: "read_file",
                        message: format!("expected a path string, got {}", other.type_name()),
                    }),
                },
            },
            Native {
                name: "exit",
                arity: Arity::Fixed(0),
                function: |_, _| Err(ExecutionErrorKind::Exit(0)),
            },
            Native {
                name: "abort",
                arity: Arity::Variadic,
                function: |_, args| match args {
                    [] => Err(ExecutionErrorKind::Exit(75)),
                    [code] => Err(ExecutionErrorKind::Exit(number("abort", code)? as i32)),
                    _ => Err(ExecutionErrorKind::InvalidArgument {
                        function: "abort",
                        message: format!("expected at most 1 argument, got {}", args.len()),
                    }),
                },
            },
            Native {
                name: "create_list",
                arity: Arity::Variadic,
                function: |_, args| {
                    let elements = match args {
                        [Value::List(list)] => list.borrow().clone(),
                        _ => args.to_vec(),
                    };
                    Ok(Value::List(Rc::new(RefCell::new(elements))))
                },
            },
            Native {
                name: "create_map",
                arity: Arity::Variadic,
                function: |_, args| {
                    if let [Value::Map(map)] = args {
                        return Ok(Value::Map(Rc::new(RefCell::new(map.borrow().clone()))));
                    }
                    if args.len() % 2 != 0 {
                        return Err(ExecutionErrorKind::InvalidArgument {
                            function: "create_map",
                            message: "expected key/value pairs".to_string(),
                        });
                    }
                    let map: Map = RefCell::new(vec![]);
                    for pair in args.chunks(2) {
                        map_insert(&map, pair[0].clone(), pair[1].clone());
                    }
                    Ok(Value::Map(Rc::new(map)))
                },
            },
        ],
    },
    Module {
        name: "math",
        constants: &[("PI", std::f64::consts::PI), ("E", std::f64::consts::E)],
        functions: &[
            unary_math!("abs", f64::abs),
            binary_math!("min", f64::min),
            binary_math!("max", f64::max),
            unary_math!("round", f64::round),
            unary_math!("floor", f64::floor),
            unary_math!("ceil", f64::ceil),
            unary_math!("sqrt", f64::sqrt),
            binary_math!("pow", f64::powf),
            unary_math!("sin", f64::sin),
            unary_math!("cos", f64::cos),
            unary_math!("tan", f64::tan),
            unary_math!("ln", f64::ln),
            unary_math!("log10", f64::log10),
        ],
    },
    Module {
        name: "io",
        constants: &[],
        functions: &[Native {
            name: "scan",
            arity: Arity::Fixed(0),
            function: |interpreter, _| {
                interpreter.stdout.borrow_mut().flush()?;
                let mut line = String::new();
                if std::io::stdin().lock().read_line(&mut line)? == 0 {
                    return Ok(Value::Null);
                }
                let trimmed = line.trim_end_matches(['\n', '\r']).len();
                line.truncate(trimmed);
                Ok(Value::String(line))
            },
        }],
    },
];

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_every_module_is_registered() {
        for name in MODULE_NAMES {
            assert!(find(name).is_some(), "missing module {name}");
        }
        assert!(find("net").is_none());
    }

    #[test]
    fn test_prelude_is_loaded_once() {
        let mut interpreter = Interpreter::default();
        assert!(interpreter.globals.contains_key("print"));
        assert!(!interpreter.globals.contains_key("sqrt"));

        load(&mut interpreter, "math").unwrap();
        assert!(interpreter.globals.contains_key("sqrt"));
        assert!(interpreter.globals.contains_key("PI"));

        assert!(matches!(
            load(&mut interpreter, "math"),
            Err(ExecutionErrorKind::ModuleAlreadyLoaded(_))
        ));
        assert!(matches!(
            load(&mut interpreter, "base"),
            Err(ExecutionErrorKind::ModuleAlreadyLoaded(_))
        ));
        assert!(matches!(
            load(&mut interpreter, "net"),
            Err(ExecutionErrorKind::UnknownModule(_))
        ));
    }
}
