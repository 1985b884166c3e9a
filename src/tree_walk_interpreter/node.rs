use std::{cell::RefCell, rc::Rc};

use rustc_hash::FxHashMap;

use super::{callable::Function, ExecutionErrorKind, Interpreter, Value};

pub type Methods = FxHashMap<String, Function>;

pub struct Node {
    pub name: String,
    pub parent: Option<Rc<Node>>,
    pub methods: Methods,
    /// Methods looked up on the node value itself. The meta-node never has a parent.
    pub meta: Option<Rc<Node>>,
    pub fields: RefCell<FxHashMap<String, Value>>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name.clone()))
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("meta", &self.meta.as_ref().map(|m| m.methods.len()))
            .finish()
    }
}

impl Node {
    pub fn new(name: String, parent: Option<Rc<Node>>, methods: Methods, meta: Methods) -> Self {
        let meta = (!meta.is_empty()).then(|| {
            Rc::new(Node {
                name: format!("{name} meta"),
                parent: None,
                methods: meta,
                meta: None,
                fields: RefCell::default(),
            })
        });
        Self {
            name,
            parent,
            methods,
            meta,
            fields: RefCell::default(),
        }
    }

    pub fn find_method(&self, name: &str) -> Option<&Function> {
        self.methods.get(name).or_else(|| {
            self.parent
                .as_ref()
                .and_then(|parent| parent.find_method(name))
        })
    }

    pub fn find_meta_method(&self, name: &str) -> Option<&Function> {
        self.meta.as_ref().and_then(|meta| meta.find_method(name))
    }

    pub fn arity(&self) -> usize {
        self.find_method("define").map_or(0, Function::arity)
    }

    /// Creates a blank instance and runs the inherited `define` on it, if any.
    pub fn instantiate(
        node: &Rc<Node>,
        interpreter: &mut Interpreter,
        args: Vec<Value>,
    ) -> Result<Value, ExecutionErrorKind> {
        let instance = Value::Instance(Rc::new(RefCell::new(Instance {
            node: node.clone(),
            fields: FxHashMap::default(),
        })));
        if let Some(define) = node.find_method("define") {
            define.bind(instance.clone()).call(interpreter, args)?;
        }
        Ok(instance)
    }
}

pub struct Trait {
    pub name: String,
    pub methods: Methods,
}

impl std::fmt::Debug for Trait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trait")
            .field("name", &self.name)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Merges the methods of every applied trait, then the declared ones. The same
/// name arriving twice is a fault.
pub fn compose(
    traits: &[Rc<Trait>],
    declared: impl IntoIterator<Item = (String, Function)>,
) -> Result<Methods, ExecutionErrorKind> {
    let mut methods = Methods::default();
    for applied in traits {
        for (name, method) in &applied.methods {
            if methods.insert(name.clone(), method.clone()).is_some() {
                return Err(ExecutionErrorKind::MethodCollision(name.clone()));
            }
        }
    }

    let from_traits = methods.len();
    for (name, method) in declared {
        let previous = methods.insert(name.clone(), method);
        // a later declaration of the same name replaces an earlier one
        if previous.is_some() && traits.iter().any(|t| t.methods.contains_key(&name)) {
            return Err(ExecutionErrorKind::MethodCollision(name));
        }
    }
    tracing::trace!(from_traits, total = methods.len(), "composed methods");
    Ok(methods)
}

pub struct Instance {
    pub node: Rc<Node>,
    pub fields: FxHashMap<String, Value>,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("node", &self.node.name)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}
