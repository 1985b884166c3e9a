mod callable;
mod containers;
mod modules;
mod node;
mod scope;

use std::{
    cell::RefCell,
    fmt::{Debug, Display},
    rc::Rc,
};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    ast::{
        Expression, InfixOperator, Literal, LogicalOperator, NodeDecl, NodeId, Program, Statement,
        TraitDecl, UnaryOperator, Variable,
    },
    resolver::{Address, Resolutions},
};

pub use self::modules::MODULE_NAMES;
use self::{
    callable::{Arity, Callable, Function},
    containers::{Array, List, Map},
    node::{Instance, Node, Trait},
    scope::Scope,
};

#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    String(String),
    Boolean(bool),
    Callable(Rc<Callable>),
    Node(Rc<Node>),
    Trait(Rc<Trait>),
    Instance(Rc<RefCell<Instance>>),
    Array(Rc<Array>),
    List(Rc<List>),
    Map(Rc<Map>),
    Null,
}

impl Value {
    fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0,
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(n) if n.fract() == 0.0 => "int",
            Value::Number(_) => "float",
            Value::String(_) => "string",
            Value::Boolean(_) => "bool",
            Value::Callable(_) => "function",
            Value::Node(_) => "node",
            Value::Trait(_) => "trait",
            Value::Instance(_) => "instance",
            Value::Array(_) => "array",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Null => "null",
        }
    }

    /// Script-level `==`: values for primitives, identity for everything else.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            // NaN is equal to itself
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Callable(a), Value::Callable(b)) => Rc::ptr_eq(a, b),
            (Value::Node(a), Value::Node(b)) => Rc::ptr_eq(a, b),
            (Value::Trait(a), Value::Trait(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Whole numbers print without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let sign = if n < 0.0 { "-" } else { "" };
        format!("{}Infinity", sign)
    } else {
        format!("{}", n)
    }
}

fn write_values(f: &mut std::fmt::Formatter<'_>, values: &[Value]) -> std::fmt::Result {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", value)?;
    }
    Ok(())
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Callable(callable) => write!(f, "{}", callable),
            Value::Node(node) => write!(f, "{}", node.name),
            Value::Trait(applied) => write!(f, "{}", applied.name),
            Value::Instance(instance) => write!(f, "<{} instance>", instance.borrow().node.name),
            Value::Array(array) => {
                write!(f, "[")?;
                write_values(f, &array.elements())?;
                write!(f, "]")
            }
            Value::List(list) => {
                write!(f, "list[")?;
                write_values(f, &list.borrow())?;
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "map[")?;
                for (i, (key, value)) in map.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "]")
            }
            Value::Null => write!(f, "null"),
        }
    }
}

/// Non-local control transfer out of a statement.
#[derive(Debug)]
pub enum Signal {
    Return(Value),
    Break,
}

pub struct Interpreter {
    globals: FxHashMap<String, Value>,
    /// `None` while executing top-level code.
    scope: Option<Rc<RefCell<Scope>>>,
    resolutions: Resolutions,
    loaded_modules: FxHashSet<String>,
    line: usize,
    stdout: Rc<RefCell<dyn std::io::Write>>,
}

impl Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("scope", &self.scope)
            .field("globals", &self.globals.keys().collect::<Vec<_>>())
            .field("loaded_modules", &self.loaded_modules)
            .field("line", &self.line)
            .finish()
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Rc::new(RefCell::new(std::io::stdout())))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("[line {line}] {kind}")]
    Runtime { kind: ExecutionErrorKind, line: usize },
    #[error("Script exited with code {0}")]
    Exit(i32),
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionErrorKind {
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("Invalid operands for '{operator}': {left} and {right}.")]
    InvalidOperands {
        operator: InfixOperator,
        left: &'static str,
        right: &'static str,
    },
    #[error("Invalid operand for '{operator}': {operand}.")]
    InvalidOperand {
        operator: UnaryOperator,
        operand: &'static str,
    },
    #[error("Undefined variable '{0}'.")]
    UndefinedVariable(String),
    #[error("Can only call functions and nodes, got {0}.")]
    NotCallable(&'static str),
    #[error("Function received {received} arguments, but expects {expected}.")]
    ArityMismatch { received: usize, expected: usize },
    #[error("Undefined property '{0}'.")]
    UndefinedProperty(String),
    #[error("Only instances and nodes have properties, got {0}.")]
    GetOnNonObject(&'static str),
    #[error("Only instances and nodes have fields, got {0}.")]
    SetOnNonObject(&'static str),
    #[error("Parent '{0}' is not a node.")]
    NotANode(String),
    #[error("'{0}' is not a trait.")]
    NotATrait(String),
    #[error("Method '{0}' already defined.")]
    MethodCollision(String),
    #[error("Array size must be a non-negative integer, got {0}.")]
    InvalidArraySize(String),
    #[error("Cannot allocate an array of size {0}.")]
    ArrayTooLarge(String),
    #[error("Only arrays can be indexed, got {0}.")]
    NotIndexable(&'static str),
    #[error("Index must be an integer, got {0}.")]
    InvalidIndex(String),
    #[error("Index {index} out of bounds for length {length}.")]
    IndexOutOfBounds { index: String, length: usize },
    #[error("Unknown module '{0}'.")]
    UnknownModule(String),
    #[error("Module '{0}' already loaded.")]
    ModuleAlreadyLoaded(String),
    #[error("{function}: {message}")]
    InvalidArgument {
        function: &'static str,
        message: String,
    },
    #[error("Exit requested with code {0}")]
    Exit(i32),
}

impl Interpreter {
    pub fn new(stdout: Rc<RefCell<dyn std::io::Write>>) -> Self {
        let mut interpreter = Self {
            globals: FxHashMap::default(),
            scope: None,
            resolutions: Resolutions::default(),
            loaded_modules: FxHashSet::default(),
            line: 0,
            stdout,
        };

        for name in modules::PRELUDE {
            if let Some(module) = modules::find(name) {
                modules::inject(&mut interpreter, module);
                interpreter.loaded_modules.insert(name.to_string());
            }
        }

        interpreter
    }

    /// Runs a resolved program. Globals, loaded modules and addresses carry over
    /// between calls.
    pub fn interpret(
        &mut self,
        program: &Program,
        resolutions: Resolutions,
    ) -> Result<(), ExecutionError> {
        self.resolutions.extend(resolutions);

        for statement in program.0.iter() {
            match self.execute(statement) {
                Ok(None) => {}
                Ok(Some(signal)) => unreachable!("{signal:?} escaped to top level"),
                Err(ExecutionErrorKind::Exit(code)) => return Err(ExecutionError::Exit(code)),
                Err(kind) => {
                    return Err(ExecutionError::Runtime {
                        kind,
                        line: self.line,
                    })
                }
            }
        }

        Ok(())
    }

    fn execute(&mut self, statement: &Statement) -> Result<Option<Signal>, ExecutionErrorKind> {
        #[cfg(feature = "trace")]
        tracing::trace!(line = self.line, %statement, "execute");

        let signal = match statement {
            Statement::Expression(expression) => {
                self.evaluate(expression)?;
                None
            }
            Statement::Auto {
                name,
                initializer,
                line,
            } => {
                let value = match initializer {
                    Some(initializer) => self.evaluate(initializer)?,
                    None => Value::Null,
                };
                self.line = *line;
                self.define(name, value);
                None
            }
            Statement::Block(statements) => {
                self.execute_block(statements, Scope::boxed(self.scope.clone()))?
            }
            Statement::If(condition, then_branch, else_branch) => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)?
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)?
                } else {
                    None
                }
            }
            Statement::While(condition, body) => self.execute_while(condition, body)?,
            Statement::Function(decl) => {
                let function = Function::new(decl.clone(), self.scope.clone());
                let name = decl.name.as_deref().unwrap_or_default();
                self.define(name, Value::Callable(Rc::new(Callable::Function(function))));
                None
            }
            Statement::Node(decl) => {
                self.declare_node(decl)?;
                None
            }
            Statement::Trait(decl) => {
                self.declare_trait(decl)?;
                None
            }
            Statement::Return { value, .. } => {
                let value = match value {
                    Some(value) => self.evaluate(value)?,
                    None => Value::Null,
                };
                Some(Signal::Return(value))
            }
            Statement::Break => Some(Signal::Break),
            Statement::Continue => None,
            Statement::Use {
                modules: names,
                line,
            } => {
                self.line = *line;
                for name in names {
                    modules::load(self, name)?;
                }
                None
            }
        };

        Ok(signal)
    }

    fn execute_in_scope<T>(
        &mut self,
        scope: Rc<RefCell<Scope>>,
        f: impl FnOnce(&mut Self) -> Result<T, ExecutionErrorKind>,
    ) -> Result<T, ExecutionErrorKind> {
        let prev = std::mem::replace(&mut self.scope, Some(scope));
        let result = f(self);
        self.scope = prev;
        result
    }

    fn execute_block(
        &mut self,
        statements: &[Statement],
        scope: Rc<RefCell<Scope>>,
    ) -> Result<Option<Signal>, ExecutionErrorKind> {
        self.execute_in_scope(scope, |interpreter| {
            for statement in statements {
                if let Some(signal) = interpreter.execute(statement)? {
                    return Ok(Some(signal));
                }
            }
            Ok(None)
        })
    }

    /// A block body runs in one frame for the whole loop, rewound each iteration.
    fn execute_while(
        &mut self,
        condition: &Expression,
        body: &Statement,
    ) -> Result<Option<Signal>, ExecutionErrorKind> {
        let frame = match body {
            Statement::Block(_) => Some(Scope::boxed(self.scope.clone())),
            _ => None,
        };

        while self.evaluate(condition)?.is_truthy() {
            let signal = match (body, &frame) {
                (Statement::Block(statements), Some(frame)) => {
                    frame.borrow_mut().rewind();
                    self.execute_block(statements, frame.clone())?
                }
                _ => self.execute(body)?,
            };

            match signal {
                Some(Signal::Break) => break,
                Some(signal) => return Ok(Some(signal)),
                None => {}
            }
        }

        Ok(None)
    }

    /// Returns the slot used, or `None` for a global.
    fn define(&mut self, name: &str, value: Value) -> Option<usize> {
        match &self.scope {
            Some(scope) => Some(scope.borrow_mut().define(value)),
            None => {
                self.globals.insert(name.to_string(), value);
                None
            }
        }
    }

    fn define_reserved(&mut self, name: &str, slot: Option<usize>, value: Value) {
        match (&self.scope, slot) {
            (Some(scope), Some(slot)) => {
                scope.borrow_mut().assign(slot, value);
            }
            _ => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    fn applied_traits(&mut self, traits: &[Variable]) -> Result<Vec<Rc<Trait>>, ExecutionErrorKind> {
        let mut applied = Vec::with_capacity(traits.len());
        for variable in traits {
            match self.look_up_variable(variable)? {
                Value::Trait(found) => applied.push(found),
                _ => return Err(ExecutionErrorKind::NotATrait(variable.name.clone())),
            }
        }
        Ok(applied)
    }

    fn declare_node(&mut self, decl: &NodeDecl) -> Result<(), ExecutionErrorKind> {
        self.line = decl.line;
        // methods may refer to the node by name
        let slot = self.define(&decl.name, Value::Null);

        let parent = match &decl.parent {
            Some(parent) => match self.look_up_variable(parent)? {
                Value::Node(node) => Some(node),
                _ => return Err(ExecutionErrorKind::NotANode(parent.name.clone())),
            },
            None => None,
        };
        let traits = self.applied_traits(&decl.traits)?;
        self.line = decl.line;

        let closure = match &parent {
            Some(parent) => Some(Scope::with_slots(
                self.scope.clone(),
                vec![Value::Node(parent.clone())],
            )),
            None => self.scope.clone(),
        };

        let methods = node::compose(
            &traits,
            decl.methods.iter().map(|method| {
                (
                    method.name.clone().unwrap_or_default(),
                    Function::method(method.clone(), closure.clone()),
                )
            }),
        )?;
        // applied traits contribute to the meta set too
        let meta = node::compose(
            &traits,
            decl.meta_methods.iter().map(|method| {
                (
                    method.name.clone().unwrap_or_default(),
                    Function::new(method.clone(), closure.clone()),
                )
            }),
        )?;

        let node = Node::new(decl.name.clone(), parent, methods, meta);
        self.define_reserved(&decl.name, slot, Value::Node(Rc::new(node)));
        Ok(())
    }

    fn declare_trait(&mut self, decl: &TraitDecl) -> Result<(), ExecutionErrorKind> {
        self.line = decl.line;
        let slot = self.define(&decl.name, Value::Null);

        let traits = self.applied_traits(&decl.traits)?;
        self.line = decl.line;

        let closure = self.scope.clone();
        let methods = node::compose(
            &traits,
            decl.methods.iter().map(|method| {
                (
                    method.name.clone().unwrap_or_default(),
                    Function::method(method.clone(), closure.clone()),
                )
            }),
        )?;

        let applied = Trait {
            name: decl.name.clone(),
            methods,
        };
        self.define_reserved(&decl.name, slot, Value::Trait(Rc::new(applied)));
        Ok(())
    }

    fn evaluate(&mut self, expression: &Expression) -> Result<Value, ExecutionErrorKind> {
        match expression {
            Expression::Literal(literal) => Ok(match literal {
                Literal::Number(n) => Value::Number(*n),
                Literal::String(s) => Value::String(s.clone()),
                Literal::Boolean(b) => Value::Boolean(*b),
                Literal::Null => Value::Null,
            }),
            Expression::Grouping(inner) => self.evaluate(inner),
            Expression::Variable(variable) => self.look_up_variable(variable),
            Expression::Assign(variable, value) => {
                let value = self.evaluate(value)?;
                self.line = variable.line;
                self.assign_variable(variable, value.clone())?;
                Ok(value)
            }
            Expression::Unary {
                operator,
                operand,
                line,
            } => self.unary(*operator, operand, *line),
            Expression::Binary {
                left,
                operator,
                right,
                line,
            } => {
                let a = self.evaluate(left)?;
                let b = self.evaluate(right)?;
                self.line = *line;
                match operator.arithmetic() {
                    Some(arithmetic) => {
                        let value = binary(arithmetic, a, b)?;
                        self.store_compound(left, value.clone());
                        Ok(value)
                    }
                    None => binary(*operator, a, b),
                }
            }
            Expression::Logical(left, operator, right) => {
                let left = self.evaluate(left)?;
                match operator {
                    LogicalOperator::Or if left.is_truthy() => Ok(left),
                    LogicalOperator::And if !left.is_truthy() => Ok(left),
                    _ => self.evaluate(right),
                }
            }
            Expression::Call {
                callee,
                arguments,
                line,
            } => {
                let callee = self.evaluate(callee)?;
                let args = arguments
                    .iter()
                    .map(|argument| self.evaluate(argument))
                    .collect::<Result<Vec<_>, _>>()?;
                self.line = *line;
                self.call(callee, args)
            }
            Expression::Function(decl) => Ok(Value::Callable(Rc::new(Callable::Function(
                Function::new(decl.clone(), self.scope.clone()),
            )))),
            Expression::Get { object, name, line } => {
                let object = self.evaluate(object)?;
                self.line = *line;
                self.get_attribute(object, name)
            }
            Expression::Set {
                object,
                name,
                value,
                line,
            } => {
                let object = self.evaluate(object)?;
                let value = self.evaluate(value)?;
                self.line = *line;
                match object {
                    Value::Instance(instance) => {
                        instance
                            .borrow_mut()
                            .fields
                            .insert(name.clone(), value.clone());
                    }
                    Value::Node(node) => {
                        node.fields.borrow_mut().insert(name.clone(), value.clone());
                    }
                    other => return Err(ExecutionErrorKind::SetOnNonObject(other.type_name())),
                }
                Ok(value)
            }
            Expression::SelfRef { id, line } => {
                self.line = *line;
                self.look_up(*id, "self")
            }
            Expression::Parent { id, method, line } => {
                self.line = *line;
                self.parent_method(*id, method)
            }
            Expression::Index {
                object,
                index,
                line,
            } => {
                let object = self.evaluate(object)?;
                let index = self.evaluate(index)?;
                self.line = *line;
                match object {
                    Value::Array(array) => array.get(&index),
                    other => Err(ExecutionErrorKind::NotIndexable(other.type_name())),
                }
            }
            Expression::IndexSet {
                object,
                index,
                value,
                line,
            } => {
                let object = self.evaluate(object)?;
                let index = self.evaluate(index)?;
                let value = self.evaluate(value)?;
                self.line = *line;
                match object {
                    Value::Array(array) => {
                        array.set(&index, value.clone())?;
                        Ok(value)
                    }
                    other => Err(ExecutionErrorKind::NotIndexable(other.type_name())),
                }
            }
            Expression::Array { size, line } => {
                let size = self.evaluate(size)?;
                self.line = *line;
                match size {
                    Value::Number(n) if n > isize::MAX as f64 => {
                        Err(ExecutionErrorKind::ArrayTooLarge(format_number(n)))
                    }
                    Value::Number(n) if n >= 0.0 && n.fract() == 0.0 => {
                        Ok(Value::Array(Rc::new(Array::new(n as usize)?)))
                    }
                    other => Err(ExecutionErrorKind::InvalidArraySize(other.to_string())),
                }
            }
        }
    }

    fn unary(
        &mut self,
        operator: UnaryOperator,
        operand: &Expression,
        line: usize,
    ) -> Result<Value, ExecutionErrorKind> {
        let value = self.evaluate(operand)?;
        self.line = line;
        match (operator, value) {
            (UnaryOperator::Not, value) => Ok(Value::Boolean(!value.is_truthy())),
            (UnaryOperator::Negate, Value::Number(n)) => Ok(Value::Number(-n)),
            (UnaryOperator::Increment, Value::Number(n)) => {
                let value = Value::Number(n + 1.0);
                self.store_compound(operand, value.clone());
                Ok(value)
            }
            (UnaryOperator::Decrement, Value::Number(n)) => {
                let value = Value::Number(n - 1.0);
                self.store_compound(operand, value.clone());
                Ok(value)
            }
            (operator, value) => Err(ExecutionErrorKind::InvalidOperand {
                operator,
                operand: value.type_name(),
            }),
        }
    }

    /// Compound assignment and `++`/`--` only write through a resolved local.
    fn store_compound(&mut self, target: &Expression, value: Value) {
        if let Expression::Variable(variable) = target {
            if let (Some(address), Some(scope)) = (self.resolutions.get(&variable.id), &self.scope) {
                if Scope::assign_at(scope, *address, value).is_some() {
                    return;
                }
            }
        }
        tracing::warn!(
            line = self.line,
            %target,
            "compound assignment result discarded, target is not a local variable"
        );
    }

    fn call(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, ExecutionErrorKind> {
        match callee {
            Value::Callable(callable) => {
                callable.arity().check(args.len())?;
                callable.call(self, args)
            }
            Value::Node(node) => {
                Arity::Fixed(node.arity()).check(args.len())?;
                Node::instantiate(&node, self, args)
            }
            other => Err(ExecutionErrorKind::NotCallable(other.type_name())),
        }
    }

    fn get_attribute(&mut self, object: Value, name: &str) -> Result<Value, ExecutionErrorKind> {
        let method = match &object {
            Value::Instance(instance) => {
                let instance = instance.borrow();
                if let Some(value) = instance.fields.get(name) {
                    return Ok(value.clone());
                }
                instance.node.find_method(name).cloned()
            }
            Value::Node(node) => {
                if let Some(value) = node.fields.borrow().get(name) {
                    return Ok(value.clone());
                }
                node.find_meta_method(name).cloned()
            }
            Value::Array(array) if name == "length" => {
                return Ok(Value::Number(array.len() as f64));
            }
            Value::Array(_) => None,
            Value::List(_) | Value::Map(_) => {
                let native = match &object {
                    Value::List(_) => containers::list_method(name),
                    _ => containers::map_method(name),
                };
                return native
                    .map(|native| Value::Callable(Rc::new(Callable::Bound(object.clone(), native))))
                    .ok_or_else(|| ExecutionErrorKind::UndefinedProperty(name.to_string()));
            }
            other => return Err(ExecutionErrorKind::GetOnNonObject(other.type_name())),
        };

        match method {
            Some(method) => self.bind_method(&method, object),
            None => Err(ExecutionErrorKind::UndefinedProperty(name.to_string())),
        }
    }

    /// Getters run immediately; other methods come back as bound callables.
    fn bind_method(&mut self, method: &Function, receiver: Value) -> Result<Value, ExecutionErrorKind> {
        let bound = method.bind(receiver);
        if bound.decl.is_getter() {
            bound.call(self, vec![])
        } else {
            Ok(Value::Callable(Rc::new(Callable::Function(bound))))
        }
    }

    /// The parent node sits in the frame just outside the one holding `self`.
    fn parent_method(&self, id: NodeId, method: &str) -> Result<Value, ExecutionErrorKind> {
        let undefined = || ExecutionErrorKind::UndefinedVariable("parent".to_string());
        let address = self.resolutions.get(&id).copied().ok_or_else(undefined)?;
        let scope = self.scope.clone().ok_or_else(undefined)?;

        let parent = Scope::get_at(&scope, address);
        let receiver = Scope::get_at(
            &scope,
            Address {
                depth: address.depth.saturating_sub(1),
                slot: 0,
            },
        );

        match (parent, receiver) {
            (Some(Value::Node(parent)), Some(receiver)) => {
                let found = parent
                    .find_method(method)
                    .cloned()
                    .ok_or_else(|| ExecutionErrorKind::UndefinedProperty(method.to_string()))?;
                // getters are not run here, `parent.getter()` calls them
                Ok(Value::Callable(Rc::new(Callable::Function(
                    found.bind(receiver),
                ))))
            }
            _ => Err(undefined()),
        }
    }

    fn look_up(&self, id: NodeId, name: &str) -> Result<Value, ExecutionErrorKind> {
        let value = match self.resolutions.get(&id) {
            Some(address) => self
                .scope
                .as_ref()
                .and_then(|scope| Scope::get_at(scope, *address)),
            None => self.globals.get(name).cloned(),
        };
        value.ok_or_else(|| ExecutionErrorKind::UndefinedVariable(name.to_string()))
    }

    fn look_up_variable(&mut self, variable: &Variable) -> Result<Value, ExecutionErrorKind> {
        self.line = variable.line;
        self.look_up(variable.id, &variable.name)
    }

    fn assign_variable(&mut self, variable: &Variable, value: Value) -> Result<(), ExecutionErrorKind> {
        let assigned = match self.resolutions.get(&variable.id) {
            Some(address) => self
                .scope
                .as_ref()
                .and_then(|scope| Scope::assign_at(scope, *address, value)),
            None => self
                .globals
                .get_mut(&variable.name)
                .map(|global| *global = value),
        };
        assigned.ok_or_else(|| ExecutionErrorKind::UndefinedVariable(variable.name.clone()))
    }
}

fn binary(operator: InfixOperator, a: Value, b: Value) -> Result<Value, ExecutionErrorKind> {
    match (operator, a, b) {
        (InfixOperator::Equal, a, b) => Ok(Value::Boolean(a.equals(&b))),
        (InfixOperator::NotEqual, a, b) => Ok(Value::Boolean(!a.equals(&b))),
        (InfixOperator::Plus, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        (InfixOperator::Plus, Value::String(a), b) => Ok(Value::String(format!("{}{}", a, b))),
        (InfixOperator::Plus, a, Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
        (InfixOperator::Minus, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a - b)),
        (InfixOperator::Multiply, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a * b)),
        (InfixOperator::Divide, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a / b)),
        (InfixOperator::LessThan, Value::Number(a), Value::Number(b)) => Ok(Value::Boolean(a < b)),
        (InfixOperator::LessThanOrEqual, Value::Number(a), Value::Number(b)) => {
            Ok(Value::Boolean(a <= b))
        }
        (InfixOperator::GreaterThan, Value::Number(a), Value::Number(b)) => {
            Ok(Value::Boolean(a > b))
        }
        (InfixOperator::GreaterThanOrEqual, Value::Number(a), Value::Number(b)) => {
            Ok(Value::Boolean(a >= b))
        }
        (operator, a, b) => Err(ExecutionErrorKind::InvalidOperands {
            operator,
            left: a.type_name(),
            right: b.type_name(),
        }),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(Value::Number(0.5).is_truthy());
        assert!(Value::String(String::new()).is_truthy());
        assert!(Value::Array(Rc::new(Array::new(0).unwrap())).is_truthy());
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Number(3.0).type_name(), "int");
        assert_eq!(Value::Number(-3.5).type_name(), "float");
        assert_eq!(Value::Number(f64::NAN).type_name(), "float");
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::String("x".to_string()).type_name(), "string");
    }

    #[test]
    fn test_stringify() {
        assert_eq!(Value::Number(6.0).to_string(), "6");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::Number(-0.25).to_string(), "-0.25");
        assert_eq!(Value::Number(1.0 / 0.0).to_string(), "Infinity");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        let list = Value::List(Rc::new(RefCell::new(vec![
            Value::Number(1.0),
            Value::String("a".to_string()),
        ])));
        assert_eq!(list.to_string(), "list[1, a]");
        let array = Array::new(2).unwrap();
        array.set(&Value::Number(0.0), Value::Number(4.0)).unwrap();
        assert_eq!(Value::Array(Rc::new(array)).to_string(), "[4, null]");
    }

    #[test]
    fn test_equality() {
        assert!(Value::Null.equals(&Value::Null));
        assert!(Value::Number(f64::NAN).equals(&Value::Number(f64::NAN)));
        assert!(!Value::Number(1.0).equals(&Value::String("1".to_string())));
        assert!(!Value::Null.equals(&Value::Boolean(false)));

        let list = Rc::new(RefCell::new(vec![]));
        let same = Value::List(list.clone());
        assert!(Value::List(list).equals(&same));
        assert!(!same.equals(&Value::List(Rc::new(RefCell::new(vec![])))));
    }

    #[test]
    fn test_binary_operand_errors() {
        let error = binary(InfixOperator::Minus, Value::String("a".to_string()), Value::Null)
            .unwrap_err();
        assert_eq!(error.to_string(), "Invalid operands for '-': string and null.");

        assert!(matches!(
            binary(InfixOperator::Plus, Value::Number(1.0), Value::String("a".to_string())),
            Ok(Value::String(s)) if s == "1a"
        ));
    }
}
