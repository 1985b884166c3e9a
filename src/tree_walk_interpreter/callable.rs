use std::{cell::RefCell, fmt::Display, rc::Rc};

use crate::ast::FunctionDecl;

use super::{scope::Scope, ExecutionErrorKind, Interpreter, Signal, Value};

pub type NativeFn = fn(&mut Interpreter, &[Value]) -> Result<Value, ExecutionErrorKind>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    Variadic,
}

impl Arity {
    pub fn check(self, received: usize) -> Result<(), ExecutionErrorKind> {
        match self {
            Arity::Fixed(expected) if expected != received => {
                Err(ExecutionErrorKind::ArityMismatch { received, expected })
            }
            _ => Ok(()),
        }
    }
}

#[derive(Clone)]
pub struct Function {
    pub decl: Rc<FunctionDecl>,
    pub closure: Option<Rc<RefCell<Scope>>>,
    /// Set on a node's `define` method; its call always yields the receiver.
    pub is_definition: bool,
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.decl.name)
            .field("closure", &self.closure.as_ref().map(|c| c.as_ptr()))
            .field("is_definition", &self.is_definition)
            .finish()
    }
}

impl Function {
    pub fn new(decl: Rc<FunctionDecl>, closure: Option<Rc<RefCell<Scope>>>) -> Self {
        Self {
            decl,
            closure,
            is_definition: false,
        }
    }

    pub fn method(decl: Rc<FunctionDecl>, closure: Option<Rc<RefCell<Scope>>>) -> Self {
        Self {
            is_definition: decl.name.as_deref() == Some("define"),
            decl,
            closure,
        }
    }

    /// Copies the method with `receiver` bound to `self` in a fresh frame.
    pub fn bind(&self, receiver: Value) -> Self {
        Self {
            decl: self.decl.clone(),
            closure: Some(Scope::with_slots(self.closure.clone(), vec![receiver])),
            is_definition: self.is_definition,
        }
    }

    pub fn arity(&self) -> usize {
        self.decl.arity()
    }

    pub fn call(
        &self,
        interpreter: &mut Interpreter,
        args: Vec<Value>,
    ) -> Result<Value, ExecutionErrorKind> {
        let frame = Scope::with_slots(self.closure.clone(), args);
        let signal = interpreter.execute_block(&self.decl.body, frame)?;

        if self.is_definition {
            let receiver = self.closure.as_ref().and_then(|c| c.borrow().get(0));
            return Ok(receiver.unwrap_or(Value::Null));
        }

        match signal {
            None => Ok(Value::Null),
            Some(Signal::Return(value)) => Ok(value),
            Some(Signal::Break) => unreachable!("break escaped the body of a function"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Native {
    pub name: &'static str,
    pub arity: Arity,
    pub function: NativeFn,
}

#[derive(Debug, Clone)]
pub enum Callable {
    Function(Function),
    Native(Native),
    /// A container attribute: the receiver is passed as the first argument.
    Bound(Value, Native),
}

impl Callable {
    pub fn call(
        &self,
        interpreter: &mut Interpreter,
        args: Vec<Value>,
    ) -> Result<Value, ExecutionErrorKind> {
        match self {
            Callable::Function(function) => function.call(interpreter, args),
            Callable::Native(native) => (native.function)(interpreter, &args),
            Callable::Bound(receiver, native) => {
                let mut all = Vec::with_capacity(args.len() + 1);
                all.push(receiver.clone());
                all.extend(args);
                (native.function)(interpreter, &all)
            }
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Callable::Function(function) => Arity::Fixed(function.arity()),
            Callable::Native(native) | Callable::Bound(_, native) => native.arity,
        }
    }
}

impl Display for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callable::Function(function) => match &function.decl.name {
                Some(name) => write!(f, "<fn {}>", name),
                None => write!(f, "<fn>"),
            },
            Callable::Native(native) | Callable::Bound(_, native) => {
                write!(f, "<native fn {}>", native.name)
            }
        }
    }
}
