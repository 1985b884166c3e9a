use rustc_hash::FxHashMap;

use crate::ast::{
    Expression, FunctionDecl, NodeDecl, NodeId, Program, Statement, TraitDecl, Variable,
};

/// Location of a local: how many frames to climb, then which slot to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address {
    pub depth: usize,
    pub slot: usize,
}

/// References with no entry are globals.
pub type Resolutions = FxHashMap<NodeId, Address>;

#[derive(Debug, Clone, Copy)]
struct Binding {
    slot: usize,
    defined: bool,
}

#[derive(Debug, Default)]
struct Scope {
    bindings: FxHashMap<String, Binding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
    Method,
    Definition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeType {
    None,
    Node,
    Subnode,
    Trait,
    Meta,
}

pub struct Resolver {
    scopes: Vec<Scope>,
    function_type: FunctionType,
    node_type: NodeType,
    resolutions: Resolutions,
    errors: Vec<ResolveErrorWithLine>,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("Variable with this name already declared in this scope.")]
    AlreadyDeclared,
    #[error("Cannot read local variable in its own initializer.")]
    OwnInitializer,
    #[error("A node cannot inherit from itself.")]
    SelfInheritance,
    #[error("Cannot use 'self' outside of a node.")]
    SelfOutsideNode,
    #[error("Cannot use 'parent' outside of a node.")]
    ParentOutsideNode,
    #[error("Cannot use 'parent' in a trait.")]
    ParentInTrait,
    #[error("Cannot use 'parent' in a node with no parent.")]
    ParentWithoutParent,
    #[error("Cannot use 'parent' in a meta method.")]
    ParentInMeta,
    #[error("Cannot return from top-level code.")]
    ReturnFromTopLevel,
    #[error("Cannot return a value from a definition.")]
    ReturnFromDefinition,
}

#[derive(Debug, thiserror::Error)]
#[error("[line {line}] {error}")]
pub struct ResolveErrorWithLine {
    pub error: ResolverError,
    pub line: usize,
}

#[derive(Debug)]
pub struct ResolveErrors(pub Vec<ResolveErrorWithLine>);

impl std::error::Error for ResolveErrors {}

impl std::fmt::Display for ResolveErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Found {} errors during resolving", self.0.len())?;
        for error in &self.0 {
            writeln!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    pub fn new() -> Resolver {
        Resolver {
            scopes: vec![],
            function_type: FunctionType::None,
            node_type: NodeType::None,
            resolutions: Resolutions::default(),
            errors: vec![],
        }
    }

    pub fn resolve(mut self, program: &Program) -> Result<Resolutions, ResolveErrors> {
        for statement in &program.0 {
            self.resolve_statement(statement);
        }

        if !self.errors.is_empty() {
            return Err(ResolveErrors(self.errors));
        }

        tracing::debug!(locals = self.resolutions.len(), "resolved program");
        Ok(self.resolutions)
    }

    fn error(&mut self, error: ResolverError, line: usize) {
        self.errors.push(ResolveErrorWithLine { error, line });
    }

    fn resolve_statements(&mut self, statements: &[Statement]) {
        for statement in statements {
            self.resolve_statement(statement);
        }
    }

    fn resolve_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Block(statements) => {
                self.begin_scope();
                self.resolve_statements(statements);
                self.end_scope();
            }
            Statement::Expression(expression) => self.resolve_expression(expression),
            Statement::Auto {
                name,
                initializer,
                line,
            } => {
                self.declare(name, *line);
                if let Some(initializer) = initializer {
                    self.resolve_expression(initializer);
                }
                self.define(name);
            }
            Statement::Function(decl) => {
                let name = decl.name.as_deref().unwrap_or_default();
                self.declare(name, decl.line);
                self.define(name);
                self.resolve_function(decl, FunctionType::Function);
            }
            Statement::Node(decl) => self.resolve_node(decl),
            Statement::Trait(decl) => self.resolve_trait(decl),
            Statement::If(condition, then_branch, else_branch) => {
                self.resolve_expression(condition);
                self.resolve_statement(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_statement(else_branch);
                }
            }
            Statement::Return { value, line } => {
                if self.function_type == FunctionType::None {
                    self.error(ResolverError::ReturnFromTopLevel, *line);
                }
                if let Some(value) = value {
                    if self.function_type == FunctionType::Definition {
                        self.error(ResolverError::ReturnFromDefinition, *line);
                    }
                    self.resolve_expression(value);
                }
            }
            Statement::While(condition, body) => {
                self.resolve_expression(condition);
                self.resolve_statement(body);
            }
            Statement::Break | Statement::Continue | Statement::Use { .. } => {}
        }
    }

    fn resolve_node(&mut self, decl: &NodeDecl) {
        self.declare(&decl.name, decl.line);
        self.define(&decl.name);

        if let Some(parent) = &decl.parent {
            if parent.name == decl.name {
                self.error(ResolverError::SelfInheritance, parent.line);
            }
            self.resolve_variable(parent);
        }
        for applied in &decl.traits {
            self.resolve_variable(applied);
        }

        let enclosing_node = self.node_type;
        self.node_type = if decl.parent.is_some() {
            NodeType::Subnode
        } else {
            NodeType::Node
        };

        if decl.parent.is_some() {
            self.begin_scope();
            self.declare_receiver("parent");
        }
        self.begin_scope();
        self.declare_receiver("self");

        for method in &decl.methods {
            let function_type = if method.name.as_deref() == Some("define") {
                FunctionType::Definition
            } else {
                FunctionType::Method
            };
            self.resolve_function(method, function_type);
        }

        self.node_type = NodeType::Meta;
        for method in &decl.meta_methods {
            self.resolve_function(method, FunctionType::Method);
        }

        self.end_scope();
        if decl.parent.is_some() {
            self.end_scope();
        }
        self.node_type = enclosing_node;
    }

    fn resolve_trait(&mut self, decl: &TraitDecl) {
        self.declare(&decl.name, decl.line);
        self.define(&decl.name);

        for applied in &decl.traits {
            self.resolve_variable(applied);
        }

        let enclosing_node = std::mem::replace(&mut self.node_type, NodeType::Trait);
        self.begin_scope();
        self.declare_receiver("self");

        for method in &decl.methods {
            let function_type = if method.name.as_deref() == Some("define") {
                FunctionType::Definition
            } else {
                FunctionType::Method
            };
            self.resolve_function(method, function_type);
        }

        self.end_scope();
        self.node_type = enclosing_node;
    }

    fn resolve_function(&mut self, decl: &FunctionDecl, function_type: FunctionType) {
        let enclosing_function = std::mem::replace(&mut self.function_type, function_type);
        self.begin_scope();

        for param in decl.params.iter().flatten() {
            self.declare(param, decl.line);
            self.define(param);
        }
        self.resolve_statements(&decl.body);

        self.end_scope();
        self.function_type = enclosing_function;
    }

    fn resolve_expression(&mut self, expression: &Expression) {
        match expression {
            Expression::Literal(_) => {}
            Expression::Grouping(inner) => self.resolve_expression(inner),
            Expression::Variable(variable) => self.resolve_variable(variable),
            Expression::Assign(variable, value) => {
                self.resolve_expression(value);
                self.resolve_local(variable.id, &variable.name);
            }
            Expression::Unary { operand, .. } => self.resolve_expression(operand),
            Expression::Binary { left, right, .. } | Expression::Logical(left, _, right) => {
                self.resolve_expression(left);
                self.resolve_expression(right);
            }
            Expression::Call {
                callee, arguments, ..
            } => {
                self.resolve_expression(callee);
                for argument in arguments {
                    self.resolve_expression(argument);
                }
            }
            Expression::Function(decl) => self.resolve_function(decl, FunctionType::Function),
            Expression::Get { object, .. } => self.resolve_expression(object),
            Expression::Set { object, value, .. } => {
                self.resolve_expression(value);
                self.resolve_expression(object);
            }
            Expression::SelfRef { id, line } => {
                if self.node_type == NodeType::None {
                    self.error(ResolverError::SelfOutsideNode, *line);
                    return;
                }
                self.resolve_local(*id, "self");
            }
            Expression::Parent { id, line, .. } => match self.node_type {
                NodeType::Subnode => self.resolve_local(*id, "parent"),
                NodeType::None => self.error(ResolverError::ParentOutsideNode, *line),
                NodeType::Trait => self.error(ResolverError::ParentInTrait, *line),
                NodeType::Node => self.error(ResolverError::ParentWithoutParent, *line),
                NodeType::Meta => self.error(ResolverError::ParentInMeta, *line),
            },
            Expression::Index { object, index, .. } => {
                self.resolve_expression(object);
                self.resolve_expression(index);
            }
            Expression::IndexSet {
                object,
                index,
                value,
                ..
            } => {
                self.resolve_expression(value);
                self.resolve_expression(object);
                self.resolve_expression(index);
            }
            Expression::Array { size, .. } => self.resolve_expression(size),
        }
    }

    fn resolve_variable(&mut self, variable: &Variable) {
        let declared_only = self
            .scopes
            .last()
            .and_then(|scope| scope.bindings.get(&variable.name))
            .is_some_and(|binding| !binding.defined);
        if declared_only {
            self.error(ResolverError::OwnInitializer, variable.line);
        }
        self.resolve_local(variable.id, &variable.name);
    }

    fn resolve_local(&mut self, id: NodeId, name: &str) {
        let found = self.scopes.iter().rev().enumerate().find_map(|(depth, scope)| {
            scope
                .bindings
                .get(name)
                .map(|binding| Address {
                    depth,
                    slot: binding.slot,
                })
        });
        if let Some(address) = found {
            self.resolutions.insert(id, address);
        }
    }

    fn begin_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str, line: usize) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        if scope.bindings.contains_key(name) {
            self.error(ResolverError::AlreadyDeclared, line);
            return;
        }
        let slot = scope.bindings.len();
        scope.bindings.insert(
            name.to_string(),
            Binding {
                slot,
                defined: false,
            },
        );
    }

    fn define(&mut self, name: &str) {
        if let Some(binding) = self
            .scopes
            .last_mut()
            .and_then(|scope| scope.bindings.get_mut(name))
        {
            binding.defined = true;
        }
    }

    /// `self` and `parent` always occupy slot 0 of their own scope.
    fn declare_receiver(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.bindings.insert(
                name.to_string(),
                Binding {
                    slot: 0,
                    defined: true,
                },
            );
        }
    }
}
