use std::{
    fmt::Display,
    rc::Rc,
    sync::atomic::{AtomicU32, Ordering},
};

/// Identity of a resolvable expression. Two syntactically identical references at
/// different positions get different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

static NEXT_NODE_ID: AtomicU32 = AtomicU32::new(0);

impl NodeId {
    pub fn fresh() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug)]
pub struct Program(pub Vec<Statement>);

#[derive(Debug, Clone)]
pub enum Statement {
    Block(Vec<Statement>),
    Expression(Expression),
    Node(Rc<NodeDecl>),
    Trait(Rc<TraitDecl>),
    Function(Rc<FunctionDecl>),
    Auto {
        name: String,
        initializer: Option<Expression>,
        line: usize,
    },
    If(Expression, Box<Statement>, Option<Box<Statement>>),
    Return {
        value: Option<Expression>,
        line: usize,
    },
    While(Expression, Box<Statement>),
    Break,
    Continue,
    Use {
        modules: Vec<String>,
        line: usize,
    },
}

#[derive(Debug)]
pub struct FunctionDecl {
    pub name: Option<String>,
    /// `None` marks a getter: a method written without a parameter list.
    pub params: Option<Vec<String>>,
    pub body: Vec<Statement>,
    pub line: usize,
}

impl FunctionDecl {
    pub fn arity(&self) -> usize {
        self.params.as_ref().map_or(0, Vec::len)
    }

    pub fn is_getter(&self) -> bool {
        self.params.is_none()
    }
}

#[derive(Debug)]
pub struct NodeDecl {
    pub name: String,
    pub parent: Option<Variable>,
    pub traits: Vec<Variable>,
    pub methods: Vec<Rc<FunctionDecl>>,
    pub meta_methods: Vec<Rc<FunctionDecl>>,
    pub line: usize,
}

#[derive(Debug)]
pub struct TraitDecl {
    pub name: String,
    pub traits: Vec<Variable>,
    pub methods: Vec<Rc<FunctionDecl>>,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub id: NodeId,
    pub name: String,
    pub line: usize,
}

impl Variable {
    pub fn new(name: String, line: usize) -> Self {
        Self {
            id: NodeId::fresh(),
            name,
            line,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expression {
    Literal(Literal),
    Grouping(Box<Expression>),
    Variable(Variable),
    Assign(Variable, Box<Expression>),
    Unary {
        operator: UnaryOperator,
        operand: Box<Expression>,
        line: usize,
    },
    Binary {
        left: Box<Expression>,
        operator: InfixOperator,
        right: Box<Expression>,
        line: usize,
    },
    Logical(Box<Expression>, LogicalOperator, Box<Expression>),
    Call {
        callee: Box<Expression>,
        arguments: Vec<Expression>,
        line: usize,
    },
    Function(Rc<FunctionDecl>),
    Get {
        object: Box<Expression>,
        name: String,
        line: usize,
    },
    Set {
        object: Box<Expression>,
        name: String,
        value: Box<Expression>,
        line: usize,
    },
    SelfRef {
        id: NodeId,
        line: usize,
    },
    Parent {
        id: NodeId,
        method: String,
        line: usize,
    },
    Index {
        object: Box<Expression>,
        index: Box<Expression>,
        line: usize,
    },
    IndexSet {
        object: Box<Expression>,
        index: Box<Expression>,
        value: Box<Expression>,
        line: usize,
    },
    Array {
        size: Box<Expression>,
        line: usize,
    },
}

#[derive(Debug, Clone)]
pub enum Literal {
    Number(f64),
    String(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, Copy)]
pub enum UnaryOperator {
    Negate,
    Not,
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy)]
pub enum InfixOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Plus,
    Minus,
    Multiply,
    Divide,
    PlusAssign,
    MinusAssign,
    MultiplyAssign,
    DivideAssign,
}

impl InfixOperator {
    /// The plain arithmetic operator behind a compound assignment.
    pub fn arithmetic(self) -> Option<InfixOperator> {
        match self {
            InfixOperator::PlusAssign => Some(InfixOperator::Plus),
            InfixOperator::MinusAssign => Some(InfixOperator::Minus),
            InfixOperator::MultiplyAssign => Some(InfixOperator::Multiply),
            InfixOperator::DivideAssign => Some(InfixOperator::Divide),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum LogicalOperator {
    And,
    Or,
}

impl Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for statement in &self.0 {
            writeln!(f, "{}", statement)?;
        }
        Ok(())
    }
}

fn write_list<T: Display>(f: &mut std::fmt::Formatter<'_>, items: &[T]) -> std::fmt::Result {
    for (i, item) in items.iter().enumerate() {
        write!(f, "{item}")?;
        if i != items.len() - 1 {
            write!(f, ", ")?;
        }
    }
    Ok(())
}

impl Display for FunctionDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{name}")?;
        }
        if let Some(params) = &self.params {
            write!(f, "(")?;
            write_list(f, params)?;
            write!(f, ")")?;
        }
        writeln!(f, " {{")?;
        for statement in &self.body {
            writeln!(f, "{}", statement)?;
        }
        write!(f, "}}")
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Statement::Expression(expr) => write!(f, "{};", expr),
            Statement::Auto {
                name, initializer, ..
            } => match initializer {
                Some(expr) => write!(f, "auto {} = {};", name, expr),
                None => write!(f, "auto {};", name),
            },
            Statement::Block(statements) => {
                writeln!(f, "{{")?;
                for statement in statements {
                    writeln!(f, "{}", statement)?;
                }
                write!(f, "}}")
            }
            Statement::If(condition, then_branch, else_branch) => {
                write!(f, "if ({}) ", condition)?;
                write!(f, "{}", then_branch)?;
                if let Some(else_branch) = else_branch {
                    write!(f, " else {}", else_branch)?;
                }
                Ok(())
            }
            Statement::While(condition, body) => {
                write!(f, "while ({}) ", condition)?;
                write!(f, "{}", body)
            }
            Statement::Function(decl) => write!(f, "function {decl}"),
            Statement::Node(decl) => {
                write!(f, "node {}", decl.name)?;
                if let Some(parent) = &decl.parent {
                    write!(f, " : {}", parent.name)?;
                }
                if !decl.traits.is_empty() {
                    write!(f, " with ")?;
                    let names: Vec<_> = decl.traits.iter().map(|t| t.name.as_str()).collect();
                    write_list(f, &names)?;
                }
                writeln!(f, " {{")?;
                for method in &decl.methods {
                    writeln!(f, "{method}")?;
                }
                for method in &decl.meta_methods {
                    writeln!(f, "node {method}")?;
                }
                write!(f, "}}")
            }
            Statement::Trait(decl) => {
                write!(f, "trait {}", decl.name)?;
                if !decl.traits.is_empty() {
                    write!(f, " with ")?;
                    let names: Vec<_> = decl.traits.iter().map(|t| t.name.as_str()).collect();
                    write_list(f, &names)?;
                }
                writeln!(f, " {{")?;
                for method in &decl.methods {
                    writeln!(f, "{method}")?;
                }
                write!(f, "}}")
            }
            Statement::Return { value, .. } => {
                if let Some(expr) = value {
                    write!(f, "return {};", expr)
                } else {
                    write!(f, "return;")
                }
            }
            Statement::Break => write!(f, "break;"),
            Statement::Continue => write!(f, "continue;"),
            Statement::Use { modules, .. } => {
                write!(f, "use ")?;
                write_list(f, modules)?;
                write!(f, ";")
            }
        }
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Variable(variable) => write!(f, "{}", variable.name),
            Expression::Literal(literal) => write!(f, "{}", literal),
            Expression::Grouping(expr) => write!(f, "({})", expr),
            Expression::Binary {
                left,
                operator,
                right,
                ..
            } => write!(f, "({} {} {})", operator, left, right),
            Expression::Logical(left, operator, right) => {
                write!(f, "({} {} {})", operator, left, right)
            }
            Expression::Unary {
                operator, operand, ..
            } => write!(f, "({} {})", operator, operand),
            Expression::Assign(target, value) => write!(f, "{} = {}", target.name, value),
            Expression::Call {
                callee, arguments, ..
            } => {
                write!(f, "{}(", callee)?;
                write_list(f, arguments)?;
                write!(f, ")")
            }
            Expression::Function(decl) => write!(f, "function {decl}"),
            Expression::Get { object, name, .. } => write!(f, "{object}.{name}"),
            Expression::Set {
                object,
                name,
                value,
                ..
            } => write!(f, "{object}.{name} = {value}"),
            Expression::SelfRef { .. } => write!(f, "self"),
            Expression::Parent { method, .. } => write!(f, "parent.{method}"),
            Expression::Index { object, index, .. } => write!(f, "{object}[{index}]"),
            Expression::IndexSet {
                object,
                index,
                value,
                ..
            } => write!(f, "{object}[{index}] = {value}"),
            Expression::Array { size, .. } => write!(f, "array[{size}]"),
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Number(n) => write!(f, "{}", n),
            Literal::String(s) => write!(f, "\"{}\"", s),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Null => write!(f, "null"),
        }
    }
}

impl Display for InfixOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InfixOperator::Equal => write!(f, "=="),
            InfixOperator::NotEqual => write!(f, "!="),
            InfixOperator::LessThan => write!(f, "<"),
            InfixOperator::LessThanOrEqual => write!(f, "<="),
            InfixOperator::GreaterThan => write!(f, ">"),
            InfixOperator::GreaterThanOrEqual => write!(f, ">="),
            InfixOperator::Plus => write!(f, "+"),
            InfixOperator::Minus => write!(f, "-"),
            InfixOperator::Multiply => write!(f, "*"),
            InfixOperator::Divide => write!(f, "/"),
            InfixOperator::PlusAssign => write!(f, "+="),
            InfixOperator::MinusAssign => write!(f, "-="),
            InfixOperator::MultiplyAssign => write!(f, "*="),
            InfixOperator::DivideAssign => write!(f, "/="),
        }
    }
}

impl Display for LogicalOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogicalOperator::And => write!(f, "and"),
            LogicalOperator::Or => write!(f, "or"),
        }
    }
}

impl Display for UnaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOperator::Negate => write!(f, "-"),
            UnaryOperator::Not => write!(f, "!"),
            UnaryOperator::Increment => write!(f, "++"),
            UnaryOperator::Decrement => write!(f, "--"),
        }
    }
}
