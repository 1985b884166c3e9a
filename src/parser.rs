use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use crate::{
    ast::{
        Expression, FunctionDecl, InfixOperator, Literal, LogicalOperator, NodeDecl, NodeId,
        Program, Statement, TraitDecl, UnaryOperator, Variable,
    },
    tokenizer::{Token, TokenType},
};

const MAX_ARGUMENTS: usize = 255;

#[derive(Debug)]
pub struct ParseErrors(pub Vec<ParseErrorWithContext>);

impl std::error::Error for ParseErrors {}

impl std::fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Found {} errors during parsing", self.0.len())?;
        for error in &self.0 {
            writeln!(f, "{}", error)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct ParseErrorWithContext {
    pub error: ParseError,
    context: Vec<&'static str>,
    pub token: Option<Token>,
    /// Number of tokens left when the error was raised; locates the error inside
    /// any enclosing slice for recovery.
    remaining: usize,
}

impl std::fmt::Display for ParseErrorWithContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "While parsing {}", self.context.join(" > "))?;
        write!(f, "{}", self.error)?;
        if let Some(token) = &self.token {
            write!(
                f,
                " at line {} but found \"{}\"",
                token.line, token.token_type
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Expected \"{0}\"")]
    Expected(TokenType),
    #[error("Expected one of {0:?}")]
    ExpectedOneOf(Vec<TokenType>),
    #[error("Expected identifier")]
    ExpectedIdentifier,
    #[error("Expected expression")]
    ExpectedExpression,
    #[error("Invalid assignment target")]
    InvalidAssignmentTarget,
    #[error("Can not break outside of a loop")]
    BreakOutsideLoop,
    #[error("Can not continue to next iteration outside of a loop")]
    ContinueOutsideLoop,
    #[error("Can't have more than {MAX_ARGUMENTS} parameters")]
    TooManyParameters,
    #[error("Can't have more than {MAX_ARGUMENTS} arguments")]
    TooManyArguments,
}

type ParseResult<'a, T> = Result<(T, &'a [Token]), ParseErrorWithContext>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    Function,
    Method,
}

struct ParseContext {
    stack: RefCell<Vec<&'static str>>,
    loop_depth: Cell<usize>,
    errors: RefCell<Vec<ParseErrorWithContext>>,
}

impl ParseContext {
    fn new() -> Self {
        Self {
            stack: RefCell::new(vec![]),
            loop_depth: Cell::new(0),
            errors: RefCell::new(vec![]),
        }
    }

    fn push(&self, name: &'static str) -> ParseContextGuard {
        self.stack.borrow_mut().push(name);
        ParseContextGuard::new(self)
    }

    fn pop(&self) {
        self.stack.borrow_mut().pop();
    }

    fn error(&self, error: ParseError, tokens: &[Token]) -> ParseErrorWithContext {
        ParseErrorWithContext {
            error,
            context: self.stack.borrow().clone(),
            token: tokens.first().cloned(),
            remaining: tokens.len(),
        }
    }

    /// Records an error without interrupting the current rule.
    fn report(&self, error: ParseError, tokens: &[Token]) {
        let error = self.error(error, tokens);
        self.errors.borrow_mut().push(error);
    }

    fn enter_loop(&self) -> LoopGuard {
        self.loop_depth.set(self.loop_depth.get() + 1);
        LoopGuard {
            context: self,
            saved: self.loop_depth.get() - 1,
        }
    }

    /// Function bodies start outside of any loop.
    fn enter_function(&self) -> LoopGuard {
        let saved = self.loop_depth.replace(0);
        LoopGuard {
            context: self,
            saved,
        }
    }
}

struct ParseContextGuard<'a> {
    context: &'a ParseContext,
}

impl<'a> ParseContextGuard<'a> {
    fn new(context: &'a ParseContext) -> Self {
        Self { context }
    }
}

impl<'a> Drop for ParseContextGuard<'a> {
    fn drop(&mut self) {
        self.context.pop();
    }
}

struct LoopGuard<'a> {
    context: &'a ParseContext,
    saved: usize,
}

impl<'a> Drop for LoopGuard<'a> {
    fn drop(&mut self) {
        self.context.loop_depth.set(self.saved);
    }
}

pub fn program(tokens: &[Token]) -> Result<Program, ParseErrors> {
    let context = ParseContext::new();
    let mut statements = Vec::new();
    let mut tokens = tokens;

    let _guard = context.push("program");

    while !at_end(tokens) {
        let (statement, rest) = declaration(&context, tokens);
        statements.extend(statement);
        tokens = rest;
    }

    let errors = context.errors.take();
    if !errors.is_empty() {
        return Err(ParseErrors(errors));
    }

    tracing::debug!(statements = statements.len(), "parsed program");
    Ok(Program(statements))
}

fn at_end(tokens: &[Token]) -> bool {
    matches!(
        tokens.first().map(Token::token_type),
        None | Some(TokenType::Eof)
    )
}

fn check(tokens: &[Token], token_type: &TokenType) -> bool {
    tokens.first().map(Token::token_type) == Some(token_type)
}

/// Discards the offending token, then everything up to and including the next
/// `;` or up to the next token that starts a declaration or statement.
fn synchronize(tokens: &[Token]) -> &[Token] {
    if at_end(tokens) {
        return tokens;
    }

    let mut previous = &tokens[0];
    let mut tokens = &tokens[1..];
    while let Some(token) = tokens.first() {
        if previous.token_type == TokenType::Semicolon {
            return tokens;
        }
        match token.token_type {
            TokenType::Eof
            | TokenType::Node
            | TokenType::Function
            | TokenType::Auto
            | TokenType::For
            | TokenType::If
            | TokenType::While
            | TokenType::Return => return tokens,
            _ => {
                previous = token;
                tokens = &tokens[1..];
            }
        }
    }
    tokens
}

/// Never fails: errors are recorded on the context and parsing resumes after
/// synchronizing.
fn declaration<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
) -> (Option<Statement>, &'a [Token]) {
    let _guard = context.push("declaration");
    match try_declaration(context, tokens) {
        Ok((statement, rest)) => (Some(statement), rest),
        Err(error) => {
            let position = tokens.len().saturating_sub(error.remaining);
            context.errors.borrow_mut().push(error);
            (None, synchronize(&tokens[position..]))
        }
    }
}

fn try_declaration<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    match tokens.first().map(Token::token_type) {
        Some(TokenType::Function)
            if matches!(
                tokens.get(1).map(Token::token_type),
                Some(TokenType::Identifier(_))
            ) =>
        {
            let (function, rest) = function(context, &tokens[1..], FunctionKind::Function)?;
            Ok((Statement::Function(function), rest))
        }
        Some(TokenType::Auto) => auto_declaration(context, &tokens[1..]),
        Some(TokenType::Node) => node_declaration(context, &tokens[1..]),
        Some(TokenType::Trait) => trait_declaration(context, &tokens[1..]),
        _ => statement(context, tokens),
    }
}

fn node_declaration<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("node_declaration");
    let ((name, line), tokens) = match_identifier(context, tokens)?;

    let (parent, tokens) = if check(tokens, &TokenType::Colon) {
        let ((parent, parent_line), rest) = match_identifier(context, &tokens[1..])?;
        (Some(Variable::new(parent, parent_line)), rest)
    } else {
        (None, tokens)
    };

    let (traits, tokens) = with_clause(context, tokens)?;
    let mut tokens = consume(context, tokens, TokenType::LeftBrace)?;

    let mut methods = Vec::new();
    let mut meta_methods = Vec::new();
    while !check(tokens, &TokenType::RightBrace) && !at_end(tokens) {
        let is_meta = check(tokens, &TokenType::Node);
        if is_meta {
            tokens = &tokens[1..];
        }
        let (method, rest) = function(context, tokens, FunctionKind::Method)?;
        if is_meta {
            meta_methods.push(method);
        } else {
            methods.push(method);
        }
        tokens = rest;
    }

    let tokens = consume(context, tokens, TokenType::RightBrace)?;
    Ok((
        Statement::Node(Rc::new(NodeDecl {
            name,
            parent,
            traits,
            methods,
            meta_methods,
            line,
        })),
        tokens,
    ))
}

fn trait_declaration<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
) -> ParseResult<'a, Statement> {
    let _guard = context.push("trait_declaration");
    let ((name, line), tokens) = match_identifier(context, tokens)?;
    let (traits, tokens) = with_clause(context, tokens)?;
    let mut tokens = consume(context, tokens, TokenType::LeftBrace)?;

    let mut methods = Vec::new();
    while !check(tokens, &TokenType::RightBrace) && !at_end(tokens) {
        let (method, rest) = function(context, tokens, FunctionKind::Method)?;
        methods.push(method);
        tokens = rest;
    }

    let tokens = consume(context, tokens, TokenType::RightBrace)?;
    Ok((
        Statement::Trait(Rc::new(TraitDecl {
            name,
            traits,
            methods,
            line,
        })),
        tokens,
    ))
}

fn with_clause<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Vec<Variable>> {
    let mut traits = Vec::new();
    if !check(tokens, &TokenType::With) {
        return Ok((traits, tokens));
    }

    let mut tokens = &tokens[1..];
    loop {
        let ((name, line), rest) = match_identifier(context, tokens)?;
        traits.push(Variable::new(name, line));
        tokens = rest;
        if !check(tokens, &TokenType::Comma) {
            return Ok((traits, tokens));
        }
        tokens = &tokens[1..];
    }
}

fn function<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    kind: FunctionKind,
) -> ParseResult<'a, Rc<FunctionDecl>> {
    let _guard = context.push("function");
    let ((name, line), tokens) = match_identifier(context, tokens)?;
    function_body(context, tokens, kind, Some(name), line)
}

fn function_body<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    kind: FunctionKind,
    name: Option<String>,
    line: usize,
) -> ParseResult<'a, Rc<FunctionDecl>> {
    let (params, tokens) = if kind == FunctionKind::Function || check(tokens, &TokenType::LeftParen)
    {
        let (params, rest) = parameters(context, tokens)?;
        (Some(params), rest)
    } else {
        (None, tokens)
    };

    let tokens = consume(context, tokens, TokenType::LeftBrace)?;
    let _function = context.enter_function();
    let (body, tokens) = block(context, tokens)?;

    Ok((
        Rc::new(FunctionDecl {
            name,
            params,
            body,
            line,
        }),
        tokens,
    ))
}

fn parameters<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Vec<String>> {
    let mut tokens = consume(context, tokens, TokenType::LeftParen)?;
    let mut params = vec![];
    if check(tokens, &TokenType::RightParen) {
        return Ok((params, &tokens[1..]));
    }

    loop {
        if params.len() >= MAX_ARGUMENTS {
            context.report(ParseError::TooManyParameters, tokens);
        }

        let ((param, _), rest) = match_identifier(context, tokens)?;
        params.push(param);
        tokens = rest;

        match tokens.first().map(Token::token_type) {
            Some(TokenType::Comma) => tokens = &tokens[1..],
            Some(TokenType::RightParen) => return Ok((params, &tokens[1..])),
            _ => {
                return Err(context.error(
                    ParseError::ExpectedOneOf(vec![TokenType::Comma, TokenType::RightParen]),
                    tokens,
                ))
            }
        }
    }
}

fn auto_declaration<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("auto_declaration");
    let ((name, line), tokens) = match_identifier(context, tokens)?;
    let (initializer, tokens) = match tokens.first().map(Token::token_type) {
        Some(TokenType::Equal) => {
            let (expr, rest) = expression(context, &tokens[1..])?;
            (Some(expr), rest)
        }
        _ => (None, tokens),
    };
    let tokens = consume(context, tokens, TokenType::Semicolon)?;
    Ok((
        Statement::Auto {
            name,
            initializer,
            line,
        },
        tokens,
    ))
}

fn statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("statement");
    match tokens.first().map(Token::token_type) {
        Some(TokenType::LeftBrace) => {
            let (statements, rest) = block(context, &tokens[1..])?;
            Ok((Statement::Block(statements), rest))
        }
        Some(TokenType::If) => if_statement(context, &tokens[1..]),
        Some(TokenType::While) => while_statement(context, &tokens[1..]),
        Some(TokenType::For) => for_statement(context, &tokens[1..]),
        Some(TokenType::Return) => return_statement(context, tokens),
        Some(TokenType::Break) => {
            if context.loop_depth.get() == 0 {
                context.report(ParseError::BreakOutsideLoop, tokens);
            }
            let tokens = consume(context, &tokens[1..], TokenType::Semicolon)?;
            Ok((Statement::Break, tokens))
        }
        Some(TokenType::Continue) => {
            if context.loop_depth.get() == 0 {
                context.report(ParseError::ContinueOutsideLoop, tokens);
            }
            let tokens = consume(context, &tokens[1..], TokenType::Semicolon)?;
            Ok((Statement::Continue, tokens))
        }
        Some(TokenType::Use) => use_statement(context, tokens),
        _ => expression_statement(context, tokens),
    }
}

fn while_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("while_statement");
    let tokens = consume(context, tokens, TokenType::LeftParen)?;
    let (condition, tokens) = expression(context, tokens)?;
    let tokens = consume(context, tokens, TokenType::RightParen)?;
    let _loop = context.enter_loop();
    let (body, tokens) = statement(context, tokens)?;
    Ok((Statement::While(condition, Box::new(body)), tokens))
}

fn if_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("if_statement");
    let tokens = consume(context, tokens, TokenType::LeftParen)?;
    let (condition, tokens) = expression(context, tokens)?;
    let tokens = consume(context, tokens, TokenType::RightParen)?;
    let (then_branch, tokens) = statement(context, tokens)?;
    if let Some(TokenType::Else) = tokens.first().map(Token::token_type) {
        let (else_branch, tokens) = statement(context, &tokens[1..])?;
        Ok((
            Statement::If(
                condition,
                Box::new(then_branch),
                Some(Box::new(else_branch)),
            ),
            tokens,
        ))
    } else {
        Ok((
            Statement::If(condition, Box::new(then_branch), None),
            tokens,
        ))
    }
}

/// `for` has no node of its own: it becomes an optional initializer around a
/// `while` whose body ends with the increment.
fn for_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("for_statement");
    let tokens = consume(context, tokens, TokenType::LeftParen)?;

    let (initializer, tokens) = match tokens.first().map(Token::token_type) {
        Some(TokenType::Semicolon) => (None, &tokens[1..]),
        Some(TokenType::Auto) => {
            let (initializer, rest) = auto_declaration(context, &tokens[1..])?;
            (Some(initializer), rest)
        }
        _ => {
            let (initializer, rest) = expression_statement(context, tokens)?;
            (Some(initializer), rest)
        }
    };

    let (condition, tokens) = if !check(tokens, &TokenType::Semicolon) {
        expression(context, tokens)?
    } else {
        (Expression::Literal(Literal::Boolean(true)), tokens)
    };

    let tokens = consume(context, tokens, TokenType::Semicolon)?;

    let (increment, tokens) = if !check(tokens, &TokenType::RightParen) {
        let (increment, rest) = expression(context, tokens)?;
        (Some(increment), rest)
    } else {
        (None, tokens)
    };

    let tokens = consume(context, tokens, TokenType::RightParen)?;

    let (body, tokens) = {
        let _loop = context.enter_loop();
        statement(context, tokens)?
    };

    let body = match increment {
        Some(increment) => Statement::Block(vec![body, Statement::Expression(increment)]),
        None => body,
    };
    let looped = Statement::While(condition, Box::new(body));

    Ok((
        match initializer {
            Some(initializer) => Statement::Block(vec![initializer, looped]),
            None => looped,
        },
        tokens,
    ))
}

fn return_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("return_statement");
    let line = tokens[0].line;
    let tokens = &tokens[1..];
    let (value, tokens) = if check(tokens, &TokenType::Semicolon) {
        (None, tokens)
    } else {
        let (value, rest) = expression(context, tokens)?;
        (Some(value), rest)
    };
    let tokens = consume(context, tokens, TokenType::Semicolon)?;
    Ok((Statement::Return { value, line }, tokens))
}

fn use_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("use_statement");
    let line = tokens[0].line;
    let mut tokens = &tokens[1..];
    let mut modules = Vec::new();
    loop {
        let ((module, _), rest) = match_identifier(context, tokens)?;
        modules.push(module);
        tokens = rest;
        if !check(tokens, &TokenType::Comma) {
            break;
        }
        tokens = &tokens[1..];
    }
    let tokens = consume(context, tokens, TokenType::Semicolon)?;
    Ok((Statement::Use { modules, line }, tokens))
}

fn block<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Vec<Statement>> {
    let _guard = context.push("block");
    let mut statements = Vec::new();
    let mut tokens = tokens;

    while !check(tokens, &TokenType::RightBrace) && !at_end(tokens) {
        let (statement, rest) = declaration(context, tokens);
        statements.extend(statement);
        tokens = rest;
    }

    let tokens = consume(context, tokens, TokenType::RightBrace)?;
    Ok((statements, tokens))
}

fn expression_statement<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
) -> ParseResult<'a, Statement> {
    let _guard = context.push("expression_statement");
    let (expr, tokens) = expression(context, tokens)?;
    let tokens = consume(context, tokens, TokenType::Semicolon)?;
    Ok((Statement::Expression(expr), tokens))
}

fn expression<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("expression");
    assignment(context, tokens)
}

fn assignment<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("assignment");
    let (expr, rest) = logical_or(context, tokens)?;

    if !check(rest, &TokenType::Equal) {
        return Ok((expr, rest));
    }

    let (value, after) = assignment(context, &rest[1..])?;
    let value = Box::new(value);
    match expr {
        Expression::Variable(variable) => Ok((Expression::Assign(variable, value), after)),
        Expression::Get { object, name, line } => Ok((
            Expression::Set {
                object,
                name,
                value,
                line,
            },
            after,
        )),
        Expression::Index {
            object,
            index,
            line,
        } => Ok((
            Expression::IndexSet {
                object,
                index,
                value,
                line,
            },
            after,
        )),
        expr => {
            context.report(ParseError::InvalidAssignmentTarget, rest);
            Ok((expr, after))
        }
    }
}

fn binary<'a, O>(
    context: &ParseContext,
    precedence: impl Fn(&ParseContext, &'a [Token]) -> ParseResult<'a, Expression>,
    operator: impl Fn(&TokenType) -> Option<O>,
    combine: impl Fn(Expression, O, Expression, usize) -> Expression,
    tokens: &'a [Token],
) -> ParseResult<'a, Expression> {
    let (mut expr, mut tokens) = precedence(context, tokens)?;

    while let Some(token) = tokens.first() {
        let op = match operator(token.token_type()) {
            Some(op) => op,
            None => break,
        };
        let (right, rest) = precedence(context, &tokens[1..])?;
        expr = combine(expr, op, right, token.line);
        tokens = rest;
    }

    Ok((expr, tokens))
}

fn infix(left: Expression, operator: InfixOperator, right: Expression, line: usize) -> Expression {
    Expression::Binary {
        left: Box::new(left),
        operator,
        right: Box::new(right),
        line,
    }
}

fn logical(left: Expression, operator: LogicalOperator, right: Expression, _: usize) -> Expression {
    Expression::Logical(Box::new(left), operator, Box::new(right))
}

fn logical_or<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("logical_or");
    binary(
        context,
        logical_and,
        |token_type| match token_type {
            TokenType::Or => Some(LogicalOperator::Or),
            _ => None,
        },
        logical,
        tokens,
    )
}

fn logical_and<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("logical_and");
    binary(
        context,
        equality,
        |token_type| match token_type {
            TokenType::And => Some(LogicalOperator::And),
            _ => None,
        },
        logical,
        tokens,
    )
}

fn equality<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("equality");
    binary(
        context,
        comparison,
        |token_type| match token_type {
            TokenType::EqualEqual => Some(InfixOperator::Equal),
            TokenType::BangEqual => Some(InfixOperator::NotEqual),
            TokenType::PlusEqual => Some(InfixOperator::PlusAssign),
            TokenType::MinusEqual => Some(InfixOperator::MinusAssign),
            TokenType::StarEqual => Some(InfixOperator::MultiplyAssign),
            TokenType::SlashEqual => Some(InfixOperator::DivideAssign),
            _ => None,
        },
        infix,
        tokens,
    )
}

fn comparison<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("comparison");
    binary(
        context,
        term,
        |token_type| match token_type {
            TokenType::Less => Some(InfixOperator::LessThan),
            TokenType::LessEqual => Some(InfixOperator::LessThanOrEqual),
            TokenType::Greater => Some(InfixOperator::GreaterThan),
            TokenType::GreaterEqual => Some(InfixOperator::GreaterThanOrEqual),
            _ => None,
        },
        infix,
        tokens,
    )
}

fn term<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("term");
    binary(
        context,
        factor,
        |token_type| match token_type {
            TokenType::Plus => Some(InfixOperator::Plus),
            TokenType::Minus => Some(InfixOperator::Minus),
            _ => None,
        },
        infix,
        tokens,
    )
}

fn factor<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("factor");
    binary(
        context,
        unary,
        |token_type| match token_type {
            TokenType::Star => Some(InfixOperator::Multiply),
            TokenType::Slash => Some(InfixOperator::Divide),
            _ => None,
        },
        infix,
        tokens,
    )
}

fn unary<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("unary");

    let operator = match tokens.first().map(Token::token_type) {
        Some(TokenType::Minus) => UnaryOperator::Negate,
        Some(TokenType::Bang) => UnaryOperator::Not,
        Some(TokenType::PlusPlus) => UnaryOperator::Increment,
        Some(TokenType::MinusMinus) => UnaryOperator::Decrement,
        _ => return call(context, tokens),
    };

    let line = tokens[0].line;
    let (operand, rest) = unary(context, &tokens[1..])?;
    Ok((
        Expression::Unary {
            operator,
            operand: Box::new(operand),
            line,
        },
        rest,
    ))
}

fn call<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("call");
    let (mut expr, mut tokens) = primary(context, tokens)?;

    while let Some(token) = tokens.first() {
        match token.token_type() {
            TokenType::LeftParen => {
                let (arguments, rest) = arguments(context, &tokens[1..])?;
                expr = Expression::Call {
                    callee: Box::new(expr),
                    arguments,
                    line: token.line,
                };
                tokens = rest;
            }
            TokenType::Dot => {
                let ((name, line), rest) = match_identifier(context, &tokens[1..])?;
                expr = Expression::Get {
                    object: Box::new(expr),
                    name,
                    line,
                };
                tokens = rest;
            }
            TokenType::LeftBracket => {
                let (index, rest) = expression(context, &tokens[1..])?;
                let rest = consume(context, rest, TokenType::RightBracket)?;
                expr = Expression::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    line: token.line,
                };
                tokens = rest;
            }
            _ => break,
        }
    }

    Ok((expr, tokens))
}

fn arguments<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Vec<Expression>> {
    let mut args = Vec::new();
    let mut tokens = tokens;
    if check(tokens, &TokenType::RightParen) {
        return Ok((args, &tokens[1..]));
    }

    loop {
        if args.len() >= MAX_ARGUMENTS {
            context.report(ParseError::TooManyArguments, tokens);
        }
        let (arg, rest) = expression(context, tokens)?;
        args.push(arg);
        tokens = rest;
        match tokens.first().map(Token::token_type) {
            Some(TokenType::Comma) => tokens = &tokens[1..],
            Some(TokenType::RightParen) => return Ok((args, &tokens[1..])),
            _ => {
                return Err(context.error(
                    ParseError::ExpectedOneOf(vec![TokenType::Comma, TokenType::RightParen]),
                    tokens,
                ))
            }
        }
    }
}

fn primary<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("primary");
    let Some(token) = tokens.first() else {
        return Err(context.error(ParseError::ExpectedExpression, tokens));
    };
    let rest = &tokens[1..];

    match token.token_type() {
        TokenType::Number(n) => Ok((Expression::Literal(Literal::Number(*n)), rest)),
        TokenType::String(s) => Ok((Expression::Literal(Literal::String(s.clone())), rest)),
        TokenType::True => Ok((Expression::Literal(Literal::Boolean(true)), rest)),
        TokenType::False => Ok((Expression::Literal(Literal::Boolean(false)), rest)),
        TokenType::Null => Ok((Expression::Literal(Literal::Null), rest)),
        TokenType::SelfKw => Ok((
            Expression::SelfRef {
                id: NodeId::fresh(),
                line: token.line,
            },
            rest,
        )),
        TokenType::Parent => {
            let rest = consume(context, rest, TokenType::Dot)?;
            let ((method, _), rest) = match_identifier(context, rest)?;
            Ok((
                Expression::Parent {
                    id: NodeId::fresh(),
                    method,
                    line: token.line,
                },
                rest,
            ))
        }
        TokenType::Identifier(name) => Ok((
            Expression::Variable(Variable::new(name.clone(), token.line)),
            rest,
        )),
        TokenType::Array => {
            let rest = consume(context, rest, TokenType::LeftBracket)?;
            let (size, rest) = expression(context, rest)?;
            let rest = consume(context, rest, TokenType::RightBracket)?;
            Ok((
                Expression::Array {
                    size: Box::new(size),
                    line: token.line,
                },
                rest,
            ))
        }
        TokenType::Function => {
            let (function, rest) =
                function_body(context, rest, FunctionKind::Function, None, token.line)?;
            Ok((Expression::Function(function), rest))
        }
        TokenType::LeftParen => {
            let (expr, rest) = expression(context, rest)?;
            let rest = consume(context, rest, TokenType::RightParen)?;
            Ok((Expression::Grouping(Box::new(expr)), rest))
        }
        _ => Err(context.error(ParseError::ExpectedExpression, tokens)),
    }
}

fn consume<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    token_type: TokenType,
) -> Result<&'a [Token], ParseErrorWithContext> {
    match tokens.first().map(Token::token_type) {
        Some(t) if t == &token_type => Ok(&tokens[1..]),
        _ => Err(context.error(ParseError::Expected(token_type), tokens)),
    }
}

fn match_identifier<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
) -> ParseResult<'a, (String, usize)> {
    match tokens.first() {
        Some(Token {
            token_type: TokenType::Identifier(name),
            line,
            ..
        }) => Ok(((name.clone(), *line), &tokens[1..])),
        _ => Err(context.error(ParseError::ExpectedIdentifier, tokens)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tokenizer::tokens;

    fn parse(source: &str) -> Result<Program, ParseErrors> {
        program(&tokens(source).expect("source should tokenize"))
    }

    fn errors(source: &str) -> Vec<ParseError> {
        parse(source)
            .expect_err("source should not parse")
            .0
            .into_iter()
            .map(|e| e.error)
            .collect()
    }

    #[test]
    fn test_precedence() {
        let program = parse("1 + 2 * 3 == 7 and !false;").unwrap();
        assert_eq!(
            program.to_string(),
            "(and (== (+ 1 (* 2 3)) 7) (! false));\n"
        );
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let program = parse("a = b = 1;").unwrap();
        let Statement::Expression(Expression::Assign(a, value)) = &program.0[0] else {
            panic!("expected assignment, got {:?}", program.0[0]);
        };
        assert_eq!(a.name, "a");
        assert!(matches!(value.as_ref(), Expression::Assign(b, _) if b.name == "b"));
    }

    #[test]
    fn test_assignment_targets_are_rewritten() {
        let program = parse("a.b = 1; a[0] = 2;").unwrap();
        assert!(matches!(
            &program.0[0],
            Statement::Expression(Expression::Set { name, .. }) if name == "b"
        ));
        assert!(matches!(
            &program.0[1],
            Statement::Expression(Expression::IndexSet { .. })
        ));
    }

    #[test]
    fn test_invalid_assignment_target_does_not_stop_parsing() {
        let errors = errors("1 = 2; auto x = ; x + 1 = 3;");
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], ParseError::InvalidAssignmentTarget));
        assert!(matches!(errors[1], ParseError::ExpectedExpression));
        assert!(matches!(errors[2], ParseError::InvalidAssignmentTarget));
    }

    #[test]
    fn test_for_desugars_to_while() {
        let program = parse("for (auto i = 0; i < 3; ++i) print(i);").unwrap();
        let Statement::Block(outer) = &program.0[0] else {
            panic!("expected block, got {}", program.0[0]);
        };
        assert!(matches!(outer[0], Statement::Auto { .. }));
        let Statement::While(_, body) = &outer[1] else {
            panic!("expected while, got {}", outer[1]);
        };
        let Statement::Block(body) = body.as_ref() else {
            panic!("expected block body, got {}", body);
        };
        assert_eq!(body.len(), 2);
        assert!(matches!(
            &body[1],
            Statement::Expression(Expression::Unary {
                operator: UnaryOperator::Increment,
                ..
            })
        ));
    }

    #[test]
    fn test_bare_for_loops_forever() {
        let program = parse("for (;;) break;").unwrap();
        assert!(matches!(
            &program.0[0],
            Statement::While(Expression::Literal(Literal::Boolean(true)), body)
                if matches!(body.as_ref(), Statement::Break)
        ));
    }

    #[test]
    fn test_break_outside_loop() {
        let errors = errors("break; continue;");
        assert!(matches!(errors[0], ParseError::BreakOutsideLoop));
        assert!(matches!(errors[1], ParseError::ContinueOutsideLoop));
    }

    #[test]
    fn test_break_cannot_cross_function_boundary() {
        let errors = errors("while (true) { function f() { break; } }");
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ParseError::BreakOutsideLoop));
        assert!(parse("while (true) { if (true) { break; } }").is_ok());
    }

    #[test]
    fn test_node_declaration() {
        let source = r#"
        node Dog : Animal with Loud, Furry {
            define(name) { self.name = name; }
            legs { return 4; }
            node create() { return Dog("Rex"); }
        }
        "#;
        let program = parse(source).unwrap();
        let Statement::Node(decl) = &program.0[0] else {
            panic!("expected node, got {}", program.0[0]);
        };
        assert_eq!(decl.name, "Dog");
        assert_eq!(decl.parent.as_ref().map(|p| p.name.as_str()), Some("Animal"));
        assert_eq!(decl.traits.len(), 2);
        assert_eq!(decl.methods.len(), 2);
        assert!(decl.methods[1].is_getter());
        assert_eq!(decl.meta_methods.len(), 1);
        assert_eq!(decl.meta_methods[0].name.as_deref(), Some("create"));
    }

    #[test]
    fn test_functions_require_parameter_list() {
        let errors = errors("function f { }");
        assert!(matches!(
            errors[0],
            ParseError::Expected(TokenType::LeftParen)
        ));
    }

    #[test]
    fn test_function_literal_statement() {
        let program = parse("function (a) { return a; }(1);").unwrap();
        assert!(matches!(
            &program.0[0],
            Statement::Expression(Expression::Call { .. })
        ));
    }

    #[test]
    fn test_use_statement() {
        let program = parse("use math, io;").unwrap();
        assert!(matches!(
            &program.0[0],
            Statement::Use { modules, .. } if modules == &["math", "io"]
        ));
    }

    #[test]
    fn test_recovery_inside_blocks() {
        let errors = errors("{ auto = 1; auto y = 2; print(; }");
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_identical_references_have_distinct_ids() {
        let program = parse("x; x;").unwrap();
        let ids: Vec<NodeId> = program
            .0
            .iter()
            .map(|statement| match statement {
                Statement::Expression(Expression::Variable(v)) => v.id,
                other => panic!("expected variable, got {other}"),
            })
            .collect();
        assert_ne!(ids[0], ids[1]);
    }
}
