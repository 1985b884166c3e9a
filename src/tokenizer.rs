use std::fmt::Display;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,
    Semicolon,
    Colon,

    // One or two character tokens
    Minus,
    MinusEqual,
    MinusMinus,
    Plus,
    PlusEqual,
    PlusPlus,
    Slash,
    SlashEqual,
    Star,
    StarEqual,
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals
    Identifier(String),
    String(String),
    Number(f64),

    // Keywords
    And,
    Array,
    Auto,
    Break,
    Continue,
    Else,
    False,
    For,
    Function,
    If,
    Node,
    Null,
    Or,
    Parent,
    Return,
    SelfKw,
    Trait,
    True,
    Use,
    While,
    With,

    // End of file
    Eof,
}

impl Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::LeftParen => write!(f, "("),
            TokenType::RightParen => write!(f, ")"),
            TokenType::LeftBrace => write!(f, "{{"),
            TokenType::RightBrace => write!(f, "}}"),
            TokenType::LeftBracket => write!(f, "["),
            TokenType::RightBracket => write!(f, "]"),
            TokenType::Comma => write!(f, ","),
            TokenType::Dot => write!(f, "."),
            TokenType::Semicolon => write!(f, ";"),
            TokenType::Colon => write!(f, ":"),
            TokenType::Minus => write!(f, "-"),
            TokenType::MinusEqual => write!(f, "-="),
            TokenType::MinusMinus => write!(f, "--"),
            TokenType::Plus => write!(f, "+"),
            TokenType::PlusEqual => write!(f, "+="),
            TokenType::PlusPlus => write!(f, "++"),
            TokenType::Slash => write!(f, "/"),
            TokenType::SlashEqual => write!(f, "/="),
            TokenType::Star => write!(f, "*"),
            TokenType::StarEqual => write!(f, "*="),
            TokenType::Bang => write!(f, "!"),
            TokenType::BangEqual => write!(f, "!="),
            TokenType::Equal => write!(f, "="),
            TokenType::EqualEqual => write!(f, "=="),
            TokenType::Greater => write!(f, ">"),
            TokenType::GreaterEqual => write!(f, ">="),
            TokenType::Less => write!(f, "<"),
            TokenType::LessEqual => write!(f, "<="),
            TokenType::Identifier(name) => write!(f, "{name}"),
            TokenType::String(s) => write!(f, "\"{s}\""),
            TokenType::Number(n) => write!(f, "{n}"),
            TokenType::And => write!(f, "and"),
            TokenType::Array => write!(f, "array"),
            TokenType::Auto => write!(f, "auto"),
            TokenType::Break => write!(f, "break"),
            TokenType::Continue => write!(f, "continue"),
            TokenType::Else => write!(f, "else"),
            TokenType::False => write!(f, "false"),
            TokenType::For => write!(f, "for"),
            TokenType::Function => write!(f, "function"),
            TokenType::If => write!(f, "if"),
            TokenType::Node => write!(f, "node"),
            TokenType::Null => write!(f, "null"),
            TokenType::Or => write!(f, "or"),
            TokenType::Parent => write!(f, "parent"),
            TokenType::Return => write!(f, "return"),
            TokenType::SelfKw => write!(f, "self"),
            TokenType::Trait => write!(f, "trait"),
            TokenType::True => write!(f, "true"),
            TokenType::Use => write!(f, "use"),
            TokenType::While => write!(f, "while"),
            TokenType::With => write!(f, "with"),
            TokenType::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub line: usize,
}

impl Token {
    pub fn token_type(&self) -> &TokenType {
        &self.token_type
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenizeError {
    #[error("[line {line}] Unexpected character '{character}'")]
    UnexpectedCharacter { character: char, line: usize },
    #[error("[line {line}] Unterminated string")]
    UnterminatedString { line: usize },
    #[error("[line {line}] Unterminated block comment")]
    UnterminatedComment { line: usize },
}

#[derive(Debug)]
pub struct TokenizeErrors(pub Vec<TokenizeError>);

impl std::error::Error for TokenizeErrors {}

impl std::fmt::Display for TokenizeErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Found {} errors during tokenizing", self.0.len())?;
        for error in &self.0 {
            writeln!(f, "{}", error)?;
        }
        Ok(())
    }
}

pub fn tokens(source: &str) -> Result<Vec<Token>, TokenizeErrors> {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let mut remaining = source;
    let mut line = 1;

    loop {
        match token(remaining, &mut line) {
            Ok((token, rest)) => {
                remaining = rest;
                let eof = token.token_type == TokenType::Eof;
                tokens.push(token);
                if eof {
                    break;
                }
            }
            Err((error, rest)) => {
                errors.push(error);
                remaining = rest;
            }
        }
    }

    if !errors.is_empty() {
        return Err(TokenizeErrors(errors));
    }

    tracing::debug!(count = tokens.len(), "tokenized source");
    Ok(tokens)
}

fn newlines(text: &str) -> usize {
    text.chars().filter(|c| *c == '\n').count()
}

/// Scans one token, advancing `line` past any trivia and the token itself. On
/// failure the offending input is skipped and the rest is returned with the error.
fn token<'a>(
    mut source: &'a str,
    line: &mut usize,
) -> Result<(Token, &'a str), (TokenizeError, &'a str)> {
    loop {
        if source.starts_with("/*") {
            let Some(end) = source[2..].find("*/") else {
                let error = TokenizeError::UnterminatedComment { line: *line };
                *line += newlines(source);
                return Err((error, ""));
            };
            *line += newlines(&source[..end + 4]);
            source = &source[end + 4..];
            continue;
        }

        match maximal(&[whitespace, comment], source) {
            Some((_, rest)) => {
                *line += newlines(&source[..source.len() - rest.len()]);
                source = rest;
            }
            None => break,
        }
    }

    if source.is_empty() {
        return Ok((
            Token {
                token_type: TokenType::Eof,
                lexeme: String::new(),
                line: *line,
            },
            source,
        ));
    }

    let start_line = *line;
    let matched = maximal(
        &[
            // Single-character tokens
            left_paren,
            right_paren,
            left_brace,
            right_brace,
            left_bracket,
            right_bracket,
            comma,
            dot,
            semicolon,
            colon,
            // one or two character tokens
            minus,
            minus_equal,
            minus_minus,
            plus,
            plus_equal,
            plus_plus,
            slash,
            slash_equal,
            star,
            star_equal,
            bang,
            bang_equal,
            equal,
            equal_equal,
            greater,
            greater_equal,
            less,
            less_equal,
            // keywords
            and,
            array,
            auto,
            break_,
            continue_,
            else_,
            false_,
            for_,
            function,
            if_,
            node,
            null,
            or,
            parent,
            return_,
            self_,
            trait_,
            true_,
            use_,
            while_,
            with,
            // literals
            identifier,
            string,
            number,
        ],
        source,
    );

    match matched {
        Some((token_type, rest)) => {
            let lexeme = &source[..source.len() - rest.len()];
            *line += newlines(lexeme);
            Ok((
                Token {
                    token_type,
                    lexeme: lexeme.to_string(),
                    line: start_line,
                },
                rest,
            ))
        }
        None if source.starts_with('"') => {
            let error = TokenizeError::UnterminatedString { line: start_line };
            *line += newlines(source);
            Err((error, ""))
        }
        None => {
            let mut chars = source.chars();
            let character = chars.next().unwrap_or_default();
            Err((
                TokenizeError::UnexpectedCharacter {
                    character,
                    line: start_line,
                },
                chars.as_str(),
            ))
        }
    }
}

fn maximal<'a, T: std::fmt::Debug>(
    parsers: &[fn(&str) -> Option<(T, &str)>],
    source: &'a str,
) -> Option<(T, &'a str)> {
    let mut min_left = source.len() + 1;
    let mut max_match = None;

    let matching_parsers = parsers.iter().filter_map(|parser| parser(source));
    for (m, rest) in matching_parsers {
        let left = rest.len();
        if left < min_left {
            min_left = left;
            max_match = Some((m, rest));
        }
    }

    max_match
}

fn whitespace(source: &str) -> Option<((), &str)> {
    let len = source
        .chars()
        .take_while(|c| c.is_whitespace())
        .map(char::len_utf8)
        .sum();
    if len > 0 {
        Some(((), &source[len..]))
    } else {
        None
    }
}

fn comment(source: &str) -> Option<((), &str)> {
    if source.starts_with("//") {
        let len = source
            .chars()
            .take_while(|c| *c != '\n')
            .map(char::len_utf8)
            .sum();
        Some(((), &source[len..]))
    } else {
        None
    }
}

macro_rules! match_literal {
    ($name:ident, $word:literal, $token:expr) => {
        fn $name(source: &str) -> Option<(TokenType, &str)> {
            if source.starts_with($word) {
                Some(($token, &source[$word.len()..]))
            } else {
                None
            }
        }
    };
}

match_literal! { left_paren, "(", TokenType::LeftParen }
match_literal! { right_paren, ")", TokenType::RightParen }
match_literal! { left_brace, "{", TokenType::LeftBrace }
match_literal! { right_brace, "}", TokenType::RightBrace }
match_literal! { left_bracket, "[", TokenType::LeftBracket }
match_literal! { right_bracket, "]", TokenType::RightBracket }
match_literal! { comma, ",", TokenType::Comma }
match_literal! { dot, ".", TokenType::Dot }
match_literal! { semicolon, ";", TokenType::Semicolon }
match_literal! { colon, ":", TokenType::Colon }
match_literal! { minus, "-", TokenType::Minus }
match_literal! { minus_equal, "-=", TokenType::MinusEqual }
match_literal! { minus_minus, "--", TokenType::MinusMinus }
match_literal! { plus, "+", TokenType::Plus }
match_literal! { plus_equal, "+=", TokenType::PlusEqual }
match_literal! { plus_plus, "++", TokenType::PlusPlus }
match_literal! { slash, "/", TokenType::Slash }
match_literal! { slash_equal, "/=", TokenType::SlashEqual }
match_literal! { star, "*", TokenType::Star }
match_literal! { star_equal, "*=", TokenType::StarEqual }
match_literal! { bang, "!", TokenType::Bang }
match_literal! { bang_equal, "!=", TokenType::BangEqual }
match_literal! { equal, "=", TokenType::Equal }
match_literal! { equal_equal, "==", TokenType::EqualEqual }
match_literal! { greater, ">", TokenType::Greater }
match_literal! { greater_equal, ">=", TokenType::GreaterEqual }
match_literal! { less, "<", TokenType::Less }
match_literal! { less_equal, "<=", TokenType::LessEqual }
match_literal! { and, "and", TokenType::And }
match_literal! { array, "array", TokenType::Array }
match_literal! { auto, "auto", TokenType::Auto }
match_literal! { break_, "break", TokenType::Break }
match_literal! { continue_, "continue", TokenType::Continue }
match_literal! { else_, "else", TokenType::Else }
match_literal! { false_, "false", TokenType::False }
match_literal! { for_, "for", TokenType::For }
match_literal! { function, "function", TokenType::Function }
match_literal! { if_, "if", TokenType::If }
match_literal! { node, "node", TokenType::Node }
match_literal! { null, "null", TokenType::Null }
match_literal! { or, "or", TokenType::Or }
match_literal! { parent, "parent", TokenType::Parent }
match_literal! { return_, "return", TokenType::Return }
match_literal! { self_, "self", TokenType::SelfKw }
match_literal! { trait_, "trait", TokenType::Trait }
match_literal! { true_, "true", TokenType::True }
match_literal! { use_, "use", TokenType::Use }
match_literal! { while_, "while", TokenType::While }
match_literal! { with, "with", TokenType::With }

fn identifier(source: &str) -> Option<(TokenType, &str)> {
    let mut chars = source.chars();

    let first = chars.next()?;
    if !first.is_ascii_alphabetic() && first != '_' {
        return None;
    }

    let len = first.len_utf8()
        + chars
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .map(char::len_utf8)
            .sum::<usize>();

    Some((
        TokenType::Identifier(source[..len].to_string()),
        &source[len..],
    ))
}

fn string(source: &str) -> Option<(TokenType, &str)> {
    if !source.starts_with('"') {
        return None;
    }

    let end = source[1..].find('"')? + 1;
    Some((
        TokenType::String(source[1..end].to_string()),
        &source[end + 1..],
    ))
}

fn number(source: &str) -> Option<(TokenType, &str)> {
    let integer = source.chars().take_while(char::is_ascii_digit).count();
    if integer == 0 {
        return None;
    }

    let mut len = integer;
    let rest = &source[len..];
    if let Some(fraction) = rest.strip_prefix('.') {
        let digits = fraction.chars().take_while(char::is_ascii_digit).count();
        if digits > 0 {
            len += 1 + digits;
        }
    }

    let value = source[..len].parse().ok()?;
    Some((TokenType::Number(value), &source[len..]))
}

#[cfg(test)]
mod test {
    use super::*;

    fn types(source: &str) -> Vec<TokenType> {
        tokens(source)
            .unwrap()
            .into_iter()
            .map(|t| t.token_type)
            .collect()
    }

    #[test]
    fn test_tokens() {
        let source = "auto x = 1;";
        let expected = vec![
            TokenType::Auto,
            TokenType::Identifier("x".to_string()),
            TokenType::Equal,
            TokenType::Number(1.0),
            TokenType::Semicolon,
            TokenType::Eof,
        ];
        assert_eq!(types(source), expected);
    }

    #[test]
    fn test_tokens_with_comments() {
        let source = "auto x = 1; // comment\n/* block\ncomment */ x";
        let tokens = tokens(source).unwrap();
        assert_eq!(tokens.len(), 7);
        assert_eq!(tokens[5].token_type, TokenType::Identifier("x".to_string()));
        assert_eq!(tokens[5].line, 3);
    }

    #[test]
    fn test_tokens_with_string() {
        let source = "auto x = \"hello\";";
        assert_eq!(types(source)[3], TokenType::String("hello".to_string()));
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        assert_eq!(
            types("nodes selfish autos"),
            vec![
                TokenType::Identifier("nodes".to_string()),
                TokenType::Identifier("selfish".to_string()),
                TokenType::Identifier("autos".to_string()),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_compound_operators() {
        assert_eq!(
            types("a+=b--c++"),
            vec![
                TokenType::Identifier("a".to_string()),
                TokenType::PlusEqual,
                TokenType::Identifier("b".to_string()),
                TokenType::MinusMinus,
                TokenType::Identifier("c".to_string()),
                TokenType::PlusPlus,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_minus_is_not_part_of_number() {
        assert_eq!(
            types("x-1"),
            vec![
                TokenType::Identifier("x".to_string()),
                TokenType::Minus,
                TokenType::Number(1.0),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_number_with_trailing_dot() {
        assert_eq!(
            types("3.method"),
            vec![
                TokenType::Number(3.0),
                TokenType::Dot,
                TokenType::Identifier("method".to_string()),
                TokenType::Eof,
            ]
        );
        assert_eq!(types("2.5")[0], TokenType::Number(2.5));
    }

    #[test]
    fn test_errors_are_collected() {
        let errors = tokens("auto # = 1; @").unwrap_err();
        assert_eq!(errors.0.len(), 2);
        assert!(matches!(
            errors.0[0],
            TokenizeError::UnexpectedCharacter { character: '#', line: 1 }
        ));
    }

    #[test]
    fn test_unterminated_string() {
        let errors = tokens("auto s = \"open").unwrap_err();
        assert!(matches!(
            errors.0[0],
            TokenizeError::UnterminatedString { line: 1 }
        ));
    }
}
