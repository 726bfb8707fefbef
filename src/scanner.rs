use crate::error::StaticError;
use phf::phf_map;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use TokenType::*;

static KEYWORDS: phf::Map<&'static str, TokenType> = phf_map! {
    "and" => AND,
    "break" => BREAK,
    "class" => CLASS,
    "else" => ELSE,
    "false" => FALSE,
    "for" => FOR,
    "fun" => FUN,
    "if" => IF,
    "nil" => NIL,
    "or" => OR,
    "print" => PRINT,
    "return" => RETURN,
    "super" => SUPER,
    "this" => THIS,
    "true" => TRUE,
    "var" => VAR,
    "while" => WHILE,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenType {
    // Single-character tokens.
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    COMMA,
    DOT,
    MINUS,
    PLUS,
    SEMICOLON,
    SLASH,
    STAR,
    QUESTION,
    COLON,

    // One or two character tokens.
    BANG,
    BangEqual,
    EQUAL,
    EqualEqual,
    GREATER,
    GreaterEqual,
    LESS,
    LessEqual,

    // Literals.
    IDENTIFIER,
    STRING,
    NUMBER,

    // Keywords.
    AND,
    BREAK,
    CLASS,
    ELSE,
    FALSE,
    FUN,
    FOR,
    IF,
    NIL,
    OR,
    PRINT,
    RETURN,
    SUPER,
    THIS,
    TRUE,
    VAR,
    WHILE,
    EOF,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: Arc<String>,
    pub literal: Option<Literal>,
    pub line: usize,
}

impl Token {
    /// A token that never came from source text, e.g. the `!` wrapped around
    /// a desugared `!=`.
    pub fn synthetic(token_type: TokenType, lexeme: &str, line: usize) -> Self {
        Self {
            token_type,
            lexeme: Arc::new(lexeme.to_owned()),
            literal: None,
            line,
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.lexeme)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(Arc<String>),
    Number(f64),
    NIL,
    Boolean(bool),
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(ref s) => write!(f, "{}", s),
            Self::Number(s) => write!(f, "{}", s),
            Self::NIL => write!(f, "nil"),
            Self::Boolean(s) => write!(f, "{}", s),
        }
    }
}

pub struct Scanner {
    source: Vec<char>,
    tokens: Vec<Token>,
    errors: Vec<StaticError>,
    start: usize,
    current: usize,
    line: usize,
}

impl Scanner {
    pub fn new(source: &str) -> Scanner {
        Scanner {
            source: source.chars().collect(),
            tokens: Vec::new(),
            errors: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.source.get(self.current).copied();
        self.current += 1;
        ch
    }

    /// Scans the whole source. Bad characters and unterminated strings are
    /// recorded and skipped so one pass reports every lexical error.
    pub fn scan_tokens(mut self) -> (Vec<Token>, Vec<StaticError>) {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token();
        }
        self.tokens.push(Token::synthetic(EOF, "", self.line));
        (self.tokens, self.errors)
    }

    fn scan_token(&mut self) {
        let Some(ch) = self.advance() else {
            return;
        };
        let token = match ch {
            '(' => Some(LeftParen),
            ')' => Some(RightParen),
            '{' => Some(LeftBrace),
            '}' => Some(RightBrace),
            ',' => Some(COMMA),
            '.' => Some(DOT),
            '-' => Some(MINUS),
            '+' => Some(PLUS),
            ';' => Some(SEMICOLON),
            '*' => Some(STAR),
            '?' => Some(QUESTION),
            ':' => Some(COLON),
            '!' => Some(if self.match_char('=') {
                BangEqual
            } else {
                BANG
            }),
            '=' => Some(if self.match_char('=') {
                EqualEqual
            } else {
                EQUAL
            }),
            '<' => Some(if self.match_char('=') {
                LessEqual
            } else {
                LESS
            }),
            '>' => Some(if self.match_char('=') {
                GreaterEqual
            } else {
                GREATER
            }),
            '/' => {
                if self.match_char('/') {
                    while self.peek().filter(|&x| x != '\n').is_some() {
                        self.advance();
                    }
                    None
                } else if self.match_char('*') {
                    self.block_comment();
                    None
                } else {
                    Some(SLASH)
                }
            }
            ' ' | '\r' | '\t' => None,
            '\n' => {
                self.line += 1;
                None
            }
            '"' => {
                self.string();
                None
            }
            ch if ch.is_ascii_digit() => {
                self.number();
                None
            }
            ch if ch.is_ascii_alphabetic() || ch == '_' => {
                self.identifier();
                None
            }
            _ => {
                self.errors
                    .push(StaticError::on_line(self.line, "Unexpected character."));
                None
            }
        };
        if let Some(token) = token {
            self.add_token(token, None);
        }
    }

    fn block_comment(&mut self) {
        while !self.is_at_end() {
            match (self.peek(), self.peek_next()) {
                (Some('*'), Some('/')) => {
                    self.advance();
                    self.advance();
                    return;
                }
                (Some('\n'), _) => {
                    self.line += 1;
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn identifier(&mut self) {
        while let Some(ch) = self.peek() {
            if !(ch.is_ascii_alphanumeric() || ch == '_') {
                break;
            }
            self.advance();
        }
        let txt = self.text(self.start, self.current);
        let token_type = KEYWORDS.get(txt.as_str()).copied().unwrap_or(IDENTIFIER);
        self.add_token(token_type, None)
    }

    fn number(&mut self) {
        while self.peek().filter(char::is_ascii_digit).is_some() {
            self.advance();
        }

        if let (Some('.'), Some(next)) = (self.peek(), self.peek_next()) {
            if next.is_ascii_digit() {
                self.advance();
                while self.peek().filter(char::is_ascii_digit).is_some() {
                    self.advance();
                }
            }
        }
        match self.text(self.start, self.current).parse::<f64>() {
            Ok(val) => self.add_token(NUMBER, Some(Literal::Number(val))),
            Err(_) => self
                .errors
                .push(StaticError::on_line(self.line, "Invalid number literal.")),
        }
    }

    fn string(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '"' {
                break;
            }
            if ch == '\n' {
                self.line += 1;
            }
            self.advance();
        }
        if self.is_at_end() {
            self.errors
                .push(StaticError::on_line(self.line, "Unterminated string."));
            return;
        }
        // closing quote
        self.advance();
        let val = self.text(self.start + 1, self.current - 1);
        self.add_token(STRING, Some(Literal::String(Arc::new(val))));
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.current).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.source.get(self.current + 1).copied()
    }

    fn match_char(&mut self, expected_char: char) -> bool {
        if self.peek() != Some(expected_char) {
            return false;
        }
        self.current += 1;
        true
    }

    fn text(&self, from: usize, to: usize) -> String {
        self.source[from..to].iter().collect()
    }

    fn add_token(&mut self, token_type: TokenType, literal: Option<Literal>) {
        let lexeme = self.text(self.start, self.current);
        self.tokens.push(Token {
            token_type,
            lexeme: Arc::new(lexeme),
            literal,
            line: self.line,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn types(source: &str) -> Vec<TokenType> {
        let (tokens, errors) = Scanner::new(source).scan_tokens();
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        tokens.into_iter().map(|t| t.token_type).collect()
    }

    #[test]
    fn two_character_operators_take_one_lookahead() {
        assert_eq!(
            types("! != = == < <= > >= ? :"),
            vec![
                BANG,
                BangEqual,
                EQUAL,
                EqualEqual,
                LESS,
                LessEqual,
                GREATER,
                GreaterEqual,
                QUESTION,
                COLON,
                EOF
            ]
        );
    }

    #[test]
    fn keywords_identifiers_and_literals() {
        let (tokens, _) = Scanner::new("var _count1 = 12.5; print \"hi\";").scan_tokens();
        assert_eq!(tokens[0].token_type, VAR);
        assert_eq!(tokens[1].token_type, IDENTIFIER);
        assert_eq!(&*tokens[1].lexeme, "_count1");
        assert_eq!(tokens[3].literal, Some(Literal::Number(12.5)));
        assert_eq!(tokens[5].token_type, PRINT);
        assert_eq!(
            tokens[6].literal,
            Some(Literal::String(Arc::new("hi".to_string())))
        );
        assert_eq!(&*tokens[6].lexeme, "\"hi\"");
    }

    #[test]
    fn a_dot_without_digits_is_not_part_of_the_number() {
        assert_eq!(types("1.foo"), vec![NUMBER, DOT, IDENTIFIER, EOF]);
    }

    #[test]
    fn comments_are_skipped_and_lines_counted() {
        let source = "// one\n/* two\nthree */ a\n\"multi\nline\" b";
        let (tokens, errors) = Scanner::new(source).scan_tokens();
        assert!(errors.is_empty());
        assert_eq!(tokens[0].line, 3);
        assert_eq!(tokens[1].token_type, STRING);
        assert_eq!(tokens[2].line, 5);
        assert_eq!(tokens[3].token_type, EOF);
    }

    #[test]
    fn errors_do_not_stop_the_scan() {
        let (tokens, errors) = Scanner::new("a @ b\n# c \"open").scan_tokens();
        let lexemes: Vec<_> = tokens.iter().map(|t| t.lexeme.to_string()).collect();
        assert_eq!(lexemes, vec!["a", "b", "c", ""]);
        assert_eq!(
            errors,
            vec![
                StaticError::on_line(1, "Unexpected character."),
                StaticError::on_line(2, "Unexpected character."),
                StaticError::on_line(2, "Unterminated string."),
            ]
        );
    }

    #[test]
    fn scanning_is_deterministic() {
        let source = "class A < B { init(x) { this.x = x; } }";
        let (first, _) = Scanner::new(source).scan_tokens();
        let (second, _) = Scanner::new(source).scan_tokens();
        assert_eq!(first, second);
    }
}
