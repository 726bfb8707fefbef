use crate::error::StaticError;
use crate::expr::{Expr, Stmt};
use crate::scanner::{Literal, Token, TokenType, TokenType::*};
use std::rc::Rc;

const MAX_ARGS: usize = 255;

/// Marker for an error that abandons the current declaration. The message has
/// already been recorded by the time this is returned.
#[derive(Debug)]
pub struct ParseError;

type ParseResult<T> = Result<T, ParseError>;

pub struct Parser<'a> {
    tokens: Vec<Token>,
    current: usize,
    errors: Vec<StaticError>,
    id: &'a mut usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, id: &'a mut usize) -> Self {
        Self {
            tokens,
            current: 0,
            errors: vec![],
            id,
        }
    }

    /// Parses every declaration, synchronizing after a syntax error so the
    /// rest of the program is still checked.
    pub fn parse(mut self) -> (Vec<Stmt>, Vec<StaticError>) {
        let mut stmts = vec![];
        while !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                stmts.push(stmt);
            }
        }
        (stmts, self.errors)
    }

    fn declaration(&mut self) -> Option<Stmt> {
        let res = if self.match_(&[CLASS]) {
            self.class_declaration()
        } else if self.match_(&[FUN]) {
            self.function("function")
        } else if self.match_(&[VAR]) {
            self.var_declaration()
        } else {
            self.statement()
        };
        match res {
            Ok(stmt) => Some(stmt),
            Err(ParseError) => {
                self.synchronize();
                None
            }
        }
    }

    fn class_declaration(&mut self) -> ParseResult<Stmt> {
        let name = self.consume(IDENTIFIER, "Expect class name.")?;
        let superclass = if self.match_(&[LESS]) {
            let name = self.consume(IDENTIFIER, "Expect superclass name.")?;
            Some(Expr::Variable {
                name,
                id: self.next_id(),
            })
        } else {
            None
        };
        self.consume(LeftBrace, "Expect '{' before class body.")?;
        let mut methods = vec![];
        while !self.check(RightBrace) && !self.is_at_end() {
            methods.push(self.function("method")?);
        }
        self.consume(RightBrace, "Expect '}' after class body.")?;
        Ok(Stmt::Class {
            name,
            superclass,
            methods,
        })
    }

    fn function(&mut self, kind: &str) -> ParseResult<Stmt> {
        let name = self.consume(IDENTIFIER, &format!("Expect {} name.", kind))?;
        self.consume(LeftParen, &format!("Expect '(' after {} name.", kind))?;
        let mut params = vec![];
        if !self.check(RightParen) {
            loop {
                if params.len() >= MAX_ARGS {
                    self.error(self.peek().clone(), "Can't have more than 255 parameters.");
                }
                params.push(self.consume(IDENTIFIER, "Expect parameter name.")?);
                if !self.match_(&[COMMA]) {
                    break;
                }
            }
        }
        self.consume(RightParen, "Expect ')' after parameters.")?;
        self.consume(LeftBrace, &format!("Expect '{{' before {} body.", kind))?;
        let body = self.block()?;
        Ok(Stmt::Function {
            name,
            params,
            body: Rc::new(body),
        })
    }

    fn var_declaration(&mut self) -> ParseResult<Stmt> {
        let name = self.consume(IDENTIFIER, "Expect variable name.")?;
        let initializer = if self.match_(&[EQUAL]) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(SEMICOLON, "Expect ';' after variable declaration.")?;
        Ok(Stmt::Var { name, initializer })
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        if self.match_(&[BREAK]) {
            let keyword = self.previous().clone();
            self.consume(SEMICOLON, "Expect ';' after 'break'.")?;
            Ok(Stmt::Break { keyword })
        } else if self.match_(&[FOR]) {
            self.for_statement()
        } else if self.match_(&[IF]) {
            self.if_statement()
        } else if self.match_(&[PRINT]) {
            self.print_statement()
        } else if self.match_(&[RETURN]) {
            self.return_statement()
        } else if self.match_(&[WHILE]) {
            self.while_statement()
        } else if self.match_(&[LeftBrace]) {
            Ok(Stmt::Block {
                statements: self.block()?,
            })
        } else {
            self.expression_statement()
        }
    }

    fn for_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(LeftParen, "Expect '(' after 'for'.")?;
        let initializer = if self.match_(&[SEMICOLON]) {
            None
        } else if self.match_(&[VAR]) {
            Some(self.var_declaration()?)
        } else {
            Some(self.expression_statement()?)
        };
        let condition = if self.check(SEMICOLON) {
            Expr::LiteralNode(Literal::Boolean(true))
        } else {
            self.expression()?
        };
        self.consume(SEMICOLON, "Expect ';' after loop condition.")?;
        let increment = if self.check(RightParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(RightParen, "Expect ')' after for clauses.")?;

        let mut body = self.statement()?;
        if let Some(increment) = increment {
            body = Stmt::Block {
                statements: vec![body, Stmt::Expression(increment)],
            };
        }
        body = Stmt::While {
            condition,
            body: Box::new(body),
        };
        if let Some(initializer) = initializer {
            body = Stmt::Block {
                statements: vec![initializer, body],
            };
        }
        Ok(body)
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(LeftParen, "Expect '(' after 'if'.")?;
        let condition = self.expression()?;
        self.consume(RightParen, "Expect ')' after if condition.")?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_(&[ELSE]) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn print_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.previous().clone();
        let value = self.expression()?;
        self.consume(SEMICOLON, "Expect ';' after value.")?;
        Ok(Stmt::Print { keyword, value })
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.previous().clone();
        let value = if self.check(SEMICOLON) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(SEMICOLON, "Expect ';' after return value.")?;
        Ok(Stmt::Return { keyword, value })
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(LeftParen, "Expect '(' after 'while'.")?;
        let condition = self.expression()?;
        self.consume(RightParen, "Expect ')' after condition.")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While { condition, body })
    }

    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut statements = vec![];
        while !self.check(RightBrace) && !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }
        self.consume(RightBrace, "Expect '}' after block.")?;
        Ok(statements)
    }

    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let expr = self.expression()?;
        self.consume(SEMICOLON, "Expect ';' after expression.")?;
        Ok(Stmt::Expression(expr))
    }

    fn expression(&mut self) -> ParseResult<Expr> {
        self.comma()
    }

    fn comma(&mut self) -> ParseResult<Expr> {
        let mut expr = self.assignment()?;
        while self.match_(&[COMMA]) {
            let operator = self.previous().clone();
            let right = self.assignment()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        let expr = self.ternary()?;
        if self.match_(&[EQUAL]) {
            let equals = self.previous().clone();
            let value = Box::new(self.assignment()?);
            return Ok(match expr {
                Expr::Variable { name, .. } => Expr::Assign {
                    name,
                    value,
                    id: self.next_id(),
                },
                Expr::Get { object, name } => Expr::Set {
                    object,
                    name,
                    value,
                },
                expr => {
                    self.error(equals, "Invalid assignment target.");
                    expr
                }
            });
        }
        Ok(expr)
    }

    fn ternary(&mut self) -> ParseResult<Expr> {
        let condition = self.or()?;
        if !self.match_(&[QUESTION]) {
            return Ok(condition);
        }
        let then_branch = self.expression()?;
        if !self.match_(&[COLON]) {
            return Err(self.error(
                self.peek().clone(),
                "Expect ':' after then branch of conditional expression.",
            ));
        }
        let else_branch = self.ternary()?;
        Ok(Expr::Ternary {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    fn or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.and()?;
        while self.match_(&[OR]) {
            let operator = self.previous().clone();
            let right = self.and()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.equality()?;
        while self.match_(&[AND]) {
            let operator = self.previous().clone();
            let right = self.equality()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    /// `a != b` comes out as `!(a == b)`, so later passes only ever see `==`.
    fn equality(&mut self) -> ParseResult<Expr> {
        let mut expr = self.comparison()?;
        while self.match_(&[BangEqual, EqualEqual]) {
            let operator = self.previous().clone();
            let right = self.comparison()?;
            if operator.token_type == EqualEqual {
                expr = Expr::Binary {
                    left: Box::new(expr),
                    operator,
                    right: Box::new(right),
                };
            } else {
                let line = operator.line;
                expr = Expr::Unary {
                    operator: Token::synthetic(BANG, "!", line),
                    right: Box::new(Expr::Binary {
                        left: Box::new(expr),
                        operator: Token::synthetic(EqualEqual, "==", line),
                        right: Box::new(right),
                    }),
                };
            }
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        self.binary(Self::term, &[GREATER, GreaterEqual, LESS, LessEqual])
    }

    fn term(&mut self) -> ParseResult<Expr> {
        self.binary(Self::factor, &[MINUS, PLUS])
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        self.binary(Self::unary, &[SLASH, STAR])
    }

    fn binary(
        &mut self,
        operand: fn(&mut Self) -> ParseResult<Expr>,
        operators: &[TokenType],
    ) -> ParseResult<Expr> {
        let mut expr = operand(self)?;
        while self.match_(operators) {
            let operator = self.previous().clone();
            let right = operand(self)?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if self.match_(&[BANG, MINUS]) {
            let operator = self.previous().clone();
            let right = self.unary()?;
            return Ok(Expr::Unary {
                operator,
                right: Box::new(right),
            });
        }
        self.call()
    }

    fn call(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.match_(&[LeftParen]) {
                expr = self.finish_call(expr)?;
            } else if self.match_(&[DOT]) {
                let name = self.consume(IDENTIFIER, "Expect property name after '.'.")?;
                expr = Expr::Get {
                    object: Box::new(expr),
                    name,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> ParseResult<Expr> {
        let mut args = vec![];
        if !self.check(RightParen) {
            loop {
                if args.len() >= MAX_ARGS {
                    self.error(self.peek().clone(), "Can't have more than 255 arguments.");
                }
                args.push(self.assignment()?);
                if !self.match_(&[COMMA]) {
                    break;
                }
            }
        }
        let paren = self.consume(RightParen, "Expect ')' after arguments.")?;
        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            args,
        })
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let token = self.peek().clone();
        let expr = match token.token_type {
            FALSE => Expr::LiteralNode(Literal::Boolean(false)),
            TRUE => Expr::LiteralNode(Literal::Boolean(true)),
            NIL => Expr::LiteralNode(Literal::NIL),
            STRING | NUMBER => Expr::LiteralNode(token.literal.clone().unwrap_or(Literal::NIL)),
            IDENTIFIER => Expr::Variable {
                name: token,
                id: self.next_id(),
            },
            THIS => Expr::This {
                keyword: token,
                id: self.next_id(),
            },
            SUPER => {
                self.advance();
                self.consume(DOT, "Expect '.' after 'super'.")?;
                let method = self.consume(IDENTIFIER, "Expect superclass method name.")?;
                return Ok(Expr::Super {
                    keyword: token,
                    method,
                    id: self.next_id(),
                });
            }
            LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(RightParen, "Expect ')' after expression.")?;
                return Ok(Expr::Grouping(Box::new(expr)));
            }
            _ => return Err(self.missing_operand()),
        };
        self.advance();
        Ok(expr)
    }

    /// Error productions for a binary operator with nothing on its left. The
    /// right operand is parsed and dropped so the report stays on the operator.
    fn missing_operand(&mut self) -> ParseError {
        let productions: [(&[TokenType], fn(&mut Self) -> ParseResult<Expr>); 4] = [
            (&[BangEqual, EqualEqual], Self::equality),
            (&[GREATER, GreaterEqual, LESS, LessEqual], Self::comparison),
            (&[PLUS], Self::term),
            (&[SLASH, STAR], Self::factor),
        ];
        for (operators, operand) in productions {
            if self.match_(operators) {
                let operator = self.previous().clone();
                let err = self.error(operator, "Missing left-hand operand.");
                let _ = operand(self);
                return err;
            }
        }
        self.error(self.peek().clone(), "Expect expression.")
    }

    fn next_id(&mut self) -> usize {
        *self.id += 1;
        *self.id
    }

    fn match_(&mut self, types: &[TokenType]) -> bool {
        if types.iter().any(|&type_| self.check(type_)) {
            self.advance();
            return true;
        }
        false
    }

    fn consume(&mut self, type_: TokenType, msg: &str) -> ParseResult<Token> {
        if self.check(type_) {
            return Ok(self.advance().clone());
        }
        Err(self.error(self.peek().clone(), msg))
    }

    fn check(&self, type_: TokenType) -> bool {
        !self.is_at_end() && self.peek().token_type == type_
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == EOF
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn error(&mut self, token: Token, msg: &str) -> ParseError {
        self.errors.push(StaticError::at(&token, msg));
        ParseError
    }

    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if let SEMICOLON = self.previous().token_type {
                return;
            }
            match self.peek().token_type {
                CLASS | FUN | VAR | FOR | IF | WHILE | PRINT | RETURN => return,
                _ => {}
            }
            self.advance();
        }
    }
}
