use crate::expr::{Expr, Stmt};
use crate::scanner::{Literal, Token, TokenType};
use regex::Regex;
use std::sync::OnceLock;

/// Runtime support shared by every emitted program. Lox `+` needs a dynamic
/// dispatch between numbers and strings, classes need a tiny object model.
/// Helpers live outside the `lox:` prefix that every user binding gets.
const PRELUDE: &str = r#"(define lox-names (make-weak-key-hash-table))
(define (lox-named name proc)
  (hashq-set! lox-names proc name)
  proc)
(define (lox-class name super methods)
  (vector 'lox-class name super methods))
(define (lox-class? v)
  (and (vector? v) (eq? (vector-ref v 0) 'lox-class)))
(define (lox-instance class)
  (vector 'lox-instance class '()))
(define (lox-instance? v)
  (and (vector? v) (eq? (vector-ref v 0) 'lox-instance)))
(define (lox-find-method class name)
  (if (lox-class? class)
      (let ((method (assq name (vector-ref class 3))))
        (if method
            (cdr method)
            (lox-find-method (vector-ref class 2) name)))
      #f))
(define (lox-get object name)
  (if (not (lox-instance? object))
      (throw 'lox-runtime-error "Only instances have properties."))
  (let ((field (assq name (vector-ref object 2))))
    (if field
        (cdr field)
        (let ((method (lox-find-method (vector-ref object 1) name)))
          (if method
              (method object)
              (throw 'lox-runtime-error "Undefined property." name))))))
(define (lox-set! object name value)
  (if (not (lox-instance? object))
      (throw 'lox-runtime-error "Only instances have fields."))
  (let ((field (assq name (vector-ref object 2))))
    (if field
        (set-cdr! field value)
        (vector-set! object 2 (cons (cons name value) (vector-ref object 2))))
    value))
(define (lox-super super this name)
  (let ((method (lox-find-method super name)))
    (if method
        (method this)
        (throw 'lox-runtime-error "Undefined property." name))))
(define (lox-call callee . args)
  (if (lox-class? callee)
      (let ((instance (lox-instance callee))
            (init (lox-find-method callee 'init)))
        (if init (apply (init instance) args))
        instance)
      (apply callee args)))
(define (lox-equal? l r)
  (if (and (string? l) (string? r))
      (string=? l r)
      (eqv? l r)))
(define (lox-place-point digits point)
  (let* ((len (string-length digits))
         (padded (cond ((<= point 0)
                        (string-append "0" (make-string (- point) #\0) digits))
                       ((> point len)
                        (string-append digits (make-string (- point len) #\0)))
                       (else digits)))
         (split (if (<= point 0) 1 point))
         (whole (substring padded 0 split))
         (fraction (string-trim-right (substring padded split) #\0)))
    (if (string-null? fraction)
        whole
        (string-append whole "." fraction))))
(define (lox-number->string v)
  (cond ((nan? v) "NaN")
        ((inf? v) (if (> v 0) "inf" "-inf"))
        ((eqv? v -0.0) "-0")
        ((< v 0) (string-append "-" (lox-number->string (- v))))
        (else
         (let* ((text (number->string v))
                (e (string-index text #\e))
                (mantissa (if e (substring text 0 e) text))
                (exponent (if e (string->number (substring text (+ e 1))) 0))
                (dot (string-index mantissa #\.))
                (whole (if dot (substring mantissa 0 dot) mantissa)))
           (lox-place-point
            (string-append whole (if dot (substring mantissa (+ dot 1)) ""))
            (+ (string-length whole) exponent))))))
(define (lox-stringify v)
  (cond ((eq? v #nil) "nil")
        ((eq? v #t) "true")
        ((eq? v #f) "false")
        ((number? v) (lox-number->string v))
        ((lox-class? v) (vector-ref v 1))
        ((lox-instance? v)
         (string-append (vector-ref (vector-ref v 1) 1) " instance"))
        ((procedure? v) (or (hashq-ref lox-names v) "<fn>"))
        (else (format #f "~a" v))))
(define (lox-print v)
  (display (lox-stringify v))
  (newline))
(define (add l r)
  (cond ((and (number? l) (number? r))
         (+ l r))
        ((or (string? l) (string? r))
         (string-append (lox-stringify l) (lox-stringify r)))
        (else (throw 'lox-runtime-error "Operands must be two numbers or at least one string."))))
(define (lox-div l r)
  (if (and (number? r) (zero? r))
      (throw 'lox-runtime-error "Division by zero.")
      (/ l r)))
(define lox:clock
  (lox-named "<native fn>"
             (lambda ()
               (exact->inexact (/ (get-internal-real-time) internal-time-units-per-second)))))
"#;

/// Writes parenthesized text while tracking how many lists are still open.
/// Every `open` must be paired with a `close`; indentation follows the depth.
pub struct Emitter {
    out: String,
    depth: usize,
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Emitter {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            depth: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn open(&mut self, head: &str) {
        self.out.push('(');
        self.out.push_str(head);
        self.depth += 1;
    }

    pub fn close(&mut self) {
        debug_assert!(self.depth > 0, "closing a list that was never opened");
        if self.depth > 0 {
            self.out.push(')');
            self.depth -= 1;
        }
    }

    /// Closes lists until the depth is back to `depth`.
    pub fn close_to(&mut self, depth: usize) {
        while self.depth > depth {
            self.close();
        }
    }

    pub fn newline(&mut self) {
        self.out.push('\n');
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
    }

    pub fn write(&mut self, text: &str) {
        self.out.push_str(text);
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// Turns a resolved Lox program into Guile Scheme.
pub struct Transpiler {
    emitter: Emitter,
}

impl Default for Transpiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Transpiler {
    pub fn new() -> Self {
        Self {
            emitter: Emitter::new(),
        }
    }

    pub fn transpile(mut self, statements: &[Stmt]) -> String {
        self.emitter.write(PRELUDE);
        for statement in statements {
            self.statement(statement);
            self.emitter.newline();
        }
        debug_assert_eq!(self.emitter.depth(), 0);
        self.emitter.finish()
    }

    /// Same program, quoted and handed to Guile's pretty printer.
    pub fn pretty_print(self, statements: &[Stmt]) -> String {
        format!(
            "(use-modules (ice-9 pretty-print))\n(pretty-print\n'(begin\n{}))\n",
            self.transpile(statements)
        )
    }

    fn statement(&mut self, statement: &Stmt) {
        let top_level = self.emitter.depth() == 0;
        match statement {
            Stmt::Expression(expr) => {
                let expr = self.expr(expr);
                self.emitter.write(&expr);
            }
            Stmt::Print { value, .. } => {
                let value = self.expr(value);
                self.emitter.write(&format!("(lox-print {})", value));
            }
            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(expr) => self.expr(expr),
                    None => "#nil".to_string(),
                };
                if top_level {
                    self.emitter.write(&format!("(define {} {})", mangle(name), value));
                } else {
                    // stays open: the rest of the block is the let body
                    self.emitter.open(&format!("let (({} {}))", mangle(name), value));
                }
            }
            Stmt::Block { statements } => {
                self.emitter.open("let ()");
                self.body(statements);
                self.emitter.close();
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.expr(condition);
                self.emitter.open(&format!("if {}", condition));
                self.emitter.newline();
                self.statement(then_branch);
                self.emitter.newline();
                match else_branch {
                    Some(else_branch) => self.statement(else_branch),
                    None => self.emitter.write("#nil"),
                }
                self.emitter.close();
            }
            Stmt::While { condition, body } => {
                let start = self.emitter.depth();
                let condition = self.expr(condition);
                self.emitter.open("call/cc ");
                self.emitter.open("lambda (%break)");
                self.emitter.newline();
                self.emitter.open("let %loop ()");
                self.emitter.newline();
                self.emitter.open(&format!("if {}", condition));
                self.emitter.newline();
                self.emitter.open("begin");
                self.emitter.newline();
                self.statement(body);
                self.emitter.newline();
                self.emitter.write("(%loop)");
                self.emitter.close_to(start);
            }
            Stmt::Break { .. } => self.emitter.write("(%break #nil)"),
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.expr(expr),
                    None => "#nil".to_string(),
                };
                self.emitter.write(&format!("(%return {})", value));
            }
            Stmt::Function { name, params, body } => {
                let start = self.bind(name);
                self.lambda(name, params, body, false);
                self.unbind(start);
            }
            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                let start = self.bind(name);
                let superclass = match superclass {
                    Some(expr) => self.expr(expr),
                    None => "#nil".to_string(),
                };
                self.emitter.open(&format!("let ((%super {}))", superclass));
                self.emitter.newline();
                self.emitter.open(&format!("lox-class \"{}\" %super", name));
                self.emitter.newline();
                self.emitter.open("list");
                for method in methods {
                    if let Stmt::Function {
                        name: method_name,
                        params,
                        body,
                    } = method
                    {
                        self.emitter.newline();
                        self.emitter.open(&format!("cons '{} ", method_name));
                        self.emitter.open("lambda (this)");
                        self.emitter.newline();
                        self.lambda(
                            method_name,
                            params,
                            body,
                            method_name.lexeme.as_str() == "init",
                        );
                        self.emitter.close();
                        self.emitter.close();
                    }
                }
                // list, lox-class, let
                self.emitter.close();
                self.emitter.close();
                self.emitter.close();
                self.unbind(start);
            }
        }
    }

    /// Statements of one scope. Nested declarations open `let`/`letrec`
    /// forms that are all closed again here.
    fn body(&mut self, statements: &[Stmt]) {
        let start = self.emitter.depth();
        for statement in statements {
            self.emitter.newline();
            self.statement(statement);
        }
        if statements.is_empty() || self.emitter.depth() > start {
            self.emitter.newline();
            self.emitter.write("#nil");
        }
        self.emitter.close_to(start);
    }

    /// Opens a binding for a function or class value: `define` at top level,
    /// otherwise a `letrec` that scopes over the rest of the enclosing body.
    fn bind(&mut self, name: &Token) -> usize {
        let start = self.emitter.depth();
        if start == 0 {
            self.emitter.open(&format!("define {} ", mangle(name)));
        } else {
            self.emitter.open("letrec ");
            self.emitter.open("");
            self.emitter.open(&format!("{} ", mangle(name)));
        }
        start
    }

    fn unbind(&mut self, start: usize) {
        if start == 0 {
            self.emitter.close_to(0);
        } else {
            // the letrec itself stays open
            self.emitter.close_to(start + 1);
        }
    }

    /// A procedure registered under its display name, `<fn name>`.
    fn lambda(&mut self, name: &Token, params: &[Token], body: &[Stmt], initializer: bool) {
        let start = self.emitter.depth();
        let params: Vec<_> = params.iter().map(mangle).collect();
        self.emitter.open(&format!("lox-named \"<fn {}>\" ", name));
        self.emitter.open(&format!("lambda ({})", params.join(" ")));
        self.emitter.newline();
        if initializer {
            self.emitter.open("begin");
            self.emitter.newline();
        }
        let escape = self.emitter.depth();
        self.emitter.open("call/cc ");
        self.emitter.open("lambda (%return)");
        self.body(body);
        self.emitter.close_to(escape);
        if initializer {
            self.emitter.newline();
            self.emitter.write("this");
        }
        self.emitter.close_to(start);
    }

    fn expr(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::LiteralNode(literal) => literal_to_scheme(literal),
            Expr::Grouping(expr) => self.expr(expr),
            Expr::Unary { operator, right } => {
                let right = self.expr(right);
                match operator.token_type {
                    TokenType::MINUS => format!("(- {})", right),
                    _ => format!("(not {})", right),
                }
            }
            Expr::Binary {
                left,
                operator,
                right,
            } => {
                let op = match operator.token_type {
                    TokenType::EqualEqual => "lox-equal?",
                    TokenType::COMMA => "begin",
                    TokenType::PLUS => "add",
                    TokenType::SLASH => "lox-div",
                    _ => operator.lexeme.as_str(),
                };
                self.parenthesize(op, &[left, right])
            }
            Expr::Logical {
                left,
                operator,
                right,
            } => self.parenthesize(&operator.lexeme, &[left, right]),
            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
            } => self.parenthesize("if", &[condition, then_branch, else_branch]),
            Expr::Variable { name, .. } => mangle(name),
            Expr::Assign { name, value, .. } => {
                let name = mangle(name);
                format!("(begin (set! {} {}) {})", name, self.expr(value), name)
            }
            Expr::Call { callee, args, .. } => {
                let mut ret = format!("(lox-call {}", self.expr(callee));
                for arg in args {
                    ret.push(' ');
                    ret.push_str(&self.expr(arg));
                }
                ret.push(')');
                ret
            }
            Expr::Get { object, name } => format!("(lox-get {} '{})", self.expr(object), name),
            Expr::Set {
                object,
                name,
                value,
            } => format!(
                "(lox-set! {} '{} {})",
                self.expr(object),
                name,
                self.expr(value)
            ),
            Expr::This { .. } => "this".to_string(),
            Expr::Super { method, .. } => format!("(lox-super %super this '{})", method),
        }
    }

    fn parenthesize(&mut self, name: &str, exprs: &[&Expr]) -> String {
        let mut ret = format!("({}", name);
        for expr in exprs {
            ret.push(' ');
            ret.push_str(&self.expr(expr));
        }
        ret.push(')');
        ret
    }
}

/// Lox identifiers cannot contain `:`, so prefixed names never collide with
/// Scheme builtins or the prelude.
fn mangle(name: &Token) -> String {
    format!("lox:{}", name.lexeme)
}

fn literal_to_scheme(literal: &Literal) -> String {
    match literal {
        Literal::NIL => "#nil".to_string(),
        Literal::Boolean(true) => "#t".to_string(),
        Literal::Boolean(false) => "#f".to_string(),
        // Debug keeps the fraction (`1.0`), so Scheme reads an inexact number
        Literal::Number(n) if n.is_finite() => format!("{:?}", n),
        Literal::Number(n) if n.is_nan() => "+nan.0".to_string(),
        Literal::Number(n) if *n > 0.0 => "+inf.0".to_string(),
        Literal::Number(_) => "-inf.0".to_string(),
        Literal::String(s) => format!("\"{}\"", escape(s)),
    }
}

fn escape(text: &str) -> String {
    static SPECIAL: OnceLock<Regex> = OnceLock::new();
    SPECIAL
        .get_or_init(|| Regex::new(r#"[\\"]"#).expect("string escape pattern is valid"))
        .replace_all(text, "\\$0")
        .into_owned()
}
