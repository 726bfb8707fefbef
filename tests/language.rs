use lox_scheme::error::LoxError;
use lox_scheme::Lox;
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

#[derive(Clone, Default)]
struct Captured(Rc<RefCell<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.borrow())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

/// Runs `source` and returns its printed lines alongside the outcome.
fn run(source: &str) -> (Vec<String>, Result<(), LoxError>) {
    let out = Captured::default();
    let mut lox = Lox::with_output(Box::new(out.clone()));
    let result = lox.run(source);
    (out.lines(), result)
}

fn assert_prints(source: &str, expected: &[&str]) {
    let (lines, result) = run(source);
    if let Err(e) = result {
        panic!("{}\nfailed with:\n{}", source, e);
    }
    assert_eq!(lines, expected);
}

fn runtime_error(source: &str) -> String {
    match run(source).1 {
        Err(LoxError::Runtime(e)) => e.msg,
        other => panic!("expected a runtime error from {}, got {:?}", source, other),
    }
}

fn static_errors(source: &str) -> Vec<String> {
    match run(source).1 {
        Err(LoxError::Static(errors)) => errors.iter().map(ToString::to_string).collect(),
        other => panic!("expected static errors from {}, got {:?}", source, other),
    }
}

#[test]
fn inner_blocks_shadow_and_restore() {
    assert_prints(
        "var a = 1; { var a = 2; print a; } print a;",
        &["2", "1"],
    );
}

#[test]
fn closures_capture_their_defining_environment() {
    assert_prints(
        r#"
        var a = "global";
        {
          fun show() { print a; }
          show();
          var a = "block";
          show();
        }
        "#,
        &["global", "global"],
    );
}

#[test]
fn counters_keep_independent_state() {
    assert_prints(
        r#"
        fun makeCounter() {
          var count = 0;
          fun inc() { count = count + 1; return count; }
          return inc;
        }
        var c = makeCounter();
        print c(); print c(); print c();
        var d = makeCounter();
        print d();
        "#,
        &["1", "2", "3", "1"],
    );
}

#[test]
fn for_loop_closures_share_the_loop_variable() {
    assert_prints(
        r#"
        var fs;
        for (var i = 0; i < 2; i = i + 1) {
          fun f() { print i; }
          if (i == 0) fs = f;
        }
        fs();
        "#,
        &["2"],
    );
    assert_prints(
        r#"
        var first;
        for (var i = 0; i < 2; i = i + 1) {
          var j = i;
          fun g() { print j; }
          if (i == 0) first = g;
        }
        first();
        "#,
        &["0"],
    );
}

#[test]
fn break_leaves_only_the_nearest_loop() {
    assert_prints(
        r#"
        for (var i = 0; i < 3; i = i + 1) {
          var j = 0;
          while (true) {
            if (j == 2) break;
            j = j + 1;
          }
          print i + j;
        }
        "#,
        &["2", "3", "4"],
    );
}

#[test]
fn return_unwinds_through_loops() {
    assert_prints(
        r#"
        fun find(limit) {
          for (var i = 0; ; i = i + 1) {
            if (i * i > limit) return i;
          }
        }
        print find(10);
        fun nothing() { return; }
        print nothing();
        "#,
        &["4", "nil"],
    );
}

#[test]
fn ternary_and_comma_operators() {
    assert_prints(
        r#"
        print true ? "yes" : "no";
        print nil ? 1 : false ? 2 : 3;
        var x = (1, 2, 3);
        print x;
        print 1 != 2;
        print !(1 == 1);
        "#,
        &["yes", "3", "3", "true", "false"],
    );
}

#[test]
fn logical_operators_return_operands() {
    assert_prints(
        r#"print nil or "default"; print 0 and "zero is truthy"; print false and undefined;"#,
        &["default", "zero is truthy", "false"],
    );
}

#[test]
fn arithmetic_and_concatenation() {
    assert_prints(
        r#"print 1 + 2; print "a" + 1; print 2.5 * 2; print 7 / 2; print "n=" + nil; print -(3 - 5);"#,
        &["3", "a1", "5", "3.5", "n=nil", "2"],
    );
}

#[test]
fn classes_fields_and_methods() {
    assert_prints(
        r#"
        class Point {
          init(x, y) { this.x = x; this.y = y; }
          sum() { return this.x + this.y; }
        }
        var p = Point(1, 2);
        print p.sum();
        p.x = 10;
        print p.sum();
        var m = p.sum;
        print m();
        print p;
        print Point;
        print m;
        print clock;
        "#,
        &["3", "12", "12", "Point instance", "Point", "<fn sum>", "<native fn>"],
    );
}

#[test]
fn init_returns_the_instance() {
    assert_prints(
        r#"
        class A {
          init() { this.n = 1; return; }
        }
        var a = A();
        print a.init() == a;
        print a.n;
        "#,
        &["true", "1"],
    );
}

#[test]
fn subclasses_override_and_call_super() {
    assert_prints(
        r#"
        class Animal {
          init(name) { this.name = name; }
          speak() { return this.name + " makes a sound"; }
        }
        class Dog < Animal {
          speak() { return super.speak() + ", woof"; }
        }
        class Puppy < Dog {
          init(name) { super.init(name + " jr"); }
        }
        print Dog("Rex").speak();
        print Puppy("Rex").speak();
        "#,
        &["Rex makes a sound, woof", "Rex jr makes a sound, woof"],
    );
}

#[test]
fn identity_equality_for_objects() {
    assert_prints(
        r#"
        class A {}
        var a = A();
        var b = A();
        print a == a;
        print a == b;
        print "s" == "s";
        print nil == false;
        "#,
        &["true", "false", "true", "false"],
    );
}

#[test]
fn runtime_errors_are_distinct() {
    assert_eq!(runtime_error("print true + 1;"), "Operands must be two numbers or at least one string.");
    assert_eq!(runtime_error("print 5 / 0;"), "Division by zero.");
    assert_eq!(runtime_error("print 1 < \"a\";"), "Operands must be numbers.");
    assert_eq!(runtime_error("print -\"a\";"), "Operand must be a number.");
    assert_eq!(runtime_error("print missing;"), "Undefined variable 'missing'.");
    assert_eq!(runtime_error("missing = 1;"), "Undefined variable 'missing'.");
    assert_eq!(runtime_error("fun f(a, b) {} f(1);"), "Expected 2 arguments but got 1.");
    assert_eq!(runtime_error("\"text\"();"), "Can only call functions and classes.");
    assert_eq!(runtime_error("class A {} print A().nope;"), "Undefined property 'nope'.");
    assert_eq!(runtime_error("var x = 1; x.y = 2;"), "Only instances have fields.");
    assert_eq!(runtime_error("var NotClass = 1; class B < NotClass {}"), "Superclass must be a class.");
    assert_eq!(runtime_error("fun f() { f(); } f();"), "Stack overflow.");
}

#[test]
fn runtime_error_stops_the_run_after_earlier_output() {
    let (lines, result) = run("print 1; print nil + 1; print 2;");
    assert_eq!(lines, vec!["1"]);
    let err = result.expect_err("second print fails");
    assert_eq!(err.exit_code(), 70);
    assert_eq!(err.to_string(), "Operands must be two numbers or at least one string.\n[line 1]");
}

#[test]
fn static_errors_are_collected_and_block_execution() {
    let (lines, result) = run("print 1;\nvar = 2;\nprint 3\nprint 4;");
    assert!(lines.is_empty());
    let err = result.expect_err("syntax errors");
    assert_eq!(err.exit_code(), 65);
    match err {
        LoxError::Static(errors) => assert_eq!(errors.len(), 2),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(
        static_errors("+ 1;"),
        vec!["[line 1] Error at '+': Missing left-hand operand."]
    );
    assert_eq!(
        static_errors("fun f() { return; }\nreturn 1;"),
        vec!["[line 2] Error at 'return': Can't return from top-level code."]
    );
    // the scanner error comes before the parser's complaint on the same line
    assert_eq!(
        static_errors("print \"open")[0],
        "[line 1] Error: Unterminated string."
    );
}

#[test]
fn globals_persist_between_runs() {
    let out = Captured::default();
    let mut lox = Lox::with_output(Box::new(out.clone()));
    lox.run("var count = 1; fun bump() { count = count + 1; }").expect("defines");
    assert!(lox.run("print undefined;").is_err());
    lox.run("{ var local = 5; bump(); }").expect("runs");
    lox.run("print count;").expect("prints");
    assert_eq!(out.lines(), vec!["2"]);
}

#[test]
fn transpiled_programs_are_balanced() {
    let corpus = [
        "print 1 + 2;",
        "var a = \"(\"; { var b = a + \")\"; print b; }",
        "fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } print fib(10);",
        "for (var i = 0; i < 3; i = i + 1) { if (i == 1) break; print i; }",
        "class A { init(x) { this.x = x; } get() { return this.x; } } \
         class B < A { get() { return super.get() * 2; } } print B(2).get();",
        "{ fun local() { var z = 1; return z; } class C {} print local(); }",
    ];
    for source in corpus {
        for pretty in [false, true] {
            let scheme = Lox::new().transpile(source, pretty).expect("transpiles");
            let mut depth = 0i64;
            let mut in_string = false;
            let mut escaped = false;
            for ch in scheme.chars() {
                if in_string {
                    match ch {
                        _ if escaped => escaped = false,
                        '\\' => escaped = true,
                        '"' => in_string = false,
                        _ => {}
                    }
                    continue;
                }
                match ch {
                    '"' => in_string = true,
                    '(' => depth += 1,
                    ')' => depth -= 1,
                    _ => {}
                }
                assert!(depth >= 0, "{}", scheme);
            }
            assert_eq!(depth, 0, "{}", scheme);
        }
    }
}

#[test]
fn transpiling_rejects_static_errors() {
    let err = Lox::new().transpile("break;", false).expect_err("resolver error");
    assert_eq!(err.exit_code(), 65);
}

#[test]
fn transpiled_user_functions_do_not_capture_helpers() {
    let scheme = Lox::new()
        .transpile("fun add(a, b) { return a + b; } print add(1, 2);", false)
        .expect("transpiles");
    assert!(scheme.contains("(define lox:add "));
    assert!(scheme.contains("(%return (add lox:a lox:b))"));
    assert!(scheme.contains("(lox-print (lox-call lox:add 1.0 2.0))"));
}
