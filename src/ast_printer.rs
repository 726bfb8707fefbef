use crate::expr::{Expr, Stmt};

/// One parenthesized line per top-level statement.
pub fn print_stmts(stmts: &[Stmt]) -> String {
    stmts
        .iter()
        .map(|stmt| print_stmt(stmt) + "\n")
        .collect()
}

pub fn print_stmt(stmt: &Stmt) -> String {
    match stmt {
        Stmt::Expression(expr) => print_ast(expr),
        Stmt::Print { value, .. } => parenthesize("print", &[print_ast(value)]),
        Stmt::Var { name, initializer } => {
            let mut parts = vec![name.to_string()];
            parts.extend(initializer.iter().map(print_ast));
            parenthesize("var", &parts)
        }
        Stmt::Block { statements } => {
            parenthesize("block", &statements.iter().map(print_stmt).collect::<Vec<_>>())
        }
        Stmt::If {
            condition,
            then_branch,
            else_branch,
        } => {
            let mut parts = vec![print_ast(condition), print_stmt(then_branch)];
            parts.extend(else_branch.iter().map(|stmt| print_stmt(stmt)));
            parenthesize("if", &parts)
        }
        Stmt::While { condition, body } => {
            parenthesize("while", &[print_ast(condition), print_stmt(body)])
        }
        Stmt::Break { .. } => "(break)".to_string(),
        Stmt::Function { name, params, body } => {
            let params = params.iter().map(|p| p.to_string()).collect::<Vec<_>>();
            let body = body.iter().map(print_stmt).collect::<Vec<_>>();
            format!("(fun {} ({}) ({}))", name, params.join(" "), body.join(" "))
        }
        Stmt::Return { value, .. } => {
            parenthesize("return", &value.iter().map(print_ast).collect::<Vec<_>>())
        }
        Stmt::Class {
            name,
            superclass,
            methods,
        } => {
            let mut parts = vec![name.to_string()];
            if let Some(superclass) = superclass {
                parts.push(format!("< {}", print_ast(superclass)));
            }
            parts.extend(methods.iter().map(print_stmt));
            parenthesize("class", &parts)
        }
    }
}

pub fn print_ast(expr: &Expr) -> String {
    match expr {
        Expr::Binary {
            left,
            operator,
            right,
        }
        | Expr::Logical {
            left,
            operator,
            right,
        } => parenthesize(&operator.lexeme, &[print_ast(left), print_ast(right)]),
        Expr::Grouping(expression) => parenthesize("group", &[print_ast(expression)]),
        Expr::LiteralNode(val) => val.to_string(),
        Expr::Unary { operator, right } => parenthesize(&operator.lexeme, &[print_ast(right)]),
        Expr::Ternary {
            condition,
            then_branch,
            else_branch,
        } => parenthesize(
            "?:",
            &[
                print_ast(condition),
                print_ast(then_branch),
                print_ast(else_branch),
            ],
        ),
        Expr::Variable { name, .. } => name.to_string(),
        Expr::Assign { name, value, .. } => parenthesize("=", &[name.to_string(), print_ast(value)]),
        Expr::Call { callee, args, .. } => {
            let mut parts = vec![print_ast(callee)];
            parts.extend(args.iter().map(print_ast));
            parenthesize("call", &parts)
        }
        Expr::Get { object, name } => parenthesize("get", &[print_ast(object), name.to_string()]),
        Expr::Set {
            object,
            name,
            value,
        } => parenthesize(
            "set",
            &[print_ast(object), name.to_string(), print_ast(value)],
        ),
        Expr::This { .. } => "this".to_string(),
        Expr::Super { method, .. } => parenthesize("super", &[method.to_string()]),
    }
}

fn parenthesize(name: &str, parts: &[String]) -> String {
    let mut ret = format!("({}", name);
    for part in parts {
        ret.push(' ');
        ret.push_str(part);
    }
    ret.push(')');
    ret
}

#[cfg(test)]
#[test]
fn test_ast_printer() {
    use crate::scanner::*;
    use crate::expr::Expr::*;
    let exp = Binary {
        left: Box::new(Unary {
            operator: Token::synthetic(TokenType::MINUS, "-", 1),
            right: Box::new(LiteralNode(Literal::Number(123f64))),
        }),
        operator: Token::synthetic(TokenType::STAR, "*", 1),
        right: Box::new(Grouping(Box::new(LiteralNode(Literal::Number(45.67))))),
    };
    assert_eq!(print_ast(&exp), "(* (- 123) (group 45.67))");
}
