//! Evaluator: runs parsed statements and expressions against a namespace,
//! writing `print`/`eprint` output into the per-run captured streams.

use super::parser::{self, BinOp, Expr, Stmt, UnaryOp};
use super::{Builtin, Captured, Namespace, ScriptError, Value};

/// Run `code` as a sequence of statements. Assignments mutate the namespace;
/// mutations made before a failure are kept.
pub fn run_statements(
    code: &str,
    ns: &mut Namespace,
    out: &mut Captured,
) -> Result<(), ScriptError> {
    let program = parser::parse_program(code)?;
    for stmt in program {
        match stmt {
            Stmt::Assign { name, value } => {
                let value = eval_expr(&value, ns, out)?;
                ns.set(name, value);
            }
            Stmt::Expr(expr) => {
                eval_expr(&expr, ns, out)?;
            }
        }
    }
    Ok(())
}

/// Evaluate `code` as a single expression and return the produced value.
pub fn eval_expression(
    code: &str,
    ns: &mut Namespace,
    out: &mut Captured,
) -> Result<Value, ScriptError> {
    let expr = parser::parse_expression(code)?;
    eval_expr(&expr, ns, out)
}

fn eval_expr(expr: &Expr, ns: &Namespace, out: &mut Captured) -> Result<Value, ScriptError> {
    match expr {
        Expr::Int(v) => Ok(Value::Int(*v)),
        Expr::Float(v) => Ok(Value::Float(*v)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Unit),
        Expr::Name(name) => ns
            .get(name)
            .cloned()
            .ok_or_else(|| ScriptError::UndefinedName(name.clone())),
        Expr::Unary { op, operand } => {
            let value = eval_expr(operand, ns, out)?;
            unary(*op, value)
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs = eval_expr(lhs, ns, out)?;
            let rhs = eval_expr(rhs, ns, out)?;
            binary(*op, lhs, rhs)
        }
        Expr::Attr { object, name } => {
            let object = eval_expr(object, ns, out)?;
            match object {
                Value::Host(h) => h.attr(name),
                other => Err(ScriptError::UnknownAttr {
                    object: other.type_name().to_string(),
                    attr: name.clone(),
                }),
            }
        }
        Expr::Call { callee, args } => {
            let mut argv = Vec::with_capacity(args.len());
            for arg in args {
                argv.push(eval_expr(arg, ns, out)?);
            }
            // method calls dispatch on the host object, not on an attribute value
            if let Expr::Attr { object, name } = callee.as_ref() {
                let object = eval_expr(object, ns, out)?;
                return match object {
                    Value::Host(h) => h.call(name, &argv),
                    other => Err(ScriptError::UnknownAttr {
                        object: other.type_name().to_string(),
                        attr: name.clone(),
                    }),
                };
            }
            let callee = eval_expr(callee, ns, out)?;
            match callee {
                Value::Builtin(builtin) => call_builtin(builtin, &argv, out),
                Value::Host(h) => h.invoke(&argv),
                other => Err(ScriptError::NotCallable(other.type_name().to_string())),
            }
        }
    }
}

fn call_builtin(
    builtin: Builtin,
    args: &[Value],
    out: &mut Captured,
) -> Result<Value, ScriptError> {
    match builtin {
        Builtin::Print => {
            write_joined(&mut out.stdout, args);
            Ok(Value::Unit)
        }
        Builtin::EPrint => {
            write_joined(&mut out.stderr, args);
            Ok(Value::Unit)
        }
        Builtin::Str => {
            let arg = single(builtin, args)?;
            Ok(Value::Str(arg.to_string()))
        }
        Builtin::Len => {
            let arg = single(builtin, args)?;
            match arg {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::Host(h) => h.call("len", &[]),
                other => Err(ScriptError::Type(format!(
                    "len expects a string or host object, got {}",
                    other.type_name()
                ))),
            }
        }
        Builtin::Type => {
            let arg = single(builtin, args)?;
            Ok(Value::Str(arg.type_name().to_string()))
        }
    }
}

fn single(builtin: Builtin, args: &[Value]) -> Result<&Value, ScriptError> {
    match args {
        [arg] => Ok(arg),
        _ => Err(ScriptError::Arity {
            name: builtin.name(),
            expected: 1,
            got: args.len(),
        }),
    }
}

fn write_joined(sink: &mut String, args: &[Value]) {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            sink.push(' ');
        }
        sink.push_str(&arg.to_string());
    }
    sink.push('\n');
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, ScriptError> {
    match (op, value) {
        (UnaryOp::Neg, Value::Int(v)) => v
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| ScriptError::Type("integer overflow".to_string())),
        (UnaryOp::Neg, Value::Float(v)) => Ok(Value::Float(-v)),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Neg, other) => Err(ScriptError::Type(format!(
            "cannot negate {}",
            other.type_name()
        ))),
        (UnaryOp::Not, other) => Err(ScriptError::Type(format!(
            "'!' expects a bool, got {}",
            other.type_name()
        ))),
    }
}

fn binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, ScriptError> {
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => arith(op, lhs, rhs),
        BinOp::Eq => Ok(Value::Bool(lhs == rhs)),
        BinOp::Ne => Ok(Value::Bool(lhs != rhs)),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => compare(op, lhs, rhs),
    }
}

fn op_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Rem => "%",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
    }
}

fn arith(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, ScriptError> {
    match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => int_arith(op, *a, *b),
        (Value::Float(a), Value::Float(b)) => float_arith(op, *a, *b),
        (Value::Int(a), Value::Float(b)) => float_arith(op, *a as f64, *b),
        (Value::Float(a), Value::Int(b)) => float_arith(op, *a, *b as f64),
        (Value::Str(a), Value::Str(b)) if op == BinOp::Add => {
            Ok(Value::Str(format!("{}{}", a, b)))
        }
        _ => Err(ScriptError::Type(format!(
            "cannot apply '{}' to {} and {}",
            op_symbol(op),
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

fn int_arith(op: BinOp, a: i64, b: i64) -> Result<Value, ScriptError> {
    if matches!(op, BinOp::Div | BinOp::Rem) && b == 0 {
        return Err(ScriptError::DivisionByZero);
    }
    let out = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div => a.checked_div(b),
        BinOp::Rem => a.checked_rem(b),
        _ => None,
    };
    out.map(Value::Int)
        .ok_or_else(|| ScriptError::Type("integer overflow".to_string()))
}

fn float_arith(op: BinOp, a: f64, b: f64) -> Result<Value, ScriptError> {
    if matches!(op, BinOp::Div | BinOp::Rem) && b == 0.0 {
        return Err(ScriptError::DivisionByZero);
    }
    let out = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Rem => a % b,
        _ => {
            return Err(ScriptError::Type(format!(
                "cannot apply '{}' to floats",
                op_symbol(op)
            )))
        }
    };
    Ok(Value::Float(out))
}

fn compare(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, ScriptError> {
    use std::cmp::Ordering;
    let ordering = match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => None,
    };
    let Some(ordering) = ordering else {
        return Err(ScriptError::Type(format!(
            "cannot compare {} and {}",
            lhs.type_name(),
            rhs.type_name()
        )));
    };
    let result = match op {
        BinOp::Lt => ordering == Ordering::Less,
        BinOp::Le => ordering != Ordering::Greater,
        BinOp::Gt => ordering == Ordering::Greater,
        BinOp::Ge => ordering != Ordering::Less,
        _ => {
            return Err(ScriptError::Type(format!(
                "'{}' is not an ordering operator",
                op_symbol(op)
            )))
        }
    };
    Ok(Value::Bool(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostObject;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    fn eval(code: &str) -> Result<Value, ScriptError> {
        let mut ns = Namespace::new();
        let mut out = Captured::default();
        eval_expression(code, &mut ns, &mut out)
    }

    fn eval_str(code: &str) -> String {
        eval(code).expect("eval").to_string()
    }

    #[test]
    fn arithmetic() {
        assert_eq!(eval_str("1+1"), "2");
        assert_eq!(eval_str("2+3*4"), "14");
        assert_eq!(eval_str("(2+3)*4"), "20");
        assert_eq!(eval_str("7/2"), "3");
        assert_eq!(eval_str("7%3"), "1");
        assert_eq!(eval_str("-5+2"), "-3");
        assert_eq!(eval_str("1.5*2"), "3");
        assert_eq!(eval_str("1+0.5"), "1.5");
    }

    #[test]
    fn strings_and_bools() {
        assert_eq!(eval_str(r#""foo"+"bar""#), "foobar");
        assert_eq!(eval_str(r#""a\nb""#), "a\nb");
        assert_eq!(eval_str("1 < 2"), "true");
        assert_eq!(eval_str(r#""a" < "b""#), "true");
        assert_eq!(eval_str("1 == 1.0"), "true");
        assert_eq!(eval_str("!false"), "true");
        assert_eq!(eval_str("null"), "null");
    }

    #[test]
    fn division_by_zero() {
        assert!(matches!(eval("1/0"), Err(ScriptError::DivisionByZero)));
        assert!(matches!(eval("1%0"), Err(ScriptError::DivisionByZero)));
        assert!(matches!(eval("1.0/0.0"), Err(ScriptError::DivisionByZero)));
    }

    #[test]
    fn undefined_name() {
        let err = eval("nope").expect_err("undefined");
        assert_eq!(err.to_string(), "undefined name 'nope'");
    }

    #[test]
    fn type_errors() {
        assert!(matches!(eval(r#"1+"a""#), Err(ScriptError::Type(_))));
        assert!(matches!(eval("-\"a\""), Err(ScriptError::Type(_))));
        assert!(matches!(eval("1 < \"a\""), Err(ScriptError::Type(_))));
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(eval("1 +"), Err(ScriptError::Parse(_))));
        assert!(matches!(eval("\"open"), Err(ScriptError::Parse(_))));
        assert!(matches!(eval("@"), Err(ScriptError::Parse(_))));
    }

    #[test]
    fn eval_refuses_statements() {
        assert!(matches!(eval("x = 5"), Err(ScriptError::NotAnExpression)));
        assert!(matches!(eval("1; 2"), Err(ScriptError::NotAnExpression)));
    }

    #[test]
    fn assignment_persists_across_runs() {
        let mut ns = Namespace::new();
        let mut out = Captured::default();
        run_statements("x = 5", &mut ns, &mut out).expect("exec");
        let value = eval_expression("x", &mut ns, &mut out).expect("eval");
        assert_eq!(value, Value::Int(5));
        run_statements("x = x + 1", &mut ns, &mut out).expect("exec");
        assert_eq!(ns.get("x"), Some(&Value::Int(6)));
    }

    #[test]
    fn statements_separated_by_newline_and_semicolon() {
        let mut ns = Namespace::new();
        let mut out = Captured::default();
        run_statements("a = 1\nb = 2; c = a + b # sum", &mut ns, &mut out).expect("exec");
        assert_eq!(ns.get("c"), Some(&Value::Int(3)));
    }

    #[test]
    fn partial_mutation_kept_on_failure() {
        let mut ns = Namespace::new();
        let mut out = Captured::default();
        let err = run_statements("a = 1\nb = 1/0\nc = 3", &mut ns, &mut out)
            .expect_err("second statement fails");
        assert_eq!(err.to_string(), "division by zero");
        assert_eq!(ns.get("a"), Some(&Value::Int(1)));
        assert!(!ns.contains("b"));
        assert!(!ns.contains("c"));
    }

    #[test]
    fn print_and_eprint_capture() {
        let mut ns = Namespace::new();
        let mut out = Captured::default();
        run_statements(
            r#"print("hello", 1+1)
eprint("oops")
print("bye")"#,
            &mut ns,
            &mut out,
        )
        .expect("exec");
        assert_eq!(out.stdout, "hello 2\nbye\n");
        assert_eq!(out.stderr, "oops\n");
    }

    #[test]
    fn output_kept_before_failure() {
        let mut ns = Namespace::new();
        let mut out = Captured::default();
        run_statements("print(\"before\")\n1/0", &mut ns, &mut out).expect_err("fails");
        assert_eq!(out.stdout, "before\n");
    }

    #[test]
    fn builtins() {
        assert_eq!(eval_str("str(42)"), "42");
        assert_eq!(eval_str(r#"len("abc")"#), "3");
        assert_eq!(eval_str("type(1.5)"), "float");
        assert_eq!(eval_str("type(\"s\")"), "str");
        assert!(matches!(eval("len(1)"), Err(ScriptError::Type(_))));
        assert!(matches!(
            eval("str(1, 2)"),
            Err(ScriptError::Arity { expected: 1, got: 2, .. })
        ));
        assert!(matches!(eval("5(1)"), Err(ScriptError::NotCallable(_))));
    }

    struct Counter {
        total: AtomicI64,
    }

    impl HostObject for Counter {
        fn type_name(&self) -> &str {
            "Counter"
        }

        fn attr(&self, name: &str) -> Result<Value, ScriptError> {
            match name {
                "label" => Ok(Value::Str("counter".to_string())),
                _ => Err(ScriptError::UnknownAttr {
                    object: self.type_name().to_string(),
                    attr: name.to_string(),
                }),
            }
        }

        fn call(&self, method: &str, args: &[Value]) -> Result<Value, ScriptError> {
            match (method, args) {
                ("add", [Value::Int(n)]) => {
                    Ok(Value::Int(self.total.fetch_add(*n, Ordering::SeqCst) + n))
                }
                ("len", []) => Ok(Value::Int(self.total.load(Ordering::SeqCst))),
                _ => Err(ScriptError::Host(format!(
                    "Counter has no method '{}' for those arguments",
                    method
                ))),
            }
        }
    }

    #[test]
    fn host_object_dispatch() {
        let mut ns = Namespace::new();
        ns.set(
            "counter",
            Value::Host(Arc::new(Counter {
                total: AtomicI64::new(0),
            })),
        );
        let mut out = Captured::default();
        assert_eq!(
            eval_expression("counter.add(2) + counter.add(3)", &mut ns, &mut out)
                .expect("methods"),
            Value::Int(7)
        );
        assert_eq!(
            eval_expression("counter.label", &mut ns, &mut out).expect("attr"),
            Value::Str("counter".to_string())
        );
        assert_eq!(
            eval_expression("len(counter)", &mut ns, &mut out).expect("len"),
            Value::Int(5)
        );
        assert_eq!(
            eval_expression("type(counter)", &mut ns, &mut out).expect("type"),
            Value::Str("Counter".to_string())
        );
        let err = eval_expression("counter.missing", &mut ns, &mut out).expect_err("no attr");
        assert_eq!(err.to_string(), "no attribute 'missing' on Counter");
    }
}
