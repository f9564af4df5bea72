use crate::ast::*;
use crate::error::{Error, ExprError, Location};
use crate::parser::{parse_expr, split_markers};
use crate::value::{Context, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

type EvalResult = Result<Value, ExprError>;

/// Evaluates expressions against a caller context plus loop scopes.
///
/// The caller context is only borrowed; loop variables live in scopes owned
/// by this evaluator, so evaluations sharing one context never interfere.
pub struct Evaluator<'a> {
    globals: &'a Context,
    scopes: Vec<HashMap<String, Value>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(globals: &'a Context) -> Self {
        Self {
            globals,
            scopes: Vec::new(),
        }
    }

    fn get_var(&self, name: &str) -> Option<&Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(val) = scope.get(name) {
                return Some(val);
            }
        }
        self.globals.get(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.get_var(name).is_some()
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn set_local(&mut self, name: impl Into<String>, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), value);
        }
    }

    /// Parse and evaluate an expression source string.
    pub fn eval(&self, source: &str) -> EvalResult {
        let expr = parse_expr(source)?;
        self.eval_expr(&expr)
    }

    /// Replace every `#{expr}` in `text` with the text form of its value.
    pub fn interpolate(&self, text: &str, location: &Location) -> Result<String, Error> {
        let pieces = split_markers(text).map_err(|e| e.at(text, location.clone()))?;

        let mut out = String::with_capacity(text.len());
        for piece in pieces {
            match piece {
                Piece::Literal(s) => out.push_str(s),
                Piece::Expr(source) => {
                    let rendered = self
                        .eval(source)
                        .and_then(|value| {
                            value.to_text().ok_or_else(|| {
                                ExprError::new(format!(
                                    "cannot render {} value {} as text",
                                    value.type_name(),
                                    value
                                ))
                            })
                        })
                        .map_err(|e| e.at(source.trim(), location.clone()))?;
                    out.push_str(&rendered);
                }
            }
        }
        Ok(out)
    }

    pub fn eval_expr(&self, expr: &Expr) -> EvalResult {
        match expr {
            Expr::NoneLit => Ok(Value::Null),
            Expr::BoolLit(b) => Ok(Value::Bool(*b)),
            Expr::IntLit(i) => Ok(Value::Int(*i)),
            Expr::FloatLit(f) => Ok(Value::Float(*f)),
            Expr::StringLit(s) => Ok(Value::String(s.clone())),
            Expr::ListLit(items) => Ok(Value::List(
                items
                    .iter()
                    .map(|item| self.eval_expr(item))
                    .collect::<Result<_, _>>()?,
            )),
            Expr::Var(name) => self
                .get_var(name)
                .cloned()
                .ok_or_else(|| ExprError::new(format!("undefined variable `{}`", name))),
            Expr::Attribute(obj, attr) => {
                let val = self.eval_expr(obj)?;
                match val {
                    Value::Map(mut m) => m
                        .remove(attr)
                        .ok_or_else(|| ExprError::new(format!("attribute `{}` not found", attr))),
                    _ => Err(ExprError::new(format!(
                        "cannot get attribute `{}` of {} value",
                        attr,
                        val.type_name()
                    ))),
                }
            }
            Expr::Index(obj, idx) => {
                let val = self.eval_expr(obj)?;
                let idx_val = self.eval_expr(idx)?;
                index(val, idx_val)
            }
            Expr::Call(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.eval_expr(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                call_builtin(name, args)
            }
            Expr::Unary(op, operand) => {
                let val = self.eval_expr(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!val.is_truthy())),
                    UnaryOp::Neg => match val {
                        Value::Int(i) => i
                            .checked_neg()
                            .map(Value::Int)
                            .ok_or_else(|| ExprError::new("integer overflow")),
                        Value::Float(f) => Ok(Value::Float(-f)),
                        other => Err(ExprError::new(format!(
                            "cannot negate {} value",
                            other.type_name()
                        ))),
                    },
                }
            }
            Expr::BinOp(lhs, BinOp::And, rhs) => {
                let l = self.eval_expr(lhs)?;
                if l.is_truthy() {
                    self.eval_expr(rhs)
                } else {
                    Ok(l)
                }
            }
            Expr::BinOp(lhs, BinOp::Or, rhs) => {
                let l = self.eval_expr(lhs)?;
                if l.is_truthy() {
                    Ok(l)
                } else {
                    self.eval_expr(rhs)
                }
            }
            Expr::BinOp(lhs, op, rhs) => {
                let l = self.eval_expr(lhs)?;
                let r = self.eval_expr(rhs)?;
                binary(*op, l, r)
            }
        }
    }
}

/// Values a `for` attribute walks over: list items, string characters, map keys.
pub fn iterate(value: Value) -> Result<Vec<Value>, ExprError> {
    match value {
        Value::List(items) => Ok(items),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        Value::Map(m) => Ok(m.into_keys().map(Value::String).collect()),
        other => Err(ExprError::new(format!(
            "cannot iterate over {} value",
            other.type_name()
        ))),
    }
}

fn index(val: Value, idx: Value) -> EvalResult {
    match (val, idx) {
        (Value::Map(mut m), Value::String(key)) => m
            .remove(&key)
            .ok_or_else(|| ExprError::new(format!("key {:?} not found", key))),
        (Value::List(mut items), Value::Int(i)) => {
            let pos = resolve_index(i, items.len())?;
            Ok(items.swap_remove(pos))
        }
        (Value::String(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            let pos = resolve_index(i, chars.len())?;
            Ok(Value::String(chars[pos].to_string()))
        }
        (val, idx) => Err(ExprError::new(format!(
            "cannot index {} value with {} value",
            val.type_name(),
            idx.type_name()
        ))),
    }
}

/// Negative indices count from the end.
fn resolve_index(i: i64, len: usize) -> Result<usize, ExprError> {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let pos = if i < 0 { len_i + i } else { i };
    if (0..len_i).contains(&pos) {
        Ok(pos as usize)
    } else {
        Err(ExprError::new(format!(
            "index {} out of range for length {}",
            i, len
        )))
    }
}

fn binary(op: BinOp, l: Value, r: Value) -> EvalResult {
    match op {
        BinOp::Eq => Ok(Value::Bool(values_equal(&l, &r))),
        BinOp::NotEq => Ok(Value::Bool(!values_equal(&l, &r))),
        BinOp::Lt => compare(&l, &r).map(|o| Value::Bool(o == Ordering::Less)),
        BinOp::Le => compare(&l, &r).map(|o| Value::Bool(o != Ordering::Greater)),
        BinOp::Gt => compare(&l, &r).map(|o| Value::Bool(o == Ordering::Greater)),
        BinOp::Ge => compare(&l, &r).map(|o| Value::Bool(o != Ordering::Less)),
        BinOp::In => contains(&r, &l).map(Value::Bool),
        BinOp::NotIn => contains(&r, &l).map(|found| Value::Bool(!found)),
        BinOp::Add => add(l, r),
        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::FloorDiv | BinOp::Mod => {
            arithmetic(op, l, r)
        }
        // Short-circuit operators are handled before both sides are evaluated.
        BinOp::And => Ok(if l.is_truthy() { r } else { l }),
        BinOp::Or => Ok(if l.is_truthy() { l } else { r }),
    }
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
        _ => l == r,
    }
}

fn compare(l: &Value, r: &Value) -> Result<Ordering, ExprError> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => a
                .partial_cmp(&b)
                .ok_or_else(|| ExprError::new("cannot compare NaN")),
            _ => Err(ExprError::new(format!(
                "cannot compare {} value with {} value",
                l.type_name(),
                r.type_name()
            ))),
        },
    }
}

fn contains(container: &Value, item: &Value) -> Result<bool, ExprError> {
    match (container, item) {
        (Value::List(items), _) => Ok(items.iter().any(|v| values_equal(v, item))),
        (Value::String(s), Value::String(sub)) => Ok(s.contains(sub.as_str())),
        (Value::Map(m), Value::String(key)) => Ok(m.contains_key(key)),
        _ => Err(ExprError::new(format!(
            "cannot test membership of {} value in {} value",
            item.type_name(),
            container.type_name()
        ))),
    }
}

fn add(l: Value, r: Value) -> EvalResult {
    match (l, r) {
        (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
        (Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (l, r) => arithmetic(BinOp::Add, l, r),
    }
}

/// Upper bound, in bytes, for `string * int`.
const MAX_REPEAT_LEN: usize = 1 << 20;

const I64_MIN_F: f64 = i64::MIN as f64;

fn arithmetic(op: BinOp, l: Value, r: Value) -> EvalResult {
    match (&l, &r) {
        (Value::Int(a), Value::Int(b)) => int_arithmetic(op, *a, *b),
        (Value::String(s), Value::Int(n)) | (Value::Int(n), Value::String(s))
            if op == BinOp::Mul =>
        {
            let times = usize::try_from(*n).unwrap_or(0);
            match s.len().checked_mul(times) {
                Some(len) if len <= MAX_REPEAT_LEN => Ok(Value::String(s.repeat(times))),
                _ => Err(ExprError::new("repeated string is too long")),
            }
        }
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => float_arithmetic(op, a, b),
            _ => Err(ExprError::new(format!(
                "unsupported operand types for {}: {} and {}",
                op_symbol(op),
                l.type_name(),
                r.type_name()
            ))),
        },
    }
}

fn int_arithmetic(op: BinOp, a: i64, b: i64) -> EvalResult {
    let overflow = || ExprError::new("integer overflow");
    let zero = || ExprError::new("division by zero");

    let result = match op {
        BinOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinOp::Div => {
            if b == 0 {
                return Err(zero());
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(zero());
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            if a % b != 0 && ((a < 0) != (b < 0)) {
                q - 1
            } else {
                q
            }
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(zero());
            }
            let rem = a.checked_rem(b).ok_or_else(overflow)?;
            // The result takes the sign of the divisor.
            if rem != 0 && ((rem < 0) != (b < 0)) {
                rem + b
            } else {
                rem
            }
        }
        other => return Err(ExprError::new(format!("{:?} is not arithmetic", other))),
    };
    Ok(Value::Int(result))
}

fn float_arithmetic(op: BinOp, a: f64, b: f64) -> EvalResult {
    if matches!(op, BinOp::Div | BinOp::FloorDiv | BinOp::Mod) && b == 0.0 {
        return Err(ExprError::new("division by zero"));
    }
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::FloorDiv => (a / b).floor(),
        BinOp::Mod => a - b * (a / b).floor(),
        other => return Err(ExprError::new(format!("{:?} is not arithmetic", other))),
    };
    Ok(Value::Float(result))
}

fn op_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::FloorDiv => "//",
        BinOp::Mod => "%",
        _ => "?",
    }
}

fn expect_args(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), ExprError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{} to {}", min, max)
        };
        return Err(ExprError::new(format!(
            "{}() takes {} argument(s), got {}",
            name,
            expected,
            args.len()
        )));
    }
    Ok(())
}

fn int_arg(name: &str, value: &Value) -> Result<i64, ExprError> {
    match value {
        Value::Int(i) => Ok(*i),
        other => Err(ExprError::new(format!(
            "{}() expects int arguments, got {}",
            name,
            other.type_name()
        ))),
    }
}

fn call_builtin(name: &str, mut args: Vec<Value>) -> EvalResult {
    match name {
        "range" => {
            expect_args(name, &args, 1, 3)?;
            let ints = args
                .iter()
                .map(|a| int_arg(name, a))
                .collect::<Result<Vec<_>, _>>()?;
            let (start, stop, step) = match ints.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => unreachable!("argument count checked above"),
            };
            if step == 0 {
                return Err(ExprError::new("range() step must not be zero"));
            }
            let mut items = Vec::new();
            let mut current = start;
            while (step > 0 && current < stop) || (step < 0 && current > stop) {
                items.push(Value::Int(current));
                current = match current.checked_add(step) {
                    Some(next) => next,
                    None => break,
                };
            }
            Ok(Value::List(items))
        }
        "len" => {
            expect_args(name, &args, 1, 1)?;
            match &args[0] {
                Value::String(s) => Ok(Value::from(s.chars().count())),
                Value::List(items) => Ok(Value::from(items.len())),
                Value::Map(m) => Ok(Value::from(m.len())),
                other => Err(ExprError::new(format!(
                    "len() of {} value",
                    other.type_name()
                ))),
            }
        }
        "str" => {
            expect_args(name, &args, 1, 1)?;
            let value = &args[0];
            Ok(Value::String(
                value.to_text().unwrap_or_else(|| value.to_string()),
            ))
        }
        "int" => {
            expect_args(name, &args, 1, 1)?;
            match args.remove(0) {
                Value::Int(i) => Ok(Value::Int(i)),
                Value::Bool(b) => Ok(Value::Int(i64::from(b))),
                Value::Float(f) if f.is_finite() => {
                    let t = f.trunc();
                    if (I64_MIN_F..-I64_MIN_F).contains(&t) {
                        Ok(Value::Int(t as i64))
                    } else {
                        Err(ExprError::new("integer overflow"))
                    }
                }
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| ExprError::new(format!("int() cannot parse {:?}", s))),
                other => Err(ExprError::new(format!(
                    "int() of {} value",
                    other.type_name()
                ))),
            }
        }
        "float" => {
            expect_args(name, &args, 1, 1)?;
            match args.remove(0) {
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| ExprError::new(format!("float() cannot parse {:?}", s))),
                Value::Bool(b) => Ok(Value::Float(if b { 1.0 } else { 0.0 })),
                other => other.as_f64().map(Value::Float).ok_or_else(|| {
                    ExprError::new(format!("float() of {} value", other.type_name()))
                }),
            }
        }
        "bool" => {
            expect_args(name, &args, 1, 1)?;
            Ok(Value::Bool(args[0].is_truthy()))
        }
        "abs" => {
            expect_args(name, &args, 1, 1)?;
            match args.remove(0) {
                Value::Int(i) => i
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| ExprError::new("integer overflow")),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => Err(ExprError::new(format!(
                    "abs() of {} value",
                    other.type_name()
                ))),
            }
        }
        "min" | "max" => {
            expect_args(name, &args, 1, usize::MAX)?;
            let items = match args.as_slice() {
                [Value::List(_)] => match args.remove(0) {
                    Value::List(items) => items,
                    _ => unreachable!("matched a single list argument"),
                },
                _ => args,
            };
            let want = if name == "min" {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut iter = items.into_iter();
            let mut best = iter
                .next()
                .ok_or_else(|| ExprError::new(format!("{}() of an empty list", name)))?;
            for item in iter {
                if compare(&item, &best)? == want {
                    best = item;
                }
            }
            Ok(best)
        }
        "lower" | "upper" => {
            expect_args(name, &args, 1, 1)?;
            match &args[0] {
                Value::String(s) if name == "lower" => Ok(Value::String(s.to_lowercase())),
                Value::String(s) => Ok(Value::String(s.to_uppercase())),
                other => Err(ExprError::new(format!(
                    "{}() of {} value",
                    name,
                    other.type_name()
                ))),
            }
        }
        _ => Err(ExprError::new(format!("unknown function `{}`", name))),
    }
}

/// The `loop` helper bound inside `for` iterations.
pub fn loop_info(index0: usize, length: usize) -> Value {
    let mut info = BTreeMap::new();
    info.insert("index0".to_string(), Value::from(index0));
    info.insert("index".to_string(), Value::from(index0 + 1));
    info.insert("first".to_string(), Value::Bool(index0 == 0));
    info.insert("last".to_string(), Value::Bool(index0 + 1 == length));
    info.insert("length".to_string(), Value::from(length));
    Value::Map(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::new()
            .with("count", 3)
            .with("name", "World")
            .with("items", vec!["a", "b", "c"])
            .with("ratio", 0.5)
    }

    fn eval(source: &str) -> EvalResult {
        let ctx = ctx();
        Evaluator::new(&ctx).eval(source)
    }

    #[test]
    fn variables_and_nested_access() {
        let mut user = BTreeMap::new();
        user.insert("name".to_string(), Value::from("Ann"));
        let ctx = Context::new().with("user", Value::Map(user));
        let ev = Evaluator::new(&ctx);

        assert_eq!(ev.eval("user.name").unwrap(), Value::from("Ann"));
        assert_eq!(ev.eval("user['name']").unwrap(), Value::from("Ann"));
        assert!(ev.eval("user.age").is_err());
        assert!(ev.eval("nobody").unwrap_err().0.contains("undefined variable"));
    }

    #[test]
    fn arithmetic_follows_python_rules() {
        assert_eq!(eval("count * 2 + 1").unwrap(), Value::Int(7));
        assert_eq!(eval("7 / 2").unwrap(), Value::Float(3.5));
        assert_eq!(eval("7 // 2").unwrap(), Value::Int(3));
        assert_eq!(eval("-7 // 2").unwrap(), Value::Int(-4));
        assert_eq!(eval("-7 % 3").unwrap(), Value::Int(2));
        assert_eq!(eval("7 % -3").unwrap(), Value::Int(-2));
        assert_eq!(eval("ratio * 4").unwrap(), Value::Float(2.0));
        assert_eq!(eval("'ab' * 2").unwrap(), Value::from("abab"));
        assert_eq!(eval("name + '!'").unwrap(), Value::from("World!"));
    }

    #[test]
    fn division_by_zero_and_type_errors() {
        assert!(eval("1 / 0").unwrap_err().0.contains("division by zero"));
        assert!(eval("1 % 0").is_err());
        assert!(eval("1.5 // 0.0").is_err());
        assert!(eval("name - 1").is_err());
        assert!(eval("9223372036854775807 + 1").unwrap_err().0.contains("overflow"));
    }

    #[test]
    fn huge_values_are_errors() {
        let ctx = Context::new().with("n", i64::MAX).with("big", 1e22);
        let ev = Evaluator::new(&ctx);
        assert!(ev.eval("'ab' * n").unwrap_err().0.contains("too long"));
        assert!(ev.eval("n * 'ab'").is_err());
        assert_eq!(ev.eval("'ab' * 3").unwrap(), Value::from("ababab"));
        assert!(ev.eval("int(big)").unwrap_err().0.contains("overflow"));
        assert!(ev.eval("int(-big)").is_err());
        assert_eq!(ev.eval("int(-2.5)").unwrap(), Value::Int(-2));
    }

    #[test]
    fn comparisons_and_membership() {
        assert_eq!(eval("count == 3.0").unwrap(), Value::Bool(true));
        assert_eq!(eval("count != 3").unwrap(), Value::Bool(false));
        assert_eq!(eval("count >= 3 and count < 4").unwrap(), Value::Bool(true));
        assert_eq!(eval("'b' in items").unwrap(), Value::Bool(true));
        assert_eq!(eval("'z' not in items").unwrap(), Value::Bool(true));
        assert_eq!(eval("'orl' in name").unwrap(), Value::Bool(true));
        assert!(eval("items < 3").is_err());
    }

    #[test]
    fn boolean_operators_short_circuit() {
        // The right side would fail if evaluated.
        assert_eq!(eval("false and missing").unwrap(), Value::Bool(false));
        assert_eq!(eval("count or missing").unwrap(), Value::Int(3));
        assert_eq!(eval("'' or 'fallback'").unwrap(), Value::from("fallback"));
        assert_eq!(eval("not count").unwrap(), Value::Bool(false));
    }

    #[test]
    fn indexing() {
        assert_eq!(eval("items[0]").unwrap(), Value::from("a"));
        assert_eq!(eval("items[-1]").unwrap(), Value::from("c"));
        assert_eq!(eval("name[1]").unwrap(), Value::from("o"));
        assert!(eval("items[3]").is_err());
    }

    #[test]
    fn builtins() {
        assert_eq!(
            eval("range(3)").unwrap(),
            Value::List(vec![Value::Int(0), Value::Int(1), Value::Int(2)])
        );
        assert_eq!(
            eval("range(1, 3)").unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
        assert_eq!(
            eval("range(5, 0, -2)").unwrap(),
            Value::List(vec![Value::Int(5), Value::Int(3), Value::Int(1)])
        );
        assert_eq!(eval("range(0)").unwrap(), Value::List(vec![]));
        assert!(eval("range(1, 2, 0)").is_err());
        assert!(eval("range('3')").is_err());

        assert_eq!(eval("len(items)").unwrap(), Value::Int(3));
        assert_eq!(eval("str(count) + '!'").unwrap(), Value::from("3!"));
        assert_eq!(eval("int('42') + 1").unwrap(), Value::Int(43));
        assert_eq!(eval("float(count)").unwrap(), Value::Float(3.0));
        assert_eq!(eval("abs(-4)").unwrap(), Value::Int(4));
        assert_eq!(eval("max(1, count, 2)").unwrap(), Value::Int(3));
        assert_eq!(eval("min(items)").unwrap(), Value::from("a"));
        assert_eq!(eval("upper(name)").unwrap(), Value::from("WORLD"));
        assert!(eval("shout(name)").unwrap_err().0.contains("unknown function"));
    }

    #[test]
    fn iterate_values() {
        assert_eq!(iterate(Value::from("ab")).unwrap().len(), 2);
        assert!(iterate(Value::Int(3)).is_err());
    }

    #[test]
    fn scopes_shadow_globals() {
        let ctx = ctx();
        let mut ev = Evaluator::new(&ctx);
        ev.push_scope();
        ev.set_local("name", Value::from("loop"));
        assert_eq!(ev.eval("name").unwrap(), Value::from("loop"));
        ev.pop_scope();
        assert_eq!(ev.eval("name").unwrap(), Value::from("World"));
    }

    #[test]
    fn interpolation() {
        let ctx = ctx();
        let ev = Evaluator::new(&ctx);
        let location = Location {
            tag: "p".into(),
            line: 1,
            attribute: None,
        };

        assert_eq!(
            ev.interpolate("Hello #{name}! x#{count}", &location).unwrap(),
            "Hello World! x3"
        );
        assert_eq!(ev.interpolate("plain", &location).unwrap(), "plain");

        match ev.interpolate("Hi #{ nobody }", &location) {
            Err(Error::Expression { expr, .. }) => assert_eq!(expr, "nobody"),
            other => panic!("expected expression error, got {:?}", other),
        }
        assert!(ev.interpolate("#{items}", &location).is_err());
    }
}
