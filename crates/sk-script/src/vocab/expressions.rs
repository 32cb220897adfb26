//! Built-in expressions and functions

use std::any::Any;

use sk_core::{TypeName, Value};
use sk_syntax::{
    Category, ExecutionContext, Expr, Expression, NamePart, ParseContext, ParseResult,
    RuntimeResult, SyntaxRegistry, SyntaxResult, VariableExpr,
};
use sk_variables::Change;

/// Split the inside of `{...}` or `"..."` at `%` into text and embedded
/// expressions; `%%` stands for a percent sign
fn split_embedded(inner: &str) -> Result<Vec<(bool, String)>, String> {
    let mut pieces = Vec::new();
    let mut text = String::new();
    let mut rest = inner;
    while let Some(at) = rest.find('%') {
        text.push_str(&rest[..at]);
        let after = &rest[at + 1..];
        if let Some(escaped) = after.strip_prefix('%') {
            text.push('%');
            rest = escaped;
            continue;
        }
        let close = after
            .find('%')
            .ok_or_else(|| format!("unclosed '%' in '{inner}'"))?;
        if !text.is_empty() {
            pieces.push((false, std::mem::take(&mut text)));
        }
        pieces.push((true, after[..close].to_string()));
        rest = &after[close + 1..];
    }
    text.push_str(rest);
    if !text.is_empty() {
        pieces.push((false, text));
    }
    Ok(pieces)
}

fn variable(result: ParseResult, ctx: &ParseContext) -> Result<Expr, String> {
    let raw = result.regex(0).ok_or("missing variable name")?;
    let inner = &raw[1..raw.len() - 1];
    let mut parts = Vec::new();
    for (embedded, piece) in split_embedded(inner)? {
        if embedded {
            let expr = ctx
                .parse_expression(&piece)
                .map_err(|failure| failure.message("expression"))?;
            parts.push(NamePart::Expr(expr));
        } else if piece.contains(['{', '}']) {
            return Err(format!("'{raw}' is not a single variable"));
        } else {
            parts.push(NamePart::Text(piece));
        }
    }
    if parts.is_empty() {
        return Err("a variable needs a name".to_string());
    }
    Ok(Expr::Variable(VariableExpr::new(parts)))
}

#[derive(Debug)]
enum TextPart {
    Text(String),
    Expr(Expr),
}

/// `"Hello %{_name}%"`
#[derive(Debug)]
struct InterpolatedText(Vec<TextPart>);

impl Expression for InterpolatedText {
    fn return_type(&self) -> TypeName {
        TypeName::TEXT
    }

    fn evaluate(&self, ctx: &ExecutionContext) -> RuntimeResult<Vec<Value>> {
        let mut out = String::new();
        for part in &self.0 {
            match part {
                TextPart::Text(text) => out.push_str(text),
                TextPart::Expr(expr) => out.push_str(&join_values(&expr.evaluate(ctx)?)),
            }
        }
        Ok(vec![Value::Text(out)])
    }

    fn describe(&self) -> String {
        let inner: String = self
            .0
            .iter()
            .map(|part| match part {
                TextPart::Text(text) => text.replace('"', "\"\"").replace('%', "%%"),
                TextPart::Expr(expr) => format!("%{expr}%"),
            })
            .collect();
        format!("\"{inner}\"")
    }
}

/// `a`, `a and b`, `a, b and c`
fn join_values(values: &[Value]) -> String {
    let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
    match rendered.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{} and {last}", rest.join(", ")),
        _ => rendered.concat(),
    }
}

fn interpolated_text(result: ParseResult, ctx: &ParseContext) -> Result<Expr, String> {
    let raw = result.regex(0).ok_or("missing text")?;
    let inner = &raw[1..raw.len() - 1];

    // A lone quote would end the text early
    let mut chars = inner.chars().peekable();
    let mut in_expr = false;
    while let Some(c) = chars.next() {
        match c {
            '%' => in_expr = !in_expr,
            '"' if !in_expr => {
                if chars.next() != Some('"') {
                    return Err(format!("{raw} is not a single text"));
                }
            }
            _ => {}
        }
    }

    let mut parts = Vec::new();
    for (embedded, piece) in split_embedded(inner)? {
        if embedded {
            let expr = ctx
                .parse_expression(&piece)
                .map_err(|failure| failure.message("expression"))?;
            parts.push(TextPart::Expr(expr));
        } else {
            parts.push(TextPart::Text(piece.replace("\"\"", "\"")));
        }
    }
    Ok(Expr::custom(InterpolatedText(parts)))
}

/// `(...)`; keeps arithmetic inside from being regrouped
#[derive(Debug)]
struct Parenthesized(Expr);

impl Expression for Parenthesized {
    fn return_type(&self) -> TypeName {
        self.0.return_type()
    }

    fn is_single(&self) -> bool {
        self.0.is_single()
    }

    fn evaluate(&self, ctx: &ExecutionContext) -> RuntimeResult<Vec<Value>> {
        self.0.evaluate(ctx)
    }

    fn is_changeable(&self) -> bool {
        self.0.is_changeable()
    }

    fn change(&self, ctx: &mut ExecutionContext, change: &Change) -> RuntimeResult<()> {
        self.0.change(ctx, change)
    }

    fn describe(&self) -> String {
        format!("({})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operator {
    fn from_mark(mark: i32) -> Self {
        match mark {
            1 => Operator::Subtract,
            2 => Operator::Multiply,
            3 => Operator::Divide,
            _ => Operator::Add,
        }
    }

    fn precedence(self) -> u8 {
        match self {
            Operator::Add | Operator::Subtract => 1,
            Operator::Multiply | Operator::Divide => 2,
        }
    }

    fn apply(self, left: f64, right: f64) -> f64 {
        match self {
            Operator::Add => left + right,
            Operator::Subtract => left - right,
            Operator::Multiply => left * right,
            Operator::Divide => left / right,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
        }
    }
}

/// Missing operands count as zero; results that are not finite have no
/// value
#[derive(Debug, Clone)]
struct Arithmetic {
    left: Expr,
    op: Operator,
    right: Expr,
}

impl Arithmetic {
    /// Operands split shortest-first leave `a - b - c` as `a - (b - c)`;
    /// rebuild same-precedence chains to the left
    fn build(left: Expr, op: Operator, right: Expr) -> Expr {
        if let Expr::Custom(inner) = &right {
            if let Some(chain) = inner.as_any().and_then(|any| any.downcast_ref::<Arithmetic>()) {
                if chain.op.precedence() == op.precedence() {
                    let head = Self::build(left, op, chain.left.clone());
                    return Expr::custom(Arithmetic {
                        left: head,
                        op: chain.op,
                        right: chain.right.clone(),
                    });
                }
            }
        }
        Expr::custom(Arithmetic { left, op, right })
    }

    fn operand(expr: &Expr, ctx: &ExecutionContext) -> RuntimeResult<f64> {
        Ok(expr
            .evaluate_single(ctx)?
            .and_then(|value| value.as_number())
            .unwrap_or(0.0))
    }
}

impl Expression for Arithmetic {
    fn return_type(&self) -> TypeName {
        TypeName::NUMBER
    }

    fn evaluate(&self, ctx: &ExecutionContext) -> RuntimeResult<Vec<Value>> {
        let left = Self::operand(&self.left, ctx)?;
        let right = Self::operand(&self.right, ctx)?;
        let value = self.op.apply(left, right);
        Ok(if value.is_finite() {
            vec![Value::Number(value)]
        } else {
            Vec::new()
        })
    }

    fn describe(&self) -> String {
        format!("{} {} {}", self.left, self.op.symbol(), self.right)
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }
}

fn arithmetic(mut result: ParseResult, op: Operator) -> Result<Expr, String> {
    let left = result.take(0)?;
    let right = result.take(1)?;
    Ok(Arithmetic::build(left, op, right))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopPart {
    Value,
    Index,
    Iteration,
}

#[derive(Debug)]
struct LoopValue {
    slot: usize,
    part: LoopPart,
    value_type: TypeName,
}

impl Expression for LoopValue {
    fn return_type(&self) -> TypeName {
        match self.part {
            LoopPart::Value => self.value_type.clone(),
            LoopPart::Index => TypeName::TEXT,
            LoopPart::Iteration => TypeName::NUMBER,
        }
    }

    fn evaluate(&self, ctx: &ExecutionContext) -> RuntimeResult<Vec<Value>> {
        let Some(state) = ctx.loop_state(self.slot) else {
            return Ok(Vec::new());
        };
        Ok(match self.part {
            LoopPart::Value => state.value().cloned().into_iter().collect(),
            LoopPart::Index => vec![Value::Text(state.index())],
            LoopPart::Iteration => vec![Value::Number(state.iteration as f64)],
        })
    }

    fn describe(&self) -> String {
        let part = match self.part {
            LoopPart::Value => "value",
            LoopPart::Index => "index",
            LoopPart::Iteration => "iteration",
        };
        format!("loop-{part}-{}", self.slot + 1)
    }
}

fn loop_value(mut result: ParseResult, ctx: &ParseContext) -> Result<Expr, String> {
    let part = match result.mark {
        2 => LoopPart::Index,
        3 => LoopPart::Iteration,
        _ => LoopPart::Value,
    };
    let scope = match result.take_optional(0) {
        Some(number) => {
            let n = number
                .constant_values()
                .and_then(|values| values.first().and_then(Value::as_number))
                .ok_or("the loop number must be a number")?;
            ctx.scope.loop_at(n as usize)
        }
        None => ctx.scope.innermost_loop(),
    };
    let scope = scope.ok_or_else(|| format!("there's no loop that matches '{}'", result.input))?;
    Ok(Expr::custom(LoopValue {
        slot: scope.slot,
        part,
        value_type: scope.value_type.clone(),
    }))
}

/// `event-<key>`; `event-value` is the whole payload
#[derive(Debug)]
struct EventValue {
    key: Option<String>,
}

impl Expression for EventValue {
    fn return_type(&self) -> TypeName {
        match self.key {
            Some(_) => TypeName::OBJECT,
            None => TypeName::JSON,
        }
    }

    fn evaluate(&self, ctx: &ExecutionContext) -> RuntimeResult<Vec<Value>> {
        Ok(match &self.key {
            Some(key) => ctx.event_value(key).into_iter().collect(),
            None => Value::from_json(&ctx.event.data).into_iter().collect(),
        })
    }

    fn describe(&self) -> String {
        format!("event-{}", self.key.as_deref().unwrap_or("value"))
    }
}

/// The payload of the current event, used where a json value is left out
pub(super) fn event_payload() -> Expr {
    Expr::custom(EventValue { key: None })
}

/// `field "name" of <json>`
#[derive(Debug)]
struct JsonField {
    name: Expr,
    object: Expr,
}

impl Expression for JsonField {
    fn return_type(&self) -> TypeName {
        TypeName::OBJECT
    }

    fn evaluate(&self, ctx: &ExecutionContext) -> RuntimeResult<Vec<Value>> {
        let Some(name) = self.name.evaluate_single(ctx)? else {
            return Ok(Vec::new());
        };
        let name = name.to_string();
        Ok(self
            .object
            .evaluate(ctx)?
            .iter()
            .filter_map(|object| match object {
                Value::Object { data, .. } => data.get(&name).and_then(Value::from_json),
                _ => None,
            })
            .collect())
    }

    fn describe(&self) -> String {
        format!("field {} of {}", self.name, self.object)
    }
}

#[derive(Debug)]
struct SizeOf(Expr);

impl Expression for SizeOf {
    fn return_type(&self) -> TypeName {
        TypeName::NUMBER
    }

    fn evaluate(&self, ctx: &ExecutionContext) -> RuntimeResult<Vec<Value>> {
        Ok(vec![Value::Number(self.0.evaluate(ctx)?.len() as f64)])
    }

    fn describe(&self) -> String {
        format!("size of {}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MathFunction {
    Round,
    Floor,
    Ceil,
    Abs,
    Min,
    Max,
}

impl MathFunction {
    fn name(self) -> &'static str {
        match self {
            MathFunction::Round => "round",
            MathFunction::Floor => "floor",
            MathFunction::Ceil => "ceil",
            MathFunction::Abs => "abs",
            MathFunction::Min => "min",
            MathFunction::Max => "max",
        }
    }
}

#[derive(Debug)]
struct FunctionCall {
    function: MathFunction,
    args: Expr,
}

impl Expression for FunctionCall {
    fn return_type(&self) -> TypeName {
        TypeName::NUMBER
    }

    fn evaluate(&self, ctx: &ExecutionContext) -> RuntimeResult<Vec<Value>> {
        let numbers: Vec<f64> = self
            .args
            .evaluate(ctx)?
            .iter()
            .filter_map(Value::as_number)
            .collect();
        let result = match self.function {
            MathFunction::Min => numbers.iter().copied().reduce(f64::min),
            MathFunction::Max => numbers.iter().copied().reduce(f64::max),
            single => numbers.first().map(|&n| match single {
                MathFunction::Round => n.round(),
                MathFunction::Floor => n.floor(),
                MathFunction::Ceil => n.ceil(),
                _ => n.abs(),
            }),
        };
        Ok(result.map(Value::Number).into_iter().collect())
    }

    fn describe(&self) -> String {
        format!("{}({})", self.function.name(), self.args)
    }
}

pub(super) fn register(syntax: &SyntaxRegistry) -> SyntaxResult<()> {
    syntax.register(Category::Expression, r"<\{.+\}>", 0, |result: ParseResult, ctx: &ParseContext| {
        variable(result, ctx)
    })?;
    syntax.register(Category::Expression, r#"<".*">"#, 0, |result: ParseResult, ctx: &ParseContext| {
        interpolated_text(result, ctx)
    })?;
    syntax.register(
        Category::Expression,
        r"\(%object%\)",
        0,
        |mut result: ParseResult, _: &ParseContext| Ok(Expr::custom(Parenthesized(result.take(0)?))),
    )?;

    // Registered first so that ties go to the lower precedence split
    syntax.register(
        Category::Expression,
        "%number% (+|1¦-) %number%",
        0,
        |result: ParseResult, _: &ParseContext| {
            let op = Operator::from_mark(result.mark);
            arithmetic(result, op)
        },
    )?;
    syntax.register(
        Category::Expression,
        r"%number% (2¦\*|3¦/) %number%",
        0,
        |result: ParseResult, _: &ParseContext| {
            let op = Operator::from_mark(result.mark);
            arithmetic(result, op)
        },
    )?;

    syntax.register(
        Category::Expression,
        "loop-(1¦value|2¦index|3¦iteration)[-%-*number%]",
        0,
        |result: ParseResult, ctx: &ParseContext| loop_value(result, ctx),
    )?;
    syntax.register(
        Category::Expression,
        r"[the] event-<[\w-]+>",
        0,
        |result: ParseResult, _: &ParseContext| {
            let key = result.regex(0).ok_or("missing event value")?.to_lowercase();
            Ok(Expr::custom(EventValue {
                key: (key != "value").then_some(key),
            }))
        },
    )?;
    syntax.register(
        Category::Expression,
        "[the] field %text% [of %json%]",
        0,
        |mut result: ParseResult, _: &ParseContext| {
            let name = result.take(0)?;
            Ok(Expr::custom(JsonField {
                name,
                object: result.take(1)?,
            }))
        },
    )?;
    syntax.register(
        Category::Expression,
        "[the] (size|amount|number) of %objects%",
        0,
        |mut result: ParseResult, _: &ParseContext| Ok(Expr::custom(SizeOf(result.take(0)?))),
    )?;

    syntax.register(
        Category::Function,
        r"(1¦round|2¦floor|3¦ceil|4¦abs)\(%number%\)",
        0,
        |mut result: ParseResult, _: &ParseContext| {
            let function = match result.mark {
                2 => MathFunction::Floor,
                3 => MathFunction::Ceil,
                4 => MathFunction::Abs,
                _ => MathFunction::Round,
            };
            Ok(Expr::custom(FunctionCall {
                function,
                args: result.take(0)?,
            }))
        },
    )?;
    syntax.register(
        Category::Function,
        r"(1¦min|2¦max)\(%numbers%\)",
        0,
        |mut result: ParseResult, _: &ParseContext| {
            let function = if result.mark == 2 {
                MathFunction::Max
            } else {
                MathFunction::Min
            };
            Ok(Expr::custom(FunctionCall {
                function,
                args: result.take(0)?,
            }))
        },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_embedded() {
        assert_eq!(
            split_embedded("score::%loop-value%").unwrap(),
            vec![(false, "score::".to_string()), (true, "loop-value".to_string())]
        );
        assert_eq!(
            split_embedded("100%% sure").unwrap(),
            vec![(false, "100% sure".to_string())]
        );
        assert!(split_embedded("half %open").is_err());
    }

    #[test]
    fn test_join_values() {
        let values = [Value::from(1.0), Value::from(2.0), Value::from(3.0)];
        assert_eq!(join_values(&values), "1, 2 and 3");
        assert_eq!(join_values(&values[..1]), "1");
        assert_eq!(join_values(&[]), "");
    }

    #[test]
    fn test_arithmetic_chain_is_left_associative() {
        let ctx = ExecutionContext::detached("test");
        let inner = Arithmetic::build(Expr::literal(2.0), Operator::Subtract, Expr::literal(3.0));
        let chain = Arithmetic::build(Expr::literal(10.0), Operator::Subtract, inner);
        assert_eq!(chain.describe(), "10 - 2 - 3");
        assert_eq!(chain.evaluate(&ctx).unwrap(), vec![Value::Number(5.0)]);
    }

    #[test]
    fn test_parenthesized_operand_is_kept() {
        let ctx = ExecutionContext::detached("test");
        let inner = Expr::custom(Parenthesized(Arithmetic::build(
            Expr::literal(2.0),
            Operator::Subtract,
            Expr::literal(3.0),
        )));
        let expr = Arithmetic::build(Expr::literal(10.0), Operator::Subtract, inner);
        assert_eq!(expr.evaluate(&ctx).unwrap(), vec![Value::Number(11.0)]);
    }

    #[test]
    fn test_division_by_zero_has_no_value() {
        let ctx = ExecutionContext::detached("test");
        let expr = Arithmetic::build(Expr::literal(1.0), Operator::Divide, Expr::literal(0.0));
        assert!(expr.evaluate(&ctx).unwrap().is_empty());
    }
}
