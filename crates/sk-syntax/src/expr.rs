//! Expression nodes

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use sk_core::{TypeName, Value};
use sk_variables::{Change, VariableName};

use crate::error::{RuntimeError, RuntimeResult};
use crate::literals::quote_text;
use crate::runtime::ExecutionContext;
use crate::types::TypeRegistry;

/// Behavior of a vocabulary-defined expression
pub trait Expression: Send + Sync + fmt::Debug {
    fn return_type(&self) -> TypeName;

    fn is_single(&self) -> bool {
        true
    }

    fn evaluate(&self, ctx: &ExecutionContext) -> RuntimeResult<Vec<Value>>;

    fn is_changeable(&self) -> bool {
        false
    }

    fn change(&self, _ctx: &mut ExecutionContext, _change: &Change) -> RuntimeResult<()> {
        Err(RuntimeError::NotChangeable(self.describe()))
    }

    /// Script-like rendering for diagnostics
    fn describe(&self) -> String;

    /// Concrete type, for factories that restructure their operands
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
}

/// A typed expression tree
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(LiteralExpr),
    Variable(VariableExpr),
    List(ExprList),
    Cast(CastExpr),
    Custom(Arc<dyn Expression>),
}

impl Expr {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(LiteralExpr {
            value: value.into(),
        })
    }

    pub fn custom(expression: impl Expression + 'static) -> Self {
        Expr::Custom(Arc::new(expression))
    }

    pub fn return_type(&self) -> TypeName {
        match self {
            Expr::Literal(e) => e.value.type_name(),
            Expr::Variable(_) => TypeName::OBJECT,
            Expr::List(e) => e.return_type(),
            Expr::Cast(e) => e.return_type(),
            Expr::Custom(e) => e.return_type(),
        }
    }

    pub fn is_single(&self) -> bool {
        match self {
            Expr::Literal(_) => true,
            Expr::Variable(e) => !e.list,
            Expr::List(e) => e.items.len() == 1 && e.items[0].is_single(),
            Expr::Cast(e) => e.inner.is_single(),
            Expr::Custom(e) => e.is_single(),
        }
    }

    pub fn is_literal(&self) -> bool {
        match self {
            Expr::Literal(_) => true,
            Expr::List(e) => e.items.iter().all(Expr::is_literal),
            Expr::Cast(e) => e.inner.is_literal(),
            _ => false,
        }
    }

    pub fn is_changeable(&self) -> bool {
        match self {
            Expr::Variable(_) => true,
            Expr::List(e) => e.items.iter().all(Expr::is_changeable),
            Expr::Cast(e) => e.inner.is_changeable(),
            Expr::Custom(e) => e.is_changeable(),
            Expr::Literal(_) => false,
        }
    }

    /// `false` for an `or` list, whose values are alternatives
    pub fn is_and_list(&self) -> bool {
        match self {
            Expr::List(e) => e.and,
            Expr::Cast(e) => e.inner.is_and_list(),
            _ => true,
        }
    }

    pub fn evaluate(&self, ctx: &ExecutionContext) -> RuntimeResult<Vec<Value>> {
        match self {
            Expr::Literal(e) => Ok(vec![e.value.clone()]),
            Expr::Variable(e) => e.evaluate(ctx),
            Expr::List(e) => e.evaluate(ctx),
            Expr::Cast(e) => e.evaluate(ctx),
            Expr::Custom(e) => e.evaluate(ctx),
        }
    }

    /// First value, if any
    pub fn evaluate_single(&self, ctx: &ExecutionContext) -> RuntimeResult<Option<Value>> {
        Ok(self.evaluate(ctx)?.into_iter().next())
    }

    /// First value, failing the invocation when there is none
    pub fn require(&self, ctx: &ExecutionContext) -> RuntimeResult<Value> {
        self.evaluate_single(ctx)?
            .ok_or_else(|| RuntimeError::MissingValue(self.describe()))
    }

    pub fn change(&self, ctx: &mut ExecutionContext, change: &Change) -> RuntimeResult<()> {
        match self {
            Expr::Variable(e) => e.change(ctx, change),
            Expr::List(e) => {
                for item in &e.items {
                    item.change(ctx, change)?;
                }
                Ok(())
            }
            Expr::Cast(e) => e.inner.change(ctx, change),
            Expr::Custom(e) => e.change(ctx, change),
            Expr::Literal(_) => Err(RuntimeError::NotChangeable(self.describe())),
        }
    }

    /// Values known without running anything
    pub fn constant_values(&self) -> Option<Vec<Value>> {
        match self {
            Expr::Literal(e) => Some(vec![e.value.clone()]),
            Expr::List(e) => e
                .items
                .iter()
                .map(Expr::constant_values)
                .collect::<Option<Vec<_>>>()
                .map(|values| values.into_iter().flatten().collect()),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Expr::Literal(e) => e.describe(),
            Expr::Variable(e) => e.describe(),
            Expr::List(e) => e.describe(),
            Expr::Cast(e) => e.inner.describe(),
            Expr::Custom(e) => e.describe(),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralExpr {
    pub value: Value,
}

impl LiteralExpr {
    fn describe(&self) -> String {
        match &self.value {
            Value::Text(s) => quote_text(s),
            other => other.to_string(),
        }
    }
}

/// Piece of a variable name
#[derive(Debug, Clone)]
pub enum NamePart {
    Text(String),
    /// `%expr%` embedded in the name
    Expr(Expr),
}

/// `{name}`, `{_local}` or `{list::*}`, possibly with embedded expressions
#[derive(Debug, Clone)]
pub struct VariableExpr {
    parts: Vec<NamePart>,
    local: bool,
    list: bool,
}

impl VariableExpr {
    /// Build from the parts between the braces
    pub fn new(parts: Vec<NamePart>) -> Self {
        let local = matches!(parts.first(), Some(NamePart::Text(t)) if t.starts_with('_'));
        let list = matches!(parts.last(), Some(NamePart::Text(t)) if t.ends_with("::*"));
        Self { parts, local, list }
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn is_list(&self) -> bool {
        self.list
    }

    pub fn parts(&self) -> &[NamePart] {
        &self.parts
    }

    /// Resolve embedded expressions into a concrete name
    pub fn name(&self, ctx: &ExecutionContext) -> RuntimeResult<VariableName> {
        let mut name = String::new();
        for part in &self.parts {
            match part {
                NamePart::Text(text) => name.push_str(text),
                NamePart::Expr(expr) => {
                    let values = expr.evaluate(ctx)?;
                    if values.is_empty() {
                        return Err(RuntimeError::MissingValue(expr.describe()));
                    }
                    let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
                    name.push_str(&rendered.join(", "));
                }
            }
        }
        Ok(VariableName::parse(&name)?)
    }

    fn evaluate(&self, ctx: &ExecutionContext) -> RuntimeResult<Vec<Value>> {
        let name = self.name(ctx)?;
        Ok(if name.is_local() {
            ctx.locals.read(&name)
        } else {
            ctx.globals.read(&name)
        })
    }

    fn change(&self, ctx: &mut ExecutionContext, change: &Change) -> RuntimeResult<()> {
        let name = self.name(ctx)?;
        if name.is_local() {
            ctx.locals.change(&name, change)?;
        } else {
            ctx.globals.change(&name, change)?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        let inner: String = self
            .parts
            .iter()
            .map(|part| match part {
                NamePart::Text(text) => text.clone(),
                NamePart::Expr(expr) => format!("%{}%", expr.describe()),
            })
            .collect();
        format!("{{{inner}}}")
    }
}

/// `a, b and c` or `a or b`
#[derive(Debug, Clone)]
pub struct ExprList {
    pub items: Vec<Expr>,
    pub and: bool,
}

impl ExprList {
    pub fn new(items: Vec<Expr>, and: bool) -> Self {
        Self { items, and }
    }

    fn return_type(&self) -> TypeName {
        let mut types = self.items.iter().map(Expr::return_type);
        match types.next() {
            Some(first) if types.all(|t| t == first) => first,
            _ => TypeName::OBJECT,
        }
    }

    /// An `or` list yields the values of its first non-empty item
    fn evaluate(&self, ctx: &ExecutionContext) -> RuntimeResult<Vec<Value>> {
        let mut values = Vec::new();
        for item in &self.items {
            let item_values = item.evaluate(ctx)?;
            if !self.and && !item_values.is_empty() {
                return Ok(item_values);
            }
            values.extend(item_values);
        }
        Ok(values)
    }

    fn describe(&self) -> String {
        let items: Vec<String> = self.items.iter().map(Expr::describe).collect();
        match items.split_last() {
            Some((last, rest)) if !rest.is_empty() => {
                let joiner = if self.and { "and" } else { "or" };
                format!("{} {joiner} {last}", rest.join(", "))
            }
            _ => items.concat(),
        }
    }
}

/// Runtime conversion of another expression's values
///
/// Values are converted to the first target type that takes them;
/// values no target accepts are dropped.
#[derive(Debug, Clone)]
pub struct CastExpr {
    pub inner: Box<Expr>,
    pub targets: Vec<TypeName>,
    types: Arc<TypeRegistry>,
}

impl CastExpr {
    pub fn new(inner: Expr, targets: Vec<TypeName>, types: Arc<TypeRegistry>) -> Self {
        Self {
            inner: Box::new(inner),
            targets,
            types,
        }
    }

    fn return_type(&self) -> TypeName {
        match self.targets.as_slice() {
            [single] => single.clone(),
            _ => TypeName::OBJECT,
        }
    }

    fn evaluate(&self, ctx: &ExecutionContext) -> RuntimeResult<Vec<Value>> {
        Ok(self
            .inner
            .evaluate(ctx)?
            .iter()
            .filter_map(|value| {
                self.targets
                    .iter()
                    .find_map(|target| self.types.convert(value, target))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable(name: &str) -> Expr {
        Expr::Variable(VariableExpr::new(vec![NamePart::Text(name.to_string())]))
    }

    #[test]
    fn test_literal() {
        let ctx = ExecutionContext::detached("test");
        let expr = Expr::literal(5.0);
        assert_eq!(expr.return_type(), TypeName::NUMBER);
        assert_eq!(expr.require(&ctx).unwrap(), Value::Number(5.0));
        assert!(!expr.is_changeable());
        assert_eq!(Expr::literal("hi").describe(), "\"hi\"");
    }

    #[test]
    fn test_variable_change_and_read() {
        let mut ctx = ExecutionContext::detached("test");
        let local = variable("_x");
        let global = variable("x");
        local.change(&mut ctx, &Change::Set(vec![Value::Number(1.0)])).unwrap();
        global.change(&mut ctx, &Change::Set(vec![Value::Number(2.0)])).unwrap();

        assert_eq!(local.evaluate(&ctx).unwrap(), vec![Value::Number(1.0)]);
        assert_eq!(global.evaluate(&ctx).unwrap(), vec![Value::Number(2.0)]);
        assert!(local.is_single());
        assert!(!variable("_l::*").is_single());
    }

    #[test]
    fn test_variable_name_with_expression() {
        let mut ctx = ExecutionContext::detached("test");
        let expr = Expr::Variable(VariableExpr::new(vec![
            NamePart::Text("score::".into()),
            NamePart::Expr(Expr::literal("steve")),
        ]));
        expr.change(&mut ctx, &Change::Set(vec![Value::Number(3.0)]))
            .unwrap();
        assert_eq!(
            variable("score::steve").evaluate(&ctx).unwrap(),
            vec![Value::Number(3.0)]
        );
        assert_eq!(expr.describe(), "{score::%\"steve\"%}");
    }

    #[test]
    fn test_or_list_takes_first_non_empty() {
        let ctx = ExecutionContext::detached("test");
        let list = Expr::List(ExprList::new(
            vec![variable("missing"), Expr::literal(1.0), Expr::literal(2.0)],
            false,
        ));
        assert_eq!(list.evaluate(&ctx).unwrap(), vec![Value::Number(1.0)]);
        assert!(!list.is_and_list());
        assert_eq!(list.describe(), "{missing}, 1 or 2");
    }

    #[test]
    fn test_cast_drops_unconvertible_values() {
        let ctx = ExecutionContext::detached("test");
        let types = Arc::new(TypeRegistry::with_builtin_types());
        let list = Expr::List(ExprList::new(
            vec![Expr::literal(1.0), Expr::literal("a")],
            true,
        ));
        let cast = Expr::Cast(CastExpr::new(list, vec![TypeName::NUMBER], types));
        assert_eq!(cast.evaluate(&ctx).unwrap(), vec![Value::Number(1.0)]);
        assert_eq!(cast.return_type(), TypeName::NUMBER);
    }
}
