//! Built-in conditions
//!
//! Comparisons follow the list semantics of their operands: an `and` list
//! needs every value to satisfy the relation, an `or` list needs one.
//! Operands without values never satisfy it.

use std::cmp::Ordering;

use sk_core::Value;
use sk_syntax::{
    Category, Condition, ConditionNode, ExecutionContext, Expr, ParseContext, ParseResult,
    RuntimeResult, SyntaxRegistry, SyntaxResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

impl Relation {
    fn from_mark(mark: i32) -> Self {
        match mark {
            1 => Relation::Greater,
            2 => Relation::GreaterOrEqual,
            3 => Relation::Less,
            4 => Relation::LessOrEqual,
            6 => Relation::NotEqual,
            _ => Relation::Equal,
        }
    }

    fn holds(self, left: &Value, right: &Value) -> bool {
        match self {
            Relation::Equal => left.loosely_equals(right),
            Relation::NotEqual => !left.loosely_equals(right),
            _ => match left.compare(right) {
                Some(ordering) => match self {
                    Relation::Greater => ordering == Ordering::Greater,
                    Relation::GreaterOrEqual => ordering != Ordering::Less,
                    Relation::Less => ordering == Ordering::Less,
                    Relation::LessOrEqual => ordering != Ordering::Greater,
                    Relation::Equal | Relation::NotEqual => false,
                },
                None => false,
            },
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Relation::Equal => "is",
            Relation::NotEqual => "is not",
            Relation::Greater => "is greater than",
            Relation::GreaterOrEqual => "is greater than or equal to",
            Relation::Less => "is less than",
            Relation::LessOrEqual => "is less than or equal to",
        }
    }
}

#[derive(Debug)]
struct Compare {
    left: Expr,
    relation: Relation,
    right: Expr,
}

impl Condition for Compare {
    fn check(&self, ctx: &ExecutionContext) -> RuntimeResult<bool> {
        let left = self.left.evaluate(ctx)?;
        let right = self.right.evaluate(ctx)?;
        if left.is_empty() || right.is_empty() {
            return Ok(false);
        }
        Ok(quantify(&left, self.left.is_and_list(), |l| {
            quantify(&right, self.right.is_and_list(), |r| self.relation.holds(l, r))
        }))
    }

    fn describe(&self) -> String {
        format!("{} {} {}", self.left, self.relation.describe(), self.right)
    }
}

fn quantify(values: &[Value], and: bool, check: impl Fn(&Value) -> bool) -> bool {
    if and {
        values.iter().all(check)
    } else {
        values.iter().any(check)
    }
}

#[derive(Debug)]
struct IsSet(Expr);

impl Condition for IsSet {
    fn check(&self, ctx: &ExecutionContext) -> RuntimeResult<bool> {
        Ok(!self.0.evaluate(ctx)?.is_empty())
    }

    fn describe(&self) -> String {
        format!("{} is set", self.0)
    }
}

fn compare(mut result: ParseResult, relation: Relation) -> Result<ConditionNode, String> {
    let left = result.take(0)?;
    let right = result.take(1)?;
    Ok(ConditionNode::new(Compare {
        left,
        relation,
        right,
    })
    .negate(result.has_tag("not")))
}

pub(super) fn register(syntax: &SyntaxRegistry) -> SyntaxResult<()> {
    // `isn't not` cancels out
    syntax.register(
        Category::Condition,
        "%objects% (is|are|1¦isn't|1¦aren't) [1¦not] %objects%",
        0,
        |result: ParseResult, _: &ParseContext| {
            let negated = result.mark != 0;
            Ok(compare(result, Relation::Equal)?.negate(negated))
        },
    )?;
    syntax.register(
        Category::Condition,
        "%objects% (is|are) [:not] (greater|more|higher|bigger) than %objects%",
        0,
        |result: ParseResult, _: &ParseContext| compare(result, Relation::Greater),
    )?;
    syntax.register(
        Category::Condition,
        "%objects% (is|are) [:not] (greater|more) than or equal to %objects%",
        0,
        |result: ParseResult, _: &ParseContext| compare(result, Relation::GreaterOrEqual),
    )?;
    syntax.register(
        Category::Condition,
        "%objects% (is|are) [:not] (less|smaller|lower) than %objects%",
        0,
        |result: ParseResult, _: &ParseContext| compare(result, Relation::Less),
    )?;
    syntax.register(
        Category::Condition,
        "%objects% (is|are) [:not] (less|smaller) than or equal to %objects%",
        0,
        |result: ParseResult, _: &ParseContext| compare(result, Relation::LessOrEqual),
    )?;
    syntax.register(
        Category::Condition,
        r"%objects% (1¦\>|2¦\>=|3¦\<|4¦\<=|5¦=|6¦!=) %objects%",
        0,
        |result: ParseResult, _: &ParseContext| {
            let relation = Relation::from_mark(result.mark);
            compare(result, relation)
        },
    )?;
    syntax.register(
        Category::Condition,
        "%~objects% (is|are|1¦isn't|1¦aren't) [1¦not] set",
        0,
        |mut result: ParseResult, _: &ParseContext| {
            let negated = result.mark != 0;
            Ok(ConditionNode::new(IsSet(result.take(0)?)).negate(negated))
        },
    )?;
    Ok(())
}
