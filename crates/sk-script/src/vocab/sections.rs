//! Sections, structures and events

use sk_core::events::SCRIPT_LOAD;
use sk_core::Value;
use sk_syntax::{
    Category, EventMatcher, Node, ParseContext, ParseResult, SectionNode, StructureNode,
    SyntaxRegistry, SyntaxResult,
};

fn condition(result: &ParseResult, ctx: &ParseContext) -> Result<sk_syntax::ConditionNode, String> {
    let text = result.regex(0).ok_or("missing condition")?;
    ctx.parse_condition(text)
        .map_err(|failure| failure.message("condition"))
}

fn literal_text(result: &mut ParseResult) -> Result<String, String> {
    let expr = result.take(0)?;
    expr.constant_values()
        .and_then(|values| values.into_iter().next())
        .map(|value| value.to_string())
        .ok_or_else(|| format!("'{}' needs a literal text", result.input))
}

fn register_sections(syntax: &SyntaxRegistry) -> SyntaxResult<()> {
    syntax.register(Category::Section, "if <.+>", 0, |result: ParseResult, ctx: &ParseContext| {
        Ok(SectionNode::If(condition(&result, ctx)?))
    })?;
    syntax.register(
        Category::Section,
        "else if <.+>",
        0,
        |result: ParseResult, ctx: &ParseContext| Ok(SectionNode::ElseIf(condition(&result, ctx)?)),
    )?;
    syntax.register(Category::Section, "else", 0, |_: ParseResult, _: &ParseContext| {
        Ok(SectionNode::Else)
    })?;
    // Ahead of `loop %objects%`
    syntax.register(
        Category::Section,
        "loop %number% times",
        1,
        |mut result: ParseResult, _: &ParseContext| Ok(SectionNode::Times(result.take(0)?)),
    )?;
    syntax.register(
        Category::Section,
        "loop %objects%",
        0,
        |mut result: ParseResult, _: &ParseContext| Ok(SectionNode::Loop(result.take(0)?)),
    )?;
    syntax.register(Category::Section, "while <.+>", 0, |result: ParseResult, ctx: &ParseContext| {
        Ok(SectionNode::While(condition(&result, ctx)?))
    })?;
    Ok(())
}

fn register_structures(syntax: &SyntaxRegistry) -> SyntaxResult<()> {
    syntax.register(Category::Structure, "on <.+>", 0, |result: ParseResult, ctx: &ParseContext| {
        let text = result.regex(0).ok_or("missing event")?;
        match ctx.parse(text, Category::Event) {
            Ok(Node::Event(matcher)) => Ok(StructureNode::Event(matcher)),
            Ok(other) => Err(format!("'{text}' is a {}, not an event", other.kind())),
            Err(failure) => Err(failure.message("event")),
        }
    })?;
    syntax.register(
        Category::Structure,
        "every %*timespan%",
        0,
        |mut result: ParseResult, _: &ParseContext| {
            let interval = result
                .take(0)?
                .constant_values()
                .and_then(|values| values.first().and_then(Value::as_timespan))
                .ok_or("the interval must be a timespan")?;
            if interval.is_zero() {
                return Err("the interval must be longer than zero".to_string());
            }
            Ok(StructureNode::Periodic(interval))
        },
    )?;
    Ok(())
}

fn register_events(syntax: &SyntaxRegistry) -> SyntaxResult<()> {
    syntax.register(Category::Event, "[script] load", 0, |_: ParseResult, _: &ParseContext| {
        Ok(EventMatcher::new(SCRIPT_LOAD, "script load"))
    })?;
    syntax.register(
        Category::Event,
        "custom event %*text%",
        0,
        |mut result: ParseResult, _: &ParseContext| {
            let name = literal_text(&mut result)?;
            if name.trim().is_empty() {
                return Err("a custom event needs a name".to_string());
            }
            Ok(EventMatcher::new(name.as_str(), format!("custom event \"{name}\"")))
        },
    )?;
    syntax.register(
        Category::Event,
        "[player] (join|joining)",
        0,
        |_: ParseResult, _: &ParseContext| Ok(EventMatcher::new("join", "join")),
    )?;
    syntax.register(
        Category::Event,
        "[player] (quit|leave|leaving)",
        0,
        |_: ParseResult, _: &ParseContext| Ok(EventMatcher::new("quit", "quit")),
    )?;
    syntax.register(
        Category::Event,
        "chat [message]",
        0,
        |_: ParseResult, _: &ParseContext| Ok(EventMatcher::new("chat", "chat")),
    )?;
    syntax.register(
        Category::Event,
        "chat [message] containing %*text%",
        0,
        |mut result: ParseResult, _: &ParseContext| {
            let needle = literal_text(&mut result)?.to_lowercase();
            let description = format!("chat containing \"{needle}\"");
            Ok(EventMatcher::new("chat", description).with_filter(move |event| {
                event
                    .field("message")
                    .and_then(|message| message.as_str())
                    .is_some_and(|message| message.to_lowercase().contains(&needle))
            }))
        },
    )?;
    Ok(())
}

pub(super) fn register(syntax: &SyntaxRegistry) -> SyntaxResult<()> {
    register_sections(syntax)?;
    register_structures(syntax)?;
    register_events(syntax)
}
