//! Function declarations, calls and `return`

use std::sync::Arc;

use sk_core::{TypeName, Value};
use sk_syntax::{
    Category, Effect, EffectNode, ExecutionContext, Expr, Expression, FunctionRegistry,
    Parameter, ParseContext, ParseResult, ReturnType, RuntimeError, RuntimeResult, Signature,
    StructureNode, SyntaxRegistry, SyntaxResult,
};

const CALL_PATTERN: &str = r"<[A-Za-z_][A-Za-z0-9_]*>\([<.+>]\)";

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `type` or `types`; unknown names are refused
fn declared_type(written: &str, ctx: &ParseContext) -> Result<(TypeName, bool), String> {
    ctx.types()
        .lookup(written.trim())
        .map(|(info, plural)| (info.name.clone(), plural))
        .ok_or_else(|| format!("'{}' is not a type", written.trim()))
}

/// `name(param: type, ...) :: type`
fn signature(header: &str, ctx: &ParseContext) -> Result<Signature, String> {
    let (call, returns) = match header.split_once("::") {
        Some((call, returns)) => (call.trim(), Some(returns)),
        None => (header.trim(), None),
    };
    let (name, parameters) = call
        .strip_suffix(')')
        .and_then(|call| call.split_once('('))
        .ok_or_else(|| format!("'{header}' is not a function header; use name(param: type)"))?;
    let name = name.trim();
    if !is_identifier(name) {
        return Err(format!("'{name}' is not a valid function name"));
    }

    let mut declared: Vec<Parameter> = Vec::new();
    for parameter in parameters.split(',').filter(|p| !p.trim().is_empty()) {
        let (param, written) = parameter
            .split_once(':')
            .ok_or_else(|| format!("parameter '{}' needs a type", parameter.trim()))?;
        let param = param.trim();
        if !is_identifier(param) {
            return Err(format!("'{param}' is not a valid parameter name"));
        }
        if declared.iter().any(|p| p.name.eq_ignore_ascii_case(param)) {
            return Err(format!("parameter '{param}' is declared twice"));
        }
        let (type_name, plural) = declared_type(written, ctx)?;
        declared.push(Parameter {
            name: param.to_string(),
            type_name,
            plural,
        });
    }

    let returns = returns
        .map(|written| declared_type(written, ctx))
        .transpose()?
        .map(|(type_name, plural)| ReturnType { type_name, plural });
    Ok(Signature {
        name: name.to_string(),
        script: String::new(),
        parameters: declared,
        returns,
    })
}

/// Arguments at the top level, outside quotes and brackets
fn split_arguments(text: &str) -> Vec<&str> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let mut arguments = Vec::new();
    let mut quoted = false;
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '"' => quoted = !quoted,
            _ if quoted => {}
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                arguments.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    arguments.push(text[start..].trim());
    arguments
}

#[derive(Debug)]
struct Call {
    name: String,
    functions: Arc<FunctionRegistry>,
    arguments: Vec<Expr>,
    returns: Option<ReturnType>,
}

impl Call {
    fn invoke(&self, ctx: &ExecutionContext) -> RuntimeResult<Vec<Value>> {
        let function = self
            .functions
            .get(&self.name)
            .ok_or_else(|| RuntimeError::Failed(format!("function '{}' is not loaded", self.name)))?;
        let arguments = self
            .arguments
            .iter()
            .map(|argument| argument.evaluate(ctx))
            .collect::<RuntimeResult<Vec<_>>>()?;
        function.call(arguments, ctx)
    }
}

impl Expression for Call {
    fn return_type(&self) -> TypeName {
        self.returns
            .as_ref()
            .map_or(TypeName::OBJECT, |returns| returns.type_name.clone())
    }

    fn is_single(&self) -> bool {
        self.returns.as_ref().map_or(true, |returns| !returns.plural)
    }

    fn evaluate(&self, ctx: &ExecutionContext) -> RuntimeResult<Vec<Value>> {
        self.invoke(ctx)
    }

    fn describe(&self) -> String {
        let arguments: Vec<String> = self.arguments.iter().map(Expr::describe).collect();
        format!("{}({})", self.name, arguments.join(", "))
    }
}

/// A call whose result is dropped
#[derive(Debug)]
struct CallEffect(Call);

impl Effect for CallEffect {
    fn execute(&self, ctx: &mut ExecutionContext) -> RuntimeResult<()> {
        self.0.invoke(ctx).map(drop)
    }

    fn describe(&self) -> String {
        self.0.describe()
    }
}

/// Resolve a call against the declared signature
fn call(result: &ParseResult, ctx: &ParseContext) -> Result<Call, String> {
    let name = result.regex(0).ok_or("missing function name")?;
    let functions = Arc::clone(ctx.parser().syntax().functions());
    let function = functions
        .get(name)
        .ok_or_else(|| format!("'{name}' is not a function"))?;
    let signature = &function.signature;

    let written = split_arguments(result.regex(1).unwrap_or(""));
    if written.len() != signature.parameters.len() {
        return Err(format!(
            "{signature} takes {} arguments, but {} were given",
            signature.parameters.len(),
            written.len()
        ));
    }
    let mut arguments = Vec::with_capacity(written.len());
    for (text, parameter) in written.into_iter().zip(&signature.parameters) {
        let expr = ctx
            .resolve(text, std::slice::from_ref(&parameter.type_name))
            .ok_or_else(|| {
                format!(
                    "'{text}' is not a {} for parameter '{}' of {}",
                    parameter.type_name, parameter.name, signature.name
                )
            })?;
        if !parameter.plural && !expr.is_single() {
            return Err(format!(
                "parameter '{}' of {} takes a single {}",
                parameter.name, signature.name, parameter.type_name
            ));
        }
        arguments.push(expr);
    }

    Ok(Call {
        name: signature.name.clone(),
        functions: Arc::clone(&functions),
        arguments,
        returns: signature.returns.clone(),
    })
}

pub(super) fn register(syntax: &SyntaxRegistry) -> SyntaxResult<()> {
    syntax.register(
        Category::Structure,
        "function <.+>",
        0,
        |result: ParseResult, ctx: &ParseContext| {
            let header = result.regex(0).ok_or("missing function header")?;
            Ok(StructureNode::Function(signature(header, ctx)?))
        },
    )?;

    syntax.register(
        Category::Function,
        CALL_PATTERN,
        0,
        |result: ParseResult, ctx: &ParseContext| {
            let call = call(&result, ctx)?;
            if call.returns.is_none() {
                return Err(format!("{} does not return a value", call.name));
            }
            Ok(Expr::custom(call))
        },
    )?;
    syntax.register(
        Category::Effect,
        CALL_PATTERN,
        0,
        |result: ParseResult, ctx: &ParseContext| Ok(EffectNode::run(CallEffect(call(&result, ctx)?))),
    )?;

    syntax.register(Category::Effect, "return <.+>", 0, |result: ParseResult, ctx: &ParseContext| {
        let text = result.regex(0).ok_or("missing return value")?;
        let signature = ctx
            .scope
            .function
            .as_ref()
            .ok_or("'return' can only be used in a function")?;
        let returns = signature
            .returns
            .as_ref()
            .ok_or_else(|| format!("{} does not return a value", signature.name))?;
        let value = ctx
            .resolve(text, std::slice::from_ref(&returns.type_name))
            .ok_or_else(|| format!("'{text}' is not a {}", returns.type_name))?;
        if !returns.plural && !value.is_single() {
            return Err(format!("{} returns a single {}", signature.name, returns.type_name));
        }
        Ok(EffectNode::Return(value))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_arguments() {
        assert_eq!(split_arguments(""), Vec::<&str>::new());
        assert_eq!(split_arguments("1"), vec!["1"]);
        assert_eq!(
            split_arguments(r#"max(1, 2), "a, b", {_x::*}"#),
            vec!["max(1, 2)", r#""a, b""#, "{_x::*}"]
        );
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("double"));
        assert!(is_identifier("_private2"));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("two words"));
    }
}
