//! Type registry and single-step converters

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use sk_core::{parse_timespan, TypeName, Value};
use tracing::{debug, instrument};

use crate::error::{SyntaxError, SyntaxResult};
use crate::expr::Expr;
use crate::literals::{parse_boolean, parse_number, parse_text};

type LiteralParser = Arc<dyn Fn(&str) -> Option<Value> + Send + Sync>;
type DefaultExpression = Arc<dyn Fn() -> Expr + Send + Sync>;
type ConvertFn = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// A registered value type
#[derive(Clone)]
pub struct TypeInfo {
    pub name: TypeName,
    /// Plural form used in patterns to accept lists, e.g. `numbers`
    pub plural: String,
    /// Every type except `object` is a subtype of `object`
    pub supertype: Option<TypeName>,
    parser: Option<LiteralParser>,
    default: Option<DefaultExpression>,
}

impl TypeInfo {
    pub fn new(name: TypeName) -> Self {
        let plural = format!("{}s", name.as_str());
        let supertype = (name != TypeName::OBJECT).then_some(TypeName::OBJECT);
        Self {
            name,
            plural,
            supertype,
            parser: None,
            default: None,
        }
    }

    pub fn plural(mut self, plural: impl Into<String>) -> Self {
        self.plural = plural.into();
        self
    }

    pub fn supertype(mut self, supertype: TypeName) -> Self {
        self.supertype = Some(supertype);
        self
    }

    pub fn parser(mut self, parser: impl Fn(&str) -> Option<Value> + Send + Sync + 'static) -> Self {
        self.parser = Some(Arc::new(parser));
        self
    }

    /// Expression used when a required placeholder of this type is left out
    pub fn default_expression(mut self, default: impl Fn() -> Expr + Send + Sync + 'static) -> Self {
        self.default = Some(Arc::new(default));
        self
    }

    pub fn parse(&self, text: &str) -> Option<Value> {
        self.parser.as_ref().and_then(|parse| parse(text))
    }

    pub fn default_expr(&self) -> Option<Expr> {
        self.default.as_ref().map(|default| default())
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("name", &self.name)
            .field("plural", &self.plural)
            .field("supertype", &self.supertype)
            .field("has_parser", &self.parser.is_some())
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

/// A registered conversion from one type to another
#[derive(Clone)]
pub struct Converter {
    pub from: TypeName,
    pub to: TypeName,
    convert: ConvertFn,
}

impl Converter {
    pub fn convert(&self, value: &Value) -> Option<Value> {
        (self.convert)(value)
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Converter({} -> {})", self.from, self.to)
    }
}

/// Types and converters known to the parser
///
/// Types keep their registration order, which is also the order literal
/// parsers are tried in when any type is accepted.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: RwLock<IndexMap<String, Arc<TypeInfo>>>,
    converters: RwLock<Vec<Converter>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `object`, `boolean`, `number`, `text`, `timespan`
    /// and `json`
    pub fn with_builtin_types() -> Self {
        let registry = Self::new();
        let builtin = [
            TypeInfo::new(TypeName::OBJECT),
            TypeInfo::new(TypeName::BOOLEAN).parser(|s| parse_boolean(s).map(Value::Boolean)),
            TypeInfo::new(TypeName::NUMBER).parser(|s| parse_number(s).map(Value::Number)),
            TypeInfo::new(TypeName::TEXT).parser(|s| parse_text(s).map(Value::Text)),
            TypeInfo::new(TypeName::TIMESPAN).parser(|s| parse_timespan(s).map(Value::Timespan)),
            TypeInfo::new(TypeName::JSON),
        ];
        for info in builtin {
            // Names are distinct, registration cannot fail
            let _ = registry.register(info);
        }
        registry
    }

    #[instrument(skip(self, info), fields(type_name = %info.name))]
    pub fn register(&self, info: TypeInfo) -> SyntaxResult<()> {
        let mut types = self.types.write();
        let key = info.name.as_str().to_string();
        if types.contains_key(&key) {
            return Err(SyntaxError::DuplicateType(key));
        }
        debug!(plural = %info.plural, "Registering type");
        types.insert(key, Arc::new(info));
        Ok(())
    }

    /// Attach a default expression to an already registered type
    pub fn set_default_expression(
        &self,
        name: &TypeName,
        default: impl Fn() -> Expr + Send + Sync + 'static,
    ) -> SyntaxResult<()> {
        let mut types = self.types.write();
        let info = types
            .get_mut(name.as_str())
            .ok_or_else(|| SyntaxError::UnknownType {
                pattern: String::new(),
                type_name: name.to_string(),
            })?;
        let updated = (**info).clone().default_expression(default);
        *info = Arc::new(updated);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<TypeInfo>> {
        self.types.read().get(name).cloned()
    }

    /// Find a type by the name written in a pattern
    ///
    /// Returns the type and whether the plural form was used.
    pub fn lookup(&self, written: &str) -> Option<(Arc<TypeInfo>, bool)> {
        let types = self.types.read();
        if let Some(info) = types.get(written) {
            return Some((Arc::clone(info), info.plural == written));
        }
        types
            .values()
            .find(|info| info.plural == written)
            .map(|info| (Arc::clone(info), true))
    }

    pub fn names(&self) -> Vec<TypeName> {
        self.types.read().values().map(|t| t.name.clone()).collect()
    }

    /// Whether values of `from` can be used where `to` is expected
    pub fn is_assignable(&self, from: &TypeName, to: &TypeName) -> bool {
        if to == &TypeName::OBJECT || from == to {
            return true;
        }
        let types = self.types.read();
        let mut current = types.get(from.as_str()).and_then(|t| t.supertype.clone());
        // Bounded by the number of types in case of a cyclic declaration
        for _ in 0..types.len() {
            match current {
                Some(ref t) if t == to => return true,
                Some(ref t) => current = types.get(t.as_str()).and_then(|i| i.supertype.clone()),
                None => return false,
            }
        }
        false
    }

    /// Parse `text` as a literal of the first accepted type that takes it
    pub fn parse_literal(&self, text: &str, accepted: &[TypeName]) -> Option<Value> {
        let types = self.types.read();
        for name in accepted {
            if name == &TypeName::OBJECT {
                if let Some(value) = types.values().find_map(|t| t.parse(text)) {
                    return Some(value);
                }
            } else if let Some(value) = types.get(name.as_str()).and_then(|t| t.parse(text)) {
                return Some(value);
            }
        }
        None
    }

    #[instrument(skip(self, convert))]
    pub fn register_converter(
        &self,
        from: TypeName,
        to: TypeName,
        convert: impl Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    ) {
        debug!("Registering converter");
        self.converters.write().push(Converter {
            from,
            to,
            convert: Arc::new(convert),
        });
    }

    /// First declared converter taking `from` to `to`
    pub fn converter(&self, from: &TypeName, to: &TypeName) -> Option<Converter> {
        self.converters
            .read()
            .iter()
            .find(|c| self.is_assignable(from, &c.from) && self.is_assignable(&c.to, to))
            .cloned()
    }

    /// Convert a runtime value to `to` in at most one step
    pub fn convert(&self, value: &Value, to: &TypeName) -> Option<Value> {
        let from = value.type_name();
        if self.is_assignable(&from, to) {
            return Some(value.clone());
        }
        self.converter(&from, to)?.convert(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_literals() {
        let types = TypeRegistry::with_builtin_types();
        assert_eq!(
            types.parse_literal("5", &[TypeName::NUMBER]),
            Some(Value::Number(5.0))
        );
        assert_eq!(types.parse_literal("5", &[TypeName::TEXT]), None);
        assert_eq!(
            types.parse_literal("\"5\"", &[TypeName::OBJECT]),
            Some(Value::text("5"))
        );
        assert!(matches!(
            types.parse_literal("2 seconds", &[TypeName::OBJECT]),
            Some(Value::Timespan(_))
        ));
        assert_eq!(types.parse_literal("hello", &[TypeName::OBJECT]), None);
    }

    #[test]
    fn test_lookup_plural() {
        let types = TypeRegistry::with_builtin_types();
        let (info, plural) = types.lookup("numbers").unwrap();
        assert_eq!(info.name, TypeName::NUMBER);
        assert!(plural);

        let (_, plural) = types.lookup("number").unwrap();
        assert!(!plural);
        assert!(types.lookup("player").is_none());
    }

    #[test]
    fn test_assignability() {
        let types = TypeRegistry::with_builtin_types();
        assert!(types.is_assignable(&TypeName::NUMBER, &TypeName::OBJECT));
        assert!(!types.is_assignable(&TypeName::OBJECT, &TypeName::NUMBER));
        assert!(!types.is_assignable(&TypeName::TEXT, &TypeName::NUMBER));
    }

    #[test]
    fn test_duplicate_type() {
        let types = TypeRegistry::with_builtin_types();
        assert!(matches!(
            types.register(TypeInfo::new(TypeName::NUMBER)),
            Err(SyntaxError::DuplicateType(_))
        ));
    }

    #[test]
    fn test_set_default_expression() {
        let types = TypeRegistry::with_builtin_types();
        assert!(types.get("number").unwrap().default_expr().is_none());
        types
            .set_default_expression(&TypeName::NUMBER, || Expr::literal(1.0))
            .unwrap();
        let default = types.get("number").unwrap().default_expr().unwrap();
        assert_eq!(default.constant_values(), Some(vec![Value::Number(1.0)]));
        assert!(types
            .set_default_expression(&TypeName::new("player").unwrap(), || Expr::literal(1.0))
            .is_err());
    }

    #[test]
    fn test_single_step_conversion() {
        let types = TypeRegistry::with_builtin_types();
        types.register_converter(TypeName::NUMBER, TypeName::TEXT, |v| {
            Some(Value::text(v.to_string()))
        });
        assert_eq!(
            types.convert(&Value::Number(3.0), &TypeName::TEXT),
            Some(Value::text("3"))
        );
        assert_eq!(types.convert(&Value::Boolean(true), &TypeName::NUMBER), None);
        assert!(types.converter(&TypeName::NUMBER, &TypeName::TEXT).is_some());
        assert!(types.converter(&TypeName::TEXT, &TypeName::NUMBER).is_none());
    }
}
