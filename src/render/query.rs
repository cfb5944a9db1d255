//! jq filters over JSON values.
//!
//! Filters are parsed and compiled once with `jaq`, with the standard library
//! and the JSON functions loaded, so the usual jq vocabulary (`select`, `map`,
//! object construction, comparisons, `//`, `has`, ...) is available. A filter
//! produces zero or more values for one input.

use std::fmt;
use std::sync::Arc;

use jaq_core::load::{Arena, File, Loader};
use jaq_core::{Compiler, Ctx, Filter, Native, RcIter};
use jaq_json::Val;
use serde_json::Value;

use crate::error_handling::{ConfigError, RenderError};

/// A compiled filter.
#[derive(Clone)]
pub struct Query {
    source: String,
    filter: Arc<Filter<Native<Val>>>,
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query").field("source", &self.source).finish_non_exhaustive()
    }
}

impl Query {
    /// Parses and compiles a filter expression.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidFilter` on a syntax error or a reference to
    /// an undefined function or variable.
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        if source.trim().is_empty() {
            return Err(ConfigError::InvalidFilter("empty filter".into()));
        }
        let loader = Loader::new(jaq_std::defs().chain(jaq_json::defs()));
        let arena = Arena::default();
        let modules = loader
            .load(&arena, File { code: source, path: () })
            .map_err(|_| ConfigError::InvalidFilter(format!("{source}: syntax error")))?;
        let filter = Compiler::default()
            .with_funs(jaq_std::funs().chain(jaq_json::funs()))
            .compile(modules)
            .map_err(|_| ConfigError::InvalidFilter(format!("{source}: undefined function or variable")))?;
        Ok(Self {
            source: source.to_string(),
            filter: Arc::new(filter),
        })
    }

    /// The filter as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Runs the filter on `input`.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::Query` on the first runtime error of the filter.
    pub fn run(&self, input: &Value) -> Result<Vec<Value>, RenderError> {
        let inputs = RcIter::new(core::iter::empty());
        self.filter
            .run((Ctx::new([], &inputs), Val::from(input.clone())))
            .map(|result| -> Result<Value, RenderError> {
                let value = result.map_err(|e| RenderError::Query(e.to_string()))?;
                // Val prints itself as JSON text
                Ok(serde_json::from_str::<Value>(&value.to_string())?)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(filter: &str, input: Value) -> Vec<Value> {
        Query::parse(filter).unwrap().run(&input).unwrap()
    }

    fn items() -> Value {
        json!({"items": [{"name": "x", "n": 1}, {"name": "y", "n": 2}]})
    }

    #[test]
    fn test_identity() {
        let doc = json!({"a": [1, 2]});
        assert_eq!(run(".", doc.clone()), vec![doc]);
    }

    #[test]
    fn test_fields_and_indexes() {
        let doc = json!({"a": {"b": [10, 20, 30]}, "odd key": true});
        assert_eq!(run(".a.b[1]", doc.clone()), vec![json!(20)]);
        assert_eq!(run(".a.b[-1]", doc.clone()), vec![json!(30)]);
        assert_eq!(run(".a.b[9]", doc.clone()), vec![Value::Null]);
        assert_eq!(run(".missing.deeper", doc.clone()), vec![Value::Null]);
        assert_eq!(run(".[\"odd key\"]", doc), vec![json!(true)]);
    }

    #[test]
    fn test_iterate_pipe_and_comma() {
        let doc = items();
        assert_eq!(run(".items[].name", doc.clone()), vec![json!("x"), json!("y")]);
        assert_eq!(run(".items[] | .n", doc.clone()), vec![json!(1), json!(2)]);
        assert_eq!(
            run(".items[0].name, .items[1].n", doc.clone()),
            vec![json!("x"), json!(2)]
        );
        assert_eq!(run(".items | length", doc.clone()), vec![json!(2)]);
        assert_eq!(run("(.items[0] | keys)[0]", doc), vec![json!("n")]);
    }

    #[test]
    fn test_select_and_comparisons() {
        assert_eq!(run(".items[] | select(.n > 1) | .name", items()), vec![json!("y")]);
        assert_eq!(run(".items[0].n + 1 == 2", items()), vec![json!(true)]);
    }

    #[test]
    fn test_map() {
        assert_eq!(run(".items | map(.name)", items()), vec![json!(["x", "y"])]);
    }

    #[test]
    fn test_object_construction() {
        assert_eq!(
            run("{first: .items[0].name, count: (.items | length)}", items()),
            vec![json!({"first": "x", "count": 2})]
        );
    }

    #[test]
    fn test_alternative_and_has() {
        assert_eq!(run(".missing // \"default\"", items()), vec![json!("default")]);
        assert_eq!(run("has(\"items\"), has(\"other\")", items()), vec![json!(true), json!(false)]);
    }

    #[test]
    fn test_runtime_errors() {
        let query = Query::parse(".a").unwrap();
        assert!(matches!(query.run(&json!([1])), Err(RenderError::Query(_))));
        let query = Query::parse(".[]").unwrap();
        assert!(matches!(query.run(&json!(3)), Err(RenderError::Query(_))));
    }

    #[test]
    fn test_syntax_errors() {
        for filter in ["", "  ", ".[", ".a |", "foo", ".a ]", "\"x"] {
            assert!(
                matches!(Query::parse(filter), Err(ConfigError::InvalidFilter(_))),
                "{filter} should not parse"
            );
        }
    }

    #[test]
    fn test_source_is_kept() {
        assert_eq!(Query::parse(".items[]").unwrap().source(), ".items[]");
    }
}
