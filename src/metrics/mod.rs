// Metrics module - the model of a single extractable metric
//
// A MetricDefinition binds three things together:
// 1. a compiled path expression (where the value lives in the document)
// 2. a descriptor (name, help text, label schema)
// 3. a value transform (how the raw JSON value becomes a gauge value)
//
// Both collection strategies (pull-on-demand collectors and the timer-driven
// per-node scrapers) are built from these definitions. The per-family
// submodules hold the built-in definitions for each Elasticsearch endpoint.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::path::{CompiledPath, PathError};

pub mod cluster;
pub mod jvm;
pub mod node;
pub mod siren;
pub mod snapshot;

/// Namespace prefixed to every exported metric name
pub const NAMESPACE: &str = "es";

/// Builds a namespaced metric name, e.g. `metric_name("up")` -> `es_up`
pub fn metric_name(name: &str) -> String {
    format!("{}_{}", NAMESPACE, name)
}

/// Errors raised by a value transform
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("expected a number, found {0}")]
    NotNumeric(&'static str),

    #[error("expected a string, found {0}")]
    NotString(&'static str),

    #[error("expected a boolean, found {0}")]
    NotBoolean(&'static str),

    #[error("{0}")]
    Custom(String),
}

/// Errors raised while extracting one metric from one document
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("path `{path}` not found")]
    PathNotFound { path: String },

    #[error("type mismatch at `{path}`: {source}")]
    TypeMismatch {
        path: String,
        #[source]
        source: TransformError,
    },
}

/// Errors raised while building a metric definition or an observation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DefinitionError {
    #[error(transparent)]
    InvalidPath(#[from] PathError),

    #[error("metric '{name}' declares {expected} label(s) but {actual} value(s) were supplied")]
    LabelArity {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// Returns the JSON type name of a value, used in error messages
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Immutable identity of a published metric
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Descriptor {
    name: String,
    help: String,
    label_names: Vec<String>,
}

impl Descriptor {
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Descriptor {
            name: name.into(),
            help: help.into(),
            label_names: Vec::new(),
        }
    }

    /// Declares the label schema of this metric
    pub fn with_label_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.label_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }
}

/// Signature of a caller-supplied transform
pub type TransformFn = dyn Fn(&Value) -> Result<f64, TransformError> + Send + Sync;

/// Converts a raw extracted value into a gauge value
#[derive(Clone, Default)]
pub enum Transform {
    /// Succeeds only for JSON numbers
    #[default]
    Identity,

    /// `1.0` when the string equals the category, `0.0` for any other string
    CategoricalEquals(String),

    /// Arbitrary conversion, e.g. booleans or unit scaling
    Custom(Arc<TransformFn>),
}

impl Transform {
    /// Wraps a closure as a custom transform
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<f64, TransformError> + Send + Sync + 'static,
    {
        Transform::Custom(Arc::new(f))
    }

    /// Maps `true` to `1.0` and `false` to `0.0`
    pub fn boolean() -> Self {
        Transform::custom(|value| match value {
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            other => Err(TransformError::NotBoolean(kind_of(other))),
        })
    }

    /// Divides a numeric value by a constant, e.g. milliseconds to seconds
    pub fn divided_by(divisor: f64) -> Self {
        Transform::custom(move |value| as_number(value).map(|n| n / divisor))
    }

    pub fn apply(&self, value: &Value) -> Result<f64, TransformError> {
        match self {
            Transform::Identity => as_number(value),
            Transform::CategoricalEquals(category) => match value {
                Value::String(s) => Ok(if s == category { 1.0 } else { 0.0 }),
                other => Err(TransformError::NotString(kind_of(other))),
            },
            Transform::Custom(f) => f(value),
        }
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Identity => f.write_str("Identity"),
            Transform::CategoricalEquals(category) => {
                f.debug_tuple("CategoricalEquals").field(category).finish()
            }
            Transform::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

fn as_number(value: &Value) -> Result<f64, TransformError> {
    value
        .as_f64()
        .ok_or_else(|| TransformError::NotNumeric(kind_of(value)))
}

/// One named, independently evaluable metric
///
/// Definitions are built once at startup and never mutated afterwards, so
/// they can be shared freely between the scrape loop and exposition requests.
///
/// # Example
/// ```
/// use es_exporter::metrics::{Descriptor, MetricDefinition, Transform};
///
/// let green = MetricDefinition::new(
///     "status",
///     Descriptor::new("es_cluster_status", "Cluster health status").with_label_names(["color"]),
/// )
/// .unwrap()
/// .with_label_values(["green"])
/// .unwrap()
/// .with_transform(Transform::CategoricalEquals("green".to_string()));
///
/// assert_eq!(green.path(), Some("status"));
/// ```
#[derive(Debug, Clone)]
pub struct MetricDefinition {
    path: Option<CompiledPath>,
    descriptor: Arc<Descriptor>,
    label_values: Vec<String>,
    transform: Transform,
}

impl MetricDefinition {
    /// Compiles `path` and binds it to `descriptor` with the identity transform
    ///
    /// # Errors
    /// Returns `DefinitionError::InvalidPath` when the path does not compile.
    pub fn new(path: &str, descriptor: Descriptor) -> Result<Self, DefinitionError> {
        let compiled = CompiledPath::compile(path)?;
        Ok(MetricDefinition {
            path: Some(compiled),
            descriptor: Arc::new(descriptor),
            label_values: Vec::new(),
            transform: Transform::Identity,
        })
    }

    /// Builds the path-less, label-less liveness indicator of a collector
    pub fn liveness(name: impl Into<String>, help: impl Into<String>) -> Self {
        MetricDefinition {
            path: None,
            descriptor: Arc::new(Descriptor::new(name, help)),
            label_values: Vec::new(),
            transform: Transform::Identity,
        }
    }

    /// Fixes the label values emitted with every observation
    ///
    /// # Errors
    /// Returns `DefinitionError::LabelArity` when the number of values does
    /// not match the descriptor's label names.
    pub fn with_label_values<I, S>(mut self, values: I) -> Result<Self, DefinitionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        check_arity(&self.descriptor, values.len())?;
        self.label_values = values;
        Ok(self)
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn label_values(&self) -> &[String] {
        &self.label_values
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_ref().map(CompiledPath::as_str)
    }

    pub fn is_liveness(&self) -> bool {
        self.path.is_none()
    }

    /// Evaluates the path against `document` and applies the transform
    ///
    /// # Returns
    /// * `Ok(f64)` - The gauge value
    /// * `Err(ExtractError::PathNotFound)` - Nothing at the path (or no path at all)
    /// * `Err(ExtractError::TypeMismatch)` - The value has an unusable type
    pub fn extract(&self, document: &Value) -> Result<f64, ExtractError> {
        let path = match &self.path {
            Some(path) => path,
            None => {
                return Err(ExtractError::PathNotFound {
                    path: String::new(),
                })
            }
        };

        let raw = path.evaluate(document).ok_or_else(|| ExtractError::PathNotFound {
            path: path.to_string(),
        })?;

        self.transform
            .apply(raw)
            .map_err(|source| ExtractError::TypeMismatch {
                path: path.to_string(),
                source,
            })
    }

    /// Builds an observation with this definition's fixed label values
    pub fn observe(&self, value: f64) -> Result<Observation, DefinitionError> {
        Observation::new(Arc::clone(&self.descriptor), self.label_values.clone(), value)
    }

    /// Builds an observation with label values derived at scrape time
    pub fn observe_with_labels(
        &self,
        label_values: Vec<String>,
        value: f64,
    ) -> Result<Observation, DefinitionError> {
        Observation::new(Arc::clone(&self.descriptor), label_values, value)
    }

    /// Liveness sample: `1.0` when the fetch succeeded, `0.0` otherwise
    pub(crate) fn observe_liveness(&self, up: bool) -> Observation {
        Observation {
            descriptor: Arc::clone(&self.descriptor),
            label_values: Vec::new(),
            value: if up { 1.0 } else { 0.0 },
        }
    }
}

fn check_arity(descriptor: &Descriptor, actual: usize) -> Result<(), DefinitionError> {
    let expected = descriptor.label_names().len();
    if expected != actual {
        return Err(DefinitionError::LabelArity {
            name: descriptor.name().to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// A single (descriptor, label values, value) sample produced by a pass
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    descriptor: Arc<Descriptor>,
    label_values: Vec<String>,
    value: f64,
}

impl Observation {
    /// # Errors
    /// Fails with `DefinitionError::LabelArity` when the label values do not
    /// match the descriptor's schema.
    pub fn new(
        descriptor: Arc<Descriptor>,
        label_values: Vec<String>,
        value: f64,
    ) -> Result<Self, DefinitionError> {
        check_arity(&descriptor, label_values.len())?;
        Ok(Observation {
            descriptor,
            label_values,
            value,
        })
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn label_values(&self) -> &[String] {
        &self.label_values
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Label names zipped with their values, in schema order
    pub fn labels(&self) -> Vec<(String, String)> {
        self.descriptor
            .label_names()
            .iter()
            .cloned()
            .zip(self.label_values.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn numeric(path: &str) -> MetricDefinition {
        MetricDefinition::new(path, Descriptor::new("es_test", "test metric")).unwrap()
    }

    #[test]
    fn test_identity_requires_a_number() {
        assert_eq!(Transform::Identity.apply(&json!(3)), Ok(3.0));
        assert_eq!(Transform::Identity.apply(&json!(87.5)), Ok(87.5));
        assert_eq!(
            Transform::Identity.apply(&json!("3")),
            Err(TransformError::NotNumeric("string"))
        );
        assert_eq!(
            Transform::Identity.apply(&json!(true)),
            Err(TransformError::NotNumeric("boolean"))
        );
        assert_eq!(
            Transform::Identity.apply(&json!({"a": 1})),
            Err(TransformError::NotNumeric("object"))
        );
    }

    #[test]
    fn test_categorical_equality() {
        let green = Transform::CategoricalEquals("green".to_string());
        assert_eq!(green.apply(&json!("green")), Ok(1.0));
        assert_eq!(green.apply(&json!("yellow")), Ok(0.0));
        assert_eq!(green.apply(&json!("")), Ok(0.0));
        assert_eq!(green.apply(&json!("GREEN")), Ok(0.0));
        // wrong type fails rather than yielding zero
        assert_eq!(green.apply(&json!(1)), Err(TransformError::NotString("number")));
        assert_eq!(green.apply(&json!(["green"])), Err(TransformError::NotString("array")));
    }

    #[test]
    fn test_boolean_and_divided_transforms() {
        let boolean = Transform::boolean();
        assert_eq!(boolean.apply(&json!(true)), Ok(1.0));
        assert_eq!(boolean.apply(&json!(false)), Ok(0.0));
        assert_eq!(boolean.apply(&json!("true")), Err(TransformError::NotBoolean("string")));

        let seconds = Transform::divided_by(1000.0);
        assert_eq!(seconds.apply(&json!(2500)), Ok(2.5));
        assert!(seconds.apply(&json!("2500")).is_err());
    }

    #[test]
    fn test_extract_nested_value() {
        let doc = json!({"jvm": {"mem": {"heap_used_in_bytes": 104857600}}});
        let metric = numeric("jvm.mem.heap_used_in_bytes");
        assert_eq!(metric.extract(&doc), Ok(104857600.0));
    }

    #[test]
    fn test_extract_reports_not_found_and_mismatch() {
        let doc = json!({"status": "green", "nested": null});
        assert_eq!(
            numeric("missing").extract(&doc),
            Err(ExtractError::PathNotFound {
                path: "missing".to_string()
            })
        );
        assert_eq!(
            numeric("nested.value").extract(&doc),
            Err(ExtractError::PathNotFound {
                path: "nested.value".to_string()
            })
        );
        assert_eq!(
            numeric("status").extract(&doc),
            Err(ExtractError::TypeMismatch {
                path: "status".to_string(),
                source: TransformError::NotNumeric("string"),
            })
        );
    }

    #[test]
    fn test_invalid_path_fails_at_construction() {
        let result = MetricDefinition::new("jvm..mem", Descriptor::new("es_bad", "bad"));
        assert!(matches!(result, Err(DefinitionError::InvalidPath(_))));
    }

    #[test]
    fn test_label_arity_is_enforced() {
        let descriptor = Descriptor::new("es_cluster_status", "status").with_label_names(["color"]);
        let metric = MetricDefinition::new("status", descriptor).unwrap();

        let err = metric.clone().with_label_values(Vec::<String>::new()).unwrap_err();
        assert_eq!(
            err,
            DefinitionError::LabelArity {
                name: "es_cluster_status".to_string(),
                expected: 1,
                actual: 0,
            }
        );

        assert!(metric
            .observe_with_labels(vec!["a".to_string(), "b".to_string()], 1.0)
            .is_err());

        let observation = metric
            .observe_with_labels(vec!["green".to_string()], 1.0)
            .unwrap();
        assert_eq!(
            observation.labels(),
            vec![("color".to_string(), "green".to_string())]
        );
    }

    #[test]
    fn test_liveness_has_no_path() {
        let up = MetricDefinition::liveness("es_up", "up");
        assert!(up.is_liveness());
        assert_eq!(up.path(), None);
        assert!(up.extract(&json!({})).is_err());
        assert_eq!(up.observe_liveness(true).value(), 1.0);
        assert_eq!(up.observe_liveness(false).value(), 0.0);
        assert!(up.observe_liveness(false).label_values().is_empty());
    }

    #[test]
    fn test_metric_name_is_namespaced() {
        assert_eq!(metric_name("up"), "es_up");
    }
}
