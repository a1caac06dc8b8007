// stepcore/src/core/types.rs

//! Runtime types attached to step inputs and outputs, the result of checking a
//! value against one, and the type-erased wrapper used for values handed back
//! by user code.

use crate::core::traits::{Materializer, TypeValidator};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A structured value attached to type checks, expectations and materializations.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetadataValue {
  Text(String),
  Json(Value),
  Url(String),
  Path(String),
  Int(i64),
  Float(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataEntry {
  pub label: String,
  pub description: Option<String>,
  pub value: MetadataValue,
}

impl MetadataEntry {
  pub fn new(label: impl Into<String>, value: MetadataValue) -> Self {
    Self {
      label: label.into(),
      description: None,
      value,
    }
  }

  pub fn text(label: impl Into<String>, text: impl Into<String>) -> Self {
    Self::new(label, MetadataValue::Text(text.into()))
  }

  pub fn json(label: impl Into<String>, value: Value) -> Self {
    Self::new(label, MetadataValue::Json(value))
  }

  pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
    Self::new(label, MetadataValue::Url(url.into()))
  }

  pub fn path(label: impl Into<String>, path: impl Into<String>) -> Self {
    Self::new(label, MetadataValue::Path(path.into()))
  }

  pub fn int(label: impl Into<String>, value: i64) -> Self {
    Self::new(label, MetadataValue::Int(value))
  }

  pub fn float(label: impl Into<String>, value: f64) -> Self {
    Self::new(label, MetadataValue::Float(value))
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }
}

/// Outcome of checking one value against a [`RuntimeType`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeCheckResult {
  pub success: bool,
  pub description: Option<String>,
  pub metadata: Vec<MetadataEntry>,
}

impl TypeCheckResult {
  pub fn passed() -> Self {
    Self {
      success: true,
      description: None,
      metadata: Vec::new(),
    }
  }

  pub fn failed(description: impl Into<String>) -> Self {
    Self {
      success: false,
      description: Some(description.into()),
      metadata: Vec::new(),
    }
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  pub fn with_metadata(mut self, metadata: Vec<MetadataEntry>) -> Self {
    self.metadata = metadata;
    self
  }
}

impl From<bool> for TypeCheckResult {
  fn from(success: bool) -> Self {
    if success {
      TypeCheckResult::passed()
    } else {
      TypeCheckResult::failed("Type check returned false.")
    }
  }
}

/// A value handed back by user code whose concrete type the core has to verify.
///
/// Validators, output managers and materializers return these; the core downcasts
/// each one to the type it expects and treats anything else as a contract breach.
pub struct UserReturn {
  value: Box<dyn Any + Send + Sync>,
  type_name: &'static str,
}

impl UserReturn {
  pub fn new<T: Any + Send + Sync>(value: T) -> Self {
    Self {
      value: Box::new(value),
      type_name: std::any::type_name::<T>(),
    }
  }

  /// Name of the concrete type that was wrapped.
  pub fn type_name(&self) -> &'static str {
    self.type_name
  }

  pub fn is<T: Any>(&self) -> bool {
    self.value.is::<T>()
  }

  /// Recovers the wrapped value, or returns `self` untouched if it is not a `T`.
  pub fn downcast<T: Any>(self) -> Result<T, Self> {
    let type_name = self.type_name;
    match self.value.downcast::<T>() {
      Ok(boxed) => Ok(*boxed),
      Err(value) => Err(Self { value, type_name }),
    }
  }
}

impl fmt::Debug for UserReturn {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("UserReturn").field("type_name", &self.type_name).finish()
  }
}

impl From<TypeCheckResult> for UserReturn {
  fn from(result: TypeCheckResult) -> Self {
    UserReturn::new(result)
  }
}

/// What a validator is told about the check it is running.
#[derive(Debug, Clone, Copy)]
pub struct TypeCheckContext<'a> {
  pub run_id: &'a str,
  pub step_key: &'a str,
  pub type_name: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
  Any,
  Scalar,
  Regular,
  /// The "no value" sentinel. Inputs of this kind are never loaded, and a required
  /// output of this kind that is never emitted gets an implicit null output.
  Nothing,
}

struct FnValidator<F>(F);

impl<F> TypeValidator for FnValidator<F>
where
  F: Fn(&TypeCheckContext<'_>, &Value) -> anyhow::Result<TypeCheckResult> + Send + Sync,
{
  fn check(&self, ctx: &TypeCheckContext<'_>, value: &Value) -> anyhow::Result<UserReturn> {
    (self.0)(ctx, value).map(UserReturn::new)
  }
}

/// The expected type of a step input or output.
#[derive(Clone)]
pub struct RuntimeType {
  name: String,
  kind: TypeKind,
  validator: Arc<dyn TypeValidator>,
  materializer: Option<Arc<dyn Materializer>>,
}

impl RuntimeType {
  pub fn new(name: impl Into<String>, kind: TypeKind, validator: impl TypeValidator + 'static) -> Self {
    Self {
      name: name.into(),
      kind,
      validator: Arc::new(validator),
      materializer: None,
    }
  }

  /// Builds a type from a plain check function.
  pub fn from_fn<F>(name: impl Into<String>, kind: TypeKind, check: F) -> Self
  where
    F: Fn(&TypeCheckContext<'_>, &Value) -> anyhow::Result<TypeCheckResult> + Send + Sync + 'static,
  {
    Self::new(name, kind, FnValidator(check))
  }

  pub fn any() -> Self {
    Self::from_fn("Any", TypeKind::Any, |_, _| Ok(TypeCheckResult::passed()))
  }

  pub fn nothing() -> Self {
    Self::from_fn("Nothing", TypeKind::Nothing, |_, value| {
      Ok(if value.is_null() {
        TypeCheckResult::passed()
      } else {
        TypeCheckResult::failed(format!("Value must be null, got value {}", value))
      })
    })
  }

  pub fn int() -> Self {
    scalar("Int", |value| value.is_i64() || value.is_u64())
  }

  pub fn float() -> Self {
    scalar("Float", Value::is_number)
  }

  pub fn string() -> Self {
    scalar("String", Value::is_string)
  }

  pub fn bool() -> Self {
    scalar("Bool", Value::is_boolean)
  }

  pub fn with_materializer(mut self, materializer: impl Materializer + 'static) -> Self {
    self.materializer = Some(Arc::new(materializer));
    self
  }

  pub fn display_name(&self) -> &str {
    &self.name
  }

  pub fn kind(&self) -> TypeKind {
    self.kind
  }

  pub fn is_nothing(&self) -> bool {
    self.kind == TypeKind::Nothing
  }

  pub fn validator(&self) -> &dyn TypeValidator {
    self.validator.as_ref()
  }

  pub fn materializer(&self) -> Option<&Arc<dyn Materializer>> {
    self.materializer.as_ref()
  }
}

impl fmt::Debug for RuntimeType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RuntimeType")
      .field("name", &self.name)
      .field("kind", &self.kind)
      .field("materializer_present", &self.materializer.is_some())
      .finish()
  }
}

fn scalar(name: &'static str, accepts: fn(&Value) -> bool) -> RuntimeType {
  RuntimeType::from_fn(name, TypeKind::Scalar, move |_, value| {
    Ok(if accepts(value) {
      TypeCheckResult::passed()
    } else {
      TypeCheckResult::failed(format!(
        "Value \"{}\" of JSON type \"{}\" is not valid for expected type \"{}\".",
        value,
        json_type_name(value),
        name
      ))
    })
  })
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "bool",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}
