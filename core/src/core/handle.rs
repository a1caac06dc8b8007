// stepcore/src/core/handle.rs

//! Addressing: where a step sits in the composition tree, and where each of its
//! produced values lives.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Position of a node in the pipeline's composition tree.
///
/// A parent-linked list: `outer.inner.leaf` is the handle `leaf` whose parent is
/// `inner`, whose parent is the root `outer`. Parents are shared, so cloning a
/// handle or deriving children from it is cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeHandle {
  name: String,
  parent: Option<Arc<NodeHandle>>,
}

impl NodeHandle {
  pub fn new(name: impl Into<String>, parent: Option<NodeHandle>) -> Self {
    Self {
      name: name.into(),
      parent: parent.map(Arc::new),
    }
  }

  pub fn root(name: impl Into<String>) -> Self {
    Self::new(name, None)
  }

  /// A handle for `name` nested directly under `self`.
  pub fn child(&self, name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      parent: Some(Arc::new(self.clone())),
    }
  }

  /// Parses a dotted path such as `outer.inner.leaf`.
  pub fn from_path(path: &str) -> Option<Self> {
    let mut segments = path.split('.');
    let mut handle = NodeHandle::root(segments.next().filter(|s| !s.is_empty())?);
    for segment in segments {
      if segment.is_empty() {
        return None;
      }
      handle = handle.child(segment);
    }
    Some(handle)
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn parent(&self) -> Option<&NodeHandle> {
    self.parent.as_deref()
  }

  /// Iterates from this handle up to the root, this handle first.
  pub fn ancestors(&self) -> Ancestors<'_> {
    Ancestors { next: Some(self) }
  }

  pub fn depth(&self) -> usize {
    self.ancestors().count()
  }
}

impl fmt::Display for NodeHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if let Some(parent) = &self.parent {
      write!(f, "{}.", parent)?;
    }
    f.write_str(&self.name)
  }
}

/// Borrowing walk up a `NodeHandle` chain. See [`NodeHandle::ancestors`].
#[derive(Debug, Clone)]
pub struct Ancestors<'a> {
  next: Option<&'a NodeHandle>,
}

impl<'a> Iterator for Ancestors<'a> {
  type Item = &'a NodeHandle;

  fn next(&mut self) -> Option<Self::Item> {
    let current = self.next?;
    self.next = current.parent();
    Some(current)
  }
}

/// Durable address of one produced output value.
///
/// `mapping_key` is only present for dynamic (fan-out) outputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StepOutputHandle {
  pub step_key: String,
  pub output_name: String,
  pub mapping_key: Option<String>,
}

impl StepOutputHandle {
  pub fn new(step_key: impl Into<String>, output_name: impl Into<String>) -> Self {
    Self {
      step_key: step_key.into(),
      output_name: output_name.into(),
      mapping_key: None,
    }
  }

  pub fn dynamic(step_key: impl Into<String>, output_name: impl Into<String>, mapping_key: impl Into<String>) -> Self {
    Self {
      step_key: step_key.into(),
      output_name: output_name.into(),
      mapping_key: Some(mapping_key.into()),
    }
  }
}

impl fmt::Display for StepOutputHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}", self.step_key, self.output_name)?;
    if let Some(mapping_key) = &self.mapping_key {
      write!(f, "[{}]", mapping_key)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_renders_the_dotted_path() {
    let leaf = NodeHandle::root("outer").child("inner").child("leaf");
    assert_eq!(leaf.to_string(), "outer.inner.leaf");
    assert_eq!(leaf.depth(), 3);
    assert_eq!(leaf.parent().map(|p| p.to_string()), Some("outer.inner".to_string()));
  }

  #[test]
  fn ancestors_walk_from_the_node_to_the_root() {
    let leaf = NodeHandle::from_path("a.b.c").unwrap();
    let walked: Vec<String> = leaf.ancestors().map(|h| h.to_string()).collect();
    assert_eq!(walked, vec!["a.b.c", "a.b", "a"]);
  }

  #[test]
  fn from_path_rejects_empty_segments() {
    assert!(NodeHandle::from_path("").is_none());
    assert!(NodeHandle::from_path("a..b").is_none());
    assert_eq!(NodeHandle::from_path("solo").unwrap(), NodeHandle::root("solo"));
  }

  #[test]
  fn output_handle_display_includes_mapping_key() {
    assert_eq!(StepOutputHandle::new("s", "out").to_string(), "s.out");
    assert_eq!(StepOutputHandle::dynamic("s", "part", "a").to_string(), "s.part[a]");
  }
}
