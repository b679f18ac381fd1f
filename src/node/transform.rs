//! Stateless per-message computation support.
//!
//! A transform's outputs are wrapped in a fresh store layered on the
//! reference input store: same level id, the input scope enriched with the
//! produced products.

use std::sync::Arc;

use crate::node::NodeError;
use crate::store::{ProductStore, Products};

////////////////////////////////////////////////////////////////////////////////
//  functions
////////////////////////////////////////////////////////////////////////////////

/// Check a produced bag against a node's declared output names.
pub(crate) fn check_declared_outputs (
  declared : &[String], products : &Products
) -> Result <(), NodeError> {
  for name in declared {
    if !products.contains (name) {
      return Err (NodeError::MissingOutput { name: name.clone() })
    }
  }
  for name in products.names() {
    if !declared.iter().any (|declared_name| declared_name == name) {
      return Err (NodeError::UndeclaredOutput { name: name.to_owned() })
    }
  }
  Ok (())
}

/// Check the produced bag against the declared output names and layer it on
/// the reference store.
pub(crate) fn layered_output (
  reference : &Arc <ProductStore>,
  declared  : &[String],
  products  : Products
) -> Result <Arc <ProductStore>, NodeError> {
  check_declared_outputs (declared, &products)?;
  Ok (reference.extend (products))
}

////////////////////////////////////////////////////////////////////////////////
//  tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn output_store_layers_on_the_input_id() {
    let root  = ProductStore::base (Products::new().with ("a", 1i32));
    let event = root.make_child (5, "event", Products::new());
    let declared = vec!["b".to_owned()];
    let out = layered_output (&event, &declared,
      Products::new().with ("b", 2i32)).unwrap();
    assert_eq!(out.id(), event.id());
    assert_eq!(out.get::<i32> ("b"), Some (&2));
    assert_eq!(out.get::<i32> ("a"), Some (&1));
  }

  #[test]
  fn undeclared_and_missing_outputs_are_errors() {
    let store    = ProductStore::base (Products::new());
    let declared = vec!["b".to_owned()];
    assert_eq!(
      layered_output (&store, &declared, Products::new()).unwrap_err(),
      NodeError::MissingOutput { name: "b".to_owned() });
    assert_eq!(
      layered_output (&store, &declared,
        Products::new().with ("b", 0i32).with ("c", 0i32)).unwrap_err(),
      NodeError::UndeclaredOutput { name: "c".to_owned() });
  }
}
