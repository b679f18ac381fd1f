//! Node declarations: an explicit registry populated through builder
//! handles, passed into graph construction. Plugins expose
//! `fn register (registry : &mut Registry)`-shaped entry points and
//! independently-built registries are merged.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::node::{
  Concurrency, FilterFn, FinishFn, Generator, InitFn, Inputs, Logic,
  MonitorFn, NodeError, NodeSpec, OutputFn, ReductionFn, SplitterFn,
  TransformFn
};
use crate::store::{Product, ProductStore, Products};

////////////////////////////////////////////////////////////////////////////////
//  structs
////////////////////////////////////////////////////////////////////////////////

/// The set of declared nodes and expected source products of one graph.
#[derive(Default)]
pub struct Registry {
  pub(crate) nodes           : Vec <NodeSpec>,
  pub(crate) source_products : BTreeSet <String>
}

////////////////////////////////////////////////////////////////////////////////
//  enums
////////////////////////////////////////////////////////////////////////////////

/// Error raised while declaring nodes, before the graph is assembled.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum DeclarationError {
  #[error("a node named \"{name}\" is already declared")]
  DuplicateNode { name : String },
  #[error("node names may not be empty")]
  EmptyName
}

////////////////////////////////////////////////////////////////////////////////
//  macros
////////////////////////////////////////////////////////////////////////////////

macro_rules! common_builder_methods {
  () => {
    /// Declare the input product names, in callable access order.
    pub fn input <I> (self, names : I) -> Self where
      I : IntoIterator, I::Item : Into <String>
    {
      self.spec.inputs = names.into_iter().map (Into::into).collect();
      self
    }

    /// Alias of `input`.
    pub fn react_to <I> (self, names : I) -> Self where
      I : IntoIterator, I::Item : Into <String>
    {
      self.input (names)
    }

    pub fn concurrency (self, concurrency : Concurrency) -> Self {
      self.spec.concurrency = concurrency;
      self
    }

    /// Gate this node on the named predecessor filters.
    pub fn filtered_by <I> (self, names : I) -> Self where
      I : IntoIterator, I::Item : Into <String>
    {
      self.spec.filtered_by = names.into_iter().map (Into::into).collect();
      self
    }
  }
}

macro_rules! output_builder_methods {
  () => {
    /// Declare the output product names.
    pub fn output <I> (self, names : I) -> Self where
      I : IntoIterator, I::Item : Into <String>
    {
      self.spec.outputs = names.into_iter().map (Into::into).collect();
      self
    }

    /// Alias of `output`.
    pub fn provides <I> (self, names : I) -> Self where
      I : IntoIterator, I::Item : Into <String>
    {
      self.output (names)
    }
  }
}

////////////////////////////////////////////////////////////////////////////////
//  builders
////////////////////////////////////////////////////////////////////////////////

pub struct TransformBuilder <'r> {
  spec : &'r mut NodeSpec
}

pub struct ReductionBuilder <'r> {
  spec : &'r mut NodeSpec
}

pub struct SplitterBuilder <'r> {
  spec : &'r mut NodeSpec
}

pub struct FilterBuilder <'r> {
  spec : &'r mut NodeSpec
}

pub struct MonitorBuilder <'r> {
  spec : &'r mut NodeSpec
}

pub struct OutputBuilder <'r> {
  spec : &'r mut NodeSpec
}

impl <'r> TransformBuilder <'r> {
  common_builder_methods!{}
  output_builder_methods!{}
}

impl <'r> ReductionBuilder <'r> {
  common_builder_methods!{}
  output_builder_methods!{}
}

impl <'r> SplitterBuilder <'r> {
  common_builder_methods!{}
  output_builder_methods!{}

  /// Alias of `output`: the product names carried by each generated child.
  pub fn into <I> (self, names : I) -> Self where
    I : IntoIterator, I::Item : Into <String>
  {
    self.output (names)
  }

  /// Name of the hierarchy level the generated children live at.
  pub fn within_domain (self, level_name : &str) -> Self {
    self.spec.domain = Some (level_name.to_owned());
    self
  }
}

impl <'r> FilterBuilder <'r> {
  common_builder_methods!{}
}

impl <'r> MonitorBuilder <'r> {
  common_builder_methods!{}
}

impl <'r> OutputBuilder <'r> {
  common_builder_methods!{}
}

////////////////////////////////////////////////////////////////////////////////
//  impls
////////////////////////////////////////////////////////////////////////////////

impl Registry {
  pub fn new() -> Self {
    Registry::default()
  }

  /// Register a stateless N→M per-message computation.
  pub fn declare_transform <F> (&mut self, name : &str, f : F)
    -> Result <TransformBuilder <'_>, DeclarationError>
  where F : Fn (&Inputs) -> Result <Products, NodeError>
    + Send + Sync + 'static
  {
    let logic : TransformFn = Box::new (f);
    let spec  = self.insert (name, Logic::Transform (logic))?;
    Ok (TransformBuilder { spec })
  }

  /// Register a reduction over contributions sharing a parent scope. The
  /// accumulator starts from a clone of `init` per scope; `fold` must be
  /// commutative and associative across contributions.
  pub fn declare_reduction <A, F> (&mut self, name : &str, init : A, fold : F)
    -> Result <ReductionBuilder <'_>, DeclarationError>
  where
    A : Clone + Send + Sync + 'static,
    F : Fn (&mut A, &Inputs) -> Result <(), NodeError> + Send + Sync + 'static
  {
    let init : InitFn = Box::new (move || Box::new (init.clone()));
    let fold : ReductionFn = Box::new (move |acc, inputs| {
      let acc = acc.downcast_mut::<A>()
        .expect ("reduction accumulator holds the declared type");
      fold (acc, inputs)
    });
    let finish : FinishFn = Box::new (|acc| {
      match acc.downcast::<A>() {
        Ok (acc) => Product::new (*acc),
        Err (_)  => unreachable!("reduction accumulator holds the declared \
          type")
      }
    });
    let spec = self.insert (name, Logic::Reduction { fold, init, finish })?;
    Ok (ReductionBuilder { spec })
  }

  /// Register a splitter in direct-generator form: the callable emits child
  /// stores through the provided generator.
  pub fn declare_splitter <F> (&mut self, name : &str, f : F)
    -> Result <SplitterBuilder <'_>, DeclarationError>
  where F : Fn (&Inputs, &mut Generator) -> Result <(), NodeError>
    + Send + Sync + 'static
  {
    let logic : SplitterFn = Box::new (f);
    let spec  = self.insert (name, Logic::Splitter (logic))?;
    Ok (SplitterBuilder { spec })
  }

  /// Register a splitter in predicate + unfold form: starting from
  /// `init (inputs)`, children are emitted while `predicate` holds, each
  /// step computing the next running value and the child's products.
  pub fn declare_unfold <R, I, P, U> (
    &mut self, name : &str, init : I, predicate : P, unfold : U
  ) -> Result <SplitterBuilder <'_>, DeclarationError>
  where
    I : Fn (&Inputs) -> Result <R, NodeError> + Send + Sync + 'static,
    P : Fn (&Inputs, &R) -> bool + Send + Sync + 'static,
    U : Fn (&Inputs, &R) -> Result <(R, Products), NodeError>
      + Send + Sync + 'static
  {
    let logic : SplitterFn = Box::new (move |inputs, generator| {
      let mut running = init (inputs)?;
      while predicate (inputs, &running) {
        let (next, products) = unfold (inputs, &running)?;
        let _ = generator.make_child (products)?;
        running = next;
      }
      Ok (())
    });
    let spec = self.insert (name, Logic::Splitter (logic))?;
    Ok (SplitterBuilder { spec })
  }

  /// Register a predicate node whose name may appear in `filtered_by`.
  pub fn declare_filter <F> (&mut self, name : &str, f : F)
    -> Result <FilterBuilder <'_>, DeclarationError>
  where F : Fn (&Inputs) -> Result <bool, NodeError> + Send + Sync + 'static
  {
    let logic : FilterFn = Box::new (f);
    let spec  = self.insert (name, Logic::Filter (logic))?;
    Ok (FilterBuilder { spec })
  }

  /// Register a sink over products.
  pub fn declare_monitor <F> (&mut self, name : &str, f : F)
    -> Result <MonitorBuilder <'_>, DeclarationError>
  where F : Fn (&Inputs) -> Result <(), NodeError> + Send + Sync + 'static
  {
    let logic : MonitorFn = Box::new (f);
    let spec  = self.insert (name, Logic::Monitor (logic))?;
    Ok (MonitorBuilder { spec })
  }

  /// Register a store-level sink (an output writer). Output nodes react to
  /// a single product and receive the store that carries it.
  pub fn declare_output <F> (&mut self, name : &str, f : F)
    -> Result <OutputBuilder <'_>, DeclarationError>
  where F : Fn (&Arc <ProductStore>) -> Result <(), NodeError>
    + Send + Sync + 'static
  {
    let logic : OutputFn = Box::new (f);
    let spec  = self.insert (name, Logic::Output (logic))?;
    Ok (OutputBuilder { spec })
  }

  /// Declare products the source is expected to provide; consulted by the
  /// strict finalize check.
  pub fn expect_from_source <I> (&mut self, names : I) where
    I : IntoIterator, I::Item : Into <String>
  {
    self.source_products.extend (names.into_iter().map (Into::into));
  }

  /// Merge another registry's declarations into this one.
  pub fn merge (&mut self, other : Registry)
    -> Result <(), DeclarationError>
  {
    for spec in other.nodes {
      if self.nodes.iter().any (|existing| existing.name == spec.name) {
        return Err (DeclarationError::DuplicateNode { name: spec.name })
      }
      self.nodes.push (spec);
    }
    self.source_products.extend (other.source_products);
    Ok (())
  }

  fn insert (&mut self, name : &str, logic : Logic)
    -> Result <&mut NodeSpec, DeclarationError>
  {
    if name.is_empty() {
      return Err (DeclarationError::EmptyName)
    }
    if self.nodes.iter().any (|existing| existing.name == name) {
      return Err (DeclarationError::DuplicateNode { name: name.to_owned() })
    }
    self.nodes.push (NodeSpec {
      name:        name.to_owned(),
      inputs:      Vec::new(),
      outputs:     Vec::new(),
      filtered_by: Vec::new(),
      concurrency: Concurrency::Serial,
      domain:      None,
      logic
    });
    Ok (self.nodes.last_mut().unwrap())
  }
}

////////////////////////////////////////////////////////////////////////////////
//  tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn duplicate_names_error_at_declaration() {
    let mut registry = Registry::new();
    let _ = registry.declare_monitor ("watch", |_ : &Inputs| Ok (()))
      .unwrap();
    assert_eq!(
      registry.declare_transform ("watch",
        |_ : &Inputs| Ok (Products::new()))
        .map (|_| ()).unwrap_err(),
      DeclarationError::DuplicateNode { name: "watch".to_owned() });
  }

  #[test]
  fn merge_rejects_colliding_names() {
    let mut a = Registry::new();
    let _ = a.declare_monitor ("watch", |_ : &Inputs| Ok (())).unwrap();
    let mut b = Registry::new();
    let _ = b.declare_monitor ("watch", |_ : &Inputs| Ok (())).unwrap();
    assert!(a.merge (b).is_err());
  }

  #[test]
  fn builders_configure_the_declaration() {
    let mut registry = Registry::new();
    let _ = registry.declare_transform ("square",
      |_ : &Inputs| Ok (Products::new()))
      .unwrap()
      .input (["numbers"])
      .output (["squared"])
      .concurrency (Concurrency::Unlimited);
    let spec = &registry.nodes[0];
    assert_eq!(spec.inputs, vec!["numbers".to_owned()]);
    assert_eq!(spec.outputs, vec!["squared".to_owned()]);
    assert_eq!(spec.concurrency, Concurrency::Unlimited);
  }
}
