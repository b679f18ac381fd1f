//! Node kinds, concurrency policies, callable signatures, and the input
//! view handed to user callables.

use std::any::Any;
use std::sync::Arc;

use crate::level::LevelId;
use crate::message::Message;
use crate::store::{Product, ProductStore, Products};

////////////////////////////////////////////////////////////////////////////////
//  submodules
////////////////////////////////////////////////////////////////////////////////

pub(crate) mod reduction;
pub(crate) mod splitter;
pub(crate) mod transform;

////////////////////////////////////////////////////////////////////////////////
//  reexports
////////////////////////////////////////////////////////////////////////////////

pub use self::splitter::Generator;

////////////////////////////////////////////////////////////////////////////////
//  enums
////////////////////////////////////////////////////////////////////////////////

/// Per-node parallelism policy.
///
/// - `Serial` runs the node body one message at a time.
/// - `Bounded (n)` allows up to `n` messages in flight.
/// - `Unlimited` allows as many messages in flight as the host offers
///   parallelism; callables must be reentrant under this policy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Concurrency {
  Serial,
  Bounded (usize),
  Unlimited
}

/// The kind of a declared node.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum NodeKind {
  Transform,
  Reduction,
  Splitter,
  Filter,
  Monitor,
  Output
}

/// Error raised by or around a user callable.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum NodeError {
  #[error("product \"{name}\" not found")]
  MissingProduct { name : String },
  #[error("product \"{name}\" holds a {found}, not a {expected}")]
  WrongType {
    name     : String,
    expected : &'static str,
    found    : &'static str
  },
  #[error("\"{name}\" is not a declared input of this node")]
  UndeclaredInput { name : String },
  #[error("declared output \"{name}\" was not produced")]
  MissingOutput { name : String },
  #[error("produced \"{name}\" which is not a declared output")]
  UndeclaredOutput { name : String },
  #[error("{0}")]
  Failure (String)
}

////////////////////////////////////////////////////////////////////////////////
//  structs
////////////////////////////////////////////////////////////////////////////////

/// The joined input tuple as seen by a user callable: one message per
/// declared input product, plus the reference (most-derived) store.
pub struct Inputs <'a> {
  names     : &'a [String],
  messages  : &'a [Message],
  ref_index : usize
}

////////////////////////////////////////////////////////////////////////////////
//  types
////////////////////////////////////////////////////////////////////////////////

pub(crate) type TransformFn =
  Box <dyn Fn (&Inputs) -> Result <Products, NodeError> + Send + Sync>;
pub(crate) type ReductionFn =
  Box <dyn Fn (&mut (dyn Any + Send + Sync), &Inputs) -> Result <(), NodeError>
    + Send + Sync>;
pub(crate) type InitFn =
  Box <dyn Fn() -> Box <dyn Any + Send + Sync> + Send + Sync>;
pub(crate) type FinishFn =
  Box <dyn Fn (Box <dyn Any + Send + Sync>) -> Product + Send + Sync>;
pub(crate) type SplitterFn =
  Box <dyn Fn (&Inputs, &mut Generator) -> Result <(), NodeError>
    + Send + Sync>;
pub(crate) type FilterFn =
  Box <dyn Fn (&Inputs) -> Result <bool, NodeError> + Send + Sync>;
pub(crate) type MonitorFn =
  Box <dyn Fn (&Inputs) -> Result <(), NodeError> + Send + Sync>;
pub(crate) type OutputFn =
  Box <dyn Fn (&Arc <ProductStore>) -> Result <(), NodeError> + Send + Sync>;

/// Kind-specific callable payload of a declared node.
pub(crate) enum Logic {
  Transform (TransformFn),
  Reduction {
    fold   : ReductionFn,
    init   : InitFn,
    finish : FinishFn
  },
  Splitter  (SplitterFn),
  Filter    (FilterFn),
  Monitor   (MonitorFn),
  Output    (OutputFn)
}

/// A fully-configured node declaration, produced by the registry builders.
pub(crate) struct NodeSpec {
  pub name        : String,
  pub inputs      : Vec <String>,
  pub outputs     : Vec <String>,
  pub filtered_by : Vec <String>,
  pub concurrency : Concurrency,
  pub domain      : Option <String>,
  pub logic       : Logic
}

////////////////////////////////////////////////////////////////////////////////
//  impls
////////////////////////////////////////////////////////////////////////////////

impl Concurrency {
  /// Worker count implementing this policy.
  pub fn degree (&self) -> usize {
    match *self {
      Concurrency::Serial      => 1,
      Concurrency::Bounded (n) => n.max (1),
      Concurrency::Unlimited   =>
        std::thread::available_parallelism().map_or (4, |n| n.get())
    }
  }
}

impl Logic {
  pub fn kind (&self) -> NodeKind {
    match *self {
      Logic::Transform (_)    => NodeKind::Transform,
      Logic::Reduction { .. } => NodeKind::Reduction,
      Logic::Splitter (_)     => NodeKind::Splitter,
      Logic::Filter (_)       => NodeKind::Filter,
      Logic::Monitor (_)      => NodeKind::Monitor,
      Logic::Output (_)       => NodeKind::Output
    }
  }
}

impl NodeError {
  /// A failure with a caller-provided description.
  pub fn fail (message : impl Into <String>) -> Self {
    NodeError::Failure (message.into())
  }
}

impl <'a> Inputs <'a> {
  /// `messages` must be data messages, one per name in `names`.
  pub(crate) fn new (names : &'a [String], messages : &'a [Message]) -> Self {
    debug_assert_eq!(names.len(), messages.len());
    debug_assert!(messages.iter().all (|message| !message.is_flush()));
    let ref_index = messages.iter().enumerate()
      .max_by_key (|(_, message)| {
        let store = message.store().unwrap();
        (store.id().depth(), store.derivation(), message.id)
      })
      .map_or (0, |(index, _)| index);
    Inputs { names, messages, ref_index }
  }

  /// Typed access to a declared input product.
  pub fn get <T : 'static> (&self, name : &str) -> Result <&T, NodeError> {
    let index = self.names.iter().position (|n| n == name)
      .ok_or_else (|| NodeError::UndeclaredInput { name: name.to_owned() })?;
    self.get_at (index, name)
  }

  /// Typed access by declaration position.
  pub fn by_index <T : 'static> (&self, index : usize)
    -> Result <&T, NodeError>
  {
    let name = self.names.get (index)
      .ok_or_else (|| NodeError::UndeclaredInput {
        name: format!("#{}", index)
      })?;
    self.get_at (index, name)
  }

  fn get_at <T : 'static> (&self, index : usize, name : &str)
    -> Result <&T, NodeError>
  {
    let store   = self.messages[index].store().unwrap();
    let product = store.product (name)
      .ok_or_else (|| NodeError::MissingProduct { name: name.to_owned() })?;
    product.downcast_ref().ok_or_else (|| NodeError::WrongType {
      name:     name.to_owned(),
      expected: std::any::type_name::<T>(),
      found:    product.type_name()
    })
  }

  /// The most-derived store of the tuple.
  pub fn store (&self) -> &Arc <ProductStore> {
    self.messages[self.ref_index].store().unwrap()
  }

  /// The store holding the input at `index`.
  pub fn store_at (&self, index : usize) -> Option <&Arc <ProductStore>> {
    self.messages.get (index).and_then (Message::store)
  }

  /// Level id of the most-derived store.
  pub fn level_id (&self) -> &LevelId {
    self.store().id()
  }

  /// Correlation id of the reference message.
  pub(crate) fn ref_msg_id (&self) -> u64 {
    self.messages[self.ref_index].id
  }

  #[inline]
  pub fn len (&self) -> usize {
    self.names.len()
  }

  #[inline]
  pub fn is_empty (&self) -> bool {
    self.names.is_empty()
  }
}
