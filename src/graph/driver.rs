//! Source driver: turns the user's pull sequence of stores into data
//! messages plus a single flush token per scope, emitted when the scope
//! closes and its child tally is final.

use std::sync::Arc;

use crate::level::LevelCounter;
use crate::message::{FlushToken, Message};
use crate::store::ProductStore;

////////////////////////////////////////////////////////////////////////////////
//  structs
////////////////////////////////////////////////////////////////////////////////

/// Tracks the stack of open scopes across pulls. A yielded store opens its
/// scope (and any not-yet-open ancestors, taken from its parent links); a
/// yielded store that is not a descendant of an open scope closes it.
pub(crate) struct SourceDriver {
  scopes  : Vec <OpenScope>,
  counter : u64
}

struct OpenScope {
  store   : Arc <ProductStore>,
  counter : LevelCounter
}

////////////////////////////////////////////////////////////////////////////////
//  impls
////////////////////////////////////////////////////////////////////////////////

impl SourceDriver {
  pub fn new() -> Self {
    SourceDriver { scopes: Vec::new(), counter: 0 }
  }

  /// Messages to publish for one pulled store: flush tokens for any scopes
  /// it closes, then the store's own data message.
  pub fn push (&mut self, store : Arc <ProductStore>) -> Vec <Message> {
    let mut out = Vec::new();
    while let Some (top) = self.scopes.last() {
      if top.store.id().is_ancestor_of (store.id()) {
        break
      }
      self.close_top (&mut out);
    }
    for ancestor in chain (&store) {
      if self.scopes.iter().any (|open| open.store.id() == ancestor.id()) {
        continue
      }
      if let Some (top) = self.scopes.last_mut() {
        top.counter.record_child (ancestor.level_name());
      }
      self.scopes.push (OpenScope {
        counter: LevelCounter::new (ancestor.level_name()),
        store:   ancestor
      });
    }
    self.counter += 1;
    out.push (Message::data (store, self.counter));
    out
  }

  /// Flush tokens closing every remaining scope, deepest first.
  pub fn finish (&mut self) -> Vec <Message> {
    let mut out = Vec::new();
    while !self.scopes.is_empty() {
      self.close_top (&mut out);
    }
    out
  }

  fn close_top (&mut self, out : &mut Vec <Message>) {
    let top = self.scopes.pop().unwrap();
    self.counter += 1;
    out.push (Message::flush (FlushToken {
      scope:  top.store.id().clone(),
      counts: Arc::new (top.counter.result())
    }, self.counter));
  }
}

////////////////////////////////////////////////////////////////////////////////
//  functions
////////////////////////////////////////////////////////////////////////////////

/// The store's ancestor chain, root first, the store itself last.
fn chain (store : &Arc <ProductStore>) -> Vec <Arc <ProductStore>> {
  let mut links = vec![store.clone()];
  let mut store = store.clone();
  while let Some (parent) = store.parent().cloned() {
    links.push (parent.clone());
    store = parent;
  }
  links.reverse();
  links
}

////////////////////////////////////////////////////////////////////////////////
//  tests
////////////////////////////////////////////////////////////////////////////////
