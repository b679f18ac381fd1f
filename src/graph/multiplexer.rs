//! The multiplexer: routes published stores to the head ports consuming
//! their products and tracks which ports must later receive each scope's
//! flush token.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::level::LevelId;
use crate::message::{Message, Payload};
use crate::store::ProductStore;

////////////////////////////////////////////////////////////////////////////////
//  structs
////////////////////////////////////////////////////////////////////////////////

/// One consumer input port.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct PortRef {
  pub node : usize,
  pub port : usize
}

/// Routing state. `head_ports` is fixed at finalize; the flush-dependency
/// table is keyed by `(scope, child level name)` so that a source-created
/// scope's flush and a splitter's flush for the same scope drain disjoint
/// dependent sets. The dispatch ledger guarantees a port sees each owning
/// store at most once even when parent stores reappear in later chains.
pub(crate) struct Multiplexer {
  head_ports : BTreeMap <String, Vec <PortRef>>,
  flush_deps : DashMap <(u64, String), Vec <PortRef>>,
  dispatched : DashMap <(usize, usize, u64), ()>
}

////////////////////////////////////////////////////////////////////////////////
//  impls
////////////////////////////////////////////////////////////////////////////////

impl Multiplexer {
  pub fn new (head_ports : BTreeMap <String, Vec <PortRef>>) -> Self {
    Multiplexer {
      head_ports,
      flush_deps: DashMap::new(),
      dispatched: DashMap::new()
    }
  }

  /// Deliveries for one published message.
  pub fn route (&self, message : &Message) -> Vec <(PortRef, Message)> {
    match message.payload {
      Payload::Data (ref store) => self.route_data (message, store),
      Payload::Flush (_)        => self.route_flush (message)
    }
  }

  /// Register the head ports of `product_names` as flush dependents of
  /// `(scope, child_level)`. Splitters prime their outputs this way on
  /// every invocation so that a scope with zero children still drains its
  /// downstream reductions.
  pub fn prime (
    &self, scope : &LevelId, child_level : &str, product_names : &[String]
  ) {
    for name in product_names {
      if let Some (ports) = self.head_ports.get (name) {
        let mut deps = self.flush_deps
          .entry ((scope.hash(), child_level.to_owned()))
          .or_default();
        for port in ports {
          if !deps.contains (port) {
            deps.push (*port);
          }
        }
      }
    }
  }

  fn route_data (&self, message : &Message, store : &Arc <ProductStore>)
    -> Vec <(PortRef, Message)>
  {
    let mut out = Vec::new();
    for (name, owning) in store.stores_for_products() {
      let Some (ports) = self.head_ports.get (&name) else { continue };
      for port in ports {
        let first = self.dispatched
          .insert ((port.node, port.port, owning.id().hash()), ())
          .is_none();
        if !first {
          continue
        }
        out.push ((*port, Message {
          payload:     Payload::Data (owning.clone()),
          id:          message.id,
          original_id: message.original_id
        }));
        if let Some (parent) = owning.id().parent() {
          let mut deps = self.flush_deps
            .entry ((parent.hash(), owning.level_name().to_owned()))
            .or_default();
          if !deps.contains (port) {
            deps.push (*port);
          }
        }
      }
    }
    out
  }

  fn route_flush (&self, message : &Message) -> Vec <(PortRef, Message)> {
    let token   = message.flush_token().unwrap();
    let mut out = Vec::new();
    for (child_level, _) in token.counts.iter() {
      match self.flush_deps
        .remove (&(token.scope.hash(), child_level.to_owned()))
      {
        Some ((_, ports)) => for port in ports {
          out.push ((port, message.clone()));
        },
        None => log::trace!(
          "no dependents for flush of scope {} level {}: dropping",
          token.scope, child_level)
      }
    }
    out
  }
}

////////////////////////////////////////////////////////////////////////////////
//  tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use crate::level::FlushCounts;
  use crate::message::FlushToken;
  use crate::store::{ProductStore, Products};
  use super::*;

  fn mux_for (entries : &[(&str, PortRef)]) -> Multiplexer {
    let mut head_ports : BTreeMap <String, Vec <PortRef>> = BTreeMap::new();
    for (name, port) in entries {
      head_ports.entry ((*name).to_owned()).or_default().push (*port);
    }
    Multiplexer::new (head_ports)
  }

  fn flush_message (scope : &crate::level::LevelId, level : &str,
    count : usize, msg_id : u64) -> Message
  {
    let mut child_counts = std::collections::BTreeMap::new();
    let _ = child_counts.insert (level.to_owned(), count);
    Message::flush (FlushToken {
      scope:  scope.clone(),
      counts: Arc::new (FlushCounts::new ("event".to_owned(), child_counts))
    }, msg_id)
  }

  #[test]
  fn routes_each_owning_store_once() {
    let port = PortRef { node: 0, port: 0 };
    let mux  = mux_for (&[("offset", port)]);
    let root  = ProductStore::base (Products::new().with ("offset", 6u32));
    let event = root.make_child (0, "event",
      Products::new().with ("number", 1u32));
    let first = mux.route (&Message::data (root.clone(), 1));
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].0, port);
    // the chain of a later message reaches the same owning store: deduped
    assert!(mux.route (&Message::data (event, 2)).is_empty());
    assert!(mux.route (&Message::data (root, 3)).is_empty());
  }

  #[test]
  fn flush_reaches_ports_that_received_data_under_the_scope() {
    let port = PortRef { node: 1, port: 0 };
    let mux  = mux_for (&[("number", port)]);
    let root  = ProductStore::base (Products::new());
    let event = root.make_child (0, "event",
      Products::new().with ("number", 1u32));
    assert_eq!(mux.route (&Message::data (event, 1)).len(), 1);
    let flushed = mux.route (&flush_message (root.id(), "event", 1, 2));
    assert_eq!(flushed.len(), 1);
    assert!(flushed[0].1.is_flush());
    // the dependency entry was erased: a second flush is dropped
    assert!(mux.route (&flush_message (root.id(), "event", 1, 3)).is_empty());
  }

  #[test]
  fn priming_registers_dependents_without_data() {
    let port  = PortRef { node: 2, port: 0 };
    let mux   = mux_for (&[("num", port)]);
    let scope = crate::level::LevelId::root().make_child (0);
    mux.prime (&scope, "count", &["num".to_owned()]);
    let flushed = mux.route (&flush_message (&scope, "count", 0, 1));
    assert_eq!(flushed.len(), 1);
    assert_eq!(flushed[0].0, port);
  }

  #[test]
  fn unmatched_flush_is_dropped() {
    let mux   = mux_for (&[]);
    let scope = crate::level::LevelId::root();
    assert!(mux.route (&flush_message (&scope, "event", 2, 1)).is_empty());
  }
}
