//! Join-by-id: assembles the N messages sharing a store id into one tuple
//! for multi-input nodes. Flush messages are never joined.

use either::Either;

use dashmap::DashMap;

use crate::level::LevelId;
use crate::message::Message;

////////////////////////////////////////////////////////////////////////////////
//  structs
////////////////////////////////////////////////////////////////////////////////

/// The no-op stage of single-input nodes.
pub(crate) struct Passthrough;

/// Concurrent partial-tuple map keyed by store-id hash. A slot is created on
/// first arrival and erased when the tuple completes.
pub(crate) struct ByIdJoin {
  arity : usize,
  slots : DashMap <u64, Slot>
}

struct Slot {
  entries : Vec <Option <Message>>,
  filled  : usize
}

////////////////////////////////////////////////////////////////////////////////
//  enums
////////////////////////////////////////////////////////////////////////////////

/// Result of offering a message to the join stage.
pub(crate) enum Joined {
  /// A complete input tuple, one message per port.
  Tuple (Vec <Message>),
  /// Flush messages are forwarded immediately, never joined.
  Flush (Message)
}

////////////////////////////////////////////////////////////////////////////////
//  types
////////////////////////////////////////////////////////////////////////////////

pub(crate) type JoinStage = Either <Passthrough, ByIdJoin>;

////////////////////////////////////////////////////////////////////////////////
//  functions
////////////////////////////////////////////////////////////////////////////////

pub(crate) fn join_or_none (arity : usize) -> JoinStage {
  if arity <= 1 {
    Either::Left (Passthrough)
  } else {
    Either::Right (ByIdJoin::new (arity))
  }
}

/// Offer a message arriving at `port`; `Some` when something is ready to
/// move downstream.
pub(crate) fn accept (stage : &JoinStage, port : usize, message : Message)
  -> Option <Joined>
{
  if message.is_flush() {
    return Some (Joined::Flush (message))
  }
  match *stage {
    Either::Left  (_)        => Some (Joined::Tuple (vec![message])),
    Either::Right (ref join) => join.accept (port, message)
  }
}

////////////////////////////////////////////////////////////////////////////////
//  impls
////////////////////////////////////////////////////////////////////////////////

impl ByIdJoin {
  pub fn new (arity : usize) -> Self {
    debug_assert!(1 < arity);
    ByIdJoin { arity, slots: DashMap::new() }
  }

  fn accept (&self, port : usize, message : Message) -> Option <Joined> {
    let hash  = message.store().unwrap().id().hash();
    let taken = {
      let mut slot = self.slots.entry (hash).or_insert_with (|| Slot {
        entries: vec![None; self.arity],
        filled:  0
      });
      if slot.entries.is_empty() {
        // the slot was emptied by a completing tuple and not yet removed
        slot.entries = vec![None; self.arity];
        slot.filled  = 0;
      }
      if slot.entries[port].is_some() {
        use colored::Colorize;
        log::warn!("join discarding duplicate arrival at port {} for id {}: \
          {}", port, message.store().unwrap().id(),
          "keeping first".yellow());
        return None
      }
      slot.entries[port] = Some (message);
      slot.filled += 1;
      if slot.filled == self.arity {
        Some (std::mem::take (&mut slot.entries))
      } else {
        None
      }
    };
    let entries = taken?;
    let _ = self.slots.remove_if (&hash, |_, slot| slot.entries.is_empty());
    Some (Joined::Tuple (
      entries.into_iter().map (Option::unwrap).collect()))
  }

  /// Ids of incomplete tuples; non-empty at shutdown indicates inputs that
  /// never assembled.
  pub fn stranded (&self) -> Vec <LevelId> {
    self.slots.iter().filter_map (|slot| {
      slot.entries.iter().flatten().next()
        .map (|message| message.store().unwrap().id().clone())
    }).collect()
  }
}

/// Ids of incomplete tuples held by the stage.
pub(crate) fn stranded (stage : &JoinStage) -> Vec <LevelId> {
  match *stage {
    Either::Left  (_)        => Vec::new(),
    Either::Right (ref join) => join.stranded()
  }
}

////////////////////////////////////////////////////////////////////////////////
//  tests
////////////////////////////////////////////////////////////////////////////////
