//! Filter collector: per-message aggregation of predecessor filter
//! decisions with buffering of the data message until all decisions arrive.

use dashmap::DashMap;

use crate::message::{FilterResult, Message};

////////////////////////////////////////////////////////////////////////////////
//  structs
////////////////////////////////////////////////////////////////////////////////

/// Gate in front of one consumer with F predecessor filters and N input
/// ports. State is keyed by message id; data and decisions for one message
/// arrive from the same multiplexer dispatch and so share an id.
pub(crate) struct Collector {
  nfilters : usize,
  arity    : usize,
  state    : DashMap <u64, Entry>
}

struct Entry {
  decisions : Vec <Decision>,
  data      : Vec <Option <Message>>,
  filled    : usize
}

////////////////////////////////////////////////////////////////////////////////
//  enums
////////////////////////////////////////////////////////////////////////////////

/// One predecessor filter's outcome for one message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Decision {
  Pending,
  Pass,
  Fail
}

/// Result of offering an event to the collector.
pub(crate) enum Released {
  /// All decisions passed: the buffered data, tagged by port.
  Forward (Vec <(usize, Message)>),
  /// Some decision failed: the message is discarded.
  Dropped,
  /// Still waiting on data or decisions.
  Waiting
}

////////////////////////////////////////////////////////////////////////////////
//  impls
////////////////////////////////////////////////////////////////////////////////

impl Collector {
  pub fn new (nfilters : usize, arity : usize) -> Self {
    debug_assert!(0 < nfilters);
    Collector { nfilters, arity, state: DashMap::new() }
  }

  pub fn accept_data (&self, port : usize, message : Message) -> Released {
    let msg_id = message.id;
    self.update (msg_id, |entry| {
      if entry.data[port].is_some() {
        use colored::Colorize;
        log::warn!("collector discarding duplicate data at port {} for \
          message {}: {}", port, msg_id, "keeping first".yellow());
        return
      }
      entry.data[port] = Some (message);
      entry.filled += 1;
    })
  }

  pub fn accept_filter (&self, result : FilterResult) -> Released {
    self.update (result.msg_id, |entry| {
      if entry.decisions[result.index] != Decision::Pending {
        use colored::Colorize;
        log::warn!("collector discarding duplicate decision {} for message \
          {}: {}", result.index, result.msg_id, "keeping first".yellow());
        return
      }
      entry.decisions[result.index] =
        if result.passed { Decision::Pass } else { Decision::Fail };
    })
  }

  /// Entries still buffered; non-empty at shutdown indicates messages whose
  /// data or decisions never completed.
  pub fn stranded (&self) -> usize {
    self.state.len()
  }

  fn update <F : FnOnce (&mut Entry)> (&self, msg_id : u64, apply : F)
    -> Released
  {
    let outcome = {
      let mut entry = self.state.entry (msg_id).or_insert_with (|| Entry {
        decisions: vec![Decision::Pending; self.nfilters],
        data:      vec![None; self.arity],
        filled:    0
      });
      if entry.data.is_empty() {
        // the entry was released by a completing event and not yet removed
        entry.decisions = vec![Decision::Pending; self.nfilters];
        entry.data      = vec![None; self.arity];
        entry.filled    = 0;
      }
      apply (entry.value_mut());
      if !(entry.is_complete() && entry.filled == self.arity) {
        None
      } else if entry.to_boolean() {
        Some (Released::Forward (
          std::mem::take (&mut entry.data).into_iter().enumerate()
            .map (|(port, message)| (port, message.unwrap()))
            .collect()))
      } else {
        Some (Released::Dropped)
      }
    };
    match outcome {
      None           => Released::Waiting,
      Some (release) => {
        // both tables are complete: erase the entry regardless of outcome
        let _ = self.state.remove (&msg_id);
        release
      }
    }
  }
}

impl Entry {
  /// No decision is still pending.
  fn is_complete (&self) -> bool {
    self.decisions.iter().all (|decision| *decision != Decision::Pending)
  }

  /// Conjunction of the decisions.
  fn to_boolean (&self) -> bool {
    self.decisions.iter().all (|decision| *decision == Decision::Pass)
  }
}

////////////////////////////////////////////////////////////////////////////////
//  tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
  use crate::store::{ProductStore, Products};
  use super::*;

  fn data (msg_id : u64) -> Message {
    Message::data (ProductStore::base (Products::new()), msg_id)
  }

  #[test]
  fn releases_when_decisions_and_data_complete() {
    let collector = Collector::new (2, 1);
    assert!(matches!(collector.accept_data (0, data (7)),
      Released::Waiting));
    assert!(matches!(
      collector.accept_filter (
        FilterResult { msg_id: 7, index: 0, passed: true }),
      Released::Waiting));
    match collector.accept_filter (
      FilterResult { msg_id: 7, index: 1, passed: true })
    {
      Released::Forward (messages) => {
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, 0);
        assert_eq!(messages[0].1.id, 7);
      }
      _ => panic!("expected release")
    }
    assert_eq!(collector.stranded(), 0);
  }

  #[test]
  fn any_failure_drops_the_data() {
    let collector = Collector::new (2, 1);
    assert!(matches!(
      collector.accept_filter (
        FilterResult { msg_id: 3, index: 1, passed: false }),
      Released::Waiting));
    assert!(matches!(
      collector.accept_filter (
        FilterResult { msg_id: 3, index: 0, passed: true }),
      Released::Waiting));
    // failed decisions still wait for the data before erasing
    assert!(matches!(collector.accept_data (0, data (3)),
      Released::Dropped));
    assert_eq!(collector.stranded(), 0);
  }

  #[test]
  fn messages_are_gated_independently() {
    let collector = Collector::new (1, 1);
    assert!(matches!(collector.accept_data (0, data (1)),
      Released::Waiting));
    assert!(matches!(collector.accept_data (0, data (2)),
      Released::Waiting));
    assert!(matches!(
      collector.accept_filter (
        FilterResult { msg_id: 2, index: 0, passed: true }),
      Released::Forward (_)));
    assert_eq!(collector.stranded(), 1);
  }
}
