//! Messages flowing on graph edges: data stores and end-of-scope flush
//! tokens.

use std::fmt;
use std::sync::Arc;

use crate::level::{FlushCounts, LevelId};
use crate::store::ProductStore;

////////////////////////////////////////////////////////////////////////////////
//  structs
////////////////////////////////////////////////////////////////////////////////

/// One message on an edge.
///
/// `id` is assigned from the emitting node's monotone counter and serves as
/// a correlation tag for filter decisions. `original_id` records the message
/// that spawned a splitter expansion; it is carried for tracing only.
#[derive(Clone, Debug)]
pub struct Message {
  pub payload     : Payload,
  pub id          : u64,
  pub original_id : Option <u64>
}

/// Announces that the scope `scope` has closed and carries the final tally
/// of its direct children. Reductions accumulating under `scope` fire once
/// their received contributions balance the tally.
#[derive(Clone, Debug)]
pub struct FlushToken {
  pub scope  : LevelId,
  pub counts : Arc <FlushCounts>
}

/// One predecessor filter's decision for the message tagged `msg_id`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FilterResult {
  pub msg_id : u64,
  pub index  : usize,
  pub passed : bool
}

////////////////////////////////////////////////////////////////////////////////
//  enums
////////////////////////////////////////////////////////////////////////////////

/// Message payload: either a data store or an end-of-scope sentinel. Flush
/// tokens carry their expected-count table explicitly instead of flagging a
/// productless store.
#[derive(Clone, Debug)]
pub enum Payload {
  Data  (Arc <ProductStore>),
  Flush (FlushToken)
}

////////////////////////////////////////////////////////////////////////////////
//  impls
////////////////////////////////////////////////////////////////////////////////

impl Message {
  pub fn data (store : Arc <ProductStore>, id : u64) -> Self {
    Message { payload: Payload::Data (store), id, original_id: None }
  }

  pub fn flush (token : FlushToken, id : u64) -> Self {
    Message { payload: Payload::Flush (token), id, original_id: None }
  }

  pub fn spawned_by (mut self, original_id : u64) -> Self {
    self.original_id = Some (original_id);
    self
  }

  #[inline]
  pub fn is_flush (&self) -> bool {
    matches!(self.payload, Payload::Flush (_))
  }

  /// The data store, if this is a data message.
  pub fn store (&self) -> Option <&Arc <ProductStore>> {
    match self.payload {
      Payload::Data (ref store) => Some (store),
      Payload::Flush (_)        => None
    }
  }

  /// The flush token, if this is a flush message.
  pub fn flush_token (&self) -> Option <&FlushToken> {
    match self.payload {
      Payload::Data (_)          => None,
      Payload::Flush (ref token) => Some (token)
    }
  }
}

impl fmt::Display for Message {
  fn fmt (&self, f : &mut fmt::Formatter) -> fmt::Result {
    match self.payload {
      Payload::Data (ref store) =>
        write!(f, "message[{}] data {}", self.id, store.id()),
      Payload::Flush (ref token) =>
        write!(f, "message[{}] flush {}", self.id, token.scope)
    }
  }
}
