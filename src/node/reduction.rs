//! Reduction accumulation: per-parent-scope buckets that fire when the
//! received contribution count balances the expected count announced by the
//! scope's flush token.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;

use crate::level::LevelId;
use crate::message::FlushToken;
use crate::node::{FinishFn, InitFn, Inputs, NodeError, ReductionFn};
use crate::store::{Product, ProductStore};

////////////////////////////////////////////////////////////////////////////////
//  structs
////////////////////////////////////////////////////////////////////////////////

/// All in-progress buckets of one reduction node, keyed by the hash of the
/// parent scope of the contributions.
///
/// Contributions are keyed by the *level* parent of the contribution's id,
/// not the store's parent link, so that transform-layered stores accumulate
/// under the same scope as the hierarchy store they extend.
pub(crate) struct Buckets {
  buckets : DashMap <u64, Bucket>
}

/// A fired bucket, ready to be published under the scope's id.
pub(crate) struct Fired {
  pub scope        : LevelId,
  pub scope_level  : String,
  pub parent_store : Option <Arc <ProductStore>>,
  pub result       : Product
}

struct Bucket {
  scope        : LevelId,
  acc          : Option <Box <dyn Any + Send + Sync>>,
  received     : usize,
  expected     : Option <usize>,
  flush_seen   : bool,
  child_level  : Option <String>,
  scope_level  : Option <String>,
  parent_store : Option <Arc <ProductStore>>
}

////////////////////////////////////////////////////////////////////////////////
//  impls
////////////////////////////////////////////////////////////////////////////////

impl Buckets {
  pub fn new() -> Self {
    Buckets { buckets: DashMap::new() }
  }

  /// Fold one contribution into its scope's bucket; fires if the bucket is
  /// balanced.
  pub fn contribute (
    &self,
    inputs : &Inputs,
    fold   : &ReductionFn,
    init   : &InitFn,
    finish : &FinishFn
  ) -> Result <Option <Fired>, NodeError> {
    let store = inputs.store();
    let scope = store.id().parent().ok_or_else (|| NodeError::fail (format!(
      "contribution store {} is at the root and has no scope to accumulate \
       under", store.id())))?;
    let hash  = scope.hash();
    let fired = {
      let mut bucket = self.buckets.entry (hash)
        .or_insert_with (|| Bucket::new (scope));
      if bucket.acc.is_none() {
        bucket.acc = Some (init());
      }
      fold (bucket.acc.as_mut().unwrap().as_mut(), inputs)?;
      bucket.received += 1;
      if bucket.child_level.is_none() {
        bucket.child_level = Some (store.level_name().to_owned());
      }
      if bucket.parent_store.is_none() {
        bucket.parent_store = store.ancestor (&bucket.scope);
      }
      bucket.take_fired_if_balanced (init, finish)
    };
    if fired.is_some() {
      let _ = self.buckets.remove (&hash);
    }
    Ok (fired)
  }

  /// Record the scope's flush token; fires if the bucket is balanced. A
  /// bucket first created by the flush itself fires immediately with the
  /// initial accumulator value when the expected count is zero.
  pub fn on_flush (
    &self,
    token  : &FlushToken,
    init   : &InitFn,
    finish : &FinishFn
  ) -> Option <Fired> {
    let hash  = token.scope.hash();
    let fired = {
      let mut bucket = self.buckets.entry (hash)
        .or_insert_with (|| Bucket::new (token.scope.clone()));
      let expected = match bucket.child_level {
        Some (ref level) => token.counts.count_for (level),
        None             => {
          let single = token.counts.single();
          if let Some ((level, _)) = single {
            bucket.child_level = Some (level.to_owned());
          }
          single.map (|(_, count)| count)
        }
      };
      let Some (expected) = expected else {
        use colored::Colorize;
        log::warn!("flush for scope {} does not count level {}: {}",
          token.scope,
          bucket.child_level.as_deref().unwrap_or ("<unknown>"),
          "ignoring".yellow());
        return None
      };
      bucket.expected    = Some (expected);
      bucket.flush_seen  = true;
      bucket.scope_level = Some (token.counts.level_name().to_owned());
      bucket.take_fired_if_balanced (init, finish)
    };
    if fired.is_some() {
      let _ = self.buckets.remove (&hash);
    }
    fired
  }

  /// Scopes of buckets that never fired; non-empty only on abnormal runs.
  pub fn stranded (&self) -> Vec <LevelId> {
    self.buckets.iter().map (|entry| entry.scope.clone()).collect()
  }
}

impl Bucket {
  fn new (scope : LevelId) -> Self {
    Bucket {
      scope,
      acc:          None,
      received:     0,
      expected:     None,
      flush_seen:   false,
      child_level:  None,
      scope_level:  None,
      parent_store: None
    }
  }

  fn take_fired_if_balanced (&mut self, init : &InitFn, finish : &FinishFn)
    -> Option <Fired>
  {
    if !(self.flush_seen && self.expected == Some (self.received)) {
      return None
    }
    let acc = self.acc.take().unwrap_or_else (|| init());
    Some (Fired {
      scope:        self.scope.clone(),
      scope_level:  self.scope_level.take().unwrap_or_default(),
      parent_store: self.parent_store.take(),
      result:       finish (acc)
    })
  }
}

////////////////////////////////////////////////////////////////////////////////
//  tests
////////////////////////////////////////////////////////////////////////////////
