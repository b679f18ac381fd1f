//! Splitter support: the child-store generator handed to user callables and
//! the idempotence guard over already-seen input stores.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::level::{FlushCounts, LevelId};
use crate::node::NodeError;
use crate::node::transform::check_declared_outputs;
use crate::store::{ProductStore, Products};

////////////////////////////////////////////////////////////////////////////////
//  structs
////////////////////////////////////////////////////////////////////////////////

/// Builds the child stores of one splitter invocation.
///
/// Children are emitted as they are made; the index is assigned
/// automatically and the per-domain tally composes the synthetic flush that
/// closes the new scope.
pub struct Generator <'a> {
  parent   : Arc <ProductStore>,
  domain   : &'a str,
  declared : &'a [String],
  index    : usize,
  emit     : &'a mut dyn FnMut (Arc <ProductStore>)
}

/// Guards a splitter against processing the same input store twice.
/// Entries are reaped once the enclosing scope's flush arrives; entries
/// still present at shutdown are reported as stranded.
pub(crate) struct SplitterGuard {
  seen : DashMap <u64, SeenEntry>
}

struct SeenEntry {
  id         : LevelId,
  processed  : bool,
  flush_seen : bool
}

////////////////////////////////////////////////////////////////////////////////
//  impls
////////////////////////////////////////////////////////////////////////////////

impl <'a> Generator <'a> {
  pub(crate) fn new (
    parent   : Arc <ProductStore>,
    domain   : &'a str,
    declared : &'a [String],
    emit     : &'a mut dyn FnMut (Arc <ProductStore>)
  ) -> Self {
    Generator { parent, domain, declared, index: 0, emit }
  }

  /// Build and emit the next child store of the new level.
  pub fn make_child (&mut self, products : Products)
    -> Result <Arc <ProductStore>, NodeError>
  {
    check_declared_outputs (self.declared, &products)?;
    let child = self.parent.make_child (self.index, self.domain, products);
    self.index += 1;
    (self.emit) (child.clone());
    Ok (child)
  }

  /// Number of children emitted so far.
  #[inline]
  pub fn emitted (&self) -> usize {
    self.index
  }

  /// The tally announced by the scope-closing flush token.
  pub(crate) fn flush_counts (&self) -> FlushCounts {
    let mut child_counts = BTreeMap::new();
    let _ = child_counts.insert (self.domain.to_owned(), self.index);
    FlushCounts::new (self.parent.level_name().to_owned(), child_counts)
  }
}

impl SplitterGuard {
  pub fn new() -> Self {
    SplitterGuard { seen: DashMap::new() }
  }

  /// True exactly once per input store id; later arrivals only update
  /// bookkeeping.
  pub fn begin (&self, id : &LevelId) -> bool {
    let mut first = false;
    let _ = self.seen.entry (id.hash()).or_insert_with (|| {
      first = true;
      SeenEntry { id: id.clone(), processed: false, flush_seen: false }
    });
    first
  }

  pub fn mark_processed (&self, id : &LevelId) {
    let reap = {
      let mut entry = match self.seen.get_mut (&id.hash()) {
        Some (entry) => entry,
        None         => return
      };
      entry.processed = true;
      entry.flush_seen
    };
    if reap {
      let _ = self.seen.remove (&id.hash());
    }
  }

  /// The enclosing scope closed: no further arrivals of its children are
  /// possible, so processed entries can be dropped.
  pub fn on_flush (&self, scope : &LevelId) {
    self.seen.retain (|_, entry| {
      if entry.id.parent().as_ref() == Some (scope) {
        entry.flush_seen = true;
        !entry.processed
      } else {
        true
      }
    });
  }

  /// Input store ids still cached; non-empty at shutdown indicates stores
  /// whose scope never flushed.
  pub fn stranded (&self) -> Vec <LevelId> {
    self.seen.iter().map (|entry| entry.id.clone()).collect()
  }
}

////////////////////////////////////////////////////////////////////////////////
//  tests
////////////////////////////////////////////////////////////////////////////////
