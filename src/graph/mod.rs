//! Graph assembly and execution: wiring producers to consumers along
//! product names, the per-node worker runtime, and the quiescence protocol.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::message::{FilterResult, FlushToken, Message};
use crate::node::reduction::{Buckets, Fired};
use crate::node::splitter::SplitterGuard;
use crate::node::{
  Generator, Inputs, Logic, NodeError, NodeKind, NodeSpec, SplitterFn,
  transform
};
use crate::store::{ProductStore, Products};

////////////////////////////////////////////////////////////////////////////////
//  submodules
////////////////////////////////////////////////////////////////////////////////

pub(crate) mod collector;
pub(crate) mod dot;
pub(crate) mod driver;
pub(crate) mod join;
pub(crate) mod multiplexer;
pub mod registry;

////////////////////////////////////////////////////////////////////////////////
//  reexports
////////////////////////////////////////////////////////////////////////////////

pub use self::registry::{DeclarationError, Registry};

use self::collector::{Collector, Released};
use self::driver::SourceDriver;
use self::join::{JoinStage, Joined};
use self::multiplexer::{Multiplexer, PortRef};

////////////////////////////////////////////////////////////////////////////////
//  enums
////////////////////////////////////////////////////////////////////////////////

/// Error raised while assembling the declared nodes into a runnable graph.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum FinalizeError {
  #[error("product \"{product}\" is produced by both \"{first}\" and \
    \"{second}\"")]
  DuplicateProducer {
    product : String,
    first   : String,
    second  : String
  },
  #[error("node \"{node}\" is filtered by unknown node \"{filter}\"")]
  UnknownFilter { node : String, filter : String },
  #[error("node \"{node}\" is filtered by \"{name}\", which is not a \
    filter")]
  NotAFilter { node : String, name : String },
  #[error("input \"{product}\" of node \"{node}\" has no producer and is \
    not declared as a source or splitter product")]
  UnresolvedProduct { node : String, product : String },
  #[error("node \"{node}\" declares no inputs")]
  NoInputs { node : String },
  #[error("node \"{node}\" declares no outputs")]
  NoOutputs { node : String },
  #[error("reduction \"{node}\" must declare exactly one output, not \
    {count}")]
  ReductionOutputArity { node : String, count : usize },
  #[error("splitter \"{node}\" declares no child domain")]
  MissingDomain { node : String },
  #[error("output node \"{node}\" must react to exactly one product, not \
    {count}")]
  OutputArity { node : String, count : usize }
}

/// Error surfaced by `Graph::execute`.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
  #[error("finalize failed: {0}")]
  Finalize (#[from] FinalizeError),
  #[error("node \"{node}\" failed: {source}")]
  Node {
    node   : String,
    #[source]
    source : NodeError
  },
  #[error("{node} panicked")]
  Panicked { node : String }
}

/// Item on a node's inbox.
enum Item {
  Data {
    port    : usize,
    message : Message
  },
  Filter (FilterResult),
  Shutdown
}

/// Item on the multiplexer's inbox.
enum MuxItem {
  Message (Message),
  Shutdown
}

////////////////////////////////////////////////////////////////////////////////
//  structs
////////////////////////////////////////////////////////////////////////////////

/// A declared graph, ready to execute against a source.
pub struct Graph {
  registry : Registry,
  source   : SourceFn,
  strict   : bool
}

/// Per-node invocation counts observed during a run.
#[derive(Clone, Debug, Default)]
pub struct Report {
  calls : BTreeMap <String, usize>
}

/// One node at runtime: its declaration plus inbox, join stage, optional
/// filter collector, wiring, and kind-specific state.
struct NodeRuntime {
  spec           : NodeSpec,
  inbox_tx       : Sender <Item>,
  inbox_rx       : Receiver <Item>,
  join           : JoinStage,
  collector      : Option <Collector>,
  out_edges      : BTreeMap <String, Vec <PortRef>>,
  flush_targets  : Vec <PortRef>,
  filter_targets : vec_map::VecMap <usize>,
  buckets        : Option <Buckets>,
  guard          : Option <SplitterGuard>,
  msg_counter    : AtomicU64,
  calls          : AtomicUsize
}

/// State shared by every thread of a running graph.
struct GraphCore {
  nodes   : Vec <NodeRuntime>,
  mux     : Multiplexer,
  mux_tx  : Sender <MuxItem>,
  tracker : WorkTracker,
  abort   : AtomicBool,
  failure : Mutex <Option <GraphError>>
}

/// Quiescence latch: counts in-flight inbox items. An item is counted
/// before it is enqueued and released after it is fully processed, so the
/// count can only reach zero when no processing can produce further items.
struct WorkTracker {
  pending     : AtomicUsize,
  source_done : AtomicBool,
  lock        : Mutex <()>,
  idle        : Condvar
}

////////////////////////////////////////////////////////////////////////////////
//  types
////////////////////////////////////////////////////////////////////////////////

type SourceFn = Box <dyn FnMut() -> Option <Arc <ProductStore>> + Send>;

////////////////////////////////////////////////////////////////////////////////
//  impls
////////////////////////////////////////////////////////////////////////////////

impl Graph {
  /// A graph over the given declarations, fed by a pull source; `None`
  /// terminates the stream.
  pub fn new <S> (registry : Registry, source : S) -> Self where
    S : FnMut() -> Option <Arc <ProductStore>> + Send + 'static
  {
    Graph {
      registry,
      source: Box::new (source),
      strict: true
    }
  }

  /// A graph fed exactly one store.
  pub fn run_once (registry : Registry, store : Arc <ProductStore>) -> Self {
    let mut store = Some (store);
    Self::new (registry, move || store.take())
  }

  /// Degrade unresolved input products from finalize errors to warnings;
  /// the affected ports become source-fed head ports.
  pub fn lenient (mut self) -> Self {
    self.strict = false;
    self
  }

  /// Graphviz description of the declared topology.
  pub fn dot (&self) -> String {
    dot::dotfile (&self.registry)
  }

  /// Finalize the graph, run it to quiescence, and report per-node
  /// invocation counts. The first node failure aborts the run.
  pub fn execute (self) -> Result <Report, GraphError> {
    let Graph { registry, source, strict } = self;
    let (nodes, mux) = finalize (registry, strict)?;
    let (mux_tx, mux_rx) = crossbeam_channel::unbounded();
    let core = Arc::new (GraphCore {
      nodes,
      mux,
      mux_tx,
      tracker: WorkTracker::new(),
      abort:   AtomicBool::new (false),
      failure: Mutex::new (None)
    });

    let mut handles = Vec::new();
    { // multiplexer task
      let core = core.clone();
      handles.push (std::thread::Builder::new()
        .name ("weft-mux".to_owned())
        .spawn (move || mux_loop (&core, &mux_rx)).unwrap());
    }
    for index in 0..core.nodes.len() {
      let degree = core.nodes[index].spec.concurrency.degree();
      for worker in 0..degree {
        let core = core.clone();
        let name = format!("weft-{}-{}", core.nodes[index].spec.name, worker);
        let rx   = core.nodes[index].inbox_rx.clone();
        handles.push (std::thread::Builder::new()
          .name (name)
          .spawn (move || worker_loop (&core, index, &rx)).unwrap());
      }
    }
    let driver_handle = {
      let core = core.clone();
      std::thread::Builder::new()
        .name ("weft-source".to_owned())
        .spawn (move || driver_loop (&core, source)).unwrap()
    };

    core.tracker.wait();

    // quiescent: release every thread and join
    let _ = core.mux_tx.send (MuxItem::Shutdown);
    for node in &core.nodes {
      for _ in 0..node.spec.concurrency.degree() {
        let _ = node.inbox_tx.send (Item::Shutdown);
      }
    }
    if driver_handle.join().is_err() {
      core.fail (GraphError::Panicked { node: "the source".to_owned() });
    }
    for handle in handles {
      if handle.join().is_err() {
        core.fail (GraphError::Panicked { node: "a worker".to_owned() });
      }
    }

    let failure = core.failure.lock().take();
    match failure {
      Some (error) => Err (error),
      None         => {
        warn_stranded (&core);
        let calls = core.nodes.iter().map (|node| {
          (node.spec.name.clone(), node.calls.load (Ordering::Relaxed))
        }).collect();
        Ok (Report { calls })
      }
    }
  }
}

impl Report {
  /// Invocation count of the named node; zero for unknown names.
  pub fn calls_for (&self, name : &str) -> usize {
    self.calls.get (name).copied().unwrap_or (0)
  }

  pub fn iter (&self) -> impl Iterator <Item=(&str, usize)> {
    self.calls.iter().map (|(name, count)| (name.as_str(), *count))
  }
}

impl GraphCore {
  fn send_item (&self, node : usize, item : Item) {
    self.tracker.add();
    if self.nodes[node].inbox_tx.send (item).is_err() {
      use colored::Colorize;
      log::warn!("send to node \"{}\" failed: {}", self.nodes[node].spec.name,
        "inbox disconnected".red().bold());
      self.tracker.complete();
    }
  }

  fn send_mux (&self, message : Message) {
    self.tracker.add();
    if self.mux_tx.send (MuxItem::Message (message)).is_err() {
      use colored::Colorize;
      log::warn!("send to multiplexer failed: {}",
        "inbox disconnected".red().bold());
      self.tracker.complete();
    }
  }

  fn next_msg_id (&self, node : usize) -> u64 {
    self.nodes[node].msg_counter.fetch_add (1, Ordering::Relaxed) + 1
  }

  /// Record the first failure and abort the run; later items are drained
  /// without processing.
  fn fail (&self, error : GraphError) {
    self.abort.store (true, Ordering::SeqCst);
    let mut failure = self.failure.lock();
    if failure.is_none() {
      *failure = Some (error);
    }
  }
}

impl WorkTracker {
  fn new() -> Self {
    WorkTracker {
      pending:     AtomicUsize::new (0),
      source_done: AtomicBool::new (false),
      lock:        Mutex::new (()),
      idle:        Condvar::new()
    }
  }

  fn add (&self) {
    let _ = self.pending.fetch_add (1, Ordering::SeqCst);
  }

  fn complete (&self) {
    if self.pending.fetch_sub (1, Ordering::SeqCst) == 1
      && self.source_done.load (Ordering::SeqCst)
    {
      let _guard = self.lock.lock();
      self.idle.notify_all();
    }
  }

  fn source_finished (&self) {
    self.source_done.store (true, Ordering::SeqCst);
    let _guard = self.lock.lock();
    self.idle.notify_all();
  }

  fn wait (&self) {
    let mut guard = self.lock.lock();
    while !(self.pending.load (Ordering::SeqCst) == 0
      && self.source_done.load (Ordering::SeqCst))
    {
      self.idle.wait (&mut guard);
    }
  }
}

////////////////////////////////////////////////////////////////////////////////
//  functions
////////////////////////////////////////////////////////////////////////////////

/// Wire the declared nodes: producers (transforms and reductions) connect
/// directly to their consumers; every other input becomes a head port fed
/// by the multiplexer.
fn finalize (registry : Registry, strict : bool)
  -> Result <(Vec <NodeRuntime>, Multiplexer), FinalizeError>
{
  let specs = registry.nodes;

  for spec in &specs {
    let node = || spec.name.clone();
    if spec.inputs.is_empty() {
      return Err (FinalizeError::NoInputs { node: node() })
    }
    match spec.logic.kind() {
      NodeKind::Transform => if spec.outputs.is_empty() {
        return Err (FinalizeError::NoOutputs { node: node() })
      },
      NodeKind::Reduction => if spec.outputs.len() != 1 {
        return Err (FinalizeError::ReductionOutputArity {
          node: node(), count: spec.outputs.len()
        })
      },
      NodeKind::Splitter  => {
        if spec.outputs.is_empty() {
          return Err (FinalizeError::NoOutputs { node: node() })
        }
        if spec.domain.is_none() {
          return Err (FinalizeError::MissingDomain { node: node() })
        }
      }
      NodeKind::Output    => if spec.inputs.len() != 1 {
        return Err (FinalizeError::OutputArity {
          node: node(), count: spec.inputs.len()
        })
      },
      NodeKind::Filter | NodeKind::Monitor => {}
    }
  }

  // producers: transform and reduction outputs connect directly; splitter
  // products are re-routed through the multiplexer, so their consumers
  // remain head ports
  let mut producers         : BTreeMap <String, usize> = BTreeMap::new();
  let mut splitter_products : BTreeMap <String, usize> = BTreeMap::new();
  for (index, spec) in specs.iter().enumerate() {
    let kind = spec.logic.kind();
    if !matches!(kind,
      NodeKind::Transform | NodeKind::Reduction | NodeKind::Splitter)
    {
      continue
    }
    for product in &spec.outputs {
      let first = producers.get (product).or (splitter_products.get (product));
      if let Some (&first) = first {
        return Err (FinalizeError::DuplicateProducer {
          product: product.clone(),
          first:   specs[first].name.clone(),
          second:  spec.name.clone()
        })
      }
      if kind == NodeKind::Splitter {
        let _ = splitter_products.insert (product.clone(), index);
      } else {
        let _ = producers.insert (product.clone(), index);
      }
    }
  }

  let filters : BTreeMap <&str, usize> = specs.iter().enumerate()
    .filter (|(_, spec)| spec.logic.kind() == NodeKind::Filter)
    .map (|(index, spec)| (spec.name.as_str(), index))
    .collect();

  let mut out_edges : Vec <BTreeMap <String, Vec <PortRef>>>
    = specs.iter().map (|_| BTreeMap::new()).collect();
  let mut head_ports : BTreeMap <String, Vec <PortRef>> = BTreeMap::new();
  let mut filter_targets : Vec <vec_map::VecMap <usize>>
    = specs.iter().map (|_| vec_map::VecMap::new()).collect();

  for (cindex, spec) in specs.iter().enumerate() {
    for (port, input) in spec.inputs.iter().enumerate() {
      let port_ref = PortRef { node: cindex, port };
      match producers.get (input) {
        Some (&pindex) => out_edges[pindex]
          .entry (input.clone()).or_default().push (port_ref),
        None => {
          let known = registry.source_products.contains (input)
            || splitter_products.contains_key (input);
          if !known {
            if strict {
              return Err (FinalizeError::UnresolvedProduct {
                node: spec.name.clone(), product: input.clone()
              })
            }
            use colored::Colorize;
            log::warn!("input \"{}\" of node \"{}\" has no producer: {}",
              input, spec.name, "assuming the source provides it".yellow());
          }
          head_ports.entry (input.clone()).or_default().push (port_ref);
        }
      }
    }
    for (findex, fname) in spec.filtered_by.iter().enumerate() {
      match filters.get (fname.as_str()) {
        Some (&fnode) => {
          let _ = filter_targets[fnode].insert (cindex, findex);
        }
        None => {
          return Err (
            if specs.iter().any (|other| other.name == *fname) {
              FinalizeError::NotAFilter {
                node: spec.name.clone(), name: fname.clone()
              }
            } else {
              FinalizeError::UnknownFilter {
                node: spec.name.clone(), filter: fname.clone()
              }
            })
        }
      }
    }
  }

  let mut nodes = Vec::with_capacity (specs.len());
  for (index, spec) in specs.into_iter().enumerate() {
    let (inbox_tx, inbox_rx) = crossbeam_channel::unbounded();
    let arity     = spec.inputs.len();
    let kind      = spec.logic.kind();
    let out_edges = std::mem::take (&mut out_edges[index]);
    let mut flush_targets : Vec <PortRef> = Vec::new();
    for ports in out_edges.values() {
      for port in ports {
        if !flush_targets.contains (port) {
          flush_targets.push (*port);
        }
      }
    }
    nodes.push (NodeRuntime {
      collector: if spec.filtered_by.is_empty() {
        None
      } else {
        Some (Collector::new (spec.filtered_by.len(), arity))
      },
      join:           join::join_or_none (arity),
      out_edges,
      flush_targets,
      filter_targets: std::mem::take (&mut filter_targets[index]),
      buckets:        (kind == NodeKind::Reduction).then (Buckets::new),
      guard:          (kind == NodeKind::Splitter).then (SplitterGuard::new),
      msg_counter:    AtomicU64::new (0),
      calls:          AtomicUsize::new (0),
      inbox_tx,
      inbox_rx,
      spec
    });
  }
  Ok ((nodes, Multiplexer::new (head_ports)))
}

/// Pull stores from the user source until exhausted, then close all open
/// scopes.
fn driver_loop (core : &Arc <GraphCore>, source : SourceFn) {
  let result = std::panic::catch_unwind (AssertUnwindSafe (|| {
    let mut source = source;
    let mut driver = SourceDriver::new();
    loop {
      if core.abort.load (Ordering::SeqCst) {
        break
      }
      match source() {
        Some (store) => for message in driver.push (store) {
          core.send_mux (message);
        },
        None => break
      }
    }
    for message in driver.finish() {
      core.send_mux (message);
    }
  }));
  if result.is_err() {
    core.fail (GraphError::Panicked { node: "the source".to_owned() });
  }
  core.tracker.source_finished();
}

/// The multiplexer's serial task.
fn mux_loop (core : &Arc <GraphCore>, rx : &Receiver <MuxItem>) {
  loop {
    match rx.recv() {
      Err (_) | Ok (MuxItem::Shutdown) => break,
      Ok (MuxItem::Message (message)) => {
        if !core.abort.load (Ordering::SeqCst) {
          for (port, delivery) in core.mux.route (&message) {
            core.send_item (port.node, Item::Data {
              port:    port.port,
              message: delivery
            });
          }
        }
        core.tracker.complete();
      }
    }
  }
}

/// One worker of a node's pool.
fn worker_loop (core : &Arc <GraphCore>, index : usize,
  rx : &Receiver <Item>)
{
  loop {
    match rx.recv() {
      Err (_) | Ok (Item::Shutdown) => break,
      Ok (item) => {
        let outcome = std::panic::catch_unwind (AssertUnwindSafe (|| {
          handle_item (core, index, item)
        }));
        match outcome {
          Ok (Ok (())) => {}
          Ok (Err (error)) => core.fail (GraphError::Node {
            node:   core.nodes[index].spec.name.clone(),
            source: error
          }),
          Err (_) => core.fail (GraphError::Panicked {
            node: format!("node \"{}\"", core.nodes[index].spec.name)
          })
        }
        core.tracker.complete();
      }
    }
  }
}

fn handle_item (core : &GraphCore, index : usize, item : Item)
  -> Result <(), NodeError>
{
  if core.abort.load (Ordering::SeqCst) {
    return Ok (())
  }
  let node = &core.nodes[index];
  match item {
    Item::Shutdown => Ok (()),
    Item::Filter (result) => match node.collector {
      Some (ref collector) =>
        release (core, index, collector.accept_filter (result)),
      None => {
        log::warn!("node \"{}\" received a filter decision but is not \
          gated", node.spec.name);
        Ok (())
      }
    },
    Item::Data { port, message } => {
      match node.collector {
        // flush tokens bypass the gate
        Some (ref collector) if !message.is_flush() =>
          release (core, index, collector.accept_data (port, message)),
        _ => feed_port (core, index, port, message)
      }
    }
  }
}

fn release (core : &GraphCore, index : usize, released : Released)
  -> Result <(), NodeError>
{
  match released {
    Released::Forward (messages) => {
      for (port, message) in messages {
        feed_port (core, index, port, message)?;
      }
      Ok (())
    }
    Released::Dropped | Released::Waiting => Ok (())
  }
}

fn feed_port (core : &GraphCore, index : usize, port : usize,
  message : Message) -> Result <(), NodeError>
{
  let node = &core.nodes[index];
  match join::accept (&node.join, port, message) {
    None                          => Ok (()),
    Some (Joined::Flush (flush))  => handle_flush (core, index, &flush),
    Some (Joined::Tuple (tuple))  => invoke (core, index, &tuple)
  }
}

fn invoke (core : &GraphCore, index : usize, tuple : &[Message])
  -> Result <(), NodeError>
{
  let node   = &core.nodes[index];
  let inputs = Inputs::new (&node.spec.inputs, tuple);
  let _ = node.calls.fetch_add (1, Ordering::Relaxed);
  log::trace!("node \"{}\" invoked on {} (spawned by {:?})",
    node.spec.name, inputs.level_id(),
    tuple.iter().find_map (|message| message.original_id));
  match node.spec.logic {
    Logic::Transform (ref f) => {
      let products = f (&inputs)?;
      let store    = transform::layered_output (
        inputs.store(), &node.spec.outputs, products)?;
      let message  = Message::data (store, core.next_msg_id (index));
      publish (core, index, &message);
      Ok (())
    }
    Logic::Reduction { ref fold, ref init, ref finish } => {
      let buckets = node.buckets.as_ref().unwrap();
      if let Some (fired) = buckets.contribute (&inputs, fold, init, finish)?
      {
        publish_fired (core, index, fired);
      }
      Ok (())
    }
    Logic::Splitter (ref f) =>
      invoke_splitter (core, index, &inputs, f),
    Logic::Filter (ref f) => {
      let passed = f (&inputs)?;
      let msg_id = inputs.ref_msg_id();
      for (target, findex) in node.filter_targets.iter() {
        core.send_item (target, Item::Filter (FilterResult {
          msg_id,
          index: *findex,
          passed
        }));
      }
      Ok (())
    }
    Logic::Monitor (ref f) => f (&inputs),
    Logic::Output  (ref f) => f (inputs.store())
  }
}

fn invoke_splitter (core : &GraphCore, index : usize, inputs : &Inputs,
  f : &SplitterFn) -> Result <(), NodeError>
{
  let node  = &core.nodes[index];
  let store = inputs.store().clone();
  let guard = node.guard.as_ref().unwrap();
  if !guard.begin (store.id()) {
    log::debug!("splitter \"{}\" already expanded store {}: updating \
      bookkeeping only", node.spec.name, store.id());
    return Ok (())
  }
  let original = inputs.ref_msg_id();
  let domain   = node.spec.domain.as_deref().unwrap();
  let counts   = {
    let mut emit = |child : Arc <ProductStore>| {
      let message = Message::data (child, core.next_msg_id (index))
        .spawned_by (original);
      core.send_mux (message);
    };
    let mut generator = Generator::new (
      store.clone(), domain, &node.spec.outputs, &mut emit);
    f (inputs, &mut generator)?;
    generator.flush_counts()
  };
  // register dependents before the token travels, so a scope with zero
  // children still drains its reductions
  core.mux.prime (store.id(), domain, &node.spec.outputs);
  let flush = Message::flush (FlushToken {
    scope:  store.id().clone(),
    counts: Arc::new (counts)
  }, core.next_msg_id (index)).spawned_by (original);
  core.send_mux (flush);
  guard.mark_processed (store.id());
  Ok (())
}

fn handle_flush (core : &GraphCore, index : usize, message : &Message)
  -> Result <(), NodeError>
{
  let node  = &core.nodes[index];
  let token = message.flush_token().unwrap();
  match node.spec.logic {
    Logic::Transform (_) => {
      // forward the token so consumers of this node's products observe the
      // scope closing
      let forwarded = Message {
        payload:     message.payload.clone(),
        id:          core.next_msg_id (index),
        original_id: message.original_id
      };
      for port in &node.flush_targets {
        core.send_item (port.node, Item::Data {
          port:    port.port,
          message: forwarded.clone()
        });
      }
      Ok (())
    }
    Logic::Reduction { ref init, ref finish, .. } => {
      let buckets = node.buckets.as_ref().unwrap();
      if let Some (fired) = buckets.on_flush (token, init, finish) {
        publish_fired (core, index, fired);
      }
      Ok (())
    }
    Logic::Splitter (_) => {
      node.guard.as_ref().unwrap().on_flush (&token.scope);
      Ok (())
    }
    Logic::Filter (_) | Logic::Monitor (_) | Logic::Output (_) => {
      log::trace!("node \"{}\" dropping flush of scope {}",
        node.spec.name, token.scope);
      Ok (())
    }
  }
}

/// Send a data message to every direct consumer of this node's outputs.
fn publish (core : &GraphCore, index : usize, message : &Message) {
  let node = &core.nodes[index];
  for ports in node.out_edges.values() {
    for port in ports {
      core.send_item (port.node, Item::Data {
        port:    port.port,
        message: message.clone()
      });
    }
  }
}

/// Publish a fired reduction bucket under its scope's id.
fn publish_fired (core : &GraphCore, index : usize, fired : Fired) {
  let node = &core.nodes[index];
  let mut products = Products::new();
  products.insert (&node.spec.outputs[0], fired.result);
  let store = match fired.parent_store {
    Some (ref parent) => parent.extend (products),
    None => ProductStore::detached (
      fired.scope.clone(), &fired.scope_level, products)
  };
  let message = Message::data (store, core.next_msg_id (index));
  publish (core, index, &message);
}

/// Warn about state stranded at shutdown: splitter caches, unfired
/// buckets, incomplete tuples and gated messages.
fn warn_stranded (core : &GraphCore) {
  use colored::Colorize;
  for node in &core.nodes {
    if let Some (ref guard) = node.guard {
      let stranded = guard.stranded();
      if !stranded.is_empty() {
        log::warn!("splitter \"{}\" has {} cached stores at shutdown",
          node.spec.name,
          format!("{}", stranded.len()).yellow().bold());
        for id in stranded {
          log::debug!(" => id {}", id);
        }
      }
    }
    if let Some (ref buckets) = node.buckets {
      let stranded = buckets.stranded();
      if !stranded.is_empty() {
        log::warn!("reduction \"{}\" has {} unfired buckets at shutdown",
          node.spec.name,
          format!("{}", stranded.len()).yellow().bold());
        for scope in stranded {
          log::debug!(" => scope {}", scope);
        }
      }
    }
    let stranded = join::stranded (&node.join);
    if !stranded.is_empty() {
      log::warn!("node \"{}\" has {} incomplete input tuples at shutdown",
        node.spec.name, format!("{}", stranded.len()).yellow().bold());
    }
    if let Some (ref collector) = node.collector {
      let stranded = collector.stranded();
      if stranded > 0 {
        log::warn!("node \"{}\" has {} messages still gated at shutdown",
          node.spec.name, format!("{}", stranded).yellow().bold());
      }
    }
  }
}
