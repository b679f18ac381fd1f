//! Boundary behavior and error surfaces: empty sources, strict and lenient
//! finalize, declaration mistakes, failing and panicking callables, and the
//! topology dump.

use weft::{
  DeclarationError, FinalizeError, Graph, GraphError, Inputs, NodeError,
  ProductStore, Products, Registry
};

fn init_logger() {
  let _ = env_logger::builder().is_test (true).try_init();
}

fn watch_registry() -> Registry {
  let mut registry = Registry::new();
  registry.expect_from_source (["x"]);
  registry.declare_monitor ("watch", |_ : &Inputs| Ok (())).unwrap()
    .input (["x"]);
  registry
}

#[test]
fn empty_source_shuts_down_cleanly() {
  init_logger();
  let report = Graph::new (watch_registry(), || None).execute().unwrap();
  assert_eq!(report.calls_for ("watch"), 0);
}

#[test]
fn unresolved_inputs_fail_finalize_in_strict_mode() {
  init_logger();
  let mut registry = Registry::new();
  registry.declare_monitor ("watch", |_ : &Inputs| Ok (())).unwrap()
    .input (["nope"]);
  let error = Graph::new (registry, || None).execute().unwrap_err();
  assert!(matches!(error,
    GraphError::Finalize (FinalizeError::UnresolvedProduct { ref node, ref product })
      if node == "watch" && product == "nope"));
}

#[test]
fn lenient_mode_degrades_unresolved_inputs_to_head_ports() {
  init_logger();
  let mut registry = Registry::new();
  registry.declare_monitor ("watch", |_ : &Inputs| Ok (())).unwrap()
    .input (["nope"]);
  let report = Graph::new (registry, || None).lenient().execute().unwrap();
  assert_eq!(report.calls_for ("watch"), 0);
}

#[test]
fn duplicate_node_names_are_rejected_at_declaration() {
  let mut registry = watch_registry();
  assert_eq!(
    registry.declare_monitor ("watch", |_ : &Inputs| Ok (()))
      .map (|_| ()).unwrap_err(),
    DeclarationError::DuplicateNode { name: "watch".to_owned() });
}

#[test]
fn duplicate_producers_fail_finalize() {
  init_logger();
  let mut registry = Registry::new();
  registry.expect_from_source (["a"]);
  registry.declare_transform ("one", |_ : &Inputs| Ok (Products::new()))
    .unwrap().input (["a"]).output (["b"]);
  registry.declare_transform ("two", |_ : &Inputs| Ok (Products::new()))
    .unwrap().input (["a"]).output (["b"]);
  let error = Graph::new (registry, || None).execute().unwrap_err();
  assert!(matches!(error,
    GraphError::Finalize (FinalizeError::DuplicateProducer { ref product, .. })
      if product == "b"));
}

#[test]
fn unknown_and_non_filter_references_fail_finalize() {
  init_logger();
  let mut registry = watch_registry();
  registry.declare_monitor ("gated", |_ : &Inputs| Ok (())).unwrap()
    .input (["x"])
    .filtered_by (["ghost"]);
  let error = Graph::new (registry, || None).execute().unwrap_err();
  assert!(matches!(error,
    GraphError::Finalize (FinalizeError::UnknownFilter { ref filter, .. })
      if filter == "ghost"));

  let mut registry = watch_registry();
  registry.declare_monitor ("gated", |_ : &Inputs| Ok (())).unwrap()
    .input (["x"])
    .filtered_by (["watch"]);
  let error = Graph::new (registry, || None).execute().unwrap_err();
  assert!(matches!(error,
    GraphError::Finalize (FinalizeError::NotAFilter { ref name, .. })
      if name == "watch"));
}

#[test]
fn misdeclared_nodes_fail_finalize() {
  init_logger();
  let mut registry = Registry::new();
  registry.expect_from_source (["x"]);
  registry.declare_reduction ("sum", 0u64,
    |_ : &mut u64, _ : &Inputs| Ok (())).unwrap()
    .input (["x"]);
  assert!(matches!(
    Graph::new (registry, || None).execute().unwrap_err(),
    GraphError::Finalize (FinalizeError::ReductionOutputArity { .. })));

  let mut registry = Registry::new();
  registry.expect_from_source (["x"]);
  registry.declare_splitter ("split",
    |_ : &Inputs, _ : &mut weft::Generator| Ok (())).unwrap()
    .input (["x"])
    .into (["piece"]);
  assert!(matches!(
    Graph::new (registry, || None).execute().unwrap_err(),
    GraphError::Finalize (FinalizeError::MissingDomain { .. })));

  let mut registry = Registry::new();
  registry.declare_monitor ("watch", |_ : &Inputs| Ok (())).unwrap();
  assert!(matches!(
    Graph::new (registry, || None).execute().unwrap_err(),
    GraphError::Finalize (FinalizeError::NoInputs { .. })));
}

#[test]
fn callable_failures_abort_the_run() {
  init_logger();
  let mut registry = Registry::new();
  registry.expect_from_source (["x"]);
  registry.declare_monitor ("bad", |_ : &Inputs| {
    Err (NodeError::fail ("refusing to watch"))
  }).unwrap().input (["x"]);
  let store = ProductStore::base (Products::new().with ("x", 1i32));
  let error = Graph::run_once (registry, store).execute().unwrap_err();
  assert!(matches!(error,
    GraphError::Node { ref node, .. } if node == "bad"));
}

#[test]
fn callable_panics_surface_as_errors() {
  init_logger();
  let mut registry = Registry::new();
  registry.expect_from_source (["x"]);
  registry.declare_monitor ("explosive", |_ : &Inputs| {
    panic!("boom")
  }).unwrap().input (["x"]);
  let store = ProductStore::base (Products::new().with ("x", 1i32));
  let error = Graph::run_once (registry, store).execute().unwrap_err();
  assert!(matches!(error, GraphError::Panicked { .. }));
}

#[test]
fn dot_dump_describes_the_topology() {
  let mut registry = Registry::new();
  registry.expect_from_source (["numbers"]);
  registry.declare_transform ("square", |_ : &Inputs| Ok (Products::new()))
    .unwrap().input (["numbers"]).output (["squared"]);
  registry.declare_monitor ("watch", |_ : &Inputs| Ok (())).unwrap()
    .input (["squared"]);
  let graph = Graph::new (registry, || None);
  let dot   = graph.dot();
  assert!(dot.starts_with ("digraph {"));
  assert!(dot.contains ("\"square\""));
  assert!(dot.contains ("\"watch\""));
  assert!(dot.contains ("\"square\" -> \"watch\""));
  assert!(dot.contains ("source"));
}

#[test]
fn reports_count_invocations_per_node() {
  init_logger();
  let root   = ProductStore::base (Products::new());
  let stores = vec![
    root.clone(),
    root.make_child (0, "event", Products::new().with ("x", 1i32)),
    root.make_child (1, "event", Products::new().with ("x", 2i32))
  ];
  let mut stores = stores.into_iter();
  let report = Graph::new (watch_registry(), move || stores.next())
    .execute().unwrap();
  assert_eq!(report.calls_for ("watch"), 2);
  assert_eq!(report.iter().count(), 1);
}
