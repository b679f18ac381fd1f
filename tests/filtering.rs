//! Filter-gated dispatch: consumers behind predecessor filters only see
//! messages for which every filter passed.

use std::sync::{Arc, Mutex};

use weft::{
  Concurrency, Graph, Inputs, ProductStore, Products, Registry
};

fn init_logger() {
  let _ = env_logger::builder().is_test (true).try_init();
}

fn source_of (stores : Vec <Arc <ProductStore>>)
  -> impl FnMut() -> Option <Arc <ProductStore>> + Send
{
  let mut stores = stores.into_iter();
  move || stores.next()
}

fn events (values : &[i64]) -> Vec <Arc <ProductStore>> {
  let root = ProductStore::base (Products::new());
  let mut stores = vec![root.clone()];
  for (index, value) in values.iter().enumerate() {
    stores.push (root.make_child (index, "event",
      Products::new().with ("val", *value)));
  }
  stores
}

#[test]
fn failed_filters_withhold_data() {
  init_logger();
  let mut registry = Registry::new();
  registry.expect_from_source (["val"]);
  registry.declare_filter ("nonzero_id", |inputs : &Inputs| {
    Ok (inputs.level_id().number() != Some (0))
  }).unwrap()
    .input (["val"])
    .concurrency (Concurrency::Unlimited);
  registry.declare_transform ("double", |inputs : &Inputs| {
    Ok (Products::new().with ("dval", inputs.get::<i64> ("val")? * 2))
  }).unwrap()
    .input (["val"])
    .output (["dval"])
    .filtered_by (["nonzero_id"])
    .concurrency (Concurrency::Unlimited);

  let seen = Arc::new (Mutex::new (Vec::new()));
  {
    let seen = seen.clone();
    registry.declare_monitor ("record", move |inputs : &Inputs| {
      seen.lock().unwrap().push ((
        inputs.level_id().number().unwrap(),
        *inputs.get::<i64> ("dval")?
      ));
      Ok (())
    }).unwrap().input (["dval"]);
  }

  let report = Graph::new (registry, source_of (events (&[10, 11, 12, 13])))
    .execute().unwrap();

  // the event with id-last == 0 never reaches the gated transform
  assert_eq!(report.calls_for ("nonzero_id"), 4);
  assert_eq!(report.calls_for ("double"), 3);
  let mut seen = seen.lock().unwrap().clone();
  seen.sort_unstable();
  assert_eq!(seen, vec![(1, 22), (2, 24), (3, 26)]);
}

#[test]
fn gating_is_the_conjunction_of_all_filters() {
  init_logger();
  let mut registry = Registry::new();
  registry.expect_from_source (["val"]);
  registry.declare_filter ("nonzero_id", |inputs : &Inputs| {
    Ok (inputs.level_id().number() != Some (0))
  }).unwrap().input (["val"]);
  registry.declare_filter ("even_val", |inputs : &Inputs| {
    Ok (inputs.get::<i64> ("val")? % 2 == 0)
  }).unwrap().input (["val"]);

  let seen = Arc::new (Mutex::new (Vec::new()));
  {
    let seen = seen.clone();
    registry.declare_monitor ("record", move |inputs : &Inputs| {
      seen.lock().unwrap().push (inputs.level_id().number().unwrap());
      Ok (())
    }).unwrap()
      .input (["val"])
      .filtered_by (["nonzero_id", "even_val"]);
  }

  // ids 0..3 carrying values 10..13: id 0 fails the first filter, odd
  // values fail the second; only id 2 (val 12) passes both
  let report = Graph::new (registry, source_of (events (&[10, 11, 12, 13])))
    .execute().unwrap();
  assert_eq!(report.calls_for ("record"), 1);
  assert_eq!(*seen.lock().unwrap(), vec![2]);
}

#[test]
fn filters_gate_output_sinks_too() {
  init_logger();
  let mut registry = Registry::new();
  registry.expect_from_source (["val"]);
  registry.declare_filter ("positive", |inputs : &Inputs| {
    Ok (*inputs.get::<i64> ("val")? > 0)
  }).unwrap().input (["val"]);

  let written = Arc::new (Mutex::new (Vec::new()));
  {
    let written = written.clone();
    registry.declare_output ("write",
      move |store : &Arc <ProductStore>|
    {
      written.lock().unwrap().push (store.get::<i64> ("val").copied());
      Ok (())
    }).unwrap()
      .react_to (["val"])
      .filtered_by (["positive"]);
  }

  let report = Graph::new (registry, source_of (events (&[-4, 9, -1, 7])))
    .execute().unwrap();
  assert_eq!(report.calls_for ("write"), 2);
  let mut written = written.lock().unwrap().clone();
  written.sort_unstable();
  assert_eq!(written, vec![Some (7), Some (9)]);
}
