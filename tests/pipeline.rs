//! Transform pipelines over a single store: multi-input joins, layered
//! output stores, monitors and output sinks.

use std::sync::{Arc, Mutex};

use weft::{
  Concurrency, Graph, Inputs, ProductStore, Products, Registry
};

fn init_logger() {
  let _ = env_logger::builder().is_test (true).try_init();
}

#[test]
fn class_component() {
  init_logger();
  let mut registry = Registry::new();
  registry.expect_from_source (["number", "temperature", "name"]);
  registry.declare_transform ("process", |inputs : &Inputs| {
    let number      = *inputs.get::<i32> ("number")?;
    let temperature = *inputs.get::<f64> ("temperature")?;
    let name        = inputs.get::<String> ("name")?.clone();
    Ok (Products::new()
      .with ("onumber", number)
      .with ("otemperature", temperature)
      .with ("oname", name))
  }).unwrap()
    .input (["number", "temperature", "name"])
    .output (["onumber", "otemperature", "oname"])
    .concurrency (Concurrency::Unlimited);

  let seen = Arc::new (Mutex::new (Vec::new()));
  {
    let seen = seen.clone();
    registry.declare_monitor ("verify", move |inputs : &Inputs| {
      seen.lock().unwrap().push ((
        *inputs.get::<i32> ("onumber")?,
        *inputs.get::<f64> ("otemperature")?,
        inputs.get::<String> ("oname")?.clone()
      ));
      Ok (())
    }).unwrap()
      .input (["onumber", "otemperature", "oname"])
      .concurrency (Concurrency::Unlimited);
  }

  let event = ProductStore::base (Products::new()).make_child (0, "event",
    Products::new()
      .with ("number", 3i32)
      .with ("temperature", 98.5f64)
      .with ("name", "John".to_owned()));
  let report = Graph::run_once (registry, event).execute().unwrap();

  assert_eq!(report.calls_for ("process"), 1);
  assert_eq!(report.calls_for ("verify"), 1);
  assert_eq!(*seen.lock().unwrap(),
    vec![(3, 98.5, "John".to_owned())]);
}

#[test]
fn sqrt_of_sum_pipeline() {
  init_logger();
  let mut registry = Registry::new();
  registry.expect_from_source (["numbers", "offset"]);
  registry.declare_transform ("square_numbers", |inputs : &Inputs| {
    let numbers : &Vec <u32> = inputs.get ("numbers")?;
    let squared : Vec <u32>  = numbers.iter().map (|n| n * n).collect();
    Ok (Products::new().with ("squared_numbers", squared))
  }).unwrap()
    .input (["numbers"])
    .output (["squared_numbers"])
    .concurrency (Concurrency::Unlimited);
  registry.declare_transform ("sum_numbers", |inputs : &Inputs| {
    let squared : &Vec <u32> = inputs.get ("squared_numbers")?;
    assert_eq!(*squared, vec![0, 1, 4, 9, 16]);
    Ok (Products::new().with ("summed_numbers", squared.iter().sum::<u32>()))
  }).unwrap()
    .input (["squared_numbers"])
    .output (["summed_numbers"])
    .concurrency (Concurrency::Unlimited);
  registry.declare_transform ("sqrt_sum_numbers", |inputs : &Inputs| {
    let summed = *inputs.get::<u32> ("summed_numbers")?;
    let offset = *inputs.get::<u32> ("offset")?;
    assert_eq!(summed, 30);
    Ok (Products::new().with ("result", f64::from (summed + offset).sqrt()))
  }).unwrap()
    .input (["summed_numbers", "offset"])
    .output (["result"])
    .concurrency (Concurrency::Unlimited);

  let result = Arc::new (Mutex::new (None));
  {
    let result = result.clone();
    registry.declare_monitor ("verify_result", move |inputs : &Inputs| {
      *result.lock().unwrap() = Some (*inputs.get::<f64> ("result")?);
      Ok (())
    }).unwrap().input (["result"]);
  }

  let store = ProductStore::base (Products::new()
    .with ("numbers", vec![0u32, 1, 2, 3, 4])
    .with ("offset", 6u32));
  let report = Graph::run_once (registry, store).execute().unwrap();

  assert_eq!(report.calls_for ("square_numbers"), 1);
  assert_eq!(report.calls_for ("sum_numbers"), 1);
  assert_eq!(report.calls_for ("sqrt_sum_numbers"), 1);
  assert_eq!(result.lock().unwrap().unwrap(), 6.0); // sqrt (30 + 6)
}

#[test]
fn identity_transform_reproduces_inputs() {
  init_logger();
  let mut registry = Registry::new();
  registry.expect_from_source (["payload"]);
  registry.declare_transform ("identity", |inputs : &Inputs| {
    Ok (Products::new().with ("copy", inputs.get::<Vec <i64>> ("payload")?
      .clone()))
  }).unwrap()
    .input (["payload"])
    .output (["copy"]);

  let seen = Arc::new (Mutex::new (None));
  {
    let seen = seen.clone();
    registry.declare_monitor ("compare", move |inputs : &Inputs| {
      *seen.lock().unwrap() = Some ((
        inputs.get::<Vec <i64>> ("payload")?.clone(),
        inputs.get::<Vec <i64>> ("copy")?.clone()
      ));
      Ok (())
    }).unwrap().input (["payload", "copy"]);
  }

  let payload = vec![5i64, -3, 12];
  let store   = ProductStore::base (
    Products::new().with ("payload", payload.clone()));
  let _ = Graph::run_once (registry, store).execute().unwrap();
  let seen = seen.lock().unwrap().clone().unwrap();
  assert_eq!(seen.0, payload);
  assert_eq!(seen.1, payload);
}

#[test]
fn output_nodes_receive_the_carrying_store() {
  init_logger();
  let mut registry = Registry::new();
  registry.expect_from_source (["numbers"]);
  registry.declare_transform ("total", |inputs : &Inputs| {
    Ok (Products::new()
      .with ("total", inputs.get::<Vec <u32>> ("numbers")?.iter()
        .sum::<u32>()))
  }).unwrap()
    .input (["numbers"])
    .output (["total"]);

  let written = Arc::new (Mutex::new (Vec::new()));
  {
    let written = written.clone();
    registry.declare_output ("write_totals",
      move |store : &Arc <ProductStore>|
    {
      written.lock().unwrap().push ((
        store.id().clone(),
        store.get::<u32> ("total").copied()
      ));
      Ok (())
    }).unwrap().react_to (["total"]);
  }

  let store = ProductStore::base (
    Products::new().with ("numbers", vec![1u32, 2, 3]));
  let report = Graph::run_once (registry, store).execute().unwrap();
  assert_eq!(report.calls_for ("write_totals"), 1);
  let written = written.lock().unwrap();
  assert_eq!(written.len(), 1);
  assert!(written[0].0.is_root());
  assert_eq!(written[0].1, Some (6));
}
