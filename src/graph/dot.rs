//! Graphviz dump of the declared topology.

use std::collections::BTreeMap;

use strum::IntoEnumIterator;

use crate::graph::Registry;
use crate::node::NodeKind;

////////////////////////////////////////////////////////////////////////////////
//  functions
////////////////////////////////////////////////////////////////////////////////

pub(crate) fn dotfile (registry : &Registry) -> String {
  /// Escape HTML special characters
  #[inline]
  fn escape (s : &str) -> String {
    use marksman_escape::Escape;
    String::from_utf8 (Escape::new (s.bytes()).collect()).unwrap()
  }

  let mut s = String::new();

  // begin graph
  s.push_str (
    "digraph {\
   \n  overlap=scale\
   \n  rankdir=LR\
   \n  node [fontname=\"Sans Bold\"]\
   \n  edge [arrowhead=vee, fontname=\"Sans\"]\n");
  s.push_str ("  source [shape=doublecircle]\n");

  // nodes, grouped by kind
  for kind in NodeKind::iter() {
    let shape = match kind {
      NodeKind::Transform => "box",
      NodeKind::Reduction => "house",
      NodeKind::Splitter  => "trapezium",
      NodeKind::Filter    => "diamond",
      NodeKind::Monitor   => "note",
      NodeKind::Output    => "cds"
    };
    for spec in registry.nodes.iter()
      .filter (|spec| spec.logic.kind() == kind)
    {
      s.push_str (format!(
        "  \"{}\" [shape={}, label=<<B>{}</B><BR/><I>{}</I>>]\n",
        escape (&spec.name), shape, escape (&spec.name), kind).as_str());
    }
  }

  // edges along product dependencies; unproduced inputs are fed by the
  // source
  let mut producers = BTreeMap::new();
  for spec in &registry.nodes {
    for product in &spec.outputs {
      let _ = producers.insert (product.as_str(), spec.name.as_str());
    }
  }
  for spec in &registry.nodes {
    for product in &spec.inputs {
      let tail = producers.get (product.as_str()).copied()
        .unwrap_or ("source");
      s.push_str (format!(
        "  \"{}\" -> \"{}\" [label=<{}>]\n",
        escape (tail), escape (&spec.name), escape (product)).as_str());
    }
    for filter in &spec.filtered_by {
      s.push_str (format!(
        "  \"{}\" -> \"{}\" [style=dashed]\n",
        escape (filter), escape (&spec.name)).as_str());
    }
  }

  // end graph
  s.push_str ("}\n");
  s
}
