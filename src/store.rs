//! Product stores: immutable bundles of named, type-erased values at one
//! hierarchical level, linked to their enclosing stores.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::level::LevelId;

////////////////////////////////////////////////////////////////////////////////
//  constants
////////////////////////////////////////////////////////////////////////////////

/// Level name of stores created with `ProductStore::base`.
pub const ROOT_LEVEL_NAME : &str = "(root)";

////////////////////////////////////////////////////////////////////////////////
//  structs
////////////////////////////////////////////////////////////////////////////////

/// A single named product value, type-erased for transport between nodes.
#[derive(Clone)]
pub struct Product {
  value     : Arc <dyn Any + Send + Sync>,
  type_name : &'static str
}

/// An ordered bag of named products.
#[derive(Clone, Default)]
pub struct Products {
  entries : BTreeMap <String, Product>
}

/// An immutable mapping from product name to product value at one level of
/// the processing hierarchy.
///
/// Stores created by the source or by splitter generators form the hierarchy
/// proper; stores created by node invocations are *layers*: they share the
/// id and level name of their parent and contribute additional products to
/// the same scope. Lookup walks the parent chain with the deepest owner
/// winning.
pub struct ProductStore {
  id         : LevelId,
  level_name : String,
  parent     : Option <Arc <ProductStore>>,
  products   : Products
}

////////////////////////////////////////////////////////////////////////////////
//  impls
////////////////////////////////////////////////////////////////////////////////

impl Product {
  pub fn new <T : Send + Sync + 'static> (value : T) -> Self {
    Product {
      value:     Arc::new (value),
      type_name: std::any::type_name::<T>()
    }
  }

  pub fn downcast_ref <T : 'static> (&self) -> Option <&T> {
    self.value.downcast_ref()
  }

  /// Name of the concrete type stored in this product.
  #[inline]
  pub fn type_name (&self) -> &'static str {
    self.type_name
  }
}

impl fmt::Debug for Product {
  fn fmt (&self, f : &mut fmt::Formatter) -> fmt::Result {
    write!(f, "Product <{}>", self.type_name)
  }
}

impl Products {
  pub fn new() -> Self {
    Products::default()
  }

  /// Chainable insertion, for building a bag in one expression.
  pub fn with <T : Send + Sync + 'static> (
    mut self, name : &str, value : T
  ) -> Self {
    self.add (name, value);
    self
  }

  pub fn add <T : Send + Sync + 'static> (&mut self, name : &str, value : T) {
    self.insert (name, Product::new (value));
  }

  pub fn insert (&mut self, name : &str, product : Product) {
    let _ = self.entries.insert (name.to_owned(), product);
  }

  pub fn get (&self, name : &str) -> Option <&Product> {
    self.entries.get (name)
  }

  pub fn names (&self) -> impl Iterator <Item=&str> {
    self.entries.keys().map (String::as_str)
  }

  #[inline]
  pub fn len (&self) -> usize {
    self.entries.len()
  }

  #[inline]
  pub fn is_empty (&self) -> bool {
    self.entries.is_empty()
  }

  pub fn contains (&self, name : &str) -> bool {
    self.entries.contains_key (name)
  }
}

impl fmt::Debug for Products {
  fn fmt (&self, f : &mut fmt::Formatter) -> fmt::Result {
    f.debug_map().entries (self.entries.iter()).finish()
  }
}

impl ProductStore {
  /// A root store, optionally carrying top-level products.
  pub fn base (products : Products) -> Arc <Self> {
    Arc::new (ProductStore {
      id:         LevelId::root(),
      level_name: ROOT_LEVEL_NAME.to_owned(),
      parent:     None,
      products
    })
  }

  /// A child store one level below `self` in the hierarchy.
  pub fn make_child (
    self       : &Arc <Self>,
    index      : usize,
    level_name : &str,
    products   : Products
  ) -> Arc <Self> {
    Arc::new (ProductStore {
      id:         self.id.make_child (index),
      level_name: level_name.to_owned(),
      parent:     Some (self.clone()),
      products
    })
  }

  /// A layer over `self`: same id and level name, additional products.
  pub fn extend (self : &Arc <Self>, products : Products) -> Arc <Self> {
    Arc::new (ProductStore {
      id:         self.id.clone(),
      level_name: self.level_name.clone(),
      parent:     Some (self.clone()),
      products
    })
  }

  /// A store with no parent chain, for results published into a scope whose
  /// own store is not at hand (a reduction fired by a flush alone).
  pub fn detached (
    id : LevelId, level_name : &str, products : Products
  ) -> Arc <Self> {
    Arc::new (ProductStore {
      id,
      level_name: level_name.to_owned(),
      parent:     None,
      products
    })
  }

  #[inline]
  pub fn id (&self) -> &LevelId {
    &self.id
  }

  #[inline]
  pub fn level_name (&self) -> &str {
    &self.level_name
  }

  #[inline]
  pub fn parent (&self) -> Option <&Arc <ProductStore>> {
    self.parent.as_ref()
  }

  /// Products held by this store itself, excluding the parent chain.
  #[inline]
  pub fn products (&self) -> &Products {
    &self.products
  }

  /// Look up a product by name, walking the parent chain; the deepest owner
  /// wins.
  pub fn product (&self, name : &str) -> Option <&Product> {
    let mut store = self;
    loop {
      if let Some (product) = store.products.get (name) {
        return Some (product)
      }
      match store.parent {
        Some (ref parent) => store = parent,
        None              => return None
      }
    }
  }

  /// Typed product lookup along the parent chain.
  pub fn get <T : 'static> (&self, name : &str) -> Option <&T> {
    self.product (name).and_then (Product::downcast_ref)
  }

  /// The store in the chain that actually holds `name`.
  pub fn owner_of (self : &Arc <Self>, name : &str)
    -> Option <Arc <ProductStore>>
  {
    let mut store = self;
    loop {
      if store.products.contains (name) {
        return Some (store.clone())
      }
      store = store.parent.as_ref()?;
    }
  }

  /// For each product name known in this chain, the store that holds it;
  /// deeper stores shadow their ancestors.
  pub fn stores_for_products (self : &Arc <Self>)
    -> impl Iterator <Item=(String, Arc <ProductStore>)>
  {
    let mut owners = BTreeMap::new();
    let mut store  = self.clone();
    loop {
      for name in store.products.names() {
        if !owners.contains_key (name) {
          let _ = owners.insert (name.to_owned(), store.clone());
        }
      }
      let parent = store.parent.clone();
      match parent {
        Some (parent) => store = parent,
        None          => break
      }
    }
    owners.into_iter()
  }

  /// The deepest store in the chain whose id equals `id`.
  pub fn ancestor (self : &Arc <Self>, id : &LevelId)
    -> Option <Arc <ProductStore>>
  {
    let mut store = self;
    loop {
      if store.id == *id {
        return Some (store.clone())
      }
      store = store.parent.as_ref()?;
    }
  }

  /// Length of the parent chain; used to pick the most-derived message of a
  /// joined tuple.
  pub fn derivation (&self) -> usize {
    let mut store = self;
    let mut depth = 0;
    while let Some (ref parent) = store.parent {
      depth += 1;
      store  = parent;
    }
    depth
  }
}

impl fmt::Debug for ProductStore {
  fn fmt (&self, f : &mut fmt::Formatter) -> fmt::Result {
    write!(f, "store[{} @{}]{:?}", self.id, self.level_name,
      self.products.names().collect::<Vec <_>>())
  }
}

////////////////////////////////////////////////////////////////////////////////
//  tests
////////////////////////////////////////////////////////////////////////////////
