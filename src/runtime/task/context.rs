//! Layered task context
//!
//! Every task owns one layer and holds a reference to its parent's layer.
//! Reads fall through the chain, writes only land in the own layer. A child
//! remembers how many writes its parent had seen when the child was created
//! and ignores anything written to the parent afterwards.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::runtime::value::Value;

/// Versioned values for one key, oldest first.
type Versions = SmallVec<[(u64, Value); 1]>;

struct Layer {
    /// Parent layer and the parent write clock at creation time.
    parent: Option<(Context, u64)>,
    entries: RefCell<HashMap<String, Versions>>,
    clock: Cell<u64>,
}

/// Handle to one context layer.
#[derive(Clone)]
pub struct Context {
    layer: Rc<Layer>,
}

impl Context {
    /// Create a root layer with no parent.
    pub fn new() -> Self {
        Self {
            layer: Rc::new(Layer {
                parent: None,
                entries: RefCell::new(HashMap::new()),
                clock: Cell::new(0),
            }),
        }
    }

    /// Create a root layer pre-populated with `props`.
    pub fn with_props<I, K>(props: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let ctx = Self::new();
        ctx.extend(props);
        ctx
    }

    /// Create a child layer that sees the current state of this layer.
    pub fn child(&self) -> Self {
        Self {
            layer: Rc::new(Layer {
                parent: Some((self.clone(), self.layer.clock.get())),
                entries: RefCell::new(HashMap::new()),
                clock: Cell::new(0),
            }),
        }
    }

    /// Look up `key`, walking towards the root.
    pub fn get(
        &self,
        key: &str,
    ) -> Option<Value> {
        let mut layer = self.clone();
        let mut limit = u64::MAX;
        loop {
            if let Some(value) = layer.visible(key, limit) {
                return Some(value);
            }
            let (parent, seen) = layer.layer.parent.clone()?;
            layer = parent;
            limit = seen;
        }
    }

    /// Latest value of `key` in this layer written before `limit`.
    fn visible(
        &self,
        key: &str,
        limit: u64,
    ) -> Option<Value> {
        let entries = self.layer.entries.borrow();
        entries
            .get(key)?
            .iter()
            .rev()
            .find(|(version, _)| *version < limit)
            .map(|(_, value)| value.clone())
    }

    /// Write `key` into this layer only.
    pub fn set(
        &self,
        key: impl Into<String>,
        value: Value,
    ) {
        let version = self.layer.clock.get();
        self.layer.clock.set(version + 1);
        self.layer
            .entries
            .borrow_mut()
            .entry(key.into())
            .or_default()
            .push((version, value));
    }

    /// Merge `props` into this layer.
    pub fn extend<I, K>(
        &self,
        props: I,
    ) where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (key, value) in props {
            self.set(key, value);
        }
    }

    /// Keys written to this layer (not inherited ones).
    pub fn own_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.layer.entries.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Context")
            .field("own_keys", &self.own_keys())
            .field("has_parent", &self.layer.parent.is_some())
            .finish()
    }
}
