//! Reference bookkeeping for `$id`/`$ref` preservation.

use crate::{Error, Result};
use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

/// Maps ids read from `$id` to the values built for them.
#[derive(Default)]
pub(crate) struct ReferenceResolver {
    values: HashMap<String, Rc<dyn Any>>,
}

impl ReferenceResolver {
    pub fn add(&mut self, id: String, value: Rc<dyn Any>) -> Result<()> {
        if self.values.contains_key(&id) {
            return Err(Error::DuplicateReferenceId(id));
        }
        self.values.insert(id, value);
        Ok(())
    }

    pub fn resolve(&self, id: &str) -> Result<Rc<dyn Any>> {
        self.values
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ReferenceNotFound(id.to_string()))
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Assigns sequential ids to shared values by address while writing.
///
/// Addresses stay valid because the written graph is borrowed for the whole
/// conversion.
#[derive(Default)]
pub(crate) struct ReferenceTracker {
    ids: HashMap<usize, String>,
    next: usize,
}

impl ReferenceTracker {
    /// Returns the id for `address` and whether it was already written.
    pub fn get_or_register(&mut self, address: usize) -> (String, bool) {
        if let Some(id) = self.ids.get(&address) {
            return (id.clone(), true);
        }
        self.next += 1;
        let id = self.next.to_string();
        self.ids.insert(address, id.clone());
        (id, false)
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.next = 0;
    }
}
