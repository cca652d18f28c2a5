use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::descriptor::ProcessDescriptor;
use crate::error::{FinchError, Result};

/// Append-only catalog of the processes a service offers.
#[derive(Default)]
pub struct ProcessRegistry {
    inner: RwLock<Catalog>,
}

#[derive(Default)]
struct Catalog {
    ordered: Vec<Arc<ProcessDescriptor>>,
    by_id: HashMap<String, usize>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, descriptor: ProcessDescriptor) -> Result<()> {
        let mut catalog = self.inner.write();
        if catalog.by_id.contains_key(&descriptor.id) {
            return Err(FinchError::DuplicateProcess(descriptor.id));
        }
        let index = catalog.ordered.len();
        tracing::debug!(process = %descriptor.id, "Registered process");
        catalog.by_id.insert(descriptor.id.clone(), index);
        catalog.ordered.push(Arc::new(descriptor));
        Ok(())
    }

    pub fn lookup(&self, id: &str) -> Result<Arc<ProcessDescriptor>> {
        let catalog = self.inner.read();
        catalog
            .by_id
            .get(id)
            .map(|&i| Arc::clone(&catalog.ordered[i]))
            .ok_or_else(|| FinchError::UnknownProcess(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().by_id.contains_key(id)
    }

    /// Descriptors in registration order.
    ///
    /// The iterator reads the catalog one entry at a time; cloning it restarts
    /// from the same position.
    pub fn list(&self) -> Processes<'_> {
        Processes {
            registry: self,
            next: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone)]
pub struct Processes<'a> {
    registry: &'a ProcessRegistry,
    next: usize,
}

impl Iterator for Processes<'_> {
    type Item = Arc<ProcessDescriptor>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.registry.inner.read().ordered.get(self.next).cloned();
        if item.is_some() {
            self.next += 1;
        }
        item
    }
}
