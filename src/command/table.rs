//! The per-element command table (§3 "Command descriptor").
//!
//! A single write lock around insertion gives each add an atomic publish
//! step: readers never observe a partially constructed descriptor, and
//! concurrent adds from multiple tasks are an unsupported, undocumented
//! race (§5 "Shared-resource policy").

use crate::command::handler::CommandDescriptor;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Clone, Default)]
pub struct CommandTable {
    inner: Arc<RwLock<HashMap<String, Arc<CommandDescriptor>>>>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `descriptor` before the command loop starts. Immutable
    /// thereafter by convention — nothing prevents a later call, but the
    /// command loop only ever reads, so a late add merely changes what the
    /// *next* request sees, never corrupts an in-flight dispatch.
    pub fn add(&self, descriptor: CommandDescriptor) {
        let mut table = self.inner.write().expect("command table lock poisoned");
        table.insert(descriptor.name.clone(), Arc::new(descriptor));
    }

    pub fn get(&self, name: &str) -> Option<Arc<CommandDescriptor>> {
        self.inner.read().expect("command table lock poisoned").get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .read()
            .expect("command table lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_get_round_trips() {
        let table = CommandTable::new();
        table.add(CommandDescriptor::raw("hello", 1000, |_| Ok(b"world".to_vec())));
        assert!(table.get("hello").is_some());
        assert!(table.get("ghost").is_none());
    }

    #[test]
    fn names_are_sorted() {
        let table = CommandTable::new();
        table.add(CommandDescriptor::raw("zeta", 1000, |_| Ok(vec![])));
        table.add(CommandDescriptor::raw("alpha", 1000, |_| Ok(vec![])));
        assert_eq!(table.names(), vec!["alpha".to_string(), "zeta".to_string()]);
    }
}
