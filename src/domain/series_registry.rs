//! Named, insertion-ordered method definitions shared by a strategy.

use crate::domain::method::Method;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesRegistry {
    entries: Vec<(String, Method)>,
}

impl SeriesRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces `name`. A replaced entry keeps its position.
    pub fn set(&mut self, name: impl Into<String>, method: Method) {
        let name = name.into();
        match self.position(&name) {
            Some(pos) => self.entries[pos].1 = method,
            None => self.entries.push((name, method)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Method> {
        self.position(name).map(|pos| &self.entries[pos].1)
    }

    pub fn has(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<Method> {
        self.position(name).map(|pos| self.entries.remove(pos).1)
    }

    /// Renames in place. Returns false when `old_name` is missing or
    /// `new_name` is already taken by another entry.
    pub fn rename(&mut self, old_name: &str, new_name: impl Into<String>) -> bool {
        let new_name = new_name.into();
        let Some(pos) = self.position(old_name) else {
            return false;
        };
        if old_name != new_name && self.has(&new_name) {
            return false;
        }
        self.entries[pos].0 = new_name;
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Method)> {
        self.entries.iter().map(|(name, method)| (name.as_str(), method))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(entry, _)| entry == name)
    }
}
