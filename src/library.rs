use serde::Serialize;

/// A managed mod or plugin. Priority is not stored here: it is the entry's index
/// in the owning [`LoadOrder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub name: String,
    pub active: bool,
}

impl Entry {
    pub fn new(name: impl Into<String>, active: bool) -> Self {
        Self {
            name: name.into(),
            active,
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        name_key(&self.name) == name_key(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Mods,
    Plugins,
}

impl CollectionKind {
    pub fn label(self) -> &'static str {
        match self {
            CollectionKind::Mods => "mods",
            CollectionKind::Plugins => "plugins",
        }
    }
}

/// Ordered collection of entries; index 0 is the lowest priority.
///
/// Names are unique under case-insensitive comparison. Every mutation bumps
/// [`LoadOrder::revision`] exactly once, so observers see one change per reorder
/// rather than one per shifted entry.
#[derive(Debug, Clone)]
pub struct LoadOrder {
    kind: CollectionKind,
    entries: Vec<Entry>,
    revision: u64,
}

impl LoadOrder {
    pub fn new(kind: CollectionKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            revision: 0,
        }
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Priority of the named entry.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.matches(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn active_names(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|entry| entry.active)
            .map(|entry| entry.name.as_str())
    }

    /// Clears the collection and refills it in order. Later duplicates are dropped.
    pub fn replace_all(&mut self, entries: Vec<Entry>) {
        self.entries.clear();
        for entry in entries {
            if !self.contains(&entry.name) {
                self.entries.push(entry);
            }
        }
        self.bump();
    }

    /// Returns true when the flag actually changed.
    pub fn set_active(&mut self, index: usize, active: bool) -> bool {
        let Some(entry) = self.entries.get_mut(index) else {
            return false;
        };
        if entry.active == active {
            return false;
        }
        entry.active = active;
        self.bump();
        true
    }

    /// Moves the entry at `index` to `priority`, clamped to the collection bounds.
    /// Returns the priority the entry ended up at.
    pub fn set_priority(&mut self, index: usize, priority: usize) -> Option<usize> {
        if index >= self.entries.len() {
            return None;
        }
        let priority = priority.min(self.entries.len() - 1);
        if priority == index {
            return Some(index);
        }
        let entry = self.entries.remove(index);
        self.entries.insert(priority, entry);
        self.bump();
        Some(priority)
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

/// Comparison key for case-insensitive name identity.
pub fn name_key(name: &str) -> String {
    name.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(names: &[&str]) -> LoadOrder {
        let mut order = LoadOrder::new(CollectionKind::Mods);
        order.replace_all(names.iter().map(|name| Entry::new(*name, false)).collect());
        order
    }

    fn names(order: &LoadOrder) -> Vec<&str> {
        order.entries().iter().map(|entry| entry.name.as_str()).collect()
    }

    #[test]
    fn priority_is_position() {
        let order = order(&["A", "B", "C"]);
        assert_eq!(order.position("c"), Some(2));
        assert_eq!(order.position("missing"), None);
    }

    #[test]
    fn set_priority_relocates_and_renumbers() {
        let mut order = order(&["A", "B", "C", "D"]);
        let revision = order.revision();

        assert_eq!(order.set_priority(0, 2), Some(2));
        assert_eq!(names(&order), vec!["B", "C", "A", "D"]);
        assert_eq!(order.revision(), revision + 1);

        assert_eq!(order.set_priority(3, 0), Some(0));
        assert_eq!(names(&order), vec!["D", "B", "C", "A"]);
    }

    #[test]
    fn set_priority_clamps_to_bounds() {
        let mut order = order(&["A", "B", "C"]);
        assert_eq!(order.set_priority(0, 99), Some(2));
        assert_eq!(names(&order), vec!["B", "C", "A"]);
        assert_eq!(order.set_priority(7, 0), None);
    }

    #[test]
    fn replace_all_keeps_first_case_insensitive_occurrence() {
        let mut order = LoadOrder::new(CollectionKind::Plugins);
        order.replace_all(vec![
            Entry::new("Foo.esp", true),
            Entry::new("bar.esp", false),
            Entry::new("foo.esp", false),
        ]);
        assert_eq!(
            order.entries(),
            &[Entry::new("Foo.esp", true), Entry::new("bar.esp", false)]
        );
    }

    #[test]
    fn set_active_reports_change_once() {
        let mut order = order(&["A"]);
        let revision = order.revision();
        assert!(order.set_active(0, true));
        assert!(!order.set_active(0, true));
        assert_eq!(order.revision(), revision + 1);
        assert_eq!(order.active_names().collect::<Vec<_>>(), vec!["A"]);
    }
}
