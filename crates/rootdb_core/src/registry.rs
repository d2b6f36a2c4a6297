//! Class registry: the anchor for typed restoration.
//!
//! A registered class pairs a name with a zero-argument constructor that
//! produces the class's default fields, plus an optional set of transient
//! field names. On load, the constructor runs first and the snapshot's
//! fields are copied over the defaults, so a transient field always comes
//! back as its constructor default.

use crate::error::{CoreError, CoreResult};
use rootdb_graph::{Fields, Node};
use std::collections::{HashMap, HashSet};

/// A zero-argument constructor producing a class's default fields.
pub type Constructor = fn() -> Fields;

/// A registered class: name, constructor and field-persistence metadata.
#[derive(Debug, Clone)]
pub struct ClassSpec {
    name: String,
    constructor: Constructor,
    transient: HashSet<String>,
}

impl ClassSpec {
    /// Creates a class registration entry.
    pub fn new(name: &str, constructor: Constructor) -> Self {
        Self {
            name: name.to_string(),
            constructor,
            transient: HashSet::new(),
        }
    }

    /// Declares fields that are excluded from persistence. Every field not
    /// listed here is persistent (the default).
    #[must_use]
    pub fn transient(mut self, fields: &[&str]) -> Self {
        self.transient
            .extend(fields.iter().map(|f| (*f).to_string()));
        self
    }

    /// The registered class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the given field survives serialization.
    #[must_use]
    pub fn is_persistent(&self, field: &str) -> bool {
        !self.transient.contains(field)
    }

    /// Runs the zero-argument constructor.
    #[must_use]
    pub fn instantiate(&self) -> Fields {
        (self.constructor)()
    }
}

/// Maps registered class names to their specs.
///
/// Names are unique across the registry, including the built-in system
/// classes that are merged into every registry at construction.
#[derive(Debug)]
pub struct ClassRegistry {
    classes: HashMap<String, ClassSpec>,
}

impl ClassRegistry {
    /// Builds a registry from the user's class list plus the built-in
    /// system classes.
    ///
    /// # Errors
    ///
    /// `DuplicateRegistration` if a name appears twice, whether the list
    /// repeats a class or a user class reuses a reserved built-in name.
    pub fn with_classes(user_classes: Vec<ClassSpec>) -> CoreResult<Self> {
        let mut classes = HashMap::new();
        for spec in builtin_classes().into_iter().chain(user_classes) {
            if classes.contains_key(spec.name()) {
                return Err(CoreError::DuplicateRegistration {
                    class: spec.name().to_string(),
                });
            }
            classes.insert(spec.name().to_string(), spec);
        }
        Ok(Self { classes })
    }

    /// Looks up a class by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ClassSpec> {
        self.classes.get(name)
    }

    /// Whether a class name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }
}

/// The fixed built-in system classes. Their names are reserved; user
/// registrations may not reuse them.
fn builtin_classes() -> Vec<ClassSpec> {
    vec![ClassSpec::new("Date", date_fields)]
}

fn date_fields() -> Fields {
    [(
        "iso".to_string(),
        Node::text("1970-01-01T00:00:00.000Z"),
    )]
    .into_iter()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_fields() -> Fields {
        Fields::new()
    }

    #[test]
    fn registers_and_resolves() {
        let registry =
            ClassRegistry::with_classes(vec![ClassSpec::new("User", empty_fields)]).unwrap();
        assert!(registry.contains("User"));
        assert!(registry.contains("Date"));
        assert!(!registry.contains("Ghost"));
    }

    #[test]
    fn rejects_duplicate_names() {
        let result = ClassRegistry::with_classes(vec![
            ClassSpec::new("User", empty_fields),
            ClassSpec::new("User", empty_fields),
        ]);
        assert!(matches!(
            result,
            Err(CoreError::DuplicateRegistration { class }) if class == "User"
        ));
    }

    #[test]
    fn builtin_names_are_reserved() {
        let result = ClassRegistry::with_classes(vec![ClassSpec::new("Date", empty_fields)]);
        assert!(matches!(
            result,
            Err(CoreError::DuplicateRegistration { class }) if class == "Date"
        ));
    }

    #[test]
    fn fields_are_persistent_by_default() {
        let spec = ClassSpec::new("Session", empty_fields).transient(&["cache"]);
        assert!(spec.is_persistent("user"));
        assert!(!spec.is_persistent("cache"));
    }
}
