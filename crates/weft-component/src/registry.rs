//! Thread-local class registry.
//!
//! Maps component names to their compiled classes so hosts can look a
//! class up by tag name. Registering a name twice is a logged no-op; the
//! first registration wins, matching the one-compilation-per-class rule.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::class::ComponentClass;

thread_local! {
    static REGISTRY: RefCell<FxHashMap<String, Rc<ComponentClass>>> =
        RefCell::new(FxHashMap::default());
}

/// Register a class under its name. Returns `false` (and leaves the
/// existing registration untouched) if the name is already taken.
pub fn register(class: Rc<ComponentClass>) -> bool {
    REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        let name = class.name().to_owned();
        if registry.contains_key(&name) {
            warn!(%name, "class already registered; keeping the first");
            return false;
        }
        debug!(%name, "class registered");
        registry.insert(name, class);
        true
    })
}

/// Look a registered class up by name.
#[must_use]
pub fn lookup(name: &str) -> Option<Rc<ComponentClass>> {
    REGISTRY.with(|registry| registry.borrow().get(name).cloned())
}

#[must_use]
pub fn is_registered(name: &str) -> bool {
    REGISTRY.with(|registry| registry.borrow().contains_key(name))
}

/// Drop every registration on this thread.
pub fn clear() {
    REGISTRY.with(|registry| registry.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use crate::class::{ComponentClass, ComponentDef};

    use super::*;

    fn class(name: &str) -> Rc<ComponentClass> {
        ComponentClass::new(ComponentDef::new(name, "<p>x</p>")).unwrap()
    }

    #[test]
    fn register_and_lookup() {
        clear();
        assert!(register(class("reg-a")));
        assert!(is_registered("reg-a"));
        assert_eq!(lookup("reg-a").unwrap().name(), "reg-a");
        assert!(lookup("reg-missing").is_none());
    }

    #[test]
    fn re_registration_is_a_no_op() {
        clear();
        let first = class("reg-b");
        assert!(register(Rc::clone(&first)));
        assert!(!register(class("reg-b")));
        assert!(Rc::ptr_eq(&lookup("reg-b").unwrap(), &first));
    }
}
