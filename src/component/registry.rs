//! Component type registry - the capability table behind named specifiers.
//!
//! Every concrete component type is a [`ComponentType`]: a name, a factory,
//! and its own static registry of child types for named lookup during
//! render. Specifiers are a closed tagged union ([`ComponentSpec`]) resolved
//! once per creation call; type identity is `Rc` pointer identity, never a
//! live structural comparison.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::component::{Component, Props, SetupContext};

// =============================================================================
// Component type
// =============================================================================

/// Factory signature: build an instance, registering hooks on the context.
pub type ComponentFactory = Box<dyn Fn(&SetupContext, &Props) -> Box<dyn Component>>;

/// A concrete component type: the unit of identity for reconciliation.
pub struct ComponentType {
    name: String,
    create: ComponentFactory,
    /// Static registry: child types this type can reference by name.
    components: RefCell<HashMap<String, Rc<ComponentType>>>,
}

impl ComponentType {
    /// Define a new component type.
    pub fn new(
        name: impl Into<String>,
        create: impl Fn(&SetupContext, &Props) -> Box<dyn Component> + 'static,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            create: Box::new(create),
            components: RefCell::new(HashMap::new()),
        })
    }

    /// The type's registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a child type under its own name, replacing any previous
    /// entry with that name.
    pub fn register(&self, child: Rc<ComponentType>) {
        self.components
            .borrow_mut()
            .insert(child.name.clone(), child);
    }

    /// Resolve a named specifier against this type's static registry.
    pub fn resolve(&self, name: &str) -> Option<Rc<ComponentType>> {
        self.components.borrow().get(name).cloned()
    }

    /// Whether two type handles denote the same concrete type.
    pub fn same_type(a: &Rc<ComponentType>, b: &Rc<ComponentType>) -> bool {
        Rc::ptr_eq(a, b)
    }

    pub(crate) fn instantiate(&self, ctx: &SetupContext, props: &Props) -> Box<dyn Component> {
        (self.create)(ctx, props)
    }
}

impl std::fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentType")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Component specifier
// =============================================================================

/// How a tree position names the component to place there.
#[derive(Clone, Debug)]
pub enum ComponentSpec {
    /// Looked up by name in the rendering parent's static registry.
    Named(String),
    /// Resolved dynamically at render time by the caller. A type change at
    /// a keyed slot forces full recreation of the occupant.
    Dynamic(Rc<ComponentType>),
}

impl ComponentSpec {
    /// Convenience constructor for named specifiers.
    pub fn named(name: impl Into<String>) -> Self {
        ComponentSpec::Named(name.into())
    }
}

impl From<Rc<ComponentType>> for ComponentSpec {
    fn from(ty: Rc<ComponentType>) -> Self {
        ComponentSpec::Dynamic(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RenderedTree;
    use crate::component::RenderContext;

    struct Nothing;

    impl Component for Nothing {
        fn assign_props(&mut self, _props: &Props) {}

        fn render(&mut self, _ctx: &RenderContext) -> anyhow::Result<Box<dyn RenderedTree>> {
            anyhow::bail!("not rendered in this test")
        }
    }

    fn nothing_type(name: &str) -> Rc<ComponentType> {
        ComponentType::new(name, |_ctx, _props| Box::new(Nothing))
    }

    #[test]
    fn test_register_and_resolve() {
        let parent = nothing_type("app");
        let child = nothing_type("button");
        parent.register(child.clone());

        let resolved = parent.resolve("button").expect("registered type");
        assert!(ComponentType::same_type(&resolved, &child));
        assert!(parent.resolve("missing").is_none());
    }

    #[test]
    fn test_identity_is_pointer_identity() {
        let a = nothing_type("widget");
        let b = nothing_type("widget");

        // Same name, distinct definitions: not the same type.
        assert!(!ComponentType::same_type(&a, &b));
        assert!(ComponentType::same_type(&a, &a.clone()));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let parent = nothing_type("app");
        let first = nothing_type("panel");
        let second = nothing_type("panel");

        parent.register(first);
        parent.register(second.clone());

        let resolved = parent.resolve("panel").expect("registered type");
        assert!(ComponentType::same_type(&resolved, &second));
    }
}
