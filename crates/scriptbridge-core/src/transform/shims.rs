//! Names the sandbox runtime provides itself.

/// The runtime bridge binding every rewritten reference goes through.
pub const RUNTIME_BINDING: &str = "dc";

/// Property of the runtime bridge that loads another module.
pub const REQUIRE_PROPERTY: &str = "require";

/// Property holding UI components and utilities.
pub const UI_PROPERTY: &str = "preact";

/// Property holding hook functions.
pub const HOOKS_PROPERTY: &str = "hooks";

/// Property holding the JSX factory functions.
pub const JSX_RUNTIME_PROPERTY: &str = "jsxRuntime";

/// Import source of the runtime's own API.
pub const INTERNAL_NAMESPACE: &str = "#datacore";

/// Names starting with this prefix are hooks.
pub const HOOK_PREFIX: &str = "use";

/// UI libraries served by the runtime instead of the registry.
pub const UI_SHIMS: &[&str] = &[
    "react",
    "react-dom",
    "react-dom/client",
    "preact",
    "preact/hooks",
    "preact/compat",
];

/// JSX runtime entry points served by the runtime.
pub const JSX_RUNTIME_SHIMS: &[&str] = &[
    "react/jsx-runtime",
    "react/jsx-dev-runtime",
    "preact/jsx-runtime",
];

/// Which runtime object a shimmed specifier maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShimTarget {
    /// A UI library; bindings split between `preact` and `hooks`.
    Ui,
    /// A JSX runtime; everything comes from `jsxRuntime`.
    JsxRuntime,
}

impl ShimTarget {
    /// The runtime property a binding named `imported` comes from.
    #[must_use]
    pub fn property_for(self, imported: Option<&str>) -> &'static str {
        match self {
            Self::JsxRuntime => JSX_RUNTIME_PROPERTY,
            Self::Ui => match imported {
                Some(name) if is_hook_name(name) => HOOKS_PROPERTY,
                _ => UI_PROPERTY,
            },
        }
    }
}

/// Classify a specifier the runtime serves directly.
#[must_use]
pub fn runtime_shim(spec: &str) -> Option<ShimTarget> {
    if UI_SHIMS.contains(&spec) {
        Some(ShimTarget::Ui)
    } else if JSX_RUNTIME_SHIMS.contains(&spec) {
        Some(ShimTarget::JsxRuntime)
    } else {
        None
    }
}

/// Whether a package name is served by the runtime and never fetched.
#[must_use]
pub fn is_runtime_shim(name: &str) -> bool {
    runtime_shim(name).is_some()
}

/// Whether a specifier is the runtime's internal namespace.
#[must_use]
pub fn is_internal_namespace(spec: &str) -> bool {
    spec == INTERNAL_NAMESPACE
}

/// `useState`, `useEffect` and plain `use` are hooks; `user` is not.
#[must_use]
pub fn is_hook_name(name: &str) -> bool {
    match name.strip_prefix(HOOK_PREFIX) {
        Some(rest) => rest.chars().next().map_or(true, |c| c.is_ascii_uppercase()),
        None => false,
    }
}
