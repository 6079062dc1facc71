use crate::Result;
use regex::{Regex, RegexBuilder};

/// What a filter expression is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterScope {
    /// The path of the module owning the instrumented function.
    Module,
    /// The resolved (demangled) function name.
    Symbol,
}

/// An exclusion filter applied on the hook path. A match means the event is
/// dropped before it reaches the shadow stack. Filters fire in registration
/// order; the first match wins.
#[derive(Debug)]
pub struct Filter {
    expr: Regex,
    scope: FilterScope,
}

impl Filter {
    pub fn new(expr: &str, icase: bool, scope: FilterScope) -> Result<Self> {
        let expr = RegexBuilder::new(expr).case_insensitive(icase).build()?;
        Ok(Self { expr, scope })
    }

    pub fn scope(&self) -> FilterScope {
        self.scope
    }

    /// True when the text matches, i.e. the event is excluded.
    pub fn apply(&self, text: &str) -> bool {
        self.expr.is_match(text)
    }
}
