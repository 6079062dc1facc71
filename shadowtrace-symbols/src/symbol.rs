/// A function symbol resolved to its runtime address.
///
/// The name is stored demangled when demangling succeeds at load time,
/// decorated otherwise. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    addr: u64,
    name: String,
}

impl Symbol {
    pub fn new(addr: u64, name: impl Into<String>) -> Self {
        Self {
            addr,
            name: name.into(),
        }
    }

    /// Runtime address of the function entry point.
    pub fn addr(&self) -> u64 {
        self.addr
    }

    /// Demangled (or decorated, if demangling failed) function name.
    pub fn name(&self) -> &str {
        &self.name
    }
}
