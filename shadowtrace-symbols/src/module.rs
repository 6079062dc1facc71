use crate::demangle::demangle_or_keep;
use crate::symbol::Symbol;
use crate::{Result, SymbolError};
use object::{Object, ObjectSection, ObjectSymbol, SectionKind, SymbolKind};
use std::path::Path;
use tracing::{debug, info};

/// Demangled function symbols loaded from one object file (executable or DSO)
/// at a known load base address.
///
/// Only function symbols defined in executable sections are retained, in the
/// order the object file enumerates them.
#[derive(Debug)]
pub struct ModuleSymbols {
    path: String,
    base: u64,
    symbols: Vec<Symbol>,
}

impl ModuleSymbols {
    /// Load the symbol table of an object file.
    ///
    /// `base` is the runtime load address: 0 for a fixed-address executable,
    /// the load bias for a relocatable DSO. Each symbol's runtime address is
    /// `base` plus the symbol's virtual memory address in the file.
    pub fn load<P: AsRef<Path>>(path: P, base: u64) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading symbol table from: {}", path.display());

        let file_data = std::fs::read(path)?;
        let object_file = object::File::parse(&*file_data)?;

        // The static symbol table only. A file that carries none is of no use
        // for call stack simulation.
        if object_file.symbols().next().is_none() {
            return Err(SymbolError::Stripped(path.to_path_buf()));
        }

        let mut symbols = Vec::new();
        let mut total = 0usize;
        for symbol in object_file.symbols() {
            total += 1;
            if symbol.kind() != SymbolKind::Text {
                continue;
            }

            // Keep only symbols defined in an executable section
            let executable = match symbol.section_index() {
                Some(index) => object_file
                    .section_by_index(index)
                    .map(|section| section.kind() == SectionKind::Text)
                    .unwrap_or(false),
                None => false,
            };
            if !executable {
                continue;
            }

            let name = match symbol.name() {
                Ok(name) if !name.is_empty() => name,
                _ => continue,
            };

            symbols.push(Symbol::new(
                base + symbol.address(),
                demangle_or_keep(name),
            ));
        }

        info!(
            "Loaded symbol table of '{}': base 0x{:x}, {} symbols, {} functions",
            path.display(),
            base,
            total,
            symbols.len()
        );

        Ok(Self {
            path: path.to_string_lossy().into_owned(),
            base,
            symbols,
        })
    }

    /// Build a table from symbols produced elsewhere (JIT registration,
    /// tests). Insertion order is preserved, like the loader path.
    pub fn with_symbols(path: impl Into<String>, base: u64, symbols: Vec<Symbol>) -> Self {
        Self {
            path: path.into(),
            base,
            symbols,
        }
    }

    /// Path of the object file this table was loaded from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Runtime load base address.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Resolve an exact runtime address to a function name.
    ///
    /// The returned reference stays valid for the lifetime of the table.
    pub fn lookup(&self, addr: u64) -> Option<&str> {
        self.symbols
            .iter()
            .find(|sym| sym.addr() == addr)
            .map(|sym| sym.name())
    }

    /// Probe whether an address resolves in this table.
    pub fn contains(&self, addr: u64) -> bool {
        self.lookup(addr).is_some()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Iterate the symbols in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_own_test_binary() {
        let exe = std::env::current_exe().unwrap();
        let table = ModuleSymbols::load(&exe, 0).expect("test binary has symbols");
        assert!(!table.is_empty());
        assert_eq!(table.base(), 0);

        // Every retained address resolves, and to the first symbol stored at
        // that address (aliases share addresses)
        for sym in table.iter().take(32) {
            assert!(table.contains(sym.addr()));
            let first = table
                .iter()
                .find(|s| s.addr() == sym.addr())
                .map(|s| s.name());
            assert_eq!(table.lookup(sym.addr()), first);
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ModuleSymbols::load("/nonexistent/libfoo.so", 0).unwrap_err();
        assert!(matches!(err, SymbolError::Io(_)));
    }

    #[test]
    fn test_non_object_file_is_format_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"definitely not an object file").unwrap();
        let err = ModuleSymbols::load(file.path(), 0).unwrap_err();
        assert!(matches!(err, SymbolError::Object(_)));
    }

    #[test]
    fn test_lookup_misses_unknown_address() {
        let table = ModuleSymbols::with_symbols(
            "libdemo.so",
            0x1000,
            vec![Symbol::new(0x1010, "demo::run()")],
        );
        assert_eq!(table.lookup(0x1010), Some("demo::run()"));
        assert_eq!(table.lookup(0x1014), None);
        assert!(!table.contains(0x1014));
    }
}
