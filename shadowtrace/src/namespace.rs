use crate::thread::{current_thread_id, ThreadRecord};
use crate::Result;
use shadowtrace_symbols::ModuleSymbols;
use std::path::Path;
use tracing::{debug, info};

/// One memoized forward resolution. `name` is `None` when the address did not
/// resolve, so negative lookups also skip the module scan.
#[derive(Debug, Clone)]
struct CachedLookup {
    addr: u64,
    name: Option<String>,
}

/// The process namespace: loaded module symbol tables, per-thread records and
/// the forward-lookup cache.
///
/// Modules are append-only after library initialization. Cache entries are
/// never invalidated; the module list is immutable once populated, so a
/// memoized resolution cannot go stale. All access is serialized by the
/// global tracer mutex.
#[derive(Debug)]
pub(crate) struct Process {
    pid: u32,
    threads: Vec<ThreadRecord>,
    modules: Vec<ModuleSymbols>,
    cache: Vec<CachedLookup>,
}

impl Process {
    pub fn new() -> Self {
        Self {
            pid: std::process::id(),
            threads: Vec::new(),
            modules: Vec::new(),
            cache: Vec::new(),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Load the symbol table of an object file and add it to the namespace.
    pub fn add_module<P: AsRef<Path>>(&mut self, path: P, base: u64) -> Result<()> {
        let table = ModuleSymbols::load(path, base)?;
        debug!(
            "Registered module '{}' at 0x{:x} ({} functions)",
            table.path(),
            table.base(),
            table.len()
        );
        self.modules.push(table);
        Ok(())
    }

    /// Register a pre-built symbol table.
    pub fn add_module_table(&mut self, table: ModuleSymbols) {
        self.modules.push(table);
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Total function symbols across all loaded modules.
    pub fn symbol_count(&self) -> usize {
        self.modules.iter().map(|m| m.len()).sum()
    }

    /// Resolve an address to a function name.
    ///
    /// The cache is scanned tail-first (most recently added entries first),
    /// then the modules head-to-tail. Both hits and misses are memoized.
    pub fn lookup(&mut self, addr: u64) -> Option<String> {
        if let Some(entry) = self.cache.iter().rev().find(|e| e.addr == addr) {
            return entry.name.clone();
        }

        let name = self
            .modules
            .iter()
            .find_map(|m| m.lookup(addr))
            .map(|n| n.to_string());

        self.cache.push(CachedLookup {
            addr,
            name: name.clone(),
        });
        name
    }

    /// Find the module that defines an address; returns its path and load
    /// base so a file-relative offset can be computed for line resolution.
    pub fn inverse_lookup(&self, addr: u64) -> Option<(&str, u64)> {
        self.modules
            .iter()
            .find(|m| m.contains(addr))
            .map(|m| (m.path(), m.base()))
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Record of the calling thread, created and registered on first use.
    pub fn current_thread(&mut self) -> &mut ThreadRecord {
        let id = current_thread_id();
        if let Some(index) = self.threads.iter().position(|t| t.handle() == id) {
            return &mut self.threads[index];
        }

        debug!("Registering record for thread 0x{:x}", id);
        self.threads.push(ThreadRecord::new());
        self.threads.last_mut().unwrap()
    }

    /// Index of the calling thread's record, creating it if needed.
    pub fn current_thread_index(&mut self) -> usize {
        let id = current_thread_id();
        if let Some(index) = self.threads.iter().position(|t| t.handle() == id) {
            return index;
        }
        self.threads.push(ThreadRecord::new());
        self.threads.len() - 1
    }

    pub fn thread_by_id(&self, id: u64) -> Option<&ThreadRecord> {
        self.threads.iter().find(|t| t.handle() == id)
    }

    pub fn thread_by_name(&self, name: &str) -> Option<&ThreadRecord> {
        self.threads.iter().find(|t| t.name() == Some(name))
    }

    pub fn thread_at(&self, index: usize) -> Option<&ThreadRecord> {
        self.threads.get(index)
    }

    pub fn thread_at_mut(&mut self, index: usize) -> Option<&mut ThreadRecord> {
        self.threads.get_mut(index)
    }

    /// Handles of all registered threads, in registration order.
    pub fn thread_ids(&self) -> Vec<u64> {
        self.threads.iter().map(|t| t.handle()).collect()
    }

    /// Remove the record of a (cancelled or exited) thread. A second call
    /// for the same id is a no-op.
    pub fn cleanup_thread(&mut self, id: u64) {
        if let Some(index) = self.threads.iter().position(|t| t.handle() == id) {
            info!("Removing record for thread 0x{:x}", id);
            self.threads.remove(index);
        }
    }
}
