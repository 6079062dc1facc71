//! Library initialization and teardown.
//!
//! [`init`] loads the executable's symbol table, walks the linked DSOs and
//! installs the tracer singleton. Until it completes the instrumentation
//! hooks are no-ops, so it is safe to call from an instrumented `main` (or
//! from an ELF constructor shim in the embedding program).

use crate::config::{self, LIBS_ENV};
use crate::error::Result;
use crate::logging;
use crate::namespace::Process;
use crate::tracer::{self, Tracer};
use libc::{c_int, c_void, dl_iterate_phdr, dl_phdr_info, size_t};
use regex::Regex;
use std::ffi::CStr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, info, warn};

/// Initialize the tracer: load the executable's symbol table at base 0,
/// then the tables of every linked DSO selected by `SHADOWTRACE_LIBS`.
///
/// A stripped or unreadable executable fails initialization; a DSO that
/// cannot be loaded is logged and skipped. Returns
/// [`AlreadyInitialized`](crate::TraceError::AlreadyInitialized) on repeat
/// calls.
pub fn init() -> Result<()> {
    logging::init_logging();

    let mut tracer = Tracer::new();

    let exe = std::env::current_exe()?;
    tracer.process.add_module(&exe, 0)?;

    let patterns = dso_patterns()?;
    load_dsos(&mut tracer.process, patterns);

    let pid = tracer.process.pid();
    let modules = tracer.process.module_count();
    let symbols = tracer.process.symbol_count();
    tracer::install(tracer)?;

    info!(
        "shadowtrace {} initialized: pid {}, {} modules, {} function symbols",
        env!("CARGO_PKG_VERSION"),
        pid,
        modules,
        symbols
    );
    Ok(())
}

/// Like [`init`], but first consumes `--shadowtrace-` arguments from the
/// given argument vector (see [`config::init_args`]).
pub fn init_with_args(args: &mut Vec<String>) -> Result<()> {
    config::init_args(args);
    init()
}

/// Compile the DSO selection patterns from the environment.
///
/// `None` means no selection is configured (every DSO participates); an
/// empty list means the variable was set but empty (no DSO participates).
fn dso_patterns() -> Result<Option<Vec<Regex>>> {
    let Some(tokens) = config::split_env_list(LIBS_ENV) else {
        return Ok(None);
    };

    let mut patterns = Vec::with_capacity(tokens.len());
    for token in &tokens {
        patterns.push(Regex::new(token)?);
    }
    Ok(Some(patterns))
}

/// Whether a DSO path participates in call stack simulation.
fn selected(path: &str, patterns: Option<&[Regex]>) -> bool {
    match patterns {
        None => true,
        Some(patterns) => patterns.iter().any(|p| p.is_match(path)),
    }
}

struct DsoScan<'a> {
    process: &'a mut Process,
    patterns: Option<Vec<Regex>>,
}

impl DsoScan<'_> {
    /// Handle one `dl_iterate_phdr` record: apply the selection patterns and
    /// load the DSO's symbol table at `dlpi_addr + phdr[0].p_vaddr`.
    ///
    /// # Safety
    /// `info` must be a record supplied by `dl_iterate_phdr`.
    unsafe fn add(&mut self, info: &dl_phdr_info) {
        if info.dlpi_name.is_null() {
            return;
        }
        let path = CStr::from_ptr(info.dlpi_name).to_string_lossy();
        if path.is_empty() {
            debug!("Skipping DSO with undefined path");
            return;
        }
        if info.dlpi_phnum == 0 {
            debug!("'{}' has 0 segments", path);
            return;
        }
        if !selected(&path, self.patterns.as_deref()) {
            debug!("Filtered out '{}'", path);
            return;
        }

        let base = info.dlpi_addr as u64 + (*info.dlpi_phdr).p_vaddr as u64;
        if let Err(e) = self.process.add_module(path.as_ref(), base) {
            warn!("Skipping module '{}': {}", path, e);
        }
    }
}

/// `dl_iterate_phdr` callback. Returning 0 continues the iteration; a DSO
/// that fails to load must not stop the walk, and a panic must not cross
/// the C frames of the iterator.
unsafe extern "C" fn dso_callback(info: *mut dl_phdr_info, _size: size_t, data: *mut c_void) -> c_int {
    let scan = &mut *(data as *mut DsoScan<'_>);
    if catch_unwind(AssertUnwindSafe(|| scan.add(&*info))).is_err() {
        error!("DSO iteration callback panicked");
    }
    0
}

fn load_dsos(process: &mut Process, patterns: Option<Vec<Regex>>) {
    let mut scan = DsoScan { process, patterns };
    unsafe {
        dl_iterate_phdr(Some(dso_callback), &mut scan as *mut DsoScan<'_> as *mut c_void);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(exprs: &[&str]) -> Vec<Regex> {
        exprs.iter().map(|e| Regex::new(e).unwrap()).collect()
    }

    #[test]
    fn test_no_selection_loads_everything() {
        assert!(selected("/usr/lib/libfoo.so.1", None));
        assert!(selected("", None));
    }

    #[test]
    fn test_empty_selection_loads_nothing() {
        let ps = patterns(&[]);
        assert!(!selected("/usr/lib/libfoo.so.1", Some(&ps)));
    }

    #[test]
    fn test_selection_matches_any_pattern() {
        let ps = patterns(&[r"libfoo\..*", r"libbar\..*"]);
        assert!(selected("libfoo.so.1", Some(&ps)));
        assert!(selected("/lib/libbar.so", Some(&ps)));
        assert!(!selected("libbaz.so", Some(&ps)));
    }
}
