//! The tracer singleton and the trace renderer.

use crate::error::{Result, TraceError};
use crate::filter::{Filter, FilterScope};
use crate::namespace::Process;
use crate::plugin::Plugin;
use crate::resolver;
use crate::thread::ThreadRecord;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;
use std::fmt::Write;
use std::path::Path;
use tracing::info;

/// Process-wide tracer state: the namespace plus the plugin and filter
/// registries.
pub(crate) struct Tracer {
    pub(crate) process: Process,
    pub(crate) plugins: Vec<Plugin>,
    pub(crate) filters: Vec<Filter>,
}

impl Tracer {
    pub(crate) fn new() -> Self {
        Self {
            process: Process::new(),
            plugins: Vec::new(),
            filters: Vec::new(),
        }
    }

    /// The hooks stay dormant until at least one symbol table is loaded.
    pub(crate) fn enabled(&self) -> bool {
        self.process.module_count() > 0
    }
}

pub(crate) type TracerSlot = RefCell<Option<Tracer>>;

/// All mutable library state serializes through this one recursive mutex.
/// Recursion is required: hook-path plugin callbacks may call back into the
/// tracer (e.g. to render a trace). Borrows of the inner cell are never held
/// across plugin callbacks or subprocess invocations, so re-entrant calls
/// can borrow again.
static TRACER: ReentrantMutex<TracerSlot> = ReentrantMutex::new(RefCell::new(None));

pub(crate) fn lock() -> ReentrantMutexGuard<'static, TracerSlot> {
    TRACER.lock()
}

/// Install the singleton built by the lifecycle path.
pub(crate) fn install(tracer: Tracer) -> Result<()> {
    let guard = lock();
    let mut slot = guard.borrow_mut();
    if slot.is_some() {
        return Err(TraceError::AlreadyInitialized);
    }
    *slot = Some(tracer);
    Ok(())
}

/// Run a closure against the installed tracer, under the global mutex.
pub(crate) fn with_tracer<T>(f: impl FnOnce(&mut Tracer) -> Result<T>) -> Result<T> {
    let guard = lock();
    let mut slot = guard.borrow_mut();
    match slot.as_mut() {
        Some(tracer) => f(tracer),
        None => Err(TraceError::Uninitialized),
    }
}

/// Drop the tracer singleton. The instrumentation hooks become no-ops again;
/// a later [`init`](crate::init) may reinstall. Safe to call when not
/// initialized.
pub fn shutdown() {
    let guard = lock();
    if guard.borrow_mut().take().is_some() {
        info!("shadowtrace {} finalized", env!("CARGO_PKG_VERSION"));
    }
}

pub fn is_initialized() -> bool {
    lock().borrow().is_some()
}

/// Load the symbol table of an object file and add it to the process
/// namespace.
pub fn add_module<P: AsRef<Path>>(path: P, base: u64) -> Result<()> {
    with_tracer(|t| t.process.add_module(path, base))
}

/// Register a pre-built symbol table (e.g. for JIT-emitted code).
pub fn add_module_table(table: shadowtrace_symbols::ModuleSymbols) -> Result<()> {
    with_tracer(|t| {
        t.process.add_module_table(table);
        Ok(())
    })
}

pub fn module_count() -> Result<usize> {
    with_tracer(|t| Ok(t.process.module_count()))
}

pub fn symbol_count() -> Result<usize> {
    with_tracer(|t| Ok(t.process.symbol_count()))
}

pub fn thread_count() -> Result<usize> {
    with_tracer(|t| Ok(t.process.thread_count()))
}

/// Handles of all registered threads, in registration order.
pub fn thread_ids() -> Result<Vec<u64>> {
    with_tracer(|t| Ok(t.process.thread_ids()))
}

/// Register an exclusion filter. Filters apply on the hook path in
/// registration order; the first match drops the event.
pub fn add_filter(expr: &str, icase: bool, scope: FilterScope) -> Result<()> {
    let filter = Filter::new(expr, icase, scope)?;
    with_tracer(|t| {
        t.filters.push(filter);
        Ok(())
    })
}

pub fn remove_filter(index: usize) -> Result<()> {
    with_tracer(|t| {
        if index >= t.filters.len() {
            return Err(TraceError::Argument("filter index out of range"));
        }
        t.filters.remove(index);
        Ok(())
    })
}

pub fn filter_count() -> Result<usize> {
    with_tracer(|t| Ok(t.filters.len()))
}

/// Register a plugin. Enter callbacks fire in registration order, exit
/// callbacks in reverse registration order.
pub fn add_plugin(plugin: Plugin) -> Result<()> {
    with_tracer(|t| {
        t.plugins.push(plugin);
        Ok(())
    })
}

/// Unregister the first plugin registered under `name`. Unknown names are
/// ignored.
pub fn remove_plugin(name: &str) -> Result<()> {
    with_tracer(|t| {
        if let Some(index) = t.plugins.iter().position(|p| p.name() == Some(name)) {
            t.plugins.remove(index);
        }
        Ok(())
    })
}

pub fn remove_plugin_at(index: usize) -> Result<()> {
    with_tracer(|t| {
        if index >= t.plugins.len() {
            return Err(TraceError::Argument("plugin index out of range"));
        }
        t.plugins.remove(index);
        Ok(())
    })
}

pub fn plugin_count() -> Result<usize> {
    with_tracer(|t| Ok(t.plugins.len()))
}

/// Name the calling thread's record. The name shows up in trace headers in
/// place of `anonymous`.
pub fn name_current_thread(name: impl Into<String>) -> Result<()> {
    let name = name.into();
    with_tracer(|t| {
        t.process.current_thread().set_name(Some(name));
        Ok(())
    })
}

pub fn clear_current_thread_name() -> Result<()> {
    with_tracer(|t| {
        t.process.current_thread().set_name(None);
        Ok(())
    })
}

/// Remove the record of a thread. Call this from a cancellation/cleanup
/// handler before an OS thread exits; otherwise the stale record lives until
/// teardown and keeps appearing in [`dump`] output. A second call for the
/// same id is a no-op.
pub fn cleanup_thread(id: u64) -> Result<()> {
    with_tracer(|t| {
        t.process.cleanup_thread(id);
        Ok(())
    })
}

pub fn cleanup_current_thread() -> Result<()> {
    cleanup_thread(crate::thread::current_thread_id())
}

/// Reconcile the calling thread's shadow stack with the real stack after an
/// unwind whose trace was not rendered. Harmless when already reconciled.
pub fn unwind() -> Result<()> {
    with_tracer(|t| {
        t.process.current_thread().unwind();
        Ok(())
    })
}

/// Append the calling thread's stack trace to `dst` and reconcile the shadow
/// stack.
///
/// At a catch site this renders the exception trace: the frames the unwind
/// tore down are still on the shadow stack and are listed along with the
/// live ones. The shadow stack is unwound afterwards **even if rendering
/// fails**, so a later trace starts from an agreed state.
pub fn trace(dst: &mut String) -> Result<()> {
    let guard = lock();
    let mut slot = guard.borrow_mut();
    let tracer = slot.as_mut().ok_or(TraceError::Uninitialized)?;

    let index = tracer.process.current_thread_index();
    let result = match tracer.process.thread_at(index) {
        Some(record) => render_thread(dst, &tracer.process, record),
        None => Err(TraceError::Logic("current thread record vanished".into())),
    };

    if let Some(record) = tracer.process.thread_at_mut(index) {
        record.unwind();
    }
    result
}

/// Append the stack trace of the thread with the given handle to `dst`. The
/// thread's shadow stack is left untouched.
pub fn trace_thread(dst: &mut String, id: u64) -> Result<()> {
    with_tracer(|t| {
        let record = t
            .process
            .thread_by_id(id)
            .ok_or(TraceError::UnknownThread(id))?;
        render_thread(dst, &t.process, record)
    })
}

/// Append the stack trace of the thread registered under `name` to `dst`.
pub fn trace_thread_named(dst: &mut String, name: &str) -> Result<()> {
    with_tracer(|t| {
        let record = t
            .process
            .thread_by_name(name)
            .ok_or(TraceError::Argument("no thread registered under that name"))?;
        render_thread(dst, &t.process, record)
    })
}

/// Append the stack traces of every registered thread to `dst`, separated by
/// blank lines. No shadow stack is unwound.
pub fn dump(dst: &mut String) -> Result<()> {
    with_tracer(|t| {
        let count = t.process.thread_count();
        for index in 0..count {
            let record = t
                .process
                .thread_at(index)
                .ok_or_else(|| TraceError::Logic("thread list changed mid-dump".into()))?;
            render_thread(dst, &t.process, record)?;
            if index + 1 < count {
                dst.push_str("\r\n");
            }
        }
        Ok(())
    })
}

/// Render one thread's trace:
///
/// ```text
/// at <name> thread (0x<handle>) {
///   at <symbol> (<file:line>)
///   ...
/// }
/// ```
///
/// Frames run from the oldest call to the most recent. A frame is annotated
/// with source information when its caller's module is known and the external
/// resolver has debug data for the call site.
fn render_thread(dst: &mut String, process: &Process, record: &ThreadRecord) -> Result<()> {
    let name = record.name().unwrap_or("anonymous");
    write!(dst, "at {} thread (0x{:x}) {{\r\n", name, record.handle())
        .map_err(|_| TraceError::Logic("trace formatting failed".into()))?;

    let depth = record.depth();
    for i in (0..depth).rev() {
        let Some(current) = record.frame(i) else {
            continue;
        };
        dst.push_str("  at ");
        dst.push_str(&current.name);

        // The call site address belongs to the caller's module; subtract
        // that module's load base to get the file-relative offset the
        // resolver expects.
        if let Some(caller) = record.frame(i + 1) {
            if let Some((path, base)) = process.inverse_lookup(caller.addr) {
                if let Some(line) = resolver::source_line(path, current.site.wrapping_sub(base)) {
                    dst.push_str(" (");
                    dst.push_str(&line);
                    dst.push(')');
                }
            }
        }
        dst.push_str("\r\n");
    }

    dst.push_str("}\r\n");
    Ok(())
}
