//! The compiler instrumentation entry points.
//!
//! Code built with `-finstrument-functions` (or an equivalent) calls
//! [`__cyg_profile_func_enter`] at the start of every instrumented function
//! and [`__cyg_profile_func_exit`] at its end, including the exits the
//! unwinder drives while an exception propagates. These two functions are
//! the only writers of the shadow stacks.

use crate::error::Result;
use crate::filter::FilterScope;
use crate::plugin::Plugin;
use crate::tracer::{self, TracerSlot};
use std::os::raw::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Enter,
    Exit,
}

/// Called on every instrumented function entry.
///
/// `this_fn` is the address of the called function, `call_site` the address
/// the call was made from. Must never unwind into its caller; unexpected
/// failures terminate the process.
#[no_mangle]
pub extern "C" fn __cyg_profile_func_enter(this_fn: *mut c_void, call_site: *mut c_void) {
    hook(this_fn as u64, call_site as u64, Direction::Enter);
}

/// Called on every instrumented function exit, including exits driven by
/// stack unwinding.
#[no_mangle]
pub extern "C" fn __cyg_profile_func_exit(this_fn: *mut c_void, call_site: *mut c_void) {
    hook(this_fn as u64, call_site as u64, Direction::Exit);
}

fn hook(this_fn: u64, call_site: u64, direction: Direction) {
    let guard = tracer::lock();

    // Snapshot the plugin registry so no state borrow is held while foreign
    // callbacks run. An uninitialized or still-empty tracer disables the
    // hooks entirely.
    let plugins: Vec<Plugin> = {
        let slot = guard.borrow();
        match slot.as_ref() {
            Some(tracer) if tracer.enabled() => tracer.plugins.clone(),
            _ => return,
        }
    };

    match direction {
        Direction::Enter => {
            for (index, plugin) in plugins.iter().enumerate() {
                dispatch(plugin, index, this_fn, call_site, direction);
            }
        }
        Direction::Exit => {
            for (index, plugin) in plugins.iter().enumerate().rev() {
                dispatch(plugin, index, this_fn, call_site, direction);
            }
        }
    }

    // Resolution and shadow stack update. The hook runs inside
    // compiler-generated call frames; an unwind escaping here is unsound, so
    // anything unexpected is fatal.
    match catch_unwind(AssertUnwindSafe(|| {
        update_stack(&guard, this_fn, call_site, direction)
    })) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("Instrumentation hook failed: {}", e);
            std::process::exit(1);
        }
        Err(_) => {
            error!("Instrumentation hook panicked");
            std::process::exit(1);
        }
    }
}

/// Run one plugin callback, isolating and logging any panic. Plugin failure
/// never aborts the hook.
fn dispatch(plugin: &Plugin, index: usize, this_fn: u64, call_site: u64, direction: Direction) {
    let result = catch_unwind(AssertUnwindSafe(|| match direction {
        Direction::Enter => plugin.enter(this_fn, call_site),
        Direction::Exit => plugin.exit(this_fn, call_site),
    }));

    if result.is_err() {
        match plugin.name() {
            Some(name) => error!("Plugin '{}' callback panicked", name),
            None => error!("Plugin {} callback panicked", index),
        }
    }
}

fn update_stack(
    slot: &TracerSlot,
    this_fn: u64,
    call_site: u64,
    direction: Direction,
) -> Result<()> {
    let mut slot = slot.borrow_mut();
    let tracer = match slot.as_mut() {
        Some(tracer) if tracer.enabled() => tracer,
        // A plugin callback tore the tracer down; nothing left to update
        _ => return Ok(()),
    };

    // Module filters, applied to the owning module's path
    if let Some((path, _base)) = tracer.process.inverse_lookup(this_fn) {
        let excluded = tracer
            .filters
            .iter()
            .filter(|f| f.scope() == FilterScope::Module)
            .any(|f| f.apply(path));
        if excluded {
            return Ok(());
        }
    }

    // Unresolved addresses never reach the shadow stack
    let name = match tracer.process.lookup(this_fn) {
        Some(name) => name,
        None => return Ok(()),
    };

    // Symbol filters, applied to the resolved name
    let excluded = tracer
        .filters
        .iter()
        .filter(|f| f.scope() == FilterScope::Symbol)
        .any(|f| f.apply(&name));
    if excluded {
        return Ok(());
    }

    let record = tracer.process.current_thread();
    match direction {
        Direction::Enter => record.called(this_fn, call_site, name),
        Direction::Exit => record.returned(),
    }
    Ok(())
}
