//! In-process shadow call stack tracing.
//!
//! `shadowtrace` serves programs compiled with per-function entry/exit
//! instrumentation (`-finstrument-functions` under GCC and Clang). The
//! injected hook calls maintain a shadow copy of every thread's call stack,
//! addresses are resolved against the symbol tables of the executable and a
//! selectable set of shared objects, and exception or thread stack traces
//! can be rendered at any point — no debugger attached.
//!
//! ```no_run
//! fn main() {
//!     shadowtrace::init().expect("tracer init");
//!     shadowtrace::name_current_thread("main").unwrap();
//!
//!     // ... instrumented code runs, hooks fire ...
//!
//!     let mut out = String::new();
//!     shadowtrace::trace(&mut out).unwrap();
//!     eprint!("{out}");
//! }
//! ```
//!
//! While a panic (or an unwind bracketed with [`begin_unwind`] /
//! [`end_unwind`]) propagates, the hooks keep the torn-down frames on the
//! shadow stack so a trace taken at the catch site shows the full exception
//! backtrace; rendering it — or calling [`unwind`] — reconciles the shadow
//! stack with the real one.
//!
//! DSO participation is selected with the `SHADOWTRACE_LIBS` environment
//! variable, a colon-separated list of regular expressions matched against
//! each shared object's path. Unset loads every DSO; set-but-empty loads
//! none.

pub mod config;
mod error;
mod filter;
mod hooks;
mod lifecycle;
mod logging;
mod namespace;
mod plugin;
mod resolver;
pub mod stack;
pub mod thread;
mod tracer;

pub use error::{Result, TraceError};
pub use filter::{Filter, FilterScope};
pub use hooks::{__cyg_profile_func_enter, __cyg_profile_func_exit};
pub use lifecycle::{init, init_with_args};
pub use plugin::Plugin;
pub use stack::{CallRecord, ShadowStack};
pub use thread::{begin_unwind, current_thread_id, end_unwind, ThreadRecord};
pub use tracer::{
    add_filter, add_module, add_module_table, add_plugin, cleanup_current_thread, cleanup_thread,
    clear_current_thread_name, dump, filter_count, is_initialized, module_count,
    name_current_thread, plugin_count, remove_filter, remove_plugin, remove_plugin_at, shutdown,
    symbol_count, thread_count, thread_ids, trace, trace_thread, trace_thread_named, unwind,
};

pub use shadowtrace_symbols::{ModuleSymbols, Symbol};
