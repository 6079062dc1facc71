//! Walks the instrumentation contract by hand: simulates the hook calls an
//! instrumented program would make, including an unwind, and prints the
//! resulting exception trace.
//!
//! A real deployment compiles the target program with
//! `-finstrument-functions`; the compiler then emits these hook calls
//! automatically.

use anyhow::Result;
use shadowtrace::{ModuleSymbols, Symbol, __cyg_profile_func_enter, __cyg_profile_func_exit};
use std::os::raw::c_void;

const BASE: u64 = 0x7731_0000_0000;
const PARSE: u64 = BASE + 0x1010;
const VALIDATE: u64 = BASE + 0x1080;

fn enter(addr: u64, site: u64) {
    __cyg_profile_func_enter(addr as *mut c_void, site as *mut c_void);
}

fn exit(addr: u64, site: u64) {
    __cyg_profile_func_exit(addr as *mut c_void, site as *mut c_void);
}

fn main() -> Result<()> {
    // Keep the demo self-contained: skip DSO symbol loading
    std::env::set_var(shadowtrace::config::LIBS_ENV, "");
    shadowtrace::init()?;
    shadowtrace::name_current_thread("demo")?;

    // Stand-in for a loaded module of the instrumented program
    shadowtrace::add_module_table(ModuleSymbols::with_symbols(
        "/opt/demo/bin/parser",
        BASE,
        vec![
            Symbol::new(PARSE, "parser::parse(std::string const&)"),
            Symbol::new(VALIDATE, "parser::validate(ast::Node const&)"),
        ],
    ))?;

    // parse() calls validate(), which throws; the unwinder drives both
    // exits while the exception propagates
    enter(PARSE, 0x40_1234);
    enter(VALIDATE, PARSE + 0x2f);

    shadowtrace::begin_unwind();
    exit(VALIDATE, PARSE + 0x2f);
    exit(PARSE, 0x40_1234);
    shadowtrace::end_unwind();

    // The trace at the catch site lists both torn-down frames, then
    // reconciles the shadow stack
    let mut out = String::new();
    shadowtrace::trace(&mut out)?;
    print!("{out}");

    shadowtrace::shutdown();
    Ok(())
}
