//! Demangling helpers for C++ and Rust symbols

/// Demangle a decorated symbol name. Returns None if demangling fails or the
/// name is not mangled at all.
///
/// The host C++ ABI is tried first: the entry/exit instrumentation convention
/// this library serves is a C/C++ compiler feature, so Itanium-mangled names
/// dominate. Rust manglings are handled as a fallback so mixed-language
/// processes still read well.
pub fn demangle(s: &str) -> Option<String> {
    if is_rust_mangled(s) {
        return demangle_rust(s);
    }
    if is_itanium_cpp_mangled(s) {
        if let Some(d) = demangle_cpp(s) {
            return Some(d);
        }
        // Legacy Rust symbols also start with "_ZN"
        return demangle_rust(s);
    }
    None
}

/// Demangle a symbol, falling back to the decorated name when demangling
/// fails or does not apply.
pub fn demangle_or_keep(s: &str) -> String {
    demangle(s).unwrap_or_else(|| s.to_string())
}

/// Heuristic: Rust v0 mangling starts with "_R"; legacy Rust mangling is an
/// Itanium name carrying a trailing hash segment.
fn is_rust_mangled(s: &str) -> bool {
    s.starts_with("_R") || looks_like_legacy_rust(s)
}

fn looks_like_legacy_rust(s: &str) -> bool {
    s.starts_with("_ZN") && s.contains("17h") && s.ends_with('E')
}

/// Heuristic: Itanium C++ mangling starts with "_Z".
fn is_itanium_cpp_mangled(s: &str) -> bool {
    s.starts_with("_Z")
}

fn demangle_rust(s: &str) -> Option<String> {
    match rustc_demangle::try_demangle(s) {
        Ok(sym) => Some(sym.to_string()),
        Err(_) => None,
    }
}

fn demangle_cpp(s: &str) -> Option<String> {
    match cpp_demangle::Symbol::new(s) {
        Ok(sym) => Some(sym.to_string()),
        Err(_) => None,
    }
}
