//! Runtime configuration: the DSO selection environment variable and the
//! command-line passthrough.

use parking_lot::Mutex;

/// Colon-separated list of regular expressions selecting which DSOs
/// participate in call stack simulation. Unset: all linked DSOs are loaded.
/// Set but empty: none are.
pub const LIBS_ENV: &str = "SHADOWTRACE_LIBS";

/// Prefix of command-line arguments consumed by [`init_args`].
pub const ARG_PREFIX: &str = "--shadowtrace-";

static CONFIG: Mutex<Vec<String>> = Mutex::new(Vec::new());

/// Split a colon-separated environment variable into its tokens.
///
/// Returns `None` when the variable is unset. Empty tokens are dropped, so a
/// set-but-empty variable yields `Some(vec![])`.
pub fn split_env_list(var: &str) -> Option<Vec<String>> {
    let value = std::env::var_os(var)?;
    let value = value.to_string_lossy();
    Some(
        value
            .split(':')
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// Seek command-line arguments that belong to the tracer (prefixed with
/// `--shadowtrace-`), move them from the argument vector to the process-wide
/// configuration list and shift the vector to close the gaps.
pub fn init_args(args: &mut Vec<String>) {
    let mut config = CONFIG.lock();
    args.retain(|arg| match arg.strip_prefix(ARG_PREFIX) {
        Some(rest) => {
            // A bare prefix carries no payload but is still consumed
            if !rest.is_empty() {
                config.push(rest.to_string());
            }
            false
        }
        None => true,
    });
}

/// Number of consumed tracer arguments.
pub fn arg_count() -> usize {
    CONFIG.lock().len()
}

/// A consumed tracer argument (with the prefix stripped), by consumption
/// order.
pub fn arg(i: usize) -> Option<String> {
    CONFIG.lock().get(i).cloned()
}
