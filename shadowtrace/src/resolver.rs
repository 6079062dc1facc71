//! Source line resolution through the external `addr2line` tool.

use std::process::Command;
use tracing::debug;

/// What `addr2line -s` prints when the address has no debug information.
const NO_DEBUG_INFO: &str = "??:0";

/// Resolve a file-relative offset in an object file to a `file:line`
/// annotation.
///
/// Returns `None` when the tool cannot be spawned, produces no output, or
/// reports that no debug information exists. Failures are never fatal; the
/// frame is simply rendered without an annotation.
pub(crate) fn source_line(path: &str, offset: u64) -> Option<String> {
    let output = match Command::new("addr2line")
        .arg("-se")
        .arg(path)
        .arg(format!("{offset:#x}"))
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            debug!("Failed to run addr2line for '{}': {}", path, e);
            return None;
        }
    };

    if !output.status.success() {
        debug!("addr2line exited with {} for '{}'", output.status, path);
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout.lines().next().unwrap_or("").trim_end();
    if accept_line(line) {
        Some(line.to_string())
    } else {
        None
    }
}

/// Whether a line of resolver output is a usable annotation.
fn accept_line(line: &str) -> bool {
    !line.is_empty() && line != NO_DEBUG_INFO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_debug_info_is_suppressed() {
        assert!(!accept_line("??:0"));
        assert!(!accept_line(""));
        assert!(accept_line("server.cpp:42"));
        assert!(accept_line("??:1"));
    }

    #[test]
    fn test_unreadable_module_resolves_to_nothing() {
        assert_eq!(source_line("/nonexistent/libfoo.so", 0x1000), None);
    }
}
