use crate::stack::{CallRecord, ShadowStack};
use std::cell::Cell;

thread_local! {
    static MANUAL_UNWIND: Cell<u32> = const { Cell::new(0) };
}

/// Mark the start of an unwind the runtime cannot observe (e.g. a foreign
/// exception crossing instrumented frames). While the bracket is open, calls
/// delivered to the hooks adjust the lag counter instead of the shadow stack,
/// exactly as during a Rust panic.
pub fn begin_unwind() {
    MANUAL_UNWIND.with(|depth| depth.set(depth.get() + 1));
}

/// Close a [`begin_unwind`] bracket. Unbalanced calls are ignored.
pub fn end_unwind() {
    MANUAL_UNWIND.with(|depth| depth.set(depth.get().saturating_sub(1)));
}

/// True while the current thread is unwinding: either a panic is propagating
/// or an explicit unwind bracket is open.
pub(crate) fn unwinding() -> bool {
    std::thread::panicking() || MANUAL_UNWIND.with(|depth| depth.get() > 0)
}

/// OS identity of the calling thread, as the renderer and log headers print
/// it.
pub fn current_thread_id() -> u64 {
    unsafe { libc::pthread_self() as u64 }
}

/// Per-thread tracing state: identity, the shadow call stack, and the lag
/// counter that tracks divergence from the real stack while an unwind is in
/// flight.
///
/// A record is created the first time a thread executes an instrumented
/// function and lives until [`cleanup`](crate::cleanup_thread) or library
/// teardown.
#[derive(Debug)]
pub struct ThreadRecord {
    name: Option<String>,
    handle: u64,
    stack: ShadowStack,
    lag: i32,
}

impl ThreadRecord {
    /// Create a record for the calling thread.
    pub fn new() -> Self {
        Self {
            name: None,
            handle: current_thread_id(),
            stack: ShadowStack::new(),
            lag: 0,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn is_current(&self) -> bool {
        self.handle == current_thread_id()
    }

    /// Frames the shadow stack is ahead of the real stack by, during
    /// unwinding. Zero outside of unwinding.
    pub fn lag(&self) -> i32 {
        self.lag
    }

    /// Depth of the shadow stack.
    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    /// Call record at stack offset `i` (0 = most recent call).
    pub fn frame(&self, i: usize) -> Option<&CallRecord> {
        self.stack.peek(i)
    }

    /// Iterate the simulated stack from the most recent call down.
    pub fn frames(&self) -> impl Iterator<Item = &CallRecord> {
        self.stack.iter()
    }

    /// Record a function call.
    ///
    /// While an unwind is in flight the compiler still delivers entry events
    /// for destructor frames; those are not new stack growth relative to the
    /// snapshot we keep, so the lag counter absorbs them instead.
    pub fn called(&mut self, addr: u64, site: u64, name: String) {
        if unwinding() {
            self.lag -= 1;
            return;
        }
        self.stack.push(CallRecord::new(addr, site, name));
    }

    /// Record a function return.
    ///
    /// Exit events fire for every frame an unwind tears down; the shadow
    /// stack keeps those frames (they are the exception trace) and the lag
    /// counter records the deficit.
    pub fn returned(&mut self) {
        if unwinding() {
            self.lag += 1;
        } else {
            self.stack.pop();
        }
    }

    /// Pop frames until the shadow stack agrees with the real stack again.
    /// Call this once the unwind has been handled (the current-thread trace
    /// path does it automatically).
    pub fn unwind(&mut self) {
        while self.lag > 0 {
            self.stack.pop();
            self.lag -= 1;
        }
    }
}

impl Default for ThreadRecord {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_call_return() {
        let mut rec = ThreadRecord::new();
        rec.called(0x10, 0x100, "f".into());
        rec.called(0x20, 0x200, "g".into());
        assert_eq!(rec.depth(), 2);
        assert_eq!(rec.lag(), 0);

        rec.returned();
        rec.returned();
        assert_eq!(rec.depth(), 0);
        assert_eq!(rec.lag(), 0);
    }

    #[test]
    fn test_manual_unwind_bracket() {
        let mut rec = ThreadRecord::new();
        rec.called(0x10, 0x100, "f".into());
        rec.called(0x20, 0x200, "g".into());

        begin_unwind();
        // both frames exit while the unwind is in flight
        rec.returned();
        rec.returned();
        // a destructor frame enters and exits
        rec.called(0x30, 0x300, "drop".into());
        rec.returned();
        end_unwind();

        assert_eq!(rec.depth(), 2, "unwound frames stay for the trace");
        assert_eq!(rec.lag(), 2);

        rec.unwind();
        assert_eq!(rec.depth(), 0);
        assert_eq!(rec.lag(), 0);
    }

    #[test]
    fn test_unbalanced_end_unwind_is_ignored() {
        end_unwind();
        let mut rec = ThreadRecord::new();
        rec.called(0x10, 0x100, "f".into());
        assert_eq!(rec.depth(), 1);
        rec.returned();
        assert_eq!(rec.depth(), 0);
    }

    #[test]
    fn test_current_thread_identity() {
        let rec = ThreadRecord::new();
        assert!(rec.is_current());
        assert_eq!(rec.handle(), current_thread_id());
    }
}
