//! Shadow stack behavior across call/return/unwind sequences.

use shadowtrace::{begin_unwind, end_unwind, ThreadRecord};
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};

#[test]
fn balanced_calls_leave_no_residue() {
    let mut rec = ThreadRecord::new();
    let before = rec.depth();

    rec.called(0x1000, 0x2000, "f".into());
    rec.called(0x1100, 0x1008, "g".into());
    rec.returned();
    rec.returned();

    assert_eq!(rec.depth(), before);
    assert_eq!(rec.lag(), 0);
}

#[test]
fn trace_inside_a_call_sees_both_frames() {
    // enter(f), enter(g): a trace taken inside g must see f below g
    let mut rec = ThreadRecord::new();
    rec.called(0x1000, 0x2000, "f".into());
    rec.called(0x1100, 0x1008, "g".into());

    assert_eq!(rec.depth(), 2);
    assert_eq!(rec.frame(0).unwrap().name, "g");
    assert_eq!(rec.frame(1).unwrap().name, "f");

    // after exit(g) only f remains
    rec.returned();
    assert_eq!(rec.depth(), 1);
    assert_eq!(rec.frame(0).unwrap().name, "f");
}

#[test]
fn unwound_frames_stay_until_reconciled() {
    // enter(f), enter(g), throw inside g: the exits driven by the unwind
    // leave both frames in place for the exception trace, and lag counts
    // the deficit.
    let mut rec = ThreadRecord::new();
    rec.called(0x1000, 0x2000, "f".into());
    rec.called(0x1100, 0x1008, "g".into());

    begin_unwind();
    rec.returned(); // exit(g)
    rec.returned(); // exit(f)
    end_unwind();

    assert_eq!(rec.lag(), 2);
    assert_eq!(rec.depth(), 2);
    assert_eq!(rec.frame(0).unwrap().name, "g");
    assert_eq!(rec.frame(1).unwrap().name, "f");

    rec.unwind();
    assert_eq!(rec.lag(), 0);
    assert_eq!(rec.depth(), 0);
}

#[test]
fn destructor_calls_during_unwind_balance_out() {
    let mut rec = ThreadRecord::new();
    rec.called(0x1000, 0x2000, "f".into());

    begin_unwind();
    // a local's drop glue is entered and exited while unwinding
    rec.called(0x3000, 0x1010, "cleanup".into());
    rec.returned();
    // then f itself exits
    rec.returned();
    end_unwind();

    assert_eq!(rec.lag(), 1);
    assert_eq!(rec.depth(), 1);

    rec.unwind();
    assert_eq!(rec.lag(), 0);
    assert_eq!(rec.depth(), 0);
}

#[test]
fn panic_driven_exits_are_detected_without_brackets() {
    // Drop impls run while a panic propagates; exits delivered from them
    // must adjust lag, not pop the stack.
    let rec = RefCell::new(ThreadRecord::new());
    rec.borrow_mut().called(0x1000, 0x2000, "f".into());
    rec.borrow_mut().called(0x1100, 0x1008, "g".into());

    struct ExitOnDrop<'a>(&'a RefCell<ThreadRecord>);
    impl Drop for ExitOnDrop<'_> {
        fn drop(&mut self) {
            self.0.borrow_mut().returned();
        }
    }

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let _f = ExitOnDrop(&rec);
        let _g = ExitOnDrop(&rec);
        panic!("unwind through instrumented frames");
    }));
    assert!(outcome.is_err());

    let mut rec = rec.into_inner();
    assert_eq!(rec.lag(), 2);
    assert_eq!(rec.depth(), 2, "frames survive for the exception trace");

    rec.unwind();
    assert_eq!(rec.lag(), 0);
    assert_eq!(rec.depth(), 0);
}

#[test]
fn unwind_is_idempotent() {
    let mut rec = ThreadRecord::new();
    rec.called(0x1000, 0x2000, "f".into());

    rec.unwind();
    rec.unwind();
    assert_eq!(rec.depth(), 1, "no lag, nothing to reconcile");
    assert_eq!(rec.lag(), 0);
}
