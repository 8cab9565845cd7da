//! Quantified laws from SPEC_FULL.md §8, checked over `i64`, `String`, and
//! `Vec<i64>` — the supported-type instances cheap enough to generate with
//! `quickcheck` without a bespoke `Arbitrary` impl for a registered product
//! type.
use quickcheck_macros::quickcheck;

use valuepatch::{apply, diff, equal, unapply, Patchable};

fn round_trips<T: Patchable + Clone + PartialEq + 'static>(a: T, b: T) -> bool {
    let patch = diff(&a, &b);
    let mut target: Box<dyn Patchable> = Box::new(a.clone());
    if apply(&mut target, &patch).is_err() {
        return false;
    }
    equal(target.as_ref(), &b)
}

fn reverses<T: Patchable + Clone + PartialEq + 'static>(a: T, b: T) -> bool {
    let patch = diff(&a, &b);
    let mut target: Box<dyn Patchable> = Box::new(a.clone());
    if apply(&mut target, &patch).is_err() {
        return false;
    }
    if unapply(&mut target, &patch).is_err() {
        return false;
    }
    equal(target.as_ref(), &a)
}

#[quickcheck]
fn round_trip_scalar_int(a: i64, b: i64) -> bool {
    round_trips(a, b)
}

#[quickcheck]
fn round_trip_string(a: String, b: String) -> bool {
    round_trips(a, b)
}

#[quickcheck]
fn round_trip_vec_int(a: Vec<i64>, b: Vec<i64>) -> bool {
    round_trips(a, b)
}

#[quickcheck]
fn reverse_scalar_int(a: i64, b: i64) -> bool {
    reverses(a, b)
}

#[quickcheck]
fn reverse_vec_int(a: Vec<i64>, b: Vec<i64>) -> bool {
    reverses(a, b)
}

#[quickcheck]
fn identity_diff_is_a_noop(a: i64) -> bool {
    diff(&a, &a).is_noop()
}

#[quickcheck]
fn identity_diff_vec_is_a_noop(a: Vec<i64>) -> bool {
    diff(&a, &a).is_noop()
}

#[quickcheck]
fn equal_is_reflexive_on_clone(a: Vec<i64>) -> bool {
    let cloned = a.clone();
    equal(&a, &cloned)
}

#[quickcheck]
fn equal_commutes(a: i64, b: i64) -> bool {
    equal(&a, &b) == equal(&b, &a)
}

#[test]
fn empty_patch_is_a_noop_on_apply() {
    let a = 5i64;
    let patch = diff(&a, &a);
    assert!(patch.is_noop());
    let mut target: Box<dyn Patchable> = Box::new(a);
    apply(&mut target, &patch).unwrap();
    assert!(equal(target.as_ref(), &5i64));
}

#[test]
fn cycle_safe_equality_on_a_self_referential_value() {
    // A pinned node whose pointer field is wired to point back at itself
    // after construction: `equal` must terminate via the visited-pair guard
    // in `equal.rs` instead of recursing forever.
    use std::pin::Pin;
    use valuepatch::{Kind, Patchable};

    struct SelfRef {
        payload: i64,
        me: Option<*const SelfRef>,
    }

    impl Patchable for SelfRef {
        fn kind(&self) -> Kind {
            Kind::Pointer
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
        fn dyn_clone(&self) -> Box<dyn Patchable> {
            Box::new(SelfRef {
                payload: self.payload,
                me: None,
            })
        }
        fn pointer_target(&self) -> Option<Option<&dyn Patchable>> {
            Some(self.me.map(|p| unsafe { &*p } as &dyn Patchable))
        }
    }

    let mut boxed = Box::pin(SelfRef { payload: 1, me: None });
    let self_ptr: *const SelfRef = boxed.as_ref().get_ref();
    // Safe: `boxed` is pinned, so this address is stable for its lifetime,
    // and the borrow below never outlives `boxed`.
    unsafe {
        Pin::get_unchecked_mut(boxed.as_mut()).me = Some(self_ptr);
    }
    let node: Pin<Box<SelfRef>> = boxed;
    assert!(equal(node.as_ref().get_ref(), node.as_ref().get_ref()));
}
