//! Integration Tests for the Reactive Engine
//!
//! These tests drive cells, memos, lazy computations and watchers through
//! the public API only.

use std::cell::{Cell, OnceCell, RefCell};
use std::rc::Rc;

use cascade_core::reactive::{batch, signal, Lazy, Memo, MemoOptions, Reactive, Runtime, Suspend};
use cascade_core::{DepsShape, ReactiveError};

fn counter() -> (Rc<Cell<u32>>, Rc<Cell<u32>>) {
    let count = Rc::new(Cell::new(0));
    (count.clone(), count)
}

fn bump(count: &Cell<u32>) {
    count.set(count.get() + 1);
}

/// Write a cell, see the watcher once; write the same value, see nothing.
#[test]
fn watcher_sees_each_change_once() {
    let (a, set_a) = signal(1);
    let b = Memo::new(move |_| a.get() * 2);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = seen.clone();
    let _effect = b.watch(move |&v| seen_clone.borrow_mut().push(v)).unwrap();

    set_a.set(5).unwrap();
    assert_eq!(*seen.borrow(), vec![10]);

    set_a.set(5).unwrap();
    assert_eq!(*seen.borrow(), vec![10]);
}

/// The join of a diamond runs once per write and never sees a mix of old
/// and new values.
#[test]
fn diamond_is_glitch_free() {
    let (a, set_a) = signal(1);
    let a1 = a.clone();
    let left = Memo::new(move |_| a1.get() + 1);
    let right = Memo::new(move |_| a.get() * 2);

    let (runs, runs_clone) = counter();
    let mixed = Rc::new(Cell::new(false));
    let mixed_clone = mixed.clone();
    let join = Memo::new(move |_| {
        bump(&runs_clone);
        let (l, r) = (left.get(), right.get());
        if (l - 1) * 2 != r {
            mixed_clone.set(true);
        }
        l + r
    });

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = seen.clone();
    let _effect = join.watch(move |&v| seen_clone.borrow_mut().push(v)).unwrap();
    assert_eq!(runs.get(), 1);

    set_a.set(2).unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(*seen.borrow(), vec![7]);

    set_a.set(10).unwrap();
    assert_eq!(runs.get(), 3);
    assert_eq!(*seen.borrow(), vec![7, 31]);
    assert!(!mixed.get());
}

/// A computation whose value did not change stops propagation below it.
#[test]
fn equal_result_short_circuits() {
    let (a, set_a) = signal(1);
    let parity = Memo::new(move |_| a.get() % 2);

    let (runs, runs_clone) = counter();
    let label = Memo::new(move |_| {
        bump(&runs_clone);
        if parity.get() == 0 {
            "even"
        } else {
            "odd"
        }
    });

    let (calls, calls_clone) = counter();
    let _effect = label.watch(move |_| bump(&calls_clone)).unwrap();

    set_a.set(3).unwrap();
    assert_eq!(runs.get(), 1);
    assert_eq!(calls.get(), 0);

    set_a.set(4).unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(calls.get(), 1);
    assert_eq!(label.get(), "even");
}

/// A memo that reads its own value settles on a fixed point, both when
/// first computed and after a dependency changes.
#[test]
fn self_referential_memo_converges() {
    let (target, set_target) = signal(5);
    let this: Rc<OnceCell<Memo<i32>>> = Rc::new(OnceCell::new());
    let this_clone = this.clone();
    let step = Memo::with_options(
        move |_| {
            let current = this_clone.get().map_or(0, |memo| memo.get());
            (current + 1).min(target.get())
        },
        MemoOptions {
            fixed_deps: false,
            initial: Some(0),
        },
    );
    let _ = this.set(step.clone());

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = seen.clone();
    let _effect = step.watch(move |&v| seen_clone.borrow_mut().push(v)).unwrap();
    assert_eq!(step.get(), 5);

    set_target.set(8).unwrap();
    assert_eq!(step.get(), 8);
    // Held back until the cycle settled.
    assert_eq!(*seen.borrow(), vec![8]);
}

/// Two memos reading each other settle together, and a watcher downstream
/// of the cycle runs once with the settled value.
#[test]
fn mutual_cycle_settles_and_notifies_once() {
    let (x, set_x) = signal(0);
    let b_slot: Rc<OnceCell<Memo<i32>>> = Rc::new(OnceCell::new());
    let b_read = b_slot.clone();
    let a = Memo::with_options(
        move |_| {
            let b = b_read.get().map_or(0, |b| b.get());
            (b + 1).min(x.get())
        },
        MemoOptions {
            fixed_deps: false,
            initial: Some(0),
        },
    );
    let a_read = a.clone();
    let b = Memo::with_options(
        move |_| a_read.get(),
        MemoOptions {
            fixed_deps: false,
            initial: Some(0),
        },
    );
    let _ = b_slot.set(b.clone());

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = seen.clone();
    let _effect = b.watch(move |&v| seen_clone.borrow_mut().push(v)).unwrap();
    assert_eq!((a.get(), b.get()), (0, 0));

    set_x.set(5).unwrap();
    assert_eq!((a.get(), b.get()), (5, 5));
    assert_eq!(*seen.borrow(), vec![5]);

    set_x.set(3).unwrap();
    assert_eq!((a.get(), b.get()), (3, 3));
    assert_eq!(*seen.borrow(), vec![5, 3]);
}

/// A computation that starts reading a memo during a pass, before that memo
/// was brought up to date, runs again once the memo changes.
#[test]
fn dependency_linked_mid_pass_is_followed() {
    let (a, set_a) = signal(1);
    let (cond, set_cond) = signal(false);
    let m = Memo::new(move |_| a.get() * 2);
    let m_read = m.clone();
    let e = Memo::new(move |_| if cond.get() { m_read.get() } else { 0 });

    let _m_effect = m.watch(|_| {}).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = seen.clone();
    let _e_effect = e.watch(move |&v| seen_clone.borrow_mut().push(v)).unwrap();

    batch(|| {
        set_a.set(5).unwrap();
        set_cond.set(true).unwrap();
    });
    assert_eq!(m.get(), 10);
    assert_eq!(e.get(), m.get());
    assert_eq!(*seen.borrow(), vec![10]);

    set_a.set(6).unwrap();
    assert_eq!(e.get(), 12);
    assert_eq!(*seen.borrow(), vec![10, 12]);
}

/// Re-running a speculative memo over the same reads links no new edges.
#[test]
fn stable_dependencies_are_not_rebuilt() {
    let (a, set_a) = signal(1);
    let (b, _set_b) = signal(2);
    let sum = Memo::new(move |_| a.get() + b.get());
    let _effect = sum.watch(|_| {}).unwrap();

    let before = Runtime::stats();
    for value in 2..10 {
        set_a.set(value).unwrap();
    }
    let after = Runtime::stats();

    assert_eq!(sum.get(), 11);
    assert_eq!(sum.shape(), DepsShape::Speculative);
    assert_eq!(after.edges_linked, before.edges_linked);
    assert_eq!(after.edges_unlinked, before.edges_unlinked);
    assert_eq!(after.passes, before.passes + 8);
}

/// Taking another branch swaps the dependency and demotes the memo.
#[test]
fn branch_switch_rewires_dependencies() {
    let (cond, set_cond) = signal(true);
    let (x, set_x) = signal(1);
    let (y, set_y) = signal(100);
    let (x_id, y_id, cond_id) = (x.id(), y.id(), cond.id());

    let (runs, runs_clone) = counter();
    let pick = Memo::new(move |_| {
        bump(&runs_clone);
        if cond.get() {
            x.get()
        } else {
            y.get()
        }
    });
    let _effect = pick.watch(|_| {}).unwrap();
    assert_eq!(pick.dependencies(), vec![cond_id, x_id]);

    set_cond.set(false).unwrap();
    assert_eq!(pick.get(), 100);
    assert_eq!(pick.dependencies(), vec![cond_id, y_id]);
    assert_eq!(pick.shape(), DepsShape::Unstable);

    // The abandoned branch no longer triggers a run.
    let runs_before = runs.get();
    set_x.set(2).unwrap();
    assert_eq!(runs.get(), runs_before);

    set_y.set(200).unwrap();
    assert_eq!(pick.get(), 200);
    assert_eq!(runs.get(), runs_before + 1);
}

/// Flipping the condition on every write keeps rewiring the dependencies,
/// and the branch not taken never triggers a run.
#[test]
fn alternating_branches_track_the_live_side() {
    let (cond, set_cond) = signal(true);
    let (x, set_x) = signal(1);
    let (y, set_y) = signal(-1);
    let (x_id, y_id, cond_id) = (x.id(), y.id(), cond.id());

    let (runs, runs_clone) = counter();
    let pick = Memo::new(move |_| {
        bump(&runs_clone);
        if cond.get() {
            x.get()
        } else {
            y.get()
        }
    });

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = seen.clone();
    let _effect = pick.watch(move |&v| seen_clone.borrow_mut().push(v)).unwrap();

    for round in 1..=6 {
        let left = round % 2 == 0;
        set_cond.set(left).unwrap();
        let (live, dead) = if left { (x_id, y_id) } else { (y_id, x_id) };
        assert_eq!(pick.dependencies(), vec![cond_id, live]);

        // The dead side is ignored, the live side is followed.
        let runs_before = runs.get();
        if left {
            set_y.set(-10 * round).unwrap();
            assert_eq!(runs.get(), runs_before);
            set_x.set(10 * round).unwrap();
            assert_eq!(pick.get(), 10 * round);
        } else {
            set_x.set(10 * round).unwrap();
            assert_eq!(runs.get(), runs_before);
            set_y.set(-10 * round).unwrap();
            assert_eq!(pick.get(), -10 * round);
        }
        assert_eq!(runs.get(), runs_before + 1);
        assert!(!pick.dependencies().contains(&dead));
    }

    // One run per flip and one per live write, one call each.
    assert_eq!(runs.get(), 1 + 6 * 2);
    assert_eq!(seen.borrow().len(), 6 * 2);
    assert_eq!(pick.shape(), DepsShape::Unstable);
}

/// A fixed memo keeps the edges of its first run even when it stops
/// reading one of them.
#[test]
fn fixed_memo_keeps_first_edges() {
    let (cond, set_cond) = signal(true);
    let (x, _set_x) = signal(1);
    let pick = Memo::with_options(
        move |_| if cond.get() { x.get() } else { 0 },
        MemoOptions {
            fixed_deps: true,
            initial: None,
        },
    );
    let _effect = pick.watch(|_| {}).unwrap();

    set_cond.set(false).unwrap();
    assert_eq!(pick.get(), 0);
    assert_eq!(pick.dependency_count(), 2);
    assert_eq!(pick.shape(), DepsShape::Fixed);
}

/// A lazy computation's watchers hear about changes, but only a pull runs
/// the expression.
#[test]
fn lazy_defers_until_pulled() {
    let (frame, set_frame) = signal(0);
    let lazy = Lazy::new();

    let (runs, runs_clone) = counter();
    let render = move |_: Option<&String>| {
        bump(&runs_clone);
        format!("frame {}", frame.get())
    };

    assert_eq!(lazy.pull(&render).unwrap(), "frame 0");

    let (due, due_clone) = counter();
    let _effect = lazy.watch(move || bump(&due_clone)).unwrap();

    set_frame.set(1).unwrap();
    set_frame.set(2).unwrap();
    assert_eq!(due.get(), 2);
    assert_eq!(runs.get(), 1);
    assert!(lazy.is_stale());

    assert_eq!(lazy.pull(&render).unwrap(), "frame 2");
    assert_eq!(lazy.pull(&render).unwrap(), "frame 2");
    assert_eq!(runs.get(), 2);
}

/// A suspended memo holds its fallback until its input is ready and runs
/// the cancel handle of the abandoned attempt exactly once.
#[test]
fn suspense_falls_back_and_cancels_once() {
    let (input, set_input) = signal(None::<i32>);
    let (cancels, cancels_clone) = counter();

    let loaded = Memo::suspended(
        move |_| match input.get() {
            Some(value) => Ok(value * 10),
            None => {
                let cancels = cancels_clone.clone();
                Err(Suspend::new().on_cancel(move || bump(&cancels)))
            }
        },
        -1,
    );

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = seen.clone();
    let _effect = loaded.watch(move |&v| seen_clone.borrow_mut().push(v)).unwrap();

    assert_eq!(loaded.get(), -1);
    assert!(loaded.is_suspending());
    assert_eq!(cancels.get(), 0);

    set_input.set(Some(4)).unwrap();
    assert_eq!(loaded.get(), 40);
    assert!(!loaded.is_suspending());
    assert_eq!(cancels.get(), 1);
    assert_eq!(*seen.borrow(), vec![40]);

    set_input.set(Some(5)).unwrap();
    assert_eq!(cancels.get(), 1);
}

/// Writes and watcher registration are refused inside an expression.
#[test]
fn protocol_violations_are_reported() {
    let (a, set_a) = signal(1);
    let a1 = a.clone();
    let writes = Memo::new(move |_| set_a.set(a1.get() + 1));
    assert_eq!(writes.get(), Err(ReactiveError::WriteDuringEvaluation));
    assert_eq!(a.get(), 1);

    let a2 = a.clone();
    let watches = Memo::new(move |_| a2.watch(|_| {}).map(|_| ()));
    assert_eq!(watches.get(), Err(ReactiveError::WatchDuringEvaluation));
}

/// All writes in a batch propagate together.
#[test]
fn batch_propagates_once() {
    let (a, set_a) = signal(1);
    let (b, set_b) = signal(1);
    let sum = Memo::new(move |_| a.get() + b.get());

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = seen.clone();
    let _effect = sum.watch(move |&v| seen_clone.borrow_mut().push(v)).unwrap();

    let passes = Runtime::stats().passes;
    batch(|| {
        set_a.set(2).unwrap();
        set_b.set(3).unwrap();
        assert!(Runtime::in_transaction());
    });

    assert_eq!(*seen.borrow(), vec![5]);
    assert_eq!(Runtime::stats().passes, passes + 1);
}

/// A watcher may write cells; the write propagates before the call returns.
#[test]
fn watcher_writes_fold_into_transaction() {
    let (a, set_a) = signal(1);
    let (b, set_b) = signal(10);

    let _forward = a.watch(move |&v| set_b.set(v * 10).unwrap()).unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = seen.clone();
    let _sink = b.watch(move |&v| seen_clone.borrow_mut().push(v)).unwrap();

    set_a.set(2).unwrap();
    assert_eq!(*seen.borrow(), vec![20]);
    assert!(!Runtime::in_transaction());
}

/// A watcher disposed by another watcher in the same round is not called.
#[test]
fn dispose_during_dispatch_skips_queued_watcher() {
    let (a, set_a) = signal(0);

    let (first_calls, first_clone) = counter();
    let first = Rc::new(RefCell::new(Some(
        a.watch(move |_| bump(&first_clone)).unwrap(),
    )));

    // Registered last, so called first.
    let target = first.clone();
    let _second = a
        .watch(move |_| {
            if let Some(effect) = target.borrow_mut().take() {
                effect.dispose();
            }
        })
        .unwrap();

    set_a.set(1).unwrap();
    assert_eq!(first_calls.get(), 0);

    set_a.set(2).unwrap();
    assert_eq!(first_calls.get(), 0);
}

/// Dropping the last watcher lets the next pass release the memo's edges.
#[test]
fn unwatched_memo_releases_dependencies() {
    let (a, set_a) = signal(1);
    let a1 = a.clone();
    let doubled = Memo::new(move |_| a1.get() * 2);

    let effect = doubled.watch(|_| {}).unwrap();
    assert_eq!(a.observer_count(), 1);
    drop(effect);

    set_a.set(3).unwrap();
    assert_eq!(a.observer_count(), 0);
    assert!(doubled.is_stale());

    // Reading again recomputes and re-links.
    assert_eq!(doubled.get(), 6);
    assert_eq!(a.observer_count(), 1);
}

/// Dropping every handle to a node removes it from the graph.
#[test]
fn dropped_nodes_leave_the_graph() {
    let (a, set_a) = signal(1);
    let nodes = Runtime::stats().nodes;
    {
        let a1 = a.clone();
        let doubled = Memo::new(move |_| a1.get() * 2);
        assert_eq!(doubled.get(), 2);
        assert_eq!(Runtime::stats().nodes, nodes + 1);
    }
    assert_eq!(Runtime::stats().nodes, nodes);
    assert_eq!(a.observer_count(), 0);

    set_a.set(2).unwrap();
    assert_eq!(a.get(), 2);
}

/// `switch` follows whichever node the selector picks.
#[test]
fn switch_follows_selected_node() {
    let (first, set_first) = signal(1);
    let (second, set_second) = signal(2);
    let (which, set_which) = signal(0usize);

    let nodes = vec![first, second];
    let current = which.switch(move |&i| nodes[i].clone());
    let _effect = current.watch(|_| {}).unwrap();
    assert_eq!(current.get(), 1);

    set_which.set(1).unwrap();
    assert_eq!(current.get(), 2);

    set_first.set(10).unwrap();
    assert_eq!(current.get(), 2);

    set_second.set(20).unwrap();
    assert_eq!(current.get(), 20);
}
