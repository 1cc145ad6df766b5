use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use tick_tree::builder::{action, random_selector, random_sequence, selector, sequence, task};
use tick_tree::{Scheduler, SchedulerConfig, Status, Tree};

fn counter(hits: &Rc<Cell<u32>>, status: Status) -> impl FnMut() -> Status + 'static {
    let hits = Rc::clone(hits);
    move || {
        hits.set(hits.get() + 1);
        status
    }
}

#[test]
fn sequence_runs_each_child_once_until_failure() {
    let scheduler = Scheduler::new();
    let (a, b, c) = (
        Rc::new(Cell::new(0)),
        Rc::new(Cell::new(0)),
        Rc::new(Cell::new(0)),
    );
    let mut tree = Tree::new("Seq", &scheduler)
        .with_root(sequence(
            "Root",
            [
                task("A", counter(&a, Status::Success)),
                task("B", counter(&b, Status::Success)),
                task("C", counter(&c, Status::Failure)),
            ],
        ))
        .unwrap();

    assert_eq!(tree.tick(), Status::Failure);
    assert_eq!((a.get(), b.get(), c.get()), (1, 1, 1));
}

#[test]
fn selector_stops_at_first_success() {
    let scheduler = Scheduler::new();
    let (a, b, c) = (
        Rc::new(Cell::new(0)),
        Rc::new(Cell::new(0)),
        Rc::new(Cell::new(0)),
    );
    let mut tree = Tree::new("Sel", &scheduler)
        .with_root(selector(
            "Root",
            [
                task("A", counter(&a, Status::Failure)),
                task("B", counter(&b, Status::Success)),
                task("C", counter(&c, Status::Success)),
            ],
        ))
        .unwrap();

    assert_eq!(tree.tick(), Status::Success);
    assert_eq!((a.get(), b.get(), c.get()), (1, 1, 0));
}

#[test]
fn running_child_is_resumed_directly() {
    let scheduler = Scheduler::new();
    let first = Rc::new(Cell::new(0));
    let polls = Rc::new(Cell::new(0));
    let poll = Rc::clone(&polls);
    let mut tree = Tree::new("Seq", &scheduler)
        .with_root(sequence(
            "Root",
            [
                task("First", counter(&first, Status::Success)),
                task("Slow", move || {
                    poll.set(poll.get() + 1);
                    if poll.get() < 3 {
                        Status::Running
                    } else {
                        Status::Success
                    }
                }),
            ],
        ))
        .unwrap();

    assert_eq!(tree.tick(), Status::Running);
    assert_eq!(tree.tick(), Status::Running);
    assert_eq!(tree.tick(), Status::Success);
    assert_eq!(first.get(), 1);
    assert_eq!(polls.get(), 3);
}

#[test]
fn random_sequence_covers_every_permutation() {
    let scheduler = Scheduler::with_config(SchedulerConfig::with_seed(11));
    let order = Rc::new(RefCell::new(Vec::new()));
    let child = |name: &'static str| {
        let order = Rc::clone(&order);
        action(name, move || order.borrow_mut().push(name))
    };
    let mut tree = Tree::new("Shuffle", &scheduler)
        .with_root(random_sequence("Root", [child("A"), child("B"), child("C")]))
        .unwrap();

    let mut seen = HashSet::new();
    for _ in 0..600 {
        assert_eq!(tree.tick(), Status::Success);
        let run: Vec<_> = order.borrow_mut().drain(..).collect();
        assert_eq!(run.len(), 3);
        seen.insert(run);
    }
    assert_eq!(seen.len(), 6);
}

#[test]
fn random_selector_outcome_matches_selector() {
    let scheduler = Scheduler::with_config(SchedulerConfig::with_seed(5));
    let mut failing = Tree::new("AllFail", &scheduler)
        .with_root(random_selector(
            "Root",
            [
                task("A", || Status::Failure),
                task("B", || Status::Failure),
                task("C", || Status::Failure),
            ],
        ))
        .unwrap();
    let mut one_ok = Tree::new("OneOk", &scheduler)
        .with_root(random_selector(
            "Root",
            [
                task("A", || Status::Failure),
                task("B", || Status::Success),
                task("C", || Status::Failure),
            ],
        ))
        .unwrap();

    for _ in 0..50 {
        assert_eq!(failing.tick(), Status::Failure);
        assert_eq!(one_ok.tick(), Status::Success);
    }
}

#[test]
fn seeded_trees_shuffle_identically() {
    let orders = |seed: u64| {
        let scheduler = Scheduler::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let child = |name: &'static str| {
            let order = Rc::clone(&order);
            action(name, move || order.borrow_mut().push(name))
        };
        let mut tree = Tree::new("Shuffle", &scheduler)
            .with_seed(seed)
            .with_root(random_sequence("Root", [child("A"), child("B"), child("C")]))
            .unwrap();
        for _ in 0..20 {
            tree.tick();
        }
        order.take()
    };
    assert_eq!(orders(99), orders(99));
}
