mod common;

use std::sync::Arc;
use std::thread;
use parking_lot::Mutex;
use lumen_core::collections::hashset::HashSet;
use lumen_rhi::{CommandListKind, CommandListPoolDesc, CommandListStatus, RhiError};

#[test]
fn acquire_up_to_capacity_then_none() {
    let device = common::plain_device();
    let pool = device.create_command_list_pool(&CommandListPoolDesc::new("pool", 1, 4)).unwrap();

    let handles: Vec<_> = (0..4).map(|_| pool.acquire().expect("below capacity")).collect();
    for (i, a) in handles.iter().enumerate() {
        for b in &handles[i + 1..] {
            assert!(!a.ptr_eq(b));
            assert_ne!(a.id(), b.id());
        }
    }
    assert!(pool.acquire().is_none());
    assert_eq!(pool.total_count(), 4);
    assert_eq!(pool.acquired_count(), 4);
}

#[test]
fn exhausted_pool_recovers_after_release() {
    let device = common::plain_device();
    let pool = device.create_command_list_pool(&CommandListPoolDesc::new("pool", 2, 2)).unwrap();

    let first = pool.acquire().unwrap();
    let second = pool.acquire().unwrap();
    assert!(pool.acquire().is_none());

    pool.release(first);
    let third = pool.acquire().expect("a released list is available again");
    assert!(!third.ptr_eq(&second));

    pool.release(second);
    pool.release(third);
    assert_eq!(pool.acquired_count(), 0);
}

#[test]
fn counts_stay_consistent() {
    let device = common::plain_device();
    let pool = device.create_command_list_pool(&CommandListPoolDesc::new("pool", 2, 6)).unwrap();
    let check = || assert_eq!(pool.acquired_count() + pool.free_count(), pool.total_count());

    check();
    let mut held = Vec::new();
    for _ in 0..5 {
        held.push(pool.acquire().unwrap());
        check();
    }
    for _ in 0..3 {
        pool.release(held.pop().unwrap());
        check();
    }
    held.push(pool.acquire().unwrap());
    check();
    for handle in held {
        pool.release(handle);
        check();
    }
    assert_eq!(pool.free_count(), pool.total_count());
}

#[test]
fn recycled_lists_come_back_initial() {
    let device = common::plain_device();
    let pool = device.create_command_list_pool(&CommandListPoolDesc::new("pool", 1, 1)).unwrap();

    let handle = pool.acquire().unwrap();
    {
        let mut list = handle.lock();
        list.begin();
        list.set_marker("work");
        list.end();
    }
    device.submit(&handle).unwrap();
    assert_eq!(handle.lock().status(), CommandListStatus::Submitted);
    pool.release(handle);

    let again = pool.acquire().unwrap();
    assert_eq!(again.lock().status(), CommandListStatus::Initial);
    pool.release(again);
}

#[test]
fn reset_returns_every_list_to_initial() {
    let device = common::plain_device();
    let pool = device.create_command_list_pool(&CommandListPoolDesc::new("pool", 3, 3)).unwrap();

    let handles: Vec<_> = (0..3).map(|_| pool.acquire().unwrap()).collect();
    for handle in &handles {
        let mut list = handle.lock();
        list.begin();
        list.end();
    }
    device.submit_batch(&handles).unwrap();
    for handle in handles.iter().cloned() {
        pool.release(handle);
    }

    device.wait_idle().unwrap();
    pool.reset();
    for handle in &handles {
        assert_eq!(handle.lock().status(), CommandListStatus::Initial);
    }
}

#[test]
fn pool_lists_have_the_pool_kind() {
    let device = common::plain_device();
    let desc = CommandListPoolDesc::new("compute", 1, 2).with_kind(CommandListKind::Compute);
    let pool = device.create_command_list_pool(&desc).unwrap();

    let handle = pool.acquire().unwrap();
    assert_eq!(handle.lock().kind(), CommandListKind::Compute);
    assert_eq!(pool.kind(), CommandListKind::Compute);
    pool.release(handle);
}

#[test]
fn invalid_pool_sizes_are_rejected() {
    let device = common::plain_device();
    for desc in [CommandListPoolDesc::new("empty", 0, 0), CommandListPoolDesc::new("inverted", 4, 2)] {
        match device.create_command_list_pool(&desc) {
            Err(RhiError::InvalidDescriptor(_)) => {}
            other => panic!("expected an invalid descriptor error, got {:?}", other.map(|_| ())),
        }
    }
}

#[test]
fn concurrent_acquire_never_hands_out_a_list_twice() {
    const THREADS: usize = 8;
    const CAPACITY: usize = 3;
    const ITERATIONS: usize = 500;

    let device = common::plain_device();
    let pool = device.create_command_list_pool(&CommandListPoolDesc::new("shared", 1, CAPACITY)).unwrap();
    let held = Arc::new(Mutex::new(HashSet::default()));

    thread::scope(|scope| {
        for _ in 0..THREADS {
            let pool = &pool;
            let held = held.clone();
            scope.spawn(move || {
                for _ in 0..ITERATIONS {
                    let Some(handle) = pool.acquire() else {
                        thread::yield_now();
                        continue;
                    };
                    assert!(held.lock().insert(handle.id()), "list {:?} handed out twice", handle.id());
                    thread::yield_now();
                    assert!(held.lock().remove(&handle.id()));
                    pool.release(handle);
                }
            });
        }
    });

    assert!(held.lock().is_empty());
    assert_eq!(pool.acquired_count(), 0);
    assert!(pool.total_count() <= CAPACITY);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "released twice")]
fn double_release_asserts() {
    let device = common::plain_device();
    let pool = device.create_command_list_pool(&CommandListPoolDesc::new("pool", 1, 2)).unwrap();
    let handle = pool.acquire().unwrap();
    pool.release(handle.clone());
    pool.release(handle);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "does not belong to pool")]
fn foreign_release_asserts() {
    let device = common::plain_device();
    let owner = device.create_command_list_pool(&CommandListPoolDesc::new("owner", 1, 2)).unwrap();
    let other = device.create_command_list_pool(&CommandListPoolDesc::new("other", 1, 2)).unwrap();
    other.release(owner.acquire().unwrap());
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "reset while lists are acquired")]
fn reset_with_acquired_lists_asserts() {
    let device = common::plain_device();
    let pool = device.create_command_list_pool(&CommandListPoolDesc::new("pool", 1, 2)).unwrap();
    let _held = pool.acquire().unwrap();
    pool.reset();
}

#[cfg(not(debug_assertions))]
#[test]
fn double_release_is_ignored() {
    let device = common::plain_device();
    let pool = device.create_command_list_pool(&CommandListPoolDesc::new("pool", 2, 2)).unwrap();
    let kept = pool.acquire().unwrap();
    let handle = pool.acquire().unwrap();

    pool.release(handle.clone());
    assert_eq!(pool.acquired_count(), 1);
    pool.release(handle);
    assert_eq!(pool.acquired_count(), 1);
    assert_eq!(pool.free_count(), 1);

    // The ignored release must not have freed the list still held.
    let again = pool.acquire().unwrap();
    assert!(!again.ptr_eq(&kept));
    assert!(pool.acquire().is_none());
}

#[cfg(not(debug_assertions))]
#[test]
fn foreign_release_is_ignored() {
    let device = common::plain_device();
    let owner = device.create_command_list_pool(&CommandListPoolDesc::new("owner", 1, 2)).unwrap();
    let other = device.create_command_list_pool(&CommandListPoolDesc::new("other", 1, 2)).unwrap();
    let _held = other.acquire().unwrap();
    let stray = owner.acquire().unwrap();

    other.release(stray.clone());
    assert_eq!(other.acquired_count(), 1);
    assert_eq!(other.total_count(), 1);
    assert_eq!(owner.acquired_count(), 1);

    owner.release(stray);
    assert_eq!(owner.acquired_count(), 0);
}
