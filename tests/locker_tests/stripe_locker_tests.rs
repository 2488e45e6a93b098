//! Stripe Locker Tests
//!
//! Tests verify:
//! - A stripe can be held by one owner at a time
//! - `count` matches the set of held stripes under any interleaving
//! - Mode changes only happen from an empty working set
//! - Range locking is all-or-nothing
//! - Concurrent lock/unlock keeps the working set consistent

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use raidmend::locker::{StripeLocker, StripeLockerState};
use raidmend::LockerMode;

// =============================================================================
// Basic Locking Tests
// =============================================================================

#[test]
fn test_try_lock_twice() {
    let locker = StripeLocker::new();

    assert!(locker.try_lock(7));
    assert!(!locker.try_lock(7));
    assert!(locker.is_locked(7));
}

#[test]
fn test_unlock_allows_relock() {
    let locker = StripeLocker::new();

    assert!(locker.try_lock(3));
    locker.unlock(3);
    assert!(!locker.is_locked(3));
    assert!(locker.try_lock(3));
}

#[test]
fn test_unlock_of_free_stripe_is_harmless() {
    let locker = StripeLocker::new();

    locker.unlock(11);
    assert_eq!(locker.count(), 0);
    assert!(locker.try_lock(11));
}

#[test]
fn test_count_follows_lock_unlock_sequence() {
    let locker = StripeLocker::new();
    let mut model = HashSet::new();

    // Deterministic pseudo-random walk over a small id space
    let mut seed = 0x2545_f491_u32;
    for _ in 0..2000 {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        let id = seed % 32;

        if seed & 0x100 == 0 {
            assert_eq!(locker.try_lock(id), model.insert(id));
        } else {
            locker.unlock(id);
            model.remove(&id);
        }
        assert_eq!(locker.count(), model.len());
    }
}

// =============================================================================
// Range Locking Tests
// =============================================================================

#[test]
fn test_try_lock_range_locks_all() {
    let locker = StripeLocker::new();

    assert!(locker.try_lock_range(10, 14));
    assert_eq!(locker.count(), 5);
    for id in 10..=14 {
        assert!(locker.is_locked(id));
    }
}

#[test]
fn test_try_lock_range_is_all_or_nothing() {
    let locker = StripeLocker::new();
    assert!(locker.try_lock(12));

    assert!(!locker.try_lock_range(10, 14));
    assert_eq!(locker.count(), 1);
    assert!(!locker.is_locked(10));
    assert!(!locker.is_locked(11));
    assert!(!locker.is_locked(13));
}

#[test]
fn test_unlock_range() {
    let locker = StripeLocker::new();
    assert!(locker.try_lock_range(0, 3));

    locker.unlock_range(0, 3);
    assert_eq!(locker.count(), 0);
}

// =============================================================================
// Locker State Tests
// =============================================================================

#[test]
fn test_state_change_direction() {
    let normal = StripeLockerState::new(LockerMode::Normal);
    let busy = StripeLockerState::new(LockerMode::Busy);

    assert!(normal.state_change(LockerMode::Busy));
    assert!(!normal.state_change(LockerMode::Normal));
    assert!(busy.state_change(LockerMode::Normal));
    assert!(!busy.state_change(LockerMode::Busy));
}

#[test]
fn test_state_change_requires_empty_set() {
    let state = StripeLockerState::new(LockerMode::Normal);
    assert!(state.try_lock(1));
    assert!(state.try_lock(2));

    assert!(!state.state_change(LockerMode::Busy));
    // Refusal leaves the working set as it was
    assert_eq!(state.count(), 2);
    assert!(state.is_locked(1));
    assert!(state.is_locked(2));

    state.unlock(1);
    state.unlock(2);
    assert!(state.state_change(LockerMode::Busy));
}

// =============================================================================
// Mode Change Tests
// =============================================================================

#[test]
fn test_new_locker_is_normal() {
    let locker = StripeLocker::new();
    assert_eq!(locker.mode(), LockerMode::Normal);
}

#[test]
fn test_try_change_when_empty() {
    let locker = StripeLocker::new();

    assert!(locker.try_change(LockerMode::Busy));
    assert_eq!(locker.mode(), LockerMode::Busy);
    assert!(locker.try_change(LockerMode::Normal));
    assert_eq!(locker.mode(), LockerMode::Normal);
}

#[test]
fn test_try_change_deferred_while_held() {
    let locker = StripeLocker::new();
    assert!(locker.try_lock(5));

    assert!(!locker.try_change(LockerMode::Busy));
    assert_eq!(locker.mode(), LockerMode::Normal);
    assert!(locker.is_locked(5));

    locker.unlock(5);
    assert!(locker.try_change(LockerMode::Busy));
    assert_eq!(locker.mode(), LockerMode::Busy);
}

#[test]
fn test_pending_change_refuses_new_locks() {
    let locker = StripeLocker::new();
    assert!(locker.try_lock(5));
    assert!(!locker.try_change(LockerMode::Busy));

    // The NORMAL set is draining
    assert!(!locker.try_lock(6));
    assert!(locker.state(LockerMode::Normal).is_draining());

    locker.unlock(5);
    assert!(locker.try_change(LockerMode::Busy));
    assert!(locker.try_lock(6));
    assert!(locker.state(LockerMode::Busy).is_locked(6));
}

#[test]
fn test_change_to_current_mode_abandons_pending_change() {
    let locker = StripeLocker::new();
    assert!(locker.try_lock(1));
    assert!(!locker.try_change(LockerMode::Busy));

    assert!(locker.try_change(LockerMode::Normal));
    assert!(!locker.state(LockerMode::Normal).is_draining());
    assert!(locker.try_lock(2));
}

#[test]
fn test_busy_mode_locks_are_separate_from_normal() {
    let locker = StripeLocker::new();
    assert!(locker.try_change(LockerMode::Busy));
    assert!(locker.try_lock(4));

    assert_eq!(locker.state(LockerMode::Busy).count(), 1);
    assert_eq!(locker.state(LockerMode::Normal).count(), 0);
    assert!(!locker.try_change(LockerMode::Normal));

    locker.unlock(4);
    assert!(locker.try_change(LockerMode::Normal));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_lock_unlock() {
    let locker = Arc::new(StripeLocker::new());
    let mut handles = vec![];

    for t in 0..8u32 {
        let locker = Arc::clone(&locker);
        handles.push(thread::spawn(move || {
            let mut acquired = 0;
            for i in 0..500u32 {
                let id = (t * 7 + i) % 16;
                if locker.try_lock(id) {
                    acquired += 1;
                    locker.unlock(id);
                }
            }
            acquired
        }));
    }

    let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(total > 0);
    assert_eq!(locker.count(), 0);
}

#[test]
fn test_exclusive_ownership_under_contention() {
    let locker = Arc::new(StripeLocker::new());
    let owners = Arc::new(parking_lot::Mutex::new(HashSet::new()));
    let mut handles = vec![];

    for _ in 0..4 {
        let locker = Arc::clone(&locker);
        let owners = Arc::clone(&owners);
        handles.push(thread::spawn(move || {
            for _ in 0..1000 {
                if locker.try_lock(0) {
                    assert!(owners.lock().insert(0u32), "stripe held twice");
                    owners.lock().remove(&0);
                    locker.unlock(0);
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(!locker.is_locked(0));
}
