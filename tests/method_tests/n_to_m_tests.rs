//! N-to-M Rebuild Tests
//!
//! Tests verify:
//! - A successful stripe reports 0 exactly once and returns every slot
//! - Mirror and XOR recovery land the right bytes on the destination
//! - A read failure with a backup fails over, permanently
//! - A read failure without a backup reports failure and writes nothing
//! - Write failures are reported but never fail over
//! - Completions may arrive on a later call (deferred mode)

use std::sync::Arc;

use parking_lot::Mutex;

use raidmend::io::{CompletionMode, FaultRule, IoStatus};
use raidmend::rebuild::{FailoverCursor, NToMRebuild, RebuildPair, StripeDone};
use raidmend::recover::{mirror_copy, xor_recover};
use raidmend::types::PartitionPhysicalSize;

#[path = "../common/mod.rs"]
mod common;

use common::{dev, geometry, Harness};

// =============================================================================
// Success Path Tests
// =============================================================================

#[test]
fn test_recover_mirror_success() {
    let h = Harness::new(CompletionMode::Immediate);
    h.add_devices(2);
    let size = geometry(0, 2, 4, 1);
    let data = h.fill_stripes(dev(0), &size, 1);

    let method = build(&h, &size, RebuildPair::new(vec![dev(0)], vec![dev(1)], mirror_copy()), None);
    let statuses = Arc::new(Mutex::new(Vec::new()));

    method.recover(0, 2, record(&statuses));

    assert_eq!(*statuses.lock(), vec![IoStatus::SUCCESS]);
    assert_eq!(h.chunk(dev(1), &size, 2), data[2]);
    assert_pools_full(&method, 0);
}

#[test]
fn test_recover_every_stripe() {
    let h = Harness::new(CompletionMode::Immediate);
    h.add_devices(2);
    let size = geometry(16, 2, 4, 2);
    let data = h.fill_stripes(dev(0), &size, 9);

    let method = build(&h, &size, RebuildPair::new(vec![dev(0)], vec![dev(1)], mirror_copy()), None);
    let statuses = Arc::new(Mutex::new(Vec::new()));

    for stripe in 0..size.total_stripes() {
        method.recover(0, stripe, record(&statuses));
    }

    assert_eq!(statuses.lock().len(), size.total_stripes() as usize);
    assert!(statuses.lock().iter().all(|s| s.is_success()));
    for stripe in 0..size.total_stripes() {
        assert_eq!(h.chunk(dev(1), &size, stripe), data[stripe as usize]);
    }
}

#[test]
fn test_recover_xor_of_sources() {
    let h = Harness::new(CompletionMode::Immediate);
    h.add_devices(4);
    let size = geometry(0, 4, 2, 1);
    let a = h.fill_stripes(dev(0), &size, 3);
    let b = h.fill_stripes(dev(1), &size, 40);
    let c = h.fill_stripes(dev(2), &size, 77);

    let pair = RebuildPair::new(vec![dev(0), dev(1), dev(2)], vec![dev(3)], xor_recover());
    let method = build(&h, &size, pair, None);
    let statuses = Arc::new(Mutex::new(Vec::new()));

    method.recover(0, 1, record(&statuses));

    let expected: Vec<u8> = (0..a[1].len()).map(|i| a[1][i] ^ b[1][i] ^ c[1][i]).collect();
    assert_eq!(*statuses.lock(), vec![IoStatus::SUCCESS]);
    assert_eq!(h.chunk(dev(3), &size, 1), expected);
    assert_pools_full(&method, 0);
}

#[test]
fn test_recover_to_multiple_destinations() {
    let h = Harness::new(CompletionMode::Immediate);
    h.add_devices(4);
    let size = geometry(0, 4, 2, 1);
    let a = h.fill_stripes(dev(0), &size, 5);
    let b = h.fill_stripes(dev(1), &size, 6);

    // Two sources copied one-to-one onto two destinations
    let copy: raidmend::recover::RecoverFunc =
        Arc::new(|dst: &mut [u8], src: &[u8], size: usize| dst[..size].copy_from_slice(&src[..size]));
    let pair = RebuildPair::new(vec![dev(0), dev(1)], vec![dev(2), dev(3)], copy);
    let method = build(&h, &size, pair, None);
    let statuses = Arc::new(Mutex::new(Vec::new()));

    method.recover(0, 0, record(&statuses));

    assert_eq!(*statuses.lock(), vec![IoStatus::SUCCESS]);
    assert_eq!(h.chunk(dev(2), &size, 0), a[0]);
    assert_eq!(h.chunk(dev(3), &size, 0), b[0]);
}

#[test]
fn test_deferred_completion() {
    let h = Harness::new(CompletionMode::Deferred);
    h.add_devices(2);
    let size = geometry(0, 2, 4, 1);
    let data = h.fill_stripes(dev(0), &size, 12);

    let method = build(&h, &size, RebuildPair::new(vec![dev(0)], vec![dev(1)], mirror_copy()), None);
    let statuses = Arc::new(Mutex::new(Vec::new()));

    method.recover(0, 0, record(&statuses));
    method.recover(0, 1, record(&statuses));
    assert!(statuses.lock().is_empty());
    assert_eq!(h.array.pending_count(), 2);

    h.array.complete_pending();

    assert_eq!(statuses.lock().len(), 2);
    assert_eq!(h.chunk(dev(1), &size, 0), data[0]);
    assert_eq!(h.chunk(dev(1), &size, 1), data[1]);
    assert_pools_full(&method, 0);
}

// =============================================================================
// Failover Tests
// =============================================================================

#[test]
fn test_read_failure_fails_over_permanently() {
    let h = Harness::new(CompletionMode::Immediate);
    h.add_devices(3);
    let size = geometry(0, 3, 4, 1);
    let primary_data = h.fill_stripes(dev(0), &size, 20);
    let backup_data = h.fill_stripes(dev(1), &size, 90);

    let primary = RebuildPair::new(vec![dev(0)], vec![dev(2)], mirror_copy());
    let backup = RebuildPair::new(vec![dev(1)], vec![dev(2)], mirror_copy());
    let method = build(&h, &size, primary, Some(backup));
    assert_eq!(method.plan_count(), 2);
    assert!(method.pools(1).is_none());

    h.array.inject_read_error(dev(0), FaultRule::Times(1));
    let statuses = Arc::new(Mutex::new(Vec::new()));

    method.recover(0, 0, record(&statuses));
    assert_eq!(*statuses.lock(), vec![IoStatus::SUCCESS]);
    assert!(method.is_failed_over());
    assert_eq!(method.active_plan(), 1);
    assert_eq!(h.chunk(dev(2), &size, 0), backup_data[0]);

    // The primary is healthy again, but the backup stays in use
    method.recover(0, 1, record(&statuses));
    assert_eq!(h.chunk(dev(2), &size, 1), backup_data[1]);
    assert_ne!(h.chunk(dev(2), &size, 1), primary_data[1]);
    assert_eq!(h.array.reads_submitted(), 3);

    assert_pools_full(&method, 0);
    assert_pools_full(&method, 1);
}

#[test]
fn test_failover_shared_through_cursor() {
    let h = Harness::new(CompletionMode::Immediate);
    h.add_devices(3);
    let size = geometry(0, 3, 4, 1);
    h.fill_stripes(dev(1), &size, 4);

    let cursor = Arc::new(FailoverCursor::new());
    let primary = RebuildPair::new(vec![dev(0)], vec![dev(2)], mirror_copy());
    let backup = RebuildPair::new(vec![dev(1)], vec![dev(2)], mirror_copy());
    let method = Arc::new(
        NToMRebuild::new("cursor", primary, size, 2, h.resources.clone(), cursor.clone())
            .with_backup(backup),
    );
    assert!(method.init());

    h.array.inject_read_error(dev(0), FaultRule::Times(1));
    method.recover(0, 0, Box::new(|_| {}));

    assert_eq!(cursor.current(), 1);
    assert!(cursor.is_failed_over());
}

#[test]
fn test_read_failure_without_backup() {
    let h = Harness::new(CompletionMode::Immediate);
    h.add_devices(2);
    let size = geometry(0, 2, 4, 1);

    let method = build(&h, &size, RebuildPair::new(vec![dev(0)], vec![dev(1)], mirror_copy()), None);
    h.array.inject_read_error(dev(0), FaultRule::Always);
    let statuses = Arc::new(Mutex::new(Vec::new()));

    method.recover(0, 0, record(&statuses));

    let statuses = statuses.lock();
    assert_eq!(statuses.len(), 1);
    assert!(!statuses[0].is_success());
    assert_eq!(h.array.writes_submitted(), 0);
    assert!(!method.is_failed_over());
    assert_pools_full(&method, 0);
}

#[test]
fn test_backup_failure_reported() {
    let h = Harness::new(CompletionMode::Immediate);
    h.add_devices(3);
    let size = geometry(0, 3, 4, 1);

    let primary = RebuildPair::new(vec![dev(0)], vec![dev(2)], mirror_copy());
    let backup = RebuildPair::new(vec![dev(1)], vec![dev(2)], mirror_copy());
    let method = build(&h, &size, primary, Some(backup));

    h.array.inject_read_error(dev(0), FaultRule::Always);
    h.array.inject_read_error(dev(1), FaultRule::Always);
    let statuses = Arc::new(Mutex::new(Vec::new()));

    method.recover(0, 0, record(&statuses));

    assert_eq!(*statuses.lock(), vec![IoStatus::DEVICE_ERROR]);
    assert_eq!(h.array.writes_submitted(), 0);
    assert_pools_full(&method, 0);
    assert_pools_full(&method, 1);
}

#[test]
fn test_write_failure_does_not_fail_over() {
    let h = Harness::new(CompletionMode::Immediate);
    h.add_devices(3);
    let size = geometry(0, 3, 4, 1);
    h.fill_stripes(dev(0), &size, 8);

    let primary = RebuildPair::new(vec![dev(0)], vec![dev(2)], mirror_copy());
    let backup = RebuildPair::new(vec![dev(1)], vec![dev(2)], mirror_copy());
    let method = build(&h, &size, primary, Some(backup));

    h.array.inject_write_error(dev(2), FaultRule::Times(1));
    let statuses = Arc::new(Mutex::new(Vec::new()));

    method.recover(0, 0, record(&statuses));

    assert_eq!(*statuses.lock(), vec![IoStatus::DEVICE_ERROR]);
    assert!(!method.is_failed_over());
    assert!(method.pools(1).is_none());
    assert_pools_full(&method, 0);
}

// =============================================================================
// Helper Functions
// =============================================================================

fn build(
    h: &Harness,
    size: &PartitionPhysicalSize,
    primary: RebuildPair,
    backup: Option<RebuildPair>,
) -> Arc<NToMRebuild> {
    let mut method = NToMRebuild::new(
        "test",
        primary,
        *size,
        size.stripes_per_segment as usize,
        h.resources.clone(),
        Arc::new(FailoverCursor::new()),
    );
    if let Some(backup) = backup {
        method = method.with_backup(backup);
    }
    let method = Arc::new(method);
    assert!(method.init());
    method
}

fn record(statuses: &Arc<Mutex<Vec<IoStatus>>>) -> StripeDone {
    let statuses = Arc::clone(statuses);
    Box::new(move |status| statuses.lock().push(status))
}

fn assert_pools_full(method: &NToMRebuild, plan: usize) {
    let (src, dst) = method.pools(plan).unwrap();
    assert!(src.is_full(), "source pool of plan {} not full", plan);
    assert!(dst.is_full(), "destination pool of plan {} not full", plan);
}
