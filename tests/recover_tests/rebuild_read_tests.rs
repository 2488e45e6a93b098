//! Degraded Read Tests
//!
//! Tests verify:
//! - Recover methods register once per array and resolve by address
//! - Mirror and parity recovery groups of a partition
//! - A degraded read returns the data the lost device held, aligned or not
//! - Refusals (retry, no method, empty pool, partial sector) hand the
//!   request back
//! - Pool slots come back whole, whatever part of them a read used
//! - Source read failures complete the request with an error

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;

use raidmend::buffer::BufferPool;
use raidmend::io::{CompletionMode, FaultRule, IoDirection, IoRequest, IoStatus};
use raidmend::recover::{
    mirror_copy, xor_recover, IoRecover, PartitionRecovery, RecoverMethodGetter, RecoverMethodMap,
};
use raidmend::types::{FtBlkAddr, PartitionPhysicalSize, PhysicalBlkAddr};
use raidmend::{PartitionType, RaidType, RebuildError};

#[path = "../common/mod.rs"]
mod common;

use common::{dev, geometry, pattern, Harness, CHUNK};

type Completion = Arc<Mutex<Option<(Vec<u8>, IoStatus)>>>;

// =============================================================================
// Recovery Function Tests
// =============================================================================

#[test]
fn test_mirror_copy() {
    let src = pattern(1, 64);
    let mut dst = vec![0u8; 64];

    (mirror_copy())(&mut dst[..], &src[..], 64);
    assert_eq!(dst, src);
}

#[test]
fn test_xor_recover() {
    let a = pattern(1, 32);
    let b = pattern(2, 32);
    let mut src = a.clone();
    src.extend_from_slice(&b);
    let mut dst = vec![0xffu8; 32];

    (xor_recover())(&mut dst[..], &src[..], 32);
    let expected: Vec<u8> = a.iter().zip(&b).map(|(x, y)| x ^ y).collect();
    assert_eq!(dst, expected);
}

// =============================================================================
// Registry Tests
// =============================================================================

#[test]
fn test_register_once_per_array() {
    let registry = IoRecover::new();
    let part = mirror_partition(geometry(0, 2, 4, 1));

    assert!(registry.register(0, method_map(PartitionType::MetaSsd, part.clone())));
    assert!(!registry.register(0, method_map(PartitionType::MetaSsd, part.clone())));
    assert!(registry.is_registered(0));

    registry.unregister(0);
    assert!(!registry.is_registered(0));
    assert!(registry.register(0, method_map(PartitionType::MetaSsd, part)));
}

#[test]
fn test_lookup_without_registration() {
    let registry = IoRecover::new();
    let request = read_request(0, 0, 8);

    let result = registry.get_recover_method(0, &request);
    assert!(matches!(result, Err(RebuildError::NoRecoverMethod { array_index: 0, .. })));
}

#[test]
fn test_lookup_outside_partition() {
    let registry = IoRecover::new();
    let size = geometry(0, 2, 4, 1);
    registry.register(0, method_map(PartitionType::MetaSsd, mirror_partition(size)));

    let request = read_request(0, size.last_lba(), 8);
    assert!(registry.get_recover_method(0, &request).is_err());
}

#[test]
fn test_lookup_tries_every_partition() {
    let registry = IoRecover::new();
    let meta = geometry(0, 2, 4, 1);
    let journal = geometry(64, 2, 4, 1);
    let mut map = RecoverMethodMap::new();
    map.insert(PartitionType::MetaSsd, mirror_partition(meta));
    map.insert(PartitionType::JournalSsd, mirror_partition(journal));
    registry.register(3, map);

    let request = read_request(1, 72, 8);
    let method = registry.get_recover_method(3, &request).unwrap();
    assert_eq!(
        method.src_addrs,
        vec![PhysicalBlkAddr { device: dev(0), lba: 72 }]
    );
}

// =============================================================================
// Partition Recovery Tests
// =============================================================================

#[test]
fn test_partition_rejects_bad_layouts() {
    let size = geometry(0, 2, 4, 1);
    assert!(PartitionRecovery::new(PartitionType::MetaSsd, RaidType::Raid1, size, vec![dev(0)]).is_err());
    assert!(PartitionRecovery::new(PartitionType::MetaSsd, RaidType::Raid0, size, vec![dev(0), dev(1)]).is_err());

    let odd = geometry(0, 3, 4, 1);
    let devices = vec![dev(0), dev(1), dev(2)];
    assert!(PartitionRecovery::new(PartitionType::MetaSsd, RaidType::Raid10, odd, devices.clone()).is_err());
    assert!(PartitionRecovery::new(PartitionType::MetaSsd, RaidType::Raid5, odd, devices).is_ok());
}

#[test]
fn test_rebuild_groups() {
    let mirror = PartitionRecovery::new(
        PartitionType::MetaSsd,
        RaidType::Raid10,
        geometry(0, 4, 4, 1),
        vec![dev(0), dev(1), dev(2), dev(3)],
    )
    .unwrap();
    assert_eq!(mirror.rebuild_group(0), vec![2]);
    assert_eq!(mirror.rebuild_group(3), vec![1]);

    let parity = raid5_partition(geometry(0, 3, 4, 1));
    assert_eq!(parity.rebuild_group(1), vec![0, 2]);
}

#[test]
fn test_translate_and_rebuild_pair() {
    let size = PartitionPhysicalSize {
        start_lba: 128,
        blks_per_chunk: 2,
        chunks_per_stripe: 3,
        stripes_per_segment: 4,
        total_segments: 1,
    };
    let part = raid5_partition(size);

    let addr = part.translate(FtBlkAddr { stripe_id: 3, offset: 3 });
    assert_eq!(addr.device, dev(1));
    assert_eq!(addr.lba, 128 + (3 * 2 + 1) * 8);

    let pair = part.rebuild_pair(2);
    assert_eq!(pair.srcs, vec![dev(0), dev(1)]);
    assert_eq!(pair.dsts, vec![dev(2)]);
}

#[test]
fn test_recover_method_sources() {
    let part = raid5_partition(geometry(0, 3, 4, 1));
    let addr = PhysicalBlkAddr { device: dev(2), lba: 16 };

    let method = part.get_recover_method(addr, 8).unwrap();
    assert_eq!(
        method.src_addrs,
        vec![
            PhysicalBlkAddr { device: dev(0), lba: 16 },
            PhysicalBlkAddr { device: dev(1), lba: 16 },
        ]
    );
    assert!(part
        .get_recover_method(PhysicalBlkAddr { device: dev(9), lba: 16 }, 8)
        .is_none());
}

// =============================================================================
// Degraded Read Tests
// =============================================================================

#[test]
fn test_degraded_read_mirror() {
    let h = Harness::new(CompletionMode::Immediate);
    h.add_devices(2);
    let size = geometry(0, 2, 4, 1);
    let mirror_data = h.fill_stripes(dev(1), &size, 30);
    h.io_recover
        .register(0, method_map(PartitionType::MetaSsd, mirror_partition(size)));

    let done = Completion::default();
    let request = capture(read_request(0, size.stripe_lba(1), 8), &done);

    h.resources.rebuild_read().recover(request, None).unwrap();

    let (data, status) = done.lock().take().unwrap();
    assert_eq!(status, IoStatus::SUCCESS);
    assert_eq!(data, mirror_data[1]);
}

#[test]
fn test_degraded_read_parity() {
    let h = Harness::new(CompletionMode::Immediate);
    h.add_devices(3);
    let size = geometry(0, 3, 4, 1);
    let a = h.fill_stripes(dev(1), &size, 10);
    let b = h.fill_stripes(dev(2), &size, 11);
    h.io_recover
        .register(0, method_map(PartitionType::MetaNvm, raid5_partition(size)));

    let done = Completion::default();
    let request = capture(read_request(0, size.stripe_lba(2), 8), &done);

    h.resources.rebuild_read().recover(request, None).unwrap();

    let (data, status) = done.lock().take().unwrap();
    let expected: Vec<u8> = a[2].iter().zip(&b[2]).map(|(x, y)| x ^ y).collect();
    assert_eq!(status, IoStatus::SUCCESS);
    assert_eq!(data, expected);
}

#[test]
fn test_degraded_read_unaligned() {
    let h = Harness::new(CompletionMode::Immediate);
    h.add_devices(2);
    let size = geometry(0, 2, 4, 1);
    h.fill_stripes(dev(1), &size, 50);
    h.io_recover
        .register(0, method_map(PartitionType::MetaSsd, mirror_partition(size)));

    // Two sectors starting two sectors into stripe 1
    let lba = size.stripe_lba(1) + 2;
    let done = Completion::default();
    let request = capture(read_request(0, lba, 2), &done);

    h.resources.rebuild_read().recover(request, None).unwrap();

    let (data, status) = done.lock().take().unwrap();
    assert_eq!(status, IoStatus::SUCCESS);
    assert_eq!(data, h.array.read_at(dev(1), lba, 1024).unwrap());
}

#[test]
fn test_degraded_read_uses_and_returns_pool_slot() {
    let h = Harness::new(CompletionMode::Deferred);
    h.add_devices(2);
    let size = geometry(0, 2, 4, 1);
    h.fill_stripes(dev(1), &size, 60);
    h.io_recover
        .register(0, method_map(PartitionType::MetaSsd, mirror_partition(size)));
    let pool = Arc::new(BufferPool::new("read", CHUNK, 1));

    let done = Completion::default();
    let request = capture(read_request(0, 0, 8), &done);
    h.resources.rebuild_read().recover(request, Some(&pool)).unwrap();
    assert_eq!(pool.available(), 0);

    h.array.complete_pending();
    assert!(pool.is_full());
    assert_eq!(done.lock().as_ref().unwrap().1, IoStatus::SUCCESS);
}

#[test]
fn test_degraded_read_returns_oversized_slot() {
    let h = Harness::new(CompletionMode::Immediate);
    h.add_devices(2);
    let size = geometry(0, 2, 4, 1);
    let mirror_data = h.fill_stripes(dev(1), &size, 70);
    h.io_recover
        .register(0, method_map(PartitionType::MetaSsd, mirror_partition(size)));
    // Each slot is twice what a one-chunk mirror read needs
    let pool = Arc::new(BufferPool::new("read", 2 * CHUNK, 1));

    for stripe in 0..2 {
        let done = Completion::default();
        let request = capture(read_request(0, size.stripe_lba(stripe), 8), &done);
        h.resources.rebuild_read().recover(request, Some(&pool)).unwrap();

        let (data, status) = done.lock().take().unwrap();
        assert_eq!(status, IoStatus::SUCCESS);
        assert_eq!(data, mirror_data[stripe as usize]);
        assert!(pool.is_full());
    }
}

#[test]
fn test_unaligned_length_rejected() {
    let h = Harness::new(CompletionMode::Immediate);
    h.add_devices(2);
    let size = geometry(0, 2, 4, 1);
    h.io_recover
        .register(0, method_map(PartitionType::MetaSsd, mirror_partition(size)));

    let done = Completion::default();
    let request = IoRequest::new(
        IoDirection::Read,
        PhysicalBlkAddr { device: dev(0), lba: 0 },
        BytesMut::zeroed(700),
        0,
    );
    let request = capture(request, &done);

    let rejected = h.resources.rebuild_read().recover(request, None).unwrap_err();
    assert!(matches!(rejected.error, RebuildError::InvalidGeometry(_)));
    assert!(!rejected.request.is_retry());
    assert!(done.lock().is_none());
    assert_eq!(h.array.reads_submitted(), 0);
}

#[test]
fn test_retry_request_rejected() {
    let h = Harness::new(CompletionMode::Immediate);
    h.add_devices(2);
    let size = geometry(0, 2, 4, 1);
    h.io_recover
        .register(0, method_map(PartitionType::MetaSsd, mirror_partition(size)));

    let done = Completion::default();
    let mut request = capture(read_request(0, 0, 8), &done);
    request.set_retry(true);

    let rejected = h.resources.rebuild_read().recover(request, None).unwrap_err();
    assert!(matches!(rejected.error, RebuildError::RetryInProgress));
    assert!(rejected.request.has_callback());
    assert!(done.lock().is_none());
    assert_eq!(h.array.reads_submitted(), 0);
}

#[test]
fn test_no_recover_method_rejected() {
    let h = Harness::new(CompletionMode::Immediate);
    h.add_devices(2);

    let done = Completion::default();
    let request = capture(read_request(0, 0, 8), &done);

    let rejected = h.resources.rebuild_read().recover(request, None).unwrap_err();
    assert!(matches!(rejected.error, RebuildError::NoRecoverMethod { .. }));
    assert!(rejected.request.is_retry());
    assert!(done.lock().is_none());
}

#[test]
fn test_exhausted_pool_rejected() {
    let h = Harness::new(CompletionMode::Immediate);
    h.add_devices(2);
    let size = geometry(0, 2, 4, 1);
    h.io_recover
        .register(0, method_map(PartitionType::MetaSsd, mirror_partition(size)));
    let pool = Arc::new(BufferPool::new("read", CHUNK, 1));
    let held = pool.try_get_buffer().unwrap();

    let done = Completion::default();
    let request = capture(read_request(0, 0, 8), &done);

    let rejected = h.resources.rebuild_read().recover(request, Some(&pool)).unwrap_err();
    assert!(matches!(rejected.error, RebuildError::BufferExhausted { .. }));
    assert_eq!(h.array.reads_submitted(), 0);

    pool.return_buffer(held);
    assert!(pool.is_full());
}

#[test]
fn test_source_failure_completes_with_error() {
    let h = Harness::new(CompletionMode::Immediate);
    h.add_devices(2);
    let size = geometry(0, 2, 4, 1);
    h.io_recover
        .register(0, method_map(PartitionType::MetaSsd, mirror_partition(size)));
    h.array.inject_read_error(dev(1), FaultRule::Always);

    let done = Completion::default();
    let request = capture(read_request(0, 0, 8), &done);

    h.resources.rebuild_read().recover(request, None).unwrap();
    assert_eq!(done.lock().as_ref().unwrap().1, IoStatus::DEVICE_ERROR);
}

// =============================================================================
// Helper Functions
// =============================================================================

fn mirror_partition(size: PartitionPhysicalSize) -> Arc<PartitionRecovery> {
    Arc::new(
        PartitionRecovery::new(PartitionType::MetaSsd, RaidType::Raid1, size, vec![dev(0), dev(1)])
            .unwrap(),
    )
}

fn raid5_partition(size: PartitionPhysicalSize) -> Arc<PartitionRecovery> {
    Arc::new(
        PartitionRecovery::new(
            PartitionType::MetaNvm,
            RaidType::Raid5,
            size,
            vec![dev(0), dev(1), dev(2)],
        )
        .unwrap(),
    )
}

fn method_map(part: PartitionType, recovery: Arc<PartitionRecovery>) -> RecoverMethodMap {
    let mut map = BTreeMap::new();
    map.insert(part, recovery as Arc<dyn RecoverMethodGetter>);
    map
}

/// Read of `sectors` sectors from device `device`
fn read_request(device: u32, lba: u64, sectors: usize) -> IoRequest {
    IoRequest::new(
        IoDirection::Read,
        PhysicalBlkAddr { device: dev(device), lba },
        BytesMut::zeroed(sectors * 512),
        0,
    )
}

fn capture(request: IoRequest, done: &Completion) -> IoRequest {
    let done = Arc::clone(done);
    request.with_callback(move |io, status| {
        *done.lock() = Some((io.buffer.to_vec(), status));
    })
}
