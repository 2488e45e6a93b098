//! Recover method registry
//!
//! Per-array table of partition lookups consulted by the degraded read path.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use super::RecoverFunc;
use crate::error::{RebuildError, Result};
use crate::io::IoRequest;
use crate::types::{PartitionType, PhysicalBlkAddr};

/// Recovery plan for one address
#[derive(Clone)]
pub struct RecoverMethod {
    /// Addresses to read, in the order the recovery function expects them
    pub src_addrs: Vec<PhysicalBlkAddr>,
    pub recover_func: RecoverFunc,
}

impl std::fmt::Debug for RecoverMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoverMethod")
            .field("src_addrs", &self.src_addrs)
            .finish()
    }
}

/// Resolves a recovery plan for an address, if the address is its business
pub trait RecoverMethodGetter: Send + Sync {
    fn get_recover_method(&self, addr: PhysicalBlkAddr, sectors: u64) -> Option<RecoverMethod>;
}

/// Lookups of one array, tried in partition order
pub type RecoverMethodMap = BTreeMap<PartitionType, Arc<dyn RecoverMethodGetter>>;

/// Registry of recovery lookups, keyed by array index
#[derive(Default)]
pub struct IoRecover {
    methods: RwLock<HashMap<u32, RecoverMethodMap>>,
}

impl IoRecover {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the lookups of one array
    ///
    /// Returns false if the array already has a registration; the caller
    /// has to `unregister` first.
    pub fn register(&self, array_index: u32, map: RecoverMethodMap) -> bool {
        let mut methods = self.methods.write();
        if methods.contains_key(&array_index) {
            tracing::warn!("Recover methods of array {} already registered", array_index);
            return false;
        }
        tracing::debug!(
            "Registered {} recover methods for array {}",
            map.len(),
            array_index
        );
        methods.insert(array_index, map);
        true
    }

    pub fn unregister(&self, array_index: u32) {
        if self.methods.write().remove(&array_index).is_some() {
            tracing::debug!("Unregistered recover methods of array {}", array_index);
        }
    }

    pub fn is_registered(&self, array_index: u32) -> bool {
        self.methods.read().contains_key(&array_index)
    }

    /// First plan any registered partition resolves for `request`
    pub fn get_recover_method(&self, array_index: u32, request: &IoRequest) -> Result<RecoverMethod> {
        let not_found = || RebuildError::NoRecoverMethod {
            array_index,
            lba: request.addr.lba,
        };

        let methods = self.methods.read();
        let map = methods.get(&array_index).ok_or_else(not_found)?;
        map.values()
            .find_map(|getter| getter.get_recover_method(request.addr, request.sector_count()))
            .ok_or_else(not_found)
    }
}
