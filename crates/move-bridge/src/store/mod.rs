//! # Resource Store
//!
//! The VM's prefix-partitioned view of the host key/value store: modules,
//! resources, table infos and table entries, plus the execution counter.
//!
//! All VM keys live under [`keys::VM_STORE_PREFIX`]; the counter lives under
//! its own key outside that range.

pub mod genesis;
pub mod keys;

use crate::domain::entities::{Module, UpgradePolicy};
use crate::domain::type_tag::StructTag;
use crate::domain::value_objects::{AccountAddress, Identifier};
use crate::errors::StoreError;
use crate::gas::KvGasConfig;
use crate::ports::outbound::{GasMeter, KvStore, VmStore};
use keys::{Namespace, ResourceKey, EXECUTION_COUNTER_KEY, VM_STORE_PREFIX};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub use genesis::{GenesisModule, GenesisResource, GenesisState, GenesisTableEntry, GenesisTableInfo};

// =============================================================================
// CODE METADATA (VM-side layout)
// =============================================================================

/// A Move `table::Table` value as stored inside a resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableHandle {
    /// Table handle address.
    pub handle: AccountAddress,
    /// Number of entries.
    pub length: u64,
}

/// `0x1::code::MetadataStore`: per-publisher table of module metadata keyed
/// by module name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataStore {
    /// `Table<String, ModuleMetadata>`.
    pub metadata: TableHandle,
}

/// `0x1::code::ModuleMetadata`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    /// Upgrade policy tag.
    pub upgrade_policy: u8,
}

/// Struct tag of `0x1::code::MetadataStore`.
pub fn metadata_store_tag() -> Result<StructTag, StoreError> {
    StructTag::parse("0x1::code::MetadataStore").map_err(|e| StoreError::Codec(e.to_string()))
}

// =============================================================================
// PAGINATION
// =============================================================================

/// Range request over one namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Resume strictly after this encoded resource key.
    pub start_after: Option<Vec<u8>>,
    /// Maximum number of items, all if unset.
    pub limit: Option<usize>,
}

impl PageRequest {
    /// First page of at most `limit` items.
    #[must_use]
    pub fn first(limit: usize) -> Self {
        Self {
            start_after: None,
            limit: Some(limit),
        }
    }
}

/// One page of results.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page<T> {
    /// Items in key order.
    pub items: Vec<T>,
    /// Key to pass as `start_after` for the next page, if more remain.
    pub next_key: Option<Vec<u8>>,
}

// =============================================================================
// RESOURCE STORE
// =============================================================================

/// Typed access to the VM namespaces of the host store.
#[derive(Clone)]
pub struct ResourceStore {
    kv: Arc<dyn KvStore>,
}

impl ResourceStore {
    /// Wraps a host store.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn host_key(key: &[u8]) -> Vec<u8> {
        let mut host = Vec::with_capacity(key.len() + 1);
        host.push(VM_STORE_PREFIX);
        host.extend_from_slice(key);
        host
    }

    // -------------------------------------------------------------------------
    // Raw access (encoded resource keys)
    // -------------------------------------------------------------------------

    /// Reads by encoded resource key.
    pub fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.kv.get(&Self::host_key(key))
    }

    /// Writes by encoded resource key.
    pub fn set_raw(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.kv.set(&Self::host_key(key), value)
    }

    /// Deletes by encoded resource key.
    pub fn remove_raw(&self, key: &[u8]) -> Result<(), StoreError> {
        self.kv.delete(&Self::host_key(key))
    }

    /// Entries under an encoded key prefix, keys returned without the
    /// host prefix.
    pub fn iter_raw(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        Ok(self
            .kv
            .iter_prefix(&Self::host_key(prefix))?
            .into_iter()
            .map(|(key, value)| (key[1..].to_vec(), value))
            .collect())
    }

    fn get(&self, key: &ResourceKey) -> Result<Option<Vec<u8>>, StoreError> {
        self.get_raw(&key.encode()?)
    }

    fn set(&self, key: &ResourceKey, value: &[u8]) -> Result<(), StoreError> {
        self.set_raw(&key.encode()?, value)
    }

    fn remove(&self, key: &ResourceKey) -> Result<(), StoreError> {
        self.remove_raw(&key.encode()?)
    }

    // -------------------------------------------------------------------------
    // Modules
    // -------------------------------------------------------------------------

    /// Module bytecode.
    pub fn get_module(&self, address: &AccountAddress, name: &Identifier) -> Result<Option<Vec<u8>>, StoreError> {
        self.get(&ResourceKey::Module {
            address: *address,
            name: name.clone(),
        })
    }

    /// Returns true if the module exists.
    pub fn has_module(&self, address: &AccountAddress, name: &Identifier) -> Result<bool, StoreError> {
        Ok(self.get_module(address, name)?.is_some())
    }

    /// Writes module bytecode.
    pub fn set_module(&self, address: &AccountAddress, name: &Identifier, code: &[u8]) -> Result<(), StoreError> {
        self.set(
            &ResourceKey::Module {
                address: *address,
                name: name.clone(),
            },
            code,
        )
    }

    /// Deletes a module.
    pub fn remove_module(&self, address: &AccountAddress, name: &Identifier) -> Result<(), StoreError> {
        self.remove(&ResourceKey::Module {
            address: *address,
            name: name.clone(),
        })
    }

    /// Returns true if any module was ever published.
    pub fn has_modules(&self) -> Result<bool, StoreError> {
        Ok(!self.modules(&PageRequest::first(1))?.items.is_empty())
    }

    /// Modules across all addresses, in key order.
    pub fn modules(&self, page: &PageRequest) -> Result<Page<Module>, StoreError> {
        self.scan(&[], page, |key, value| match key {
            ResourceKey::Module { address, name } => Some(Module {
                address,
                name,
                raw_bytes: value,
            }),
            _ => None,
        })
    }

    /// Upgrade policy of a module, re-read from the publisher's
    /// `0x1::code::MetadataStore` on every call.
    pub fn module_upgrade_policy(
        &self,
        address: &AccountAddress,
        name: &Identifier,
    ) -> Result<Option<UpgradePolicy>, StoreError> {
        let Some(raw_store) = self.get_resource(address, &metadata_store_tag()?)? else {
            debug!(%address, "No code metadata store");
            return Ok(None);
        };
        let store: MetadataStore = bcs::from_bytes(&raw_store)?;
        let entry_key = bcs::to_bytes(name.as_str())?;
        let Some(raw_meta) = self.get_table_entry(&store.metadata.handle, &entry_key)? else {
            return Ok(None);
        };
        let meta: ModuleMetadata = bcs::from_bytes(&raw_meta)?;
        UpgradePolicy::from_u8(meta.upgrade_policy)
            .map(Some)
            .ok_or_else(|| StoreError::Codec(format!("unknown upgrade policy {}", meta.upgrade_policy)))
    }

    // -------------------------------------------------------------------------
    // Resources
    // -------------------------------------------------------------------------

    /// Resource bytes.
    pub fn get_resource(&self, address: &AccountAddress, tag: &StructTag) -> Result<Option<Vec<u8>>, StoreError> {
        self.get(&ResourceKey::Resource {
            address: *address,
            struct_tag: tag.clone(),
        })
    }

    /// Returns true if the resource exists.
    pub fn has_resource(&self, address: &AccountAddress, tag: &StructTag) -> Result<bool, StoreError> {
        Ok(self.get_resource(address, tag)?.is_some())
    }

    /// Writes resource bytes.
    pub fn set_resource(&self, address: &AccountAddress, tag: &StructTag, value: &[u8]) -> Result<(), StoreError> {
        self.set(
            &ResourceKey::Resource {
                address: *address,
                struct_tag: tag.clone(),
            },
            value,
        )
    }

    /// Deletes a resource.
    pub fn remove_resource(&self, address: &AccountAddress, tag: &StructTag) -> Result<(), StoreError> {
        self.remove(&ResourceKey::Resource {
            address: *address,
            struct_tag: tag.clone(),
        })
    }

    /// Resources held by `address`, in key order.
    pub fn resources(
        &self,
        address: &AccountAddress,
        page: &PageRequest,
    ) -> Result<Page<(StructTag, Vec<u8>)>, StoreError> {
        self.scan(&Namespace::Resource.prefix(address), page, |key, value| match key {
            ResourceKey::Resource { struct_tag, .. } => Some((struct_tag, value)),
            _ => None,
        })
    }

    // -------------------------------------------------------------------------
    // Tables
    // -------------------------------------------------------------------------

    /// Table metadata bytes.
    pub fn get_table_info(&self, table: &AccountAddress) -> Result<Option<Vec<u8>>, StoreError> {
        self.get(&ResourceKey::TableInfo { table: *table })
    }

    /// Writes table metadata bytes.
    pub fn set_table_info(&self, table: &AccountAddress, info: &[u8]) -> Result<(), StoreError> {
        self.set(&ResourceKey::TableInfo { table: *table }, info)
    }

    /// Table entry bytes.
    pub fn get_table_entry(&self, table: &AccountAddress, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.get(&ResourceKey::TableEntry {
            table: *table,
            key: key.to_vec(),
        })
    }

    /// Writes a table entry.
    pub fn set_table_entry(&self, table: &AccountAddress, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.set(
            &ResourceKey::TableEntry {
                table: *table,
                key: key.to_vec(),
            },
            value,
        )
    }

    /// Deletes a table entry.
    pub fn remove_table_entry(&self, table: &AccountAddress, key: &[u8]) -> Result<(), StoreError> {
        self.remove(&ResourceKey::TableEntry {
            table: *table,
            key: key.to_vec(),
        })
    }

    /// Entries of one table, in key order.
    pub fn table_entries(
        &self,
        table: &AccountAddress,
        page: &PageRequest,
    ) -> Result<Page<(Vec<u8>, Vec<u8>)>, StoreError> {
        self.scan(&Namespace::TableEntry.prefix(table), page, |key, value| match key {
            ResourceKey::TableEntry { key, .. } => Some((key, value)),
            _ => None,
        })
    }

    // -------------------------------------------------------------------------
    // Execution counter
    // -------------------------------------------------------------------------

    /// Current execution counter.
    pub fn execution_counter(&self) -> Result<u64, StoreError> {
        match self.kv.get(EXECUTION_COUNTER_KEY)? {
            None => Ok(0),
            Some(raw) => {
                let bytes: [u8; 8] = raw
                    .as_slice()
                    .try_into()
                    .map_err(|_| StoreError::Codec(format!("execution counter has {} bytes", raw.len())))?;
                Ok(u64::from_be_bytes(bytes))
            }
        }
    }

    /// Overwrites the execution counter.
    pub fn set_execution_counter(&self, value: u64) -> Result<(), StoreError> {
        self.kv.set(EXECUTION_COUNTER_KEY, &value.to_be_bytes())
    }

    /// Increments and persists the execution counter, returning the new value.
    pub fn next_execution_counter(&self) -> Result<u64, StoreError> {
        let next = self.execution_counter()?.wrapping_add(1);
        self.set_execution_counter(next)?;
        Ok(next)
    }

    // -------------------------------------------------------------------------
    // Iteration
    // -------------------------------------------------------------------------

    /// Every VM entry with its decoded key, in key order.
    pub fn entries(&self) -> Result<Vec<(ResourceKey, Vec<u8>)>, StoreError> {
        self.iter_raw(&[])?
            .into_iter()
            .map(|(key, value)| Ok((ResourceKey::decode(&key)?, value)))
            .collect()
    }

    fn scan<T>(
        &self,
        prefix: &[u8],
        page: &PageRequest,
        mut select: impl FnMut(ResourceKey, Vec<u8>) -> Option<T>,
    ) -> Result<Page<T>, StoreError> {
        let limit = page.limit.unwrap_or(usize::MAX);
        let mut items = Vec::new();
        let mut last_key = None;
        let mut next_key = None;

        for (raw_key, value) in self.iter_raw(prefix)? {
            if page.start_after.as_ref().is_some_and(|after| raw_key <= *after) {
                continue;
            }
            let Some(item) = select(ResourceKey::decode(&raw_key)?, value) else {
                continue;
            };
            if items.len() == limit {
                next_key = last_key.take();
                break;
            }
            items.push(item);
            last_key = Some(raw_key);
        }
        Ok(Page { items, next_key })
    }
}

// =============================================================================
// VM STORE ADAPTER
// =============================================================================

/// The store view handed to the VM for one call.
///
/// Every access is charged to `meter` (the delegated infinite meter during
/// VM execution). In read-only mode writes land in a private overlay that is
/// dropped with the adapter.
pub struct VmStoreAdapter<'a> {
    store: &'a ResourceStore,
    meter: &'a mut dyn GasMeter,
    costs: KvGasConfig,
    overlay: Option<BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
}

impl<'a> VmStoreAdapter<'a> {
    /// Read-write view.
    pub fn new(store: &'a ResourceStore, meter: &'a mut dyn GasMeter, costs: KvGasConfig) -> Self {
        Self {
            store,
            meter,
            costs,
            overlay: None,
        }
    }

    /// View whose writes are discarded.
    pub fn read_only(store: &'a ResourceStore, meter: &'a mut dyn GasMeter, costs: KvGasConfig) -> Self {
        Self {
            store,
            meter,
            costs,
            overlay: Some(BTreeMap::new()),
        }
    }
}

impl VmStore for VmStoreAdapter<'_> {
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let value = match self.overlay.as_ref().and_then(|o| o.get(key)) {
            Some(buffered) => buffered.clone(),
            None => self.store.get_raw(key)?,
        };
        let len = key.len() + value.as_ref().map_or(0, Vec::len);
        self.meter.consume(self.costs.read_cost(len), "vm store read")?;
        Ok(value)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.meter
            .consume(self.costs.write_cost(key.len() + value.len()), "vm store write")?;
        match self.overlay.as_mut() {
            Some(overlay) => {
                overlay.insert(key.to_vec(), Some(value.to_vec()));
                Ok(())
            }
            None => self.store.set_raw(key, value),
        }
    }

    fn remove(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.meter.consume(self.costs.delete_cost, "vm store delete")?;
        match self.overlay.as_mut() {
            Some(overlay) => {
                overlay.insert(key.to_vec(), None);
                Ok(())
            }
            None => self.store.remove_raw(key),
        }
    }

    fn iter_prefix(&mut self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self.store.iter_raw(prefix)?.into_iter().collect();
        if let Some(overlay) = self.overlay.as_ref() {
            for (key, value) in overlay.range(prefix.to_vec()..).take_while(|(k, _)| k.starts_with(prefix)) {
                match value {
                    Some(value) => merged.insert(key.clone(), value.clone()),
                    None => merged.remove(key),
                };
            }
        }
        let steps = merged.len() as u64;
        self.meter.consume(
            self.costs.iter_next_cost_flat.saturating_mul(steps),
            "vm store iterate",
        )?;
        Ok(merged.into_iter().collect())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryKvStore;
    use crate::gas::InfiniteGasMeter;

    fn store() -> ResourceStore {
        ResourceStore::new(Arc::new(InMemoryKvStore::new()))
    }

    fn ident(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    fn addr(n: u8) -> AccountAddress {
        AccountAddress::from_hex_literal(&format!("0x{n:x}")).unwrap()
    }

    #[test]
    fn test_module_crud() {
        let store = store();
        assert!(!store.has_modules().unwrap());
        store.set_module(&addr(1), &ident("coin"), &[1, 2, 3]).unwrap();
        assert!(store.has_module(&addr(1), &ident("coin")).unwrap());
        assert_eq!(store.get_module(&addr(1), &ident("coin")).unwrap(), Some(vec![1, 2, 3]));
        assert!(store.has_modules().unwrap());

        store.remove_module(&addr(1), &ident("coin")).unwrap();
        assert!(store.get_module(&addr(1), &ident("coin")).unwrap().is_none());
    }

    #[test]
    fn test_execution_counter_is_monotonic() {
        let store = store();
        assert_eq!(store.execution_counter().unwrap(), 0);
        assert_eq!(store.next_execution_counter().unwrap(), 1);
        assert_eq!(store.next_execution_counter().unwrap(), 2);
        assert_eq!(store.execution_counter().unwrap(), 2);
    }

    #[test]
    fn test_counter_outside_vm_namespace() {
        let store = store();
        store.next_execution_counter().unwrap();
        assert!(store.entries().unwrap().is_empty());
    }

    #[test]
    fn test_modules_pagination() {
        let store = store();
        for name in ["a_mod", "b_mod", "c_mod"] {
            store.set_module(&addr(2), &ident(name), name.as_bytes()).unwrap();
        }
        store.set_resource(&addr(2), &StructTag::parse("0x1::m::R").unwrap(), &[9]).unwrap();

        let first = store.modules(&PageRequest::first(2)).unwrap();
        assert_eq!(first.items.len(), 2);
        let next = first.next_key.clone().expect("more modules remain");

        let second = store
            .modules(&PageRequest {
                start_after: Some(next),
                limit: Some(2),
            })
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].name, ident("c_mod"));
        assert!(second.next_key.is_none());
    }

    #[test]
    fn test_upgrade_policy_reread_from_metadata() {
        let store = store();
        let publisher = addr(2);
        let handle = AccountAddress::new([0xAB; 32]);
        let meta = MetadataStore {
            metadata: TableHandle { handle, length: 1 },
        };
        store
            .set_resource(&publisher, &metadata_store_tag().unwrap(), &bcs::to_bytes(&meta).unwrap())
            .unwrap();
        let entry_key = bcs::to_bytes("m").unwrap();
        let write_policy = |policy: UpgradePolicy| {
            let value = bcs::to_bytes(&ModuleMetadata {
                upgrade_policy: policy.as_u8(),
            })
            .unwrap();
            store.set_table_entry(&handle, &entry_key, &value).unwrap();
        };

        write_policy(UpgradePolicy::Compatible);
        assert_eq!(
            store.module_upgrade_policy(&publisher, &ident("m")).unwrap(),
            Some(UpgradePolicy::Compatible)
        );

        write_policy(UpgradePolicy::Immutable);
        assert_eq!(
            store.module_upgrade_policy(&publisher, &ident("m")).unwrap(),
            Some(UpgradePolicy::Immutable)
        );
        assert_eq!(store.module_upgrade_policy(&addr(3), &ident("m")).unwrap(), None);
    }

    #[test]
    fn test_read_only_adapter_discards_writes() {
        let store = store();
        let key = ResourceKey::TableInfo { table: addr(5) }.encode().unwrap();
        let mut meter = InfiniteGasMeter::new();
        {
            let mut view = VmStoreAdapter::read_only(&store, &mut meter, KvGasConfig::default());
            view.set(&key, &[1]).unwrap();
            assert_eq!(view.get(&key).unwrap(), Some(vec![1]));
            assert_eq!(view.iter_prefix(&[]).unwrap().len(), 1);
        }
        assert!(store.get_raw(&key).unwrap().is_none());
        assert!(meter.consumed() > 0);
    }

    #[test]
    fn test_adapter_charges_meter() {
        let store = store();
        let key = ResourceKey::TableInfo { table: addr(5) }.encode().unwrap();
        let mut meter = InfiniteGasMeter::new();
        let costs = KvGasConfig::default();
        let mut view = VmStoreAdapter::new(&store, &mut meter, costs);
        view.set(&key, &[1, 2]).unwrap();
        drop(view);
        assert_eq!(meter.consumed(), costs.write_cost(key.len() + 2));
        assert_eq!(store.get_raw(&key).unwrap(), Some(vec![1, 2]));
    }
}
