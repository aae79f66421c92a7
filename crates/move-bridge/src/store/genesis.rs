//! Genesis import and export of the VM namespaces.
//!
//! The JSON form carries bytes as hex strings and struct tags in their
//! textual form.

use super::keys::ResourceKey;
use super::ResourceStore;
use crate::domain::type_tag::StructTag;
use crate::domain::value_objects::{AccountAddress, Identifier};
use crate::errors::StoreError;
use serde::{Deserialize, Serialize};
use tracing::info;

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        hex::decode(raw.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

/// A module in genesis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisModule {
    /// Publishing account.
    pub address: AccountAddress,
    /// Module name.
    pub module_name: String,
    /// Bytecode.
    #[serde(with = "hex_bytes")]
    pub raw_bytes: Vec<u8>,
}

/// A resource in genesis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisResource {
    /// Owning account.
    pub address: AccountAddress,
    /// Struct tag, textual form.
    pub struct_tag: String,
    /// BCS value.
    #[serde(with = "hex_bytes")]
    pub raw_bytes: Vec<u8>,
}

/// Table metadata in genesis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisTableInfo {
    /// Table handle address.
    pub address: AccountAddress,
    /// BCS value.
    #[serde(with = "hex_bytes")]
    pub raw_bytes: Vec<u8>,
}

/// A table entry in genesis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisTableEntry {
    /// Table handle address.
    pub address: AccountAddress,
    /// Encoded key.
    #[serde(with = "hex_bytes")]
    pub key_bytes: Vec<u8>,
    /// Encoded value.
    #[serde(with = "hex_bytes")]
    pub value_bytes: Vec<u8>,
}

/// Exported VM state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisState {
    /// Execution counter.
    pub execution_counter: u64,
    /// Modules.
    pub modules: Vec<GenesisModule>,
    /// Resources.
    pub resources: Vec<GenesisResource>,
    /// Table infos.
    pub table_infos: Vec<GenesisTableInfo>,
    /// Table entries.
    pub table_entries: Vec<GenesisTableEntry>,
}

impl GenesisState {
    /// Parses the JSON form.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        serde_json::from_str(json).map_err(|e| StoreError::Codec(e.to_string()))
    }

    /// Renders the JSON form.
    pub fn to_json(&self) -> Result<String, StoreError> {
        serde_json::to_string_pretty(self).map_err(|e| StoreError::Codec(e.to_string()))
    }

    /// Returns true if nothing but the counter is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
            && self.resources.is_empty()
            && self.table_infos.is_empty()
            && self.table_entries.is_empty()
    }
}

impl ResourceStore {
    /// Writes every entry of `state`. Validates names and tags first so a
    /// bad entry writes nothing. The execution counter never moves
    /// backwards: the larger of the stored and imported values wins.
    pub fn import_genesis(&self, state: &GenesisState) -> Result<(), StoreError> {
        let mut writes: Vec<(ResourceKey, &[u8])> = Vec::new();

        for module in &state.modules {
            let name = Identifier::new(module.module_name.clone()).ok_or_else(|| {
                StoreError::InvalidKey(format!("invalid module name: {}", module.module_name))
            })?;
            writes.push((
                ResourceKey::Module {
                    address: module.address,
                    name,
                },
                &module.raw_bytes,
            ));
        }
        for resource in &state.resources {
            let struct_tag = StructTag::parse(&resource.struct_tag)
                .map_err(|e| StoreError::InvalidKey(e.to_string()))?;
            writes.push((
                ResourceKey::Resource {
                    address: resource.address,
                    struct_tag,
                },
                &resource.raw_bytes,
            ));
        }
        for info in &state.table_infos {
            writes.push((ResourceKey::TableInfo { table: info.address }, &info.raw_bytes));
        }
        for entry in &state.table_entries {
            writes.push((
                ResourceKey::TableEntry {
                    table: entry.address,
                    key: entry.key_bytes.clone(),
                },
                &entry.value_bytes,
            ));
        }

        let encoded = writes
            .into_iter()
            .map(|(key, value)| Ok((key.encode()?, value)))
            .collect::<Result<Vec<_>, StoreError>>()?;
        for (key, value) in &encoded {
            self.set_raw(key, value)?;
        }
        let counter = self.execution_counter()?.max(state.execution_counter);
        self.set_execution_counter(counter)?;

        info!(
            modules = state.modules.len(),
            resources = state.resources.len(),
            table_infos = state.table_infos.len(),
            table_entries = state.table_entries.len(),
            "Imported Move genesis state"
        );
        Ok(())
    }

    /// Reads every VM entry back out, in key order.
    pub fn export_genesis(&self) -> Result<GenesisState, StoreError> {
        let mut state = GenesisState {
            execution_counter: self.execution_counter()?,
            ..GenesisState::default()
        };
        for (key, value) in self.entries()? {
            match key {
                ResourceKey::Module { address, name } => state.modules.push(GenesisModule {
                    address,
                    module_name: name.as_str().to_string(),
                    raw_bytes: value,
                }),
                ResourceKey::Resource { address, struct_tag } => state.resources.push(GenesisResource {
                    address,
                    struct_tag: struct_tag.to_string(),
                    raw_bytes: value,
                }),
                ResourceKey::TableInfo { table } => state.table_infos.push(GenesisTableInfo {
                    address: table,
                    raw_bytes: value,
                }),
                ResourceKey::TableEntry { table, key } => state.table_entries.push(GenesisTableEntry {
                    address: table,
                    key_bytes: key,
                    value_bytes: value,
                }),
            }
        }
        Ok(state)
    }
}
