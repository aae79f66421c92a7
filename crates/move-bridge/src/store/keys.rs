//! Resource key layout.
//!
//! `address(32) || separator(1) || suffix`, where the suffix depends on the
//! namespace:
//!
//! | Namespace  | Separator | Suffix                      |
//! |------------|-----------|-----------------------------|
//! | Module     | `0x00`    | BCS module name             |
//! | Resource   | `0x01`    | BCS struct tag              |
//! | TableEntry | `0x02`    | raw (BCS) application key   |
//! | TableInfo  | `0x03`    | empty                       |
//!
//! Every suffix is a BCS value, so suffixes are prefix-free within a
//! namespace and range iteration never mixes entries of different keys.

use crate::domain::type_tag::StructTag;
use crate::domain::value_objects::{AccountAddress, Identifier};
use crate::errors::StoreError;

/// Prefix of every VM-owned key in the host store.
pub const VM_STORE_PREFIX: u8 = 0x21;

/// Host-store key of the execution counter, outside the VM namespace.
pub const EXECUTION_COUNTER_KEY: &[u8] = &[0x11];

/// The four disjoint VM namespaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    /// Published modules.
    Module,
    /// Resources.
    Resource,
    /// Table entries.
    TableEntry,
    /// Table metadata.
    TableInfo,
}

impl Namespace {
    /// Separator byte written after the address.
    #[must_use]
    pub const fn separator(self) -> u8 {
        match self {
            Self::Module => 0x00,
            Self::Resource => 0x01,
            Self::TableEntry => 0x02,
            Self::TableInfo => 0x03,
        }
    }

    /// Decodes a separator byte.
    #[must_use]
    pub const fn from_separator(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Module),
            0x01 => Some(Self::Resource),
            0x02 => Some(Self::TableEntry),
            0x03 => Some(Self::TableInfo),
            _ => None,
        }
    }

    /// Key prefix of this namespace under `address`.
    #[must_use]
    pub fn prefix(self, address: &AccountAddress) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(AccountAddress::LENGTH + 1);
        prefix.extend_from_slice(address.as_bytes());
        prefix.push(self.separator());
        prefix
    }
}

/// A decoded VM store key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    /// A module.
    Module {
        /// Publishing account.
        address: AccountAddress,
        /// Module name.
        name: Identifier,
    },
    /// A resource.
    Resource {
        /// Owning account.
        address: AccountAddress,
        /// Resource type.
        struct_tag: StructTag,
    },
    /// A table entry.
    TableEntry {
        /// Table handle address.
        table: AccountAddress,
        /// Encoded application key.
        key: Vec<u8>,
    },
    /// Table metadata.
    TableInfo {
        /// Table handle address.
        table: AccountAddress,
    },
}

impl ResourceKey {
    /// Address the key lives under.
    #[must_use]
    pub fn address(&self) -> AccountAddress {
        match self {
            Self::Module { address, .. } | Self::Resource { address, .. } => *address,
            Self::TableEntry { table, .. } | Self::TableInfo { table } => *table,
        }
    }

    /// Namespace of the key.
    #[must_use]
    pub fn namespace(&self) -> Namespace {
        match self {
            Self::Module { .. } => Namespace::Module,
            Self::Resource { .. } => Namespace::Resource,
            Self::TableEntry { .. } => Namespace::TableEntry,
            Self::TableInfo { .. } => Namespace::TableInfo,
        }
    }

    /// Encodes the key.
    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        let mut bytes = self.namespace().prefix(&self.address());
        match self {
            Self::Module { name, .. } => bytes.extend(bcs::to_bytes(name)?),
            Self::Resource { struct_tag, .. } => bytes.extend(bcs::to_bytes(struct_tag)?),
            Self::TableEntry { key, .. } => bytes.extend_from_slice(key),
            Self::TableInfo { .. } => {}
        }
        Ok(bytes)
    }

    /// Decodes a key produced by [`ResourceKey::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        if bytes.len() <= AccountAddress::LENGTH {
            return Err(StoreError::InvalidKey(format!(
                "key too short: {} bytes",
                bytes.len()
            )));
        }
        let (addr_bytes, rest) = bytes.split_at(AccountAddress::LENGTH);
        let address = AccountAddress::from_slice(addr_bytes)
            .ok_or_else(|| StoreError::InvalidKey("bad address".into()))?;
        let namespace = Namespace::from_separator(rest[0])
            .ok_or_else(|| StoreError::InvalidKey(format!("unknown separator 0x{:02x}", rest[0])))?;
        let suffix = &rest[1..];

        match namespace {
            Namespace::Module => {
                let raw: String = bcs::from_bytes(suffix)?;
                let name = Identifier::new(raw.clone())
                    .ok_or_else(|| StoreError::InvalidKey(format!("invalid module name: {raw}")))?;
                Ok(Self::Module { address, name })
            }
            Namespace::Resource => Ok(Self::Resource {
                address,
                struct_tag: bcs::from_bytes(suffix)?,
            }),
            Namespace::TableEntry => Ok(Self::TableEntry {
                table: address,
                key: suffix.to_vec(),
            }),
            Namespace::TableInfo if suffix.is_empty() => Ok(Self::TableInfo { table: address }),
            Namespace::TableInfo => Err(StoreError::InvalidKey("table info key with suffix".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> AccountAddress {
        AccountAddress::new([n; 32])
    }

    #[test]
    fn test_module_key_layout() {
        let key = ResourceKey::Module {
            address: AccountAddress::ONE,
            name: Identifier::new("coin").unwrap(),
        };
        let bytes = key.encode().unwrap();
        assert_eq!(&bytes[..32], AccountAddress::ONE.as_bytes());
        assert_eq!(bytes[32], 0x00);
        // uleb128 length then utf8
        assert_eq!(&bytes[33..], &[4, b'c', b'o', b'i', b'n']);
        assert_eq!(ResourceKey::decode(&bytes).unwrap(), key);
    }

    #[test]
    fn test_every_namespace_decodes_back() {
        let keys = vec![
            ResourceKey::Resource {
                address: addr(2),
                struct_tag: StructTag::parse("0x1::coin::CoinStore<0x1::native_uinit::Coin>").unwrap(),
            },
            ResourceKey::TableEntry {
                table: addr(3),
                key: bcs::to_bytes(&7u64).unwrap(),
            },
            ResourceKey::TableInfo { table: addr(4) },
        ];
        for key in keys {
            let bytes = key.encode().unwrap();
            assert_eq!(bytes[32], key.namespace().separator());
            assert_eq!(ResourceKey::decode(&bytes).unwrap(), key);
        }
    }

    #[test]
    fn test_namespaces_are_disjoint_prefixes() {
        let a = Namespace::Module.prefix(&addr(1));
        let b = Namespace::Resource.prefix(&addr(1));
        assert!(!a.starts_with(&b) && !b.starts_with(&a));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(ResourceKey::decode(&[0u8; 10]).is_err());
        let mut bad = addr(1).as_bytes().to_vec();
        bad.push(0x09);
        assert!(ResourceKey::decode(&bad).is_err());
        let mut trailing = Namespace::TableInfo.prefix(&addr(1));
        trailing.push(1);
        assert!(ResourceKey::decode(&trailing).is_err());
    }
}
