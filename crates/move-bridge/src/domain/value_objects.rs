//! # Value Objects
//!
//! Immutable domain primitives shared by the ledger and the Move VM.
//! These types represent concepts that are defined by their value, not identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Re-export U256 from primitive-types for coin arithmetic
pub use primitive_types::U256;

// =============================================================================
// ACCOUNT ADDRESS (32 bytes)
// =============================================================================

/// A 32-byte account address, canonical in both the ledger and the VM.
///
/// Ledger addresses may be shorter (20 bytes); they are left-padded with
/// zeros on the way in and stripped again on the way out.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct AccountAddress(pub [u8; 32]);

impl AccountAddress {
    /// Address width in bytes.
    pub const LENGTH: usize = 32;

    /// Width of a short (20 byte) ledger address.
    pub const SHORT_LENGTH: usize = 20;

    /// The zero address (0x0).
    pub const ZERO: Self = Self([0u8; 32]);

    /// The standard library address (0x1).
    pub const ONE: Self = Self::from_u8(1);

    const fn from_u8(value: u8) -> Self {
        let mut bytes = [0u8; 32];
        bytes[31] = value;
        Self(bytes)
    }

    /// Creates an address from a 32-byte array.
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Creates an address from an exact 32-byte slice.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() == Self::LENGTH {
            let mut bytes = [0u8; 32];
            bytes.copy_from_slice(slice);
            Some(Self(bytes))
        } else {
            None
        }
    }

    /// Maps ledger address bytes (any width up to 32) into the VM address
    /// space by left-padding with zeros.
    #[must_use]
    pub fn from_ledger_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() || bytes.len() > Self::LENGTH {
            return None;
        }
        let mut out = [0u8; 32];
        out[Self::LENGTH - bytes.len()..].copy_from_slice(bytes);
        Some(Self(out))
    }

    /// Maps back to ledger address bytes. Addresses whose first 12 bytes
    /// are zero are short ledger addresses and lose the padding.
    #[must_use]
    pub fn to_ledger_bytes(&self) -> Vec<u8> {
        let pad = Self::LENGTH - Self::SHORT_LENGTH;
        if self.0[..pad].iter().all(|b| *b == 0) {
            self.0[pad..].to_vec()
        } else {
            self.0.to_vec()
        }
    }

    /// Parses a hex literal (`0x1`, `0x0000..01`, or bare hex) into an address.
    #[must_use]
    pub fn from_hex_literal(literal: &str) -> Option<Self> {
        let digits = literal
            .strip_prefix("0x")
            .or_else(|| literal.strip_prefix("0X"))
            .unwrap_or(literal)
            .replace('_', "");
        if digits.is_empty() || digits.len() > Self::LENGTH * 2 {
            return None;
        }
        let padded = format!("{digits:0>64}");
        let bytes = hex::decode(padded).ok()?;
        Self::from_slice(&bytes)
    }

    /// Full 64-digit hex form with `0x` prefix.
    #[must_use]
    pub fn to_canonical_string(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Shortest hex form with `0x` prefix (`0x1` for the stdlib address).
    #[must_use]
    pub fn to_short_string(&self) -> String {
        let encoded = hex::encode(self.0);
        let trimmed = encoded.trim_start_matches('0');
        if trimmed.is_empty() {
            "0x0".to_string()
        } else {
            format!("0x{trimmed}")
        }
    }

    /// Returns the underlying bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns true if this is the standard library address.
    #[must_use]
    pub fn is_std(&self) -> bool {
        *self == Self::ONE
    }
}

impl fmt::Debug for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_short_string())
    }
}

impl FromStr for AccountAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex_literal(s).ok_or_else(|| format!("invalid address literal: {s}"))
    }
}

impl From<[u8; 32]> for AccountAddress {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

// =============================================================================
// HASH (32 bytes)
// =============================================================================

/// A 32-byte hash (transaction hash, session id).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// The zero hash.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Creates a hash from a 32-byte array.
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "...")?;
        for byte in &self.0[28..] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

// =============================================================================
// IDENTIFIER
// =============================================================================

/// A Move identifier (module, function or struct name).
///
/// Valid identifiers start with a letter or an underscore followed by at
/// least one more character, and continue with letters, digits or underscores.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Validates and wraps an identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if Self::is_valid(&value) {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Returns true if `value` is a well-formed identifier.
    #[must_use]
    pub fn is_valid(value: &str) -> bool {
        let mut chars = value.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() => {}
            Some('_') if value.len() > 1 => {}
            _ => return false,
        }
        chars.all(is_valid_identifier_char)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the identifier length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Identifiers are never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Returns true if `c` may appear after the first character of an identifier.
#[must_use]
pub fn is_valid_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// MODULE ID
// =============================================================================

/// Fully qualified module name: `address::name`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId {
    /// Publishing account.
    pub address: AccountAddress,
    /// Module name.
    pub name: Identifier,
}

impl ModuleId {
    /// Creates a new module id.
    #[must_use]
    pub fn new(address: AccountAddress, name: Identifier) -> Self {
        Self { address, name }
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.address, self.name)
    }
}

// =============================================================================
// DECIMAL (18 fractional digits)
// =============================================================================

/// Fixed-point decimal with 18 fractional digits.
///
/// Used for gas prices and the contract revenue ratio. All arithmetic
/// truncates toward zero.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Decimal(U256);

impl Decimal {
    /// Number of fractional digits.
    pub const PRECISION: usize = 18;

    /// Returns 10^18.
    #[must_use]
    pub fn scale() -> U256 {
        U256::exp10(Self::PRECISION)
    }

    /// Zero.
    #[must_use]
    pub fn zero() -> Self {
        Self(U256::zero())
    }

    /// One.
    #[must_use]
    pub fn one() -> Self {
        Self(Self::scale())
    }

    /// Creates a decimal from its raw (already scaled) representation.
    #[must_use]
    pub const fn from_atomics(raw: U256) -> Self {
        Self(raw)
    }

    /// Creates a decimal from an integer.
    #[must_use]
    pub fn from_integer(value: u64) -> Self {
        Self(U256::from(value) * Self::scale())
    }

    /// Raw scaled value.
    #[must_use]
    pub const fn atomics(&self) -> U256 {
        self.0
    }

    /// Returns true if zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Parses `"12"`, `"0.5"` or `"1.000000000000000000"`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let (int_part, frac_part) = match value.split_once('.') {
            Some((i, f)) => (i, f),
            None => (value, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if frac_part.len() > Self::PRECISION
            || !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return None;
        }
        let int_value = if int_part.is_empty() {
            U256::zero()
        } else {
            U256::from_dec_str(int_part).ok()?
        };
        let frac_value = if frac_part.is_empty() {
            U256::zero()
        } else {
            let padded = format!("{frac_part:0<18}");
            U256::from_dec_str(&padded).ok()?
        };
        let scaled = int_value.checked_mul(Self::scale())?.checked_add(frac_value)?;
        Some(Self(scaled))
    }

    /// Multiplies two decimals, truncating.
    #[must_use]
    pub fn checked_mul(&self, other: &Self) -> Option<Self> {
        self.0
            .checked_mul(other.0)
            .map(|product| Self(product / Self::scale()))
    }

    /// Multiplies by an integer and truncates to an integer.
    #[must_use]
    pub fn mul_floor(&self, value: u64) -> Option<U256> {
        self.0
            .checked_mul(U256::from(value))
            .map(|product| product / Self::scale())
    }
}

impl fmt::Debug for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = Self::scale();
        let int_part = self.0 / scale;
        let frac_part = self.0 % scale;
        write!(f, "{int_part}.{:0>18}", frac_part.to_string())
    }
}

impl FromStr for Decimal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid decimal: {s}"))
    }
}

impl Serialize for Decimal {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid decimal: {raw}")))
    }
}

// =============================================================================
// COINS
// =============================================================================

/// An amount of a single denomination.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Coin {
    /// Denomination.
    pub denom: String,
    /// Amount in base units.
    pub amount: U256,
}

impl Coin {
    /// Creates a coin.
    #[must_use]
    pub fn new(denom: impl Into<String>, amount: impl Into<U256>) -> Self {
        Self {
            denom: denom.into(),
            amount: amount.into(),
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// A set of coins, one entry per denomination, sorted by denom.
///
/// ## Invariants
/// - No zero amounts are stored
/// - Denominations are unique and sorted
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct Coins(Vec<Coin>);

impl Coins {
    /// Empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Builds a set from arbitrary coins, merging duplicates.
    #[must_use]
    pub fn from_coins(coins: impl IntoIterator<Item = Coin>) -> Self {
        let mut set = Self::new();
        for coin in coins {
            set.add(coin);
        }
        set
    }

    /// Adds a coin, merging with an existing entry of the same denom.
    pub fn add(&mut self, coin: Coin) {
        if coin.amount.is_zero() {
            return;
        }
        match self.0.binary_search_by(|c| c.denom.as_str().cmp(&coin.denom)) {
            Ok(idx) => self.0[idx].amount = self.0[idx].amount.saturating_add(coin.amount),
            Err(idx) => self.0.insert(idx, coin),
        }
    }

    /// Amount held of `denom`.
    #[must_use]
    pub fn amount_of(&self, denom: &str) -> U256 {
        self.0
            .iter()
            .find(|c| c.denom == denom)
            .map_or_else(U256::zero, |c| c.amount)
    }

    /// Returns true if the set holds nothing.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the coins in denom order.
    pub fn iter(&self) -> impl Iterator<Item = &Coin> {
        self.0.iter()
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join(","))
    }
}

impl From<Coin> for Coins {
    fn from(coin: Coin) -> Self {
        Self::from_coins([coin])
    }
}

/// A decimal amount of a single denomination (gas prices).
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct DecCoin {
    /// Denomination.
    pub denom: String,
    /// Decimal amount.
    pub amount: Decimal,
}

impl DecCoin {
    /// Creates a decimal coin.
    #[must_use]
    pub fn new(denom: impl Into<String>, amount: Decimal) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_ledger_mapping_roundtrip() {
        let short = [7u8; 20];
        let addr = AccountAddress::from_ledger_bytes(&short).unwrap();
        assert_eq!(&addr.0[..12], &[0u8; 12]);
        assert_eq!(addr.to_ledger_bytes(), short.to_vec());

        let long = [9u8; 32];
        let addr = AccountAddress::from_ledger_bytes(&long).unwrap();
        assert_eq!(addr.to_ledger_bytes(), long.to_vec());
    }

    #[test]
    fn test_address_ledger_mapping_rejects_oversized() {
        assert!(AccountAddress::from_ledger_bytes(&[1u8; 33]).is_none());
        assert!(AccountAddress::from_ledger_bytes(&[]).is_none());
    }

    #[test]
    fn test_address_hex_literal() {
        assert_eq!(AccountAddress::from_hex_literal("0x1"), Some(AccountAddress::ONE));
        assert_eq!(AccountAddress::ONE.to_string(), "0x1");
        assert_eq!(AccountAddress::ZERO.to_string(), "0x0");
        assert!(AccountAddress::from_hex_literal("0xzz").is_none());
        assert!(AccountAddress::ONE.is_std());
    }

    #[test]
    fn test_identifier_validation() {
        assert!(Identifier::new("coin").is_some());
        assert!(Identifier::new("_private").is_some());
        assert!(Identifier::new("_").is_none());
        assert!(Identifier::new("").is_none());
        assert!(Identifier::new("1abc").is_none());
        assert!(Identifier::new("a-b").is_none());
    }

    #[test]
    fn test_decimal_parse_and_display() {
        let half = Decimal::parse("0.5").unwrap();
        assert_eq!(half.to_string(), "0.500000000000000000");
        assert_eq!(Decimal::parse("2").unwrap(), Decimal::from_integer(2));
        assert!(Decimal::parse("1.0000000000000000001").is_none());
        assert!(Decimal::parse("abc").is_none());
        assert!(Decimal::parse(".").is_none());
    }

    #[test]
    fn test_decimal_mul_floor() {
        let price = Decimal::parse("0.15").unwrap();
        // 0.15 * 7 = 1.05 -> 1
        assert_eq!(price.mul_floor(7), Some(U256::from(1)));
        let ratio = Decimal::parse("0.5").unwrap();
        let product = price.checked_mul(&ratio).unwrap();
        assert_eq!(product, Decimal::parse("0.075").unwrap());
    }

    #[test]
    fn test_coins_merge_and_skip_zero() {
        let mut coins = Coins::new();
        coins.add(Coin::new("uinit", 10u64));
        coins.add(Coin::new("uatom", 5u64));
        coins.add(Coin::new("uinit", 3u64));
        coins.add(Coin::new("ueth", 0u64));

        assert_eq!(coins.amount_of("uinit"), U256::from(13));
        let denoms: Vec<_> = coins.iter().map(|c| c.denom.clone()).collect();
        assert_eq!(denoms, vec!["uatom".to_string(), "uinit".to_string()]);
    }
}
