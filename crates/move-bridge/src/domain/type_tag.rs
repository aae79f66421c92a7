//! # Type Tags
//!
//! The VM's type-tag representation and a parser for the human-readable form
//! (`u64`, `vector<u8>`, `0x1::coin::Coin<0x1::native::Token>`).
//!
//! Variant order of [`TypeTag`] is part of the binary format: BCS encodes the
//! variant index, so it must stay aligned with the VM.

use crate::domain::value_objects::{is_valid_identifier_char, AccountAddress, Identifier};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Peekable;
use std::str::FromStr;
use thiserror::Error;

const MAX_TYPE_DEPTH: usize = 128;
const MAX_TYPE_NODE_COUNT: usize = 256;

/// Failure to parse a type tag or struct tag.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid type tag '{input}': {reason}")]
pub struct TypeTagError {
    /// Text that failed to parse.
    pub input: String,
    /// What went wrong.
    pub reason: String,
}

// =============================================================================
// TYPE TAG
// =============================================================================

/// A fully instantiated Move type.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeTag {
    /// `bool`
    Bool,
    /// `u8`
    U8,
    /// `u64`
    U64,
    /// `u128`
    U128,
    /// `address`
    Address,
    /// `signer`
    Signer,
    /// `vector<T>`
    Vector(Box<TypeTag>),
    /// A struct type.
    Struct(Box<StructTag>),
    /// `u16`
    U16,
    /// `u32`
    U32,
    /// `u256`
    U256,
}

impl TypeTag {
    /// Parses a type tag from its textual form.
    pub fn parse(input: &str) -> Result<Self, TypeTagError> {
        let mut parser = TagParser::new(input)?;
        let tag = parser.parse_type(0)?;
        parser.expect_end()?;
        Ok(tag)
    }
}

impl FromStr for TypeTag {
    type Err = TypeTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::U8 => write!(f, "u8"),
            Self::U16 => write!(f, "u16"),
            Self::U32 => write!(f, "u32"),
            Self::U64 => write!(f, "u64"),
            Self::U128 => write!(f, "u128"),
            Self::U256 => write!(f, "u256"),
            Self::Address => write!(f, "address"),
            Self::Signer => write!(f, "signer"),
            Self::Vector(inner) => write!(f, "vector<{inner}>"),
            Self::Struct(tag) => write!(f, "{tag}"),
        }
    }
}

// =============================================================================
// STRUCT TAG
// =============================================================================

/// A fully instantiated struct type: `address::module::Name<T...>`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StructTag {
    /// Defining account.
    pub address: AccountAddress,
    /// Defining module.
    pub module: Identifier,
    /// Struct name.
    pub name: Identifier,
    /// Type arguments.
    pub type_args: Vec<TypeTag>,
}

impl StructTag {
    /// Parses a struct tag from its textual form.
    pub fn parse(input: &str) -> Result<Self, TypeTagError> {
        match TypeTag::parse(input)? {
            TypeTag::Struct(tag) => Ok(*tag),
            other => Err(TypeTagError {
                input: input.to_string(),
                reason: format!("expected struct tag, got '{other}'"),
            }),
        }
    }
}

impl FromStr for StructTag {
    type Err = TypeTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for StructTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for StructTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.address, self.module, self.name)?;
        if let Some((first, rest)) = self.type_args.split_first() {
            write!(f, "<{first}")?;
            for arg in rest {
                write!(f, ", {arg}")?;
            }
            write!(f, ">")?;
        }
        Ok(())
    }
}

// =============================================================================
// TOKENIZER
// =============================================================================

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum Token {
    Ident,
    Address,
    ColonColon,
    Lt,
    Gt,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ident => "[identifier]",
            Self::Address => "[address]",
            Self::ColonColon => "::",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Comma => ",",
        };
        f.write_str(s)
    }
}

fn tokenize(input: &str) -> Result<Vec<(Token, &str)>, String> {
    let mut tokens = Vec::new();
    let mut rest = input;
    while let Some(c) = rest.chars().next() {
        let (token, len) = match c {
            '<' => (Some(Token::Lt), 1),
            '>' => (Some(Token::Gt), 1),
            ',' => (Some(Token::Comma), 1),
            ':' if rest.starts_with("::") => (Some(Token::ColonColon), 2),
            '0' if rest.starts_with("0x") || rest.starts_with("0X") => {
                let digits = rest[2..]
                    .chars()
                    .take_while(|q| q.is_ascii_hexdigit() || *q == '_')
                    .count();
                if digits == 0 {
                    return Err(format!("unrecognized token: {rest}"));
                }
                (Some(Token::Address), 2 + digits)
            }
            c if c.is_ascii_whitespace() => {
                let len = rest.chars().take_while(char::is_ascii_whitespace).count();
                (None, len)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let len = rest.chars().take_while(|q| is_valid_identifier_char(*q)).count();
                (Some(Token::Ident), len)
            }
            _ => return Err(format!("unrecognized token: {rest}")),
        };
        if let Some(token) = token {
            tokens.push((token, &rest[..len]));
        }
        rest = &rest[len..];
    }
    Ok(tokens)
}

// =============================================================================
// PARSER
// =============================================================================

struct TagParser<'a> {
    input: &'a str,
    count: usize,
    it: Peekable<std::vec::IntoIter<(Token, &'a str)>>,
}

impl<'a> TagParser<'a> {
    fn new(input: &'a str) -> Result<Self, TypeTagError> {
        let tokens = tokenize(input).map_err(|reason| TypeTagError {
            input: input.to_string(),
            reason,
        })?;
        Ok(Self {
            input,
            count: 0,
            it: tokens.into_iter().peekable(),
        })
    }

    fn error(&self, reason: impl Into<String>) -> TypeTagError {
        TypeTagError {
            input: self.input.to_string(),
            reason: reason.into(),
        }
    }

    fn expect_end(&mut self) -> Result<(), TypeTagError> {
        match self.it.next() {
            Some((tok, _)) => Err(self.error(format!("unexpected token '{tok}', expected end of input"))),
            None => Ok(()),
        }
    }

    fn advance_any(&mut self) -> Result<(Token, &'a str), TypeTagError> {
        self.it
            .next()
            .ok_or_else(|| self.error("unexpected end of tokens"))
    }

    fn advance(&mut self, expected: Token) -> Result<&'a str, TypeTagError> {
        let (tok, contents) = self.advance_any()?;
        if tok == expected {
            Ok(contents)
        } else {
            Err(self.error(format!("expected token {expected}, got {tok}")))
        }
    }

    fn identifier(&mut self) -> Result<Identifier, TypeTagError> {
        let contents = self.advance(Token::Ident)?;
        Identifier::new(contents).ok_or_else(|| self.error(format!("invalid identifier '{contents}'")))
    }

    fn parse_type(&mut self, depth: usize) -> Result<TypeTag, TypeTagError> {
        self.count += 1;
        if depth > MAX_TYPE_DEPTH || self.count > MAX_TYPE_NODE_COUNT {
            return Err(self.error("type exceeds maximum nesting depth or node count"));
        }

        Ok(match self.advance_any()? {
            (Token::Ident, "bool") => TypeTag::Bool,
            (Token::Ident, "u8") => TypeTag::U8,
            (Token::Ident, "u16") => TypeTag::U16,
            (Token::Ident, "u32") => TypeTag::U32,
            (Token::Ident, "u64") => TypeTag::U64,
            (Token::Ident, "u128") => TypeTag::U128,
            (Token::Ident, "u256") => TypeTag::U256,
            (Token::Ident, "address") => TypeTag::Address,
            (Token::Ident, "signer") => TypeTag::Signer,
            (Token::Ident, "vector") => {
                self.advance(Token::Lt)?;
                let inner = self.parse_type(depth + 1)?;
                self.advance(Token::Gt)?;
                TypeTag::Vector(Box::new(inner))
            }
            (Token::Address, contents) => {
                let address = AccountAddress::from_hex_literal(contents)
                    .ok_or_else(|| self.error(format!("invalid address '{contents}'")))?;
                self.advance(Token::ColonColon)?;
                let module = self.identifier()?;
                self.advance(Token::ColonColon)?;
                let name = self.identifier()?;
                let type_args = if matches!(self.it.peek(), Some((Token::Lt, _))) {
                    self.parse_type_args(depth + 1)?
                } else {
                    Vec::new()
                };
                TypeTag::Struct(Box::new(StructTag {
                    address,
                    module,
                    name,
                    type_args,
                }))
            }
            (tok, contents) => {
                return Err(self.error(format!("unexpected token '{tok}' ({contents}), expected type")))
            }
        })
    }

    fn parse_type_args(&mut self, depth: usize) -> Result<Vec<TypeTag>, TypeTagError> {
        self.advance(Token::Lt)?;
        let mut args = Vec::new();
        loop {
            if matches!(self.it.peek(), Some((Token::Gt, _))) {
                break;
            }
            args.push(self.parse_type(depth)?);
            match self.advance_any()? {
                (Token::Comma, _) => continue,
                (Token::Gt, _) => {
                    if args.is_empty() {
                        return Err(self.error("empty type argument list"));
                    }
                    return Ok(args);
                }
                (tok, _) => return Err(self.error(format!("expected ',' or '>', got {tok}"))),
            }
        }
        // trailing comma or empty list
        self.advance(Token::Gt)?;
        if args.is_empty() {
            return Err(self.error("empty type argument list"));
        }
        Ok(args)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_primitives() {
        assert_eq!(TypeTag::parse("u64").unwrap(), TypeTag::U64);
        assert_eq!(TypeTag::parse(" bool ").unwrap(), TypeTag::Bool);
        assert_eq!(
            TypeTag::parse("vector<vector<u8>>").unwrap(),
            TypeTag::Vector(Box::new(TypeTag::Vector(Box::new(TypeTag::U8))))
        );
    }

    #[test]
    fn test_parse_struct_with_args() {
        let tag = StructTag::parse("0x1::coin::Coin<0x1::native_uinit::Token, u8>").unwrap();
        assert_eq!(tag.address, AccountAddress::ONE);
        assert_eq!(tag.module.as_str(), "coin");
        assert_eq!(tag.name.as_str(), "Coin");
        assert_eq!(tag.type_args.len(), 2);
        assert_eq!(tag.to_string(), "0x1::coin::Coin<0x1::native_uinit::Token, u8>");
    }

    #[test]
    fn test_parse_trailing_comma_allowed() {
        let tag = StructTag::parse("0x1::m::S<u8,>").unwrap();
        assert_eq!(tag.type_args, vec![TypeTag::U8]);
    }

    #[test]
    fn test_parse_negative() {
        for input in [
            "",
            "vector<>",
            "vector<u8",
            "0x1::m",
            "0x1::m::S<>",
            "0x::m::S",
            "u64 u8",
            "0x1::m::_",
            "foo",
            "0x1::m::S<u8>>",
        ] {
            assert!(TypeTag::parse(input).is_err(), "{input} should not parse");
        }
    }

    #[test]
    fn test_struct_tag_rejects_primitive() {
        let err = StructTag::parse("u64").unwrap_err();
        assert!(err.reason.contains("expected struct tag"));
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}u8{}", "vector<".repeat(200), ">".repeat(200));
        assert!(TypeTag::parse(&deep).is_err());
    }

    #[test]
    fn test_bcs_variant_indices() {
        // The VM encodes u16 after struct: index 8
        assert_eq!(bcs::to_bytes(&TypeTag::U16).unwrap(), vec![8]);
        assert_eq!(bcs::to_bytes(&TypeTag::Address).unwrap(), vec![4]);
    }
}
