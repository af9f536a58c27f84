//! Program address types.

use std::fmt;
use std::str::FromStr;

use crate::error::IndexError;

/// Strongly typed program (file-relative) address
///
/// Addresses handed to `Catalog::lookup` are the addresses the debug
/// information itself uses, before any load bias is applied.
///
/// ```rust
/// use symdex_core::types::Address;
///
/// let addr: Address = "0x1000".parse().unwrap();
/// assert_eq!(addr.value(), 0x1000);
/// assert_eq!("4096".parse::<Address>().unwrap(), addr);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// Create a new address from a `u64` value
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl FromStr for Address
{
    type Err = IndexError;

    /// Parse `0x`-prefixed hexadecimal or plain decimal.
    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let trimmed = s.trim();
        let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => trimmed.parse::<u64>(),
        };
        parsed
            .map(Address)
            .map_err(|err| IndexError::InvalidArgument(format!("invalid address {s:?}: {err}")))
    }
}

/// Half-open address range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddressRange
{
    pub start: Address,
    pub end: Address,
}

impl AddressRange
{
    pub fn new(start: u64, end: u64) -> Self
    {
        Self {
            start: Address(start),
            end: Address(end),
        }
    }

    pub fn is_empty(&self) -> bool
    {
        self.end <= self.start
    }

    pub fn contains(&self, address: Address) -> bool
    {
        address >= self.start && address < self.end
    }
}

impl fmt::Display for AddressRange
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
