//! Addresses and address ranges.
//!
//! Addresses are the values recorded by the debug store: relative virtual
//! addresses for PE images and standalone PDBs, link-time virtual addresses
//! for ELF and Mach-O images.

use std::fmt;
use std::ops::{Add, Sub};

/// Strongly typed address
///
/// Keeps addresses from being mixed up with lengths, offsets, and other `u64`
/// values that flow through the record store.
///
/// ## Example
///
/// ```rust
/// use symscope_core::types::Address;
///
/// let addr = Address::from(0x1000);
/// assert_eq!((addr + 0x10).value(), 0x1010);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The zero address.
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value.
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address.
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Add an offset, returning `None` on overflow.
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Subtract an offset, returning `None` on underflow.
    pub fn checked_sub(self, offset: u64) -> Option<Self>
    {
        self.0.checked_sub(offset).map(Address)
    }

    /// Add an offset, saturating at `u64::MAX`.
    pub fn saturating_add(self, offset: u64) -> Self
    {
        Address(self.0.saturating_add(offset))
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
        write!(f, "0x{:08x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}

/// Half-open address range `[start, start + length)`.
///
/// A zero-length range contains nothing; lookups treat zero-length symbols
/// separately (they only match their exact start address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddressRange
{
    start: Address,
    length: u64,
}

impl AddressRange
{
    /// Create a range from a start address and a length in bytes.
    pub const fn new(start: Address, length: u64) -> Self
    {
        Self { start, length }
    }

    /// First address of the range.
    pub const fn start(&self) -> Address
    {
        self.start
    }

    /// Length in bytes.
    pub const fn length(&self) -> u64
    {
        self.length
    }

    /// One past the last address, saturating at `u64::MAX`.
    pub fn end(&self) -> Address
    {
        self.start.saturating_add(self.length)
    }

    /// Whether `address` falls inside the range.
    pub fn contains(&self, address: Address) -> bool
    {
        address >= self.start && address < self.end()
    }

    /// Whether the range is empty.
    pub const fn is_empty(&self) -> bool
    {
        self.length == 0
    }
}

impl fmt::Display for AddressRange
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "[{}, {})", self.start, self.end())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_range_contains_is_half_open()
    {
        let range = AddressRange::new(Address::new(0x1000), 0x20);
        assert!(range.contains(Address::new(0x1000)));
        assert!(range.contains(Address::new(0x101f)));
        assert!(!range.contains(Address::new(0x1020)));
        assert!(!range.contains(Address::new(0xfff)));
        assert_eq!(range.end(), Address::new(0x1020));
    }

    #[test]
    fn test_empty_range_contains_nothing()
    {
        let range = AddressRange::new(Address::new(0x40), 0);
        assert!(range.is_empty());
        assert!(!range.contains(Address::new(0x40)));
    }

    #[test]
    fn test_range_end_saturates()
    {
        let range = AddressRange::new(Address::new(u64::MAX - 1), 16);
        assert_eq!(range.end(), Address::new(u64::MAX));
    }
}
