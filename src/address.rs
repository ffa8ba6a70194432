use crate::error::{Error, Result};
use serde::Serialize;

/// `VirtualAddress` is a type that represents the components of a virtual memory address in a
/// single structure: the virtual page number, the offset within that page, and the number of low
/// bits the offset occupies for the page size it was decoded with.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualAddress {
    pub address: u64,
    pub number_page: u64,
    pub number_offset: u64,
    pub offset_bits: u32,
}

impl VirtualAddress {
    /// Provided an address and a page size in bytes, split the address into its virtual page
    /// number and page offset.
    ///
    /// # Arguments
    ///
    /// * `address` - the raw virtual address, which must not be negative
    /// * `page_size` - page size in bytes, which must be a non-zero power of two
    ///
    /// # Examples
    ///
    /// ```
    /// use memory_visualizer_sim::address::VirtualAddress;
    /// let page_size = 4 * 1024 * 1024;
    /// let decoded = VirtualAddress::decode(0x3F24A, page_size).unwrap();
    /// assert_eq!(decoded.offset_bits, 22);
    /// assert_eq!(decoded.number_page, 0);
    /// assert_eq!(decoded.number_offset, 0x3F24A);
    /// ```
    ///
    /// # Errors
    ///
    /// `Error::InvalidInput` when the address is negative or the page size is not a power of two.
    pub fn decode(address: i64, page_size: u64) -> Result<Self> {
        if address < 0 {
            return Err(Error::InvalidInput(format!(
                "Virtual address {} must be a non-negative integer",
                address
            )));
        }
        if !page_size.is_power_of_two() {
            return Err(Error::InvalidInput(format!(
                "Page size {} must be a non-zero power of two",
                page_size
            )));
        }

        let address = address as u64;
        let offset_bits = page_size.trailing_zeros();
        Ok(Self {
            address,
            number_page: address >> offset_bits,
            number_offset: address & (page_size - 1),
            offset_bits,
        })
    }

    /// Physical address for this offset once the page is known to live in frame `ppn`.
    pub fn physical(&self, ppn: u64) -> u64 {
        (ppn << self.offset_bits) | self.number_offset
    }
}

impl std::fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VA(0x{:X}) = (vpn={}, offset=0x{:X}, offset_bits={})",
            self.address, self.number_page, self.number_offset, self.offset_bits
        )
    }
}
