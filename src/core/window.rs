//! Emulated address space window.
//!
//! Emulated memory is addressed with 32-bit big-endian addresses. On 64-bit
//! hosts every access generated by the engine runs the address through three
//! ranges: the zero page, main RAM and a masked fallback for kernel data.
//! 32-bit hosts map everything linearly from `ram_base`.

/// A constant of the window that templates can embed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowField {
    ZeroPageLimit,
    ZeroPageBase,
    RamLimit,
    RamBase,
    FallbackMask,
    FallbackBase,
}

/// Mapping from emulated addresses to host addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressWindow {
    /// Addresses below this go to `zero_page_base + addr`.
    pub zero_page_limit: u32,
    pub zero_page_base: usize,
    /// Addresses below this (and not in the zero page) go to `ram_base + addr`.
    pub ram_limit: u32,
    pub ram_base: usize,
    /// Everything else goes to `fallback_base + (addr & fallback_mask)`.
    pub fallback_mask: u32,
    pub fallback_base: usize,
}

impl AddressWindow {
    /// A window mapping every address to `base + addr`.
    pub fn flat(base: usize) -> Self {
        Self {
            zero_page_limit: 0,
            zero_page_base: base,
            ram_limit: u32::MAX,
            ram_base: base,
            fallback_mask: u32::MAX,
            fallback_base: base,
        }
    }

    /// Host address of emulated address `addr`, as the 64-bit templates compute it.
    pub fn resolve(&self, addr: u32) -> usize {
        if addr < self.zero_page_limit {
            self.zero_page_base.wrapping_add(addr as usize)
        } else if addr < self.ram_limit {
            self.ram_base.wrapping_add(addr as usize)
        } else {
            self.fallback_base
                .wrapping_add((addr & self.fallback_mask) as usize)
        }
    }

    pub fn value(&self, field: WindowField) -> u64 {
        match field {
            WindowField::ZeroPageLimit => self.zero_page_limit as u64,
            WindowField::ZeroPageBase => self.zero_page_base as u64,
            WindowField::RamLimit => self.ram_limit as u64,
            WindowField::RamBase => self.ram_base as u64,
            WindowField::FallbackMask => self.fallback_mask as u64,
            WindowField::FallbackBase => self.fallback_base as u64,
        }
    }
}

impl Default for AddressWindow {
    fn default() -> Self {
        Self::flat(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_window_is_linear() {
        let window = AddressWindow::flat(0x1000);
        assert_eq!(window.resolve(0), 0x1000);
        assert_eq!(window.resolve(0x1234_5678), 0x1234_6678);
    }

    #[test]
    fn three_ranges() {
        let window = AddressWindow {
            zero_page_limit: 0x3000,
            zero_page_base: 0x10_0000,
            ram_limit: 0x5fff_e000,
            ram_base: 0x2000_0000,
            fallback_mask: 0x1fff,
            fallback_base: 0x40_0000,
        };
        assert_eq!(window.resolve(0x2fff), 0x10_2fff);
        assert_eq!(window.resolve(0x3000), 0x2000_3000);
        assert_eq!(window.resolve(0x6800_0010), 0x40_0010);
    }
}
