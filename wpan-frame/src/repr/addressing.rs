use crate::{Address, AddressingFields};

/// A high-level representation of the IEEE 802.15.4 Addressing Fields.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub struct AddressingFieldsRepr {
    /// Destination PAN identifier.
    pub dst_pan_id: Option<u16>,
    /// Destination address.
    pub dst_address: Option<Address>,
    /// Source PAN identifier.
    pub src_pan_id: Option<u16>,
    /// Source address.
    pub src_address: Option<Address>,
}

impl AddressingFieldsRepr {
    /// Parse the Addressing Fields.
    pub fn parse<T: AsRef<[u8]>>(addressing: &AddressingFields<T>) -> Self {
        let present = |a: Address| if a.is_empty() { None } else { Some(a) };

        Self {
            dst_pan_id: addressing.dst_pan_id(),
            dst_address: present(addressing.dst_address()),
            src_pan_id: addressing.src_pan_id(),
            src_address: present(addressing.src_address()),
        }
    }

    /// Return the length of the Addressing Fields in octets.
    pub fn buffer_len(&self) -> usize {
        self.dst_pan_id.map(|_| 2).unwrap_or(0)
            + self.dst_address.map(|a| a.len()).unwrap_or(0)
            + self.src_pan_id.map(|_| 2).unwrap_or(0)
            + self.src_address.map(|a| a.len()).unwrap_or(0)
    }

    /// Emit the Addressing Fields into `buffer`.
    pub fn emit(&self, buffer: &mut [u8]) {
        let mut offset = 0;

        if let Some(id) = self.dst_pan_id {
            buffer[offset..][..2].copy_from_slice(&id.to_le_bytes());
            offset += 2;
        }

        if let Some(addr) = self.dst_address {
            addr.emit(&mut buffer[offset..]);
            offset += addr.len();
        }

        if let Some(id) = self.src_pan_id {
            buffer[offset..][..2].copy_from_slice(&id.to_le_bytes());
            offset += 2;
        }

        if let Some(addr) = self.src_address {
            addr.emit(&mut buffer[offset..]);
        }
    }
}
