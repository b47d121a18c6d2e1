//! Beacon payload readers: superframe specification, GTS fields and pending
//! addresses.

use wpan_macros::frame;

use crate::{Address, AddressingMode, Error, Result};

#[frame]
#[derive(Debug)]
/// A reader/writer for the Superframe Specification field.
pub struct SuperframeSpecification {
    /// Return the beacon order field value.
    #[bits(4)]
    #[into(BeaconOrder)]
    beacon_order: u8,
    /// Return the superframe order field value.
    #[bits(4)]
    #[into(SuperframeOrder)]
    superframe_order: u8,
    /// Return the final cap slot field value.
    #[bits(4)]
    final_cap_slot: u8,
    /// Return the battery life extension field value.
    #[bits(1)]
    battery_life_extension: bool,
    #[bits(1)]
    _reserved: bool,
    /// Return the PAN coordinator field value.
    #[bits(1)]
    pan_coordinator: bool,
    /// Return the association permit field value.
    #[bits(1)]
    association_permit: bool,
}

/// Indicates the frequency at which the beacon is transmitted.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BeaconOrder {
    /// The beacon is transmitted at an interval:
    /// `base_super_frame_duration * 2^{beacon_order}`.
    Order(u8),
    /// The beacon is transmitted on demand.
    OnDemand,
}

impl From<u8> for BeaconOrder {
    fn from(value: u8) -> Self {
        match value {
            value @ 0..=14 => Self::Order(value),
            _ => Self::OnDemand,
        }
    }
}

impl From<BeaconOrder> for u8 {
    fn from(value: BeaconOrder) -> Self {
        match value {
            BeaconOrder::Order(value) => value,
            BeaconOrder::OnDemand => 15,
        }
    }
}

/// The length of the active portion of the superframe.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SuperframeOrder {
    /// The superframe duration is `base_super_frame_duration *
    /// 2^{superframe_order}`.
    Order(u8),
    /// The superframe is inactive after the beacon.
    Inactive,
}

impl From<u8> for SuperframeOrder {
    fn from(value: u8) -> Self {
        match value {
            value @ 0..=14 => Self::Order(value),
            _ => Self::Inactive,
        }
    }
}

impl From<SuperframeOrder> for u8 {
    fn from(value: SuperframeOrder) -> Self {
        match value {
            SuperframeOrder::Order(value) => value,
            SuperframeOrder::Inactive => 15,
        }
    }
}

#[frame]
#[derive(Debug)]
/// Guaranteed Time Slot specification.
pub struct GtsSpecification {
    /// GTS descriptor count.
    #[bits(3)]
    descriptor_count: u8,
    #[bits(4)]
    _reserved: u8,
    /// GTS is permitted.
    #[bits(1)]
    gts_permit: bool,
}

#[frame]
#[derive(Debug)]
/// Guaranteed Time Slot descriptor.
pub struct GtsDescriptor {
    /// Short address of the intended device, as transmitted.
    short_address: u16,
    /// Superframe slot at which the GTS is to begin.
    #[bits(4)]
    starting_slot: u8,
    /// Number of contiguous superframe slots over which the GTS is active.
    #[bits(4)]
    length: u8,
}

impl<T: AsRef<[u8]>> GtsDescriptor<T> {
    /// Return the short address of the descriptor.
    pub fn address(&self) -> Address {
        Address::from_short(self.short_address())
    }
}

/// GTS direction.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GtsDirection {
    /// GTS Receive direction.
    Receive,
    /// GTS Transmit direction.
    Transmit,
}

impl From<u8> for GtsDirection {
    fn from(value: u8) -> Self {
        match value {
            0b0 => Self::Transmit,
            _ => Self::Receive,
        }
    }
}

/// A GTS slot, with the direction taken from the GTS directions field.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GtsSlot {
    /// Device the slot is allocated to.
    pub address: Address,
    /// First superframe slot.
    pub starting_slot: u8,
    /// Number of slots.
    pub length: u8,
    /// Direction relative to the device.
    pub direction: GtsDirection,
}

/// An [`Iterator`] over GTS slots.
pub struct GtsSlotIterator<'f> {
    directions: u8,
    descriptors: &'f [u8],
    index: u8,
}

impl Iterator for GtsSlotIterator<'_> {
    type Item = GtsSlot;

    fn next(&mut self) -> Option<Self::Item> {
        let size = GtsDescriptor::<&[u8]>::size();
        let raw = self.descriptors.get(self.index as usize * size..)?;
        let descriptor = GtsDescriptor::new(raw).ok()?;

        let slot = GtsSlot {
            address: descriptor.address(),
            starting_slot: descriptor.starting_slot(),
            length: descriptor.length(),
            direction: GtsDirection::from((self.directions >> self.index) & 0b1),
        };
        self.index += 1;
        Some(slot)
    }
}

#[frame]
#[derive(Debug)]
/// Pending Address Specification field.
pub struct PendingAddressSpecification {
    /// Number of short addresses pending.
    #[bits(3)]
    short_address_pending: u8,
    #[bits(1)]
    _reserved: bool,
    /// Number of extended addresses pending.
    #[bits(3)]
    extended_address_pending: u8,
    #[bits(1)]
    _reserved_2: bool,
}

/// An [`Iterator`] over pending addresses, short addresses first.
pub struct PendingAddressIterator<'f> {
    data: &'f [u8],
    short_addresses: u8,
    extended_addresses: u8,
}

impl Iterator for PendingAddressIterator<'_> {
    type Item = Address;

    fn next(&mut self) -> Option<Self::Item> {
        let mode = if self.short_addresses > 0 {
            self.short_addresses -= 1;
            AddressingMode::Short
        } else if self.extended_addresses > 0 {
            self.extended_addresses -= 1;
            AddressingMode::Extended
        } else {
            return None;
        };

        let address = Address::from_wire(mode, self.data)?;
        self.data = &self.data[mode.size()..];
        Some(address)
    }
}

/// A reader for the MAC payload of a beacon frame.
pub struct BeaconPayload<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> BeaconPayload<T> {
    /// Create a new reader, checking every variably sized field against the
    /// buffer length.
    pub fn new(buffer: T) -> Result<Self> {
        let b = Self::new_unchecked(buffer);

        if !b.check_len() {
            return Err(Error);
        }

        Ok(b)
    }

    /// Create a new reader without length checking.
    pub fn new_unchecked(buffer: T) -> Self {
        Self { buffer }
    }

    /// Returns `false` if a field runs past the end of the buffer.
    pub fn check_len(&self) -> bool {
        let len = self.buffer.as_ref().len();

        if len < 3 {
            return false;
        }

        if len < self.gts_len() + 3 {
            return false;
        }

        len >= self.pending_address_offset() + 1 + self.pending_addresses_len()
    }

    fn gts_len(&self) -> usize {
        let count = self.gts_specification().descriptor_count() as usize;
        if count == 0 {
            1
        } else {
            2 + count * GtsDescriptor::<&[u8]>::size()
        }
    }

    fn pending_address_offset(&self) -> usize {
        2 + self.gts_len()
    }

    fn pending_addresses_len(&self) -> usize {
        let spec = self.pending_address_specification();
        spec.short_address_pending() as usize * 2 + spec.extended_address_pending() as usize * 8
    }

    /// Return the Superframe Specification field.
    pub fn superframe_specification(&self) -> SuperframeSpecification<&[u8]> {
        SuperframeSpecification::new_unchecked(&self.buffer.as_ref()[..2])
    }

    /// Return the GTS Specification field.
    pub fn gts_specification(&self) -> GtsSpecification<&[u8]> {
        GtsSpecification::new_unchecked(&self.buffer.as_ref()[2..3])
    }

    /// Return an iterator over the GTS slots.
    pub fn gts_slots(&self) -> GtsSlotIterator<'_> {
        let count = self.gts_specification().descriptor_count() as usize;
        if count == 0 {
            return GtsSlotIterator {
                directions: 0,
                descriptors: &[],
                index: 0,
            };
        }

        let b = &self.buffer.as_ref()[3..];
        GtsSlotIterator {
            directions: b[0],
            descriptors: &b[1..][..count * GtsDescriptor::<&[u8]>::size()],
            index: 0,
        }
    }

    /// Return the Pending Address Specification field.
    pub fn pending_address_specification(&self) -> PendingAddressSpecification<&[u8]> {
        PendingAddressSpecification::new_unchecked(
            &self.buffer.as_ref()[self.pending_address_offset()..][..1],
        )
    }

    /// Return an iterator over the pending addresses.
    pub fn pending_addresses(&self) -> PendingAddressIterator<'_> {
        let spec = self.pending_address_specification();
        PendingAddressIterator {
            data: &self.buffer.as_ref()[self.pending_address_offset() + 1..]
                [..self.pending_addresses_len()],
            short_addresses: spec.short_address_pending(),
            extended_addresses: spec.extended_address_pending(),
        }
    }

    /// Return the beacon payload following the pending addresses.
    pub fn payload(&self) -> &[u8] {
        &self.buffer.as_ref()[self.pending_address_offset() + 1 + self.pending_addresses_len()..]
    }
}

impl<T: AsRef<[u8]>> core::fmt::Display for BeaconPayload<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sf = self.superframe_specification();
        writeln!(f, "Superframe Specification")?;
        writeln!(f, "  beacon order: {:?}", sf.beacon_order())?;
        writeln!(f, "  superframe order: {:?}", sf.superframe_order())?;
        writeln!(f, "  final cap slot: {}", sf.final_cap_slot())?;
        writeln!(f, "  battery life extension: {}", sf.battery_life_extension() as usize)?;
        writeln!(f, "  pan coordinator: {}", sf.pan_coordinator() as usize)?;
        writeln!(f, "  association permit: {}", sf.association_permit() as usize)?;

        writeln!(f, "GTS")?;
        writeln!(f, "  permit: {}", self.gts_specification().gts_permit() as usize)?;
        for slot in self.gts_slots() {
            writeln!(
                f,
                "  slot: {} start {} length {} {:?}",
                slot.address, slot.starting_slot, slot.length, slot.direction
            )?;
        }

        writeln!(f, "Pending Addresses")?;
        for address in self.pending_addresses() {
            writeln!(f, "  {address}")?;
        }

        Ok(())
    }
}

/// A writer for a minimal beacon payload: superframe specification, no GTS
/// and no pending addresses.
pub fn emit_beacon_payload(
    buffer: &mut [u8],
    beacon_order: BeaconOrder,
    superframe_order: SuperframeOrder,
    pan_coordinator: bool,
    association_permit: bool,
) -> Result<usize> {
    if buffer.len() < 4 {
        return Err(Error);
    }

    buffer[..4].fill(0);
    let mut sf = SuperframeSpecification::new_unchecked(&mut buffer[..2]);
    sf.set_beacon_order(beacon_order);
    sf.set_superframe_order(superframe_order);
    sf.set_final_cap_slot(15);
    sf.set_pan_coordinator(pan_coordinator);
    sf.set_association_permit(association_permit);

    Ok(4)
}
