//! Construction of outgoing data and MAC command frames from the PIB.
use crate::frame::{Address, CommandRepr, FrameBuilder, FrameVersion, MTU};
use crate::mac::pib::Pib;
use crate::mac::Error;
use crate::security::{encrypt_auth, CcmCipher};

/// A frame written into a buffer, without FCS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Emitted {
    pub len: usize,
    /// Sequence number to wait an acknowledgment for.
    pub ack_request: Option<u8>,
}

/// Header and MIC lengths of data frames to `dst`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overhead {
    pub header_len: usize,
    pub mic_len: usize,
}

impl Overhead {
    /// Room left for the MAC payload.
    pub fn capacity(&self) -> usize {
        MTU - crate::frame::FCS_LENGTH - self.header_len - self.mic_len
    }
}

fn secures(pib: &Pib, dst: &Address) -> bool {
    // Frames to every device are sent in the clear.
    pib.security.is_enabled() && !dst.is_broadcast()
}

/// Plain frames use the 2003 format; the auxiliary security header needs
/// 2006.
fn frame_version(secured: bool) -> FrameVersion {
    if secured {
        FrameVersion::Ieee802154_2006
    } else {
        FrameVersion::Ieee802154_2003
    }
}

fn data_builder<'p>(
    pib: &Pib,
    dst: Address,
    payload: &'p [u8],
) -> FrameBuilder<'p, crate::frame::Data> {
    let secured = secures(pib, &dst);
    let src = if secured {
        // The receiver needs our extended address for the nonce.
        Address::Extended(pib.extended_address)
    } else {
        pib.source_address()
    };

    let builder = FrameBuilder::new_data(payload)
        .set_frame_version(frame_version(secured))
        .set_ack_request(pib.ack_requested && !dst.is_broadcast())
        .set_dst_pan_id(pib.pan_id)
        .set_dst_address(dst)
        .set_src_pan_id(pib.pan_id)
        .set_src_address(src);

    if secured {
        builder.set_security(pib.security.aux_header())
    } else {
        if pib.security.is_enabled() {
            debug!("broadcast frames are not secured");
        }
        builder
    }
}

/// Sizes of the MAC header and MIC of a data frame to `dst`.
pub fn data_frame_overhead(pib: &Pib, dst: Address) -> Result<Overhead, Error> {
    if dst.is_empty() {
        return Err(Error::InvalidAddress);
    }
    let repr = data_builder(pib, dst, &[])
        .set_sequence_number(pib.sequence_number)
        .finalize()
        .map_err(|_| Error::InvalidAddress)?;
    Ok(Overhead {
        header_len: repr.header_len(),
        mic_len: repr.mic_len(),
    })
}

/// Write a data frame carrying `payload` to `dst` into `buffer`, secured
/// when security is enabled and `dst` is not the broadcast address.
pub fn create_data_frame<K: CcmCipher>(
    pib: &mut Pib,
    cipher: &mut K,
    dst: Address,
    payload: &[u8],
    buffer: &mut [u8],
) -> Result<Emitted, Error> {
    if dst.is_empty() {
        return Err(Error::InvalidAddress);
    }
    let sequence_number = pib.next_sequence_number();
    let repr = data_builder(pib, dst, payload)
        .set_sequence_number(sequence_number)
        .finalize()
        .map_err(|_| Error::FrameTooLong)?;
    let len = repr.emit(buffer).map_err(|_| Error::FrameTooLong)?;

    if repr.aux_security_header.is_some() {
        let extended_address = pib.extended_address;
        encrypt_auth(
            &mut pib.security,
            cipher,
            &mut buffer[..len],
            repr.header_len(),
            payload.len(),
            &extended_address,
        )?;
    }

    Ok(Emitted {
        len,
        ack_request: repr
            .frame_control
            .ack_request
            .then_some(sequence_number),
    })
}

/// Addressing of a MAC command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandAddressing {
    pub dst_pan_id: u16,
    pub dst: Address,
    pub src_pan_id: u16,
    pub src: Address,
}

/// Write a MAC command frame into `buffer`. Commands are never secured.
pub fn create_mac_cmd_frame(
    pib: &mut Pib,
    command: CommandRepr,
    addressing: CommandAddressing,
    ack_request: bool,
    buffer: &mut [u8],
) -> Result<Emitted, Error> {
    let mut payload = [0u8; 16];
    let payload = &mut payload[..command.buffer_len()];
    command.emit(payload);

    let sequence_number = pib.next_sequence_number();
    let mut builder = FrameBuilder::new_mac_command(payload)
        .set_frame_version(frame_version(false))
        .set_sequence_number(sequence_number)
        .set_ack_request(ack_request)
        .set_dst_pan_id(addressing.dst_pan_id)
        .set_dst_address(addressing.dst);
    if !addressing.src.is_empty() {
        builder = builder
            .set_src_pan_id(addressing.src_pan_id)
            .set_src_address(addressing.src);
    }
    let repr = builder.finalize().map_err(|_| Error::InvalidAddress)?;
    let len = repr.emit(buffer).map_err(|_| Error::FrameTooLong)?;

    Ok(Emitted {
        len,
        ack_request: ack_request.then_some(sequence_number),
    })
}
