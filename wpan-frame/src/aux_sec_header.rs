//! Auxiliary Security Header readers and writers.

use crate::{Error, Result};

/// The security level of a frame, from the Security Control field.
#[derive(Debug, Eq, PartialEq, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum SecurityLevel {
    /// No security.
    #[default]
    None = 0,
    /// Authentication with a 32-bit MIC.
    Mic32 = 1,
    /// Authentication with a 64-bit MIC.
    Mic64 = 2,
    /// Authentication with a 128-bit MIC.
    Mic128 = 3,
    /// Encryption without authentication.
    Enc = 4,
    /// Encryption and authentication with a 32-bit MIC.
    EncMic32 = 5,
    /// Encryption and authentication with a 64-bit MIC.
    EncMic64 = 6,
    /// Encryption and authentication with a 128-bit MIC.
    EncMic128 = 7,
}

impl From<u8> for SecurityLevel {
    fn from(value: u8) -> Self {
        match value & 0b111 {
            0 => Self::None,
            1 => Self::Mic32,
            2 => Self::Mic64,
            3 => Self::Mic128,
            4 => Self::Enc,
            5 => Self::EncMic32,
            6 => Self::EncMic64,
            _ => Self::EncMic128,
        }
    }
}

impl From<SecurityLevel> for u8 {
    fn from(value: SecurityLevel) -> Self {
        value as u8
    }
}

impl SecurityLevel {
    /// Return the length of the message integrity code in octets.
    pub const fn mic_length(&self) -> usize {
        match self {
            Self::None | Self::Enc => 0,
            Self::Mic32 | Self::EncMic32 => 4,
            Self::Mic64 | Self::EncMic64 => 8,
            Self::Mic128 | Self::EncMic128 => 16,
        }
    }

    /// Returns `true` when the payload is encrypted.
    pub const fn encrypts(&self) -> bool {
        (*self as u8) & 0b100 != 0
    }

    /// Returns `true` when the frame carries a MIC.
    pub const fn authenticates(&self) -> bool {
        self.mic_length() != 0
    }
}

/// The key identifier mode of the Security Control field.
#[derive(Debug, Eq, PartialEq, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum KeyIdMode {
    /// The key is determined implicitly from the originator and recipient.
    #[default]
    Implicit = 0,
    /// The key is determined from a 1-octet key index.
    Index = 1,
    /// 4-octet key source and a key index.
    Source4Index = 2,
    /// 8-octet key source and a key index.
    Source8Index = 3,
}

impl From<u8> for KeyIdMode {
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0 => Self::Implicit,
            1 => Self::Index,
            2 => Self::Source4Index,
            _ => Self::Source8Index,
        }
    }
}

impl KeyIdMode {
    /// Return the size of the Key Identifier field in octets.
    pub const fn key_identifier_length(&self) -> usize {
        match self {
            Self::Implicit => 0,
            Self::Index => 1,
            Self::Source4Index => 5,
            Self::Source8Index => 9,
        }
    }
}

/// A reader/writer for the IEEE 802.15.4 Auxiliary Security Header.
#[derive(Debug)]
pub struct AuxiliarySecurityHeader<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> AuxiliarySecurityHeader<T> {
    /// Create a new reader, checking that the buffer holds the complete
    /// header described by its Security Control field.
    pub fn new(buffer: T) -> Result<Self> {
        let h = Self::new_unchecked(buffer);

        if !h.check_len() {
            return Err(Error);
        }

        Ok(h)
    }

    /// Returns `false` if the buffer is too short.
    pub fn check_len(&self) -> bool {
        let b = self.buffer.as_ref();
        !b.is_empty() && b.len() >= self.len()
    }

    /// Create a new reader without length checking.
    pub fn new_unchecked(buffer: T) -> Self {
        Self { buffer }
    }

    /// Return the length of the header in octets.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        1 + if self.frame_counter_suppression() {
            0
        } else {
            4
        } + self.key_id_mode().key_identifier_length()
    }

    /// Return the security level field.
    pub fn security_level(&self) -> SecurityLevel {
        SecurityLevel::from(self.buffer.as_ref()[0])
    }

    /// Return the key identifier mode field.
    pub fn key_id_mode(&self) -> KeyIdMode {
        KeyIdMode::from(self.buffer.as_ref()[0] >> 3)
    }

    /// Returns `true` when the frame counter is suppressed.
    pub fn frame_counter_suppression(&self) -> bool {
        (self.buffer.as_ref()[0] >> 5) & 0b1 == 1
    }

    /// Returns `true` when the ASN is used in the nonce instead of the frame
    /// counter.
    pub fn asn_in_nonce(&self) -> bool {
        (self.buffer.as_ref()[0] >> 6) & 0b1 == 1
    }

    /// Return the frame counter, unless suppressed.
    pub fn frame_counter(&self) -> Option<u32> {
        if self.frame_counter_suppression() {
            return None;
        }

        let b = &self.buffer.as_ref()[1..][..4];
        Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn key_identifier(&self) -> &[u8] {
        let offset = if self.frame_counter_suppression() {
            1
        } else {
            5
        };
        &self.buffer.as_ref()[offset..][..self.key_id_mode().key_identifier_length()]
    }

    /// Return the key source, empty for the implicit and index modes.
    pub fn key_source(&self) -> &[u8] {
        let id = self.key_identifier();
        if id.is_empty() {
            id
        } else {
            &id[..id.len() - 1]
        }
    }

    /// Return the key index, if the key identifier mode carries one.
    pub fn key_index(&self) -> Option<u8> {
        self.key_identifier().last().copied()
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> AuxiliarySecurityHeader<T> {
    /// Set the Security Control field.
    pub fn set_security_control(
        &mut self,
        level: SecurityLevel,
        key_id_mode: KeyIdMode,
        frame_counter_suppression: bool,
    ) {
        self.buffer.as_mut()[0] =
            level as u8 | ((key_id_mode as u8) << 3) | ((frame_counter_suppression as u8) << 5);
    }

    /// Set the frame counter.
    pub fn set_frame_counter(&mut self, frame_counter: u32) {
        self.buffer.as_mut()[1..][..4].copy_from_slice(&frame_counter.to_le_bytes());
    }
}

impl<T: AsRef<[u8]>> core::fmt::Display for AuxiliarySecurityHeader<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Auxiliary Security Header")?;
        writeln!(f, "  security level: {:?}", self.security_level())?;
        writeln!(f, "  key id mode: {:?}", self.key_id_mode())?;
        if let Some(counter) = self.frame_counter() {
            writeln!(f, "  frame counter: {counter}")?;
        }
        if let Some(index) = self.key_index() {
            writeln!(f, "  key index: {index}")?;
        }
        Ok(())
    }
}

/// The Key Identifier field.
#[derive(Debug, Eq, PartialEq, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum KeyIdentifier {
    /// No key identifier.
    #[default]
    Implicit,
    /// Key index only.
    Index(u8),
    /// 4-octet key source and key index.
    Source4 {
        /// Key source.
        source: [u8; 4],
        /// Key index.
        index: u8,
    },
    /// 8-octet key source and key index.
    Source8 {
        /// Key source.
        source: [u8; 8],
        /// Key index.
        index: u8,
    },
}

impl KeyIdentifier {
    /// Return the key identifier mode matching this identifier.
    pub fn mode(&self) -> KeyIdMode {
        match self {
            Self::Implicit => KeyIdMode::Implicit,
            Self::Index(_) => KeyIdMode::Index,
            Self::Source4 { .. } => KeyIdMode::Source4Index,
            Self::Source8 { .. } => KeyIdMode::Source8Index,
        }
    }
}

/// A high-level representation of the Auxiliary Security Header.
#[derive(Debug, Eq, PartialEq, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub struct AuxSecurityHeaderRepr {
    /// Security level.
    pub security_level: SecurityLevel,
    /// Frame counter, `None` when suppressed.
    pub frame_counter: Option<u32>,
    /// Key identifier.
    pub key_identifier: KeyIdentifier,
}

impl AuxSecurityHeaderRepr {
    /// Parse the header from a reader.
    pub fn parse<T: AsRef<[u8]>>(header: &AuxiliarySecurityHeader<T>) -> Self {
        let source = header.key_source();
        let index = header.key_index().unwrap_or(0);
        let key_identifier = match header.key_id_mode() {
            KeyIdMode::Implicit => KeyIdentifier::Implicit,
            KeyIdMode::Index => KeyIdentifier::Index(index),
            KeyIdMode::Source4Index => {
                let mut s = [0u8; 4];
                s.copy_from_slice(source);
                KeyIdentifier::Source4 { source: s, index }
            }
            KeyIdMode::Source8Index => {
                let mut s = [0u8; 8];
                s.copy_from_slice(source);
                KeyIdentifier::Source8 { source: s, index }
            }
        };

        Self {
            security_level: header.security_level(),
            frame_counter: header.frame_counter(),
            key_identifier,
        }
    }

    /// Return the length of the header when emitted.
    pub fn buffer_len(&self) -> usize {
        1 + if self.frame_counter.is_some() { 4 } else { 0 }
            + self.key_identifier.mode().key_identifier_length()
    }

    /// Emit the header into `buffer`.
    pub fn emit(&self, buffer: &mut [u8]) {
        let mut header = AuxiliarySecurityHeader::new_unchecked(&mut buffer[..]);
        header.set_security_control(
            self.security_level,
            self.key_identifier.mode(),
            self.frame_counter.is_none(),
        );

        let mut offset = 1;
        if let Some(counter) = self.frame_counter {
            header.set_frame_counter(counter);
            offset += 4;
        }

        match self.key_identifier {
            KeyIdentifier::Implicit => {}
            KeyIdentifier::Index(index) => buffer[offset] = index,
            KeyIdentifier::Source4 { source, index } => {
                buffer[offset..][..4].copy_from_slice(&source);
                buffer[offset + 4] = index;
            }
            KeyIdentifier::Source8 { source, index } => {
                buffer[offset..][..8].copy_from_slice(&source);
                buffer[offset + 8] = index;
            }
        }
    }
}
