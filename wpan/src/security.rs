//! CCM* authentication and encryption of MAC frames.
//!
//! The nonce is the extended source address, the big-endian frame counter and
//! the security level. MIC-only levels authenticate header and payload,
//! ENC-MIC levels authenticate the header and encrypt the payload. The MIC
//! follows the payload.
//!
//! Encryption without authentication ([`SecurityLevel::Enc`]) is refused, as
//! are key identifier modes other than implicit.

use heapless::Vec;

use crate::frame::{AuxSecurityHeaderRepr, KeyIdMode, KeyIdentifier, SecurityLevel};

/// Length of the CCM* nonce.
pub const NONCE_LENGTH: usize = 13;
/// Length of the largest supported key.
pub const MAX_KEY_LENGTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Encryption without authentication.
    Unsupported,
    /// Only the implicit key identifier mode is supported.
    UnsupportedKeyMode,
    /// The frame counter reached `0xffffffff`; a new key is needed.
    CounterExhausted,
    /// The frame was secured with another level than ours.
    LevelMismatch,
    /// No key is configured.
    NoKey,
    /// The key is longer than [`MAX_KEY_LENGTH`] or empty.
    InvalidKey,
    /// The frame can not hold header, payload and MIC.
    InvalidLength,
    /// The MIC did not match.
    AuthenticationFailed,
    /// The cipher backend failed.
    Cipher,
}

/// A CCM cipher backend, usually an AES peripheral.
pub trait CcmCipher {
    /// Load a key, and set the MIC length for the following operations.
    fn begin_session(&mut self, key: &[u8], tag_len: usize) -> Result<(), Error>;

    /// Encrypt `payload` in place and write the MIC over `aad` and `payload`
    /// into `tag`.
    fn encrypt(
        &mut self,
        nonce: &[u8; NONCE_LENGTH],
        aad: &[u8],
        payload: &mut [u8],
        tag: &mut [u8],
    ) -> Result<(), Error>;

    /// Decrypt `payload` in place and verify `tag`.
    fn decrypt(
        &mut self,
        nonce: &[u8; NONCE_LENGTH],
        aad: &[u8],
        payload: &mut [u8],
        tag: &[u8],
    ) -> Result<(), Error>;
}

/// A cipher backend for builds without frame security. Every operation
/// fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCipher;

impl CcmCipher for NoCipher {
    fn begin_session(&mut self, _key: &[u8], _tag_len: usize) -> Result<(), Error> {
        Err(Error::Cipher)
    }

    fn encrypt(
        &mut self,
        _nonce: &[u8; NONCE_LENGTH],
        _aad: &[u8],
        _payload: &mut [u8],
        _tag: &mut [u8],
    ) -> Result<(), Error> {
        Err(Error::Cipher)
    }

    fn decrypt(
        &mut self,
        _nonce: &[u8; NONCE_LENGTH],
        _aad: &[u8],
        _payload: &mut [u8],
        _tag: &[u8],
    ) -> Result<(), Error> {
        Err(Error::Cipher)
    }
}

/// Security settings of a device.
///
/// The frame counter only moves forward. Once it reaches `0xffffffff` frames
/// are refused until a new key is installed, which resets it.
#[derive(Debug, Clone, Default)]
pub struct SecurityContext {
    level: SecurityLevel,
    key_id_mode: KeyIdMode,
    key: Vec<u8, MAX_KEY_LENGTH>,
    frame_counter: u32,
}

impl SecurityContext {
    pub fn level(&self) -> SecurityLevel {
        self.level
    }

    pub fn set_level(&mut self, level: SecurityLevel) {
        self.level = level;
    }

    pub fn key_id_mode(&self) -> KeyIdMode {
        self.key_id_mode
    }

    pub fn set_key_id_mode(&mut self, mode: KeyIdMode) {
        self.key_id_mode = mode;
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Install a new key and reset the frame counter.
    pub fn set_key(&mut self, key: &[u8]) -> Result<(), Error> {
        if key.is_empty() {
            return Err(Error::InvalidKey);
        }
        self.key = Vec::from_slice(key).map_err(|_| Error::InvalidKey)?;
        self.frame_counter = 0;
        Ok(())
    }

    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    pub fn set_frame_counter(&mut self, frame_counter: u32) {
        self.frame_counter = frame_counter;
    }

    /// Returns `true` when outgoing frames are secured.
    pub fn is_enabled(&self) -> bool {
        self.level != SecurityLevel::None
    }

    /// Forget level, key and counter.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// The Auxiliary Security Header of the next outgoing frame.
    pub fn aux_header(&self) -> AuxSecurityHeaderRepr {
        AuxSecurityHeaderRepr {
            security_level: self.level,
            frame_counter: Some(self.frame_counter),
            key_identifier: KeyIdentifier::Implicit,
        }
    }
}

/// Build the CCM* nonce.
pub fn nonce(src_ext_addr: &[u8; 8], frame_counter: u32, level: SecurityLevel) -> [u8; NONCE_LENGTH] {
    let mut nonce = [0u8; NONCE_LENGTH];
    nonce[..8].copy_from_slice(src_ext_addr);
    nonce[8..12].copy_from_slice(&frame_counter.to_be_bytes());
    nonce[12] = level.into();
    nonce
}

fn check_level(level: SecurityLevel) -> Result<(), Error> {
    if level == SecurityLevel::Enc {
        error!("encryption without authentication is not supported");
        return Err(Error::Unsupported);
    }
    Ok(())
}

/// Secure an emitted frame in place.
///
/// `frame` holds `hdr_len` header octets, `payload_len` payload octets and
/// room for the MIC. The frame counter written in the header must be the one
/// of `ctx`; it is incremented on success.
pub fn encrypt_auth<C: CcmCipher>(
    ctx: &mut SecurityContext,
    cipher: &mut C,
    frame: &mut [u8],
    hdr_len: usize,
    payload_len: usize,
    src_ext_addr: &[u8; 8],
) -> Result<(), Error> {
    let level = ctx.level;
    if level == SecurityLevel::None {
        return Ok(());
    }
    check_level(level)?;

    if ctx.key_id_mode != KeyIdMode::Implicit {
        return Err(Error::UnsupportedKeyMode);
    }
    if ctx.frame_counter == u32::MAX {
        warn!("frame counter exhausted, refusing to secure frames");
        return Err(Error::CounterExhausted);
    }
    if ctx.key.is_empty() {
        return Err(Error::NoKey);
    }

    let tag_len = level.mic_length();
    let end = hdr_len + payload_len;
    if frame.len() < end + tag_len {
        return Err(Error::InvalidLength);
    }

    let nonce = nonce(src_ext_addr, ctx.frame_counter, level);
    cipher.begin_session(&ctx.key, tag_len)?;

    if level.encrypts() {
        let (header, rest) = frame.split_at_mut(hdr_len);
        let (payload, rest) = rest.split_at_mut(payload_len);
        cipher.encrypt(&nonce, header, payload, &mut rest[..tag_len])?;
    } else {
        let (authenticated, rest) = frame.split_at_mut(end);
        cipher.encrypt(&nonce, authenticated, &mut [], &mut rest[..tag_len])?;
    }

    ctx.frame_counter += 1;
    Ok(())
}

/// Verify, and decrypt when needed, a received frame in place. Returns the
/// length of the plaintext payload, which follows the header.
///
/// The level of the frame must match ours.
pub fn decrypt_auth<C: CcmCipher>(
    ctx: &SecurityContext,
    cipher: &mut C,
    frame: &mut [u8],
    hdr_len: usize,
    aux: &AuxSecurityHeaderRepr,
    src_ext_addr: &[u8; 8],
) -> Result<usize, Error> {
    let level = aux.security_level;
    check_level(level)?;

    if level != ctx.level {
        debug!("security level mismatch: {:?} != {:?}", level, ctx.level);
        return Err(Error::LevelMismatch);
    }
    if aux.key_identifier.mode() != KeyIdMode::Implicit {
        return Err(Error::UnsupportedKeyMode);
    }
    let Some(frame_counter) = aux.frame_counter else {
        return Err(Error::Unsupported);
    };
    if ctx.key.is_empty() {
        return Err(Error::NoKey);
    }

    let tag_len = level.mic_length();
    let payload_len = frame
        .len()
        .checked_sub(hdr_len + tag_len)
        .ok_or(Error::InvalidLength)?;
    let end = hdr_len + payload_len;

    let nonce = nonce(src_ext_addr, frame_counter, level);
    cipher.begin_session(&ctx.key, tag_len)?;

    if level.encrypts() {
        let (header, rest) = frame.split_at_mut(hdr_len);
        let (payload, tag) = rest.split_at_mut(payload_len);
        cipher.decrypt(&nonce, header, payload, tag)?;
    } else {
        let (authenticated, tag) = frame.split_at_mut(end);
        cipher.decrypt(&nonce, authenticated, &mut [], tag)?;
    }

    Ok(payload_len)
}

#[cfg(feature = "rustcrypto")]
pub use rustcrypto::AesCcm;

#[cfg(feature = "rustcrypto")]
mod rustcrypto {
    use aes::Aes128;
    use ccm::aead::generic_array::GenericArray;
    use ccm::aead::{AeadInPlace, KeyInit};
    use ccm::consts::{U13, U16, U4, U8};
    use ccm::Ccm;

    use super::{CcmCipher, Error, NONCE_LENGTH};

    /// Software AES-128 CCM* backend.
    #[derive(Default)]
    pub struct AesCcm {
        key: Option<[u8; 16]>,
        tag_len: usize,
    }

    impl AesCcm {
        pub fn new() -> Self {
            Self::default()
        }
    }

    macro_rules! with_ccm {
        ($key:expr, $tag_len:expr, |$cipher:ident| $body:expr) => {
            match $tag_len {
                4 => {
                    let $cipher = Ccm::<Aes128, U4, U13>::new(GenericArray::from_slice($key));
                    $body
                }
                8 => {
                    let $cipher = Ccm::<Aes128, U8, U13>::new(GenericArray::from_slice($key));
                    $body
                }
                16 => {
                    let $cipher = Ccm::<Aes128, U16, U13>::new(GenericArray::from_slice($key));
                    $body
                }
                _ => Err(Error::Cipher),
            }
        };
    }

    impl CcmCipher for AesCcm {
        fn begin_session(&mut self, key: &[u8], tag_len: usize) -> Result<(), Error> {
            let key: [u8; 16] = key.try_into().map_err(|_| Error::InvalidKey)?;
            if !matches!(tag_len, 4 | 8 | 16) {
                return Err(Error::Cipher);
            }
            self.key = Some(key);
            self.tag_len = tag_len;
            Ok(())
        }

        fn encrypt(
            &mut self,
            nonce: &[u8; NONCE_LENGTH],
            aad: &[u8],
            payload: &mut [u8],
            tag: &mut [u8],
        ) -> Result<(), Error> {
            let key = self.key.as_ref().ok_or(Error::NoKey)?;
            if tag.len() != self.tag_len {
                return Err(Error::InvalidLength);
            }
            let nonce = GenericArray::from_slice(nonce);
            with_ccm!(key, self.tag_len, |cipher| {
                let computed = cipher
                    .encrypt_in_place_detached(nonce, aad, payload)
                    .map_err(|_| Error::Cipher)?;
                tag.copy_from_slice(&computed);
                Ok(())
            })
        }

        fn decrypt(
            &mut self,
            nonce: &[u8; NONCE_LENGTH],
            aad: &[u8],
            payload: &mut [u8],
            tag: &[u8],
        ) -> Result<(), Error> {
            let key = self.key.as_ref().ok_or(Error::NoKey)?;
            if tag.len() != self.tag_len {
                return Err(Error::InvalidLength);
            }
            let nonce = GenericArray::from_slice(nonce);
            with_ccm!(key, self.tag_len, |cipher| {
                cipher
                    .decrypt_in_place_detached(nonce, aad, payload, GenericArray::from_slice(tag))
                    .map_err(|_| Error::AuthenticationFailed)
            })
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A toy cipher: XOR keystream and an additive MIC. Good enough to tell
    /// which octets were encrypted and which were authenticated.
    #[derive(Default)]
    pub struct XorCipher {
        key: [u8; 16],
        tag_len: usize,
    }

    impl XorCipher {
        fn mic(&self, nonce: &[u8; NONCE_LENGTH], aad: &[u8], plaintext: &[u8], tag: &mut [u8]) {
            tag.fill(0);
            for (i, b) in nonce.iter().chain(aad).chain(plaintext).enumerate() {
                let slot = i % tag.len();
                tag[slot] = tag[slot].wrapping_mul(31).wrapping_add(*b ^ self.key[i % 16]);
            }
        }

        fn keystream(&self, nonce: &[u8; NONCE_LENGTH], data: &mut [u8]) {
            for (i, b) in data.iter_mut().enumerate() {
                *b ^= self.key[i % 16] ^ nonce[i % NONCE_LENGTH] ^ 0x5a;
            }
        }
    }

    impl CcmCipher for XorCipher {
        fn begin_session(&mut self, key: &[u8], tag_len: usize) -> Result<(), Error> {
            self.key = key.try_into().map_err(|_| Error::InvalidKey)?;
            self.tag_len = tag_len;
            Ok(())
        }

        fn encrypt(
            &mut self,
            nonce: &[u8; NONCE_LENGTH],
            aad: &[u8],
            payload: &mut [u8],
            tag: &mut [u8],
        ) -> Result<(), Error> {
            assert_eq!(tag.len(), self.tag_len);
            self.mic(nonce, aad, payload, tag);
            self.keystream(nonce, payload);
            Ok(())
        }

        fn decrypt(
            &mut self,
            nonce: &[u8; NONCE_LENGTH],
            aad: &[u8],
            payload: &mut [u8],
            tag: &[u8],
        ) -> Result<(), Error> {
            self.keystream(nonce, payload);
            let mut expected = [0u8; 16];
            self.mic(nonce, aad, payload, &mut expected[..tag.len()]);
            if expected[..tag.len()] == *tag {
                Ok(())
            } else {
                Err(Error::AuthenticationFailed)
            }
        }
    }

    const SRC: [u8; 8] = [0x00, 0x12, 0x4b, 0x00, 0x14, 0xb5, 0xd9, 0xc7];
    const KEY: [u8; 16] = [
        0xc0, 0xc1, 0xc2, 0xc3, 0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xcb, 0xcc, 0xcd, 0xce,
        0xcf,
    ];

    fn context(level: SecurityLevel) -> SecurityContext {
        let mut ctx = SecurityContext::default();
        ctx.set_level(level);
        ctx.set_key(&KEY).unwrap();
        ctx
    }

    /// 4 header octets, 5 payload octets and room for the MIC.
    fn frame(level: SecurityLevel) -> std::vec::Vec<u8> {
        let mut frame = vec![0x49, 0xd8, 0x01, 0xcd, 0x01, 0x02, 0x03, 0x04, 0x05];
        frame.resize(9 + level.mic_length(), 0);
        frame
    }

    #[test]
    fn nonce_layout() {
        let nonce = nonce(&SRC, 0x01020304, SecurityLevel::EncMic32);
        assert_eq!(&nonce[..8], &SRC);
        assert_eq!(&nonce[8..12], &[1, 2, 3, 4]);
        assert_eq!(nonce[12], 5);
    }

    #[test]
    fn mic_only_authenticates_without_encrypting() {
        let mut ctx = context(SecurityLevel::Mic64);
        let mut cipher = XorCipher::default();
        let mut frame = frame(SecurityLevel::Mic64);

        encrypt_auth(&mut ctx, &mut cipher, &mut frame, 4, 5, &SRC).unwrap();
        assert_eq!(&frame[4..9], &[1, 2, 3, 4, 5]);
        assert_ne!(&frame[9..], &[0; 8]);
        assert_eq!(ctx.frame_counter(), 1);

        let aux = AuxSecurityHeaderRepr {
            frame_counter: Some(0),
            ..ctx.aux_header()
        };
        let mut received = frame.clone();
        assert_eq!(
            decrypt_auth(&ctx, &mut cipher, &mut received, 4, &aux, &SRC),
            Ok(5)
        );

        // The payload is covered by the MIC.
        received = frame.clone();
        received[6] ^= 1;
        assert_eq!(
            decrypt_auth(&ctx, &mut cipher, &mut received, 4, &aux, &SRC),
            Err(Error::AuthenticationFailed)
        );
    }

    #[test]
    fn enc_mic_encrypts_the_payload() {
        let mut ctx = context(SecurityLevel::EncMic32);
        let mut cipher = XorCipher::default();
        let mut frame = frame(SecurityLevel::EncMic32);

        encrypt_auth(&mut ctx, &mut cipher, &mut frame, 4, 5, &SRC).unwrap();
        assert_eq!(&frame[..4], &[0x49, 0xd8, 0x01, 0xcd]);
        assert_ne!(&frame[4..9], &[1, 2, 3, 4, 5]);

        let aux = AuxSecurityHeaderRepr {
            frame_counter: Some(0),
            ..ctx.aux_header()
        };
        let len = decrypt_auth(&ctx, &mut cipher, &mut frame, 4, &aux, &SRC).unwrap();
        assert_eq!(&frame[4..4 + len], &[1, 2, 3, 4, 5]);

        // A modified header fails authentication.
        let mut other = self::frame(SecurityLevel::EncMic32);
        let mut ctx = context(SecurityLevel::EncMic32);
        encrypt_auth(&mut ctx, &mut cipher, &mut other, 4, 5, &SRC).unwrap();
        other[0] ^= 0x20;
        assert_eq!(
            decrypt_auth(&ctx, &mut cipher, &mut other, 4, &aux, &SRC),
            Err(Error::AuthenticationFailed)
        );
    }

    #[test]
    fn encryption_only_is_refused() {
        let mut ctx = context(SecurityLevel::Enc);
        let mut frame = frame(SecurityLevel::Enc);
        assert_eq!(
            encrypt_auth(&mut ctx, &mut XorCipher::default(), &mut frame, 4, 5, &SRC),
            Err(Error::Unsupported)
        );
        assert_eq!(ctx.frame_counter(), 0);
    }

    #[test]
    fn exhausted_counter_is_terminal() {
        let mut ctx = context(SecurityLevel::Mic32);
        ctx.set_frame_counter(u32::MAX);
        let mut frame = frame(SecurityLevel::Mic32);
        let before = frame.clone();

        assert_eq!(
            encrypt_auth(&mut ctx, &mut XorCipher::default(), &mut frame, 4, 5, &SRC),
            Err(Error::CounterExhausted)
        );
        assert_eq!(frame, before);
        assert_eq!(ctx.frame_counter(), u32::MAX);

        // Rekeying resets the counter.
        ctx.set_key(&KEY).unwrap();
        assert_eq!(ctx.frame_counter(), 0);
    }

    #[test]
    fn level_mismatch_is_rejected() {
        let ctx = context(SecurityLevel::EncMic64);
        let mut frame = frame(SecurityLevel::Mic32);
        let aux = AuxSecurityHeaderRepr {
            security_level: SecurityLevel::Mic32,
            frame_counter: Some(0),
            key_identifier: KeyIdentifier::Implicit,
        };
        assert_eq!(
            decrypt_auth(&ctx, &mut XorCipher::default(), &mut frame, 4, &aux, &SRC),
            Err(Error::LevelMismatch)
        );
    }

    #[test]
    fn only_implicit_keys() {
        let mut ctx = context(SecurityLevel::Mic32);
        ctx.set_key_id_mode(KeyIdMode::Index);
        let mut frame = frame(SecurityLevel::Mic32);
        assert_eq!(
            encrypt_auth(&mut ctx, &mut XorCipher::default(), &mut frame, 4, 5, &SRC),
            Err(Error::UnsupportedKeyMode)
        );

        let mut ctx = SecurityContext::default();
        assert_eq!(ctx.set_key(&[0; 17]), Err(Error::InvalidKey));
        assert_eq!(ctx.set_key(&[]), Err(Error::InvalidKey));
    }

    #[cfg(feature = "rustcrypto")]
    #[test]
    fn aes_ccm_round_trip() {
        let mut ctx = context(SecurityLevel::EncMic128);
        let mut cipher = AesCcm::new();
        let mut frame = frame(SecurityLevel::EncMic128);

        encrypt_auth(&mut ctx, &mut cipher, &mut frame, 4, 5, &SRC).unwrap();
        assert_ne!(&frame[4..9], &[1, 2, 3, 4, 5]);

        let aux = AuxSecurityHeaderRepr {
            frame_counter: Some(0),
            ..ctx.aux_header()
        };
        let mut tampered = frame.clone();
        tampered[10] ^= 1;
        assert_eq!(
            decrypt_auth(&ctx, &mut cipher, &mut tampered, 4, &aux, &SRC),
            Err(Error::AuthenticationFailed)
        );

        let len = decrypt_auth(&ctx, &mut cipher, &mut frame, 4, &aux, &SRC).unwrap();
        assert_eq!(&frame[4..4 + len], &[1, 2, 3, 4, 5]);
    }
}
