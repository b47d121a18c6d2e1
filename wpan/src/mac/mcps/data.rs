use embedded_hal_async::delay::DelayNs;
use rand_core::RngCore;

use crate::config::IPV6_MTU;
use crate::frame::{
    validate_payload, Address, AuxSecurityHeaderRepr, FrameType, Mpdu, Payload, MTU,
};
use crate::mac::command::{DataRequest, MacIndication};
use crate::mac::{frames, Error, MacService};
use crate::phy::radio::Radio;
use crate::security::{self, decrypt_auth, CcmCipher};
use crate::sixlowpan::{
    self, Dispatch, Fragmenter, HeaderCompression, MAX_UNCOMPRESSED_HEADER_LEN,
};
use crate::time::Clock;
use crate::upper::UpperLayer;

impl<R, Rng, U, TIMER, C, K, H> MacService<'_, R, Rng, U, TIMER, C, K, H>
where
    R: Radio,
    Rng: RngCore,
    U: UpperLayer,
    TIMER: DelayNs + Clone,
    C: Clock,
    K: CcmCipher,
    H: HeaderCompression,
{
    /// Requests the transfer of a datagram to another device.
    ///
    /// The datagram is compressed and, when it does not fit in a single
    /// frame, fragmented. Returns the number of octets of the datagram once
    /// every frame was sent, or the error of the first frame that failed.
    pub async fn data_request(&self, request: &DataRequest) -> Result<usize, Error> {
        let overhead = {
            let pib = self.ctx_lock.lock().await;
            frames::data_frame_overhead(&pib, request.dst)?
        };

        if request.raw {
            if request.payload.len() > overhead.capacity() {
                return Err(Error::FrameTooLong);
            }
            self.send_data(request.dst, &request.payload).await?;
            return Ok(request.payload.len());
        }

        let mut buffer = [0u8; IPV6_MTU + MAX_UNCOMPRESSED_HEADER_LEN];
        let compressed = sixlowpan::compress(&self.hc, &request.payload, &mut buffer)?;
        let packet = &buffer[..compressed.len];

        if !sixlowpan::needs_fragmentation(overhead.header_len, compressed.len, overhead.mic_len) {
            self.send_data(request.dst, packet).await?;
            return Ok(request.payload.len());
        }

        let tag = self.ctx_lock.lock().await.next_datagram_tag();
        let mut fragmenter = Fragmenter::new(packet, compressed, tag)?;
        let mut fragment = [0u8; MTU];
        let mut sent = 0;
        while let Some(len) = fragmenter.next_fragment(overhead.capacity(), &mut fragment)? {
            self.send_data(request.dst, &fragment[..len]).await?;
            sent += len;
        }
        debug!(
            "datagram of {} octets sent in fragments of tag {}, {} octets",
            request.payload.len(),
            tag,
            sent
        );

        Ok(request.payload.len())
    }

    async fn send_data(&self, dst: Address, payload: &[u8]) -> Result<(), Error> {
        let mut buffer = [0u8; MTU];
        let emitted = {
            let mut pib = self.ctx_lock.lock().await;
            let mut cipher = self.cipher.lock().await;
            frames::create_data_frame(&mut pib, &mut *cipher, dst, payload, &mut buffer)?
        };

        self.transmit_frame(&buffer[..emitted.len], emitted.ack_request)
            .await?;
        self.count(|stats| stats.tx_frames += 1);
        Ok(())
    }

    /// Unsecure the payload of `mpdu` into `buffer`. Returns where the
    /// plaintext payload sits in `buffer`.
    async fn unsecure(
        &self,
        mpdu: &Mpdu<'_>,
        buffer: &mut [u8; MTU],
    ) -> Result<core::ops::Range<usize>, Error> {
        let aux = mpdu
            .auxiliary_security_header()
            .map(|header| AuxSecurityHeaderRepr::parse(&header))
            .ok_or(Error::Security(security::Error::Unsupported))?;

        let frame: &[u8] = mpdu.frame().as_inner();
        let frame = match buffer.get_mut(..frame.len()) {
            Some(copy) => {
                copy.copy_from_slice(frame);
                copy
            }
            None => return Err(Error::FrameTooLong),
        };
        let header_len = mpdu.header_len();

        let pib = self.ctx_lock.lock().await;
        let src = match mpdu.addressing().src_address() {
            Address::Extended(address) => address,
            // A short source is only resolved for our coordinator.
            src if src.as_short() == Some(pib.coord_short_address) => pib
                .coord_extended_address
                .ok_or(Error::InvalidAddress)?,
            _ => return Err(Error::InvalidAddress),
        };

        let mut cipher = self.cipher.lock().await;
        let len = decrypt_auth(&pib.security, &mut *cipher, frame, header_len, &aux, &src)?;
        Ok(header_len..header_len + len)
    }

    /// Reports the reception of a data frame, or of a secured frame of any
    /// type, to the upper layer.
    pub(crate) async fn data_indication(&self, mpdu: &Mpdu<'_>, lqi: u8) {
        let addressing = mpdu.addressing();
        let src = addressing.src_address();
        let dst = addressing.dst_address();

        let mut plaintext = [0u8; MTU];
        let payload: &[u8] = match mpdu.payload() {
            Payload::Data(payload) => *payload,
            Payload::Secured(_) => match self.unsecure(mpdu, &mut plaintext).await {
                Ok(range) => &plaintext[range],
                Err(err) => {
                    debug!("dropping secured frame: {:?}", err);
                    self.count(|stats| stats.rx_security_failed += 1);
                    return;
                }
            },
            _ => return,
        };

        let fc = mpdu.frame_control();
        if fc.frame_type() != FrameType::Data {
            match validate_payload(&fc, &addressing, payload) {
                Ok(Payload::Command(command)) => {
                    self.command_indication(mpdu, Some(&command)).await
                }
                Ok(Payload::Beacon(_)) => trace!("ignoring secured beacon"),
                _ => self.count(|stats| stats.rx_malformed += 1),
            }
            return;
        }

        let datagram = match Dispatch::of(payload) {
            Ok(Dispatch::Datagram) => sixlowpan::decode(&self.hc, payload),
            Ok(Dispatch::FirstFragment | Dispatch::SubsequentFragment) => {
                let now = self.clock.now();
                match self.reassembly.lock().await.input(payload, now, &self.hc) {
                    Ok(Some(datagram)) => {
                        self.count(|stats| stats.rx_reassembled += 1);
                        Ok(datagram)
                    }
                    Ok(None) => return,
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        };

        match datagram {
            Ok(datagram) => {
                self.upper_layer
                    .received_mac_indication(MacIndication::Datagram {
                        src,
                        dst,
                        datagram,
                        lqi,
                    })
                    .await
            }
            Err(err) => {
                debug!("6LoWPAN payload dropped: {:?}", err);
                self.count(|stats| stats.rx_dropped += 1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::validate_frame;
    use crate::mac::tests::*;
    use crate::mac::ChannelAccess;
    use crate::phy::radio::tests::TestRadio;
    use crate::sixlowpan::tests::udp_datagram;
    use crate::sixlowpan::{DISPATCH_FRAG1, DISPATCH_FRAGN, DISPATCH_IPV6};

    fn request(dst: Address, payload: &[u8]) -> DataRequest {
        DataRequest::new(dst, payload).unwrap()
    }

    fn dispatch(frame: &[u8]) -> u8 {
        match validate_frame(frame).unwrap().payload() {
            Payload::Data(payload) => payload[0],
            _ => panic!("expected a data frame"),
        }
    }

    #[pollster::test]
    async fn small_datagram_in_a_single_frame() {
        let harness = Harness::new(TestRadio::new(EXT_ADDRESS).with_auto_ack());
        let mac = mac_service(&harness, ChannelAccess::Aloha);
        join_pan(&mac).await;

        let packet = udp_datagram(20);
        let sent = mac
            .data_request(&request(Address::Extended(COORD_ADDRESS), &packet))
            .await;
        assert_eq!(sent, Ok(packet.len()));

        let transmitted = harness.radio.transmitted();
        assert_eq!(transmitted.len(), 1);
        assert_eq!(dispatch(&transmitted[0]), DISPATCH_IPV6);
        assert_eq!(mac.stats().tx_frames, 1);
    }

    #[pollster::test]
    async fn large_datagram_is_fragmented_and_reassembled() {
        let sender = Harness::new(TestRadio::new(EXT_ADDRESS).with_auto_ack());
        let mac = mac_service(&sender, ChannelAccess::Csma);
        join_pan(&mac).await;

        let packet = udp_datagram(300);
        let sent = mac
            .data_request(&request(Address::Extended(COORD_ADDRESS), &packet))
            .await;
        assert_eq!(sent, Ok(packet.len()));

        let frames = sender.radio.transmitted();
        assert!(frames.len() >= 3);
        assert!(frames.iter().all(|frame| frame.len() <= MTU - 2));
        assert_eq!(dispatch(&frames[0]) & 0xf8, DISPATCH_FRAG1);
        assert!(frames[1..]
            .iter()
            .all(|frame| dispatch(frame) & 0xf8 == DISPATCH_FRAGN));

        let receiver = Harness::new(TestRadio::new(COORD_ADDRESS));
        let peer = mac_service(&receiver, ChannelAccess::Aloha);
        join_pan(&peer).await;
        // Out of order.
        for frame in frames.iter().rev() {
            peer.process_frame(frame, 0xff).await;
        }

        assert_eq!(peer.stats().rx_reassembled, 1);
        let indications = receiver.upper.indications();
        assert_eq!(indications.len(), 1);
        match &indications[0] {
            MacIndication::Datagram { src, datagram, .. } => {
                assert_eq!(*src, Address::Extended(EXT_ADDRESS));
                assert_eq!(&datagram[..], &packet[..]);
            }
            _ => panic!("expected a datagram"),
        }
    }

    #[pollster::test]
    async fn first_failing_fragment_ends_the_request() {
        let harness = Harness::new(TestRadio::new(EXT_ADDRESS));
        let mac = mac_service(&harness, ChannelAccess::Aloha);
        join_pan(&mac).await;

        let packet = udp_datagram(300);
        let sent = mac
            .data_request(&request(Address::Extended(COORD_ADDRESS), &packet))
            .await;
        assert_eq!(sent, Err(Error::NoAck));
        // Only the first fragment, with all its retransmissions.
        let transmitted = harness.radio.transmitted();
        assert_eq!(transmitted.len(), 4);
        assert!(transmitted.iter().all(|frame| frame == &transmitted[0]));
    }

    #[pollster::test]
    async fn raw_payloads_skip_6lowpan() {
        let harness = Harness::new(TestRadio::new(EXT_ADDRESS));
        let mac = mac_service(&harness, ChannelAccess::Aloha);
        join_pan(&mac).await;

        let mut raw = request(Address::BROADCAST, &[0xaa, 0xbb]);
        raw.raw = true;
        assert_eq!(mac.data_request(&raw).await, Ok(2));
        assert_eq!(dispatch(&harness.radio.transmitted()[0]), 0xaa);

        let mut raw = request(Address::BROADCAST, &[0xaa; 200]);
        raw.raw = true;
        assert_eq!(mac.data_request(&raw).await, Err(Error::FrameTooLong));
    }

    #[pollster::test]
    async fn unknown_dispatch_is_dropped() {
        let harness = Harness::new(TestRadio::new(EXT_ADDRESS));
        let mac = mac_service(&harness, ChannelAccess::Aloha);
        join_pan(&mac).await;

        let frame = data_frame(1, Address::BROADCAST, &[0x7f, 0x00], false);
        mac.process_frame(&frame, 0xff).await;
        assert_eq!(mac.stats().rx_dropped, 1);
        assert!(harness.upper.indications().is_empty());
    }

    #[cfg(feature = "security")]
    async fn secure(mac: &TestMac<'_>, key: &[u8]) {
        let mut pib = mac.ctx_lock.lock().await;
        pib.security.set_level(crate::frame::SecurityLevel::EncMic32);
        pib.security.set_key(key).unwrap();
    }

    #[cfg(feature = "security")]
    #[pollster::test]
    async fn secured_datagram_round_trip() {
        let sender = Harness::new(TestRadio::new(EXT_ADDRESS).with_auto_ack());
        let mac = mac_service(&sender, ChannelAccess::Aloha);
        join_pan(&mac).await;
        secure(&mac, &[0x42; 16]).await;

        let packet = udp_datagram(10);
        mac.data_request(&request(Address::Extended(COORD_ADDRESS), &packet))
            .await
            .unwrap();
        let frames = sender.radio.transmitted();
        assert!(validate_frame(&frames[0])
            .unwrap()
            .frame_control()
            .security_enabled());

        let receiver = Harness::new(TestRadio::new(COORD_ADDRESS));
        let peer = mac_service(&receiver, ChannelAccess::Aloha);
        join_pan(&peer).await;
        secure(&peer, &[0x42; 16]).await;
        peer.process_frame(&frames[0], 0xff).await;

        match &receiver.upper.indications()[..] {
            [MacIndication::Datagram { datagram, .. }] => assert_eq!(&datagram[..], &packet[..]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[cfg(feature = "security")]
    #[pollster::test]
    async fn wrong_key_is_counted() {
        let sender = Harness::new(TestRadio::new(EXT_ADDRESS).with_auto_ack());
        let mac = mac_service(&sender, ChannelAccess::Aloha);
        join_pan(&mac).await;
        secure(&mac, &[0x42; 16]).await;
        mac.data_request(&request(Address::Extended(COORD_ADDRESS), &udp_datagram(10)))
            .await
            .unwrap();

        let receiver = Harness::new(TestRadio::new(COORD_ADDRESS));
        let peer = mac_service(&receiver, ChannelAccess::Aloha);
        join_pan(&peer).await;
        secure(&peer, &[0x24; 16]).await;
        peer.process_frame(&sender.radio.transmitted()[0], 0xff).await;

        assert_eq!(peer.stats().rx_security_failed, 1);
        assert!(receiver.upper.indications().is_empty());
    }
}
