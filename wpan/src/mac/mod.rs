pub mod access;
pub mod acknowledgment;
pub mod command;
pub mod constants;
pub mod frames;
pub mod mcps;
pub mod mlme;
pub mod pib;
pub mod utils;

use core::cell::Cell;
use core::future::poll_fn;
use core::pin::pin;

use embedded_hal_async::delay::DelayNs;
use rand_core::RngCore;

use crate::config::{MAC_ACK_REPLY, REASS_CACHE_SIZE};
use crate::frame::{validate_frame, FrameWithFcs, Payload, MTU};
use crate::net::Errno;
use crate::phy::radio::{Capabilities, Filter, Radio};
use crate::security::{self, CcmCipher};
use crate::sixlowpan::{self, HeaderCompression, ReassemblyCache};
use crate::sync::{select, Either, Mutex};
use crate::time::Clock;
use crate::upper::UpperLayer;

pub use access::ChannelAccess;
pub use command::{DataRequest, MacIndication, MacRequest};
pub use mlme::{MlmeConfirm, MlmeRequest};
pub use pib::{AssociationState, Pib};

/// MAC-related error propagated to higher layer
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Error {
    /// The channel stayed busy for every CSMA-CA backoff.
    ChannelAccessFailure,
    /// No acknowledgment after every retransmission.
    NoAck,
    /// The radio failed to transmit.
    TxFailed,
    /// The frame does not fit in the PHY MTU.
    FrameTooLong,
    /// The destination can not be addressed.
    InvalidAddress,
    Security(security::Error),
    Sixlowpan(sixlowpan::Error),
}

impl From<security::Error> for Error {
    fn from(err: security::Error) -> Self {
        Self::Security(err)
    }
}

impl From<sixlowpan::Error> for Error {
    fn from(err: sixlowpan::Error) -> Self {
        Self::Sixlowpan(err)
    }
}

impl From<Error> for Errno {
    fn from(err: Error) -> Self {
        match err {
            Error::ChannelAccessFailure => Errno::EBUSY,
            Error::NoAck | Error::TxFailed => Errno::EIO,
            Error::FrameTooLong => Errno::EMSGSIZE,
            Error::InvalidAddress => Errno::EINVAL,
            Error::Security(security::Error::Unsupported)
            | Error::Security(security::Error::UnsupportedKeyMode) => Errno::EOPNOTSUPP,
            Error::Security(_) => Errno::EPERM,
            Error::Sixlowpan(sixlowpan::Error::TooLarge) => Errno::EMSGSIZE,
            Error::Sixlowpan(sixlowpan::Error::CacheFull) => Errno::ENOBUFS,
            Error::Sixlowpan(_) => Errno::EINVAL,
        }
    }
}

/// Frame counters of the MAC layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Stats {
    /// Frames handed over by the radio.
    pub rx_frames: u32,
    /// Frames with a bad FCS or that failed validation.
    pub rx_malformed: u32,
    /// Frames addressed to someone else.
    pub rx_filtered: u32,
    /// Secured frames that could not be unsecured.
    pub rx_security_failed: u32,
    /// Datagrams rebuilt from fragments.
    pub rx_reassembled: u32,
    /// Payloads the 6LoWPAN layer dropped.
    pub rx_dropped: u32,
    /// Frames transmitted, acknowledgments excluded.
    pub tx_frames: u32,
    /// Retransmissions after a missing acknowledgment.
    pub tx_retries: u32,
    /// Frames given up on.
    pub tx_failed: u32,
}

/// Structure handling MAC sublayer services such as MLME and MCPS. This runs
/// the main event loop that handles interactions between an upper layer and
/// the radio.
///
/// The PIB sits behind `ctx_lock`, the state of a running scan behind
/// `scan_ctx_lock`; the reassembly cache has its own lock, only taken on the
/// receive path.
pub struct MacService<'a, R, Rng, U, TIMER, C, K, H = sixlowpan::Uncompressed> {
    radio: Mutex<R>,
    /// Pseudo-random number generator
    rng: &'a Mutex<Rng>,
    /// Upper layer handler from which MAC commands are received and to which
    /// frames and responses are passed.
    upper_layer: &'a U,
    /// Timer enabling delays operation
    timer: TIMER,
    clock: C,
    access: ChannelAccess,
    ctx_lock: Mutex<Pib>,
    scan_ctx_lock: Mutex<mlme::ScanContext>,
    reassembly: Mutex<ReassemblyCache<REASS_CACHE_SIZE>>,
    cipher: Mutex<K>,
    hc: H,
    stats: critical_section::Mutex<Cell<Stats>>,
}

impl<'a, R, Rng, U, TIMER, C, K, H> MacService<'a, R, Rng, U, TIMER, C, K, H>
where
    R: Radio,
    Rng: RngCore,
    U: UpperLayer,
    TIMER: DelayNs + Clone,
    C: Clock,
    K: CcmCipher,
    H: HeaderCompression + Default,
{
    pub fn new(
        radio: R,
        rng: &'a Mutex<Rng>,
        upper_layer: &'a U,
        timer: TIMER,
        clock: C,
        cipher: K,
        access: ChannelAccess,
    ) -> Self {
        let pib = Pib::new(radio.ieee802154_address());
        Self {
            radio: Mutex::new(radio),
            rng,
            upper_layer,
            timer,
            clock,
            access,
            ctx_lock: Mutex::new(pib),
            scan_ctx_lock: Mutex::new(mlme::ScanContext::default()),
            reassembly: Mutex::new(ReassemblyCache::new()),
            cipher: Mutex::new(cipher),
            hc: H::default(),
            stats: critical_section::Mutex::new(Cell::new(Stats::default())),
        }
    }
}

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
    /// Run the main event loop used by the MAC sublayer for its operation.
    /// The loop waits for either receiving a request from upper layer or
    /// receiving a frame from the radio.
    pub async fn run(&self) -> ! {
        self.start().await;

        let mut buffer = [0u8; MTU + 1];
        loop {
            let event = select(
                self.upper_layer.mac_request(),
                self.receive_raw(&mut buffer),
            )
            .await;

            match event {
                Either::First(request) => {
                    let mut next = Some(request);
                    while let Some(request) = next.take() {
                        next = self.handle_request(request).await;
                    }
                }
                Either::Second(Some(info)) => self.process_frame(&buffer[..info.len], info.lqi).await,
                Either::Second(None) => self.count(|stats| stats.rx_malformed += 1),
            }

            let now = self.clock.now();
            self.reassembly.lock().await.expire(now);
        }
    }

    /// Power the radio up and program channel and address filter.
    pub async fn start(&self) {
        let channel = self.ctx_lock.lock().await.channel;
        {
            let mut radio = self.radio.lock().await;
            poll_fn(|cx| radio.start(cx)).await;
            if radio.set_channel(channel).is_err() {
                warn!("channel {} refused by the radio", channel);
            }
        }
        self.update_filter().await;
        info!("MAC started on channel {}", channel);
    }

    /// Snapshot of the PIB.
    pub async fn pib(&self) -> Pib {
        self.ctx_lock.lock().await.clone()
    }

    pub fn stats(&self) -> Stats {
        critical_section::with(|cs| self.stats.borrow(cs).get())
    }

    pub(crate) fn count(&self, f: impl FnOnce(&mut Stats)) {
        critical_section::with(|cs| {
            let cell = self.stats.borrow(cs);
            let mut stats = cell.get();
            f(&mut stats);
            cell.set(stats);
        });
    }

    /// Handle a request of the upper layer. Returns a request that came in
    /// during a scan and still has to be handled.
    async fn handle_request(&self, request: MacRequest) -> Option<MacRequest> {
        match request {
            MacRequest::Data(request) => {
                if let Err(err) = self.data_request(&request).await {
                    self.upper_layer.error(err).await;
                }
                None
            }
            MacRequest::Mlme(MlmeRequest::Scan(request)) => {
                let (result, deferred) = self.scan_serving_requests(&request).await;
                self.confirm(result.map(MlmeConfirm::Scan)).await;
                deferred
            }
            MacRequest::Mlme(request) => {
                let confirm = self.mlme_request(request).await;
                self.confirm(confirm).await;
                None
            }
        }
    }

    async fn confirm(&self, confirm: Result<MlmeConfirm, Errno>) {
        self.upper_layer
            .received_mac_indication(MacIndication::Confirm(confirm))
            .await;
    }

    /// Scan while listening to the upper layer, so that the scan can be
    /// cancelled. The first other request is kept for after the scan.
    async fn scan_serving_requests(
        &self,
        request: &mlme::ScanRequest,
    ) -> (Result<mlme::ScanResults, Errno>, Option<MacRequest>) {
        let mut scan = pin!(self.scan(request));
        loop {
            match select(scan.as_mut(), self.upper_layer.mac_request()).await {
                Either::First(result) => return (result, None),
                Either::Second(MacRequest::Mlme(MlmeRequest::CancelScan)) => {
                    let confirm = self.mlme_request(MlmeRequest::CancelScan).await;
                    self.confirm(confirm).await;
                }
                Either::Second(other) => {
                    debug!("request deferred until the scan completes");
                    return (scan.await, Some(other));
                }
            }
        }
    }

    /// Program the hardware address filter from the PIB.
    pub(crate) async fn update_filter(&self) {
        let filter = {
            let pib = self.ctx_lock.lock().await;
            Filter {
                pan_id: pib.pan_id,
                short_address: crate::frame::Address::from_short(pib.short_address),
                extended_address: pib.extended_address,
            }
        };
        let mut radio = self.radio.lock().await;
        if radio.capabilities().contains(Capabilities::FILTER) {
            radio.set_filter(&filter);
        }
    }

    /// Receive path of a frame as handed over by the radio.
    pub(crate) async fn process_frame(&self, frame: &[u8], lqi: u8) {
        self.count(|stats| stats.rx_frames += 1);
        let capabilities = self.radio.lock().await.capabilities();

        let with_fcs;
        let content = if capabilities.contains(Capabilities::FCS) {
            frame
        } else {
            with_fcs = match FrameWithFcs::new(frame) {
                Ok(frame) => frame,
                Err(_) => {
                    trace!("dropping frame with a bad FCS");
                    self.count(|stats| stats.rx_malformed += 1);
                    return;
                }
            };
            with_fcs.content()
        };

        let Ok(mpdu) = validate_frame(content) else {
            trace!("dropping invalid frame");
            self.count(|stats| stats.rx_malformed += 1);
            return;
        };

        if !capabilities.contains(Capabilities::FILTER) {
            let pib = self.ctx_lock.lock().await;
            if !utils::is_frame_for_us(&pib, &mpdu) {
                drop(pib);
                self.count(|stats| stats.rx_filtered += 1);
                return;
            }
        }

        if !matches!(mpdu.payload(), Payload::Ack | Payload::Beacon(_))
            && mpdu.frame_control().ack_request()
            && MAC_ACK_REPLY
            && !capabilities.contains(Capabilities::AUTO_ACK)
        {
            if let Some(sequence_number) = mpdu.sequence_number() {
                self.transmit_ack(sequence_number).await;
            }
        }

        match mpdu.payload() {
            Payload::Ack => {}
            Payload::Beacon(_) => self.beacon_indication(&mpdu, lqi).await,
            Payload::Command(_) => self.command_indication(&mpdu, None).await,
            Payload::Data(_) | Payload::Secured(_) => self.data_indication(&mpdu, lqi).await,
        }
    }

    /// Wait for a single frame and process it.
    pub(crate) async fn receive_one(&self, buffer: &mut [u8; MTU + 1]) {
        match self.receive_raw(buffer).await {
            Some(info) => self.process_frame(&buffer[..info.len], info.lqi).await,
            None => self.count(|stats| stats.rx_malformed += 1),
        }
    }
}
