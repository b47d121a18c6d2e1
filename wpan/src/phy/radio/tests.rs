//! A scripted radio for tests.
use std::boxed::Box;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use core::task::{Context, Poll};

use super::{Capabilities, Filter, Radio, RadioError, RxInfo, TxConfig, TxError};
use crate::frame::{append_fcs, FrameBuilder, FrameControl, FCS_LENGTH};

#[derive(Debug, Clone, PartialEq)]
pub enum TestRadioEvent {
    Start,
    Stop,
    SetChannel(u8),
    SetTxPower(i8),
    Filter(Filter),
    Cca(bool),
    Transmit(Vec<u8>),
    PrepareReceive,
    Cancel,
}

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>>>;

pub struct TestRadioInner {
    pub address: [u8; 8],
    pub capabilities: Capabilities,
    pub channel: u8,
    pub tx_power: i8,
    pub lqi: u8,
    /// Frames waiting to be received, as they are on the air.
    pub rx: VecDeque<Vec<u8>>,
    pub transmitted: Vec<Vec<u8>>,
    pub events: Vec<TestRadioEvent>,
    /// Number of upcoming clear channel assessments reporting a busy channel.
    pub busy_cca: usize,
    /// Results of upcoming transmissions, `Ok` when empty.
    pub tx_results: VecDeque<Result<(), TxError>>,
    /// Answer every frame requesting an acknowledgment.
    pub auto_ack: bool,
    responder: Option<Responder>,
}

/// A radio whose state is shared between clones, so that a test keeps a
/// handle while the MAC layer owns the radio.
#[derive(Clone)]
pub struct TestRadio {
    inner: Rc<RefCell<TestRadioInner>>,
}

impl TestRadio {
    pub fn new(address: [u8; 8]) -> Self {
        Self {
            inner: Rc::new(RefCell::new(TestRadioInner {
                address,
                capabilities: Capabilities::FCS,
                channel: 11,
                tx_power: 0,
                lqi: 0xff,
                rx: VecDeque::new(),
                transmitted: Vec::new(),
                events: Vec::new(),
                busy_cca: 0,
                tx_results: VecDeque::new(),
                auto_ack: false,
                responder: None,
            })),
        }
    }

    pub fn inner<T>(&self, f: impl FnOnce(&mut TestRadioInner) -> T) -> T {
        f(&mut self.inner.borrow_mut())
    }

    pub fn with_capabilities(self, capabilities: Capabilities) -> Self {
        self.inner(|inner| inner.capabilities = capabilities);
        self
    }

    pub fn with_auto_ack(self) -> Self {
        self.inner(|inner| inner.auto_ack = true);
        self
    }

    /// Queue a received frame, adding the FCS when the radio does not strip
    /// it.
    pub fn push_rx(&self, frame: &[u8]) {
        let frame = self.on_air(frame);
        self.inner(|inner| inner.rx.push_back(frame));
    }

    /// Answer transmitted frames (without FCS) with frames to receive.
    pub fn set_responder(&self, responder: impl FnMut(&[u8]) -> Vec<Vec<u8>> + 'static) {
        self.inner(|inner| inner.responder = Some(Box::new(responder)));
    }

    pub fn transmitted(&self) -> Vec<Vec<u8>> {
        self.inner(|inner| inner.transmitted.clone())
    }

    pub fn events(&self) -> Vec<TestRadioEvent> {
        self.inner(|inner| inner.events.clone())
    }

    pub fn channel(&self) -> u8 {
        self.inner(|inner| inner.channel)
    }

    fn has_fcs_offload(&self) -> bool {
        self.inner(|inner| inner.capabilities.contains(Capabilities::FCS))
    }

    fn on_air(&self, frame: &[u8]) -> Vec<u8> {
        let mut frame = frame.to_vec();
        if !self.has_fcs_offload() {
            let len = frame.len();
            frame.resize(len + FCS_LENGTH, 0);
            append_fcs(&mut frame, len).unwrap();
        }
        frame
    }

    fn respond(&self, frame: &[u8]) {
        let content = if self.has_fcs_offload() {
            frame
        } else {
            &frame[..frame.len() - FCS_LENGTH]
        };

        let auto_ack = self.inner(|inner| inner.auto_ack);
        if auto_ack && content.len() >= 3 {
            let fc = FrameControl::new_unchecked(&content[..2]);
            if fc.ack_request() {
                let ack = FrameBuilder::new_imm_ack(content[2]).finalize().unwrap();
                let mut buffer = [0u8; 3];
                ack.emit(&mut buffer).unwrap();
                self.push_rx(&buffer);
            }
        }

        let responder = self.inner(|inner| inner.responder.take());
        if let Some(mut responder) = responder {
            for answer in responder(content) {
                self.push_rx(&answer);
            }
            self.inner(|inner| inner.responder = Some(responder));
        }
    }
}

impl Radio for TestRadio {
    fn capabilities(&self) -> Capabilities {
        self.inner(|inner| inner.capabilities)
    }

    fn set_channel(&mut self, channel: u8) -> Result<(), RadioError> {
        if !self.channel_range().contains(&channel) {
            return Err(RadioError::InvalidChannel);
        }
        self.inner(|inner| {
            inner.channel = channel;
            inner.events.push(TestRadioEvent::SetChannel(channel));
        });
        Ok(())
    }

    fn set_tx_power(&mut self, dbm: i8) -> Result<(), RadioError> {
        if !(-20..=8).contains(&dbm) {
            return Err(RadioError::InvalidTxPower);
        }
        self.inner(|inner| {
            inner.tx_power = dbm;
            inner.events.push(TestRadioEvent::SetTxPower(dbm));
        });
        Ok(())
    }

    fn set_filter(&mut self, filter: &Filter) {
        self.inner(|inner| inner.events.push(TestRadioEvent::Filter(*filter)));
    }

    fn start(&mut self, _cx: &mut Context<'_>) -> Poll<()> {
        self.inner(|inner| inner.events.push(TestRadioEvent::Start));
        Poll::Ready(())
    }

    fn stop(&mut self, _cx: &mut Context<'_>) -> Poll<()> {
        self.inner(|inner| inner.events.push(TestRadioEvent::Stop));
        Poll::Ready(())
    }

    fn cca(&mut self, _cx: &mut Context<'_>) -> Poll<bool> {
        let clear = self.inner(|inner| {
            let clear = inner.busy_cca == 0;
            inner.busy_cca = inner.busy_cca.saturating_sub(1);
            inner.events.push(TestRadioEvent::Cca(clear));
            clear
        });
        Poll::Ready(clear)
    }

    fn prepare_transmit(
        &mut self,
        _cx: &mut Context<'_>,
        _cfg: &TxConfig,
        bytes: &[u8],
    ) -> Poll<()> {
        self.inner(|inner| inner.transmitted.push(bytes.to_vec()));
        Poll::Ready(())
    }

    fn transmit(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), TxError>> {
        let (frame, result) = self.inner(|inner| {
            let frame = inner.transmitted.last().cloned().unwrap_or_default();
            inner.events.push(TestRadioEvent::Transmit(frame.clone()));
            (frame, inner.tx_results.pop_front().unwrap_or(Ok(())))
        });

        if result.is_ok() {
            self.respond(&frame);
        }

        Poll::Ready(result)
    }

    fn prepare_receive(&mut self, _cx: &mut Context<'_>) -> Poll<()> {
        self.inner(|inner| inner.events.push(TestRadioEvent::PrepareReceive));
        Poll::Ready(())
    }

    fn receive(&mut self, cx: &mut Context<'_>, buffer: &mut [u8; 128]) -> Poll<Option<RxInfo>> {
        let received = self.inner(|inner| inner.rx.pop_front().map(|frame| (frame, inner.lqi)));
        match received {
            Some((frame, _)) if frame.len() > buffer.len() => Poll::Ready(None),
            Some((frame, lqi)) => {
                buffer[..frame.len()].copy_from_slice(&frame);
                Poll::Ready(Some(RxInfo {
                    len: frame.len(),
                    lqi,
                }))
            }
            None => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }

    fn cancel_current_operation(&mut self) {
        self.inner(|inner| inner.events.push(TestRadioEvent::Cancel));
    }

    fn ieee802154_address(&self) -> [u8; 8] {
        self.inner(|inner| inner.address)
    }
}
