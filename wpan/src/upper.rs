use core::future::Future;

use crate::mac::command::MacIndication;
use crate::mac::{self, MacRequest};
use crate::sync::channel::{Receiver, Sender};

/// This traits provides interactions with upper layer. It allows to abstract
/// over channels in async executors. Should be given as an argument to the
/// task that will run the network protocol.
pub trait UpperLayer {
    /// Waits for upper layer to provide a MAC request to handle.
    fn mac_request(&self) -> impl Future<Output = MacRequest>;
    /// Notifies upper layer a MAC indication has been received. Holds until
    /// the indication is received successfully by upper layer.
    fn received_mac_indication(&self, indication: MacIndication) -> impl Future<Output = ()>;
    /// Notifies upper layer of an error while handling a MAC request.
    fn error(&self, error: mac::Error) -> impl Future<Output = ()>;
}

/// An [`UpperLayer`] made of channel halves, for an upper layer running in
/// the same task, joined with the MAC service.
///
/// Indications wait for the previous one to be received; errors overwrite
/// one that was not picked up.
pub struct ChannelUpperLayer<'a> {
    pub requests: Receiver<'a, MacRequest>,
    pub indications: Sender<'a, MacIndication>,
    pub errors: Sender<'a, mac::Error>,
}

impl UpperLayer for ChannelUpperLayer<'_> {
    async fn mac_request(&self) -> MacRequest {
        self.requests.receive().await
    }

    async fn received_mac_indication(&self, indication: MacIndication) {
        self.indications.send_async(indication).await
    }

    async fn error(&self, error: mac::Error) {
        if self.errors.send(error) {
            warn!("MAC error overwritten before being handled");
        }
    }
}

#[cfg(test)]
pub mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::vec::Vec;

    use core::future::poll_fn;
    use core::task::Poll;

    use super::*;

    /// Records indications and errors, and hands over queued requests.
    #[derive(Default)]
    pub struct TestUpperLayer {
        requests: RefCell<VecDeque<MacRequest>>,
        indications: RefCell<Vec<MacIndication>>,
        errors: RefCell<Vec<mac::Error>>,
    }

    impl TestUpperLayer {
        pub fn push_request(&self, request: MacRequest) {
            self.requests.borrow_mut().push_back(request);
        }

        pub fn indications(&self) -> Vec<MacIndication> {
            self.indications.borrow().clone()
        }

        pub fn errors(&self) -> Vec<mac::Error> {
            self.errors.borrow().clone()
        }
    }

    impl UpperLayer for TestUpperLayer {
        async fn mac_request(&self) -> MacRequest {
            poll_fn(|cx| match self.requests.borrow_mut().pop_front() {
                Some(request) => Poll::Ready(request),
                None => {
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
            })
            .await
        }

        async fn received_mac_indication(&self, indication: MacIndication) {
            self.indications.borrow_mut().push(indication);
        }

        async fn error(&self, error: mac::Error) {
            self.errors.borrow_mut().push(error);
        }
    }

    #[pollster::test]
    async fn channels_carry_requests_and_indications() {
        use crate::frame::DisassociationReason;
        use crate::mac::mlme::{MlmeRequest, PibAttribute};
        use crate::sync::{join, Channel};

        let mut requests = Channel::new();
        let mut indications = Channel::new();
        let mut errors = Channel::new();
        let (request_tx, request_rx) = requests.split();
        let (indication_tx, indication_rx) = indications.split();
        let (error_tx, error_rx) = errors.split();
        let upper = ChannelUpperLayer {
            requests: request_rx,
            indications: indication_tx,
            errors: error_tx,
        };

        request_tx.send(MacRequest::Mlme(MlmeRequest::Get(PibAttribute::Channel)));
        assert!(matches!(
            upper.mac_request().await,
            MacRequest::Mlme(MlmeRequest::Get(PibAttribute::Channel))
        ));

        let reasons = [
            DisassociationReason::CoordinatorWishes,
            DisassociationReason::DeviceWishes,
        ];
        join(
            async {
                for reason in reasons {
                    upper
                        .received_mac_indication(MacIndication::Disassociated(reason))
                        .await;
                }
            },
            async {
                for reason in reasons {
                    assert!(matches!(
                        indication_rx.receive().await,
                        MacIndication::Disassociated(received) if received == reason
                    ));
                }
            },
        )
        .await;

        upper.error(mac::Error::NoAck).await;
        upper.error(mac::Error::TxFailed).await;
        assert_eq!(error_rx.try_receive(), Some(mac::Error::TxFailed));
    }
}
