//! Binder transport.
//!
//! Requests become transactions on the service's per-profile binder
//! objects. Pushes come back as transactions on one callback binder owned
//! by the transport, which decodes them and fans them out like the socket
//! client does.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bt_protocol::{ag, hf, Binder, Parcel, Push, Reply, Request, TransactError};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::error::{ClientError, Result};
use crate::transport::{Transport, PUSH_CHANNEL_CAPACITY};

/// Callback binder handed to the service on register.
struct PushReceiver {
    pushes: broadcast::Sender<Push>,
}

#[async_trait]
impl Binder for PushReceiver {
    async fn transact(&self, code: u32, data: &Parcel) -> std::result::Result<Parcel, TransactError> {
        let mut reader = data.reader();
        let push = if let Some(decoded) = ag::read_push(code, &mut reader) {
            Push::Ag(decoded?)
        } else if let Some(decoded) = hf::read_push(code, &mut reader) {
            Push::Hf(decoded?)
        } else {
            debug!(code, "Unknown push code");
            return Err(TransactError::UnknownCode(code));
        };

        trace!(code, "Push received");
        let _ = self.pushes.send(push);
        Ok(Parcel::new())
    }
}

/// Client end of the binder backend.
pub struct BinderTransport {
    ag: Arc<dyn Binder>,
    hf: Arc<dyn Binder>,
    receiver: Arc<PushReceiver>,
    dead: AtomicBool,
}

impl BinderTransport {
    /// Wraps the service's AG and HF binder objects.
    pub fn new(ag: Arc<dyn Binder>, hf: Arc<dyn Binder>) -> Self {
        let (pushes, _) = broadcast::channel(PUSH_CHANNEL_CAPACITY);
        Self {
            ag,
            hf,
            receiver: Arc::new(PushReceiver { pushes }),
            dead: AtomicBool::new(false),
        }
    }

    /// The callback binder this transport registers with the service.
    pub fn callback_binder(&self) -> Arc<dyn Binder> {
        Arc::clone(&self.receiver) as Arc<dyn Binder>
    }

    fn target(&self, request: &Request) -> &Arc<dyn Binder> {
        match request {
            Request::Ag(_) => &self.ag,
            Request::Hf(_) => &self.hf,
        }
    }
}

#[async_trait]
impl Transport for BinderTransport {
    async fn call(&self, request: Request) -> Result<Reply> {
        let mut data = Parcel::new();
        match &request {
            Request::Ag(req) => req.write_parcel(&mut data),
            Request::Hf(req) => req.write_parcel(&mut data),
        }
        if request.is_register() || request.is_unregister() {
            data.write_binder(self.callback_binder());
        }

        let code = request.opcode();
        trace!(code, "Transacting");
        let reply = match self.target(&request).transact(code, &data).await {
            Ok(reply) => reply,
            Err(TransactError::DeadObject) => {
                warn!(code, "Service binder is dead");
                self.dead.store(true, Ordering::SeqCst);
                return Err(ClientError::Transact(TransactError::DeadObject));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Reply::read_parcel(request.reply_kind(), &mut reply.reader())?)
    }

    fn subscribe(&self) -> broadcast::Receiver<Push> {
        self.receiver.pushes.subscribe()
    }

    fn is_connected(&self) -> bool {
        !self.dead.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_core::{AudioState, BtAddress, HfNotification};

    fn addr() -> BtAddress {
        "00:11:22:33:44:55".parse().unwrap()
    }

    #[tokio::test]
    async fn test_push_receiver_decodes_hf_push() {
        let transport = BinderTransport::new(
            Arc::new(PushReceiver {
                pushes: broadcast::channel(1).0,
            }),
            Arc::new(PushReceiver {
                pushes: broadcast::channel(1).0,
            }),
        );
        let mut rx = transport.subscribe();

        let note = HfNotification::AudioState {
            addr: addr(),
            state: AudioState::Connected,
        };
        let mut parcel = Parcel::new();
        hf::write_push(&note, &mut parcel);
        let code = Push::Hf(note.clone()).code();

        transport.callback_binder().transact(code, &parcel).await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), Push::Hf(note));
    }

    #[tokio::test]
    async fn test_push_receiver_rejects_unknown_code() {
        let receiver = PushReceiver {
            pushes: broadcast::channel(1).0,
        };
        let err = receiver.transact(0x7777, &Parcel::new()).await.unwrap_err();
        assert_eq!(err, TransactError::UnknownCode(0x7777));
    }

    struct Dead;

    #[async_trait]
    impl Binder for Dead {
        async fn transact(&self, _: u32, _: &Parcel) -> std::result::Result<Parcel, TransactError> {
            Err(TransactError::DeadObject)
        }
    }

    #[tokio::test]
    async fn test_dead_service_marks_transport_disconnected() {
        let transport = BinderTransport::new(Arc::new(Dead), Arc::new(Dead));
        assert!(transport.is_connected());

        let err = transport
            .call(Request::Ag(bt_protocol::AgRequest::IsConnected { addr: addr() }))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Transact(TransactError::DeadObject)));
        assert!(!transport.is_connected());
    }
}
