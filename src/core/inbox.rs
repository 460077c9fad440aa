use crate::domain::model::InboundSms;
use crate::utils::error::{ProvisionError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

const INBOX_CAPACITY: usize = 64;

/// 全程序共用的收訊來源。同一時間只允許一個有效的訂閱
#[derive(Debug, Clone)]
pub struct InboundHub {
    tx: broadcast::Sender<InboundSms>,
    active: Arc<AtomicBool>,
}

impl InboundHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(INBOX_CAPACITY);
        Self {
            tx,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 送入一則收到的簡訊，沒有訂閱者時直接丟棄
    pub fn publish(&self, sms: InboundSms) {
        if self.tx.send(sms).is_err() {
            tracing::trace!("No active subscription, inbound SMS dropped");
        }
    }

    pub fn subscribe(&self) -> Result<Subscription> {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ProvisionError::SessionBusy);
        }
        tracing::debug!("📥 Inbound SMS subscription acquired");
        Ok(Subscription {
            rx: self.tx.subscribe(),
            active: Arc::clone(&self.active),
        })
    }

    pub fn has_subscriber(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Default for InboundHub {
    fn default() -> Self {
        Self::new()
    }
}

/// 收訊訂閱，drop 時釋放
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<InboundSms>,
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Result<InboundSms> {
        loop {
            match self.rx.recv().await {
                Ok(sms) => return Ok(sms),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("⚠️ Inbound SMS queue overflowed, {} messages skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return Err(ProvisionError::InboundClosed),
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        tracing::debug!("📤 Inbound SMS subscription released");
    }
}
