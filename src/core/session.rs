use crate::core::inbox::Subscription;
use crate::core::matcher::{AckEvent, AckMatcher};
use crate::domain::model::{CommandSet, InboundSms};
use crate::domain::ports::SmsTransport;
use crate::utils::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Instant};

/// 預設的發送間隔，避免追蹤器忽略太接近的簡訊
pub const DEFAULT_SEND_PACING: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Sending,
    AwaitingAck(usize),
    Completed,
    Failed,
    /// 在到達終止狀態前被外部放棄（逾時或取消）
    TimedOut,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::TimedOut
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    pub commands_sent: usize,
    pub acknowledged: usize,
}

struct StateReporter {
    tx: watch::Sender<SessionState>,
}

impl StateReporter {
    fn set(&self, state: SessionState) {
        self.tx.send_replace(state);
    }

    fn current(&self) -> SessionState {
        *self.tx.borrow()
    }
}

impl Drop for StateReporter {
    fn drop(&mut self) {
        if !self.current().is_terminal() {
            self.tx.send_replace(SessionState::TimedOut);
        }
    }
}

/// 單次簡訊佈建：依序發送指令，並（可選）等待每個指令的確認簡訊
pub struct SmsSession {
    target_phone_number: String,
    commands: CommandSet,
    transport: Arc<dyn SmsTransport>,
    pacing: Duration,
    subscription: Option<Subscription>,
    state: StateReporter,
}

impl SmsSession {
    /// 建立不等待確認的 session
    pub fn new(
        target_phone_number: &str,
        commands: CommandSet,
        transport: Arc<dyn SmsTransport>,
    ) -> Self {
        let (tx, _) = watch::channel(SessionState::NotStarted);
        Self {
            target_phone_number: target_phone_number.to_string(),
            commands,
            transport,
            pacing: DEFAULT_SEND_PACING,
            subscription: None,
            state: StateReporter { tx },
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// 交由 session 持有收訊訂閱，所有確認收到後才算完成
    pub fn awaiting_acks(mut self, subscription: Subscription) -> Self {
        self.subscription = Some(subscription);
        self
    }

    pub fn waits_for_ack(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.tx.subscribe()
    }

    pub async fn run(self) -> Result<SessionReport> {
        let SmsSession {
            target_phone_number,
            commands,
            transport,
            pacing,
            mut subscription,
            state,
        } = self;

        let waiting = subscription.is_some();
        let to_send = commands.init_commands();
        let mut matcher = AckMatcher::new(&commands, &target_phone_number);
        let mut sent = 0usize;
        let mut next_send_at = Instant::now();

        tracing::info!(
            "📨 Sending {} commands to {} (wait for ack: {})",
            to_send.len(),
            target_phone_number,
            waiting
        );
        state.set(SessionState::Sending);

        loop {
            if sent == to_send.len() && (!waiting || matcher.is_complete()) {
                break;
            }

            tokio::select! {
                _ = time::sleep_until(next_send_at), if sent < to_send.len() => {
                    let command = &to_send[sent];
                    if let Err(e) = transport.send(&target_phone_number, command).await {
                        tracing::error!("❌ Failed to send command {}: {}", sent, e);
                        state.set(SessionState::Failed);
                        return Err(e);
                    }
                    tracing::debug!("Sent command {}/{}: {}", sent + 1, to_send.len(), command);
                    sent += 1;
                    next_send_at = Instant::now() + pacing;

                    if sent == to_send.len() && waiting {
                        if let Some(awaiting) = pending_ack_state(&matcher) {
                            state.set(awaiting);
                        }
                    }
                }
                received = next_inbound(&mut subscription) => {
                    let sms = match received {
                        Ok(sms) => sms,
                        Err(e) => {
                            state.set(SessionState::Failed);
                            return Err(e);
                        }
                    };
                    match matcher.accept(&sms) {
                        AckEvent::Advanced { index } => {
                            tracing::info!(
                                "✅ Tracker acknowledged command {} (received {})",
                                index + 1,
                                sms.received_at.format("%H:%M:%S")
                            );
                            if sent == to_send.len() {
                                if let Some(awaiting) = pending_ack_state(&matcher) {
                                    state.set(awaiting);
                                }
                            }
                        }
                        AckEvent::Completed => {
                            tracing::info!(
                                "✅ Tracker acknowledged all {} commands (last at {})",
                                matcher.total(),
                                sms.received_at.format("%H:%M:%S")
                            );
                        }
                        AckEvent::NoMatch => {
                            tracing::debug!(
                                "Ignoring reply without keyword '{}': {}",
                                matcher.expected_keyword().unwrap_or_default(),
                                sms.body
                            );
                        }
                        AckEvent::ForeignSender | AckEvent::AlreadyComplete => {
                            tracing::trace!("Ignoring SMS from {}", sms.originating_address);
                        }
                    }
                }
            }
        }

        drop(subscription);
        state.set(SessionState::Completed);

        Ok(SessionReport {
            commands_sent: sent,
            acknowledged: matcher.expected_index(),
        })
    }
}

/// 全部確認後沒有等待狀態，直接進入 `Completed`
fn pending_ack_state(matcher: &AckMatcher) -> Option<SessionState> {
    (!matcher.is_complete()).then(|| SessionState::AwaitingAck(matcher.expected_index()))
}

async fn next_inbound(subscription: &mut Option<Subscription>) -> Result<InboundSms> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::inbox::InboundHub;
    use crate::core::test_support::FakeDevice;
    use crate::utils::error::ProvisionError;

    const TRACKER: &str = "87654321";

    fn init_set_commands() -> CommandSet {
        CommandSet::new(
            vec!["INIT".to_string(), "SET".to_string()],
            vec!["OK-INIT".to_string(), "OK-SET".to_string()],
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_ack_completes_after_last_send() {
        let hub = InboundHub::new();
        let device = Arc::new(FakeDevice::new(hub.clone(), TRACKER));
        let commands = CommandSet::new(
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
        )
        .unwrap();

        let session = SmsSession::new(TRACKER, commands, device.clone());
        assert!(!session.waits_for_ack());
        let state = session.state();

        let started = Instant::now();
        let report = session.run().await.unwrap();

        assert_eq!(report.commands_sent, 3);
        assert_eq!(report.acknowledged, 0);
        assert_eq!(*state.borrow(), SessionState::Completed);
        assert_eq!(device.sent_commands(), vec!["A", "B", "C"]);
        // 三則簡訊之間兩次間隔，最後一則之後不再等待
        assert_eq!(started.elapsed(), Duration::from_secs(4));
        assert!(!hub.has_subscriber());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_are_paced() {
        let hub = InboundHub::new();
        let device = Arc::new(FakeDevice::new(hub.clone(), TRACKER));

        SmsSession::new(TRACKER, init_set_commands(), device.clone())
            .with_pacing(Duration::from_millis(500))
            .run()
            .await
            .unwrap();

        let times = device.send_times();
        assert_eq!(times.len(), 2);
        assert_eq!(times[1] - times[0], Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_after_ordered_acks() {
        let hub = InboundHub::new();
        let device = Arc::new(
            FakeDevice::new(hub.clone(), TRACKER)
                .with_reply("INIT", "junk")
                .with_reply("INIT", "OK-INIT done")
                .with_reply("SET", "OK-SET done"),
        );

        let session = SmsSession::new(TRACKER, init_set_commands(), device.clone())
            .awaiting_acks(hub.subscribe().unwrap());
        let state = session.state();

        let report = session.run().await.unwrap();

        assert_eq!(report.acknowledged, 2);
        assert_eq!(*state.borrow(), SessionState::Completed);
        assert!(!hub.has_subscriber());
    }

    #[test]
    fn test_no_awaiting_state_once_all_acknowledged() {
        let mut matcher = AckMatcher::new(&init_set_commands(), TRACKER);
        assert_eq!(
            pending_ack_state(&matcher),
            Some(SessionState::AwaitingAck(0))
        );

        matcher.accept(&InboundSms::new(TRACKER, "OK-INIT"));
        assert_eq!(
            pending_ack_state(&matcher),
            Some(SessionState::AwaitingAck(1))
        );

        matcher.accept(&InboundSms::new(TRACKER, "OK-SET"));
        assert_eq!(pending_ack_state(&matcher), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acks_before_last_send_complete_after_sending() {
        let hub = InboundHub::new();
        let device = Arc::new(
            FakeDevice::new(hub.clone(), TRACKER)
                .with_reply("INIT", "OK-INIT")
                .with_reply("INIT", "OK-SET"),
        );

        let session = SmsSession::new(TRACKER, init_set_commands(), device.clone())
            .awaiting_acks(hub.subscribe().unwrap());
        let state = session.state();

        let started = Instant::now();
        let report = session.run().await.unwrap();

        assert_eq!(report.commands_sent, 2);
        assert_eq!(report.acknowledged, 2);
        assert_eq!(*state.borrow(), SessionState::Completed);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_ack_leaves_session_waiting() {
        let hub = InboundHub::new();
        let device = Arc::new(
            FakeDevice::new(hub.clone(), TRACKER)
                .with_reply("INIT", "OK-SET")
                .with_reply("SET", "OK-INIT"),
        );

        let session = SmsSession::new(TRACKER, init_set_commands(), device.clone())
            .awaiting_acks(hub.subscribe().unwrap());
        let state = session.state();
        let handle = tokio::spawn(session.run());

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(*state.borrow(), SessionState::AwaitingAck(1));
        assert!(!handle.is_finished());

        handle.abort();
        let _ = handle.await;
        assert_eq!(*state.borrow(), SessionState::TimedOut);
        assert!(!hub.has_subscriber());
    }

    #[tokio::test(start_paused = true)]
    async fn test_outer_timeout_releases_subscription() {
        let hub = InboundHub::new();
        let device = Arc::new(FakeDevice::new(hub.clone(), TRACKER));

        let session = SmsSession::new(TRACKER, init_set_commands(), device.clone())
            .awaiting_acks(hub.subscribe().unwrap());
        let state = session.state();

        let result = time::timeout(Duration::from_secs(360), session.run()).await;

        assert!(result.is_err());
        assert_eq!(*state.borrow(), SessionState::TimedOut);
        assert!(!hub.has_subscriber());
        assert_eq!(device.sent_commands(), vec!["INIT", "SET"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_stops_sequence() {
        let hub = InboundHub::new();
        let device = Arc::new(FakeDevice::new(hub.clone(), TRACKER).failing());

        let session = SmsSession::new(TRACKER, init_set_commands(), device.clone())
            .awaiting_acks(hub.subscribe().unwrap());
        let state = session.state();

        let result = session.run().await;

        assert!(matches!(result, Err(ProvisionError::SmsTransportError { .. })));
        assert_eq!(*state.borrow(), SessionState::Failed);
        assert_eq!(device.sent_commands().len(), 1);
        assert!(!hub.has_subscriber());
    }
}
