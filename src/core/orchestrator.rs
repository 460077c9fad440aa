use crate::core::catalog::CommandCatalog;
use crate::core::inbox::InboundHub;
use crate::core::poller::{ConnectivityPoller, DEFAULT_POLL_INTERVAL};
use crate::core::registration::{self, DEFAULT_REGISTRATION_TIMEOUT};
use crate::core::session::{SessionReport, SmsSession, DEFAULT_SEND_PACING};
use crate::domain::model::{ProvisionReport, RegistrationOutcome, TrackerDetails};
use crate::domain::ports::{ApiGateway, SmsTransport};
use crate::utils::error::{ProvisionError, ProvisionFailure, Result, Stage};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{self, Instant};

pub type ProvisioningResult = std::result::Result<ProvisionReport, ProvisionFailure>;

/// 註冊失敗後，仍在執行中的簡訊 session 如何處理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbandonPolicy {
    /// 讓 session 跑到完成或逾時，結果丟棄
    #[default]
    LetRun,
    /// 立即中止 session，不再發送任何簡訊
    Cancel,
}

#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    pub registration_timeout: Duration,
    pub sms_timeout: Duration,
    pub connectivity_timeout: Duration,
    pub poll_interval: Duration,
    pub send_pacing: Duration,
    pub wait_for_ack: bool,
    pub abandon_policy: AbandonPolicy,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            registration_timeout: DEFAULT_REGISTRATION_TIMEOUT,
            sms_timeout: Duration::from_secs(360),
            connectivity_timeout: Duration::from_secs(60),
            poll_interval: DEFAULT_POLL_INTERVAL,
            send_pacing: DEFAULT_SEND_PACING,
            wait_for_ack: true,
            abandon_policy: AbandonPolicy::default(),
        }
    }
}

/// 給 UI 顯示的進度通知
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Started { tracker_id: String },
    Registered(RegistrationOutcome),
    RegistrationFailed { message: String },
    SmsCompleted { acknowledged: usize },
    ConnectivityWaitStarted,
    Finished { success: bool, message: String },
}

impl ProgressEvent {
    pub fn describe(&self) -> String {
        match self {
            ProgressEvent::Started { tracker_id } => {
                format!("Registering tracker {} by API and SMS...", tracker_id)
            }
            ProgressEvent::Registered(outcome @ RegistrationOutcome::Created)
            | ProgressEvent::Registered(outcome @ RegistrationOutcome::DuplicateOwn) => format!(
                "{}. Waiting for SMS provisioning to complete...",
                outcome.describe()
            ),
            ProgressEvent::Registered(outcome) => outcome.describe(),
            ProgressEvent::RegistrationFailed { message } => message.clone(),
            ProgressEvent::SmsCompleted { acknowledged } => {
                format!("SMS provisioning completed ({} acknowledged)", acknowledged)
            }
            ProgressEvent::ConnectivityWaitStarted => {
                "Waiting for the tracker to connect to the backend service...".to_string()
            }
            ProgressEvent::Finished { message, .. } => message.clone(),
        }
    }
}

enum SessionSlot {
    Idle,
    Running(AbortHandle),
    Cancelled,
}

/// 讓呼叫端的取消一併中止簡訊 session，不受 `AbandonPolicy` 影響
struct SessionCanceller {
    slot: Mutex<SessionSlot>,
}

impl SessionCanceller {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(SessionSlot::Idle),
        })
    }

    /// 已經取消時立即中止剛啟動的 session
    fn attach(&self, handle: AbortHandle) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*slot, SessionSlot::Cancelled) {
            handle.abort();
        } else {
            *slot = SessionSlot::Running(handle);
        }
    }

    fn cancel(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let SessionSlot::Running(handle) = std::mem::replace(&mut *slot, SessionSlot::Cancelled) {
            tracing::info!("🛑 Cancelling SMS session on request");
            handle.abort();
        }
    }
}

/// 背景執行中的佈建
pub struct ProvisionHandle {
    task: JoinHandle<ProvisioningResult>,
    stage: watch::Receiver<Stage>,
    canceller: Arc<SessionCanceller>,
}

impl ProvisionHandle {
    pub fn current_stage(&self) -> Stage {
        *self.stage.borrow()
    }

    /// 中止整個佈建，包含仍在發送的簡訊 session
    pub fn cancel(&self) {
        self.canceller.cancel();
        self.task.abort();
    }

    pub async fn outcome(self) -> ProvisioningResult {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(ProvisionFailure::new(
                *self.stage.borrow(),
                ProvisionError::Aborted {
                    message: e.to_string(),
                },
            )),
        }
    }
}

/// 在背景執行、帶外部逾時的簡訊 session；drop 時依 policy 處理
struct SessionTask {
    handle: JoinHandle<Result<SessionReport>>,
    policy: AbandonPolicy,
}

impl SessionTask {
    fn spawn(session: SmsSession, limit: Duration, policy: AbandonPolicy) -> Self {
        let handle = tokio::spawn(async move {
            match time::timeout(limit, session.run()).await {
                Ok(result) => result,
                Err(_) => Err(ProvisionError::SmsTimeout { timeout: limit }),
            }
        });
        Self { handle, policy }
    }

    async fn wait(mut self) -> Result<SessionReport> {
        match (&mut self.handle).await {
            Ok(result) => result,
            Err(e) => Err(ProvisionError::Aborted {
                message: e.to_string(),
            }),
        }
    }
}

impl Drop for SessionTask {
    fn drop(&mut self) {
        if self.handle.is_finished() {
            return;
        }
        match self.policy {
            AbandonPolicy::Cancel => {
                tracing::info!("🛑 Cancelling abandoned SMS session");
                self.handle.abort();
            }
            AbandonPolicy::LetRun => {
                tracing::info!("SMS session left running, its result will be discarded");
            }
        }
    }
}

fn at(stage: Stage) -> impl Fn(ProvisionError) -> ProvisionFailure {
    move |error| ProvisionFailure::new(stage, error)
}

/// 佈建流程協調者：註冊、簡訊設定、連線確認
#[derive(Clone)]
pub struct Provisioner {
    api: Arc<dyn ApiGateway>,
    sms: Arc<dyn SmsTransport>,
    inbox: InboundHub,
    catalog: Arc<CommandCatalog>,
    settings: ProvisionSettings,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl Provisioner {
    pub fn new(
        api: Arc<dyn ApiGateway>,
        sms: Arc<dyn SmsTransport>,
        inbox: InboundHub,
        catalog: CommandCatalog,
    ) -> Self {
        Self {
            api,
            sms,
            inbox,
            catalog: Arc::new(catalog),
            settings: ProvisionSettings::default(),
            progress: None,
        }
    }

    pub fn with_settings(mut self, settings: ProvisionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_progress(mut self, progress: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// 在背景啟動佈建，立即回傳
    pub fn provision(&self, details: TrackerDetails, confirm_connectivity: bool) -> ProvisionHandle {
        let (stage_tx, stage_rx) = watch::channel(Stage::Configuration);
        let canceller = SessionCanceller::new();
        let this = self.clone();
        let session_canceller = Arc::clone(&canceller);
        let task = tokio::spawn(async move {
            this.execute(&details, confirm_connectivity, &stage_tx, &session_canceller)
                .await
        });
        ProvisionHandle {
            task,
            stage: stage_rx,
            canceller,
        }
    }

    pub async fn run(&self, details: &TrackerDetails, confirm_connectivity: bool) -> ProvisioningResult {
        let (stage_tx, _) = watch::channel(Stage::Configuration);
        self.execute(details, confirm_connectivity, &stage_tx, &SessionCanceller::new())
            .await
    }

    async fn execute(
        &self,
        details: &TrackerDetails,
        confirm_connectivity: bool,
        stage: &watch::Sender<Stage>,
        canceller: &SessionCanceller,
    ) -> ProvisioningResult {
        tracing::info!(
            "🚀 Starting provisioning of tracker {} ({})",
            details.id(),
            details.model()
        );
        self.emit(ProgressEvent::Started {
            tracker_id: details.id().to_string(),
        });

        let result = self
            .run_stages(details, confirm_connectivity, stage, canceller)
            .await;

        match &result {
            Ok(report) => {
                tracing::info!(
                    "🎉 Tracker {} provisioned in {:?}",
                    report.tracker_id,
                    report.elapsed
                );
                self.emit(ProgressEvent::Finished {
                    success: true,
                    message: "Tracker was successfully provisioned".to_string(),
                });
            }
            Err(failure) => {
                tracing::error!("❌ Provisioning failed: {}", failure);
                self.emit(ProgressEvent::Finished {
                    success: false,
                    message: failure.error.to_string(),
                });
            }
        }
        result
    }

    async fn run_stages(
        &self,
        details: &TrackerDetails,
        confirm_connectivity: bool,
        stage: &watch::Sender<Stage>,
        canceller: &SessionCanceller,
    ) -> ProvisioningResult {
        let started = Instant::now();

        // 任何副作用之前先確認型號、權限與收訊訂閱
        let commands = self
            .catalog
            .lookup(details.model())
            .map_err(at(Stage::Configuration))?
            .clone();
        self.sms.check_permission().map_err(at(Stage::Sms))?;

        let mut session = SmsSession::new(details.phone_number(), commands, Arc::clone(&self.sms))
            .with_pacing(self.settings.send_pacing);
        if self.settings.wait_for_ack {
            let subscription = self.inbox.subscribe().map_err(at(Stage::Sms))?;
            session = session.awaiting_acks(subscription);
        }

        // 註冊與簡訊 session 同時開始
        stage.send_replace(Stage::Registration);
        let session_task = SessionTask::spawn(
            session,
            self.settings.sms_timeout,
            self.settings.abandon_policy,
        );
        canceller.attach(session_task.handle.abort_handle());

        let registration = match registration::register(
            self.api.as_ref(),
            details,
            self.settings.registration_timeout,
        )
        .await
        {
            Ok(outcome) => {
                self.emit(ProgressEvent::Registered(outcome));
                registration::verdict(outcome)
            }
            Err(e) => {
                self.emit(ProgressEvent::RegistrationFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
        .map_err(at(Stage::Registration))?;

        if registration == RegistrationOutcome::DuplicateOwn {
            tracing::warn!(
                "⚠️ Tracker {} already registered to this account, continuing",
                details.id()
            );
        }

        stage.send_replace(Stage::Sms);
        let sms_report = session_task.wait().await.map_err(at(Stage::Sms))?;
        self.emit(ProgressEvent::SmsCompleted {
            acknowledged: sms_report.acknowledged,
        });

        let mut connectivity_confirmed = false;
        if confirm_connectivity {
            stage.send_replace(Stage::ConnectivityWait);
            self.emit(ProgressEvent::ConnectivityWaitStarted);

            let poller = ConnectivityPoller::new(Arc::clone(&self.api))
                .with_interval(self.settings.poll_interval);
            let limit = self.settings.connectivity_timeout;
            match time::timeout(limit, poller.wait_until_connected(details.id())).await {
                Ok(result) => result.map_err(at(Stage::ConnectivityWait))?,
                Err(_) => {
                    return Err(ProvisionFailure::new(
                        Stage::ConnectivityWait,
                        ProvisionError::ConnectivityTimeout { timeout: limit },
                    ));
                }
            }
            connectivity_confirmed = true;
        }

        Ok(ProvisionReport {
            tracker_id: details.id().to_string(),
            registration,
            commands_sent: sms_report.commands_sent,
            acknowledged: sms_report.acknowledged,
            connectivity_confirmed,
            elapsed: started.elapsed(),
        })
    }

    fn emit(&self, event: ProgressEvent) {
        tracing::info!("{}", event.describe());
        if let Some(progress) = &self.progress {
            let _ = progress.send(event);
        }
    }
}
