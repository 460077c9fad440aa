use crate::core::inbox::InboundHub;
use crate::domain::model::{ApiResponse, InboundSms};
use crate::domain::ports::{ApiGateway, SmsTransport};
use crate::utils::error::{ProvisionError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// 模擬追蹤器：記錄收到的指令，並透過 hub 回覆預設的簡訊
pub struct FakeDevice {
    hub: InboundHub,
    address: String,
    replies: HashMap<String, Vec<String>>,
    sent: Mutex<Vec<(String, Instant)>>,
    failing: bool,
    denied: bool,
}

impl FakeDevice {
    pub fn new(hub: InboundHub, address: &str) -> Self {
        Self {
            hub,
            address: address.to_string(),
            replies: HashMap::new(),
            sent: Mutex::new(Vec::new()),
            failing: false,
            denied: false,
        }
    }

    pub fn with_reply(mut self, command: &str, reply: &str) -> Self {
        self.replies
            .entry(command.to_string())
            .or_default()
            .push(reply.to_string());
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn denied(mut self) -> Self {
        self.denied = true;
        self
    }

    pub fn sent_commands(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn send_times(&self) -> Vec<Instant> {
        self.sent.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

#[async_trait]
impl SmsTransport for FakeDevice {
    async fn send(&self, _phone_number: &str, text: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((text.to_string(), Instant::now()));
        if self.failing {
            return Err(ProvisionError::SmsTransportError {
                message: "modem unavailable".to_string(),
            });
        }
        for reply in self.replies.get(text).into_iter().flatten() {
            self.hub.publish(InboundSms::new(&self.address, reply));
        }
        Ok(())
    }

    fn check_permission(&self) -> Result<()> {
        if self.denied {
            return Err(ProvisionError::PermissionDenied {
                message: "SEND_SMS not granted".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum Scripted {
    Respond(u16, Option<serde_json::Value>),
    Delay(Duration, u16),
    Fail(String),
}

impl Scripted {
    async fn play(self) -> Result<ApiResponse> {
        match self {
            Scripted::Respond(status, body) => Ok(ApiResponse::new(status, body)),
            Scripted::Delay(delay, status) => {
                tokio::time::sleep(delay).await;
                Ok(ApiResponse::new(status, None))
            }
            Scripted::Fail(message) => Err(ProvisionError::RegistrationTransportError { message }),
        }
    }
}

/// 依腳本回應的後端；腳本用完後重複最後一個回應
pub struct FakeGateway {
    post_script: Mutex<VecDeque<Scripted>>,
    get_script: Mutex<VecDeque<Scripted>>,
    posts: Mutex<Vec<(String, serde_json::Value)>>,
    get_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            post_script: Mutex::new(VecDeque::new()),
            get_script: Mutex::new(VecDeque::new()),
            posts: Mutex::new(Vec::new()),
            get_calls: AtomicUsize::new(0),
        }
    }

    pub fn on_post(self, response: Scripted) -> Self {
        self.post_script.lock().unwrap().push_back(response);
        self
    }

    pub fn on_get(self, response: Scripted) -> Self {
        self.get_script.lock().unwrap().push_back(response);
        self
    }

    pub fn posts(&self) -> Vec<(String, serde_json::Value)> {
        self.posts.lock().unwrap().clone()
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    fn next(script: &Mutex<VecDeque<Scripted>>) -> Scripted {
        let mut script = script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script
                .front()
                .cloned()
                .unwrap_or(Scripted::Respond(404, None))
        }
    }
}

#[async_trait]
impl ApiGateway for FakeGateway {
    async fn get(&self, _path: &str) -> Result<ApiResponse> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Self::next(&self.get_script).play().await
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<ApiResponse> {
        self.posts
            .lock()
            .unwrap()
            .push((path.to_string(), body.clone()));
        Self::next(&self.post_script).play().await
    }
}
