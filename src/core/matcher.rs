use crate::domain::model::{CommandSet, InboundSms};

/// 單則簡訊對比對器造成的影響
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckEvent {
    /// 寄件者不是目標追蹤器
    ForeignSender,
    /// 內容不含目前期待的關鍵字
    NoMatch,
    /// 已確認第 `index` 個指令
    Advanced { index: usize },
    /// 最後一個指令也已確認
    Completed,
    /// 已完成後才收到的簡訊
    AlreadyComplete,
}

/// 只往前推進的確認比對器：一次只比對 `success_keywords[expected_index]`
#[derive(Debug, Clone)]
pub struct AckMatcher {
    keywords: Vec<String>,
    target_phone_number: String,
    expected_index: usize,
}

impl AckMatcher {
    pub fn new(commands: &CommandSet, target_phone_number: &str) -> Self {
        Self {
            keywords: commands.success_keywords().to_vec(),
            target_phone_number: target_phone_number.to_string(),
            expected_index: 0,
        }
    }

    pub fn expected_index(&self) -> usize {
        self.expected_index
    }

    pub fn total(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_complete(&self) -> bool {
        self.expected_index >= self.keywords.len()
    }

    pub fn expected_keyword(&self) -> Option<&str> {
        self.keywords.get(self.expected_index).map(String::as_str)
    }

    pub fn accept(&mut self, sms: &InboundSms) -> AckEvent {
        if !sms.is_from(&self.target_phone_number) {
            return AckEvent::ForeignSender;
        }
        let Some(keyword) = self.expected_keyword() else {
            return AckEvent::AlreadyComplete;
        };
        if !sms.body.contains(keyword) {
            return AckEvent::NoMatch;
        }

        let index = self.expected_index;
        self.expected_index += 1;
        if self.is_complete() {
            AckEvent::Completed
        } else {
            AckEvent::Advanced { index }
        }
    }
}
