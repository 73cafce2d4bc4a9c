use log::{debug, info, warn};

/// Log sink handed to every stage, prefixing messages with the channel tag.
#[derive(Debug, Clone, Default)]
pub struct LogManager {
    tag: Option<String>,
}

impl LogManager {
    pub fn new() -> Self {
        Self { tag: None }
    }

    pub fn tagged(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
        }
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn debug(&self, message: &str) {
        match &self.tag {
            Some(tag) => debug!("[{}] {}", tag, message),
            None => debug!("{}", message),
        }
    }

    pub fn record(&self, message: &str) {
        match &self.tag {
            Some(tag) => info!("[{}] {}", tag, message),
            None => info!("{}", message),
        }
    }

    pub fn warn(&self, message: &str) {
        match &self.tag {
            Some(tag) => warn!("[{}] {}", tag, message),
            None => warn!("{}", message),
        }
    }
}
