//! Outbound mail capability.
//!
//! Delivery itself belongs to an external service; the server only needs
//! something that accepts a destination, a template name and its data.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

/// Template used for the registration activation code.
pub const ACTIVATION_TEMPLATE: &str = "activation-mail";

#[derive(Debug, thiserror::Error)]
#[error("mail delivery failed: {0}")]
pub struct MailError(pub String);

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, destination: &str, template: &str, data: Value) -> Result<(), MailError>;
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, destination: &str, template: &str, data: Value) -> Result<(), MailError> {
        info!(to = %destination, template = %template, data = %redacted(&data), "Mail queued");
        debug!(to = %destination, data = %data, "Unredacted mail data");
        Ok(())
    }
}

/// Copy of template data with every `*Code` / `*code` value masked.
fn redacted(data: &Value) -> Value {
    match data {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let value = if key.ends_with("Code") || key.ends_with("code") {
                        Value::String("***".to_string())
                    } else {
                        redacted(value)
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redacted).collect()),
        other => other.clone(),
    }
}
