use super::command_class::CommandClass;
use super::message::{Command, ConfigurationValue, Report, Request};
use super::node::Node;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use log::warn;
use std::time::Duration;

/// Transport-side view of one paired device.
///
/// Implemented by the Z-Wave session layer; the capability layer only sees
/// decoded reports and typed commands. `endpoint = None` addresses the node
/// itself (or, for a sub-endpoint view, that sub-endpoint).
#[async_trait]
pub trait ZwaveNode: Send + Sync + 'static {
    /// Immutable node graph captured at pairing.
    fn node(&self) -> &Node;

    async fn configuration_get(&self, index: u16) -> Result<ConfigurationValue>;

    async fn configuration_set(&self, index: u16, size: u8, value: i64) -> Result<()>;

    async fn send_command(&self, endpoint: Option<u8>, command: Command) -> Result<()>;

    /// Issue a status query and wait for the matching report.
    async fn request(&self, endpoint: Option<u8>, request: Request) -> Result<Report>;

    /// Ask the transport to forward reports of a command class to the session.
    fn register_report_listener(
        &self,
        endpoint: Option<u8>,
        command_class: CommandClass,
        report: &'static str,
    );
}

/// Read a configuration parameter, retrying a bounded number of times.
///
/// Each failed attempt is logged. Timeouts count as failed attempts.
pub async fn configuration_get_with_retry(
    node: &dyn ZwaveNode,
    index: u16,
    attempts: u32,
    timeout: Duration,
) -> Result<ConfigurationValue> {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match tokio::time::timeout(timeout, node.configuration_get(index)).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                warn!(
                    "[Transport] Configuration get {} failed (attempt {}/{}): {}",
                    index, attempt, attempts, e
                );
            }
            Err(_) => {
                warn!(
                    "[Transport] Configuration get {} timed out (attempt {}/{})",
                    index, attempt, attempts
                );
            }
        }
    }
    Err(BridgeError::ConfigurationGetFailed { index, attempts })
}
