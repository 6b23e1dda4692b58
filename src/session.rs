//! Instrument sessions.
//!
//! The facade talks to the meter through a [`Session`], obtained from a
//! [`SessionFactory`] that the caller constructs and hands over. The VXI-11
//! implementation is the one used against real hardware; tests use the
//! scripted session in [`crate::mock`].

use std::time::Duration;

use async_trait::async_trait;
use tokio_vxi11::DeviceClient;
use tracing::debug;

use crate::address::Address;
use crate::error::{Error, Result};

const MAX_READ: u32 = 4096;

/// An open connection to one instrument.
#[async_trait]
pub trait Session: Send {
    /// Send a command that produces no reply.
    async fn write(&mut self, command: &str) -> Result<()>;

    /// Send a command and return its trimmed, non-empty reply.
    async fn query(&mut self, command: &str) -> Result<String>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens sessions from address strings.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: Session;

    async fn open(&self, address: &str) -> Result<Self::Session>;
}

/// Opens VXI-11 sessions over LAN.
#[derive(Debug, Clone, Default)]
pub struct Vxi11Factory {
    timeout: Option<Duration>,
}

impl Vxi11Factory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

#[async_trait]
impl SessionFactory for Vxi11Factory {
    type Session = Vxi11Session;

    async fn open(&self, address: &str) -> Result<Vxi11Session> {
        let target: Address = address.parse()?;
        let connect_err = |e| Error::Connect {
            address: address.to_string(),
            source: anyhow::Error::from(e),
        };
        let inner = match self.timeout {
            Some(timeout) => {
                DeviceClient::connect_with_timeout(&target.host, &target.device, timeout)
                    .await
                    .map_err(connect_err)?
            }
            None => DeviceClient::connect(&target.host, &target.device)
                .await
                .map_err(connect_err)?,
        };
        debug!("VXI-11 link open to {} ({})", target.host, target.device);
        Ok(Vxi11Session { inner })
    }
}

pub struct Vxi11Session {
    inner: DeviceClient,
}

#[async_trait]
impl Session for Vxi11Session {
    async fn write(&mut self, command: &str) -> Result<()> {
        debug!("SCPI write  -> {}", command);
        self.inner
            .write(format!("{command}\n").as_bytes())
            .await
            .map_err(|e| Error::Command {
                command: command.to_string(),
                source: anyhow::Error::from(e),
            })?;
        Ok(())
    }

    async fn query(&mut self, command: &str) -> Result<String> {
        debug!("SCPI query  -> {}", command);
        self.write(command).await?;
        let resp = self.inner.read(MAX_READ).await.map_err(|e| Error::Command {
            command: command.to_string(),
            source: anyhow::Error::from(e),
        })?;
        let trimmed = clean_reply(&String::from_utf8_lossy(&resp));

        debug!("SCPI result <- {}", trimmed);

        if trimmed.is_empty() {
            return Err(Error::EmptyReply {
                command: command.to_string(),
            });
        }
        Ok(trimmed)
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await.map_err(|e| Error::Command {
            command: "close".to_string(),
            source: anyhow::Error::from(e),
        })?;
        Ok(())
    }
}

/// Strip the NUL padding and line terminators some firmware leaves on replies.
pub(crate) fn clean_reply(raw: &str) -> String {
    raw.trim_matches(char::from(0)).trim().to_string()
}
