//! Line-delimited JSON surface over stdin/stdout
//!
//! Input, one event per line:
//! `{"event":"appear","binding":"k1","action":"toggle_plan"}`
//! `{"event":"appear","binding":"k5","action":"send_command","text":"/log-mistake","label":"Oops"}`
//! `{"event":"disappear","binding":"k1"}`
//! `{"event":"key_down","binding":"k1"}`
//!
//! Output, one display update per line:
//! `{"binding":"k1","op":"set_title","value":"Plan"}`

use super::Surface;
use crate::binding::Action;
use crate::core::error::SurfaceError;
use crate::core::events::{AppEvent, EventSender, SurfaceEvent};
use crate::sync::BindingId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ActionName {
    TogglePlan,
    CycleMode,
    SwitchModel,
    SendCommand,
    YoloIndicator,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Inbound {
    Appear {
        binding: String,
        action: ActionName,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        label: Option<String>,
    },
    Disappear {
        binding: String,
    },
    KeyDown {
        binding: String,
    },
}

#[derive(Debug, Serialize)]
struct Outbound<'a> {
    binding: &'a str,
    op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
}

/// Parse one input line into a surface event
pub fn parse_event(line: &str) -> Result<SurfaceEvent, SurfaceError> {
    let event = match serde_json::from_str::<Inbound>(line)? {
        Inbound::Appear {
            binding,
            action,
            text,
            label,
        } => {
            let action = match action {
                ActionName::TogglePlan => Action::TogglePlan,
                ActionName::CycleMode => Action::CycleMode,
                ActionName::SwitchModel => Action::SwitchModel,
                ActionName::YoloIndicator => Action::YoloIndicator,
                ActionName::SendCommand => {
                    let text = text
                        .filter(|t| !t.trim().is_empty())
                        .ok_or_else(|| {
                            SurfaceError::InvalidEvent(format!(
                                "send_command key {} has no text",
                                binding
                            ))
                        })?;
                    Action::SendCommand { text, label }
                }
            };
            SurfaceEvent::Appear {
                binding: BindingId::new(binding),
                action,
            }
        }
        Inbound::Disappear { binding } => SurfaceEvent::Disappear {
            binding: BindingId::new(binding),
        },
        Inbound::KeyDown { binding } => SurfaceEvent::KeyDown {
            binding: BindingId::new(binding),
        },
    };
    Ok(event)
}

/// Forward events read from `reader` until EOF, then send `AppEvent::SurfaceClosed`
pub async fn read_events<R: AsyncBufRead + Unpin>(reader: R, event_tx: EventSender) {
    let mut lines = reader.lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match parse_event(line) {
                    Ok(event) => {
                        debug!("Surface event: {:?}", event);
                        if event_tx.send(AppEvent::Surface(event)).is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!("Ignoring surface input {:?}: {}", line, e),
                }
            }
            Ok(None) => {
                info!("Surface input closed");
                break;
            }
            Err(e) => {
                warn!("Surface read error: {}", e);
                break;
            }
        }
    }

    let _ = event_tx.send(AppEvent::SurfaceClosed);
}

/// Writes display updates as JSON lines
pub struct StdioSurface<W> {
    writer: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> StdioSurface<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    async fn emit(
        &self,
        binding: &BindingId,
        op: &'static str,
        value: Option<serde_json::Value>,
    ) -> Result<(), SurfaceError> {
        let mut line = serde_json::to_vec(&Outbound {
            binding: binding.as_str(),
            op,
            value,
        })?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Surface for StdioSurface<W> {
    async fn set_title(&self, binding: &BindingId, title: &str) -> Result<(), SurfaceError> {
        self.emit(binding, "set_title", Some(title.into())).await
    }

    async fn set_image(&self, binding: &BindingId, image: &str) -> Result<(), SurfaceError> {
        self.emit(binding, "set_image", Some(image.into())).await
    }

    async fn set_state(&self, binding: &BindingId, state: u8) -> Result<(), SurfaceError> {
        self.emit(binding, "set_state", Some(state.into())).await
    }

    async fn show_ok(&self, binding: &BindingId) -> Result<(), SurfaceError> {
        self.emit(binding, "show_ok", None).await
    }

    async fn show_alert(&self, binding: &BindingId) -> Result<(), SurfaceError> {
        self.emit(binding, "show_alert", None).await
    }
}
