//! Surface runtime boundary - display updates for individual controls

mod stdio;

pub use stdio::{parse_event, read_events, StdioSurface};

use crate::core::error::SurfaceError;
use crate::sync::BindingId;
use async_trait::async_trait;

/// Display-update calls the surface runtime accepts for one control
#[async_trait]
pub trait Surface: Send + Sync {
    async fn set_title(&self, binding: &BindingId, title: &str) -> Result<(), SurfaceError>;

    /// Show a named icon; how it is drawn is up to the runtime
    async fn set_image(&self, binding: &BindingId, image: &str) -> Result<(), SurfaceError>;

    /// Visual state index of a two-state control
    async fn set_state(&self, binding: &BindingId, state: u8) -> Result<(), SurfaceError>;

    /// Transient success acknowledgement
    async fn show_ok(&self, binding: &BindingId) -> Result<(), SurfaceError>;

    /// Transient failure indicator
    async fn show_alert(&self, binding: &BindingId) -> Result<(), SurfaceError>;
}
