//! Per-session navigation and zoom state.

use std::sync::Arc;

use crate::cache::PageResource;
use crate::config::ZoomConfig;

/// Lifecycle of the most recent navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavPhase {
    Idle,
    Loading,
    Displayed,
    Failed,
}

/// The page currently on screen, pinned so the renderer's reference stays
/// valid even if the cache evicts it.
#[derive(Debug, Clone)]
pub struct DisplayedPage {
    pub page: u32,
    pub resource: Arc<PageResource>,
}

/// Bounded zoom level, reset whenever a new page is displayed.
#[derive(Debug, Clone, Copy)]
pub struct Zoom {
    level: f32,
    config: ZoomConfig,
}

impl Zoom {
    pub fn new(config: ZoomConfig) -> Self {
        Self { level: 1.0, config }
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn zoom_in(&mut self) -> f32 {
        self.set(self.level + self.config.step)
    }

    pub fn zoom_out(&mut self) -> f32 {
        self.set(self.level - self.config.step)
    }

    pub fn reset(&mut self) -> f32 {
        self.level = 1.0;
        self.level
    }

    pub fn set(&mut self, level: f32) -> f32 {
        self.level = level.clamp(self.config.min, self.config.max);
        self.level
    }
}

#[derive(Debug)]
pub(super) struct SessionState {
    pub current_page: u32,
    pub phase: NavPhase,
    pub zoom: Zoom,
    pub displayed: Option<DisplayedPage>,
}

impl SessionState {
    pub(super) fn new(zoom_config: ZoomConfig) -> Self {
        Self {
            current_page: 1,
            phase: NavPhase::Idle,
            zoom: Zoom::new(zoom_config),
            displayed: None,
        }
    }
}
