use log::debug;

use crate::errors::{KilnError, Result};
use crate::renderer::device::{GpuDevice, RenderTargetId};

/// Where a frame is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameTarget {
    #[default]
    BackBuffer,
    /// One of the renderer's pooled offscreen color + depth targets.
    Offscreen(usize),
}

/// Fixed-size pool of offscreen targets, created on first use.
#[derive(Debug)]
pub struct RenderTargetPool {
    slots: Vec<Option<RenderTargetId>>,
    width: u32,
    height: u32,
}

impl RenderTargetPool {
    #[must_use]
    pub fn new(size: usize, width: u32, height: u32) -> Self {
        Self {
            slots: vec![None; size],
            width,
            height,
        }
    }

    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Target `index`, creating it if this is its first use.
    pub fn acquire(&mut self, device: &mut impl GpuDevice, index: usize) -> Result<RenderTargetId> {
        let pool_size = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(KilnError::RenderTargetOutOfRange { index, pool_size })?;

        if let Some(target) = slot {
            return Ok(*target);
        }
        let target = device.create_render_target(self.width, self.height)?;
        debug!("Created offscreen target {index} ({}x{})", self.width, self.height);
        *slot = Some(target);
        Ok(target)
    }

    pub fn destroy(&mut self, device: &mut impl GpuDevice) {
        for slot in &mut self.slots {
            if let Some(target) = slot.take() {
                device.delete_render_target(target);
            }
        }
    }
}
