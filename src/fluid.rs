//! Size resolution for fluid placeholders whose box follows their container.

use crate::descriptor::PlaceholderSpec;

/// A live element content box in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoxSize {
    pub width: f32,
    pub height: f32,
}

impl BoxSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Not yet laid out or hidden: true when either axis is zero, negative or
    /// NaN, not only for a fully collapsed 0x0 box.
    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// Which axis follows the container while the other stays proportional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FluidMode {
    Width,
    Height,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Readiness {
    NotReady,
    Ready(BoxSize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FluidConfig {
    pub fluid_width: bool,
    pub fluid_height: bool,
    pub auto: bool,
    pub mode: Option<FluidMode>,
    /// Width over height, fixed at capture time.
    pub ratio: Option<f32>,
    pub initial: BoxSize,
}

impl FluidConfig {
    /// Captures the aspect ratio from the first non-degenerate box.
    pub fn capture(spec: &PlaceholderSpec, initial: BoxSize) -> Option<Self> {
        if initial.is_degenerate() {
            return None;
        }
        let fluid_width = spec.dimensions.width.is_percent();
        let fluid_height = spec.dimensions.height.is_percent();
        let fixed_width = spec.dimensions.width.value() as f32;
        let fixed_height = spec.dimensions.height.value() as f32;

        let (mode, ratio) = match (fluid_width, fluid_height) {
            (true, false) if fixed_height > 0.0 => {
                (Some(FluidMode::Width), Some(initial.width / fixed_height))
            }
            (false, true) => (Some(FluidMode::Height), Some(fixed_width / initial.height)),
            _ => (None, None),
        };

        Some(Self {
            fluid_width,
            fluid_height,
            auto: spec.auto,
            mode,
            ratio,
            initial,
        })
    }

    /// Size to lay out with for the element's current box.
    pub fn resolve(&self, current: BoxSize) -> Readiness {
        if current.is_degenerate() {
            return Readiness::NotReady;
        }
        let mut size = current;
        if self.auto
            && let (Some(mode), Some(ratio)) = (self.mode, self.ratio)
            && ratio > 0.0
        {
            match mode {
                FluidMode::Width => size.height = size.width / ratio,
                FluidMode::Height => size.width = size.height * ratio,
            }
        }
        Readiness::Ready(size)
    }
}
