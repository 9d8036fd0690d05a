use std::ffi::c_void;
use std::ptr::NonNull;

#[cfg(feature = "canvas-serde")]
use serde::{Deserialize, Serialize};

/// Environment switch that turns on API validation regardless of [`ContextInfo::validation`].
pub const VALIDATION_ENV: &str = "CANVAS_GFX_VALIDATION";

/// Resolved entry point of a GPU extension function.
pub type ProcAddress = NonNull<c_void>;

/// Pixel dimensions of a canvas or presentation target.
#[repr(C)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "canvas-serde", derive(Serialize, Deserialize))]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero.
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<[u32; 2]> for Size {
    fn from(value: [u32; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

#[repr(C)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "canvas-serde", derive(Serialize, Deserialize))]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub size: Size,
}

impl Viewport {
    /// Viewport covering the whole of `size` from the origin.
    pub const fn full(size: Size) -> Self {
        Self { x: 0, y: 0, size }
    }
}

/// Framebuffer and viewport the context is assumed to have bound.
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Binding {
    pub framebuffer: u32,
    pub viewport: Viewport,
}

impl Binding {
    /// Default framebuffer with a viewport spanning `size`.
    pub const fn default_for(size: Size) -> Self {
        Self {
            framebuffer: 0,
            viewport: Viewport::full(size),
        }
    }
}

/// The default presentation target handed to the renderer.
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Renderable {
    pub size: Size,
    pub framebuffer: u32,
}

#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "canvas-serde", derive(Serialize, Deserialize))]
pub struct FramebufferConfig {
    pub red_bits: u8,
    pub green_bits: u8,
    pub blue_bits: u8,
    pub alpha_bits: u8,
    pub depth_bits: u8,
    pub stencil_bits: u8,
    pub double_buffered: bool,
}

impl Default for FramebufferConfig {
    fn default() -> Self {
        Self {
            red_bits: 8,
            green_bits: 8,
            blue_bits: 8,
            alpha_bits: 8,
            depth_bits: 24,
            stencil_bits: 8,
            double_buffered: true,
        }
    }
}

/// Requested core-profile version for the raster context.
#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "canvas-serde", derive(Serialize, Deserialize))]
pub struct GlVersion {
    pub major: u8,
    pub minor: u8,
}

impl Default for GlVersion {
    fn default() -> Self {
        Self { major: 3, minor: 0 }
    }
}

#[repr(C)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "canvas-serde", derive(Serialize, Deserialize))]
pub enum WindowBuffering {
    #[default]
    Double,
    Triple,
}

impl WindowBuffering {
    pub const fn image_count(&self) -> u32 {
        match self {
            WindowBuffering::Double => 2,
            WindowBuffering::Triple => 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "canvas-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "canvas-serde", serde(default))]
pub struct ContextInfo {
    pub framebuffer: FramebufferConfig,
    pub gl_version: GlVersion,
    pub application_name: String,
    pub vsync: bool,
    pub buffering: WindowBuffering,
    pub validation: bool,
}

impl Default for ContextInfo {
    fn default() -> Self {
        Self {
            framebuffer: Default::default(),
            gl_version: Default::default(),
            application_name: "canvas-gfx".to_string(),
            vsync: true,
            buffering: Default::default(),
            validation: false,
        }
    }
}

impl ContextInfo {
    /// Whether API validation should be enabled, either by field or by
    /// `CANVAS_GFX_VALIDATION=1`.
    pub fn validation_requested(&self) -> bool {
        self.validation
            || std::env::var(VALIDATION_ENV)
                .map(|v| v == "1")
                .unwrap_or(false)
    }
}

/// When a context provider builds its context relative to backend construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitPolicy {
    /// Created while the backend is constructed.
    Eager,
    /// Created on the first activation.
    Lazy,
}
