#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
    /// The host toolkit or the canvas' drawing surface could not be obtained or locked.
    #[error("host drawing surface is unavailable")]
    SurfaceUnavailable,

    #[error("host drawing surface info is unavailable")]
    SurfaceInfoUnavailable,

    #[error("host drawing surface carries no platform info")]
    PlatformInfoMissing,

    #[error("no framebuffer configuration matches the requested pixel format")]
    NoCompatibleConfig,

    #[error("graphics context creation failed: {0}")]
    ContextCreationFailed(String),

    #[error("failed to make the graphics context current")]
    MakeCurrentFailed,

    /// `activate`/`deactivate` were not called in alternating pairs.
    #[error("activation scope violated: {0}")]
    ScopeViolation(&'static str),

    #[error("failed to load graphics library: {0}")]
    Loading(String),

    #[error("frame rendering failed: {0}")]
    Render(String),

    #[cfg(feature = "canvas-vulkan")]
    #[error("Vulkan error: {0}")]
    Vulkan(ash::vk::Result),
}

/// Convenient crate-wide result type.
pub type Result<T, E = CanvasError> = std::result::Result<T, E>;

#[cfg(feature = "canvas-vulkan")]
impl From<ash::vk::Result> for CanvasError {
    fn from(res: ash::vk::Result) -> Self {
        CanvasError::Vulkan(res)
    }
}

#[cfg(feature = "canvas-vulkan")]
impl From<ash::LoadingError> for CanvasError {
    fn from(err: ash::LoadingError) -> Self {
        CanvasError::Loading(err.to_string())
    }
}

#[cfg(feature = "canvas-opengl")]
impl From<libloading::Error> for CanvasError {
    fn from(err: libloading::Error) -> Self {
        CanvasError::Loading(err.to_string())
    }
}
