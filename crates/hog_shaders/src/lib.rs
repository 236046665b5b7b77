//! Centralized storage for WGSL shader sources and shader-related helpers.

/// HOG compute kernels. Every module binds the shared `Params` uniform at `@binding(0)`.
pub mod compute {
    pub const NORMALIZE: &str = include_str!("kernels/normalize.wgsl");
    pub const GRADIENT: &str = include_str!("kernels/gradient.wgsl");
    pub const DESCRIPTOR: &str = include_str!("kernels/descriptor.wgsl");

    pub const NORMALIZE_ENTRY: &str = "normalize_kernel";
    pub const GRADIENT_ENTRY: &str = "gradient_kernel";
    pub const DESCRIPTOR_ENTRY: &str = "descriptor_kernel";

    /// Workgroup edge of the per-pixel kernels (normalize, gradient).
    pub const PIXEL_WORKGROUP: u32 = 16;
    /// Workgroup edge of the per-block descriptor kernel.
    pub const BLOCK_WORKGROUP: u32 = 8;
}
