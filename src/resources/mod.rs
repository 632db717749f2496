/**
 * GPU resource wrappers. Every object here owns its wgpu handles and
 * releases them when dropped; nothing hands out raw ids into a shared table.
 */
pub mod framebuffer;
pub mod instance;
pub mod mesh;
pub mod texture;
