//! Pixel marshaling between photo images and Rust pixel arrays.
//!
//! - [`pixel`]: 8-bit pixel types, packed [`Layout`]s and photo colorants.
//! - [`block`]: [`PixelBlock`], a validated strided view, and its reads.
//! - [`photo`]: [`Photo`], a named image in an interpreter.

pub mod block;
pub mod photo;
pub mod pixel;

pub use block::{pack, Axis, PixelArray, PixelBlock, Pixels};
pub use photo::Photo;
pub use pixel::{luma, AGray, Abgr, Argb, Bgr, Bgra, Colorant, Gray, GrayA, Layout, Pixel, Rgb, Rgba};
