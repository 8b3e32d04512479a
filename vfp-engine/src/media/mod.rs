//! Media data types shared by every pipeline stage

pub mod frame;

pub use frame::{Frame, FramePayload, PixelFormat, Plane};
