//! Room Protocol - wire format for the chat relay
//!
//! This crate defines the line-oriented frame format spoken between
//! chat clients and the relay daemon: `sender>>payload\n`.

pub mod frame;

pub use frame::{Frame, FrameError, FRAME_SEPARATOR, MAX_FRAME_BYTES, ROOM_SENDER};
