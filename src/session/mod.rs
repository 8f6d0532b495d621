//! Session module for optosigma-shot.
//!
//! A session owns one controller, the axes bound to it, and the port while
//! connected. Every operation runs encode, send, receive, decode, and state
//! update in turn.

mod axis;
mod builder;
mod driver;
pub mod state;

pub use axis::Axis;
pub use builder::SessionBuilder;
pub use driver::Session;
pub use state::MotionState;
