//! Multi-touch input for shared-screen games: OSC/TUIO transport, touch routing,
//! clustering and gesture recognition, driven one frame at a time.

pub mod app;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod context;
pub mod daemon;
pub mod dispatch;
pub mod geom;
pub mod gesture;
pub mod input;
pub mod logging;
pub mod osc;
pub mod router;
pub mod targets;
pub mod touch;
pub mod tuio;
