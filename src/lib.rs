// Six-axis CAN move runtime: converts G-code style move files into per-axis
// controller frames and drives the send/acknowledge handshake over an
// injected bus handle.

pub mod config;
pub mod gcode;
pub mod messages;
pub mod motor;
pub mod runtime;
