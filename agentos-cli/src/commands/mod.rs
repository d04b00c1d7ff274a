pub mod agents;
pub mod render;

pub use agents::{cmd_kill, cmd_resume, cmd_show, cmd_start, cmd_watch};
