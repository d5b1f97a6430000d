pub mod play;
pub mod serve;

pub use play::{handle_play, PlayArgs};
pub use serve::{handle_serve, ServeArgs};
