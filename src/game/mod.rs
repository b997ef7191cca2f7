pub mod autoplay;
pub mod beatmap;
pub mod column;
pub mod editor;
pub mod events;
pub mod judgment;
pub mod note;
pub mod parsing;
pub mod player;
pub mod scores;
pub mod timing;
