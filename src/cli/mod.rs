pub mod audio;
pub mod command;
pub mod fic;
pub mod progress;
