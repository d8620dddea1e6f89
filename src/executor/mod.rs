pub mod dispatcher;
pub mod enigo_backend;
pub mod input;
pub mod keymap;
pub mod transport;
pub mod validate;
pub mod xdotool;
