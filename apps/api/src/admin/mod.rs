//! School admin views: the student roster and the inline score editor.

pub mod editor;
pub mod gate;
pub mod handlers;
pub mod roster;
