pub mod classes;
pub mod core;
pub mod coursework;
pub mod gpa;
pub mod setup;
