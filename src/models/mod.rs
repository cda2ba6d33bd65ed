// src/models/mod.rs

pub mod question;
pub mod result;
pub mod test;
pub mod user;
