// src/models/mod.rs

pub mod comment;
pub mod image;
pub mod post;
pub mod user;
pub mod vote;
