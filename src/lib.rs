//! Reverie Engine — a fifteen-round image selection ritual that ends in a
//! collage and a keepsake poem.
//!
//! Participants pick one of two images for each surreal prompt. Every round
//! is laid out on a live canvas without overlap, the chosen images are
//! gathered into a grid collage at their picked sizes, and four of the
//! prompts are woven into a short constrained poem.

pub mod catalog;
pub mod core;
pub mod schema;
