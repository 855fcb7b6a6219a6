pub mod placement;
pub mod poem;
pub mod prompt;
