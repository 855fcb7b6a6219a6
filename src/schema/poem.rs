use serde::{Deserialize, Serialize};

/// A finished poem. `lines[0]` is the title line and equals `title`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poem {
    pub title: String,
    pub lines: Vec<String>,
}

impl Poem {
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Lines after the title.
    pub fn body(&self) -> &[String] {
        self.lines.get(1..).unwrap_or(&[])
    }

    pub fn to_text(&self) -> String {
        self.lines.join("\n")
    }
}
