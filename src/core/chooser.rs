//! Selection seam between the core and whatever renders choices.
//!
//! Choices come back as indices into the offered items, so callers never
//! have to parse a rendered label to recover what was picked.

use std::io;

pub trait Chooser {
    /// Pick one item. `None` means the user backed out.
    fn select(&self, prompt: &str, items: &[String]) -> io::Result<Option<usize>>;

    /// Pick any number of items, in the order given by the user.
    fn multiselect(&self, prompt: &str, items: &[String]) -> io::Result<Vec<usize>>;
}

/// Always answers with preset indices. Used by tests and scripted runs.
#[derive(Debug, Clone, Default)]
pub struct FixedChooser {
    pub picks: Vec<usize>,
}

impl FixedChooser {
    pub fn new(picks: impl Into<Vec<usize>>) -> Self {
        Self {
            picks: picks.into(),
        }
    }
}

impl Chooser for FixedChooser {
    fn select(&self, _prompt: &str, items: &[String]) -> io::Result<Option<usize>> {
        Ok(self.picks.first().copied().filter(|&i| i < items.len()))
    }

    fn multiselect(&self, _prompt: &str, items: &[String]) -> io::Result<Vec<usize>> {
        Ok(self
            .picks
            .iter()
            .copied()
            .filter(|&i| i < items.len())
            .collect())
    }
}
