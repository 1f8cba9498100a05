//! Display-name uniqueness across sessions
//!
//! Several devices often share a model name. The first session to claim a
//! base name gets it as-is, later ones get `"{name} 2"`, `"{name} 3"` and so
//! on. The counter map is owned by the host and shared by every session it
//! builds.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared name → count map handing out unique display names
#[derive(Debug, Clone, Default)]
pub struct DisplayNames {
    counts: Arc<Mutex<HashMap<String, u32>>>,
}

impl DisplayNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the next display name for `base`
    pub fn claim(&self, base: &str) -> String {
        let mut counts = self.counts.lock();
        let count = counts.entry(base.to_string()).or_insert(0);
        *count += 1;
        match *count {
            1 => base.to_string(),
            n => format!("{} {}", base, n),
        }
    }

    /// How many times `base` has been claimed
    pub fn count(&self, base: &str) -> u32 {
        self.counts.lock().get(base).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_numbered_per_base() {
        let names = DisplayNames::new();
        assert_eq!(names.claim("color"), "color");
        assert_eq!(names.claim("color"), "color 2");
        assert_eq!(names.claim("ceiling4"), "ceiling4");
        assert_eq!(names.claim("color"), "color 3");
        assert_eq!(names.count("color"), 3);
        assert_eq!(names.count("mono"), 0);
    }

    #[test]
    fn test_clones_share_counts() {
        let names = DisplayNames::new();
        let other = names.clone();
        names.claim("Desk");
        assert_eq!(other.claim("Desk"), "Desk 2");
    }
}
