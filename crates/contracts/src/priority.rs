//! Work priority

use serde::{Deserialize, Serialize};

/// Priority of a work item at its readiness instant.
///
/// Discriminants match the wire values used by firmware clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Priority {
    #[default]
    Normal = 5,
    Urgent = 10,
}

impl Priority {
    /// Whether this priority jumps ahead of `Normal` work in the ready queue
    pub fn is_urgent(self) -> bool {
        matches!(self, Priority::Urgent)
    }

    /// Raw numeric value
    pub fn value(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_normal() {
        assert_eq!(Priority::default(), Priority::Normal);
        assert!(!Priority::Normal.is_urgent());
        assert!(Priority::Urgent.is_urgent());
    }

    #[test]
    fn test_raw_values() {
        assert_eq!(Priority::Normal.value(), 5);
        assert_eq!(Priority::Urgent.value(), 10);
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&Priority::Urgent).unwrap();
        assert_eq!(json, "\"urgent\"");
    }
}
