use serde::{Deserialize, Serialize};

/// The slice of a user record the notification layer reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub promotion: Option<String>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>, promotion: Option<&str>) -> Self {
        Self {
            id: id.into(),
            promotion: promotion.map(str::to_string),
        }
    }

    /// Cohort used for broadcast filtering, upper-cased.
    pub fn cohort(&self) -> Option<String> {
        self.promotion
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_uppercase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cohort_normalization() {
        assert_eq!(UserProfile::new("u1", Some("3info")).cohort(), Some("3INFO".to_string()));
        assert_eq!(UserProfile::new("u2", Some("  ")).cohort(), None);
        assert_eq!(UserProfile::new("u3", None).cohort(), None);
    }
}
