/// The role being assumed: `arn:aws:iam::{account_id}:role/{role}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTarget {
    pub account_id: String,
    pub role: String,
}

impl RoleTarget {
    pub fn new(account_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            role: role.into(),
        }
    }

    pub fn role_arn(&self) -> String {
        format!("arn:aws:iam::{}:role/{}", self.account_id, self.role)
    }
}

/// Check for the 12 ASCII digits of an AWS account id
pub fn is_valid_account_id(s: &str) -> bool {
    s.len() == 12 && s.chars().all(|c| c.is_ascii_digit())
}
