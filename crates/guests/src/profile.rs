use serde::{Deserialize, Serialize};

use staydesk_core::DomainError;

/// Guest contact profile, captured at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestProfile {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
}

impl Default for GuestProfile {
    fn default() -> Self {
        Self {
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            phone: None,
        }
    }
}

impl GuestProfile {
    /// "First Last", as shown in the admin directory.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Trim every field and check the registration rules.
    pub fn normalized(self) -> Result<Self, DomainError> {
        let first_name = self.first_name.trim().to_string();
        let last_name = self.last_name.trim().to_string();
        let email = self.email.trim().to_string();
        let phone = self
            .phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        if first_name.is_empty() {
            return Err(DomainError::validation("first name cannot be empty"));
        }
        if last_name.is_empty() {
            return Err(DomainError::validation("last name cannot be empty"));
        }
        validate_email(&email)?;

        Ok(Self {
            first_name,
            last_name,
            email,
            phone,
        })
    }
}

fn validate_email(email: &str) -> Result<(), DomainError> {
    let mut parts = email.split('@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();
    if local.is_empty() || domain.is_empty() || parts.next().is_some() {
        return Err(DomainError::validation(format!("invalid email address '{email}'")));
    }
    Ok(())
}
