//! Deciding whether a license belongs to a caller.
//!
//! The licensing API has no "licenses of user X" endpoint, so `license list`
//! pulls the application listing and filters it here. Matching compares the
//! caller's handles against the owner fields of each license, in a configured
//! field order. A license whose owner field holds a value the bot never sees
//! (an internal upstream user id, say) is a false negative.

use crate::protocol::models::{LicenseRecord, OWNER_FIELDS};

/// Ownership predicate used to filter license listings.
pub trait OwnershipRule: Send + Sync {
    /// Whether any of `handles` owns `license`.
    fn owns(&self, handles: &[&str], license: &LicenseRecord) -> bool;
}

/// Matches caller handles against a configured list of owner fields.
#[derive(Debug, Clone)]
pub struct FieldPrecedenceMatcher {
    fields: Vec<String>,
}

impl FieldPrecedenceMatcher {
    /// Build from an ordered list of upstream field names.
    ///
    /// Blank entries are dropped. An empty list falls back to
    /// [`OWNER_FIELDS`].
    pub fn new(fields: impl IntoIterator<Item = String>) -> Self {
        let fields: Vec<String> = fields
            .into_iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();
        if fields.is_empty() {
            return Self::default();
        }
        Self { fields }
    }

    /// Parse a comma-separated field list such as `LICENSE_OWNER_FIELDS`.
    pub fn from_csv(raw: &str) -> Self {
        Self::new(raw.split(',').map(str::to_string))
    }

    /// Configured fields, in precedence order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

impl Default for FieldPrecedenceMatcher {
    fn default() -> Self {
        Self {
            fields: OWNER_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl OwnershipRule for FieldPrecedenceMatcher {
    fn owns(&self, handles: &[&str], license: &LicenseRecord) -> bool {
        self.fields.iter().any(|field| {
            license
                .owner_claims
                .iter()
                .filter(|claim| claim.field.eq_ignore_ascii_case(field))
                .any(|claim| {
                    let value = claim.value.trim();
                    handles
                        .iter()
                        .any(|h| !h.is_empty() && value.eq_ignore_ascii_case(h.trim()))
                })
        })
    }
}
