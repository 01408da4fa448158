//! Provider status vocabulary.
//!
//! Banks and PSPs report the same three outcomes under many names
//! (`PAID`, `CONCLUIDA`, `REMOVIDA_PELO_PSP`, ...). Every accepted spelling is
//! listed here; anything else is rejected as unmapped rather than guessed.

use std::fmt;

/// Outcome reported by the bank, reduced to the events the settlement
/// machine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Paid,
    Pending,
    Failed,
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderStatus::Paid => "paid",
            ProviderStatus::Pending => "pending",
            ProviderStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

const STATUS_TABLE: &[(&str, ProviderStatus)] = &[
    ("paid", ProviderStatus::Paid),
    ("completed", ProviderStatus::Paid),
    ("confirmed", ProviderStatus::Paid),
    ("settled", ProviderStatus::Paid),
    ("concluida", ProviderStatus::Paid),
    ("pending", ProviderStatus::Pending),
    ("processing", ProviderStatus::Pending),
    ("waiting", ProviderStatus::Pending),
    ("ativa", ProviderStatus::Pending),
    ("failed", ProviderStatus::Failed),
    ("rejected", ProviderStatus::Failed),
    ("cancelled", ProviderStatus::Failed),
    ("expired", ProviderStatus::Failed),
    ("removida_pelo_psp", ProviderStatus::Failed),
    ("removida_pelo_usuario_recebedor", ProviderStatus::Failed),
];

/// Case-insensitive lookup. `None` means the provider sent something we do
/// not know how to interpret.
pub fn map_provider_status(raw: &str) -> Option<ProviderStatus> {
    let needle = raw.trim();
    STATUS_TABLE
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(needle))
        .map(|(_, status)| *status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_core_vocabulary_case_insensitively() {
        assert_eq!(map_provider_status("PAID"), Some(ProviderStatus::Paid));
        assert_eq!(map_provider_status("paid"), Some(ProviderStatus::Paid));
        assert_eq!(map_provider_status(" Pending "), Some(ProviderStatus::Pending));
        assert_eq!(map_provider_status("FAILED"), Some(ProviderStatus::Failed));
    }

    #[test]
    fn maps_provider_synonyms() {
        assert_eq!(map_provider_status("CONCLUIDA"), Some(ProviderStatus::Paid));
        assert_eq!(map_provider_status("ATIVA"), Some(ProviderStatus::Pending));
        assert_eq!(
            map_provider_status("REMOVIDA_PELO_PSP"),
            Some(ProviderStatus::Failed)
        );
    }

    #[test]
    fn unknown_status_is_unmapped() {
        assert_eq!(map_provider_status("ON_HOLD"), None);
        assert_eq!(map_provider_status(""), None);
    }
}
