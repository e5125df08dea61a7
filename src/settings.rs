//! Settings of the service, which are configurable using environment variables.
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use dicom_ul::pdu::{MAXIMUM_PDU_SIZE, MINIMUM_PDU_SIZE};
use serde::Deserialize;

use crate::ae_title::{AeTitlePolicy, OurAETitle};
use crate::error::SettingsError;
use crate::negotiator::Negotiator;
use crate::transfer_syntax::{
    TransferSyntaxPolicy, default_storage_transfer_syntaxes,
    default_verification_transfer_syntaxes,
};


#[derive(Debug, Clone, Deserialize)]
pub struct ScpSettings {
    /// Our AE title.
    #[serde(default = "default_aet")]
    pub aet: OurAETitle,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Associations handled at the same time. Any more are rejected.
    #[serde(default = "default_max_associations")]
    pub max_associations: NonZeroUsize,
    /// Maximum length of PDUs we receive.
    #[serde(default = "default_max_pdu_length")]
    pub max_pdu_length: u32,
    /// Whether receiving PDUs must not surpass the maximum PDU length.
    #[serde(default)]
    pub strict: bool,
    /// Called AE titles we answer to.
    #[serde(default)]
    pub called_ae_policy: AeTitlePolicy,
    /// Calling AE titles we accept associations from.
    #[serde(default)]
    pub calling_ae_policy: AeTitlePolicy,
    /// Transfer syntaxes for Verification, in order of preference.
    #[serde(default = "default_verification_transfer_syntaxes")]
    pub verification_transfer_syntaxes: Vec<String>,
    /// Transfer syntaxes for storage, in order of preference.
    #[serde(default = "default_storage_transfer_syntaxes")]
    pub storage_transfer_syntaxes: Vec<String>,
    /// Whether to accept unknown abstract syntaxes.
    #[serde(default)]
    pub promiscuous: bool,
    /// Abort associations idle for longer than this.
    #[serde(default, with = "humantime_serde")]
    pub idle_timeout: Option<Duration>,
    /// Where to write received instances. Without it, instances are acknowledged and
    /// discarded.
    #[serde(default)]
    pub files_root: Option<Utf8PathBuf>,
}

impl Default for ScpSettings {
    fn default() -> Self {
        Self {
            aet: default_aet(),
            port: default_port(),
            max_associations: default_max_associations(),
            max_pdu_length: default_max_pdu_length(),
            strict: false,
            called_ae_policy: AeTitlePolicy::Any,
            calling_ae_policy: AeTitlePolicy::Any,
            verification_transfer_syntaxes: default_verification_transfer_syntaxes(),
            storage_transfer_syntaxes: default_storage_transfer_syntaxes(),
            promiscuous: false,
            idle_timeout: None,
            files_root: None,
        }
    }
}

impl ScpSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(MINIMUM_PDU_SIZE..=MAXIMUM_PDU_SIZE).contains(&self.max_pdu_length) {
            return Err(SettingsError::MaxPduLength(self.max_pdu_length));
        }
        let aet = self.aet.as_str();
        if aet.trim().is_empty() || aet.len() > 16 {
            return Err(SettingsError::InvalidAeTitle(aet.to_string()));
        }
        for (name, list) in [
            ("verification", &self.verification_transfer_syntaxes),
            ("storage", &self.storage_transfer_syntaxes),
        ] {
            if list.is_empty() {
                return Err(SettingsError::NoTransferSyntaxes(name));
            }
            if let Some(bad) = list.iter().find(|uid| !is_valid_uid(uid)) {
                return Err(SettingsError::InvalidUid(bad.to_string()));
            }
        }
        Ok(())
    }

    pub fn transfer_syntax_policy(&self) -> TransferSyntaxPolicy {
        TransferSyntaxPolicy::new(
            self.verification_transfer_syntaxes.iter().cloned(),
            self.storage_transfer_syntaxes.iter().cloned(),
        )
    }

    pub fn negotiator(&self) -> Negotiator {
        Negotiator::new(Arc::new(self.transfer_syntax_policy()), self.max_pdu_length)
            .called_ae_policy(self.called_ae_policy.clone())
            .calling_ae_policy(self.calling_ae_policy.clone())
            .promiscuous(self.promiscuous)
    }
}

/// UIDs are at most 64 characters of digits and dots.
fn is_valid_uid(uid: &str) -> bool {
    !uid.is_empty()
        && uid.len() <= 64
        && uid.chars().all(|c| c.is_ascii_digit() || c == '.')
        && !uid.starts_with('.')
        && !uid.ends_with('.')
}

fn default_aet() -> OurAETitle {
    OurAETitle::from_static("ANY-SCP")
}

fn default_port() -> u16 {
    11112
}

fn default_max_associations() -> NonZeroUsize {
    NonZeroUsize::new(20).unwrap_or(NonZeroUsize::MIN)
}

fn default_max_pdu_length() -> u32 {
    16384
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = ScpSettings::default();
        assert_eq!(settings.validate(), Ok(()));
        assert_eq!(settings.port, 11112);
        assert_eq!(settings.max_associations.get(), 20);
        assert_eq!(
            settings.verification_transfer_syntaxes.last().map(String::as_str),
            Some(IMPLICIT_VR_LITTLE_ENDIAN)
        );
    }

    #[rstest]
    #[case(4095)]
    #[case(131073)]
    #[case(0)]
    fn test_invalid_max_pdu_length(#[case] max_pdu_length: u32) {
        let settings = ScpSettings {
            max_pdu_length,
            ..Default::default()
        };
        assert_eq!(
            settings.validate(),
            Err(SettingsError::MaxPduLength(max_pdu_length))
        )
    }

    #[rstest]
    #[case("1.2.840.10008.1.2", true)]
    #[case("1.2.840.10008.1.2.", false)]
    #[case("1.2.abc", false)]
    #[case("", false)]
    fn test_is_valid_uid(#[case] uid: &str, #[case] expected: bool) {
        assert_eq!(is_valid_uid(uid), expected)
    }

    #[test]
    fn test_empty_transfer_syntaxes() {
        let settings = ScpSettings {
            storage_transfer_syntaxes: vec![],
            ..Default::default()
        };
        assert_eq!(
            settings.validate(),
            Err(SettingsError::NoTransferSyntaxes("storage"))
        )
    }
}
