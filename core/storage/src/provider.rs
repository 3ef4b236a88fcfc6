//! Storage provider trait definition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use imagehost_common::{MediaFile, ProviderId, Result};

use crate::links::LinkSet;
use crate::store::CredentialRecord;

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    /// Link formats built from the preferred public URL.
    pub links: LinkSet,
    /// Public URL served by the backend itself. May be empty when the
    /// backend refused to create a share link.
    pub direct_url: String,
    /// CDN mirror URL. Only GitHub provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerated_url: Option<String>,
    /// Name the file was stored under.
    pub file_name: String,
    /// Display name of the provider that stored it.
    pub provider_label: String,
}

impl UploadResult {
    /// URL to preview and share: the CDN mirror if any, else the direct URL.
    pub fn preview_url(&self) -> &str {
        self.accelerated_url.as_deref().unwrap_or(&self.direct_url)
    }
}

/// A progress notification emitted between upload phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub percent: u8,
    pub label: String,
}

/// Progress handler supplied by the caller.
pub type ProgressFn<'a> = dyn Fn(ProgressEvent) + Send + Sync + 'a;

/// Forwards progress to an optional handler, never letting it go backwards.
pub struct ProgressReporter<'a> {
    sink: Option<&'a ProgressFn<'a>>,
    last: u8,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: Option<&'a ProgressFn<'a>>) -> Self {
        Self { sink, last: 0 }
    }

    /// Report a phase. Values above 100 are clamped, regressions dropped.
    pub fn report(&mut self, percent: u8, label: &str) {
        let percent = percent.min(100);
        if percent < self.last {
            return;
        }
        self.last = percent;
        if let Some(sink) = self.sink {
            sink(ProgressEvent {
                percent,
                label: label.to_string(),
            });
        }
    }
}

/// Static description of one credential field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Key in the credential record.
    pub key: &'static str,
    pub label: &'static str,
    pub required: bool,
    /// Masked when displayed.
    pub secret: bool,
    /// Value used when the field is absent.
    pub default: Option<&'static str>,
}

impl FieldSpec {
    pub const fn required(key: &'static str, label: &'static str, secret: bool) -> Self {
        Self {
            key,
            label,
            required: true,
            secret,
            default: None,
        }
    }

    pub const fn optional(key: &'static str, label: &'static str, default: Option<&'static str>) -> Self {
        Self {
            key,
            label,
            required: false,
            secret: false,
            default,
        }
    }
}

/// One field of a [`ConfigForm`], with its current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormField {
    pub key: &'static str,
    pub label: &'static str,
    pub required: bool,
    pub secret: bool,
    pub default: Option<&'static str>,
    /// Current value; secrets are masked.
    pub value: Option<String>,
}

/// Declarative description of what a UI should collect for a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigForm {
    pub provider: ProviderId,
    pub title: &'static str,
    pub connected: bool,
    /// Page where the user obtains a token.
    pub token_page_url: &'static str,
    pub fields: Vec<FormField>,
}

impl ConfigForm {
    /// Build a form from field specs and the current record.
    pub fn build(
        provider: ProviderId,
        fields: &[FieldSpec],
        record: &CredentialRecord,
        token_page_url: &'static str,
    ) -> Self {
        let connected = fields
            .iter()
            .filter(|f| f.required)
            .all(|f| record.has(f.key));

        let fields = fields
            .iter()
            .map(|spec| FormField {
                key: spec.key,
                label: spec.label,
                required: spec.required,
                secret: spec.secret,
                default: spec.default,
                value: record.get(spec.key).map(|v| {
                    if spec.secret {
                        mask_secret(v)
                    } else {
                        v.to_string()
                    }
                }),
            })
            .collect();

        Self {
            provider,
            title: provider.display_name(),
            connected,
            token_page_url,
            fields,
        }
    }
}

/// Hide all but the last four characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

/// A backend that media files can be uploaded to.
///
/// Each implementation reads its credentials from the shared config store
/// on every call, so saving new credentials takes effect immediately.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Provider identifier.
    fn id(&self) -> ProviderId;

    /// Human readable name, used in every error message.
    fn display_name(&self) -> &'static str {
        self.id().display_name()
    }

    /// Credential fields this backend understands.
    fn fields(&self) -> &'static [FieldSpec];

    /// Web page where a token can be created.
    fn token_page_url(&self) -> &'static str;

    /// Current credential record.
    fn credentials(&self) -> CredentialRecord;

    /// Whether every required credential field is present.
    ///
    /// Pure and synchronous; never touches the network.
    fn is_connected(&self) -> bool;

    /// Describe the fields a UI should collect and display.
    fn config_form(&self) -> ConfigForm {
        ConfigForm::build(
            self.id(),
            self.fields(),
            &self.credentials(),
            self.token_page_url(),
        )
    }

    /// Upload a file and resolve its public URLs.
    ///
    /// # Preconditions
    /// - Required credential fields are present, otherwise `Error::Config`
    ///
    /// # Postconditions
    /// - The file is stored under a fresh collision-resistant name
    ///
    /// # Errors
    /// - `Authentication`, `PermissionDenied`, `NotFound`, `Conflict` or
    ///   `Upload` for a rejected request
    /// - `Network` when no response was received
    async fn upload(&self, file: &MediaFile, progress: Option<&ProgressFn<'_>>) -> Result<UploadResult>;
}

/// Names of the required fields missing from `record`.
pub(crate) fn missing_required(fields: &[FieldSpec], record: &CredentialRecord) -> Vec<&'static str> {
    fields
        .iter()
        .filter(|f| f.required && !record.has(f.key))
        .map(|f| f.key)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const FIELDS: &[FieldSpec] = &[
        FieldSpec::required("token", "Token", true),
        FieldSpec::required("owner", "Owner", false),
        FieldSpec::optional("path", "Path", Some("images")),
    ];

    #[test]
    fn test_progress_never_regresses() {
        let seen = Mutex::new(Vec::new());
        let sink: &ProgressFn = &|event: ProgressEvent| seen.lock().unwrap().push(event.percent);
        let mut reporter = ProgressReporter::new(Some(sink));

        reporter.report(20, "a");
        reporter.report(10, "b");
        reporter.report(60, "c");
        reporter.report(250, "d");

        assert_eq!(*seen.lock().unwrap(), vec![20, 60, 100]);
    }

    #[test]
    fn test_progress_without_sink() {
        let mut reporter = ProgressReporter::new(None);
        reporter.report(50, "ignored");
    }

    #[test]
    fn test_form_masks_secrets() {
        let record = CredentialRecord::new()
            .with("token", "ghp_1234567890abcd")
            .with("owner", "octocat");
        let form = ConfigForm::build(ProviderId::GitHub, FIELDS, &record, "https://example.com");

        assert!(form.connected);
        assert_eq!(form.title, "GitHub");
        assert_eq!(form.fields[0].value.as_deref(), Some("****abcd"));
        assert_eq!(form.fields[1].value.as_deref(), Some("octocat"));
        assert_eq!(form.fields[2].value, None);
        assert_eq!(form.fields[2].default, Some("images"));
    }

    #[test]
    fn test_missing_required() {
        let record = CredentialRecord::new().with("owner", "o");
        assert_eq!(missing_required(FIELDS, &record), vec!["token"]);
    }

    #[test]
    fn test_mask_short_secret() {
        assert_eq!(mask_secret("abc"), "****");
    }

    #[test]
    fn test_preview_url_prefers_cdn() {
        let mut result = UploadResult {
            links: crate::links::generate("https://raw/x.png", "x.png"),
            direct_url: "https://raw/x.png".to_string(),
            accelerated_url: Some("https://cdn/x.png".to_string()),
            file_name: "x.png".to_string(),
            provider_label: "GitHub".to_string(),
        };
        assert_eq!(result.preview_url(), "https://cdn/x.png");

        result.accelerated_url = None;
        assert_eq!(result.preview_url(), "https://raw/x.png");
    }
}
