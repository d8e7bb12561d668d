//! Team settings as read from the record store.
//!
//! The export pipeline only reads these settings (to describe the publishing
//! organisation in the manifest); it never writes them back. A [`TeamRow`] is
//! the raw store shape, and [`TeamSettings::from_row`] is the single place
//! where its values are sanitised and validated.

use crate::error::{Result, ValidationError};
use crate::id::TeamId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use url::Url;

/// Raw team row as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRow {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub orgid: Option<String>,
    #[serde(default)]
    pub link_name: Option<String>,
    #[serde(default)]
    pub link_href: Option<String>,
    #[serde(default)]
    pub stampprovider: Option<String>,
}

/// Validated, immutable team settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSettings {
    id: TeamId,
    name: String,
    org_id: Option<String>,
    link_name: Option<String>,
    link_href: Option<String>,
    stamp_provider: Option<String>,
}

fn tag_regex() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"))
}

/// Strip markup and control characters, trim, and map empty to `None`.
fn sanitize(value: Option<&str>) -> Option<String> {
    let value = value?;
    let stripped = tag_regex().replace_all(value, "");
    let cleaned: String = stripped.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Links are rendered as hyperlinks, so only web schemes are accepted.
fn validate_link(field: &str, value: Option<&str>) -> Result<Option<String>> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Some(raw.to_string())),
        Ok(url) => Err(ValidationError::invalid(
            field,
            format!("unsupported URL scheme '{}': {}", url.scheme(), raw),
        )),
        Err(e) => Err(ValidationError::invalid(
            field,
            format!("not a valid URL ({}): {}", e, raw),
        )),
    }
}

impl TeamSettings {
    /// Validate a stored row.
    pub fn from_row(row: &TeamRow) -> Result<Self> {
        if row.id <= 0 {
            return Err(ValidationError::invalid(
                "id",
                format!("must be a positive integer, got {}", row.id),
            ));
        }

        let name = sanitize(row.name.as_deref())
            .ok_or_else(|| ValidationError::MissingField("name".to_string()))?;

        Ok(TeamSettings {
            id: TeamId(row.id),
            name,
            org_id: sanitize(row.orgid.as_deref()),
            link_name: sanitize(row.link_name.as_deref()),
            link_href: validate_link("link_href", row.link_href.as_deref())?,
            // Not used by the export; kept as stored text.
            stamp_provider: sanitize(row.stampprovider.as_deref()),
        })
    }

    pub fn id(&self) -> TeamId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn org_id(&self) -> Option<&str> {
        self.org_id.as_deref()
    }

    pub fn link_name(&self) -> Option<&str> {
        self.link_name.as_deref()
    }

    pub fn link_href(&self) -> Option<&str> {
        self.link_href.as_deref()
    }

    pub fn stamp_provider(&self) -> Option<&str> {
        self.stamp_provider.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> TeamRow {
        TeamRow {
            id: 2,
            name: Some("Structural Biology".to_string()),
            orgid: Some("ROR-04x".to_string()),
            link_name: Some("Docs".to_string()),
            link_href: Some("https://docs.example.org/lab".to_string()),
            stampprovider: None,
        }
    }

    #[test]
    fn test_from_row_valid() {
        let team = TeamSettings::from_row(&row()).unwrap();
        assert_eq!(team.id(), TeamId(2));
        assert_eq!(team.name(), "Structural Biology");
        assert_eq!(team.org_id(), Some("ROR-04x"));
        assert_eq!(team.link_href(), Some("https://docs.example.org/lab"));
        assert_eq!(team.stamp_provider(), None);
    }

    #[test]
    fn test_name_is_sanitized() {
        let mut raw = row();
        raw.name = Some("  <b>Cryo</b> EM\u{7}  ".to_string());
        let team = TeamSettings::from_row(&raw).unwrap();
        assert_eq!(team.name(), "Cryo EM");
    }

    #[test]
    fn test_missing_name_rejected() {
        let mut raw = row();
        raw.name = Some("<i></i>".to_string());
        let err = TeamSettings::from_row(&raw).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("name".to_string()));
    }

    #[test]
    fn test_invalid_link_rejected() {
        let mut raw = row();
        raw.link_href = Some("javascript:alert(1)".to_string());
        let err = TeamSettings::from_row(&raw).unwrap_err();
        assert_eq!(err.field(), "link_href");
    }

    #[test]
    fn test_link_accepts_any_well_formed_web_url() {
        for href in [
            "http://tsa_host.example/tsr",
            "https://user@wiki.example.org:8443/lab?page=2",
            "http://[2001:db8::1]/docs",
        ] {
            let mut raw = row();
            raw.link_href = Some(href.to_string());
            let team = TeamSettings::from_row(&raw).unwrap();
            assert_eq!(team.link_href(), Some(href));
        }

        let mut raw = row();
        raw.link_href = Some("https://exa mple.org".to_string());
        assert_eq!(TeamSettings::from_row(&raw).unwrap_err().field(), "link_href");
    }

    #[test]
    fn test_stamp_provider_is_kept_as_text() {
        let mut raw = row();
        raw.stampprovider = Some("  http://tsa_host.example/tsr ".to_string());
        let team = TeamSettings::from_row(&raw).unwrap();
        assert_eq!(team.stamp_provider(), Some("http://tsa_host.example/tsr"));

        raw.stampprovider = Some("not a url".to_string());
        let team = TeamSettings::from_row(&raw).unwrap();
        assert_eq!(team.stamp_provider(), Some("not a url"));
    }

    #[test]
    fn test_blank_optional_fields_become_none() {
        let mut raw = row();
        raw.orgid = Some("   ".to_string());
        raw.link_href = Some("".to_string());
        let team = TeamSettings::from_row(&raw).unwrap();
        assert_eq!(team.org_id(), None);
        assert_eq!(team.link_href(), None);
    }
}
