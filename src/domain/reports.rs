//! Report entity, status values and submission validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::DomainError;
use super::geo::Geo;

pub const MAX_CITY_CHARS: usize = 100;
pub const MAX_ADDRESS_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 300;
pub const MAX_CONTACT_CHARS: usize = 100;
pub const MIN_MEDIA: usize = 1;
pub const MAX_MEDIA: usize = 5;

/// Report lifecycle state.
///
/// Stored as a small integer. Values outside `1..=5` can be represented so that
/// a full replace persists exactly what it was given; [`Status::is_known`] is the
/// range check applied by status changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Status(i16);

impl Status {
    pub const UNVERIFIED: Status = Status(1);
    pub const OPENED: Status = Status(2);
    pub const IN_PROGRESS: Status = Status(3);
    pub const CLOSED: Status = Status(4);
    pub const REJECTED: Status = Status(5);

    pub const ALL: [Status; 5] = [
        Self::UNVERIFIED,
        Self::OPENED,
        Self::IN_PROGRESS,
        Self::CLOSED,
        Self::REJECTED,
    ];

    pub const fn from_raw(value: i16) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i16 {
        self.0
    }

    pub fn is_known(self) -> bool {
        (Self::UNVERIFIED.0..=Self::REJECTED.0).contains(&self.0)
    }

    pub fn label(self) -> Option<&'static str> {
        match self {
            Self::UNVERIFIED => Some("Unverified"),
            Self::OPENED => Some("Opened"),
            Self::IN_PROGRESS => Some("In progress"),
            Self::CLOSED => Some("Closed"),
            Self::REJECTED => Some("Rejected"),
            _ => None,
        }
    }

    /// Parses a comma separated list such as `1,3,5`, skipping entries that are
    /// not integers.
    pub fn parse_list(raw: &str) -> Vec<Status> {
        raw.split(',')
            .filter_map(|part| part.trim().parse::<i16>().ok())
            .map(Status)
            .collect()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label() {
            Some(label) => f.write_str(label),
            None => write!(f, "Unknown({})", self.0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Contacts {
    /// The address notifications go to, if one was left.
    pub fn email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if let Some(email) = self.email.as_deref() {
            if email.parse::<lettre::Address>().is_err() {
                return Err(DomainError::validation(format!(
                    "contacts.email `{email}` is not a valid address"
                )));
            }
        }
        for (field, value) in [
            ("contacts.whatsapp", &self.whatsapp),
            ("contacts.telegram", &self.telegram),
            ("contacts.phone", &self.phone),
        ] {
            if let Some(value) = value.as_deref() {
                if value.trim().is_empty() {
                    return Err(DomainError::validation(format!("{field} must not be blank")));
                }
                check_length(field, value, MAX_CONTACT_CHARS)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub number: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated: OffsetDateTime,
    pub city: String,
    pub address: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub contacts: Contacts,
    #[serde(default)]
    pub media: Vec<String>,
    pub geo: Geo,
    pub status: Status,
}

impl Report {
    /// Checks an incoming full replacement. Status is deliberately left
    /// unchecked here; only status changes range-check it.
    pub fn validate_replacement(&self) -> Result<(), DomainError> {
        validate_details(
            &self.city,
            &self.address,
            &self.description,
            &self.contacts,
            Some(&self.geo),
        )?;
        if self.media.len() > MAX_MEDIA {
            return Err(DomainError::validation(format!(
                "media holds {} entries, at most {MAX_MEDIA} are allowed",
                self.media.len()
            )));
        }
        Ok(())
    }

    /// Media URLs referenced by `self` but no longer by `current`.
    pub fn orphaned_media(&self, current: &Report) -> Vec<String> {
        self.media
            .iter()
            .filter(|url| !current.media.contains(url))
            .cloned()
            .collect()
    }
}

/// Client metadata accompanying a new submission. Any status the client sends
/// is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportDraft {
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub contacts: Contacts,
    #[serde(default)]
    pub geo: Option<Geo>,
}

impl ReportDraft {
    pub fn validate(&self) -> Result<Geo, DomainError> {
        validate_details(
            &self.city,
            &self.address,
            &self.description,
            &self.contacts,
            self.geo.as_ref(),
        )?;
        self.geo
            .ok_or_else(|| DomainError::validation("geo is required"))
    }

    /// Assembles the report that will be persisted once a number is known.
    pub fn into_report(
        self,
        geo: Geo,
        number: i64,
        media: Vec<String>,
        now: OffsetDateTime,
    ) -> Report {
        Report {
            id: Uuid::nil(),
            number,
            created: now,
            updated: now,
            city: self.city.trim().to_string(),
            address: self.address.trim().to_string(),
            description: self.description.trim().to_string(),
            contacts: self.contacts,
            media,
            geo,
            status: Status::UNVERIFIED,
        }
    }
}

pub fn check_attachment_count(count: usize) -> Result<(), DomainError> {
    if (MIN_MEDIA..=MAX_MEDIA).contains(&count) {
        Ok(())
    } else {
        Err(DomainError::validation(format!(
            "expected between {MIN_MEDIA} and {MAX_MEDIA} images, got {count}"
        )))
    }
}

/// Per-status report counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistic {
    pub total: u64,
    pub unverified: u64,
    pub opened: u64,
    pub in_progress: u64,
    pub closed: u64,
    pub rejected: u64,
}

impl Statistic {
    /// Folds `(status, count)` pairs. Counts for values outside `1..=5` are not
    /// part of any bucket and are left out of `total` as well.
    pub fn from_counts(counts: impl IntoIterator<Item = (Status, u64)>) -> Self {
        let mut stat = Self::default();
        for (status, count) in counts {
            let bucket = match status {
                Status::UNVERIFIED => &mut stat.unverified,
                Status::OPENED => &mut stat.opened,
                Status::IN_PROGRESS => &mut stat.in_progress,
                Status::CLOSED => &mut stat.closed,
                Status::REJECTED => &mut stat.rejected,
                _ => continue,
            };
            *bucket += count;
        }
        stat.total = stat.unverified + stat.opened + stat.in_progress + stat.closed + stat.rejected;
        stat
    }
}

fn validate_details(
    city: &str,
    address: &str,
    description: &str,
    contacts: &Contacts,
    geo: Option<&Geo>,
) -> Result<(), DomainError> {
    check_required("city", city, MAX_CITY_CHARS)?;
    check_required("address", address, MAX_ADDRESS_CHARS)?;
    check_length("description", description, MAX_DESCRIPTION_CHARS)?;
    contacts.validate()?;
    match geo {
        Some(geo) => geo.validate(),
        None => Err(DomainError::validation("geo is required")),
    }
}

fn check_required(field: &str, value: &str, max_chars: usize) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} is required")));
    }
    check_length(field, value, max_chars)
}

fn check_length(field: &str, value: &str, max_chars: usize) -> Result<(), DomainError> {
    let chars = value.chars().count();
    if chars > max_chars {
        return Err(DomainError::validation(format!(
            "{field} is {chars} characters long, limit is {max_chars}"
        )));
    }
    Ok(())
}
