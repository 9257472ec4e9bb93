use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::data_processors::lenient_string;

// ── Closed vocabularies ────────────────────────────────────────────────────────

/// Actor codes that denote batch or automated processing rather than a person.
pub const RESERVED_IDENTITIES: &[&str] = &["SYSTEM", "BATCHPROC"];

/// Normalise an identity, company or status string: trimmed and upper-cased.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Whether `identity` belongs to the reserved (non-human) identity set.
///
/// The comparison is case-insensitive and ignores surrounding whitespace.
pub fn is_reserved_identity(identity: &str) -> bool {
    let code = normalize_code(identity);
    RESERVED_IDENTITIES.contains(&code.as_str())
}

/// A history status from the audit trail.
///
/// The markers that drive classification are closed variants; any other status
/// text is kept verbatim (upper-cased) in [`Status::Other`] so that it still
/// shows up in status breakdowns without ever triggering a rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    /// `NEW`: a person created the declaration from scratch.
    New,
    /// `COPIED`: a person created the declaration by copying another one.
    Copied,
    /// `CREATED`: explicit creation recorded by the front-end.
    Created,
    /// `MODIFIED`: the declaration content was edited.
    Modified,
    /// `INTERFACE`: the declaration arrived through a system integration.
    Interface,
    /// `DEC_DAT`: the declaration was dispatched to customs.
    DecDat,
    /// Any other status value.
    Other(String),
}

impl Status {
    /// Parse a raw status, case-insensitively.
    pub fn parse(raw: &str) -> Self {
        let code = normalize_code(raw);
        match code.as_str() {
            "NEW" => Status::New,
            "COPIED" => Status::Copied,
            "CREATED" => Status::Created,
            "MODIFIED" => Status::Modified,
            "INTERFACE" => Status::Interface,
            "DEC_DAT" => Status::DecDat,
            _ => Status::Other(code),
        }
    }

    /// Canonical upper-case code.
    pub fn as_str(&self) -> &str {
        match self {
            Status::New => "NEW",
            Status::Copied => "COPIED",
            Status::Created => "CREATED",
            Status::Modified => "MODIFIED",
            Status::Interface => "INTERFACE",
            Status::DecDat => "DEC_DAT",
            Status::Other(code) => code.as_str(),
        }
    }

    /// A person explicitly created or copied the declaration.
    pub fn is_manual_trigger(&self) -> bool {
        matches!(self, Status::New | Status::Copied | Status::Created)
    }

    /// The declaration originated from an external system integration.
    pub fn is_interface_trigger(&self) -> bool {
        matches!(self, Status::Interface)
    }

    /// The declaration was dispatched / submitted.
    pub fn is_sending(&self) -> bool {
        matches!(self, Status::DecDat)
    }

    pub fn is_modification(&self) -> bool {
        matches!(self, Status::Modified)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ── Raw input ──────────────────────────────────────────────────────────────────

/// One row as delivered by the log-loading collaborator.
///
/// Every field is optional at this stage; the normaliser decides what is
/// usable. Identifier fields accept JSON strings or numbers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEventRow {
    #[serde(rename = "DECLARATIONID", default, deserialize_with = "lenient_string")]
    pub declaration_id: Option<String>,
    /// Kept as a raw JSON value: strings and epoch numbers both occur.
    #[serde(rename = "HISTORYDATETIME", default)]
    pub history_datetime: serde_json::Value,
    #[serde(rename = "HISTORY_STATUS", default, deserialize_with = "lenient_string")]
    pub history_status: Option<String>,
    #[serde(rename = "USERCODE", default, deserialize_with = "lenient_string")]
    pub user_code: Option<String>,
    #[serde(rename = "ACTIVECOMPANY", default, deserialize_with = "lenient_string")]
    pub active_company: Option<String>,
    #[serde(
        rename = "TYPEDECLARATIONSSW",
        default,
        deserialize_with = "lenient_string"
    )]
    pub declaration_type: Option<String>,
}

// ── Normalised events ──────────────────────────────────────────────────────────

/// A single cleaned audit-trail event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub declaration_id: String,
    /// UTC instant of the status change.
    pub timestamp: DateTime<Utc>,
    pub status: Status,
    /// Upper-cased, trimmed user code of the actor.
    pub actor: String,
    pub company_code: String,
    pub doc_type: String,
    /// Position of the row in the original log; breaks timestamp ties.
    pub sequence: u64,
}

impl Event {
    /// Whether the actor is a reserved (system) identity.
    pub fn is_by_reserved(&self) -> bool {
        is_reserved_identity(&self.actor)
    }

    /// Sort key giving chronological order with log-order tie-breaks.
    pub fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.timestamp, self.sequence)
    }
}

// ── Classification ─────────────────────────────────────────────────────────────

/// Outcome of classifying one declaration for one identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub is_manual: bool,
    pub is_automatic: bool,
}

impl Classification {
    pub const NONE: Self = Self {
        is_manual: false,
        is_automatic: false,
    };
    pub const MANUAL: Self = Self {
        is_manual: true,
        is_automatic: false,
    };
    pub const AUTOMATIC: Self = Self {
        is_manual: false,
        is_automatic: true,
    };

    /// The identity is credited with creating the declaration, either way.
    pub fn is_creation(&self) -> bool {
        self.is_manual || self.is_automatic
    }
}

/// A classification tied to the declaration and identity it was computed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub declaration_id: String,
    pub target_identity: String,
    #[serde(flatten)]
    pub classification: Classification,
}

/// Simplified origin of a declaration as shown by the lifecycle lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileType {
    Automatic,
    Manual,
    Unknown,
}
