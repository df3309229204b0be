use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub i64);

/// Customer block of an extraction payload. Field names mirror the wire
/// format and the `kunden` table.
///
/// Customer identity is the exact 5-tuple of these fields; persistence
/// deduplicates on full equality and nothing else (no trimming, no case
/// folding).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub name: String,
    pub strasse: String,
    pub plz: String,
    pub ort: String,
    pub land: String,
}
