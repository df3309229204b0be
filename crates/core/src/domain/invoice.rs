use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerDetails;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvoiceId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub i64);

/// Invoice header block. Dates deserialize strictly from `YYYY-MM-DD`;
/// anything else is rejected at the boundary instead of reaching the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDetails {
    pub bestellnummer: String,
    pub rechnungsnummer: String,
    pub rechnungsdatum: NaiveDate,
    pub leistungszeitraum_start: NaiveDate,
    pub leistungszeitraum_ende: NaiveDate,
    pub gesamtbetrag: Decimal,
    pub mwst_prozent: Decimal,
    pub mwst_betrag: Decimal,
    pub bezahlt: bool,
}

/// One extracted invoice line. Every line creates a fresh `produkte` row;
/// products are intentionally not deduplicated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub bezeichnung: String,
    pub monatlicher_preis: Decimal,
    pub anzahl: i64,
    pub preis: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscountItem {
    pub typ: String,
    pub betrag: Decimal,
}

/// Complete `extract_invoice_data` payload as produced by the LLM.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvoicePayload {
    pub kunde: CustomerDetails,
    pub rechnung: InvoiceDetails,
    #[serde(default)]
    pub produkte: Vec<LineItem>,
    #[serde(default)]
    pub nachlaesse: Vec<DiscountItem>,
}
