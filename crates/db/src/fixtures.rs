//! Deterministic sample data for the `seed` command and integration tests.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use fakturo_core::domain::customer::CustomerDetails;
use fakturo_core::domain::invoice::{
    DiscountItem, InvoiceDetails, InvoiceId, InvoicePayload, LineItem,
};

use crate::repositories::{InvoiceStore, RepositoryError, SqlInvoiceStore};
use crate::DbPool;

#[derive(Clone, Debug, PartialEq)]
pub struct SeedResult {
    pub invoice_id: InvoiceId,
    pub rechnungsnummer: String,
    pub kunde: String,
    pub line_count: usize,
    pub discount_count: usize,
}

/// One fully populated extraction payload: two line items, one discount,
/// the same shape the LLM produces for a real hosting invoice.
pub fn sample_invoice_payload() -> InvoicePayload {
    InvoicePayload {
        kunde: CustomerDetails {
            name: "Musterfirma GmbH".to_string(),
            strasse: "Beispielweg 12".to_string(),
            plz: "50667".to_string(),
            ort: "Köln".to_string(),
            land: "Deutschland".to_string(),
        },
        rechnung: InvoiceDetails {
            bestellnummer: "B-2024-0101".to_string(),
            rechnungsnummer: "R-2024-0001".to_string(),
            rechnungsdatum: date(2024, 11, 19),
            leistungszeitraum_start: date(2024, 11, 1),
            leistungszeitraum_ende: date(2024, 11, 30),
            gesamtbetrag: Decimal::new(29750, 2),
            mwst_prozent: Decimal::new(1900, 2),
            mwst_betrag: Decimal::new(4750, 2),
            bezahlt: false,
        },
        produkte: vec![
            LineItem {
                bezeichnung: "Hosting Paket M".to_string(),
                monatlicher_preis: Decimal::new(10000, 2),
                anzahl: 2,
                preis: Decimal::new(20000, 2),
            },
            LineItem {
                bezeichnung: "Domain .de".to_string(),
                monatlicher_preis: Decimal::new(5000, 2),
                anzahl: 1,
                preis: Decimal::new(5000, 2),
            },
        ],
        nachlaesse: vec![DiscountItem {
            typ: "Treuerabatt".to_string(),
            betrag: Decimal::new(1000, 2),
        }],
    }
}

/// Writes the sample payload through the regular persistence path, so a
/// seeded database looks exactly like one fed by real extractions.
pub async fn seed_sample_invoice(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
    let payload = sample_invoice_payload();
    let store = SqlInvoiceStore::new(pool.clone());
    let invoice_id = store.save_invoice(&payload).await?;

    Ok(SeedResult {
        invoice_id,
        rechnungsnummer: payload.rechnung.rechnungsnummer,
        kunde: payload.kunde.name,
        line_count: payload.produkte.len(),
        discount_count: payload.nachlaesse.len(),
    })
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    // Only called with literal in-range dates above.
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}
