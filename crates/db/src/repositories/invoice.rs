use async_trait::async_trait;

use fakturo_core::domain::invoice::{InvoiceId, InvoicePayload};

use super::{InvoiceStore, RepositoryError};
use crate::DbPool;

/// SQLite-backed invoice store. One payload is one transaction:
///
/// 1. Look up the customer by the exact 5-tuple, insert on miss.
/// 2. Insert the invoice header.
/// 3. Per line, insert a fresh product row and the linking line row.
/// 4. Insert discount rows.
///
/// Any failure rolls the whole payload back; partial invoices never land.
pub struct SqlInvoiceStore {
    pool: DbPool,
}

impl SqlInvoiceStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InvoiceStore for SqlInvoiceStore {
    async fn save_invoice(&self, payload: &InvoicePayload) -> Result<InvoiceId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Customer identity is full equality on all five fields. No
        // normalization: "Berlin" and "berlin" are different customers.
        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT kunden_id
             FROM kunden
             WHERE name = ? AND strasse = ? AND plz = ? AND ort = ? AND land = ?",
        )
        .bind(&payload.kunde.name)
        .bind(&payload.kunde.strasse)
        .bind(&payload.kunde.plz)
        .bind(&payload.kunde.ort)
        .bind(&payload.kunde.land)
        .fetch_optional(&mut *tx)
        .await?;

        let kunden_id = match existing {
            Some(id) => id,
            None => sqlx::query(
                "INSERT INTO kunden (name, strasse, plz, ort, land)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&payload.kunde.name)
            .bind(&payload.kunde.strasse)
            .bind(&payload.kunde.plz)
            .bind(&payload.kunde.ort)
            .bind(&payload.kunde.land)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid(),
        };

        let rechnungs_id = sqlx::query(
            "INSERT INTO rechnungen (
                 bestellnummer, rechnungsnummer, rechnungsdatum,
                 leistungszeitraum_start, leistungszeitraum_ende,
                 kunden_id, gesamtbetrag, mwst_prozent, mwst_betrag, bezahlt
             )
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&payload.rechnung.bestellnummer)
        .bind(&payload.rechnung.rechnungsnummer)
        .bind(payload.rechnung.rechnungsdatum)
        .bind(payload.rechnung.leistungszeitraum_start)
        .bind(payload.rechnung.leistungszeitraum_ende)
        .bind(kunden_id)
        .bind(payload.rechnung.gesamtbetrag.to_string())
        .bind(payload.rechnung.mwst_prozent.to_string())
        .bind(payload.rechnung.mwst_betrag.to_string())
        .bind(payload.rechnung.bezahlt)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for line in &payload.produkte {
            // Products are never deduplicated: every payload line creates
            // its own produkte row, even for identical descriptions.
            let produkt_id = sqlx::query(
                "INSERT INTO produkte (bezeichnung, monatlicher_preis)
                 VALUES (?, ?)",
            )
            .bind(&line.bezeichnung)
            .bind(line.monatlicher_preis.to_string())
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

            sqlx::query(
                "INSERT INTO rechnungsposten (rechnungs_id, produkt_id, anzahl, preis)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(rechnungs_id)
            .bind(produkt_id)
            .bind(line.anzahl)
            .bind(line.preis.to_string())
            .execute(&mut *tx)
            .await?;
        }

        for discount in &payload.nachlaesse {
            sqlx::query(
                "INSERT INTO nachlaesse (rechnungs_id, typ, betrag)
                 VALUES (?, ?, ?)",
            )
            .bind(rechnungs_id)
            .bind(&discount.typ)
            .bind(discount.betrag.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(InvoiceId(rechnungs_id))
    }
}
