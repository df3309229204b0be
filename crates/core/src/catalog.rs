use serde::{Deserialize, Serialize};

/// Logical type of a whitelisted column. Drives how query results are
/// decoded into JSON; dates stay `Text` in `YYYY-MM-DD` form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Integer,
    Text,
    Decimal,
    Boolean,
}

#[derive(Clone, Copy, Debug)]
pub struct ColumnSchema {
    pub name: &'static str,
    pub kind: ColumnKind,
}

#[derive(Clone, Copy, Debug)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [ColumnSchema],
}

const fn column(name: &'static str, kind: ColumnKind) -> ColumnSchema {
    ColumnSchema { name, kind }
}

const KUNDEN: &[ColumnSchema] = &[
    column("kunden_id", ColumnKind::Integer),
    column("name", ColumnKind::Text),
    column("strasse", ColumnKind::Text),
    column("plz", ColumnKind::Text),
    column("ort", ColumnKind::Text),
    column("land", ColumnKind::Text),
];

const RECHNUNGEN: &[ColumnSchema] = &[
    column("rechnungs_id", ColumnKind::Integer),
    column("bestellnummer", ColumnKind::Text),
    column("rechnungsnummer", ColumnKind::Text),
    column("rechnungsdatum", ColumnKind::Text),
    column("leistungszeitraum_start", ColumnKind::Text),
    column("leistungszeitraum_ende", ColumnKind::Text),
    column("kunden_id", ColumnKind::Integer),
    column("gesamtbetrag", ColumnKind::Decimal),
    column("mwst_prozent", ColumnKind::Decimal),
    column("mwst_betrag", ColumnKind::Decimal),
    column("bezahlt", ColumnKind::Boolean),
];

const PRODUKTE: &[ColumnSchema] = &[
    column("produkt_id", ColumnKind::Integer),
    column("bezeichnung", ColumnKind::Text),
    column("monatlicher_preis", ColumnKind::Decimal),
];

const RECHNUNGSPOSTEN: &[ColumnSchema] = &[
    column("rechnungs_id", ColumnKind::Integer),
    column("produkt_id", ColumnKind::Integer),
    column("anzahl", ColumnKind::Integer),
    column("preis", ColumnKind::Decimal),
];

const NACHLAESSE: &[ColumnSchema] = &[
    column("rechnungs_id", ColumnKind::Integer),
    column("typ", ColumnKind::Text),
    column("betrag", ColumnKind::Decimal),
];

const TABLES: &[TableSchema] = &[
    TableSchema { name: "kunden", columns: KUNDEN },
    TableSchema { name: "rechnungen", columns: RECHNUNGEN },
    TableSchema { name: "produkte", columns: PRODUKTE },
    TableSchema { name: "rechnungsposten", columns: RECHNUNGSPOSTEN },
    TableSchema { name: "nachlaesse", columns: NACHLAESSE },
];

const OPERATORS: &[&str] = &["=", ">", "<", ">=", "<=", "!="];

/// Closed whitelist of every identifier a query descriptor may reference.
///
/// This is the single source of truth for the query path; nothing consults
/// the live database schema. Column scope is global across tables, matching
/// the wire contract: a column is valid if any table carries it. Membership
/// checks are case-sensitive exact matches.
#[derive(Clone, Copy, Debug)]
pub struct SchemaCatalog {
    tables: &'static [TableSchema],
    operators: &'static [&'static str],
}

impl Default for SchemaCatalog {
    fn default() -> Self {
        Self { tables: TABLES, operators: OPERATORS }
    }
}

impl SchemaCatalog {
    pub fn is_table(&self, name: &str) -> bool {
        self.tables.iter().any(|table| table.name == name)
    }

    pub fn is_column(&self, name: &str) -> bool {
        self.column_kind(name).is_some()
    }

    pub fn is_operator(&self, operator: &str) -> bool {
        self.operators.contains(&operator)
    }

    /// Kind of the first column with this name across all tables. Columns
    /// shared between tables (`kunden_id`, `rechnungs_id`, `preis`) carry
    /// the same kind everywhere.
    pub fn column_kind(&self, name: &str) -> Option<ColumnKind> {
        self.tables
            .iter()
            .flat_map(|table| table.columns.iter())
            .find(|column| column.name == name)
            .map(|column| column.kind)
    }

    pub fn tables(&self) -> &'static [TableSchema] {
        self.tables
    }

    pub fn table_names(&self) -> Vec<&'static str> {
        self.tables.iter().map(|table| table.name).collect()
    }

    /// All column names in table order, deduplicated on first sight.
    pub fn column_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = Vec::new();
        for table in self.tables {
            for column in table.columns {
                if !names.contains(&column.name) {
                    names.push(column.name);
                }
            }
        }
        names
    }

    pub fn operators(&self) -> &'static [&'static str] {
        self.operators
    }
}
