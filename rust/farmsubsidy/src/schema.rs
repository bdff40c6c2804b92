//! Physical layout of the payments table for each dialect.

use crate::dialect::Dialect;

/// Payment columns in insertion order.
pub const COLUMNS: &[&str] = &[
    "pk",
    "country",
    "year",
    "recipient_id",
    "recipient_name",
    "recipient_fingerprint",
    "recipient_address",
    "recipient_country",
    "recipient_url",
    "scheme_id",
    "scheme",
    "scheme_code",
    "scheme_description",
    "amount",
    "currency",
    "amount_original",
    "currency_original",
];

/// ISO country codes with display names.
pub const COUNTRIES: &[(&str, &str)] = &[
    ("AT", "Austria"),
    ("BE", "Belgium"),
    ("BG", "Bulgaria"),
    ("CY", "Cyprus"),
    ("CZ", "Czech Republic"),
    ("DE", "Germany"),
    ("DK", "Denmark"),
    ("EE", "Estonia"),
    ("ES", "Spain"),
    ("FI", "Finland"),
    ("FR", "France"),
    ("GB", "United Kingdom"),
    ("GR", "Greece"),
    ("HR", "Croatia"),
    ("HU", "Hungary"),
    ("IE", "Ireland"),
    ("IT", "Italy"),
    ("LT", "Lithuania"),
    ("LU", "Luxembourg"),
    ("LV", "Latvia"),
    ("MT", "Malta"),
    ("NL", "Netherlands"),
    ("PL", "Poland"),
    ("PT", "Portugal"),
    ("RO", "Romania"),
    ("SE", "Sweden"),
    ("SI", "Slovenia"),
    ("SK", "Slovakia"),
];

/// EUR plus the national currencies converted during cleaning.
pub const CURRENCIES: &[&str] = &[
    "BGN", "CZK", "DKK", "EUR", "GBP", "HRK", "HUF", "PLN", "RON", "SEK",
];

pub const FIRST_YEAR: i32 = 2000;
pub const LAST_YEAR: i32 = 2029;

pub fn country_name(code: &str) -> Option<&'static str> {
    COUNTRIES
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(code))
        .map(|(_, name)| *name)
}

fn years() -> Vec<String> {
    (FIRST_YEAR..=LAST_YEAR).map(|year| year.to_string()).collect()
}

fn enum_values<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    let mut values: Vec<_> = values.into_iter().collect();
    values.sort_unstable();
    values
        .iter()
        .map(|value| format!("'{value}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Statements creating the table, its enumerated domains and indexes.
pub fn create_statements(dialect: Dialect, table: &str) -> Vec<String> {
    let countries = enum_values(COUNTRIES.iter().map(|(code, _)| *code));
    let currencies = enum_values(CURRENCIES.iter().copied());
    let years = years();
    let years = enum_values(years.iter().map(String::as_str));

    match dialect {
        Dialect::DuckDb => vec![
            format!("CREATE TYPE country AS ENUM ({countries})"),
            format!("CREATE TYPE currency AS ENUM ({currencies})"),
            format!("CREATE TYPE year AS ENUM ({years})"),
            format!(
                "CREATE TABLE {table} (
    pk                      VARCHAR NOT NULL PRIMARY KEY,
    country                 country NOT NULL,
    year                    year NOT NULL,
    recipient_id            VARCHAR NOT NULL,
    recipient_name          VARCHAR NOT NULL,
    recipient_fingerprint   VARCHAR NOT NULL,
    recipient_address       VARCHAR,
    recipient_country       VARCHAR NOT NULL,
    recipient_url           VARCHAR,
    scheme_id               VARCHAR,
    scheme                  VARCHAR,
    scheme_code             VARCHAR,
    scheme_description      VARCHAR,
    amount                  DECIMAL(18, 2),
    currency                currency NOT NULL,
    amount_original         DECIMAL(18, 2),
    currency_original       currency
)"
            ),
            format!("CREATE INDEX {table}_recipient_ix ON {table} (recipient_id)"),
            format!("CREATE INDEX {table}_country_ix ON {table} (country)"),
            format!("CREATE INDEX {table}_year_ix ON {table} (year)"),
            format!("CREATE INDEX {table}_fp_ix ON {table} (recipient_fingerprint)"),
        ],
        Dialect::ClickHouse => vec![format!(
            "CREATE TABLE {table}
(
    `pk`                      FixedString(40) NOT NULL,
    `country`                 Enum({countries}) NOT NULL,
    `year`                    Enum({years}) NOT NULL,
    `recipient_id`            FixedString(40) NOT NULL,
    `recipient_name`          String NOT NULL,
    `recipient_fingerprint`   String NOT NULL,
    `recipient_address`       Nullable(String),
    `recipient_country`       String NOT NULL,
    `recipient_url`           Nullable(String),
    `scheme_id`               Nullable(String),
    `scheme`                  Nullable(String),
    `scheme_code`             Nullable(String),
    `scheme_description`      Nullable(String),
    `amount`                  Decimal(18, 2) NOT NULL,
    `currency`                Enum({currencies}) NOT NULL,
    `amount_original`         Nullable(Decimal(18, 2)),
    `currency_original`       Nullable(Enum({currencies}))
) ENGINE = MergeTree()
ORDER BY (country, year, recipient_fingerprint, recipient_id, amount)"
        )],
    }
}

/// Statements dropping the table (and, for DuckDB, its enum types).
pub fn drop_statements(dialect: Dialect, table: &str) -> Vec<String> {
    let mut statements = vec![format!("DROP TABLE IF EXISTS {table}")];
    if dialect == Dialect::DuckDb {
        statements.extend(
            ["country", "currency", "year"]
                .iter()
                .map(|name| format!("DROP TYPE IF EXISTS {name}")),
        );
    }
    statements
}
