use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{Connection, Row, params};
use tracing::debug;

use crate::analyzer::ppsf;
use crate::matcher;
use crate::model::{
    ComparableTransaction, EpcRating, Priority, PropertyAnalysis, PropertyType, SaleRecord,
    StorageError, StructuredAddress, SubjectRecord,
};

/// One persisted valuation metrics row, the live record for a subject.
#[derive(Debug, Clone)]
pub struct StoredMetrics {
    pub uprn: String,
    pub asking_ppsf: f64,
    pub market_ppsf: Option<f64>,
    pub undervalued_index: f64,
    pub projected_yield: Option<f64>,
    pub value_uplift: Option<f64>,
    pub comparable_count: usize,
    pub priority: Priority,
    pub confidence: f64,
    pub calculated_at: DateTime<Utc>,
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens the database and runs schema migrations.
    pub fn new(db_path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS properties (
                uprn TEXT PRIMARY KEY,
                paon TEXT,
                saon TEXT,
                street TEXT,
                town TEXT,
                postcode TEXT NOT NULL DEFAULT '',
                property_type TEXT,
                floor_area_sqft REAL
            );

            CREATE TABLE IF NOT EXISTS listings (
                uprn TEXT PRIMARY KEY,
                asking_price REAL NOT NULL,
                listed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                uprn TEXT,
                postcode TEXT NOT NULL,
                property_type TEXT,
                price_paid REAL NOT NULL,
                floor_area_sqft REAL,
                transaction_date TEXT NOT NULL,
                unit_price REAL
            );

            CREATE TABLE IF NOT EXISTS valuation_metrics (
                uprn TEXT PRIMARY KEY,
                asking_ppsf REAL NOT NULL,
                market_ppsf REAL,
                undervalued_index REAL NOT NULL,
                projected_yield REAL,
                comparable_count INTEGER NOT NULL,
                priority TEXT NOT NULL,
                confidence REAL NOT NULL,
                calculated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_postcode
                ON transactions (postcode, transaction_date);
            ",
        )?;

        // Idempotent column migrations for fields added after first release.
        Self::migrate_add_column_if_missing(&conn, "properties", "epc_rating", "TEXT")?;
        Self::migrate_add_column_if_missing(&conn, "valuation_metrics", "value_uplift", "REAL")?;

        Ok(Self { conn })
    }

    fn migrate_add_column_if_missing(
        conn: &Connection,
        table: &str,
        column: &str,
        column_def: &str,
    ) -> Result<(), StorageError> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let existing_columns: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<_, _>>()?;

        if !existing_columns.iter().any(|c| c == column) {
            let alter_sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, column_def);
            conn.execute(&alter_sql, [])?;
        }

        Ok(())
    }

    /// Inserts or fully overwrites a subject property.
    pub fn save_property(&self, subject: &SubjectRecord) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO properties (
                uprn, paon, saon, street, town, postcode,
                property_type, floor_area_sqft, epc_rating
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &subject.uprn,
                &subject.address.paon,
                &subject.address.saon,
                &subject.address.street,
                &subject.address.town,
                subject.address.postcode.as_deref().unwrap_or(""),
                subject.property_type.map(|t| t.as_str()),
                &subject.floor_area_sqft,
                subject.epc_rating.map(|r| r.as_str()),
            ],
        )?;
        Ok(())
    }

    pub fn get_property(&self, uprn: &str) -> Result<Option<SubjectRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT uprn, paon, saon, street, town, postcode,
                    property_type, floor_area_sqft, epc_rating
             FROM properties WHERE uprn = ?1",
        )?;

        let mut rows = stmt.query(params![uprn])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::map_subject(row)?)),
            None => Ok(None),
        }
    }

    /// Subjects in a postcode district that hold an active quote and a
    /// usable floor area, i.e. the analyzable set.
    pub fn properties_in_district(
        &self,
        district: &str,
    ) -> Result<Vec<SubjectRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT p.uprn, p.paon, p.saon, p.street, p.town, p.postcode,
                    p.property_type, p.floor_area_sqft, p.epc_rating
             FROM properties p
             JOIN listings l ON l.uprn = p.uprn
             WHERE p.postcode LIKE ?1 || '%'
               AND p.floor_area_sqft IS NOT NULL
               AND p.floor_area_sqft > 0",
        )?;

        let rows = stmt.query_map(params![district], Self::map_subject)?;
        let mut subjects = Vec::new();
        for subject in rows {
            subjects.push(subject?);
        }
        Ok(subjects)
    }

    /// Sets the active asking quote for a subject (one live quote each).
    pub fn save_quote(&self, uprn: &str, asking_price: f64) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO listings (uprn, asking_price, listed_at)
             VALUES (?1, ?2, ?3)",
            params![uprn, asking_price, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn active_quote(&self, uprn: &str) -> Result<Option<f64>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT asking_price FROM listings WHERE uprn = ?1")?;
        let mut rows = stmt.query(params![uprn])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// UPRNs and addresses of every property in a postcode sector, the
    /// candidate pool for fuzzy sale-address resolution.
    pub fn addresses_in_sector(
        &self,
        sector: &str,
    ) -> Result<Vec<(String, StructuredAddress)>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT uprn, paon, saon, street, town, postcode
             FROM properties WHERE postcode LIKE ?1 || '%'",
        )?;

        let rows = stmt.query_map(params![sector], |row| {
            let uprn: String = row.get(0)?;
            Ok((uprn, Self::map_address(row, 1)?))
        })?;

        let mut addresses = Vec::new();
        for row in rows {
            addresses.push(row?);
        }
        Ok(addresses)
    }

    /// Records an ingested sale, resolving its address against known
    /// properties in the same sector. When a property matches, the sale
    /// inherits its UPRN and floor area and gains a unit price; otherwise
    /// the row is kept unresolved as postcode-level evidence.
    ///
    /// Returns true when the sale resolved to a known property.
    pub fn record_sale(&self, sale: &SaleRecord, threshold: f64) -> Result<bool, StorageError> {
        let date_str = sale.transaction_date.to_string();
        let postcode = sale.address.postcode.clone().unwrap_or_default();

        // Same sale fetched twice is a no-op.
        let mut dup_stmt = self.conn.prepare(
            "SELECT 1 FROM transactions
             WHERE postcode = ?1 AND transaction_date = ?2 AND price_paid = ?3",
        )?;
        let mut dup_rows = dup_stmt.query(params![&postcode, &date_str, sale.price_paid])?;
        if dup_rows.next()?.is_some() {
            return Ok(false);
        }

        let candidates = match matcher::postcode_sector(&postcode) {
            Some(sector) => self.addresses_in_sector(&sector)?,
            None => Vec::new(),
        };
        let candidate_addresses: Vec<StructuredAddress> =
            candidates.iter().map(|(_, a)| a.clone()).collect();

        let matched = matcher::best_match(&sale.address, &candidate_addresses, threshold)
            .map(|(index, score)| {
                debug!(score, uprn = %candidates[index].0, "resolved sale address");
                candidates[index].0.clone()
            });

        let (floor_area, unit_price) = match &matched {
            Some(uprn) => {
                let area = self
                    .get_property(uprn)?
                    .and_then(|p| p.floor_area_sqft)
                    .filter(|a| *a > 0.0);
                let unit = area.and_then(|a| ppsf::unit_price(sale.price_paid, a));
                (area, unit)
            }
            None => (None, None),
        };

        self.conn.execute(
            "INSERT INTO transactions (
                uprn, postcode, property_type, price_paid,
                floor_area_sqft, transaction_date, unit_price
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &matched,
                &postcode,
                sale.property_type.map(|t| t.as_str()),
                sale.price_paid,
                &floor_area,
                &date_str,
                &unit_price,
            ],
        )?;

        Ok(matched.is_some())
    }

    /// Resolved transactions in a postcode sector, newest first, bounded
    /// by the age cutoff and the result cap.
    pub fn transactions_in_sector(
        &self,
        sector: &str,
        max_age_months: i64,
        limit: usize,
    ) -> Result<Vec<ComparableTransaction>, StorageError> {
        let cutoff = (Utc::now().date_naive() - Duration::days(max_age_months * 30)).to_string();

        let mut stmt = self.conn.prepare(
            "SELECT uprn, postcode, property_type, price_paid,
                    floor_area_sqft, transaction_date
             FROM transactions
             WHERE postcode LIKE ?1 || '%'
               AND transaction_date >= ?2
               AND floor_area_sqft IS NOT NULL
               AND floor_area_sqft > 0
             ORDER BY transaction_date DESC
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(params![sector, cutoff, limit as i64], Self::map_transaction)?;
        let mut transactions = Vec::new();
        for row in rows {
            transactions.push(row?);
        }
        Ok(transactions)
    }

    /// Stages the analysis upsert: insert if absent, full-field overwrite
    /// if present. Exactly one live metrics row per subject.
    pub fn upsert_analysis(&self, analysis: &PropertyAnalysis) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO valuation_metrics (
                uprn, asking_ppsf, market_ppsf, undervalued_index,
                projected_yield, value_uplift, comparable_count,
                priority, confidence, calculated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &analysis.uprn,
                analysis.ppsf.asking_ppsf,
                &analysis.ppsf.market_ppsf,
                analysis.bargain.undervalued_index,
                &analysis.bargain.projected_yield,
                &analysis.bargain.value_uplift_potential,
                analysis.ppsf.comparable_count as i64,
                analysis.bargain.priority.as_str(),
                analysis.bargain.confidence,
                analysis.calculated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_metrics(&self, uprn: &str) -> Result<Option<StoredMetrics>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT uprn, asking_ppsf, market_ppsf, undervalued_index,
                    projected_yield, value_uplift, comparable_count,
                    priority, confidence, calculated_at
             FROM valuation_metrics WHERE uprn = ?1",
        )?;

        let mut rows = stmt.query(params![uprn])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::map_metrics(row)?)),
            None => Ok(None),
        }
    }

    /// The strongest currently-stored opportunities, for reporting.
    pub fn top_opportunities(&self, limit: usize) -> Result<Vec<StoredMetrics>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT uprn, asking_ppsf, market_ppsf, undervalued_index,
                    projected_yield, value_uplift, comparable_count,
                    priority, confidence, calculated_at
             FROM valuation_metrics
             WHERE priority = 'High'
             ORDER BY undervalued_index DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], Self::map_metrics)?;
        let mut metrics = Vec::new();
        for row in rows {
            metrics.push(row?);
        }
        Ok(metrics)
    }

    fn map_address(row: &Row, offset: usize) -> Result<StructuredAddress, rusqlite::Error> {
        let postcode: String = row.get(offset + 4)?;
        Ok(StructuredAddress {
            paon: row.get(offset)?,
            saon: row.get(offset + 1)?,
            street: row.get(offset + 2)?,
            town: row.get(offset + 3)?,
            postcode: if postcode.is_empty() { None } else { Some(postcode) },
        })
    }

    fn map_subject(row: &Row) -> Result<SubjectRecord, rusqlite::Error> {
        let property_type: Option<String> = row.get(6)?;
        let epc_rating: Option<String> = row.get(8)?;
        Ok(SubjectRecord {
            uprn: row.get(0)?,
            address: Self::map_address(row, 1)?,
            property_type: property_type.as_deref().and_then(PropertyType::parse),
            floor_area_sqft: row.get(7)?,
            epc_rating: epc_rating.as_deref().and_then(EpcRating::parse),
        })
    }

    fn map_transaction(row: &Row) -> Result<ComparableTransaction, rusqlite::Error> {
        let date_str: String = row.get(5)?;
        let transaction_date = date_str.parse::<NaiveDate>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let property_type: Option<String> = row.get(2)?;

        Ok(ComparableTransaction::new(
            row.get(0)?,
            row.get(1)?,
            property_type.as_deref().and_then(PropertyType::parse),
            row.get(3)?,
            row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
            transaction_date,
        ))
    }

    fn map_metrics(row: &Row) -> Result<StoredMetrics, rusqlite::Error> {
        let priority_str: String = row.get(7)?;
        let calculated_at_str: String = row.get(9)?;
        let calculated_at = calculated_at_str.parse().map_err(|e: chrono::ParseError| {
            rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(StoredMetrics {
            uprn: row.get(0)?,
            asking_ppsf: row.get(1)?,
            market_ppsf: row.get(2)?,
            undervalued_index: row.get(3)?,
            projected_yield: row.get(4)?,
            value_uplift: row.get(5)?,
            comparable_count: row.get::<_, i64>(6)? as usize,
            // A corrupt priority string degrades to Low rather than failing reads.
            priority: Priority::parse(&priority_str).unwrap_or(Priority::Low),
            confidence: row.get(8)?,
            calculated_at,
        })
    }
}
