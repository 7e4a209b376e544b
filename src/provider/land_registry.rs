//! HM Land Registry price paid data client.
//!
//! Queries the public SPARQL endpoint for historical sales in a postcode
//! area. Fallible and timeout-bound; retry policy belongs to the caller.

use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::matcher;
use crate::model::{PropertyType, ProviderError, SaleRecord, StructuredAddress};
use crate::utils::parse_date;

const PROPERTY_TYPE_URIS: &[(PropertyType, &str)] = &[
    (
        PropertyType::Detached,
        "http://landregistry.data.gov.uk/def/common/detached",
    ),
    (
        PropertyType::SemiDetached,
        "http://landregistry.data.gov.uk/def/common/semi-detached",
    ),
    (
        PropertyType::Terraced,
        "http://landregistry.data.gov.uk/def/common/terraced",
    ),
    (
        PropertyType::Flat,
        "http://landregistry.data.gov.uk/def/common/flat-maisonette",
    ),
];

pub struct LandRegistryClient {
    client: Client,
    endpoint: String,
}

impl LandRegistryClient {
    pub fn new(endpoint: &str, timeout_seconds: u64) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent("bargain-scout/0.1")
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    /// Queries standard price-paid transactions whose postcode starts with
    /// `postcode_prefix` (a sector like "SW15 6" or a district like "SW15").
    pub async fn query_transactions(
        &self,
        postcode_prefix: &str,
        property_type: Option<PropertyType>,
        min_date: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<SaleRecord>, ProviderError> {
        let query = build_query(postcode_prefix, property_type, min_date, limit);
        debug!(prefix = postcode_prefix, "querying land registry");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/sparql-results+json")
            .form(&[("query", query.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Http(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(ProviderError::InvalidResponse(format!(
                "status {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(parse_results(&body))
    }
}

/// Renders the SPARQL SELECT for price-paid transaction records with the
/// BS7666 address fields joined in.
fn build_query(
    postcode_prefix: &str,
    property_type: Option<PropertyType>,
    min_date: Option<NaiveDate>,
    limit: usize,
) -> String {
    let type_filter = property_type
        .map(|t| format!("FILTER(?propertyType = <{}>)", property_type_uri(t)))
        .unwrap_or_default();

    let date_filter = min_date
        .map(|d| format!(r#"FILTER(?transactionDate >= "{}"^^xsd:date)"#, d))
        .unwrap_or_default();

    format!(
        r#"PREFIX xsd: <http://www.w3.org/2001/XMLSchema#>
PREFIX ppi: <http://landregistry.data.gov.uk/def/ppi/>
PREFIX lrcommon: <http://landregistry.data.gov.uk/def/common/>

SELECT ?pricePaid ?transactionDate ?propertyType ?postcode ?paon ?saon ?street ?town
WHERE {{
    ?item a ppi:TransactionRecord ;
          ppi:pricePaid ?pricePaid ;
          ppi:transactionDate ?transactionDate ;
          ppi:propertyAddress ?address ;
          ppi:propertyType ?propertyType ;
          ppi:transactionCategory <http://landregistry.data.gov.uk/def/ppi/standardPricePaidTransaction> .

    ?address lrcommon:postcode ?postcode .

    OPTIONAL {{ ?address lrcommon:paon ?paon }}
    OPTIONAL {{ ?address lrcommon:saon ?saon }}
    OPTIONAL {{ ?address lrcommon:street ?street }}
    OPTIONAL {{ ?address lrcommon:town ?town }}

    FILTER(STRSTARTS(?postcode, "{postcode_prefix}"))
    {type_filter}
    {date_filter}
}}
ORDER BY DESC(?transactionDate)
LIMIT {limit}
"#
    )
}

/// Maps the standard SPARQL JSON results envelope to sale records.
/// Rows missing a price, date or postcode are dropped with a warning.
fn parse_results(body: &Value) -> Vec<SaleRecord> {
    let bindings = body
        .pointer("/results/bindings")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut records = Vec::new();
    for binding in bindings {
        match parse_binding(binding) {
            Some(record) => records.push(record),
            None => warn!("dropping malformed land registry row"),
        }
    }
    records
}

fn parse_binding(binding: &Value) -> Option<SaleRecord> {
    let value = |field: &str| {
        binding
            .pointer(&format!("/{field}/value"))
            .and_then(Value::as_str)
    };

    let price_paid: f64 = value("pricePaid")?.parse().ok()?;
    let transaction_date = parse_date(value("transactionDate")?)?;
    let postcode = matcher::normalize_postcode(value("postcode")?);
    let property_type = value("propertyType").and_then(uri_to_property_type);

    let address = StructuredAddress {
        paon: value("paon").map(|s| s.to_uppercase()),
        saon: value("saon").map(|s| s.to_uppercase()),
        street: value("street").map(|s| s.to_uppercase()),
        town: value("town").map(|s| s.to_uppercase()),
        postcode: Some(postcode),
    };

    Some(SaleRecord {
        address,
        property_type,
        price_paid,
        transaction_date,
    })
}

fn property_type_uri(t: PropertyType) -> &'static str {
    PROPERTY_TYPE_URIS
        .iter()
        .find(|(pt, _)| *pt == t)
        .map(|(_, uri)| *uri)
        .unwrap_or_default()
}

fn uri_to_property_type(uri: &str) -> Option<PropertyType> {
    PROPERTY_TYPE_URIS
        .iter()
        .find(|(_, u)| *u == uri)
        .map(|(pt, _)| *pt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_builds_from_config_values() {
        let client = LandRegistryClient::new("http://landregistry.data.gov.uk/landregistry/query", 30);
        assert!(client.is_ok());
    }

    #[test]
    fn query_carries_prefix_and_limit() {
        let query = build_query("SW15 6", None, None, 100);
        assert!(query.contains(r#"STRSTARTS(?postcode, "SW15 6")"#));
        assert!(query.contains("LIMIT 100"));
        assert!(query.contains("ppi:TransactionRecord"));
        assert!(!query.contains("FILTER(?propertyType"));
    }

    #[test]
    fn query_with_type_and_date_filters() {
        let min_date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let query = build_query("SW15 6", Some(PropertyType::Terraced), Some(min_date), 50);
        assert!(query.contains("terraced"));
        assert!(query.contains("2024-01-01"));
        assert!(query.contains("LIMIT 50"));
    }

    #[test]
    fn property_type_uri_round_trip() {
        for t in [
            PropertyType::Detached,
            PropertyType::SemiDetached,
            PropertyType::Terraced,
            PropertyType::Flat,
        ] {
            assert_eq!(uri_to_property_type(property_type_uri(t)), Some(t));
        }
        assert_eq!(uri_to_property_type("unknown-uri"), None);
    }

    #[test]
    fn parses_results_envelope() {
        let body = json!({
            "results": {
                "bindings": [
                    {
                        "pricePaid": {"value": "525000"},
                        "transactionDate": {"value": "2025-02-10"},
                        "propertyType": {"value": "http://landregistry.data.gov.uk/def/common/terraced"},
                        "postcode": {"value": "sw15 6ej"},
                        "paon": {"value": "42"},
                        "street": {"value": "High Street"},
                        "town": {"value": "London"}
                    },
                    {
                        "transactionDate": {"value": "2025-02-10"},
                        "postcode": {"value": "SW15 6AB"}
                    }
                ]
            }
        });

        let records = parse_results(&body);
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.price_paid, 525_000.0);
        assert_eq!(record.property_type, Some(PropertyType::Terraced));
        assert_eq!(record.address.postcode.as_deref(), Some("SW15 6EJ"));
        assert_eq!(record.address.paon.as_deref(), Some("42"));
        assert_eq!(record.address.street.as_deref(), Some("HIGH STREET"));
        assert_eq!(record.address.saon, None);
    }

    #[test]
    fn empty_envelope_parses_to_nothing() {
        assert!(parse_results(&json!({})).is_empty());
    }
}
