//! Census batch geocoding.
//!
//! Request: a headerless CSV file (`id,street,city,state,zip`) posted as
//! multipart form data. Response: one CSV line per input row:
//!
//! ```text
//! "id","input","Match|No_Match|Tie","Exact|Non_Exact","matched addr","lon,lat","tigerlineid","side"[,"state","county","tract","block"]
//! ```
//!
//! Rows that cannot be parsed are dropped so one bad line does not sink
//! the whole batch.

use std::time::Duration;

use common::Error;
use csv::StringRecord;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::CensusClient;

const BATCH_PATH: &str = "/geographies/addressbatch";

/// Hard cap on rows per submitted file.
pub const MAX_BATCH_ROWS: usize = 10_000;

const BATCH_TIMEOUT: Duration = Duration::from_secs(600);

/// One row of the submitted address file.
#[derive(Debug, Clone, Serialize)]
pub struct BulkRecord {
    pub id: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

/// One parsed row of the batch response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkMatch {
    pub id: String,
    pub matched: bool,
    pub exact: bool,
    pub matched_address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub tiger_line_id: String,
    pub side: String,
    pub county_fips: Option<String>,
}

impl CensusClient {
    /// Submit up to [`MAX_BATCH_ROWS`] addresses in one request.
    ///
    /// Returned rows are keyed by the `id` the caller supplied; rows the
    /// geocoder dropped or garbled are simply absent.
    pub async fn geocode_batch(
        &self,
        cancel: &CancellationToken,
        records: &[BulkRecord],
    ) -> Result<Vec<BulkMatch>, Error> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        if records.len() > MAX_BATCH_ROWS {
            return Err(Error::Census(format!(
                "batch of {} rows exceeds the {} row limit",
                records.len(),
                MAX_BATCH_ROWS
            )));
        }

        self.limiter.wait(cancel).await?;

        let payload = build_payload(records)?;
        let file = reqwest::multipart::Part::text(payload)
            .file_name("addresses.csv")
            .mime_str("text/csv")
            .map_err(|e| Error::Census(format!("invalid multipart part: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .text("benchmark", self.benchmark.clone())
            .text("vintage", self.vintage.clone())
            .part("addressFile", file);

        debug!("Submitting Census batch of {} rows", records.len());

        let resp = self
            .client
            .post(self.url(BATCH_PATH))
            .multipart(form)
            .timeout(BATCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::Census(format!("batch HTTP error: {e}")))?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Census(format!(
                "Census batch returned {}: {}",
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::Census(format!("batch body read error: {e}")))?;

        let rows = parse_response(&body);
        debug!(
            "Census batch parsed {} of {} rows ({} matched)",
            rows.len(),
            records.len(),
            rows.iter().filter(|r| r.matched).count()
        );

        Ok(rows)
    }
}

/// Render records as the headerless CSV file the batch endpoint expects.
pub fn build_payload(records: &[BulkRecord]) -> Result<String, Error> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    for r in records {
        wtr.serialize(r)
            .map_err(|e| Error::Parse(format!("failed to encode row {}: {e}", r.id)))?;
    }
    wtr.flush()?;

    let bytes = wtr
        .into_inner()
        .map_err(|e| Error::Parse(format!("failed to finish batch payload: {e}")))?;
    String::from_utf8(bytes).map_err(|e| Error::Parse(e.to_string()))
}

/// Parse the batch response body, skipping unreadable lines.
pub fn parse_response(body: &str) -> Vec<BulkMatch> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        match record {
            Ok(record) => match parse_row(&record) {
                Some(row) => rows.push(row),
                None => debug!("Dropping malformed Census batch line {}", line + 1),
            },
            Err(e) => debug!("Dropping unreadable Census batch line {}: {}", line + 1, e),
        }
    }
    rows
}

fn parse_row(record: &StringRecord) -> Option<BulkMatch> {
    let id = record.get(0)?.trim();
    if id.is_empty() {
        return None;
    }

    let status = record.get(2)?.trim();
    if status.eq_ignore_ascii_case("No_Match") || status.eq_ignore_ascii_case("Tie") {
        return Some(BulkMatch {
            id: id.to_string(),
            ..BulkMatch::default()
        });
    }
    if !status.eq_ignore_ascii_case("Match") {
        return None;
    }

    let exact = record.get(3)?.trim().eq_ignore_ascii_case("Exact");
    let matched_address = record.get(4)?.trim().to_string();
    let (longitude, latitude) = parse_lon_lat(record.get(5)?)?;
    let tiger_line_id = record.get(6).unwrap_or_default().trim().to_string();
    let side = record.get(7).unwrap_or_default().trim().to_string();

    let county_fips = match (record.get(8), record.get(9)) {
        (Some(state), Some(county)) if !state.trim().is_empty() && !county.trim().is_empty() => {
            Some(format!("{}{}", state.trim(), county.trim()))
        }
        _ => None,
    };

    Some(BulkMatch {
        id: id.to_string(),
        matched: true,
        exact,
        matched_address,
        latitude,
        longitude,
        tiger_line_id,
        side,
        county_fips,
    })
}

fn parse_lon_lat(raw: &str) -> Option<(f64, f64)> {
    let (lon, lat) = raw.split_once(',')?;
    Some((lon.trim().parse().ok()?, lat.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, street: &str) -> BulkRecord {
        BulkRecord {
            id: id.into(),
            street: street.into(),
            city: "Miami".into(),
            state: "FL".into(),
            zip: "33131".into(),
        }
    }

    #[test]
    fn test_payload_is_headerless_csv() {
        let payload =
            build_payload(&[record("0", "100 S Biscayne Blvd"), record("1", "1 Elm, Apt 2")])
                .unwrap();
        let lines: Vec<&str> = payload.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "0,100 S Biscayne Blvd,Miami,FL,33131");
        assert_eq!(lines[1], "1,\"1 Elm, Apt 2\",Miami,FL,33131");
    }

    #[test]
    fn test_parse_mixed_response() {
        let body = concat!(
            "\"0\",\"100 S Biscayne Blvd, Miami, FL, 33131\",\"Match\",\"Exact\",\"100 S BISCAYNE BLVD, MIAMI, FL, 33131\",\"-80.18727,25.77408\",\"94451233\",\"L\"\n",
            "\"1\",\"1 Nowhere Rd, Miami, FL, 33131\",\"No_Match\"\n",
            "\"2\",\"5 Oak St, Miami, FL, 33131\",\"Match\",\"Non_Exact\",\"5 OAK ST, MIAMI, FL, 33131\",\"-80.2,25.8\",\"123\",\"R\",\"12\",\"086\",\"003701\",\"1012\"\n",
        );

        let rows = parse_response(body);
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].id, "0");
        assert!(rows[0].matched && rows[0].exact);
        assert!((rows[0].latitude - 25.77408).abs() < 1e-9);
        assert!((rows[0].longitude + 80.18727).abs() < 1e-9);
        assert_eq!(rows[0].side, "L");
        assert_eq!(rows[0].county_fips, None);

        assert_eq!(rows[1].id, "1");
        assert!(!rows[1].matched);

        assert!(rows[2].matched && !rows[2].exact);
        assert_eq!(rows[2].county_fips.as_deref(), Some("12086"));
    }

    #[test]
    fn test_malformed_lines_are_dropped() {
        let body = concat!(
            "\"0\",\"x\",\"Match\",\"Exact\",\"X\",\"not-a-coordinate\",\"1\",\"L\"\n",
            "\"\",\"y\",\"No_Match\"\n",
            "\"2\",\"z\",\"Something_Else\"\n",
            "garbage\n",
            "\"4\",\"w\",\"Tie\"\n",
        );

        let rows = parse_response(body);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "4");
        assert!(!rows[0].matched);
    }

    #[tokio::test]
    async fn test_oversized_batch_is_rejected_before_sending() {
        let limiter = common::RateLimiter::per_second("census", 1).unwrap();
        let client = CensusClient::new("Public_AR_Current", "Current_Current", limiter)
            .unwrap()
            .with_base_url("http://127.0.0.1:9");

        let records: Vec<BulkRecord> = (0..=MAX_BATCH_ROWS)
            .map(|i| record(&i.to_string(), "1 Main St"))
            .collect();

        let err = client
            .geocode_batch(&CancellationToken::new(), &records)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Census(_)));
    }
}
