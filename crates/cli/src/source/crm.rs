//! CRM deal API client.
//!
//! `GET {base}/deals?page&limit&sort[&dealTypeId]` with an `X-Api-Key`
//! header. Pages are requested until one comes back empty or
//! `page * limit >= totalCount`.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use sheetsync_config::SourceSettings;
use sheetsync_engine::{key_from_json, SourceRecord, SubItem};

use super::common::{FetchClient, RetryPolicy};
use super::{RecordSource, SourceError};

pub struct CrmClient {
    client: FetchClient,
    api_key: String,
    base_url: String,
    page_size: u32,
    sort: String,
    deal_type_id: Option<i64>,
}

/// One page of `/deals`, already parsed.
#[derive(Debug)]
pub struct DealPage {
    pub records: Vec<SourceRecord>,
    pub total_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DealType {
    pub id: Option<i64>,
    pub name: String,
}

impl CrmClient {
    pub fn new(settings: &SourceSettings) -> Result<Self, SourceError> {
        let policy = RetryPolicy {
            max_retries: settings.max_retries,
            initial_backoff: settings.initial_backoff,
        };
        Ok(Self {
            client: FetchClient::new(settings.rate_limit, policy)?,
            api_key: settings.api_key.expose().to_string(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            page_size: settings.page_size,
            sort: settings.sort.clone(),
            deal_type_id: settings.deal_type_id,
        })
    }

    /// Fetch one page (1-based).
    pub fn fetch_page(&mut self, page: u32) -> Result<DealPage, SourceError> {
        let url = format!("{}/deals", self.base_url);
        let mut params = vec![
            ("page", page.to_string()),
            ("limit", self.page_size.to_string()),
            ("sort", self.sort.clone()),
        ];
        if let Some(id) = self.deal_type_id {
            params.push(("dealTypeId", id.to_string()));
        }

        let api_key = &self.api_key;
        let body = self
            .client
            .get_json(|http| http.get(&url).header("X-Api-Key", api_key).query(&params))?;

        let deals: Vec<SourceRecord> = match body.get("deals") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(deals)) => deals.iter().map(parse_deal).collect::<Result<_, _>>()?,
            Some(_) => return Err(SourceError::Parse("'deals' is not an array".into())),
        };
        let total_count = body["totalCount"].as_u64().unwrap_or(0);

        Ok(DealPage {
            records: deals,
            total_count,
        })
    }

    /// `GET /deal_types`.
    pub fn deal_types(&mut self) -> Result<Vec<DealType>, SourceError> {
        let url = format!("{}/deal_types", self.base_url);
        let api_key = &self.api_key;
        let body = self.client.get_json(|http| http.get(&url).header("X-Api-Key", api_key))?;

        let types = body["dealTypes"]
            .as_array()
            .ok_or_else(|| SourceError::Parse("response missing 'dealTypes' array".into()))?;
        Ok(types
            .iter()
            .map(|t| DealType {
                id: as_i64(&t["id"]),
                name: t["name"].as_str().unwrap_or_default().to_string(),
            })
            .collect())
    }
}

impl RecordSource for CrmClient {
    fn fetch_all(&mut self) -> Result<Vec<SourceRecord>, SourceError> {
        let mut all = Vec::new();
        let mut page = 1u32;

        loop {
            let DealPage { records, total_count } = self.fetch_page(page)?;
            if records.is_empty() {
                break;
            }
            debug!(page, count = records.len(), total_count, "fetched page");
            all.extend(records);

            if u64::from(page) * u64::from(self.page_size) >= total_count {
                break;
            }
            page += 1;
        }

        info!(records = all.len(), pages = page, "fetched deals");
        Ok(all)
    }
}

// ── Deal JSON ───────────────────────────────────────────────────────

/// Parse one deal object. Only a usable `id` is required; missing nested
/// objects become `None`.
pub fn parse_deal(deal: &Value) -> Result<SourceRecord, SourceError> {
    let key = key_from_json(&deal["id"])
        .ok_or_else(|| SourceError::Parse(format!("deal without id: {}", preview(deal))))?;

    let sub_items = deal["productDetails"]
        .as_array()
        .map(|details| details.iter().map(parse_product_detail).collect())
        .unwrap_or_default();

    Ok(SourceRecord {
        key,
        name: as_string(&deal["name"]).unwrap_or_default(),
        customer_name: as_string(&deal["customer"]["name"]),
        customer_id: as_i64(&deal["customer"]["id"]),
        deal_type_id: as_i64(&deal["dealType"]["id"]),
        deal_type_name: as_string(&deal["dealType"]["name"]),
        status: as_string(&deal["phase"]["name"]),
        owner_name: as_string(&deal["user"]["name"]),
        category: as_string(&deal["product"]["name"]),
        amount: as_f64(&deal["amount"]),
        expected_close: as_string(&deal["expectedContractDate"]),
        created_at: as_string(&deal["createdAt"]).unwrap_or_default(),
        updated_at: as_string(&deal["updatedAt"]).unwrap_or_default(),
        sub_items,
    })
}

fn parse_product_detail(detail: &Value) -> SubItem {
    SubItem {
        product_id: as_i64(&detail["productId"]),
        category: as_string(&detail["productName"]),
        quantity: as_f64(&detail["quantity"]),
        unit_price: as_f64(&detail["unitPrice"]),
        amount: as_f64(&detail["amount"]),
    }
}

fn as_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numbers, or strings holding one (`"1200.5"`).
fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn preview(v: &Value) -> String {
    let text = v.to_string();
    match text.char_indices().nth(120) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text,
    }
}
