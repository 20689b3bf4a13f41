//! # OpenLAM 结构数据库客户端
//!
//! 响应统一为 `{ "code": 0, "data": {...}, "error": { "msg": ... } }`：
//! - HTTP 状态码非 200：`HttpStatus`
//! - `code != 0`：`QueryError`，消息取自 `error.msg`
//!
//! 游标分页：从 `startId = 0` 开始，`items` 为 null 或 `nextStartId == 0` 时结束。
//! 失败不重试，直接向上返回。
//!
//! ## 环境变量
//! - `BOHRIUM_ACCESS_KEY`: 访问密钥
//! - `OPENLAM_STRUCTURE_ITERATE_URL`: 游标查询地址
//! - `OPENLAM_STRUCTURE_QUERY_URL`: 页码查询地址（已弃用）
//!
//! ## 依赖关系
//! - 被 `analysis/duplicate.rs`, `batch/pipeline.rs`, `commands/query.rs` 使用
//! - 使用 `db/query.rs`, `db/record.rs`

use super::query::StructureQuery;
use super::record::{CrystalRecord, RawRecord};
use crate::error::{LamOptError, Result};

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const ACCESS_KEY_ENV: &str = "BOHRIUM_ACCESS_KEY";
pub const ITERATE_URL_ENV: &str = "OPENLAM_STRUCTURE_ITERATE_URL";
pub const QUERY_URL_ENV: &str = "OPENLAM_STRUCTURE_QUERY_URL";

pub const DEFAULT_ITERATE_URL: &str = "http://openapi.dp.tech/openapi/v1/structures/iterate";
pub const DEFAULT_QUERY_URL: &str = "http://openapi.dp.tech/openapi/v1/structures/query";

/// 单次请求超时（秒）
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// 客户端配置
#[derive(Debug, Clone, PartialEq)]
pub struct DbConfig {
    pub access_key: Option<String>,
    pub iterate_url: String,
    pub query_url: String,
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig {
            access_key: None,
            iterate_url: DEFAULT_ITERATE_URL.to_string(),
            query_url: DEFAULT_QUERY_URL.to_string(),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

/// 游标分页的一页
#[derive(Debug, Clone)]
pub struct IteratePage {
    /// `None` 表示没有更多数据
    pub items: Option<Vec<CrystalRecord>>,
    /// 下一页起点，0 表示最后一页
    pub next_start_id: u64,
}

/// 页码分页的一页
#[derive(Debug, Clone)]
pub struct QueryPage {
    pub page: u32,
    pub items: Vec<CrystalRecord>,
}

/// 远程结构来源
pub trait StructureSource {
    /// 从 `start_id` 开始取至多 `limit` 条
    fn iterate(&self, query: &StructureQuery, start_id: u64, limit: u32) -> Result<IteratePage>;

    /// 按页码取一页
    #[deprecated(note = "use `iterate` / `query_all` instead")]
    fn page(&self, query: &StructureQuery, page: u32) -> Result<QueryPage>;
}

/// 按游标取回全部匹配记录
pub fn query_all(
    source: &dyn StructureSource,
    query: &StructureQuery,
    limit: u32,
) -> Result<Vec<CrystalRecord>> {
    let mut records = Vec::new();
    let mut start_id = 0;
    loop {
        let page = source.iterate(query, start_id, limit)?;
        let items = match page.items {
            Some(items) => items,
            None => break,
        };
        debug!(
            "fetched {} records from startId {} (next {})",
            items.len(),
            start_id,
            page.next_start_id
        );
        records.extend(items);
        if page.next_start_id == 0 {
            break;
        }
        start_id = page.next_start_id;
    }
    Ok(records)
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    data: Option<T>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIteratePage {
    #[serde(default)]
    items: Option<Vec<RawRecord>>,
    #[serde(default)]
    next_start_id: u64,
}

#[derive(Debug, Deserialize)]
struct RawQueryPage {
    #[serde(default)]
    items: Option<Vec<RawRecord>>,
}

/// 解开响应信封，返回 `data`
pub fn decode_envelope<T: DeserializeOwned>(status: u16, body: &str) -> Result<T> {
    if status != 200 {
        return Err(LamOptError::HttpStatus {
            status,
            body: body.to_string(),
        });
    }
    let envelope: Envelope<T> = serde_json::from_str(body)?;
    if envelope.code != 0 {
        let message = envelope
            .error
            .and_then(|e| e.msg)
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(LamOptError::QueryError {
            code: envelope.code,
            message,
        });
    }
    envelope
        .data
        .ok_or_else(|| LamOptError::MalformedRecord("response has no data".to_string()))
}

fn decode_records(raw: Vec<RawRecord>) -> Result<Vec<CrystalRecord>> {
    raw.into_iter().map(CrystalRecord::from_raw).collect()
}

/// 基于 HTTP 的 OpenLAM 客户端
pub struct OpenLamClient {
    http: Client,
    config: DbConfig,
}

impl OpenLamClient {
    pub fn new(config: DbConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(OpenLamClient { http, config })
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    fn get<T: DeserializeOwned>(&self, url: &str, mut params: Vec<(&'static str, String)>) -> Result<T> {
        if let Some(key) = &self.config.access_key {
            params.push(("accessKey", key.clone()));
        }
        let response = self
            .http
            .get(url)
            .header(CONTENT_TYPE, "application/json")
            .query(&params)
            .send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        decode_envelope(status, &body)
    }
}

impl StructureSource for OpenLamClient {
    fn iterate(&self, query: &StructureQuery, start_id: u64, limit: u32) -> Result<IteratePage> {
        let mut params = vec![("startId", start_id.to_string()), ("limit", limit.to_string())];
        params.extend(query.params());
        let raw: RawIteratePage = self.get(&self.config.iterate_url, params)?;
        let items = raw.items.map(decode_records).transpose()?;
        Ok(IteratePage {
            items,
            next_start_id: raw.next_start_id,
        })
    }

    fn page(&self, query: &StructureQuery, page: u32) -> Result<QueryPage> {
        warn!("Page-number queries are deprecated, use cursor iteration instead");
        let mut params = vec![("page", page.to_string())];
        params.extend(query.params());
        let raw: RawQueryPage = self.get(&self.config.query_url, params)?;
        Ok(QueryPage {
            page,
            items: decode_records(raw.items.unwrap_or_default())?,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::structure::fixtures::rock_salt;
    use chrono::Utc;
    use std::cell::{Cell, RefCell};

    fn record(formula: &str, energy: f64) -> CrystalRecord {
        CrystalRecord {
            formula: formula.to_string(),
            structure: rock_salt(5.64),
            energy,
            submission_time: Utc::now(),
        }
    }

    /// 按脚本返回固定页序列
    struct ScriptedSource {
        pages: RefCell<Vec<IteratePage>>,
        starts: RefCell<Vec<u64>>,
        page_calls: Cell<u32>,
    }

    impl StructureSource for ScriptedSource {
        fn iterate(&self, _query: &StructureQuery, start_id: u64, _limit: u32) -> Result<IteratePage> {
            self.starts.borrow_mut().push(start_id);
            let mut pages = self.pages.borrow_mut();
            if pages.is_empty() {
                return Err(LamOptError::Other("called past the last page".to_string()));
            }
            Ok(pages.remove(0))
        }

        fn page(&self, _query: &StructureQuery, page: u32) -> Result<QueryPage> {
            self.page_calls.set(self.page_calls.get() + 1);
            Ok(QueryPage {
                page,
                items: Vec::new(),
            })
        }
    }

    #[test]
    fn test_cursor_follows_next_start_id_until_null_items() {
        let source = ScriptedSource {
            pages: RefCell::new(vec![
                IteratePage {
                    items: Some(vec![record("NaCl", -1.0), record("NaCl", -2.0)]),
                    next_start_id: 5,
                },
                IteratePage {
                    items: Some(vec![record("NaCl", -3.0)]),
                    next_start_id: 9,
                },
                IteratePage {
                    items: None,
                    next_start_id: 0,
                },
            ]),
            starts: RefCell::new(Vec::new()),
            page_calls: Cell::new(0),
        };

        let records = query_all(&source, &StructureQuery::by_formula("NaCl"), 10).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(*source.starts.borrow(), vec![0, 5, 9]);
        assert_eq!(source.page_calls.get(), 0);
    }

    #[test]
    fn test_cursor_stops_on_zero_next_start_id() {
        let source = fakes::InMemorySource::new(vec![
            record("NaCl", -1.0),
            record("NaCl", -2.0),
            record("KCl", -3.0),
            record("NaCl", -4.0),
        ]);
        let records = query_all(&source, &StructureQuery::by_formula("NaCl"), 2).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(*source.calls.borrow(), vec![0, 2]);
    }

    #[test]
    fn test_remote_failure_propagates() {
        let source = fakes::InMemorySource::failing();
        let result = query_all(&source, &StructureQuery::default(), 10);
        assert!(matches!(result, Err(LamOptError::HttpStatus { status: 503, .. })));
        assert_eq!(source.calls.borrow().len(), 1);
    }

    #[test]
    fn test_decode_envelope_errors() {
        let result: Result<serde_json::Value> = decode_envelope(502, "bad gateway");
        assert!(matches!(
            result,
            Err(LamOptError::HttpStatus { status: 502, ref body }) if body == "bad gateway"
        ));

        let body = r#"{"code": 1001, "data": null, "error": {"msg": "invalid access key"}}"#;
        let result: Result<serde_json::Value> = decode_envelope(200, body);
        assert!(matches!(
            result,
            Err(LamOptError::QueryError { code: 1001, ref message }) if message == "invalid access key"
        ));
    }

    #[test]
    fn test_decode_iterate_page() {
        let body = r#"{
            "code": 0,
            "data": {
                "items": [{
                    "formula": "CsCl",
                    "structure": "{\"lattice\": {\"matrix\": [[4.12,0,0],[0,4.12,0],[0,0,4.12]]}, \"sites\": [{\"species\": [{\"element\": \"Cs\"}], \"abc\": [0,0,0]}, {\"species\": [{\"element\": \"Cl\"}], \"abc\": [0.5,0.5,0.5]}]}",
                    "energy": -6.8,
                    "submissionTime": "2024-05-01T10:00:00"
                }],
                "nextStartId": 0
            }
        }"#;
        let raw: RawIteratePage = decode_envelope(200, body).unwrap();
        assert_eq!(raw.next_start_id, 0);
        let records = decode_records(raw.items.unwrap()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].structure.len(), 2);

        let last: RawIteratePage =
            decode_envelope(200, r#"{"code": 0, "data": {"items": null, "nextStartId": 0}}"#)
                .unwrap();
        assert!(last.items.is_none());
    }

    #[test]
    fn test_default_config_points_at_openlam() {
        let config = DbConfig::default();
        assert_eq!(config.iterate_url, DEFAULT_ITERATE_URL);
        assert_eq!(config.query_url, DEFAULT_QUERY_URL);
        assert!(config.access_key.is_none());
    }
}
