use anyhow::{ Context, Result, anyhow };
use async_trait::async_trait;
use reqwest::{ Client, RequestBuilder, multipart };
use serde::de::DeserializeOwned;
use serde_derive::Deserialize;
use serde_json::{ json, Value };
use tracing::{ debug, trace };

use crate::config::ScConfig;
use super::{ AssetList, Repository, ScApi, STATIC_LIST_TYPE, count_from_string };

const ANALYSIS_PAGE_SIZE: usize = 1000;

/// Standard wrapper around every Tenable.sc REST response.
#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    response: Value,
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    error_msg: String,
}

#[derive(Deserialize)]
struct AnalysisPage {
    #[serde(rename(deserialize = "totalRecords"), deserialize_with = "count_from_string")]
    total_records: usize,
    #[serde(default)]
    results: Vec<IpRecord>,
}

#[derive(Deserialize)]
struct IpRecord {
    ip: String,
}

#[derive(Deserialize)]
struct UploadedFile {
    filename: String,
}

#[derive(Deserialize)]
struct AssetLists {
    #[serde(default)]
    manageable: Vec<AssetList>,
}

pub struct ScClient {
    config: ScConfig,
    http: Client,
    page_size: usize,
}

impl ScClient {
    pub fn new(config: ScConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.insecure)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("cannot create http client")?;
        Ok(ScClient { config, http, page_size: ANALYSIS_PAGE_SIZE })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn call<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T> {
        let resp = req
            .header(
                "x-apikey",
                format!(
                    "accessKey={}; secretKey={};",
                    self.config.access_key,
                    self.config.secret_key
                )
            )
            .send().await
            .context(format!("cannot {}", what))?;
        let status = resp.status();
        let text = resp.text().await.context(format!("cannot read response to {}", what))?;
        trace!("{} returned {}: {}", what, status, text);

        if !status.is_success() {
            let msg = serde_json
                ::from_str::<Envelope>(&text)
                .ok()
                .map(|e| e.error_msg)
                .filter(|m| !m.is_empty())
                .unwrap_or(text);
            return Err(anyhow!("cannot {}: server returned {}: {}", what, status, msg.trim()));
        }
        let envelope: Envelope = serde_json
            ::from_str(&text)
            .context(format!("cannot parse response to {}", what))?;
        if envelope.error_code != 0 {
            return Err(
                anyhow!(
                    "cannot {}: error code {}: {}",
                    what,
                    envelope.error_code,
                    envelope.error_msg.trim()
                )
            );
        }
        serde_json
            ::from_value(envelope.response)
            .context(format!("cannot parse response to {}", what))
    }

    async fn analysis_page(&self, repo_id: &str, start: usize) -> Result<AnalysisPage> {
        let end = start + self.page_size;
        let query =
            json!({
            "type": "vuln",
            "tool": "sumip",
            "filters": [
                { "filterName": "repository", "operator": "=", "value": [{ "id": repo_id }] }
            ],
            "startOffset": start,
            "endOffset": end,
        });
        let body =
            json!({
            "type": "vuln",
            "sourceType": "cumulative",
            "query": query,
        });
        self.call(self.http.post(self.url("analysis")).json(&body), "query repository ips").await
    }
}

#[async_trait]
impl ScApi for ScClient {
    async fn list_repositories(&self) -> Result<Vec<Repository>> {
        debug!("listing repositories from {}", self.config.base_url);
        let req = self
            .http
            .get(self.url("repository"))
            .query(
                &[
                    ("type", "All"),
                    ("fields", "id,name,dataFormat"),
                ]
            );
        self.call(req, "list repositories").await
    }

    async fn repository_ips(&self, repo_id: &str) -> Result<Vec<String>> {
        let mut ips = vec![];
        loop {
            let page = self.analysis_page(repo_id, ips.len()).await?;
            let n = page.results.len();
            ips.extend(page.results.into_iter().map(|r| r.ip));
            debug!(repo_id, "read {} of {} ip records", ips.len(), page.total_records);
            if n == 0 || ips.len() >= page.total_records {
                break;
            }
        }
        Ok(ips)
    }

    async fn import_scan(&self, repo_id: &str, file_name: &str, content: String) -> Result<()> {
        let part = multipart::Part
            ::text(content)
            .file_name(file_name.to_string())
            .mime_str("application/xml")?;
        let form = multipart::Form::new().part("Filedata", part);
        let uploaded: UploadedFile = self.call(
            self.http.post(self.url("file/upload")).multipart(form),
            "upload scan file"
        ).await?;
        debug!(repo_id, "uploaded scan file as {}", uploaded.filename);

        let body =
            json!({
            "filename": uploaded.filename,
            "repository": { "id": repo_id },
            "classifyMitigatedAge": 0,
            "dhcpTracking": "false",
            "scanningVirtualHosts": "false",
        });
        let _: Value = self.call(
            self.http.post(self.url("scanResult/import")).json(&body),
            "import scan result"
        ).await?;
        Ok(())
    }

    async fn manageable_asset_lists(&self) -> Result<Vec<AssetList>> {
        let req = self
            .http
            .get(self.url("asset"))
            .query(&[("fields", "id,name,type")]);
        let lists: AssetLists = self.call(req, "list asset lists").await?;
        Ok(lists.manageable)
    }

    async fn create_asset_list(&self, name: &str, ips: &[String]) -> Result<()> {
        let body = json!({
            "name": name,
            "type": STATIC_LIST_TYPE,
            "definedIPs": ips.join(","),
        });
        let _: Value = self.call(
            self.http.post(self.url("asset")).json(&body),
            "create asset list"
        ).await?;
        Ok(())
    }

    async fn update_asset_list(&self, id: &str, ips: &[String]) -> Result<()> {
        let body = json!({ "definedIPs": ips.join(",") });
        let _: Value = self.call(
            self.http.patch(self.url(&format!("asset/{}", id))).json(&body),
            "update asset list"
        ).await?;
        Ok(())
    }
}
