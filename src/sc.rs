use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{ Deserializer, de };
use serde_derive::Deserialize;

use crate::error::ReconcileError;

mod client;
pub use client::ScClient;

pub const AGENT_FORMAT: &str = "agent";
pub const IPV4_FORMAT: &str = "IPv4";
pub const STATIC_LIST_TYPE: &str = "static";

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Repository {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(rename(deserialize = "dataFormat"), default)]
    pub data_format: String,
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AssetList {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(rename(deserialize = "type"), default)]
    pub list_type: String,
}

/// Operations the reconciler needs from a Tenable.sc server.
#[async_trait]
pub trait ScApi: Send + Sync {
    async fn list_repositories(&self) -> Result<Vec<Repository>>;
    /// Addresses of the summarized (sumip) findings stored in a repository.
    async fn repository_ips(&self, repo_id: &str) -> Result<Vec<String>>;
    async fn import_scan(&self, repo_id: &str, file_name: &str, content: String) -> Result<()>;
    async fn manageable_asset_lists(&self) -> Result<Vec<AssetList>>;
    async fn create_asset_list(&self, name: &str, ips: &[String]) -> Result<()>;
    /// Replaces the addresses of an existing static asset list.
    async fn update_asset_list(&self, id: &str, ips: &[String]) -> Result<()>;
}

pub fn find_repository<'a>(
    catalog: &'a [Repository],
    name: &str,
    data_format: &str
) -> Result<&'a Repository, ReconcileError> {
    let repo = catalog
        .iter()
        .find(|r| r.name == name)
        .ok_or_else(|| ReconcileError::RepositoryNotFound(name.to_string()))?;
    if repo.data_format != data_format {
        return Err(ReconcileError::RepositoryWrongType {
            name: name.to_string(),
            expected: data_format.to_string(),
            found: repo.data_format.clone(),
        });
    }
    Ok(repo)
}

/// The API returns most numeric fields as strings; accept both.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
    where D: Deserializer<'de>
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = String;
        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a string or an integer")
        }
        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_string())
        }
        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }
        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }
    }
    deserializer.deserialize_any(Visitor)
}

pub(crate) fn count_from_string<'de, D>(deserializer: D) -> Result<usize, D::Error>
    where D: Deserializer<'de>
{
    let s = string_or_number(deserializer)?;
    s.parse::<usize>().map_err(de::Error::custom)
}
