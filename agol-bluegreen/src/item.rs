//! Portal content items.

use eyre::{Result, WrapErr};
use log::debug;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::{Error, Portal, Session};

/// Type keyword the platform attaches to hosted feature layer views.
const VIEW_SERVICE_KEYWORD: &str = "View Service";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemSummary {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(rename = "type", default)]
    item_type: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    owner: String,
    #[serde(default)]
    type_keywords: Vec<String>,
}

/// A content item, as described by the portal's sharing API.
#[derive(Debug, Clone)]
pub struct Item {
    summary: ItemSummary,
    raw: JsonValue,
}

impl Item {
    /// Look up the item with the given ID.
    pub fn fetch(portal: &dyn Portal, session: &Session, id: &str) -> Result<Self> {
        let url = format!("{}/content/items/{}", session.sharing_url(), id);
        debug!("Fetching item {}", id);
        let raw = portal
            .get(&url, &[])
            .wrap_err_with(|| format!("failed to fetch item {}", id))?;
        Self::from_json(raw)
    }

    pub fn from_json(raw: JsonValue) -> Result<Self> {
        let summary = serde_json::from_value::<ItemSummary>(raw.clone()).map_err(Error::from)?;
        Ok(Self { summary, raw })
    }

    pub fn id(&self) -> &str {
        &self.summary.id
    }

    pub fn title(&self) -> &str {
        &self.summary.title
    }

    pub fn item_type(&self) -> &str {
        &self.summary.item_type
    }

    pub fn url(&self) -> Option<&str> {
        self.summary.url.as_deref()
    }

    pub fn owner(&self) -> &str {
        &self.summary.owner
    }

    pub fn type_keywords(&self) -> &[String] {
        &self.summary.type_keywords
    }

    /// Get a reference to any property the portal returned for this item.
    pub fn property<K: AsRef<str>>(&self, name: K) -> Option<&JsonValue> {
        self.raw.get(name.as_ref())
    }

    pub fn is_view(&self) -> bool {
        self.summary
            .type_keywords
            .iter()
            .any(|k| k == VIEW_SERVICE_KEYWORD)
    }
}
