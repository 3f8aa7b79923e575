//! Hosted feature services and their layers.

use eyre::{Result, WrapErr};
use log::{debug, warn};
use serde_json::Value as JsonValue;

use crate::{Error, Item, Portal, Session};

const SERVICES_SEGMENT: &str = "/rest/services/";
const ADMIN_SERVICES_SEGMENT: &str = "/rest/admin/services/";
const FEATURE_SERVER_SEGMENT: &str = "/FeatureServer";

/// Whether a definition entry lives under `layers` or `tables`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Layer,
    Table,
}

impl LayerKind {
    /// Inspects a layer definition's `type` property.
    pub fn of(definition: &JsonValue) -> Self {
        match definition.get("type").and_then(|t| t.as_str()) {
            Some("Table") => Self::Table,
            _ => Self::Layer,
        }
    }

    /// The key under which entries of this kind appear in service definition
    /// edits.
    pub fn definition_key(&self) -> &'static str {
        match self {
            Self::Layer => "layers",
            Self::Table => "tables",
        }
    }
}

/// A hosted feature service, backed by a portal item.
#[derive(Debug, Clone)]
pub struct FeatureService {
    item: Item,
    url: String,
}

impl FeatureService {
    pub fn from_item(item: Item) -> Result<Self> {
        let url = item
            .url()
            .ok_or_else(|| Error::ItemHasNoUrl(item.id().to_string()))?
            .trim_end_matches('/')
            .to_string();
        Ok(Self { item, url })
    }

    /// Fetch the item with the given ID and wrap it as a feature service.
    pub fn fetch(portal: &dyn Portal, session: &Session, item_id: &str) -> Result<Self> {
        Self::from_item(Item::fetch(portal, session, item_id)?)
    }

    pub fn item(&self) -> &Item {
        &self.item
    }

    pub fn item_id(&self) -> &str {
        self.item.id()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The hosting server's admin endpoint for this service.
    pub fn admin_url(&self) -> Result<String> {
        if !self.url.contains(SERVICES_SEGMENT) {
            return Err(Error::NotAHostedService(self.url.clone()).into());
        }
        Ok(self.url.replacen(SERVICES_SEGMENT, ADMIN_SERVICES_SEGMENT, 1))
    }

    /// The service's name, as referenced by `sourceServiceName` in view
    /// definitions.
    pub fn service_name(&self) -> Result<String> {
        let start = self
            .url
            .find(SERVICES_SEGMENT)
            .map(|i| i + SERVICES_SEGMENT.len())
            .ok_or_else(|| Error::NotAHostedService(self.url.clone()))?;
        let rest = &self.url[start..];
        let end = rest
            .find(FEATURE_SERVER_SEGMENT)
            .ok_or_else(|| Error::NotAHostedService(self.url.clone()))?;
        let name = &rest[..end];
        if name.is_empty() {
            return Err(Error::NotAHostedService(self.url.clone()).into());
        }
        Ok(name.to_string())
    }

    /// Public definition of the layer (or table) at the given index.
    pub fn layer_definition(&self, portal: &dyn Portal, index: u32) -> Result<JsonValue> {
        let url = format!("{}/{}", self.url, index);
        debug!("Reading layer definition {}", url);
        portal
            .get(&url, &[])
            .wrap_err_with(|| format!("failed to read layer definition {}", url))
    }

    /// Admin-level definition of the layer (or table) at the given index,
    /// which includes `adminLayerInfo`.
    pub fn admin_layer_definition(&self, portal: &dyn Portal, index: u32) -> Result<JsonValue> {
        let url = format!("{}/{}", self.admin_url()?, index);
        debug!("Reading admin layer definition {}", url);
        portal
            .get(&url, &[])
            .wrap_err_with(|| format!("failed to read admin layer definition {}", url))
    }

    /// Item IDs of the services this (view) service draws its data from.
    pub fn source_item_ids(&self, portal: &dyn Portal) -> Result<Vec<String>> {
        let url = format!("{}/sources", self.url);
        let response = portal
            .get(&url, &[])
            .wrap_err_with(|| format!("failed to read sources of {}", self.url))?;
        let services = match response.get("services").and_then(|s| s.as_array()) {
            Some(services) => services,
            None => {
                warn!("{} reported no source services", self.url);
                return Ok(Vec::new());
            }
        };
        let ids = services
            .iter()
            .filter_map(|s| s.get("serviceItemId").and_then(|id| id.as_str()))
            .map(ToString::to_string)
            .collect::<Vec<String>>();
        debug!("{} is sourced from {:?}", self.url, ids);
        Ok(ids)
    }
}
