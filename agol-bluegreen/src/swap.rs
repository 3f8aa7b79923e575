//! Swapping a view layer's data source.
//!
//! The hosting server has no primitive for repointing a view at a different
//! source. Instead, the view's layer is removed from the service definition
//! and then re-added with a definition describing the new source. The new
//! definition is assembled from two places:
//!
//! - The new source layer, from which a fixed allow-list of properties is
//!   copied (see [`SWAPPED_PROPERTIES`]).
//! - The view layer's own admin definition, which contributes the layer's
//!   `id` and `name` as well as `adminLayerInfo.viewLayerDefinition`. The
//!   latter is rewritten to reference the new source and any `sourceId` it
//!   carries is dropped, since that identifies the old source.

use std::time::Duration;

use eyre::{Result, WrapErr};
use log::{debug, info, trace};
use serde_json::{json, Map as JsonMap, Value as JsonValue};

use crate::config::{DEFAULT_POLL_INTERVAL_SECS, DEFAULT_POLL_TIMEOUT_SECS};
use crate::pending::accepted_or_pending;
use crate::{Error, FeatureService, LayerKind, PendingOperation, Portal};

/// Layer properties copied from the new source layer into the view layer's
/// definition.
pub const SWAPPED_PROPERTIES: &[&str] = &[
    "type",
    "displayField",
    "description",
    "copyrightText",
    "defaultVisibility",
    "geometryType",
    "minScale",
    "maxScale",
    "extent",
    "drawingInfo",
    "hasAttachments",
    "htmlPopupType",
    "hasM",
    "hasZ",
    "objectIdField",
    "globalIdField",
    "typeIdField",
    "fields",
    "types",
    "templates",
    "indexes",
    "maxRecordCount",
    "capabilities",
    "timeInfo",
];

/// Properties kept from the view layer itself.
const PRESERVED_VIEW_PROPERTIES: &[&str] = &["id", "name"];

const ADMIN_LAYER_INFO: &str = "adminLayerInfo";
const VIEW_LAYER_DEFINITION: &str = "viewLayerDefinition";
const STALE_SOURCE_ID: &str = "sourceId";

const DELETE_FROM_DEFINITION: &str = "deleteFromDefinition";
const ADD_TO_DEFINITION: &str = "addToDefinition";

#[derive(Debug, Clone)]
pub struct SwapOptions {
    /// Ask the hosting server to execute the definition edits asynchronously.
    pub run_async: bool,
    /// Polling interval used while waiting for the delete step to finish.
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

impl Default for SwapOptions {
    fn default() -> Self {
        Self {
            run_async: false,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            poll_timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
        }
    }
}

/// Result of a swap. When the final `addToDefinition` step runs
/// asynchronously, the caller gets a handle to the pending job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    Completed,
    Pending(PendingOperation),
}

/// Assemble the layer definition that repoints a view layer at a new source.
pub fn build_swapped_definition(
    view_admin_def: &JsonValue,
    source_def: &JsonValue,
    source_service_name: &str,
    source_layer: u32,
) -> Result<JsonValue> {
    let mut definition = JsonMap::new();
    for property in PRESERVED_VIEW_PROPERTIES {
        if let Some(value) = view_admin_def.get(*property) {
            definition.insert(property.to_string(), value.clone());
        }
    }
    if !definition.contains_key("id") {
        return Err(
            Error::MissingField("view layer definition".to_string(), "id".to_string()).into(),
        );
    }
    for property in SWAPPED_PROPERTIES {
        match source_def.get(*property) {
            Some(value) => {
                definition.insert(property.to_string(), value.clone());
            }
            None => trace!("Source layer has no \"{}\", skipping", property),
        }
    }

    let mut admin_layer_info = view_admin_def
        .get(ADMIN_LAYER_INFO)
        .cloned()
        .unwrap_or(JsonValue::Null);
    let view_layer_def = admin_layer_info
        .get_mut(VIEW_LAYER_DEFINITION)
        .filter(|v| v.is_object())
        .ok_or_else(|| Error::NotAViewLayer(describe_layer(view_admin_def)))?;
    strip_source_ids(view_layer_def);
    let has_table = view_layer_def
        .get("table")
        .map_or(false, JsonValue::is_object);
    let target = if has_table {
        &mut view_layer_def["table"]
    } else {
        view_layer_def
    };
    target["sourceServiceName"] = JsonValue::from(source_service_name);
    target["sourceLayerId"] = JsonValue::from(source_layer);
    definition.insert(ADMIN_LAYER_INFO.to_string(), admin_layer_info);

    Ok(JsonValue::Object(definition))
}

/// Repoint the given view layer at a layer of another hosted service.
///
/// Both definitions are read before anything is modified. If the delete step
/// runs asynchronously it is waited on, since the add depends on it.
pub fn swap_view_source(
    portal: &dyn Portal,
    view: &FeatureService,
    view_layer: u32,
    source: &FeatureService,
    source_layer: u32,
    opts: &SwapOptions,
) -> Result<SwapOutcome> {
    let admin_url = view.admin_url()?;
    let view_def = view.admin_layer_definition(portal, view_layer)?;
    let source_def = source.layer_definition(portal, source_layer)?;
    let source_service_name = source.service_name()?;
    let definition =
        build_swapped_definition(&view_def, &source_def, &source_service_name, source_layer)?;

    info!(
        "Swapping layer {} of {} to {}/{}",
        view_layer,
        view.url(),
        source_service_name,
        source_layer
    );

    let delete = definition_edit(LayerKind::of(&view_def), json!({ "id": view_layer }));
    let delete_result = post_edit(
        portal,
        &admin_url,
        DELETE_FROM_DEFINITION,
        &delete,
        opts.run_async,
    )?;
    if let Some(pending) = delete_result {
        info!("Waiting for {} to finish: {}", DELETE_FROM_DEFINITION, pending);
        pending
            .wait(portal, opts.poll_interval, opts.poll_timeout)
            .wrap_err_with(|| {
                format!("{} on {} did not complete", DELETE_FROM_DEFINITION, admin_url)
            })?;
    }

    let add = definition_edit(LayerKind::of(&definition), definition);
    match post_edit(portal, &admin_url, ADD_TO_DEFINITION, &add, opts.run_async)? {
        Some(pending) => {
            info!("{} is running asynchronously: {}", ADD_TO_DEFINITION, pending);
            Ok(SwapOutcome::Pending(pending))
        }
        None => {
            info!(
                "Layer {} of {} now reads from {}",
                view_layer,
                view.url(),
                source_service_name
            );
            Ok(SwapOutcome::Completed)
        }
    }
}

fn definition_edit(kind: LayerKind, entry: JsonValue) -> JsonValue {
    let mut edit = JsonMap::new();
    edit.insert(kind.definition_key().to_string(), JsonValue::Array(vec![entry]));
    JsonValue::Object(edit)
}

fn post_edit(
    portal: &dyn Portal,
    admin_url: &str,
    operation: &str,
    edit: &JsonValue,
    run_async: bool,
) -> Result<Option<PendingOperation>> {
    let url = format!("{}/{}", admin_url, operation);
    debug!("POST {} (async = {})", url, run_async);
    trace!("{} = {}", operation, edit);
    let response = portal
        .post(
            &url,
            &[(operation, edit.to_string()), ("async", run_async.to_string())],
        )
        .wrap_err_with(|| format!("{} failed on {}", operation, admin_url))?;
    accepted_or_pending(operation, &response)
}

fn strip_source_ids(value: &mut JsonValue) {
    match value {
        JsonValue::Object(obj) => {
            obj.remove(STALE_SOURCE_ID);
            obj.values_mut().for_each(strip_source_ids);
        }
        JsonValue::Array(arr) => arr.iter_mut().for_each(strip_source_ids),
        _ => (),
    }
}

fn describe_layer(def: &JsonValue) -> String {
    let id = def.get("id").map(ToString::to_string).unwrap_or_default();
    match def.get("name").and_then(|n| n.as_str()) {
        Some(name) => format!("{} ({})", id, name),
        None => id,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::FakePortal;
    use crate::Item;
    use serde_json::json;

    const VIEW_URL: &str =
        "https://services.arcgis.com/org/arcgis/rest/services/Parcels_View/FeatureServer";
    const VIEW_ADMIN_URL: &str =
        "https://services.arcgis.com/org/arcgis/rest/admin/services/Parcels_View/FeatureServer";
    const GREEN_URL: &str =
        "https://services.arcgis.com/org/arcgis/rest/services/Parcels_Green/FeatureServer";
    const STATUS_URL: &str =
        "https://services.arcgis.com/org/arcgis/rest/admin/services/Parcels_View/FeatureServer/status/7";

    fn view_admin_def() -> JsonValue {
        json!({
            "id": 0,
            "name": "Parcels",
            "type": "Feature Layer",
            "geometryType": "esriGeometryPolygon",
            "fields": [{"name": "OBJECTID", "type": "esriFieldTypeOID"}],
            "adminLayerInfo": {
                "geometryField": {"name": "Shape"},
                "viewLayerDefinition": {
                    "sourceId": "stale-source",
                    "table": {
                        "name": "parcels_view",
                        "sourceServiceName": "Parcels_Blue",
                        "sourceLayerId": 0,
                        "sourceId": "stale-table-source",
                        "sourceLayerFields": "*"
                    }
                }
            }
        })
    }

    fn source_def() -> JsonValue {
        json!({
            "id": 3,
            "name": "Parcels_2024",
            "type": "Feature Layer",
            "geometryType": "esriGeometryPolygon",
            "displayField": "PARCEL_ID",
            "objectIdField": "OBJECTID",
            "fields": [
                {"name": "OBJECTID", "type": "esriFieldTypeOID"},
                {"name": "PARCEL_ID", "type": "esriFieldTypeString"}
            ],
            "maxRecordCount": 2000,
            "serviceItemId": "green1",
            "editingInfo": {"lastEditDate": 1700000000000_u64}
        })
    }

    fn service(id: &str, url: &str) -> FeatureService {
        FeatureService::from_item(Item::from_json(json!({"id": id, "url": url})).unwrap()).unwrap()
    }

    #[test]
    fn definition_copies_allow_list_and_keeps_view_identity() {
        let def =
            build_swapped_definition(&view_admin_def(), &source_def(), "Parcels_Green", 3).unwrap();
        assert_eq!(def["id"], 0);
        assert_eq!(def["name"], "Parcels");
        assert_eq!(def["displayField"], "PARCEL_ID");
        assert_eq!(def["maxRecordCount"], 2000);
        assert_eq!(def["fields"].as_array().unwrap().len(), 2);
        // Not on the allow-list.
        assert!(def.get("serviceItemId").is_none());
        assert!(def.get("editingInfo").is_none());
        // Not present on the source.
        assert!(def.get("drawingInfo").is_none());
    }

    #[test]
    fn view_layer_definition_is_repointed_inside_table() {
        let def =
            build_swapped_definition(&view_admin_def(), &source_def(), "Parcels_Green", 3).unwrap();
        let vld = &def["adminLayerInfo"]["viewLayerDefinition"];
        assert!(vld.get("sourceId").is_none());
        assert!(vld["table"].get("sourceId").is_none());
        assert_eq!(vld["table"]["sourceServiceName"], "Parcels_Green");
        assert_eq!(vld["table"]["sourceLayerId"], 3);
        assert_eq!(vld["table"]["name"], "parcels_view");
        assert_eq!(vld["table"]["sourceLayerFields"], "*");
        assert_eq!(def["adminLayerInfo"]["geometryField"]["name"], "Shape");
    }

    #[test]
    fn flat_view_layer_definition_is_repointed() {
        let view = json!({
            "id": 1,
            "adminLayerInfo": {
                "viewLayerDefinition": {
                    "sourceServiceName": "Parcels_Blue",
                    "sourceLayerId": 1,
                    "sourceId": "stale"
                }
            }
        });
        let def = build_swapped_definition(&view, &json!({"type": "Table"}), "Parcels_Green", 1)
            .unwrap();
        let vld = &def["adminLayerInfo"]["viewLayerDefinition"];
        assert_eq!(
            vld,
            &json!({"sourceServiceName": "Parcels_Green", "sourceLayerId": 1})
        );
        assert_eq!(LayerKind::of(&def), LayerKind::Table);
    }

    #[test]
    fn non_view_layer_is_rejected() {
        let mut view = view_admin_def();
        view["adminLayerInfo"]
            .as_object_mut()
            .unwrap()
            .remove("viewLayerDefinition");
        let err = build_swapped_definition(&view, &source_def(), "Parcels_Green", 0).unwrap_err();
        match err.downcast_ref::<Error>() {
            Some(Error::NotAViewLayer(layer)) => assert_eq!(layer, "0 (Parcels)"),
            other => panic!("expected a not-a-view error, but got {:?}", other),
        }
    }

    #[test]
    fn view_definition_without_id_is_rejected() {
        let mut view = view_admin_def();
        view.as_object_mut().unwrap().remove("id");
        assert!(build_swapped_definition(&view, &source_def(), "Parcels_Green", 0).is_err());
    }

    fn swap_portal() -> FakePortal {
        FakePortal::default()
            .with_get(format!("{}/0", VIEW_ADMIN_URL), view_admin_def())
            .with_get(format!("{}/3", GREEN_URL), source_def())
    }

    #[test]
    fn synchronous_swap_deletes_then_adds() {
        let portal = swap_portal()
            .with_post(format!("{}/deleteFromDefinition", VIEW_ADMIN_URL), json!({"success": true}))
            .with_post(format!("{}/addToDefinition", VIEW_ADMIN_URL), json!({"success": true}));
        let outcome = swap_view_source(
            &portal,
            &service("view1", VIEW_URL),
            0,
            &service("green1", GREEN_URL),
            3,
            &SwapOptions::default(),
        )
        .unwrap();
        assert_eq!(outcome, SwapOutcome::Completed);

        let posts = portal.posts();
        assert_eq!(
            portal.post_urls(),
            vec![
                format!("{}/deleteFromDefinition", VIEW_ADMIN_URL),
                format!("{}/addToDefinition", VIEW_ADMIN_URL),
            ]
        );
        assert_eq!(
            posts[0].json_param("deleteFromDefinition"),
            json!({"layers": [{"id": 0}]})
        );
        assert_eq!(posts[0].param("async"), Some("false"));
        let added = posts[1].json_param("addToDefinition");
        let layers = added["layers"].as_array().unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(
            layers[0]["adminLayerInfo"]["viewLayerDefinition"]["table"]["sourceServiceName"],
            "Parcels_Green"
        );
    }

    #[test]
    fn asynchronous_swap_waits_for_delete_and_returns_add_handle() {
        let add_status = format!("{}/status/8", VIEW_ADMIN_URL);
        let portal = swap_portal()
            .with_post(format!("{}/deleteFromDefinition", VIEW_ADMIN_URL), json!({"statusURL": STATUS_URL}))
            .with_get(STATUS_URL, json!({"status": "InProgress"}))
            .with_get(STATUS_URL, json!({"status": "Completed"}))
            .with_post(format!("{}/addToDefinition", VIEW_ADMIN_URL), json!({"statusURL": add_status}));
        let opts = SwapOptions {
            run_async: true,
            poll_interval: Duration::ZERO,
            poll_timeout: Duration::from_secs(60),
        };
        let outcome = swap_view_source(
            &portal,
            &service("view1", VIEW_URL),
            0,
            &service("green1", GREEN_URL),
            3,
            &opts,
        )
        .unwrap();
        assert_eq!(outcome, SwapOutcome::Pending(PendingOperation::new(&add_status)));
        assert_eq!(portal.get_count(STATUS_URL), 2);
        assert!(portal.posts().iter().all(|p| p.param("async") == Some("true")));
    }

    #[test]
    fn failed_delete_stops_the_swap() {
        let portal = swap_portal().with_post(
            format!("{}/deleteFromDefinition", VIEW_ADMIN_URL),
            json!({"success": false}),
        );
        let err = swap_view_source(
            &portal,
            &service("view1", VIEW_URL),
            0,
            &service("green1", GREEN_URL),
            3,
            &SwapOptions::default(),
        )
        .unwrap_err();
        match err.downcast_ref::<Error>() {
            Some(Error::EditRejected(op, _)) => assert_eq!(op, "deleteFromDefinition"),
            other => panic!("expected a rejected edit, but got {:?}", other),
        }
        assert_eq!(portal.posts().len(), 1);
    }

    #[test]
    fn rejected_add_is_reported_after_delete() {
        let portal = swap_portal()
            .with_post(format!("{}/deleteFromDefinition", VIEW_ADMIN_URL), json!({"success": true}))
            .with_post(format!("{}/addToDefinition", VIEW_ADMIN_URL), json!({"success": false}));
        let err = swap_view_source(
            &portal,
            &service("view1", VIEW_URL),
            0,
            &service("green1", GREEN_URL),
            3,
            &SwapOptions::default(),
        )
        .unwrap_err();
        match err.downcast_ref::<Error>() {
            Some(Error::EditRejected(op, _)) => assert_eq!(op, "addToDefinition"),
            other => panic!("expected a rejected edit, but got {:?}", other),
        }
        assert_eq!(portal.posts().len(), 2);
    }

    #[test]
    fn default_options_match_config_defaults() {
        let config = crate::Config::from_yaml_str(
            "view_item_id: view1\nblue_item_id: blue1\ngreen_item_id: green1\n",
        )
        .unwrap();
        let opts = SwapOptions::default();
        assert!(!opts.run_async);
        assert_eq!(opts.poll_interval, config.poll_interval());
        assert_eq!(opts.poll_timeout, config.poll_timeout());
    }

    #[test]
    fn definitions_are_read_before_anything_is_deleted() {
        // No source layer definition registered: the swap must fail before
        // any POST is issued.
        let portal = FakePortal::default()
            .with_get(format!("{}/0", VIEW_ADMIN_URL), view_admin_def())
            .with_get(
                format!("{}/3", GREEN_URL),
                json!({"error": {"code": 400, "message": "Invalid layer"}}),
            );
        let result = swap_view_source(
            &portal,
            &service("view1", VIEW_URL),
            0,
            &service("green1", GREEN_URL),
            3,
            &SwapOptions::default(),
        );
        assert!(result.is_err());
        assert!(portal.posts().is_empty());
    }
}
