use std::path::PathBuf;

use thiserror::Error;

/// The primary error type that can be produced by agol-bluegreen.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot determine file type of configuration file: {0}")]
    CannotDetermineConfigFileType(PathBuf),
    #[error("failed to load configuration from {0}")]
    FailedToLoadConfig(PathBuf),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("portal URL cannot be sent as a Referer header: {0}")]
    InvalidPortalUrl(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request to {url} failed with HTTP status {status}: {body}")]
    HttpStatus {
        url: String,
        status: u16,
        body: String,
    },
    #[error("platform returned error {code}: {message} {details:?}")]
    Remote {
        code: i64,
        message: String,
        details: Vec<String>,
    },
    #[error("response from {0} is missing field \"{1}\"")]
    MissingField(String, String),
    #[error("item {0} has no service URL")]
    ItemHasNoUrl(String),
    #[error("not a hosted feature service URL: {0}")]
    NotAHostedService(String),
    #[error("layer {0} is not a view layer (no adminLayerInfo.viewLayerDefinition)")]
    NotAViewLayer(String),
    #[error("definition edit \"{0}\" was rejected: {1}")]
    EditRejected(String, String),
    #[error("asynchronous operation failed ({0}): {1}")]
    OperationFailed(String, String),
    #[error("timed out after {1:?} waiting for asynchronous operation: {0}")]
    OperationTimedOut(String, std::time::Duration),
    #[error("view {0} is not sourced from either the blue or the green service")]
    NoLiveService(String),
    #[error("view {0} is sourced from both the blue and the green service")]
    AmbiguousLiveService(String),
    #[error("the live/staging split is unknown, determine it before refreshing data")]
    SplitUnknown,
    #[error("upserting from {0} requires a geoprocessing toolset that is not available; empty and reload the staging service via truncate/append instead")]
    UpsertUnavailable(PathBuf),
}
