//! Blue/green bookkeeping: which backing service the view currently reads
//! from, and moving it over to the other one.

use std::path::Path;

use eyre::{Result, WrapErr};
use log::{debug, info, warn};

use crate::pending::accepted_or_pending;
use crate::{
    swap_view_source, Config, Error, FeatureService, PendingOperation, Portal, Session,
    SwapOptions, SwapOutcome,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Blue,
    Green,
}

impl Color {
    pub fn other(self) -> Self {
        match self {
            Self::Blue => Self::Green,
            Self::Green => Self::Blue,
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Blue => "blue",
                Self::Green => "green",
            }
        )
    }
}

/// Which of the two backing services is currently live. The other one is
/// staging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
    pub live: Color,
}

impl Split {
    pub fn staging(&self) -> Color {
        self.live.other()
    }
}

/// The view that end users consume.
#[derive(Debug, Clone)]
pub struct UserFacingService {
    service: FeatureService,
    layer: u32,
}

impl UserFacingService {
    pub fn new(service: FeatureService, layer: u32) -> Self {
        Self { service, layer }
    }

    pub fn service(&self) -> &FeatureService {
        &self.service
    }

    pub fn layer(&self) -> u32 {
        self.layer
    }

    /// Item IDs of the services the view currently reads from.
    pub fn source_item_ids(&self, portal: &dyn Portal) -> Result<Vec<String>> {
        self.service.source_item_ids(portal)
    }
}

/// One of the two interchangeable services a view can be pointed at.
#[derive(Debug, Clone)]
pub struct BackingService {
    color: Color,
    service: FeatureService,
    layer: u32,
}

impl BackingService {
    pub fn new(color: Color, service: FeatureService, layer: u32) -> Self {
        Self {
            color,
            service,
            layer,
        }
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn service(&self) -> &FeatureService {
        &self.service
    }

    pub fn item_id(&self) -> &str {
        self.service.item_id()
    }

    pub fn layer(&self) -> u32 {
        self.layer
    }

    /// Delete all rows from the layer via the hosting server's admin API.
    pub fn truncate(
        &self,
        portal: &dyn Portal,
        run_async: bool,
    ) -> Result<Option<PendingOperation>> {
        let url = format!("{}/{}/truncate", self.service.admin_url()?, self.layer);
        info!("Truncating {} service layer {}", self.color, self.layer);
        let response = portal
            .post(
                &url,
                &[
                    ("async", run_async.to_string()),
                    ("attachmentOnly", "false".to_string()),
                ],
            )
            .wrap_err_with(|| format!("failed to truncate {}", url))?;
        accepted_or_pending("truncate", &response)
    }

    /// Append the rows from an already-uploaded portal item (for example a
    /// file geodatabase or CSV) into the layer.
    pub fn append_item(
        &self,
        portal: &dyn Portal,
        item_id: &str,
        upload_format: &str,
        run_async: bool,
    ) -> Result<Option<PendingOperation>> {
        let url = format!("{}/{}/append", self.service.url(), self.layer);
        info!(
            "Appending item {} ({}) to {} service layer {}",
            item_id, upload_format, self.color, self.layer
        );
        let response = portal
            .post(
                &url,
                &[
                    ("appendItemId", item_id.to_string()),
                    ("appendUploadFormat", upload_format.to_string()),
                    ("upsert", "false".to_string()),
                    ("rollbackOnFailure", "true".to_string()),
                    ("async", run_async.to_string()),
                ],
            )
            .wrap_err_with(|| format!("failed to append to {}", url))?;
        // A synchronous append reports per-edit results rather than a bare
        // success flag, and failures already surface as platform errors.
        Ok(PendingOperation::from_response(&response))
    }

    /// Truncate the service and reload it from the dataset at the given path.
    ///
    /// This requires a geoprocessing toolset that is not available here, so it
    /// always fails. Use [`BackingService::truncate`] followed by
    /// [`BackingService::append_item`] instead.
    pub fn upsert<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        Err(Error::UpsertUnavailable(path.as_ref().to_path_buf()).into())
    }
}

/// A view plus the two backing services it alternates between.
#[derive(Debug, Clone)]
pub struct BlueGreen {
    user_facing: UserFacingService,
    blue: BackingService,
    green: BackingService,
    split: Option<Split>,
}

impl BlueGreen {
    /// Constructor. The split starts out unknown; see
    /// [`BlueGreen::determine_split`].
    pub fn new(
        user_facing: UserFacingService,
        blue: FeatureService,
        green: FeatureService,
        source_layer: u32,
    ) -> Self {
        Self {
            user_facing,
            blue: BackingService::new(Color::Blue, blue, source_layer),
            green: BackingService::new(Color::Green, green, source_layer),
            split: None,
        }
    }

    /// Look up all three services named in the configuration and work out
    /// which backing service is live.
    pub fn load(portal: &dyn Portal, session: &Session, config: &Config) -> Result<Self> {
        config.validate()?;
        let view = FeatureService::fetch(portal, session, &config.view_item_id)?;
        if !view.item().is_view() {
            warn!("Item {} is not tagged as a view service", config.view_item_id);
        }
        let blue = FeatureService::fetch(portal, session, &config.blue_item_id)?;
        let green = FeatureService::fetch(portal, session, &config.green_item_id)?;
        let mut bg = Self::new(
            UserFacingService::new(view, config.view_layer),
            blue,
            green,
            config.source_layer,
        );
        let _ = bg.determine_split(portal)?;
        Ok(bg)
    }

    pub fn user_facing(&self) -> &UserFacingService {
        &self.user_facing
    }

    pub fn blue(&self) -> &BackingService {
        &self.blue
    }

    pub fn green(&self) -> &BackingService {
        &self.green
    }

    pub fn backing(&self, color: Color) -> &BackingService {
        match color {
            Color::Blue => &self.blue,
            Color::Green => &self.green,
        }
    }

    pub fn split(&self) -> Option<Split> {
        self.split
    }

    /// Figure out which backing service the view currently reads from.
    pub fn determine_split(&mut self, portal: &dyn Portal) -> Result<Split> {
        self.split = None;
        let sources = self.user_facing.source_item_ids(portal)?;
        let is_blue = sources.iter().any(|id| id == self.blue.item_id());
        let is_green = sources.iter().any(|id| id == self.green.item_id());
        let live = match (is_blue, is_green) {
            (true, false) => Color::Blue,
            (false, true) => Color::Green,
            (false, false) => {
                return Err(
                    Error::NoLiveService(self.user_facing.service().item_id().to_string()).into(),
                )
            }
            (true, true) => {
                return Err(Error::AmbiguousLiveService(
                    self.user_facing.service().item_id().to_string(),
                )
                .into())
            }
        };
        let split = Split { live };
        info!("Live: {}, staging: {}", split.live, split.staging());
        self.split = Some(split);
        Ok(split)
    }

    /// The backing service the view currently reads from, if known.
    pub fn live(&self) -> Option<&BackingService> {
        self.split.map(|split| self.backing(split.live))
    }

    /// The backing service that is safe to refresh, if known.
    pub fn staging(&self) -> Option<&BackingService> {
        self.split.map(|split| self.backing(split.staging()))
    }

    fn require_staging(&self) -> Result<&BackingService> {
        Ok(self.staging().ok_or(Error::SplitUnknown)?)
    }

    /// Point the view at the staging service, making it live.
    ///
    /// Swapping again rolls back. If the platform finishes the swap
    /// asynchronously, the split becomes unknown until
    /// [`BlueGreen::determine_split`] is called again.
    pub fn swap(&mut self, portal: &dyn Portal, opts: &SwapOptions) -> Result<SwapOutcome> {
        let split = self.split.ok_or(Error::SplitUnknown)?;
        let staging = self.backing(split.staging());
        debug!(
            "Swapping view {} from {} to {}",
            self.user_facing.service().item_id(),
            split.live,
            split.staging()
        );
        let result = swap_view_source(
            portal,
            self.user_facing.service(),
            self.user_facing.layer(),
            staging.service(),
            staging.layer(),
            opts,
        );
        self.split = match &result {
            Ok(SwapOutcome::Completed) => Some(Split {
                live: split.staging(),
            }),
            Ok(SwapOutcome::Pending(_)) => None,
            Err(_) => {
                warn!("Swap failed, the view's source must be re-examined");
                None
            }
        };
        result
    }

    pub fn truncate_staging(
        &self,
        portal: &dyn Portal,
        run_async: bool,
    ) -> Result<Option<PendingOperation>> {
        self.require_staging()?.truncate(portal, run_async)
    }

    pub fn append_to_staging(
        &self,
        portal: &dyn Portal,
        item_id: &str,
        upload_format: &str,
        run_async: bool,
    ) -> Result<Option<PendingOperation>> {
        self.require_staging()?
            .append_item(portal, item_id, upload_format, run_async)
    }

    pub fn upsert_staging<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.require_staging()?.upsert(path)
    }
}
