//! Heatmap fetching with stale-data retention.
//!
//! A failed fetch keeps the last good heatmap and raises an error flag; the
//! data is only replaced by a newer successful fetch or a pushed update.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Offset, Timelike};
use domain::models::heatmap::{Heatmap, HeatmapResponse};
use domain::models::realtime::HeatmapUpdate;
use reqwest::Client;
use tokio::sync::{mpsc, watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::PlannerSettings;
use crate::debounce::{Debouncer, DebouncerStopped};
use crate::error::FetchError;
use crate::planner::{QueryRegion, Viewport, ViewportPlanner};

/// Local time context sent with every heatmap request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTime {
    pub hour: u32,
    pub timezone_offset_minutes: i32,
}

impl LocalTime {
    pub fn now() -> Self {
        let now = Local::now();
        Self {
            hour: now.hour(),
            timezone_offset_minutes: now.offset().fix().local_minus_utc() / 60,
        }
    }
}

/// Source of heatmaps for a planned region.
#[async_trait::async_trait]
pub trait HeatmapSource: Send + Sync {
    async fn fetch(&self, region: &QueryRegion, time: LocalTime) -> Result<Heatmap, FetchError>;
}

/// Fetches heatmaps from the API's `/api/location/heatmap` endpoint.
pub struct HttpHeatmapSource {
    client: Client,
    base_url: String,
}

impl HttpHeatmapSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/api/location/heatmap",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait::async_trait]
impl HeatmapSource for HttpHeatmapSource {
    async fn fetch(&self, region: &QueryRegion, time: LocalTime) -> Result<Heatmap, FetchError> {
        let response = self
            .client
            .get(self.url())
            .query(&[
                ("lat", region.lat.to_string()),
                ("lng", region.lng.to_string()),
                ("radius", region.radius_meters.to_string()),
                ("grid_size", region.grid_size_meters.to_string()),
                ("local_hour", time.hour.to_string()),
                (
                    "timezone_offset_minutes",
                    time.timezone_offset_minutes.to_string(),
                ),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: HeatmapResponse = response.json().await?;
        if !body.success {
            return Err(FetchError::Rejected(
                body.error.unwrap_or_else(|| "heatmap request failed".to_string()),
            ));
        }
        if let Some(warning) = &body.warning {
            debug!(warning = %warning, "Heatmap served in degraded mode");
        }
        Ok(body.heatmap)
    }
}

/// What happened on a viewport change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The region did not change; nothing was fetched.
    Unchanged,
    Updated,
    /// The fetch failed; previous data was kept.
    Failed,
}

/// Drives heatmap fetches from settled viewports.
pub struct HeatmapController<S> {
    planner: ViewportPlanner,
    source: S,
    /// Region of the most recent fetch, successful or not.
    requested: Option<QueryRegion>,
    /// Region the held heatmap describes.
    rendered: Option<QueryRegion>,
    heatmap: Option<Heatmap>,
    error: bool,
}

impl<S: HeatmapSource> HeatmapController<S> {
    pub fn new(planner: ViewportPlanner, source: S) -> Self {
        Self {
            planner,
            source,
            requested: None,
            rendered: None,
            heatmap: None,
            error: false,
        }
    }

    /// Last successfully fetched heatmap, possibly stale.
    pub fn heatmap(&self) -> Option<&Heatmap> {
        self.heatmap.as_ref()
    }

    /// Area covered by [`heatmap`](Self::heatmap). Lags behind
    /// [`requested_region`](Self::requested_region) after a failed fetch.
    pub fn region(&self) -> Option<&QueryRegion> {
        self.rendered.as_ref()
    }

    pub fn requested_region(&self) -> Option<&QueryRegion> {
        self.requested.as_ref()
    }

    /// Whether the most recent fetch failed.
    pub fn has_error(&self) -> bool {
        self.error
    }

    /// Plans and fetches for a settled viewport.
    pub async fn on_viewport_settled(&mut self, viewport: &Viewport) -> RefreshOutcome {
        let Some(region) = self.planner.plan(viewport) else {
            return RefreshOutcome::Unchanged;
        };
        self.fetch(region).await
    }

    /// Re-fetches the last requested region regardless of the planner's memory.
    pub async fn refresh(&mut self) -> RefreshOutcome {
        let Some(region) = self.requested else {
            return RefreshOutcome::Unchanged;
        };
        self.fetch(region).await
    }

    /// Accepts a heatmap pushed over the realtime connection.
    pub fn apply_update(&mut self, update: HeatmapUpdate) {
        self.rendered = Some(QueryRegion {
            lat: update.lat,
            lng: update.lng,
            radius_meters: update.radius,
            grid_size_meters: update.heatmap.grid_size.round() as u32,
        });
        self.heatmap = Some(update.heatmap);
        self.error = false;
    }

    async fn fetch(&mut self, region: QueryRegion) -> RefreshOutcome {
        self.requested = Some(region);
        match self.source.fetch(&region, LocalTime::now()).await {
            Ok(heatmap) => {
                debug!(
                    radius = region.radius_meters,
                    grid_size = region.grid_size_meters,
                    cells = heatmap.cells.len(),
                    "Heatmap updated"
                );
                self.heatmap = Some(heatmap);
                self.rendered = Some(region);
                self.error = false;
                RefreshOutcome::Updated
            }
            Err(e) => {
                warn!(error = %e, "Heatmap update failed; showing last known state");
                self.planner.invalidate();
                self.error = true;
                RefreshOutcome::Failed
            }
        }
    }
}

/// Debounced viewport input in front of a [`HeatmapController`].
///
/// Viewport changes collapse until the map has been still for the planner's
/// debounce window; only the settled viewport is planned and fetched. Jumps
/// (search results, "locate me") bypass the wait. Dropping the feed stops
/// both background tasks.
pub struct HeatmapFeed<S> {
    debouncer: Debouncer<Viewport>,
    controller: Arc<Mutex<HeatmapController<S>>>,
    outcomes: watch::Receiver<Option<RefreshOutcome>>,
    worker: JoinHandle<()>,
}

impl<S: HeatmapSource + 'static> HeatmapFeed<S> {
    pub fn spawn(source: S, settings: &PlannerSettings) -> Self {
        let controller = Arc::new(Mutex::new(HeatmapController::new(
            ViewportPlanner::new(settings),
            source,
        )));
        let (settled_tx, mut settled_rx) = mpsc::unbounded_channel::<Viewport>();
        let (outcome_tx, outcomes) = watch::channel(None);

        let worker = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move {
                while let Some(viewport) = settled_rx.recv().await {
                    let outcome = controller.lock().await.on_viewport_settled(&viewport).await;
                    outcome_tx.send_replace(Some(outcome));
                }
            }
        });

        let debouncer = Debouncer::spawn(settings.debounce(), move |viewport: Viewport| {
            // Worker gone means the feed is being dropped.
            let _ = settled_tx.send(viewport);
        });

        Self {
            debouncer,
            controller,
            outcomes,
            worker,
        }
    }

    /// Feeds a viewport from pan/zoom; fetched once the map settles.
    pub fn viewport_changed(&self, viewport: Viewport) -> Result<(), DebouncerStopped> {
        self.debouncer.push(viewport)
    }

    /// Feeds a programmatic jump; fetched without waiting.
    pub fn jump_to(&self, viewport: Viewport) -> Result<(), DebouncerStopped> {
        self.debouncer.push_immediate(viewport)
    }

    /// Outcome of the most recent settled viewport.
    pub fn outcomes(&self) -> watch::Receiver<Option<RefreshOutcome>> {
        self.outcomes.clone()
    }

    pub async fn controller(&self) -> MutexGuard<'_, HeatmapController<S>> {
        self.controller.lock().await
    }
}

impl<S> Drop for HeatmapFeed<S> {
    fn drop(&mut self) {
        self.worker.abort();
    }
}
