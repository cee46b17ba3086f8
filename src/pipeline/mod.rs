//! Pipeline orchestration
//!
//! One run executes fetch → normalize → merge → hybrid-resolve → publish,
//! then a best-effort EPG fetch. Steps run in strict sequence on a single
//! logical task; the only suspension points are the network fetches and the
//! inter-retry delay. A new `init()` supersedes any in-flight run: the old
//! run keeps executing but all of its writes are discarded by the state
//! holder.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::{ChannelGroupList, EpgList, PipelineState};
use crate::notifications::{Notifier, Severity};
use crate::services::hybrid::{resolve_hybrid_urls, HybridUrlProvider};
use crate::services::merge::merge_similar_channels;
use crate::sources::{ChannelSource, EpgSource};
use crate::utils::channel_alias::{AliasLoader, AliasTable};

pub mod retry;
pub mod state;

use retry::run_with_retry;
use state::{RunToken, StateHolder};

pub struct Pipeline {
    config: Config,
    channels: Arc<dyn ChannelSource>,
    epg: Arc<dyn EpgSource>,
    hybrid: Arc<dyn HybridUrlProvider>,
    aliases: Arc<dyn AliasLoader>,
    notifier: Arc<dyn Notifier>,
    state: StateHolder,
}

impl Pipeline {
    pub fn new(
        config: Config,
        channels: Arc<dyn ChannelSource>,
        epg: Arc<dyn EpgSource>,
        hybrid: Arc<dyn HybridUrlProvider>,
        aliases: Arc<dyn AliasLoader>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            channels,
            epg,
            hybrid,
            aliases,
            notifier,
            state: StateHolder::new(),
        }
    }

    /// Watch the pipeline state. Receivers always see the current value
    /// plus every subsequent transition.
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> PipelineState {
        self.state.current()
    }

    /// Spawn a run in the background. Equivalent to calling `init` from a
    /// separate task; useful for fire-and-forget refresh triggers.
    pub fn trigger(self: &Arc<Self>) {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.init().await });
    }

    /// Execute one full pipeline run. Always starts from `Loading` and
    /// supersedes any run still in flight.
    pub async fn init(&self) {
        let run = self.state.begin_run();
        self.state
            .publish(run, PipelineState::Loading { message: None });

        if let Err(e) = self.config.validate() {
            warn!("configuration rejected: {}", e);
            self.state.publish(run, PipelineState::error(e.to_string()));
            return;
        }

        let aliases = self.load_aliases();

        let Some(groups) = self.refresh_channels(run).await else {
            return;
        };

        let merged = merge_similar_channels(groups, self.config.merge.enabled, &aliases);
        let resolved = resolve_hybrid_urls(merged, self.config.hybrid.mode, self.hybrid.as_ref());

        info!(
            "channel list ready: {} groups, {} channels",
            resolved.groups().len(),
            resolved.channel_count()
        );
        let published = self.state.publish(
            run,
            PipelineState::Ready {
                channel_groups: resolved.clone(),
                epg: EpgList::default(),
            },
        );
        if !published {
            debug!("run superseded before publish, dropping result");
            return;
        }

        if self.config.epg.enabled {
            self.refresh_epg(run, &resolved).await;
        }
    }

    /// Refresh the alias snapshot for this run. A missing table only costs
    /// merge quality, so failures degrade to an empty table.
    fn load_aliases(&self) -> AliasTable {
        match self.aliases.load() {
            Ok(table) => {
                debug!("alias table loaded ({} entries)", table.len());
                table
            }
            Err(e) => {
                warn!("failed to load alias table: {}", e);
                AliasTable::empty()
            }
        }
    }

    /// Fetch the channel listing with retry. Returns `None` after
    /// publishing `Error`; exhaustion here is fatal to the run.
    async fn refresh_channels(&self, run: RunToken) -> Option<ChannelGroupList> {
        let policy = self.config.retry_policy();
        let cache_ttl = self.config.cache_ttl();
        let max = policy.max_attempts;

        let result = run_with_retry(
            {
                let source = Arc::clone(&self.channels);
                move || {
                    let source = Arc::clone(&source);
                    async move { source.fetch_channels(cache_ttl).await }
                }
            },
            policy,
            |attempt| {
                self.state.publish(
                    run,
                    PipelineState::loading(format!("fetching channel source ({attempt}/{max})")),
                );
            },
        )
        .await;

        match result {
            Ok(groups) => Some(groups),
            Err(err) => {
                warn!("channel fetch failed: {}", err);
                self.state
                    .publish(run, PipelineState::error(err.to_string()));
                None
            }
        }
    }

    /// Fetch guide data for the published channel set. Exhaustion is
    /// non-fatal: the run stays `Ready` with an empty guide and the failure
    /// surfaces as a warning notification instead.
    async fn refresh_epg(&self, run: RunToken, groups: &ChannelGroupList) {
        let policy = self.config.retry_policy();
        let stale_threshold = self.config.epg_stale_threshold();
        let max = policy.max_attempts;
        let filter_names = groups.epg_names();

        let result = run_with_retry(
            {
                let source = Arc::clone(&self.epg);
                let filter_names = filter_names.clone();
                move || {
                    let source = Arc::clone(&source);
                    let filter_names = filter_names.clone();
                    async move { source.fetch_epg(&filter_names, stale_threshold).await }
                }
            },
            policy,
            |attempt| debug!("retrying guide fetch ({attempt}/{max})"),
        )
        .await;

        match result {
            Ok(epg) => {
                if self.state.update_epg(run, epg) {
                    info!("program guide attached");
                }
            }
            Err(err) => {
                warn!("guide fetch failed: {}", err);
                if self.state.update_epg(run, EpgList::default()) {
                    self.notifier.notify(
                        "failed to fetch the program guide, check your network connection",
                        Severity::Warning,
                    );
                }
            }
        }
    }
}
