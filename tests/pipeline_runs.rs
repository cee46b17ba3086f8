//! End-to-end pipeline runs against scripted fetch collaborators.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use iptv_aggregator::config::Config;
use iptv_aggregator::errors::SourceError;
use iptv_aggregator::models::{
    Channel, ChannelGroup, ChannelGroupList, Epg, EpgList, HybridMode, PipelineState,
};
use iptv_aggregator::notifications::BroadcastNotifier;
use iptv_aggregator::pipeline::Pipeline;
use iptv_aggregator::services::hybrid::HybridUrlTable;
use iptv_aggregator::sources::{ChannelSource, EpgSource};
use iptv_aggregator::utils::channel_alias::{AliasLoader, AliasTable};

fn transient() -> SourceError {
    SourceError::network("connection reset")
}

fn groups(label: &str) -> ChannelGroupList {
    ChannelGroupList::new(vec![ChannelGroup {
        name: "News".to_string(),
        channels: vec![Channel {
            name: label.to_string(),
            epg_name: label.to_string(),
            url_list: vec![format!("http://example.com/{label}")],
            logo: None,
        }],
    }])
}

fn guide_for(label: &str) -> EpgList {
    EpgList::new(vec![Epg {
        channel_name: label.to_string(),
        programmes: vec![],
    }])
}

enum ChannelStep {
    Respond(Result<ChannelGroupList, SourceError>),
    /// Block until notified, then respond. Used to hold a run in flight.
    Gated(Arc<Notify>, ChannelGroupList),
}

struct ScriptedChannelSource {
    steps: Mutex<VecDeque<ChannelStep>>,
    calls: AtomicU32,
}

impl ScriptedChannelSource {
    fn new(steps: Vec<ChannelStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelSource for ScriptedChannelSource {
    async fn fetch_channels(&self, _cache_ttl: Duration) -> Result<ChannelGroupList, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(ChannelStep::Respond(result)) => result,
            Some(ChannelStep::Gated(gate, groups)) => {
                gate.notified().await;
                Ok(groups)
            }
            None => Err(transient()),
        }
    }
}

struct ScriptedEpgSource {
    results: Mutex<VecDeque<Result<EpgList, SourceError>>>,
    calls: AtomicU32,
    seen_filters: Mutex<Vec<Vec<String>>>,
}

impl ScriptedEpgSource {
    fn new(results: Vec<Result<EpgList, SourceError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            calls: AtomicU32::new(0),
            seen_filters: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn first_filter(&self) -> Vec<String> {
        self.seen_filters
            .lock()
            .unwrap()
            .first()
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl EpgSource for ScriptedEpgSource {
    async fn fetch_epg(
        &self,
        filter_names: &[String],
        _stale_threshold: Duration,
    ) -> Result<EpgList, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_filters
            .lock()
            .unwrap()
            .push(filter_names.to_vec());
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(transient()))
    }
}

struct StaticAliases(HashMap<String, Vec<String>>);

impl AliasLoader for StaticAliases {
    fn load(&self) -> Result<AliasTable, SourceError> {
        Ok(AliasTable::from_entries(self.0.clone()))
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.retry.max_attempts = 3;
    config.retry.interval_secs = 0;
    config.merge.enabled = true;
    config.epg.enabled = true;
    config.epg.url = "http://example.com/guide.xml".to_string();
    config
}

struct Harness {
    pipeline: Arc<Pipeline>,
    channels: Arc<ScriptedChannelSource>,
    epg: Arc<ScriptedEpgSource>,
    notifier: Arc<BroadcastNotifier>,
}

fn harness(
    config: Config,
    channel_steps: Vec<ChannelStep>,
    epg_results: Vec<Result<EpgList, SourceError>>,
) -> Harness {
    harness_with_hybrid(config, channel_steps, epg_results, HybridUrlTable::empty())
}

fn harness_with_hybrid(
    config: Config,
    channel_steps: Vec<ChannelStep>,
    epg_results: Vec<Result<EpgList, SourceError>>,
    hybrid: HybridUrlTable,
) -> Harness {
    let channels = Arc::new(ScriptedChannelSource::new(channel_steps));
    let epg = Arc::new(ScriptedEpgSource::new(epg_results));
    let notifier = Arc::new(BroadcastNotifier::new());
    let pipeline = Arc::new(Pipeline::new(
        config,
        channels.clone(),
        epg.clone(),
        Arc::new(hybrid),
        Arc::new(StaticAliases(HashMap::new())),
        notifier.clone(),
    ));

    Harness {
        pipeline,
        channels,
        epg,
        notifier,
    }
}

fn expect_ready(state: PipelineState) -> (ChannelGroupList, EpgList) {
    match state {
        PipelineState::Ready {
            channel_groups,
            epg,
        } => (channel_groups, epg),
        other => panic!("expected Ready, got {other:?}"),
    }
}

#[tokio::test]
async fn successful_run_publishes_channels_then_guide() {
    let h = harness(
        test_config(),
        vec![ChannelStep::Respond(Ok(groups("CCTV-1")))],
        vec![Ok(guide_for("CCTV-1"))],
    );

    h.pipeline.init().await;

    let (channel_groups, epg) = expect_ready(h.pipeline.current_state());
    assert_eq!(channel_groups.channel_count(), 1);
    assert_eq!(epg.channel_count(), 1);
    assert_eq!(h.channels.calls(), 1);
    assert_eq!(h.epg.calls(), 1);
}

#[tokio::test]
async fn epg_request_is_filtered_to_published_channel_names() {
    let h = harness(
        test_config(),
        vec![ChannelStep::Respond(Ok(groups("CCTV-1")))],
        vec![Ok(guide_for("CCTV-1"))],
    );

    h.pipeline.init().await;

    assert_eq!(h.epg.first_filter(), vec!["CCTV-1".to_string()]);
}

#[tokio::test]
async fn channel_fetch_exhaustion_is_terminal() {
    let h = harness(
        test_config(),
        vec![
            ChannelStep::Respond(Err(transient())),
            ChannelStep::Respond(Err(transient())),
            ChannelStep::Respond(Err(transient())),
        ],
        vec![],
    );

    h.pipeline.init().await;

    match h.pipeline.current_state() {
        PipelineState::Error { message } => {
            assert!(message.unwrap().contains("connection reset"));
        }
        other => panic!("expected Error, got {other:?}"),
    }
    assert_eq!(h.channels.calls(), 3);
    // The run never reached Ready, so the EPG step never started.
    assert_eq!(h.epg.calls(), 0);
}

#[tokio::test]
async fn channel_fetch_recovers_within_attempt_budget() {
    let h = harness(
        test_config(),
        vec![
            ChannelStep::Respond(Err(transient())),
            ChannelStep::Respond(Err(transient())),
            ChannelStep::Respond(Ok(groups("CCTV-1"))),
        ],
        vec![Ok(guide_for("CCTV-1"))],
    );

    h.pipeline.init().await;

    assert!(h.pipeline.current_state().is_ready());
    assert_eq!(h.channels.calls(), 3);
}

#[tokio::test]
async fn parse_errors_are_not_retried() {
    let h = harness(
        test_config(),
        vec![ChannelStep::Respond(Err(SourceError::parse(
            "m3u",
            "no channels found in playlist",
        )))],
        vec![],
    );

    h.pipeline.init().await;

    assert!(matches!(
        h.pipeline.current_state(),
        PipelineState::Error { .. }
    ));
    assert_eq!(h.channels.calls(), 1);
}

#[tokio::test]
async fn invalid_configuration_fails_before_any_fetch() {
    let mut config = test_config();
    config.source.url = "not a url".to_string();

    let h = harness(config, vec![], vec![]);
    h.pipeline.init().await;

    match h.pipeline.current_state() {
        PipelineState::Error { message } => {
            assert!(message.unwrap().contains("source.url"));
        }
        other => panic!("expected Error, got {other:?}"),
    }
    assert_eq!(h.channels.calls(), 0);
}

#[tokio::test]
async fn epg_exhaustion_falls_back_to_empty_guide_with_one_warning() {
    let h = harness(
        test_config(),
        vec![ChannelStep::Respond(Ok(groups("CCTV-1")))],
        vec![Err(transient()), Err(transient()), Err(transient())],
    );
    let mut warnings = h.notifier.subscribe();

    h.pipeline.init().await;

    let (channel_groups, epg) = expect_ready(h.pipeline.current_state());
    assert_eq!(channel_groups.channel_count(), 1);
    assert!(epg.is_empty());
    assert_eq!(h.epg.calls(), 3);

    // Exactly one user-visible warning.
    assert!(warnings.try_recv().is_ok());
    assert!(warnings.try_recv().is_err());
}

#[tokio::test]
async fn disabled_epg_leaves_guide_empty_without_fetching() {
    let mut config = test_config();
    config.epg.enabled = false;

    let h = harness(
        config,
        vec![ChannelStep::Respond(Ok(groups("CCTV-1")))],
        vec![Ok(guide_for("CCTV-1"))],
    );

    h.pipeline.init().await;

    let (_, epg) = expect_ready(h.pipeline.current_state());
    assert!(epg.is_empty());
    assert_eq!(h.epg.calls(), 0);
}

#[tokio::test]
async fn newer_init_supersedes_in_flight_run() {
    let gate = Arc::new(Notify::new());
    let h = harness(
        test_config(),
        vec![
            ChannelStep::Gated(gate.clone(), groups("stale")),
            ChannelStep::Respond(Ok(groups("fresh"))),
        ],
        vec![Ok(guide_for("fresh")), Ok(guide_for("stale"))],
    );

    let first = {
        let pipeline = h.pipeline.clone();
        tokio::spawn(async move { pipeline.init().await })
    };
    // Let the first run reach its gated fetch.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.channels.calls(), 1);

    h.pipeline.init().await;
    let (channel_groups, _) = expect_ready(h.pipeline.current_state());
    assert_eq!(channel_groups.groups()[0].channels[0].name, "fresh");

    // Release the first run; its late result must be discarded.
    gate.notify_one();
    first.await.unwrap();

    let (channel_groups, epg) = expect_ready(h.pipeline.current_state());
    assert_eq!(channel_groups.groups()[0].channels[0].name, "fresh");
    assert!(epg.find("fresh").is_some());
    assert!(epg.find("stale").is_none());
}

#[tokio::test]
async fn merge_and_hybrid_run_between_fetch_and_publish() {
    let playlist = ChannelGroupList::new(vec![ChannelGroup {
        name: "News".to_string(),
        channels: vec![
            Channel {
                name: "CCTV-1".to_string(),
                epg_name: "CCTV1".to_string(),
                url_list: vec!["http://example.com/a".to_string()],
                logo: None,
            },
            Channel {
                name: "cctv1".to_string(),
                epg_name: "CCTV1".to_string(),
                url_list: vec!["http://example.com/b".to_string()],
                logo: None,
            },
        ],
    }]);

    let mut config = test_config();
    config.epg.enabled = false;
    config.hybrid.mode = HybridMode::IptvFirst;

    let mut hybrid_entries = HashMap::new();
    hybrid_entries.insert(
        "CCTV-1".to_string(),
        vec!["https://tv.example.com/cctv1".to_string()],
    );

    let channels = Arc::new(ScriptedChannelSource::new(vec![ChannelStep::Respond(Ok(
        playlist,
    ))]));
    let epg = Arc::new(ScriptedEpgSource::new(vec![]));
    let notifier = Arc::new(BroadcastNotifier::new());
    let mut aliases = HashMap::new();
    aliases.insert("CCTV-1".to_string(), vec!["cctv1".to_string()]);

    let pipeline = Pipeline::new(
        config,
        channels,
        epg,
        Arc::new(HybridUrlTable::from_entries(hybrid_entries)),
        Arc::new(StaticAliases(aliases)),
        notifier,
    );

    pipeline.init().await;

    let (channel_groups, _) = expect_ready(pipeline.current_state());
    let channel = &channel_groups.groups()[0].channels[0];
    assert_eq!(channel_groups.channel_count(), 1);
    assert_eq!(channel.name, "CCTV-1");
    assert_eq!(
        channel.url_list,
        vec![
            "http://example.com/a",
            "http://example.com/b",
            "https://tv.example.com/cctv1",
        ]
    );
}

#[tokio::test]
async fn trigger_runs_in_the_background() {
    let h = harness(
        test_config(),
        vec![ChannelStep::Respond(Ok(groups("CCTV-1")))],
        vec![Ok(guide_for("CCTV-1"))],
    );
    let mut states = h.pipeline.subscribe();

    h.pipeline.trigger();

    loop {
        states.changed().await.unwrap();
        if states.borrow_and_update().is_ready() {
            break;
        }
    }
    assert_eq!(h.channels.calls(), 1);
}

#[tokio::test]
async fn repeated_runs_rebuild_from_loading() {
    let h = harness(
        test_config(),
        vec![
            ChannelStep::Respond(Ok(groups("first"))),
            ChannelStep::Respond(Ok(groups("second"))),
        ],
        vec![Ok(guide_for("first")), Ok(guide_for("second"))],
    );

    h.pipeline.init().await;
    let (channel_groups, _) = expect_ready(h.pipeline.current_state());
    assert_eq!(channel_groups.groups()[0].channels[0].name, "first");

    h.pipeline.init().await;
    let (channel_groups, epg) = expect_ready(h.pipeline.current_state());
    assert_eq!(channel_groups.groups()[0].channels[0].name, "second");
    assert!(epg.find("second").is_some());
}
