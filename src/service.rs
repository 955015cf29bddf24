//! History service
//!
//! Composes cursor pipelines from validated parameter objects. Every
//! `open_*` method returns a `Box<dyn EventCursor>`, so callers read the
//! result the same way regardless of which stages were chained.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use pvhist::event::{Event, ValueKind};
//! use pvhist::params::IntervalQuery;
//! use pvhist::service::HistoryService;
//! use pvhist::source::MemoryArchive;
//! use pvhist::types::Timestamp;
//!
//! let archive = Arc::new(MemoryArchive::new());
//! let channel = archive.add_channel("IOC:TEMP", ValueKind::Float);
//! archive
//!     .append(&channel, (0..100).map(|i| Event::float(Timestamp::from_secs(i), i as f32)))
//!     .unwrap();
//!
//! let service = HistoryService::new(Arc::clone(&archive));
//! let query = IntervalQuery::new(
//!     channel,
//!     Timestamp::from_secs(0),
//!     Timestamp::from_secs(100),
//!     false,
//! )
//! .unwrap();
//!
//! let stats = service.analyze(&query).unwrap();
//! assert_eq!(stats.duration, Some(100.0));
//! ```

use crate::config::{EngineConfig, SamplingConfig};
use crate::error::Result;
use crate::event::Event;
use crate::params::{
    BinSamplerParams, ChannelInfo, Direction, GraphicalSamplerParams, IntervalQuery,
    IntervalSamplerParams, PointQuery, SamplingStrategy,
};
use crate::source::{ArchiveConnector, MetadataLookup};
use crate::stats::{RunningStatistics, Statistics};
use crate::stream::interval::PointSource;
use crate::stream::{
    BinSampleCursor, BoundaryAwareCursor, EventCursor, IntegrationCursor, IntervalSampleCursor,
    LabelJoinCursor, LttbCursor,
};
use crate::types::Timestamp;
use std::sync::Arc;

/// Pipeline factory over an archive connector
pub struct HistoryService<C: ArchiveConnector> {
    connector: Arc<C>,
    config: SamplingConfig,
}

impl<C: ArchiveConnector + 'static> HistoryService<C> {
    /// Create a service with default sampling configuration
    pub fn new(connector: Arc<C>) -> Self {
        Self::with_config(connector, &EngineConfig::default())
    }

    /// Create a service using the sampling section of `config`
    pub fn with_config(connector: Arc<C>, config: &EngineConfig) -> Self {
        Self {
            connector,
            config: config.sampling.clone(),
        }
    }

    /// The underlying connector
    pub fn connector(&self) -> &Arc<C> {
        &self.connector
    }

    /// Raw events in `[begin, end)`
    pub fn open_interval(&self, query: &IntervalQuery) -> Result<Box<dyn EventCursor>> {
        self.connector.open_cursor(query)
    }

    /// Number of events in `[begin, end)`
    pub fn count(&self, query: &IntervalQuery) -> Result<u64> {
        self.connector.count(query)
    }

    /// Single event near an instant
    pub fn find_point(&self, query: &PointQuery) -> Result<Option<Event>> {
        self.connector.find_point_near(query)
    }

    /// Latest event strictly before the start of `query`
    fn prior_point(&self, query: &IntervalQuery) -> Result<Option<Event>> {
        let point = PointQuery::new(query.channel.clone(), query.begin(), Direction::Before)
            .updates_only(query.updates_only);
        self.connector.find_point_near(&point)
    }

    /// Integer events joined with the channel's enumeration labels
    pub fn open_labeled(&self, query: &IntervalQuery) -> Result<Box<dyn EventCursor>> {
        let labels = self.connector.label_history(&query.channel)?;
        let input = self.connector.open_cursor(query)?;
        Ok(Box::new(LabelJoinCursor::new(input, labels)?))
    }

    /// Bin sampler parameters for `query`, counting its events first
    ///
    /// `limit` falls back to the configured default.
    pub fn bin_params(&self, query: &IntervalQuery, limit: Option<u64>) -> Result<BinSamplerParams> {
        let count = self.connector.count(query)?;
        Ok(BinSamplerParams::new(
            limit.unwrap_or(self.config.default_limit),
            count,
        ))
    }

    /// Bucket sampler parameters for `query`, counting its events first
    ///
    /// `num_bins` falls back to the configured default.
    pub fn graphical_params(
        &self,
        query: &IntervalQuery,
        num_bins: Option<u64>,
    ) -> Result<GraphicalSamplerParams> {
        let count = self.connector.count(query)?;
        Ok(GraphicalSamplerParams::new(
            num_bins.unwrap_or(self.config.default_num_bins),
            count,
        )?)
    }

    /// Fixed-ratio bin sampled events
    pub fn open_bin_sampled(
        &self,
        query: &IntervalQuery,
        params: BinSamplerParams,
    ) -> Result<Box<dyn EventCursor>> {
        let input = self.connector.open_cursor(query)?;
        Ok(Box::new(BinSampleCursor::new(input, params)))
    }

    /// Shape-preserving bucket sampled events
    pub fn open_graphical_sampled(
        &self,
        query: &IntervalQuery,
        params: GraphicalSamplerParams,
    ) -> Result<Box<dyn EventCursor>> {
        let input = self.connector.open_cursor(query)?;
        Ok(Box::new(LttbCursor::new(input, params)))
    }

    /// Events with values pinned to both edges of the interval
    pub fn open_boundary_aware(&self, query: &IntervalQuery) -> Result<Box<dyn EventCursor>> {
        let prior = self.prior_point(query)?;
        let input = self.connector.open_cursor(query)?;
        Ok(Box::new(BoundaryAwareCursor::new(
            input,
            query.range,
            prior,
            query.updates_only,
        )))
    }

    /// Running time integral over the interval
    pub fn open_integrated(&self, query: &IntervalQuery) -> Result<Box<dyn EventCursor>> {
        let bounded = self.open_boundary_aware(query)?;
        Ok(Box::new(IntegrationCursor::new(bounded)))
    }

    /// Strategy the fixed-interval sampler would use
    ///
    /// `Auto` picks point queries once the interval holds more than
    /// `n_queries_threshold` events per sample.
    pub fn resolve_strategy(
        &self,
        channel: &ChannelInfo,
        params: &IntervalSamplerParams,
        strategy: SamplingStrategy,
        updates_only: bool,
    ) -> Result<SamplingStrategy> {
        let strategy = match strategy {
            SamplingStrategy::Auto => self.config.strategy,
            other => other,
        };
        if strategy != SamplingStrategy::Auto {
            return Ok(strategy);
        }
        let query = IntervalQuery::new(channel.clone(), params.begin(), params.end(), updates_only)?;
        let count = self.connector.count(&query)?;
        let budget = self
            .config
            .n_queries_threshold
            .saturating_mul(params.sample_count());
        let chosen = if count > budget {
            SamplingStrategy::PointQueries
        } else {
            SamplingStrategy::Stream
        };
        tracing::debug!(count, budget, strategy = ?chosen, "interval sampling strategy chosen");
        Ok(chosen)
    }

    /// One sample per fixed time step
    pub fn open_interval_sampled(
        &self,
        channel: &ChannelInfo,
        params: IntervalSamplerParams,
        strategy: SamplingStrategy,
        updates_only: bool,
    ) -> Result<IntervalSampleCursor> {
        match self.resolve_strategy(channel, &params, strategy, updates_only)? {
            SamplingStrategy::PointQueries => {
                let lookup = ConnectorPoints {
                    connector: Arc::clone(&self.connector),
                    channel: channel.clone(),
                    updates_only,
                };
                Ok(IntervalSampleCursor::point_queries(
                    Box::new(lookup),
                    params,
                    channel.kind,
                ))
            }
            _ => {
                let query =
                    IntervalQuery::new(channel.clone(), params.begin(), params.end(), updates_only)?;
                let prior = self.prior_point(&query)?;
                let input = self.connector.open_cursor(&query)?;
                Ok(IntervalSampleCursor::streaming(
                    input,
                    params,
                    prior,
                    updates_only,
                    channel.kind,
                ))
            }
        }
    }

    /// Time-weighted statistics over `[begin, end)`
    ///
    /// The value in force at `begin` (the prior point) counts from `begin`,
    /// and the last value is held until `end`.
    pub fn analyze(&self, query: &IntervalQuery) -> Result<Statistics> {
        let mut cursor = self.open_boundary_aware(query)?;
        let mut stats = RunningStatistics::new();
        stats.consume(&mut cursor)?;
        tracing::debug!(
            channel = %query.channel,
            range = %query.range,
            events = stats.count(),
            "interval analyzed"
        );
        Ok(stats.snapshot())
    }
}

impl<C: ArchiveConnector + MetadataLookup + 'static> HistoryService<C> {
    /// Resolve a channel name through the connector's metadata
    pub fn resolve(&self, name: &str) -> Result<ChannelInfo> {
        self.connector.resolve(name)
    }
}

/// Point lookups for the fixed-interval sampler
struct ConnectorPoints<C: ArchiveConnector> {
    connector: Arc<C>,
    channel: ChannelInfo,
    updates_only: bool,
}

impl<C: ArchiveConnector> PointSource for ConnectorPoints<C> {
    fn latest_at_or_before(&mut self, at: Timestamp) -> Result<Option<Event>> {
        let query = PointQuery::new(self.channel.clone(), at, Direction::BeforeOrAt)
            .updates_only(self.updates_only);
        self.connector.find_point_near(&query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventCode, ValueKind};
    use crate::source::MemoryArchive;
    use crate::stream::read_all;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    fn service() -> (HistoryService<MemoryArchive>, ChannelInfo) {
        let archive = Arc::new(MemoryArchive::new());
        let channel = archive.add_channel("IOC:LEVEL", ValueKind::Float);
        archive
            .append(
                &channel,
                vec![
                    Event::float(ts(0), 1.0),
                    Event::float(ts(600), 2.0),
                    Event::float(ts(1200), 3.0),
                    Event::float(ts(2400), 4.0),
                ],
            )
            .unwrap();
        (HistoryService::new(archive), channel)
    }

    #[test]
    fn test_analyze_holds_values_to_edges() {
        let (service, channel) = service();
        let query = IntervalQuery::new(channel, ts(300), ts(3000), false).unwrap();
        let stats = service.analyze(&query).unwrap();
        // 1*300 + 2*600 + 3*1200 + 4*600 over 2700 s
        assert_eq!(stats.integration, Some(7_500.0));
        assert_eq!(stats.duration, Some(2_700.0));
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(4.0));
    }

    #[test]
    fn test_boundary_aware_edges() {
        let (service, channel) = service();
        let query = IntervalQuery::new(channel, ts(300), ts(1500), false).unwrap();
        let events = read_all(&mut service.open_boundary_aware(&query).unwrap()).unwrap();
        let times: Vec<Timestamp> = events.iter().map(Event::timestamp).collect();
        assert_eq!(times, vec![ts(300), ts(600), ts(1200), ts(1500)]);
    }

    #[test]
    fn test_integrated_last_value() {
        let (service, channel) = service();
        let query = IntervalQuery::new(channel, ts(0), ts(2400), false).unwrap();
        let events = read_all(&mut service.open_integrated(&query).unwrap()).unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.timestamp(), ts(2400));
        assert_eq!(last.value().as_f64(), Some(5_400.0));
    }

    #[test]
    fn test_strategy_selection() {
        let (service, channel) = service();
        let params = IntervalSamplerParams::new(ts(0), 1_000, 3).unwrap();
        let auto = service
            .resolve_strategy(&channel, &params, SamplingStrategy::Auto, false)
            .unwrap();
        assert_eq!(auto, SamplingStrategy::Stream);

        let forced = service
            .resolve_strategy(&channel, &params, SamplingStrategy::PointQueries, false)
            .unwrap();
        assert_eq!(forced, SamplingStrategy::PointQueries);

        let mut config = EngineConfig::default();
        config.sampling.n_queries_threshold = 1;
        let dense = HistoryService::with_config(Arc::clone(service.connector()), &config);
        let params = IntervalSamplerParams::new(ts(0), 2_400_000, 2).unwrap();
        // 4 events up to and including 2400 s against a budget of 2
        assert_eq!(
            dense
                .resolve_strategy(&channel, &params, SamplingStrategy::Auto, false)
                .unwrap(),
            SamplingStrategy::PointQueries
        );
    }

    #[test]
    fn test_interval_sampled_strategies_agree() {
        let (service, channel) = service();
        let params = IntervalSamplerParams::new(ts(-600), 300_000, 12).unwrap();
        let mut streamed = service
            .open_interval_sampled(&channel, params, SamplingStrategy::Stream, false)
            .unwrap();
        assert!(streamed.is_streaming());
        let mut queried = service
            .open_interval_sampled(&channel, params, SamplingStrategy::PointQueries, false)
            .unwrap();
        assert!(!queried.is_streaming());

        let a = read_all(&mut streamed).unwrap();
        let b = read_all(&mut queried).unwrap();
        assert_eq!(a.len(), 12);
        assert_eq!(a, b);
        assert_eq!(a[0].code(), EventCode::Undefined);
        assert_eq!(a[2].value().as_f64(), Some(1.0));
    }

    #[test]
    fn test_graphical_params_from_config() {
        let (service, channel) = service();
        let query = IntervalQuery::new(channel, ts(0), ts(3000), false).unwrap();
        let params = service.graphical_params(&query, None).unwrap();
        assert_eq!(params.count(), 4);
        assert!(params.passes_through());
        assert!(service.graphical_params(&query, Some(2)).is_err());
    }
}
