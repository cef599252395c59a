pub mod config;
pub mod controller;
pub mod domain;
pub mod queries;
pub mod route_handler;
pub mod services;
pub mod state;

use async_trait::async_trait;
use cqrs_es::{Aggregate, EventEnvelope, Query};
use tracing::info;

/// Writes every committed event to the log.
pub struct LoggingQuery {}

#[async_trait]
impl<A> Query<A> for LoggingQuery
where
    A: Aggregate,
{
    async fn dispatch(&self, aggregate_id: &str, events: &[EventEnvelope<A>]) {
        for event in events {
            info!(
                aggregate_type = %A::aggregate_type(),
                %aggregate_id,
                sequence = event.sequence,
                payload = ?event.payload,
                "event committed"
            );
        }
    }
}
