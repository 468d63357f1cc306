mod consumer;
mod listener;
mod producer;

pub use consumer::{
    ClaimSettings, ConsumerStats, Delivery, DownstreamAction, IdempotentConsumer, PersistLogAction,
};
pub use listener::{BatchOutcome, Listener, ListenerSettings, RecordHandler};
pub use producer::{LogProducer, ProducerStats, PublishSettings};
