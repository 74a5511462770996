//! Stream buffer links: which (display, scene, consumer) samples which source.

use std::collections::BTreeMap;

use crate::core::ids::{ConsumerId, DisplayId, IviSurfaceId, SceneId};

/// Consumer end of a link. Each consumer samples at most one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamConsumer {
    pub display: DisplayId,
    pub scene: SceneId,
    pub consumer: ConsumerId,
}

impl StreamConsumer {
    pub fn new(display: DisplayId, scene: SceneId, consumer: ConsumerId) -> Self {
        Self {
            display,
            scene,
            consumer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamBufferLink {
    pub source: IviSurfaceId,
    pub consumer: StreamConsumer,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("consumer {consumer:?} already samples ivi-id {linked}")]
    ConsumerOccupied {
        consumer: StreamConsumer,
        linked: IviSurfaceId,
    },
    #[error("consumer {0:?} is not linked")]
    NotLinked(StreamConsumer),
}

/// Many-to-many relation between sources and consumers.
#[derive(Debug, Default)]
pub struct StreamBufferLinks {
    by_consumer: BTreeMap<StreamConsumer, IviSurfaceId>,
}

impl StreamBufferLinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(&mut self, consumer: StreamConsumer, source: IviSurfaceId) -> Result<(), LinkError> {
        if let Some(&existing) = self.by_consumer.get(&consumer) {
            return Err(LinkError::ConsumerOccupied {
                consumer,
                linked: existing,
            });
        }
        self.by_consumer.insert(consumer, source);
        Ok(())
    }

    /// Returns the source the consumer was linked to.
    pub fn unlink(&mut self, consumer: StreamConsumer) -> Result<IviSurfaceId, LinkError> {
        self.by_consumer
            .remove(&consumer)
            .ok_or(LinkError::NotLinked(consumer))
    }

    pub fn consumers_of(&self, source: IviSurfaceId) -> impl Iterator<Item = StreamConsumer> + '_ {
        self.by_consumer
            .iter()
            .filter(move |(_, s)| **s == source)
            .map(|(c, _)| *c)
    }

    /// Drop every link of `source`.
    pub fn remove_source(&mut self, source: IviSurfaceId) -> Vec<StreamBufferLink> {
        let consumers: Vec<StreamConsumer> = self.consumers_of(source).collect();
        consumers
            .into_iter()
            .filter_map(|consumer| {
                self.by_consumer
                    .remove(&consumer)
                    .map(|source| StreamBufferLink { source, consumer })
            })
            .collect()
    }

    /// Drop every link of a scene (scene unmapped or destroyed).
    pub fn remove_scene(&mut self, display: DisplayId, scene: SceneId) -> Vec<StreamBufferLink> {
        let mut removed = Vec::new();
        self.by_consumer.retain(|consumer, source| {
            let keep = consumer.display != display || consumer.scene != scene;
            if !keep {
                removed.push(StreamBufferLink {
                    source: *source,
                    consumer: *consumer,
                });
            }
            keep
        });
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = StreamBufferLink> + '_ {
        self.by_consumer
            .iter()
            .map(|(consumer, source)| StreamBufferLink {
                source: *source,
                consumer: *consumer,
            })
    }

    pub fn len(&self) -> usize {
        self.by_consumer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_consumer.is_empty()
    }
}
