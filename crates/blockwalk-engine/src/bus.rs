//! Best-effort event fan-out between nearby canvassers.
//!
//! [`CoordinationBus`] holds one subscriber per live connection and
//! forwards [`WalkEvent`]s to every subscriber whose working area
//! covers the event's location (events without a location go to
//! everyone). Delivery uses bounded channels and `try_send`: a
//! subscriber that cannot keep up loses events rather than slowing
//! publishers or other subscribers. Dropped events are logged and
//! counted, never propagated as errors - clients self-heal on their
//! next poll.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use blockwalk_core::{haversine_km, haversine_meters, CanvasserId, ConnectionId, Coordinates};

use crate::error::{Error, Result};
use crate::events::{WalkEvent, WalkEventData};

/// Default working-area radius for a subscriber.
pub const DEFAULT_WORKING_RADIUS_KM: f64 = 2.0;

/// Per-subscriber event buffer depth.
const CHANNEL_CAPACITY: usize = 64;

/// A nearby canvasser, as reported to peers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyCanvasser {
    /// The canvasser's identifier.
    pub canvasser_id: CanvasserId,
    /// Display name.
    pub name: String,
    /// Last reported location.
    pub location: Coordinates,
    /// Distance from the query center, in meters.
    pub distance_meters: f64,
    /// When the location was last reported.
    pub last_update: DateTime<Utc>,
}

struct Subscriber {
    canvasser_id: CanvasserId,
    name: String,
    location: Coordinates,
    radius_km: f64,
    last_update: DateTime<Utc>,
    sender: mpsc::Sender<WalkEvent>,
}

impl Subscriber {
    fn covers(&self, location: Option<Coordinates>) -> bool {
        location.map_or(true, |loc| haversine_km(self.location, loc) <= self.radius_km)
    }
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("coordination bus lock poisoned")
}

/// Fan-out hub for coordination events.
#[derive(Default)]
pub struct CoordinationBus {
    subscribers: RwLock<HashMap<ConnectionId, Subscriber>>,
}

impl CoordinationBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a canvasser to events around `location`, announcing
    /// their arrival to existing subscribers.
    ///
    /// Returns the connection handle and the receiving end of the
    /// subscriber's event channel. The join announcement is not
    /// delivered to the joiner themselves.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    pub fn join(
        &self,
        canvasser_id: CanvasserId,
        name: String,
        location: Coordinates,
        radius_km: f64,
    ) -> Result<(ConnectionId, mpsc::Receiver<WalkEvent>)> {
        let event = WalkEvent::new(WalkEventData::CanvasserJoined {
            canvasser_id: canvasser_id.clone(),
            name: name.clone(),
            location,
        });
        self.publish(&event)?;

        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let connection_id = ConnectionId::generate();
        let mut subscribers = self.subscribers.write().map_err(poison_err)?;
        subscribers.insert(
            connection_id,
            Subscriber {
                canvasser_id: canvasser_id.clone(),
                name,
                location,
                radius_km,
                last_update: Utc::now(),
                sender,
            },
        );
        drop(subscribers);

        debug!(connection_id = %connection_id, canvasser_id = %canvasser_id, "canvasser joined");
        Ok((connection_id, receiver))
    }

    /// Unsubscribes a connection, announcing the departure to the
    /// remaining subscribers. Unknown connections are ignored (a
    /// double disconnect is routine).
    ///
    /// Returns the departing canvasser's identity, if the connection
    /// was live.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    pub fn leave(&self, connection_id: ConnectionId) -> Result<Option<CanvasserId>> {
        let mut subscribers = self.subscribers.write().map_err(poison_err)?;
        let Some(departed) = subscribers.remove(&connection_id) else {
            return Ok(None);
        };
        drop(subscribers);

        self.publish(&WalkEvent::new(WalkEventData::CanvasserLeft {
            canvasser_id: departed.canvasser_id.clone(),
            name: departed.name,
        }))?;
        debug!(connection_id = %connection_id, "canvasser left");
        Ok(Some(departed.canvasser_id))
    }

    /// Updates a subscriber's location and announces the movement.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    pub fn update_location(
        &self,
        connection_id: ConnectionId,
        location: Coordinates,
    ) -> Result<()> {
        let event = {
            let mut subscribers = self.subscribers.write().map_err(poison_err)?;
            let Some(subscriber) = subscribers.get_mut(&connection_id) else {
                return Ok(());
            };
            subscriber.location = location;
            subscriber.last_update = Utc::now();
            WalkEvent::new(WalkEventData::CanvasserMoved {
                canvasser_id: subscriber.canvasser_id.clone(),
                name: subscriber.name.clone(),
                location,
            })
        };
        self.publish(&event)?;
        Ok(())
    }

    /// Delivers an event to every subscriber whose working area covers
    /// it. Full subscriber buffers drop the event for that subscriber.
    ///
    /// Returns the number of subscribers the event was delivered to.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    pub fn publish(&self, event: &WalkEvent) -> Result<usize> {
        let location = event.location();
        let subscribers = self.subscribers.read().map_err(poison_err)?;
        let mut delivered = 0;
        for (connection_id, subscriber) in subscribers.iter() {
            if !subscriber.covers(location) {
                continue;
            }
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        connection_id = %connection_id,
                        event_id = %event.id,
                        "subscriber buffer full, event dropped"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // Receiver gone; the stale entry is cleaned up on
                    // the next leave() or ignored until then.
                    debug!(connection_id = %connection_id, "subscriber channel closed");
                }
            }
        }
        drop(subscribers);
        Ok(delivered)
    }

    /// Returns subscribers within `radius_km` of `center`, nearest
    /// first.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    pub fn active_canvassers(
        &self,
        center: Coordinates,
        radius_km: f64,
    ) -> Result<Vec<NearbyCanvasser>> {
        let subscribers = self.subscribers.read().map_err(poison_err)?;
        let mut nearby: Vec<NearbyCanvasser> = subscribers
            .values()
            .filter(|s| haversine_km(center, s.location) <= radius_km)
            .map(|s| NearbyCanvasser {
                canvasser_id: s.canvasser_id.clone(),
                name: s.name.clone(),
                location: s.location,
                distance_meters: haversine_meters(center, s.location),
                last_update: s.last_update,
            })
            .collect();
        drop(subscribers);
        nearby.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
        Ok(nearby)
    }

    /// Returns the number of live subscriptions.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    pub fn subscriber_count(&self) -> Result<usize> {
        let subscribers = self.subscribers.read().map_err(poison_err)?;
        let count = subscribers.len();
        drop(subscribers);
        Ok(count)
    }
}
