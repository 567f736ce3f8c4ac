//! Geospatial lookup of available houses.
//!
//! [`GeoIndex`] answers "what can I walk to from here": addresses
//! within a radius, ordered nearest first, excluding any address under
//! an active claim. The radius filter runs in the index, not by
//! scanning full tables in handlers; claim status is joined in at
//! query time, never stored denormalized on the address.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use blockwalk_core::{haversine_meters, Coordinates};

use crate::catalog::{AddressCatalog, ResidentVoter};
use crate::error::Result;
use crate::store::{address_key, ClaimStore};

/// Default search radius for available-house queries.
pub const DEFAULT_QUERY_RADIUS_KM: f64 = 0.5;

/// Default cap on returned houses.
pub const DEFAULT_QUERY_LIMIT: usize = 50;

/// A claimable house near the query center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableHouse {
    /// Street address line.
    pub address: String,
    /// Coordinates of the address.
    pub location: Coordinates,
    /// Haversine distance from the query center, in meters.
    pub distance_meters: f64,
    /// Number of voters at this address.
    pub voter_count: usize,
    /// The voters themselves.
    pub voters: Vec<ResidentVoter>,
}

/// Read-only spatial view over the address catalog and claim store.
pub struct GeoIndex {
    catalog: Arc<dyn AddressCatalog>,
    claims: Arc<dyn ClaimStore>,
}

impl GeoIndex {
    /// Creates a geo index over the given catalog and claim store.
    #[must_use]
    pub fn new(catalog: Arc<dyn AddressCatalog>, claims: Arc<dyn ClaimStore>) -> Self {
        Self { catalog, claims }
    }

    /// Returns up to `limit` claimable houses within `radius_km` of
    /// `center`, ordered by ascending distance.
    ///
    /// Addresses under a Claimed or Visiting lease (unexpired) are
    /// excluded; lapsed leases the sweep has not yet reclaimed do not
    /// hide a house.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog or claim store is unreachable.
    pub async fn query(
        &self,
        center: Coordinates,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<AvailableHouse>> {
        let candidates = self.catalog.within_radius(center, radius_km).await?;
        let claimed = self.claims.active_addresses(Utc::now()).await?;

        let mut houses: Vec<AvailableHouse> = candidates
            .into_iter()
            .filter(|a| !claimed.contains(&address_key(&a.line)))
            .map(|a| AvailableHouse {
                distance_meters: haversine_meters(center, a.location),
                voter_count: a.voter_count(),
                address: a.line,
                location: a.location,
                voters: a.voters,
            })
            .collect();

        houses.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
        houses.truncate(limit);
        Ok(houses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Address, InMemoryAddressCatalog};
    use crate::store::memory::InMemoryClaimStore;
    use crate::store::ClaimRequest;
    use blockwalk_core::{CanvasserId, SessionId};
    use chrono::Duration;

    fn address(line: &str, lat: f64, lon: f64) -> Address {
        Address {
            line: line.into(),
            location: Coordinates::new(lat, lon).unwrap(),
            voters: vec![
                ResidentVoter {
                    voter_id: format!("v-{line}-1"),
                    name: "Resident One".into(),
                },
                ResidentVoter {
                    voter_id: format!("v-{line}-2"),
                    name: "Resident Two".into(),
                },
            ],
        }
    }

    fn center() -> Coordinates {
        Coordinates::new(33.4054, -86.8114).unwrap()
    }

    async fn index_with_street() -> (GeoIndex, Arc<InMemoryClaimStore>) {
        let catalog = Arc::new(InMemoryAddressCatalog::new());
        catalog
            .insert_all([
                address("100 Main St", 33.4054, -86.8114),
                address("102 Main St", 33.4058, -86.8114),
                address("104 Main St", 33.4062, -86.8114),
                // Well outside a 500m radius.
                address("1 Far Away Rd", 33.4500, -86.8114),
            ])
            .unwrap();
        let claims = Arc::new(InMemoryClaimStore::new());
        (
            GeoIndex::new(catalog, Arc::clone(&claims) as Arc<dyn ClaimStore>),
            claims,
        )
    }

    #[tokio::test]
    async fn orders_by_ascending_distance() -> Result<()> {
        let (index, _claims) = index_with_street().await;

        let houses = index.query(center(), 0.5, 50).await?;
        assert_eq!(houses.len(), 3);
        assert_eq!(houses[0].address, "100 Main St");
        assert_eq!(houses[1].address, "102 Main St");
        assert_eq!(houses[2].address, "104 Main St");
        assert!(houses[0].distance_meters <= houses[1].distance_meters);
        assert_eq!(houses[0].voter_count, 2);
        Ok(())
    }

    #[tokio::test]
    async fn respects_limit() -> Result<()> {
        let (index, _claims) = index_with_street().await;

        let houses = index.query(center(), 0.5, 2).await?;
        assert_eq!(houses.len(), 2);
        assert_eq!(houses[0].address, "100 Main St");
        Ok(())
    }

    #[tokio::test]
    async fn excludes_actively_claimed_addresses() -> Result<()> {
        let (index, claims) = index_with_street().await;

        claims
            .claim(
                SessionId::generate(),
                &CanvasserId::new("vol-1"),
                vec![ClaimRequest {
                    address: "102 Main St".into(),
                    location: Coordinates::new(33.4058, -86.8114).unwrap(),
                }],
                Duration::minutes(30),
            )
            .await?;

        let houses = index.query(center(), 0.5, 50).await?;
        let addresses: Vec<&str> = houses.iter().map(|h| h.address.as_str()).collect();
        assert_eq!(addresses, vec!["100 Main St", "104 Main St"]);
        Ok(())
    }

    #[tokio::test]
    async fn lapsed_claim_does_not_hide_a_house() -> Result<()> {
        let (index, claims) = index_with_street().await;

        claims
            .claim(
                SessionId::generate(),
                &CanvasserId::new("vol-1"),
                vec![ClaimRequest {
                    address: "102 Main St".into(),
                    location: Coordinates::new(33.4058, -86.8114).unwrap(),
                }],
                Duration::zero(),
            )
            .await?;

        let houses = index.query(center(), 0.5, 50).await?;
        assert_eq!(houses.len(), 3);
        Ok(())
    }
}
