//! Address catalog boundary.
//!
//! The voter/address store is an external collaborator: blockwalk
//! consumes it through the [`AddressCatalog`] trait and never owns the
//! records behind it. [`InMemoryAddressCatalog`] is the test and
//! single-node implementation.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use blockwalk_core::{haversine_km, Coordinates};

use crate::error::{Error, Result};
use crate::store::address_key;

/// A voter residing at an address, as summarized by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResidentVoter {
    /// External voter record identifier.
    pub voter_id: String,
    /// Display name.
    pub name: String,
}

/// A geocoded street address with its resident voters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    /// Street address line.
    pub line: String,
    /// Coordinates of the address.
    pub location: Coordinates,
    /// Voters at this address.
    pub voters: Vec<ResidentVoter>,
}

impl Address {
    /// Returns the number of voters at this address.
    #[must_use]
    pub fn voter_count(&self) -> usize {
        self.voters.len()
    }
}

/// Read access to the external address catalog.
#[async_trait]
pub trait AddressCatalog: Send + Sync {
    /// Looks up addresses by their address lines. Unknown addresses
    /// are silently absent from the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog is unreachable.
    async fn lookup(&self, addresses: &[String]) -> Result<Vec<Address>>;

    /// Returns every address within `radius_km` of `center`.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog is unreachable.
    async fn within_radius(&self, center: Coordinates, radius_km: f64) -> Result<Vec<Address>>;
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("address catalog lock poisoned")
}

/// In-memory address catalog for tests and single-node deployments.
#[derive(Debug, Default)]
pub struct InMemoryAddressCatalog {
    addresses: RwLock<HashMap<String, Address>>,
}

impl InMemoryAddressCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an address.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn insert(&self, address: Address) -> Result<()> {
        let mut addresses = self.addresses.write().map_err(poison_err)?;
        addresses.insert(address_key(&address.line), address);
        drop(addresses);
        Ok(())
    }

    /// Loads a batch of addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn insert_all(&self, batch: impl IntoIterator<Item = Address>) -> Result<()> {
        let mut addresses = self.addresses.write().map_err(poison_err)?;
        for address in batch {
            addresses.insert(address_key(&address.line), address);
        }
        drop(addresses);
        Ok(())
    }
}

#[async_trait]
impl AddressCatalog for InMemoryAddressCatalog {
    async fn lookup(&self, lines: &[String]) -> Result<Vec<Address>> {
        let addresses = self.addresses.read().map_err(poison_err)?;
        let found = lines
            .iter()
            .filter_map(|line| addresses.get(&address_key(line)).cloned())
            .collect();
        drop(addresses);
        Ok(found)
    }

    async fn within_radius(&self, center: Coordinates, radius_km: f64) -> Result<Vec<Address>> {
        let addresses = self.addresses.read().map_err(poison_err)?;
        let hits = addresses
            .values()
            .filter(|a| haversine_km(center, a.location) <= radius_km)
            .cloned()
            .collect();
        drop(addresses);
        Ok(hits)
    }
}
