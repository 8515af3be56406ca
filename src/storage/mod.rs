//! House storage backends.
//!
//! A backend hands out short-lived connections scoped to one country. The
//! bulk coordinate load and each record fetch run on their own connection,
//! always obtained through [`open_scoped`] so the connection is closed on
//! every exit path, including errors and cancelled futures.

mod csv;
mod memory;
mod scylla;

pub use self::csv::{CsvDataSource, HouseRow};
pub use self::memory::{ConnectionStats, FailureMode, MemoryDataSource};
pub use self::scylla::ScyllaDataSource;

use std::future::Future;
use std::ops::{Deref, DerefMut};

use crate::error::StorageError;
use crate::models::{AddressPoint, AddressRecord, CountryInfo, HouseId};

/// Source of house data, one connection per unit of work.
pub trait HouseDataSource: Send + Sync {
    type Connection: HouseConnection + 'static;

    fn open(
        &self,
        country: &CountryInfo,
    ) -> impl Future<Output = Result<Self::Connection, StorageError>> + Send;
}

pub trait HouseConnection: Send {
    /// All house coordinates of the connection's country
    fn load_coordinates(
        &mut self,
    ) -> impl Future<Output = Result<Vec<AddressPoint>, StorageError>> + Send;

    /// Full record of one house, `None` if the id is unknown
    fn load_record(
        &mut self,
        id: HouseId,
    ) -> impl Future<Output = Result<Option<AddressRecord>, StorageError>> + Send;

    /// Release the connection. Called exactly once by [`ConnectionGuard`].
    fn close(&mut self);
}

/// Closes the wrapped connection when dropped.
pub struct ConnectionGuard<C: HouseConnection> {
    conn: C,
}

impl<C: HouseConnection> ConnectionGuard<C> {
    pub fn new(conn: C) -> Self {
        Self { conn }
    }
}

impl<C: HouseConnection> Deref for ConnectionGuard<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.conn
    }
}

impl<C: HouseConnection> DerefMut for ConnectionGuard<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.conn
    }
}

impl<C: HouseConnection> Drop for ConnectionGuard<C> {
    fn drop(&mut self) {
        self.conn.close();
    }
}

/// Open a connection that is closed when the guard goes out of scope.
pub async fn open_scoped<D>(
    source: &D,
    country: &CountryInfo,
) -> Result<ConnectionGuard<D::Connection>, StorageError>
where
    D: HouseDataSource + ?Sized,
{
    source.open(country).await.map(ConnectionGuard::new)
}
