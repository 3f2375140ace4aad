/*!
# flowstore: durable key presence for windowed unique counting

`flowstore` is the persistent side of flowcount. Instead of holding the
current window's keys in memory, every sighting is upserted as
`(key, last_seen)` into an embedded DuckDB database, and a window's unique
count is a range query over `last_seen`.

- [`KeyStore`](crate::storage::KeyStore): the store abstraction
- [`DuckDbStore`](crate::storage::duckdb::DuckDbStore): pooled DuckDB implementation
- [`RetentionSweeper`](crate::storage::retention::RetentionSweeper): prunes rows
  older than the retention horizon

## Usage

```rust,no_run
use flowstore_core::{DuckDbStore, KeyStore, StoreConfig};
use chrono::{Duration, Utc};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = StoreConfig::default();
    let store = DuckDbStore::new_with_options(&config.connection, &config.backend_options())?;
    store.init().await?;

    let now = Utc::now();
    store.upsert_key("visitor-42", now).await?;
    let unique = store.count_distinct(now - Duration::minutes(1), now + Duration::seconds(1)).await?;
    println!("unique visitors: {unique}");
    Ok(())
}
```
*/

pub mod config;
pub mod error;
pub mod storage;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use storage::duckdb::DuckDbStore;
pub use storage::retention::RetentionSweeper;
pub use storage::KeyStore;
