//! Redis storage backend for the order service.
//!
//! Expiry is delegated to Redis (`SET EX`), counter creation uses `SET NX`
//! and increments use `INCRBY`. Compare-and-swap runs as a Lua script, so
//! every primitive of the storage interface executes atomically on the
//! server. The connection is established on
//! first use and shared through a [`ConnectionManager`], which reconnects on
//! its own after failures.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use order_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Swaps the value only if it still equals ARGV[1]; -1 when the key is gone.
const COMPARE_AND_SWAP_SCRIPT: &str = r"
local current = redis.call('GET', KEYS[1])
if not current then
	return -1
end
if current == ARGV[1] then
	redis.call('SET', KEYS[1], ARGV[2], 'KEEPTTL')
	return 1
end
return 0
";

fn redis_err(e: redis::RedisError) -> StorageError {
	StorageError::Backend(e.to_string())
}

/// Escapes glob metacharacters so a key prefix can be used in `SCAN MATCH`.
fn escape_pattern(prefix: &str) -> String {
	let mut escaped = String::with_capacity(prefix.len() + 1);
	for c in prefix.chars() {
		if matches!(c, '*' | '?' | '[' | ']' | '\\') {
			escaped.push('\\');
		}
		escaped.push(c);
	}
	escaped.push('*');
	escaped
}

/// Redis-backed storage implementation.
pub struct RedisStorage {
	client: Client,
	conn: OnceCell<ConnectionManager>,
}

impl RedisStorage {
	/// Creates a storage handle for the given URL without connecting yet.
	pub fn new(url: &str) -> Result<Self, StorageError> {
		let client = Client::open(url).map_err(|e| StorageError::Configuration(e.to_string()))?;
		Ok(Self {
			client,
			conn: OnceCell::new(),
		})
	}

	async fn connection(&self) -> Result<ConnectionManager, StorageError> {
		self.conn
			.get_or_try_init(|| async {
				let conn = ConnectionManager::new(self.client.clone()).await?;
				info!("Connected to Redis");
				Ok::<_, redis::RedisError>(conn)
			})
			.await
			.cloned()
			.map_err(redis_err)
	}
}

#[async_trait]
impl StorageInterface for RedisStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let mut conn = self.connection().await?;
		let value: Option<Vec<u8>> = conn.get(key).await.map_err(redis_err)?;
		value.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let mut conn = self.connection().await?;
		match ttl.filter(|ttl| !ttl.is_zero()) {
			Some(ttl) => {
				let _: () = conn
					.set_ex(key, value, ttl.as_secs().max(1))
					.await
					.map_err(redis_err)?;
			},
			None => {
				let _: () = conn.set(key, value).await.map_err(redis_err)?;
			},
		}
		Ok(())
	}

	async fn set_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, StorageError> {
		let mut conn = self.connection().await?;
		conn.set_nx(key, value).await.map_err(redis_err)
	}

	async fn increment(&self, key: &str, delta: i64) -> Result<i64, StorageError> {
		let mut conn = self.connection().await?;
		// INCRBY would create a missing key at zero
		let exists: bool = conn.exists(key).await.map_err(redis_err)?;
		if !exists {
			return Err(StorageError::NotFound);
		}
		conn.incr(key, delta).await.map_err(redis_err)
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: &[u8],
		value: Vec<u8>,
	) -> Result<bool, StorageError> {
		let mut conn = self.connection().await?;
		let outcome: i64 = redis::Script::new(COMPARE_AND_SWAP_SCRIPT)
			.key(key)
			.arg(expected)
			.arg(value)
			.invoke_async(&mut conn)
			.await
			.map_err(redis_err)?;
		match outcome {
			-1 => Err(StorageError::NotFound),
			1 => Ok(true),
			_ => Ok(false),
		}
	}

	async fn scan_prefix(&self, prefix: &str) -> Result<Vec<Vec<u8>>, StorageError> {
		let mut conn = self.connection().await?;
		let pattern = escape_pattern(prefix);
		let mut cursor: u64 = 0;
		let mut keys: Vec<String> = Vec::new();

		loop {
			let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
				.arg(cursor)
				.arg("MATCH")
				.arg(&pattern)
				.arg("COUNT")
				.arg(100)
				.query_async(&mut conn)
				.await
				.map_err(redis_err)?;

			keys.extend(batch);
			cursor = next_cursor;
			if cursor == 0 {
				break;
			}
		}

		debug!(prefix = %prefix, count = keys.len(), "Scanned Redis keys");

		let mut values = Vec::with_capacity(keys.len());
		for key in keys {
			// Keys can expire between SCAN and GET
			let value: Option<Vec<u8>> = conn.get(&key).await.map_err(redis_err)?;
			values.extend(value);
		}
		Ok(values)
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut conn = self.connection().await?;
		let _: () = conn.del(key).await.map_err(redis_err)?;
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let mut conn = self.connection().await?;
		conn.exists(key).await.map_err(redis_err)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(RedisStorageSchema)
	}
}

/// Configuration schema for RedisStorage.
pub struct RedisStorageSchema;

impl ConfigSchema for RedisStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(vec![Field::new("url", FieldType::String)], vec![]);
		schema.validate(config)?;

		let url = config.get("url").and_then(|v| v.as_str()).unwrap_or("");
		if !url.starts_with("redis://") && !url.starts_with("rediss://") {
			return Err(ValidationError::InvalidValue {
				field: "url".to_string(),
				message: format!("'{}' is not a redis:// or rediss:// URL", url),
			});
		}
		Ok(())
	}
}

/// Factory function to create a Redis storage backend from configuration.
///
/// Configuration parameters:
/// - `url`: Redis connection URL, for example "redis://localhost:6379"
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	RedisStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let url = config
		.get("url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| StorageError::Configuration("url is required".into()))?;

	Ok(Box::new(RedisStorage::new(url)?))
}

/// Registry for the Redis storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "redis";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}
