use std::future::Future;

use redis::{aio::MultiplexedConnection, AsyncCommands, FromRedisValue, ToRedisArgs};
use redis_macros::{FromRedisValue, ToRedisArgs};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CacheError, Error};

const CATALOG_CACHE_KEY: &str = "catalog-cache-key";

// Caching - keys

#[derive(Serialize, Clone, Debug)]
pub struct CacheKey<T: ToString> {
    _value: T,
    _type: CacheKeyType,
}

impl<T: ToString> CacheKey<T> {
    pub fn from(r#type: CacheKeyType, key: T) -> Self {
        Self {
            _value: key,
            _type: r#type,
        }
    }

    pub fn lifetime(&self) -> CacheLifetime {
        match &self._type {
            CacheKeyType::Tags | CacheKeyType::Ingredients => CacheLifetime::BindCatalogCache,
        }
    }
}

impl<T: ToString> From<&CacheKey<T>> for String {
    fn from(value: &CacheKey<T>) -> Self {
        match value._type {
            CacheKeyType::Tags => format!("tags-{}", value._value.to_string()),
            CacheKeyType::Ingredients => format!("ingredients-{}", value._value.to_string()),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CacheKeyType {
    Tags,
    Ingredients,
}

impl CacheKeyType {
    pub fn new<T: ToString>(self, key: T) -> CacheKey<T> {
        CacheKey::from(self, key)
    }
}

// Cache - wrappers

/// What a cached value's validity is tied to. Catalog entries die together
/// whenever the catalog generation key changes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CacheLifetime {
    BindCatalogCache,
}

impl CacheLifetime {
    pub async fn get_cache_bind(
        &self,
        cache: &mut MultiplexedConnection,
    ) -> Result<Option<String>, Error> {
        match self {
            CacheLifetime::BindCatalogCache => {
                get_cache_value::<&str, String>(CATALOG_CACHE_KEY, cache).await
            }
        }
    }

    pub async fn validate_cache_bind(
        &self,
        bind: &Option<String>,
        lifetime: &Self,
        cache: &mut MultiplexedConnection,
    ) -> Result<bool, Error> {
        if self != lifetime {
            log::error!("Found conflicting bindings");
            return Ok(false);
        }
        Ok(bind == &lifetime.get_cache_bind(cache).await?)
    }
}

#[derive(Serialize, Deserialize, FromRedisValue, ToRedisArgs, Clone, Debug)]
pub struct RedisValue {
    pub value: Value,
    _lifetime: CacheLifetime,
    _bind: Option<String>,
}

impl RedisValue {
    async fn new(
        value: Value,
        lifetime: CacheLifetime,
        cache: &mut MultiplexedConnection,
    ) -> Result<Self, Error> {
        let bind = lifetime.get_cache_bind(cache).await?;

        Ok(Self {
            value,
            _lifetime: lifetime,
            _bind: bind,
        })
    }

    async fn validate<K: ToString>(
        &self,
        key: &CacheKey<K>,
        cache: &mut MultiplexedConnection,
    ) -> Result<bool, Error> {
        self._lifetime
            .validate_cache_bind(&self._bind, &key.lifetime(), cache)
            .await
    }

    /// Serves a list from the cache, or computes it with `callback` and stores
    /// it. Cache failures are logged and fall through to `callback`.
    pub async fn get_or_list<T, K, F, Fut>(
        key: CacheKey<K>,
        cache: &mut MultiplexedConnection,
        callback: F,
    ) -> Result<Vec<T>, Error>
    where
        T: Serialize + DeserializeOwned,
        K: ToString,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, Error>>,
    {
        let k: String = (&key).into();

        let cached = get_cache_value::<&str, RedisValue>(&k, cache)
            .await
            .unwrap_or_else(|_| {
                let mut c = cache.clone();
                let k = k.clone();
                tokio::spawn(async move {
                    log::error!("> Failed to deserialize cached value. Deleting {}", &k);
                    if let Err(e) = delete_cache_value(k, &mut c).await {
                        log::error!("> Failed to delete cached value! {e}");
                    }
                });
                None
            });

        if let Some(cached) = cached {
            log::trace!("> Found {k:?}");
            match cached.validate(&key, cache).await {
                Ok(true) => match serde_json::from_value::<Vec<T>>(cached.value) {
                    Ok(value) => return Ok(value),
                    Err(e) => log::error!("> Cached {k} has an unexpected shape: {e}"),
                },
                Ok(false) => log::trace!("> Invalidated {k:?}"),
                Err(e) => log::error!("{e:?}"),
            }
        }

        log::trace!("> Fetching {k:?}");
        let value = callback().await?;

        let stored = match serde_json::to_value(&value) {
            Ok(json) => match RedisValue::new(json, key.lifetime(), cache).await {
                Ok(entry) => set_cache_value::<&str, RedisValue>(&k, entry, cache).await,
                Err(e) => Err(e),
            },
            Err(e) => {
                log::error!("> Failed to serialize {k}: {e}");
                Ok(())
            }
        };
        if let Err(e) = stored {
            log::error!("{e:?}");
        }

        Ok(value)
    }
}

/// Starts a new catalog generation; every catalog entry cached before is stale.
pub async fn invalidate_catalog_cache(cache: &mut MultiplexedConnection) -> Result<(), Error> {
    let generation = uuid::Uuid::new_v4().to_string();
    log::info!("> Catalog cache generation {generation}");
    set_cache_value(CATALOG_CACHE_KEY, generation, cache).await
}

// Cache - raw handlers

pub async fn set_cache_value<K: ToRedisArgs + Send + Sync, V: ToRedisArgs + Send + Sync>(
    key: K,
    value: V,
    cache: &mut MultiplexedConnection,
) -> Result<(), Error> {
    let _: () = cache.set(key, value).await.map_err(CacheError::from)?;

    Ok(())
}

pub async fn delete_cache_value<K: ToRedisArgs + Send + Sync>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<(), Error> {
    let _: () = cache.del(key).await.map_err(CacheError::from)?;

    Ok(())
}

pub async fn get_cache_value<K: ToRedisArgs + Send + Sync, V: FromRedisValue>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<Option<V>, Error> {
    let value: Option<V> = cache.get(key).await.map_err(CacheError::from)?;

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        let key: String = (&CacheKeyType::Tags.new("all")).into();
        assert_eq!(key, "tags-all");

        let key: String = (&CacheKeyType::Ingredients.new("sug")).into();
        assert_eq!(key, "ingredients-sug");
    }

    #[test]
    fn catalog_keys_share_a_lifetime() {
        assert_eq!(
            CacheKeyType::Tags.new("all").lifetime(),
            CacheLifetime::BindCatalogCache
        );
        assert_eq!(
            CacheKeyType::Ingredients.new("").lifetime(),
            CacheLifetime::BindCatalogCache
        );
    }

    #[test]
    fn redis_values_survive_json() {
        let value = RedisValue {
            value: serde_json::json!([{"id": 1}]),
            _lifetime: CacheLifetime::BindCatalogCache,
            _bind: Some(String::from("gen")),
        };
        let json = serde_json::to_string(&value).unwrap();
        let back: RedisValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back.value, value.value);
        assert_eq!(back._bind.as_deref(), Some("gen"));
    }
}
